//! Vendory: multi-echelon inventory ledger for vending-machine fleets.
//!
//! Stock lives at three levels per organization: a central warehouse,
//! field operators and individual machines. The crate tracks current
//! and reserved quantities at each level, records every change in an
//! append-only movement log, manages reservations with TTL expiry,
//! coordinates atomic transfers between levels and runs the stocktake
//! and adjustment workflow that reconciles system quantities with
//! physical counts.
//!
//! Built on sea-orm; services take an `Arc<DatabaseConnection>` and run
//! each mutating operation in one transaction. State-change events are
//! published on a tokio mpsc channel after the transaction commits.

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod services;

pub use config::InventoryConfig;
pub use db::{establish_connection, DbPool};
pub use errors::ServiceError;
pub use events::{Event, EventSender};
pub use services::{
    BalanceService, MovementService, ReservationService, StocktakeService, TransferService,
};
