pub mod inventory_count;
pub mod inventory_count_item;
pub mod machine_balance;
pub mod operator_balance;
pub mod stock_adjustment;
pub mod stock_movement;
pub mod stock_reservation;
pub mod warehouse_balance;

pub use stock_adjustment::{AdjustmentType, BalanceLevel};
pub use stock_movement::MovementType;
pub use stock_reservation::{InventoryLevel, ReservationStatus};
