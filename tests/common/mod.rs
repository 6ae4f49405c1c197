#![allow(dead_code)]

use migrations::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tokio::sync::mpsc;

use vendory::config::InventoryConfig;
use vendory::events::{self, Event};
use vendory::services::{
    BalanceService, MovementService, ReservationService, StocktakeService, TransferContext,
    TransferService,
};

pub const ORG: &str = "org-acme";

/// Every service wired against one in-memory SQLite database with the
/// schema migrated.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<InventoryConfig>,
    pub events: mpsc::Receiver<Event>,
    pub balances: BalanceService,
    pub movements: MovementService,
    pub reservations: ReservationService,
    pub transfers: TransferService,
    pub stocktake: StocktakeService,
}

impl TestApp {
    /// Events published so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

pub fn test_config() -> InventoryConfig {
    InventoryConfig {
        database_url: "sqlite::memory:".to_string(),
        adjustment_approval_threshold: 50,
        require_adjustment_approval: true,
        allow_negative_machine_stock: true,
        default_reservation_ttl_hours: 72,
        reservation_sweep_interval_secs: 300,
    }
}

pub async fn setup() -> TestApp {
    setup_with_config(test_config()).await
}

pub async fn setup_with_config(config: InventoryConfig) -> TestApp {
    // Honors RUST_LOG when debugging a failing test; quiet otherwise.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    // One connection keeps every query on the same in-memory database.
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt)
        .await
        .expect("connect to in-memory sqlite");
    Migrator::up(&db, None).await.expect("run migrations");

    let db = Arc::new(db);
    let config = Arc::new(config);
    let (sender, receiver) = events::channel(256);

    TestApp {
        balances: BalanceService::new(Arc::clone(&db)),
        movements: MovementService::new(Arc::clone(&db)),
        reservations: ReservationService::new(
            Arc::clone(&db),
            sender.clone(),
            Arc::clone(&config),
        ),
        transfers: TransferService::new(Arc::clone(&db), sender.clone(), Arc::clone(&config)),
        stocktake: StocktakeService::new(Arc::clone(&db), sender, Arc::clone(&config)),
        db,
        config,
        events: receiver,
    }
}

pub fn ctx() -> TransferContext {
    TransferContext::new(ORG, "tester")
}
