pub use sea_orm_migration::prelude::*;

mod m20240301_000001_create_balance_tables;
mod m20240301_000002_create_stock_movements_table;
mod m20240301_000003_create_stock_reservations_table;
mod m20240301_000004_create_stocktake_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_balance_tables::Migration),
            Box::new(m20240301_000002_create_stock_movements_table::Migration),
            Box::new(m20240301_000003_create_stock_reservations_table::Migration),
            Box::new(m20240301_000004_create_stocktake_tables::Migration),
        ]
    }
}
