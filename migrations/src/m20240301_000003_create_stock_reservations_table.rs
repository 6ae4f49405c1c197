use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StockReservations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockReservations::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::OrganizationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::Number)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::TaskId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::ProductId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::InventoryLevel)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::ReferenceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::QuantityReserved)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::QuantityFulfilled)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StockReservations::Status)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::ReservedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::ExpiresAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::FulfilledAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::CancelledAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::CancelReason)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockReservations::UpdatedAt)
                            .timestamp()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_reservations_number")
                    .table(StockReservations::Table)
                    .col(StockReservations::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_reservations_task")
                    .table(StockReservations::Table)
                    .col(StockReservations::TaskId)
                    .to_owned(),
            )
            .await?;

        // Sweep query: active reservations past their expiry
        manager
            .create_index(
                Index::create()
                    .name("idx_stock_reservations_status_expires")
                    .table(StockReservations::Table)
                    .col(StockReservations::Status)
                    .col(StockReservations::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockReservations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockReservations {
    Table,
    Id,
    OrganizationId,
    Number,
    TaskId,
    ProductId,
    InventoryLevel,
    ReferenceId,
    QuantityReserved,
    QuantityFulfilled,
    Status,
    ReservedAt,
    ExpiresAt,
    FulfilledAt,
    CancelledAt,
    CancelReason,
    CreatedAt,
    UpdatedAt,
}
