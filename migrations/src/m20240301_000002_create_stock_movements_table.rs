use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only audit trail of every quantity change
        manager
            .create_table(
                Table::create()
                    .table(StockMovements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockMovements::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::OrganizationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::MovementType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::ProductId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::Quantity)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockMovements::OperatorId).string().null())
                    .col(ColumnDef::new(StockMovements::MachineId).string().null())
                    .col(ColumnDef::new(StockMovements::TaskId).string().null())
                    .col(ColumnDef::new(StockMovements::ReservationId).uuid().null())
                    .col(ColumnDef::new(StockMovements::AdjustmentId).uuid().null())
                    .col(
                        ColumnDef::new(StockMovements::PerformedBy)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::OperationDate)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::UnitCost)
                            .decimal_len(16, 4)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockMovements::TotalCost)
                            .decimal_len(16, 4)
                            .null(),
                    )
                    .col(ColumnDef::new(StockMovements::Notes).text().null())
                    .col(
                        ColumnDef::new(StockMovements::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_movements_org_product_date")
                    .table(StockMovements::Table)
                    .col(StockMovements::OrganizationId)
                    .col(StockMovements::ProductId)
                    .col((StockMovements::OperationDate, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_movements_machine")
                    .table(StockMovements::Table)
                    .col(StockMovements::MachineId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_movements_task")
                    .table(StockMovements::Table)
                    .col(StockMovements::TaskId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockMovements::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockMovements {
    Table,
    Id,
    OrganizationId,
    MovementType,
    ProductId,
    Quantity,
    OperatorId,
    MachineId,
    TaskId,
    ReservationId,
    AdjustmentId,
    PerformedBy,
    OperationDate,
    UnitCost,
    TotalCost,
    Notes,
    CreatedAt,
}
