use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StockAdjustments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockAdjustments::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::OrganizationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::Number)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::InventoryLevel)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::ReferenceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::ProductId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::AdjustmentType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::SystemQuantity)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::ActualQuantity)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::Difference)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::IsApproved)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(StockAdjustments::ApprovedBy).string().null())
                    .col(
                        ColumnDef::new(StockAdjustments::ApprovedAt)
                            .timestamp()
                            .null(),
                    )
                    .col(ColumnDef::new(StockAdjustments::MovementId).uuid().null())
                    .col(ColumnDef::new(StockAdjustments::CountId).uuid().null())
                    .col(ColumnDef::new(StockAdjustments::Reason).string().null())
                    .col(
                        ColumnDef::new(StockAdjustments::CreatedBy)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockAdjustments::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_adjustments_number")
                    .table(StockAdjustments::Table)
                    .col(StockAdjustments::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_adjustments_org_product")
                    .table(StockAdjustments::Table)
                    .col(StockAdjustments::OrganizationId)
                    .col(StockAdjustments::ProductId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InventoryCounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InventoryCounts::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::OrganizationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::Number)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::InventoryLevel)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::ReferenceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::Status)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::CreatedBy)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::CompletedBy)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::StartedAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::CompletedAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCounts::UpdatedAt)
                            .timestamp()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_inventory_counts_number")
                    .table(InventoryCounts::Table)
                    .col(InventoryCounts::Number)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(InventoryCountItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InventoryCountItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCountItems::CountId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCountItems::ProductId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCountItems::SystemQuantity)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCountItems::CountedQuantity)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InventoryCountItems::CountedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_inventory_count_items_count_product")
                    .table(InventoryCountItems::Table)
                    .col(InventoryCountItems::CountId)
                    .col(InventoryCountItems::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(InventoryCountItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(InventoryCounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StockAdjustments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockAdjustments {
    Table,
    Id,
    OrganizationId,
    Number,
    InventoryLevel,
    ReferenceId,
    ProductId,
    AdjustmentType,
    SystemQuantity,
    ActualQuantity,
    Difference,
    IsApproved,
    ApprovedBy,
    ApprovedAt,
    MovementId,
    CountId,
    Reason,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum InventoryCounts {
    Table,
    Id,
    OrganizationId,
    Number,
    InventoryLevel,
    ReferenceId,
    Status,
    CreatedBy,
    CompletedBy,
    StartedAt,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum InventoryCountItems {
    Table,
    Id,
    CountId,
    ProductId,
    SystemQuantity,
    CountedQuantity,
    CountedAt,
}
