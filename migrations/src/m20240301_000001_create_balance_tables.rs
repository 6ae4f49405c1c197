use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Central warehouse stock, one row per (organization, product)
        manager
            .create_table(
                Table::create()
                    .table(WarehouseBalances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WarehouseBalances::Id)
                            .big_integer()
                            .auto_increment()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WarehouseBalances::OrganizationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WarehouseBalances::ProductId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WarehouseBalances::CurrentQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WarehouseBalances::ReservedQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WarehouseBalances::MinStockLevel)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WarehouseBalances::MaxStockLevel)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WarehouseBalances::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WarehouseBalances::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_warehouse_balances_org_product")
                    .table(WarehouseBalances::Table)
                    .col(WarehouseBalances::OrganizationId)
                    .col(WarehouseBalances::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Stock carried by field operators, created lazily on first transfer
        manager
            .create_table(
                Table::create()
                    .table(OperatorBalances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OperatorBalances::Id)
                            .big_integer()
                            .auto_increment()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OperatorBalances::OrganizationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OperatorBalances::OperatorId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OperatorBalances::ProductId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OperatorBalances::CurrentQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OperatorBalances::ReservedQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OperatorBalances::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OperatorBalances::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_operator_balances_org_operator_product")
                    .table(OperatorBalances::Table)
                    .col(OperatorBalances::OrganizationId)
                    .col(OperatorBalances::OperatorId)
                    .col(OperatorBalances::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Stock inside individual machines; terminal level, no reservations
        manager
            .create_table(
                Table::create()
                    .table(MachineBalances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MachineBalances::Id)
                            .big_integer()
                            .auto_increment()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::OrganizationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::MachineId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::ProductId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MachineBalances::SlotCode).string().null())
                    .col(
                        ColumnDef::new(MachineBalances::CurrentQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::MinStockLevel)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::MaxCapacity)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::TotalSold)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::LastRefilledAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::LastSaleAt)
                            .timestamp()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MachineBalances::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_machine_balances_org_machine_product")
                    .table(MachineBalances::Table)
                    .col(MachineBalances::OrganizationId)
                    .col(MachineBalances::MachineId)
                    .col(MachineBalances::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MachineBalances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OperatorBalances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(WarehouseBalances::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WarehouseBalances {
    Table,
    Id,
    OrganizationId,
    ProductId,
    CurrentQuantity,
    ReservedQuantity,
    MinStockLevel,
    MaxStockLevel,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OperatorBalances {
    Table,
    Id,
    OrganizationId,
    OperatorId,
    ProductId,
    CurrentQuantity,
    ReservedQuantity,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum MachineBalances {
    Table,
    Id,
    OrganizationId,
    MachineId,
    ProductId,
    SlotCode,
    CurrentQuantity,
    MinStockLevel,
    MaxCapacity,
    TotalSold,
    LastRefilledAt,
    LastSaleAt,
    CreatedAt,
    UpdatedAt,
}
