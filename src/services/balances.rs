//! Quantity Store: read access to the three per-level balance tables
//! and the locked read-for-update helpers every mutating service goes
//! through.
//!
//! Balance rows are mutated only by the transfer, reservation and
//! stocktake services, always inside a transaction that holds the row
//! lock acquired here. Operations touching two rows must acquire them
//! in the fixed global order warehouse → operator → machine (ties by
//! scope id, then product id) so opposing transfers cannot deadlock.

use sea_orm::{
    ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use sea_orm::sea_query::Expr;
use std::sync::Arc;
use tracing::instrument;

use crate::db;
use crate::entities::{
    machine_balance::{self, Entity as MachineBalance},
    operator_balance::{self, Entity as OperatorBalance},
    warehouse_balance::{self, Entity as WarehouseBalance},
};
use crate::errors::ServiceError;

/// Read-only surface over the balance tables, used by controllers and
/// the reporting subsystem.
#[derive(Clone)]
pub struct BalanceService {
    db_pool: Arc<DatabaseConnection>,
}

impl BalanceService {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn warehouse_balance(
        &self,
        organization_id: &str,
        product_id: &str,
    ) -> Result<Option<warehouse_balance::Model>, ServiceError> {
        WarehouseBalance::find()
            .filter(warehouse_balance::Column::OrganizationId.eq(organization_id))
            .filter(warehouse_balance::Column::ProductId.eq(product_id))
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn operator_balance(
        &self,
        organization_id: &str,
        operator_id: &str,
        product_id: &str,
    ) -> Result<Option<operator_balance::Model>, ServiceError> {
        OperatorBalance::find()
            .filter(operator_balance::Column::OrganizationId.eq(organization_id))
            .filter(operator_balance::Column::OperatorId.eq(operator_id))
            .filter(operator_balance::Column::ProductId.eq(product_id))
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn machine_balance(
        &self,
        organization_id: &str,
        machine_id: &str,
        product_id: &str,
    ) -> Result<Option<machine_balance::Model>, ServiceError> {
        MachineBalance::find()
            .filter(machine_balance::Column::OrganizationId.eq(organization_id))
            .filter(machine_balance::Column::MachineId.eq(machine_id))
            .filter(machine_balance::Column::ProductId.eq(product_id))
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Lists warehouse stock for an organization with pagination.
    #[instrument(skip(self))]
    pub async fn list_warehouse_balances(
        &self,
        organization_id: &str,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<warehouse_balance::Model>, u64), ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }
        if limit == 0 || limit > 1000 {
            return Err(ServiceError::ValidationError(
                "Limit must be between 1 and 1000".to_string(),
            ));
        }

        let paginator = WarehouseBalance::find()
            .filter(warehouse_balance::Column::OrganizationId.eq(organization_id))
            .order_by_asc(warehouse_balance::Column::ProductId)
            .paginate(self.db_pool.as_ref(), limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;
        Ok((items, total))
    }

    /// Everything an operator currently carries.
    #[instrument(skip(self))]
    pub async fn list_operator_balances(
        &self,
        organization_id: &str,
        operator_id: &str,
    ) -> Result<Vec<operator_balance::Model>, ServiceError> {
        OperatorBalance::find()
            .filter(operator_balance::Column::OrganizationId.eq(organization_id))
            .filter(operator_balance::Column::OperatorId.eq(operator_id))
            .order_by_asc(operator_balance::Column::ProductId)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Everything loaded in one machine.
    #[instrument(skip(self))]
    pub async fn list_machine_balances(
        &self,
        organization_id: &str,
        machine_id: &str,
    ) -> Result<Vec<machine_balance::Model>, ServiceError> {
        MachineBalance::find()
            .filter(machine_balance::Column::OrganizationId.eq(organization_id))
            .filter(machine_balance::Column::MachineId.eq(machine_id))
            .order_by_asc(machine_balance::Column::ProductId)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Machine rows at or below their minimum stock level, for refill
    /// planning. Includes negative balances left by sale ingestion.
    #[instrument(skip(self))]
    pub async fn low_stock_machines(
        &self,
        organization_id: &str,
    ) -> Result<Vec<machine_balance::Model>, ServiceError> {
        MachineBalance::find()
            .filter(machine_balance::Column::OrganizationId.eq(organization_id))
            .filter(
                Expr::col(machine_balance::Column::CurrentQuantity)
                    .lte(Expr::col(machine_balance::Column::MinStockLevel)),
            )
            .order_by_asc(machine_balance::Column::MachineId)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}

// Locked read helpers. Callers hold the returned row exclusively for
// the rest of their transaction; acquisition order across levels is the
// caller's responsibility (warehouse before operator before machine).

pub(crate) async fn find_warehouse_for_update(
    txn: &DatabaseTransaction,
    organization_id: &str,
    product_id: &str,
) -> Result<Option<warehouse_balance::Model>, ServiceError> {
    let mut query = WarehouseBalance::find()
        .filter(warehouse_balance::Column::OrganizationId.eq(organization_id))
        .filter(warehouse_balance::Column::ProductId.eq(product_id));
    if db::supports_row_locks(sea_orm::ConnectionTrait::get_database_backend(txn)) {
        query = query.lock_exclusive();
    }
    query.one(txn).await.map_err(ServiceError::db_error)
}

pub(crate) async fn find_operator_for_update(
    txn: &DatabaseTransaction,
    organization_id: &str,
    operator_id: &str,
    product_id: &str,
) -> Result<Option<operator_balance::Model>, ServiceError> {
    let mut query = OperatorBalance::find()
        .filter(operator_balance::Column::OrganizationId.eq(organization_id))
        .filter(operator_balance::Column::OperatorId.eq(operator_id))
        .filter(operator_balance::Column::ProductId.eq(product_id));
    if db::supports_row_locks(sea_orm::ConnectionTrait::get_database_backend(txn)) {
        query = query.lock_exclusive();
    }
    query.one(txn).await.map_err(ServiceError::db_error)
}

pub(crate) async fn find_machine_for_update(
    txn: &DatabaseTransaction,
    organization_id: &str,
    machine_id: &str,
    product_id: &str,
) -> Result<Option<machine_balance::Model>, ServiceError> {
    let mut query = MachineBalance::find()
        .filter(machine_balance::Column::OrganizationId.eq(organization_id))
        .filter(machine_balance::Column::MachineId.eq(machine_id))
        .filter(machine_balance::Column::ProductId.eq(product_id));
    if db::supports_row_locks(sea_orm::ConnectionTrait::get_database_backend(txn)) {
        query = query.lock_exclusive();
    }
    query.one(txn).await.map_err(ServiceError::db_error)
}
