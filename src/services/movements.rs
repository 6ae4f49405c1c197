//! Movement Log: the append-only system of record. `record` is the
//! only write path, called inside the mutating service's transaction so
//! the balance change and its audit row commit or roll back together.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::entities::stock_movement::{self, Entity as StockMovement, MovementType};
use crate::errors::ServiceError;

/// All the linkage a movement row can carry. Construct with
/// [`NewMovement::new`] and fill the optional fields by struct update.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub organization_id: String,
    pub movement_type: MovementType,
    pub product_id: String,
    pub quantity: i32,
    pub operator_id: Option<String>,
    pub machine_id: Option<String>,
    pub task_id: Option<String>,
    pub reservation_id: Option<Uuid>,
    pub adjustment_id: Option<Uuid>,
    pub performed_by: String,
    /// Defaults to now; may be backdated for late-ingested operations.
    pub operation_date: Option<DateTime<Utc>>,
    pub unit_cost: Option<Decimal>,
    pub notes: Option<String>,
}

impl NewMovement {
    pub fn new(
        organization_id: impl Into<String>,
        movement_type: MovementType,
        product_id: impl Into<String>,
        quantity: i32,
        performed_by: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            movement_type,
            product_id: product_id.into(),
            quantity,
            operator_id: None,
            machine_id: None,
            task_id: None,
            reservation_id: None,
            adjustment_id: None,
            performed_by: performed_by.into(),
            operation_date: None,
            unit_cost: None,
            notes: None,
        }
    }
}

/// Inserts one movement row. There is deliberately no update or delete
/// counterpart anywhere in the crate.
pub(crate) async fn record(
    txn: &DatabaseTransaction,
    movement: NewMovement,
) -> Result<stock_movement::Model, ServiceError> {
    let total_cost = movement
        .unit_cost
        .map(|unit| unit * Decimal::from(movement.quantity));

    let row = stock_movement::ActiveModel {
        organization_id: Set(movement.organization_id),
        movement_type: Set(movement.movement_type.as_str().to_string()),
        product_id: Set(movement.product_id),
        quantity: Set(movement.quantity),
        operator_id: Set(movement.operator_id),
        machine_id: Set(movement.machine_id),
        task_id: Set(movement.task_id),
        reservation_id: Set(movement.reservation_id),
        adjustment_id: Set(movement.adjustment_id),
        performed_by: Set(movement.performed_by),
        operation_date: Set(movement.operation_date.unwrap_or_else(Utc::now)),
        unit_cost: Set(movement.unit_cost),
        total_cost: Set(total_cost),
        notes: Set(movement.notes),
        ..Default::default()
    };

    row.insert(txn).await.map_err(ServiceError::db_error)
}

/// Read-only queries over the movement log, consumed by the reporting
/// subsystem.
#[derive(Clone)]
pub struct MovementService {
    db_pool: Arc<DatabaseConnection>,
}

impl MovementService {
    pub fn new(db_pool: Arc<DatabaseConnection>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn list_for_product(
        &self,
        organization_id: &str,
        product_id: &str,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_movement::Model>, u64), ServiceError> {
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

        let paginator = StockMovement::find()
            .filter(stock_movement::Column::OrganizationId.eq(organization_id))
            .filter(stock_movement::Column::ProductId.eq(product_id))
            .order_by_desc(stock_movement::Column::OperationDate)
            .paginate(self.db_pool.as_ref(), limit);

        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;
        Ok((items, total))
    }

    /// Movement history of one machine, newest first.
    #[instrument(skip(self))]
    pub async fn list_for_machine(
        &self,
        organization_id: &str,
        machine_id: &str,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        StockMovement::find()
            .filter(stock_movement::Column::OrganizationId.eq(organization_id))
            .filter(stock_movement::Column::MachineId.eq(machine_id))
            .order_by_desc(stock_movement::Column::OperationDate)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Every movement linked to one task (reservation lifecycle plus
    /// the transfers executed against it).
    #[instrument(skip(self))]
    pub async fn list_for_task(
        &self,
        organization_id: &str,
        task_id: &str,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        StockMovement::find()
            .filter(stock_movement::Column::OrganizationId.eq(organization_id))
            .filter(stock_movement::Column::TaskId.eq(task_id))
            .order_by_desc(stock_movement::Column::OperationDate)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }
}
