//! Stocktake workflow: count sessions, corrective adjustments and the
//! approval gate for large corrections.
//!
//! Corrections are absolute sets, never deltas: an adjustment records
//! the counted quantity and applying it writes that quantity over the
//! balance, so two people counting the same shelf cannot compound an
//! error.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::InventoryConfig;
use crate::db;
use crate::entities::{
    inventory_count::{self, CountStatus, Entity as InventoryCount},
    inventory_count_item::{self, Entity as InventoryCountItem},
    stock_adjustment::{self, AdjustmentType, BalanceLevel, Entity as StockAdjustment},
};
use crate::errors::{from_transaction_error, ServiceError};
use crate::events::{Event, EventSender};
use crate::services::balances::{
    find_machine_for_update, find_operator_for_update, find_warehouse_for_update,
};
use crate::services::generate_number;
use crate::services::transfers::apply_absolute_quantity;

/// One-off correction outside a count session (damage, theft, expiry).
#[derive(Debug, Clone)]
pub struct PostAdjustment {
    pub organization_id: String,
    pub level: BalanceLevel,
    /// Operator or machine id; ignored for warehouse-level corrections.
    pub reference_id: String,
    pub product_id: String,
    pub actual_quantity: i32,
    pub adjustment_type: AdjustmentType,
    pub reason: Option<String>,
    pub created_by: String,
}

#[derive(Clone)]
pub struct StocktakeService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    config: Arc<InventoryConfig>,
}

impl StocktakeService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: Arc<InventoryConfig>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            config,
        }
    }

    /// Opens a draft count session for one scope. Nothing is frozen or
    /// snapshotted yet; system quantities are captured per item as they
    /// are recorded.
    #[instrument(skip(self))]
    pub async fn create_count(
        &self,
        organization_id: &str,
        level: BalanceLevel,
        reference_id: &str,
        created_by: &str,
    ) -> Result<inventory_count::Model, ServiceError> {
        let organization_id = organization_id.to_string();
        let reference_id = reference_id.to_string();
        let created_by = created_by.to_string();

        db::retry_on_conflict(3, || {
            let organization_id = organization_id.clone();
            let reference_id = reference_id.clone();
            let created_by = created_by.clone();
            async move {
                let row = inventory_count::ActiveModel {
                    organization_id: Set(organization_id),
                    number: Set(generate_number("CNT")),
                    inventory_level: Set(level.as_str().to_string()),
                    reference_id: Set(reference_id),
                    status: Set(CountStatus::Draft.as_str().to_string()),
                    created_by: Set(created_by),
                    completed_by: Set(None),
                    started_at: Set(None),
                    completed_at: Set(None),
                    ..Default::default()
                };
                row.insert(self.db_pool.as_ref())
                    .await
                    .map_err(map_unique_to_conflict)
            }
        })
        .await
    }

    /// Moves a draft session to in_progress, opening it for item
    /// recording.
    #[instrument(skip(self))]
    pub async fn start_count(&self, id: Uuid) -> Result<inventory_count::Model, ServiceError> {
        self.db_pool
            .transaction::<_, inventory_count::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let count = find_count_for_update(txn, id).await?;
                    let status = parse_count_status(&count)?;
                    if status != CountStatus::Draft {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Count {} is {}, only draft counts can be started",
                            id, count.status
                        )));
                    }
                    let mut active: inventory_count::ActiveModel = count.into();
                    active.status = Set(CountStatus::InProgress.as_str().to_string());
                    active.started_at = Set(Some(Utc::now()));
                    active.update(txn).await.map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(from_transaction_error)
    }

    /// Records a counted quantity for one product in an in_progress
    /// session, snapshotting the current system quantity alongside it.
    /// Recording the same product again replaces the earlier line.
    #[instrument(skip(self))]
    pub async fn record_item(
        &self,
        count_id: Uuid,
        product_id: &str,
        counted_quantity: i32,
    ) -> Result<inventory_count_item::Model, ServiceError> {
        if counted_quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Counted quantity cannot be negative".to_string(),
            ));
        }
        let product = product_id.to_string();

        self.db_pool
            .transaction::<_, inventory_count_item::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let count = find_count_for_update(txn, count_id).await?;
                    let status = parse_count_status(&count)?;
                    if status != CountStatus::InProgress {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Count {} is {}, items can only be recorded while in progress",
                            count_id, count.status
                        )));
                    }

                    let level = parse_count_level(&count)?;
                    let system_quantity = read_system_quantity(
                        txn,
                        &count.organization_id,
                        level,
                        &count.reference_id,
                        &product,
                    )
                    .await?;

                    let existing = InventoryCountItem::find()
                        .filter(inventory_count_item::Column::CountId.eq(count_id))
                        .filter(inventory_count_item::Column::ProductId.eq(&product))
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?;

                    match existing {
                        Some(item) => {
                            let mut active: inventory_count_item::ActiveModel = item.into();
                            active.system_quantity = Set(system_quantity);
                            active.counted_quantity = Set(counted_quantity);
                            active.counted_at = Set(Utc::now());
                            active.update(txn).await.map_err(ServiceError::db_error)
                        }
                        None => {
                            let row = inventory_count_item::ActiveModel {
                                count_id: Set(count_id),
                                product_id: Set(product.clone()),
                                system_quantity: Set(system_quantity),
                                counted_quantity: Set(counted_quantity),
                                counted_at: Set(Utc::now()),
                                ..Default::default()
                            };
                            row.insert(txn).await.map_err(ServiceError::db_error)
                        }
                    }
                })
            })
            .await
            .map_err(from_transaction_error)
    }

    /// Closes an in_progress session. One transaction walks the items:
    /// every non-zero difference becomes an adjustment, and those under
    /// the approval threshold apply their absolute counted quantity to
    /// the balance immediately. Over-threshold adjustments persist
    /// unapproved and leave the balance alone until approval.
    #[instrument(skip(self))]
    pub async fn complete_count(
        &self,
        id: Uuid,
        completed_by: &str,
    ) -> Result<(inventory_count::Model, Vec<stock_adjustment::Model>), ServiceError> {
        let completed_by = completed_by.to_string();
        let config = Arc::clone(&self.config);

        let (count, adjustments) = self
            .db_pool
            .transaction::<_, (inventory_count::Model, Vec<stock_adjustment::Model>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let count = find_count_for_update(txn, id).await?;
                        let status = parse_count_status(&count)?;
                        if status != CountStatus::InProgress {
                            return Err(ServiceError::InvalidOperation(format!(
                                "Count {} is {}, only in-progress counts can be completed",
                                id, count.status
                            )));
                        }
                        let level = parse_count_level(&count)?;

                        let items = InventoryCountItem::find()
                            .filter(inventory_count_item::Column::CountId.eq(id))
                            .order_by_asc(inventory_count_item::Column::ProductId)
                            .all(txn)
                            .await
                            .map_err(ServiceError::db_error)?;

                        let mut adjustments = Vec::new();
                        for item in items {
                            let difference = item.difference();
                            if difference == 0 {
                                continue;
                            }
                            // The live quantity may have drifted since
                            // the item snapshot; a drift that closed
                            // the gap means there is nothing to fix.
                            if let Some(adjustment) = post_adjustment_in_txn(
                                txn,
                                &config,
                                &count.organization_id,
                                level,
                                &count.reference_id,
                                &item.product_id,
                                item.counted_quantity,
                                AdjustmentType::Stocktake,
                                None,
                                &completed_by,
                                Some(id),
                            )
                            .await?
                            {
                                adjustments.push(adjustment);
                            }
                        }

                        let mut active: inventory_count::ActiveModel = count.into();
                        active.status = Set(CountStatus::Completed.as_str().to_string());
                        active.completed_by = Set(Some(completed_by.clone()));
                        active.completed_at = Set(Some(Utc::now()));
                        let count = active.update(txn).await.map_err(ServiceError::db_error)?;
                        Ok((count, adjustments))
                    })
                },
            )
            .await
            .map_err(from_transaction_error)?;

        info!(
            count_id = %count.id,
            adjustments = adjustments.len(),
            "stocktake completed"
        );
        for adjustment in &adjustments {
            self.emit_adjustment_posted(adjustment).await;
        }
        if let Err(e) = self
            .event_sender
            .send(Event::CountCompleted {
                count_id: count.id,
                organization_id: count.organization_id.clone(),
                adjustments_posted: adjustments.len(),
                completed_at: count.completed_at.unwrap_or_else(Utc::now),
            })
            .await
        {
            warn!(error = %e, "failed to publish count-completed event");
        }
        Ok((count, adjustments))
    }

    /// Abandons a draft or in-progress session. Recorded items are kept
    /// for audit; no adjustments are posted.
    #[instrument(skip(self))]
    pub async fn cancel_count(&self, id: Uuid) -> Result<inventory_count::Model, ServiceError> {
        self.db_pool
            .transaction::<_, inventory_count::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let count = find_count_for_update(txn, id).await?;
                    let status = parse_count_status(&count)?;
                    if status.is_terminal() {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Count {} is already {}",
                            id, count.status
                        )));
                    }
                    let mut active: inventory_count::ActiveModel = count.into();
                    active.status = Set(CountStatus::Cancelled.as_str().to_string());
                    active.update(txn).await.map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(from_transaction_error)
    }

    /// Posts a one-off correction outside any count session, subject to
    /// the same approval gate as stocktake adjustments.
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn post_adjustment(
        &self,
        input: PostAdjustment,
    ) -> Result<stock_adjustment::Model, ServiceError> {
        if input.actual_quantity < 0 && input.level != BalanceLevel::Machine {
            return Err(ServiceError::ValidationError(
                "Actual quantity cannot be negative outside machine balances".to_string(),
            ));
        }
        let config = Arc::clone(&self.config);

        let adjustment = self
            .db_pool
            .transaction::<_, stock_adjustment::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    post_adjustment_in_txn(
                        txn,
                        &config,
                        &input.organization_id,
                        input.level,
                        &input.reference_id,
                        &input.product_id,
                        input.actual_quantity,
                        input.adjustment_type,
                        input.reason.clone(),
                        &input.created_by,
                        None,
                    )
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InvalidOperation(format!(
                            "Counted quantity for product {} matches the system, nothing to adjust",
                            input.product_id
                        ))
                    })
                })
            })
            .await
            .map_err(from_transaction_error)?;

        self.emit_adjustment_posted(&adjustment).await;
        Ok(adjustment)
    }

    /// Applies a deferred adjustment. The counted quantity recorded at
    /// posting time is written as-is; stock that moved since then shows
    /// up at the next count rather than silently skewing this one.
    #[instrument(skip(self))]
    pub async fn approve_adjustment(
        &self,
        id: Uuid,
        approved_by: &str,
    ) -> Result<stock_adjustment::Model, ServiceError> {
        let approved_by = approved_by.to_string();

        let adjustment = self
            .db_pool
            .transaction::<_, stock_adjustment::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let adjustment = find_adjustment_for_update(txn, id).await?;
                    if adjustment.is_approved {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Adjustment {} is already approved",
                            id
                        )));
                    }
                    let level = BalanceLevel::from_str(&adjustment.inventory_level)
                        .ok_or_else(|| {
                            ServiceError::InternalError(format!(
                                "Adjustment {} has unknown inventory level {}",
                                id, adjustment.inventory_level
                            ))
                        })?;

                    let (movement, _) = apply_absolute_quantity(
                        txn,
                        &adjustment.organization_id,
                        level,
                        &adjustment.reference_id,
                        &adjustment.product_id,
                        adjustment.actual_quantity,
                        &approved_by,
                        adjustment.id,
                    )
                    .await?;

                    let mut active: stock_adjustment::ActiveModel = adjustment.into();
                    active.is_approved = Set(true);
                    active.approved_by = Set(Some(approved_by.clone()));
                    active.approved_at = Set(Some(Utc::now()));
                    active.movement_id = Set(Some(movement.id));
                    active.update(txn).await.map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(adjustment_id = %adjustment.id, "adjustment approved and applied");
        self.emit_adjustment_posted(&adjustment).await;
        Ok(adjustment)
    }

    #[instrument(skip(self))]
    pub async fn get_count(
        &self,
        id: Uuid,
    ) -> Result<(inventory_count::Model, Vec<inventory_count_item::Model>), ServiceError> {
        let count = InventoryCount::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Count {} not found", id)))?;
        let items = InventoryCountItem::find()
            .filter(inventory_count_item::Column::CountId.eq(id))
            .order_by_asc(inventory_count_item::Column::ProductId)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        Ok((count, items))
    }

    #[instrument(skip(self))]
    pub async fn get_adjustment(
        &self,
        id: Uuid,
    ) -> Result<stock_adjustment::Model, ServiceError> {
        StockAdjustment::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Adjustment {} not found", id)))
    }

    /// Adjustments still waiting for approval, oldest first.
    #[instrument(skip(self))]
    pub async fn pending_adjustments(
        &self,
        organization_id: &str,
    ) -> Result<Vec<stock_adjustment::Model>, ServiceError> {
        StockAdjustment::find()
            .filter(stock_adjustment::Column::OrganizationId.eq(organization_id))
            .filter(stock_adjustment::Column::IsApproved.eq(false))
            .order_by_asc(stock_adjustment::Column::CreatedAt)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    async fn emit_adjustment_posted(&self, adjustment: &stock_adjustment::Model) {
        if let Err(e) = self
            .event_sender
            .send(Event::AdjustmentPosted {
                adjustment_id: adjustment.id,
                organization_id: adjustment.organization_id.clone(),
                product_id: adjustment.product_id.clone(),
                difference: adjustment.difference,
                applied: adjustment.is_approved,
            })
            .await
        {
            warn!(error = %e, "failed to publish adjustment event");
        }
    }
}

/// Creates one adjustment row inside the caller's transaction, applying
/// it immediately unless the approval gate holds it back. Returns
/// `None` when the live quantity already matches the counted one.
#[allow(clippy::too_many_arguments)]
async fn post_adjustment_in_txn(
    txn: &DatabaseTransaction,
    config: &InventoryConfig,
    organization_id: &str,
    level: BalanceLevel,
    reference_id: &str,
    product_id: &str,
    actual_quantity: i32,
    adjustment_type: AdjustmentType,
    reason: Option<String>,
    created_by: &str,
    count_id: Option<Uuid>,
) -> Result<Option<stock_adjustment::Model>, ServiceError> {
    let system_quantity =
        read_system_quantity(txn, organization_id, level, reference_id, product_id).await?;
    let difference = actual_quantity - system_quantity;
    if difference == 0 {
        return Ok(None);
    }

    let adjustment_id = Uuid::new_v4();
    let needs_approval = config.adjustment_needs_approval(difference);

    let movement_id = if needs_approval {
        None
    } else {
        let (movement, _) = apply_absolute_quantity(
            txn,
            organization_id,
            level,
            reference_id,
            product_id,
            actual_quantity,
            created_by,
            adjustment_id,
        )
        .await?;
        Some(movement.id)
    };

    let row = stock_adjustment::ActiveModel {
        id: Set(adjustment_id),
        organization_id: Set(organization_id.to_string()),
        number: Set(generate_number("ADJ")),
        inventory_level: Set(level.as_str().to_string()),
        reference_id: Set(reference_id.to_string()),
        product_id: Set(product_id.to_string()),
        adjustment_type: Set(adjustment_type.as_str().to_string()),
        system_quantity: Set(system_quantity),
        actual_quantity: Set(actual_quantity),
        difference: Set(difference),
        is_approved: Set(!needs_approval),
        approved_by: Set(if needs_approval {
            None
        } else {
            Some(created_by.to_string())
        }),
        approved_at: Set(if needs_approval { None } else { Some(Utc::now()) }),
        movement_id: Set(movement_id),
        count_id: Set(count_id),
        reason: Set(reason),
        created_by: Set(created_by.to_string()),
        ..Default::default()
    };
    let adjustment = row.insert(txn).await.map_err(map_unique_to_conflict)?;
    Ok(Some(adjustment))
}

/// Current quantity at the targeted level, locking the row for the rest
/// of the transaction. A missing row counts as zero on hand.
async fn read_system_quantity(
    txn: &DatabaseTransaction,
    organization_id: &str,
    level: BalanceLevel,
    reference_id: &str,
    product_id: &str,
) -> Result<i32, ServiceError> {
    let quantity = match level {
        BalanceLevel::Warehouse => find_warehouse_for_update(txn, organization_id, product_id)
            .await?
            .map(|row| row.current_quantity),
        BalanceLevel::Operator => {
            find_operator_for_update(txn, organization_id, reference_id, product_id)
                .await?
                .map(|row| row.current_quantity)
        }
        BalanceLevel::Machine => {
            find_machine_for_update(txn, organization_id, reference_id, product_id)
                .await?
                .map(|row| row.current_quantity)
        }
    };
    Ok(quantity.unwrap_or(0))
}

async fn find_count_for_update(
    txn: &DatabaseTransaction,
    id: Uuid,
) -> Result<inventory_count::Model, ServiceError> {
    let mut query = InventoryCount::find_by_id(id);
    if db::supports_row_locks(sea_orm::ConnectionTrait::get_database_backend(txn)) {
        query = query.lock_exclusive();
    }
    query
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Count {} not found", id)))
}

async fn find_adjustment_for_update(
    txn: &DatabaseTransaction,
    id: Uuid,
) -> Result<stock_adjustment::Model, ServiceError> {
    let mut query = StockAdjustment::find_by_id(id);
    if db::supports_row_locks(sea_orm::ConnectionTrait::get_database_backend(txn)) {
        query = query.lock_exclusive();
    }
    query
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Adjustment {} not found", id)))
}

fn parse_count_status(count: &inventory_count::Model) -> Result<CountStatus, ServiceError> {
    CountStatus::from_str(&count.status).ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Count {} has unknown status {}",
            count.id, count.status
        ))
    })
}

fn parse_count_level(count: &inventory_count::Model) -> Result<BalanceLevel, ServiceError> {
    BalanceLevel::from_str(&count.inventory_level).ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Count {} has unknown inventory level {}",
            count.id, count.inventory_level
        ))
    })
}

fn map_unique_to_conflict(e: sea_orm::DbErr) -> ServiceError {
    if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        ServiceError::Conflict("Generated document number already taken".to_string())
    } else {
        ServiceError::db_error(e)
    }
}
