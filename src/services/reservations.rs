//! Reservation Manager: holds against available stock at the warehouse
//! or operator level, with fulfillment, cancellation and TTL expiry.
//!
//! A reservation never moves stock by itself. It raises the balance
//! row's `reserved_quantity`, shrinking what other callers can take,
//! and fulfillment later converts the hold into an actual decrement.

use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, Opts};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::InventoryConfig;
use crate::db;
use crate::entities::{
    operator_balance,
    stock_movement::MovementType,
    stock_reservation::{self, Entity as StockReservation, InventoryLevel, ReservationStatus},
    warehouse_balance,
};
use crate::errors::{from_transaction_error, ServiceError};
use crate::events::{Event, EventSender};
use crate::services::balances::{find_operator_for_update, find_warehouse_for_update};
use crate::services::movements::{self, NewMovement};
use crate::services::generate_number;

lazy_static! {
    static ref RESERVATIONS_CREATED: IntCounter = IntCounter::new(
        "stock_reservations_created_total",
        "Reservations placed against available stock"
    )
    .expect("metric can be created");
    static ref RESERVATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("stock_reservation_failures_total", "Rejected reservation requests"),
        &["error_type"]
    )
    .expect("metric can be created");
    static ref RESERVATIONS_EXPIRED: IntCounter = IntCounter::new(
        "stock_reservations_expired_total",
        "Reservations released by the expiry sweeper"
    )
    .expect("metric can be created");
}

/// Request to place a hold. Warehouse-level holds reserve out of the
/// organization's warehouse; operator-level holds require the operator.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct ReserveStock {
    #[validate(length(min = 1))]
    pub organization_id: String,
    /// Service task this hold backs; the natural lookup key.
    #[validate(length(min = 1))]
    pub task_id: String,
    #[validate(length(min = 1))]
    pub product_id: String,
    pub inventory_level: InventoryLevel,
    pub operator_id: Option<String>,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1))]
    pub requested_by: String,
    /// Overrides the configured default TTL when set.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepOutcome {
    pub expired_count: usize,
    /// Candidates that turned terminal between the scan and the lock.
    pub skipped_count: usize,
    pub swept_at: DateTime<Utc>,
}

/// Aggregate view of an organization's open holds.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationStats {
    pub active_count: u64,
    pub active_quantity: i64,
}

#[derive(Clone)]
pub struct ReservationService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    config: Arc<InventoryConfig>,
}

impl ReservationService {
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

    /// Places a hold. A missing balance row is reported as insufficient
    /// stock, not as a lookup failure: from the caller's point of view
    /// there is simply nothing to reserve. Retries the generated
    /// reservation number on a unique-index collision.
    #[instrument(skip(self, input), fields(task_id = %input.task_id, product_id = %input.product_id))]
    pub async fn reserve(
        &self,
        input: ReserveStock,
    ) -> Result<stock_reservation::Model, ServiceError> {
        input.validate().map_err(|e| {
            RESERVATION_FAILURES
                .with_label_values(&["validation_error"])
                .inc();
            ServiceError::from(e)
        })?;
        if input.inventory_level == InventoryLevel::Operator && input.operator_id.is_none() {
            RESERVATION_FAILURES
                .with_label_values(&["validation_error"])
                .inc();
            return Err(ServiceError::ValidationError(
                "operator_id is required for operator-level reservations".to_string(),
            ));
        }

        let expires_at = input.expires_at.unwrap_or_else(|| {
            Utc::now() + Duration::hours(self.config.default_reservation_ttl_hours)
        });

        let reservation = db::retry_on_conflict(3, || {
            let input = input.clone();
            async move { self.try_reserve(input, expires_at).await }
        })
        .await
        .map_err(|e| {
            RESERVATION_FAILURES
                .with_label_values(&[match &e {
                    ServiceError::InsufficientStock(_) => "insufficient_stock",
                    ServiceError::Conflict(_) => "number_conflict",
                    _ => "other",
                }])
                .inc();
            e
        })?;

        RESERVATIONS_CREATED.inc();
        info!(
            reservation_id = %reservation.id,
            number = %reservation.number,
            quantity = reservation.quantity_reserved,
            "stock reserved"
        );
        if let Err(e) = self
            .event_sender
            .send(Event::StockReserved {
                reservation_id: reservation.id,
                organization_id: reservation.organization_id.clone(),
                product_id: reservation.product_id.clone(),
                quantity: reservation.quantity_reserved,
                task_id: reservation.task_id.clone(),
            })
            .await
        {
            warn!(error = %e, "failed to publish reservation event");
        }
        Ok(reservation)
    }

    async fn try_reserve(
        &self,
        input: ReserveStock,
        expires_at: DateTime<Utc>,
    ) -> Result<stock_reservation::Model, ServiceError> {
        let number = generate_number("RSV");
        self.db_pool
            .transaction::<_, stock_reservation::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let reference_id = match input.inventory_level {
                        InventoryLevel::Warehouse => input.organization_id.clone(),
                        InventoryLevel::Operator => {
                            input.operator_id.clone().unwrap_or_default()
                        }
                    };

                    raise_reserved(
                        txn,
                        &input.organization_id,
                        input.inventory_level,
                        &reference_id,
                        &input.product_id,
                        input.quantity,
                    )
                    .await?;

                    let row = stock_reservation::ActiveModel {
                        organization_id: Set(input.organization_id.clone()),
                        number: Set(number.clone()),
                        task_id: Set(input.task_id.clone()),
                        product_id: Set(input.product_id.clone()),
                        inventory_level: Set(input.inventory_level.as_str().to_string()),
                        reference_id: Set(reference_id),
                        quantity_reserved: Set(input.quantity),
                        quantity_fulfilled: Set(0),
                        status: Set(ReservationStatus::Pending.as_str().to_string()),
                        reserved_at: Set(Utc::now()),
                        expires_at: Set(Some(expires_at)),
                        fulfilled_at: Set(None),
                        cancelled_at: Set(None),
                        cancel_reason: Set(None),
                        ..Default::default()
                    };
                    let reservation = match row.insert(txn).await {
                        Ok(model) => model,
                        Err(e) => {
                            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                                return Err(ServiceError::Conflict(format!(
                                    "Reservation number {} already taken",
                                    number
                                )));
                            }
                            return Err(ServiceError::db_error(e));
                        }
                    };

                    let mut movement = NewMovement::new(
                        input.organization_id.clone(),
                        MovementType::ReservationCreated,
                        input.product_id.clone(),
                        input.quantity,
                        input.requested_by.clone(),
                    );
                    movement.task_id = Some(input.task_id.clone());
                    movement.reservation_id = Some(reservation.id);
                    if input.inventory_level == InventoryLevel::Operator {
                        movement.operator_id = input.operator_id.clone();
                    }
                    movements::record(txn, movement).await?;

                    Ok(reservation)
                })
            })
            .await
            .map_err(from_transaction_error)
    }

    /// Acknowledges a pending hold. Pending and confirmed weigh on the
    /// balance identically; confirmation only marks that a human or a
    /// downstream system has seen the task.
    #[instrument(skip(self))]
    pub async fn confirm(&self, id: Uuid) -> Result<stock_reservation::Model, ServiceError> {
        self.db_pool
            .transaction::<_, stock_reservation::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let reservation = find_reservation_for_update(txn, id).await?;
                    let status = parse_status(&reservation)?;
                    if status != ReservationStatus::Pending {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Reservation {} is {}, only pending reservations can be confirmed",
                            id, reservation.status
                        )));
                    }
                    let mut active: stock_reservation::ActiveModel = reservation.into();
                    active.status = Set(ReservationStatus::Confirmed.as_str().to_string());
                    active.update(txn).await.map_err(ServiceError::db_error)
                })
            })
            .await
            .map_err(from_transaction_error)
    }

    /// Converts part or all of a hold into a real decrement: the
    /// reserved quantity and the current quantity both drop, so the
    /// available quantity other callers see does not change.
    #[instrument(skip(self))]
    pub async fn fulfill(
        &self,
        id: Uuid,
        quantity: i32,
        performed_by: &str,
    ) -> Result<stock_reservation::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be greater than 0".to_string(),
            ));
        }
        let performed_by = performed_by.to_string();

        let reservation = self
            .db_pool
            .transaction::<_, stock_reservation::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let reservation = find_reservation_for_update(txn, id).await?;
                    let status = parse_status(&reservation)?;
                    if !status.is_active() {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Reservation {} is {} and cannot be fulfilled",
                            id, reservation.status
                        )));
                    }
                    let remaining = reservation.quantity_remaining();
                    if quantity > remaining {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Cannot fulfill {} units, only {} remain reserved",
                            quantity, remaining
                        )));
                    }

                    consume_reserved(txn, &reservation, quantity).await?;

                    let fulfilled = reservation.quantity_fulfilled + quantity;
                    let fully = fulfilled == reservation.quantity_reserved;
                    let reservation_id = reservation.id;
                    let mut movement = NewMovement::new(
                        reservation.organization_id.clone(),
                        MovementType::ReservationFulfilled,
                        reservation.product_id.clone(),
                        quantity,
                        performed_by.clone(),
                    );
                    movement.task_id = Some(reservation.task_id.clone());
                    movement.reservation_id = Some(reservation_id);

                    let mut active: stock_reservation::ActiveModel = reservation.into();
                    active.quantity_fulfilled = Set(fulfilled);
                    active.status = Set(if fully {
                        ReservationStatus::Fulfilled.as_str().to_string()
                    } else {
                        ReservationStatus::PartiallyFulfilled.as_str().to_string()
                    });
                    if fully {
                        active.fulfilled_at = Set(Some(Utc::now()));
                    }
                    let updated = active.update(txn).await.map_err(ServiceError::db_error)?;

                    movements::record(txn, movement).await?;
                    Ok(updated)
                })
            })
            .await
            .map_err(from_transaction_error)?;

        let fully = reservation.quantity_fulfilled == reservation.quantity_reserved;
        if let Err(e) = self
            .event_sender
            .send(Event::ReservationFulfilled {
                reservation_id: reservation.id,
                quantity,
                fully_fulfilled: fully,
            })
            .await
        {
            warn!(error = %e, "failed to publish fulfillment event");
        }
        Ok(reservation)
    }

    /// Releases the unfulfilled remainder of an active hold. Quantity
    /// already fulfilled stays consumed.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        id: Uuid,
        reason: Option<String>,
        performed_by: &str,
    ) -> Result<stock_reservation::Model, ServiceError> {
        let performed_by = performed_by.to_string();
        let (reservation, released) = self
            .db_pool
            .transaction::<_, (stock_reservation::Model, i32), ServiceError>(move |txn| {
                Box::pin(async move {
                    let reservation = find_reservation_for_update(txn, id).await?;
                    let status = parse_status(&reservation)?;
                    if !status.is_active() {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Reservation {} is {} and cannot be cancelled",
                            id, reservation.status
                        )));
                    }
                    let released = release_remainder(
                        txn,
                        &reservation,
                        ReservationStatus::Cancelled,
                        reason,
                        &performed_by,
                    )
                    .await?;
                    Ok(released)
                })
            })
            .await
            .map_err(from_transaction_error)?;

        info!(reservation_id = %reservation.id, released, "reservation cancelled");
        if let Err(e) = self
            .event_sender
            .send(Event::ReservationCancelled {
                reservation_id: reservation.id,
                released_quantity: released,
            })
            .await
        {
            warn!(error = %e, "failed to publish cancellation event");
        }
        Ok(reservation)
    }

    /// Expires every active reservation whose deadline has passed. Each
    /// candidate gets its own transaction and its status is re-checked
    /// under the lock, so a concurrent fulfillment between the scan and
    /// the sweep wins and the candidate is skipped. Safe to run
    /// concurrently with itself.
    #[instrument(skip(self))]
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<SweepOutcome, ServiceError> {
        let candidates: Vec<Uuid> = StockReservation::find()
            .filter(stock_reservation::Column::Status.is_in(ReservationStatus::ACTIVE))
            .filter(stock_reservation::Column::ExpiresAt.lte(now))
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let mut expired = Vec::new();
        let mut skipped = 0usize;
        for id in candidates {
            let outcome = self
                .db_pool
                .transaction::<_, Option<(Uuid, i32)>, ServiceError>(move |txn| {
                    Box::pin(async move {
                        let reservation = match find_reservation_for_update(txn, id).await {
                            Ok(r) => r,
                            Err(ServiceError::NotFound(_)) => return Ok(None),
                            Err(e) => return Err(e),
                        };
                        let status = parse_status(&reservation)?;
                        let due = reservation
                            .expires_at
                            .map(|at| at <= now)
                            .unwrap_or(false);
                        if !status.is_active() || !due {
                            return Ok(None);
                        }
                        let (_, released) = release_remainder(
                            txn,
                            &reservation,
                            ReservationStatus::Expired,
                            Some("reservation TTL elapsed".to_string()),
                            "system",
                        )
                        .await?;
                        Ok(Some((id, released)))
                    })
                })
                .await
                .map_err(from_transaction_error)?;

            match outcome {
                Some(entry) => expired.push(entry),
                None => skipped += 1,
            }
        }

        for (reservation_id, released_quantity) in &expired {
            RESERVATIONS_EXPIRED.inc();
            if let Err(e) = self
                .event_sender
                .send(Event::ReservationExpired {
                    reservation_id: *reservation_id,
                    released_quantity: *released_quantity,
                })
                .await
            {
                warn!(error = %e, "failed to publish expiry event");
            }
        }

        let outcome = SweepOutcome {
            expired_count: expired.len(),
            skipped_count: skipped,
            swept_at: now,
        };
        if outcome.expired_count > 0 {
            info!(
                expired = outcome.expired_count,
                skipped = outcome.skipped_count,
                "expired overdue reservations"
            );
        }
        Ok(outcome)
    }

    /// Background sweeper running [`Self::expire_due`] on the configured
    /// interval until the process exits.
    pub fn spawn_expiry_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = std::time::Duration::from_secs(self.config.reservation_sweep_interval_secs);
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "reservation expiry sweeper started");
            loop {
                tokio::time::sleep(interval).await;
                if let Err(e) = self.expire_due(Utc::now()).await {
                    error!(error = %e, "reservation expiry sweep failed");
                }
            }
        })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<stock_reservation::Model, ServiceError> {
        StockReservation::find_by_id(id)
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Reservation {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn get_by_number(
        &self,
        number: &str,
    ) -> Result<stock_reservation::Model, ServiceError> {
        StockReservation::find()
            .filter(stock_reservation::Column::Number.eq(number))
            .one(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Reservation {} not found", number)))
    }

    /// All reservations placed for one task, oldest first.
    #[instrument(skip(self))]
    pub async fn list_for_task(
        &self,
        organization_id: &str,
        task_id: &str,
    ) -> Result<Vec<stock_reservation::Model>, ServiceError> {
        StockReservation::find()
            .filter(stock_reservation::Column::OrganizationId.eq(organization_id))
            .filter(stock_reservation::Column::TaskId.eq(task_id))
            .order_by_asc(stock_reservation::Column::ReservedAt)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Open-hold totals for one organization.
    #[instrument(skip(self))]
    pub async fn stats(&self, organization_id: &str) -> Result<ReservationStats, ServiceError> {
        let active = StockReservation::find()
            .filter(stock_reservation::Column::OrganizationId.eq(organization_id))
            .filter(stock_reservation::Column::Status.is_in(ReservationStatus::ACTIVE))
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;
        Ok(ReservationStats {
            active_count: active.len() as u64,
            active_quantity: active
                .iter()
                .map(|r| i64::from(r.quantity_remaining()))
                .sum(),
        })
    }
}

async fn find_reservation_for_update(
    txn: &DatabaseTransaction,
    id: Uuid,
) -> Result<stock_reservation::Model, ServiceError> {
    let mut query = StockReservation::find_by_id(id);
    if db::supports_row_locks(sea_orm::ConnectionTrait::get_database_backend(txn)) {
        query = query.lock_exclusive();
    }
    query
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Reservation {} not found", id)))
}

fn parse_status(reservation: &stock_reservation::Model) -> Result<ReservationStatus, ServiceError> {
    ReservationStatus::from_str(&reservation.status).ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Reservation {} has unknown status {}",
            reservation.id, reservation.status
        ))
    })
}

fn parse_level(reservation: &stock_reservation::Model) -> Result<InventoryLevel, ServiceError> {
    InventoryLevel::from_str(&reservation.inventory_level).ok_or_else(|| {
        ServiceError::InternalError(format!(
            "Reservation {} has unknown inventory level {}",
            reservation.id, reservation.inventory_level
        ))
    })
}

/// Raises `reserved_quantity` on the targeted balance row after the
/// availability check. A missing row means nothing is available.
async fn raise_reserved(
    txn: &DatabaseTransaction,
    organization_id: &str,
    level: InventoryLevel,
    reference_id: &str,
    product_id: &str,
    quantity: i32,
) -> Result<(), ServiceError> {
    match level {
        InventoryLevel::Warehouse => {
            let row = find_warehouse_for_update(txn, organization_id, product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::InsufficientStock(format!(
                        "No warehouse stock for product {}: available 0, requested {}",
                        product_id, quantity
                    ))
                })?;
            if row.available_quantity() < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient warehouse stock for product {}: available {}, requested {}",
                    product_id,
                    row.available_quantity(),
                    quantity
                )));
            }
            let mut active: warehouse_balance::ActiveModel = row.clone().into();
            active.reserved_quantity = Set(row.reserved_quantity + quantity);
            active.update(txn).await.map_err(ServiceError::db_error)?;
        }
        InventoryLevel::Operator => {
            let row = find_operator_for_update(txn, organization_id, reference_id, product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::InsufficientStock(format!(
                        "Operator {} holds no stock of product {}: available 0, requested {}",
                        reference_id, product_id, quantity
                    ))
                })?;
            if row.available_quantity() < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient operator stock for product {}: available {}, requested {}",
                    product_id,
                    row.available_quantity(),
                    quantity
                )));
            }
            let mut active: operator_balance::ActiveModel = row.clone().into();
            active.reserved_quantity = Set(row.reserved_quantity + quantity);
            active.update(txn).await.map_err(ServiceError::db_error)?;
        }
    }
    Ok(())
}

/// Fulfillment: both `reserved_quantity` and `current_quantity` drop,
/// leaving the derived available quantity unchanged for everyone else.
async fn consume_reserved(
    txn: &DatabaseTransaction,
    reservation: &stock_reservation::Model,
    quantity: i32,
) -> Result<(), ServiceError> {
    match parse_level(reservation)? {
        InventoryLevel::Warehouse => {
            let row = find_warehouse_for_update(
                txn,
                &reservation.organization_id,
                &reservation.product_id,
            )
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Warehouse balance missing for reserved product {}",
                    reservation.product_id
                ))
            })?;
            let mut active: warehouse_balance::ActiveModel = row.clone().into();
            active.reserved_quantity = Set(row.reserved_quantity - quantity);
            active.current_quantity = Set(row.current_quantity - quantity);
            active.update(txn).await.map_err(ServiceError::db_error)?;
        }
        InventoryLevel::Operator => {
            let row = find_operator_for_update(
                txn,
                &reservation.organization_id,
                &reservation.reference_id,
                &reservation.product_id,
            )
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "Operator balance missing for reserved product {}",
                    reservation.product_id
                ))
            })?;
            let mut active: operator_balance::ActiveModel = row.clone().into();
            active.reserved_quantity = Set(row.reserved_quantity - quantity);
            active.current_quantity = Set(row.current_quantity - quantity);
            active.update(txn).await.map_err(ServiceError::db_error)?;
        }
    }
    Ok(())
}

/// Shared tail of cancel and expire: releases the unfulfilled
/// remainder back to the balance, stamps the terminal state and records
/// the lifecycle movement. Returns the updated row and the released
/// quantity.
async fn release_remainder(
    txn: &DatabaseTransaction,
    reservation: &stock_reservation::Model,
    terminal: ReservationStatus,
    reason: Option<String>,
    performed_by: &str,
) -> Result<(stock_reservation::Model, i32), ServiceError> {
    let released = reservation.quantity_remaining();
    if released > 0 {
        match parse_level(reservation)? {
            InventoryLevel::Warehouse => {
                let row = find_warehouse_for_update(
                    txn,
                    &reservation.organization_id,
                    &reservation.product_id,
                )
                .await?;
                if let Some(row) = row {
                    let mut active: warehouse_balance::ActiveModel = row.clone().into();
                    active.reserved_quantity = Set((row.reserved_quantity - released).max(0));
                    active.update(txn).await.map_err(ServiceError::db_error)?;
                }
            }
            InventoryLevel::Operator => {
                let row = find_operator_for_update(
                    txn,
                    &reservation.organization_id,
                    &reservation.reference_id,
                    &reservation.product_id,
                )
                .await?;
                if let Some(row) = row {
                    let mut active: operator_balance::ActiveModel = row.clone().into();
                    active.reserved_quantity = Set((row.reserved_quantity - released).max(0));
                    active.update(txn).await.map_err(ServiceError::db_error)?;
                }
            }
        }
    }

    let movement_type = match terminal {
        ReservationStatus::Expired => MovementType::ReservationExpired,
        _ => MovementType::ReservationCancelled,
    };
    let mut movement = NewMovement::new(
        reservation.organization_id.clone(),
        movement_type,
        reservation.product_id.clone(),
        released,
        performed_by.to_string(),
    );
    movement.task_id = Some(reservation.task_id.clone());
    movement.reservation_id = Some(reservation.id);
    movement.notes = reason.clone();
    movements::record(txn, movement).await?;

    let mut active: stock_reservation::ActiveModel = reservation.clone().into();
    active.status = Set(terminal.as_str().to_string());
    active.cancelled_at = Set(Some(Utc::now()));
    active.cancel_reason = Set(reason);
    let updated = active.update(txn).await.map_err(ServiceError::db_error)?;
    Ok((updated, released))
}
