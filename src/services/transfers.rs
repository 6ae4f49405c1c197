//! Transfer Coordinator: atomic multi-row quantity moves across the
//! warehouse → operator → machine hierarchy, plus receipts, sales,
//! write-offs and the absolute-set used by stocktake adjustments.
//!
//! Every operation runs in one transaction, locks the balance rows it
//! touches (two-row lanes acquire warehouse before operator before
//! machine in both directions) and records exactly one movement row.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::{IntCounterVec, Opts};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, DatabaseTransaction, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::InventoryConfig;
use crate::entities::{
    machine_balance, operator_balance, stock_movement,
    stock_adjustment::BalanceLevel,
    stock_movement::MovementType,
    warehouse_balance,
};
use crate::errors::{from_transaction_error, ServiceError};
use crate::events::{Event, EventSender};
use crate::services::balances::{
    find_machine_for_update, find_operator_for_update, find_warehouse_for_update,
};
use crate::services::movements::{self, NewMovement};

lazy_static! {
    static ref STOCK_TRANSFERS: IntCounterVec = IntCounterVec::new(
        Opts::new("stock_transfers_total", "Completed stock transfers"),
        &["movement_type"]
    )
    .expect("metric can be created");
    static ref STOCK_TRANSFER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("stock_transfer_failures_total", "Rejected stock transfers"),
        &["movement_type", "error_type"]
    )
    .expect("metric can be created");
}

/// Audit attribution every transfer carries.
#[derive(Debug, Clone)]
pub struct TransferContext {
    pub organization_id: String,
    pub performed_by: String,
    pub task_id: Option<String>,
    /// Backdate for operations ingested after the fact.
    pub operation_date: Option<DateTime<Utc>>,
}

impl TransferContext {
    pub fn new(organization_id: impl Into<String>, performed_by: impl Into<String>) -> Self {
        Self {
            organization_id: organization_id.into(),
            performed_by: performed_by.into(),
            task_id: None,
            operation_date: None,
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_operation_date(mut self, date: DateTime<Utc>) -> Self {
        self.operation_date = Some(date);
        self
    }
}

#[derive(Clone)]
pub struct TransferService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    config: Arc<InventoryConfig>,
}

impl TransferService {
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

    /// Books received goods into the warehouse, creating the balance
    /// row on first receipt. Records Movement(WarehouseIn) with the
    /// unit-cost snapshot.
    #[instrument(skip(self, ctx))]
    pub async fn receive_to_warehouse(
        &self,
        ctx: &TransferContext,
        product_id: &str,
        quantity: i32,
        unit_cost: Option<Decimal>,
    ) -> Result<stock_movement::Model, ServiceError> {
        ensure_positive_quantity(quantity)?;
        let ctx = ctx.clone();
        let product = product_id.to_string();

        let movement = self
            .db_pool
            .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let existing =
                        find_warehouse_for_update(txn, &ctx.organization_id, &product).await?;
                    match existing {
                        Some(row) => {
                            let mut active: warehouse_balance::ActiveModel = row.clone().into();
                            active.current_quantity = Set(row.current_quantity + quantity);
                            active.update(txn).await.map_err(ServiceError::db_error)?;
                        }
                        None => {
                            let row = warehouse_balance::ActiveModel {
                                organization_id: Set(ctx.organization_id.clone()),
                                product_id: Set(product.clone()),
                                current_quantity: Set(quantity),
                                reserved_quantity: Set(0),
                                min_stock_level: Set(0),
                                max_stock_level: Set(None),
                                ..Default::default()
                            };
                            row.insert(txn).await.map_err(ServiceError::db_error)?;
                        }
                    }

                    let mut new_movement = NewMovement::new(
                        ctx.organization_id.clone(),
                        MovementType::WarehouseIn,
                        product.clone(),
                        quantity,
                        ctx.performed_by.clone(),
                    );
                    new_movement.task_id = ctx.task_id.clone();
                    new_movement.operation_date = ctx.operation_date;
                    new_movement.unit_cost = unit_cost;
                    movements::record(txn, new_movement).await
                })
            })
            .await
            .map_err(from_transaction_error)?;

        self.finish(&movement).await;
        Ok(movement)
    }

    /// Generic outbound issue from the warehouse (e.g. return to a
    /// supplier). Checks availability, not just current quantity, so a
    /// reserved remainder cannot be issued away.
    #[instrument(skip(self, ctx))]
    pub async fn issue_from_warehouse(
        &self,
        ctx: &TransferContext,
        product_id: &str,
        quantity: i32,
        notes: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        ensure_positive_quantity(quantity)?;
        let ctx = ctx.clone();
        let product = product_id.to_string();

        let movement = self
            .db_pool
            .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let row = find_warehouse_for_update(txn, &ctx.organization_id, &product)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "No warehouse balance for product {}",
                                product
                            ))
                        })?;
                    if row.available_quantity() < quantity {
                        return Err(insufficient("warehouse", &product, row.available_quantity(), quantity));
                    }

                    let mut active: warehouse_balance::ActiveModel = row.clone().into();
                    active.current_quantity = Set(row.current_quantity - quantity);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    let mut new_movement = NewMovement::new(
                        ctx.organization_id.clone(),
                        MovementType::WarehouseOut,
                        product.clone(),
                        quantity,
                        ctx.performed_by.clone(),
                    );
                    new_movement.task_id = ctx.task_id.clone();
                    new_movement.operation_date = ctx.operation_date;
                    new_movement.notes = notes;
                    movements::record(txn, new_movement).await
                })
            })
            .await
            .map_err(from_transaction_error)?;

        self.finish(&movement).await;
        Ok(movement)
    }

    /// Hands stock from the warehouse to a field operator. Fails
    /// `NotFound` when the warehouse has no row for the product and
    /// `InsufficientStock` when the request exceeds the available
    /// (unreserved) quantity. The operator row is created on first use.
    #[instrument(skip(self, ctx))]
    pub async fn warehouse_to_operator(
        &self,
        ctx: &TransferContext,
        operator_id: &str,
        product_id: &str,
        quantity: i32,
    ) -> Result<stock_movement::Model, ServiceError> {
        ensure_positive_quantity(quantity)?;
        let ctx = ctx.clone();
        let operator = operator_id.to_string();
        let product = product_id.to_string();

        let movement = self
            .db_pool
            .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    // Lock order: warehouse row first, then operator.
                    let warehouse =
                        find_warehouse_for_update(txn, &ctx.organization_id, &product)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "No warehouse balance for product {}",
                                    product
                                ))
                            })?;
                    if warehouse.available_quantity() < quantity {
                        return Err(insufficient(
                            "warehouse",
                            &product,
                            warehouse.available_quantity(),
                            quantity,
                        ));
                    }

                    let mut active: warehouse_balance::ActiveModel = warehouse.clone().into();
                    active.current_quantity = Set(warehouse.current_quantity - quantity);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    credit_operator(txn, &ctx.organization_id, &operator, &product, quantity)
                        .await?;

                    let mut new_movement = NewMovement::new(
                        ctx.organization_id.clone(),
                        MovementType::WarehouseToOperator,
                        product.clone(),
                        quantity,
                        ctx.performed_by.clone(),
                    );
                    new_movement.operator_id = Some(operator.clone());
                    new_movement.task_id = ctx.task_id.clone();
                    new_movement.operation_date = ctx.operation_date;
                    movements::record(txn, new_movement).await
                })
            })
            .await
            .map_err(from_transaction_error)?;

        self.finish(&movement).await;
        Ok(movement)
    }

    /// Operator returns stock to the warehouse.
    #[instrument(skip(self, ctx))]
    pub async fn operator_to_warehouse(
        &self,
        ctx: &TransferContext,
        operator_id: &str,
        product_id: &str,
        quantity: i32,
    ) -> Result<stock_movement::Model, ServiceError> {
        ensure_positive_quantity(quantity)?;
        let ctx = ctx.clone();
        let operator = operator_id.to_string();
        let product = product_id.to_string();

        let movement = self
            .db_pool
            .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    // Same acquisition order as the outbound lane:
                    // warehouse row before operator row.
                    let warehouse =
                        find_warehouse_for_update(txn, &ctx.organization_id, &product).await?;

                    let op_row =
                        find_operator_for_update(txn, &ctx.organization_id, &operator, &product)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Operator {} has no balance for product {}",
                                    operator, product
                                ))
                            })?;
                    if op_row.current_quantity < quantity {
                        return Err(insufficient(
                            "operator",
                            &product,
                            op_row.current_quantity,
                            quantity,
                        ));
                    }

                    let mut active: operator_balance::ActiveModel = op_row.clone().into();
                    active.current_quantity = Set(op_row.current_quantity - quantity);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    match warehouse {
                        Some(row) => {
                            let mut active: warehouse_balance::ActiveModel = row.clone().into();
                            active.current_quantity = Set(row.current_quantity + quantity);
                            active.update(txn).await.map_err(ServiceError::db_error)?;
                        }
                        None => {
                            let row = warehouse_balance::ActiveModel {
                                organization_id: Set(ctx.organization_id.clone()),
                                product_id: Set(product.clone()),
                                current_quantity: Set(quantity),
                                reserved_quantity: Set(0),
                                min_stock_level: Set(0),
                                max_stock_level: Set(None),
                                ..Default::default()
                            };
                            row.insert(txn).await.map_err(ServiceError::db_error)?;
                        }
                    }

                    let mut new_movement = NewMovement::new(
                        ctx.organization_id.clone(),
                        MovementType::OperatorToWarehouse,
                        product.clone(),
                        quantity,
                        ctx.performed_by.clone(),
                    );
                    new_movement.operator_id = Some(operator.clone());
                    new_movement.task_id = ctx.task_id.clone();
                    new_movement.operation_date = ctx.operation_date;
                    movements::record(txn, new_movement).await
                })
            })
            .await
            .map_err(from_transaction_error)?;

        self.finish(&movement).await;
        Ok(movement)
    }

    /// Refill: operator loads product into a machine slot. Sufficiency
    /// is checked against the operator's current quantity (operator
    /// stock is not reservable). Stamps `last_refilled_at`.
    #[instrument(skip(self, ctx))]
    pub async fn operator_to_machine(
        &self,
        ctx: &TransferContext,
        operator_id: &str,
        machine_id: &str,
        product_id: &str,
        quantity: i32,
        slot_code: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        ensure_positive_quantity(quantity)?;
        let ctx = ctx.clone();
        let operator = operator_id.to_string();
        let machine = machine_id.to_string();
        let product = product_id.to_string();

        let movement = self
            .db_pool
            .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    // Lock order: operator row first, then machine.
                    let op_row =
                        find_operator_for_update(txn, &ctx.organization_id, &operator, &product)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Operator {} has no balance for product {}",
                                    operator, product
                                ))
                            })?;
                    if op_row.current_quantity < quantity {
                        return Err(insufficient(
                            "operator",
                            &product,
                            op_row.current_quantity,
                            quantity,
                        ));
                    }

                    let mut active: operator_balance::ActiveModel = op_row.clone().into();
                    active.current_quantity = Set(op_row.current_quantity - quantity);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    let now = ctx.operation_date.unwrap_or_else(Utc::now);
                    let machine_row =
                        find_machine_for_update(txn, &ctx.organization_id, &machine, &product)
                            .await?;
                    match machine_row {
                        Some(row) => {
                            let mut active: machine_balance::ActiveModel = row.clone().into();
                            active.current_quantity = Set(row.current_quantity + quantity);
                            active.last_refilled_at = Set(Some(now));
                            if slot_code.is_some() {
                                active.slot_code = Set(slot_code.clone());
                            }
                            active.update(txn).await.map_err(ServiceError::db_error)?;
                        }
                        None => {
                            let row = machine_balance::ActiveModel {
                                organization_id: Set(ctx.organization_id.clone()),
                                machine_id: Set(machine.clone()),
                                product_id: Set(product.clone()),
                                slot_code: Set(slot_code.clone()),
                                current_quantity: Set(quantity),
                                min_stock_level: Set(0),
                                max_capacity: Set(None),
                                total_sold: Set(0),
                                last_refilled_at: Set(Some(now)),
                                last_sale_at: Set(None),
                                ..Default::default()
                            };
                            row.insert(txn).await.map_err(ServiceError::db_error)?;
                        }
                    }

                    let mut new_movement = NewMovement::new(
                        ctx.organization_id.clone(),
                        MovementType::OperatorToMachine,
                        product.clone(),
                        quantity,
                        ctx.performed_by.clone(),
                    );
                    new_movement.operator_id = Some(operator.clone());
                    new_movement.machine_id = Some(machine.clone());
                    new_movement.task_id = ctx.task_id.clone();
                    new_movement.operation_date = ctx.operation_date;
                    movements::record(txn, new_movement).await
                })
            })
            .await
            .map_err(from_transaction_error)?;

        self.finish(&movement).await;
        Ok(movement)
    }

    /// Pull: operator removes product from a machine (end-of-life
    /// product, slot reconfiguration). Fails `NotFound` when the
    /// machine has no row for the product.
    #[instrument(skip(self, ctx))]
    pub async fn machine_to_operator(
        &self,
        ctx: &TransferContext,
        machine_id: &str,
        operator_id: &str,
        product_id: &str,
        quantity: i32,
    ) -> Result<stock_movement::Model, ServiceError> {
        ensure_positive_quantity(quantity)?;
        let ctx = ctx.clone();
        let operator = operator_id.to_string();
        let machine = machine_id.to_string();
        let product = product_id.to_string();

        let movement = self
            .db_pool
            .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    // Acquire in the same global order as the refill
                    // lane (operator before machine) so the two
                    // directions cannot deadlock each other.
                    let op_row =
                        find_operator_for_update(txn, &ctx.organization_id, &operator, &product)
                            .await?;

                    let machine_row =
                        find_machine_for_update(txn, &ctx.organization_id, &machine, &product)
                            .await?
                            .ok_or_else(|| {
                                ServiceError::NotFound(format!(
                                    "Machine {} has no balance for product {}",
                                    machine, product
                                ))
                            })?;
                    if machine_row.current_quantity < quantity {
                        return Err(insufficient(
                            "machine",
                            &product,
                            machine_row.current_quantity,
                            quantity,
                        ));
                    }

                    let mut active: machine_balance::ActiveModel = machine_row.clone().into();
                    active.current_quantity = Set(machine_row.current_quantity - quantity);
                    active.update(txn).await.map_err(ServiceError::db_error)?;

                    match op_row {
                        Some(row) => {
                            let mut active: operator_balance::ActiveModel = row.clone().into();
                            active.current_quantity = Set(row.current_quantity + quantity);
                            active.update(txn).await.map_err(ServiceError::db_error)?;
                        }
                        None => {
                            credit_operator(
                                txn,
                                &ctx.organization_id,
                                &operator,
                                &product,
                                quantity,
                            )
                            .await?;
                        }
                    }

                    let mut new_movement = NewMovement::new(
                        ctx.organization_id.clone(),
                        MovementType::MachineToOperator,
                        product.clone(),
                        quantity,
                        ctx.performed_by.clone(),
                    );
                    new_movement.operator_id = Some(operator.clone());
                    new_movement.machine_id = Some(machine.clone());
                    new_movement.task_id = ctx.task_id.clone();
                    new_movement.operation_date = ctx.operation_date;
                    movements::record(txn, new_movement).await
                })
            })
            .await
            .map_err(from_transaction_error)?;

        self.finish(&movement).await;
        Ok(movement)
    }

    /// Records a sale reported by machine telemetry. Sales are facts
    /// from hardware: with `allow_negative_machine_stock` set the
    /// balance may go negative and is surfaced as an alert event rather
    /// than rejected. Increments `total_sold`, stamps `last_sale_at`.
    #[instrument(skip(self, ctx))]
    pub async fn record_machine_sale(
        &self,
        ctx: &TransferContext,
        machine_id: &str,
        product_id: &str,
        quantity: i32,
    ) -> Result<stock_movement::Model, ServiceError> {
        ensure_positive_quantity(quantity)?;
        let allow_negative = self.config.allow_negative_machine_stock;
        let ctx = ctx.clone();
        let machine = machine_id.to_string();
        let product = product_id.to_string();

        let (movement, remaining) = self
            .db_pool
            .transaction::<_, (stock_movement::Model, i32), ServiceError>(move |txn| {
                Box::pin(async move {
                    let sale_time = ctx.operation_date.unwrap_or_else(Utc::now);
                    let machine_row =
                        find_machine_for_update(txn, &ctx.organization_id, &machine, &product)
                            .await?;

                    let remaining = match machine_row {
                        Some(row) => {
                            let remaining = row.current_quantity - quantity;
                            if remaining < 0 && !allow_negative {
                                return Err(insufficient(
                                    "machine",
                                    &product,
                                    row.current_quantity,
                                    quantity,
                                ));
                            }
                            let mut active: machine_balance::ActiveModel = row.clone().into();
                            active.current_quantity = Set(remaining);
                            active.total_sold = Set(row.total_sold + quantity);
                            active.last_sale_at = Set(Some(sale_time));
                            active.update(txn).await.map_err(ServiceError::db_error)?;
                            remaining
                        }
                        None => {
                            // No tracked stock for this slot yet; the
                            // sale still happened.
                            if !allow_negative {
                                return Err(insufficient("machine", &product, 0, quantity));
                            }
                            let row = machine_balance::ActiveModel {
                                organization_id: Set(ctx.organization_id.clone()),
                                machine_id: Set(machine.clone()),
                                product_id: Set(product.clone()),
                                slot_code: Set(None),
                                current_quantity: Set(-quantity),
                                min_stock_level: Set(0),
                                max_capacity: Set(None),
                                total_sold: Set(quantity),
                                last_refilled_at: Set(None),
                                last_sale_at: Set(Some(sale_time)),
                                ..Default::default()
                            };
                            row.insert(txn).await.map_err(ServiceError::db_error)?;
                            -quantity
                        }
                    };

                    let mut new_movement = NewMovement::new(
                        ctx.organization_id.clone(),
                        MovementType::MachineSale,
                        product.clone(),
                        quantity,
                        ctx.performed_by.clone(),
                    );
                    new_movement.machine_id = Some(machine.clone());
                    new_movement.task_id = ctx.task_id.clone();
                    new_movement.operation_date = ctx.operation_date;
                    let movement = movements::record(txn, new_movement).await?;
                    Ok((movement, remaining))
                })
            })
            .await
            .map_err(from_transaction_error)?;

        STOCK_TRANSFERS
            .with_label_values(&[movement.movement_type.as_str()])
            .inc();
        if let Err(e) = self
            .event_sender
            .send(Event::MachineSaleRecorded {
                organization_id: movement.organization_id.clone(),
                machine_id: machine_id.to_string(),
                product_id: product_id.to_string(),
                quantity,
                remaining_quantity: remaining,
            })
            .await
        {
            warn!(error = %e, "failed to publish sale event");
        }
        if remaining < 0 {
            warn!(
                machine_id,
                product_id, remaining, "machine sale drove stock negative"
            );
            if let Err(e) = self
                .event_sender
                .send(Event::NegativeStockDetected {
                    organization_id: movement.organization_id.clone(),
                    machine_id: machine_id.to_string(),
                    product_id: product_id.to_string(),
                    current_quantity: remaining,
                })
                .await
            {
                warn!(error = %e, "failed to publish negative-stock alert");
            }
        }
        Ok(movement)
    }

    /// Writes off damaged/expired/lost stock at any level.
    #[instrument(skip(self, ctx))]
    pub async fn write_off(
        &self,
        ctx: &TransferContext,
        level: BalanceLevel,
        reference_id: &str,
        product_id: &str,
        quantity: i32,
        reason: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        ensure_positive_quantity(quantity)?;
        let ctx = ctx.clone();
        let reference = reference_id.to_string();
        let product = product_id.to_string();

        let movement = self
            .db_pool
            .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    debit_level(txn, &ctx.organization_id, level, &reference, &product, quantity)
                        .await?;

                    let mut new_movement = NewMovement::new(
                        ctx.organization_id.clone(),
                        MovementType::WriteOff,
                        product.clone(),
                        quantity,
                        ctx.performed_by.clone(),
                    );
                    match level {
                        BalanceLevel::Operator => new_movement.operator_id = Some(reference.clone()),
                        BalanceLevel::Machine => new_movement.machine_id = Some(reference.clone()),
                        BalanceLevel::Warehouse => {}
                    }
                    new_movement.task_id = ctx.task_id.clone();
                    new_movement.operation_date = ctx.operation_date;
                    new_movement.notes = reason;
                    movements::record(txn, new_movement).await
                })
            })
            .await
            .map_err(from_transaction_error)?;

        self.finish(&movement).await;
        Ok(movement)
    }

    async fn finish(&self, movement: &stock_movement::Model) {
        STOCK_TRANSFERS
            .with_label_values(&[movement.movement_type.as_str()])
            .inc();
        info!(
            movement_id = %movement.id,
            movement_type = %movement.movement_type,
            product_id = %movement.product_id,
            quantity = movement.quantity,
            "stock movement recorded"
        );
        if let Err(e) = self
            .event_sender
            .send(Event::StockTransferred {
                movement_id: movement.id,
                organization_id: movement.organization_id.clone(),
                movement_type: movement.movement_type.clone(),
                product_id: movement.product_id.clone(),
                quantity: movement.quantity,
            })
            .await
        {
            warn!(error = %e, "failed to publish transfer event");
        }
    }
}

/// Sets a balance row's current quantity to an absolute counted value
/// inside the caller's transaction. Used by the stocktake workflow so
/// corrections cannot compound drift the way delta-applies would.
/// Returns the recorded movement and the quantity found before the set.
pub(crate) async fn apply_absolute_quantity(
    txn: &DatabaseTransaction,
    organization_id: &str,
    level: BalanceLevel,
    reference_id: &str,
    product_id: &str,
    counted_quantity: i32,
    performed_by: &str,
    adjustment_id: Uuid,
) -> Result<(stock_movement::Model, i32), ServiceError> {
    let previous = match level {
        BalanceLevel::Warehouse => {
            let existing = find_warehouse_for_update(txn, organization_id, product_id).await?;
            match existing {
                Some(row) => {
                    if counted_quantity < row.reserved_quantity {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Counted quantity {} is below reserved quantity {}; resolve reservations first",
                            counted_quantity, row.reserved_quantity
                        )));
                    }
                    let previous = row.current_quantity;
                    let mut active: warehouse_balance::ActiveModel = row.into();
                    active.current_quantity = Set(counted_quantity);
                    active.update(txn).await.map_err(ServiceError::db_error)?;
                    previous
                }
                None => {
                    let row = warehouse_balance::ActiveModel {
                        organization_id: Set(organization_id.to_string()),
                        product_id: Set(product_id.to_string()),
                        current_quantity: Set(counted_quantity),
                        reserved_quantity: Set(0),
                        min_stock_level: Set(0),
                        max_stock_level: Set(None),
                        ..Default::default()
                    };
                    row.insert(txn).await.map_err(ServiceError::db_error)?;
                    0
                }
            }
        }
        BalanceLevel::Operator => {
            let existing =
                find_operator_for_update(txn, organization_id, reference_id, product_id).await?;
            match existing {
                Some(row) => {
                    if counted_quantity < row.reserved_quantity {
                        return Err(ServiceError::InvalidOperation(format!(
                            "Counted quantity {} is below reserved quantity {}; resolve reservations first",
                            counted_quantity, row.reserved_quantity
                        )));
                    }
                    let previous = row.current_quantity;
                    let mut active: operator_balance::ActiveModel = row.into();
                    active.current_quantity = Set(counted_quantity);
                    active.update(txn).await.map_err(ServiceError::db_error)?;
                    previous
                }
                None => {
                    let row = operator_balance::ActiveModel {
                        organization_id: Set(organization_id.to_string()),
                        operator_id: Set(reference_id.to_string()),
                        product_id: Set(product_id.to_string()),
                        current_quantity: Set(counted_quantity),
                        reserved_quantity: Set(0),
                        ..Default::default()
                    };
                    row.insert(txn).await.map_err(ServiceError::db_error)?;
                    0
                }
            }
        }
        BalanceLevel::Machine => {
            let existing =
                find_machine_for_update(txn, organization_id, reference_id, product_id).await?;
            match existing {
                Some(row) => {
                    let previous = row.current_quantity;
                    let mut active: machine_balance::ActiveModel = row.into();
                    active.current_quantity = Set(counted_quantity);
                    active.update(txn).await.map_err(ServiceError::db_error)?;
                    previous
                }
                None => {
                    let row = machine_balance::ActiveModel {
                        organization_id: Set(organization_id.to_string()),
                        machine_id: Set(reference_id.to_string()),
                        product_id: Set(product_id.to_string()),
                        slot_code: Set(None),
                        current_quantity: Set(counted_quantity),
                        min_stock_level: Set(0),
                        max_capacity: Set(None),
                        total_sold: Set(0),
                        last_refilled_at: Set(None),
                        last_sale_at: Set(None),
                        ..Default::default()
                    };
                    row.insert(txn).await.map_err(ServiceError::db_error)?;
                    0
                }
            }
        }
    };

    let mut new_movement = NewMovement::new(
        organization_id.to_string(),
        MovementType::Adjustment,
        product_id.to_string(),
        (counted_quantity - previous).abs(),
        performed_by.to_string(),
    );
    match level {
        BalanceLevel::Operator => new_movement.operator_id = Some(reference_id.to_string()),
        BalanceLevel::Machine => new_movement.machine_id = Some(reference_id.to_string()),
        BalanceLevel::Warehouse => {}
    }
    new_movement.adjustment_id = Some(adjustment_id);
    new_movement.notes = Some(format!(
        "quantity corrected from {} to {}",
        previous, counted_quantity
    ));
    let movement = movements::record(txn, new_movement).await?;
    Ok((movement, previous))
}

async fn credit_operator(
    txn: &DatabaseTransaction,
    organization_id: &str,
    operator_id: &str,
    product_id: &str,
    quantity: i32,
) -> Result<(), ServiceError> {
    let existing = find_operator_for_update(txn, organization_id, operator_id, product_id).await?;
    match existing {
        Some(row) => {
            let mut active: operator_balance::ActiveModel = row.clone().into();
            active.current_quantity = Set(row.current_quantity + quantity);
            active.update(txn).await.map_err(ServiceError::db_error)?;
        }
        None => {
            let row = operator_balance::ActiveModel {
                organization_id: Set(organization_id.to_string()),
                operator_id: Set(operator_id.to_string()),
                product_id: Set(product_id.to_string()),
                current_quantity: Set(quantity),
                reserved_quantity: Set(0),
                ..Default::default()
            };
            row.insert(txn).await.map_err(ServiceError::db_error)?;
        }
    }
    Ok(())
}

async fn debit_level(
    txn: &DatabaseTransaction,
    organization_id: &str,
    level: BalanceLevel,
    reference_id: &str,
    product_id: &str,
    quantity: i32,
) -> Result<(), ServiceError> {
    match level {
        BalanceLevel::Warehouse => {
            let row = find_warehouse_for_update(txn, organization_id, product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("No warehouse balance for product {}", product_id))
                })?;
            if row.available_quantity() < quantity {
                return Err(insufficient(
                    "warehouse",
                    product_id,
                    row.available_quantity(),
                    quantity,
                ));
            }
            let mut active: warehouse_balance::ActiveModel = row.clone().into();
            active.current_quantity = Set(row.current_quantity - quantity);
            active.update(txn).await.map_err(ServiceError::db_error)?;
        }
        BalanceLevel::Operator => {
            let row = find_operator_for_update(txn, organization_id, reference_id, product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Operator {} has no balance for product {}",
                        reference_id, product_id
                    ))
                })?;
            if row.current_quantity < quantity {
                return Err(insufficient(
                    "operator",
                    product_id,
                    row.current_quantity,
                    quantity,
                ));
            }
            let mut active: operator_balance::ActiveModel = row.clone().into();
            active.current_quantity = Set(row.current_quantity - quantity);
            active.update(txn).await.map_err(ServiceError::db_error)?;
        }
        BalanceLevel::Machine => {
            let row = find_machine_for_update(txn, organization_id, reference_id, product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Machine {} has no balance for product {}",
                        reference_id, product_id
                    ))
                })?;
            if row.current_quantity < quantity {
                return Err(insufficient(
                    "machine",
                    product_id,
                    row.current_quantity,
                    quantity,
                ));
            }
            let mut active: machine_balance::ActiveModel = row.clone().into();
            active.current_quantity = Set(row.current_quantity - quantity);
            active.update(txn).await.map_err(ServiceError::db_error)?;
        }
    }
    Ok(())
}

fn ensure_positive_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity <= 0 {
        STOCK_TRANSFER_FAILURES
            .with_label_values(&["any", "validation_error"])
            .inc();
        return Err(ServiceError::ValidationError(
            "Quantity must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

fn insufficient(level: &str, product_id: &str, available: i32, requested: i32) -> ServiceError {
    STOCK_TRANSFER_FAILURES
        .with_label_values(&[level, "insufficient_stock"])
        .inc();
    ServiceError::InsufficientStock(format!(
        "Insufficient {} stock for product {}: available {}, requested {}",
        level, product_id, available, requested
    ))
}
