use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction and cause of a stock movement. Quantities are stored
/// unsigned; direction is implied by the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    WarehouseIn,
    WarehouseOut,
    WarehouseToOperator,
    OperatorToWarehouse,
    OperatorToMachine,
    MachineToOperator,
    MachineSale,
    Adjustment,
    WriteOff,
    ReservationCreated,
    ReservationFulfilled,
    ReservationCancelled,
    ReservationExpired,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::WarehouseIn => "warehouse_in",
            MovementType::WarehouseOut => "warehouse_out",
            MovementType::WarehouseToOperator => "warehouse_to_operator",
            MovementType::OperatorToWarehouse => "operator_to_warehouse",
            MovementType::OperatorToMachine => "operator_to_machine",
            MovementType::MachineToOperator => "machine_to_operator",
            MovementType::MachineSale => "machine_sale",
            MovementType::Adjustment => "adjustment",
            MovementType::WriteOff => "write_off",
            MovementType::ReservationCreated => "reservation_created",
            MovementType::ReservationFulfilled => "reservation_fulfilled",
            MovementType::ReservationCancelled => "reservation_cancelled",
            MovementType::ReservationExpired => "reservation_expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "warehouse_in" => Some(MovementType::WarehouseIn),
            "warehouse_out" => Some(MovementType::WarehouseOut),
            "warehouse_to_operator" => Some(MovementType::WarehouseToOperator),
            "operator_to_warehouse" => Some(MovementType::OperatorToWarehouse),
            "operator_to_machine" => Some(MovementType::OperatorToMachine),
            "machine_to_operator" => Some(MovementType::MachineToOperator),
            "machine_sale" => Some(MovementType::MachineSale),
            "adjustment" => Some(MovementType::Adjustment),
            "write_off" => Some(MovementType::WriteOff),
            "reservation_created" => Some(MovementType::ReservationCreated),
            "reservation_fulfilled" => Some(MovementType::ReservationFulfilled),
            "reservation_cancelled" => Some(MovementType::ReservationCancelled),
            "reservation_expired" => Some(MovementType::ReservationExpired),
            _ => None,
        }
    }
}

/// Immutable audit record of a quantity change. Rows are only ever
/// inserted; there is no update or delete path anywhere in the crate.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: String,
    pub movement_type: String, // Storing as string in DB, converted via MovementType
    pub product_id: String,
    pub quantity: i32,
    pub operator_id: Option<String>,
    pub machine_id: Option<String>,
    pub task_id: Option<String>,
    pub reservation_id: Option<Uuid>,
    pub adjustment_id: Option<Uuid>,
    pub performed_by: String,
    /// May be backdated when the physical operation happened earlier
    /// than its ingestion.
    pub operation_date: DateTime<Utc>,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr> {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_type_round_trips() {
        for ty in [
            MovementType::WarehouseIn,
            MovementType::MachineSale,
            MovementType::ReservationExpired,
        ] {
            assert_eq!(MovementType::from_str(ty.as_str()), Some(ty));
        }
        assert_eq!(MovementType::from_str("teleport"), None);
    }
}
