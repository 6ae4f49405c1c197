use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a reservation. Only the three active states count
/// against a balance's `reserved_quantity`; the terminal states
/// (fulfilled, cancelled, expired) never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    PartiallyFulfilled,
    Fulfilled,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::PartiallyFulfilled => "partially_fulfilled",
            ReservationStatus::Fulfilled => "fulfilled",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReservationStatus::Pending),
            "confirmed" => Some(ReservationStatus::Confirmed),
            "partially_fulfilled" => Some(ReservationStatus::PartiallyFulfilled),
            "fulfilled" => Some(ReservationStatus::Fulfilled),
            "cancelled" => Some(ReservationStatus::Cancelled),
            "expired" => Some(ReservationStatus::Expired),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Pending
                | ReservationStatus::Confirmed
                | ReservationStatus::PartiallyFulfilled
        )
    }

    pub const ACTIVE: [&'static str; 3] = ["pending", "confirmed", "partially_fulfilled"];
}

/// Which balance level a reservation holds stock at. Machine stock is
/// the terminal level and is never reservable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InventoryLevel {
    Warehouse,
    Operator,
}

impl InventoryLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            InventoryLevel::Warehouse => "warehouse",
            InventoryLevel::Operator => "operator",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "warehouse" => Some(InventoryLevel::Warehouse),
            "operator" => Some(InventoryLevel::Operator),
            _ => None,
        }
    }
}

/// A hold against available stock guaranteeing a future transfer or
/// consumption will succeed. `reference_id` is the organization for
/// warehouse-level holds and the operator id for operator-level holds.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_reservations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: String,
    /// Human-readable reservation number, unique across the table.
    pub number: String,
    pub task_id: String,
    pub product_id: String,
    pub inventory_level: String,
    pub reference_id: String,
    pub quantity_reserved: i32,
    pub quantity_fulfilled: i32,
    pub status: String,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub fulfilled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn quantity_remaining(&self) -> i32 {
        self.quantity_reserved - self.quantity_fulfilled
    }

    pub fn is_active(&self) -> bool {
        ReservationStatus::from_str(&self.status)
            .map(|s| s.is_active())
            .unwrap_or(false)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr> {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        active_model.updated_at = Set(Some(now));
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        for s in [
            ReservationStatus::Pending,
            ReservationStatus::PartiallyFulfilled,
            ReservationStatus::Expired,
        ] {
            assert_eq!(ReservationStatus::from_str(s.as_str()), Some(s));
        }
        assert_eq!(ReservationStatus::from_str("held"), None);
    }

    #[test]
    fn only_non_terminal_states_are_active() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Confirmed.is_active());
        assert!(ReservationStatus::PartiallyFulfilled.is_active());
        assert!(!ReservationStatus::Fulfilled.is_active());
        assert!(!ReservationStatus::Cancelled.is_active());
        assert!(!ReservationStatus::Expired.is_active());
    }
}
