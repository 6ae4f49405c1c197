use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Central warehouse stock for one product in one organization.
///
/// `available_quantity` is derived on read and never stored, so it cannot
/// drift from the underlying columns.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "warehouse_balances")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub organization_id: String,
    pub product_id: String,
    pub current_quantity: i32,
    pub reserved_quantity: i32,
    pub min_stock_level: i32,
    pub max_stock_level: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Quantity eligible for new reservations.
    pub fn available_quantity(&self) -> i32 {
        self.current_quantity - self.reserved_quantity
    }

    pub fn is_low_stock(&self) -> bool {
        self.current_quantity <= self.min_stock_level
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
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(current: i32, reserved: i32) -> Model {
        Model {
            id: 1,
            organization_id: "org-1".into(),
            product_id: "prod-1".into(),
            current_quantity: current,
            reserved_quantity: reserved,
            min_stock_level: 10,
            max_stock_level: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn available_is_current_minus_reserved() {
        assert_eq!(balance(100, 10).available_quantity(), 90);
        assert_eq!(balance(100, 100).available_quantity(), 0);
    }

    #[test]
    fn low_stock_uses_current_quantity() {
        assert!(balance(10, 0).is_low_stock());
        assert!(!balance(11, 11).is_low_stock());
    }
}
