use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Stock loaded inside a vending machine, optionally tied to a slot.
///
/// The machine is the terminal inventory level: there is no reserved
/// quantity here, and sales may drive the balance negative when the
/// negative-stock policy accepts point-of-sale events as facts.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "machine_balances")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub organization_id: String,
    pub machine_id: String,
    pub product_id: String,
    pub slot_code: Option<String>,
    pub current_quantity: i32,
    pub min_stock_level: i32,
    pub max_capacity: Option<i32>,
    pub total_sold: i32,
    pub last_refilled_at: Option<DateTime<Utc>>,
    pub last_sale_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_low_stock(&self) -> bool {
        self.current_quantity <= self.min_stock_level
    }

    /// Units needed to bring the slot back to capacity, if one is set.
    pub fn refill_needed(&self) -> Option<i32> {
        self.max_capacity
            .map(|cap| (cap - self.current_quantity).max(0))
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

    #[test]
    fn refill_needed_clamps_at_zero() {
        let mut m = Model {
            id: 1,
            organization_id: "org-1".into(),
            machine_id: "vm-1".into(),
            product_id: "prod-1".into(),
            slot_code: Some("A1".into()),
            current_quantity: 8,
            min_stock_level: 2,
            max_capacity: Some(10),
            total_sold: 0,
            last_refilled_at: None,
            last_sale_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(m.refill_needed(), Some(2));
        m.current_quantity = 12;
        assert_eq!(m.refill_needed(), Some(0));
        m.max_capacity = None;
        assert_eq!(m.refill_needed(), None);
    }
}
