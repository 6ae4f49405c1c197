use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason a corrective adjustment was posted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentType {
    Stocktake,
    Correction,
    Damage,
    Expiry,
    Theft,
    Other,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Stocktake => "stocktake",
            AdjustmentType::Correction => "correction",
            AdjustmentType::Damage => "damage",
            AdjustmentType::Expiry => "expiry",
            AdjustmentType::Theft => "theft",
            AdjustmentType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stocktake" => Some(AdjustmentType::Stocktake),
            "correction" => Some(AdjustmentType::Correction),
            "damage" => Some(AdjustmentType::Damage),
            "expiry" => Some(AdjustmentType::Expiry),
            "theft" => Some(AdjustmentType::Theft),
            "other" => Some(AdjustmentType::Other),
            _ => None,
        }
    }
}

/// Level a balance row lives at, including the terminal machine level.
/// Adjustments may target any of the three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceLevel {
    Warehouse,
    Operator,
    Machine,
}

impl BalanceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceLevel::Warehouse => "warehouse",
            BalanceLevel::Operator => "operator",
            BalanceLevel::Machine => "machine",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "warehouse" => Some(BalanceLevel::Warehouse),
            "operator" => Some(BalanceLevel::Operator),
            "machine" => Some(BalanceLevel::Machine),
            _ => None,
        }
    }
}

/// Correction aligning system quantity with a physically counted
/// quantity. `difference` = actual − system. An unapproved adjustment
/// above the configured threshold leaves the balance untouched until
/// someone approves it.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_adjustments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: String,
    pub number: String,
    pub inventory_level: String,
    pub reference_id: String,
    pub product_id: String,
    pub adjustment_type: String,
    pub system_quantity: i32,
    pub actual_quantity: i32,
    pub difference: i32,
    pub is_approved: bool,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    /// Movement this adjustment generated once applied.
    pub movement_id: Option<Uuid>,
    pub count_id: Option<Uuid>,
    pub reason: Option<String>,
    pub created_by: String,
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
