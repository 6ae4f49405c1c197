use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stocktake session state machine: draft → in_progress → completed
/// or cancelled. Terminal states never transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountStatus {
    Draft,
    InProgress,
    Completed,
    Cancelled,
}

impl CountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountStatus::Draft => "draft",
            CountStatus::InProgress => "in_progress",
            CountStatus::Completed => "completed",
            CountStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(CountStatus::Draft),
            "in_progress" => Some(CountStatus::InProgress),
            "completed" => Some(CountStatus::Completed),
            "cancelled" => Some(CountStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CountStatus::Completed | CountStatus::Cancelled)
    }
}

/// A physical count session grouping per-product counted-vs-system rows
/// for one scope (the warehouse, an operator, or a machine).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_counts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: String,
    pub number: String,
    pub inventory_level: String,
    pub reference_id: String,
    pub status: String,
    pub created_by: String,
    pub completed_by: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::inventory_count_item::Entity")]
    Items,
}

impl Related<super::inventory_count_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

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
    fn terminal_states() {
        assert!(!CountStatus::Draft.is_terminal());
        assert!(!CountStatus::InProgress.is_terminal());
        assert!(CountStatus::Completed.is_terminal());
        assert!(CountStatus::Cancelled.is_terminal());
    }
}
