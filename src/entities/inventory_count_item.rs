use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One counted product inside a stocktake session. `system_quantity` is
/// snapshotted from the balance row at the moment the count is recorded.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inventory_count_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub count_id: Uuid,
    pub product_id: String,
    pub system_quantity: i32,
    pub counted_quantity: i32,
    pub counted_at: DateTime<Utc>,
}

impl Model {
    pub fn difference(&self) -> i32 {
        self.counted_quantity - self.system_quantity
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::inventory_count::Entity",
        from = "Column::CountId",
        to = "super::inventory_count::Column::Id"
    )]
    Count,
}

impl Related<super::inventory_count::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Count.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr> {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
        }
        Ok(active_model)
    }
}
