use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Idempotency ledger for order placement. One row per idempotency key;
/// a replayed key resolves to the order created by the first attempt.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "checkout_attempts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub user_id: Uuid,
    pub order_header_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order_header::Entity",
        from = "Column::OrderHeaderId",
        to = "super::order_header::Column::Id"
    )]
    OrderHeader,
}

impl Related<super::order_header::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderHeader.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
