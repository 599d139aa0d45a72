use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One open cart per user. Discount and total are never stored here;
/// they are recomputed from the detail rows on every read.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cart_headers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub user_id: Uuid,
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_detail::Entity")]
    CartDetails,
}

impl Related<super::cart_detail::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartDetails.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
