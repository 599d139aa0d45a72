use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A product line inside a cart. Count is always >= 1.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cart_details")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub cart_header_id: i32,
    pub product_id: i32,
    pub count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cart_header::Entity",
        from = "Column::CartHeaderId",
        to = "super::cart_header::Column::Id"
    )]
    CartHeader,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
}

impl Related<super::cart_header::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartHeader.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
