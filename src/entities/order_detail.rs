use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order line with product name and price captured at order time.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_details")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub order_header_id: i32,
    pub product_id: i32,
    pub product_name: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price: Decimal,
    pub count: i32,
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
