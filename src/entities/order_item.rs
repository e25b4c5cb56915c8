//! Order item entity - One row per distinct menu selection within an order.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order line item database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    /// Unique identifier for the line item
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning order
    #[sea_orm(indexed)]
    pub order_id: i64,
    /// Menu item that was selected
    pub menu_item_id: i64,
    /// Number of units, at least one
    pub quantity: i64,
    /// Credit price per unit at the time of ordering
    pub unit_price: i64,
}

/// Defines relationships between `OrderItem` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each item belongs to one order and goes away with it
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
