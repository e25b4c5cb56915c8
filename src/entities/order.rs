//! Order entity - One row per checkout.
//!
//! An order owns its line items and the allocation rows recording which pools
//! paid for it. Both are written in the same transaction as the order header.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of an order
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed, waiting for confirmation
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Accepted by the kitchen
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    /// Handed to the customer
    #[sea_orm(string_value = "delivered")]
    Delivered,
    /// Withdrawn
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Order database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    /// Unique identifier for the order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Opaque identifier of the user who placed the order
    #[sea_orm(indexed)]
    pub owner: String,
    /// Total credits consumed by this order (sum of item quantities)
    pub requested_credits: i64,
    /// Current lifecycle state
    pub status: OrderStatus,
    /// When the order was placed
    pub placed_at: DateTimeUtc,
}

/// Defines relationships between Order and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One order has many line items
    #[sea_orm(has_many = "super::order_item::Entity")]
    Items,
    /// One order has many pool allocations
    #[sea_orm(has_many = "super::order_allocation::Entity")]
    Allocations,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::order_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
