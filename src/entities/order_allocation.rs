//! Order allocation entity - Records how many credits each pool contributed to an order.
//!
//! Rows are written together with the order they belong to, so the sum of
//! `credits` for an order always equals its `requested_credits`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Order allocation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_allocations")]
pub struct Model {
    /// Unique identifier for the allocation row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Order that consumed the credits
    #[sea_orm(indexed)]
    pub order_id: i64,
    /// Pool the credits were taken from
    pub pool_id: i64,
    /// Number of credits debited from the pool
    pub credits: i64,
}

/// Defines relationships between `OrderAllocation` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each allocation belongs to one order
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id",
        on_delete = "Cascade"
    )]
    Order,
    /// Each allocation draws from one pool
    #[sea_orm(
        belongs_to = "super::credit_pool::Entity",
        from = "Column::PoolId",
        to = "super::credit_pool::Column::Id"
    )]
    CreditPool,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::credit_pool::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CreditPool.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
