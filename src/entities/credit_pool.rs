//! Credit pool entity - One row per meal pack purchase.
//!
//! `size` is fixed at creation. `remaining` only ever decreases through an
//! allocation debit (or is restored by compensation), and always stays within
//! `0..=size`. `active` mirrors `remaining > 0`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Credit pool database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "credit_pools")]
pub struct Model {
    /// Unique identifier for the pool
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Opaque identifier of the user who bought the pack
    #[sea_orm(indexed)]
    pub owner: String,
    /// Credits originally granted
    pub size: i64,
    /// Credits still available for allocation
    pub remaining: i64,
    /// When the pack was purchased; drives FIFO consumption
    pub purchased_at: DateTimeUtc,
    /// Whether the pool can still be allocated from
    pub active: bool,
}

/// Defines relationships between `CreditPool` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One pool backs many order allocations
    #[sea_orm(has_many = "super::order_allocation::Entity")]
    Allocations,
}

impl Related<super::order_allocation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Allocations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Credits already consumed from this pool.
    #[must_use]
    pub const fn consumed(&self) -> i64 {
        self.size - self.remaining
    }
}
