//! Balance aggregation - Read-only totals over a user's credit pools.
//!
//! [`total_available`] is only a fast-fail check: the authoritative guard
//! against overspending is the conditional debit in [`crate::core::pool`].

use crate::{
    entities::{CreditPool, Order, credit_pool, order},
    errors::Result,
};
use sea_orm::{QuerySelect, prelude::*};
use serde::Serialize;

/// Credit totals for one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    /// Credits granted by every pack the owner bought
    pub granted: i64,
    /// Credits still available across all pools
    pub remaining: i64,
    /// Credits taken out of pools (`granted - remaining`)
    pub consumed: i64,
    /// Credits requested by the owner's persisted orders
    pub ordered: i64,
}

impl LedgerSummary {
    /// Every consumed credit is accounted for by an order.
    #[must_use]
    pub const fn is_balanced(&self) -> bool {
        self.consumed == self.ordered
    }
}

/// Sum of `remaining` over the owner's active pools, zero when there are none.
pub async fn total_available<C>(db: &C, owner: &str) -> Result<i64>
where
    C: ConnectionTrait,
{
    let total: Option<Option<i64>> = CreditPool::find()
        .select_only()
        .column_as(credit_pool::Column::Remaining.sum(), "total")
        .filter(credit_pool::Column::Owner.eq(owner))
        .filter(credit_pool::Column::Active.eq(true))
        .into_tuple()
        .one(db)
        .await?;

    Ok(total.flatten().unwrap_or(0))
}

/// Granted, remaining, consumed and ordered credit totals for the owner.
pub async fn ledger_summary<C>(db: &C, owner: &str) -> Result<LedgerSummary>
where
    C: ConnectionTrait,
{
    let pool_totals: Option<(Option<i64>, Option<i64>)> = CreditPool::find()
        .select_only()
        .column_as(credit_pool::Column::Size.sum(), "granted")
        .column_as(credit_pool::Column::Remaining.sum(), "remaining")
        .filter(credit_pool::Column::Owner.eq(owner))
        .into_tuple()
        .one(db)
        .await?;

    let ordered: Option<Option<i64>> = Order::find()
        .select_only()
        .column_as(order::Column::RequestedCredits.sum(), "ordered")
        .filter(order::Column::Owner.eq(owner))
        .into_tuple()
        .one(db)
        .await?;

    let (granted, remaining) = pool_totals.unwrap_or_default();
    let granted = granted.unwrap_or(0);
    let remaining = remaining.unwrap_or(0);

    Ok(LedgerSummary {
        granted,
        remaining,
        consumed: granted - remaining,
        ordered: ordered.flatten().unwrap_or(0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pool::debit_pool;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_total_available_without_pools_is_zero() -> Result<()> {
        let db = setup_test_db().await?;
        assert_eq!(total_available(&db, "nobody").await?, 0);
        assert_eq!(ledger_summary(&db, "nobody").await?, LedgerSummary::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_total_available_sums_only_owner_pools() -> Result<()> {
        let db = setup_test_db().await?;
        let pool = create_test_pool(&db, "alice", 10).await?;
        create_test_pool(&db, "alice", 20).await?;
        create_test_pool(&db, "bob", 80).await?;

        assert_eq!(total_available(&db, "alice").await?, 30);

        debit_pool(&db, pool.id, 10).await?;
        assert_eq!(total_available(&db, "alice").await?, 20);
        assert_eq!(total_available(&db, "bob").await?, 80);
        Ok(())
    }

    #[tokio::test]
    async fn test_ledger_summary_tracks_consumption() -> Result<()> {
        let db = setup_test_db().await?;
        let pool = create_test_pool(&db, "alice", 10).await?;
        create_test_pool(&db, "alice", 20).await?;
        debit_pool(&db, pool.id, 4).await?;

        let summary = ledger_summary(&db, "alice").await?;
        assert_eq!(summary.granted, 30);
        assert_eq!(summary.remaining, 26);
        assert_eq!(summary.consumed, 4);
        // The debit above bypassed the order store, so nothing accounts for it
        assert_eq!(summary.ordered, 0);
        assert!(!summary.is_balanced());
        Ok(())
    }
}
