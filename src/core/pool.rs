//! Credit pool store - Creates meal packs and moves credits in and out of them.
//!
//! Balance changes never read-modify-write from application memory. Debits are
//! a single conditional `UPDATE ... WHERE remaining >= amount`, so two requests
//! racing for the same pool serialize in the database and the loser simply
//! matches no row.

use crate::{
    entities::{CreditPool, credit_pool},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*, sea_query::Expr};
use tracing::{debug, info, instrument};

/// Records a new meal pack for `owner` with all of its credits available.
///
/// Rejects sizes outside `allowed_sizes` before touching the database.
#[instrument(skip(db, allowed_sizes))]
pub async fn create_pool<C>(
    db: &C,
    owner: &str,
    size: i64,
    allowed_sizes: &[i64],
) -> Result<credit_pool::Model>
where
    C: ConnectionTrait,
{
    if !allowed_sizes.contains(&size) {
        return Err(Error::InvalidPackSize {
            size,
            allowed: allowed_sizes.to_vec(),
        });
    }

    let pool = credit_pool::ActiveModel {
        owner: Set(owner.to_string()),
        size: Set(size),
        remaining: Set(size),
        purchased_at: Set(Utc::now()),
        active: Set(true),
        ..Default::default()
    };

    let result = pool.insert(db).await?;
    info!(
        "Created credit pool {} for owner {}: size={}",
        result.id, owner, size
    );
    Ok(result)
}

/// Finds a pool by its ID, returning None if it does not exist.
pub async fn get_pool<C>(db: &C, pool_id: i64) -> Result<Option<credit_pool::Model>>
where
    C: ConnectionTrait,
{
    CreditPool::find_by_id(pool_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Pools that can still be allocated from, oldest purchase first.
///
/// The ordering is what makes allocation FIFO. Pools bought in the same
/// instant fall back to insertion order.
pub async fn list_active_pools<C>(db: &C, owner: &str) -> Result<Vec<credit_pool::Model>>
where
    C: ConnectionTrait,
{
    CreditPool::find()
        .filter(credit_pool::Column::Owner.eq(owner))
        .filter(credit_pool::Column::Active.eq(true))
        .filter(credit_pool::Column::Remaining.gt(0))
        .order_by_asc(credit_pool::Column::PurchasedAt)
        .order_by_asc(credit_pool::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Every pool the owner ever bought, including exhausted ones, oldest first.
pub async fn list_pools<C>(db: &C, owner: &str) -> Result<Vec<credit_pool::Model>>
where
    C: ConnectionTrait,
{
    CreditPool::find()
        .filter(credit_pool::Column::Owner.eq(owner))
        .order_by_asc(credit_pool::Column::PurchasedAt)
        .order_by_asc(credit_pool::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Takes the write lock on the owner's pools before anything is read.
///
/// Issues `UPDATE credit_pools SET remaining = remaining WHERE owner = ?`, which
/// changes nothing but makes the enclosing transaction a writer from its first
/// statement. On `SQLite` a competing writer then waits out the busy timeout
/// instead of failing with `database is locked` when it later upgrades from a
/// read; on server databases it row-locks the owner's pools for the rest of the
/// transaction. Returns the number of pools locked.
#[instrument(skip(db))]
pub async fn claim_owner_pools<C>(db: &C, owner: &str) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = CreditPool::update_many()
        .col_expr(
            credit_pool::Column::Remaining,
            Expr::col(credit_pool::Column::Remaining).into(),
        )
        .filter(credit_pool::Column::Owner.eq(owner))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Atomically takes `amount` credits out of a pool.
///
/// Runs as one statement:
/// `UPDATE credit_pools SET remaining = remaining - amount, active = (remaining - amount) > 0
///  WHERE id = ? AND active AND remaining >= amount`.
///
/// # Errors
/// * `InvalidAmount` if `amount` is not positive
/// * `InsufficientBalance` if the pool holds fewer than `amount` credits at write time
/// * `PoolNotFound` if no such pool exists
#[instrument(skip(db))]
pub async fn debit_pool<C>(db: &C, pool_id: i64, amount: i64) -> Result<credit_pool::Model>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let result = CreditPool::update_many()
        .col_expr(
            credit_pool::Column::Remaining,
            Expr::col(credit_pool::Column::Remaining).sub(amount),
        )
        .col_expr(
            credit_pool::Column::Active,
            Expr::expr(Expr::col(credit_pool::Column::Remaining).sub(amount)).gt(0),
        )
        .filter(credit_pool::Column::Id.eq(pool_id))
        .filter(credit_pool::Column::Active.eq(true))
        .filter(credit_pool::Column::Remaining.gte(amount))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        let pool = get_pool(db, pool_id)
            .await?
            .ok_or(Error::PoolNotFound { pool_id })?;
        debug!(
            "Debit of {} from pool {} matched no row, {} remaining",
            amount, pool_id, pool.remaining
        );
        return Err(Error::InsufficientBalance {
            available: pool.remaining,
            requested: amount,
        });
    }

    get_pool(db, pool_id)
        .await?
        .ok_or(Error::PoolNotFound { pool_id })
}

/// Puts `amount` credits back onto a pool, undoing an earlier debit.
///
/// The update only matches while the result stays within the pool's original
/// size, so compensation can never mint credits.
#[instrument(skip(db))]
pub async fn restore_credits<C>(db: &C, pool_id: i64, amount: i64) -> Result<credit_pool::Model>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let result = CreditPool::update_many()
        .col_expr(
            credit_pool::Column::Remaining,
            Expr::col(credit_pool::Column::Remaining).add(amount),
        )
        .col_expr(credit_pool::Column::Active, Expr::value(true))
        .filter(credit_pool::Column::Id.eq(pool_id))
        .filter(
            Expr::expr(Expr::col(credit_pool::Column::Remaining).add(amount))
                .lte(Expr::col(credit_pool::Column::Size)),
        )
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        get_pool(db, pool_id)
            .await?
            .ok_or(Error::PoolNotFound { pool_id })?;
        return Err(Error::InvalidAmount { amount });
    }

    get_pool(db, pool_id)
        .await?
        .ok_or(Error::PoolNotFound { pool_id })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::ledger::DEFAULT_PACK_SIZES;
    use crate::test_utils::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_pool_rejects_unlisted_size() -> Result<()> {
        // No query results configured: validation must fail before any statement runs
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        for size in [0, -10, 15, 100] {
            let result = create_pool(&db, "alice", size, &DEFAULT_PACK_SIZES).await;
            assert!(matches!(
                result.unwrap_err(),
                Error::InvalidPackSize { size: s, .. } if s == size
            ));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_create_pool_integration() -> Result<()> {
        let db = setup_test_db().await?;

        let pool = create_pool(&db, "alice", 20, &DEFAULT_PACK_SIZES).await?;
        assert_eq!(pool.owner, "alice");
        assert_eq!(pool.size, 20);
        assert_eq!(pool.remaining, 20);
        assert!(pool.active);

        let stored = get_pool(&db, pool.id).await?.unwrap();
        assert_eq!(stored, pool);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_active_pools_oldest_first_and_per_owner() -> Result<()> {
        let db = setup_test_db().await?;
        let first = create_test_pool(&db, "alice", 10).await?;
        let _other = create_test_pool(&db, "bob", 40).await?;
        let second = create_test_pool(&db, "alice", 20).await?;
        let drained = create_test_pool(&db, "alice", 10).await?;
        debit_pool(&db, drained.id, 10).await?;

        let active = list_active_pools(&db, "alice").await?;
        let ids: Vec<i64> = active.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let history = list_pools(&db, "alice").await?;
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].id, drained.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_debit_pool_partial_and_exact() -> Result<()> {
        let db = setup_test_db().await?;
        let pool = create_test_pool(&db, "alice", 10).await?;

        let after_partial = debit_pool(&db, pool.id, 4).await?;
        assert_eq!(after_partial.remaining, 6);
        assert!(after_partial.active);

        let after_exact = debit_pool(&db, pool.id, 6).await?;
        assert_eq!(after_exact.remaining, 0);
        assert!(!after_exact.active);
        assert_eq!(after_exact.consumed(), 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_debit_pool_never_goes_negative() -> Result<()> {
        let db = setup_test_db().await?;
        let pool = create_test_pool(&db, "alice", 10).await?;
        debit_pool(&db, pool.id, 7).await?;

        let result = debit_pool(&db, pool.id, 4).await;
        assert!(matches!(
            result.unwrap_err(),
            Error::InsufficientBalance {
                available: 3,
                requested: 4
            }
        ));

        let unchanged = get_pool(&db, pool.id).await?.unwrap();
        assert_eq!(unchanged.remaining, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_debit_pool_errors() -> Result<()> {
        let db = setup_test_db().await?;
        let pool = create_test_pool(&db, "alice", 10).await?;

        assert!(matches!(
            debit_pool(&db, pool.id, 0).await.unwrap_err(),
            Error::InvalidAmount { amount: 0 }
        ));
        assert!(matches!(
            debit_pool(&db, 999, 1).await.unwrap_err(),
            Error::PoolNotFound { pool_id: 999 }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_credits_reactivates_and_caps_at_size() -> Result<()> {
        let db = setup_test_db().await?;
        let pool = create_test_pool(&db, "alice", 10).await?;
        debit_pool(&db, pool.id, 10).await?;

        let restored = restore_credits(&db, pool.id, 3).await?;
        assert_eq!(restored.remaining, 3);
        assert!(restored.active);

        // Putting back more than was ever taken would exceed the pack size
        let result = restore_credits(&db, pool.id, 8).await;
        assert!(matches!(result.unwrap_err(), Error::InvalidAmount { amount: 8 }));
        assert_eq!(get_pool(&db, pool.id).await?.unwrap().remaining, 3);

        assert!(matches!(
            restore_credits(&db, 999, 1).await.unwrap_err(),
            Error::PoolNotFound { pool_id: 999 }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_owner_pools_changes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let pool = create_pool_with_remaining(&db, "alice", 10, 4).await?;
        create_test_pool(&db, "alice", 20).await?;
        create_test_pool(&db, "bob", 10).await?;

        assert_eq!(claim_owner_pools(&db, "alice").await?, 2);
        assert_eq!(claim_owner_pools(&db, "nobody").await?, 0);
        assert_eq!(get_pool(&db, pool.id).await?.unwrap(), pool);
        Ok(())
    }
}
