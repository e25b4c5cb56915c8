//! Credit allocator - Spends a requested number of credits across a user's pools.
//!
//! Pools are consumed oldest purchase first. Each pool is debited through the
//! atomic conditional decrement in [`pool::debit_pool`]; if any step fails the
//! debits already applied in this attempt are credited back before the error
//! is returned, so an allocation is either complete or leaves no trace.

use crate::{
    core::{balance, pool},
    entities::credit_pool,
    errors::{Error, Result},
};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use tracing::{debug, error, instrument, warn};

/// Credits taken from one pool as part of an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolDebit {
    /// Pool the credits came from
    pub pool_id: i64,
    /// Number of credits debited
    pub credits: i64,
}

/// The pools touched by a successful allocation, in the order they were debited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Allocation {
    debits: Vec<PoolDebit>,
}

impl Allocation {
    /// Debits in FIFO order.
    #[must_use]
    pub fn debits(&self) -> &[PoolDebit] {
        &self.debits
    }

    /// Total credits debited.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.debits.iter().map(|debit| debit.credits).sum()
    }

    /// Whether nothing was debited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.debits.is_empty()
    }
}

/// Debits exactly `amount` credits from the owner's active pools, oldest first.
///
/// # Errors
/// * `InvalidAmount` if `amount` is not positive; nothing is read or written
/// * `InsufficientBalance` if the pools run out before `amount` is covered,
///   carrying the balance available after compensation
/// * `DebitConflict` if a pool was drained by someone else between listing and
///   debiting it; the caller may retry
///
/// In every error case all debits applied by this call have been reversed.
#[instrument(skip(db))]
pub async fn allocate<C>(db: &C, owner: &str, amount: i64) -> Result<Allocation>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let pools = pool::list_active_pools(db, owner).await?;
    allocate_from(db, owner, amount, &pools).await
}

/// Debits `amount` credits from `candidates`, a FIFO listing of the owner's pools.
///
/// The listing may be stale by the time a debit runs; a pool that no longer
/// holds what the listing promised aborts the allocation with `DebitConflict`
/// after the earlier debits are compensated.
#[instrument(skip(db, candidates), fields(candidates = candidates.len()))]
pub async fn allocate_from<C>(
    db: &C,
    owner: &str,
    amount: i64,
    candidates: &[credit_pool::Model],
) -> Result<Allocation>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let mut allocation = Allocation::default();
    let mut still_needed = amount;

    for candidate in candidates {
        if still_needed == 0 {
            break;
        }
        let credits = candidate.remaining.min(still_needed);

        match pool::debit_pool(db, candidate.id, credits).await {
            Ok(_) => {
                debug!("Debited {} credits from pool {}", credits, candidate.id);
                allocation.debits.push(PoolDebit {
                    pool_id: candidate.id,
                    credits,
                });
                still_needed -= credits;
            }
            Err(Error::InsufficientBalance { .. } | Error::PoolNotFound { .. }) => {
                warn!(
                    "Pool {} changed under allocation for owner {}, compensating {} debits",
                    candidate.id,
                    owner,
                    allocation.debits.len()
                );
                release(db, &allocation).await?;
                return Err(Error::DebitConflict {
                    pool_id: candidate.id,
                });
            }
            Err(err) => return Err(abort(db, &allocation, err).await),
        }
    }

    if still_needed > 0 {
        release(db, &allocation).await?;
        let available = balance::total_available(db, owner).await?;
        debug!(
            "Owner {} ran out of pools: requested {}, available {}",
            owner, amount, available
        );
        return Err(Error::InsufficientBalance {
            available,
            requested: amount,
        });
    }

    Ok(allocation)
}

/// Credits every debit of `allocation` back onto its pool, newest debit first.
#[instrument(skip(db, allocation), fields(debits = allocation.debits.len()))]
pub async fn release<C>(db: &C, allocation: &Allocation) -> Result<()>
where
    C: ConnectionTrait,
{
    for debit in allocation.debits.iter().rev() {
        pool::restore_credits(db, debit.pool_id, debit.credits).await?;
    }
    Ok(())
}

/// Compensates after an unexpected failure and hands back the original error.
async fn abort<C>(db: &C, allocation: &Allocation, err: Error) -> Error
where
    C: ConnectionTrait,
{
    if let Err(release_err) = release(db, allocation).await {
        error!(
            "Failed to compensate allocation after error '{}': {}",
            err, release_err
        );
    }
    err
}
