//! Order fulfillment - Purchases meal packs and places orders against a user's credits.
//!
//! [`Ledger::place_order`] runs the balance check, the allocation and the order
//! inserts inside one database transaction. If persisting the order fails after
//! credits were allocated, the allocation is compensated and the transaction
//! rolled back, so a failed order never costs the customer anything. Attempts
//! that lose a race against a concurrent order are retried a bounded number of
//! times.

use crate::{
    config::ledger::LedgerConfig,
    core::{
        allocator::{self, Allocation},
        audit::{AuditEvent, AuditSink, TracingAuditSink},
        balance::{self, LedgerSummary},
        order::{self, OrderDetails, OrderLine},
        pool,
    },
    entities::{credit_pool, order as order_entity, order_item},
    errors::{Error, ErrorClass, Result},
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use rand::Rng;
use std::{collections::BTreeMap, sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};

/// One meal unit costs one credit.
pub const CREDITS_PER_MEAL: i64 = 1;

/// Result of a successful [`Ledger::place_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    /// Stored order header
    pub order: order_entity::Model,
    /// Stored line items
    pub items: Vec<order_item::Model>,
    /// Pools the credits were taken from
    pub allocation: Allocation,
}

/// Entry point for the credit ledger: pack purchases, orders and balance queries.
pub struct Ledger {
    db: DatabaseConnection,
    config: LedgerConfig,
    audit: Arc<dyn AuditSink>,
}

impl Ledger {
    /// Creates a ledger that audits through [`TracingAuditSink`].
    #[must_use]
    pub fn new(db: DatabaseConnection, config: LedgerConfig) -> Self {
        Self {
            db,
            config,
            audit: Arc::new(TracingAuditSink),
        }
    }

    /// Replaces the audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Underlying database connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Policy this ledger applies.
    #[must_use]
    pub const fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Sells a meal pack of `size` credits to `owner`.
    ///
    /// # Errors
    /// * `InvalidPackSize` if `size` is not one of the configured pack sizes; no row is created
    /// * `Failed` wrapping the storage error otherwise
    #[instrument(skip(self))]
    pub async fn purchase_pack(&self, owner: &str, size: i64) -> Result<credit_pool::Model> {
        if !self.config.is_allowed_pack_size(size) {
            let err = Error::InvalidPackSize {
                size,
                allowed: self.config.pack_sizes.clone(),
            };
            log_failure("purchase", &err);
            return Err(err);
        }

        let pool = pool::create_pool(&self.db, owner, size, &self.config.pack_sizes)
            .await
            .map_err(|err| err.during("purchase", format!("owner {owner}, size {size}")))
            .inspect_err(|err| log_failure("purchase", err))?;

        self.audit.record(&AuditEvent::PackPurchased {
            owner: owner.to_string(),
            pool_id: pool.id,
            size: pool.size,
        });
        Ok(pool)
    }

    /// Places an order for `items` (menu item ID to quantity), paying with `owner`'s credits.
    ///
    /// # Errors
    /// * `EmptySelection` if `items` is empty
    /// * `InvalidQuantity` if any quantity is not positive
    /// * `InsufficientBalance` if the owner cannot pay, with the credits actually available
    /// * `Failed` wrapping a `DebitConflict` or busy-database error if every attempt
    ///   lost a race although credits remain; the wrapper is still retryable
    /// * `Failed` wrapping a storage error; all debits have been reversed
    #[instrument(skip(self, items), fields(items = items.len()))]
    pub async fn place_order(
        &self,
        owner: &str,
        items: &BTreeMap<i64, i64>,
    ) -> Result<PlacedOrder> {
        let (lines, requested) =
            validate_selection(items).inspect_err(|err| log_failure("place_order", err))?;

        let mut attempt = 1;
        loop {
            match self.try_place_order(owner, &lines, requested).await {
                Ok(placed) => {
                    self.audit.record(&AuditEvent::OrderPlaced {
                        owner: owner.to_string(),
                        order_id: placed.order.id,
                        credits: placed.order.requested_credits,
                        debits: placed.allocation.debits().to_vec(),
                    });
                    return Ok(placed);
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_attempts => {
                    warn!(
                        "Order attempt {} for owner {} lost a race ({}), retrying",
                        attempt, owner, err
                    );
                    tokio::time::sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    let err = self
                        .settle_exhausted(owner, requested, err)
                        .await
                        .during("place_order", format!("owner {owner}"));
                    log_failure("place_order", &err);
                    return Err(err);
                }
            }
        }
    }

    /// Credits currently available to `owner`.
    pub async fn available(&self, owner: &str) -> Result<i64> {
        balance::total_available(&self.db, owner).await
    }

    /// Granted, remaining, consumed and ordered totals for `owner`.
    pub async fn summary(&self, owner: &str) -> Result<LedgerSummary> {
        balance::ledger_summary(&self.db, owner).await
    }

    /// Pools `owner` can still spend from, in the order they will be used.
    pub async fn active_pools(&self, owner: &str) -> Result<Vec<credit_pool::Model>> {
        pool::list_active_pools(&self.db, owner).await
    }

    /// Every pack `owner` has bought.
    pub async fn pools(&self, owner: &str) -> Result<Vec<credit_pool::Model>> {
        pool::list_pools(&self.db, owner).await
    }

    /// One order with its items and allocations.
    pub async fn order(&self, order_id: i64) -> Result<OrderDetails> {
        order::get_order_details(&self.db, order_id).await
    }

    /// Orders placed by `owner`, newest first.
    pub async fn orders(&self, owner: &str) -> Result<Vec<order_entity::Model>> {
        order::list_orders(&self.db, owner).await
    }

    /// One all-or-nothing attempt: check, allocate and persist in a single transaction.
    async fn try_place_order(
        &self,
        owner: &str,
        lines: &[OrderLine],
        requested: i64,
    ) -> Result<PlacedOrder> {
        let txn = self.db.begin().await?;

        // Become a writer before reading so concurrent orders queue on the lock
        pool::claim_owner_pools(&txn, owner).await?;

        let available = balance::total_available(&txn, owner).await?;
        if available < requested {
            return Err(Error::InsufficientBalance {
                available,
                requested,
            });
        }

        let allocation = allocator::allocate(&txn, owner, requested).await?;

        let details = match order::create_order(
            &txn,
            owner,
            self.config.initial_order_status,
            lines,
            &allocation,
        )
        .await
        {
            Ok(details) => details,
            Err(err) => {
                error!(
                    "Persisting order for owner {} failed after allocating {} credits, compensating: {}",
                    owner, requested, err
                );
                if let Err(release_err) = allocator::release(&txn, &allocation).await {
                    error!("Compensating allocation failed: {}", release_err);
                }
                if let Err(rollback_err) = txn.rollback().await {
                    error!("Rolling back order transaction failed: {}", rollback_err);
                }
                return Err(err);
            }
        };

        txn.commit().await?;
        info!(
            "Placed order {} for owner {}: {} credits from {} pools",
            details.order.id,
            owner,
            requested,
            allocation.debits().len()
        );

        Ok(PlacedOrder {
            order: details.order,
            items: details.items,
            allocation,
        })
    }

    /// Decides what a caller sees once retries are used up.
    ///
    /// A lost race becomes `InsufficientBalance` when a fresh read confirms the
    /// owner can no longer pay; otherwise the conflict itself is reported.
    async fn settle_exhausted(&self, owner: &str, requested: i64, err: Error) -> Error {
        if !matches!(err, Error::DebitConflict { .. }) {
            return err;
        }
        match balance::total_available(&self.db, owner).await {
            Ok(available) if available < requested => Error::InsufficientBalance {
                available,
                requested,
            },
            Ok(_) => err,
            Err(read_err) => read_err,
        }
    }

    /// Linear backoff plus up to one step of random jitter, so retries that
    /// collided once do not collide again.
    fn backoff(&self, attempt: u32) -> Duration {
        let step = self.config.retry_backoff_ms;
        let jitter = rand::rng().random_range(0..=step);
        Duration::from_millis(step.saturating_mul(u64::from(attempt)).saturating_add(jitter))
    }
}

/// Turns a menu selection into order lines and the credits they cost, checking every quantity.
fn validate_selection(items: &BTreeMap<i64, i64>) -> Result<(Vec<OrderLine>, i64)> {
    if items.is_empty() {
        return Err(Error::EmptySelection);
    }

    let mut total: i64 = 0;
    let mut lines = Vec::with_capacity(items.len());
    for (&menu_item_id, &quantity) in items {
        let invalid = Error::InvalidQuantity {
            menu_item_id,
            quantity,
        };
        if quantity <= 0 {
            return Err(invalid);
        }
        let credits = quantity.checked_mul(CREDITS_PER_MEAL).ok_or(invalid)?;
        total = total.checked_add(credits).ok_or(Error::InvalidQuantity {
            menu_item_id,
            quantity,
        })?;
        lines.push(OrderLine {
            menu_item_id,
            quantity,
            unit_price: CREDITS_PER_MEAL,
        });
    }
    Ok((lines, total))
}

/// Rejections are routine; only system failures are logged as errors.
fn log_failure(operation: &str, err: &Error) {
    match err.class() {
        ErrorClass::Validation => debug!("{} rejected: {}", operation, err),
        ErrorClass::Business | ErrorClass::Conflict => info!("{} declined: {}", operation, err),
        ErrorClass::System => error!("{} failed: {:?}", operation, err),
    }
}
