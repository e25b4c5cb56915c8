//! Audit sink - Where the ledger reports purchases and orders once they are committed.
//!
//! The sink is an external collaborator: the ledger only calls [`AuditSink::record`]
//! after the corresponding database transaction has committed, and never fails
//! an operation because auditing did.

use crate::core::allocator::PoolDebit;
use tracing::info;

/// A committed change to a user's credits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    /// A meal pack was bought and its pool created
    PackPurchased {
        /// Buyer
        owner: String,
        /// New pool
        pool_id: i64,
        /// Credits granted
        size: i64,
    },
    /// An order was placed and paid for from one or more pools
    OrderPlaced {
        /// Customer
        owner: String,
        /// New order
        order_id: i64,
        /// Credits consumed
        credits: i64,
        /// Pools debited, in FIFO order
        debits: Vec<PoolDebit>,
    },
}

/// Receives audit events from the ledger.
pub trait AuditSink: Send + Sync {
    /// Records one committed event.
    fn record(&self, event: &AuditEvent);
}

/// Writes audit events as structured `tracing` records under the `meal_ledger::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        match event {
            AuditEvent::PackPurchased {
                owner,
                pool_id,
                size,
            } => {
                info!(target: "meal_ledger::audit", %owner, pool_id, size, "pack purchased");
            }
            AuditEvent::OrderPlaced {
                owner,
                order_id,
                credits,
                debits,
            } => {
                info!(
                    target: "meal_ledger::audit",
                    %owner,
                    order_id,
                    credits,
                    ?debits,
                    "order placed"
                );
            }
        }
    }
}
