//! Core ledger logic - framework-agnostic pool, order, allocation and fulfillment operations.
//!
//! Store-level functions are generic over [`sea_orm::ConnectionTrait`] so they
//! can run on a plain connection or inside the transaction opened by
//! [`fulfillment::Ledger`].

/// Audit sink for purchases and orders
pub mod audit;
/// Credit allocator: FIFO selection, debit and compensation
pub mod allocator;
/// Balance aggregation over a user's pools
pub mod balance;
/// Order fulfillment orchestrator
pub mod fulfillment;
/// Order store
pub mod order;
/// Credit pool store
pub mod pool;

pub use allocator::{Allocation, PoolDebit};
pub use audit::{AuditEvent, AuditSink, TracingAuditSink};
pub use balance::LedgerSummary;
pub use fulfillment::{Ledger, PlacedOrder};
pub use order::{OrderDetails, OrderLine};
