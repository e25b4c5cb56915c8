//! Shared test utilities for the meal ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test pools with sensible defaults.

use crate::{
    config::{
        database::{self, DatabaseConfig},
        ledger::{DEFAULT_PACK_SIZES, LedgerConfig},
    },
    core::{
        audit::{AuditEvent, AuditSink},
        fulfillment::Ledger,
        pool,
    },
    entities,
    errors::Result,
};
use sea_orm::DatabaseConnection;
use std::{
    path::Path,
    sync::{Arc, Mutex},
};
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    database::connect(&DatabaseConfig::in_memory()).await
}

/// Creates a full pool of `size` credits for `owner`.
pub async fn create_test_pool(
    db: &DatabaseConnection,
    owner: &str,
    size: i64,
) -> Result<entities::credit_pool::Model> {
    pool::create_pool(db, owner, size, &DEFAULT_PACK_SIZES).await
}

/// Creates a pool of `size` credits and spends it down to `remaining`.
pub async fn create_pool_with_remaining(
    db: &DatabaseConnection,
    owner: &str,
    size: i64,
    remaining: i64,
) -> Result<entities::credit_pool::Model> {
    let created = create_test_pool(db, owner, size).await?;
    if remaining == size {
        return Ok(created);
    }
    pool::debit_pool(db, created.id, size - remaining).await
}

/// Audit sink that keeps every event in memory for assertions.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    /// Events recorded so far, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &AuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Sets up a ledger over a fresh database with the default policy.
/// Returns the ledger and the sink receiving its audit events.
pub async fn setup_ledger() -> Result<(Ledger, Arc<RecordingAuditSink>)> {
    let db = setup_test_db().await?;
    let audit = Arc::new(RecordingAuditSink::default());
    let sink: Arc<dyn AuditSink> = Arc::clone(&audit) as Arc<dyn AuditSink>;
    let ledger = Ledger::new(db, LedgerConfig::default()).with_audit(sink);
    Ok((ledger, audit))
}

/// Sets up a ledger over a `SQLite` file in `dir`, served by up to
/// `max_connections` pooled connections so that orders really run in parallel.
pub async fn setup_file_ledger(dir: &Path, max_connections: u32) -> Result<Ledger> {
    init_test_tracing();
    let config = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", dir.join("ledger.sqlite").display()),
        max_connections,
        ..DatabaseConfig::default()
    };
    let db = database::connect(&config).await?;
    Ok(Ledger::new(db, LedgerConfig::default()))
}
