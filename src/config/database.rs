//! Database configuration module for the meal ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the stored schema always matches the
//! Rust models without hand-written SQL.

use crate::entities::{CreditPool, Order, OrderAllocation, OrderItem};
use crate::errors::Result;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
};
use serde::Deserialize;
use std::{path::Path, time::Duration};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/meal_ledger.sqlite?mode=rwc";

/// Connection settings, the `[database]` section of `ledger.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SeaORM` connection URL
    pub url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// Seconds allowed to establish a new connection
    pub connect_timeout_secs: u64,
    /// Seconds a request may wait for a pooled connection before failing
    pub acquire_timeout_secs: u64,
    /// Whether sqlx logs every statement
    pub sqlx_logging: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 5,
            sqlx_logging: false,
        }
    }
}

impl DatabaseConfig {
    /// Settings for a private in-memory database, used by tests and dry runs.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            ..Self::default()
        }
    }

    /// Replaces the URL with `DATABASE_URL` when that variable is set.
    #[must_use]
    pub fn with_env_override(mut self) -> Self {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            debug!("DATABASE_URL overrides configured database url");
            self.url = url;
        }
        self
    }

    fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(self.url.clone());
        options
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .sqlx_logging(self.sqlx_logging);

        // Every connection to `sqlite::memory:` opens its own empty database,
        // so the pool must hold exactly one connection for its whole life.
        if self.url.contains(":memory:") {
            options.max_connections(1).min_connections(1);
        } else {
            options.max_connections(self.max_connections);
        }
        options
    }
}

/// Opens a connection pool and makes sure every ledger table exists.
#[instrument(skip(config), fields(url = %config.url))]
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let parent = sqlite_file_path(&config.url)
        .and_then(Path::parent)
        .filter(|dir| !dir.as_os_str().is_empty());
    if let Some(dir) = parent {
        std::fs::create_dir_all(dir)?;
        debug!("Ensured database directory {}", dir.display());
    }
    let db = Database::connect(config.connect_options()).await?;
    info!("Database connection opened. Ensuring tables are created...");
    create_tables(&db).await?;
    Ok(db)
}

/// File path of a `SQLite` URL, or `None` for in-memory and non-`SQLite` URLs.
fn sqlite_file_path(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    Some(Path::new(path))
}

/// Creates all ledger tables from the entity definitions, skipping any that already exist.
///
/// Order matters: `order_items` and `order_allocations` reference `orders` and
/// `credit_pools` through foreign keys.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    create_table(db, CreditPool).await?;
    create_table(db, Order).await?;
    create_table(db, OrderItem).await?;
    create_table(db, OrderAllocation).await?;
    debug!("Ledger tables ensured");
    Ok(())
}

async fn create_table<C, E>(db: &C, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(builder.build(&index)).await?;
    }
    Ok(())
}
