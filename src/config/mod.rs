/// Database configuration and connection management
pub mod database;

/// Ledger policy and application configuration loading from ledger.toml
pub mod ledger;
