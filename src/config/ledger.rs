//! Ledger policy and application configuration loading from ledger.toml
//!
//! Every field has a default, so an absent section (or an absent file, see
//! [`load_or_default`]) yields the stock policy: packs of 10/20/40/80 credits,
//! orders start `pending`, and conflicting orders are attempted three times.

use crate::config::database::DatabaseConfig;
use crate::entities::OrderStatus;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Pack sizes a customer may buy when nothing else is configured.
pub const DEFAULT_PACK_SIZES: [i64; 4] = [10, 20, 40, 80];

/// Configuration structure representing the entire ledger.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Business policy for purchases and orders
    pub ledger: LedgerConfig,
    /// Storage connection settings
    pub database: DatabaseConfig,
}

/// Business policy applied by the fulfillment orchestrator
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Allowed meal pack sizes, in credits
    pub pack_sizes: Vec<i64>,
    /// Status assigned to a freshly placed order
    pub initial_order_status: OrderStatus,
    /// How many times an order is attempted when it loses a race
    pub max_attempts: u32,
    /// Delay before the second attempt; grows linearly with each retry
    pub retry_backoff_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            pack_sizes: DEFAULT_PACK_SIZES.to_vec(),
            initial_order_status: OrderStatus::Pending,
            max_attempts: 3,
            retry_backoff_ms: 25,
        }
    }
}

impl LedgerConfig {
    /// Checks that the policy can actually be applied.
    pub fn validate(&self) -> Result<()> {
        if self.pack_sizes.is_empty() {
            return Err(Error::Config {
                message: "ledger.pack_sizes must list at least one size".to_string(),
            });
        }
        if let Some(size) = self.pack_sizes.iter().find(|size| **size <= 0) {
            return Err(Error::Config {
                message: format!("ledger.pack_sizes contains non-positive size {size}"),
            });
        }
        if self.max_attempts == 0 {
            return Err(Error::Config {
                message: "ledger.max_attempts must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Whether `size` is one of the configured pack sizes.
    #[must_use]
    pub fn is_allowed_pack_size(&self, size: i64) -> bool {
        self.pack_sizes.contains(&size)
    }
}

/// Parses and validates configuration from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse ledger.toml: {e}"),
    })?;
    config.ledger.validate()?;
    Ok(config)
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - The ledger policy is unusable (no pack sizes, zero attempts)
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    debug!("Attempting to load configuration from: {:?}", path_ref);
    let contents = std::fs::read_to_string(path_ref).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path_ref.display()),
    })?;
    parse_config(&contents)
}

/// Loads configuration from `path` if it exists, otherwise falls back to defaults.
pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path_ref = path.as_ref();
    if path_ref.exists() {
        load_config(path_ref)
    } else {
        info!(
            "No configuration file at {}, using defaults",
            path_ref.display()
        );
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [ledger]
            pack_sizes = [5, 15]
            initial_order_status = "confirmed"
            max_attempts = 2
            retry_backoff_ms = 10

            [database]
            url = "sqlite::memory:"
            max_connections = 2
        "#;

        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.ledger.pack_sizes, vec![5, 15]);
        assert_eq!(config.ledger.initial_order_status, OrderStatus::Confirmed);
        assert_eq!(config.ledger.max_attempts, 2);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 2);
        // Unset fields keep their defaults
        assert_eq!(config.database.acquire_timeout_secs, 5);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.ledger.pack_sizes, DEFAULT_PACK_SIZES.to_vec());
        assert_eq!(config.ledger.initial_order_status, OrderStatus::Pending);
        assert!(config.ledger.is_allowed_pack_size(40));
        assert!(!config.ledger.is_allowed_pack_size(15));
    }

    #[test]
    fn test_rejects_unusable_policy() {
        let result = parse_config("[ledger]\npack_sizes = []\n");
        assert!(matches!(result, Err(Error::Config { .. })));

        let result = parse_config("[ledger]\npack_sizes = [10, -20]\n");
        assert!(matches!(result, Err(Error::Config { .. })));

        let result = parse_config("[ledger]\nmax_attempts = 0\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_rejects_unknown_status() {
        let result = parse_config("[ledger]\ninitial_order_status = \"shipped\"\n");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = load_or_default("definitely/not/here/ledger.toml").unwrap();
        assert_eq!(config.ledger.max_attempts, 3);
    }
}
