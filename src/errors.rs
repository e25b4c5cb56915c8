//! Unified error type for the ledger.
//!
//! Every fallible operation returns [`Result`]. Variants fall into four classes
//! (see [`ErrorClass`]) so request handlers can tell a caller mistake or a
//! business rejection apart from a system fault without string matching.

use sea_orm::DbErr;
use thiserror::Error;

/// Broad category of an [`Error`], used for logging level and response mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller mistake detected before touching storage
    Validation,
    /// Expected, user-actionable rejection
    Business,
    /// Lost race or transaction conflict; safe to retry
    Conflict,
    /// Storage, configuration or other unexpected failure
    System,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Order must contain at least one menu item")]
    EmptySelection,

    #[error("Invalid quantity {quantity} for menu item {menu_item_id}")]
    InvalidQuantity { menu_item_id: i64, quantity: i64 },

    #[error("Invalid pack size {size}; allowed sizes are {allowed:?}")]
    InvalidPackSize { size: i64, allowed: Vec<i64> },

    #[error("Invalid credit amount: {amount}")]
    InvalidAmount { amount: i64 },

    #[error("Insufficient balance: {available} credits available, {requested} requested")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Credit pool {pool_id} not found")]
    PoolNotFound { pool_id: i64 },

    #[error("Order {order_id} not found")]
    OrderNotFound { order_id: i64 },

    #[error("Credit pool {pool_id} was drained by a concurrent debit")]
    DebitConflict { pool_id: i64 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} failed for {target}: {source}")]
    Failed {
        operation: &'static str,
        target: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Classifies the error. Wrapped errors report the class of their source.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::EmptySelection
            | Self::InvalidQuantity { .. }
            | Self::InvalidPackSize { .. }
            | Self::InvalidAmount { .. } => ErrorClass::Validation,
            Self::InsufficientBalance { .. }
            | Self::PoolNotFound { .. }
            | Self::OrderNotFound { .. } => ErrorClass::Business,
            Self::DebitConflict { .. } => ErrorClass::Conflict,
            Self::Database(err) if is_busy(err) => ErrorClass::Conflict,
            Self::Database(_) | Self::Io(_) | Self::Config { .. } => ErrorClass::System,
            Self::Failed { source, .. } => source.class(),
        }
    }

    /// Whether redoing the whole unit of work may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Conflict
    }

    /// Tags a system or conflict error with the operation and target it happened on.
    ///
    /// Validation and business errors are returned unchanged so that callers can
    /// still match on them directly. The wrapper keeps its source's class.
    #[must_use]
    pub fn during(self, operation: &'static str, target: impl Into<String>) -> Self {
        match self.class() {
            ErrorClass::System | ErrorClass::Conflict => Self::Failed {
                operation,
                target: target.into(),
                source: Box::new(self),
            },
            _ => self,
        }
    }

    /// HTTP status a request handler should answer with.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.class() {
            ErrorClass::Validation | ErrorClass::Business => 400,
            ErrorClass::Conflict => 409,
            ErrorClass::System => 500,
        }
    }

    /// Message safe to show to an end user. Never includes storage detail.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InsufficientBalance { available, .. } => {
                format!("You only have {available} meals available")
            }
            Self::Failed { source, .. } => source.user_message(),
            _ => match self.class() {
                ErrorClass::Validation | ErrorClass::Business => self.to_string(),
                ErrorClass::Conflict | ErrorClass::System => {
                    "Something went wrong, please try again".to_string()
                }
            },
        }
    }
}

/// `SQLite` reports lock contention between connections as busy/locked errors.
fn is_busy(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("database is locked") || message.contains("database is busy")
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
