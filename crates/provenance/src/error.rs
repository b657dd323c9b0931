//! Error types for the ledger.

use provenance_core::{ProductId, Rejection};
use provenance_store::StoreError;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The entry was not admitted. Deterministic; never retry as-is.
    #[error("entry rejected ({}): {0}", .0.code())]
    Rejected(#[from] Rejection),

    /// Query time range with start after end.
    #[error("invalid time range: start {start} is after end {end}")]
    InvalidRange { start: i64, end: i64 },

    /// The product has no chain.
    #[error("product not found: {0}")]
    NotFound(ProductId),

    /// Query parameters could not be interpreted.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl LedgerError {
    /// Whether the caller may retry the same call unchanged.
    ///
    /// Only transient storage failures qualify. A rejection is a function of
    /// the entry and the tail; it will be reproduced.
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Rejected(r) => r.code(),
            LedgerError::InvalidRange { .. } => "InvalidRange",
            LedgerError::NotFound(_) => "NotFound",
            LedgerError::InvalidQuery(_) => "InvalidQuery",
            LedgerError::Store(_) => "StoreError",
            LedgerError::Config(_) => "ConfigError",
        }
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
