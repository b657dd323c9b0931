//! Ledger configuration.

use serde::{Deserialize, Serialize};

use provenance_core::validation::DEFAULT_MAX_METADATA_LEN;
use provenance_core::ValidationPolicy;

use crate::error::{LedgerError, Result};

/// Configuration for the Ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Upper bound on `recent(n)`.
    pub max_recent: usize,
    /// Upper bound on entries returned by a scan.
    pub max_query_results: usize,
    /// Largest accepted metadata payload, in bytes.
    pub max_metadata_len: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_recent: 100,
            max_query_results: 1000,
            max_metadata_len: DEFAULT_MAX_METADATA_LEN,
        }
    }
}

impl LedgerConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| LedgerError::Config(e.to_string()))
    }

    /// The structural limits handed to the validator.
    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            max_metadata_len: self.max_metadata_len,
        }
    }
}
