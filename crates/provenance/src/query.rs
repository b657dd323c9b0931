//! Query engine: raw filter parameters in, ordered entries out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use provenance_core::{AcceptedEntry, Ed25519PublicKey, Rejection};
use provenance_store::{ScanFilter, Store};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::keys::KeyDirectory;

/// Filter parameters as a caller supplies them.
///
/// Owners are hex public keys or key-directory aliases; times are Unix
/// milliseconds, both bounds inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawFilter {
    pub owner: Option<String>,
    pub previous_owner: Option<String>,
    pub time_range_start: Option<i64>,
    pub time_range_end: Option<i64>,
    pub limit: Option<usize>,
}

impl RawFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn previous_owner(mut self, owner: impl Into<String>) -> Self {
        self.previous_owner = Some(owner.into());
        self
    }

    pub fn since(mut self, start: i64) -> Self {
        self.time_range_start = Some(start);
        self
    }

    pub fn until(mut self, end: i64) -> Self {
        self.time_range_end = Some(end);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Translates [`RawFilter`]s into store scans.
pub struct QueryEngine<S: Store> {
    store: Arc<S>,
    keys: Arc<dyn KeyDirectory>,
    max_recent: usize,
    max_query_results: usize,
}

impl<S: Store> QueryEngine<S> {
    pub fn new(store: Arc<S>, keys: Arc<dyn KeyDirectory>, config: &LedgerConfig) -> Self {
        Self {
            store,
            keys,
            max_recent: config.max_recent,
            max_query_results: config.max_query_results,
        }
    }

    /// Validate and resolve a raw filter.
    pub fn compile(&self, raw: &RawFilter) -> Result<ScanFilter> {
        if let (Some(start), Some(end)) = (raw.time_range_start, raw.time_range_end) {
            if start > end {
                return Err(LedgerError::InvalidRange { start, end });
            }
        }

        let limit = raw
            .limit
            .map_or(self.max_query_results, |l| l.min(self.max_query_results));

        Ok(ScanFilter {
            owner: self.resolve_owner(raw.owner.as_deref())?,
            previous_owner: self.resolve_owner(raw.previous_owner.as_deref())?,
            time_range_start: raw.time_range_start,
            time_range_end: raw.time_range_end,
            limit: Some(limit),
        })
    }

    fn resolve_owner(&self, identity: Option<&str>) -> Result<Option<Ed25519PublicKey>> {
        match identity.map(str::trim) {
            None | Some("") => Ok(None),
            Some(identity) => self.keys.resolve(identity).map(Some).ok_or_else(|| {
                Rejection::StructurallyInvalidInput(format!("unknown owner identity: {}", identity))
                    .into()
            }),
        }
    }

    /// Entries across all products matching `raw`, most recent first.
    pub async fn scan(&self, raw: &RawFilter) -> Result<Vec<AcceptedEntry>> {
        let filter = self.compile(raw)?;
        let entries = self.store.scan(&filter).await?;
        debug!(?filter, results = entries.len(), "scan");
        Ok(entries)
    }

    /// The `n` most recent entries across all products, `n` capped.
    pub async fn recent(&self, n: usize) -> Result<Vec<AcceptedEntry>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let filter = ScanFilter::new().limit(n.min(self.max_recent));
        Ok(self.store.scan(&filter).await?)
    }
}
