//! Store trait: the abstract interface for chain persistence.
//!
//! This trait allows the ledger to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use provenance_core::{AcceptedEntry, ChainEntry, Ed25519PublicKey, EntryHash, ProductId};

use crate::error::Result;

/// Result of appending an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendResult {
    /// The entry is now the product's tail.
    Appended(AcceptedEntry),
    /// The entry's `previous_entry_hash` no longer names the tail.
    /// Nothing was written.
    TailMoved {
        /// The tail digest at the time of the attempt.
        current: Option<EntryHash>,
    },
}

/// Cross-product query over accepted entries.
///
/// Unset fields are unconstrained; set fields are ANDed. Time bounds are
/// inclusive and apply to the signed entry timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilter {
    /// Matches entries where this identity is `current_owner` or `next_owner`.
    pub owner: Option<Ed25519PublicKey>,
    /// Matches entries where this identity is `current_owner`.
    pub previous_owner: Option<Ed25519PublicKey>,
    pub time_range_start: Option<i64>,
    pub time_range_end: Option<i64>,
    /// Truncate after ordering.
    pub limit: Option<usize>,
}

impl ScanFilter {
    /// A filter that matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, owner: Ed25519PublicKey) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn previous_owner(mut self, owner: Ed25519PublicKey) -> Self {
        self.previous_owner = Some(owner);
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

    /// True when the time bounds are inverted, so nothing can match.
    pub fn is_empty_range(&self) -> bool {
        matches!(
            (self.time_range_start, self.time_range_end),
            (Some(start), Some(end)) if start > end
        )
    }

    /// Whether `entry` satisfies every set constraint (ignores `limit`).
    pub fn matches(&self, entry: &ChainEntry) -> bool {
        if let Some(owner) = &self.owner {
            if entry.current_owner != *owner && entry.next_owner != *owner {
                return false;
            }
        }
        if let Some(previous) = &self.previous_owner {
            if entry.current_owner != *previous {
                return false;
            }
        }
        if let Some(start) = self.time_range_start {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.time_range_end {
            if entry.timestamp > end {
                return false;
            }
        }
        true
    }
}

/// The Store trait: async interface for chain persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, `spawn_blocking` is used internally to avoid blocking the
/// runtime.
///
/// # Design Notes
///
/// - **Append-only**: accepted entries are never modified or removed.
/// - **Compare-and-append**: `append` writes only if the entry links to the
///   current tail, so two writers racing on one product cannot both win.
/// - **Indexes move with the chain**: owner and time indexes are updated in
///   the same critical section as the chain itself.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Chain Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a validated entry to its product's chain.
    ///
    /// # Arguments
    /// - `entry`: The entry to append.
    /// - `digest`: Its digest, computed once by the validator.
    ///
    /// # Returns
    /// - `Appended` with the stored record if the entry linked to the tail.
    /// - `TailMoved` if another entry was appended first.
    async fn append(&self, entry: &ChainEntry, digest: &EntryHash) -> Result<AppendResult>;

    /// The last accepted entry of a product, if it has a chain.
    async fn tail_of(&self, product_id: &ProductId) -> Result<Option<AcceptedEntry>>;

    /// A product's full chain, oldest first. Empty if unknown.
    async fn history_of(&self, product_id: &ProductId) -> Result<Vec<AcceptedEntry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Cross-product Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Entries across all products matching `filter`.
    ///
    /// Ordered by timestamp descending, ties broken by acceptance order
    /// descending. An inverted time range yields no entries.
    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<AcceptedEntry>>;

    /// Look up an accepted entry by digest.
    async fn get_entry(&self, digest: &EntryHash) -> Result<Option<AcceptedEntry>>;

    /// All products that have a chain, in ascending order.
    async fn list_products(&self) -> Result<Vec<ProductId>>;

    /// Total number of accepted entries.
    async fn entry_count(&self) -> Result<u64>;
}
