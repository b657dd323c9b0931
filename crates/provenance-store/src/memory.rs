//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use provenance_core::{AcceptedEntry, ChainEntry, Ed25519PublicKey, EntryHash, ProductId};

use crate::error::{Result, StoreError};
use crate::traits::{AppendResult, ScanFilter, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Every accepted entry, in acceptance order. Index is the ordinal.
    arena: Vec<AcceptedEntry>,

    /// Product chains: product -> ordinals, oldest first.
    chains: BTreeMap<ProductId, Vec<usize>>,

    /// Digest index.
    by_digest: HashMap<EntryHash, usize>,

    /// Owner index: identity -> ordinals where it is current or next owner.
    by_owner: HashMap<Ed25519PublicKey, BTreeSet<usize>>,

    /// Time index: (timestamp, ordinal).
    by_time: BTreeSet<(i64, usize)>,
}

impl MemoryStoreInner {
    fn tail_digest(&self, product_id: &ProductId) -> Option<EntryHash> {
        self.chains
            .get(product_id)
            .and_then(|chain| chain.last())
            .map(|&ordinal| self.arena[ordinal].digest)
    }

    fn ordered(&self, mut ordinals: Vec<usize>) -> Vec<usize> {
        ordinals.sort_by(|a, b| {
            let ka = (self.arena[*a].entry.timestamp, *a);
            let kb = (self.arena[*b].entry.timestamp, *b);
            kb.cmp(&ka)
        });
        ordinals
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append(&self, entry: &ChainEntry, digest: &EntryHash) -> Result<AppendResult> {
        let mut inner = self.write()?;

        let current = inner.tail_digest(&entry.product_id);
        if current != entry.previous_entry_hash {
            return Ok(AppendResult::TailMoved { current });
        }

        let ordinal = inner.arena.len();
        let seq = inner
            .chains
            .get(&entry.product_id)
            .map_or(0, |chain| chain.len() as u64)
            + 1;

        let accepted = AcceptedEntry {
            seq,
            digest: *digest,
            accepted_at: now_millis(),
            entry: entry.clone(),
        };

        inner.arena.push(accepted.clone());
        inner
            .chains
            .entry(entry.product_id.clone())
            .or_default()
            .push(ordinal);
        inner.by_digest.insert(*digest, ordinal);
        inner
            .by_owner
            .entry(entry.current_owner)
            .or_default()
            .insert(ordinal);
        inner
            .by_owner
            .entry(entry.next_owner)
            .or_default()
            .insert(ordinal);
        inner.by_time.insert((entry.timestamp, ordinal));

        debug!(product = %entry.product_id, seq, digest = %digest, "appended entry");

        Ok(AppendResult::Appended(accepted))
    }

    async fn tail_of(&self, product_id: &ProductId) -> Result<Option<AcceptedEntry>> {
        let inner = self.read()?;
        Ok(inner
            .chains
            .get(product_id)
            .and_then(|chain| chain.last())
            .map(|&ordinal| inner.arena[ordinal].clone()))
    }

    async fn history_of(&self, product_id: &ProductId) -> Result<Vec<AcceptedEntry>> {
        let inner = self.read()?;
        Ok(inner
            .chains
            .get(product_id)
            .map(|chain| {
                chain
                    .iter()
                    .map(|&ordinal| inner.arena[ordinal].clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<AcceptedEntry>> {
        if filter.is_empty_range() {
            return Ok(Vec::new());
        }

        let inner = self.read()?;
        let limit = filter.limit.unwrap_or(usize::MAX);

        // Narrow with the owner index when one applies, else walk the time index.
        let indexed_owner = filter.owner.or(filter.previous_owner);
        let candidates: Vec<usize> = match indexed_owner {
            Some(owner) => {
                let ordinals = inner
                    .by_owner
                    .get(&owner)
                    .map(|set| set.iter().copied().collect())
                    .unwrap_or_default();
                inner.ordered(ordinals)
            }
            None => {
                let lo = (filter.time_range_start.unwrap_or(i64::MIN), 0);
                let hi = (filter.time_range_end.unwrap_or(i64::MAX), usize::MAX);
                inner
                    .by_time
                    .range(lo..=hi)
                    .rev()
                    .map(|&(_, ordinal)| ordinal)
                    .collect()
            }
        };

        Ok(candidates
            .into_iter()
            .map(|ordinal| &inner.arena[ordinal])
            .filter(|accepted| filter.matches(&accepted.entry))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_entry(&self, digest: &EntryHash) -> Result<Option<AcceptedEntry>> {
        let inner = self.read()?;
        Ok(inner
            .by_digest
            .get(digest)
            .map(|&ordinal| inner.arena[ordinal].clone()))
    }

    async fn list_products(&self) -> Result<Vec<ProductId>> {
        let inner = self.read()?;
        Ok(inner.chains.keys().cloned().collect())
    }

    async fn entry_count(&self) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.arena.len() as u64)
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
