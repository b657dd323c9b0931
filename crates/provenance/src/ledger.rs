//! The Ledger: unified API for the provenance system.
//!
//! The Ledger brings together validation, storage, and queries. It owns the
//! per-product write serialization: for any product, reading the tail,
//! validating against it, and appending happen as one critical section.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tracing::{info, instrument, warn};

use provenance_core::{
    validate_against_tail, verify_history, AcceptedEntry, ChainEntry, ChainEntryBuilder,
    ChainViolation, Ed25519PublicKey, EntryHash, EntryType, ProductId, Rejection, Tail,
    ValidationPolicy,
};
use provenance_store::{AppendResult, Store};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::keys::{KeyDirectory, StaticKeyDirectory};
use crate::query::{QueryEngine, RawFilter};

/// Outcome of re-verifying a stored chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub product_id: ProductId,
    /// Number of entries in the stored chain.
    pub length: usize,
    /// Digest of the last entry.
    pub tail: EntryHash,
    /// Holder after the last entry ([`Ed25519PublicKey::RETIRED`] once retired).
    pub current_owner: Ed25519PublicKey,
    /// Whether the chain ends in a Retire entry.
    pub closed: bool,
    /// The first broken invariant, if any.
    pub violation: Option<ChainViolation>,
}

impl AuditReport {
    /// True if every stored entry satisfies the chain invariants.
    pub fn is_intact(&self) -> bool {
        self.violation.is_none()
    }
}

/// The main Ledger struct.
///
/// Provides a unified API for:
/// - Submitting signed entries
/// - Preparing entries for off-ledger signing
/// - Reading single-product history
/// - Cross-product scans and audits
pub struct Ledger<S: Store> {
    /// The storage backend.
    store: Arc<S>,
    /// Configuration.
    config: LedgerConfig,
    /// Alias resolution for requests and queries.
    keys: Arc<dyn KeyDirectory>,
    /// Per-product write locks.
    locks: LockMap,
    policy: ValidationPolicy,
    query: QueryEngine<S>,
}

impl<S: Store> Ledger<S> {
    /// Create a ledger with an empty key directory.
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self::with_key_directory(store, config, StaticKeyDirectory::new())
    }

    /// Create a ledger that resolves identities through `keys`.
    pub fn with_key_directory(
        store: S,
        config: LedgerConfig,
        keys: impl KeyDirectory + 'static,
    ) -> Self {
        let store = Arc::new(store);
        let keys: Arc<dyn KeyDirectory> = Arc::new(keys);
        let query = QueryEngine::new(Arc::clone(&store), Arc::clone(&keys), &config);

        Self {
            store,
            policy: config.validation_policy(),
            config,
            keys,
            locks: Mutex::new(HashMap::new()),
            query,
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn keys(&self) -> &dyn KeyDirectory {
        self.keys.as_ref()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────────────────

    /// Submit a signed entry.
    ///
    /// Every entry runs the full chain validator. Returns the stored record
    /// on acceptance. On rejection nothing is written and the chain is
    /// unchanged.
    #[instrument(
        name = "submit",
        skip_all,
        fields(product = %candidate.product_id, entry_type = %candidate.entry_type)
    )]
    pub async fn submit(&self, candidate: ChainEntry) -> Result<AcceptedEntry> {
        let lease = self.lease(&candidate.product_id);
        let result = {
            let _guard = lease.handle.lock().await;
            self.submit_locked(&candidate).await
        };
        drop(lease);

        match &result {
            Ok(accepted) => info!(seq = accepted.seq, digest = %accepted.digest, "accepted entry"),
            Err(LedgerError::Rejected(rejection)) => {
                warn!(code = rejection.code(), reason = %rejection, "rejected entry")
            }
            Err(e) => warn!(error = %e, "submit failed"),
        }

        result
    }

    async fn submit_locked(&self, candidate: &ChainEntry) -> Result<AcceptedEntry> {
        let tail = self.store.tail_of(&candidate.product_id).await?;
        let digest =
            validate_against_tail(candidate, tail.as_ref().map(Tail::from), &self.policy)?;

        match self.store.append(candidate, &digest).await? {
            AppendResult::Appended(accepted) => Ok(accepted),
            AppendResult::TailMoved { current } => Err(Rejection::LinkageBroken {
                expected: current,
                got: candidate.previous_entry_hash,
            }
            .into()),
        }
    }

    fn lease<'a>(&'a self, product_id: &'a ProductId) -> LockLease<'a> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let handle = Arc::clone(locks.entry(product_id.clone()).or_default());
        LockLease {
            locks: &self.locks,
            product_id,
            handle,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Preparation
    // ─────────────────────────────────────────────────────────────────────────

    /// Pre-fill an entry extending `product_id`'s chain.
    ///
    /// Sets the predecessor, the signer (current holder) and a timestamp no
    /// earlier than the tail's. `next_owner` of `None` keeps the builder's
    /// default (the holder for Repair, the retirement identity for Retire).
    pub async fn prepare(
        &self,
        product_id: &ProductId,
        entry_type: EntryType,
        next_owner: Option<Ed25519PublicKey>,
        metadata: impl Into<Bytes>,
    ) -> Result<ChainEntryBuilder> {
        if entry_type == EntryType::Create {
            return Err(Rejection::StructurallyInvalidInput(
                "use prepare_create for genesis entries".into(),
            )
            .into());
        }

        let tail = self.tail_of(product_id).await?;
        if tail.entry.is_terminal() {
            return Err(Rejection::ChainClosed.into());
        }

        let mut builder =
            ChainEntryBuilder::new(product_id.clone(), entry_type, tail.entry.next_owner)
                .previous(tail.digest)
                .timestamp(now_millis().max(tail.entry.timestamp))
                .metadata(metadata);
        if let Some(owner) = next_owner {
            builder = builder.next_owner(owner);
        }

        Ok(builder)
    }

    /// Pre-fill a genesis entry for a product with no chain.
    pub async fn prepare_create(
        &self,
        product_id: &ProductId,
        creator: Ed25519PublicKey,
        initial_owner: Ed25519PublicKey,
        metadata: impl Into<Bytes>,
    ) -> Result<ChainEntryBuilder> {
        if self.store.tail_of(product_id).await?.is_some() {
            return Err(Rejection::DuplicateGenesis.into());
        }

        Ok(
            ChainEntryBuilder::new(product_id.clone(), EntryType::Create, creator)
                .next_owner(initial_owner)
                .timestamp(now_millis())
                .metadata(metadata),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Single-product reads
    // ─────────────────────────────────────────────────────────────────────────

    /// The most recently accepted entry of a product.
    pub async fn tail_of(&self, product_id: &ProductId) -> Result<AcceptedEntry> {
        self.store
            .tail_of(product_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(product_id.clone()))
    }

    /// A product's full chain, oldest first.
    pub async fn history_of(&self, product_id: &ProductId) -> Result<Vec<AcceptedEntry>> {
        let history = self.store.history_of(product_id).await?;
        if history.is_empty() {
            return Err(LedgerError::NotFound(product_id.clone()));
        }
        Ok(history)
    }

    /// Who holds the product now.
    pub async fn current_owner(&self, product_id: &ProductId) -> Result<Ed25519PublicKey> {
        Ok(self.tail_of(product_id).await?.entry.next_owner)
    }

    /// Re-verify a product's stored chain from genesis.
    pub async fn audit(&self, product_id: &ProductId) -> Result<AuditReport> {
        let history = self.history_of(product_id).await?;
        let violation = verify_history(&history).err();

        if let Some(v) = &violation {
            warn!(product = %product_id, violation = %v, "audit found a broken chain");
        }

        // history_of guarantees at least one entry.
        let last = &history[history.len() - 1];
        Ok(AuditReport {
            product_id: product_id.clone(),
            length: history.len(),
            tail: last.digest,
            current_owner: last.entry.next_owner,
            closed: last.entry.is_terminal(),
            violation,
        })
    }

    /// All products with a chain.
    pub async fn list_products(&self) -> Result<Vec<ProductId>> {
        Ok(self.store.list_products().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cross-product queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Entries across all products matching `filter`, most recent first.
    pub async fn scan(&self, filter: &RawFilter) -> Result<Vec<AcceptedEntry>> {
        self.query.scan(filter).await
    }

    /// The `n` most recent entries across all products.
    pub async fn recent(&self, n: usize) -> Result<Vec<AcceptedEntry>> {
        self.query.recent(n).await
    }

    pub fn query(&self) -> &QueryEngine<S> {
        &self.query
    }
}

type LockMap = Mutex<HashMap<ProductId, Arc<tokio::sync::Mutex<()>>>>;

/// A product's lock handle, borrowed from the ledger's lock map.
///
/// Dropping the lease, including when a submission is cancelled, removes the
/// map entry once no other submission holds or awaits it.
struct LockLease<'a> {
    locks: &'a LockMap,
    product_id: &'a ProductId,
    handle: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for LockLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one in this lease.
        if Arc::strong_count(&self.handle) == 2 {
            locks.remove(self.product_id);
        }
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
