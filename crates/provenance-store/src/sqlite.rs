//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the provenance ledger. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use provenance_core::{
    AcceptedEntry, ChainEntry, Ed25519PublicKey, Ed25519Signature, EntryHash, EntryType, ProductId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{AppendResult, ScanFilter, Store};

const ENTRY_COLUMNS: &str = "digest, product_id, seq, version, entry_type, previous_entry_hash, \
     current_owner, next_owner, timestamp, metadata, signature, accepted_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {}", e)))?
    }
}

/// Raw column values of an `entries` row.
struct EntryRow {
    digest: Vec<u8>,
    product_id: String,
    seq: i64,
    version: i64,
    entry_type: i64,
    previous_entry_hash: Option<Vec<u8>>,
    current_owner: Vec<u8>,
    next_owner: Vec<u8>,
    timestamp: i64,
    metadata: Vec<u8>,
    signature: Vec<u8>,
    accepted_at: i64,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            digest: row.get("digest")?,
            product_id: row.get("product_id")?,
            seq: row.get("seq")?,
            version: row.get("version")?,
            entry_type: row.get("entry_type")?,
            previous_entry_hash: row.get("previous_entry_hash")?,
            current_owner: row.get("current_owner")?,
            next_owner: row.get("next_owner")?,
            timestamp: row.get("timestamp")?,
            metadata: row.get("metadata")?,
            signature: row.get("signature")?,
            accepted_at: row.get("accepted_at")?,
        })
    }

    fn into_accepted(self) -> Result<AcceptedEntry> {
        let version = u8::try_from(self.version)
            .map_err(|_| invalid("version", self.version.to_string()))?;
        let entry_type = u8::try_from(self.entry_type)
            .ok()
            .and_then(EntryType::from_u8)
            .ok_or_else(|| invalid("entry_type", self.entry_type.to_string()))?;
        let seq = u64::try_from(self.seq).map_err(|_| invalid("seq", self.seq.to_string()))?;

        let entry = ChainEntry {
            version,
            product_id: ProductId::new(self.product_id)
                .map_err(|e| invalid("product_id", e.to_string()))?,
            entry_type,
            previous_entry_hash: self
                .previous_entry_hash
                .as_deref()
                .map(hash_from_blob)
                .transpose()?,
            current_owner: key_from_blob(&self.current_owner)?,
            next_owner: key_from_blob(&self.next_owner)?,
            timestamp: self.timestamp,
            metadata: Bytes::from(self.metadata),
            signature: Ed25519Signature::from_slice(&self.signature)
                .map_err(|e| invalid("signature", e.to_string()))?,
        };

        Ok(AcceptedEntry {
            seq,
            digest: hash_from_blob(&self.digest)?,
            accepted_at: self.accepted_at,
            entry,
        })
    }
}

fn invalid(column: &str, detail: String) -> StoreError {
    StoreError::InvalidData(format!("{}: {}", column, detail))
}

fn hash_from_blob(bytes: &[u8]) -> Result<EntryHash> {
    EntryHash::try_from(bytes).map_err(|_| invalid("digest", format!("{} bytes", bytes.len())))
}

fn key_from_blob(bytes: &[u8]) -> Result<Ed25519PublicKey> {
    Ed25519PublicKey::from_slice(bytes).map_err(|e| invalid("owner", e.to_string()))
}

fn query_entries(conn: &Connection, sql: &str, values: Vec<Value>) -> Result<Vec<AcceptedEntry>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), EntryRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(EntryRow::into_accepted).collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn append(&self, entry: &ChainEntry, digest: &EntryHash) -> Result<AppendResult> {
        let entry = entry.clone();
        let digest = *digest;

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let product = entry.product_id.as_str();

            let tail: Option<(Vec<u8>, i64)> = tx
                .query_row(
                    "SELECT tail_digest, tail_seq FROM chains WHERE product_id = ?1",
                    params![product],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let current = tail
                .as_ref()
                .map(|(bytes, _)| hash_from_blob(bytes))
                .transpose()?;
            if current != entry.previous_entry_hash {
                // Dropping the transaction rolls it back.
                return Ok(AppendResult::TailMoved { current });
            }

            let seq = tail.map_or(0, |(_, seq)| seq) + 1;
            let now = now_millis();

            tx.execute(
                "INSERT INTO entries (
                    digest, product_id, seq, version, entry_type, previous_entry_hash,
                    current_owner, next_owner, timestamp, metadata, signature, accepted_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    digest.as_bytes().as_slice(),
                    product,
                    seq,
                    entry.version as i64,
                    entry.entry_type.to_u8() as i64,
                    entry.previous_entry_hash.as_ref().map(|h| h.as_bytes().to_vec()),
                    entry.current_owner.as_bytes().as_slice(),
                    entry.next_owner.as_bytes().as_slice(),
                    entry.timestamp,
                    entry.metadata.as_ref(),
                    entry.signature.as_bytes().as_slice(),
                    now,
                ],
            )?;

            tx.execute(
                "INSERT INTO chains (product_id, tail_digest, tail_seq, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(product_id) DO UPDATE SET
                    tail_digest = excluded.tail_digest,
                    tail_seq = excluded.tail_seq,
                    updated_at = excluded.updated_at",
                params![product, digest.as_bytes().as_slice(), seq, now],
            )?;

            tx.commit()?;
            debug!(product = %entry.product_id, seq, digest = %digest, "appended entry");

            Ok(AppendResult::Appended(AcceptedEntry {
                seq: seq as u64,
                digest,
                accepted_at: now,
                entry,
            }))
        })
        .await
    }

    async fn tail_of(&self, product_id: &ProductId) -> Result<Option<AcceptedEntry>> {
        let product = product_id.to_string();

        self.run(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM entries WHERE product_id = ?1 ORDER BY seq DESC LIMIT 1",
                        ENTRY_COLUMNS
                    ),
                    params![product],
                    EntryRow::from_row,
                )
                .optional()?;
            row.map(EntryRow::into_accepted).transpose()
        })
        .await
    }

    async fn history_of(&self, product_id: &ProductId) -> Result<Vec<AcceptedEntry>> {
        let product = product_id.to_string();

        self.run(move |conn| {
            query_entries(
                conn,
                &format!(
                    "SELECT {} FROM entries WHERE product_id = ?1 ORDER BY seq",
                    ENTRY_COLUMNS
                ),
                vec![Value::Text(product)],
            )
        })
        .await
    }

    async fn scan(&self, filter: &ScanFilter) -> Result<Vec<AcceptedEntry>> {
        if filter.is_empty_range() {
            return Ok(Vec::new());
        }
        let filter = filter.clone();

        self.run(move |conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut values: Vec<Value> = Vec::new();

            if let Some(owner) = &filter.owner {
                values.push(Value::Blob(owner.as_bytes().to_vec()));
                let i = values.len();
                clauses.push(format!("(current_owner = ?{i} OR next_owner = ?{i})"));
            }
            if let Some(previous) = &filter.previous_owner {
                values.push(Value::Blob(previous.as_bytes().to_vec()));
                clauses.push(format!("current_owner = ?{}", values.len()));
            }
            if let Some(start) = filter.time_range_start {
                values.push(Value::Integer(start));
                clauses.push(format!("timestamp >= ?{}", values.len()));
            }
            if let Some(end) = filter.time_range_end {
                values.push(Value::Integer(end));
                clauses.push(format!("timestamp <= ?{}", values.len()));
            }

            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            // Negative LIMIT means unbounded in SQLite.
            let limit = filter
                .limit
                .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
                .unwrap_or(-1);
            values.push(Value::Integer(limit));

            let sql = format!(
                "SELECT {} FROM entries {} ORDER BY timestamp DESC, ordinal DESC LIMIT ?{}",
                ENTRY_COLUMNS,
                where_clause,
                values.len()
            );
            query_entries(conn, &sql, values)
        })
        .await
    }

    async fn get_entry(&self, digest: &EntryHash) -> Result<Option<AcceptedEntry>> {
        let digest = *digest;

        self.run(move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM entries WHERE digest = ?1", ENTRY_COLUMNS),
                    params![digest.as_bytes().as_slice()],
                    EntryRow::from_row,
                )
                .optional()?;
            row.map(EntryRow::into_accepted).transpose()
        })
        .await
    }

    async fn list_products(&self) -> Result<Vec<ProductId>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT product_id FROM chains ORDER BY product_id")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            names
                .into_iter()
                .map(|name| ProductId::new(name).map_err(|e| invalid("product_id", e.to_string())))
                .collect()
        })
        .await
    }

    async fn entry_count(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_core::{ChainEntryBuilder, Keypair};

    fn product(name: &str) -> ProductId {
        ProductId::new(name).unwrap()
    }

    fn make_genesis(maker: &Keypair, owner: &Keypair, name: &str, ts: i64) -> ChainEntry {
        ChainEntryBuilder::new(product(name), EntryType::Create, maker.public_key())
            .next_owner(owner.public_key())
            .timestamp(ts)
            .metadata(format!("genesis of {}", name).into_bytes())
            .sign(maker)
    }

    #[tokio::test]
    async fn test_append_and_read_back() {
        let store = SqliteStore::open_memory().unwrap();
        let maker = Keypair::generate();
        let alice = Keypair::generate();
        let e0 = make_genesis(&maker, &alice, "P1", 1_700_000_000_000);

        let result = store.append(&e0, &e0.digest()).await.unwrap();
        let AppendResult::Appended(accepted) = result else {
            panic!("expected append");
        };
        assert_eq!(accepted.seq, 1);

        let tail = store.tail_of(&product("P1")).await.unwrap().unwrap();
        assert_eq!(tail.entry, e0);
        assert_eq!(tail.digest, e0.digest());
        assert_eq!(tail.digest, tail.entry.digest());

        let by_digest = store.get_entry(&e0.digest()).await.unwrap().unwrap();
        assert_eq!(by_digest.entry.metadata, e0.metadata);
    }

    #[tokio::test]
    async fn test_compare_and_append() {
        let store = SqliteStore::open_memory().unwrap();
        let maker = Keypair::generate();
        let alice = Keypair::generate();
        let bob = Keypair::generate();
        let carol = Keypair::generate();

        let e0 = make_genesis(&maker, &alice, "P1", 10);
        store.append(&e0, &e0.digest()).await.unwrap();

        let to_bob = ChainEntryBuilder::new(product("P1"), EntryType::Transfer, alice.public_key())
            .previous(e0.digest())
            .next_owner(bob.public_key())
            .timestamp(20)
            .sign(&alice);
        let to_carol =
            ChainEntryBuilder::new(product("P1"), EntryType::Transfer, alice.public_key())
                .previous(e0.digest())
                .next_owner(carol.public_key())
                .timestamp(20)
                .sign(&alice);

        assert!(matches!(
            store.append(&to_bob, &to_bob.digest()).await.unwrap(),
            AppendResult::Appended(_)
        ));
        assert_eq!(
            store.append(&to_carol, &to_carol.digest()).await.unwrap(),
            AppendResult::TailMoved {
                current: Some(to_bob.digest())
            }
        );

        let history = store.history_of(&product("P1")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].entry.next_owner, bob.public_key());
    }

    #[tokio::test]
    async fn test_scan_filters() {
        let store = SqliteStore::open_memory().unwrap();
        let maker = Keypair::generate();
        let alice = Keypair::generate();
        let bob = Keypair::generate();

        for (name, owner, ts) in [("P1", &alice, 30), ("P2", &bob, 10), ("P3", &alice, 30)] {
            let e = make_genesis(&maker, owner, name, ts);
            store.append(&e, &e.digest()).await.unwrap();
        }

        let all = store.scan(&ScanFilter::new()).await.unwrap();
        let names: Vec<&str> = all.iter().map(|a| a.product_id().as_str()).collect();
        assert_eq!(names, vec!["P3", "P1", "P2"]);

        let alices = store
            .scan(&ScanFilter::new().owner(alice.public_key()).since(30))
            .await
            .unwrap();
        assert_eq!(alices.len(), 2);

        let by_maker = store
            .scan(&ScanFilter::new().previous_owner(maker.public_key()).limit(2))
            .await
            .unwrap();
        assert_eq!(by_maker.len(), 2);

        let none = store
            .scan(&ScanFilter::new().previous_owner(alice.public_key()))
            .await
            .unwrap();
        assert!(none.is_empty());

        assert_eq!(store.entry_count().await.unwrap(), 3);
        assert_eq!(store.list_products().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let maker = Keypair::generate();
        let alice = Keypair::generate();
        let e0 = make_genesis(&maker, &alice, "P1", 10);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.append(&e0, &e0.digest()).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let tail = store.tail_of(&product("P1")).await.unwrap().unwrap();
        assert_eq!(tail.entry, e0);
    }

    #[tokio::test]
    async fn test_scan_matches_memory_store() {
        let sqlite = SqliteStore::open_memory().unwrap();
        let memory = crate::memory::MemoryStore::new();
        let maker = Keypair::from_seed(&[1; 32]);
        let alice = Keypair::from_seed(&[2; 32]);
        let bob = Keypair::from_seed(&[3; 32]);
        let stranger = Keypair::from_seed(&[9; 32]);

        for (name, owner, ts) in [("P1", &alice, 10), ("P2", &bob, 20), ("P3", &alice, 20)] {
            let e = make_genesis(&maker, owner, name, ts);
            sqlite.append(&e, &e.digest()).await.unwrap();
            memory.append(&e, &e.digest()).await.unwrap();
        }

        let filters = [
            ScanFilter::new(),
            ScanFilter::new().since(20).until(10),
            ScanFilter::new().owner(alice.public_key()).since(20).until(10),
            ScanFilter::new().owner(stranger.public_key()),
            ScanFilter::new().previous_owner(stranger.public_key()),
            ScanFilter::new().owner(alice.public_key()).previous_owner(maker.public_key()),
            ScanFilter::new().since(15).limit(1),
            ScanFilter::new().until(10),
            ScanFilter::new().limit(0),
        ];

        for filter in &filters {
            let a: Vec<_> = sqlite.scan(filter).await.unwrap().into_iter().map(|e| e.digest).collect();
            let b: Vec<_> = memory.scan(filter).await.unwrap().into_iter().map(|e| e.digest).collect();
            assert_eq!(a, b, "filter {:?}", filter);
        }

        assert!(sqlite
            .scan(&ScanFilter::new().since(20).until(10))
            .await
            .unwrap()
            .is_empty());
    }
}
