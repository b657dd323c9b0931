//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
        tracing::debug!(from = current, to = CURRENT_VERSION, "migrated schema");
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Every accepted entry, in acceptance order (ordinal)
        CREATE TABLE entries (
            ordinal INTEGER PRIMARY KEY AUTOINCREMENT,
            digest BLOB NOT NULL UNIQUE,          -- 32 bytes, Blake3 of canonical body
            product_id TEXT NOT NULL,
            seq INTEGER NOT NULL,                 -- position in the product chain, from 1
            version INTEGER NOT NULL,
            entry_type INTEGER NOT NULL,          -- EntryType as u8
            previous_entry_hash BLOB,             -- 32 bytes, NULL for Create
            current_owner BLOB NOT NULL,          -- 32 bytes, Ed25519 public key
            next_owner BLOB NOT NULL,             -- 32 bytes, Ed25519 public key
            timestamp INTEGER NOT NULL,           -- signer-claimed time (Unix ms)
            metadata BLOB NOT NULL,
            signature BLOB NOT NULL,              -- 64 bytes
            accepted_at INTEGER NOT NULL,         -- local time of acceptance

            UNIQUE(product_id, seq)
        );

        -- One row per product: its current tail
        CREATE TABLE chains (
            product_id TEXT PRIMARY KEY,
            tail_digest BLOB NOT NULL,
            tail_seq INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Secondary indexes for cross-product queries
        CREATE INDEX idx_entries_product_seq ON entries(product_id, seq);
        CREATE INDEX idx_entries_current_owner ON entries(current_owner);
        CREATE INDEX idx_entries_next_owner ON entries(next_owner);
        CREATE INDEX idx_entries_timestamp ON entries(timestamp, ordinal);
        "#,
    )?;

    Ok(())
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
