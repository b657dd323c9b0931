//! # Provenance Store
//!
//! Storage abstraction for the provenance ledger. Provides a trait-based
//! interface for chain persistence with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store abstracts chain storage behind the [`Store`] trait, allowing the
//! ledger to be storage-agnostic. The primary implementation is
//! [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`AppendResult`] - Result of a compare-and-append
//! - [`ScanFilter`] - Cross-product query by owner and time
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provenance_store::{AppendResult, ScanFilter, SqliteStore, Store};
//!
//! async fn example() -> provenance_store::Result<()> {
//!     let store = SqliteStore::open("ledger.db")?;
//!
//!     // let entry: ChainEntry = ...;  (already validated)
//!     // match store.append(&entry, &entry.digest()).await? { ... }
//!
//!     let recent = store.scan(&ScanFilter::new().limit(10)).await?;
//!     println!("{} recent entries", recent.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **No validation here**: callers append only entries the validator accepted
//! - **Compare-and-append**: an append whose predecessor is not the tail
//!   returns `TailMoved` and writes nothing

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AppendResult, ScanFilter, Store};
