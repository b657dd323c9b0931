//! # Provenance
//!
//! A chain-of-custody ledger for physical products. Every product has one
//! append-only chain of signed entries: it is created, changes hands,
//! gets serviced, and is eventually retired.
//!
//! ## Key Concepts
//!
//! - **Entry**: Immutable. Signed by the party holding the product.
//! - **Chain**: One per product. Each entry names its predecessor's digest.
//! - **Tail**: The latest entry; its `next_owner` is the current holder.
//! - **Retire**: Closes a chain for good.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use provenance::{Ledger, LedgerConfig, RawFilter};
//! use provenance::core::{EntryType, Keypair, ProductId};
//! use provenance::store::SqliteStore;
//!
//! async fn example() -> provenance::Result<()> {
//!     let store = SqliteStore::open("ledger.db")?;
//!     let ledger = Ledger::new(store, LedgerConfig::default());
//!
//!     let maker = Keypair::generate();
//!     let buyer = Keypair::generate();
//!     let product = ProductId::new("bike-0042")?;
//!
//!     let genesis = ledger
//!         .prepare_create(&product, maker.public_key(), buyer.public_key(), "assembled")
//!         .await?
//!         .sign(&maker);
//!     ledger.submit(genesis).await?;
//!
//!     let history = ledger.history_of(&product).await?;
//!     let recent = ledger.scan(&RawFilter::new().limit(10)).await?;
//!     println!("{} entries, {} recent", history.len(), recent.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `provenance::core` - Entries, digests, signatures, validation
//! - `provenance::store` - Storage abstraction and SQLite

pub mod config;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod query;
pub mod request;

// Re-export component crates
pub use provenance_core as core;
pub use provenance_store as store;

pub use config::LedgerConfig;
pub use error::{LedgerError, Result};
pub use keys::{KeyDirectory, StaticKeyDirectory};
pub use ledger::{AuditReport, Ledger};
pub use query::{QueryEngine, RawFilter};
pub use request::SubmitRequest;

// Re-export commonly used core types
pub use provenance_core::{
    AcceptedEntry, ChainEntry, ChainEntryBuilder, Ed25519PublicKey, Ed25519Signature, EntryHash,
    EntryType, Keypair, ProductId, Rejection,
};
