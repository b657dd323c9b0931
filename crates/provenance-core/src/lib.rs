//! # Provenance Core
//!
//! Pure primitives for the provenance ledger: chain entries, canonical
//! digests, signatures, and the admission rules for a product's chain of
//! custody.
//!
//! This crate contains no I/O, no storage, no clock. Everything here is a
//! deterministic function of its inputs.
//!
//! ## Key Types
//!
//! - [`ChainEntry`] - One signed custody event
//! - [`EntryHash`] - Blake3 digest of an entry's canonical body
//! - [`ProductId`] - Validated product identifier
//! - [`EntryType`] - Create, Transfer, Repair, Retire
//! - [`Rejection`] - Why an entry was not admitted
//!
//! ## Canonicalization
//!
//! Entries are digested over deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod types;
pub mod validation;

pub use canonical::{canonical_body_bytes, decode_entry, encode_entry, entry_digest};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
pub use entry::{AcceptedEntry, ChainEntry, ChainEntryBuilder, EntryType, ENTRY_VERSION};
pub use error::{CoreError, Rejection};
pub use types::{EntryHash, ProductId};
pub use validation::{
    validate_against_tail, verify_chain, verify_history, ChainViolation, Tail, ValidationPolicy,
    ViolationReason,
};
