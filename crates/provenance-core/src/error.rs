//! Error types for the provenance core.

use thiserror::Error;

use crate::crypto::Ed25519PublicKey;
use crate::types::{EntryHash, ProductId};

/// Errors from decoding or verifying cryptographic material.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("public key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("signature must be 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("unsupported entry version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Why a candidate entry was not admitted to a product's chain.
///
/// Every rejection is deterministic: resubmitting the same entry against the
/// same tail reproduces it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("signature does not verify against the current owner")]
    InvalidSignature,

    #[error("structurally invalid input: {0}")]
    StructurallyInvalidInput(String),

    #[error("product already has a genesis entry")]
    DuplicateGenesis,

    #[error("product chain is closed by a retire entry")]
    ChainClosed,

    #[error("previous entry hash mismatch: expected {expected:?}, got {got:?}")]
    LinkageBroken {
        expected: Option<EntryHash>,
        got: Option<EntryHash>,
    },

    #[error("current owner mismatch: chain names {expected:?}, entry claims {got:?}")]
    OwnershipMismatch {
        expected: Ed25519PublicKey,
        got: Ed25519PublicKey,
    },

    #[error("timestamp {candidate} precedes previous entry timestamp {previous}")]
    TimestampRegression { previous: i64, candidate: i64 },

    #[error("degenerate transfer: {0}")]
    DegenerateTransfer(String),

    #[error("product has no chain: {0}")]
    NotFound(ProductId),
}

impl Rejection {
    /// Stable machine-readable code, suitable for surfacing verbatim.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InvalidSignature => "InvalidSignature",
            Rejection::StructurallyInvalidInput(_) => "StructurallyInvalidInput",
            Rejection::DuplicateGenesis => "DuplicateGenesis",
            Rejection::ChainClosed => "ChainClosed",
            Rejection::LinkageBroken { .. } => "LinkageBroken",
            Rejection::OwnershipMismatch { .. } => "OwnershipMismatch",
            Rejection::TimestampRegression { .. } => "TimestampRegression",
            Rejection::DegenerateTransfer(_) => "DegenerateTransfer",
            Rejection::NotFound(_) => "NotFound",
        }
    }
}

impl From<CoreError> for Rejection {
    fn from(e: CoreError) -> Self {
        Rejection::StructurallyInvalidInput(e.to_string())
    }
}
