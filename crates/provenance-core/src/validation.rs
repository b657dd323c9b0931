//! Chain validation: the admission rules for a product's chain of custody.
//!
//! [`validate_against_tail`] is a pure decision function over a candidate
//! entry and the product's current tail. It holds no state; serializing
//! concurrent submissions for one product is the caller's job.
//!
//! [`verify_chain`] and [`verify_history`] replay the same rules over a whole
//! chain so any holder of a history can audit it offline.

use std::fmt;

use crate::crypto::Ed25519PublicKey;
use crate::entry::{AcceptedEntry, ChainEntry, EntryType, ENTRY_VERSION};
use crate::error::{CoreError, Rejection};
use crate::types::EntryHash;

/// Default cap on metadata size (64 KiB).
pub const DEFAULT_MAX_METADATA_LEN: usize = 64 * 1024;

/// Structural limits applied before any chain rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Largest accepted metadata payload, in bytes.
    pub max_metadata_len: usize,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            max_metadata_len: DEFAULT_MAX_METADATA_LEN,
        }
    }
}

/// The tail an entry is checked against: the previous entry and its digest.
#[derive(Debug, Clone, Copy)]
pub struct Tail<'a> {
    pub entry: &'a ChainEntry,
    pub digest: &'a EntryHash,
}

impl<'a> From<&'a AcceptedEntry> for Tail<'a> {
    fn from(accepted: &'a AcceptedEntry) -> Self {
        Self {
            entry: &accepted.entry,
            digest: &accepted.digest,
        }
    }
}

/// Decide whether `candidate` may extend a chain whose tail is `tail`.
///
/// Checks run in a fixed order and stop at the first failure:
///
/// 1. Structure (version, metadata size)
/// 2. Genesis rules (no tail: only Create; tail: no Create)
/// 3. Closed chain (tail is Retire)
/// 4. Signature by `current_owner` over the digest
/// 5. Linkage to the tail digest, then ownership continuity
/// 6. Non-decreasing timestamp
/// 7. Type-specific owner rules
///
/// Returns the candidate's digest on success.
pub fn validate_against_tail(
    candidate: &ChainEntry,
    tail: Option<Tail<'_>>,
    policy: &ValidationPolicy,
) -> Result<EntryHash, Rejection> {
    check_structure(candidate, policy)?;

    match (&tail, candidate.entry_type) {
        (None, EntryType::Create) => {}
        (None, _) => return Err(Rejection::NotFound(candidate.product_id.clone())),
        (Some(_), EntryType::Create) => return Err(Rejection::DuplicateGenesis),
        (Some(_), _) => {}
    }

    if let Some(tail) = &tail {
        if tail.entry.is_terminal() {
            return Err(Rejection::ChainClosed);
        }
    }

    let digest = candidate.digest();
    let signed = candidate
        .current_owner
        .verify_digest(&digest, &candidate.signature)?;
    if !signed {
        return Err(Rejection::InvalidSignature);
    }

    match &tail {
        None => {
            if candidate.previous_entry_hash.is_some() {
                return Err(Rejection::LinkageBroken {
                    expected: None,
                    got: candidate.previous_entry_hash,
                });
            }
        }
        Some(tail) => {
            if candidate.previous_entry_hash.as_ref() != Some(tail.digest) {
                return Err(Rejection::LinkageBroken {
                    expected: Some(*tail.digest),
                    got: candidate.previous_entry_hash,
                });
            }
            if candidate.current_owner != tail.entry.next_owner {
                return Err(Rejection::OwnershipMismatch {
                    expected: tail.entry.next_owner,
                    got: candidate.current_owner,
                });
            }
            if candidate.timestamp < tail.entry.timestamp {
                return Err(Rejection::TimestampRegression {
                    previous: tail.entry.timestamp,
                    candidate: candidate.timestamp,
                });
            }
        }
    }

    check_owner_rules(candidate)?;

    Ok(digest)
}

fn check_structure(candidate: &ChainEntry, policy: &ValidationPolicy) -> Result<(), Rejection> {
    if candidate.version != ENTRY_VERSION {
        return Err(CoreError::UnsupportedVersion(candidate.version).into());
    }
    if candidate.metadata.len() > policy.max_metadata_len {
        return Err(Rejection::StructurallyInvalidInput(format!(
            "metadata is {} bytes, limit is {}",
            candidate.metadata.len(),
            policy.max_metadata_len
        )));
    }
    Ok(())
}

fn check_owner_rules(candidate: &ChainEntry) -> Result<(), Rejection> {
    let current = &candidate.current_owner;
    let next = &candidate.next_owner;

    match candidate.entry_type {
        EntryType::Repair => {
            if next != current {
                return Err(Rejection::DegenerateTransfer(
                    "repair must not change the owner".into(),
                ));
            }
        }
        EntryType::Create | EntryType::Transfer => {
            if next == current {
                return Err(Rejection::DegenerateTransfer(format!(
                    "{} to the current owner",
                    candidate.entry_type
                )));
            }
            if next.is_retired() {
                return Err(Rejection::DegenerateTransfer(format!(
                    "{} to the retirement identity",
                    candidate.entry_type
                )));
            }
        }
        EntryType::Retire => {
            if *next != Ed25519PublicKey::RETIRED {
                return Err(Rejection::DegenerateTransfer(
                    "retire must assign the retirement identity".into(),
                ));
            }
        }
    }

    Ok(())
}

/// Why a recorded chain fails an audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationReason {
    /// The entry would not have been admitted.
    Rejected(Rejection),
    /// A stored digest differs from the digest recomputed from the entry.
    DigestMismatch { stored: EntryHash, computed: EntryHash },
    /// Positions are not contiguous from 1.
    SequenceGap { expected: u64, got: u64 },
    /// An entry belongs to a different product than the chain.
    ForeignEntry,
}

/// The first position at which a chain breaks its invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainViolation {
    /// Zero-based index into the audited slice.
    pub index: usize,
    pub reason: ViolationReason,
}

impl fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ViolationReason::Rejected(r) => write!(f, "entry {}: {}", self.index, r),
            ViolationReason::DigestMismatch { stored, computed } => write!(
                f,
                "entry {}: stored digest {} does not match computed {}",
                self.index, stored, computed
            ),
            ViolationReason::SequenceGap { expected, got } => write!(
                f,
                "entry {}: expected seq {}, got {}",
                self.index, expected, got
            ),
            ViolationReason::ForeignEntry => {
                write!(f, "entry {}: belongs to another product", self.index)
            }
        }
    }
}

impl std::error::Error for ChainViolation {}

/// Replay the admission rules over a complete chain, oldest first.
///
/// An empty slice is a valid (empty) chain. Structural limits are not
/// re-applied: they are admission policy, not chain invariants.
pub fn verify_chain(entries: &[ChainEntry]) -> Result<(), ChainViolation> {
    let policy = ValidationPolicy {
        max_metadata_len: usize::MAX,
    };
    let mut previous: Option<(&ChainEntry, EntryHash)> = None;
    let product = entries.first().map(|e| &e.product_id);

    for (index, entry) in entries.iter().enumerate() {
        if product != Some(&entry.product_id) {
            return Err(ChainViolation {
                index,
                reason: ViolationReason::ForeignEntry,
            });
        }

        let tail = previous.as_ref().map(|(e, d)| Tail { entry: e, digest: d });
        let digest = validate_against_tail(entry, tail, &policy).map_err(|r| ChainViolation {
            index,
            reason: ViolationReason::Rejected(r),
        })?;
        previous = Some((entry, digest));
    }

    Ok(())
}

/// Audit a stored history: positions, stored digests, then chain rules.
pub fn verify_history(history: &[AcceptedEntry]) -> Result<(), ChainViolation> {
    for (index, accepted) in history.iter().enumerate() {
        let expected = index as u64 + 1;
        if accepted.seq != expected {
            return Err(ChainViolation {
                index,
                reason: ViolationReason::SequenceGap {
                    expected,
                    got: accepted.seq,
                },
            });
        }

        let computed = accepted.entry.digest();
        if computed != accepted.digest {
            return Err(ChainViolation {
                index,
                reason: ViolationReason::DigestMismatch {
                    stored: accepted.digest,
                    computed,
                },
            });
        }
    }

    let entries: Vec<ChainEntry> = history.iter().map(|a| a.entry.clone()).collect();
    verify_chain(&entries)
}
