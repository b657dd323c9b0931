//! Chain entries: the immutable events of a product's history.
//!
//! An entry is signed once by the party who holds the product when the event
//! happens, submitted once, validated once, and then persisted forever.
//! Changes are new entries, never edits.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::canonical::entry_digest;
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::Rejection;
use crate::types::{EntryHash, ProductId};

/// The current entry schema version.
pub const ENTRY_VERSION: u8 = 0;

/// What kind of custody event an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryType {
    /// Genesis: the product comes into existence with an initial owner.
    Create = 0,
    /// Ownership moves from `current_owner` to `next_owner`.
    Transfer = 1,
    /// Service or repair event; ownership does not change.
    Repair = 2,
    /// Terminal entry; the chain accepts nothing afterwards.
    Retire = 3,
}

impl EntryType {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Create),
            1 => Some(Self::Transfer),
            2 => Some(Self::Repair),
            3 => Some(Self::Retire),
            _ => None,
        }
    }

    /// Lowercase name, as used in requests and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Transfer => "transfer",
            Self::Repair => "repair",
            Self::Retire => "retire",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = Rejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "transfer" => Ok(Self::Transfer),
            "repair" => Ok(Self::Repair),
            "retire" => Ok(Self::Retire),
            other => Err(Rejection::StructurallyInvalidInput(format!(
                "unknown entry type: {}",
                other
            ))),
        }
    }
}

/// One signed event in a product's chain of custody.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Schema version (currently 0).
    pub version: u8,

    /// The product this entry belongs to.
    pub product_id: ProductId,

    /// The kind of custody event.
    pub entry_type: EntryType,

    /// Digest of the preceding entry (None only for Create).
    pub previous_entry_hash: Option<EntryHash>,

    /// Holder of the product immediately before this entry; the signer.
    pub current_owner: Ed25519PublicKey,

    /// Holder after this entry. Equals `current_owner` for Repair,
    /// [`Ed25519PublicKey::RETIRED`] for Retire.
    pub next_owner: Ed25519PublicKey,

    /// Signer-claimed time of the event (Unix milliseconds).
    pub timestamp: i64,

    /// Opaque application data (service notes, invoice refs, ...).
    pub metadata: Bytes,

    /// `current_owner`'s Ed25519 signature over [`ChainEntry::digest`].
    pub signature: Ed25519Signature,
}

impl ChainEntry {
    /// Compute the canonical digest of every field except the signature.
    pub fn digest(&self) -> EntryHash {
        entry_digest(self)
    }

    /// Check if this is a genesis entry.
    pub fn is_genesis(&self) -> bool {
        self.entry_type == EntryType::Create
    }

    /// Check if this entry closes the chain.
    pub fn is_terminal(&self) -> bool {
        self.entry_type == EntryType::Retire
    }

    /// Whether ownership changes hands with this entry.
    pub fn changes_owner(&self) -> bool {
        self.current_owner != self.next_owner
    }
}

/// An entry that has been admitted to a chain, with its position and digest.
///
/// The digest is computed once at acceptance and stored; it is never
/// recomputed for linkage checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedEntry {
    /// Position in the product's chain (1-indexed; the Create entry is 1).
    pub seq: u64,

    /// Digest of `entry`, as computed at acceptance.
    pub digest: EntryHash,

    /// Local time the store recorded the entry (Unix milliseconds).
    pub accepted_at: i64,

    /// The entry itself.
    pub entry: ChainEntry,
}

impl AcceptedEntry {
    /// Get the product ID.
    pub fn product_id(&self) -> &ProductId {
        &self.entry.product_id
    }

    /// Get the entry type.
    pub fn entry_type(&self) -> EntryType {
        self.entry.entry_type
    }

    /// Get the entry timestamp.
    pub fn timestamp(&self) -> i64 {
        self.entry.timestamp
    }
}

/// Builder for creating chain entries.
#[derive(Debug, Clone)]
pub struct ChainEntryBuilder {
    product_id: ProductId,
    entry_type: EntryType,
    previous_entry_hash: Option<EntryHash>,
    current_owner: Ed25519PublicKey,
    next_owner: Option<Ed25519PublicKey>,
    timestamp: i64,
    metadata: Bytes,
}

impl ChainEntryBuilder {
    /// Start building an entry signed by `current_owner`.
    pub fn new(product_id: ProductId, entry_type: EntryType, current_owner: Ed25519PublicKey) -> Self {
        Self {
            product_id,
            entry_type,
            previous_entry_hash: None,
            current_owner,
            next_owner: None,
            timestamp: 0,
            metadata: Bytes::new(),
        }
    }

    /// Set the digest of the preceding entry.
    pub fn previous(mut self, hash: EntryHash) -> Self {
        self.previous_entry_hash = Some(hash);
        self
    }

    /// Set the next owner.
    pub fn next_owner(mut self, owner: Ed25519PublicKey) -> Self {
        self.next_owner = Some(owner);
        self
    }

    /// Set the timestamp.
    pub fn timestamp(mut self, ts: i64) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the metadata.
    pub fn metadata(mut self, m: impl Into<Bytes>) -> Self {
        self.metadata = m.into();
        self
    }

    /// The product this entry is for.
    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// The identity expected to sign.
    pub fn signer(&self) -> &Ed25519PublicKey {
        &self.current_owner
    }

    /// The timestamp that will be signed.
    pub fn signed_timestamp(&self) -> i64 {
        self.timestamp
    }

    fn resolved_next_owner(&self) -> Ed25519PublicKey {
        match (self.next_owner, self.entry_type) {
            (Some(owner), _) => owner,
            (None, EntryType::Retire) => Ed25519PublicKey::RETIRED,
            (None, _) => self.current_owner,
        }
    }

    fn unsigned(self) -> ChainEntry {
        let next_owner = self.resolved_next_owner();
        ChainEntry {
            version: ENTRY_VERSION,
            product_id: self.product_id,
            entry_type: self.entry_type,
            previous_entry_hash: self.previous_entry_hash,
            current_owner: self.current_owner,
            next_owner,
            timestamp: self.timestamp,
            metadata: self.metadata,
            signature: Ed25519Signature::ZERO,
        }
    }

    /// The digest an external signer must sign.
    pub fn digest(&self) -> EntryHash {
        self.clone().unsigned().digest()
    }

    /// Attach a signature produced elsewhere.
    pub fn with_signature(self, signature: Ed25519Signature) -> ChainEntry {
        let mut entry = self.unsigned();
        entry.signature = signature;
        entry
    }

    /// Build and sign the entry.
    pub fn sign(self, keypair: &Keypair) -> ChainEntry {
        let mut entry = self.unsigned();
        entry.signature = keypair.sign_digest(&entry.digest());
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product() -> ProductId {
        ProductId::new("bike-0042").unwrap()
    }

    #[test]
    fn test_entry_type_roundtrip() {
        for ty in [
            EntryType::Create,
            EntryType::Transfer,
            EntryType::Repair,
            EntryType::Retire,
        ] {
            assert_eq!(EntryType::from_u8(ty.to_u8()), Some(ty));
            assert_eq!(ty.as_str().parse::<EntryType>().unwrap(), ty);
        }
        assert_eq!(EntryType::from_u8(9), None);
        assert!("burn".parse::<EntryType>().is_err());
    }

    #[test]
    fn test_entry_type_parse_ignores_case() {
        assert_eq!("Transfer".parse::<EntryType>().unwrap(), EntryType::Transfer);
    }

    #[test]
    fn test_builder_signs_digest() {
        let maker = Keypair::from_seed(&[0x10; 32]);
        let owner = Keypair::from_seed(&[0x11; 32]);

        let entry = ChainEntryBuilder::new(product(), EntryType::Create, maker.public_key())
            .next_owner(owner.public_key())
            .timestamp(1_700_000_000_000)
            .metadata(b"serial plate photo".to_vec())
            .sign(&maker);

        assert!(entry.is_genesis());
        assert!(entry.changes_owner());
        assert!(maker
            .public_key()
            .verify_digest(&entry.digest(), &entry.signature)
            .unwrap());
    }

    #[test]
    fn test_builder_digest_matches_signed_entry() {
        let maker = Keypair::from_seed(&[0x12; 32]);
        let builder = ChainEntryBuilder::new(product(), EntryType::Repair, maker.public_key())
            .previous(EntryHash::from_bytes([0xaa; 32]))
            .timestamp(5);

        let digest = builder.digest();
        let signature = maker.sign_digest(&digest);
        let entry = builder.with_signature(signature);

        assert_eq!(entry.digest(), digest);
        assert_eq!(entry.next_owner, maker.public_key());
        assert!(!entry.changes_owner());
    }

    #[test]
    fn test_retire_defaults_to_sentinel() {
        let owner = Keypair::from_seed(&[0x13; 32]);
        let entry = ChainEntryBuilder::new(product(), EntryType::Retire, owner.public_key())
            .previous(EntryHash::from_bytes([0xbb; 32]))
            .sign(&owner);

        assert!(entry.is_terminal());
        assert!(entry.next_owner.is_retired());
    }

    #[test]
    fn test_signature_excluded_from_digest() {
        let owner = Keypair::from_seed(&[0x14; 32]);
        let mut entry = ChainEntryBuilder::new(product(), EntryType::Repair, owner.public_key())
            .previous(EntryHash::from_bytes([0xcc; 32]))
            .sign(&owner);
        let before = entry.digest();

        entry.signature = Ed25519Signature::ZERO;
        assert_eq!(entry.digest(), before);

        entry.metadata = Bytes::from_static(b"edited");
        assert_ne!(entry.digest(), before);
    }
}
