//! Front-end submissions.
//!
//! A [`SubmitRequest`] carries an entry as a web client sends it: strings for
//! identities and hashes, hex for the signature. The ledger turns it into a
//! [`ChainEntry`] and submits it with full validation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use provenance_core::{
    AcceptedEntry, ChainEntry, Ed25519PublicKey, Ed25519Signature, EntryHash, EntryType,
    ProductId, Rejection, ENTRY_VERSION,
};
use provenance_store::Store;

use crate::error::{LedgerError, Result};
use crate::keys::KeyDirectory;
use crate::ledger::Ledger;

/// A signed entry as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub product_id: String,
    /// `create`, `transfer`, `repair` or `retire`.
    pub entry_type: String,
    /// Hex key or alias. Optional for Repair and Retire.
    #[serde(default)]
    pub next_owner: Option<String>,
    /// UTF-8 application data.
    #[serde(default)]
    pub metadata: String,
    /// Hex digest of the tail the signer saw; absent for Create.
    #[serde(default)]
    pub previous_entry_hash: Option<String>,
    /// The signed timestamp, Unix milliseconds.
    pub timestamp: i64,
    /// Hex Ed25519 signature over the entry digest.
    pub signature: String,
    /// Hex key or alias of the party that signed.
    pub declared_signer: String,
}

impl SubmitRequest {
    /// Parse a request from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            Rejection::StructurallyInvalidInput(format!("malformed request: {}", e)).into()
        })
    }

    /// Resolve identities and decode fields into an entry.
    pub fn to_entry(&self, keys: &dyn KeyDirectory) -> Result<ChainEntry> {
        let product_id = ProductId::new(self.product_id.as_str())?;
        let entry_type: EntryType = self.entry_type.parse()?;
        let signer = resolve(keys, "declared signer", &self.declared_signer)?;

        let next_owner = match (&self.next_owner, entry_type) {
            (Some(identity), _) => resolve(keys, "next owner", identity)?,
            (None, EntryType::Repair) => signer,
            (None, EntryType::Retire) => Ed25519PublicKey::RETIRED,
            (None, _) => {
                return Err(structural(format!("{} requires a next owner", entry_type)));
            }
        };

        let previous_entry_hash = self
            .previous_entry_hash
            .as_deref()
            .map(|hex| {
                EntryHash::from_hex(hex.trim())
                    .map_err(|e| structural(format!("previous entry hash: {}", e)))
            })
            .transpose()?;

        let signature = Ed25519Signature::from_hex(self.signature.trim()).map_err(Rejection::from)?;

        Ok(ChainEntry {
            version: ENTRY_VERSION,
            product_id,
            entry_type,
            previous_entry_hash,
            current_owner: signer,
            next_owner,
            timestamp: self.timestamp,
            metadata: Bytes::from(self.metadata.clone().into_bytes()),
            signature,
        })
    }
}

fn structural(detail: String) -> LedgerError {
    Rejection::StructurallyInvalidInput(detail).into()
}

fn resolve(keys: &dyn KeyDirectory, role: &str, identity: &str) -> Result<Ed25519PublicKey> {
    keys.resolve(identity)
        .ok_or_else(|| structural(format!("unknown {}: {}", role, identity)))
}

impl<S: Store> Ledger<S> {
    /// Submit a client request.
    ///
    /// The declared signer becomes the entry's `current_owner`, so it must be
    /// the product's current holder and the signature must be theirs.
    pub async fn submit_request(&self, request: &SubmitRequest) -> Result<AcceptedEntry> {
        let entry = request.to_entry(self.keys())?;
        self.submit(entry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::keys::StaticKeyDirectory;
    use provenance_core::{ChainEntryBuilder, Keypair};
    use provenance_store::MemoryStore;

    fn keys(maker: &Keypair, alice: &Keypair) -> StaticKeyDirectory {
        StaticKeyDirectory::new()
            .with("maker", maker.public_key())
            .with("alice", alice.public_key())
    }

    fn signed_create(maker: &Keypair, alice: &Keypair, ts: i64) -> SubmitRequest {
        let entry = ChainEntryBuilder::new(
            ProductId::new("P1").unwrap(),
            EntryType::Create,
            maker.public_key(),
        )
        .next_owner(alice.public_key())
        .timestamp(ts)
        .metadata("built")
        .sign(maker);

        SubmitRequest {
            product_id: "P1".into(),
            entry_type: "create".into(),
            next_owner: Some("alice".into()),
            metadata: "built".into(),
            previous_entry_hash: None,
            timestamp: ts,
            signature: entry.signature.to_hex(),
            declared_signer: "maker".into(),
        }
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "productId": "P1",
            "entryType": "retire",
            "previousEntryHash": "00000000000000000000000000000000000000000000000000000000000000aa",
            "timestamp": 7,
            "signature": "00",
            "declaredSigner": "alice"
        }"#;
        let request = SubmitRequest::from_json(json).unwrap();
        assert_eq!(request.entry_type, "retire");
        assert_eq!(request.next_owner, None);
        assert_eq!(request.metadata, "");

        assert!(SubmitRequest::from_json("{}").is_err());
    }

    #[test]
    fn test_to_entry_defaults() {
        let maker = Keypair::from_seed(&[1; 32]);
        let alice = Keypair::from_seed(&[2; 32]);
        let dir = keys(&maker, &alice);

        let mut request = signed_create(&maker, &alice, 1);
        request.entry_type = "retire".into();
        request.next_owner = None;
        request.declared_signer = "alice".into();
        let entry = request.to_entry(&dir).unwrap();
        assert!(entry.next_owner.is_retired());
        assert_eq!(entry.current_owner, alice.public_key());

        request.entry_type = "transfer".into();
        let err = request.to_entry(&dir).unwrap_err();
        assert_eq!(err.code(), "StructurallyInvalidInput");

        request.entry_type = "gift".into();
        assert!(request.to_entry(&dir).is_err());
    }

    #[test]
    fn test_to_entry_rejects_bad_signature_hex() {
        let maker = Keypair::from_seed(&[1; 32]);
        let alice = Keypair::from_seed(&[2; 32]);
        let mut request = signed_create(&maker, &alice, 1);
        request.signature = "abcd".into();

        let err = request.to_entry(&keys(&maker, &alice)).unwrap_err();
        assert_eq!(err.code(), "StructurallyInvalidInput");
    }

    #[tokio::test]
    async fn test_submit_request_accepts_signed_create() {
        let maker = Keypair::from_seed(&[1; 32]);
        let alice = Keypair::from_seed(&[2; 32]);
        let ledger =
            Ledger::with_key_directory(MemoryStore::new(), LedgerConfig::default(), keys(&maker, &alice));

        let accepted = ledger
            .submit_request(&signed_create(&maker, &alice, 1_000))
            .await
            .unwrap();
        assert_eq!(accepted.entry.next_owner, alice.public_key());
        assert_eq!(&accepted.entry.metadata[..], b"built");
    }

    #[tokio::test]
    async fn test_submit_request_wrong_declared_signer() {
        let maker = Keypair::from_seed(&[1; 32]);
        let alice = Keypair::from_seed(&[2; 32]);
        let ledger =
            Ledger::with_key_directory(MemoryStore::new(), LedgerConfig::default(), keys(&maker, &alice));

        // Signed by the maker, but claims to come from Alice.
        let mut request = signed_create(&maker, &alice, 1_000);
        request.declared_signer = "alice".into();
        request.next_owner = Some("maker".into());

        let err = ledger.submit_request(&request).await.unwrap_err();
        assert_eq!(err.code(), "InvalidSignature");
        assert!(ledger.list_products().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_request_detects_edited_metadata() {
        let maker = Keypair::from_seed(&[1; 32]);
        let alice = Keypair::from_seed(&[2; 32]);
        let ledger =
            Ledger::with_key_directory(MemoryStore::new(), LedgerConfig::default(), keys(&maker, &alice));

        let mut request = signed_create(&maker, &alice, 1_000);
        request.metadata = "tampered".into();
        let err = ledger.submit_request(&request).await.unwrap_err();
        assert_eq!(err.code(), "InvalidSignature");
    }
}
