//! Cryptographic primitives for the provenance ledger.
//!
//! Wraps Ed25519 signing and verification with strong types. Owners are
//! identified by their Ed25519 public key; entries are signed over their
//! 32-byte digest.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::types::EntryHash;

/// Length of an Ed25519 public key in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// A 32-byte Ed25519 public key: the public identity of an owner.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    /// Reserved identity a product is assigned to when it is retired.
    ///
    /// No keypair maps to it, so a retired product can never be extended.
    pub const RETIRED: Self = Self([0u8; 32]);

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, rejecting anything that is not 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Whether this is the retirement sentinel.
    pub fn is_retired(&self) -> bool {
        *self == Self::RETIRED
    }

    /// Verify a signature over an entry digest.
    ///
    /// Returns `Ok(false)` when the signature is well-formed but does not
    /// match. Returns `Err(InvalidPublicKey)` when the key bytes are not a
    /// valid curve point.
    pub fn verify_digest(
        &self,
        digest: &EntryHash,
        signature: &Ed25519Signature,
    ) -> Result<bool, CoreError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        let sig = Signature::from_bytes(&signature.0);

        Ok(verifying_key.verify_strict(digest.as_bytes(), &sig).is_ok())
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_retired() {
            return write!(f, "Ed25519Pub(RETIRED)");
        }
        write!(f, "Ed25519Pub({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Ed25519PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Ed25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ed25519Signature(#[serde(with = "signature_bytes")] pub [u8; 64]);

impl Ed25519Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, rejecting anything that is not 64 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidSignatureLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// The zero signature (invalid, used as placeholder).
    pub const ZERO: Self = Self([0u8; 64]);
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Ed25519Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 64]> for Ed25519Signature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

// serde only derives array impls up to 32 elements.
mod signature_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 64], D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| D::Error::invalid_length(bytes.len(), &"64 bytes"))
    }
}

/// Verify a signature given as raw bytes.
///
/// This is the entry point for untyped input (e.g. decoded from a request).
/// Wrong-length keys or signatures and keys that are not curve points are
/// structural errors; a well-formed signature that does not match yields
/// `Ok(false)`.
pub fn verify_raw(signature: &[u8], digest: &EntryHash, public_key: &[u8]) -> Result<bool, CoreError> {
    let key = Ed25519PublicKey::from_slice(public_key)?;
    let sig = Ed25519Signature::from_slice(signature)?;
    key.verify_digest(digest, &sig)
}

/// A keypair for signing chain entries.
///
/// Key custody lives outside the ledger; this type exists for signers and
/// tests. It wraps ed25519-dalek's SigningKey.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Get the public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign an entry digest.
    pub fn sign_digest(&self, digest: &EntryHash) -> Ed25519Signature {
        let sig = self.signing_key.sign(digest.as_bytes());
        Ed25519Signature(sig.to_bytes())
    }

    /// Get the raw seed bytes (secret key material).
    pub fn seed(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}
