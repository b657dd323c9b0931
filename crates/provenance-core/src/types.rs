//! Strong type definitions for the provenance ledger.
//!
//! Identifiers are newtypes so a product id can never be confused with an
//! owner identity or a digest at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Rejection;

/// Maximum length of a product identifier in bytes.
pub const MAX_PRODUCT_ID_LEN: usize = 128;

/// A 32-byte entry digest, computed as Blake3(domain || canonical_entry_bytes).
///
/// The digest covers every field of an entry except its signature. It is the
/// value the next entry in the chain must name as its predecessor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryHash(pub [u8; 32]);

impl EntryHash {
    /// Create a new EntryHash from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
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
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for EntryHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for EntryHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for EntryHash {
    type Error = std::array::TryFromSliceError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; 32] = slice.try_into()?;
        Ok(Self(arr))
    }
}

/// Stable product identifier, assigned at creation and never changed.
///
/// Any non-empty UTF-8 string up to [`MAX_PRODUCT_ID_LEN`] bytes without
/// control characters (serial numbers, SKUs, URNs).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProductId(String);

impl ProductId {
    /// Validate and wrap a product identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, Rejection> {
        let id = id.into();
        if id.is_empty() {
            return Err(Rejection::StructurallyInvalidInput(
                "product id is empty".into(),
            ));
        }
        if id.len() > MAX_PRODUCT_ID_LEN {
            return Err(Rejection::StructurallyInvalidInput(format!(
                "product id exceeds {} bytes",
                MAX_PRODUCT_ID_LEN
            )));
        }
        if id.chars().any(char::is_control) {
            return Err(Rejection::StructurallyInvalidInput(
                "product id contains control characters".into(),
            ));
        }
        Ok(Self(id))
    }

    /// Borrow as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProductId({})", self.0)
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ProductId {
    type Error = Rejection;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ProductId {
    type Error = Rejection;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
