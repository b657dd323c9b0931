//! Canonical CBOR encoding for deterministic digests.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! The digest of an entry is `Blake3(DIGEST_DOMAIN || canonical_body)`, where
//! the body is the map of every field except the signature. Two parties that
//! construct the same entry in any field order get identical bytes.
//!
//! The transport form of an entry is `canonical_body || signature (64 bytes)`.

use bytes::Bytes;
use ciborium::value::{Integer, Value};

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, SIGNATURE_LEN};
use crate::entry::{ChainEntry, EntryType};
use crate::error::CoreError;
use crate::types::{EntryHash, ProductId};

/// Domain separation prefix for entry digests.
pub const DIGEST_DOMAIN: &[u8] = b"provenance/entry/v0";

/// Body field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const PRODUCT_ID: u64 = 1;
    pub const ENTRY_TYPE: u64 = 2;
    pub const PREVIOUS_ENTRY_HASH: u64 = 3;
    pub const CURRENT_OWNER: u64 = 4;
    pub const NEXT_OWNER: u64 = 5;
    pub const TIMESTAMP: u64 = 6;
    pub const METADATA: u64 = 7;
}

/// Encode the signed portion of an entry to canonical CBOR bytes.
pub fn canonical_body_bytes(entry: &ChainEntry) -> Vec<u8> {
    let value = body_to_cbor_value(entry);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value);
    buf
}

/// Compute the digest of an entry (all fields except the signature).
pub fn entry_digest(entry: &ChainEntry) -> EntryHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DIGEST_DOMAIN);
    hasher.update(&canonical_body_bytes(entry));
    EntryHash(*hasher.finalize().as_bytes())
}

/// Encode a complete entry: canonical_body || signature.
pub fn encode_entry(entry: &ChainEntry) -> Vec<u8> {
    let mut buf = canonical_body_bytes(entry);
    buf.extend_from_slice(&entry.signature.0);
    buf
}

/// Convert an entry body to a CBOR Value (map with integer keys).
fn body_to_cbor_value(entry: &ChainEntry) -> Value {
    let previous = match &entry.previous_entry_hash {
        Some(hash) => Value::Bytes(hash.0.to_vec()),
        None => Value::Null,
    };

    let entries = vec![
        (int_key(keys::VERSION), Value::Integer(entry.version.into())),
        (
            int_key(keys::PRODUCT_ID),
            Value::Text(entry.product_id.as_str().to_owned()),
        ),
        (
            int_key(keys::ENTRY_TYPE),
            Value::Integer(entry.entry_type.to_u8().into()),
        ),
        (int_key(keys::PREVIOUS_ENTRY_HASH), previous),
        (
            int_key(keys::CURRENT_OWNER),
            Value::Bytes(entry.current_owner.0.to_vec()),
        ),
        (
            int_key(keys::NEXT_OWNER),
            Value::Bytes(entry.next_owner.0.to_vec()),
        ),
        (int_key(keys::TIMESTAMP), Value::Integer(entry.timestamp.into())),
        (int_key(keys::METADATA), Value::Bytes(entry.metadata.to_vec())),
    ];

    Value::Map(entries)
}

fn int_key(key: u64) -> Value {
    Value::Integer(key.into())
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => {
            encode_uint(buf, 2, b.len() as u64);
            buf.extend_from_slice(b);
        }
        Value::Text(s) => {
            encode_uint(buf, 3, s.len() as u64);
            buf.extend_from_slice(s.as_bytes());
        }
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item);
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Tag(tag, inner) => {
            encode_uint(buf, 6, *tag);
            encode_value_to(buf, inner);
        }
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(f) => {
            // Never produced for entry bodies.
            buf.push(0xfb);
            buf.extend_from_slice(&f.to_be_bytes());
        }
        _ => buf.push(0xf7),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n = i128::from(i);

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}

/// Decode an entry from its transport form (canonical_body || signature).
///
/// Rejects bodies that are valid CBOR but not in canonical form, since their
/// digest would differ from what the signer saw.
pub fn decode_entry(bytes: &[u8]) -> Result<ChainEntry, CoreError> {
    if bytes.len() < SIGNATURE_LEN {
        return Err(CoreError::MalformedEntry("too short".into()));
    }

    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let mut entry = cbor_value_to_entry(&value)?;

    // Length of the body is known by re-encoding; it must match byte for byte.
    let body = canonical_body_bytes(&entry);
    if bytes.len() != body.len() + SIGNATURE_LEN {
        return Err(CoreError::MalformedEntry(
            "trailing bytes are not a 64-byte signature".into(),
        ));
    }
    if bytes[..body.len()] != body[..] {
        return Err(CoreError::MalformedEntry("non-canonical encoding".into()));
    }

    entry.signature = Ed25519Signature::from_slice(&bytes[body.len()..])?;
    Ok(entry)
}

/// Convert a CBOR Value (map) back to an entry with a zero signature.
fn cbor_value_to_entry(value: &Value) -> Result<ChainEntry, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedEntry("expected map".into())),
    };

    let get = |key: u64| -> Option<&Value> {
        map.iter()
            .find(|(k, _)| matches!(k, Value::Integer(i) if i128::from(*i) == key as i128))
            .map(|(_, v)| v)
    };

    let version = match get(keys::VERSION) {
        Some(Value::Integer(i)) => u8::try_from(*i)
            .map_err(|_| CoreError::MalformedEntry("version out of range".into()))?,
        _ => return Err(CoreError::MalformedEntry("missing version".into())),
    };

    let product_id = match get(keys::PRODUCT_ID) {
        Some(Value::Text(s)) => {
            ProductId::new(s.clone()).map_err(|e| CoreError::MalformedEntry(e.to_string()))?
        }
        _ => return Err(CoreError::MalformedEntry("invalid product_id".into())),
    };

    let entry_type = match get(keys::ENTRY_TYPE) {
        Some(Value::Integer(i)) => u8::try_from(*i)
            .ok()
            .and_then(EntryType::from_u8)
            .ok_or_else(|| CoreError::MalformedEntry("invalid entry_type".into()))?,
        _ => return Err(CoreError::MalformedEntry("missing entry_type".into())),
    };

    let previous_entry_hash = match get(keys::PREVIOUS_ENTRY_HASH) {
        Some(Value::Bytes(b)) => Some(
            EntryHash::try_from(b.as_slice())
                .map_err(|_| CoreError::MalformedEntry("invalid previous_entry_hash".into()))?,
        ),
        Some(Value::Null) => None,
        _ => return Err(CoreError::MalformedEntry("missing previous_entry_hash".into())),
    };

    let current_owner = match get(keys::CURRENT_OWNER) {
        Some(Value::Bytes(b)) => Ed25519PublicKey::from_slice(b)?,
        _ => return Err(CoreError::MalformedEntry("invalid current_owner".into())),
    };

    let next_owner = match get(keys::NEXT_OWNER) {
        Some(Value::Bytes(b)) => Ed25519PublicKey::from_slice(b)?,
        _ => return Err(CoreError::MalformedEntry("invalid next_owner".into())),
    };

    let timestamp = match get(keys::TIMESTAMP) {
        Some(Value::Integer(i)) => i64::try_from(*i)
            .map_err(|_| CoreError::MalformedEntry("timestamp out of range".into()))?,
        _ => return Err(CoreError::MalformedEntry("missing timestamp".into())),
    };

    let metadata = match get(keys::METADATA) {
        Some(Value::Bytes(b)) => Bytes::from(b.clone()),
        _ => return Err(CoreError::MalformedEntry("invalid metadata".into())),
    };

    Ok(ChainEntry {
        version,
        product_id,
        entry_type,
        previous_entry_hash,
        current_owner,
        next_owner,
        timestamp,
        metadata,
        signature: Ed25519Signature::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::entry::ChainEntryBuilder;

    fn sample_entry() -> ChainEntry {
        let maker = Keypair::from_seed(&[0x42; 32]);
        let owner = Keypair::from_seed(&[0x43; 32]);
        ChainEntryBuilder::new(
            ProductId::new("guitar-7731").unwrap(),
            EntryType::Create,
            maker.public_key(),
        )
        .next_owner(owner.public_key())
        .timestamp(1_736_870_400_000)
        .metadata(b"rosewood, 2024".to_vec())
        .sign(&maker)
    }

    #[test]
    fn test_canonical_encoding_deterministic() {
        let entry = sample_entry();
        assert_eq!(canonical_body_bytes(&entry), canonical_body_bytes(&entry));
        assert_eq!(entry_digest(&entry), entry_digest(&entry));
    }

    #[test]
    fn test_digest_is_domain_separated() {
        let entry = sample_entry();
        let plain = EntryHash(*blake3::hash(&canonical_body_bytes(&entry)).as_bytes());
        assert_ne!(entry_digest(&entry), plain);
    }

    #[test]
    fn test_integer_encoding() {
        let mut buf = Vec::new();

        encode_uint(&mut buf, 0, 23);
        assert_eq!(buf, vec![0x17]);

        buf.clear();
        encode_uint(&mut buf, 0, 24);
        assert_eq!(buf, vec![0x18, 24]);

        buf.clear();
        encode_uint(&mut buf, 0, 256);
        assert_eq!(buf, vec![0x19, 0x01, 0x00]);

        buf.clear();
        encode_integer(&mut buf, Integer::from(-1i64));
        assert_eq!(buf, vec![0x20]);
    }

    #[test]
    fn test_map_key_ordering() {
        let mut buf = Vec::new();
        let entries = vec![
            (Value::Integer(7.into()), Value::Null),
            (Value::Integer(0.into()), Value::Integer(0.into())),
            (Value::Integer(3.into()), Value::Bool(true)),
        ];
        encode_map_canonical(&mut buf, &entries);

        assert_eq!(buf, vec![0xa3, 0x00, 0x00, 0x03, 0xf5, 0x07, 0xf6]);
    }

    #[test]
    fn test_genesis_encodes_null_predecessor() {
        let body = canonical_body_bytes(&sample_entry());
        // key 3 followed by null
        assert!(body.windows(2).any(|w| w == [0x03, 0xf6]));
    }

    #[test]
    fn test_decode_restores_entry() {
        let entry = sample_entry();
        let decoded = decode_entry(&encode_entry(&entry)).unwrap();

        assert_eq!(decoded, entry);
        assert_eq!(decoded.digest(), entry.digest());
    }

    #[test]
    fn test_decode_rejects_truncated_signature() {
        let mut bytes = encode_entry(&sample_entry());
        bytes.pop();
        assert!(matches!(decode_entry(&bytes), Err(CoreError::MalformedEntry(_))));
    }

    #[test]
    fn test_decode_rejects_non_canonical_body() {
        let entry = sample_entry();
        let body = canonical_body_bytes(&entry);

        // Re-encode the version (0) with a needlessly long 1-byte form.
        let mut bad = vec![body[0], 0x00, 0x18, 0x00];
        bad.extend_from_slice(&body[3..]);
        bad.extend_from_slice(entry.signature.as_bytes());

        assert!(decode_entry(&bad).is_err());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let _ = decode_entry(&bytes);
            }

            #[test]
            fn truncated_encoding_is_rejected(cut in 1usize..64) {
                let bytes = encode_entry(&sample_entry());
                prop_assert!(decode_entry(&bytes[..bytes.len() - cut]).is_err());
            }

            #[test]
            fn digest_tracks_metadata(metadata in proptest::collection::vec(any::<u8>(), 0..128)) {
                let base = sample_entry();
                let mut edited = base.clone();
                edited.metadata = Bytes::from(metadata.clone());
                prop_assert_eq!(
                    entry_digest(&edited) == entry_digest(&base),
                    metadata[..] == base.metadata[..]
                );
            }
        }
    }
}
