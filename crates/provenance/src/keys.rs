//! Key directory: maps identities named by callers to Ed25519 public keys.
//!
//! The ledger never holds private keys. It only needs to know which public
//! key an alias such as `"acme-bikes"` stands for.

use std::collections::HashMap;

use provenance_core::crypto::PUBLIC_KEY_LEN;
use provenance_core::Ed25519PublicKey;

/// Resolves an identity string to a public key.
pub trait KeyDirectory: Send + Sync {
    /// The key registered under `alias`, if any.
    fn lookup(&self, alias: &str) -> Option<Ed25519PublicKey>;

    /// Resolve an identity: a 64-char hex key stands for itself, anything
    /// else is looked up as an alias.
    fn resolve(&self, identity: &str) -> Option<Ed25519PublicKey> {
        let identity = identity.trim();
        if identity.len() == PUBLIC_KEY_LEN * 2 {
            if let Ok(key) = Ed25519PublicKey::from_hex(identity) {
                return Some(key);
            }
        }
        self.lookup(identity)
    }
}

/// A fixed alias table.
#[derive(Debug, Clone, Default)]
pub struct StaticKeyDirectory {
    aliases: HashMap<String, Ed25519PublicKey>,
}

impl StaticKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `alias`, replacing any previous key.
    pub fn insert(&mut self, alias: impl Into<String>, key: Ed25519PublicKey) {
        self.aliases.insert(alias.into(), key);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, alias: impl Into<String>, key: Ed25519PublicKey) -> Self {
        self.insert(alias, key);
        self
    }

    /// The first alias registered for `key`, for display.
    pub fn alias_of(&self, key: &Ed25519PublicKey) -> Option<&str> {
        let mut names: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(_, k)| *k == key)
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names.first().copied()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl KeyDirectory for StaticKeyDirectory {
    fn lookup(&self, alias: &str) -> Option<Ed25519PublicKey> {
        self.aliases.get(alias).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_core::Keypair;

    #[test]
    fn test_resolve_hex_and_alias() {
        let maker = Keypair::from_seed(&[5; 32]).public_key();
        let dir = StaticKeyDirectory::new().with("acme-bikes", maker);

        assert_eq!(dir.resolve("acme-bikes"), Some(maker));
        assert_eq!(dir.resolve(&maker.to_hex()), Some(maker));
        assert_eq!(dir.resolve(&format!("  {}  ", maker.to_hex())), Some(maker));
        assert_eq!(dir.resolve("unknown"), None);
        assert_eq!(dir.alias_of(&maker), Some("acme-bikes"));
    }

    #[test]
    fn test_bad_hex_falls_back_to_alias() {
        let key = Keypair::from_seed(&[6; 32]).public_key();
        let odd = "z".repeat(64);
        let dir = StaticKeyDirectory::new().with(odd.clone(), key);
        assert_eq!(dir.resolve(&odd), Some(key));
    }
}
