//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a fixed cast of parties with
//! deterministic keys, and a script for writing well-formed chains.

use provenance::{Ledger, LedgerConfig, StaticKeyDirectory};
use provenance_core::{
    ChainEntry, ChainEntryBuilder, Ed25519PublicKey, EntryHash, EntryType, Keypair, ProductId,
};
use provenance_store::{MemoryStore, SqliteStore};

/// A named signer.
#[derive(Debug, Clone)]
pub struct Party {
    pub name: String,
    pub keypair: Keypair,
}

impl Party {
    /// A party whose key is derived from a single seed byte.
    pub fn new(name: impl Into<String>, seed: u8) -> Self {
        Self {
            name: name.into(),
            keypair: Keypair::from_seed(&[seed; 32]),
        }
    }

    pub fn key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }
}

/// A manufacturer and three later holders.
pub struct TestFixture {
    pub maker: Party,
    pub alice: Party,
    pub bob: Party,
    pub carol: Party,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            maker: Party::new("maker", 0x4d),
            alice: Party::new("alice", 0x41),
            bob: Party::new("bob", 0x42),
            carol: Party::new("carol", 0x43),
        }
    }

    pub fn parties(&self) -> [&Party; 4] {
        [&self.maker, &self.alice, &self.bob, &self.carol]
    }

    /// A directory with every party registered under its name.
    pub fn key_directory(&self) -> StaticKeyDirectory {
        self.parties()
            .into_iter()
            .fold(StaticKeyDirectory::new(), |dir, p| dir.with(p.name.clone(), p.key()))
    }

    pub fn memory_ledger(&self) -> Ledger<MemoryStore> {
        self.memory_ledger_with(LedgerConfig::default())
    }

    pub fn memory_ledger_with(&self, config: LedgerConfig) -> Ledger<MemoryStore> {
        Ledger::with_key_directory(MemoryStore::new(), config, self.key_directory())
    }

    /// A ledger over an in-memory SQLite database.
    pub fn sqlite_ledger(&self) -> Ledger<SqliteStore> {
        let store = SqliteStore::open_memory().expect("in-memory sqlite");
        Ledger::with_key_directory(store, LedgerConfig::default(), self.key_directory())
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes a product's chain step by step, linking each entry to the last.
///
/// The clock advances by one second per step.
pub struct ChainScript {
    product_id: ProductId,
    clock: i64,
    entries: Vec<ChainEntry>,
}

impl ChainScript {
    pub fn new(product: &str, start: i64) -> Self {
        Self {
            product_id: ProductId::new(product).expect("valid product id"),
            clock: start,
            entries: Vec::new(),
        }
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    /// Digest of the last scripted entry.
    pub fn tail_digest(&self) -> Option<EntryHash> {
        self.entries.last().map(ChainEntry::digest)
    }

    /// Timestamp the next entry will carry.
    pub fn now(&self) -> i64 {
        self.clock
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    /// Start a builder for the next entry without recording it.
    pub fn next(&self, entry_type: EntryType, signer: &Party) -> ChainEntryBuilder {
        let mut builder = ChainEntryBuilder::new(self.product_id.clone(), entry_type, signer.key())
            .timestamp(self.clock);
        if let Some(prev) = self.tail_digest() {
            builder = builder.previous(prev);
        }
        builder
    }

    /// Record a signed entry as the new tail.
    pub fn push(&mut self, entry: ChainEntry) -> ChainEntry {
        self.entries.push(entry.clone());
        self.clock += 1_000;
        entry
    }

    pub fn create(&mut self, maker: &Party, owner: &Party) -> ChainEntry {
        let entry = self
            .next(EntryType::Create, maker)
            .next_owner(owner.key())
            .metadata(format!("manufactured by {}", maker.name))
            .sign(&maker.keypair);
        self.push(entry)
    }

    pub fn transfer(&mut self, from: &Party, to: &Party) -> ChainEntry {
        let entry = self
            .next(EntryType::Transfer, from)
            .next_owner(to.key())
            .metadata(format!("{} -> {}", from.name, to.name))
            .sign(&from.keypair);
        self.push(entry)
    }

    pub fn repair(&mut self, holder: &Party, note: &str) -> ChainEntry {
        let entry = self
            .next(EntryType::Repair, holder)
            .metadata(note.to_string())
            .sign(&holder.keypair);
        self.push(entry)
    }

    pub fn retire(&mut self, holder: &Party) -> ChainEntry {
        let entry = self
            .next(EntryType::Retire, holder)
            .metadata("end of life")
            .sign(&holder.keypair);
        self.push(entry)
    }
}

/// Route `tracing` output to the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_core::verify_chain;

    #[test]
    fn test_script_links_entries() {
        let f = TestFixture::new();
        let mut script = ChainScript::new("P1", 1_000);

        let e0 = script.create(&f.maker, &f.alice);
        let e1 = script.transfer(&f.alice, &f.bob);
        let e2 = script.repair(&f.bob, "new tyres");
        let e3 = script.retire(&f.bob);

        assert_eq!(e0.previous_entry_hash, None);
        assert_eq!(e1.previous_entry_hash, Some(e0.digest()));
        assert_eq!(e2.previous_entry_hash, Some(e1.digest()));
        assert_eq!(e3.previous_entry_hash, Some(e2.digest()));
        assert!(e3.next_owner.is_retired());
        assert!(verify_chain(script.entries()).is_ok());
    }

    #[test]
    fn test_parties_are_distinct() {
        let f = TestFixture::new();
        let keys: std::collections::HashSet<_> = f.parties().iter().map(|p| p.key()).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(f.key_directory().len(), 4);
    }
}
