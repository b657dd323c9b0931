//! Proptest generators for property-based testing.

use proptest::prelude::*;

use provenance_core::{
    ChainEntry, ChainEntryBuilder, Ed25519PublicKey, EntryHash, EntryType, Keypair, ProductId,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Ed25519PublicKey.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a random EntryHash.
pub fn entry_hash() -> impl Strategy<Value = EntryHash> {
    any::<[u8; 32]>().prop_map(EntryHash::from_bytes)
}

/// Generate a valid product identifier.
pub fn product_id() -> impl Strategy<Value = ProductId> {
    "[A-Za-z0-9][A-Za-z0-9._-]{0,39}"
        .prop_filter_map("valid product id", |s| ProductId::new(s).ok())
}

/// Generate an EntryType.
pub fn entry_type() -> impl Strategy<Value = EntryType> {
    prop_oneof![
        Just(EntryType::Create),
        Just(EntryType::Transfer),
        Just(EntryType::Repair),
        Just(EntryType::Retire),
    ]
}

/// Generate metadata bytes of specified max length.
pub fn metadata(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// One step after genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustodyStep {
    /// Hand over to the party at this index (modulo the cast size).
    Transfer(usize),
    Repair,
}

fn custody_step() -> impl Strategy<Value = CustodyStep> {
    prop_oneof![
        3 => any::<usize>().prop_map(CustodyStep::Transfer),
        1 => Just(CustodyStep::Repair),
    ]
}

/// A product's life, from genesis to an optional retirement.
#[derive(Debug, Clone)]
pub struct CustodyPlan {
    pub product_id: ProductId,
    /// Number of parties; party 0 manufactures, party 1 receives it.
    pub parties: usize,
    pub steps: Vec<CustodyStep>,
    /// Milliseconds between consecutive entries (zero allowed).
    pub gaps: Vec<i64>,
    pub start: i64,
    pub metadata: Vec<u8>,
    pub retire: bool,
}

impl Arbitrary for CustodyPlan {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            product_id(),
            2usize..=5,
            prop::collection::vec((custody_step(), 0i64..=10_000), 0..12),
            0i64..=1_700_000_000_000i64,
            metadata(64),
            any::<bool>(),
        )
            .prop_map(|(product_id, parties, steps, start, metadata, retire)| {
                let (steps, gaps): (Vec<CustodyStep>, Vec<i64>) = steps.into_iter().unzip();
                CustodyPlan {
                    product_id,
                    parties,
                    steps,
                    gaps,
                    start,
                    metadata,
                    retire,
                }
            })
            .boxed()
    }
}

impl CustodyPlan {
    /// The cast, with distinct deterministic keys.
    pub fn keypairs(&self) -> Vec<Keypair> {
        (0..self.parties)
            .map(|i| Keypair::from_seed(&[i as u8 + 1; 32]))
            .collect()
    }
}

/// Build the signed chain a plan describes. Always valid.
pub fn chain_from_plan(plan: &CustodyPlan) -> Vec<ChainEntry> {
    let keys = plan.keypairs();
    let n = keys.len();
    let mut clock = plan.start;

    let genesis = ChainEntryBuilder::new(plan.product_id.clone(), EntryType::Create, keys[0].public_key())
        .next_owner(keys[1].public_key())
        .timestamp(clock)
        .metadata(plan.metadata.clone())
        .sign(&keys[0]);

    let mut holder = 1;
    let mut tail = genesis.digest();
    let mut chain = vec![genesis];

    for (step, gap) in plan.steps.iter().zip(&plan.gaps) {
        clock += gap;
        let builder = ChainEntryBuilder::new(
            plan.product_id.clone(),
            match step {
                CustodyStep::Transfer(_) => EntryType::Transfer,
                CustodyStep::Repair => EntryType::Repair,
            },
            keys[holder].public_key(),
        )
        .previous(tail)
        .timestamp(clock);

        let (builder, next_holder) = match *step {
            CustodyStep::Transfer(to) => {
                let mut to = to % n;
                if to == holder {
                    to = (to + 1) % n;
                }
                (builder.next_owner(keys[to].public_key()), to)
            }
            CustodyStep::Repair => (builder.metadata(b"serviced".to_vec()), holder),
        };

        let entry = builder.sign(&keys[holder]);
        tail = entry.digest();
        chain.push(entry);
        holder = next_holder;
    }

    if plan.retire {
        let entry = ChainEntryBuilder::new(plan.product_id.clone(), EntryType::Retire, keys[holder].public_key())
            .previous(tail)
            .timestamp(clock)
            .sign(&keys[holder]);
        chain.push(entry);
    }

    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use provenance_core::verify_chain;

    proptest! {
        #[test]
        fn generated_chains_are_valid(plan: CustodyPlan) {
            let chain = chain_from_plan(&plan);
            prop_assert_eq!(chain.len(), 1 + plan.steps.len() + usize::from(plan.retire));
            prop_assert!(verify_chain(&chain).is_ok());
        }
    }
}
