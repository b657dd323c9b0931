//! Property tests over generated custody histories.

use proptest::prelude::*;

use provenance::{LedgerError, Rejection};
use provenance_core::{decode_entry, encode_entry, verify_chain, EntryType};
use provenance_testkit::generators::{entry_hash, entry_type, keypair, metadata, product_id};
use provenance_testkit::{chain_from_plan, CustodyPlan, TestFixture};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ledger_accepts_every_valid_history(plan: CustodyPlan) {
        let chain = chain_from_plan(&plan);
        let ledger = TestFixture::new().memory_ledger();

        let history = runtime().block_on(async {
            for entry in &chain {
                ledger.submit(entry.clone()).await?;
            }
            ledger.history_of(&plan.product_id).await
        });

        let history = history.map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(history.len(), chain.len());
        for (i, accepted) in history.iter().enumerate() {
            prop_assert_eq!(accepted.seq, i as u64 + 1);
            prop_assert_eq!(accepted.digest, chain[i].digest());
        }
    }

    #[test]
    fn transport_encoding_preserves_digest_and_signature(plan: CustodyPlan) {
        for entry in chain_from_plan(&plan) {
            let decoded = decode_entry(&encode_entry(&entry))
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(decoded.digest(), entry.digest());
            prop_assert_eq!(decoded.signature, entry.signature);
        }
    }

    #[test]
    fn any_field_change_breaks_the_chain(plan: CustodyPlan, pick: prop::sample::Index, flip: u8) {
        let mut chain = chain_from_plan(&plan);
        let i = pick.index(chain.len());
        let mut metadata = chain[i].metadata.to_vec();
        metadata.push(flip);
        chain[i].metadata = metadata.into();

        let violation = verify_chain(&chain).expect_err("edited entry must not verify");
        prop_assert_eq!(violation.index, i);
    }

    #[test]
    fn appending_after_retire_is_always_closed(plan: CustodyPlan) {
        let plan = CustodyPlan { retire: true, ..plan };
        let chain = chain_from_plan(&plan);
        let last = chain.last().cloned().expect("non-empty chain");
        let keys = plan.keypairs();
        let ledger = TestFixture::new().memory_ledger();

        let outcome = runtime().block_on(async {
            for entry in &chain {
                ledger.submit(entry.clone()).await?;
            }
            let signer = keys
                .iter()
                .find(|k| k.public_key() == last.current_owner)
                .expect("retiring party is in the cast");
            let repair = provenance_core::ChainEntryBuilder::new(
                plan.product_id.clone(),
                EntryType::Repair,
                signer.public_key(),
            )
            .previous(last.digest())
            .timestamp(last.timestamp)
            .sign(signer);
            ledger.submit(repair).await
        });

        prop_assert!(matches!(
            outcome,
            Err(LedgerError::Rejected(Rejection::ChainClosed))
        ));
    }

    #[test]
    fn unanchored_entries_never_start_a_chain(
        product in product_id(),
        kind in entry_type(),
        previous in entry_hash(),
        signer in keypair(),
        next in keypair(),
        data in metadata(32),
        signed: bool,
    ) {
        let builder = provenance_core::ChainEntryBuilder::new(product, kind, signer.public_key())
            .previous(previous)
            .next_owner(next.public_key())
            .metadata(data);
        let entry = if signed {
            builder.sign(&signer)
        } else {
            builder.with_signature(provenance_core::Ed25519Signature::ZERO)
        };
        let ledger = TestFixture::new().memory_ledger();

        let (outcome, products) = runtime().block_on(async {
            let outcome = ledger.submit(entry).await;
            (outcome, ledger.list_products().await)
        });

        let code = outcome.err().map(|e| e.code());
        prop_assert!(
            matches!(code, Some("NotFound" | "LinkageBroken" | "InvalidSignature")),
            "unexpected outcome {:?}",
            code
        );
        prop_assert!(products.map_err(|e| TestCaseError::fail(e.to_string()))?.is_empty());
    }
}
