//! Concurrent submissions: one winner per tail, products independent.

use std::sync::Arc;

use anyhow::Result;
use provenance::{LedgerError, Rejection};
use provenance_core::EntryType;
use provenance_store::Store;
use provenance_testkit::{ChainScript, Party, TestFixture};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn conflicting_transfers_have_exactly_one_winner() -> Result<()> {
    let f = TestFixture::new();
    let ledger = Arc::new(f.memory_ledger());
    let mut script = ChainScript::new("P1", 1_000);
    ledger.submit(script.create(&f.maker, &f.alice)).await?;

    // Alice signs competing sales of the same product to eight buyers.
    let buyers: Vec<Party> = (0..8).map(|i| Party::new(format!("buyer-{}", i), 0x60 + i)).collect();
    let handles: Vec<_> = buyers
        .iter()
        .map(|buyer| {
            let entry = script
                .next(EntryType::Transfer, &f.alice)
                .next_owner(buyer.key())
                .sign(&f.alice.keypair);
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.submit(entry).await })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => accepted += 1,
            Err(LedgerError::Rejected(Rejection::LinkageBroken { .. }))
            | Err(LedgerError::Rejected(Rejection::OwnershipMismatch { .. })) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(ledger.history_of(script.product_id()).await?.len(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_products_proceed_in_parallel() -> Result<()> {
    let f = Arc::new(TestFixture::new());
    let ledger = Arc::new(f.memory_ledger());

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let f = Arc::clone(&f);
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let mut script = ChainScript::new(&format!("P{:02}", i), 1_000);
                ledger.submit(script.create(&f.maker, &f.alice)).await?;
                ledger.submit(script.transfer(&f.alice, &f.bob)).await?;
                ledger.submit(script.repair(&f.bob, "inspection")).await?;
                Ok::<_, LedgerError>(())
            })
        })
        .collect();

    for handle in handles {
        handle.await??;
    }

    assert_eq!(ledger.list_products().await?.len(), 16);
    assert_eq!(ledger.store().entry_count().await?, 48);
    for product in ledger.list_products().await? {
        assert!(ledger.audit(&product).await?.is_intact());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_genesis_has_one_winner() -> Result<()> {
    let f = TestFixture::new();
    let ledger = Arc::new(f.sqlite_ledger());

    let owners = [&f.alice, &f.bob, &f.carol];
    let handles: Vec<_> = owners
        .iter()
        .map(|owner| {
            let entry = ChainScript::new("P1", 1_000).create(&f.maker, owner);
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move { ledger.submit(entry).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await?);
    }

    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| e.code() == "DuplicateGenesis"));
    Ok(())
}
