//! Concurrent access tests for the transfer engine.
//!
//! These tests verify that:
//! - Opposite-direction transfers between the same two accounts never deadlock
//! - Reversals racing fresh transfers in the other direction never deadlock
//! - Concurrent debits of one account never overdraw it
//! - The sum of balances is conserved regardless of execution order

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_core::ledger::{LedgerError, LedgerSettings, TransferStatus};
use tally_shared::types::CurrencyCode;
use tokio::sync::Barrier;

mod common;

use common::{balance, funded_account, ledger, ledger_with, reversal, settings, transfer};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_opposite_direction_transfers_do_not_deadlock() {
    // No lock timeout: a deadlock would hang until the test deadline below.
    let ledger = Arc::new(ledger_with(LedgerSettings {
        lock_timeout: None,
        ..settings()
    }));
    let a = funded_account(&ledger, CurrencyCode::USD, dec!(1000)).await;
    let b = funded_account(&ledger, CurrencyCode::USD, dec!(1000)).await;

    let rounds = 50;
    let barrier = Arc::new(Barrier::new(rounds * 2));
    let mut tasks = Vec::with_capacity(rounds * 2);
    for i in 0..rounds {
        for (from, to, amount) in [(a.id, b.id, dec!(3)), (b.id, a.id, dec!(2))] {
            let ledger = Arc::clone(&ledger);
            let barrier = Arc::clone(&barrier);
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                let mut request = transfer(from, to, amount, CurrencyCode::USD);
                request.description = format!("round {i}");
                ledger.create_transfer(request).await
            }));
        }
    }

    let results = tokio::time::timeout(Duration::from_secs(30), join_all(tasks))
        .await
        .expect("transfers deadlocked");
    for result in results {
        result.unwrap().unwrap();
    }

    assert_eq!(balance(&ledger, a.id).await, dec!(950));
    assert_eq!(balance(&ledger, b.id).await, dec!(1050));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reversals_race_opposite_transfers_without_deadlock() {
    // A reversal debits the original destination. Locking by role instead of
    // by id would deadlock against the B -> A transfers below.
    let ledger = Arc::new(ledger_with(LedgerSettings {
        lock_timeout: None,
        ..settings()
    }));
    let a = funded_account(&ledger, CurrencyCode::USD, dec!(1000)).await;
    let b = funded_account(&ledger, CurrencyCode::USD, dec!(1000)).await;

    let rounds = 30;
    let mut originals = Vec::with_capacity(rounds);
    for _ in 0..rounds {
        let created = ledger
            .create_transfer(transfer(a.id, b.id, dec!(10), CurrencyCode::USD))
            .await
            .unwrap();
        originals.push(created.id);
    }
    assert_eq!(balance(&ledger, a.id).await, dec!(700));
    assert_eq!(balance(&ledger, b.id).await, dec!(1300));

    let barrier = Arc::new(Barrier::new(rounds * 2));
    let mut tasks = Vec::with_capacity(rounds * 2);
    for &transfer_id in &originals {
        let ledger = Arc::clone(&ledger);
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            ledger
                .reverse_transfer(reversal(transfer_id, "customer refund"))
                .await
        }));
    }
    for _ in 0..rounds {
        let ledger = Arc::clone(&ledger);
        let barrier = Arc::clone(&barrier);
        tasks.push(tokio::spawn(async move {
            barrier.wait().await;
            ledger
                .create_transfer(transfer(b.id, a.id, dec!(5), CurrencyCode::USD))
                .await
        }));
    }

    let results = tokio::time::timeout(Duration::from_secs(30), join_all(tasks))
        .await
        .expect("reversals deadlocked against transfers");
    for result in results {
        result.unwrap().unwrap();
    }

    assert_eq!(balance(&ledger, a.id).await, dec!(1150));
    assert_eq!(balance(&ledger, b.id).await, dec!(850));
    assert_eq!(
        ledger.total_balance(CurrencyCode::USD).await.unwrap(),
        dec!(2000)
    );
    for transfer_id in originals {
        let stored = ledger.get_transfer(transfer_id).await.unwrap();
        assert_eq!(stored.status, TransferStatus::Reversed);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_debits_never_overdraw() {
    let ledger = Arc::new(ledger());
    let source = funded_account(&ledger, CurrencyCode::USD, dec!(100.00)).await;
    let sink = funded_account(&ledger, CurrencyCode::USD, dec!(0)).await;

    let attempts = 40;
    let barrier = Arc::new(Barrier::new(attempts));
    let tasks = (0..attempts).map(|_| {
        let ledger = Arc::clone(&ledger);
        let barrier = Arc::clone(&barrier);
        tokio::spawn(async move {
            barrier.wait().await;
            ledger
                .create_transfer(transfer(source.id, sink.id, dec!(7.00), CurrencyCode::USD))
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let succeeded = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(succeeded, 14);
    assert!(
        results
            .iter()
            .filter_map(|result| result.as_ref().err())
            .all(|err| matches!(err, LedgerError::InsufficientFunds { .. }))
    );
    assert_eq!(balance(&ledger, source.id).await, dec!(2.00));
    assert_eq!(balance(&ledger, sink.id).await, dec!(98.00));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ring_of_transfers_conserves_total() {
    let ledger = Arc::new(ledger());
    let mut accounts = Vec::new();
    for _ in 0..5 {
        accounts.push(funded_account(&ledger, CurrencyCode::EUR, dec!(100)).await);
    }
    let total_before = ledger.total_balance(CurrencyCode::EUR).await.unwrap();
    assert_eq!(total_before, dec!(500));

    let tasks = (0..100).map(|i| {
        let ledger = Arc::clone(&ledger);
        let from = accounts[i % 5].id;
        let to = accounts[(i * 3 + 1) % 5].id;
        let amount = Decimal::new(i64::try_from(i % 13 + 1).unwrap(), 1);
        tokio::spawn(async move {
            if from == to {
                return None;
            }
            Some(
                ledger
                    .create_transfer(transfer(from, to, amount, CurrencyCode::EUR))
                    .await,
            )
        })
    });
    for joined in join_all(tasks).await {
        if let Some(result) = joined.unwrap() {
            match result {
                Ok(_) | Err(LedgerError::InsufficientFunds { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
    }

    assert_eq!(
        ledger.total_balance(CurrencyCode::EUR).await.unwrap(),
        total_before
    );
    for account in &accounts {
        assert!(balance(&ledger, account.id).await >= Decimal::ZERO);
    }
}
