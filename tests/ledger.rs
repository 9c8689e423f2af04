//! Ledger behavior against a real (in-memory) store.

mod common;

use common::{config, ledger_entries, member_total, memory_store, seed_member};
use rubbs::orm::points;
use rubbs::point::{self, GrantOutcome, RelKey};

#[tokio::test]
async fn grant_records_one_entry_per_rel_key() {
    let db = memory_store().await;
    let config = config();
    seed_member(&db, "alice").await;
    let rel = RelKey::board("free", 10, "write");

    let first = point::grant(&db, &config, "alice", 50, "free 10 write", Some(&rel), None)
        .await
        .unwrap();
    assert_eq!(first, GrantOutcome::Granted { balance: 50 });

    let second = point::grant(&db, &config, "alice", 50, "free 10 write", Some(&rel), None)
        .await
        .unwrap();
    assert_eq!(second, GrantOutcome::AlreadyGranted);

    assert_eq!(ledger_entries(&db, "alice").await.len(), 1);
    assert_eq!(member_total(&db, "alice").await, 50);
}

#[tokio::test]
async fn reversing_a_debit_releases_the_consumed_credit() {
    let db = memory_store().await;
    let config = config();
    seed_member(&db, "alice").await;

    point::grant(&db, &config, "alice", 100, "welcome", None, None)
        .await
        .unwrap();
    let charge = RelKey::board("free", 10, "read");
    point::grant(&db, &config, "alice", -30, "free 10 read", Some(&charge), None)
        .await
        .unwrap();

    // The charge was allocated onto the credit.
    let entries = ledger_entries(&db, "alice").await;
    assert_eq!(entries[0].use_point, 30);
    assert_eq!(member_total(&db, "alice").await, 70);

    // Refund: the allocation must come back, not just the total.
    assert!(point::reverse(&db, &config, "alice", &charge).await.unwrap());

    let entries = ledger_entries(&db, "alice").await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].use_point, 0);
    assert_eq!(entries[0].expired, points::LIVE);
    assert_eq!(member_total(&db, "alice").await, 100);
}

#[tokio::test]
async fn cached_total_matches_the_entry_sum() {
    let db = memory_store().await;
    let config = config();
    seed_member(&db, "alice").await;

    point::grant(&db, &config, "alice", 100, "welcome", None, None)
        .await
        .unwrap();
    point::grant(
        &db,
        &config,
        "alice",
        -30,
        "free 10 read",
        Some(&RelKey::board("free", 10, "read")),
        None,
    )
    .await
    .unwrap();
    point::grant(
        &db,
        &config,
        "alice",
        20,
        "free 11 write",
        Some(&RelKey::board("free", 11, "write")),
        None,
    )
    .await
    .unwrap();

    let entries = ledger_entries(&db, "alice").await;
    let sum: i64 = entries.iter().map(|e| e.point).sum();
    assert_eq!(sum, 90);
    assert_eq!(member_total(&db, "alice").await, 90);
    // Every entry snapshots the running balance at its insertion.
    assert_eq!(
        entries.iter().map(|e| e.member_point).collect::<Vec<_>>(),
        vec![100, 70, 90]
    );
}

#[tokio::test]
async fn reverse_then_grant_replays_the_balance_chain() {
    let db = memory_store().await;
    let config = config();
    seed_member(&db, "alice").await;

    point::grant(&db, &config, "alice", 100, "welcome", None, None)
        .await
        .unwrap();
    let rel = RelKey::board("free", 12, "write");
    point::grant(&db, &config, "alice", 50, "free 12 write", Some(&rel), None)
        .await
        .unwrap();

    assert!(point::reverse(&db, &config, "alice", &rel).await.unwrap());
    assert_eq!(member_total(&db, "alice").await, 100);

    // Re-granting under the same key lands as if the first grant never
    // happened: same balances, same snapshots.
    let again = point::grant(&db, &config, "alice", 50, "free 12 write", Some(&rel), None)
        .await
        .unwrap();
    assert_eq!(again, GrantOutcome::Granted { balance: 150 });

    let entries = ledger_entries(&db, "alice").await;
    assert_eq!(
        entries.iter().map(|e| e.member_point).collect::<Vec<_>>(),
        vec![100, 150]
    );
    assert_eq!(member_total(&db, "alice").await, 150);
}
