//! End-to-end runs against the in-memory document store.
//!
//! Snapshot → Ledger → Corrections/Duplicates → Batched writes → Report

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;

use stockwarden_infra::{
    CancelToken, InMemoryDocumentStore, InMemoryReportSink, ReconcileConfig, ReconcileError,
    ReconcileRun, RunPhase, RunStatus,
};

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn minutes_ago(m: i64) -> String {
    (now() - Duration::minutes(m)).to_rfc3339()
}

fn reserved(store: &InMemoryDocumentStore, id: &str) -> i64 {
    store.counter("products", id, "reservedStock").unwrap()
}

/// The four canonical situations side by side.
fn seeded_store() -> Arc<InMemoryDocumentStore> {
    let store = InMemoryDocumentStore::new();

    store.insert("products", "P1", json!({ "name": "Flour", "stock": 10, "reservedStock": 5 }));
    store.insert("products", "P2", json!({ "name": "Sugar", "stock": 10, "reservedStock": 1 }));
    store.insert("products", "P4", json!({ "name": "Salt", "stock": 10, "reservedStock": 1 }));

    store.insert(
        "orders",
        "O1",
        json!({ "status": "cancelled", "createdAt": minutes_ago(10),
                "items": [{ "productId": "P1", "quantity": 3 }] }),
    );
    store.insert(
        "orders",
        "O2",
        json!({ "status": "pending", "createdAt": minutes_ago(45),
                "items": [{ "productId": "P2", "quantity": 2 }] }),
    );
    store.insert(
        "orders",
        "O4",
        json!({ "status": "confirmed", "createdAt": minutes_ago(0),
                "items": [{ "productId": "P4", "quantity": 1 }] }),
    );

    store.insert("deliveries", "D-T2", json!({ "orderId": "O3", "status": "assigned", "createdAt": minutes_ago(20) }));
    store.insert("deliveries", "D-T1", json!({ "orderId": "O3", "status": "assigned", "createdAt": minutes_ago(30) }));
    store.insert("deliveries", "D-T3", json!({ "orderId": "O3", "status": "assigned", "createdAt": minutes_ago(10) }));

    Arc::new(store)
}

fn run(
    store: Arc<InMemoryDocumentStore>,
    config: ReconcileConfig,
) -> (ReconcileRun<Arc<InMemoryDocumentStore>, Arc<InMemoryReportSink>>, Arc<InMemoryReportSink>) {
    let sink = Arc::new(InMemoryReportSink::new());
    (ReconcileRun::new(store, sink.clone(), config), sink)
}

#[tokio::test]
async fn repairs_reservations_and_duplicate_deliveries() {
    let store = seeded_store();
    let (mut run, sink) = run(store.clone(), ReconcileConfig::default());

    let outcome = run.execute(now()).await.unwrap();

    assert_eq!(outcome.status(), RunStatus::Completed);
    assert_eq!(outcome.final_phase, RunPhase::Done);
    assert_eq!(reserved(&store, "P1"), 2);
    assert_eq!(reserved(&store, "P2"), 0);
    assert_eq!(reserved(&store, "P4"), 1);

    assert_eq!(store.len("deliveries"), 1);
    assert!(store.get("deliveries", "D-T1").is_some());

    assert!(store.get("reservation_releases", "products:O1:P1").is_some());
    assert_eq!(
        store.get("reservation_releases", "products:O2:P2").unwrap()["reason"],
        json!("expired-pending")
    );
    assert!(store.get("reservation_releases", "products:O4:P4").is_none());
    assert_eq!(store.len("reservation_releases"), 2);

    let report = sink.last().unwrap();
    assert_eq!(report, outcome.report);
    assert_eq!(report.counts.orders_scanned, 3);
    assert_eq!(report.counts.expired_pending, 1);
    assert_eq!(report.counts.products_corrected, 2);
    assert_eq!(report.counts.units_requested, 5);
    assert_eq!(report.counts.units_released, 4);
    assert_eq!(report.counts.duplicates_removed, 2);
    assert_eq!(report.counts.journal_entries, 2);
    assert_eq!(report.counts.planned_ops, 6);
    assert_eq!(report.expired_orders[0].age_minutes, 45);
    assert_eq!(report.expired_orders[0].units, 2);
    assert_eq!(report.duplicate_groups[0].survivor.as_str(), "D-T1");

    let apply = report.apply.as_ref().unwrap();
    assert_eq!(apply.committed_ops, 6);
    assert!(apply.is_complete());
    assert_eq!(report.stock_before.total_reserved, 7);
    assert_eq!(report.stock_after.as_ref().unwrap().total_reserved, 3);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let store = seeded_store();
    run(store.clone(), ReconcileConfig::default()).0.execute(now()).await.unwrap();
    let attempts = store.commit_attempts();

    let outcome = run(store.clone(), ReconcileConfig::default())
        .0
        .execute(now() + Duration::minutes(5))
        .await
        .unwrap();

    assert!(outcome.report.corrections.is_empty());
    assert!(outcome.report.duplicate_groups.is_empty());
    assert_eq!(outcome.report.counts.planned_ops, 0);
    assert_eq!(outcome.report.counts.already_released, 2);
    assert_eq!(outcome.report.counts.expired_pending, 0);
    assert_eq!(outcome.report.counts.must_release, 0);
    assert!(outcome.report.expired_orders.is_empty());
    assert_eq!(store.commit_attempts(), attempts);
    assert_eq!(reserved(&store, "P1"), 2);
}

#[tokio::test]
async fn snapshot_failure_aborts_before_any_write() {
    let store = seeded_store();
    store.fail_reads_of("deliveries");
    let (mut run, sink) = run(store.clone(), ReconcileConfig::default());

    let err = run.execute(now()).await.unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::SnapshotRead { ref collection, .. } if collection == "deliveries"
    ));
    assert_eq!(run.phase(), RunPhase::Failed);
    assert_eq!(store.commit_attempts(), 0);
    assert_eq!(reserved(&store, "P1"), 5);
    assert!(sink.last().is_none());
}

#[tokio::test]
async fn partial_failure_is_reported_and_rerun_completes() {
    let store = InMemoryDocumentStore::new();
    for i in 0..7 {
        store.insert("products", &format!("p{i}"), json!({ "stock": 5, "reservedStock": 2 }));
        store.insert(
            "orders",
            &format!("o{i}"),
            json!({ "status": "delivered", "items": [{ "productId": format!("p{i}"), "quantity": 2 }] }),
        );
    }
    let store = Arc::new(store);
    store.fail_commit_attempt(1);

    let config = ReconcileConfig::default().with_batch_size(2);
    let outcome = run(store.clone(), config.clone()).0.execute(now()).await.unwrap();

    assert_eq!(outcome.status(), RunStatus::PartiallyApplied);
    assert_eq!(outcome.final_phase, RunPhase::Failed);
    let apply = outcome.report.apply.clone().unwrap();
    assert_eq!(apply.committed_batches, 1);
    assert_eq!(apply.committed_ops, 2);
    assert_eq!(apply.failure.as_ref().unwrap().batch_index, 1);
    assert_eq!(reserved(&store, "p0"), 0);
    assert_eq!(reserved(&store, "p1"), 2);
    assert_eq!(store.len("reservation_releases"), 1);

    let outcome = run(store.clone(), config).0.execute(now()).await.unwrap();

    assert_eq!(outcome.status(), RunStatus::Completed);
    for i in 0..7 {
        assert_eq!(reserved(&store, &format!("p{i}")), 0);
    }
    assert_eq!(store.len("reservation_releases"), 7);
    assert_eq!(outcome.report.counts.products_corrected, 6);
    assert_eq!(outcome.report.counts.already_released, 1);
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let store = seeded_store();
    let (mut run, sink) = run(store.clone(), ReconcileConfig::default().with_dry_run(true));

    let outcome = run.execute(now()).await.unwrap();

    assert_eq!(outcome.status(), RunStatus::DryRun);
    assert_eq!(outcome.report.counts.planned_ops, 6);
    assert!(outcome.report.apply.is_none());
    assert!(outcome.report.stock_after.is_none());
    assert_eq!(store.commit_attempts(), 0);
    assert_eq!(reserved(&store, "P1"), 5);
    assert_eq!(store.len("deliveries"), 3);
    assert_eq!(sink.all().len(), 1);
}

#[tokio::test]
async fn cancellation_before_apply_has_no_effect() {
    let store = seeded_store();
    let cancel = CancelToken::new();
    cancel.cancel();
    let (run, _sink) = run(store.clone(), ReconcileConfig::default());
    let mut run = run.with_cancel_token(cancel);

    let err = run.execute(now()).await.unwrap_err();

    assert!(matches!(err, ReconcileError::Cancelled));
    assert_eq!(store.commit_attempts(), 0);
    assert_eq!(reserved(&store, "P1"), 5);
}

#[tokio::test]
async fn product_collection_can_be_overridden() {
    let store = InMemoryDocumentStore::new();
    store.insert("catalog_v2", "p1", json!({ "stock": 4, "reservedStock": 4 }));
    store.insert(
        "orders",
        "o1",
        json!({ "status": "cancelled",
                "createdAt": { "_seconds": now().timestamp() - 60, "_nanoseconds": 0 },
                "items": [{ "productId": "p1", "quantity": 1 }, { "productId": "p1", "quantity": 0 }] }),
    );
    let store = Arc::new(store);

    let config = ReconcileConfig::default().with_product_collection("catalog_v2");
    let outcome = run(store.clone(), config).0.execute(now()).await.unwrap();

    assert_eq!(store.counter("catalog_v2", "p1", "reservedStock"), Some(3));
    assert!(store.get("reservation_releases", "catalog_v2:o1:p1").is_some());
    assert_eq!(outcome.report.counts.malformed_records, 1);
    assert_eq!(outcome.report.corrections[0].name, "(unnamed)");
}

#[tokio::test]
async fn unknown_status_and_missing_products_are_left_alone() {
    let store = InMemoryDocumentStore::new();
    store.insert("products", "p1", json!({ "stock": 3, "reservedStock": 6 }));
    store.insert(
        "orders",
        "o1",
        json!({ "status": "awaiting_courier", "createdAt": minutes_ago(600),
                "items": [{ "productId": "p1", "quantity": 2 }] }),
    );
    store.insert(
        "orders",
        "o2",
        json!({ "status": "cancelled", "items": [{ "productId": "gone", "quantity": 2 }] }),
    );
    let store = Arc::new(store);

    let outcome = run(store.clone(), ReconcileConfig::default()).0.execute(now()).await.unwrap();

    assert_eq!(reserved(&store, "p1"), 6);
    assert!(outcome.report.corrections.is_empty());
    assert_eq!(outcome.report.counts.unknown_status, 1);
    assert_eq!(outcome.report.counts.anomalies, 3);
    assert_eq!(outcome.report.stock_before.products_with_errors, 1);
    assert_eq!(store.len("reservation_releases"), 0);
}

/// Four cancelled orders, one unit each, against products holding five.
fn one_unit_per_product_store(products: usize) -> Arc<InMemoryDocumentStore> {
    let store = InMemoryDocumentStore::new();
    for i in 0..products {
        store.insert("products", &format!("p{i}"), json!({ "stock": 9, "reservedStock": 5 }));
        store.insert(
            "orders",
            &format!("o{i}"),
            json!({ "status": "cancelled", "items": [{ "productId": format!("p{i}"), "quantity": 1 }] }),
        );
    }
    Arc::new(store)
}

#[tokio::test]
async fn rerun_after_partial_failure_releases_each_line_exactly_once() {
    let store = one_unit_per_product_store(4);
    store.fail_commit_attempt(1);
    let config = ReconcileConfig::default().with_batch_size(2);

    let first = run(store.clone(), config.clone()).0.execute(now()).await.unwrap();
    let apply = first.report.apply.clone().unwrap();
    assert_eq!(first.status(), RunStatus::PartiallyApplied);
    assert_eq!(apply.committed_ops, 2);
    assert_eq!(apply.remaining_ops(), 6);
    assert_eq!(reserved(&store, "p0"), 4);
    assert_eq!(reserved(&store, "p1"), 5);
    assert!(store.get("reservation_releases", "products:o0:p0").is_some());
    assert!(store.get("reservation_releases", "products:o1:p1").is_none());

    let second = run(store.clone(), config.clone()).0.execute(now()).await.unwrap();
    assert_eq!(second.status(), RunStatus::Completed);
    assert_eq!(second.report.counts.already_released, 1);
    assert_eq!(second.report.counts.planned_ops, 6);

    let third = run(store.clone(), config).0.execute(now()).await.unwrap();
    assert!(third.report.corrections.is_empty());
    assert_eq!(third.report.counts.planned_ops, 0);

    for i in 0..4 {
        assert_eq!(reserved(&store, &format!("p{i}")), 4);
    }
    assert_eq!(store.len("reservation_releases"), 4);
}

#[tokio::test]
async fn interrupted_run_is_finished_by_the_next_one() {
    let store = one_unit_per_product_store(3);
    let config = ReconcileConfig::default().with_batch_size(2);
    let cancel = CancelToken::new();
    cancel.cancel();

    let (pending, _sink) = run(store.clone(), config.clone());
    let err = pending.with_cancel_token(cancel).execute(now()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Cancelled));

    let outcome = run(store.clone(), config).0.execute(now()).await.unwrap();
    assert_eq!(outcome.status(), RunStatus::Completed);
    for i in 0..3 {
        assert_eq!(reserved(&store, &format!("p{i}")), 4);
    }
}

#[tokio::test]
async fn overridden_collection_run_does_not_shadow_the_default_catalog() {
    let store = InMemoryDocumentStore::new();
    store.insert("products", "p1", json!({ "stock": 5, "reservedStock": 3 }));
    store.insert("catalog_v2", "p1", json!({ "stock": 5, "reservedStock": 3 }));
    store.insert(
        "orders",
        "o1",
        json!({ "status": "cancelled", "items": [{ "productId": "p1", "quantity": 3 }] }),
    );
    let store = Arc::new(store);

    let v2 = ReconcileConfig::default().with_product_collection("catalog_v2");
    run(store.clone(), v2.clone()).0.execute(now()).await.unwrap();
    assert_eq!(store.counter("catalog_v2", "p1", "reservedStock"), Some(0));
    assert_eq!(reserved(&store, "p1"), 3);

    let outcome = run(store.clone(), ReconcileConfig::default()).0.execute(now()).await.unwrap();
    assert_eq!(reserved(&store, "p1"), 0);
    assert_eq!(outcome.report.counts.already_released, 0);
    assert_eq!(outcome.report.counts.must_release, 1);

    let again = run(store.clone(), v2).0.execute(now()).await.unwrap();
    assert_eq!(again.report.counts.planned_ops, 0);
    assert_eq!(store.counter("catalog_v2", "p1", "reservedStock"), Some(0));
    assert_eq!(store.len("reservation_releases"), 2);
}

#[tokio::test]
async fn release_against_an_empty_override_is_kept_for_the_real_catalog() {
    let store = InMemoryDocumentStore::new();
    store.insert("products", "p1", json!({ "stock": 5, "reservedStock": 3 }));
    store.insert(
        "orders",
        "o1",
        json!({ "status": "cancelled", "items": [{ "productId": "p1", "quantity": 3 }] }),
    );
    let store = Arc::new(store);

    let outcome = run(store.clone(), ReconcileConfig::default().with_product_collection("catalog_v2"))
        .0
        .execute(now())
        .await
        .unwrap();
    assert_eq!(outcome.report.counts.anomalies, 1);
    assert_eq!(store.len("reservation_releases"), 0);

    run(store.clone(), ReconcileConfig::default()).0.execute(now()).await.unwrap();
    assert_eq!(reserved(&store, "p1"), 0);
}

#[tokio::test]
async fn product_missing_at_first_is_released_once_it_appears() {
    let store = Arc::new(InMemoryDocumentStore::new());
    store.insert(
        "orders",
        "o1",
        json!({ "status": "delivered", "items": [{ "productId": "p9", "quantity": 2 }] }),
    );

    let first = run(store.clone(), ReconcileConfig::default()).0.execute(now()).await.unwrap();
    assert_eq!(first.report.counts.anomalies, 1);
    assert_eq!(first.report.counts.planned_ops, 0);

    store.insert("products", "p9", json!({ "stock": 4, "reservedStock": 2 }));
    let second = run(store.clone(), ReconcileConfig::default()).0.execute(now()).await.unwrap();
    assert_eq!(second.report.counts.units_released, 2);
    assert_eq!(reserved(&store, "p9"), 0);

    store.insert("products", "p9", json!({ "stock": 4, "reservedStock": 2 }));
    let third = run(store.clone(), ReconcileConfig::default()).0.execute(now()).await.unwrap();
    assert_eq!(third.report.counts.already_released, 1);
    assert_eq!(third.report.counts.planned_ops, 0);
    assert_eq!(reserved(&store, "p9"), 2);
}

#[tokio::test]
async fn journal_entries_of_deleted_orders_are_pruned() {
    let store = seeded_store();
    store.insert(
        "reservation_releases",
        "products:O9:P1",
        json!({ "productCollection": "products", "orderId": "O9", "productId": "P1", "quantity": 1 }),
    );

    let outcome = run(store.clone(), ReconcileConfig::default()).0.execute(now()).await.unwrap();

    assert_eq!(outcome.report.counts.journal_pruned, 1);
    assert!(store.get("reservation_releases", "products:O9:P1").is_none());
    assert_eq!(store.len("reservation_releases"), 2);
    assert_eq!(reserved(&store, "P1"), 2);
}
