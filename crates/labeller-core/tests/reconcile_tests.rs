//! Reconciliation cycles against an in-memory node store.

use labeller_core::{CycleOutcome, ReconcileError, ReconcileRequest, Reconciler, StoreError};
use labeller_test_utils::{
    labels, test_config, test_identity, InMemoryNodeStore, StaticProvider,
};
use std::sync::Arc;

fn request() -> ReconcileRequest {
    ReconcileRequest::new(test_identity())
}

#[tokio::test]
async fn fresh_node_gets_one_owned_label() {
    let store = Arc::new(InMemoryNodeStore::new().with_node(&test_identity(), labels(&[])));
    let provider = Arc::new(StaticProvider::present(&["vendorA.productX"]));
    let engine = Reconciler::new(&test_config(), store.clone(), provider).unwrap();

    let outcome = engine.reconcile(&request()).await.unwrap();

    assert!(matches!(outcome, CycleOutcome::Applied(_)));
    assert_eq!(
        store.labels(&test_identity()).unwrap(),
        labels(&[("g4v.dev/vendorA.productX", "true")])
    );
}

#[tokio::test]
async fn stale_owned_label_removed_and_foreign_kept() {
    let store = Arc::new(InMemoryNodeStore::new().with_node(
        &test_identity(),
        labels(&[("g4v.dev/oldDevice", "true"), ("team", "infra")]),
    ));
    let provider = Arc::new(StaticProvider::default());
    let engine = Reconciler::new(&test_config(), store.clone(), provider).unwrap();

    engine.reconcile(&request()).await.unwrap();

    assert_eq!(store.labels(&test_identity()).unwrap(), labels(&[("team", "infra")]));
}

#[tokio::test]
async fn missing_node_is_skipped_without_write() {
    let store = Arc::new(InMemoryNodeStore::new());
    let provider = Arc::new(StaticProvider::present(&["usb.082d.046d"]));
    let engine = Reconciler::new(&test_config(), store.clone(), provider).unwrap();

    let outcome = engine.reconcile(&request()).await.unwrap();

    assert_eq!(outcome, CycleOutcome::Skipped);
    assert_eq!(store.update_calls(), 0);
}

#[tokio::test]
async fn conflict_fails_once_and_next_trigger_converges() {
    let store = Arc::new(InMemoryNodeStore::new().with_node(&test_identity(), labels(&[])));
    store.fail_next_update(StoreError::Conflict);
    let provider = Arc::new(StaticProvider::present(&["usb.082d.046d"]));
    let engine = Reconciler::new(&test_config(), store.clone(), provider).unwrap();

    let err = engine.reconcile(&request()).await.unwrap_err();
    assert!(matches!(err, ReconcileError::Conflict));
    assert_eq!(store.update_calls(), 1);

    assert!(matches!(
        engine.reconcile(&request()).await.unwrap(),
        CycleOutcome::Applied(_)
    ));
    assert_eq!(store.update_calls(), 2);
}

#[tokio::test]
async fn external_drift_is_corrected_on_next_cycle() {
    let store = Arc::new(InMemoryNodeStore::new().with_node(&test_identity(), labels(&[])));
    let provider = Arc::new(StaticProvider::present(&["usb.082d.046d"]));
    let engine = Reconciler::new(&test_config(), store.clone(), provider).unwrap();

    engine.reconcile(&request()).await.unwrap();

    // Another actor strips our label and adds its own.
    store.put(&test_identity(), labels(&[("zone", "b")]));
    engine.reconcile(&request()).await.unwrap();

    assert_eq!(
        store.labels(&test_identity()).unwrap(),
        labels(&[("g4v.dev/usb.082d.046d", "true"), ("zone", "b")])
    );
    assert_eq!(
        engine.reconcile(&request()).await.unwrap(),
        CycleOutcome::Unchanged
    );
}
