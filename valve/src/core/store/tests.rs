use super::{MemoryStore, Store, Transaction};
use crate::core::bucket::{Bucket, OwnerId};
use crate::core::policy::{Policy, PolicyId};

fn policy(endpoint_id: u32) -> Policy {
    Policy {
        target_service_id: "svc".into(),
        endpoint_id,
        max_requests: 5,
        window_seconds: 60,
    }
}

fn bucket(owner: &str, tokens_remaining: u32) -> Bucket {
    Bucket {
        policy_id: PolicyId::new("svc", 1),
        owner_id: OwnerId::from(owner),
        tokens_remaining,
        window_start: 1_000,
    }
}

#[test]
fn test_memory_store_policy_is_write_once() {
    let mut store = MemoryStore::new();

    assert!(store.set_policy_if_not_exists(policy(1)).unwrap());
    assert!(!store.set_policy_if_not_exists(policy(1)).unwrap());
    assert!(store.set_policy_if_not_exists(policy(2)).unwrap());

    assert_eq!(
        store.get_policy(&PolicyId::new("svc", 1)).unwrap(),
        Some(policy(1))
    );
    assert_eq!(store.get_policy(&PolicyId::new("svc", 3)).unwrap(), None);
    assert_eq!(store.policy_count(), 2);
}

#[test]
fn test_memory_store_compare_and_swap() {
    let mut store = MemoryStore::builder().capacity(10).build();
    let original = bucket("alice", 5);

    assert!(store.set_bucket_if_not_exists(original.clone()).unwrap());
    assert!(!store.set_bucket_if_not_exists(bucket("alice", 1)).unwrap());

    // Stale read loses the swap
    let stale = bucket("alice", 3);
    assert!(!store.compare_and_swap_bucket(&stale, bucket("alice", 2)).unwrap());

    assert!(
        store
            .compare_and_swap_bucket(&original, bucket("alice", 4))
            .unwrap()
    );
    assert_eq!(
        store.get_bucket(&original.id()).unwrap(),
        Some(bucket("alice", 4))
    );
}

#[test]
fn test_memory_store_swap_of_missing_bucket_fails() {
    let mut store = MemoryStore::new();
    assert!(
        !store
            .compare_and_swap_bucket(&bucket("ghost", 5), bucket("ghost", 4))
            .unwrap()
    );
    assert_eq!(store.bucket_count(), 0);
}

#[test]
fn test_memory_store_rejects_swap_across_keys() {
    let mut store = MemoryStore::new();
    store.set_bucket_if_not_exists(bucket("alice", 5)).unwrap();

    let result = store.compare_and_swap_bucket(&bucket("alice", 5), bucket("bob", 4));
    assert!(result.is_err());
}

#[test]
fn test_transaction_reads_its_own_writes() {
    let mut store = MemoryStore::new();
    store.set_bucket_if_not_exists(bucket("alice", 5)).unwrap();

    let mut tx = Transaction::new(&mut store);
    assert!(tx.set_policy_if_not_exists(policy(1)).unwrap());
    assert!(
        tx.compare_and_swap_bucket(&bucket("alice", 5), bucket("alice", 4))
            .unwrap()
    );
    assert!(
        tx.compare_and_swap_bucket(&bucket("alice", 4), bucket("alice", 3))
            .unwrap()
    );

    assert!(tx.get_policy(&PolicyId::new("svc", 1)).unwrap().is_some());
    assert_eq!(
        tx.get_bucket(&bucket("alice", 0).id()).unwrap(),
        Some(bucket("alice", 3))
    );
    assert_eq!(tx.pending_writes(), 2);
}

#[test]
fn test_transaction_rollback_leaves_base_untouched() {
    let mut store = MemoryStore::new();
    store.set_bucket_if_not_exists(bucket("alice", 5)).unwrap();

    let mut tx = Transaction::new(&mut store);
    tx.set_policy_if_not_exists(policy(1)).unwrap();
    tx.set_bucket_if_not_exists(bucket("bob", 5)).unwrap();
    tx.compare_and_swap_bucket(&bucket("alice", 5), bucket("alice", 0))
        .unwrap();
    drop(tx);

    assert_eq!(store.policy_count(), 0);
    assert_eq!(store.bucket_count(), 1);
    assert_eq!(
        store.get_bucket(&bucket("alice", 0).id()).unwrap(),
        Some(bucket("alice", 5))
    );
}

#[test]
fn test_transaction_commit_applies_all_writes() {
    let mut store = MemoryStore::new();
    store.set_bucket_if_not_exists(bucket("alice", 5)).unwrap();

    let mut tx = Transaction::new(&mut store);
    tx.set_policy_if_not_exists(policy(1)).unwrap();
    tx.set_bucket_if_not_exists(bucket("bob", 5)).unwrap();
    tx.compare_and_swap_bucket(&bucket("alice", 5), bucket("alice", 2))
        .unwrap();
    tx.commit().unwrap();

    assert_eq!(store.policy_count(), 1);
    assert_eq!(store.bucket_count(), 2);
    assert_eq!(
        store.get_bucket(&bucket("alice", 0).id()).unwrap(),
        Some(bucket("alice", 2))
    );
}

#[test]
fn test_transaction_sees_base_records_as_existing() {
    let mut store = MemoryStore::new();
    store.set_policy_if_not_exists(policy(1)).unwrap();
    store.set_bucket_if_not_exists(bucket("alice", 5)).unwrap();

    let mut tx = Transaction::new(&mut store);
    assert!(!tx.set_policy_if_not_exists(policy(1)).unwrap());
    assert!(!tx.set_bucket_if_not_exists(bucket("alice", 1)).unwrap());
    assert_eq!(tx.pending_writes(), 0);
}

#[test]
fn test_nested_transactions_commit_inward_first() {
    let mut store = MemoryStore::new();
    store.set_bucket_if_not_exists(bucket("alice", 5)).unwrap();

    let mut outer = Transaction::new(&mut store);
    {
        let mut inner = Transaction::new(&mut outer);
        inner
            .compare_and_swap_bucket(&bucket("alice", 5), bucket("alice", 4))
            .unwrap();
        inner.commit().unwrap();
    }
    {
        // Rolled back: only the outer transaction's view survives
        let mut inner = Transaction::new(&mut outer);
        inner
            .compare_and_swap_bucket(&bucket("alice", 4), bucket("alice", 0))
            .unwrap();
        inner.rollback();
    }
    outer.commit().unwrap();

    assert_eq!(
        store.get_bucket(&bucket("alice", 0).id()).unwrap(),
        Some(bucket("alice", 4))
    );
}
