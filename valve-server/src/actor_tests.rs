#[cfg(test)]
mod tests {
    use crate::actor::GatewayActor;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    use tokio_test::{assert_err, assert_ok};
    use valve::{
        Batch, BucketId, Gateway, MemoryStore, Outcome, PolicyId, Request, ValveError,
    };

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn setup_batch(owner: &str, max_requests: u32) -> Batch {
        Batch::new(owner)
            .with(Request::CreatePolicy {
                target_service_id: "svc".into(),
                endpoint_id: 1,
                max_requests,
                window_seconds: 60,
            })
            .with(Request::CreateBucket {
                policy_id: PolicyId::new("svc", 1),
                owner_id: owner.into(),
            })
    }

    #[tokio::test]
    async fn test_basic_admission() {
        let handle = GatewayActor::spawn(100, Gateway::new(MemoryStore::new()));
        let policy_id = PolicyId::new("svc", 1);

        assert_ok!(handle.submit(setup_batch("alice", 5), at(1_000)).await.unwrap());

        let receipt = assert_ok!(
            handle
                .submit(Batch::new("alice").check(policy_id.clone()), at(1_001))
                .await
                .unwrap()
        );
        match &receipt.outcomes[0] {
            Outcome::Admitted(admission) => assert_eq!(admission.tokens_remaining, 4),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let bucket = handle
            .bucket(BucketId::new(policy_id.clone(), "alice".into()))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(bucket.tokens_remaining, 4);

        let policy = handle.policy(policy_id).await.unwrap().unwrap();
        assert_eq!(policy.map(|p| p.max_requests), Some(5));
    }

    #[tokio::test]
    async fn test_failed_batch_reports_index() {
        let handle = GatewayActor::spawn(100, Gateway::new(MemoryStore::new()));
        assert_ok!(handle.submit(setup_batch("alice", 5), at(1_000)).await.unwrap());

        let err = assert_err!(
            handle
                .submit(setup_batch("alice", 5), at(1_000))
                .await
                .unwrap()
        );
        assert_eq!(err.index, 0);
        assert!(matches!(err.error, ValveError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_concurrent_checks() {
        let handle = GatewayActor::spawn(100, Gateway::new(MemoryStore::new()));
        assert_ok!(handle.submit(setup_batch("alice", 10), at(1_000)).await.unwrap());

        let mut handles = vec![];
        for _ in 0..20 {
            let h = handle.clone();
            handles.push(tokio::spawn(async move {
                h.submit(Batch::new("alice").check(PolicyId::new("svc", 1)), at(1_001))
                    .await
            }));
        }

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap().unwrap().is_ok() {
                admitted += 1;
            }
        }

        // Exactly the quota is admitted
        assert_eq!(admitted, 10);
    }
}
