use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::{Duration, SystemTime};
use valve::{
    Batch, Gateway, InvocationContext, MemoryStore, OwnerId, PolicyId, Request, Target, check,
    create_bucket, create_policy,
};

struct Echo;

impl Target for Echo {
    fn invoke(
        &self,
        _ctx: &InvocationContext<'_>,
        data: &[u8],
        _refs: &[String],
    ) -> Result<Vec<u8>, String> {
        Ok(data.to_vec())
    }
}

fn store_with_owners(owners: usize, max_requests: u32) -> (MemoryStore, PolicyId) {
    let mut store = MemoryStore::builder().capacity(owners).build();
    let now = SystemTime::now();
    let policy_id = create_policy(&mut store, "svc".into(), 111, max_requests, 60).unwrap();
    for i in 0..owners {
        create_bucket(&mut store, &policy_id, &format!("owner_{i}").into(), now).unwrap();
    }
    (store, policy_id)
}

fn benchmark_check(c: &mut Criterion) {
    let mut group = c.benchmark_group("check");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("single_owner_admitted", |b| {
        let (mut store, policy_id) = store_with_owners(1, u32::MAX);
        let owner = OwnerId::from("owner_0");

        b.iter(|| {
            let admission = check(
                &mut store,
                black_box(&policy_id),
                black_box(&owner),
                &owner,
                black_box(SystemTime::now()),
            );
            black_box(admission.is_ok())
        });
    });

    group.bench_function("rotating_owners_1000", |b| {
        let (mut store, policy_id) = store_with_owners(1000, u32::MAX);
        let owners: Vec<OwnerId> = (0..1000).map(|i| OwnerId::from(format!("owner_{i}"))).collect();
        let mut counter = 0usize;

        b.iter(|| {
            let owner = &owners[counter % owners.len()];
            counter += 1;
            let admission = check(
                &mut store,
                black_box(&policy_id),
                owner,
                owner,
                black_box(SystemTime::now()),
            );
            black_box(admission.is_ok())
        });
    });

    // Worst case: every check is denied
    group.bench_function("single_owner_denied", |b| {
        let (mut store, policy_id) = store_with_owners(1, 5);
        let owner = OwnerId::from("owner_0");
        for _ in 0..5 {
            check(&mut store, &policy_id, &owner, &owner, SystemTime::now()).unwrap();
        }

        b.iter(|| {
            let admission = check(
                &mut store,
                black_box(&policy_id),
                black_box(&owner),
                &owner,
                black_box(SystemTime::now()),
            );
            black_box(admission.is_err())
        });
    });

    group.finish();
}

fn benchmark_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    group.throughput(Throughput::Elements(1));

    let setup = |gateway: &mut Gateway<MemoryStore>, policy_id: &PolicyId| {
        gateway
            .submit(
                Batch::new("owner_0")
                    .with(Request::CreatePolicy {
                        target_service_id: "svc".into(),
                        endpoint_id: 111,
                        max_requests: u32::MAX,
                        window_seconds: 60,
                    })
                    .with(Request::CreateBucket {
                        policy_id: policy_id.clone(),
                        owner_id: "owner_0".into(),
                    }),
                SystemTime::now(),
            )
            .unwrap();
    };

    group.bench_function("cooperative_check_and_invoke", |b| {
        let mut gateway = Gateway::new(MemoryStore::new());
        gateway.register_target("svc", Echo);
        let policy_id = PolicyId::new("svc", 111);
        setup(&mut gateway, &policy_id);

        b.iter(|| {
            let batch = Batch::new("owner_0")
                .check(policy_id.clone())
                .invoke("svc", vec![1, 2, 3], vec![]);
            black_box(gateway.submit(batch, SystemTime::now()).is_ok())
        });
    });

    group.bench_function("delegated_call", |b| {
        let mut gateway = Gateway::new(MemoryStore::new());
        gateway.register_target("svc", Echo);
        let policy_id = PolicyId::new("svc", 111);
        setup(&mut gateway, &policy_id);

        b.iter(|| {
            let batch = Batch::new("owner_0").call(policy_id.clone(), vec![1, 2, 3], vec![]);
            black_box(gateway.submit(batch, SystemTime::now()).is_ok())
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_check, benchmark_batches);
criterion_main!(benches);
