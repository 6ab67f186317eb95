//! Benchmark comparing the purchase protocols under contention
//!
//! Correctness aside, the strategies pay very different synchronization
//! costs: the atomic conditional update is one store operation per attempt,
//! while the locking variant serializes every attempt against one row.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use overdraft::domain::{Balance, Price};
use overdraft::harness::{run_trial, Concurrency, Trial};
use overdraft::protocols::Protocol;
use overdraft::store::{MemoryStore, Store};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn benchmark_protocols_under_contention(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("trial_32_concurrent");
    for protocol in Protocol::ALL {
        group.bench_with_input(
            BenchmarkId::from_parameter(protocol.name()),
            &protocol,
            |b, &protocol| {
                b.to_async(&runtime).iter(|| async move {
                    let store = Arc::new(MemoryStore::new());
                    store
                        .seed(
                            Balance::new(1_000),
                            Price::try_new(10).expect("valid price"),
                        )
                        .await
                        .expect("seed succeeds");

                    let trial = Trial::new(
                        protocol,
                        Concurrency::try_new(32).expect("valid concurrency"),
                    );
                    run_trial(&store, &trial).await
                })
            },
        );
    }
    group.finish();
}

fn benchmark_single_purchase(c: &mut Criterion) {
    let runtime = Runtime::new().expect("tokio runtime");

    let mut group = c.benchmark_group("single_purchase");
    for protocol in Protocol::ALL {
        group.bench_with_input(
            BenchmarkId::from_parameter(protocol.name()),
            &protocol,
            |b, &protocol| {
                b.to_async(&runtime).iter(|| async move {
                    let store = MemoryStore::new();
                    store
                        .seed(
                            Balance::new(1_000),
                            Price::try_new(10).expect("valid price"),
                        )
                        .await
                        .expect("seed succeeds");

                    protocol
                        .execute(
                            &store,
                            &overdraft::store::seed_username(),
                            &overdraft::store::seed_product_name(),
                        )
                        .await
                        .expect("purchase succeeds")
                })
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_protocols_under_contention,
    benchmark_single_purchase
);
criterion_main!(benches);
