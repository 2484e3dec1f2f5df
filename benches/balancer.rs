//! Benchmarks for the selection hot path.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use junction::balance::{build_forward_client, selector, Backend, HashRing};
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

fn backends(count: usize) -> Vec<Arc<Backend>> {
    let client = build_forward_client();
    (0..count)
        .map(|i| {
            let url = format!("http://127.0.0.1:{}", 9000 + i);
            Arc::new(Backend::new(url.parse().unwrap(), client.clone()).unwrap())
        })
        .collect()
}

fn benchmark_round_robin(c: &mut Criterion) {
    let backends = backends(10);
    let counter = AtomicU64::new(0);

    c.bench_function("round_robin_select", |b| {
        b.iter(|| {
            black_box(selector::round_robin(&backends, &counter));
        })
    });
}

fn benchmark_least_connections(c: &mut Criterion) {
    let backends = backends(10);

    // Uneven in-flight counts so the scan does real work.
    for (i, backend) in backends.iter().enumerate() {
        for _ in 0..i {
            backend.inc_conn();
        }
    }

    c.bench_function("least_connections_select", |b| {
        b.iter(|| {
            black_box(selector::least_connections(&backends));
        })
    });
}

fn benchmark_ip_hash(c: &mut Criterion) {
    let backends = backends(10);
    let counter = AtomicU64::new(0);
    let ring = HashRing::build(&backends);
    let client_addr: SocketAddr = "192.168.1.100:12345".parse().unwrap();

    c.bench_function("ip_hash_select", |b| {
        b.iter(|| {
            black_box(selector::ip_hash(
                &backends,
                &counter,
                &ring,
                client_addr,
            ));
        })
    });
}

fn benchmark_ring_build(c: &mut Criterion) {
    let backends = backends(10);

    let mut group = c.benchmark_group("ring");
    group.throughput(Throughput::Elements(1));
    group.bench_function("build_10_backends", |b| {
        b.iter(|| {
            black_box(HashRing::build(&backends));
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_round_robin,
    benchmark_least_connections,
    benchmark_ip_hash,
    benchmark_ring_build,
);

criterion_main!(benches);
