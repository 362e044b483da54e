// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish throughput benchmarks
//!
//! Measures:
//! - wire encoding of single messages
//! - end-to-end publish through the scheduler and worker pool against an
//!   in-memory transport, unordered and with ordering keys

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pubflow::{
    wire, CallOptions, Message, PublishRequest, PublishSettings, PublishTransport, Publisher,
    RpcError,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Accepts everything and returns sequential ids.
#[derive(Default)]
struct NullTransport {
    next: AtomicU64,
}

impl PublishTransport for NullTransport {
    fn publish(&self, req: &PublishRequest, _: &CallOptions) -> Result<Vec<String>, RpcError> {
        let first = self.next.fetch_add(req.len() as u64, Ordering::Relaxed);
        Ok((first..first + req.len() as u64)
            .map(|id| id.to_string())
            .collect())
    }
}

fn payload(size: usize) -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(42);
    (0..size).map(|_| rng.u8(..)).collect()
}

// ============================================================================
// Benchmark 1: Wire encoding
// ============================================================================

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_encode");
    for size in [64usize, 1024, 16 * 1024] {
        let msg = Message::new(payload(size))
            .with_attribute("source", "bench")
            .with_ordering_key("key-1");
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("message", size), &msg, |b, msg| {
            b.iter(|| wire::encode_message(black_box(msg)));
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark 2: End-to-end publish
// ============================================================================

fn bench_publish(c: &mut Criterion) {
    const BATCH: usize = 1000;
    let mut group = c.benchmark_group("publish");
    group.throughput(Throughput::Elements(BATCH as u64));
    group.sample_size(20);

    for (label, keys) in [("unordered", 0usize), ("ordered_8_keys", 8)] {
        let settings = PublishSettings {
            delay_threshold: Duration::from_millis(1),
            enable_message_ordering: keys > 0,
            num_workers: 8,
            ..Default::default()
        };
        let publisher = Publisher::new(
            "projects/bench/topics/throughput",
            Arc::new(NullTransport::default()),
            settings,
        )
        .expect("valid publisher");
        let data = payload(256);

        group.bench_function(BenchmarkId::new("batch_1000", label), |b| {
            b.iter(|| {
                let results: Vec<_> = (0..BATCH)
                    .map(|i| {
                        let mut msg = Message::new(data.clone());
                        if keys > 0 {
                            msg = msg.with_ordering_key(format!("key-{}", i % keys));
                        }
                        publisher.publish(msg)
                    })
                    .collect();
                publisher.flush();
                black_box(results.last().map(|r| r.try_get()));
            });
        });
        publisher.stop();
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_publish);
criterion_main!(benches);
