// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher metrics.
//!
//! Counters are updated by worker threads with relaxed atomics and read
//! through [`PublisherMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live publisher counters.
#[derive(Debug)]
pub struct PublisherMetrics {
    // === Messages ===
    /// Messages accepted by `publish`.
    messages_submitted: AtomicU64,

    /// Messages resolved with a server id.
    messages_published: AtomicU64,

    /// Messages resolved with an error (admission or RPC).
    messages_failed: AtomicU64,

    // === Bundles ===
    /// Publish RPCs that succeeded.
    bundles_sent: AtomicU64,

    /// Bundles resolved with an error.
    bundles_failed: AtomicU64,

    /// Encoded message bytes in successful bundles.
    bytes_sent: AtomicU64,

    /// Requests sent with gzip requested.
    compressed_requests: AtomicU64,

    /// RPC attempts beyond the first.
    rpc_retries: AtomicU64,

    /// Duration of the last bundle, retries included.
    last_publish_latency_us: AtomicU64,

    /// Creation time for uptime calculation.
    created_at: Instant,
}

impl Default for PublisherMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PublisherMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self {
            messages_submitted: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
            bundles_sent: AtomicU64::new(0),
            bundles_failed: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            compressed_requests: AtomicU64::new(0),
            rpc_retries: AtomicU64::new(0),
            last_publish_latency_us: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// A message was admitted.
    pub fn record_submitted(&self) {
        self.messages_submitted.fetch_add(1, Ordering::Relaxed);
    }

    /// A message failed before reaching a bundle.
    pub fn record_rejected(&self) {
        self.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A bundle of `messages` totalling `bytes` was published.
    pub fn record_bundle_sent(&self, messages: usize, bytes: usize, latency: Duration) {
        self.bundles_sent.fetch_add(1, Ordering::Relaxed);
        self.messages_published
            .fetch_add(messages as u64, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// A bundle of `messages` failed.
    pub fn record_bundle_failed(&self, messages: usize, latency: Duration) {
        self.bundles_failed.fetch_add(1, Ordering::Relaxed);
        self.messages_failed
            .fetch_add(messages as u64, Ordering::Relaxed);
        self.record_latency(latency);
    }

    /// A request was sent with compression.
    pub fn record_compressed(&self) {
        self.compressed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// An RPC attempt is being retried.
    pub fn record_retry(&self) {
        self.rpc_retries.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency: Duration) {
        self.last_publish_latency_us
            .store(latency.as_micros() as u64, Ordering::Relaxed);
    }

    // === Snapshot ===

    /// Current values. `outstanding` comes from the flow controller.
    pub fn snapshot(&self, outstanding: (u64, u64)) -> PublisherMetricsSnapshot {
        PublisherMetricsSnapshot {
            messages_submitted: self.messages_submitted.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            bundles_sent: self.bundles_sent.load(Ordering::Relaxed),
            bundles_failed: self.bundles_failed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            compressed_requests: self.compressed_requests.load(Ordering::Relaxed),
            rpc_retries: self.rpc_retries.load(Ordering::Relaxed),
            last_publish_latency_us: self.last_publish_latency_us.load(Ordering::Relaxed),
            outstanding_messages: outstanding.0,
            outstanding_bytes: outstanding.1,
            uptime: self.created_at.elapsed(),
        }
    }
}

/// Point-in-time copy of [`PublisherMetrics`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublisherMetricsSnapshot {
    /// Messages accepted by `publish`.
    pub messages_submitted: u64,
    /// Messages resolved with a server id.
    pub messages_published: u64,
    /// Messages resolved with an error.
    pub messages_failed: u64,
    /// Successful publish RPCs.
    pub bundles_sent: u64,
    /// Failed bundles.
    pub bundles_failed: u64,
    /// Encoded message bytes published.
    pub bytes_sent: u64,
    /// Requests sent with gzip.
    pub compressed_requests: u64,
    /// Retried RPC attempts.
    pub rpc_retries: u64,
    /// Duration of the last bundle in microseconds.
    pub last_publish_latency_us: u64,
    /// Messages admitted but not yet resolved.
    pub outstanding_messages: u64,
    /// Bytes admitted but not yet resolved.
    pub outstanding_bytes: u64,
    /// Time since the publisher was created.
    pub uptime: Duration,
}

impl PublisherMetricsSnapshot {
    /// Fraction of resolved messages that succeeded (1.0 when none resolved).
    pub fn success_rate(&self) -> f64 {
        let resolved = self.messages_published + self.messages_failed;
        if resolved == 0 {
            1.0
        } else {
            self.messages_published as f64 / resolved as f64
        }
    }

    /// Average messages per successful bundle.
    pub fn avg_bundle_size(&self) -> f64 {
        if self.bundles_sent == 0 {
            0.0
        } else {
            self.messages_published as f64 / self.bundles_sent as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_counters() {
        let m = PublisherMetrics::new();
        m.record_submitted();
        m.record_submitted();
        m.record_submitted();
        m.record_bundle_sent(2, 100, Duration::from_micros(250));
        m.record_bundle_failed(1, Duration::from_micros(900));
        m.record_retry();
        m.record_compressed();

        let s = m.snapshot((0, 0));
        assert_eq!(s.messages_submitted, 3);
        assert_eq!(s.messages_published, 2);
        assert_eq!(s.messages_failed, 1);
        assert_eq!(s.bundles_sent, 1);
        assert_eq!(s.bundles_failed, 1);
        assert_eq!(s.bytes_sent, 100);
        assert_eq!(s.rpc_retries, 1);
        assert_eq!(s.compressed_requests, 1);
        assert_eq!(s.last_publish_latency_us, 900);
        assert!((s.success_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert!((s.avg_bundle_size() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_snapshot() {
        let s = PublisherMetrics::default().snapshot((4, 40));
        assert_eq!(s.outstanding_messages, 4);
        assert_eq!(s.outstanding_bytes, 40);
        assert!((s.success_rate() - 1.0).abs() < f64::EPSILON);
        assert_eq!(s.avg_bundle_size(), 0.0);
    }
}
