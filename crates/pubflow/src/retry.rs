// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Retry policies for the publish RPC.
//!
//! A [`Retryer`] is created per bundle and asked after each failed attempt
//! whether (and after how long) to try again. [`PublishRetryer`] wraps the
//! exponential [`BackoffRetryer`] with publish specific exceptions.

use crate::config::RetrySettings;
use crate::ordering::OrderingKeys;
use crate::transport::{Code, RpcError};
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// Codes the publish RPC retries by default.
pub const DEFAULT_RETRY_CODES: &[Code] = &[
    Code::Aborted,
    Code::Cancelled,
    Code::Internal,
    Code::ResourceExhausted,
    Code::Unknown,
    Code::Unavailable,
    Code::DeadlineExceeded,
];

/// Decides whether a failed attempt is retried.
pub trait Retryer: Send {
    /// Delay before the next attempt, or `None` to give up with `err`.
    fn retry(&mut self, err: &RpcError) -> Option<Duration>;
}

/// Exponential backoff with jitter over a set of retryable codes.
#[derive(Debug)]
pub struct BackoffRetryer {
    codes: Vec<Code>,
    current: Duration,
    max: Duration,
    multiplier: f64,
    max_attempts: u32,
    attempts: u32,
    rng: u64,
}

impl BackoffRetryer {
    /// Retry `codes` using the backoff in `settings`.
    pub fn new(codes: &[Code], settings: &RetrySettings) -> Self {
        let seed = RandomState::new().build_hasher().finish();
        Self {
            codes: codes.to_vec(),
            current: settings.initial_backoff,
            max: settings.max_backoff,
            multiplier: settings.multiplier.max(1.0),
            max_attempts: settings.max_attempts,
            attempts: 1,
            rng: seed | 1,
        }
    }

    /// Retryer for the publish RPC's default codes.
    pub fn for_publish(settings: &RetrySettings) -> Self {
        Self::new(DEFAULT_RETRY_CODES, settings)
    }

    /// Attempts made so far, including the first one.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Next pause: uniformly drawn from `[current/2, current]`, then grow `current`.
    fn pause(&mut self) -> Duration {
        // xorshift64
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 7;
        self.rng ^= self.rng << 17;
        let frac = 0.5 + (self.rng >> 11) as f64 / (1u64 << 53) as f64 / 2.0;
        let pause = scale(self.current, frac).min(self.current);
        self.current = scale(self.current, self.multiplier).min(self.max);
        pause
    }
}

/// `d * factor`, saturating at `Duration::MAX`.
fn scale(d: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(d.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

impl Retryer for BackoffRetryer {
    fn retry(&mut self, err: &RpcError) -> Option<Duration> {
        if !self.codes.contains(&err.code) {
            return None;
        }
        if self.max_attempts > 0 && self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.pause())
    }
}

/// Retry policy for one bundle of the publish pipeline.
///
/// Never retries a server-side UTF-8 validation failure (the request would
/// fail the same way again) and stops retrying once the bundle's ordering key
/// has been paused.
pub struct PublishRetryer<R = BackoffRetryer> {
    base: R,
    ordering_key: String,
    ordering: Arc<OrderingKeys>,
}

impl<R: Retryer> PublishRetryer<R> {
    /// Wrap `base` for a bundle with `ordering_key`.
    pub fn new(base: R, ordering_key: &str, ordering: Arc<OrderingKeys>) -> Self {
        Self {
            base,
            ordering_key: ordering_key.to_string(),
            ordering,
        }
    }

    /// Inner policy.
    pub fn base(&self) -> &R {
        &self.base
    }
}

fn is_invalid_utf8(err: &RpcError) -> bool {
    err.code == Code::Internal && err.message.contains("string field contains invalid UTF-8")
}

impl<R: Retryer> Retryer for PublishRetryer<R> {
    fn retry(&mut self, err: &RpcError) -> Option<Duration> {
        if is_invalid_utf8(err) {
            return None;
        }
        if self.ordering.is_paused(&self.ordering_key) {
            return None;
        }
        self.base.retry(err)
    }
}
