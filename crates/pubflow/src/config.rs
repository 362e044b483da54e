// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish settings and service limits.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: service-defined request limits ([`MAX_PUBLISH_REQUEST_COUNT`],
//!   [`MAX_PUBLISH_REQUEST_BYTES`])
//! - **Level 2 (Per publisher)**: [`PublishSettings`], fixed once the first message
//!   is published
//!
//! Settings can also be loaded from YAML with the `settings-loaders` feature,
//! see [`loader`].
//!
//! # Example
//!
//! ```rust
//! use pubflow::{FlowControlSettings, LimitExceededBehavior, PublishSettings};
//! use std::time::Duration;
//!
//! let settings = PublishSettings {
//!     count_threshold: 50,
//!     delay_threshold: Duration::from_millis(5),
//!     enable_message_ordering: true,
//!     flow_control: FlowControlSettings {
//!         max_outstanding_bytes: 64 * 1024 * 1024,
//!         limit_exceeded_behavior: LimitExceededBehavior::Block,
//!         ..Default::default()
//!     },
//!     ..Default::default()
//! };
//! assert!(settings.validate().is_ok());
//! ```

#[cfg(feature = "settings-loaders")]
pub mod loader;

use crate::error::{Error, Result};
use std::time::Duration;

/// Maximum number of messages in a single publish request, as defined by the service.
pub const MAX_PUBLISH_REQUEST_COUNT: usize = 1000;

/// Maximum size of a single publish request in bytes, as defined by the service.
pub const MAX_PUBLISH_REQUEST_BYTES: usize = 10_000_000;

/// Bytes reserved for the repeated message field header of a publish request.
pub const REQUEST_FRAMING_OVERHEAD: usize = 5;

/// Default cap on bytes buffered by the scheduler.
pub const DEFAULT_BUFFERED_BYTE_LIMIT: usize = 10 * MAX_PUBLISH_REQUEST_BYTES;

/// Default worker threads per available CPU.
///
/// Publish RPCs spend most of their time waiting on the network, so the pool
/// is much larger than the CPU count.
pub const WORKERS_PER_CPU: usize = 25;

/// What flow control does when a limit would be exceeded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LimitExceededBehavior {
    /// Admit anyway; counters may exceed their maxima.
    #[default]
    Ignore,
    /// Block the publishing thread until capacity frees or the cancel token fires.
    Block,
    /// Fail the publish immediately with [`Error::FlowControl`].
    SignalError,
}

/// Publisher flow control settings.
///
/// A value `<= 0` disables the corresponding dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowControlSettings {
    /// Maximum number of messages published but not yet acknowledged.
    pub max_outstanding_messages: i64,
    /// Maximum bytes published but not yet acknowledged.
    pub max_outstanding_bytes: i64,
    /// Behavior when a limit would be exceeded.
    pub limit_exceeded_behavior: LimitExceededBehavior,
}

impl Default for FlowControlSettings {
    fn default() -> Self {
        Self {
            max_outstanding_messages: 1000,
            max_outstanding_bytes: -1,
            limit_exceeded_behavior: LimitExceededBehavior::Ignore,
        }
    }
}

impl FlowControlSettings {
    /// Message limit, or `None` when unlimited.
    pub fn message_limit(&self) -> Option<u64> {
        (self.max_outstanding_messages > 0).then_some(self.max_outstanding_messages as u64)
    }

    /// Byte limit, or `None` when unlimited.
    pub fn byte_limit(&self) -> Option<u64> {
        (self.max_outstanding_bytes > 0).then_some(self.max_outstanding_bytes as u64)
    }
}

/// Backoff applied to retryable publish RPC errors.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrySettings {
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Delay cap.
    pub max_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Maximum attempts including the first one (0 = bounded by `timeout` only).
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(60),
            multiplier: 1.3,
            max_attempts: 0,
        }
    }
}

/// Settings controlling bundling, concurrency and flow control for a publisher.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishSettings {
    /// Publish a non-empty bundle after this delay has passed.
    pub delay_threshold: Duration,

    /// Publish a bundle when it has this many messages (capped at
    /// [`MAX_PUBLISH_REQUEST_COUNT`]).
    pub count_threshold: usize,

    /// Publish a bundle when its size in bytes reaches this value.
    pub byte_threshold: usize,

    /// Worker threads calling the publish RPC. 0 selects
    /// [`WORKERS_PER_CPU`] x available parallelism.
    pub num_workers: usize,

    /// Maximum time spent publishing one bundle, retries included.
    /// `Duration::ZERO` disables the deadline.
    pub timeout: Duration,

    /// Flow control.
    pub flow_control: FlowControlSettings,

    /// Request transport compression for large bundles.
    pub enable_compression: bool,

    /// Bundle size above which compression is requested.
    pub compression_bytes_threshold: usize,

    /// Accept messages carrying an ordering key.
    pub enable_message_ordering: bool,

    /// Backoff for retryable RPC errors.
    pub retry: RetrySettings,

    /// Maximum bytes buffered or in flight in the scheduler; further
    /// publishes fail with [`Error::BufferOverflow`]. 0 selects
    /// [`DEFAULT_BUFFERED_BYTE_LIMIT`]. Ignored when
    /// `flow_control.max_outstanding_bytes` is set.
    pub buffered_byte_limit: usize,
}

impl Default for PublishSettings {
    fn default() -> Self {
        Self {
            delay_threshold: Duration::from_millis(10),
            count_threshold: 100,
            byte_threshold: 1_000_000,
            num_workers: 0,
            timeout: Duration::from_secs(60),
            flow_control: FlowControlSettings::default(),
            enable_compression: false,
            compression_bytes_threshold: 240,
            enable_message_ordering: false,
            retry: RetrySettings::default(),
            buffered_byte_limit: DEFAULT_BUFFERED_BYTE_LIMIT,
        }
    }
}

impl PublishSettings {
    /// Validate the settings.
    pub fn validate(&self) -> Result<()> {
        if self.count_threshold == 0 {
            return Err(Error::InvalidSettings(
                "count_threshold must be at least 1".into(),
            ));
        }
        if self.byte_threshold == 0 {
            return Err(Error::InvalidSettings(
                "byte_threshold must be at least 1".into(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(Error::InvalidSettings(format!(
                "retry multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(Error::InvalidSettings(
                "retry initial_backoff exceeds max_backoff".into(),
            ));
        }
        Ok(())
    }

    /// Whether a bundle of `bundle_bytes` should be sent compressed.
    pub fn should_compress(&self, bundle_bytes: usize) -> bool {
        self.enable_compression && bundle_bytes > self.compression_bytes_threshold
    }

    /// Count threshold clamped to the service limit.
    pub fn effective_count_threshold(&self) -> usize {
        self.count_threshold.clamp(1, MAX_PUBLISH_REQUEST_COUNT)
    }

    /// Scheduler buffer cap. Unlimited when flow control bounds bytes.
    pub fn effective_buffered_byte_limit(&self) -> usize {
        if self.flow_control.byte_limit().is_some() {
            usize::MAX
        } else if self.buffered_byte_limit == 0 {
            DEFAULT_BUFFERED_BYTE_LIMIT
        } else {
            self.buffered_byte_limit
        }
    }

    /// Worker count with the parallelism-derived default applied.
    pub fn effective_workers(&self) -> usize {
        if self.num_workers > 0 {
            return self.num_workers;
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        WORKERS_PER_CPU * cpus
    }
}

/// Size of length-delimited string fields as encoded in a publish request.
pub fn field_size_string(fields: &[&str]) -> usize {
    fields
        .iter()
        .map(|field| 1 + crate::wire::varint_len(field.len() as u64) + field.len())
        .sum()
}

/// Largest bundle (in encoded message bytes) that fits a request for `topic`.
pub fn bundle_byte_limit(topic: &str) -> usize {
    MAX_PUBLISH_REQUEST_BYTES
        .saturating_sub(field_size_string(&[topic]))
        .saturating_sub(REQUEST_FRAMING_OVERHEAD)
}
