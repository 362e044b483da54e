// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # pubflow - publish-side batching, flow control and ordering
//!
//! Turns many independent "publish this message" calls into size- and
//! time-bounded publish requests, applies backpressure on outstanding
//! messages, and keeps per-key ordering under retries and partial failure.
//! The remote service is reached through a [`PublishTransport`] supplied by
//! the application.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pubflow::{Message, PublishSettings, PublishTransport, Publisher, Result};
//! use std::sync::Arc;
//!
//! fn run(transport: Arc<dyn PublishTransport>) -> Result<()> {
//!     let settings = PublishSettings {
//!         enable_message_ordering: true,
//!         ..Default::default()
//!     };
//!     let publisher = Publisher::new("projects/my-project/topics/orders", transport, settings)?;
//!
//!     let result = publisher.publish(Message::new("order #1").with_ordering_key("customer-7"));
//!     let id = result.get()?;
//!     println!("published as {}", id);
//!
//!     publisher.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |  Publisher::publish                                                  |
//! |    ordering check -> paused check -> size check -> FlowController    |
//! +---------------------------------------------------------------------+
//! |  PublishScheduler                                                    |
//! |    per-key partitions | count/byte/delay thresholds | worker pool    |
//! +---------------------------------------------------------------------+
//! |  Publish pipeline                                                    |
//! |    wire encoding | gzip | PublishRetryer | result delivery | pause   |
//! +---------------------------------------------------------------------+
//! |  PublishTransport (application supplied RPC)                         |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | Entry point: publish, flush, stop, resume |
//! | [`PublishResult`] | Write-once handle to the server id or error |
//! | [`PublishSettings`] | Bundling, concurrency, flow control and retry settings |
//! | [`FlowController`] | Outstanding message/byte limiter |
//! | [`PublishScheduler`] | Generic per-key bundler over a worker pool |
//! | [`PublishTransport`] | The outbound publish RPC |

/// Cancellation tokens with optional deadlines.
pub mod cancel;
/// Publish settings, service limits and the YAML loader.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Outstanding message/byte limiter.
pub mod flow_control;
/// Messages and topic names.
pub mod message;
/// Publisher counters.
pub mod metrics;
/// Paused ordering keys.
pub mod ordering;
/// Publisher and publish pipeline.
pub mod publisher;
/// Write-once publish result handles.
pub mod result;
/// Retry policies for the publish RPC.
pub mod retry;
/// Per-key bundling scheduler.
pub mod scheduler;
/// Publish RPC abstraction.
pub mod transport;
/// Wire encoding and size accounting.
pub mod wire;

pub use cancel::CancelToken;
pub use config::{
    bundle_byte_limit, FlowControlSettings, LimitExceededBehavior, PublishSettings, RetrySettings,
    DEFAULT_BUFFERED_BYTE_LIMIT, MAX_PUBLISH_REQUEST_BYTES, MAX_PUBLISH_REQUEST_COUNT,
};
pub use error::{Error, LimitKind, Result};
pub use flow_control::FlowController;
pub use message::{Message, TopicName};
pub use metrics::{PublisherMetrics, PublisherMetricsSnapshot};
pub use ordering::OrderingKeys;
pub use publisher::Publisher;
pub use result::PublishResult;
pub use retry::{BackoffRetryer, PublishRetryer, Retryer};
pub use scheduler::{BundleHandler, PublishScheduler, SchedulerLimits};
pub use transport::{CallOptions, Code, Compression, PublishRequest, PublishTransport, RpcError};

#[cfg(feature = "settings-loaders")]
pub use config::loader::SettingsLoader;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
