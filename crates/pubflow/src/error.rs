// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by the publish pipeline.
//!
//! Admission errors (oversized message, flow control, ordering disabled,
//! paused key, stopped publisher) are reported synchronously. RPC failures are
//! only ever observed through a [`PublishResult`](crate::PublishResult).
//!
//! `Error` is `Clone`: a failed bundle resolves every handle it carries to the
//! same error value.

use crate::transport::RpcError;
use std::fmt;
use thiserror::Error;

/// Flow-control dimension that rejected a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LimitKind {
    /// Outstanding message count limit.
    Messages,
    /// Outstanding byte limit.
    Bytes,
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitKind::Messages => write!(f, "max outstanding messages"),
            LimitKind::Bytes => write!(f, "max outstanding bytes"),
        }
    }
}

/// Errors returned by pubflow operations.
///
/// # Example
///
/// ```rust
/// use pubflow::{Error, LimitKind};
///
/// let err = Error::FlowControl(LimitKind::Bytes);
/// assert!(err.is_admission());
/// assert_eq!(err.to_string(), "flow control limit exceeded: max outstanding bytes");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ========================================================================
    // Admission Errors
    // ========================================================================
    /// The message alone is larger than the largest bundle that can be sent.
    #[error("message of {size} bytes exceeds the maximum bundle size of {limit} bytes")]
    OversizedMessage {
        /// Encoded message size.
        size: usize,
        /// Bundle byte limit.
        limit: usize,
    },

    /// Flow control rejected the message (`LimitExceededBehavior::SignalError`).
    #[error("flow control limit exceeded: {0}")]
    FlowControl(LimitKind),

    /// The scheduler already buffers `limit` bytes of unsent messages.
    #[error("publish buffer full: more than {limit} bytes waiting to be sent")]
    BufferOverflow {
        /// Buffered byte limit.
        limit: usize,
    },

    /// An ordering key was set but message ordering is disabled.
    #[error(
        "message has an ordering key but enable_message_ordering is false; \
         remove the ordering key or enable message ordering"
    )]
    OrderingNotEnabled,

    /// The ordering key is paused after an earlier failure.
    #[error(
        "publishing for ordering key {ordering_key:?} paused due to a previous error; \
         call resume_publish() before publishing again"
    )]
    PublishingPaused {
        /// The paused ordering key.
        ordering_key: String,
    },

    /// The publisher (or scheduler) has been stopped.
    #[error("publisher has been stopped")]
    Stopped,

    /// A scheduler worker or timer thread could not be started.
    #[error("failed to spawn {0}")]
    ThreadSpawn(String),

    // ========================================================================
    // Cancellation
    // ========================================================================
    /// The caller's cancel token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's or the bundle's deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The publish RPC failed and will not be retried.
    #[error("publish RPC failed: {0}")]
    Rpc(#[from] RpcError),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Topic name is not of the form `projects/<project>/topics/<id>`.
    #[error("invalid topic name: {0:?}")]
    InvalidTopicName(String),

    /// Publish settings failed validation.
    #[error("invalid publish settings: {0}")]
    InvalidSettings(String),

    /// Publish settings could not be read or parsed.
    #[cfg(feature = "settings-loaders")]
    #[error("failed to load publish settings: {0}")]
    SettingsLoad(String),
}

impl Error {
    /// Returns true for errors raised while admitting a message, before any
    /// network activity.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            Error::OversizedMessage { .. }
                | Error::FlowControl(_)
                | Error::BufferOverflow { .. }
                | Error::OrderingNotEnabled
                | Error::PublishingPaused { .. }
                | Error::Stopped
        )
    }

    /// Returns the ordering key if this is a paused-key error.
    pub fn paused_key(&self) -> Option<&str> {
        match self {
            Error::PublishingPaused { ordering_key } => Some(ordering_key),
            _ => None,
        }
    }
}

/// Convenient alias for results using the crate `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
