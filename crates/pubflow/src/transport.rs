// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish RPC abstraction.
//!
//! The publisher never opens connections itself. It hands encoded requests to
//! a [`PublishTransport`] and interprets the returned status [`Code`].
//! Implementations are called concurrently from worker threads.

use crate::cancel::CancelToken;
use crate::wire;
use std::fmt;

/// RPC status codes (gRPC numbering).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl Code {
    /// Canonical upper snake case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Code::Ok => "OK",
            Code::Cancelled => "CANCELLED",
            Code::Unknown => "UNKNOWN",
            Code::InvalidArgument => "INVALID_ARGUMENT",
            Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Code::NotFound => "NOT_FOUND",
            Code::AlreadyExists => "ALREADY_EXISTS",
            Code::PermissionDenied => "PERMISSION_DENIED",
            Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Code::FailedPrecondition => "FAILED_PRECONDITION",
            Code::Aborted => "ABORTED",
            Code::OutOfRange => "OUT_OF_RANGE",
            Code::Unimplemented => "UNIMPLEMENTED",
            Code::Internal => "INTERNAL",
            Code::Unavailable => "UNAVAILABLE",
            Code::DataLoss => "DATA_LOSS",
            Code::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error status returned by a publish RPC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcError {
    /// Status code.
    pub code: Code,
    /// Server or transport supplied detail.
    pub message: String,
}

impl RpcError {
    /// Create a new RPC error.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// Transport level compression for a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Compression {
    /// Send as is.
    #[default]
    None,
    /// Gzip the request body.
    Gzip,
}

/// Per-call options.
#[derive(Clone, Debug)]
pub struct CallOptions {
    /// Requested compression.
    pub compression: Compression,
    /// Largest request the caller may send.
    pub max_send_bytes: usize,
    /// Fires when the bundle timeout elapses or the publisher shuts down.
    pub cancel: CancelToken,
}

/// A publish request: one bundle of encoded messages for one topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishRequest {
    /// Fully qualified topic name.
    pub topic: String,
    /// Encoded messages, in bundle order.
    pub messages: Vec<Vec<u8>>,
}

impl PublishRequest {
    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if the request carries no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Encoded request body.
    pub fn encode(&self) -> Vec<u8> {
        wire::encode_request(&self.topic, &self.messages)
    }

    /// Gzipped request body.
    pub fn encode_gzip(&self) -> std::io::Result<Vec<u8>> {
        wire::gzip(&self.encode())
    }
}

/// Publish RPC.
///
/// On success returns one server-assigned message id per request message, in
/// request order.
pub trait PublishTransport: Send + Sync {
    /// Send one request.
    fn publish(
        &self,
        request: &PublishRequest,
        options: &CallOptions,
    ) -> Result<Vec<String>, RpcError>;
}
