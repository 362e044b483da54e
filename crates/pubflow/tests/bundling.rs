// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Bundling integration tests
//!
//! Count, byte and delay thresholds, oversized messages and compression.

mod common;

use common::{publisher, quiet_settings, ScriptedTransport};
use pubflow::{
    bundle_byte_limit, Code, Compression, Error, Message, PublishSettings, RetrySettings, RpcError,
};
use std::time::{Duration, Instant};

/// Message whose payload is `len` bytes long.
fn sized(len: usize, tag: char) -> Message {
    Message::new(tag.to_string().repeat(len))
}

// ============================================================================
// Thresholds
// ============================================================================

#[test]
fn test_count_threshold_cuts_first_three() {
    let transport = ScriptedTransport::new();
    let settings = PublishSettings {
        count_threshold: 3,
        num_workers: 1,
        ..quiet_settings()
    };
    let publisher = publisher(&transport, settings);

    let results: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|p| publisher.publish(Message::new(*p)))
        .collect();

    // The first three go out on their own; the delay is a minute away.
    assert!(results[0].get_timeout(Duration::from_secs(5)).is_some());
    assert_eq!(transport.call_count(), 1);
    assert_eq!(transport.calls()[0].payloads(), vec!["a", "b", "c"]);
    assert!(!results[3].is_ready());

    publisher.flush();
    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].payloads(), vec!["d"]);
}

#[test]
fn test_three_messages_count_two_after_delay() {
    let transport = ScriptedTransport::new();
    let settings = PublishSettings {
        count_threshold: 2,
        byte_threshold: 1000,
        delay_threshold: Duration::from_millis(50),
        num_workers: 1,
        ..Default::default()
    };
    let publisher = publisher(&transport, settings);

    let start = Instant::now();
    let results: Vec<_> = (1..=3)
        .map(|i| publisher.publish(sized(8, char::from(b'0' + i))))
        .collect();
    // No flush: the last partial bundle leaves when the delay elapses.
    let last = results[2].get().expect("published");
    assert!(start.elapsed() >= Duration::from_millis(40));
    assert_eq!(last, "3");

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].payloads(), vec!["11111111", "22222222"]);
    assert_eq!(calls[1].payloads(), vec!["33333333"]);
}

#[test]
fn test_byte_threshold_cuts_before_crossing() {
    let transport = ScriptedTransport::new();
    let settings = PublishSettings {
        byte_threshold: 100,
        num_workers: 1,
        ..quiet_settings()
    };
    let publisher = publisher(&transport, settings);

    // 40-byte payload encodes to 42 bytes.
    for tag in ['a', 'b', 'c'] {
        publisher.publish(sized(40, tag));
    }
    publisher.flush();

    let sizes: Vec<usize> = transport
        .calls()
        .iter()
        .map(|c| c.messages.len())
        .collect();
    assert_eq!(sizes, vec![2, 1]);
}

#[test]
fn test_delay_threshold_sends_partial_bundle() {
    let transport = ScriptedTransport::new();
    let settings = PublishSettings {
        delay_threshold: Duration::from_millis(20),
        ..quiet_settings()
    };
    let publisher = publisher(&transport, settings);

    let r = publisher.publish(Message::new("lonely"));
    assert_eq!(
        r.get_timeout(Duration::from_secs(5)),
        Some(Ok("1".to_string()))
    );
}

#[test]
fn test_max_delay_waits_for_flush() {
    let transport = ScriptedTransport::new();
    let settings = PublishSettings {
        delay_threshold: Duration::MAX,
        ..quiet_settings()
    };
    let publisher = publisher(&transport, settings);

    let r = publisher.publish(Message::new("held"));
    std::thread::sleep(Duration::from_millis(20));
    assert!(!r.is_ready());
    assert_eq!(transport.call_count(), 0);

    publisher.flush();
    assert_eq!(r.get(), Ok("1".to_string()));
}

// ============================================================================
// Oversized messages
// ============================================================================

#[test]
fn test_oversized_message_rejected_synchronously() {
    let transport = ScriptedTransport::new();
    let publisher = publisher(&transport, quiet_settings());
    let limit = bundle_byte_limit(publisher.topic().as_str());

    let huge = Message::new(vec![0u8; limit]);
    let size = huge.encoded_len();
    let r = publisher.publish(huge);
    assert!(r.is_ready());
    assert_eq!(r.get(), Err(Error::OversizedMessage { size, limit }));

    let ok = publisher.publish(Message::new("small"));
    publisher.flush();
    assert!(ok.get().is_ok());
    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payloads(), vec!["small"]);
    assert_eq!(publisher.metrics().outstanding_bytes, 0);
}

// ============================================================================
// Compression
// ============================================================================

#[test]
fn test_gzip_requested_only_above_threshold() {
    let transport = ScriptedTransport::new();
    let settings = PublishSettings {
        enable_compression: true,
        compression_bytes_threshold: 240,
        ..quiet_settings()
    };
    let publisher = publisher(&transport, settings);

    publisher.publish(sized(100, 's'));
    publisher.flush();
    publisher.publish(sized(400, 'l'));
    publisher.flush();

    let calls = transport.calls();
    assert_eq!(calls[0].compression, Compression::None);
    assert_eq!(calls[1].compression, Compression::Gzip);
    assert_eq!(publisher.metrics().compressed_requests, 1);
}

#[test]
fn test_retried_gzip_bundle_counted_once() {
    let transport = ScriptedTransport::new();
    let settings = PublishSettings {
        enable_compression: true,
        compression_bytes_threshold: 0,
        retry: RetrySettings {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..Default::default()
        },
        ..quiet_settings()
    };
    let publisher = publisher(&transport, settings);

    transport.fail_next(RpcError::new(Code::Unavailable, "try again"));
    transport.fail_next(RpcError::new(Code::Unavailable, "try again"));
    let r = publisher.publish(Message::new("zipped"));
    publisher.flush();

    assert!(r.get().is_ok());
    assert_eq!(transport.call_count(), 3);
    assert!(transport
        .calls()
        .iter()
        .all(|c| c.compression == Compression::Gzip));
    let m = publisher.metrics();
    assert_eq!(m.compressed_requests, 1);
    assert_eq!(m.rpc_retries, 2);
}

#[test]
fn test_compression_disabled_by_default() {
    let transport = ScriptedTransport::new();
    let publisher = publisher(&transport, quiet_settings());
    publisher.publish(sized(10_000, 'x'));
    publisher.flush();
    assert_eq!(transport.calls()[0].compression, Compression::None);
}
