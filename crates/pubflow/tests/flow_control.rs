// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Flow control integration tests
//!
//! Block / SignalError / Ignore behaviors through the publisher, and release
//! accounting across retries.

mod common;

use common::{publisher, quiet_settings, ScriptedTransport};
use pubflow::{
    CancelToken, Code, Error, FlowControlSettings, LimitExceededBehavior, LimitKind, Message,
    PublishSettings, RetrySettings, RpcError,
};
use std::thread;
use std::time::{Duration, Instant};

fn with_flow(
    messages: i64,
    bytes: i64,
    behavior: LimitExceededBehavior,
    base: PublishSettings,
) -> PublishSettings {
    PublishSettings {
        flow_control: FlowControlSettings {
            max_outstanding_messages: messages,
            max_outstanding_bytes: bytes,
            limit_exceeded_behavior: behavior,
        },
        ..base
    }
}

// ============================================================================
// Block
// ============================================================================

#[test]
fn test_block_message_larger_than_budget_waits_for_release() {
    const BUDGET: i64 = 100;
    let transport = ScriptedTransport::new();
    let settings = with_flow(
        0,
        BUDGET,
        LimitExceededBehavior::Block,
        PublishSettings {
            count_threshold: 1,
            ..quiet_settings()
        },
    );
    let publisher = publisher(&transport, settings);

    transport.close();
    let first = publisher.publish(Message::new(vec![b'a'; 50]));

    // 99-byte payload: 1 tag + 1 length byte + 99 = BUDGET + 1 encoded bytes.
    let big_msg = Message::new(vec![b'b'; 99]);
    assert_eq!(big_msg.encoded_len() as i64, BUDGET + 1);

    thread::scope(|s| {
        let big = s.spawn(|| publisher.publish(big_msg));
        thread::sleep(Duration::from_millis(50));
        assert!(!big.is_finished(), "admitted while bytes were outstanding");
        assert_eq!(publisher.metrics().outstanding_messages, 1);

        transport.open();
        let big_result = big.join().expect("publisher thread");
        assert_eq!(first.get(), Ok("1".to_string()));
        publisher.flush();
        assert_eq!(big_result.get(), Ok("2".to_string()));
    });

    let m = publisher.metrics();
    assert_eq!((m.outstanding_messages, m.outstanding_bytes), (0, 0));
}

#[test]
fn test_block_respects_cancel_token() {
    let transport = ScriptedTransport::new();
    let settings = with_flow(1, -1, LimitExceededBehavior::Block, quiet_settings());
    let publisher = publisher(&transport, settings);

    let held = publisher.publish(Message::new("held"));
    let token = CancelToken::with_timeout(Duration::from_millis(20));
    let start = Instant::now();
    let r = publisher.try_publish(&token, Message::new("waits"));
    assert_eq!(r.err(), Some(Error::DeadlineExceeded));
    assert!(start.elapsed() < Duration::from_secs(5));

    publisher.flush();
    assert!(held.get().is_ok());
    assert_eq!(transport.call_count(), 1);
    assert_eq!(publisher.metrics().outstanding_messages, 0);
}

// ============================================================================
// SignalError / Ignore
// ============================================================================

#[test]
fn test_signal_error_rejects_and_pauses_key() {
    let transport = ScriptedTransport::new();
    let settings = with_flow(
        2,
        -1,
        LimitExceededBehavior::SignalError,
        PublishSettings {
            enable_message_ordering: true,
            ..quiet_settings()
        },
    );
    let publisher = publisher(&transport, settings);

    publisher.publish(Message::new("1").with_ordering_key("k"));
    publisher.publish(Message::new("2").with_ordering_key("k"));
    let third = publisher.publish(Message::new("3").with_ordering_key("k"));
    assert_eq!(third.get(), Err(Error::FlowControl(LimitKind::Messages)));
    assert!(publisher.is_paused("k"));

    publisher.flush();
    // Queued bundle for the paused key is not sent.
    assert_eq!(transport.call_count(), 0);
    assert_eq!(publisher.metrics().outstanding_messages, 0);
}

#[test]
fn test_signal_error_bytes() {
    let transport = ScriptedTransport::new();
    let settings = with_flow(0, 50, LimitExceededBehavior::SignalError, quiet_settings());
    let publisher = publisher(&transport, settings);

    publisher.publish(Message::new(vec![0u8; 30]));
    let r = publisher.publish(Message::new(vec![0u8; 30]));
    assert_eq!(r.get(), Err(Error::FlowControl(LimitKind::Bytes)));
    assert_eq!(publisher.metrics().outstanding_bytes, 32);
}

#[test]
fn test_ignore_admits_past_limits() {
    let transport = ScriptedTransport::new();
    let settings = with_flow(1, 1, LimitExceededBehavior::Ignore, quiet_settings());
    let publisher = publisher(&transport, settings);

    for i in 0..5 {
        publisher.publish(Message::new(format!("m{}", i)));
    }
    assert_eq!(publisher.metrics().outstanding_messages, 5);
    publisher.flush();
    assert_eq!(publisher.metrics().outstanding_messages, 0);
}

// ============================================================================
// Scheduler buffer
// ============================================================================

#[test]
fn test_buffer_overflow_rejects_and_pauses_key() {
    let transport = ScriptedTransport::new();
    let settings = PublishSettings {
        enable_message_ordering: true,
        buffered_byte_limit: 50,
        ..quiet_settings()
    };
    let publisher = publisher(&transport, settings);

    let first = publisher.publish(Message::new(vec![0u8; 30]).with_ordering_key("k"));
    let second = publisher.publish(Message::new(vec![1u8; 30]).with_ordering_key("k"));
    assert_eq!(second.get(), Err(Error::BufferOverflow { limit: 50 }));
    assert!(publisher.is_paused("k"));

    // Only the rejected message's flow-control reservation was returned.
    assert_eq!(publisher.metrics().outstanding_messages, 1);
    publisher.flush();
    assert_eq!(
        first.get(),
        Err(Error::PublishingPaused {
            ordering_key: "k".into()
        })
    );
    assert_eq!(publisher.metrics().outstanding_messages, 0);

    publisher.resume_publish("k");
    assert!(publisher
        .publish(Message::new(vec![2u8; 30]).with_ordering_key("k"))
        .get()
        .is_ok());
}

#[test]
fn test_outstanding_bytes_limit_lifts_buffer_cap() {
    let transport = ScriptedTransport::new();
    let settings = with_flow(
        0,
        1_000,
        LimitExceededBehavior::SignalError,
        PublishSettings {
            buffered_byte_limit: 50,
            ..quiet_settings()
        },
    );
    let publisher = publisher(&transport, settings);

    let results: Vec<_> = (0..3u8)
        .map(|i| publisher.publish(Message::new(vec![i; 30])))
        .collect();
    publisher.flush();
    for r in &results {
        assert!(r.get().is_ok());
    }
}

// ============================================================================
// Release accounting
// ============================================================================

#[test]
fn test_two_transient_failures_then_success_release_once() {
    let transport = ScriptedTransport::new();
    let settings = PublishSettings {
        enable_message_ordering: true,
        count_threshold: 2,
        retry: RetrySettings {
            initial_backoff: Duration::from_millis(2),
            max_backoff: Duration::from_millis(10),
            ..Default::default()
        },
        ..quiet_settings()
    };
    let publisher = publisher(&transport, settings);

    // Stays buffered (count threshold 2, delay a minute): keeps one message
    // outstanding so a double release would show.
    let parked = Message::new("parked").with_ordering_key("parked");
    let parked_size = parked.encoded_len() as u64;
    let _parked = publisher.publish(parked);

    transport.fail_next(RpcError::new(Code::Unavailable, "try again"));
    transport.fail_next(RpcError::new(Code::Unavailable, "try again"));
    let a = publisher.publish(Message::new("a").with_ordering_key("retry"));
    let b = publisher.publish(Message::new("b").with_ordering_key("retry"));

    assert_eq!(a.get(), Ok("1".to_string()));
    assert_eq!(b.get(), Ok("2".to_string()));
    assert_eq!(transport.call_count(), 3);
    assert_eq!(transport.delivered().len(), 1);

    let m = publisher.metrics();
    assert_eq!(m.rpc_retries, 2);
    assert_eq!(m.outstanding_messages, 1);
    assert_eq!(m.outstanding_bytes, parked_size);
    assert!(!publisher.is_paused("retry"));
}
