// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared test fixtures: a scripted in-memory publish transport.

#![allow(dead_code)]

use parking_lot::{Condvar, Mutex};
use pubflow::wire;
use pubflow::{
    CallOptions, Compression, Message, PublishRequest, PublishSettings, PublishTransport,
    Publisher, RpcError,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub const TOPIC: &str = "projects/test-project/topics/test-topic";

/// One request as seen by the transport.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub topic: String,
    pub messages: Vec<Message>,
    pub compression: Compression,
    pub attempt_ok: bool,
}

impl RecordedCall {
    /// Payloads as UTF-8 strings.
    pub fn payloads(&self) -> Vec<String> {
        self.messages
            .iter()
            .map(|m| String::from_utf8_lossy(m.data()).into_owned())
            .collect()
    }
}

/// In-memory transport.
///
/// Each call pops the next scripted failure (if any); otherwise it succeeds
/// and returns ids `"1"`, `"2"`, ... in the order messages reach it.
#[derive(Default)]
pub struct ScriptedTransport {
    failures: Mutex<VecDeque<RpcError>>,
    calls: Mutex<Vec<RecordedCall>>,
    next_id: Mutex<u64>,
    gate: Mutex<bool>,
    gate_cv: Condvar,
    latency: Mutex<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next call with `err`. Calls are failed in FIFO order.
    pub fn fail_next(&self, err: RpcError) {
        self.failures.lock().push_back(err);
    }

    /// Block every call until [`open`](Self::open).
    pub fn close(&self) {
        *self.gate.lock() = true;
    }

    /// Let blocked calls proceed.
    pub fn open(&self) {
        *self.gate.lock() = false;
        self.gate_cv.notify_all();
    }

    /// Sleep this long in every call.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Successful calls only.
    pub fn delivered(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.attempt_ok).collect()
    }
}

impl PublishTransport for ScriptedTransport {
    fn publish(&self, req: &PublishRequest, opts: &CallOptions) -> Result<Vec<String>, RpcError> {
        {
            let mut closed = self.gate.lock();
            while *closed {
                self.gate_cv.wait(&mut closed);
            }
        }
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        let messages = req
            .messages
            .iter()
            .map(|m| wire::decode_message(m).expect("transport received a malformed message"))
            .collect();
        let failure = self.failures.lock().pop_front();
        self.calls.lock().push(RecordedCall {
            topic: req.topic.clone(),
            messages,
            compression: opts.compression,
            attempt_ok: failure.is_none(),
        });
        if let Some(err) = failure {
            return Err(err);
        }

        let mut next = self.next_id.lock();
        Ok(req
            .messages
            .iter()
            .map(|_| {
                *next += 1;
                next.to_string()
            })
            .collect())
    }
}

/// Settings that never cut on delay unless the test asks for it.
pub fn quiet_settings() -> PublishSettings {
    PublishSettings {
        delay_threshold: Duration::from_secs(60),
        num_workers: 4,
        ..Default::default()
    }
}

pub fn publisher(transport: &Arc<ScriptedTransport>, settings: PublishSettings) -> Publisher {
    let _ = env_logger::builder().is_test(true).try_init();
    Publisher::new(TOPIC, transport.clone(), settings).expect("valid publisher")
}
