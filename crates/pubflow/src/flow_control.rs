// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher flow control.
//!
//! Bounds the number of messages and bytes that have been accepted by
//! [`Publisher::publish`](crate::Publisher::publish) but whose result is not
//! yet known.
//!
//! | Behavior | Over the limit |
//! |----------|----------------|
//! | `Ignore` | admitted, counters keep counting |
//! | `Block` | caller waits in FIFO order until capacity frees or its token fires |
//! | `SignalError` | rejected with [`Error::FlowControl`], nothing reserved |
//!
//! Under `Block`, a single message larger than the byte limit reserves the
//! whole byte budget, so it is admitted once everything else has drained.

use crate::cancel::CancelToken;
use crate::config::{FlowControlSettings, LimitExceededBehavior};
use crate::error::{Error, LimitKind, Result};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;

struct Waiter {
    id: u64,
    bytes: u64,
    grant: Sender<()>,
}

#[derive(Default)]
struct State {
    messages: u64,
    bytes: u64,
    waiters: VecDeque<Waiter>,
    next_waiter: u64,
}

/// Counting limiter on outstanding messages and bytes.
pub struct FlowController {
    max_messages: Option<u64>,
    max_bytes: Option<u64>,
    behavior: LimitExceededBehavior,
    state: Mutex<State>,
}

impl FlowController {
    /// Create a controller from settings. Limits `<= 0` are unlimited.
    pub fn new(settings: &FlowControlSettings) -> Self {
        Self {
            max_messages: settings.message_limit(),
            max_bytes: settings.byte_limit(),
            behavior: settings.limit_exceeded_behavior,
            state: Mutex::new(State::default()),
        }
    }

    /// Configured behavior.
    pub fn behavior(&self) -> LimitExceededBehavior {
        self.behavior
    }

    /// Reserve capacity for one message of `size` bytes.
    ///
    /// Every successful call must be paired with one [`release`](Self::release)
    /// of the same size.
    pub fn acquire(&self, cancel: &CancelToken, size: usize) -> Result<()> {
        match self.behavior {
            LimitExceededBehavior::Ignore => {
                let mut st = self.state.lock();
                st.messages += 1;
                st.bytes += size as u64;
                Ok(())
            }
            LimitExceededBehavior::SignalError => {
                let mut st = self.state.lock();
                if let Some(kind) = self.exceeded(&st, size as u64) {
                    log::debug!("[flow] rejecting {} bytes: {}", size, kind);
                    return Err(Error::FlowControl(kind));
                }
                st.messages += 1;
                st.bytes += size as u64;
                Ok(())
            }
            LimitExceededBehavior::Block => self.acquire_blocking(cancel, size),
        }
    }

    fn acquire_blocking(&self, cancel: &CancelToken, size: usize) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(cancel.err());
        }
        let bytes = self.bounded(size);

        let (id, grant_rx) = {
            let mut st = self.state.lock();
            if st.waiters.is_empty() && self.exceeded(&st, bytes).is_none() {
                st.messages += 1;
                st.bytes += bytes;
                return Ok(());
            }
            let (tx, rx) = channel::bounded(1);
            let id = st.next_waiter;
            st.next_waiter += 1;
            st.waiters.push_back(Waiter {
                id,
                bytes,
                grant: tx,
            });
            log::debug!(
                "[flow] blocking on {} bytes ({} waiters, {} msgs / {} bytes outstanding)",
                bytes,
                st.waiters.len(),
                st.messages,
                st.bytes
            );
            (id, rx)
        };

        let deadline = cancel
            .deadline()
            .map(channel::at)
            .unwrap_or_else(channel::never);
        crossbeam::select! {
            recv(grant_rx) -> _ => return Ok(()),
            recv(cancel.signal()) -> _ => {}
            recv(deadline) -> _ => {}
        }

        let mut st = self.state.lock();
        if let Some(pos) = st.waiters.iter().position(|w| w.id == id) {
            st.waiters.remove(pos);
            // A smaller waiter behind us may fit now.
            self.grant_waiters(&mut st);
        } else {
            // Granted concurrently with the cancel: hand the capacity back.
            self.release_locked(&mut st, bytes);
        }
        Err(cancel.err())
    }

    /// Return capacity reserved by a successful [`acquire`](Self::acquire).
    pub fn release(&self, size: usize) {
        let bytes = match self.behavior {
            LimitExceededBehavior::Block => self.bounded(size),
            _ => size as u64,
        };
        let mut st = self.state.lock();
        self.release_locked(&mut st, bytes);
    }

    /// Outstanding `(messages, bytes)`. Approximate under concurrency.
    pub fn outstanding(&self) -> (u64, u64) {
        let st = self.state.lock();
        (st.messages, st.bytes)
    }

    /// Number of callers blocked in [`acquire`](Self::acquire).
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn release_locked(&self, st: &mut State, bytes: u64) {
        st.messages = st.messages.saturating_sub(1);
        st.bytes = st.bytes.saturating_sub(bytes);
        self.grant_waiters(st);
    }

    /// Admit queued waiters in FIFO order while the head fits.
    fn grant_waiters(&self, st: &mut State) {
        while let Some(head) = st.waiters.front() {
            if self.exceeded(st, head.bytes).is_some() {
                break;
            }
            let bytes = head.bytes;
            if let Some(w) = st.waiters.pop_front() {
                st.messages += 1;
                st.bytes += bytes;
                // Capacity 1 and a single send: never blocks.
                let _ = w.grant.try_send(());
            }
        }
    }

    fn exceeded(&self, st: &State, bytes: u64) -> Option<LimitKind> {
        if self.max_messages.is_some_and(|max| st.messages + 1 > max) {
            return Some(LimitKind::Messages);
        }
        if self.max_bytes.is_some_and(|max| st.bytes + bytes > max) {
            return Some(LimitKind::Bytes);
        }
        None
    }

    fn bounded(&self, size: usize) -> u64 {
        let size = size as u64;
        self.max_bytes.map_or(size, |max| size.min(max))
    }
}

impl std::fmt::Debug for FlowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (messages, bytes) = self.outstanding();
        f.debug_struct("FlowController")
            .field("max_messages", &self.max_messages)
            .field("max_bytes", &self.max_bytes)
            .field("behavior", &self.behavior)
            .field("messages", &messages)
            .field("bytes", &bytes)
            .finish()
    }
}
