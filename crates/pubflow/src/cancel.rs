// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cancellation tokens.
//!
//! A [`CancelToken`] combines an explicit cancel flag with an optional
//! deadline. Blocking operations wait on [`CancelToken::signal`] inside a
//! `crossbeam::select!`: the channel never carries a value, it disconnects
//! when the token is cancelled.

use crate::error::Error;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Inner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
    deadline: Option<Instant>,
}

/// Cloneable cancellation handle. Cancelling any clone cancels all of them.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// A token without deadline.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A token that is never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn never() -> Self {
        Self::new()
    }

    /// A token that expires after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    /// A token that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                signal: rx,
                deadline,
            }),
        }
    }

    /// Cancel the token and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.trigger.lock().take();
    }

    /// True once cancelled or past the deadline.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Receiver that disconnects on cancel. Never yields a value.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The error a cancelled operation reports.
    pub fn err(&self) -> Error {
        if self.inner.cancelled.load(Ordering::Acquire) {
            Error::Cancelled
        } else {
            Error::DeadlineExceeded
        }
    }

    /// Sleep for up to `timeout`. Returns false if the token fired first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        // A timeout too large for `Instant` sleeps until cancel or deadline.
        let (until, expired_by_deadline) =
            match (Instant::now().checked_add(timeout), self.inner.deadline) {
                (Some(t), Some(d)) if d < t => (Some(d), true),
                (None, Some(d)) => (Some(d), true),
                (t, _) => (t, false),
            };
        let timer = until.map_or_else(channel::never, channel::at);
        crossbeam::select! {
            recv(self.inner.signal) -> _ => false,
            recv(timer) -> _ => !expired_by_deadline,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.inner.cancelled.load(Ordering::Relaxed))
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_wakes_waiter() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(!handle.join().expect("join"));
        assert!(token.is_cancelled());
        assert_eq!(token.err(), Error::Cancelled);
    }

    #[test]
    fn test_wait_timeout_elapses() {
        let token = CancelToken::never();
        let start = Instant::now();
        assert!(token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_deadline() {
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        assert!(!token.wait_timeout(Duration::from_secs(5)));
        assert!(token.is_cancelled());
        assert_eq!(token.err(), Error::DeadlineExceeded);
        assert_eq!(token.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_wait_timeout_max_duration() {
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        assert!(!token.wait_timeout(Duration::MAX));
        assert_eq!(token.err(), Error::DeadlineExceeded);

        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = thread::spawn(move || waiter.wait_timeout(Duration::MAX));
        thread::sleep(Duration::from_millis(10));
        token.cancel();
        assert!(!handle.join().expect("join"));

        let unbounded = CancelToken::with_timeout(Duration::MAX);
        assert_eq!(unbounded.deadline(), None);
        assert!(!unbounded.is_cancelled());
    }

    #[test]
    fn test_signal_disconnects() {
        let token = CancelToken::new();
        assert_eq!(token.signal().try_recv(), Err(channel::TryRecvError::Empty));
        token.cancel();
        token.cancel();
        assert_eq!(
            token.signal().try_recv(),
            Err(channel::TryRecvError::Disconnected)
        );
    }
}
