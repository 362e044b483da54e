// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish result handles.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

struct Inner {
    slot: OnceLock<Result<String>>,
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
}

/// Handle to the eventual outcome of one publish: the server-assigned
/// message id or the error that ended the attempt.
///
/// Resolved exactly once. Cloning shares the same outcome.
#[derive(Clone)]
pub struct PublishResult {
    inner: Arc<Inner>,
}

impl PublishResult {
    /// An unresolved handle.
    pub(crate) fn pending() -> Self {
        let (tx, rx) = channel::bounded(0);
        Self {
            inner: Arc::new(Inner {
                slot: OnceLock::new(),
                done_tx: Mutex::new(Some(tx)),
                done_rx: rx,
            }),
        }
    }

    /// A handle already resolved to `err`.
    pub(crate) fn failed(err: Error) -> Self {
        let result = Self::pending();
        result.set(Err(err));
        result
    }

    /// Resolve the handle. Only the first call has any effect.
    pub(crate) fn set(&self, outcome: Result<String>) -> bool {
        let first = self.inner.slot.set(outcome).is_ok();
        if first {
            // Disconnects `done_rx`, waking every waiter.
            self.inner.done_tx.lock().take();
        }
        first
    }

    /// True once resolved.
    pub fn is_ready(&self) -> bool {
        self.inner.slot.get().is_some()
    }

    /// Receiver that disconnects once the handle is resolved, for use in
    /// `crossbeam::select!`.
    pub fn ready(&self) -> &Receiver<()> {
        &self.inner.done_rx
    }

    /// Outcome if already resolved.
    pub fn try_get(&self) -> Option<Result<String>> {
        self.inner.slot.get().cloned()
    }

    /// Block until resolved.
    pub fn get(&self) -> Result<String> {
        // Only ever returns once the sender is dropped.
        let _ = self.inner.done_rx.recv();
        self.outcome()
    }

    /// Block until resolved or `cancel` fires. Cancelling the wait does not
    /// cancel the publish.
    pub fn get_with(&self, cancel: &CancelToken) -> Result<String> {
        if let Some(outcome) = self.try_get() {
            return outcome;
        }
        let deadline = cancel
            .deadline()
            .map(channel::at)
            .unwrap_or_else(channel::never);
        crossbeam::select! {
            recv(self.inner.done_rx) -> _ => self.outcome(),
            recv(cancel.signal()) -> _ => self.try_get().unwrap_or(Err(Error::Cancelled)),
            recv(deadline) -> _ => self.try_get().unwrap_or(Err(Error::DeadlineExceeded)),
        }
    }

    /// Block for at most `timeout`. Returns `None` if still unresolved.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<String>> {
        match self.inner.done_rx.recv_timeout(timeout) {
            Err(channel::RecvTimeoutError::Timeout) => None,
            _ => self.try_get(),
        }
    }

    fn outcome(&self) -> Result<String> {
        self.try_get().unwrap_or(Err(Error::Stopped))
    }
}

impl std::fmt::Debug for PublishResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishResult")
            .field("outcome", &self.inner.slot.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_once() {
        let r = PublishResult::pending();
        assert!(!r.is_ready());
        assert!(r.try_get().is_none());
        assert!(r.set(Ok("id-1".into())));
        assert!(!r.set(Err(Error::Stopped)));
        assert_eq!(r.get(), Ok("id-1".to_string()));
        assert_eq!(r.get(), Ok("id-1".to_string()));
    }

    #[test]
    fn test_get_blocks_until_set() {
        let r = PublishResult::pending();
        let setter = r.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set(Ok("late".into()));
        });
        assert_eq!(r.get(), Ok("late".to_string()));
        handle.join().expect("join");
    }

    #[test]
    fn test_get_with_cancel() {
        let r = PublishResult::pending();
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        assert_eq!(r.get_with(&token), Err(Error::DeadlineExceeded));
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(r.get_with(&token), Err(Error::Cancelled));
        // Waiting was cancelled, the publish was not.
        r.set(Ok("x".into()));
        assert_eq!(r.get_with(&token), Ok("x".to_string()));
    }

    #[test]
    fn test_get_timeout_and_failed() {
        let r = PublishResult::pending();
        assert!(r.get_timeout(Duration::from_millis(5)).is_none());
        let f = PublishResult::failed(Error::OrderingNotEnabled);
        assert!(f.is_ready());
        assert_eq!(
            f.get_timeout(Duration::ZERO),
            Some(Err(Error::OrderingNotEnabled))
        );
        assert_eq!(
            f.ready().try_recv(),
            Err(channel::TryRecvError::Disconnected)
        );
    }
}
