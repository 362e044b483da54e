// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Paused ordering keys.
//!
//! When a message with an ordering key fails, later messages with the same
//! key must not be published out of order. The key is paused: new publishes
//! and queued bundles for it fail with [`Error::PublishingPaused`] until the
//! application calls `resume_publish`.
//!
//! The empty key (unordered messages) is never paused.
//!
//! [`Error::PublishingPaused`]: crate::Error::PublishingPaused

use dashmap::DashSet;

/// Set of paused ordering keys, safe to share between threads.
#[derive(Debug, Default)]
pub struct OrderingKeys {
    paused: DashSet<String>,
}

impl OrderingKeys {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause `key`. Returns true if it was not already paused.
    pub fn pause(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        let newly = self.paused.insert(key.to_string());
        if newly {
            log::warn!("[ordering] paused key {:?}", key);
        }
        newly
    }

    /// Resume `key`. Returns true if it was paused.
    pub fn resume(&self, key: &str) -> bool {
        let was = self.paused.remove(key).is_some();
        if was {
            log::info!("[ordering] resumed key {:?}", key);
        }
        was
    }

    /// Whether `key` is paused.
    pub fn is_paused(&self, key: &str) -> bool {
        !key.is_empty() && self.paused.contains(key)
    }

    /// Currently paused keys, in no particular order.
    pub fn paused_keys(&self) -> Vec<String> {
        self.paused.iter().map(|k| k.key().clone()).collect()
    }

    /// Number of paused keys.
    pub fn len(&self) -> usize {
        self.paused.len()
    }

    /// True when no key is paused.
    pub fn is_empty(&self) -> bool {
        self.paused.is_empty()
    }
}
