// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bundles and per-key partitions.

use std::collections::VecDeque;
use std::time::Instant;

/// Items accumulated for one request.
#[derive(Debug)]
pub(crate) struct Bundle<T> {
    pub(crate) items: Vec<T>,
    pub(crate) bytes: usize,
    /// Set when the first item arrives, cleared on cut.
    pub(crate) deadline: Option<Instant>,
}

impl<T> Bundle<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            bytes: 0,
            deadline: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn push(&mut self, item: T, size: usize) {
        self.items.push(item);
        self.bytes += size;
    }
}

/// A bundle that has been cut and is waiting for a handler slot.
#[derive(Debug)]
pub(crate) struct ReadyBundle<T> {
    pub(crate) items: Vec<T>,
    pub(crate) bytes: usize,
    pub(crate) ticket: u64,
}

/// Scheduling state for one ordering key.
///
/// At most `handler_limit` bundles of a partition are handled at the same
/// time; keyed partitions use 1, which preserves submission order.
#[derive(Debug)]
pub(crate) struct Partition<T> {
    pub(crate) current: Bundle<T>,
    pub(crate) ready: VecDeque<ReadyBundle<T>>,
    pub(crate) in_flight: usize,
    pub(crate) handler_limit: usize,
}

impl<T> Partition<T> {
    pub(crate) fn new(handler_limit: usize) -> Self {
        Self {
            current: Bundle::new(),
            ready: VecDeque::new(),
            in_flight: 0,
            handler_limit: handler_limit.max(1),
        }
    }

    /// Move the current bundle to the ready queue. Returns false if it was empty.
    pub(crate) fn cut(&mut self, ticket: u64) -> bool {
        if self.current.is_empty() {
            return false;
        }
        let bundle = std::mem::replace(&mut self.current, Bundle::new());
        self.ready.push_back(ReadyBundle {
            items: bundle.items,
            bytes: bundle.bytes,
            ticket,
        });
        true
    }

    /// Next ready bundle if a handler slot is free.
    pub(crate) fn next_dispatch(&mut self) -> Option<ReadyBundle<T>> {
        if self.in_flight >= self.handler_limit {
            return None;
        }
        let bundle = self.ready.pop_front()?;
        self.in_flight += 1;
        Some(bundle)
    }
}
