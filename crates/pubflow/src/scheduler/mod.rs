// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bundling scheduler.
//!
//! Groups items per ordering key into bundles and hands each bundle to a
//! handler on a worker thread.
//!
//! ```text
//!  add(key, item, size)
//!        |
//!        v
//!  +-------------+  count / byte threshold   +-------------+   crossbeam   +-----------+
//!  |  partition  | ------------------------> | ready queue | ------------> |  workers  |
//!  |  (per key)  |  delay timer expiry       | (per key)   |  job channel  |  handler  |
//!  +-------------+                           +-------------+               +-----------+
//! ```
//!
//! Ordering: a keyed partition never has more than one bundle in flight and
//! its ready queue is FIFO, so a key's bundles are handled in the order they
//! were cut. The unordered partition (empty key) uses every worker.

mod bundle;
mod worker;

use crate::config::{bundle_byte_limit, PublishSettings};
use crate::error::{Error, Result};
use crate::ordering::OrderingKeys;
use bundle::Partition;
use crossbeam::channel::{self, Sender};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Bundle handler: called on a worker thread with the partition key and the
/// bundle items in insertion order.
pub type BundleHandler<T> = Arc<dyn Fn(&str, Vec<T>) + Send + Sync>;

/// Bundling thresholds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerLimits {
    /// Maximum time an item waits in a partially filled bundle.
    pub delay_threshold: Duration,
    /// Cut once a bundle holds this many items.
    pub count_threshold: usize,
    /// Cut once a bundle holds this many bytes.
    pub byte_threshold: usize,
    /// Hard cap on bundle size; a single larger item is rejected.
    pub byte_limit: usize,
    /// Cap on bytes buffered or being handled across all partitions.
    pub buffered_byte_limit: usize,
}

impl SchedulerLimits {
    /// Limits for publishing to `topic` with `settings`.
    pub fn for_topic(settings: &PublishSettings, topic: &str) -> Self {
        let byte_limit = bundle_byte_limit(topic);
        Self {
            delay_threshold: settings.delay_threshold,
            count_threshold: settings.effective_count_threshold(),
            byte_threshold: settings.byte_threshold.min(byte_limit),
            byte_limit,
            buffered_byte_limit: settings.effective_buffered_byte_limit(),
        }
    }
}

pub(crate) struct Job<T> {
    key: String,
    items: Vec<T>,
    bytes: usize,
    ticket: u64,
}

pub(crate) struct State<T> {
    partitions: HashMap<String, Partition<T>>,
    /// No more adds.
    stopped: bool,
    /// Threads must exit.
    shutdown: bool,
    next_ticket: u64,
    /// Tickets of bundles cut but not yet handled.
    unfinished: BTreeSet<u64>,
    jobs: Option<Sender<Job<T>>>,
    workers: usize,
    /// Bytes added and not yet handled.
    buffered: usize,
}

impl<T> State<T> {
    fn partition(&mut self, key: &str) -> &mut Partition<T> {
        let limit = if key.is_empty() { self.workers } else { 1 };
        self.partitions
            .entry(key.to_string())
            .or_insert_with(|| Partition::new(limit))
    }

    /// Cut the current bundle of `key` and dispatch what can run.
    fn cut(&mut self, key: &str) -> bool {
        let ticket = self.next_ticket;
        let Some(p) = self.partitions.get_mut(key) else {
            return false;
        };
        if !p.cut(ticket) {
            return false;
        }
        self.next_ticket += 1;
        self.unfinished.insert(ticket);
        self.dispatch(key);
        true
    }

    fn cut_all(&mut self) -> usize {
        let keys: Vec<String> = self
            .partitions
            .iter()
            .filter(|(_, p)| !p.current.is_empty())
            .map(|(k, _)| k.clone())
            .collect();
        keys.iter().filter(|k| self.cut(k)).count()
    }

    fn cut_expired(&mut self, now: Instant) -> usize {
        let keys: Vec<String> = self
            .partitions
            .iter()
            .filter(|(_, p)| p.current.deadline.is_some_and(|d| d <= now))
            .map(|(k, _)| k.clone())
            .collect();
        keys.iter().filter(|k| self.cut(k)).count()
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.partitions
            .values()
            .filter_map(|p| p.current.deadline)
            .min()
    }

    fn dispatch(&mut self, key: &str) {
        let Some(p) = self.partitions.get_mut(key) else {
            return;
        };
        while let Some(ready) = p.next_dispatch() {
            let job = Job {
                key: key.to_string(),
                items: ready.items,
                bytes: ready.bytes,
                ticket: ready.ticket,
            };
            let sent = match &self.jobs {
                Some(tx) => tx.send(job).is_ok(),
                None => false,
            };
            if !sent {
                // Only reachable after shutdown, when no bundle can be cut.
                log::error!("[scheduler] worker pool gone, dropping bundle for {:?}", key);
                p.in_flight -= 1;
                self.unfinished.remove(&ready.ticket);
                self.buffered = self.buffered.saturating_sub(ready.bytes);
            }
        }
    }

    fn finish(&mut self, key: &str, ticket: u64, bytes: usize) {
        self.unfinished.remove(&ticket);
        self.buffered = self.buffered.saturating_sub(bytes);
        if let Some(p) = self.partitions.get_mut(key) {
            p.in_flight = p.in_flight.saturating_sub(1);
        }
        self.dispatch(key);
    }
}

pub(crate) struct Shared<T> {
    limits: SchedulerLimits,
    state: Mutex<State<T>>,
    timer_cv: Condvar,
    flush_cv: Condvar,
    handler: BundleHandler<T>,
    ordering: Arc<OrderingKeys>,
}

/// Per-key bundling scheduler backed by a fixed worker pool.
///
/// # Example
///
/// ```rust
/// use pubflow::{PublishScheduler, SchedulerLimits};
/// use std::sync::{Arc, Mutex};
/// use std::time::Duration;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let limits = SchedulerLimits {
///     delay_threshold: Duration::from_secs(1),
///     count_threshold: 2,
///     byte_threshold: 1_000,
///     byte_limit: 10_000,
///     buffered_byte_limit: 100_000,
/// };
/// let scheduler = PublishScheduler::new(4, limits, Arc::new(move |_key: &str, items: Vec<u32>| {
///     sink.lock().unwrap().push(items);
/// }))
/// .unwrap();
///
/// for i in 0..3 {
///     scheduler.add("k", i, 10).unwrap();
/// }
/// scheduler.flush();
/// assert_eq!(*seen.lock().unwrap(), vec![vec![0, 1], vec![2]]);
/// scheduler.flush_and_stop();
/// ```
pub struct PublishScheduler<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + 'static> PublishScheduler<T> {
    /// Start a scheduler with `workers` handler threads and its own
    /// ordering-key state.
    pub fn new(workers: usize, limits: SchedulerLimits, handler: BundleHandler<T>) -> Result<Self> {
        Self::with_ordering(workers, limits, Arc::new(OrderingKeys::new()), handler)
    }

    /// Start a scheduler sharing `ordering` with the caller.
    pub fn with_ordering(
        workers: usize,
        limits: SchedulerLimits,
        ordering: Arc<OrderingKeys>,
        handler: BundleHandler<T>,
    ) -> Result<Self> {
        let workers = workers.max(1);
        let (tx, rx) = channel::unbounded();
        let shared = Arc::new(Shared {
            limits,
            state: Mutex::new(State {
                partitions: HashMap::new(),
                stopped: false,
                shutdown: false,
                next_ticket: 0,
                unfinished: BTreeSet::new(),
                jobs: Some(tx),
                workers,
                buffered: 0,
            }),
            timer_cv: Condvar::new(),
            flush_cv: Condvar::new(),
            handler,
            ordering,
        });

        let scheduler = Self {
            shared: shared.clone(),
            threads: Mutex::new(Vec::with_capacity(workers + 1)),
        };
        {
            // On error the partially started pool is torn down by Drop.
            let mut threads = scheduler.threads.lock();
            threads.push(worker::spawn_timer(shared.clone())?);
            for index in 0..workers {
                threads.push(worker::spawn_worker(shared.clone(), rx.clone(), index)?);
            }
        }
        log::debug!(
            "[scheduler] started with {} workers, limits {:?}",
            workers,
            scheduler.shared.limits
        );
        Ok(scheduler)
    }

    /// Bundling limits.
    pub fn limits(&self) -> &SchedulerLimits {
        &self.shared.limits
    }

    /// Queue `item` of `size` bytes under `key`.
    pub fn add(&self, key: &str, item: T, size: usize) -> Result<()> {
        let limits = &self.shared.limits;
        let mut st = self.shared.state.lock();
        if st.stopped {
            return Err(Error::Stopped);
        }
        if self.shared.ordering.is_paused(key) {
            return Err(Error::PublishingPaused {
                ordering_key: key.to_string(),
            });
        }
        if size > limits.byte_limit {
            return Err(Error::OversizedMessage {
                size,
                limit: limits.byte_limit,
            });
        }
        if st.buffered.saturating_add(size) > limits.buffered_byte_limit {
            return Err(Error::BufferOverflow {
                limit: limits.buffered_byte_limit,
            });
        }

        let current = &st.partition(key).current;
        if !current.is_empty()
            && (current.bytes + size > limits.byte_threshold
                || current.bytes + size > limits.byte_limit)
        {
            st.cut(key);
        }

        st.buffered += size;
        let bundle = &mut st.partition(key).current;
        if bundle.is_empty() && !limits.delay_threshold.is_zero() {
            // No deadline when the delay is beyond what `Instant` can represent.
            bundle.deadline = Instant::now().checked_add(limits.delay_threshold);
            self.shared.timer_cv.notify_one();
        }
        bundle.push(item, size);

        if limits.delay_threshold.is_zero()
            || bundle.len() >= limits.count_threshold
            || bundle.bytes >= limits.byte_threshold
        {
            st.cut(key);
        }
        Ok(())
    }

    /// Send every buffered bundle now and wait until all bundles cut so far
    /// have been handled.
    ///
    /// Must not be called from inside the bundle handler.
    pub fn flush(&self) {
        let mut st = self.shared.state.lock();
        let cut = st.cut_all();
        let target = st.next_ticket;
        log::trace!("[scheduler] flush: cut {} bundle(s), waiting up to ticket {}", cut, target);
        while st.unfinished.range(..target).next().is_some() {
            self.shared.flush_cv.wait(&mut st);
        }
    }

    /// Reject further adds, flush, then stop and join every thread. Idempotent.
    pub fn flush_and_stop(&self) {
        let mut threads = self.threads.lock();
        {
            let mut st = self.shared.state.lock();
            if st.shutdown {
                return;
            }
            st.stopped = true;
        }
        self.flush();
        {
            let mut st = self.shared.state.lock();
            st.shutdown = true;
            st.jobs = None;
        }
        self.shared.timer_cv.notify_all();

        for handle in threads.drain(..) {
            if handle.join().is_err() {
                log::error!("[scheduler] thread panicked during shutdown");
            }
        }
        log::debug!("[scheduler] stopped");
    }

    /// True after [`flush_and_stop`](Self::flush_and_stop) has started.
    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().stopped
    }

    /// Pause `key`: queued bundles still reach the handler, new adds fail.
    pub fn pause(&self, key: &str) -> bool {
        self.shared.ordering.pause(key)
    }

    /// Resume `key`.
    pub fn resume(&self, key: &str) -> bool {
        self.shared.ordering.resume(key)
    }

    /// Whether `key` is paused.
    pub fn is_paused(&self, key: &str) -> bool {
        self.shared.ordering.is_paused(key)
    }

    /// Shared ordering-key state.
    pub fn ordering_keys(&self) -> &Arc<OrderingKeys> {
        &self.shared.ordering
    }
}

impl<T: Send + 'static> Drop for PublishScheduler<T> {
    fn drop(&mut self) {
        self.flush_and_stop();
    }
}
