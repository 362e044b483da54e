// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker pool and delay timer threads.

use super::{Job, Shared};
use crate::error::{Error, Result};
use crossbeam::channel::Receiver;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// Spawn worker `index`, handling bundles until the job channel disconnects.
pub(crate) fn spawn_worker<T: Send + 'static>(
    shared: Arc<Shared<T>>,
    jobs: Receiver<Job<T>>,
    index: usize,
) -> Result<JoinHandle<()>> {
    let name = format!("pubflow-worker-{}", index);
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || worker_loop(&shared, &jobs))
        .map_err(|e| Error::ThreadSpawn(format!("{}: {}", name, e)))
}

fn worker_loop<T>(shared: &Shared<T>, jobs: &Receiver<Job<T>>) {
    log::debug!("[scheduler] worker started");

    for Job {
        key,
        items,
        bytes,
        ticket,
    } in jobs.iter()
    {
        let count = items.len();
        let handled = panic::catch_unwind(AssertUnwindSafe(|| (shared.handler)(&key, items)));
        if handled.is_err() {
            log::error!(
                "[scheduler] bundle handler panicked (key={:?}, {} items)",
                key,
                count
            );
        }

        shared.state.lock().finish(&key, ticket, bytes);
        shared.flush_cv.notify_all();
    }

    log::debug!("[scheduler] worker stopped");
}

/// Spawn the delay timer. It cuts bundles whose delay threshold elapsed and
/// exits once the scheduler shuts down.
pub(crate) fn spawn_timer<T: Send + 'static>(shared: Arc<Shared<T>>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("pubflow-delay-timer".to_string())
        .spawn(move || timer_loop(&shared))
        .map_err(|e| Error::ThreadSpawn(format!("pubflow-delay-timer: {}", e)))
}

fn timer_loop<T>(shared: &Shared<T>) {
    log::debug!(
        "[scheduler] delay timer started (delay={:?})",
        shared.limits.delay_threshold
    );

    let mut st = shared.state.lock();
    while !st.shutdown {
        let now = Instant::now();
        match st.earliest_deadline() {
            None => shared.timer_cv.wait(&mut st),
            Some(deadline) if deadline <= now => {
                let cut = st.cut_expired(now);
                log::trace!("[scheduler] delay expired for {} partition(s)", cut);
            }
            Some(deadline) => {
                shared.timer_cv.wait_until(&mut st, deadline);
            }
        }
    }

    log::debug!("[scheduler] delay timer stopped");
}
