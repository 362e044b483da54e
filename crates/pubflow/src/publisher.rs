// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publisher: admission, bundling and the publish pipeline for one topic.
//!
//! # Admission
//!
//! [`Publisher::publish`] runs these checks in order, each failing the
//! message without any network activity:
//!
//! 1. ordering key set but ordering disabled -> [`Error::OrderingNotEnabled`]
//! 2. publisher stopped -> [`Error::Stopped`]
//! 3. ordering key paused -> [`Error::PublishingPaused`]
//! 4. encoded size above the bundle limit -> [`Error::OversizedMessage`] (pauses the key)
//! 5. flow control -> [`Error::FlowControl`] / cancellation (pauses the key)
//! 6. scheduler rejection, e.g. [`Error::BufferOverflow`] (pauses the key)
//!
//! # Pipeline
//!
//! Each bundle cut by the scheduler is encoded into one [`PublishRequest`]
//! and sent through the [`PublishTransport`] under a [`PublishRetryer`],
//! bounded by `PublishSettings::timeout`. A failure resolves every handle of
//! the bundle with the same error and pauses the bundle's ordering key.

use crate::cancel::CancelToken;
use crate::config::{bundle_byte_limit, PublishSettings, MAX_PUBLISH_REQUEST_BYTES};
use crate::error::{Error, Result};
use crate::flow_control::FlowController;
use crate::message::{Message, TopicName};
use crate::metrics::{PublisherMetrics, PublisherMetricsSnapshot};
use crate::ordering::OrderingKeys;
use crate::result::PublishResult;
use crate::retry::{BackoffRetryer, PublishRetryer, Retryer};
use crate::scheduler::{BundleHandler, PublishScheduler, SchedulerLimits};
use crate::transport::{CallOptions, Code, Compression, PublishRequest, PublishTransport, RpcError};
use crate::wire;
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Flow control reservation, returned when dropped.
struct FlowPermit {
    flow: Arc<FlowController>,
    size: usize,
}

impl Drop for FlowPermit {
    fn drop(&mut self) {
        self.flow.release(self.size);
    }
}

/// A message waiting in the scheduler.
///
/// Dropping it unresolved (handler panic, teardown) fails its handle.
pub(crate) struct PendingMessage {
    message: Message,
    result: PublishResult,
    size: usize,
    permit: Option<FlowPermit>,
}

impl PendingMessage {
    /// Release flow control, then resolve the handle.
    fn resolve(mut self, outcome: Result<String>) {
        self.permit.take();
        self.result.set(outcome);
    }
}

impl Drop for PendingMessage {
    fn drop(&mut self) {
        self.permit.take();
        let abandoned = self.result.set(Err(Error::Rpc(RpcError::new(
            Code::Internal,
            "message dropped before it was published",
        ))));
        if abandoned {
            log::debug!(
                "[publisher] message for key {:?} dropped unresolved",
                self.message.ordering_key()
            );
        }
    }
}

/// Pauses a bundle's key if its handler unwinds. As a local it drops before
/// the handler's `items` argument, so the key is paused before the items fail
/// their handles.
struct PauseOnUnwind<'a> {
    ordering: &'a OrderingKeys,
    key: &'a str,
}

impl Drop for PauseOnUnwind<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.ordering.pause(self.key);
        }
    }
}

/// Bundle handler state shared with the worker threads.
struct Pipeline {
    topic: String,
    settings: PublishSettings,
    transport: Arc<dyn PublishTransport>,
    ordering: Arc<OrderingKeys>,
    metrics: Arc<PublisherMetrics>,
}

impl Pipeline {
    fn publish_bundle(&self, key: &str, items: Vec<PendingMessage>) {
        let _unwind = PauseOnUnwind {
            ordering: &self.ordering,
            key,
        };
        if self.ordering.is_paused(key) {
            log::debug!(
                "[publisher] dropping {} queued message(s) for paused key {:?}",
                items.len(),
                key
            );
            for item in items {
                self.metrics.record_rejected();
                item.resolve(Err(Error::PublishingPaused {
                    ordering_key: key.to_string(),
                }));
            }
            return;
        }

        let start = Instant::now();
        let bytes: usize = items.iter().map(|p| p.size).sum();
        let request = PublishRequest {
            topic: self.topic.clone(),
            messages: items
                .iter()
                .map(|p| wire::encode_message(&p.message))
                .collect(),
        };
        let compression = if self.settings.should_compress(bytes) {
            Compression::Gzip
        } else {
            Compression::None
        };
        let cancel = if self.settings.timeout.is_zero() {
            CancelToken::never()
        } else {
            CancelToken::with_timeout(self.settings.timeout)
        };
        let options = CallOptions {
            compression,
            max_send_bytes: MAX_PUBLISH_REQUEST_BYTES,
            cancel,
        };

        let outcome = self
            .send_with_retry(key, &request, &options)
            .and_then(|ids| {
                if ids.len() == items.len() {
                    Ok(ids)
                } else {
                    Err(Error::Rpc(RpcError::new(
                        Code::Internal,
                        format!(
                            "publish returned {} message ids for {} messages",
                            ids.len(),
                            items.len()
                        ),
                    )))
                }
            });

        match outcome {
            Ok(ids) => {
                self.metrics
                    .record_bundle_sent(items.len(), bytes, start.elapsed());
                log::trace!(
                    "[publisher] published {} message(s), {} bytes, key {:?}",
                    items.len(),
                    bytes,
                    key
                );
                for (item, id) in items.into_iter().zip(ids) {
                    item.resolve(Ok(id));
                }
            }
            Err(err) => {
                self.metrics.record_bundle_failed(items.len(), start.elapsed());
                log::warn!(
                    "[publisher] bundle of {} message(s) for key {:?} failed: {}",
                    items.len(),
                    key,
                    err
                );
                self.ordering.pause(key);
                for item in items {
                    item.resolve(Err(err.clone()));
                }
            }
        }
    }

    fn send_with_retry(
        &self,
        key: &str,
        request: &PublishRequest,
        options: &CallOptions,
    ) -> Result<Vec<String>> {
        let mut retryer = PublishRetryer::new(
            BackoffRetryer::for_publish(&self.settings.retry),
            key,
            self.ordering.clone(),
        );
        if options.compression == Compression::Gzip {
            self.metrics.record_compressed();
        }
        loop {
            if options.cancel.is_cancelled() {
                return Err(options.cancel.err());
            }

            let attempt =
                panic::catch_unwind(AssertUnwindSafe(|| self.transport.publish(request, options)));
            let err = match attempt {
                Ok(Ok(ids)) => return Ok(ids),
                Ok(Err(err)) => err,
                Err(_) => {
                    log::error!("[publisher] transport panicked while publishing");
                    return Err(Error::Rpc(RpcError::new(
                        Code::Internal,
                        "publish transport panicked",
                    )));
                }
            };

            let Some(pause) = retryer.retry(&err) else {
                return Err(Error::Rpc(err));
            };
            log::debug!("[publisher] retrying in {:?} after {}", pause, err);
            self.metrics.record_retry();
            if !options.cancel.wait_timeout(pause) {
                return Err(options.cancel.err());
            }
        }
    }
}

enum RunState {
    Idle,
    Running(Arc<PublishScheduler<PendingMessage>>),
    Stopped,
}

/// Publishes messages to one topic.
///
/// Threads are started by the first publish. [`stop`](Self::stop) (or drop)
/// sends everything still buffered and waits for it.
///
/// # Example
///
/// ```rust
/// use pubflow::{CallOptions, Message, PublishRequest, PublishSettings, PublishTransport, Publisher, RpcError};
/// use std::sync::Arc;
///
/// struct Echo;
///
/// impl PublishTransport for Echo {
///     fn publish(&self, req: &PublishRequest, _: &CallOptions) -> Result<Vec<String>, RpcError> {
///         Ok((0..req.len()).map(|i| format!("id-{}", i)).collect())
///     }
/// }
///
/// let publisher = Publisher::new("projects/demo/topics/events", Arc::new(Echo), PublishSettings::default())?;
/// let result = publisher.publish(Message::new("hello"));
/// assert_eq!(result.get()?, "id-0");
/// publisher.stop();
/// # Ok::<(), pubflow::Error>(())
/// ```
pub struct Publisher {
    topic: TopicName,
    settings: PublishSettings,
    byte_limit: usize,
    flow: Arc<FlowController>,
    ordering: Arc<OrderingKeys>,
    metrics: Arc<PublisherMetrics>,
    pipeline: Arc<Pipeline>,
    state: RwLock<RunState>,
}

impl Publisher {
    /// Create a publisher for `topic` (`projects/<project>/topics/<id>`).
    pub fn new(
        topic: &str,
        transport: Arc<dyn PublishTransport>,
        settings: PublishSettings,
    ) -> Result<Self> {
        let topic = TopicName::parse(topic)?;
        settings.validate()?;

        let ordering = Arc::new(OrderingKeys::new());
        let metrics = Arc::new(PublisherMetrics::new());
        let pipeline = Arc::new(Pipeline {
            topic: topic.to_string(),
            settings: settings.clone(),
            transport,
            ordering: ordering.clone(),
            metrics: metrics.clone(),
        });

        Ok(Self {
            byte_limit: bundle_byte_limit(topic.as_str()),
            flow: Arc::new(FlowController::new(&settings.flow_control)),
            topic,
            settings,
            ordering,
            metrics,
            pipeline,
            state: RwLock::new(RunState::Idle),
        })
    }

    /// Fully qualified topic name.
    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    /// Topic id.
    pub fn id(&self) -> &str {
        self.topic.id()
    }

    /// Settings in effect.
    pub fn settings(&self) -> &PublishSettings {
        &self.settings
    }

    /// Publish `msg`. Admission failures are returned as an already resolved
    /// handle. May block under `LimitExceededBehavior::Block`.
    pub fn publish(&self, msg: Message) -> PublishResult {
        self.publish_with(&CancelToken::never(), msg)
    }

    /// Like [`publish`](Self::publish); `cancel` bounds the time spent blocked
    /// in flow control.
    pub fn publish_with(&self, cancel: &CancelToken, msg: Message) -> PublishResult {
        self.try_publish(cancel, msg)
            .unwrap_or_else(PublishResult::failed)
    }

    /// Like [`publish_with`](Self::publish_with), reporting admission
    /// failures as `Err`.
    pub fn try_publish(&self, cancel: &CancelToken, msg: Message) -> Result<PublishResult> {
        let admitted = self.admit(cancel, msg);
        match &admitted {
            Ok(_) => self.metrics.record_submitted(),
            Err(e) => {
                self.metrics.record_rejected();
                log::debug!("[publisher] message rejected: {}", e);
            }
        }
        admitted
    }

    fn admit(&self, cancel: &CancelToken, msg: Message) -> Result<PublishResult> {
        let key = msg.ordering_key().to_string();
        if !key.is_empty() && !self.settings.enable_message_ordering {
            return Err(Error::OrderingNotEnabled);
        }
        let scheduler = self.running()?;
        if self.ordering.is_paused(&key) {
            return Err(Error::PublishingPaused { ordering_key: key });
        }
        let size = msg.encoded_len();
        if size > self.byte_limit {
            self.ordering.pause(&key);
            return Err(Error::OversizedMessage {
                size,
                limit: self.byte_limit,
            });
        }

        if let Err(e) = self.flow.acquire(cancel, size) {
            self.ordering.pause(&key);
            return Err(e);
        }

        let result = PublishResult::pending();
        let pending = PendingMessage {
            message: msg,
            result: result.clone(),
            size,
            permit: Some(FlowPermit {
                flow: self.flow.clone(),
                size,
            }),
        };
        // On error the permit is dropped inside `add`, returning the capacity.
        match scheduler.add(&key, pending, size) {
            Ok(()) => Ok(result),
            Err(e) => {
                if e != Error::Stopped {
                    self.ordering.pause(&key);
                }
                Err(e)
            }
        }
    }

    /// Running scheduler, started on first use.
    fn running(&self) -> Result<Arc<PublishScheduler<PendingMessage>>> {
        match &*self.state.read() {
            RunState::Running(s) => return Ok(s.clone()),
            RunState::Stopped => return Err(Error::Stopped),
            RunState::Idle => {}
        }

        let mut state = self.state.write();
        match &*state {
            RunState::Running(s) => Ok(s.clone()),
            RunState::Stopped => Err(Error::Stopped),
            RunState::Idle => {
                let scheduler = Arc::new(self.start()?);
                *state = RunState::Running(scheduler.clone());
                Ok(scheduler)
            }
        }
    }

    fn start(&self) -> Result<PublishScheduler<PendingMessage>> {
        let workers = self.settings.effective_workers();
        let limits = SchedulerLimits::for_topic(&self.settings, self.topic.as_str());
        log::info!(
            "[publisher] starting for {} ({} workers, ordering {})",
            self.topic,
            workers,
            if self.settings.enable_message_ordering { "on" } else { "off" }
        );
        let pipeline = self.pipeline.clone();
        let handler: BundleHandler<PendingMessage> =
            Arc::new(move |key: &str, items: Vec<PendingMessage>| pipeline.publish_bundle(key, items));
        PublishScheduler::with_ordering(workers, limits, self.ordering.clone(), handler)
    }

    /// Send every buffered message now and wait until all messages published
    /// before this call are resolved.
    pub fn flush(&self) {
        let scheduler = match &*self.state.read() {
            RunState::Running(s) => s.clone(),
            _ => return,
        };
        scheduler.flush();
    }

    /// Flush, wait for in-flight publishes and release every thread.
    /// Later publishes fail with [`Error::Stopped`]. Idempotent.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), RunState::Stopped);
        if let RunState::Running(scheduler) = previous {
            scheduler.flush_and_stop();
            log::info!("[publisher] stopped for {}", self.topic);
        }
    }

    /// Accept messages for `key` again after a failure paused it.
    pub fn resume_publish(&self, key: &str) {
        self.ordering.resume(key);
    }

    /// Whether `key` is paused.
    pub fn is_paused(&self, key: &str) -> bool {
        self.ordering.is_paused(key)
    }

    /// Currently paused ordering keys.
    pub fn paused_keys(&self) -> Vec<String> {
        self.ordering.paused_keys()
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> PublisherMetricsSnapshot {
        self.metrics.snapshot(self.flow.outstanding())
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.state.read() {
            RunState::Idle => "idle",
            RunState::Running(_) => "running",
            RunState::Stopped => "stopped",
        };
        f.debug_struct("Publisher")
            .field("topic", &self.topic.as_str())
            .field("state", &state)
            .field("flow", &self.flow)
            .finish()
    }
}
