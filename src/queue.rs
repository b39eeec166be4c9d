//! Ordered delivery queue and its drain loop.
//!
//! One [`DeliveryQueue`] exists per root client and is shared (through an
//! `Arc`) with every thread client derived from it. Requests are appended
//! to a FIFO and drained head-first on the client's [`ScheduledExecutor`]:
//!
//! ```text
//! IDLE --enqueue--> SCHEDULED --timer--> DRAINING --empty--> IDLE
//!                       ^                    |
//!                       +---- rate limit ----+
//! ```
//!
//! Only one drain task is armed at a time (guarded by `scheduled`), and the
//! executor has a single worker thread, so at most one HTTP call is in
//! flight per root client. A 429 puts the request back at the head, which
//! keeps submission order intact across retries.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::task::{Context, Poll};
use std::time::Instant;

use futures_lite::future;
use tracing::{debug, error, trace, warn};

use crate::bucket::Bucket;
use crate::error::{ErrorHandler, WebhookError};
use crate::executor::{panic_reason, ScheduledExecutor};
use crate::http::{HttpRequest, Transport};
use crate::types::{AllowedMentions, ReceivedMessage};

type Outcome = Result<Option<ReceivedMessage>, WebhookError>;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A queued HTTP call plus the channel its result is delivered on.
///
/// Completing consumes the request, so each one resolves exactly once.
pub(crate) struct Request {
    http: HttpRequest,
    deadline: Option<Instant>,
    expects_body: bool,
    completion: async_channel::Sender<Outcome>,
}

impl Request {
    /// Create a request and the future that observes it.
    pub(crate) fn new<T, F>(
        http: HttpRequest,
        deadline: Option<Instant>,
        expects_body: bool,
        map: F,
    ) -> (Self, ResponseFuture<T>)
    where
        T: Send + 'static,
        F: FnOnce(Option<ReceivedMessage>) -> Result<T, WebhookError> + Send + 'static,
    {
        let (tx, rx) = async_channel::bounded(1);
        let request = Self {
            http,
            deadline,
            expects_body,
            completion: tx,
        };
        (request, ResponseFuture::new(rx, map))
    }

    /// The caller dropped or cancelled its future.
    fn is_cancelled(&self) -> bool {
        self.completion.is_closed()
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    fn complete(self, outcome: Outcome) {
        // A full or closed channel means nobody is listening any more.
        let _ = self.completion.try_send(outcome);
    }
}

// ---------------------------------------------------------------------------
// ResponseFuture
// ---------------------------------------------------------------------------

/// Resolves once the queued request completes.
///
/// Await it, or call [`wait`](Self::wait) from synchronous code. Dropping
/// the future (or calling [`cancel`](Self::cancel)) before the request is
/// sent removes it from delivery.
#[must_use = "dropping a ResponseFuture cancels the request"]
pub struct ResponseFuture<T> {
    inner: Pin<Box<dyn Future<Output = Result<T, WebhookError>> + Send>>,
}

impl<T: Send + 'static> ResponseFuture<T> {
    fn new<F>(receiver: async_channel::Receiver<Outcome>, map: F) -> Self
    where
        F: FnOnce(Option<ReceivedMessage>) -> Result<T, WebhookError> + Send + 'static,
    {
        Self {
            inner: Box::pin(async move {
                match receiver.recv().await {
                    Ok(outcome) => outcome.and_then(map),
                    // The request was dropped without completing.
                    Err(_) => Err(WebhookError::Shutdown),
                }
            }),
        }
    }

    /// Block the current thread until the request completes.
    pub fn wait(self) -> Result<T, WebhookError> {
        future::block_on(self)
    }

    /// Give up on the request. It is skipped if it has not been sent yet.
    pub fn cancel(self) {
        drop(self);
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T, WebhookError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> std::fmt::Debug for ResponseFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// DeliveryQueue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Request>,
    /// A drain task is armed or running.
    scheduled: bool,
    /// No new requests are accepted.
    shutdown: bool,
    /// Forced shutdown: pending requests were failed and retries are refused.
    halted: bool,
}

/// Everything a root client owns and its thread clients share.
pub(crate) struct DeliveryQueue {
    pub(crate) id: u64,
    pub(crate) base_url: String,
    pub(crate) wait_for_message: bool,
    pub(crate) allowed_mentions: AllowedMentions,
    transport: Arc<dyn Transport>,
    executor: ScheduledExecutor,
    bucket: Bucket,
    error_handler: RwLock<Arc<dyn ErrorHandler>>,
    state: Mutex<QueueState>,
}

pub(crate) struct QueueConfig {
    pub id: u64,
    pub base_url: String,
    pub wait_for_message: bool,
    pub allowed_mentions: AllowedMentions,
    pub transport: Arc<dyn Transport>,
    pub executor: ScheduledExecutor,
    pub bucket: Bucket,
    pub error_handler: Arc<dyn ErrorHandler>,
}

impl DeliveryQueue {
    pub(crate) fn new(config: QueueConfig) -> Self {
        Self {
            id: config.id,
            base_url: config.base_url,
            wait_for_message: config.wait_for_message,
            allowed_mentions: config.allowed_mentions,
            transport: config.transport,
            executor: config.executor,
            bucket: config.bucket,
            error_handler: RwLock::new(config.error_handler),
            state: Mutex::new(QueueState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub(crate) fn set_error_handler(&self, handler: Arc<dyn ErrorHandler>) {
        *self
            .error_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = handler;
    }

    fn report(&self, message: &str, error: &WebhookError) {
        let handler = self
            .error_handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let handled = catch_unwind(AssertUnwindSafe(|| handler.handle(self.id, message, error)));
        if let Err(panic) = handled {
            error!(
                webhook = self.id,
                reason = %panic_reason(panic.as_ref()),
                "error handler panicked"
            );
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Append a request and arm a drain if none is armed.
    pub(crate) fn enqueue(self: &Arc<Self>, request: Request) -> Result<(), WebhookError> {
        let mut state = self.lock();
        if state.shutdown {
            return Err(WebhookError::Closed);
        }
        trace!(
            webhook = self.id,
            method = %request.http.method,
            queued = state.pending.len() + 1,
            "enqueued request"
        );
        state.pending.push_back(request);
        if state.scheduled {
            return Ok(());
        }
        state.scheduled = true;
        drop(state);

        self.schedule_drain();
        Ok(())
    }

    /// Stop accepting requests; deliver what is queued, then stop the worker.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        if !state.scheduled {
            self.executor.shutdown();
        }
        debug!(webhook = self.id, pending = state.pending.len(), "closing webhook queue");
    }

    /// Stop accepting requests and fail everything still queued.
    pub(crate) fn close_now(&self) {
        let pending = {
            let mut state = self.lock();
            state.shutdown = true;
            state.halted = true;
            state.scheduled = false;
            std::mem::take(&mut state.pending)
        };
        self.executor.shutdown_now();
        debug!(webhook = self.id, dropped = pending.len(), "forcing webhook queue shutdown");
        for request in pending {
            request.complete(Err(WebhookError::Shutdown));
        }
    }

    fn schedule_drain(self: &Arc<Self>) {
        let delay = self.bucket.retry_after();
        if !delay.is_zero() {
            debug!(
                webhook = self.id,
                delay_ms = delay.as_millis() as u64,
                "rate limited, delaying queue drain"
            );
        }
        let queue = Arc::clone(self);
        if self.executor.schedule(delay, move || queue.drain()).is_err() {
            warn!(webhook = self.id, "executor is shut down, failing queued requests");
            self.fail_pending(WebhookError::Shutdown);
        }
    }

    /// Clear `scheduled` after a drain unwound, re-arming if work remains.
    fn recover(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.pending.is_empty() || state.halted {
            state.scheduled = false;
            if state.shutdown {
                self.executor.shutdown();
            }
            return;
        }
        state.scheduled = true;
        drop(state);
        warn!(webhook = self.id, "queue drain unwound, rescheduling");
        self.schedule_drain();
    }

    fn fail_pending(&self, error: WebhookError) {
        let pending = {
            let mut state = self.lock();
            state.scheduled = false;
            std::mem::take(&mut state.pending)
        };
        for request in pending {
            request.complete(Err(error.clone()));
        }
    }

    /// Runs on the worker thread. Sends queued requests until the queue is
    /// empty or the bucket says to wait.
    fn drain(self: &Arc<Self>) {
        let _guard = DrainGuard(self);
        loop {
            let request = {
                let mut state = self.lock();
                match state.pending.pop_front() {
                    Some(request) => request,
                    None => {
                        state.scheduled = false;
                        if state.shutdown {
                            self.executor.shutdown();
                        }
                        return;
                    }
                }
            };

            if !self.execute(request) {
                self.schedule_drain();
                return;
            }
        }
    }

    /// Send one request. Returns `false` when draining must pause.
    fn execute(&self, request: Request) -> bool {
        if request.is_cancelled() {
            trace!(webhook = self.id, "skipping cancelled request");
            return true;
        }
        if request.is_expired(Instant::now()) {
            trace!(webhook = self.id, "request timed out while queued");
            request.complete(Err(WebhookError::Timeout));
            return true;
        }

        let sent = catch_unwind(AssertUnwindSafe(|| self.transport.execute(&request.http)))
            .unwrap_or_else(|panic| {
                Err(WebhookError::Transport(format!(
                    "transport panicked: {}",
                    panic_reason(panic.as_ref())
                )))
            });
        let response = match sent {
            Ok(response) => response,
            Err(error) => {
                self.report("Encountered failure while executing request", &error);
                request.complete(Err(error));
                return !self.bucket.is_rate_limited();
            }
        };

        if let Err(error) = self.bucket.update(&response) {
            self.report("Could not read http response", &error);
        }

        if response.is_rate_limited() {
            let mut state = self.lock();
            if state.halted {
                drop(state);
                request.complete(Err(WebhookError::Shutdown));
                return true;
            }
            state.pending.push_front(request);
            return false;
        }

        let outcome = if !response.is_success() {
            let error = WebhookError::from_response(&response);
            self.report("Sending a webhook message failed with non-OK http response", &error);
            Err(error)
        } else if request.expects_body {
            ReceivedMessage::from_slice(&response.body)
                .map(Some)
                .map_err(|e| {
                    let error = WebhookError::Decode(e.to_string());
                    self.report("Could not parse webhook response", &error);
                    error
                })
        } else {
            Ok(None)
        };
        request.complete(outcome);

        !self.bucket.is_rate_limited()
    }
}

/// Re-arms the queue if a drain unwinds.
struct DrainGuard<'a>(&'a Arc<DeliveryQueue>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.recover();
        }
    }
}

impl std::fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("id", &self.id)
            .field("pending", &self.len())
            .field("bucket", &self.bucket)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
