//! Webhook clients and their builder.
//!
//! A root client owns the delivery queue (requests, bucket, worker thread,
//! transport). [`WebhookClient::on_thread`] derives clients that post into
//! a thread of the same channel while sharing the root's queue, so order
//! and rate limits hold across all of them.
//!
//! ```ignore
//! let client = WebhookClientBuilder::from_url(&url)?.build()?;
//! let sent = client.send_text("hello")?.wait()?;
//!
//! let thread = client.on_thread(123456789012345678);
//! thread.send(&MessageBuilder::new().content("in a thread").build()?)?;
//!
//! client.close();
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use crate::bucket::Bucket;
use crate::error::{ErrorHandler, LogErrorHandler, WebhookError};
use crate::executor::ScheduledExecutor;
use crate::http::{HttpMethod, HttpRequest, Transport};
use crate::queue::{DeliveryQueue, QueueConfig, Request, ResponseFuture};
use crate::types::{AllowedMentions, Embed, Message, ReceivedMessage};

/// Default REST API root. Webhook endpoints live under `{base}/webhooks`.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

const WEBHOOK_URL_PATTERN: &str =
    r"^(?:https?://)?(?:\w+\.)?discord(?:app)?\.com/api(?:/v\d+)?/webhooks/(\d+)/([\w-]+)(?:/(?:\w+)?)?$";

fn webhook_url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(WEBHOOK_URL_PATTERN).ok())
        .as_ref()
}

/// Split a webhook URL into `(id, token)`.
pub fn parse_webhook_url(url: &str) -> Result<(u64, String), WebhookError> {
    let captures = webhook_url_pattern()
        .and_then(|pattern| pattern.captures(url.trim()))
        .ok_or_else(|| WebhookError::InvalidUrl(url.to_string()))?;
    let id = captures[1]
        .parse::<u64>()
        .map_err(|_| WebhookError::InvalidUrl(url.to_string()))?;
    Ok((id, captures[2].to_string()))
}

// ===========================================================================
// Builder
// ===========================================================================

/// Configures and creates a [`WebhookClient`].
pub struct WebhookClientBuilder {
    id: u64,
    token: String,
    thread_id: Option<u64>,
    wait_for_message: bool,
    allowed_mentions: AllowedMentions,
    default_timeout: Option<Duration>,
    error_handler: Arc<dyn ErrorHandler>,
    transport: Option<Arc<dyn Transport>>,
    api_base: String,
    thread_name: Option<String>,
    rate_limit: Option<(u32, u32, Duration)>,
}

impl WebhookClientBuilder {
    pub fn new(id: u64, token: impl Into<String>) -> Self {
        Self {
            id,
            token: token.into(),
            thread_id: None,
            wait_for_message: true,
            allowed_mentions: AllowedMentions::all(),
            default_timeout: None,
            error_handler: Arc::new(LogErrorHandler),
            transport: None,
            api_base: DEFAULT_API_BASE.to_string(),
            thread_name: None,
            rate_limit: None,
        }
    }

    /// Parse `https://discord.com/api/webhooks/{id}/{token}` style URLs.
    pub fn from_url(url: &str) -> Result<Self, WebhookError> {
        let (id, token) = parse_webhook_url(url)?;
        Ok(Self::new(id, token))
    }

    /// Build a client that posts into this thread.
    pub fn thread_id(mut self, thread_id: u64) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    /// Ask the server to return the created message (`?wait=true`).
    /// Defaults to `true`.
    pub fn wait_for_message(mut self, wait: bool) -> Self {
        self.wait_for_message = wait;
        self
    }

    /// Allow-list applied to messages that do not carry their own.
    pub fn allowed_mentions(mut self, mentions: AllowedMentions) -> Self {
        self.allowed_mentions = mentions;
        self
    }

    /// How long a request may wait in the queue before it fails with
    /// [`WebhookError::Timeout`].
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn error_handler(mut self, handler: impl ErrorHandler) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replace [`DEFAULT_API_BASE`], e.g. to point at a proxy or mock server.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Name of the worker thread. Defaults to `webhook-{id}`.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Start from a known rate-limit window instead of waiting for the
    /// first response to report one, e.g. when handing over from another
    /// process that used the same webhook.
    pub fn rate_limit(mut self, remaining: u32, limit: u32, reset_after: Duration) -> Self {
        self.rate_limit = Some((remaining, limit, reset_after));
        self
    }

    pub fn build(self) -> Result<WebhookClient, WebhookError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };
        let name = self
            .thread_name
            .unwrap_or_else(|| format!("webhook-{}", self.id));
        let executor = ScheduledExecutor::spawn(name).map_err(|e| {
            WebhookError::Transport(format!("failed to spawn worker thread: {}", e))
        })?;
        let bucket = match self.rate_limit {
            Some((remaining, limit, reset_after)) => {
                Bucket::with_state(remaining, limit, Instant::now() + reset_after)
            }
            None => Bucket::new(),
        };

        let queue = DeliveryQueue::new(QueueConfig {
            id: self.id,
            base_url: format!("{}/webhooks/{}/{}", self.api_base, self.id, self.token),
            wait_for_message: self.wait_for_message,
            allowed_mentions: self.allowed_mentions,
            transport,
            executor,
            bucket,
            error_handler: self.error_handler,
        });
        debug!(webhook = self.id, "created webhook client");

        let root = WebhookClient::root(Arc::new(queue), self.default_timeout);
        Ok(match self.thread_id {
            Some(thread_id) => root.on_thread(thread_id),
            None => root,
        })
    }
}

#[cfg(feature = "io")]
fn default_transport() -> Result<Arc<dyn Transport>, WebhookError> {
    Ok(Arc::new(crate::http::UreqTransport::new()))
}

#[cfg(not(feature = "io"))]
fn default_transport() -> Result<Arc<dyn Transport>, WebhookError> {
    Err(WebhookError::MissingTransport)
}

// ===========================================================================
// Client
// ===========================================================================

struct ClientInner {
    queue: Arc<DeliveryQueue>,
    thread_id: Option<u64>,
    parent: Option<WebhookClient>,
    closed: AtomicBool,
    timeout: Mutex<Option<Duration>>,
}

/// Sends messages to one webhook, optionally scoped to a thread.
///
/// Cloning is cheap and clones share everything, including the closed
/// state. Every request method returns immediately with a
/// [`ResponseFuture`]; delivery happens on the client's worker thread.
#[derive(Clone)]
pub struct WebhookClient {
    inner: Arc<ClientInner>,
}

impl WebhookClient {
    fn root(queue: Arc<DeliveryQueue>, timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                queue,
                thread_id: None,
                parent: None,
                closed: AtomicBool::new(false),
                timeout: Mutex::new(timeout),
            }),
        }
    }

    /// Shortcut for `WebhookClientBuilder::from_url(url)?.build()`.
    pub fn from_url(url: &str) -> Result<Self, WebhookError> {
        WebhookClientBuilder::from_url(url)?.build()
    }

    /// A client for `thread_id` that shares this client's queue and bucket.
    pub fn on_thread(&self, thread_id: u64) -> WebhookClient {
        let parent = self.inner.parent.clone().unwrap_or_else(|| self.clone());
        WebhookClient {
            inner: Arc::new(ClientInner {
                queue: Arc::clone(&self.inner.queue),
                thread_id: Some(thread_id),
                parent: Some(parent),
                closed: AtomicBool::new(false),
                timeout: Mutex::new(self.timeout()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.queue.id
    }

    pub fn thread_id(&self) -> Option<u64> {
        self.inner.thread_id
    }

    pub fn is_thread_client(&self) -> bool {
        self.inner.parent.is_some()
    }

    /// Whether this client (or its root) no longer accepts requests.
    pub fn is_shutdown(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst) || self.inner.queue.is_shutdown()
    }

    /// Requests waiting to be sent, across the root and all thread clients.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Remaining requests in the current rate-limit window, as last reported
    /// by the server. `None` until a response carried rate-limit headers or
    /// the builder seeded a window.
    pub fn remaining_uses(&self) -> Option<u32> {
        self.inner.queue.bucket().remaining()
    }

    fn timeout(&self) -> Option<Duration> {
        *self
            .inner
            .timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue deadline for requests submitted from now on through this client.
    pub fn set_timeout(&self, timeout: Duration) {
        *self
            .inner
            .timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(timeout);
    }

    /// Replace the error sink. Shared with the root and all thread clients.
    pub fn set_error_handler(&self, handler: impl ErrorHandler) {
        self.inner.queue.set_error_handler(Arc::new(handler));
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Post a message. Resolves to the created message when
    /// `wait_for_message` is on, `None` otherwise.
    pub fn send(&self, message: &Message) -> Result<ResponseFuture<Option<ReceivedMessage>>, WebhookError> {
        let wait = self.inner.queue.wait_for_message;
        let body = self.encode(message)?;
        self.submit(HttpMethod::Post, self.endpoint(None, wait), Some(body), wait, Ok)
    }

    /// Post plain text. Surrounding whitespace is trimmed.
    pub fn send_text(&self, text: &str) -> Result<ResponseFuture<Option<ReceivedMessage>>, WebhookError> {
        self.send(&Message::text(text.trim())?)
    }

    pub fn send_embeds(
        &self,
        embeds: impl IntoIterator<Item = Embed>,
    ) -> Result<ResponseFuture<Option<ReceivedMessage>>, WebhookError> {
        self.send(&Message::embeds(embeds)?)
    }

    pub fn send_file(
        &self,
        name: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> Result<ResponseFuture<Option<ReceivedMessage>>, WebhookError> {
        self.send(&Message::file(name, data)?)
    }

    /// Replace a message previously sent by this webhook.
    pub fn edit(
        &self,
        message_id: u64,
        message: &Message,
    ) -> Result<ResponseFuture<Option<ReceivedMessage>>, WebhookError> {
        let wait = self.inner.queue.wait_for_message;
        let body = self.encode(message)?;
        let url = self.endpoint(Some(message_id), wait);
        self.submit(HttpMethod::Patch, url, Some(body), wait, Ok)
    }

    pub fn edit_text(
        &self,
        message_id: u64,
        text: &str,
    ) -> Result<ResponseFuture<Option<ReceivedMessage>>, WebhookError> {
        self.edit(message_id, &Message::text(text.trim())?)
    }

    pub fn delete(&self, message_id: u64) -> Result<ResponseFuture<()>, WebhookError> {
        let url = self.endpoint(Some(message_id), false);
        self.submit(HttpMethod::Delete, url, None, false, |_| Ok(()))
    }

    /// Fetch a message previously sent by this webhook.
    pub fn get(&self, message_id: u64) -> Result<ResponseFuture<ReceivedMessage>, WebhookError> {
        let url = self.endpoint(Some(message_id), true);
        self.submit(HttpMethod::Get, url, None, true, |message| {
            message.ok_or_else(|| WebhookError::Decode("empty response body".to_string()))
        })
    }

    fn encode(&self, message: &Message) -> Result<crate::http::RequestBody, WebhookError> {
        message
            .encode(&self.inner.queue.allowed_mentions)
            .map_err(|e| WebhookError::Decode(format!("failed to encode message: {}", e)))
    }

    fn endpoint(&self, message_id: Option<u64>, wait: bool) -> String {
        let mut url = self.inner.queue.base_url.clone();
        if let Some(message_id) = message_id {
            url.push_str(&format!("/messages/{}", message_id));
        }

        let mut query = Vec::with_capacity(2);
        if wait {
            query.push("wait=true".to_string());
        }
        if let Some(thread_id) = self.inner.thread_id {
            query.push(format!("thread_id={}", thread_id));
        }
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    fn submit<T, F>(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<crate::http::RequestBody>,
        expects_body: bool,
        map: F,
    ) -> Result<ResponseFuture<T>, WebhookError>
    where
        T: Send + 'static,
        F: FnOnce(Option<ReceivedMessage>) -> Result<T, WebhookError> + Send + 'static,
    {
        if self.is_shutdown() {
            return Err(WebhookError::Closed);
        }
        let deadline = self.timeout().map(|timeout| Instant::now() + timeout);
        let http = HttpRequest { method, url, body };
        let (request, future) = Request::new(http, deadline, expects_body, map);
        self.inner.queue.enqueue(request)?;
        Ok(future)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Stop accepting requests. Already queued requests are still delivered,
    /// then the worker thread exits. Closing a thread client closes its root.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        match &self.inner.parent {
            Some(parent) => parent.close(),
            None => self.inner.queue.close(),
        }
    }

    /// Stop accepting requests and fail every queued request with
    /// [`WebhookError::Shutdown`]. A call already in flight still finishes.
    pub fn close_now(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        match &self.inner.parent {
            Some(parent) => parent.close_now(),
            None => self.inner.queue.close_now(),
        }
    }
}

impl std::fmt::Debug for WebhookClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookClient")
            .field("id", &self.id())
            .field("thread_id", &self.inner.thread_id)
            .field("closed", &self.is_shutdown())
            .field("queue", &self.inner.queue)
            .finish()
    }
}
