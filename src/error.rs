//! Error types and the pluggable error sink.
//!
//! Two families live here:
//!
//! - [`BuildError`] is returned synchronously by the message and embed
//!   builders. A message that fails to build never reaches the queue.
//! - [`WebhookError`] is what a queued request resolves to when it does not
//!   succeed. Every failure is local to the request that caused it; the
//!   queue keeps draining for everyone else.
//!
//! Terminal HTTP and transport failures are also handed to an
//! [`ErrorHandler`] so applications can observe them without awaiting every
//! future. The default handler logs through `tracing`.

use thiserror::Error;
use tracing::error;

use crate::http::HttpResponse;

// ---------------------------------------------------------------------------
// Build-time validation
// ---------------------------------------------------------------------------

/// Reason a [`Message`](crate::types::Message) or
/// [`Embed`](crate::types::Embed) could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("content may not exceed {max} characters (got {len})")]
    ContentTooLong { len: usize, max: usize },

    #[error("cannot add more than {max} embeds to a message (got {len})")]
    TooManyEmbeds { len: usize, max: usize },

    #[error("cannot add more than {max} attachments to a message (got {len})")]
    TooManyAttachments { len: usize, max: usize },

    #[error("cannot add more than {max} fields to an embed (got {len})")]
    TooManyFields { len: usize, max: usize },

    #[error("cannot build an empty message")]
    EmptyMessage,

    #[error("cannot build an empty embed")]
    EmptyEmbed,
}

// ---------------------------------------------------------------------------
// Delivery errors
// ---------------------------------------------------------------------------

/// Failure of a single webhook request.
#[derive(Debug, Clone, Error)]
pub enum WebhookError {
    /// The server answered with a non-success status other than 429.
    #[error("request returned failure {status}: {body}")]
    Http {
        status: u16,
        body: String,
        headers: Vec<(String, String)>,
    },

    /// The request never produced an HTTP response (DNS, TLS, I/O...).
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// A response (or one of its rate-limit headers) could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The request's deadline passed while it was still queued.
    #[error("request timed out before it could be sent")]
    Timeout,

    /// The client was closed before the request was submitted.
    #[error("cannot send to a closed client")]
    Closed,

    /// The client was shut down while the request was still queued.
    #[error("client was shut down before the request was sent")]
    Shutdown,

    #[error("failed to parse webhook url: {0}")]
    InvalidUrl(String),

    /// No transport was configured and the `io` feature is disabled.
    #[error("no HTTP transport configured")]
    MissingTransport,

    /// A convenience sender built an invalid message.
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl WebhookError {
    /// Build an [`WebhookError::Http`] from a failed response.
    pub fn from_response(response: &HttpResponse) -> Self {
        Self::Http {
            status: response.status,
            body: String::from_utf8_lossy(&response.body).into_owned(),
            headers: response.headers.clone(),
        }
    }

    /// HTTP status code, if this error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Error sink
// ---------------------------------------------------------------------------

/// Receives every terminal failure the drain loop observes.
///
/// Closures with the matching signature implement this trait:
///
/// ```ignore
/// let client = WebhookClientBuilder::from_url(url)?
///     .error_handler(|webhook: u64, message: &str, error: &WebhookError| {
///         eprintln!("[{webhook}] {message}: {error}");
///     })
///     .build()?;
/// ```
pub trait ErrorHandler: Send + Sync + 'static {
    fn handle(&self, webhook_id: u64, message: &str, error: &WebhookError);
}

impl<F> ErrorHandler for F
where
    F: Fn(u64, &str, &WebhookError) + Send + Sync + 'static,
{
    fn handle(&self, webhook_id: u64, message: &str, error: &WebhookError) {
        self(webhook_id, message, error)
    }
}

/// Default sink: one `error!` event per failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, webhook_id: u64, message: &str, error: &WebhookError) {
        error!(webhook = webhook_id, error = %error, "{}", message);
    }
}
