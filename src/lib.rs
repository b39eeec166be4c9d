//! Rate-limited, ordered delivery of webhook messages.
//!
//! Build a [`Message`](types::Message), hand it to a [`WebhookClient`], and
//! get a [`ResponseFuture`] back. Requests are sent one at a time, in
//! submission order, on a worker thread owned by the client. The rate limit
//! is learned from response headers; a 429 is retried transparently.
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`types`] | Sendable and received message types |
//! | [`http`] | Request/response values, multipart, [`Transport`] |
//! | [`bucket`] | Rate-limit bookkeeping |
//! | [`executor`] | Worker thread for delayed tasks |
//! | [`client`] | Clients, thread clients, lifecycle |
//! | [`error`] | [`WebhookError`], [`BuildError`], [`ErrorHandler`] |

pub mod bucket;
pub mod client;
pub mod error;
pub mod executor;
pub mod http;
mod queue;
pub mod types;

pub use client::{parse_webhook_url, WebhookClient, WebhookClientBuilder, DEFAULT_API_BASE};
pub use error::{BuildError, ErrorHandler, LogErrorHandler, WebhookError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, Transport};
#[cfg(feature = "io")]
pub use http::UreqTransport;
pub use queue::ResponseFuture;

/// Common imports.
pub mod prelude {
    pub use crate::client::{WebhookClient, WebhookClientBuilder};
    pub use crate::error::{BuildError, ErrorHandler, WebhookError};
    pub use crate::queue::ResponseFuture;
    pub use crate::types::*;
}
