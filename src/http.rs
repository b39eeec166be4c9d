//! Transport-abstracted HTTP layer for webhook requests.
//!
//! Every outbound call goes through the [`Transport`] trait so the queue
//! never sees a concrete HTTP client. The default [`UreqTransport`] issues a
//! blocking call on the executor's worker thread. Tests swap in a scripted
//! transport.

use rand::Rng;

use crate::error::WebhookError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Value of the `user-agent` header sent with every request.
pub const USER_AGENT: &str = concat!(
    "hello-webhook (https://github.com/mrchantey/hello-discord, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Status code the server uses for "slow down, retry after".
pub const RATE_LIMIT_STATUS: u16 = 429;

// ---------------------------------------------------------------------------
// Request / response values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An encoded request body together with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl RequestBody {
    pub fn json(bytes: Vec<u8>) -> Self {
        Self {
            content_type: CONTENT_TYPE_JSON.to_string(),
            bytes,
        }
    }
}

/// A fully-resolved HTTP request, ready for a [`Transport`].
///
/// Requests are immutable and may be executed more than once (a 429 puts
/// the same request back at the head of the queue).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    /// Headers sent with every request, in addition to `content-type`.
    pub fn default_headers() -> [(&'static str, &'static str); 2] {
        [("accept-encoding", "gzip"), ("user-agent", USER_AGENT)]
    }
}

/// What came back from the server, regardless of status.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names as received; lookups are case-insensitive.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First header value matching `name`, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == RATE_LIMIT_STATUS
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Executes one HTTP request synchronously.
///
/// Non-success statuses are *responses*, not errors: only failures that
/// prevent a response from being read at all should return `Err`.
pub trait Transport: Send + Sync + 'static {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, WebhookError>;
}

/// Blocking transport backed by a shared [`ureq::Agent`].
#[cfg(feature = "io")]
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

#[cfg(feature = "io")]
impl UreqTransport {
    pub fn new() -> Self {
        Self::with_agent(ureq::AgentBuilder::new().build())
    }

    pub fn with_agent(agent: ureq::Agent) -> Self {
        Self { agent }
    }

    fn into_response(response: ureq::Response) -> Result<HttpResponse, WebhookError> {
        let status = response.status();
        let headers = response
            .headers_names()
            .into_iter()
            .filter_map(|name| {
                let value = response.header(&name)?.to_string();
                Some((name, value))
            })
            .collect();

        let mut body = Vec::new();
        std::io::Read::read_to_end(&mut response.into_reader(), &mut body)
            .map_err(|e| WebhookError::Transport(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(feature = "io")]
impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "io")]
impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, WebhookError> {
        let mut call = self.agent.request(request.method.as_str(), &request.url);
        for (name, value) in HttpRequest::default_headers() {
            call = call.set(name, value);
        }

        let result = match &request.body {
            Some(body) => call
                .set("content-type", &body.content_type)
                .send_bytes(&body.bytes),
            None => call.call(),
        };

        match result {
            Ok(response) => Self::into_response(response),
            // ureq reports 4xx/5xx as errors; the queue wants them as responses.
            Err(ureq::Error::Status(_, response)) => Self::into_response(response),
            Err(ureq::Error::Transport(e)) => Err(WebhookError::Transport(e.to_string())),
        }
    }
}

#[cfg(feature = "io")]
impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqTransport").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Multipart encoding
// ---------------------------------------------------------------------------

/// One binary part of a multipart body.
pub struct FilePart<'a> {
    pub field: String,
    pub filename: &'a str,
    pub data: &'a [u8],
}

/// Build a `multipart/form-data` body: a `payload_json` text part followed
/// by one octet-stream part per file.
pub fn multipart_body<'a>(
    payload_json: &str,
    files: impl IntoIterator<Item = FilePart<'a>>,
) -> RequestBody {
    let boundary = format!("HelloWebhookBoundary{:016x}", rand::thread_rng().gen::<u64>());
    let mut buf: Vec<u8> = Vec::new();

    buf.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    buf.extend_from_slice(b"Content-Disposition: form-data; name=\"payload_json\"\r\n");
    buf.extend_from_slice(b"Content-Type: application/json\r\n\r\n");
    buf.extend_from_slice(payload_json.as_bytes());
    buf.extend_from_slice(b"\r\n");

    for file in files {
        buf.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        buf.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                file.field,
                escape_quotes(file.filename)
            )
            .as_bytes(),
        );
        buf.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        buf.extend_from_slice(file.data);
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    RequestBody {
        content_type: format!("multipart/form-data; boundary={}", boundary),
        bytes: buf,
    }
}

fn escape_quotes(name: &str) -> String {
    name.replace('"', "%22")
}
