//! Scripted transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use hello_webhook::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody, Transport};
use hello_webhook::{WebhookClient, WebhookClientBuilder, WebhookError};

/// One observed call.
#[derive(Debug, Clone)]
pub struct Call {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<RequestBody>,
    pub at: Instant,
}

impl Call {
    /// `content` of a JSON body, if any.
    pub fn content(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        let value: serde_json::Value = serde_json::from_slice(&body.bytes).ok()?;
        value.get("content")?.as_str().map(str::to_string)
    }
}

enum Step {
    Respond(HttpResponse),
    Fail(WebhookError),
    Panic,
}

/// Replays scripted steps in order, then answers with `fallback`.
pub struct MockTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: HttpResponse,
    pause: Duration,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: HttpResponse::new(204),
            pause: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn respond(self, response: HttpResponse) -> Self {
        self.script.lock().unwrap().push_back(Step::Respond(response));
        self
    }

    /// Script a call that returns `error` instead of a response.
    pub fn fail(self, error: WebhookError) -> Self {
        self.script.lock().unwrap().push_back(Step::Fail(error));
        self
    }

    /// Script a call that panics.
    pub fn panic(self) -> Self {
        self.script.lock().unwrap().push_back(Step::Panic);
        self
    }

    pub fn fallback(mut self, response: HttpResponse) -> Self {
        self.fallback = response;
        self
    }

    /// Every call blocks for `pause` before answering.
    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn contents(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|call| call.content().unwrap_or_default())
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, WebhookError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            method: request.method,
            url: request.url.clone(),
            body: request.body.clone(),
            at: Instant::now(),
        });

        if !self.pause.is_zero() {
            thread::sleep(self.pause);
        }
        let step = self.script.lock().unwrap().pop_front();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Panic) => panic!("mock transport exploded"),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Client on a mock base URL that does not ask for the created message.
pub fn client(transport: &Arc<MockTransport>) -> WebhookClient {
    builder(transport).wait_for_message(false).build().unwrap()
}

pub fn builder(transport: &Arc<MockTransport>) -> WebhookClientBuilder {
    WebhookClientBuilder::new(1234, "token")
        .api_base("http://mock.invalid/api")
        .transport(transport.clone())
}

/// Response carrying a full set of rate-limit headers.
pub fn limited(status: u16, remaining: u32, reset_after: &str) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("X-RateLimit-Limit", "5")
        .with_header("X-RateLimit-Remaining", remaining.to_string())
        .with_header("X-RateLimit-Reset-After", reset_after)
}

pub fn message_json(id: u64, content: &str) -> String {
    serde_json::json!({
        "id": id.to_string(),
        "channel_id": "555",
        "author": { "id": "1234", "username": "hook", "bot": true },
        "content": content,
        "embeds": [],
        "attachments": []
    })
    .to_string()
}

/// Poll `done` every few milliseconds until it holds or `limit` passes.
pub fn wait_until(limit: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    done()
}
