//! Rate-limit bucket shared by a root client and all of its thread clients.
//!
//! The bucket is only ever written from response headers. There is no
//! background refill: [`Bucket::is_rate_limited`] tops `remaining` back up to
//! `limit` the first time it is consulted after the reset instant.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::error::WebhookError;
use crate::http::HttpResponse;

/// Wait applied to a 429 that carries neither `Retry-After` nor a body.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// `X-RateLimit-Limit` assumed when a 429 omits it.
pub const DEFAULT_LIMIT: u32 = 5;

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

/// Rate-limit metadata extracted from response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitInfo {
    pub remaining: Option<u32>,
    pub limit: Option<u32>,
    /// Seconds until the bucket resets.
    pub reset_after: Option<f64>,
}

impl RateLimitInfo {
    /// Parse the `X-RateLimit-*` headers. A header that is present but not
    /// a number is an error; an absent header is `None`.
    pub fn from_response(response: &HttpResponse) -> Result<Self, WebhookError> {
        Ok(Self {
            remaining: parse_header(response, "x-ratelimit-remaining")?,
            limit: parse_header(response, "x-ratelimit-limit")?,
            reset_after: parse_header(response, "x-ratelimit-reset-after")?,
        })
    }
}

fn parse_header<T: std::str::FromStr>(
    response: &HttpResponse,
    name: &str,
) -> Result<Option<T>, WebhookError> {
    response
        .header(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| WebhookError::Decode(format!("invalid {} header: {:?}", name, raw)))
        })
        .transpose()
}

/// Convert fractional seconds into a duration rounded up to the millisecond.
fn seconds_to_duration(seconds: f64) -> Duration {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_millis((seconds * 1000.0).ceil() as u64)
}

/// How long a 429 asks us to wait: `Retry-After` header first, then the
/// JSON body's `retry_after`, then [`DEFAULT_RETRY_AFTER`].
fn retry_after_of(response: &HttpResponse) -> Result<Duration, WebhookError> {
    if let Some(seconds) = parse_header::<f64>(response, "retry-after")? {
        return Ok(seconds_to_duration(seconds));
    }
    if response.body.is_empty() {
        return Ok(DEFAULT_RETRY_AFTER);
    }

    let json: serde_json::Value = serde_json::from_slice(&response.body)
        .map_err(|e| WebhookError::Decode(format!("invalid 429 body: {}", e)))?;
    Ok(json
        .get("retry_after")
        .and_then(serde_json::Value::as_f64)
        .map(seconds_to_duration)
        .unwrap_or(DEFAULT_RETRY_AFTER))
}

// ---------------------------------------------------------------------------
// Bucket
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct BucketState {
    reset_at: Instant,
    remaining: u32,
    limit: u32,
    /// The server (or the caller) has supplied real numbers.
    known: bool,
}

/// Remaining uses and reset time for one webhook endpoint.
#[derive(Debug)]
pub struct Bucket {
    state: Mutex<BucketState>,
}

impl Bucket {
    /// A bucket that allows sending until the server says otherwise.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BucketState {
                reset_at: Instant::now(),
                remaining: u32::MAX,
                limit: u32::MAX,
                known: false,
            }),
        }
    }

    /// A bucket with explicit starting state.
    pub fn with_state(remaining: u32, limit: u32, reset_at: Instant) -> Self {
        Self {
            state: Mutex::new(BucketState {
                reset_at,
                remaining,
                limit,
                known: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the next request must wait for the reset.
    pub fn is_rate_limited(&self) -> bool {
        let mut state = self.lock();
        if Instant::now() >= state.reset_at {
            state.remaining = state.limit;
        }
        state.remaining == 0
    }

    /// Time left until the reset; zero means "ready now".
    pub fn retry_after(&self) -> Duration {
        self.lock().reset_at.saturating_duration_since(Instant::now())
    }

    /// Uses left in the current window, or `None` before any response
    /// carried rate-limit headers.
    pub fn remaining(&self) -> Option<u32> {
        let state = self.lock();
        state.known.then_some(state.remaining)
    }

    pub fn limit(&self) -> Option<u32> {
        let state = self.lock();
        state.known.then_some(state.limit)
    }

    /// Fold a response into the bucket.
    ///
    /// Missing headers leave the state untouched. Malformed headers are
    /// returned as an error and also leave the state untouched, except on a
    /// 429 where the default wait is applied before the error is returned.
    pub fn update(&self, response: &HttpResponse) -> Result<(), WebhookError> {
        let now = Instant::now();

        // A 429 always exhausts the bucket, even when its hints are unreadable.
        if response.is_rate_limited() {
            let parsed = retry_after_of(response);
            let delay = *parsed.as_ref().unwrap_or(&DEFAULT_RETRY_AFTER);
            let limit = parse_header::<u32>(response, "x-ratelimit-limit")
                .ok()
                .flatten()
                .unwrap_or(DEFAULT_LIMIT);
            error!(delay_ms = delay.as_millis() as u64, "encountered 429, retrying after delay");

            let mut state = self.lock();
            state.reset_at = now + delay;
            state.remaining = 0;
            state.limit = limit;
            state.known = true;
            return parsed.map(|_| ());
        }

        let info = RateLimitInfo::from_response(response)?;
        let (Some(remaining), Some(limit), Some(reset_after)) =
            (info.remaining, info.limit, info.reset_after)
        else {
            debug!(
                status = response.status,
                headers = ?response.headers,
                "failed to update bucket due to missing headers"
            );
            return Ok(());
        };

        let mut state = self.lock();
        state.remaining = remaining;
        state.limit = limit;
        state.reset_at = now + seconds_to_duration(reset_after);
        state.known = true;
        Ok(())
    }
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limited(remaining: &str, limit: &str, reset_after: &str) -> HttpResponse {
        HttpResponse::new(200)
            .with_header("X-RateLimit-Remaining", remaining)
            .with_header("X-RateLimit-Limit", limit)
            .with_header("X-RateLimit-Reset-After", reset_after)
    }

    #[test]
    fn fresh_bucket_is_not_rate_limited() {
        let bucket = Bucket::new();
        assert!(!bucket.is_rate_limited());
        assert_eq!(bucket.retry_after(), Duration::ZERO);
        assert_eq!(bucket.remaining(), None);
        assert_eq!(bucket.limit(), None);
    }

    #[test]
    fn exhausted_bucket_waits_for_reset() {
        let bucket = Bucket::new();
        bucket.update(&limited("0", "5", "2")).unwrap();

        assert!(bucket.is_rate_limited());
        let wait = bucket.retry_after();
        assert!(wait > Duration::from_millis(1500), "{wait:?}");
        assert!(wait <= Duration::from_secs(2), "{wait:?}");
    }

    #[test]
    fn headers_make_the_bucket_known() {
        let bucket = Bucket::new();
        bucket.update(&limited("4", "5", "1")).unwrap();
        assert_eq!(bucket.remaining(), Some(4));
        assert_eq!(bucket.limit(), Some(5));
    }

    #[test]
    fn bucket_refills_lazily_after_reset() {
        let bucket = Bucket::with_state(0, 3, Instant::now());
        assert_eq!(bucket.remaining(), Some(0));
        assert!(!bucket.is_rate_limited());
        assert_eq!(bucket.remaining(), Some(3));
    }

    #[test]
    fn fractional_reset_after_rounds_up_to_millis() {
        let bucket = Bucket::new();
        bucket.update(&limited("0", "5", "0.0005")).unwrap();
        assert!(bucket.retry_after() <= Duration::from_millis(1));
    }

    #[test]
    fn missing_headers_leave_state_unchanged() {
        let bucket = Bucket::with_state(2, 5, Instant::now() + Duration::from_secs(60));
        let partial = HttpResponse::new(200).with_header("X-RateLimit-Remaining", "0");
        bucket.update(&partial).unwrap();
        assert_eq!(bucket.remaining(), Some(2));
        assert_eq!(bucket.limit(), Some(5));
    }

    #[test]
    fn malformed_headers_are_errors() {
        let bucket = Bucket::with_state(2, 5, Instant::now());
        let err = bucket.update(&limited("zero", "5", "1")).unwrap_err();
        assert!(matches!(err, WebhookError::Decode(_)));
        assert_eq!(bucket.remaining(), Some(2));
    }

    #[test]
    fn rate_limit_uses_retry_after_header() {
        let bucket = Bucket::new();
        let response = HttpResponse::new(429)
            .with_header("Retry-After", "1")
            .with_header("X-RateLimit-Limit", "10");
        bucket.update(&response).unwrap();

        assert_eq!(bucket.remaining(), Some(0));
        assert_eq!(bucket.limit(), Some(10));
        assert!(bucket.is_rate_limited());
        assert!(bucket.retry_after() > Duration::from_millis(500));
    }

    #[test]
    fn rate_limit_falls_back_to_body() {
        let bucket = Bucket::new();
        let response = HttpResponse::new(429).with_body(r#"{"retry_after": 0.25, "global": false}"#);
        bucket.update(&response).unwrap();

        assert_eq!(bucket.limit(), Some(DEFAULT_LIMIT));
        let wait = bucket.retry_after();
        assert!(wait <= Duration::from_millis(250), "{wait:?}");
        assert!(wait > Duration::from_millis(100), "{wait:?}");
    }

    #[test]
    fn rate_limit_without_hints_waits_thirty_seconds() {
        let bucket = Bucket::new();
        bucket.update(&HttpResponse::new(429)).unwrap();
        assert!(bucket.retry_after() > Duration::from_secs(29));
    }

    #[test]
    fn unreadable_rate_limit_still_exhausts_bucket() {
        let bucket = Bucket::new();
        let response = HttpResponse::new(429).with_header("Retry-After", "soon");
        assert!(matches!(bucket.update(&response), Err(WebhookError::Decode(_))));
        assert!(bucket.is_rate_limited());
        assert!(bucket.retry_after() > Duration::from_secs(29));
    }

    #[test]
    fn rate_limit_info_parses_all_headers() {
        let info = RateLimitInfo::from_response(&limited("3", "5", "1.5")).unwrap();
        assert_eq!(
            info,
            RateLimitInfo {
                remaining: Some(3),
                limit: Some(5),
                reset_after: Some(1.5),
            }
        );
    }
}
