use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::time::sleep;

use crate::WeftAiError;

const FIRST_RETRY_DELAY_MS: u64 = 200;
const MAX_DOUBLINGS: u32 = 6;

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// How a provider client retries one chat request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetryPolicy {
    pub max_retries: usize,
    /// Total time the retries may spend waiting; zero leaves only `max_retries` as the bound.
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (zero based).
    ///
    /// The delay doubles from 200ms up to six times. With jitter on it lands
    /// anywhere in the upper half of that window. A `Retry-After` header on
    /// the failed response acts as a floor.
    pub(crate) fn delay_for(&self, attempt: usize, headers: Option<&HeaderMap>) -> Duration {
        let doublings = u32::try_from(attempt).unwrap_or(u32::MAX).min(MAX_DOUBLINGS);
        let ceiling_ms = FIRST_RETRY_DELAY_MS << doublings;
        let backoff_ms = if self.retry_jitter {
            let floor_ms = ceiling_ms / 2;
            floor_ms + random_u64() % (ceiling_ms - floor_ms + 1)
        } else {
            ceiling_ms
        };
        let backoff = Duration::from_millis(backoff_ms);
        match headers.and_then(retry_after) {
            Some(requested) => backoff.max(requested),
            None => backoff,
        }
    }

    fn may_retry(&self, attempt: usize) -> bool {
        attempt < self.max_retries
    }

    fn budget_allows(&self, spent: Duration, delay: Duration) -> bool {
        self.retry_budget_ms == 0
            || spent.saturating_add(delay) <= Duration::from_millis(self.retry_budget_ms)
    }
}

/// Statuses worth another attempt: timeouts, conflicts, rate limits and server errors.
fn is_transient_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 409 | 425 | 429) || status.is_server_error()
}

fn is_transient_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

/// Reads `Retry-After` as delta seconds or an HTTP date. Past dates mean no wait.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

fn random_u64() -> u64 {
    RandomState::new().build_hasher().finish()
}

fn next_request_id() -> String {
    let sequence = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("weft-{}-{sequence}", std::process::id())
}

/// Posts `body` as JSON and returns the raw success body, retrying transient failures.
pub(crate) async fn post_json_with_retries(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, &str)],
    body: &Value,
    policy: RetryPolicy,
) -> Result<String, WeftAiError> {
    let started = Instant::now();
    let request_id = next_request_id();
    let mut attempt = 0;

    loop {
        let mut request = client
            .post(url)
            .header("x-weft-request-id", request_id.as_str())
            .header("x-weft-retry-attempt", attempt.to_string());
        if !query.is_empty() {
            request = request.query(query);
        }

        let delay = match request.json(body).send().await {
            Ok(response) if response.status().is_success() => return Ok(response.text().await?),
            Ok(response) => {
                let status = response.status();
                let delay = policy.delay_for(attempt, Some(response.headers()));
                let raw = response.text().await?;
                if !(policy.may_retry(attempt) && is_transient_status(status)) {
                    return Err(WeftAiError::HttpStatus {
                        status: status.as_u16(),
                        body: raw,
                    });
                }
                tracing::debug!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "provider returned a transient status"
                );
                if !policy.budget_allows(started.elapsed(), delay) {
                    return Err(WeftAiError::HttpStatus {
                        status: status.as_u16(),
                        body: raw,
                    });
                }
                delay
            }
            Err(error) => {
                if !(policy.may_retry(attempt) && is_transient_transport_error(&error)) {
                    return Err(WeftAiError::Http(error));
                }
                let delay = policy.delay_for(attempt, None);
                tracing::debug!(
                    request_id = %request_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "provider request failed in transport"
                );
                if !policy.budget_allows(started.elapsed(), delay) {
                    return Err(WeftAiError::Http(error));
                }
                delay
            }
        };

        sleep(delay).await;
        attempt += 1;
    }
}
