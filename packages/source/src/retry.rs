//! HTTP retry helpers for transient errors.
//!
//! Every request to the imagery service goes through [`send_json`] so it
//! gets retried with exponential backoff on connection failures, timeouts,
//! HTTP 429 and HTTP 5xx. The whole call is additionally bounded by the
//! engine's source timeout, so the policy here should stay short.
//!
//! ```ignore
//! let body: BuildingResponse =
//!     retry::send_json(&policy, || client.post(&url).json(&payload)).await?;
//! ```

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::SourceError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How often and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt for transient transport errors.
    pub max_retries: u32,
    /// Full re-fetches when the body arrives but cannot be decoded.
    pub max_body_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_body_retries: 1,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Sends an HTTP request and decodes the response body as JSON.
///
/// `build_request` is called on each attempt to construct a fresh
/// [`reqwest::RequestBuilder`], since builders are consumed by `send()`.
///
/// Two layers of retry:
///
/// 1. **Transport** ([`send_inner`]): retries connection errors, timeouts,
///    HTTP 429 and HTTP 5xx up to [`RetryPolicy::max_retries`] times.
/// 2. **Body decode**: a response that arrives but does not parse is
///    re-fetched up to [`RetryPolicy::max_body_retries`] times.
///
/// HTTP 4xx other than 429 is permanent and returned immediately.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the body cannot be
/// decoded after all body retries.
#[allow(clippy::future_not_send)]
pub async fn send_json<T, F>(policy: &RetryPolicy, build_request: F) -> Result<T, SourceError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut body_attempt = 0;
    loop {
        let response = send_inner(policy, &build_request).await?;
        let url = response.url().to_string();
        let status = response.status();

        let failure = match response.text().await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(value) => return Ok(value),
                Err(json_err) => {
                    log::warn!(
                        "JSON decode failed for {url} (status {status}, {} bytes): {json_err}\n  \
                         body preview: {}",
                        text.len(),
                        preview(&text),
                    );
                    SourceError::Json(json_err)
                }
            },
            Err(e) => {
                log::warn!("Response body read failed for {url} (status {status}): {e}");
                SourceError::Http(e)
            }
        };

        if body_attempt >= policy.max_body_retries {
            log::error!("Giving up on {url} after {body_attempt} body retries");
            return Err(failure);
        }
        body_attempt += 1;
        let delay = policy.delay(body_attempt);
        log::warn!(
            "  body retry {body_attempt}/{} in {delay:?}...",
            policy.max_body_retries
        );
        tokio::time::sleep(delay).await;
    }
}

/// Core retry loop for [`send_json`].
///
/// Returns the first response with a 2xx or 3xx status.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    policy: &RetryPolicy,
    build_request: &F,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = policy.delay(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        let error = match build_request().send().await {
            Err(e) => {
                if !is_transient(&e) {
                    return Err(SourceError::Http(e));
                }
                log::warn!("  transient error: {e}");
                SourceError::Http(e)
            }
            Ok(response) => {
                let status = response.status();
                if !is_retryable_status(status) {
                    if status.is_client_error() {
                        let message = response.text().await.unwrap_or_default();
                        return Err(SourceError::Status {
                            status: status.as_u16(),
                            message: preview(&message),
                        });
                    }
                    return Ok(response);
                }
                log::warn!("  HTTP {status}");
                SourceError::Status {
                    status: status.as_u16(),
                    message: format!("HTTP {status}"),
                }
            }
        };

        if attempt >= max_retries {
            log::error!("Request failed after {max_retries} retries: {error}");
            return Err(error);
        }
        attempt += 1;
    }
}

/// Whether a status is worth retrying (429 and 5xx).
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

fn preview(text: &str) -> String {
    if text.len() > BODY_PREVIEW_LEN {
        let end = (0..=BODY_PREVIEW_LEN)
            .rev()
            .find(|&i| text.is_char_boundary(i))
            .unwrap_or(0);
        format!("{}...", &text[..end])
    } else {
        text.to_string()
    }
}
