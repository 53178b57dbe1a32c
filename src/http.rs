//! Shared JSON-over-HTTP call loop for the hosted model APIs.
//!
//! Retry strategy (same for embeddings, generation, and search):
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors → retry
//! - backoff 1s, 2s, 4s, ... capped at 2^5 seconds
//!
//! `max_retries = 0` means a single attempt.

use std::time::Duration;

use anyhow::Result;

/// Longest slice of an error body kept in messages.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Why a call failed after all attempts.
#[derive(Debug)]
pub(crate) enum CallError {
    /// Non-success HTTP status.
    Status { status: u16, body: String },
    /// Connection, timeout, or body read failure.
    Network(String),
    /// Success status with a body that is not JSON.
    Decode(String),
}

impl CallError {
    /// Short human-readable description, with the service name prefixed.
    pub(crate) fn describe(&self, service: &str) -> String {
        match self {
            CallError::Status { status, .. } if *status == 401 || *status == 403 => {
                format!("{} rejected the API key (HTTP {})", service, status)
            }
            CallError::Status { status: 429, .. } => {
                format!("{} rate limit or quota exceeded (HTTP 429)", service)
            }
            CallError::Status { status, body } => {
                format!("{} returned HTTP {}: {}", service, status, body)
            }
            CallError::Network(e) => format!("{} request failed: {}", service, e),
            CallError::Decode(e) => format!("{} returned an invalid response: {}", service, e),
        }
    }
}

/// Build a client with a total request timeout.
pub(crate) fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a JSON request built by `build` until it succeeds or retries run out.
///
/// `build` is called once per attempt because a sent `RequestBuilder` is
/// consumed.
pub(crate) async fn send_json_with_retry<F>(
    build: F,
    max_retries: u32,
) -> std::result::Result<serde_json::Value, CallError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| CallError::Decode(e.without_url().to_string()));
                }

                let body = truncate(&response.text().await.unwrap_or_default());
                let err = CallError::Status {
                    status: status.as_u16(),
                    body,
                };

                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(status = status.as_u16(), attempt, "retryable HTTP error");
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                // Strip the URL: query strings may carry credentials.
                let e = e.without_url();
                tracing::warn!(error = %e, attempt, "request failed");
                last_err = Some(CallError::Network(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| CallError::Network("no attempt was made".to_string())))
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push_str("...");
    out
}
