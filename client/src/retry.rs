//! Transport retry with exponential backoff.
//!
//! Coordination answers (409, 410, 429 and friends) carry a typed code and a
//! wait hint for the caller to act on, so they are never retried here. What
//! is retried depends on the call's [`Replay`] class.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};

/// Whether a call may be sent again once the server might have acted on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Repeating is harmless: reads, and session calls that only reset TTLs.
    /// Retries timeouts, 408 and 5xx as well as refused connections.
    Safe,
    /// Issuing or claiming a job. Resent only when the connection was never
    /// established, so the server cannot have seen the first attempt.
    ConnectOnly,
}

impl Replay {
    fn retries_status(self, status: StatusCode) -> bool {
        match self {
            Self::Safe => {
                status == StatusCode::REQUEST_TIMEOUT
                    || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
            }
            Self::ConnectOnly => false,
        }
    }

    fn retries_error(self, error: &reqwest::Error) -> bool {
        match self {
            Self::Safe => error.is_connect() || error.is_timeout(),
            Self::ConnectOnly => error.is_connect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Down-jitter factor (0.25 = up to 25% shorter).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// Single attempt. Heartbeats use this: the next tick is the retry.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Wait before retry number `retry` (1-based). A server `Retry-After`
    /// in whole seconds wins, clamped to `max_delay`.
    #[must_use]
    pub fn delay_before(&self, retry: u32, headers: Option<&HeaderMap>) -> Duration {
        if let Some(hint) = headers.and_then(retry_after) {
            return hint.min(self.max_delay);
        }

        let doublings = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(doublings);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter = 1.0 - rand::random::<f64>() * self.jitter_factor;
        Duration::from_secs_f64(capped * jitter)
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers.get(RETRY_AFTER)?.to_str().ok()?.parse::<u64>().ok()?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

#[derive(Debug)]
pub enum RetryOutcome {
    /// Any HTTP response, success or not, once retries are done with it.
    Response(Response),
    /// Transport failure on the last attempt made.
    ConnectionError {
        attempts: u32,
        source: reqwest::Error,
    },
}

/// Send the request built by `build_request`, resending it as `replay`
/// allows until `config.max_retries` is used up.
pub async fn send_with_retry<F>(
    build_request: F,
    config: &RetryConfig,
    replay: Replay,
) -> RetryOutcome
where
    F: Fn() -> RequestBuilder,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let retry_left = attempts <= config.max_retries;

        let delay = match build_request().send().await {
            Ok(response) => {
                let status = response.status();
                if !retry_left || !replay.retries_status(status) {
                    return RetryOutcome::Response(response);
                }
                let delay = config.delay_before(attempts, Some(response.headers()));
                tracing::debug!(
                    %status,
                    attempts,
                    delay_ms = delay.as_millis(),
                    "Transient status; resending"
                );
                delay
            }
            Err(source) => {
                if !retry_left || !replay.retries_error(&source) {
                    return RetryOutcome::ConnectionError { attempts, source };
                }
                let delay = config.delay_before(attempts, None);
                tracing::debug!(
                    error = %source,
                    attempts,
                    delay_ms = delay.as_millis(),
                    "Transport error; resending"
                );
                delay
            }
        };
        tokio::time::sleep(delay).await;
    }
}
