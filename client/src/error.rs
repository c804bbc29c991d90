use thiserror::Error;

use cartlock_types::{EligibilityResponse, ErrorBody, ErrorCode};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a typed error body.
    #[error("{} ({status}): {}", body.code, body.message.as_deref().unwrap_or("no message"))]
    Rejected { status: u16, body: ErrorBody },

    /// `job/request` hit the cadence gate.
    #[error("next job available in {}ms", .0.wait_ms)]
    Throttled(EligibilityResponse),

    #[error("unexpected response ({status}): {message}")]
    Decode { status: u16, message: String },
}

impl ClientError {
    /// Server error code, when the server sent one.
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected { body, .. } => Some(body.code),
            _ => None,
        }
    }

    /// Seconds the server asked the caller to wait before trying again.
    #[must_use]
    pub fn ttl_remaining_sec(&self) -> Option<u64> {
        match self {
            Self::Rejected { body, .. } => body.ttl_remaining_sec,
            _ => None,
        }
    }

    /// `session_expired` or `lock_expired`: the session must be reopened.
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(
            self.code(),
            Some(ErrorCode::SessionExpired | ErrorCode::LockExpired)
        )
    }
}
