//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use cartlock_types::{CoordError, ErrorBody, ErrorCode};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Coord(#[from] CoordError),

    /// Eligibility lookup for a session id that resolves to nothing.
    #[error("session not found")]
    SessionNotFound,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Coord(CoordError::bad_request(message))
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Coord(err) => err.code(),
            Self::SessionNotFound => ErrorCode::SessionNotFound,
        }
    }

    /// - bad_request: 400
    /// - unauthorized: 401
    /// - session_not_found: 404
    /// - cartridge_in_use, active_session_elsewhere, session_still_active: 409
    /// - session_expired, lock_expired: 410
    /// - wallet_session_limit_exceeded: 429
    /// - internal: 500
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self.code() {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
            ErrorCode::CartridgeInUse
            | ErrorCode::ActiveSessionElsewhere
            | ErrorCode::SessionStillActive => StatusCode::CONFLICT,
            ErrorCode::SessionExpired | ErrorCode::LockExpired => StatusCode::GONE,
            ErrorCode::WalletSessionLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::Coord(err) => {
                if let CoordError::Internal(cause) = err {
                    tracing::error!(cause = %cause, "Internal error while handling request");
                } else if err.code().is_contention() {
                    tracing::debug!(
                        code = %err.code(),
                        ttl_remaining_sec = err.ttl_remaining_sec(),
                        "Refused under contention"
                    );
                }
                err.to_body()
            }
            Self::SessionNotFound => ErrorBody::new(ErrorCode::SessionNotFound, self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
