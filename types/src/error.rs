//! Closed error vocabulary shared by the coordinator, the HTTP surface and
//! the client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::IdError;

/// Message substituted for `internal` errors on the wire. The real cause is
/// logged server-side only.
pub const GENERIC_INTERNAL_MESSAGE: &str = "internal error";

/// Wire error codes.
///
/// The first nine mirror [`CoordError`] one-to-one. `SessionNotFound` is only
/// produced by the eligibility lookup when a session id resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    CartridgeInUse,
    ActiveSessionElsewhere,
    SessionStillActive,
    SessionExpired,
    LockExpired,
    WalletSessionLimitExceeded,
    BadRequest,
    Unauthorized,
    Internal,
    SessionNotFound,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CartridgeInUse => "cartridge_in_use",
            Self::ActiveSessionElsewhere => "active_session_elsewhere",
            Self::SessionStillActive => "session_still_active",
            Self::SessionExpired => "session_expired",
            Self::LockExpired => "lock_expired",
            Self::WalletSessionLimitExceeded => "wallet_session_limit_exceeded",
            Self::BadRequest => "bad_request",
            Self::Unauthorized => "unauthorized",
            Self::Internal => "internal",
            Self::SessionNotFound => "session_not_found",
        }
    }

    /// Contention the caller may retry after waiting. `bad_request` and
    /// `unauthorized` must never be retried verbatim.
    #[must_use]
    pub const fn is_contention(self) -> bool {
        matches!(
            self,
            Self::CartridgeInUse
                | Self::ActiveSessionElsewhere
                | Self::SessionStillActive
                | Self::WalletSessionLimitExceeded
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a lock, session or job operation can be refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordError {
    #[error("cartridge is locked by another wallet ({ttl_remaining_sec}s remaining)")]
    CartridgeInUse { ttl_remaining_sec: u64 },
    #[error("another wallet has a live session on this cartridge ({ttl_remaining_sec}s remaining)")]
    ActiveSessionElsewhere { ttl_remaining_sec: u64 },
    #[error("this wallet already has a live session on this cartridge ({ttl_remaining_sec}s remaining)")]
    SessionStillActive { ttl_remaining_sec: u64 },
    #[error("session expired")]
    SessionExpired,
    #[error("ownership lock expired")]
    LockExpired,
    #[error("wallet already holds {limit} live sessions")]
    WalletSessionLimitExceeded { limit: u32, ttl_remaining_sec: u64 },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CartridgeInUse { .. } => ErrorCode::CartridgeInUse,
            Self::ActiveSessionElsewhere { .. } => ErrorCode::ActiveSessionElsewhere,
            Self::SessionStillActive { .. } => ErrorCode::SessionStillActive,
            Self::SessionExpired => ErrorCode::SessionExpired,
            Self::LockExpired => ErrorCode::LockExpired,
            Self::WalletSessionLimitExceeded { .. } => ErrorCode::WalletSessionLimitExceeded,
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    #[must_use]
    pub const fn ttl_remaining_sec(&self) -> Option<u64> {
        match self {
            Self::CartridgeInUse { ttl_remaining_sec }
            | Self::ActiveSessionElsewhere { ttl_remaining_sec }
            | Self::SessionStillActive { ttl_remaining_sec }
            | Self::WalletSessionLimitExceeded {
                ttl_remaining_sec, ..
            } => Some(*ttl_remaining_sec),
            _ => None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Wire body. Internal causes are replaced with a generic message.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            Self::Internal(_) => GENERIC_INTERNAL_MESSAGE.to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code(),
            message: Some(message),
            ttl_remaining_sec: self.ttl_remaining_sec(),
        }
    }
}

impl From<IdError> for CoordError {
    fn from(err: IdError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

/// `{code, message?, ttlRemainingSec?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_remaining_sec: Option<u64>,
}

impl ErrorBody {
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            ttl_remaining_sec: None,
        }
    }
}
