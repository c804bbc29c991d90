//! JSON request and response bodies (camelCase on the wire).
//!
//! Requests carry raw strings and are validated with `parse`, so malformed
//! identifiers surface as `bad_request` rather than as a framework-level
//! deserialization rejection.

use serde::{Deserialize, Serialize};

use crate::error::CoordError;
use crate::ids::{Address, CartridgeKey, JobId, SessionId, TokenId, WalletAddress};

/// Token ids arrive as JSON strings or numbers depending on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenIdInput {
    Text(String),
    Number(u64),
}

impl TokenIdInput {
    fn parse(&self) -> Result<TokenId, CoordError> {
        match self {
            Self::Text(raw) => Ok(TokenId::parse(raw)?),
            Self::Number(n) => Ok(TokenId::from(*n)),
        }
    }
}

/// Body shared by `session/open`, `session/heartbeat` and `session/stop`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub wallet: String,
    pub chain_id: u64,
    pub contract: String,
    pub token_id: TokenIdInput,
    pub session_id: String,
    /// `session/stop` only: also release the caller's ownership lock.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub release: bool,
}

/// Validated form of [`SessionRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub wallet: WalletAddress,
    pub cartridge: CartridgeKey,
    pub session_id: SessionId,
}

impl SessionRequest {
    pub fn parse(&self) -> Result<SessionTarget, CoordError> {
        let wallet = Address::parse(&self.wallet)?;
        let token_id = self.token_id.parse()?;
        let cartridge = CartridgeKey::parse(self.chain_id, &self.contract, token_id.as_str())?;
        let session_id = SessionId::parse(&self.session_id)?;
        Ok(SessionTarget {
            wallet,
            cartridge,
            session_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionResponse {
    pub token_id: TokenId,
    pub session_id: SessionId,
    pub owner_wallet: WalletAddress,
    pub ownership_ttl_sec: u64,
    pub session_ttl_sec: u64,
    /// Unix seconds at which the ownership lock lapses without refresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_exp: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub session_ttl_sec: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// Verdict of the eligibility gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    pub wait_ms: u64,
}

impl Eligibility {
    #[must_use]
    pub fn ready() -> Self {
        Self {
            eligible: true,
            wait_ms: 0,
        }
    }

    #[must_use]
    pub fn wait(wait_ms: u64) -> Self {
        Self {
            eligible: wait_ms == 0,
            wait_ms,
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        if self.eligible {
            "ready for a new job".to_string()
        } else {
            format!("next job available in {}s", self.wait_ms.div_ceil(1000))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityResponse {
    pub eligible: bool,
    pub wait_ms: u64,
    pub message: String,
}

impl From<Eligibility> for EligibilityResponse {
    fn from(verdict: Eligibility) -> Self {
        Self {
            eligible: verdict.eligible,
            wait_ms: verdict.wait_ms,
            message: verdict.message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub session_id: String,
    pub job_id: String,
    pub nonce: String,
}

/// Validated claim handed to the settlement boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub ok: bool,
    pub job_id: JobId,
    pub session_id: SessionId,
    pub nonce: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn request(token: TokenIdInput) -> SessionRequest {
        SessionRequest {
            wallet: "0x00000000000000000000000000000000000000BB".into(),
            chain_id: 33139,
            contract: "0x00000000000000000000000000000000000000AA".into(),
            token_id: token,
            session_id: "tab-1".into(),
            release: false,
        }
    }

    #[test]
    fn token_id_accepts_string_or_number() {
        let json = serde_json::json!({
            "wallet": "0x00000000000000000000000000000000000000bb",
            "chainId": 33139,
            "contract": "0x00000000000000000000000000000000000000aa",
            "tokenId": 42,
            "sessionId": "tab-1"
        });
        let from_number: SessionRequest = serde_json::from_value(json).unwrap();
        let from_text = request(TokenIdInput::Text("42".into()));
        assert_eq!(from_number.parse().unwrap(), from_text.parse().unwrap());
        assert!(!from_number.release);
    }

    #[test]
    fn malformed_ids_are_bad_request() {
        let mut req = request(TokenIdInput::Number(1));
        req.wallet = "not-a-wallet".into();
        assert_eq!(req.parse().unwrap_err().code(), ErrorCode::BadRequest);

        let mut req = request(TokenIdInput::Number(1));
        req.session_id = String::new();
        assert_eq!(req.parse().unwrap_err().code(), ErrorCode::BadRequest);
    }

    #[test]
    fn eligibility_message() {
        assert_eq!(Eligibility::ready().message(), "ready for a new job");
        let wait = Eligibility::wait(14_200);
        assert!(!wait.eligible);
        assert_eq!(wait.message(), "next job available in 15s");
    }
}
