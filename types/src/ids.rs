use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern is valid"));

static SESSION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("session id pattern is valid"));

/// Longest decimal rendering of a uint256.
const MAX_TOKEN_ID_DIGITS: usize = 78;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("address must be 0x followed by 40 hex digits (got {0:?})")]
    Address(String),
    #[error("token id must be a decimal integer of at most 78 digits (got {0:?})")]
    TokenId(String),
    #[error("chain id must be a positive integer")]
    ChainId,
    #[error("session id must be 1-128 characters of [A-Za-z0-9_-] (got {0:?})")]
    SessionId(String),
}

/// EVM address, stored lower-case so `0xABC…` and `0xabc…` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let trimmed = raw.trim();
        if !ADDRESS_RE.is_match(trimmed) {
            return Err(IdError::Address(raw.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wallets and contracts share the address format; the aliases keep
/// signatures readable.
pub type WalletAddress = Address;
pub type ContractAddress = Address;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ChainId(u64);

impl ChainId {
    pub fn new(id: u64) -> Result<Self, IdError> {
        if id == 0 {
            return Err(IdError::ChainId);
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for ChainId {
    type Error = IdError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ChainId> for u64 {
    fn from(value: ChainId) -> Self {
        value.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ERC-721 token id in canonical decimal form (no leading zeros).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenId(String);

impl TokenId {
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_TOKEN_ID_DIGITS
            || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(IdError::TokenId(raw.to_string()));
        }
        let canonical = trimmed.trim_start_matches('0');
        let canonical = if canonical.is_empty() { "0" } else { canonical };
        Ok(Self(canonical.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TokenId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TokenId> for String {
    fn from(value: TokenId) -> Self {
        value.0
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a cartridge: `(chainId, contractAddress, tokenId)`.
///
/// Every component is normalized at construction, so two keys built from
/// differently-cased input hash to the same lock slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartridgeKey {
    chain_id: ChainId,
    contract: ContractAddress,
    token_id: TokenId,
}

impl CartridgeKey {
    #[must_use]
    pub fn new(chain_id: ChainId, contract: ContractAddress, token_id: TokenId) -> Self {
        Self {
            chain_id,
            contract,
            token_id,
        }
    }

    pub fn parse(chain_id: u64, contract: &str, token_id: &str) -> Result<Self, IdError> {
        Ok(Self::new(
            ChainId::new(chain_id)?,
            Address::parse(contract)?,
            TokenId::parse(token_id)?,
        ))
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    #[must_use]
    pub fn contract(&self) -> &ContractAddress {
        &self.contract
    }

    #[must_use]
    pub fn token_id(&self) -> &TokenId {
        &self.token_id
    }
}

impl fmt::Display for CartridgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.chain_id, self.contract, self.token_id)
    }
}

/// Client-chosen session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(raw: &str) -> Result<Self, IdError> {
        if !SESSION_ID_RE.is_match(raw) {
            return Err(IdError::SessionId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(value: SessionId) -> Self {
        value.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Server-assigned job identifier (UUID v4 text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "0xABCdef0123456789abcdef0123456789ABCDEF01";

    #[test]
    fn address_is_case_normalized() {
        let upper = Address::parse(MIXED).unwrap();
        let lower = Address::parse(&MIXED.to_ascii_lowercase()).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "0xabcdef0123456789abcdef0123456789abcdef01");
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("abcdef0123456789abcdef0123456789abcdef0123").is_err());
        assert!(Address::parse("0xZZcdef0123456789abcdef0123456789abcdef01").is_err());
    }

    #[test]
    fn token_id_strips_leading_zeros() {
        assert_eq!(TokenId::parse("0042").unwrap().as_str(), "42");
        assert_eq!(TokenId::parse("000").unwrap().as_str(), "0");
        assert!(TokenId::parse("-1").is_err());
        assert!(TokenId::parse("").is_err());
        assert!(TokenId::parse(&"9".repeat(79)).is_err());
    }

    #[test]
    fn chain_id_rejects_zero() {
        assert_eq!(ChainId::new(0), Err(IdError::ChainId));
        assert_eq!(ChainId::new(33139).unwrap().value(), 33139);
    }

    #[test]
    fn cartridge_keys_from_different_casing_are_equal() {
        let a = CartridgeKey::parse(33139, MIXED, "42").unwrap();
        let b = CartridgeKey::parse(33139, &MIXED.to_ascii_lowercase(), "042").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.to_string(),
            "33139:0xabcdef0123456789abcdef0123456789abcdef01:42"
        );
    }

    #[test]
    fn session_id_charset() {
        assert!(SessionId::parse("tab-1_A").is_ok());
        assert!(SessionId::parse("").is_err());
        assert!(SessionId::parse("has space").is_err());
        assert!(SessionId::parse(&"x".repeat(129)).is_err());
    }

    #[test]
    fn address_deserialize_validates() {
        let ok: Result<Address, _> = serde_json::from_str(&format!("\"{MIXED}\""));
        assert!(ok.is_ok());
        let bad: Result<Address, _> = serde_json::from_str("\"0xnope\"");
        assert!(bad.is_err());
    }
}
