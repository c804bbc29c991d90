//! Lock, session and job records.
//!
//! Liveness is a pure function of a record and the current time; stores
//! evaluate it lazily on access instead of sweeping.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::difficulty::DifficultyRule;
use crate::ids::{CartridgeKey, JobId, SessionId, WalletAddress};
use crate::time::{UnixMillis, secs_until};

/// Exclusive, long-lived claim on a cartridge by one wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipLock {
    pub cartridge: CartridgeKey,
    pub wallet: WalletAddress,
    pub acquired_at: UnixMillis,
    pub ttl: Duration,
}

impl OwnershipLock {
    #[must_use]
    pub fn expires_at(&self) -> UnixMillis {
        self.acquired_at.saturating_add(self.ttl)
    }

    /// Live while `now - acquired_at <= ttl`.
    #[must_use]
    pub fn is_live(&self, now: UnixMillis) -> bool {
        now.saturating_since(self.acquired_at) <= self.ttl
    }

    #[must_use]
    pub fn ttl_remaining_sec(&self, now: UnixMillis) -> u64 {
        secs_until(now, self.expires_at())
    }
}

/// Short-lived presence record refreshed by heartbeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub cartridge: CartridgeKey,
    pub wallet: WalletAddress,
    pub last_heartbeat_at: UnixMillis,
    pub ttl: Duration,
}

impl Session {
    #[must_use]
    pub fn expires_at(&self) -> UnixMillis {
        self.last_heartbeat_at.saturating_add(self.ttl)
    }

    /// Live while `now - last_heartbeat_at <= ttl`, with no extra grace.
    #[must_use]
    pub fn is_live(&self, now: UnixMillis) -> bool {
        now.saturating_since(self.last_heartbeat_at) <= self.ttl
    }

    #[must_use]
    pub fn ttl_remaining_sec(&self, now: UnixMillis) -> u64 {
        secs_until(now, self.expires_at())
    }
}

/// Unit of proof-of-work handed to the session currently mining a cartridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiningJob {
    pub job_id: JobId,
    pub cartridge: CartridgeKey,
    /// Hex seed defining the nonce space for this job.
    pub data_payload: String,
    pub difficulty_rule: DifficultyRule,
    /// Legacy nibble rendering of `difficulty_rule`.
    pub display_suffix: String,
    pub epoch: i64,
    pub issued_at: UnixMillis,
    pub ttl_ms: u64,
    pub expires_at: UnixMillis,
}

impl MiningJob {
    #[must_use]
    pub fn is_expired(&self, now: UnixMillis) -> bool {
        now > self.expires_at
    }
}

/// Lifecycle of an issued job. `Expired` is derived from time, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Active,
    Claimed,
}
