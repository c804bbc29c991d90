//! Core domain types for cartridge locking and mining sessions.
//!
//! This crate contains pure domain and wire types with no IO, no async, and
//! minimal dependencies. Everything here can be used from the server, the
//! client, and tests alike.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod difficulty;
mod error;
mod ids;
mod records;
mod time;
mod wire;

pub use difficulty::{DifficultyRule, EpochDifficulty};
pub use error::{CoordError, ErrorBody, ErrorCode, GENERIC_INTERNAL_MESSAGE};
pub use ids::{
    Address, CartridgeKey, ChainId, ContractAddress, IdError, JobId, SessionId, TokenId,
    WalletAddress,
};
pub use records::{JobState, MiningJob, OwnershipLock, Session};
pub use time::{UnixMillis, secs_until};
pub use wire::{
    ClaimRequest, ClaimResponse, Eligibility, EligibilityResponse, HeartbeatResponse,
    JobRequest, OkResponse, OpenSessionResponse, SessionRequest, SessionTarget, TokenIdInput,
};
