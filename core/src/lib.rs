//! Cartridge ownership and mining-job coordination.
//!
//! Stores are injected behind [`LockStore`] and [`SessionStore`] so a
//! multi-replica deployment can swap the in-memory maps for a shared
//! TTL store without touching [`Coordinator`].

pub mod clock;
mod coordinator;
pub mod difficulty;
pub mod epoch;
mod jobs;
pub mod lock_store;
pub mod session_store;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use coordinator::Coordinator;
pub use difficulty::{difficulty_for_epoch, expected_attempts};
pub use epoch::{EpochSource, FixedEpoch, ScheduledEpoch, epoch_source};
pub use jobs::{IssueOutcome, JobIssuer};
pub use lock_store::{InMemoryLockStore, LockGrant, LockStore};
pub use session_store::{InMemorySessionStore, SessionGrant, SessionStore};
