//! Job issuance, cadence gating and claim bookkeeping.
//!
//! Per (wallet, cartridge) a job moves `NoJob -> Active -> (Expired | Claimed)`.
//! Only the newest job per cartridge is remembered; issuing a new one
//! supersedes the previous job instead of mutating it.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use cartlock_types::{
    CartridgeKey, CoordError, Eligibility, JobId, JobState, MiningJob, Session, SessionId,
    UnixMillis, WalletAddress,
};

use crate::clock::SharedClock;
use crate::difficulty::difficulty_for_epoch;

/// Result of an issue attempt. Throttling is a verdict, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Issued(MiningJob),
    Throttled(Eligibility),
}

#[derive(Debug, Clone)]
struct IssuedJob {
    job: MiningJob,
    wallet: WalletAddress,
    session_id: SessionId,
    state: JobState,
}

#[derive(Debug, Default)]
struct IssuerState {
    last_issued: HashMap<(WalletAddress, CartridgeKey), UnixMillis>,
    current: HashMap<CartridgeKey, IssuedJob>,
}

pub struct JobIssuer {
    job_ttl: Duration,
    min_interval: Duration,
    clock: SharedClock,
    state: Mutex<IssuerState>,
}

impl JobIssuer {
    #[must_use]
    pub fn new(job_ttl: Duration, min_interval: Duration, clock: SharedClock) -> Self {
        Self {
            job_ttl,
            min_interval,
            clock,
            state: Mutex::new(IssuerState::default()),
        }
    }

    fn wait_ms(&self, last: Option<UnixMillis>, now: UnixMillis) -> u64 {
        let Some(last) = last else {
            return 0;
        };
        let remaining = self.min_interval.saturating_sub(now.saturating_since(last));
        u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX)
    }

    /// Cadence verdict for `wallet` on `cartridge`.
    #[must_use]
    pub fn can_issue(&self, wallet: &WalletAddress, cartridge: &CartridgeKey) -> Eligibility {
        let now = self.clock.now();
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let last = state
            .last_issued
            .get(&(wallet.clone(), cartridge.clone()))
            .copied();
        Eligibility::wait(self.wait_ms(last, now))
    }

    /// Issue a job to `session` if its cadence gate is open.
    ///
    /// The gate check and the `last_issued` update happen under one lock,
    /// so two racing requests cannot both pass the gate. Callers must have
    /// already verified session and ownership liveness.
    pub fn issue(&self, session: &Session, epoch: i64) -> IssueOutcome {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let pair = (session.wallet.clone(), session.cartridge.clone());
        let wait_ms = self.wait_ms(state.last_issued.get(&pair).copied(), now);
        if wait_ms > 0 {
            return IssueOutcome::Throttled(Eligibility::wait(wait_ms));
        }

        let min_interval = self.min_interval;
        state
            .last_issued
            .retain(|_, at| now.saturating_since(*at) < min_interval);
        state.current.retain(|_, issued| !issued.job.is_expired(now));

        let job = self.build_job(&session.cartridge, epoch, now);
        state.last_issued.insert(pair, now);
        state.current.insert(
            session.cartridge.clone(),
            IssuedJob {
                job: job.clone(),
                wallet: session.wallet.clone(),
                session_id: session.id.clone(),
                state: JobState::Active,
            },
        );
        IssueOutcome::Issued(job)
    }

    fn build_job(&self, cartridge: &CartridgeKey, epoch: i64, now: UnixMillis) -> MiningJob {
        let difficulty = difficulty_for_epoch(epoch);
        let job_id = JobId::new(Uuid::new_v4().to_string());

        let mut hasher = Sha256::new();
        hasher.update(cartridge.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(job_id.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(now.as_millis().to_be_bytes());
        hasher.update(epoch.to_be_bytes());
        let data_payload =
            hasher
                .finalize()
                .iter()
                .fold(String::with_capacity(64), |mut hex, byte| {
                    let _ = write!(hex, "{byte:02x}");
                    hex
                });

        MiningJob {
            job_id,
            cartridge: cartridge.clone(),
            data_payload,
            display_suffix: difficulty.display_suffix(),
            difficulty_rule: difficulty.rule,
            epoch,
            issued_at: now,
            ttl_ms: u64::try_from(self.job_ttl.as_millis()).unwrap_or(u64::MAX),
            expires_at: now.saturating_add(self.job_ttl),
        }
    }

    /// Mark the current job for `session`'s cartridge as claimed.
    ///
    /// Unknown, superseded, expired and already-claimed jobs are all
    /// `bad_request`: retrying the same claim can never succeed.
    pub fn claim(&self, session: &Session, job_id: &JobId) -> Result<MiningJob, CoordError> {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(issued) = state.current.get_mut(&session.cartridge) else {
            return Err(CoordError::bad_request(format!("unknown job {job_id}")));
        };
        if issued.job.job_id != *job_id {
            return Err(CoordError::bad_request(format!(
                "job {job_id} is unknown or superseded"
            )));
        }
        if issued.wallet != session.wallet || issued.session_id != session.id {
            return Err(CoordError::bad_request(format!(
                "job {job_id} was issued to another session"
            )));
        }
        if issued.job.is_expired(now) {
            return Err(CoordError::bad_request(format!("job {job_id} has expired")));
        }
        if issued.state == JobState::Claimed {
            return Err(CoordError::bad_request(format!(
                "job {job_id} was already claimed"
            )));
        }
        issued.state = JobState::Claimed;
        Ok(issued.job.clone())
    }

    /// Drop the current job for `cartridge` if it belongs to `wallet`.
    pub fn forget(&self, cartridge: &CartridgeKey, wallet: &WalletAddress) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state
            .current
            .get(cartridge)
            .is_some_and(|issued| issued.wallet == *wallet)
        {
            state.current.remove(cartridge);
        }
    }

    /// Current job for `cartridge`, with its derived state.
    #[must_use]
    pub fn current(&self, cartridge: &CartridgeKey) -> Option<(MiningJob, JobState)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .current
            .get(cartridge)
            .map(|issued| (issued.job.clone(), issued.state))
    }
}
