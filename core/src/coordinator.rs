//! Request-level operations composed from the lock store, session store and
//! job issuer. This is the eligibility gate: every job or claim path checks
//! session liveness and lock ownership before touching job state.

use std::sync::Arc;

use cartlock_config::Policy;
use cartlock_types::{
    CartridgeKey, CoordError, Eligibility, HeartbeatResponse, JobId, MiningJob, OkResponse,
    OpenSessionResponse, Session, SessionId, SessionTarget, WalletAddress,
};

use crate::clock::SharedClock;
use crate::difficulty::expected_attempts;
use crate::epoch::EpochSource;
use crate::jobs::{IssueOutcome, JobIssuer};
use crate::lock_store::{InMemoryLockStore, LockStore};
use crate::session_store::{InMemorySessionStore, SessionStore};

pub struct Coordinator {
    locks: Arc<dyn LockStore>,
    sessions: Arc<dyn SessionStore>,
    jobs: JobIssuer,
    epochs: Arc<dyn EpochSource>,
    clock: SharedClock,
}

impl Coordinator {
    /// Single-instance coordinator backed by in-process stores.
    #[must_use]
    pub fn in_memory(policy: Policy, epochs: Arc<dyn EpochSource>, clock: SharedClock) -> Self {
        let locks = Arc::new(InMemoryLockStore::new(policy.ownership_ttl, clock.clone()));
        let sessions = Arc::new(InMemorySessionStore::new(
            policy.session_ttl,
            policy.max_sessions_per_wallet,
            clock.clone(),
        ));
        let jobs = JobIssuer::new(policy.job_ttl, policy.min_job_interval, clock.clone());
        Self::with_stores(locks, sessions, jobs, epochs, clock)
    }

    #[must_use]
    pub fn with_stores(
        locks: Arc<dyn LockStore>,
        sessions: Arc<dyn SessionStore>,
        jobs: JobIssuer,
        epochs: Arc<dyn EpochSource>,
        clock: SharedClock,
    ) -> Self {
        Self {
            locks,
            sessions,
            jobs,
            epochs,
            clock,
        }
    }

    /// Acquire (or renew) the ownership lock, then open the session.
    ///
    /// A lock granted by this call is released again if the session step
    /// fails, unless the wallet has a live session on the cartridge by then.
    /// A renewed lock is kept.
    pub fn open_session(&self, target: &SessionTarget) -> Result<OpenSessionResponse, CoordError> {
        let grant = self
            .locks
            .acquire(&target.cartridge, &target.wallet)
            .inspect_err(|err| {
                tracing::debug!(
                    cartridge = %target.cartridge,
                    wallet = %target.wallet,
                    error = %err,
                    "Ownership lock refused"
                );
            })?;

        let session = match self
            .sessions
            .open(&target.session_id, &target.cartridge, &target.wallet)
        {
            Ok(session) => session,
            Err(err) => {
                // A concurrent open by the same wallet may have renewed this
                // lock and registered its own session in the meantime.
                if !grant.renewed
                    && self
                        .sessions
                        .find_live(&target.cartridge, &target.wallet)
                        .is_none()
                {
                    self.locks.release(&target.cartridge, &target.wallet);
                }
                tracing::debug!(
                    cartridge = %target.cartridge,
                    wallet = %target.wallet,
                    session_id = %target.session_id,
                    error = %err,
                    "Session open refused"
                );
                return Err(err);
            }
        };

        tracing::info!(
            cartridge = %target.cartridge,
            wallet = %target.wallet,
            session_id = %target.session_id,
            lock_renewed = grant.renewed,
            session_renewed = session.renewed,
            "Session opened"
        );

        Ok(OpenSessionResponse {
            token_id: target.cartridge.token_id().clone(),
            session_id: target.session_id.clone(),
            owner_wallet: grant.lock.wallet.clone(),
            ownership_ttl_sec: self.locks.ttl().as_secs(),
            session_ttl_sec: self.sessions.ttl().as_secs(),
            ownership_exp: Some(grant.lock.expires_at().as_secs()),
        })
    }

    /// Refresh the session and the ownership lock behind it.
    pub fn heartbeat(&self, target: &SessionTarget) -> Result<HeartbeatResponse, CoordError> {
        let session = self.live_session_for(target)?;

        self.sessions.heartbeat(&session.id)?;
        if !self.locks.refresh(&session.cartridge, &session.wallet) {
            self.sessions.stop(&session.id);
            self.jobs.forget(&session.cartridge, &session.wallet);
            tracing::info!(
                cartridge = %session.cartridge,
                wallet = %session.wallet,
                session_id = %session.id,
                "Ownership lock lost; session ended"
            );
            return Err(CoordError::LockExpired);
        }

        Ok(HeartbeatResponse {
            session_ttl_sec: self.sessions.ttl().as_secs(),
        })
    }

    /// End the session. With `release`, also give up the ownership lock,
    /// unless the wallet still has another live session on the cartridge.
    pub fn stop_session(
        &self,
        target: &SessionTarget,
        release: bool,
    ) -> Result<OkResponse, CoordError> {
        if let Some(live) = self.sessions.get(&target.session_id) {
            if live.wallet != target.wallet {
                return Err(CoordError::Unauthorized(
                    "session belongs to another wallet".into(),
                ));
            }
            if live.cartridge != target.cartridge {
                return Err(CoordError::bad_request(format!(
                    "session {} is bound to cartridge {}",
                    live.id, live.cartridge
                )));
            }
        }
        let stopped = self.sessions.stop(&target.session_id);

        let released = release
            && self
                .sessions
                .find_live(&target.cartridge, &target.wallet)
                .is_none();
        if released {
            self.locks.release(&target.cartridge, &target.wallet);
            self.jobs.forget(&target.cartridge, &target.wallet);
        }

        tracing::info!(
            cartridge = %target.cartridge,
            wallet = %target.wallet,
            session_id = %target.session_id,
            existed = stopped.is_some(),
            released,
            "Session stopped"
        );
        Ok(OkResponse { ok: true })
    }

    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.sessions.get(id)
    }

    #[must_use]
    pub fn is_live(&self, id: &SessionId) -> bool {
        self.sessions.is_live(id)
    }

    /// Cadence-only verdict for a wallet/cartridge pair.
    #[must_use]
    pub fn can_issue_job(&self, wallet: &WalletAddress, cartridge: &CartridgeKey) -> Eligibility {
        self.jobs.can_issue(wallet, cartridge)
    }

    /// Full eligibility for a session. `Ok(None)` when the session id does
    /// not resolve to a live session.
    pub fn eligibility(&self, id: &SessionId) -> Result<Option<Eligibility>, CoordError> {
        let Some(session) = self.sessions.get(id) else {
            return Ok(None);
        };
        self.ensure_lock(&session)?;
        Ok(Some(self.jobs.can_issue(&session.wallet, &session.cartridge)))
    }

    pub fn request_job(&self, id: &SessionId) -> Result<IssueOutcome, CoordError> {
        let session = self.sessions.get(id).ok_or(CoordError::SessionExpired)?;
        self.ensure_lock(&session)?;

        let epoch = self.epochs.current_epoch();
        let outcome = self.jobs.issue(&session, epoch);
        match &outcome {
            IssueOutcome::Issued(job) => tracing::info!(
                cartridge = %session.cartridge,
                session_id = %session.id,
                job_id = %job.job_id,
                epoch,
                rule = %job.difficulty_rule,
                expected_attempts = expected_attempts(&job.difficulty_rule),
                "Job issued"
            ),
            IssueOutcome::Throttled(verdict) => tracing::debug!(
                cartridge = %session.cartridge,
                session_id = %session.id,
                wait_ms = verdict.wait_ms,
                "Job request throttled"
            ),
        }
        Ok(outcome)
    }

    /// Re-validate liveness and mark `job_id` claimed, for hand-off to the
    /// settlement boundary.
    pub fn begin_claim(&self, id: &SessionId, job_id: &JobId) -> Result<MiningJob, CoordError> {
        let session = self.sessions.get(id).ok_or(CoordError::SessionExpired)?;
        self.ensure_lock(&session)?;
        let job = self.jobs.claim(&session, job_id)?;
        tracing::info!(
            cartridge = %session.cartridge,
            session_id = %session.id,
            job_id = %job.job_id,
            "Claim accepted for settlement"
        );
        Ok(job)
    }

    fn live_session_for(&self, target: &SessionTarget) -> Result<Session, CoordError> {
        let Some(session) = self.sessions.get(&target.session_id) else {
            if let Some(other) = self.sessions.find_live(&target.cartridge, &target.wallet) {
                return Err(CoordError::SessionStillActive {
                    ttl_remaining_sec: other.ttl_remaining_sec(self.clock.now()),
                });
            }
            return Err(CoordError::SessionExpired);
        };
        if session.wallet != target.wallet {
            return Err(CoordError::Unauthorized(
                "session belongs to another wallet".into(),
            ));
        }
        if session.cartridge != target.cartridge {
            return Err(CoordError::bad_request(format!(
                "session {} is bound to cartridge {}",
                session.id, session.cartridge
            )));
        }
        Ok(session)
    }

    fn ensure_lock(&self, session: &Session) -> Result<(), CoordError> {
        match self.locks.holder(&session.cartridge) {
            Some(lock) if lock.wallet == session.wallet => Ok(()),
            _ => Err(CoordError::LockExpired),
        }
    }
}
