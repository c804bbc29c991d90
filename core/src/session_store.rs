//! Liveness sessions refreshed by heartbeats.
//!
//! Like ownership locks, sessions expire lazily. `open` already walks the
//! whole map to enforce the per-wallet limit, so it also drops any dead
//! entries it passes over.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use cartlock_types::{CartridgeKey, CoordError, Session, SessionId, UnixMillis, WalletAddress};

use crate::clock::SharedClock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session: Session,
    /// The same session id was already live and only had its TTL reset.
    pub renewed: bool,
}

pub trait SessionStore: Send + Sync {
    /// Register `id` as `wallet`'s live session on `cartridge`.
    ///
    /// The caller is responsible for holding (or being granted in the same
    /// step) the ownership lock on `cartridge`.
    fn open(
        &self,
        id: &SessionId,
        cartridge: &CartridgeKey,
        wallet: &WalletAddress,
    ) -> Result<SessionGrant, CoordError>;

    /// Reset the session TTL. `session_expired` if `id` is not live.
    fn heartbeat(&self, id: &SessionId) -> Result<Session, CoordError>;

    /// Delete unconditionally. Returns the removed record, live or not.
    fn stop(&self, id: &SessionId) -> Option<Session>;

    /// Live session by id.
    fn get(&self, id: &SessionId) -> Option<Session>;

    /// `wallet`'s live session on `cartridge`, whatever its id.
    fn find_live(&self, cartridge: &CartridgeKey, wallet: &WalletAddress) -> Option<Session>;

    fn is_live(&self, id: &SessionId) -> bool {
        self.get(id).is_some()
    }

    fn ttl(&self) -> Duration;
}

pub struct InMemorySessionStore {
    ttl: Duration,
    max_per_wallet: u32,
    clock: SharedClock,
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new(ttl: Duration, max_per_wallet: u32, clock: SharedClock) -> Self {
        Self {
            ttl,
            max_per_wallet,
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn check_conflicts(
        &self,
        sessions: &HashMap<SessionId, Session>,
        id: &SessionId,
        cartridge: &CartridgeKey,
        wallet: &WalletAddress,
        now: UnixMillis,
    ) -> Result<(), CoordError> {
        let mut wallet_live = 0u32;
        let mut soonest_wallet_expiry: Option<u64> = None;

        for session in sessions.values() {
            if session.id == *id {
                continue;
            }
            if session.cartridge == *cartridge {
                if session.wallet != *wallet {
                    return Err(CoordError::ActiveSessionElsewhere {
                        ttl_remaining_sec: session.ttl_remaining_sec(now),
                    });
                }
                return Err(CoordError::SessionStillActive {
                    ttl_remaining_sec: session.ttl_remaining_sec(now),
                });
            }
            if session.wallet == *wallet {
                wallet_live += 1;
                let remaining = session.ttl_remaining_sec(now);
                soonest_wallet_expiry =
                    Some(soonest_wallet_expiry.map_or(remaining, |s| s.min(remaining)));
            }
        }

        if wallet_live >= self.max_per_wallet {
            return Err(CoordError::WalletSessionLimitExceeded {
                limit: self.max_per_wallet,
                ttl_remaining_sec: soonest_wallet_expiry.unwrap_or(0),
            });
        }
        Ok(())
    }
}

impl SessionStore for InMemorySessionStore {
    fn open(
        &self,
        id: &SessionId,
        cartridge: &CartridgeKey,
        wallet: &WalletAddress,
    ) -> Result<SessionGrant, CoordError> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, session| session.is_live(now));

        if let Some(existing) = sessions.get_mut(id) {
            if existing.wallet != *wallet || existing.cartridge != *cartridge {
                return Err(CoordError::bad_request(format!(
                    "session id {id} is already bound to another wallet or cartridge"
                )));
            }
            existing.last_heartbeat_at = now;
            return Ok(SessionGrant {
                session: existing.clone(),
                renewed: true,
            });
        }

        self.check_conflicts(&sessions, id, cartridge, wallet, now)?;

        let session = Session {
            id: id.clone(),
            cartridge: cartridge.clone(),
            wallet: wallet.clone(),
            last_heartbeat_at: now,
            ttl: self.ttl,
        };
        sessions.insert(id.clone(), session.clone());
        Ok(SessionGrant {
            session,
            renewed: false,
        })
    }

    fn heartbeat(&self, id: &SessionId) -> Result<Session, CoordError> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(session) = sessions.get_mut(id) else {
            return Err(CoordError::SessionExpired);
        };
        if !session.is_live(now) {
            sessions.remove(id);
            return Err(CoordError::SessionExpired);
        }
        session.last_heartbeat_at = now;
        Ok(session.clone())
    }

    fn stop(&self, id: &SessionId) -> Option<Session> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    fn get(&self, id: &SessionId) -> Option<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let live = sessions.get(id).map(|session| session.is_live(now))?;
        if live {
            sessions.get(id).cloned()
        } else {
            sessions.remove(id);
            None
        }
    }

    fn find_live(&self, cartridge: &CartridgeKey, wallet: &WalletAddress) -> Option<Session> {
        let now = self.clock.now();
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .find(|s| s.cartridge == *cartridge && s.wallet == *wallet && s.is_live(now))
            .cloned()
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
