//! Ownership locks: one wallet per cartridge for a long TTL.
//!
//! Expiry is lazy. A lock past its TTL stays in the map until the next
//! operation on the same cartridge notices and replaces or drops it. The
//! cartridge pool is small and bounded, so idle entries cost little.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use cartlock_types::{CartridgeKey, CoordError, OwnershipLock, WalletAddress};

use crate::clock::SharedClock;

/// Outcome of a successful [`LockStore::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGrant {
    pub lock: OwnershipLock,
    /// The caller already held the lock and its TTL clock was reset.
    pub renewed: bool,
}

/// Exclusive TTL lock keyed by cartridge.
///
/// Implementations must make each call atomic per cartridge: two concurrent
/// `acquire`s by different wallets may not both succeed. A multi-replica
/// deployment backs this with an external set-if-absent-with-TTL store.
pub trait LockStore: Send + Sync {
    /// Grant or renew the lock. Fails with `cartridge_in_use` while another
    /// wallet holds a live lock.
    fn acquire(
        &self,
        cartridge: &CartridgeKey,
        wallet: &WalletAddress,
    ) -> Result<LockGrant, CoordError>;

    /// Reset the TTL of `wallet`'s own lock. `false` means the lock is lost.
    fn refresh(&self, cartridge: &CartridgeKey, wallet: &WalletAddress) -> bool;

    /// Drop `wallet`'s own lock; a no-op for anyone else's.
    fn release(&self, cartridge: &CartridgeKey, wallet: &WalletAddress);

    /// Live lock on `cartridge`, if any.
    fn holder(&self, cartridge: &CartridgeKey) -> Option<OwnershipLock>;

    fn ttl(&self) -> Duration;
}

pub struct InMemoryLockStore {
    ttl: Duration,
    clock: SharedClock,
    locks: Mutex<HashMap<CartridgeKey, OwnershipLock>>,
}

impl InMemoryLockStore {
    #[must_use]
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            ttl,
            clock,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Entries still in the map, live or not. Exposed for tests of lazy expiry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LockStore for InMemoryLockStore {
    fn acquire(
        &self,
        cartridge: &CartridgeKey,
        wallet: &WalletAddress,
    ) -> Result<LockGrant, CoordError> {
        let now = self.clock.now();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        let renewed = match locks.get(cartridge) {
            Some(existing) if existing.is_live(now) => {
                if existing.wallet != *wallet {
                    return Err(CoordError::CartridgeInUse {
                        ttl_remaining_sec: existing.ttl_remaining_sec(now),
                    });
                }
                true
            }
            Some(stale) => {
                tracing::debug!(
                    cartridge = %cartridge,
                    previous = %stale.wallet,
                    "Replacing expired ownership lock"
                );
                false
            }
            None => false,
        };

        let lock = OwnershipLock {
            cartridge: cartridge.clone(),
            wallet: wallet.clone(),
            acquired_at: now,
            ttl: self.ttl,
        };
        locks.insert(cartridge.clone(), lock.clone());
        Ok(LockGrant { lock, renewed })
    }

    fn refresh(&self, cartridge: &CartridgeKey, wallet: &WalletAddress) -> bool {
        let now = self.clock.now();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(lock) = locks.get_mut(cartridge) else {
            return false;
        };
        if !lock.is_live(now) {
            locks.remove(cartridge);
            return false;
        }
        if lock.wallet != *wallet {
            return false;
        }
        lock.acquired_at = now;
        true
    }

    fn release(&self, cartridge: &CartridgeKey, wallet: &WalletAddress) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(cartridge).is_some_and(|lock| lock.wallet == *wallet) {
            locks.remove(cartridge);
        }
    }

    fn holder(&self, cartridge: &CartridgeKey) -> Option<OwnershipLock> {
        let now = self.clock.now();
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let live = locks.get(cartridge).map(|lock| lock.is_live(now))?;
        if live {
            locks.get(cartridge).cloned()
        } else {
            locks.remove(cartridge);
            None
        }
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
