//! Current epoch lookup.

use std::sync::Arc;
use std::time::Duration;

use cartlock_config::EpochPlan;
use cartlock_types::UnixMillis;

use crate::clock::SharedClock;

pub trait EpochSource: Send + Sync {
    fn current_epoch(&self) -> i64;
}

/// Pinned epoch.
#[derive(Debug, Clone, Copy)]
pub struct FixedEpoch(pub i64);

impl EpochSource for FixedEpoch {
    fn current_epoch(&self) -> i64 {
        self.0
    }
}

/// `floor((now - genesis) / length)`; zero before genesis.
pub struct ScheduledEpoch {
    genesis: UnixMillis,
    length: Duration,
    clock: SharedClock,
}

impl ScheduledEpoch {
    #[must_use]
    pub fn new(genesis: UnixMillis, length: Duration, clock: SharedClock) -> Self {
        Self {
            genesis,
            length,
            clock,
        }
    }
}

impl EpochSource for ScheduledEpoch {
    fn current_epoch(&self) -> i64 {
        let length_ms = self.length.as_millis().max(1);
        let elapsed = self.clock.now().saturating_since(self.genesis).as_millis();
        i64::try_from(elapsed / length_ms).unwrap_or(i64::MAX)
    }
}

#[must_use]
pub fn epoch_source(plan: EpochPlan, clock: SharedClock) -> Arc<dyn EpochSource> {
    match plan {
        EpochPlan::Fixed(epoch) => Arc::new(FixedEpoch(epoch)),
        EpochPlan::Scheduled { genesis, length } => {
            Arc::new(ScheduledEpoch::new(genesis, length, clock))
        }
    }
}
