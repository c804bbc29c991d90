//! Client-side heartbeat scheduler.
//!
//! At most one heartbeat call is ever in flight. A tick that finds the
//! previous call still running, or the controller paused for a claim, is
//! skipped rather than queued. Callback failures are logged and counted,
//! never propagated: a missed heartbeat is retried by the next tick, and a
//! session that keeps missing simply expires server-side.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::ClientError;

pub type HeartbeatFut = Pin<Box<dyn Future<Output = Result<(), ClientError>> + Send>>;

/// Produces one heartbeat call per invocation.
pub type HeartbeatFn = Arc<dyn Fn() -> HeartbeatFut + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Fired,
    Failed,
    /// Paused, or another heartbeat was still in flight.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatStats {
    /// Callback invocations, successful or not.
    pub fired: u64,
    /// Invocations that returned an error.
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct Shared {
    in_flight: tokio::sync::Mutex<()>,
    paused: AtomicBool,
    fired: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl Shared {
    async fn tick(&self, callback: &HeartbeatFn) -> TickOutcome {
        if self.paused.load(Ordering::SeqCst) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return TickOutcome::Skipped;
        }
        let Ok(_guard) = self.in_flight.try_lock() else {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return TickOutcome::Skipped;
        };
        // Re-check under the guard: a pause that won the race owns the window.
        if self.paused.load(Ordering::SeqCst) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return TickOutcome::Skipped;
        }

        self.fired.fetch_add(1, Ordering::Relaxed);
        match callback().await {
            Ok(()) => TickOutcome::Fired,
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %err, "Heartbeat failed");
                TickOutcome::Failed
            }
        }
    }
}

#[derive(Default)]
pub struct HeartbeatController {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick every `interval`, first tick one interval from now. Replaces any
    /// loop already running. Must be called inside a tokio runtime.
    pub fn start(&self, callback: HeartbeatFn, interval: Duration) {
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let shared = Arc::clone(&shared);
                let callback = Arc::clone(&callback);
                // Detached so a slow call does not delay the next tick; that
                // tick is skipped by the in-flight guard instead.
                tokio::spawn(async move {
                    shared.tick(&callback).await;
                });
            }
        });

        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
        tracing::debug!(interval_ms = interval.as_millis(), "Heartbeat loop started");
    }

    /// Stop scheduling ticks. A call already in flight runs to completion.
    pub fn stop(&self) {
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
            tracing::debug!("Heartbeat loop stopped");
        }
    }

    /// Block ticks and wait out any heartbeat already in flight. Once this
    /// returns, no heartbeat runs until [`resume_after_claim`].
    ///
    /// [`resume_after_claim`]: Self::resume_after_claim
    pub async fn pause_for_claim(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        drop(self.shared.in_flight.lock().await);
    }

    pub fn resume_after_claim(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    /// Fire one heartbeat now, subject to the same guards as scheduled ticks.
    pub async fn tick_once(&self, callback: &HeartbeatFn) -> TickOutcome {
        self.shared.tick(callback).await
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stats(&self) -> HeartbeatStats {
        HeartbeatStats {
            fired: self.shared.fired.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            skipped: self.shared.skipped.load(Ordering::Relaxed),
        }
    }
}

impl Drop for HeartbeatController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use cartlock_types::{ErrorBody, ErrorCode};
    use tokio::sync::Notify;

    /// Callback that counts calls and peak concurrency, taking `latency` per call.
    struct Probe {
        calls: AtomicUsize,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                current: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            })
        }

        fn callback(self: &Arc<Self>, latency: Duration) -> HeartbeatFn {
            let probe = Arc::clone(self);
            Arc::new(move || -> HeartbeatFut {
                let probe = Arc::clone(&probe);
                Box::pin(async move {
                    probe.calls.fetch_add(1, Ordering::SeqCst);
                    let now = probe.current.fetch_add(1, Ordering::SeqCst) + 1;
                    probe.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(latency).await;
                    probe.current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn failing() -> HeartbeatFn {
        Arc::new(|| -> HeartbeatFut {
            Box::pin(async {
                Err(ClientError::Rejected {
                    status: 410,
                    body: ErrorBody::new(ErrorCode::SessionExpired, "session expired"),
                })
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_interval() {
        let probe = Probe::new();
        let controller = HeartbeatController::new();
        controller.start(probe.callback(Duration::from_millis(10)), Duration::from_secs(20));

        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(probe.calls(), 0);
        tokio::time::sleep(Duration::from_secs(42)).await;
        assert_eq!(probe.calls(), 3);
        assert!(controller.is_running());

        controller.stop();
        assert!(!controller.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(probe.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_is_never_overlapped() {
        let probe = Probe::new();
        let controller = HeartbeatController::new();
        // Each call outlives two ticks.
        controller.start(probe.callback(Duration::from_secs(25)), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(100)).await;
        controller.stop();

        assert_eq!(probe.peak.load(Ordering::SeqCst), 1);
        assert!(probe.calls() >= 3);
        assert!(controller.stats().skipped >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_ticks_do_not_overlap() {
        let probe = Probe::new();
        let controller = HeartbeatController::new();
        let callback = probe.callback(Duration::from_secs(1));

        let (a, b) = tokio::join!(controller.tick_once(&callback), controller.tick_once(&callback));
        let mut outcomes = [a, b];
        outcomes.sort_by_key(|o| *o == TickOutcome::Skipped);
        assert_eq!(outcomes, [TickOutcome::Fired, TickOutcome::Skipped]);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_blocks_ticks_until_resume() {
        let probe = Probe::new();
        let controller = HeartbeatController::new();
        let callback = probe.callback(Duration::from_millis(5));

        controller.pause_for_claim().await;
        assert!(controller.is_paused());
        assert_eq!(controller.tick_once(&callback).await, TickOutcome::Skipped);

        controller.start(Arc::clone(&callback), Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(probe.calls(), 0);

        controller.resume_after_claim();
        assert_eq!(controller.tick_once(&callback).await, TickOutcome::Fired);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_waits_for_in_flight_call() {
        let release = Arc::new(Notify::new());
        let finished = Arc::new(AtomicBool::new(false));
        let callback: HeartbeatFn = {
            let release = Arc::clone(&release);
            let finished = Arc::clone(&finished);
            Arc::new(move || -> HeartbeatFut {
                let release = Arc::clone(&release);
                let finished = Arc::clone(&finished);
                Box::pin(async move {
                    release.notified().await;
                    finished.store(true, Ordering::SeqCst);
                    Ok(())
                })
            })
        };

        let controller = Arc::new(HeartbeatController::new());
        let ticking = {
            let controller = Arc::clone(&controller);
            let callback = Arc::clone(&callback);
            tokio::spawn(async move { controller.tick_once(&callback).await })
        };
        tokio::task::yield_now().await;

        let pausing = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.pause_for_claim().await })
        };
        tokio::task::yield_now().await;
        assert!(!pausing.is_finished());

        release.notify_one();
        pausing.await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(ticking.await.unwrap(), TickOutcome::Fired);
    }

    #[tokio::test]
    async fn failures_are_counted_not_raised() {
        let controller = HeartbeatController::new();
        let callback = failing();
        assert_eq!(controller.tick_once(&callback).await, TickOutcome::Failed);
        assert_eq!(controller.tick_once(&callback).await, TickOutcome::Failed);
        assert_eq!(
            controller.stats(),
            HeartbeatStats {
                fired: 2,
                failed: 2,
                skipped: 0
            }
        );
    }
}
