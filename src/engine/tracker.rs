use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::models::driver::PositionReading;
use crate::state::DispatchState;
use crate::store::{LocationSource, PositionStore, WakeLock};

/// Per-attempt sampling profile. Later attempts tolerate slower fixes and
/// staler cached readings.
struct SampleProfile {
    attempt_timeout: Duration,
    max_staleness: Duration,
}

const SAMPLE_PROFILES: [SampleProfile; 3] = [
    SampleProfile {
        attempt_timeout: Duration::from_secs(5),
        max_staleness: Duration::from_secs(10),
    },
    SampleProfile {
        attempt_timeout: Duration::from_secs(10),
        max_staleness: Duration::from_secs(60),
    },
    SampleProfile {
        attempt_timeout: Duration::from_secs(20),
        max_staleness: Duration::from_secs(300),
    },
];

/// Samples and publishes the driver's own position while online.
///
/// Each cycle keeps the most precise reading of up to three attempts,
/// stopping early once the desired accuracy is met; when nothing meets it,
/// the best attempted reading is still published rather than none at all.
pub struct PositionTracker {
    state: Arc<DispatchState>,
    source: Arc<dyn LocationSource>,
    store: Arc<dyn PositionStore>,
    wake_lock: Arc<dyn WakeLock>,
    sample_interval: Duration,
    desired_accuracy_m: f64,
    shutdown: Notify,
}

impl PositionTracker {
    pub fn new(
        state: Arc<DispatchState>,
        source: Arc<dyn LocationSource>,
        store: Arc<dyn PositionStore>,
        wake_lock: Arc<dyn WakeLock>,
        sample_interval: Duration,
        desired_accuracy_m: f64,
    ) -> Self {
        Self {
            state,
            source,
            store,
            wake_lock,
            sample_interval,
            desired_accuracy_m,
            shutdown: Notify::new(),
        }
    }

    /// Samples immediately, then on every interval tick, until [`stop`] is
    /// called. The wake guard is held for exactly this scope and released
    /// on exit; failing to acquire it is logged and sampling proceeds
    /// without it.
    ///
    /// [`stop`]: PositionTracker::stop
    pub async fn run(self: Arc<Self>) {
        let _guard = match self.wake_lock.acquire() {
            Ok(guard) => Some(guard),
            Err(err) => {
                warn!(error = %err, "wake guard unavailable; sampling without it");
                None
            }
        };
        info!(
            interval_secs = self.sample_interval.as_secs(),
            "position tracker started"
        );

        let mut ticker = interval(self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.notified() => break,
            }
            self.sample_cycle().await;
        }

        info!("position tracker stopped");
    }

    pub fn stop(&self) {
        self.shutdown.notify_waiters();
    }

    async fn sample_cycle(&self) {
        let mut best: Option<PositionReading> = None;
        let mut met_desired = false;

        for (attempt, profile) in SAMPLE_PROFILES.iter().enumerate() {
            match timeout(
                profile.attempt_timeout,
                self.source.sample(profile.max_staleness),
            )
            .await
            {
                Ok(Ok(reading)) => {
                    let better = best
                        .map_or(true, |b| reading.accuracy_meters < b.accuracy_meters);
                    if better {
                        best = Some(reading);
                    }
                    if reading.accuracy_meters <= self.desired_accuracy_m {
                        met_desired = true;
                        break;
                    }
                }
                Ok(Err(err)) => {
                    debug!(attempt, error = %err, "position sample attempt failed");
                }
                Err(_) => {
                    debug!(
                        attempt,
                        timeout_secs = profile.attempt_timeout.as_secs(),
                        "position sample attempt timed out"
                    );
                }
            }
        }

        let Some(reading) = best else {
            warn!("no position fix this cycle; keeping last known position");
            self.state
                .metrics
                .position_samples_total
                .with_label_values(&["unavailable"])
                .inc();
            return;
        };

        let outcome = if met_desired { "ok" } else { "best_effort" };
        if !met_desired {
            warn!(
                accuracy_m = reading.accuracy_meters,
                desired_m = self.desired_accuracy_m,
                "no sample met desired accuracy; publishing best effort"
            );
        }
        self.state
            .metrics
            .position_samples_total
            .with_label_values(&[outcome])
            .inc();

        let sampled_at = Utc::now();
        self.state.update_position(reading, sampled_at);

        let driver_id = self.state.driver_id();
        if let Err(err) = self
            .store
            .write_position(driver_id, reading.point, reading.accuracy_meters, sampled_at)
            .await
        {
            warn!(error = %err, "failed to publish position; next cycle will retry");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::PositionTracker;
    use crate::error::DispatchError;
    use crate::geo::GeoPoint;
    use crate::models::driver::{Driver, PositionReading};
    use crate::models::reservation::VehicleType;
    use crate::state::DispatchState;
    use crate::store::memory::MemoryStore;
    use crate::store::{LocationSource, WakeGuard, WakeLock};

    struct ScriptedSource {
        accuracies: Vec<f64>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LocationSource for ScriptedSource {
        async fn sample(
            &self,
            _max_staleness: Duration,
        ) -> Result<PositionReading, DispatchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.accuracies.get(call) {
                Some(accuracy) => Ok(PositionReading {
                    point: GeoPoint::new(48.8566, 2.3522).unwrap(),
                    accuracy_meters: *accuracy,
                }),
                None => Err(DispatchError::PositionUnavailable),
            }
        }
    }

    struct TrackedWakeLock {
        held: Arc<AtomicBool>,
        fail: bool,
    }

    struct TrackedGuard {
        held: Arc<AtomicBool>,
    }

    impl WakeGuard for TrackedGuard {}

    impl Drop for TrackedGuard {
        fn drop(&mut self) {
            self.held.store(false, Ordering::SeqCst);
        }
    }

    impl WakeLock for TrackedWakeLock {
        fn acquire(&self) -> Result<Box<dyn WakeGuard>, DispatchError> {
            if self.fail {
                return Err(DispatchError::WakeGuard("denied by device".to_string()));
            }
            self.held.store(true, Ordering::SeqCst);
            Ok(Box::new(TrackedGuard {
                held: self.held.clone(),
            }))
        }
    }

    fn tracker(
        accuracies: Vec<f64>,
        desired: f64,
        wake_fail: bool,
    ) -> (Arc<PositionTracker>, Arc<DispatchState>, Arc<ScriptedSource>, Arc<AtomicBool>) {
        let state = Arc::new(DispatchState::new(Driver::new(
            Uuid::new_v4(),
            VehicleType::Sedan,
        )));
        let source = Arc::new(ScriptedSource {
            accuracies,
            calls: AtomicUsize::new(0),
        });
        let held = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(TrackedWakeLock {
            held: held.clone(),
            fail: wake_fail,
        });
        let tracker = Arc::new(PositionTracker::new(
            state.clone(),
            source.clone(),
            Arc::new(MemoryStore::new()),
            wake,
            Duration::from_secs(300),
            desired,
        ));
        (tracker, state, source, held)
    }

    #[tokio::test]
    async fn stops_early_once_desired_accuracy_met() {
        let (tracker, state, source, _held) = tracker(vec![120.0, 40.0, 5.0], 50.0, false);

        tracker.sample_cycle().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        let position = state.driver_snapshot().position.unwrap();
        assert_eq!(position.accuracy_meters, 40.0);
    }

    #[tokio::test]
    async fn keeps_best_reading_when_none_meet_desired() {
        let (tracker, state, source, _held) = tracker(vec![120.0, 90.0, 150.0], 50.0, false);

        tracker.sample_cycle().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        let position = state.driver_snapshot().position.unwrap();
        assert_eq!(position.accuracy_meters, 90.0);
    }

    #[tokio::test]
    async fn all_attempts_failing_keeps_last_position() {
        let (tracker, state, _source, _held) = tracker(vec![], 50.0, false);

        tracker.sample_cycle().await;

        assert!(state.driver_snapshot().position.is_none());
    }

    #[tokio::test]
    async fn wake_guard_held_while_running_and_released_on_stop() {
        let (tracker, _state, _source, held) = tracker(vec![30.0, 30.0, 30.0], 50.0, false);

        let handle = tokio::spawn(tracker.clone().run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(held.load(Ordering::SeqCst));

        tracker.stop();
        handle.await.unwrap();
        assert!(!held.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn wake_guard_failure_is_non_fatal() {
        let (tracker, state, _source, held) = tracker(vec![30.0], 50.0, true);

        let handle = tokio::spawn(tracker.clone().run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!held.load(Ordering::SeqCst));
        assert!(state.driver_snapshot().position.is_some());

        tracker.stop();
        handle.await.unwrap();
    }
}
