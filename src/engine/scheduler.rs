use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::engine::fetcher::CandidateFetcher;
use crate::engine::segmenter;
use crate::error::DispatchError;
use crate::state::{DispatchBoard, DispatchState, RefreshState};

/// Drives the periodic candidate refresh.
///
/// One refresh body runs at a time: a timer tick that lands while a refresh
/// is in flight is skipped outright, and [`force_refresh`] honors the same
/// guard. Repeated failures trip a circuit breaker that stops the scheduler
/// instead of retrying forever; a stopped scheduler is a safe, observable
/// degraded state, not a crash.
///
/// [`force_refresh`]: PollingScheduler::force_refresh
pub struct PollingScheduler {
    state: Arc<DispatchState>,
    fetcher: Arc<CandidateFetcher>,
    period: Duration,
    refresh_timeout: Duration,
    max_consecutive_errors: u32,
    window_hours: i64,
    shutdown: Notify,
}

enum RefreshResult {
    Completed,
    Failed,
    Skipped,
}

impl PollingScheduler {
    pub fn new(
        state: Arc<DispatchState>,
        fetcher: Arc<CandidateFetcher>,
        period: Duration,
        refresh_timeout: Duration,
        max_consecutive_errors: u32,
        window_hours: i64,
    ) -> Self {
        Self {
            state,
            fetcher,
            period,
            refresh_timeout,
            max_consecutive_errors,
            window_hours,
            shutdown: Notify::new(),
        }
    }

    /// Runs the poll loop until [`stop`] is called or the breaker trips.
    /// The first tick fires immediately.
    ///
    /// [`stop`]: PollingScheduler::stop
    pub async fn run(self: Arc<Self>) {
        self.state.refresh_tx.send_replace(RefreshState {
            is_active: true,
            ..RefreshState::default()
        });
        info!(period_secs = self.period.as_secs(), "polling scheduler started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.notified() => break,
            }
            if !self.is_active() {
                break;
            }
            self.refresh_once().await;
            if !self.is_active() {
                break;
            }
        }

        self.state.refresh_tx.send_modify(|s| {
            s.is_active = false;
            s.is_refreshing = false;
        });
        info!("polling scheduler stopped");
    }

    pub fn stop(&self) {
        self.state.refresh_tx.send_modify(|s| s.is_active = false);
        self.shutdown.notify_waiters();
    }

    pub fn is_active(&self) -> bool {
        self.state.refresh_tx.borrow().is_active
    }

    pub fn snapshot(&self) -> RefreshState {
        self.state.refresh_tx.borrow().clone()
    }

    /// Runs the refresh body outside the timer cadence. A no-op returning
    /// `false` while another refresh is in flight; the timer phase is left
    /// untouched either way.
    pub async fn force_refresh(&self) -> bool {
        matches!(self.refresh_once().await, RefreshResult::Completed)
    }

    async fn refresh_once(&self) -> RefreshResult {
        // The watch lock makes this check-and-set atomic; losing it means a
        // refresh is already in flight and this one is skipped entirely.
        let won = self.state.refresh_tx.send_if_modified(|s| {
            if s.is_refreshing {
                false
            } else {
                s.is_refreshing = true;
                true
            }
        });
        if !won {
            debug!("refresh already in flight; skipping");
            return RefreshResult::Skipped;
        }

        let generation = self.state.next_generation();
        let started = Instant::now();
        let result = timeout(self.refresh_timeout, self.execute(generation)).await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match &result {
            Ok(Ok(())) => "success",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        self.state
            .metrics
            .refreshes_total
            .with_label_values(&[outcome])
            .inc();
        self.state
            .metrics
            .refresh_duration_seconds
            .with_label_values(&[outcome])
            .observe(elapsed);

        let succeeded = match result {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "refresh failed");
                false
            }
            Err(_) => {
                let err = DispatchError::RefreshTimeout(self.refresh_timeout);
                warn!(error = %err, "refresh aborted");
                false
            }
        };

        // The in-flight flag clears regardless of outcome so the next tick
        // is never blocked by a failed or timed-out refresh.
        self.state.refresh_tx.send_modify(|s| {
            s.is_refreshing = false;
            s.last_refresh_time = Some(Utc::now());
            if succeeded {
                s.consecutive_errors = 0;
            } else {
                s.consecutive_errors += 1;
                if s.consecutive_errors >= self.max_consecutive_errors {
                    s.is_active = false;
                }
            }
        });

        if succeeded {
            RefreshResult::Completed
        } else {
            let state = self.snapshot();
            if !state.is_active {
                warn!(
                    consecutive_errors = state.consecutive_errors,
                    "circuit breaker opened; scheduler stopping"
                );
                self.shutdown.notify_waiters();
            }
            RefreshResult::Failed
        }
    }

    async fn execute(&self, generation: u64) -> Result<(), DispatchError> {
        let driver = self.state.driver_snapshot();

        let outcome = self.fetcher.fetch_candidates(&driver).await?;
        let mine = self.fetcher.assigned_to(&driver).await?;

        let board = DispatchBoard {
            new_requests: segmenter::new_requests(outcome.candidates, Utc::now(), self.window_hours),
            scheduled_for_me: segmenter::scheduled_for_me(mine, driver.id),
            degraded: outcome.degraded,
            generation,
        };

        if !self.state.apply_board(board) {
            debug!(generation, "stale refresh result discarded");
        }
        Ok(())
    }
}
