use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::acceptance::{AcceptOutcome, DispatchAcceptance};
use crate::engine::fetcher::CandidateFetcher;
use crate::engine::scheduler::PollingScheduler;
use crate::engine::tracker::PositionTracker;
use crate::error::DispatchError;
use crate::models::driver::Driver;
use crate::state::{DispatchBoard, DispatchState, RefreshState};
use crate::store::{GeoQuery, LocationSource, PositionStore, ReservationStore, WakeLock};

/// Everything the session talks to outside the process.
pub struct Collaborators {
    pub geo: Arc<dyn GeoQuery>,
    pub reservations: Arc<dyn ReservationStore>,
    pub positions: Arc<dyn PositionStore>,
    pub location: Arc<dyn LocationSource>,
    pub wake_lock: Arc<dyn WakeLock>,
}

struct OnlinePeriod {
    scheduler: Arc<PollingScheduler>,
    tracker: Arc<PositionTracker>,
    tasks: Vec<JoinHandle<()>>,
}

/// The driver-facing entry point. Going online starts the position tracker
/// and the polling scheduler together; going offline stops both. Accept and
/// refuse act on whatever the board currently shows.
pub struct DriverSession {
    config: Config,
    state: Arc<DispatchState>,
    collaborators: Collaborators,
    acceptance: DispatchAcceptance,
    online: Option<OnlinePeriod>,
}

impl DriverSession {
    pub fn new(config: Config, driver: Driver, collaborators: Collaborators) -> Self {
        let state = Arc::new(DispatchState::new(driver));
        let acceptance =
            DispatchAcceptance::new(collaborators.reservations.clone(), state.clone());

        Self {
            config,
            state,
            collaborators,
            acceptance,
            online: None,
        }
    }

    pub fn state(&self) -> Arc<DispatchState> {
        self.state.clone()
    }

    pub fn is_online(&self) -> bool {
        self.online.is_some()
    }

    pub async fn set_online(&mut self, online: bool) {
        if online {
            self.go_online();
        } else {
            self.go_offline().await;
        }
    }

    fn go_online(&mut self) {
        if self.online.is_some() {
            return;
        }
        self.state.set_online(true);
        info!(driver_id = %self.state.driver_id(), "driver going online");

        let fetcher = Arc::new(CandidateFetcher::new(
            self.collaborators.geo.clone(),
            self.collaborators.reservations.clone(),
            self.state.metrics.clone(),
            self.config.test_mode,
            self.config.default_radius_km,
        ));
        let scheduler = Arc::new(PollingScheduler::new(
            self.state.clone(),
            fetcher,
            self.config.poll_period(),
            self.config.refresh_timeout(),
            self.config.max_consecutive_errors,
            self.config.new_request_window_hours,
        ));
        let tracker = Arc::new(PositionTracker::new(
            self.state.clone(),
            self.collaborators.location.clone(),
            self.collaborators.positions.clone(),
            self.collaborators.wake_lock.clone(),
            self.config.position_sample_interval(),
            self.config.desired_accuracy_m,
        ));

        let tasks = vec![
            tokio::spawn(scheduler.clone().run()),
            tokio::spawn(tracker.clone().run()),
        ];
        self.online = Some(OnlinePeriod {
            scheduler,
            tracker,
            tasks,
        });
    }

    async fn go_offline(&mut self) {
        let Some(period) = self.online.take() else {
            return;
        };
        self.state.set_online(false);

        period.scheduler.stop();
        period.tracker.stop();
        for task in period.tasks {
            let _ = task.await;
        }
        info!(driver_id = %self.state.driver_id(), "driver went offline");
    }

    /// Refresh outside the poll cadence, honoring the in-flight guard.
    /// Returns `false` while offline or when a refresh is already running.
    pub async fn force_refresh(&self) -> bool {
        match &self.online {
            Some(period) => period.scheduler.force_refresh().await,
            None => false,
        }
    }

    pub async fn accept(
        &self,
        reservation_id: Uuid,
        confirmed: bool,
    ) -> Result<AcceptOutcome, DispatchError> {
        let outcome = self.acceptance.accept(reservation_id, confirmed).await?;
        if outcome == AcceptOutcome::ConflictLost {
            // Converge the board now instead of waiting out the poll period.
            self.force_refresh().await;
        }
        Ok(outcome)
    }

    pub async fn refuse(&self, reservation_id: Uuid) -> Result<(), DispatchError> {
        self.acceptance.refuse(reservation_id).await
    }

    pub fn board(&self) -> DispatchBoard {
        self.state.board_snapshot()
    }

    pub fn refresh_updates(&self) -> watch::Receiver<RefreshState> {
        self.state.refresh_updates()
    }

    pub fn refresh_stream(&self) -> WatchStream<RefreshState> {
        WatchStream::new(self.state.refresh_updates())
    }
}
