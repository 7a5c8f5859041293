use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::candidate::Candidate;
use crate::models::driver::{Driver, DriverPosition, PositionReading};
use crate::models::reservation::Reservation;
use crate::observability::metrics::Metrics;

/// Scheduler-owned lifecycle state, published for countdown/progress
/// display. This is the scheduler's only externally observable contract.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshState {
    pub is_refreshing: bool,
    pub last_refresh_time: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
    pub is_active: bool,
}

impl Default for RefreshState {
    fn default() -> Self {
        Self {
            is_refreshing: false,
            last_refresh_time: None,
            consecutive_errors: 0,
            is_active: false,
        }
    }
}

/// The candidate board as last applied by the scheduler. `generation` is the
/// refresh generation that produced it; `degraded` marks boards built from
/// the legacy fallback query, where radius filtering was not in effect.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchBoard {
    pub new_requests: Vec<Candidate>,
    pub scheduled_for_me: Vec<Candidate>,
    pub degraded: bool,
    pub generation: u64,
}

pub struct DispatchState {
    driver: RwLock<Driver>,
    board: RwLock<DispatchBoard>,
    pub history: DashMap<Uuid, Reservation>,
    pub refresh_tx: watch::Sender<RefreshState>,
    generation: AtomicU64,
    pub metrics: Metrics,
}

impl DispatchState {
    pub fn new(driver: Driver) -> Self {
        let (refresh_tx, _unused_rx) = watch::channel(RefreshState::default());

        Self {
            driver: RwLock::new(driver),
            board: RwLock::new(DispatchBoard::default()),
            history: DashMap::new(),
            refresh_tx,
            generation: AtomicU64::new(0),
            metrics: Metrics::new(),
        }
    }

    pub fn driver_snapshot(&self) -> Driver {
        self.driver.read().expect("driver lock poisoned").clone()
    }

    pub fn driver_id(&self) -> Uuid {
        self.driver.read().expect("driver lock poisoned").id
    }

    pub fn set_online(&self, online: bool) {
        let mut driver = self.driver.write().expect("driver lock poisoned");
        driver.online = online;
    }

    /// Only the position tracker calls this; the driver record has a single
    /// writer per field at any instant.
    pub fn update_position(&self, reading: PositionReading, sampled_at: DateTime<Utc>) {
        let mut driver = self.driver.write().expect("driver lock poisoned");
        driver.position = Some(DriverPosition {
            point: reading.point,
            accuracy_meters: reading.accuracy_meters,
            sampled_at,
        });
    }

    pub fn board_snapshot(&self) -> DispatchBoard {
        self.board.read().expect("board lock poisoned").clone()
    }

    /// Issues the next refresh generation. Responses carry this id back and
    /// are discarded unless still the latest issued.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Applies a refreshed board unless a newer refresh has been issued in
    /// the meantime. Returns whether the board was applied.
    pub fn apply_board(&self, board: DispatchBoard) -> bool {
        let mut current = self.board.write().expect("board lock poisoned");
        if board.generation != self.latest_generation() {
            return false;
        }
        self.metrics
            .candidates_on_board
            .set(board.new_requests.len() as i64);
        *current = board;
        true
    }

    /// Drops a reservation from the local board only; storage is untouched.
    pub fn remove_candidate(&self, reservation_id: Uuid) {
        let mut board = self.board.write().expect("board lock poisoned");
        board
            .new_requests
            .retain(|c| c.reservation.id != reservation_id);
        board
            .scheduled_for_me
            .retain(|c| c.reservation.id != reservation_id);
        self.metrics
            .candidates_on_board
            .set(board.new_requests.len() as i64);
    }

    pub fn refresh_updates(&self) -> watch::Receiver<RefreshState> {
        self.refresh_tx.subscribe()
    }
}
