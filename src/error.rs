use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("reservation {0} not found")]
    NotFound(Uuid),

    #[error("scheduled ride requires confirmation")]
    ConfirmationRequired {
        scheduled_for: Option<DateTime<Utc>>,
    },

    #[error("geospatial query failed: {0}")]
    GeoQuery(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("position unavailable")]
    PositionUnavailable,

    #[error("wake guard unavailable: {0}")]
    WakeGuard(String),

    #[error("refresh timed out after {0:?}")]
    RefreshTimeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}
