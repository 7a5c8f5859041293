//! Collaborator ports. The dispatch core consumes these capabilities; it
//! never implements the geospatial index or the storage engine itself.

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::geo::GeoPoint;
use crate::models::driver::PositionReading;
use crate::models::reservation::{Reservation, ReservationStatus, VehicleType};

/// Geospatial query capability. Results are sorted by ascending distance
/// from `center`. Must fail with a distinguishable error so the fetcher can
/// fall back to the legacy unfiltered query.
#[async_trait]
pub trait GeoQuery: Send + Sync {
    async fn find_within_radius(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        vehicle_type: VehicleType,
        status: ReservationStatus,
    ) -> Result<Vec<Reservation>, DispatchError>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, DispatchError>;

    async fn list_by_status(
        &self,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>, DispatchError>;

    /// Legacy query: unassigned reservations in the given statuses, with no
    /// distance bound.
    async fn list_unassigned(
        &self,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>, DispatchError>;

    async fn list_assigned_to(&self, driver_id: Uuid)
        -> Result<Vec<Reservation>, DispatchError>;

    /// Conditional write: sets `status` and `assigned_driver_id` only while
    /// the reservation is still unassigned. Returns the affected-row count;
    /// zero means the race was lost. This predicate is the single
    /// exclusivity guarantee for driver assignment and must be atomic at
    /// the storage layer.
    async fn compare_and_swap(
        &self,
        id: Uuid,
        new_status: ReservationStatus,
        new_driver_id: Uuid,
    ) -> Result<u64, DispatchError>;

    /// Unconditional status write used by the refuse path.
    async fn mark_refused(&self, id: Uuid) -> Result<(), DispatchError>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn write_position(
        &self,
        driver_id: Uuid,
        point: GeoPoint,
        accuracy_meters: f64,
        sampled_at: DateTime<Utc>,
    ) -> Result<(), DispatchError>;
}

/// Device-side location capability. `max_staleness` is how old a cached fix
/// may be for this attempt; the caller applies its own per-attempt timeout.
#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn sample(&self, max_staleness: Duration) -> Result<PositionReading, DispatchError>;
}

/// Keeps the device screen awake while held; released on drop.
pub trait WakeGuard: Send {}

pub trait WakeLock: Send + Sync {
    fn acquire(&self) -> Result<Box<dyn WakeGuard>, DispatchError>;
}
