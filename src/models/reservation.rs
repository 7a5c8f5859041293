use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReservationStatus {
    Pending,
    Scheduled,
    Accepted,
    Refused,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VehicleType {
    Sedan,
    Van,
    Luxury,
}

/// A trip booking awaiting or holding a driver assignment. Pickup and
/// dropoff are carried in storage wire form (WKT or hex EWKB text); only
/// `geo::codec` interprets them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub status: ReservationStatus,
    pub pickup_point: String,
    pub dropoff_point: String,
    pub vehicle_type: VehicleType,
    pub assigned_driver_id: Option<Uuid>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub validation_code: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Unassigned and still claimable by any driver.
    pub fn is_unassigned_eligible(&self) -> bool {
        self.assigned_driver_id.is_none()
            && matches!(
                self.status,
                ReservationStatus::Pending | ReservationStatus::Scheduled
            )
    }
}
