use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geo::GeoPoint;
use crate::models::reservation::VehicleType;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriverPosition {
    pub point: GeoPoint,
    pub accuracy_meters: f64,
    pub sampled_at: DateTime<Utc>,
}

/// A raw location fix as delivered by the device, before it is stamped and
/// published as the driver's position.
#[derive(Debug, Clone, Copy)]
pub struct PositionReading {
    pub point: GeoPoint,
    pub accuracy_meters: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub vehicle_type: VehicleType,
    pub online: bool,
    pub position: Option<DriverPosition>,
    pub search_radius_km: Option<f64>,
}

impl Driver {
    pub fn new(id: Uuid, vehicle_type: VehicleType) -> Self {
        Self {
            id,
            vehicle_type,
            online: false,
            position: None,
            search_radius_km: None,
        }
    }
}
