use serde::{Deserialize, Serialize};

use crate::geo::{self, codec, GeoPoint};
use crate::models::driver::DriverPosition;
use crate::models::reservation::Reservation;

/// An unassigned reservation as presented to one driver, enriched with
/// display estimates from the driver's last known position. Enrichment never
/// affects whether a reservation is included; a pickup that fails to decode
/// simply renders with no distance ("unknown location").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub reservation: Reservation,
    pub pickup: Option<GeoPoint>,
    pub dropoff: Option<GeoPoint>,
    pub distance_km: Option<f64>,
    pub eta_minutes: Option<i64>,
}

impl Candidate {
    pub fn enriched(reservation: Reservation, from: Option<&DriverPosition>) -> Self {
        let pickup = codec::decode(&reservation.pickup_point);
        let dropoff = codec::decode(&reservation.dropoff_point);

        let distance_km = match (from, pickup.as_ref()) {
            (Some(position), Some(pickup)) => Some(geo::haversine_km(&position.point, pickup)),
            _ => None,
        };
        let eta_minutes = distance_km.map(geo::estimate_minutes);

        Self {
            reservation,
            pickup,
            dropoff,
            distance_km,
            eta_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::Candidate;
    use crate::geo::{codec, GeoPoint};
    use crate::models::driver::DriverPosition;
    use crate::models::reservation::{Reservation, ReservationStatus, VehicleType};

    fn reservation(pickup: &str) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            status: ReservationStatus::Pending,
            pickup_point: pickup.to_string(),
            dropoff_point: "POINT(2.3522 48.8566)".to_string(),
            vehicle_type: VehicleType::Sedan,
            assigned_driver_id: None,
            scheduled_for: None,
            validation_code: None,
            validated_at: None,
            created_at: Utc::now(),
        }
    }

    fn position(lat: f64, lng: f64) -> DriverPosition {
        DriverPosition {
            point: GeoPoint::new(lat, lng).unwrap(),
            accuracy_meters: 10.0,
            sampled_at: Utc::now(),
        }
    }

    #[test]
    fn enriches_with_distance_and_eta() {
        let pickup = codec::encode(&GeoPoint::new(48.8566, 2.3522).unwrap());
        let candidate =
            Candidate::enriched(reservation(&pickup), Some(&position(48.8666, 2.3522)));

        let distance = candidate.distance_km.unwrap();
        assert!(distance > 1.0 && distance < 1.3);
        assert_eq!(candidate.eta_minutes.unwrap(), 2);
    }

    #[test]
    fn malformed_pickup_yields_unknown_location() {
        let candidate =
            Candidate::enriched(reservation("garbage"), Some(&position(48.8666, 2.3522)));

        assert!(candidate.pickup.is_none());
        assert!(candidate.distance_km.is_none());
        assert!(candidate.eta_minutes.is_none());
    }

    #[test]
    fn no_driver_position_yields_no_estimates() {
        let pickup = codec::encode(&GeoPoint::new(48.8566, 2.3522).unwrap());
        let candidate = Candidate::enriched(reservation(&pickup), None);

        assert!(candidate.pickup.is_some());
        assert!(candidate.distance_km.is_none());
    }
}
