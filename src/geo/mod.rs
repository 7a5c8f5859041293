pub mod codec;

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Display heuristic only (~33 km/h urban average); never used for fare,
/// eligibility, or SLA decisions.
const MINUTES_PER_KM: f64 = 1.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        Some(Self { lat, lng })
    }
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn estimate_minutes(km: f64) -> i64 {
    (km * MINUTES_PER_KM).round() as i64
}

#[cfg(test)]
mod tests {
    use super::{estimate_minutes, haversine_km, GeoPoint};

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 48.6273519,
            lng: 2.5847236,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn paris_to_lyon_is_around_392_km() {
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let lyon = GeoPoint {
            lat: 45.7640,
            lng: 4.8357,
        };
        let distance = haversine_km(&paris, &lyon);
        assert!((distance - 392.0).abs() < 5.0);
    }

    #[test]
    fn minutes_estimate_rounds() {
        assert_eq!(estimate_minutes(0.0), 0);
        assert_eq!(estimate_minutes(10.0), 18);
        assert_eq!(estimate_minutes(2.5), 5);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(90.0, 180.0).is_some());
        assert!(GeoPoint::new(-90.0, -180.0).is_some());
        assert!(GeoPoint::new(90.1, 0.0).is_none());
        assert!(GeoPoint::new(0.0, -180.5).is_none());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_none());
    }
}
