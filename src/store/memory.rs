//! In-memory implementations of the collaborator ports, used by the demo
//! binary and the test suite.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::DispatchError;
use crate::geo::{self, codec, GeoPoint};
use crate::models::driver::PositionReading;
use crate::models::reservation::{Reservation, ReservationStatus, VehicleType};
use crate::store::{
    GeoQuery, LocationSource, PositionStore, ReservationStore, WakeGuard, WakeLock,
};

/// Positions are persisted in the wire format, the same way the hosted
/// store keeps them.
#[derive(Debug, Clone)]
pub struct StoredPosition {
    pub point: String,
    pub accuracy_meters: f64,
    pub sampled_at: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    reservations: DashMap<Uuid, Reservation>,
    positions: DashMap<Uuid, StoredPosition>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_reservation(&self, reservation: Reservation) {
        self.reservations.insert(reservation.id, reservation);
    }

    pub fn position(&self, driver_id: Uuid) -> Option<StoredPosition> {
        self.positions.get(&driver_id).map(|p| p.value().clone())
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, DispatchError> {
        Ok(self.reservations.get(&id).map(|r| r.clone()))
    }

    async fn list_by_status(
        &self,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>, DispatchError> {
        Ok(self
            .reservations
            .iter()
            .filter(|entry| statuses.contains(&entry.status))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_unassigned(
        &self,
        statuses: &[ReservationStatus],
    ) -> Result<Vec<Reservation>, DispatchError> {
        Ok(self
            .reservations
            .iter()
            .filter(|entry| statuses.contains(&entry.status) && entry.assigned_driver_id.is_none())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_assigned_to(
        &self,
        driver_id: Uuid,
    ) -> Result<Vec<Reservation>, DispatchError> {
        Ok(self
            .reservations
            .iter()
            .filter(|entry| entry.assigned_driver_id == Some(driver_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn compare_and_swap(
        &self,
        id: Uuid,
        new_status: ReservationStatus,
        new_driver_id: Uuid,
    ) -> Result<u64, DispatchError> {
        // The entry lock makes the check-and-set atomic, matching the
        // conditional UPDATE semantics of the hosted store.
        match self.reservations.get_mut(&id) {
            Some(mut reservation) if reservation.assigned_driver_id.is_none() => {
                reservation.status = new_status;
                reservation.assigned_driver_id = Some(new_driver_id);
                Ok(1)
            }
            Some(_) => Ok(0),
            None => Ok(0),
        }
    }

    async fn mark_refused(&self, id: Uuid) -> Result<(), DispatchError> {
        match self.reservations.get_mut(&id) {
            Some(mut reservation) => {
                reservation.status = ReservationStatus::Refused;
                Ok(())
            }
            None => Err(DispatchError::NotFound(id)),
        }
    }
}

#[async_trait]
impl GeoQuery for MemoryStore {
    async fn find_within_radius(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        vehicle_type: VehicleType,
        status: ReservationStatus,
    ) -> Result<Vec<Reservation>, DispatchError> {
        let mut hits: Vec<(f64, Reservation)> = self
            .reservations
            .iter()
            .filter_map(|entry| {
                let reservation = entry.value();
                if reservation.status != status
                    || reservation.vehicle_type != vehicle_type
                    || reservation.assigned_driver_id.is_some()
                {
                    return None;
                }
                let pickup = codec::decode(&reservation.pickup_point)?;
                let km = geo::haversine_km(&center, &pickup);
                (km * 1_000.0 <= radius_meters).then(|| (km, reservation.clone()))
            })
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(hits.into_iter().map(|(_, r)| r).collect())
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn write_position(
        &self,
        driver_id: Uuid,
        point: GeoPoint,
        accuracy_meters: f64,
        sampled_at: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        self.positions.insert(
            driver_id,
            StoredPosition {
                point: codec::encode(&point),
                accuracy_meters,
                sampled_at,
            },
        );
        Ok(())
    }
}

/// Location source that always reports the same fix, for demos and tests.
pub struct FixedLocationSource {
    reading: PositionReading,
}

impl FixedLocationSource {
    pub fn new(point: GeoPoint, accuracy_meters: f64) -> Self {
        Self {
            reading: PositionReading {
                point,
                accuracy_meters,
            },
        }
    }
}

#[async_trait]
impl LocationSource for FixedLocationSource {
    async fn sample(&self, _max_staleness: Duration) -> Result<PositionReading, DispatchError> {
        Ok(self.reading)
    }
}

pub struct NoopWakeLock;

struct NoopWakeGuard;

impl WakeGuard for NoopWakeGuard {}

impl WakeLock for NoopWakeLock {
    fn acquire(&self) -> Result<Box<dyn WakeGuard>, DispatchError> {
        Ok(Box::new(NoopWakeGuard))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::MemoryStore;
    use crate::geo::{codec, GeoPoint};
    use crate::models::reservation::{Reservation, ReservationStatus, VehicleType};
    use crate::store::{GeoQuery, ReservationStore};

    fn pending_at(lat: f64, lng: f64) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            status: ReservationStatus::Pending,
            pickup_point: codec::encode(&GeoPoint::new(lat, lng).unwrap()),
            dropoff_point: codec::encode(&GeoPoint::new(48.8566, 2.3522).unwrap()),
            vehicle_type: VehicleType::Sedan,
            assigned_driver_id: None,
            scheduled_for: None,
            validation_code: None,
            validated_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn radius_query_sorts_by_distance_and_respects_bound() {
        let store = MemoryStore::new();
        let near = pending_at(48.8600, 2.3522);
        let nearer = pending_at(48.8570, 2.3522);
        let far = pending_at(48.9600, 2.3522);
        store.insert_reservation(near.clone());
        store.insert_reservation(nearer.clone());
        store.insert_reservation(far);

        let center = GeoPoint::new(48.8566, 2.3522).unwrap();
        let hits = store
            .find_within_radius(center, 5_000.0, VehicleType::Sedan, ReservationStatus::Pending)
            .await
            .unwrap();

        let ids: Vec<_> = hits.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![nearer.id, near.id]);
    }

    #[tokio::test]
    async fn cas_assigns_exactly_once() {
        let store = MemoryStore::new();
        let reservation = pending_at(48.8600, 2.3522);
        let id = reservation.id;
        store.insert_reservation(reservation);

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        assert_eq!(
            store
                .compare_and_swap(id, ReservationStatus::Accepted, first)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            store
                .compare_and_swap(id, ReservationStatus::Accepted, second)
                .await
                .unwrap(),
            0
        );

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.assigned_driver_id, Some(first));
    }
}
