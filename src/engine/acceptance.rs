use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::reservation::ReservationStatus;
use crate::state::DispatchState;
use crate::store::ReservationStore;

/// Outcome of an accept attempt. `ConflictLost` means another driver won
/// the conditional write; the reservation has already been dropped from the
/// local board and the caller should prompt a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    Assigned,
    ConflictLost,
}

/// The accept/refuse protocol. Exclusivity rests entirely on the storage
/// conditional write; the advisory pre-read only filters obviously stale
/// taps cheaply and is never the safety mechanism.
pub struct DispatchAcceptance {
    store: Arc<dyn ReservationStore>,
    state: Arc<DispatchState>,
}

impl DispatchAcceptance {
    pub fn new(store: Arc<dyn ReservationStore>, state: Arc<DispatchState>) -> Self {
        Self { store, state }
    }

    /// Attempts to claim a reservation for this driver.
    ///
    /// Scheduled reservations are a firm booking commitment: the first call
    /// returns [`DispatchError::ConfirmationRequired`] with the booked time
    /// so the caller can display it; the commit only proceeds once invoked
    /// with `confirmed = true`.
    pub async fn accept(
        &self,
        reservation_id: Uuid,
        confirmed: bool,
    ) -> Result<AcceptOutcome, DispatchError> {
        let driver_id = self.state.driver_id();

        let current = self
            .store
            .get(reservation_id)
            .await?
            .ok_or(DispatchError::NotFound(reservation_id))?;

        if current.status == ReservationStatus::Scheduled && !confirmed {
            return Err(DispatchError::ConfirmationRequired {
                scheduled_for: current.scheduled_for,
            });
        }

        if current.assigned_driver_id.is_some() {
            info!(reservation_id = %reservation_id, "already assigned; dropping stale candidate");
            self.state.remove_candidate(reservation_id);
            self.state
                .metrics
                .accepts_total
                .with_label_values(&["conflict"])
                .inc();
            return Ok(AcceptOutcome::ConflictLost);
        }

        let affected = self
            .store
            .compare_and_swap(reservation_id, ReservationStatus::Accepted, driver_id)
            .await?;

        if affected == 0 {
            warn!(reservation_id = %reservation_id, "accept race lost; taken by another driver");
            self.state.remove_candidate(reservation_id);
            self.state
                .metrics
                .accepts_total
                .with_label_values(&["conflict"])
                .inc();
            return Ok(AcceptOutcome::ConflictLost);
        }

        info!(
            reservation_id = %reservation_id,
            driver_id = %driver_id,
            "reservation accepted"
        );
        self.state.remove_candidate(reservation_id);
        if let Some(accepted) = self.store.get(reservation_id).await? {
            self.state.history.insert(accepted.id, accepted);
        }
        self.state
            .metrics
            .accepts_total
            .with_label_values(&["assigned"])
            .inc();

        Ok(AcceptOutcome::Assigned)
    }

    /// Dismisses a reservation from this driver's queue. The status write is
    /// unconditional; no exclusivity applies on this path.
    pub async fn refuse(&self, reservation_id: Uuid) -> Result<(), DispatchError> {
        self.store.mark_refused(reservation_id).await?;
        self.state.remove_candidate(reservation_id);
        self.state.metrics.refusals_total.inc();
        info!(reservation_id = %reservation_id, "reservation refused");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{AcceptOutcome, DispatchAcceptance};
    use crate::error::DispatchError;
    use crate::geo::{codec, GeoPoint};
    use crate::models::driver::Driver;
    use crate::models::reservation::{Reservation, ReservationStatus, VehicleType};
    use crate::state::DispatchState;
    use crate::store::memory::MemoryStore;
    use crate::store::ReservationStore;

    fn reservation(status: ReservationStatus) -> Reservation {
        Reservation {
            id: Uuid::new_v4(),
            status,
            pickup_point: codec::encode(&GeoPoint::new(48.8566, 2.3522).unwrap()),
            dropoff_point: codec::encode(&GeoPoint::new(48.6273, 2.5847).unwrap()),
            vehicle_type: VehicleType::Sedan,
            assigned_driver_id: None,
            scheduled_for: (status == ReservationStatus::Scheduled)
                .then(|| Utc::now() + Duration::hours(6)),
            validation_code: None,
            validated_at: None,
            created_at: Utc::now(),
        }
    }

    fn acceptance(store: Arc<MemoryStore>) -> (DispatchAcceptance, Arc<DispatchState>) {
        let driver = Driver::new(Uuid::new_v4(), VehicleType::Sedan);
        let state = Arc::new(DispatchState::new(driver));
        (DispatchAcceptance::new(store, state.clone()), state)
    }

    #[tokio::test]
    async fn accepts_a_pending_reservation() {
        let store = Arc::new(MemoryStore::new());
        let r = reservation(ReservationStatus::Pending);
        let id = r.id;
        store.insert_reservation(r);

        let (acceptance, state) = acceptance(store.clone());
        let outcome = acceptance.accept(id, false).await.unwrap();

        assert_eq!(outcome, AcceptOutcome::Assigned);
        assert!(state.history.contains_key(&id));

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Accepted);
        assert_eq!(stored.assigned_driver_id, Some(state.driver_id()));
    }

    #[tokio::test]
    async fn pre_check_short_circuits_on_assigned() {
        let store = Arc::new(MemoryStore::new());
        let mut r = reservation(ReservationStatus::Pending);
        r.assigned_driver_id = Some(Uuid::new_v4());
        let id = r.id;
        store.insert_reservation(r);

        let (acceptance, _state) = acceptance(store);
        let outcome = acceptance.accept(id, false).await.unwrap();
        assert_eq!(outcome, AcceptOutcome::ConflictLost);
    }

    #[tokio::test]
    async fn scheduled_requires_confirmation() {
        let store = Arc::new(MemoryStore::new());
        let r = reservation(ReservationStatus::Scheduled);
        let id = r.id;
        let booked_for = r.scheduled_for;
        store.insert_reservation(r);

        let (acceptance, _state) = acceptance(store.clone());

        match acceptance.accept(id, false).await {
            Err(DispatchError::ConfirmationRequired { scheduled_for }) => {
                assert_eq!(scheduled_for, booked_for);
            }
            other => panic!("expected ConfirmationRequired, got {other:?}"),
        }
        // Unconfirmed attempt must not have touched storage.
        let stored = store.get(id).await.unwrap().unwrap();
        assert!(stored.assigned_driver_id.is_none());

        let outcome = acceptance.accept(id, true).await.unwrap();
        assert_eq!(outcome, AcceptOutcome::Assigned);
    }

    #[tokio::test]
    async fn refuse_is_unconditional_and_local() {
        let store = Arc::new(MemoryStore::new());
        let r = reservation(ReservationStatus::Pending);
        let id = r.id;
        store.insert_reservation(r);

        let (acceptance, state) = acceptance(store.clone());
        acceptance.refuse(id).await.unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Refused);
        assert!(stored.assigned_driver_id.is_none());
        assert!(!state.history.contains_key(&id));
    }
}
