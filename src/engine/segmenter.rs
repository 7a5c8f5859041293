use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::candidate::Candidate;
use crate::models::reservation::ReservationStatus;

/// The "new requests" view: unassigned pending/scheduled reservations
/// created within the window. The window keeps stale requests out of an
/// actionable queue; it is policy, not correctness. Input order (pending
/// before scheduled, distance ascending) is preserved.
pub fn new_requests(
    candidates: Vec<Candidate>,
    now: DateTime<Utc>,
    window_hours: i64,
) -> Vec<Candidate> {
    let cutoff = now - Duration::hours(window_hours);
    candidates
        .into_iter()
        .filter(|c| c.reservation.is_unassigned_eligible() && c.reservation.created_at >= cutoff)
        .collect()
}

/// The "scheduled for me" view: this driver's accepted or scheduled rides
/// that carry a booking time and have not been validated yet, soonest day
/// first, then earliest time of day.
pub fn scheduled_for_me(mine: Vec<Candidate>, driver_id: Uuid) -> Vec<Candidate> {
    let mut rides: Vec<Candidate> = mine
        .into_iter()
        .filter(|c| {
            let r = &c.reservation;
            r.assigned_driver_id == Some(driver_id)
                && matches!(
                    r.status,
                    ReservationStatus::Accepted | ReservationStatus::Scheduled
                )
                && r.scheduled_for.is_some()
                && r.validated_at.is_none()
        })
        .collect();

    rides.sort_by_key(|c| {
        c.reservation
            .scheduled_for
            .map(|at| (at.date_naive(), at.time()))
    });
    rides
}
