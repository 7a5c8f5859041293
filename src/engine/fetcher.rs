use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::geo::GeoPoint;
use crate::models::candidate::Candidate;
use crate::models::driver::Driver;
use crate::models::reservation::{Reservation, ReservationStatus};
use crate::observability::metrics::Metrics;
use crate::store::{GeoQuery, ReservationStore};

const CANDIDATE_STATUSES: [ReservationStatus; 2] =
    [ReservationStatus::Pending, ReservationStatus::Scheduled];

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub candidates: Vec<Candidate>,
    pub degraded: bool,
}

pub struct CandidateFetcher {
    geo: Arc<dyn GeoQuery>,
    store: Arc<dyn ReservationStore>,
    metrics: Metrics,
    test_mode: bool,
    default_radius_km: f64,
}

impl CandidateFetcher {
    pub fn new(
        geo: Arc<dyn GeoQuery>,
        store: Arc<dyn ReservationStore>,
        metrics: Metrics,
        test_mode: bool,
        default_radius_km: f64,
    ) -> Self {
        Self {
            geo,
            store,
            metrics,
            test_mode,
            default_radius_km,
        }
    }

    /// Retrieves the unassigned reservations this driver may claim.
    ///
    /// Radius-filtered via the geospatial capability in the normal path;
    /// every pending/scheduled reservation in test mode; empty when the
    /// driver is offline or has no known position.
    pub async fn fetch_candidates(&self, driver: &Driver) -> Result<FetchOutcome, DispatchError> {
        if self.test_mode {
            let all = self.store.list_by_status(&CANDIDATE_STATUSES).await?;
            debug!(count = all.len(), "test mode: bypassing radius filtering");
            return Ok(FetchOutcome {
                candidates: enrich(all, driver),
                degraded: false,
            });
        }

        if !driver.online {
            return Ok(FetchOutcome::default());
        }
        let Some(position) = driver.position.as_ref() else {
            debug!("driver position unknown; returning no candidates");
            return Ok(FetchOutcome::default());
        };

        let radius_meters = driver.search_radius_km.unwrap_or(self.default_radius_km) * 1_000.0;

        match self.radius_query(driver, position.point, radius_meters).await {
            Ok(reservations) => Ok(FetchOutcome {
                candidates: enrich(reservations, driver),
                degraded: false,
            }),
            Err(err) => {
                warn!(
                    error = %err,
                    "geospatial query failed; falling back to unfiltered legacy query"
                );
                self.metrics.degraded_fetches_total.inc();
                let all = self.store.list_unassigned(&CANDIDATE_STATUSES).await?;
                Ok(FetchOutcome {
                    candidates: enrich(all, driver),
                    degraded: true,
                })
            }
        }
    }

    /// One query per status so pending requests always precede scheduled
    /// ones; within each status the capability's distance order is kept.
    async fn radius_query(
        &self,
        driver: &Driver,
        center: GeoPoint,
        radius_meters: f64,
    ) -> Result<Vec<Reservation>, DispatchError> {
        let mut reservations = self
            .geo
            .find_within_radius(
                center,
                radius_meters,
                driver.vehicle_type,
                ReservationStatus::Pending,
            )
            .await?;
        let scheduled = self
            .geo
            .find_within_radius(
                center,
                radius_meters,
                driver.vehicle_type,
                ReservationStatus::Scheduled,
            )
            .await?;
        reservations.extend(scheduled);
        Ok(reservations)
    }

    /// The driver's own assigned reservations, feeding the
    /// scheduled-for-me view.
    pub async fn assigned_to(&self, driver: &Driver) -> Result<Vec<Candidate>, DispatchError> {
        let mine = self.store.list_assigned_to(driver.id).await?;
        Ok(enrich(mine, driver))
    }
}

fn enrich(reservations: Vec<Reservation>, driver: &Driver) -> Vec<Candidate> {
    reservations
        .into_iter()
        .map(|r| Candidate::enriched(r, driver.position.as_ref()))
        .collect()
}

/// Convenience for callers that only need ids.
pub fn candidate_ids(candidates: &[Candidate]) -> Vec<Uuid> {
    candidates.iter().map(|c| c.reservation.id).collect()
}
