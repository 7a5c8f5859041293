mod config;
mod engine;
mod error;
mod geo;
mod models;
mod observability;
mod state;
mod store;

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::engine::session::{Collaborators, DriverSession};
use crate::geo::{codec, GeoPoint};
use crate::models::driver::Driver;
use crate::models::reservation::{Reservation, ReservationStatus, VehicleType};
use crate::store::memory::{FixedLocationSource, MemoryStore, NoopWakeLock};

#[tokio::main]
async fn main() -> Result<(), error::DispatchError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let store = Arc::new(MemoryStore::new());
    seed_reservations(&store);

    let driver = Driver::new(Uuid::new_v4(), VehicleType::Sedan);
    let collaborators = Collaborators {
        geo: store.clone(),
        reservations: store.clone(),
        positions: store.clone(),
        location: Arc::new(FixedLocationSource::new(
            GeoPoint::new(48.8566, 2.3522).expect("valid seed position"),
            12.0,
        )),
        wake_lock: Arc::new(NoopWakeLock),
    };

    let mut session = DriverSession::new(config, driver, collaborators);

    let mut updates = session.refresh_stream();
    tokio::spawn(async move {
        while let Some(refresh) = updates.next().await {
            tracing::debug!(
                is_refreshing = refresh.is_refreshing,
                consecutive_errors = refresh.consecutive_errors,
                is_active = refresh.is_active,
                "refresh state"
            );
        }
    });

    session.set_online(true).await;

    // Let the first refresh and position sample land.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let board = session.board();
    tracing::info!(
        new_requests = board.new_requests.len(),
        scheduled_for_me = board.scheduled_for_me.len(),
        degraded = board.degraded,
        "board after first refresh"
    );
    println!("{}", serde_json::to_string_pretty(&board).unwrap_or_default());

    if let Some(first) = board.new_requests.first() {
        let outcome = session.accept(first.reservation.id, true).await?;
        tracing::info!(reservation_id = %first.reservation.id, ?outcome, "accept attempt");
    }

    tokio::signal::ctrl_c().await.ok();
    session.set_online(false).await;
    Ok(())
}

fn seed_reservations(store: &MemoryStore) {
    let pickups = [
        (48.8600, 2.3400),
        (48.8500, 2.3600),
        (48.8700, 2.3300),
    ];
    for (i, (lat, lng)) in pickups.iter().enumerate() {
        let scheduled = i == 2;
        store.insert_reservation(Reservation {
            id: Uuid::new_v4(),
            status: if scheduled {
                ReservationStatus::Scheduled
            } else {
                ReservationStatus::Pending
            },
            pickup_point: codec::encode(&GeoPoint::new(*lat, *lng).expect("valid seed pickup")),
            dropoff_point: "POINT(2.5847236 48.6273519)".to_string(),
            vehicle_type: VehicleType::Sedan,
            assigned_driver_id: None,
            scheduled_for: scheduled.then(|| Utc::now() + Duration::hours(8)),
            validation_code: None,
            validated_at: None,
            created_at: Utc::now(),
        });
    }
}
