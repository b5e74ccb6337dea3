use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RoomTimings;
use crate::errors::AppError;
use crate::models::room::RoomRow;
use crate::rooms::livekit::{LiveKitClient, LiveKitError};
use crate::rooms::registry::{self, next_status, RoomStatus};

/// Where the sweep reads open rooms and records their transitions.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn open_rooms(&self) -> Result<Vec<RoomRow>, AppError>;

    /// Applies `next` only if the room still has the status and activity
    /// time it was read with. Returns false when something moved first.
    async fn apply_transition(&self, room: &RoomRow, next: RoomStatus) -> Result<bool, AppError>;
}

#[async_trait]
impl RoomStore for PgPool {
    async fn open_rooms(&self) -> Result<Vec<RoomRow>, AppError> {
        registry::open_rooms(self).await
    }

    async fn apply_transition(&self, room: &RoomRow, next: RoomStatus) -> Result<bool, AppError> {
        registry::apply_transition(self, room, next).await
    }
}

/// The media server side of a room.
#[async_trait]
pub trait RoomTeardown: Send + Sync {
    async fn delete_room(&self, name: &str) -> Result<(), LiveKitError>;
}

#[async_trait]
impl RoomTeardown for LiveKitClient {
    async fn delete_room(&self, name: &str) -> Result<(), LiveKitError> {
        LiveKitClient::delete_room(self, name).await
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub idled: usize,
    pub closed: usize,
}

/// Pairs every room that should move with its next status.
pub fn plan_sweep(
    rooms: Vec<RoomRow>,
    idle_after_secs: i64,
    now: DateTime<Utc>,
) -> Vec<(RoomRow, RoomStatus)> {
    rooms
        .into_iter()
        .filter_map(|room| {
            let Some(current) = RoomStatus::parse(&room.status) else {
                warn!(room = %room.name, status = %room.status, "Skipping room with unknown status");
                return None;
            };
            let next = next_status(current, room.last_active_at, room.ttl_seconds, idle_after_secs, now)?;
            Some((room, next))
        })
        .collect()
}

/// Runs one pass over every open room.
pub async fn sweep_once<S, T>(
    store: &S,
    teardown: &T,
    timings: RoomTimings,
    now: DateTime<Utc>,
) -> Result<SweepReport, AppError>
where
    S: RoomStore + ?Sized,
    T: RoomTeardown + ?Sized,
{
    let mut report = SweepReport::default();
    let plan = plan_sweep(store.open_rooms().await?, timings.idle_after_secs, now);

    for (room, next) in plan {
        if !store.apply_transition(&room, next).await? {
            debug!(room = %room.name, "Room changed during sweep; leaving it");
            continue;
        }

        match next {
            RoomStatus::Idle => {
                info!(room = %room.name, "Room marked idle");
                report.idled += 1;
            }
            RoomStatus::Closed => {
                info!(room = %room.name, "Room expired and closed");
                report.closed += 1;
                if let Err(e) = teardown.delete_room(&room.name).await {
                    warn!(room = %room.name, "Failed to delete expired LiveKit room: {e}");
                }
            }
            RoomStatus::Active => {}
        }
    }

    Ok(report)
}

/// Spawns the periodic sweep. Failures are logged and the loop keeps going.
pub fn spawn_sweeper(pool: PgPool, livekit: LiveKitClient, timings: RoomTimings) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(timings.sweep_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_secs = timings.sweep_interval_secs,
            idle_after_secs = timings.idle_after_secs,
            "Room sweeper started"
        );

        loop {
            ticker.tick().await;
            match sweep_once(&pool, &livekit, timings, Utc::now()).await {
                Ok(report) if report != SweepReport::default() => {
                    info!(idled = report.idled, closed = report.closed, "Room sweep finished");
                }
                Ok(_) => {}
                Err(e) => error!("Room sweep failed: {e}"),
            }
        }
    })
}
