//! Room registry: lifecycle rules and the rows behind them.
//!
//! A room is `active` while heartbeats arrive, `idle` once none has been seen
//! for the idle threshold, and `closed` when its TTL elapses without activity
//! or it is closed explicitly. Closed is final for that registration; the
//! name may be registered again afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::room::RoomRow;

pub const MIN_TTL_SECS: i64 = 60;
pub const MAX_TTL_SECS: i64 = 24 * 60 * 60;
const MAX_NAME_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Active,
    Idle,
    Closed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Active => "active",
            RoomStatus::Idle => "idle",
            RoomStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(RoomStatus::Active),
            "idle" => Some(RoomStatus::Idle),
            "closed" => Some(RoomStatus::Closed),
            _ => None,
        }
    }
}

/// The status a room should move to at `now`, or `None` when it stays put.
pub fn next_status(
    current: RoomStatus,
    last_active_at: DateTime<Utc>,
    ttl_secs: i64,
    idle_after_secs: i64,
    now: DateTime<Utc>,
) -> Option<RoomStatus> {
    if current == RoomStatus::Closed {
        return None;
    }
    let elapsed = (now - last_active_at).num_seconds();
    if elapsed >= ttl_secs {
        Some(RoomStatus::Closed)
    } else if elapsed >= idle_after_secs && current == RoomStatus::Active {
        Some(RoomStatus::Idle)
    } else {
        None
    }
}

pub fn validate_room_name(name: &str) -> Result<(), AppError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Room name must be 1-{MAX_NAME_LEN} characters of [A-Za-z0-9_-]"
        )))
    }
}

pub fn generate_room_name() -> String {
    format!("interview-{}", Uuid::new_v4().simple())
}

pub struct NewRoom<'a> {
    pub name: &'a str,
    pub interview_id: Option<Uuid>,
    pub created_by: Uuid,
    pub ttl_seconds: i64,
}

/// Registers a room. A closed registration with the same name is replaced;
/// a live one is a conflict.
pub async fn register(pool: &PgPool, room: NewRoom<'_>) -> Result<RoomRow, AppError> {
    sqlx::query_as::<_, RoomRow>(
        r#"
        INSERT INTO rooms (name, interview_id, created_by, ttl_seconds, status)
        VALUES ($1, $2, $3, $4, 'active')
        ON CONFLICT (name) DO UPDATE SET
            interview_id   = EXCLUDED.interview_id,
            created_by     = EXCLUDED.created_by,
            ttl_seconds    = EXCLUDED.ttl_seconds,
            status         = 'active',
            last_active_at = now(),
            created_at     = now(),
            closed_at      = NULL
        WHERE rooms.status = 'closed'
        RETURNING *
        "#,
    )
    .bind(room.name)
    .bind(room.interview_id)
    .bind(room.created_by)
    .bind(room.ttl_seconds)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict(format!("Room '{}' is already open", room.name)))
}

pub async fn get_room(pool: &PgPool, name: &str) -> Result<RoomRow, AppError> {
    sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Room '{name}' not found")))
}

pub async fn list_rooms(
    pool: &PgPool,
    created_by: Option<Uuid>,
    status: Option<RoomStatus>,
) -> Result<Vec<RoomRow>, AppError> {
    Ok(sqlx::query_as::<_, RoomRow>(
        r#"
        SELECT * FROM rooms
        WHERE ($1::uuid IS NULL OR created_by = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY last_active_at DESC
        "#,
    )
    .bind(created_by)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?)
}

/// Records activity: refreshes `last_active_at` and revives idle rooms.
pub async fn touch(pool: &PgPool, name: &str) -> Result<RoomRow, AppError> {
    let updated = sqlx::query_as::<_, RoomRow>(
        r#"
        UPDATE rooms SET last_active_at = now(), status = 'active'
        WHERE name = $1 AND status <> 'closed'
        RETURNING *
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(row) => Ok(row),
        None => {
            get_room(pool, name).await?;
            Err(AppError::Conflict(format!("Room '{name}' is closed")))
        }
    }
}

/// Closes a room. Returns `None` when it was already closed.
pub async fn close(pool: &PgPool, name: &str) -> Result<Option<RoomRow>, AppError> {
    Ok(sqlx::query_as::<_, RoomRow>(
        r#"
        UPDATE rooms SET status = 'closed', closed_at = now()
        WHERE name = $1 AND status <> 'closed'
        RETURNING *
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?)
}

/// Applies a sweep decision only if the row is unchanged since it was read,
/// so a heartbeat racing the sweep always wins.
pub async fn apply_transition(
    pool: &PgPool,
    room: &RoomRow,
    next: RoomStatus,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE rooms SET
            status    = $2,
            closed_at = CASE WHEN $2 = 'closed' THEN now() ELSE closed_at END
        WHERE name = $1 AND status = $3 AND last_active_at = $4
        "#,
    )
    .bind(&room.name)
    .bind(next.as_str())
    .bind(&room.status)
    .bind(room.last_active_at)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn open_rooms(pool: &PgPool) -> Result<Vec<RoomRow>, AppError> {
    Ok(
        sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms WHERE status <> 'closed'")
            .fetch_all(pool)
            .await?,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const TTL: i64 = 3600;
    const IDLE: i64 = 300;

    fn at(secs_ago: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - Duration::seconds(secs_ago), now)
    }

    #[test]
    fn test_recent_activity_keeps_room_active() {
        let (last, now) = at(10);
        assert_eq!(next_status(RoomStatus::Active, last, TTL, IDLE, now), None);
    }

    #[test]
    fn test_quiet_room_goes_idle() {
        let (last, now) = at(IDLE);
        assert_eq!(
            next_status(RoomStatus::Active, last, TTL, IDLE, now),
            Some(RoomStatus::Idle)
        );
    }

    #[test]
    fn test_idle_room_stays_idle_until_ttl() {
        let (last, now) = at(IDLE + 60);
        assert_eq!(next_status(RoomStatus::Idle, last, TTL, IDLE, now), None);
    }

    #[test]
    fn test_ttl_expiry_closes_from_any_open_state() {
        let (last, now) = at(TTL);
        assert_eq!(
            next_status(RoomStatus::Active, last, TTL, IDLE, now),
            Some(RoomStatus::Closed)
        );
        assert_eq!(
            next_status(RoomStatus::Idle, last, TTL, IDLE, now),
            Some(RoomStatus::Closed)
        );
    }

    #[test]
    fn test_closed_rooms_never_move() {
        let (last, now) = at(TTL * 10);
        assert_eq!(next_status(RoomStatus::Closed, last, TTL, IDLE, now), None);
    }

    #[test]
    fn test_idle_threshold_above_ttl_closes_directly() {
        let (last, now) = at(120);
        assert_eq!(
            next_status(RoomStatus::Active, last, 100, 500, now),
            Some(RoomStatus::Closed)
        );
    }

    #[test]
    fn test_room_name_validation() {
        assert!(validate_room_name("interview-abc_123").is_ok());
        assert!(validate_room_name("").is_err());
        assert!(validate_room_name("has space").is_err());
        assert!(validate_room_name(&"x".repeat(129)).is_err());
        assert!(validate_room_name(&generate_room_name()).is_ok());
    }
}
