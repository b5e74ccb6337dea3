use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoomRow {
    pub name: String,
    pub interview_id: Option<Uuid>,
    pub created_by: Uuid,
    pub ttl_seconds: i64,
    pub last_active_at: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}
