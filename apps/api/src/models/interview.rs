use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewRow {
    pub id: Uuid,
    pub candidate_application_id: Option<Uuid>,
    pub user_id: Uuid,
    pub job_id: Option<Uuid>,
    pub status: String,
    /// JSON array of `TranscriptTurn`.
    pub transcript: Value,
    pub analysis: Option<Value>,
    pub interview_config: Value,
    pub room_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
