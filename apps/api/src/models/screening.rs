use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScreeningAssessmentRow {
    pub id: Uuid,
    pub candidate_application_id: Option<Uuid>,
    pub interview_id: Option<Uuid>,
    pub user_id: Uuid,
    pub job_id: Option<Uuid>,
    pub score: i32,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendation: String,
    pub raw: Value,
    pub model: String,
    pub created_at: DateTime<Utc>,
}
