use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResumeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub version: i32,
    pub file_name: String,
    pub s3_key: String,
    pub size_bytes: i64,
    #[serde(skip_serializing)]
    pub extracted_text: Option<String>,
    pub is_current: bool,
    pub created_at: DateTime<Utc>,
}
