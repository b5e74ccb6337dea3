//! Interview session bookkeeping: transcript turns, status lifecycle and the
//! row-level operations behind the session endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::interview::InterviewRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl InterviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewStatus::Pending => "pending",
            InterviewStatus::InProgress => "in_progress",
            InterviewStatus::Completed => "completed",
            InterviewStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(InterviewStatus::Pending),
            "in_progress" => Some(InterviewStatus::InProgress),
            "completed" => Some(InterviewStatus::Completed),
            "cancelled" => Some(InterviewStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, InterviewStatus::Completed | InterviewStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: InterviewStatus) -> bool {
        use InterviewStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Candidate,
    Interviewer,
    System,
}

impl Speaker {
    fn label(&self) -> &'static str {
        match self {
            Speaker::Candidate => "Candidate",
            Speaker::Interviewer => "Interviewer",
            Speaker::System => "System",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptTurn {
    pub role: Speaker,
    pub text: String,
    #[serde(default = "Utc::now")]
    pub at: DateTime<Utc>,
}

/// Appends non-empty turns to a stored transcript array. A stored value
/// that is not an array is treated as empty.
pub fn append_turns(existing: &Value, turns: &[TranscriptTurn]) -> Result<Value, AppError> {
    let mut merged: Vec<TranscriptTurn> = match existing {
        Value::Array(_) => serde_json::from_value(existing.clone())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("stored transcript is malformed: {e}")))?,
        _ => Vec::new(),
    };
    merged.extend(
        turns
            .iter()
            .filter(|t| !t.text.trim().is_empty())
            .map(|t| TranscriptTurn {
                text: t.text.trim().to_string(),
                ..t.clone()
            }),
    );
    serde_json::to_value(merged).map_err(|e| AppError::Internal(e.into()))
}

/// Renders a transcript as `Speaker: text` lines for prompting and reports.
pub fn transcript_text(transcript: &Value) -> String {
    let turns: Vec<TranscriptTurn> = serde_json::from_value(transcript.clone()).unwrap_or_default();
    turns
        .iter()
        .filter(|t| t.role != Speaker::System)
        .map(|t| format!("{}: {}", t.role.label(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn parse_status(row: &InterviewRow) -> Result<InterviewStatus, AppError> {
    InterviewStatus::parse(&row.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "interview {} has unknown status '{}'",
            row.id,
            row.status
        ))
    })
}

pub struct NewSession {
    pub user_id: Uuid,
    pub job_id: Option<Uuid>,
    pub candidate_application_id: Option<Uuid>,
    pub interview_config: Value,
    pub room_name: Option<String>,
}

pub async fn create_session(pool: &PgPool, new: NewSession) -> Result<InterviewRow, AppError> {
    Ok(sqlx::query_as::<_, InterviewRow>(
        r#"
        INSERT INTO interviews
            (id, candidate_application_id, user_id, job_id, status, interview_config, room_name)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.candidate_application_id)
    .bind(new.user_id)
    .bind(new.job_id)
    .bind(InterviewStatus::Pending.as_str())
    .bind(&new.interview_config)
    .bind(&new.room_name)
    .fetch_one(pool)
    .await?)
}

pub async fn get_session(pool: &PgPool, id: Uuid) -> Result<InterviewRow, AppError> {
    sqlx::query_as::<_, InterviewRow>("SELECT * FROM interviews WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview session {id} not found")))
}

/// Appends turns under a row lock. The first append starts the session.
pub async fn append_transcript(
    pool: &PgPool,
    id: Uuid,
    turns: &[TranscriptTurn],
) -> Result<InterviewRow, AppError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, InterviewRow>("SELECT * FROM interviews WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview session {id} not found")))?;

    let status = parse_status(&row)?;
    if status.is_closed() {
        return Err(AppError::Conflict(format!(
            "Interview session {id} is {}",
            status.as_str()
        )));
    }

    let transcript = append_turns(&row.transcript, turns)?;
    let updated = sqlx::query_as::<_, InterviewRow>(
        r#"
        UPDATE interviews SET
            transcript = $2,
            status     = $3,
            started_at = COALESCE(started_at, now()),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&transcript)
    .bind(InterviewStatus::InProgress.as_str())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(updated)
}

/// Moves a session to `next`, guarded on the status that was read.
pub async fn set_status(
    pool: &PgPool,
    row: &InterviewRow,
    next: InterviewStatus,
) -> Result<InterviewRow, AppError> {
    let current = parse_status(row)?;
    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot move interview from '{}' to '{}'",
            current.as_str(),
            next.as_str()
        )));
    }

    sqlx::query_as::<_, InterviewRow>(
        r#"
        UPDATE interviews SET
            status     = $3,
            started_at = CASE WHEN $3 = 'in_progress' THEN COALESCE(started_at, now()) ELSE started_at END,
            ended_at   = CASE WHEN $3 IN ('completed', 'cancelled') THEN now() ELSE ended_at END,
            updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(row.id)
    .bind(current.as_str())
    .bind(next.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Interview status changed concurrently".to_string()))
}

pub async fn set_analysis(pool: &PgPool, id: Uuid, analysis: &Value) -> Result<InterviewRow, AppError> {
    Ok(sqlx::query_as::<_, InterviewRow>(
        "UPDATE interviews SET analysis = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(analysis)
    .fetch_one(pool)
    .await?)
}

pub async fn replace_transcript(
    pool: &PgPool,
    id: Uuid,
    turns: &[TranscriptTurn],
) -> Result<InterviewRow, AppError> {
    let transcript = append_turns(&Value::Array(vec![]), turns)?;
    Ok(sqlx::query_as::<_, InterviewRow>(
        "UPDATE interviews SET transcript = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&transcript)
    .fetch_one(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn turn(role: Speaker, text: &str) -> TranscriptTurn {
        TranscriptTurn {
            role,
            text: text.to_string(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_append_preserves_order_and_skips_blank() {
        let first = append_turns(&json!([]), &[turn(Speaker::Interviewer, "Hi there")]).unwrap();
        let second = append_turns(
            &first,
            &[turn(Speaker::Candidate, "  Hello  "), turn(Speaker::Candidate, "   ")],
        )
        .unwrap();
        let turns: Vec<TranscriptTurn> = serde_json::from_value(second).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "Hi there");
        assert_eq!(turns[1].text, "Hello");
    }

    #[test]
    fn test_append_to_null_starts_fresh() {
        let value = append_turns(&Value::Null, &[turn(Speaker::Candidate, "ok")]).unwrap();
        assert_eq!(value.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_append_rejects_malformed_array() {
        assert!(append_turns(&json!([{"nope": 1}]), &[]).is_err());
    }

    #[test]
    fn test_turn_timestamp_defaults() {
        let t: TranscriptTurn = serde_json::from_value(json!({"role": "candidate", "text": "x"})).unwrap();
        assert_eq!(t.role, Speaker::Candidate);
    }

    #[test]
    fn test_transcript_text_skips_system_turns() {
        let transcript = json!([
            {"role": "system", "text": "session started", "at": "2024-05-01T10:00:00Z"},
            {"role": "interviewer", "text": "Why Rust?", "at": "2024-05-01T10:00:01Z"},
            {"role": "candidate", "text": "Memory safety.", "at": "2024-05-01T10:00:05Z"}
        ]);
        assert_eq!(
            transcript_text(&transcript),
            "Interviewer: Why Rust?\nCandidate: Memory safety."
        );
    }

    #[test]
    fn test_status_transitions() {
        use InterviewStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(InProgress));
        assert!(Cancelled.is_closed());
    }
}
