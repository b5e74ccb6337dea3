//! Asynchronous interview report generation.
//!
//! Requests push a [`ReportJob`] onto a redis list; a single worker task pops
//! jobs, renders the PDFs, uploads them and emails them out. Job progress is
//! kept in a per-report redis hash that expires a week after its last update.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::try_join_all;
use redis::aio::MultiplexedConnection;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::session::{get_session, Speaker, TranscriptTurn};
use crate::llm_client::prompts::truncate_chars;
use crate::models::job::JobRow;
use crate::models::screening::ScreeningAssessmentRow;
use crate::models::user::UserRow;
use crate::notifications::{templates, EmailAttachment, Mailer};
use crate::reports::pdf::{render_candidate_summary, render_report, InterviewReport, RenderError};
use crate::storage::{report_key, Storage};

pub const QUEUE_KEY: &str = "hirewire:reports:queue";
const STATUS_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const POP_TIMEOUT_SECS: u64 = 5;
const EXCERPT_TURNS: usize = 40;
const EXCERPT_TURN_CHARS: usize = 600;

pub fn status_key(report_id: Uuid) -> String {
    format!("hirewire:report:{report_id}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportJob {
    pub report_id: Uuid,
    pub interview_id: Uuid,
    pub requested_by: Uuid,
    pub email_to: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Queued,
    Rendering,
    Done,
    Failed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Queued => "queued",
            ReportStatus::Rendering => "rendering",
            ReportStatus::Done => "done",
            ReportStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(ReportStatus::Queued),
            "rendering" => Some(ReportStatus::Rendering),
            "done" => Some(ReportStatus::Done),
            "failed" => Some(ReportStatus::Failed),
            _ => None,
        }
    }
}

/// The status hash as returned to clients.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportState {
    pub report_id: Uuid,
    pub status: ReportStatus,
    pub interview_id: Uuid,
    pub requested_by: Uuid,
    pub report_key: Option<String>,
    pub summary_key: Option<String>,
    pub error: Option<String>,
    pub updated_at: Option<String>,
}

impl ReportState {
    fn from_hash(report_id: Uuid, fields: &HashMap<String, String>) -> Option<Self> {
        let get = |k: &str| fields.get(k).filter(|v| !v.is_empty()).cloned();
        Some(Self {
            report_id,
            status: ReportStatus::parse(fields.get("status")?)?,
            interview_id: fields.get("interview_id")?.parse().ok()?,
            requested_by: fields.get("requested_by")?.parse().ok()?,
            report_key: get("report_key"),
            summary_key: get("summary_key"),
            error: get("error"),
            updated_at: get("updated_at"),
        })
    }
}

fn redis_error(e: redis::RedisError) -> AppError {
    AppError::Internal(anyhow::anyhow!("redis: {e}"))
}

async fn write_status(
    conn: &mut MultiplexedConnection,
    report_id: Uuid,
    fields: &[(&str, String)],
) -> redis::RedisResult<()> {
    let key = status_key(report_id);
    let mut hset = redis::cmd("HSET");
    hset.arg(&key);
    for (field, value) in fields {
        hset.arg(*field).arg(value);
    }
    hset.arg("updated_at").arg(Utc::now().to_rfc3339());

    redis::pipe()
        .add_command(hset)
        .ignore()
        .cmd("EXPIRE")
        .arg(&key)
        .arg(STATUS_TTL_SECS)
        .ignore()
        .query_async::<_, ()>(conn)
        .await
}

/// Records the job as queued and pushes it for the worker.
pub async fn enqueue(client: &redis::Client, job: &ReportJob) -> Result<(), AppError> {
    let payload = serde_json::to_string(job).map_err(|e| AppError::Internal(e.into()))?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(redis_error)?;

    write_status(
        &mut conn,
        job.report_id,
        &[
            ("status", ReportStatus::Queued.as_str().to_string()),
            ("interview_id", job.interview_id.to_string()),
            ("requested_by", job.requested_by.to_string()),
        ],
    )
    .await
    .map_err(redis_error)?;

    redis::cmd("LPUSH")
        .arg(QUEUE_KEY)
        .arg(payload)
        .query_async::<_, i64>(&mut conn)
        .await
        .map_err(redis_error)?;

    info!(report_id = %job.report_id, interview_id = %job.interview_id, "Report queued");
    Ok(())
}

pub async fn fetch_state(client: &redis::Client, report_id: Uuid) -> Result<ReportState, AppError> {
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .map_err(redis_error)?;
    let fields: HashMap<String, String> = redis::cmd("HGETALL")
        .arg(status_key(report_id))
        .query_async(&mut conn)
        .await
        .map_err(redis_error)?;

    ReportState::from_hash(report_id, &fields)
        .ok_or_else(|| AppError::NotFound(format!("Report {report_id} not found")))
}

// ────────────────────────────────────────────────────────────────────────────
// Report data
// ────────────────────────────────────────────────────────────────────────────

/// Gathers the session, its subject, its job and the latest assessment.
pub async fn load_report(pool: &PgPool, interview_id: Uuid) -> Result<InterviewReport, AppError> {
    let session = get_session(pool, interview_id).await?;

    let candidate = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(session.user_id)
        .fetch_one(pool)
        .await?;

    let job = match session.job_id {
        Some(job_id) => sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(pool)
            .await?,
        None => None,
    };

    let assessment = sqlx::query_as::<_, ScreeningAssessmentRow>(
        r#"
        SELECT * FROM screening_assessments
        WHERE interview_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(interview_id)
    .fetch_optional(pool)
    .await?;

    let turns: Vec<TranscriptTurn> =
        serde_json::from_value(session.transcript.clone()).unwrap_or_default();

    Ok(InterviewReport {
        interview_id,
        candidate_name: candidate.full_name.clone().unwrap_or_else(|| candidate.email.clone()),
        candidate_email: candidate.email,
        job_title: job.map(|j| j.title),
        score: assessment.as_ref().map(|a| a.score),
        recommendation: assessment.as_ref().map(|a| a.recommendation.clone()),
        summary: assessment.as_ref().map(|a| a.summary.clone()),
        strengths: assessment.as_ref().map(|a| a.strengths.clone()).unwrap_or_default(),
        weaknesses: assessment.map(|a| a.weaknesses).unwrap_or_default(),
        transcript_excerpt: excerpt(&turns),
        generated_at: Utc::now(),
    })
}

fn excerpt(turns: &[TranscriptTurn]) -> Vec<(String, String)> {
    turns
        .iter()
        .filter(|t| t.role != Speaker::System)
        .take(EXCERPT_TURNS)
        .map(|t| {
            let speaker = match t.role {
                Speaker::Candidate => "Candidate",
                _ => "Interviewer",
            };
            let text = truncate_chars(&t.text, EXCERPT_TURN_CHARS);
            let text = if text.len() < t.text.len() {
                format!("{text}...")
            } else {
                text.to_string()
            };
            (speaker.to_string(), text)
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Worker
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ReportWorker {
    pub pool: PgPool,
    pub storage: Storage,
    pub mailer: Mailer,
    pub redis: redis::Client,
}

impl ReportWorker {
    /// Spawns the consume loop. BRPOP holds its connection, so the worker
    /// uses its own rather than sharing the request path's.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Report worker started");
            loop {
                let mut conn = match self.redis.get_multiplexed_async_connection().await {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Report worker cannot reach redis: {e}");
                        tokio::time::sleep(Duration::from_secs(POP_TIMEOUT_SECS)).await;
                        continue;
                    }
                };
                if let Err(e) = self.consume(&mut conn).await {
                    error!("Report worker connection lost: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        })
    }

    async fn consume(&self, conn: &mut MultiplexedConnection) -> redis::RedisResult<()> {
        loop {
            let popped: Option<(String, String)> = redis::cmd("BRPOP")
                .arg(QUEUE_KEY)
                .arg(POP_TIMEOUT_SECS)
                .query_async(conn)
                .await?;
            let Some((_, payload)) = popped else {
                continue;
            };

            let job: ReportJob = match serde_json::from_str(&payload) {
                Ok(job) => job,
                Err(e) => {
                    warn!("Dropping malformed report job: {e}");
                    continue;
                }
            };

            write_status(
                conn,
                job.report_id,
                &[("status", ReportStatus::Rendering.as_str().to_string())],
            )
            .await?;

            let fields = match self.process(&job).await {
                Ok((report, summary)) => {
                    info!(report_id = %job.report_id, "Report generated");
                    vec![
                        ("status", ReportStatus::Done.as_str().to_string()),
                        ("report_key", report),
                        ("summary_key", summary),
                    ]
                }
                Err(e) => {
                    error!(report_id = %job.report_id, "Report generation failed: {e}");
                    vec![
                        ("status", ReportStatus::Failed.as_str().to_string()),
                        ("error", e.to_string()),
                    ]
                }
            };
            write_status(conn, job.report_id, &fields).await?;
        }
    }

    /// Renders, uploads and mails one report. Returns the two object keys.
    async fn process(&self, job: &ReportJob) -> Result<(String, String), AppError> {
        let data = load_report(&self.pool, job.interview_id).await?;

        let (report_pdf, summary_pdf) = tokio::task::spawn_blocking({
            let data = data.clone();
            move || -> Result<(Vec<u8>, Vec<u8>), RenderError> {
                Ok((render_report(&data)?, render_candidate_summary(&data)?))
            }
        })
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Internal(e.into()))?;

        let report = report_key(job.report_id, "report");
        let summary = report_key(job.report_id, "summary");
        try_join_all([
            self.storage.put(&report, report_pdf.clone(), "application/pdf"),
            self.storage.put(&summary, summary_pdf.clone(), "application/pdf"),
        ])
        .await?;

        if !job.email_to.is_empty() {
            let email = templates::report_ready(
                job.email_to.clone(),
                &data.candidate_name,
                data.job_title.as_deref().unwrap_or("General interview"),
                vec![
                    EmailAttachment {
                        file_name: "interview-report.pdf".to_string(),
                        content_type: "application/pdf",
                        bytes: report_pdf,
                    },
                    EmailAttachment {
                        file_name: "candidate-summary.pdf".to_string(),
                        content_type: "application/pdf",
                        bytes: summary_pdf,
                    },
                ],
            );
            // The PDFs are stored; a mail failure does not fail the report.
            if let Err(e) = self.mailer.send(email).await {
                warn!(report_id = %job.report_id, "Failed to email report: {e}");
            }
        }

        Ok((report, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(role: Speaker, text: &str) -> TranscriptTurn {
        TranscriptTurn {
            role,
            text: text.to_string(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_job_payload_shape() {
        let job = ReportJob {
            report_id: Uuid::nil(),
            interview_id: Uuid::nil(),
            requested_by: Uuid::nil(),
            email_to: vec!["hr@example.com".into()],
        };
        let payload = serde_json::to_value(&job).unwrap();
        assert_eq!(payload["email_to"][0], "hr@example.com");
        let back: ReportJob = serde_json::from_value(payload).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_state_from_hash() {
        let id = Uuid::new_v4();
        let interview = Uuid::new_v4();
        let mut fields = HashMap::new();
        fields.insert("status".to_string(), "done".to_string());
        fields.insert("interview_id".to_string(), interview.to_string());
        fields.insert("requested_by".to_string(), Uuid::nil().to_string());
        fields.insert("report_key".to_string(), report_key(id, "report"));
        fields.insert("error".to_string(), String::new());

        let state = ReportState::from_hash(id, &fields).unwrap();
        assert_eq!(state.status, ReportStatus::Done);
        assert_eq!(state.interview_id, interview);
        assert_eq!(state.report_key.as_deref(), Some(report_key(id, "report").as_str()));
        assert!(state.error.is_none());
        assert!(state.summary_key.is_none());
    }

    #[test]
    fn test_state_from_empty_hash_is_missing() {
        assert!(ReportState::from_hash(Uuid::new_v4(), &HashMap::new()).is_none());
    }

    #[test]
    fn test_excerpt_skips_system_and_truncates() {
        let long = "word ".repeat(400);
        let turns = vec![
            turn(Speaker::System, "session started"),
            turn(Speaker::Interviewer, "Tell me about yourself."),
            turn(Speaker::Candidate, &long),
        ];
        let lines = excerpt(&turns);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, "Interviewer");
        assert!(lines[1].1.ends_with("..."));
        assert!(lines[1].1.chars().count() <= EXCERPT_TURN_CHARS + 3);
    }

    #[test]
    fn test_status_key_format() {
        assert_eq!(status_key(Uuid::nil()), "hirewire:report:00000000-0000-0000-0000-000000000000");
    }
}
