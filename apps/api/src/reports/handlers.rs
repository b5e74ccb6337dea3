use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::interview::handlers::load_authorized;
use crate::reports::queue::{enqueue, fetch_state, ReportJob, ReportState, ReportStatus};
use crate::state::AppState;

const MAX_RECIPIENTS: usize = 10;

#[derive(Debug, Deserialize, Default)]
pub struct ReportRequest {
    /// Recipients for the finished PDFs. Absent means the requester; empty
    /// means no email.
    pub email_to: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ReportAccepted {
    pub report_id: Uuid,
    pub status: ReportStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFile {
    Report,
    Summary,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    #[serde(default = "default_file")]
    pub file: ReportFile,
}

fn default_file() -> ReportFile {
    ReportFile::Report
}

/// POST /api/interview/sessions/:id/report
pub async fn handle_request_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(interview_id): Path<Uuid>,
    body: Option<Json<ReportRequest>>,
) -> Result<(StatusCode, Json<ReportAccepted>), AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    load_authorized(&state, &user, interview_id).await?;

    let email_to = recipients(req.email_to, &user.email)?;
    let job = ReportJob {
        report_id: Uuid::new_v4(),
        interview_id,
        requested_by: user.id,
        email_to,
    };
    enqueue(&state.redis, &job).await?;

    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "report.request", "interview").entity_id(interview_id),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ReportAccepted {
            report_id: job.report_id,
            status: ReportStatus::Queued,
        }),
    ))
}

/// GET /api/reports/:id
pub async fn handle_report_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(report_id): Path<Uuid>,
) -> Result<Json<ReportState>, AppError> {
    Ok(Json(authorized_state(&state, &user, report_id).await?))
}

/// GET /api/reports/:id/download?file=report|summary
pub async fn handle_download_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(report_id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = authorized_state(&state, &user, report_id).await?;
    let key = match query.file {
        ReportFile::Report => report.report_key,
        ReportFile::Summary => report.summary_key,
    }
    .ok_or_else(|| {
        AppError::Conflict(format!(
            "Report {report_id} is {} and has no file yet",
            report.status.as_str()
        ))
    })?;

    let bytes = state.storage.get(&key).await?;
    Ok(([(header::CONTENT_TYPE, "application/pdf")], bytes))
}

async fn authorized_state(
    state: &AppState,
    user: &AuthUser,
    report_id: Uuid,
) -> Result<ReportState, AppError> {
    let report = fetch_state(&state.redis, report_id).await?;
    if report.requested_by != user.id && !user.is_admin() {
        load_authorized(state, user, report.interview_id).await?;
    }
    Ok(report)
}

fn recipients(requested: Option<Vec<String>>, fallback: &str) -> Result<Vec<String>, AppError> {
    let list = match requested {
        None => return Ok(vec![fallback.to_string()]),
        Some(list) => list,
    };
    if list.len() > MAX_RECIPIENTS {
        return Err(AppError::Validation(format!(
            "At most {MAX_RECIPIENTS} recipients are allowed"
        )));
    }
    list.into_iter()
        .map(|addr| {
            let addr = addr.trim().to_string();
            if addr.contains('@') && !addr.contains(char::is_whitespace) {
                Ok(addr)
            } else {
                Err(AppError::Validation(format!("'{addr}' is not an email address")))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipients_default_to_requester() {
        assert_eq!(recipients(None, "me@x.io").unwrap(), vec!["me@x.io".to_string()]);
    }

    #[test]
    fn test_empty_recipient_list_means_no_email() {
        assert!(recipients(Some(vec![]), "me@x.io").unwrap().is_empty());
    }

    #[test]
    fn test_recipients_are_validated() {
        assert!(recipients(Some(vec![" hr@x.io ".into()]), "me@x.io").is_ok());
        assert!(matches!(
            recipients(Some(vec!["not-an-address".into()]), "me@x.io"),
            Err(AppError::Validation(_))
        ));
        assert!(recipients(Some(vec!["a@x.io".into(); 11]), "me@x.io").is_err());
    }

    #[test]
    fn test_download_defaults_to_report() {
        let q: DownloadQuery = serde_json::from_str("{}").unwrap();
        assert!(matches!(q.file, ReportFile::Report));
    }
}
