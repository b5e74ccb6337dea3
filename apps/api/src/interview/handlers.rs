use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::auth::AuthUser;
use crate::candidates::handlers::{fetch_application_with_job, transition};
use crate::candidates::pipeline::ApplicationStatus;
use crate::errors::AppError;
use crate::interview::session::{
    append_transcript, create_session, get_session, parse_status, replace_transcript,
    set_analysis, set_status, transcript_text, InterviewStatus, NewSession, TranscriptTurn,
};
use crate::jobs::handlers::fetch_job;
use crate::models::interview::InterviewRow;
use crate::models::job::JobRow;
use crate::models::screening::ScreeningAssessmentRow;
use crate::screening::pipeline::{screen_and_persist, AssessmentLinks, MaterialKind, ScreeningInput};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub job_id: Option<Uuid>,
    pub candidate_application_id: Option<Uuid>,
    pub room_name: Option<String>,
    pub interview_config: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub status: Option<InterviewStatus>,
    pub analysis: Option<Value>,
    pub transcript: Option<Vec<TranscriptTurn>>,
}

#[derive(Debug, Deserialize)]
pub struct AppendTranscriptRequest {
    pub turns: Vec<TranscriptTurn>,
}

#[derive(Debug, Serialize)]
pub struct CompleteSessionResponse {
    pub session: InterviewRow,
    pub assessment: ScreeningAssessmentRow,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenMaterial {
    Transcript,
    Resume,
}

#[derive(Debug, Deserialize)]
pub struct ScreenTextRequest {
    pub text: String,
    pub kind: ScreenMaterial,
    pub job_id: Option<Uuid>,
}

/// POST /api/interview/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<InterviewRow>), AppError> {
    let (user_id, job) = match req.candidate_application_id {
        Some(app_id) => {
            let (application, job) = fetch_application_with_job(&state.db, app_id).await?;
            crate::candidates::handlers::authorize_view(&user, &application, &job)?;
            if req.job_id.is_some_and(|j| j != job.id) {
                return Err(AppError::Validation(
                    "job_id does not match the application's job".to_string(),
                ));
            }
            (application.candidate_id, Some(job))
        }
        None => {
            let job = match req.job_id {
                Some(id) => Some(fetch_job(&state.db, id).await?),
                None => None,
            };
            (user.id, job)
        }
    };

    let interview_config = req
        .interview_config
        .or_else(|| job.as_ref().map(|j| j.interview_config.clone()))
        .unwrap_or_else(|| json!({}));

    let session = create_session(
        &state.db,
        NewSession {
            user_id,
            job_id: job.as_ref().map(|j| j.id),
            candidate_application_id: req.candidate_application_id,
            interview_config,
            room_name: req.room_name,
        },
    )
    .await?;

    info!(session_id = %session.id, user_id = %user_id, "Interview session created");
    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "interview.create", "interview").entity_id(session.id),
    );

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/interview/sessions
pub async fn handle_list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SessionListQuery>,
) -> Result<Json<Vec<InterviewRow>>, AppError> {
    let target = params.user_id.unwrap_or(user.id);
    user.require_self_or_admin(target)?;

    let rows = sqlx::query_as::<_, InterviewRow>(
        "SELECT * FROM interviews WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(target)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// GET /api/interview/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<InterviewRow>, AppError> {
    let (session, _) = load_authorized(&state, &user, id).await?;
    Ok(Json(session))
}

/// PATCH /api/interview/sessions/:id
pub async fn handle_update_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<Json<InterviewRow>, AppError> {
    let (mut session, _) = load_authorized(&state, &user, id).await?;

    if let Some(turns) = &req.transcript {
        if parse_status(&session)?.is_closed() {
            return Err(AppError::Conflict(format!("Interview session {id} is closed")));
        }
        session = replace_transcript(&state.db, id, turns).await?;
    }
    if let Some(analysis) = &req.analysis {
        if !analysis.is_object() {
            return Err(AppError::Validation("analysis must be a JSON object".to_string()));
        }
        session = set_analysis(&state.db, id, analysis).await?;
    }
    if let Some(status) = req.status {
        if parse_status(&session)? != status {
            session = set_status(&state.db, &session, status).await?;
        }
    }

    Ok(Json(session))
}

/// POST /api/interview/sessions/:id/transcript
pub async fn handle_append_transcript(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<AppendTranscriptRequest>,
) -> Result<Json<InterviewRow>, AppError> {
    load_authorized(&state, &user, id).await?;
    if req.turns.is_empty() {
        return Err(AppError::Validation("turns cannot be empty".to_string()));
    }
    Ok(Json(append_transcript(&state.db, id, &req.turns).await?))
}

/// POST /api/interview/sessions/:id/complete
///
/// Closes the session, screens its transcript and stores the result as the
/// session analysis. A linked application moves from interviewing to interviewed.
pub async fn handle_complete_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<CompleteSessionResponse>, AppError> {
    let (session, job) = load_authorized(&state, &user, id).await?;
    if parse_status(&session)? != InterviewStatus::InProgress {
        return Err(AppError::Conflict(format!(
            "Interview session {id} is '{}' and cannot be completed",
            session.status
        )));
    }

    let text = transcript_text(&session.transcript);
    let assessment = screen_and_persist(
        &state.db,
        &state.llm,
        &ScreeningInput {
            material: &text,
            kind: MaterialKind::Transcript,
            job: job.as_ref(),
        },
        &AssessmentLinks {
            user_id: session.user_id,
            job_id: session.job_id,
            candidate_application_id: session.candidate_application_id,
            interview_id: Some(session.id),
        },
    )
    .await?;

    set_status(&state.db, &session, InterviewStatus::Completed).await?;
    let analysis = json!({
        "assessment_id": assessment.id,
        "score": assessment.score,
        "summary": assessment.summary,
        "strengths": assessment.strengths,
        "weaknesses": assessment.weaknesses,
        "recommendation": assessment.recommendation,
    });
    let session = set_analysis(&state.db, id, &analysis).await?;

    if let Some(app_id) = session.candidate_application_id {
        advance_application(&state, app_id, assessment.score).await;
    }

    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "interview.complete", "interview")
            .entity_id(id)
            .details(json!({ "score": assessment.score })),
    );

    Ok(Json(CompleteSessionResponse {
        session,
        assessment,
    }))
}

/// POST /api/interview/screen
pub async fn handle_screen_text(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ScreenTextRequest>,
) -> Result<(StatusCode, Json<ScreeningAssessmentRow>), AppError> {
    let job = match req.job_id {
        Some(id) => Some(fetch_job(&state.db, id).await?),
        None => None,
    };
    let kind = match req.kind {
        ScreenMaterial::Transcript => MaterialKind::Transcript,
        ScreenMaterial::Resume => MaterialKind::Resume,
    };

    let assessment = screen_and_persist(
        &state.db,
        &state.llm,
        &ScreeningInput {
            material: &req.text,
            kind,
            job: job.as_ref(),
        },
        &AssessmentLinks {
            user_id: user.id,
            job_id: job.as_ref().map(|j| j.id),
            ..Default::default()
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(assessment)))
}

/// Loads a session the caller may see: its subject, the job's employer or an admin.
pub async fn load_authorized(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> Result<(InterviewRow, Option<JobRow>), AppError> {
    let session = get_session(&state.db, id).await?;
    let job = match session.job_id {
        Some(job_id) => Some(fetch_job(&state.db, job_id).await?),
        None => None,
    };

    let is_employer = job.as_ref().is_some_and(|j| j.employer_id == user.id);
    if session.user_id == user.id || user.is_admin() || is_employer {
        Ok((session, job))
    } else {
        Err(AppError::Forbidden)
    }
}

/// Best-effort: the interview result is already stored when this runs.
async fn advance_application(state: &AppState, app_id: Uuid, score: i32) {
    let result = async {
        let (application, _) = fetch_application_with_job(&state.db, app_id).await?;
        if application.status == ApplicationStatus::Interviewing.as_str() {
            transition(&state.db, &application, ApplicationStatus::Interviewed).await?;
        }
        sqlx::query("UPDATE candidates SET score = $2, updated_at = now() WHERE id = $1")
            .bind(app_id)
            .bind(score)
            .execute(&state.db)
            .await?;
        Ok::<_, AppError>(())
    }
    .await;

    if let Err(e) = result {
        warn!(application_id = %app_id, "Failed to advance application after interview: {e}");
    }
}
