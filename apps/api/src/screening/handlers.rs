use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::auth::AuthUser;
use crate::candidates::handlers::{fetch_application_with_job, transition};
use crate::candidates::pipeline::ApplicationStatus;
use crate::errors::AppError;
use crate::models::candidate::CandidateRow;
use crate::models::screening::ScreeningAssessmentRow;
use crate::models::user::Role;
use crate::resumes::versioning::get_resume;
use crate::screening::pipeline::{screen_and_persist, AssessmentLinks, MaterialKind, ScreeningInput};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ApplicationScreeningResponse {
    pub application: CandidateRow,
    pub assessment: ScreeningAssessmentRow,
}

/// POST /api/candidates/:id/screen
///
/// Screens the application's resume against its job. The application is held
/// in `screening` while the LLM runs and restored to `applied` if it fails.
pub async fn handle_screen_application(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ApplicationScreeningResponse>), AppError> {
    user.require_role(&[Role::Employer, Role::Admin])?;
    let (application, job) = fetch_application_with_job(&state.db, id).await?;
    user.require_self_or_admin(job.employer_id)?;

    let resume_id = application
        .resume_id
        .ok_or_else(|| AppError::UnprocessableEntity("Application has no resume attached".to_string()))?;
    let resume_text = get_resume(&state.db, resume_id)
        .await?
        .extracted_text
        .ok_or_else(|| {
            AppError::UnprocessableEntity("Resume has no extractable text".to_string())
        })?;

    let screening = transition(&state.db, &application, ApplicationStatus::Screening).await?;

    let outcome = screen_and_persist(
        &state.db,
        &state.llm,
        &ScreeningInput {
            material: &resume_text,
            kind: MaterialKind::Resume,
            job: Some(&job),
        },
        &AssessmentLinks {
            user_id: application.candidate_id,
            job_id: Some(job.id),
            candidate_application_id: Some(id),
            interview_id: None,
        },
    )
    .await;

    let assessment = match outcome {
        Ok(assessment) => assessment,
        Err(e) => {
            restore_applied(&state, id).await;
            return Err(e);
        }
    };

    let screened = transition(&state.db, &screening, ApplicationStatus::Screened).await?;
    let application = sqlx::query_as::<_, CandidateRow>(
        "UPDATE candidates SET score = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(screened.id)
    .bind(assessment.score)
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "application.screen", "candidate")
            .entity_id(id)
            .details(json!({ "score": assessment.score, "assessment_id": assessment.id })),
    );

    Ok((
        StatusCode::CREATED,
        Json(ApplicationScreeningResponse {
            application,
            assessment,
        }),
    ))
}

/// GET /api/candidates/:id/assessments
pub async fn handle_list_assessments(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ScreeningAssessmentRow>>, AppError> {
    let (application, job) = fetch_application_with_job(&state.db, id).await?;
    crate::candidates::handlers::authorize_view(&user, &application, &job)?;

    let rows = sqlx::query_as::<_, ScreeningAssessmentRow>(
        r#"
        SELECT * FROM screening_assessments
        WHERE candidate_application_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

async fn restore_applied(state: &AppState, id: Uuid) {
    let result = sqlx::query(
        "UPDATE candidates SET status = $2, updated_at = now() WHERE id = $1 AND status = $3",
    )
    .bind(id)
    .bind(ApplicationStatus::Applied.as_str())
    .bind(ApplicationStatus::Screening.as_str())
    .execute(&state.db)
    .await;

    if let Err(e) = result {
        warn!(application_id = %id, "Failed to restore application after screening error: {e}");
    }
}
