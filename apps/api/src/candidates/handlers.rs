use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::auth::AuthUser;
use crate::candidates::pipeline::{role_may_set, ApplicationStatus};
use crate::errors::AppError;
use crate::jobs::handlers::fetch_job;
use crate::models::candidate::CandidateRow;
use crate::models::job::{JobRow, JobStatus};
use crate::models::resume::ResumeRow;
use crate::models::user::{Role, UserRow};
use crate::notifications::templates;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub job_id: Uuid,
    pub resume_id: Option<Uuid>,
    pub cover_letter: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplicationListQuery {
    pub job_id: Option<Uuid>,
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ApplicationStatus,
}

#[derive(Debug, Serialize)]
pub struct ApplicationDetail {
    pub application: CandidateRow,
    pub job: JobRow,
}

/// POST /api/candidates
pub async fn handle_apply(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<ApplyRequest>,
) -> Result<(StatusCode, Json<CandidateRow>), AppError> {
    user.require_role(&[Role::Candidate])?;

    let job = fetch_job(&state.db, req.job_id).await?;
    if job.status != JobStatus::Open.as_str() {
        return Err(AppError::Conflict(format!(
            "Job {} is not accepting applications",
            job.id
        )));
    }

    let resume_id = match req.resume_id {
        Some(id) => {
            let owner: Option<Uuid> =
                sqlx::query_scalar("SELECT user_id FROM resumes WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&state.db)
                    .await?;
            match owner {
                Some(owner) if owner == user.id => Some(id),
                Some(_) => return Err(AppError::Forbidden),
                None => return Err(AppError::NotFound(format!("Resume {id} not found"))),
            }
        }
        None => sqlx::query_as::<_, ResumeRow>(
            "SELECT * FROM resumes WHERE user_id = $1 AND is_current",
        )
        .bind(user.id)
        .fetch_optional(&state.db)
        .await?
        .map(|r| r.id),
    };

    // The unique index on (job_id, candidate_id) makes the duplicate check atomic.
    let application = sqlx::query_as::<_, CandidateRow>(
        r#"
        INSERT INTO candidates (id, job_id, candidate_id, resume_id, status, cover_letter)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (job_id, candidate_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(job.id)
    .bind(user.id)
    .bind(resume_id)
    .bind(ApplicationStatus::Applied.as_str())
    .bind(&req.cover_letter)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::Conflict("You have already applied to this job".to_string()))?;

    info!(application_id = %application.id, job_id = %job.id, "Application created");
    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "application.create", "candidate")
            .entity_id(application.id)
            .details(json!({ "job_id": job.id })),
    );

    let name = display_name(&state.db, user.id, &user.email).await;
    state
        .mailer
        .send_in_background(templates::application_received(&user.email, &name, &job.title));

    Ok((StatusCode::CREATED, Json(application)))
}

/// GET /api/candidates
///
/// Employers see applications to their own jobs; admins see everything.
pub async fn handle_list_applications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ApplicationListQuery>,
) -> Result<Json<Vec<CandidateRow>>, AppError> {
    user.require_role(&[Role::Employer, Role::Admin])?;

    if let Some(job_id) = params.job_id {
        let job = fetch_job(&state.db, job_id).await?;
        user.require_self_or_admin(job.employer_id)?;
    }

    let employer_filter = (!user.is_admin()).then_some(user.id);
    let rows = sqlx::query_as::<_, CandidateRow>(
        r#"
        SELECT c.* FROM candidates c
        JOIN jobs j ON j.id = c.job_id
        WHERE ($1::uuid IS NULL OR c.job_id = $1)
          AND ($2::uuid IS NULL OR j.employer_id = $2)
          AND ($3::text IS NULL OR c.status = $3)
        ORDER BY c.score DESC NULLS LAST, c.created_at ASC
        "#,
    )
    .bind(params.job_id)
    .bind(employer_filter)
    .bind(params.status.map(|s| s.as_str()))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// GET /api/candidates/mine
pub async fn handle_my_applications(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<CandidateRow>>, AppError> {
    let rows = sqlx::query_as::<_, CandidateRow>(
        "SELECT * FROM candidates WHERE candidate_id = $1 ORDER BY created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;
    Ok(Json(rows))
}

/// GET /api/candidates/:id
pub async fn handle_get_application(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationDetail>, AppError> {
    let (application, job) = fetch_application_with_job(&state.db, id).await?;
    authorize_view(&user, &application, &job)?;
    Ok(Json(ApplicationDetail { application, job }))
}

/// PATCH /api/candidates/:id/status
pub async fn handle_update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusUpdateRequest>,
) -> Result<Json<CandidateRow>, AppError> {
    let (application, job) = fetch_application_with_job(&state.db, id).await?;
    authorize_view(&user, &application, &job)?;

    if !role_may_set(user.role, req.status) {
        return Err(AppError::Forbidden);
    }

    let updated = transition(&state.db, &application, req.status).await?;

    info!(
        application_id = %id,
        from = %application.status,
        to = %updated.status,
        "Application status changed"
    );
    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "application.status", "candidate")
            .entity_id(id)
            .details(json!({ "from": application.status, "to": updated.status })),
    );

    if let Some(candidate) = fetch_user(&state.db, application.candidate_id).await? {
        let name = candidate.full_name.clone().unwrap_or_else(|| candidate.email.clone());
        state.mailer.send_in_background(templates::status_changed(
            &candidate.email,
            &name,
            &job.title,
            &updated.status,
        ));
    }

    Ok(Json(updated))
}

/// Applies a validated pipeline transition. The update is conditional on the
/// status read, so a concurrent change surfaces as a conflict instead of being lost.
pub async fn transition(
    pool: &PgPool,
    application: &CandidateRow,
    next: ApplicationStatus,
) -> Result<CandidateRow, AppError> {
    let current = ApplicationStatus::parse(&application.status).ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "application {} has unknown status '{}'",
            application.id,
            application.status
        ))
    })?;

    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "Cannot move application from '{}' to '{}'",
            current.as_str(),
            next.as_str()
        )));
    }

    sqlx::query_as::<_, CandidateRow>(
        r#"
        UPDATE candidates SET status = $3, updated_at = now()
        WHERE id = $1 AND status = $2
        RETURNING *
        "#,
    )
    .bind(application.id)
    .bind(current.as_str())
    .bind(next.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Application status changed concurrently".to_string()))
}

pub async fn fetch_application_with_job(
    pool: &PgPool,
    id: Uuid,
) -> Result<(CandidateRow, JobRow), AppError> {
    let application = sqlx::query_as::<_, CandidateRow>("SELECT * FROM candidates WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Application {id} not found")))?;
    let job = fetch_job(pool, application.job_id).await?;
    Ok((application, job))
}

/// The applicant, the job's employer and admins may see an application.
pub fn authorize_view(
    user: &AuthUser,
    application: &CandidateRow,
    job: &JobRow,
) -> Result<(), AppError> {
    if user.is_admin() || user.id == application.candidate_id || user.id == job.employer_id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

async fn fetch_user(pool: &PgPool, id: Uuid) -> Result<Option<UserRow>, AppError> {
    Ok(sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

async fn display_name(pool: &PgPool, id: Uuid, fallback: &str) -> String {
    match fetch_user(pool, id).await {
        Ok(Some(UserRow {
            full_name: Some(name),
            ..
        })) => name,
        _ => fallback.to_string(),
    }
}
