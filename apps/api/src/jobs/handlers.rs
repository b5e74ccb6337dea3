use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::job::{JobRow, JobStatus};
use crate::models::user::Role;
use crate::state::AppState;

const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub employer_id: Option<Uuid>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub status: Option<JobStatus>,
    pub interview_config: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub employment_type: Option<String>,
    pub salary_min: Option<i32>,
    pub salary_max: Option<i32>,
    pub skills: Option<Vec<String>>,
    pub status: Option<JobStatus>,
    pub interview_config: Option<Value>,
}

/// GET /api/jobs
///
/// Drafts are listed only to their owner and to admins.
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Query(params): Query<JobListQuery>,
) -> Result<Json<Vec<JobRow>>, AppError> {
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s.replace('%', "\\%").replace('_', "\\_")));

    let jobs = sqlx::query_as::<_, JobRow>(
        r#"
        SELECT * FROM jobs
        WHERE ($1::text IS NULL OR status = $1)
          AND ($2::uuid IS NULL OR employer_id = $2)
          AND ($3::text IS NULL OR title ILIKE $3)
          AND (status <> 'draft' OR $6::bool OR employer_id = $7::uuid)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(params.status.map(|s| s.as_str()))
    .bind(params.employer_id)
    .bind(search)
    .bind(params.limit.unwrap_or(20).clamp(1, MAX_PAGE_SIZE))
    .bind(params.offset.unwrap_or(0).max(0))
    .bind(viewer.as_ref().is_some_and(AuthUser::is_admin))
    .bind(viewer.as_ref().map(|v| v.id))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(jobs))
}

/// GET /api/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    viewer: Option<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRow>, AppError> {
    let job = fetch_job(&state.db, id).await?;
    if !visible_to(&job, viewer.as_ref()) {
        return Err(AppError::NotFound(format!("Job {id} not found")));
    }
    Ok(Json(job))
}

/// POST /api/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobRow>), AppError> {
    user.require_role(&[Role::Employer, Role::Admin])?;
    validate_job_fields(
        Some(&req.title),
        Some(&req.description),
        req.salary_min,
        req.salary_max,
    )?;

    let job = sqlx::query_as::<_, JobRow>(
        r#"
        INSERT INTO jobs
            (id, employer_id, title, description, location, employment_type,
             salary_min, salary_max, skills, status, interview_config)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(req.title.trim())
    .bind(req.description.trim())
    .bind(&req.location)
    .bind(&req.employment_type)
    .bind(req.salary_min)
    .bind(req.salary_max)
    .bind(normalize_skills(&req.skills))
    .bind(req.status.unwrap_or(JobStatus::Draft).as_str())
    .bind(req.interview_config.unwrap_or_else(|| json!({})))
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "job.create", "job")
            .entity_id(job.id)
            .details(json!({ "title": job.title })),
    );

    Ok((StatusCode::CREATED, Json(job)))
}

/// PATCH /api/jobs/:id
pub async fn handle_update_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateJobRequest>,
) -> Result<Json<JobRow>, AppError> {
    let existing = fetch_job(&state.db, id).await?;
    user.require_self_or_admin(existing.employer_id)?;

    validate_job_fields(
        req.title.as_deref(),
        req.description.as_deref(),
        req.salary_min.or(existing.salary_min),
        req.salary_max.or(existing.salary_max),
    )?;

    let job = sqlx::query_as::<_, JobRow>(
        r#"
        UPDATE jobs SET
            title            = COALESCE($2, title),
            description      = COALESCE($3, description),
            location         = COALESCE($4, location),
            employment_type  = COALESCE($5, employment_type),
            salary_min       = COALESCE($6, salary_min),
            salary_max       = COALESCE($7, salary_max),
            skills           = COALESCE($8, skills),
            status           = COALESCE($9, status),
            interview_config = COALESCE($10, interview_config),
            updated_at       = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.title.as_deref().map(str::trim))
    .bind(req.description.as_deref().map(str::trim))
    .bind(&req.location)
    .bind(&req.employment_type)
    .bind(req.salary_min)
    .bind(req.salary_max)
    .bind(req.skills.as_deref().map(normalize_skills))
    .bind(req.status.map(|s| s.as_str()))
    .bind(&req.interview_config)
    .fetch_one(&state.db)
    .await?;

    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "job.update", "job").entity_id(id),
    );

    Ok(Json(job))
}

/// DELETE /api/jobs/:id
///
/// Jobs referenced by applications are never removed; deleting closes them.
pub async fn handle_delete_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let existing = fetch_job(&state.db, id).await?;
    user.require_self_or_admin(existing.employer_id)?;

    sqlx::query("UPDATE jobs SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(JobStatus::Closed.as_str())
        .execute(&state.db)
        .await?;

    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "job.close", "job").entity_id(id),
    );

    Ok(StatusCode::NO_CONTENT)
}

pub async fn fetch_job(pool: &sqlx::PgPool, id: Uuid) -> Result<JobRow, AppError> {
    sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
}

/// Drafts are hidden from everyone except their owner and admins.
fn visible_to(job: &JobRow, viewer: Option<&AuthUser>) -> bool {
    if JobStatus::parse(&job.status) != Some(JobStatus::Draft) {
        return true;
    }
    viewer.is_some_and(|v| v.is_admin() || v.id == job.employer_id)
}

fn validate_job_fields(
    title: Option<&str>,
    description: Option<&str>,
    salary_min: Option<i32>,
    salary_max: Option<i32>,
) -> Result<(), AppError> {
    if title.is_some_and(|t| t.trim().is_empty()) {
        return Err(AppError::Validation("title cannot be empty".to_string()));
    }
    if description.is_some_and(|d| d.trim().is_empty()) {
        return Err(AppError::Validation("description cannot be empty".to_string()));
    }
    if salary_min.is_some_and(|s| s < 0) || salary_max.is_some_and(|s| s < 0) {
        return Err(AppError::Validation("salary cannot be negative".to_string()));
    }
    if let (Some(min), Some(max)) = (salary_min, salary_max) {
        if min > max {
            return Err(AppError::Validation(
                "salary_min cannot exceed salary_max".to_string(),
            ));
        }
    }
    Ok(())
}

fn normalize_skills(skills: &[String]) -> Vec<String> {
    let mut out: Vec<String> = skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salary_range_must_be_ordered() {
        assert!(validate_job_fields(Some("Eng"), Some("Build"), Some(100), Some(50)).is_err());
        assert!(validate_job_fields(Some("Eng"), Some("Build"), Some(50), Some(100)).is_ok());
        assert!(validate_job_fields(Some("Eng"), Some("Build"), Some(50), None).is_ok());
    }

    #[test]
    fn test_blank_title_rejected() {
        assert!(matches!(
            validate_job_fields(Some("   "), Some("Build"), None, None),
            Err(AppError::Validation(_))
        ));
    }

    fn job(status: &str, employer_id: Uuid) -> JobRow {
        JobRow {
            id: Uuid::new_v4(),
            employer_id,
            title: "Backend engineer".to_string(),
            description: "Build the API".to_string(),
            location: None,
            employment_type: None,
            salary_min: None,
            salary_max: None,
            skills: vec![],
            status: status.to_string(),
            interview_config: json!({}),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn viewer(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "viewer@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_drafts_hidden_from_anonymous_and_other_employers() {
        let owner = viewer(Role::Employer);
        let draft = job("draft", owner.id);
        assert!(!visible_to(&draft, None));
        assert!(!visible_to(&draft, Some(&viewer(Role::Employer))));
        assert!(!visible_to(&draft, Some(&viewer(Role::Candidate))));
        assert!(visible_to(&draft, Some(&owner)));
        assert!(visible_to(&draft, Some(&viewer(Role::Admin))));
    }

    #[test]
    fn test_open_and_closed_jobs_are_public() {
        let employer = Uuid::new_v4();
        assert!(visible_to(&job("open", employer), None));
        assert!(visible_to(&job("closed", employer), None));
    }

    #[test]
    fn test_partial_update_skips_missing_fields() {
        assert!(validate_job_fields(None, None, None, None).is_ok());
    }

    #[test]
    fn test_normalize_skills_dedups_and_lowercases() {
        let skills = vec![
            "Rust".to_string(),
            " rust ".to_string(),
            "".to_string(),
            "Postgres".to_string(),
        ];
        assert_eq!(normalize_skills(&skills), vec!["postgres", "rust"]);
    }
}
