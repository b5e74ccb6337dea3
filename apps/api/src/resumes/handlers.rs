use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::resume::ResumeRow;
use crate::resumes::extract::{extract_text, validate_pdf};
use crate::resumes::versioning::{
    commit_resume_version, get_current_resume, get_resume, get_resume_history, NewResume,
};
use crate::state::AppState;

/// POST /api/resumes (multipart, field `file`)
pub async fn handle_upload_resume(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ResumeRow>), AppError> {
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("resume.pdf").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
        upload = Some((file_name, content_type, bytes.to_vec()));
        break;
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    validate_pdf(&bytes, content_type.as_deref())?;

    let extracted_text = extract_text(bytes.clone()).await;

    let row = commit_resume_version(
        &state.db,
        &state.storage,
        NewResume {
            user_id: user.id,
            file_name,
            bytes,
            extracted_text,
        },
    )
    .await?;

    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "resume.upload", "resume")
            .entity_id(row.id)
            .details(json!({ "version": row.version, "has_text": row.extracted_text.is_some() })),
    );

    Ok((StatusCode::CREATED, Json(row)))
}

/// GET /api/resumes/current
pub async fn handle_current_resume(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ResumeRow>, AppError> {
    get_current_resume(&state.db, user.id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No resume uploaded yet".to_string()))
}

/// GET /api/resumes
pub async fn handle_resume_history(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<ResumeRow>>, AppError> {
    Ok(Json(get_resume_history(&state.db, user.id).await?))
}

/// GET /api/resumes/:id
///
/// Owners and admins always; employers only when the resume is attached to
/// an application for one of their jobs.
pub async fn handle_get_resume(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ResumeRow>, AppError> {
    let resume = get_resume(&state.db, id).await?;
    if resume.user_id == user.id || user.is_admin() {
        return Ok(Json(resume));
    }

    let employer_can_see: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM candidates c JOIN jobs j ON j.id = c.job_id
            WHERE c.resume_id = $1 AND j.employer_id = $2
        )
        "#,
    )
    .bind(id)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    if employer_can_see {
        Ok(Json(resume))
    } else {
        Err(AppError::Forbidden)
    }
}
