use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::auth::AuthUser;
use crate::avatar::renderer::{AvatarError, AvatarRequest};
use crate::errors::AppError;
use crate::storage::avatar_key;
use crate::state::AppState;

const MAX_TEXT_CHARS: usize = 5_000;

#[derive(Debug, Serialize)]
pub struct AvatarRenderResponse {
    pub render_id: Uuid,
    pub key: String,
    pub size_bytes: usize,
}

/// POST /api/avatar/render
pub async fn handle_render_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<AvatarRequest>,
) -> Result<(StatusCode, Json<AvatarRenderResponse>), AppError> {
    let renderer = state
        .avatar
        .as_ref()
        .ok_or_else(|| AppError::ServiceUnavailable("Avatar rendering is not configured".to_string()))?;

    let text_len = req.text.trim().chars().count();
    if text_len == 0 {
        return Err(AppError::Validation("text cannot be empty".to_string()));
    }
    if text_len > MAX_TEXT_CHARS {
        return Err(AppError::Validation(format!(
            "text must be at most {MAX_TEXT_CHARS} characters"
        )));
    }

    let video = renderer.render(&req).await.map_err(|e| {
        warn!(user_id = %user.id, "Avatar render failed: {e}");
        match e {
            AvatarError::Io(inner) => AppError::Internal(inner.into()),
            other => AppError::Upstream(other.to_string()),
        }
    })?;

    let render_id = Uuid::new_v4();
    let key = avatar_key(render_id);
    let size_bytes = video.len();
    state.storage.put(&key, video, "video/mp4").await?;

    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "avatar.render", "avatar")
            .entity_id(render_id)
            .details(json!({ "key": key, "size_bytes": size_bytes })),
    );

    Ok((
        StatusCode::CREATED,
        Json(AvatarRenderResponse {
            render_id,
            key,
            size_bytes,
        }),
    ))
}
