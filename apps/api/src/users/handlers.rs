use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::user::{Role, UserRow};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub headline: Option<String>,
    pub avatar_url: Option<String>,
}

/// GET /api/users
pub async fn handle_list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<UserListQuery>,
) -> Result<Json<Vec<UserRow>>, AppError> {
    user.require_role(&[Role::Admin])?;

    let rows = sqlx::query_as::<_, UserRow>(
        r#"
        SELECT * FROM users
        WHERE ($1::text IS NULL OR role = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(params.role.map(|r| r.as_str()))
    .bind(params.limit.unwrap_or(50).clamp(1, 100))
    .bind(params.offset.unwrap_or(0).max(0))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

/// GET /api/users/:id
pub async fn handle_get_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserRow>, AppError> {
    user.require_self_or_admin(id)?;

    let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))?;

    Ok(Json(row))
}

/// PATCH /api/users/:id
pub async fn handle_update_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserRow>, AppError> {
    user.require_self_or_admin(id)?;

    if req.full_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::Validation("full_name cannot be blank".to_string()));
    }

    let row = sqlx::query_as::<_, UserRow>(
        r#"
        UPDATE users SET
            full_name  = COALESCE($2, full_name),
            phone      = COALESCE($3, phone),
            headline   = COALESCE($4, headline),
            avatar_url = COALESCE($5, avatar_url),
            updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.full_name.as_deref().map(str::trim))
    .bind(&req.phone)
    .bind(&req.headline)
    .bind(&req.avatar_url)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User {id} not found")))?;

    Ok(Json(row))
}
