use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::interview::handlers::load_authorized;
use crate::models::room::RoomRow;
use crate::rooms::registry::{
    self, generate_room_name, validate_room_name, NewRoom, RoomStatus, MAX_TTL_SECS, MIN_TTL_SECS,
};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: Option<String>,
    pub interview_id: Option<Uuid>,
    pub ttl_seconds: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RoomListQuery {
    pub status: Option<RoomStatus>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub identity: Option<String>,
    pub display_name: Option<String>,
    #[serde(default = "default_can_publish")]
    pub can_publish: bool,
}

fn default_can_publish() -> bool {
    true
}

impl Default for TokenRequest {
    fn default() -> Self {
        Self {
            identity: None,
            display_name: None,
            can_publish: default_can_publish(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub url: String,
    pub room: String,
}

/// POST /api/rooms
pub async fn handle_create_room(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomRow>), AppError> {
    let name = req.name.unwrap_or_else(generate_room_name);
    validate_room_name(&name)?;

    let ttl_seconds = req.ttl_seconds.unwrap_or(state.config.rooms.default_ttl_secs);
    if !(MIN_TTL_SECS..=MAX_TTL_SECS).contains(&ttl_seconds) {
        return Err(AppError::Validation(format!(
            "ttl_seconds must be between {MIN_TTL_SECS} and {MAX_TTL_SECS}"
        )));
    }

    if let Some(interview_id) = req.interview_id {
        load_authorized(&state, &user, interview_id).await?;
    }

    let room = registry::register(
        &state.db,
        NewRoom {
            name: &name,
            interview_id: req.interview_id,
            created_by: user.id,
            ttl_seconds,
        },
    )
    .await?;

    if let Some(interview_id) = req.interview_id {
        sqlx::query("UPDATE interviews SET room_name = $2, updated_at = now() WHERE id = $1")
            .bind(interview_id)
            .bind(&room.name)
            .execute(&state.db)
            .await?;
    }

    info!(room = %room.name, ttl_seconds, "Room registered");
    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "room.create", "room")
            .entity_id(&room.name)
            .details(serde_json::json!({ "ttl_seconds": ttl_seconds })),
    );

    Ok((StatusCode::CREATED, Json(room)))
}

/// GET /api/rooms
///
/// Admins see every room; everyone else sees the rooms they created.
pub async fn handle_list_rooms(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<RoomListQuery>,
) -> Result<Json<Vec<RoomRow>>, AppError> {
    let owner = (!user.is_admin()).then_some(user.id);
    Ok(Json(registry::list_rooms(&state.db, owner, params.status).await?))
}

/// GET /api/rooms/:name
pub async fn handle_get_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(name): Path<String>,
) -> Result<Json<RoomRow>, AppError> {
    let room = registry::get_room(&state.db, &name).await?;
    authorize_room(&state, &user, &room).await?;
    Ok(Json(room))
}

/// POST /api/rooms/:name/heartbeat
pub async fn handle_heartbeat(
    State(state): State<AppState>,
    user: AuthUser,
    Path(name): Path<String>,
) -> Result<Json<RoomRow>, AppError> {
    let room = registry::get_room(&state.db, &name).await?;
    authorize_room(&state, &user, &room).await?;
    Ok(Json(registry::touch(&state.db, &name).await?))
}

/// POST /api/rooms/:name/token
pub async fn handle_room_token(
    State(state): State<AppState>,
    user: AuthUser,
    Path(name): Path<String>,
    body: Option<Json<TokenRequest>>,
) -> Result<Json<TokenResponse>, AppError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let room = registry::get_room(&state.db, &name).await?;
    authorize_room(&state, &user, &room).await?;

    // Touching first rejects closed rooms with 409.
    let room = registry::touch(&state.db, &room.name).await?;

    let identity = participant_identity(&user, req.identity)?;
    let token = state
        .livekit
        .join_token(
            &room.name,
            &identity,
            req.display_name.as_deref(),
            req.can_publish,
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("LiveKit token signing failed: {e}")))?;

    Ok(Json(TokenResponse {
        token,
        url: state.livekit.public_url().to_string(),
        room: room.name,
    }))
}

/// DELETE /api/rooms/:name
pub async fn handle_close_room(
    State(state): State<AppState>,
    user: AuthUser,
    Path(name): Path<String>,
) -> Result<Json<RoomRow>, AppError> {
    let room = registry::get_room(&state.db, &name).await?;
    user.require_self_or_admin(room.created_by)?;

    let Some(closed) = registry::close(&state.db, &name).await? else {
        return Ok(Json(room));
    };

    if let Err(e) = state.livekit.delete_room(&name).await {
        warn!(room = %name, "Failed to delete LiveKit room: {e}");
    }

    info!(room = %name, "Room closed");
    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "room.close", "room").entity_id(&name),
    );

    Ok(Json(closed))
}

/// Admins may join under any identity; everyone else joins as themselves.
fn participant_identity(user: &AuthUser, requested: Option<String>) -> Result<String, AppError> {
    let own = user.id.to_string();
    match requested {
        Some(identity) if user.is_admin() => Ok(identity),
        Some(identity) if identity != own => Err(AppError::Forbidden),
        _ => Ok(own),
    }
}

/// The creator, an admin, or anyone allowed to see the linked interview.
async fn authorize_room(state: &AppState, user: &AuthUser, room: &RoomRow) -> Result<(), AppError> {
    if user.is_admin() || room.created_by == user.id {
        return Ok(());
    }
    match room.interview_id {
        Some(interview_id) => load_authorized(state, user, interview_id).await.map(|_| ()),
        None => Err(AppError::Forbidden),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::Role;

    #[test]
    fn test_token_request_defaults_to_publisher() {
        let req: TokenRequest = serde_json::from_str("{}").unwrap();
        assert!(req.can_publish);
        assert!(req.identity.is_none());
        assert!(TokenRequest::default().can_publish);
    }

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: "someone@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn test_identity_pinned_for_non_admins() {
        let candidate = user(Role::Candidate);
        assert_eq!(
            participant_identity(&candidate, None).unwrap(),
            candidate.id.to_string()
        );
        assert_eq!(
            participant_identity(&candidate, Some(candidate.id.to_string())).unwrap(),
            candidate.id.to_string()
        );
        assert!(matches!(
            participant_identity(&candidate, Some("interviewer".to_string())),
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            participant_identity(&user(Role::Employer), Some("recruiter-bot".to_string())),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn test_admin_may_choose_identity() {
        let admin = user(Role::Admin);
        assert_eq!(
            participant_identity(&admin, Some("observer".to_string())).unwrap(),
            "observer"
        );
    }

    #[test]
    fn test_room_list_query_parses_status() {
        let q: RoomListQuery = serde_json::from_str(r#"{"status":"idle"}"#).unwrap();
        assert_eq!(q.status, Some(RoomStatus::Idle));
    }
}
