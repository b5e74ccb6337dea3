use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::audit::{self, AuditEvent};
use crate::auth::supabase::{AuthError, AuthSession};
use crate::auth::AuthUser;
use crate::errors::{is_unique_violation, AppError};
use crate::models::user::{Role, UserRow};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Candidate
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub user: UserRow,
    pub session: Option<AuthSession>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub session: AuthSession,
    pub user: UserRow,
}

/// POST /api/auth/signup
pub async fn handle_signup(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpResponse>), AppError> {
    validate_sign_up(&req)?;
    let email = req.email.trim().to_lowercase();

    let (identity, session) = state
        .auth
        .sign_up(
            &email,
            &req.password,
            json!({ "full_name": req.full_name, "role": req.role.as_str() }),
        )
        .await
        .map_err(|e| match e {
            AuthError::AlreadyRegistered => {
                AppError::Conflict("An account with this email already exists".to_string())
            }
            other => AppError::Upstream(other.to_string()),
        })?;

    let user = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (id, email, full_name, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(identity.id)
    .bind(&email)
    .bind(&req.full_name)
    .bind(req.role.as_str())
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("An account with this email already exists".to_string())
        } else {
            AppError::Database(e)
        }
    })?;

    info!(user_id = %user.id, role = %user.role, "User signed up");
    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "auth.signup", "user").entity_id(user.id),
    );

    Ok((StatusCode::CREATED, Json(SignUpResponse { user, session })))
}

/// POST /api/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = req.email.trim().to_lowercase();
    let session = state
        .auth
        .sign_in(&email, &req.password)
        .await
        .map_err(|e| match e {
            AuthError::InvalidCredentials => AppError::Unauthorized,
            other => AppError::Upstream(other.to_string()),
        })?;

    let user = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Forbidden)?;

    audit::record(
        &state.db,
        AuditEvent::new(Some(user.id), "auth.login", "user").entity_id(user.id),
    );

    Ok(Json(LoginResponse { session, user }))
}

/// GET /api/auth/me
pub async fn handle_me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserRow>, AppError> {
    let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(row))
}

fn validate_sign_up(req: &SignUpRequest) -> Result<(), AppError> {
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid email is required".to_string()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if req.role == Role::Admin {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str, role: Role) -> SignUpRequest {
        SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            full_name: None,
            role,
        }
    }

    #[test]
    fn test_valid_sign_up_passes() {
        assert!(validate_sign_up(&request("ada@example.com", "correct-horse", Role::Employer)).is_ok());
    }

    #[test]
    fn test_short_password_rejected() {
        assert!(matches!(
            validate_sign_up(&request("ada@example.com", "short", Role::Candidate)),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_admin_self_signup_forbidden() {
        assert!(matches!(
            validate_sign_up(&request("ada@example.com", "correct-horse", Role::Admin)),
            Err(AppError::Forbidden)
        ));
    }

    #[test]
    fn test_role_defaults_to_candidate() {
        let req: SignUpRequest =
            serde_json::from_str(r#"{"email":"a@b.co","password":"12345678"}"#).unwrap();
        assert_eq!(req.role, Role::Candidate);
    }
}
