// Authentication: Supabase-issued bearer tokens resolved to a `users` row.

pub mod handlers;
pub mod supabase;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{Role, UserRow};
use crate::state::AppState;
use supabase::AuthError;

/// The authenticated caller. Extracting it rejects with 401 when the bearer
/// token is missing or invalid and 403 when no profile row exists.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Allows the owner of a resource or an admin.
    pub fn require_self_or_admin(&self, owner: Uuid) -> Result<(), AppError> {
        if self.id == owner || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        resolve_token(state, token).await
    }
}

/// Resolves an access token to its user. Used directly where the token does
/// not arrive in a header, such as WebSocket upgrades from browsers.
pub async fn resolve_token(state: &AppState, token: &str) -> Result<AuthUser, AppError> {
    let identity = state.auth.get_user(token).await.map_err(|e| match e {
        AuthError::InvalidToken => AppError::Unauthorized,
        other => AppError::Upstream(other.to_string()),
    })?;

    let row = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
        .bind(identity.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Forbidden)?;

    let role = Role::parse(&row.role).ok_or(AppError::Forbidden)?;

    Ok(AuthUser {
        id: row.id,
        email: row.email,
        role,
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn test_bearer_token_extracted() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("bearer   xyz ")), Some("xyz"));
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_role_checks() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            email: "e@x.io".into(),
            role: Role::Employer,
        };
        assert!(user.require_role(&[Role::Employer, Role::Admin]).is_ok());
        assert!(user.require_role(&[Role::Candidate]).is_err());
        assert!(user.require_self_or_admin(user.id).is_ok());
        assert!(user.require_self_or_admin(Uuid::new_v4()).is_err());
    }
}
