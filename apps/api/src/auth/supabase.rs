//! Supabase Auth (GoTrue) REST client: sign-up, password sign-in, token introspection.

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid or expired access token")]
    InvalidToken,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("A user with this email already exists")]
    AlreadyRegistered,

    #[error("Auth API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected auth response: {0}")]
    Malformed(String),
}

/// Identity as reported by the auth service.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthIdentity {
    pub id: Uuid,
}

/// Session returned from a password sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

#[derive(Clone)]
pub struct SupabaseAuth {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, anon_key: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    /// Registers a new account. Returns the new identity; a session is only
    /// issued when email confirmation is disabled on the project.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> Result<(AuthIdentity, Option<AuthSession>), AuthError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password, "data": metadata }))
            .send()
            .await?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            let message = error_message(&body);
            if message.to_lowercase().contains("already registered")
                || message.to_lowercase().contains("already exists")
            {
                return Err(AuthError::AlreadyRegistered);
            }
            return Err(AuthError::Api {
                status: status.as_u16(),
                message,
            });
        }

        parse_sign_up(body)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AuthError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(AuthError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response.json().await?)
    }

    /// Resolves an access token to its identity.
    pub async fn get_user(&self, access_token: &str) -> Result<AuthIdentity, AuthError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidToken);
        }
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            return Err(AuthError::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(response.json().await?)
    }
}

/// Sign-up answers with either a bare user object or `{user, session...}`.
fn parse_sign_up(body: Value) -> Result<(AuthIdentity, Option<AuthSession>), AuthError> {
    let user = body.get("user").cloned().unwrap_or_else(|| body.clone());
    let identity: AuthIdentity = serde_json::from_value(user)
        .map_err(|e| AuthError::Malformed(format!("sign-up user: {e}")))?;
    let session = serde_json::from_value::<AuthSession>(body).ok();
    Ok((identity, session))
}

fn error_message(body: &Value) -> String {
    ["msg", "error_description", "message", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
        .unwrap_or("unknown error")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sign_up_bare_user() {
        let id = Uuid::new_v4();
        let body = json!({"id": id, "email": "a@b.co", "confirmation_sent_at": "2024-01-01"});
        let (identity, session) = parse_sign_up(body).unwrap();
        assert_eq!(identity.id, id);
        assert!(session.is_none());
    }

    #[test]
    fn test_parse_sign_up_with_session() {
        let id = Uuid::new_v4();
        let body = json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "token_type": "bearer",
            "user": {"id": id, "email": "a@b.co"}
        });
        let (identity, session) = parse_sign_up(body).unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(session.unwrap().access_token, "at");
    }

    #[test]
    fn test_parse_sign_up_rejects_missing_id() {
        assert!(matches!(
            parse_sign_up(json!({"email": "x@y.z"})),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn test_error_message_prefers_msg() {
        assert_eq!(
            error_message(&json!({"msg": "User already registered", "code": 422})),
            "User already registered"
        );
        assert_eq!(error_message(&json!({})), "unknown error");
    }
}
