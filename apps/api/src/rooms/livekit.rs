//! LiveKit integration: HS256 access tokens and the RoomService Twirp API.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const JOIN_TOKEN_TTL_SECS: i64 = 6 * 60 * 60;
const ADMIN_TOKEN_TTL_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum LiveKitError {
    #[error("Token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RoomService error (status {status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_join: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_create: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    pub nbf: i64,
    pub exp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub video: VideoGrant,
}

#[derive(Clone)]
pub struct LiveKitClient {
    http: Client,
    /// URL handed to browsers for signalling.
    public_url: String,
    api_base: String,
    api_key: String,
    api_secret: String,
}

impl LiveKitClient {
    pub fn new(url: &str, api_key: String, api_secret: String) -> anyhow::Result<Self> {
        Ok(Self {
            http: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()?,
            public_url: url.to_string(),
            api_base: http_base(url),
            api_key,
            api_secret,
        })
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Mints a join token for `identity` in `room`.
    pub fn join_token(
        &self,
        room: &str,
        identity: &str,
        display_name: Option<&str>,
        can_publish: bool,
    ) -> Result<String, LiveKitError> {
        self.sign(
            identity,
            display_name,
            JOIN_TOKEN_TTL_SECS,
            VideoGrant {
                room: Some(room.to_string()),
                room_join: true,
                can_publish: Some(can_publish),
                can_subscribe: Some(true),
                ..Default::default()
            },
        )
    }

    /// Deletes the SFU room, disconnecting every participant. Unknown rooms are not an error.
    pub async fn delete_room(&self, room: &str) -> Result<(), LiveKitError> {
        let token = self.sign(
            "hirewire-api",
            None,
            ADMIN_TOKEN_TTL_SECS,
            VideoGrant {
                room: Some(room.to_string()),
                room_create: true,
                ..Default::default()
            },
        )?;

        let response = self
            .http
            .post(format!("{}/twirp/livekit.RoomService/DeleteRoom", self.api_base))
            .bearer_auth(token)
            .json(&json!({ "room": room }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            debug!(room = %room, "LiveKit room deleted");
            return Ok(());
        }
        Err(LiveKitError::Api {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    fn sign(
        &self,
        identity: &str,
        display_name: Option<&str>,
        ttl_secs: i64,
        video: VideoGrant,
    ) -> Result<String, LiveKitError> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            iss: self.api_key.clone(),
            sub: identity.to_string(),
            nbf: now,
            exp: now + ttl_secs,
            name: display_name.map(String::from),
            video,
        };
        Ok(encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )?)
    }
}

/// LiveKit is configured with its signalling URL; the HTTP API shares the host.
fn http_base(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    fn client() -> LiveKitClient {
        LiveKitClient::new("wss://sfu.example.test/", "APIkey".into(), "s3cret".into()).unwrap()
    }

    #[test]
    fn test_http_base_conversion() {
        assert_eq!(http_base("wss://sfu.example.test/"), "https://sfu.example.test");
        assert_eq!(http_base("ws://localhost:7880"), "http://localhost:7880");
        assert_eq!(http_base("https://already.http"), "https://already.http");
    }

    #[test]
    fn test_join_token_claims() {
        let token = client()
            .join_token("interview-1", "user-42", Some("Ada"), true)
            .unwrap();
        let data = decode::<AccessClaims>(
            &token,
            &DecodingKey::from_secret(b"s3cret"),
            &Validation::new(Algorithm::HS256),
        )
        .unwrap();
        let claims = data.claims;
        assert_eq!(claims.iss, "APIkey");
        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.name.as_deref(), Some("Ada"));
        assert_eq!(claims.video.room.as_deref(), Some("interview-1"));
        assert!(claims.video.room_join);
        assert!(!claims.video.room_create);
        assert_eq!(claims.video.can_publish, Some(true));
        assert_eq!(claims.exp - claims.nbf, JOIN_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_grant_serializes_livekit_field_names() {
        let grant = VideoGrant {
            room: Some("r".into()),
            room_join: true,
            can_subscribe: Some(true),
            ..Default::default()
        };
        let value = serde_json::to_value(&grant).unwrap();
        assert_eq!(value["roomJoin"], true);
        assert_eq!(value["canSubscribe"], true);
        assert!(value.get("roomCreate").is_none());
        assert!(value.get("canPublish").is_none());
    }

    #[test]
    fn test_wrong_secret_fails_validation() {
        let token = client().join_token("r", "u", None, false).unwrap();
        assert!(decode::<AccessClaims>(
            &token,
            &DecodingKey::from_secret(b"other"),
            &Validation::new(Algorithm::HS256),
        )
        .is_err());
    }
}
