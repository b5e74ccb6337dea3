use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_live_model: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub livekit_url: String,
    pub livekit_api_key: String,
    pub livekit_api_secret: String,
    pub smtp: Option<SmtpConfig>,
    pub rooms: RoomTimings,
    pub avatar: AvatarConfig,
    pub port: u16,
    pub rust_log: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
}

/// Room registry lifecycle timings, all in seconds.
#[derive(Debug, Clone, Copy)]
pub struct RoomTimings {
    pub default_ttl_secs: i64,
    pub idle_after_secs: i64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AvatarConfig {
    /// Renderer command line, split on whitespace. `None` disables the endpoint.
    pub render_cmd: Option<String>,
    pub timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let smtp = match optional_env("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_env_or("SMTP_PORT", 587)?,
                username: optional_env("SMTP_USERNAME"),
                password: optional_env("SMTP_PASSWORD"),
                from: optional_env("SMTP_FROM")
                    .unwrap_or_else(|| "Hirewire <no-reply@hirewire.local>".to_string()),
            }),
            None => None,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            gemini_model: optional_env("GEMINI_MODEL")
                .unwrap_or_else(|| crate::llm_client::DEFAULT_MODEL.to_string()),
            gemini_live_model: optional_env("GEMINI_LIVE_MODEL")
                .unwrap_or_else(|| crate::relay::DEFAULT_LIVE_MODEL.to_string()),
            supabase_url: require_env("SUPABASE_URL")?,
            supabase_anon_key: require_env("SUPABASE_ANON_KEY")?,
            livekit_url: require_env("LIVEKIT_URL")?,
            livekit_api_key: require_env("LIVEKIT_API_KEY")?,
            livekit_api_secret: require_env("LIVEKIT_API_SECRET")?,
            smtp,
            rooms: RoomTimings {
                default_ttl_secs: parse_env_or("ROOM_DEFAULT_TTL_SECS", 3600)?,
                idle_after_secs: parse_env_or("ROOM_IDLE_AFTER_SECS", 300)?,
                sweep_interval_secs: parse_env_or("ROOM_SWEEP_INTERVAL_SECS", 60)?,
            },
            avatar: AvatarConfig {
                render_cmd: optional_env("AVATAR_RENDER_CMD"),
                timeout_secs: parse_env_or("AVATAR_RENDER_TIMEOUT_SECS", 120)?,
            },
            port: parse_env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    parse_or(key, std::env::var(key).ok().as_deref(), default)
}

fn parse_or<T>(key: &str, raw: Option<&str>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{v}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_uses_default_when_missing() {
        assert_eq!(parse_or::<u16>("PORT", None, 8080).unwrap(), 8080);
        assert_eq!(parse_or::<u16>("PORT", Some("  "), 8080).unwrap(), 8080);
    }

    #[test]
    fn test_parse_or_parses_value() {
        assert_eq!(parse_or::<i64>("ROOM_DEFAULT_TTL_SECS", Some("900"), 3600).unwrap(), 900);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        let err = parse_or::<u16>("PORT", Some("eighty"), 8080).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
