use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::auth::supabase::SupabaseAuth;
use crate::avatar::renderer::AvatarRenderer;
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::notifications::Mailer;
use crate::rooms::livekit::LiveKitClient;
use crate::storage::Storage;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Report queue and report status hashes.
    pub redis: RedisClient,
    pub storage: Storage,
    pub llm: LlmClient,
    pub auth: SupabaseAuth,
    pub livekit: LiveKitClient,
    pub mailer: Mailer,
    /// `None` when `AVATAR_RENDER_CMD` is unset.
    pub avatar: Option<AvatarRenderer>,
    pub config: Config,
}
