mod audit;
mod auth;
mod avatar;
mod candidates;
mod config;
mod db;
mod errors;
mod interview;
mod jobs;
mod llm_client;
mod models;
mod notifications;
mod relay;
mod reports;
mod resumes;
mod rooms;
mod routes;
mod screening;
mod state;
mod storage;
mod users;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::supabase::SupabaseAuth;
use crate::avatar::renderer::AvatarRenderer;
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::notifications::Mailer;
use crate::reports::queue::ReportWorker;
use crate::rooms::livekit::LiveKitClient;
use crate::rooms::sweeper::spawn_sweeper;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::Storage;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("hirewire_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Hirewire API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    // Initialize object storage
    let storage = Storage::new(build_s3_client(&config).await, config.s3_bucket.clone());
    info!("S3 client initialized (bucket: {})", storage.bucket());

    // Initialize vendor clients
    let llm = LlmClient::new(config.gemini_api_key.clone(), config.gemini_model.clone())?;
    info!("LLM client initialized (model: {})", llm.model());

    let auth = SupabaseAuth::new(&config.supabase_url, config.supabase_anon_key.clone())?;
    let livekit = LiveKitClient::new(
        &config.livekit_url,
        config.livekit_api_key.clone(),
        config.livekit_api_secret.clone(),
    )?;

    let mailer = Mailer::from_config(config.smtp.as_ref())?;
    if !mailer.is_enabled() {
        warn!("SMTP_HOST not set; outgoing email is disabled");
    }

    let avatar = AvatarRenderer::from_config(&config.avatar);
    match &avatar {
        Some(renderer) => info!("Avatar renderer configured ({})", renderer.program()),
        None => info!("AVATAR_RENDER_CMD not set; avatar rendering disabled"),
    }

    // Background tasks
    spawn_sweeper(db.clone(), livekit.clone(), config.rooms);
    ReportWorker {
        pool: db.clone(),
        storage: storage.clone(),
        mailer: mailer.clone(),
        redis: redis.clone(),
    }
    .spawn();

    // Build app state
    let state = AppState {
        db,
        redis,
        storage,
        llm,
        auth,
        livekit,
        mailer,
        avatar,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the SPA host once it is configurable

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client for the S3-compatible storage endpoint.
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "hirewire-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&s3_config)
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}
