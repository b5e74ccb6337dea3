use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::audit::AuditLogRow;
use crate::models::user::Role;
use crate::state::AppState;

/// A single audit event. Built by handlers, written off the request path.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: Option<Uuid>,
    pub action: &'static str,
    pub entity: &'static str,
    pub entity_id: Option<String>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(actor_id: Option<Uuid>, action: &'static str, entity: &'static str) -> Self {
        Self {
            actor_id,
            action,
            entity,
            entity_id: None,
            details: Value::Object(Default::default()),
        }
    }

    pub fn entity_id(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Spawns the audit insert so it never blocks or fails the caller.
pub fn record(pool: &PgPool, event: AuditEvent) {
    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = insert(&pool, &event).await {
            warn!(
                action = event.action,
                entity = event.entity,
                "Failed to write audit log: {e}"
            );
        }
    });
}

async fn insert(pool: &PgPool, event: &AuditEvent) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, actor_id, action, entity, entity_id, details)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(event.actor_id)
    .bind(event.action)
    .bind(event.entity)
    .bind(&event.entity_id)
    .bind(&event.details)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub entity: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/audit
pub async fn handle_list_audit(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogRow>>, AppError> {
    user.require_role(&[Role::Admin])?;
    let limit = params.limit.unwrap_or(100).clamp(1, 500);

    let rows = sqlx::query_as::<_, AuditLogRow>(
        r#"
        SELECT * FROM audit_logs
        WHERE ($1::text IS NULL OR entity = $1)
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(params.entity)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}
