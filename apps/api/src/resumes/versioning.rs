use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::resume::ResumeRow;
use crate::storage::{resume_key, Storage};

/// A validated upload ready to become the user's next resume version.
pub struct NewResume {
    pub user_id: Uuid,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub extracted_text: Option<String>,
}

/// Stores a new resume version and makes it the only current one.
///
/// Versions are append-only. Uploads for the same user are serialized with a
/// transaction-scoped advisory lock, and the partial unique index on
/// `resumes(user_id) WHERE is_current` backs the one-current invariant.
pub async fn commit_resume_version(
    pool: &PgPool,
    storage: &Storage,
    upload: NewResume,
) -> Result<ResumeRow, AppError> {
    let NewResume {
        user_id,
        file_name,
        bytes,
        extracted_text,
    } = upload;

    let mut tx = pool.begin().await?;

    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

    // 1. Determine next version
    let current_max: Option<i32> =
        sqlx::query_scalar("SELECT MAX(version) FROM resumes WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
    let version = current_max.unwrap_or(0) + 1;

    // 2. Upload the file under a versioned key
    let s3_key = resume_key(user_id, version, &file_name);
    let size_bytes = bytes.len() as i64;
    storage.put(&s3_key, bytes, "application/pdf").await?;

    // 3. Retire the previous current version, then insert the new one
    sqlx::query("UPDATE resumes SET is_current = false WHERE user_id = $1 AND is_current")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let row = sqlx::query_as::<_, ResumeRow>(
        r#"
        INSERT INTO resumes
            (id, user_id, version, file_name, s3_key, size_bytes, extracted_text, is_current)
        VALUES ($1, $2, $3, $4, $5, $6, $7, true)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(version)
    .bind(&file_name)
    .bind(&s3_key)
    .bind(size_bytes)
    .bind(&extracted_text)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(user_id = %user_id, version, "Stored resume version");
    Ok(row)
}

pub async fn get_current_resume(pool: &PgPool, user_id: Uuid) -> Result<Option<ResumeRow>, AppError> {
    Ok(
        sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE user_id = $1 AND is_current")
            .bind(user_id)
            .fetch_optional(pool)
            .await?,
    )
}

pub async fn get_resume_history(pool: &PgPool, user_id: Uuid) -> Result<Vec<ResumeRow>, AppError> {
    Ok(sqlx::query_as::<_, ResumeRow>(
        "SELECT * FROM resumes WHERE user_id = $1 ORDER BY version DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?)
}

pub async fn get_resume(pool: &PgPool, id: Uuid) -> Result<ResumeRow, AppError> {
    sqlx::query_as::<_, ResumeRow>("SELECT * FROM resumes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Resume {id} not found")))
}
