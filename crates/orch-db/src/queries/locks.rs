use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Postgres-backed distributed lock table: `(resource_id, token, expires_at)`.
/// `acquire` is a single upsert that only succeeds if no unexpired row
/// exists; `release`/`extend` are CAS operations keyed by the token issued
/// at acquire time, so a caller can never affect a lock it doesn't hold.
pub async fn acquire(pool: &PgPool, resource_id: &str, ttl_seconds: u64) -> anyhow::Result<Option<Uuid>> {
    let token = Uuid::new_v4();
    let expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds as i64);

    let result = sqlx::query(
        r#"
        INSERT INTO locks (resource_id, token, expires_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (resource_id) DO UPDATE
            SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
            WHERE locks.expires_at <= now()
        "#,
    )
    .bind(resource_id)
    .bind(token)
    .bind(expires_at)
    .execute(pool)
    .await
    .context("acquiring lock")?;

    Ok(if result.rows_affected() == 1 { Some(token) } else { None })
}

pub async fn release(pool: &PgPool, resource_id: &str, token: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM locks WHERE resource_id = $1 AND token = $2")
        .bind(resource_id)
        .bind(token)
        .execute(pool)
        .await
        .context("releasing lock")?;
    Ok(result.rows_affected() == 1)
}

pub async fn extend(pool: &PgPool, resource_id: &str, token: Uuid, ttl_seconds: u64) -> anyhow::Result<bool> {
    let expires_at = Utc::now() + chrono::Duration::seconds(ttl_seconds as i64);
    let result = sqlx::query("UPDATE locks SET expires_at = $1 WHERE resource_id = $2 AND token = $3")
        .bind(expires_at)
        .bind(resource_id)
        .bind(token)
        .execute(pool)
        .await
        .context("extending lock")?;
    Ok(result.rows_affected() == 1)
}

pub async fn is_locked(pool: &PgPool, resource_id: &str) -> anyhow::Result<bool> {
    let expires_at: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT expires_at FROM locks WHERE resource_id = $1")
            .bind(resource_id)
            .fetch_optional(pool)
            .await
            .context("checking lock")?;
    Ok(expires_at.map(|e| e > Utc::now()).unwrap_or(false))
}
