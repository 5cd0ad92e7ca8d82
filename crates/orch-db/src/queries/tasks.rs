use anyhow::Context;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::TaskRow;

pub async fn insert_task(pool: &PgPool, row: &TaskRow) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO tasks
            (id, deployment_id, step_id, name, status, provider, terraform_action, worker_id,
             idempotency_key, attempt_number, max_attempts, timeout_seconds, input_data,
             output_data, error_message, started_at, completed_at, created_at, updated_at, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        "#,
    )
    .bind(row.id)
    .bind(row.deployment_id)
    .bind(row.step_id)
    .bind(&row.name)
    .bind(&row.status)
    .bind(&row.provider)
    .bind(&row.terraform_action)
    .bind(&row.worker_id)
    .bind(&row.idempotency_key)
    .bind(row.attempt_number)
    .bind(row.max_attempts)
    .bind(row.timeout_seconds)
    .bind(&row.input_data)
    .bind(&row.output_data)
    .bind(&row.error_message)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(row.created_at)
    .bind(row.updated_at)
    .bind(row.version)
    .execute(pool)
    .await
    .context("inserting task")?;
    Ok(())
}

pub async fn update_task(pool: &PgPool, row: &TaskRow, expected_version: i64) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = $1, worker_id = $2, attempt_number = $3, input_data = $4, output_data = $5,
            error_message = $6, started_at = $7, completed_at = $8, updated_at = $9, version = $10
        WHERE id = $11 AND version = $12
        "#,
    )
    .bind(&row.status)
    .bind(&row.worker_id)
    .bind(row.attempt_number)
    .bind(&row.input_data)
    .bind(&row.output_data)
    .bind(&row.error_message)
    .bind(row.started_at)
    .bind(row.completed_at)
    .bind(row.updated_at)
    .bind(row.version)
    .bind(row.id)
    .bind(expected_version)
    .execute(pool)
    .await
    .context("updating task")?;
    Ok(result.rows_affected())
}

pub async fn get_task(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<TaskRow>> {
    sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetching task")
}

pub async fn list_by_deployment(pool: &PgPool, deployment_id: Uuid) -> anyhow::Result<Vec<TaskRow>> {
    sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE deployment_id = $1 ORDER BY created_at ASC")
        .bind(deployment_id)
        .fetch_all(pool)
        .await
        .context("listing tasks for deployment")
}

/// Atomically claims the oldest `queued` task via `FOR UPDATE SKIP LOCKED`,
/// so concurrent callers never contend on the same row and each observes a
/// disjoint claim.
pub async fn acquire_next(pool: &PgPool, worker_id: &str) -> anyhow::Result<Option<TaskRow>> {
    let mut tx = pool.begin().await.context("starting acquire_next transaction")?;

    let candidate = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT * FROM tasks
        WHERE status = 'queued'
        ORDER BY created_at ASC, id ASC
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        "#,
    )
    .fetch_optional(&mut *tx)
    .await
    .context("selecting next queued task")?;

    let Some(mut row) = candidate else {
        tx.commit().await.context("committing empty acquire_next")?;
        return Ok(None);
    };

    let now = Utc::now();
    sqlx::query(
        "UPDATE tasks SET status = 'acquired', worker_id = $1, updated_at = $2, version = version + 1 WHERE id = $3",
    )
    .bind(worker_id)
    .bind(now)
    .bind(row.id)
    .execute(&mut *tx)
    .await
    .context("claiming task")?;

    tx.commit().await.context("committing acquire_next")?;

    row.status = "acquired".to_owned();
    row.worker_id = Some(worker_id.to_owned());
    row.updated_at = now;
    row.version += 1;
    Ok(Some(row))
}

/// Resets tasks stuck `acquired`/`running` (e.g. after a worker crash) back
/// to `failed`, returning the rows that were reset.
pub async fn reset_orphaned(pool: &PgPool, deployment_id: Uuid) -> anyhow::Result<Vec<TaskRow>> {
    sqlx::query_as::<_, TaskRow>(
        r#"
        UPDATE tasks
        SET status = 'failed',
            error_message = 'orphaned: worker did not report completion',
            completed_at = now(),
            updated_at = now(),
            version = version + 1
        WHERE deployment_id = $1 AND status IN ('acquired', 'running')
        RETURNING *
        "#,
    )
    .bind(deployment_id)
    .fetch_all(pool)
    .await
    .context("resetting orphaned tasks")
}
