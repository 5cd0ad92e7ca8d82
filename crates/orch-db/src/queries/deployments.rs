use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::DeploymentRow;

pub async fn insert_deployment(pool: &PgPool, row: &DeploymentRow) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO deployments
            (id, name, intent, status, plan, step_results, initiated_by, tenant_id,
             error_message, rollback_deployment_id, created_at, updated_at, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(row.id)
    .bind(&row.name)
    .bind(&row.intent)
    .bind(&row.status)
    .bind(&row.plan)
    .bind(&row.step_results)
    .bind(&row.initiated_by)
    .bind(&row.tenant_id)
    .bind(&row.error_message)
    .bind(row.rollback_deployment_id)
    .bind(row.created_at)
    .bind(row.updated_at)
    .bind(row.version)
    .execute(pool)
    .await
    .context("inserting deployment")?;
    Ok(())
}

/// Optimistic-concurrency update: succeeds only if the stored row still has
/// `expected_version`. Returns the number of affected rows (0 means another
/// writer won the race).
pub async fn update_deployment(
    pool: &PgPool,
    row: &DeploymentRow,
    expected_version: i64,
) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE deployments
        SET name = $1, intent = $2, status = $3, plan = $4, step_results = $5,
            error_message = $6, rollback_deployment_id = $7, updated_at = $8, version = $9
        WHERE id = $10 AND version = $11
        "#,
    )
    .bind(&row.name)
    .bind(&row.intent)
    .bind(&row.status)
    .bind(&row.plan)
    .bind(&row.step_results)
    .bind(&row.error_message)
    .bind(row.rollback_deployment_id)
    .bind(row.updated_at)
    .bind(row.version)
    .bind(row.id)
    .bind(expected_version)
    .execute(pool)
    .await
    .context("updating deployment")?;
    Ok(result.rows_affected())
}

pub async fn get_deployment(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<DeploymentRow>> {
    sqlx::query_as::<_, DeploymentRow>("SELECT * FROM deployments WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("fetching deployment")
}

pub async fn list_by_status(pool: &PgPool, status: &str) -> anyhow::Result<Vec<DeploymentRow>> {
    sqlx::query_as::<_, DeploymentRow>("SELECT * FROM deployments WHERE status = $1 ORDER BY created_at ASC")
        .bind(status)
        .fetch_all(pool)
        .await
        .context("listing deployments by status")
}

pub async fn list_by_tenant(pool: &PgPool, tenant_id: &str) -> anyhow::Result<Vec<DeploymentRow>> {
    sqlx::query_as::<_, DeploymentRow>(
        "SELECT * FROM deployments WHERE tenant_id = $1 ORDER BY created_at DESC",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
    .context("listing deployments by tenant")
}
