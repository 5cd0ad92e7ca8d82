use anyhow::Context;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::DriftReportRow;

pub async fn insert_drift_report(pool: &PgPool, row: &DriftReportRow) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO drift_reports
            (id, deployment_id, scan_type, items, summary, remediation_deployment_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(row.id)
    .bind(row.deployment_id)
    .bind(&row.scan_type)
    .bind(&row.items)
    .bind(&row.summary)
    .bind(row.remediation_deployment_id)
    .bind(row.created_at)
    .execute(pool)
    .await
    .context("inserting drift report")?;
    Ok(())
}

pub async fn list_by_deployment(pool: &PgPool, deployment_id: Uuid) -> anyhow::Result<Vec<DriftReportRow>> {
    sqlx::query_as::<_, DriftReportRow>(
        "SELECT * FROM drift_reports WHERE deployment_id = $1 ORDER BY created_at DESC",
    )
    .bind(deployment_id)
    .fetch_all(pool)
    .await
    .context("listing drift reports")
}

pub async fn get_latest(pool: &PgPool, deployment_id: Uuid) -> anyhow::Result<Option<DriftReportRow>> {
    sqlx::query_as::<_, DriftReportRow>(
        "SELECT * FROM drift_reports WHERE deployment_id = $1 ORDER BY created_at DESC LIMIT 1",
    )
    .bind(deployment_id)
    .fetch_optional(pool)
    .await
    .context("fetching latest drift report")
}
