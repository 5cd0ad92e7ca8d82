use std::str::FromStr;

use async_trait::async_trait;
use orch_db::models::{DeploymentRow, DriftReportRow, TaskRow};
use orch_db::queries::{deployments as deployment_queries, drift_reports as drift_queries, locks as lock_queries, tasks as task_queries};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Deployment, DeploymentStatus, DriftReport, Task, TaskStatus};
use crate::ports::{DeploymentRepository, DriftReportRepository, Lock, TaskRepository};

fn deployment_to_row(d: &Deployment) -> anyhow::Result<DeploymentRow> {
    Ok(DeploymentRow {
        id: d.id,
        name: d.name.clone(),
        intent: serde_json::to_value(&d.intent)?,
        status: d.status.to_string(),
        plan: d.plan.as_ref().map(serde_json::to_value).transpose()?,
        step_results: serde_json::to_value(&d.step_results)?,
        initiated_by: d.initiated_by.clone(),
        tenant_id: d.tenant_id.clone(),
        error_message: d.error_message.clone(),
        rollback_deployment_id: d.rollback_deployment_id,
        created_at: d.created_at,
        updated_at: d.updated_at,
        version: d.version,
    })
}

fn row_to_deployment(row: DeploymentRow) -> anyhow::Result<Deployment> {
    Ok(Deployment {
        id: row.id,
        name: row.name,
        intent: serde_json::from_value(row.intent)?,
        status: DeploymentStatus::from_str(&row.status)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
        plan: row.plan.map(serde_json::from_value).transpose()?,
        step_results: serde_json::from_value(row.step_results)?,
        initiated_by: row.initiated_by,
        tenant_id: row.tenant_id,
        error_message: row.error_message,
        rollback_deployment_id: row.rollback_deployment_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
        version: row.version,
        pending_events: Vec::new(),
    })
}

/// Postgres-backed `DeploymentRepository`. `save` inserts on first write
/// (`version == 0`) and performs an optimistic-concurrency update (CAS on
/// `version - 1`) thereafter, bailing loudly if another writer won the race
/// rather than silently dropping the update.
pub struct PostgresDeploymentRepository {
    pool: PgPool,
}

impl PostgresDeploymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeploymentRepository for PostgresDeploymentRepository {
    async fn save(&self, deployment: &Deployment) -> anyhow::Result<()> {
        let row = deployment_to_row(deployment)?;
        if row.version == 0 {
            deployment_queries::insert_deployment(&self.pool, &row).await
        } else {
            let expected = row.version - 1;
            let affected = deployment_queries::update_deployment(&self.pool, &row, expected).await?;
            anyhow::ensure!(
                affected == 1,
                "lost update on deployment {}: expected version {} was not current",
                deployment.id,
                expected
            );
            Ok(())
        }
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Deployment>> {
        deployment_queries::get_deployment(&self.pool, id)
            .await?
            .map(row_to_deployment)
            .transpose()
    }

    async fn list_by_status(&self, status: DeploymentStatus) -> anyhow::Result<Vec<Deployment>> {
        deployment_queries::list_by_status(&self.pool, &status.to_string())
            .await?
            .into_iter()
            .map(row_to_deployment)
            .collect()
    }

    async fn list_by_tenant(&self, tenant_id: &str) -> anyhow::Result<Vec<Deployment>> {
        deployment_queries::list_by_tenant(&self.pool, tenant_id)
            .await?
            .into_iter()
            .map(row_to_deployment)
            .collect()
    }
}

fn task_to_row(t: &Task) -> anyhow::Result<TaskRow> {
    Ok(TaskRow {
        id: t.id,
        deployment_id: t.deployment_id,
        step_id: t.step_id,
        name: t.name.clone(),
        status: t.status.to_string(),
        provider: t.provider.clone(),
        terraform_action: t.terraform_action.to_string(),
        worker_id: t.worker_id.clone(),
        idempotency_key: t.idempotency_key.clone(),
        attempt_number: t.attempt_number as i32,
        max_attempts: t.max_attempts as i32,
        timeout_seconds: t.timeout_seconds,
        input_data: t.input_data.clone(),
        output_data: t.output_data.clone(),
        error_message: t.error_message.clone(),
        started_at: t.started_at,
        completed_at: t.completed_at,
        created_at: t.created_at,
        updated_at: t.updated_at,
        version: t.version,
    })
}

fn row_to_task(row: TaskRow) -> anyhow::Result<Task> {
    Ok(Task {
        id: row.id,
        deployment_id: row.deployment_id,
        step_id: row.step_id,
        name: row.name,
        status: TaskStatus::from_str(&row.status).map_err(|e| anyhow::anyhow!(e.to_string()))?,
        provider: row.provider,
        terraform_action: row
            .terraform_action
            .parse()
            .map_err(|e: crate::domain::plan::StepActionParseError| anyhow::anyhow!(e.to_string()))?,
        worker_id: row.worker_id,
        idempotency_key: row.idempotency_key,
        attempt_number: row.attempt_number as u32,
        max_attempts: row.max_attempts as u32,
        timeout_seconds: row.timeout_seconds,
        input_data: row.input_data,
        output_data: row.output_data,
        error_message: row.error_message,
        started_at: row.started_at,
        completed_at: row.completed_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
        version: row.version,
    })
}

pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn save(&self, task: &Task) -> anyhow::Result<()> {
        let row = task_to_row(task)?;
        if row.version == 0 {
            task_queries::insert_task(&self.pool, &row).await
        } else {
            let expected = row.version - 1;
            let affected = task_queries::update_task(&self.pool, &row, expected).await?;
            anyhow::ensure!(
                affected == 1,
                "lost update on task {}: expected version {} was not current",
                task.id,
                expected
            );
            Ok(())
        }
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        task_queries::get_task(&self.pool, id).await?.map(row_to_task).transpose()
    }

    async fn list_by_deployment(&self, deployment_id: Uuid) -> anyhow::Result<Vec<Task>> {
        task_queries::list_by_deployment(&self.pool, deployment_id)
            .await?
            .into_iter()
            .map(row_to_task)
            .collect()
    }

    async fn acquire_next(&self, worker_id: &str) -> anyhow::Result<Option<Task>> {
        task_queries::acquire_next(&self.pool, worker_id)
            .await?
            .map(row_to_task)
            .transpose()
    }

    async fn reset_orphaned(&self, deployment_id: Uuid) -> anyhow::Result<Vec<Task>> {
        task_queries::reset_orphaned(&self.pool, deployment_id)
            .await?
            .into_iter()
            .map(row_to_task)
            .collect()
    }
}

fn drift_report_to_row(r: &DriftReport) -> anyhow::Result<DriftReportRow> {
    Ok(DriftReportRow {
        id: r.id,
        deployment_id: r.deployment_id,
        scan_type: match r.scan_type {
            crate::domain::ScanType::Full => "full".to_owned(),
            crate::domain::ScanType::Quick => "quick".to_owned(),
        },
        items: serde_json::to_value(&r.items)?,
        summary: r.summary.clone(),
        remediation_deployment_id: r.remediation_deployment_id,
        created_at: r.created_at,
    })
}

fn row_to_drift_report(row: DriftReportRow) -> anyhow::Result<DriftReport> {
    Ok(DriftReport {
        id: row.id,
        deployment_id: row.deployment_id,
        scan_type: match row.scan_type.as_str() {
            "quick" => crate::domain::ScanType::Quick,
            _ => crate::domain::ScanType::Full,
        },
        items: serde_json::from_value(row.items)?,
        summary: row.summary,
        remediation_deployment_id: row.remediation_deployment_id,
        created_at: row.created_at,
    })
}

pub struct PostgresDriftReportRepository {
    pool: PgPool,
}

impl PostgresDriftReportRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DriftReportRepository for PostgresDriftReportRepository {
    async fn save(&self, report: &DriftReport) -> anyhow::Result<()> {
        let row = drift_report_to_row(report)?;
        drift_queries::insert_drift_report(&self.pool, &row).await
    }

    async fn list_by_deployment(&self, deployment_id: Uuid) -> anyhow::Result<Vec<DriftReport>> {
        drift_queries::list_by_deployment(&self.pool, deployment_id)
            .await?
            .into_iter()
            .map(row_to_drift_report)
            .collect()
    }

    async fn get_latest(&self, deployment_id: Uuid) -> anyhow::Result<Option<DriftReport>> {
        drift_queries::get_latest(&self.pool, deployment_id)
            .await?
            .map(row_to_drift_report)
            .transpose()
    }
}

/// Postgres-backed `Lock`. Unlike the in-memory implementation, this one
/// genuinely enforces the CAS-release contract across instances: a caller
/// only holds a token it personally acquired.
pub struct PostgresLock {
    pool: PgPool,
    tokens: tokio::sync::Mutex<std::collections::HashMap<String, Uuid>>,
}

impl PostgresLock {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tokens: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

#[async_trait]
impl Lock for PostgresLock {
    async fn acquire(&self, resource_id: &str, ttl_seconds: u64) -> anyhow::Result<bool> {
        match lock_queries::acquire(&self.pool, resource_id, ttl_seconds).await? {
            Some(token) => {
                self.tokens.lock().await.insert(resource_id.to_owned(), token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release(&self, resource_id: &str) -> anyhow::Result<bool> {
        let token = self.tokens.lock().await.remove(resource_id);
        match token {
            Some(token) => lock_queries::release(&self.pool, resource_id, token).await,
            None => Ok(false),
        }
    }

    async fn extend(&self, resource_id: &str, ttl_seconds: u64) -> anyhow::Result<bool> {
        let token = self.tokens.lock().await.get(resource_id).copied();
        match token {
            Some(token) => lock_queries::extend(&self.pool, resource_id, token, ttl_seconds).await,
            None => Ok(false),
        }
    }

    async fn is_locked(&self, resource_id: &str) -> anyhow::Result<bool> {
        lock_queries::is_locked(&self.pool, resource_id).await
    }
}
