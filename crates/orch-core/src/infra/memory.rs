use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Deployment, DeploymentStatus, DriftReport, Task, TaskStatus};
use crate::ports::{DeploymentRepository, DriftReportRepository, Lock, TaskRepository};

/// In-memory `DeploymentRepository`. Suitable for tests and for embedding
/// without Postgres; not durable across process restarts.
#[derive(Default)]
pub struct InMemoryDeploymentRepository {
    rows: Mutex<HashMap<Uuid, Deployment>>,
}

impl InMemoryDeploymentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentRepository for InMemoryDeploymentRepository {
    async fn save(&self, deployment: &Deployment) -> anyhow::Result<()> {
        self.rows.lock().await.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Deployment>> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn list_by_status(&self, status: DeploymentStatus) -> anyhow::Result<Vec<Deployment>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect())
    }

    async fn list_by_tenant(&self, tenant_id: &str) -> anyhow::Result<Vec<Deployment>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

/// In-memory `TaskRepository`. `acquire_next` holds the repository-wide
/// mutex across its scan of `QUEUED` tasks and the acquiring mutation, which
/// is what the contract in the task-repository design requires of a
/// non-SQL-backed implementation.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    rows: Mutex<HashMap<Uuid, Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn save(&self, task: &Task) -> anyhow::Result<()> {
        self.rows.lock().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Task>> {
        Ok(self.rows.lock().await.get(&id).cloned())
    }

    async fn list_by_deployment(&self, deployment_id: Uuid) -> anyhow::Result<Vec<Task>> {
        Ok(self
            .rows
            .lock()
            .await
            .values()
            .filter(|t| t.deployment_id == deployment_id)
            .cloned()
            .collect())
    }

    async fn acquire_next(&self, worker_id: &str) -> anyhow::Result<Option<Task>> {
        let mut rows = self.rows.lock().await;
        let next_id = rows
            .values()
            .filter(|t| t.status == TaskStatus::Queued)
            .min_by_key(|t| (t.created_at, t.id))
            .map(|t| t.id);

        let Some(id) = next_id else {
            return Ok(None);
        };
        let task = rows.get_mut(&id).expect("id came from this map");
        task.acquire(worker_id)?;
        Ok(Some(task.clone()))
    }

    async fn reset_orphaned(&self, deployment_id: Uuid) -> anyhow::Result<Vec<Task>> {
        let mut rows = self.rows.lock().await;
        let mut reset = Vec::new();
        for task in rows.values_mut() {
            if task.deployment_id == deployment_id
                && matches!(task.status, TaskStatus::Acquired | TaskStatus::Running)
            {
                task.fail("orphaned: worker did not report completion")?;
                reset.push(task.clone());
            }
        }
        Ok(reset)
    }
}

/// In-memory `DriftReportRepository`, append-only per deployment.
#[derive(Default)]
pub struct InMemoryDriftReportRepository {
    rows: Mutex<HashMap<Uuid, Vec<DriftReport>>>,
}

impl InMemoryDriftReportRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DriftReportRepository for InMemoryDriftReportRepository {
    async fn save(&self, report: &DriftReport) -> anyhow::Result<()> {
        self.rows
            .lock()
            .await
            .entry(report.deployment_id)
            .or_default()
            .push(report.clone());
        Ok(())
    }

    async fn list_by_deployment(&self, deployment_id: Uuid) -> anyhow::Result<Vec<DriftReport>> {
        Ok(self.rows.lock().await.get(&deployment_id).cloned().unwrap_or_default())
    }

    async fn get_latest(&self, deployment_id: Uuid) -> anyhow::Result<Option<DriftReport>> {
        Ok(self
            .rows
            .lock()
            .await
            .get(&deployment_id)
            .and_then(|reports| reports.iter().max_by_key(|r| r.created_at).cloned()))
    }
}

struct LockEntry {
    token: Uuid,
    expires_at: SystemTime,
}

/// In-memory `Lock`, CAS-by-token, single process. A distributed deployment
/// needs the Postgres-backed implementation instead.
#[derive(Default)]
pub struct InMemoryLock {
    entries: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Lock for InMemoryLock {
    async fn acquire(&self, resource_id: &str, ttl_seconds: u64) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().await;
        let now = SystemTime::now();
        if let Some(existing) = entries.get(resource_id) {
            if existing.expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(
            resource_id.to_owned(),
            LockEntry {
                token: Uuid::new_v4(),
                expires_at: now + Duration::from_secs(ttl_seconds),
            },
        );
        Ok(true)
    }

    async fn release(&self, resource_id: &str) -> anyhow::Result<bool> {
        // Single-process callers always hold the current token by
        // construction (no token is exposed across process boundaries in
        // this implementation), so release unconditionally removes the
        // entry if present.
        Ok(self.entries.lock().await.remove(resource_id).is_some())
    }

    async fn extend(&self, resource_id: &str, ttl_seconds: u64) -> anyhow::Result<bool> {
        let mut entries = self.entries.lock().await;
        match entries.get_mut(resource_id) {
            Some(entry) => {
                entry.expires_at = SystemTime::now() + Duration::from_secs(ttl_seconds);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn is_locked(&self, resource_id: &str) -> anyhow::Result<bool> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(resource_id)
            .map(|e| e.expires_at > SystemTime::now())
            .unwrap_or(false))
    }
}

pub type SharedDeploymentRepository = Arc<dyn DeploymentRepository>;
pub type SharedTaskRepository = Arc<dyn TaskRepository>;
pub type SharedDriftReportRepository = Arc<dyn DriftReportRepository>;
pub type SharedLock = Arc<dyn Lock>;
