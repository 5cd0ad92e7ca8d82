use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Deployment, DeploymentStatus, DriftReport, Task};

#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    async fn save(&self, deployment: &Deployment) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Deployment>>;
    async fn list_by_status(&self, status: DeploymentStatus) -> anyhow::Result<Vec<Deployment>>;
    async fn list_by_tenant(&self, tenant_id: &str) -> anyhow::Result<Vec<Deployment>>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn save(&self, task: &Task) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Task>>;
    async fn list_by_deployment(&self, deployment_id: Uuid) -> anyhow::Result<Vec<Task>>;

    /// Atomically claims and returns the oldest `QUEUED` task, setting its
    /// status to `ACQUIRED` and its `worker_id` before returning. Returns
    /// `None` immediately (non-blocking) if no task is queued. Exactly one
    /// concurrent caller may observe a given task transition.
    async fn acquire_next(&self, worker_id: &str) -> anyhow::Result<Option<Task>>;

    /// Resets tasks left `ACQUIRED`/`RUNNING` by a crashed worker back to
    /// `FAILED` so the normal retry/escalate path picks them up again.
    async fn reset_orphaned(&self, deployment_id: Uuid) -> anyhow::Result<Vec<Task>>;
}

#[async_trait]
pub trait DriftReportRepository: Send + Sync {
    async fn save(&self, report: &DriftReport) -> anyhow::Result<()>;
    async fn list_by_deployment(&self, deployment_id: Uuid) -> anyhow::Result<Vec<DriftReport>>;
    async fn get_latest(&self, deployment_id: Uuid) -> anyhow::Result<Option<DriftReport>>;
}

const _: () = {
    fn _assert_object_safe(
        _: &dyn DeploymentRepository,
        _: &dyn TaskRepository,
        _: &dyn DriftReportRepository,
    ) {
    }
};
