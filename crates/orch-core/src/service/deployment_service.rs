use std::sync::Arc;

use uuid::Uuid;

use crate::domain::{
    Deployment, DeploymentIntent, DeploymentStatus, Event, StepAction, StepResult, Task,
};
use crate::error::DomainError;
use crate::planner;
use crate::ports::{DeploymentRepository, EventSink, Lock, TaskRepository};

const PLANNING_LOCK_TTL_SECONDS: u64 = 120;
const COMPLETION_LOCK_TTL_SECONDS: u64 = 30;

/// Hosts the cross-aggregate transactions described by the deployment
/// service: create -> plan -> approve -> execute -> complete/fail/rollback,
/// under the distributed-lock discipline that protects planning and
/// completion decisions. Never inspects or mutates a task's internal state
/// directly — only calls task methods and the task repository.
pub struct DeploymentService {
    deployments: Arc<dyn DeploymentRepository>,
    tasks: Arc<dyn TaskRepository>,
    lock: Arc<dyn Lock>,
    events: Arc<dyn EventSink>,
}

impl DeploymentService {
    pub fn new(
        deployments: Arc<dyn DeploymentRepository>,
        tasks: Arc<dyn TaskRepository>,
        lock: Arc<dyn Lock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            deployments,
            tasks,
            lock,
            events,
        }
    }

    async fn publish(&self, deployment: &mut Deployment) -> anyhow::Result<()> {
        let pending = deployment.collect_events();
        self.events.publish_batch(pending).await
    }

    async fn load(&self, id: Uuid) -> anyhow::Result<Deployment> {
        self.deployments
            .get(id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity: "deployment", id }.into())
    }

    pub async fn create_deployment(
        &self,
        intent: DeploymentIntent,
        name: impl Into<String>,
        initiated_by: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> anyhow::Result<Deployment> {
        let mut deployment = Deployment::new(intent, name.into(), initiated_by.into(), tenant_id.into());
        self.deployments.save(&deployment).await?;
        self.publish(&mut deployment).await?;
        Ok(deployment)
    }

    /// Acquires `deployment:{id}:planning` (ttl 120s) so concurrent planning
    /// of the same deployment is forbidden; releases it on every exit path.
    pub async fn plan_deployment(&self, id: Uuid) -> anyhow::Result<Deployment> {
        let lock_key = format!("deployment:{id}:planning");
        if !self.lock.acquire(&lock_key, PLANNING_LOCK_TTL_SECONDS).await? {
            return Err(DomainError::LockContention { resource_id: lock_key }.into());
        }

        let result = self.plan_deployment_locked(id).await;
        self.lock.release(&lock_key).await?;
        result
    }

    async fn plan_deployment_locked(&self, id: Uuid) -> anyhow::Result<Deployment> {
        let mut deployment = self.load(id).await?;
        deployment.start_planning()?;
        let plan = planner::generate_plan(&deployment.intent);
        deployment.set_plan(plan)?;
        self.deployments.save(&deployment).await?;
        self.publish(&mut deployment).await?;
        Ok(deployment)
    }

    pub async fn approve_deployment(&self, id: Uuid, approved_by: &str) -> anyhow::Result<Deployment> {
        let mut deployment = self.load(id).await?;
        deployment.approve(approved_by)?;
        self.deployments.save(&deployment).await?;
        self.publish(&mut deployment).await?;
        Ok(deployment)
    }

    /// Requires a plan to be attached; materializes one `QUEUED` task per
    /// step with `timeout_seconds = 2 * step.estimated_duration_seconds`,
    /// carrying the step's idempotency key.
    pub async fn execute_deployment(&self, id: Uuid) -> anyhow::Result<Vec<Task>> {
        let mut deployment = self.load(id).await?;
        let plan = deployment
            .plan
            .clone()
            .ok_or_else(|| DomainError::PreconditionMissing(format!("deployment {id} has no plan")))?;

        deployment.start_execution()?;
        self.deployments.save(&deployment).await?;
        self.publish(&mut deployment).await?;

        let mut tasks = Vec::with_capacity(plan.steps.len());
        for step in &plan.steps {
            let mut task = Task::new(
                deployment.id,
                step.id,
                step.name.clone(),
                step.provider.clone(),
                step.action,
                step.idempotency_key.clone(),
                step.max_retries.max(1),
                step.estimated_duration_seconds * 2,
                serde_json::to_value(&step.resource_spec)?,
            );
            task.enqueue()?;
            self.tasks.save(&task).await?;
            self.events
                .publish(Event::task_status(task.id, deployment.id, None, "queued"))
                .await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// The only path by which a deployment advances out of `EXECUTING`.
    /// Acquires `deployment:{id}:completion` (ttl 30s) around the
    /// terminal-state decision to avoid interleaving with a concurrent
    /// completion callback for the same deployment.
    pub async fn handle_task_completion(
        &self,
        task_id: Uuid,
        success: bool,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> anyhow::Result<Deployment> {
        let mut task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity: "task", id: task_id })?;

        if success {
            task.succeed(output.unwrap_or(serde_json::Value::Null))?;
        } else {
            task.fail(error.clone().unwrap_or_else(|| "task failed".to_owned()))?;
        }
        self.tasks.save(&task).await?;

        let lock_key = format!("deployment:{}:completion", task.deployment_id);
        if !self.lock.acquire(&lock_key, COMPLETION_LOCK_TTL_SECONDS).await? {
            return Err(DomainError::LockContention { resource_id: lock_key }.into());
        }
        let result = self.complete_locked(task, success, error).await;
        self.lock.release(&lock_key).await?;
        result
    }

    async fn complete_locked(
        &self,
        task: Task,
        success: bool,
        error: Option<String>,
    ) -> anyhow::Result<Deployment> {
        let mut deployment = self.load(task.deployment_id).await?;

        deployment.append_step_result(StepResult {
            step_id: task.step_id,
            success,
            output: task.output_data.clone(),
            error_message: error,
            resource_ids: Default::default(),
            duration_seconds: task
                .started_at
                .zip(task.completed_at)
                .map(|(s, c)| (c - s).num_milliseconds() as f64 / 1000.0)
                .unwrap_or(0.0),
            idempotency_key: task.idempotency_key.clone(),
            attempt_number: task.attempt_number,
        })?;

        if !deployment.status.is_terminal() {
            let all_tasks = self.tasks.list_by_deployment(deployment.id).await?;
            let all_terminal = all_tasks
                .iter()
                .all(|t| matches!(t.status, crate::domain::TaskStatus::Succeeded | crate::domain::TaskStatus::Cancelled | crate::domain::TaskStatus::Failed));
            let any_failed = all_tasks.iter().any(|t| t.status == crate::domain::TaskStatus::Failed);

            if deployment.status == DeploymentStatus::Executing {
                if any_failed && deployment.intent.rollback_on_failure {
                    deployment.start_rollback()?;
                } else if all_terminal && !any_failed {
                    deployment.start_verification()?;
                }
            } else if deployment.status == DeploymentStatus::Verifying && all_terminal {
                if any_failed {
                    if deployment.intent.rollback_on_failure {
                        deployment.start_rollback()?;
                    } else {
                        deployment.fail("one or more steps failed verification")?;
                    }
                } else {
                    deployment.complete()?;
                }
            }
        }

        self.deployments.save(&deployment).await?;
        self.publish(&mut deployment).await?;
        Ok(deployment)
    }

    /// Explicit operator-initiated rollback. Also materializes compensating
    /// destroy tasks for every successful step, since the state transition
    /// alone does not undo provisioned resources.
    pub async fn rollback_deployment(&self, id: Uuid) -> anyhow::Result<Deployment> {
        let mut deployment = self.load(id).await?;
        deployment.start_rollback()?;
        self.deployments.save(&deployment).await?;
        self.publish(&mut deployment).await?;

        for task in self.materialize_rollback_tasks(&deployment).await? {
            self.tasks.save(&task).await?;
        }
        Ok(deployment)
    }

    /// For every step whose result succeeded, emits a destroy-action task
    /// reusing the idempotency key suffixed `:rollback`, with
    /// `max_attempts = 1` — rollback is best-effort, not retried
    /// indefinitely.
    async fn materialize_rollback_tasks(&self, deployment: &Deployment) -> anyhow::Result<Vec<Task>> {
        let Some(plan) = &deployment.plan else {
            return Ok(Vec::new());
        };
        let mut tasks = Vec::new();
        for result in &deployment.step_results {
            if !result.success {
                continue;
            }
            let Some(step) = plan.steps.iter().find(|s| s.id == result.step_id) else {
                continue;
            };
            let mut task = Task::new(
                deployment.id,
                step.id,
                format!("rollback-{}", step.name),
                step.provider.clone(),
                StepAction::Destroy,
                format!("{}:rollback", step.idempotency_key),
                1,
                step.estimated_duration_seconds * 2,
                serde_json::to_value(&step.resource_spec)?,
            );
            task.enqueue()?;
            tasks.push(task);
        }
        Ok(tasks)
    }
}
