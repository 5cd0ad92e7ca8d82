use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::{Event, StepAction, Task};
use crate::ports::{EventSink, Executor, TaskRepository};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    pub max_concurrent: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// `worker-{random8hex}`, the default worker identity.
pub fn default_worker_id() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill(&mut bytes);
    format!("worker-{}", hex_encode(&bytes))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A cooperative poll loop claiming tasks via `acquire_next`, running each
/// under a hard per-task deadline, and reporting results. Workers are
/// stateless across restarts; correctness comes from task-level idempotency
/// (the executor port must tolerate re-running the same idempotency key).
pub struct WorkerAgent {
    config: WorkerConfig,
    tasks: Arc<dyn TaskRepository>,
    executor: Arc<dyn Executor>,
    events: Arc<dyn EventSink>,
    semaphore: Arc<Semaphore>,
    running: Arc<AtomicBool>,
    active_count: Arc<AtomicUsize>,
    idle_notify: Arc<Notify>,
}

impl WorkerAgent {
    pub fn new(config: WorkerConfig, tasks: Arc<dyn TaskRepository>, executor: Arc<dyn Executor>, events: Arc<dyn EventSink>) -> Self {
        let max_concurrent = config.max_concurrent;
        Self {
            config,
            tasks,
            executor,
            events,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            running: Arc::new(AtomicBool::new(true)),
            active_count: Arc::new(AtomicUsize::new(0)),
            idle_notify: Arc::new(Notify::new()),
        }
    }

    pub fn active_task_count(&self) -> usize {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Clears the running flag; no new claims begin once stopping. Blocks
    /// until `active_task_count() == 0`.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        while self.active_task_count() > 0 {
            self.idle_notify.notified().await;
        }
    }

    /// Runs the poll loop until `cancel` fires or `stop()` is called from
    /// another task. `(tx, rx)` exist so callers can observe per-task
    /// completions without polling the repository themselves.
    pub async fn run(&self, cancel: CancellationToken) -> mpsc::UnboundedReceiver<Uuid> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.run_with_sender(cancel, tx).await;
        rx
    }

    async fn run_with_sender(&self, cancel: CancellationToken, tx: mpsc::UnboundedSender<Uuid>) {
        loop {
            if cancel.is_cancelled() || !self.running.load(Ordering::SeqCst) {
                break;
            }

            if self.semaphore.available_permits() == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = cancel.cancelled() => break,
                }
                continue;
            }

            match self.tasks.acquire_next(&self.config.worker_id).await {
                Ok(Some(task)) => {
                    self.spawn_activity(task, tx.clone());
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "acquire_next failed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        }
    }

    fn spawn_activity(&self, task: Task, tx: mpsc::UnboundedSender<Uuid>) {
        let semaphore = self.semaphore.clone();
        let tasks = self.tasks.clone();
        let executor = self.executor.clone();
        let events = self.events.clone();
        let worker_id = self.config.worker_id.clone();
        let active_count = self.active_count.clone();
        let idle_notify = self.idle_notify.clone();

        active_count.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore never closed");
            let task_id = task.id;
            if let Err(err) = run_task_activity(task, &tasks, &*executor, &*events, &worker_id).await {
                tracing::warn!(task_id = %task_id, error = %err, "task activity failed");
            }
            let _ = tx.send(task_id);
            if active_count.fetch_sub(1, Ordering::SeqCst) == 1 {
                idle_notify.notify_waiters();
            }
        });
    }
}

/// The per-task Template Method: start -> execute-under-deadline ->
/// succeed/fail/timeout -> persist -> publish.
async fn run_task_activity(
    mut task: Task,
    tasks: &Arc<dyn TaskRepository>,
    executor: &dyn Executor,
    events: &dyn EventSink,
    worker_id: &str,
) -> anyhow::Result<()> {
    task.start()?;
    tasks.save(&task).await?;
    events
        .publish(Event::task_status(task.id, task.deployment_id, Some(worker_id), "running"))
        .await?;

    let deadline = Duration::from_secs(task.timeout_seconds.max(0) as u64);
    let outcome = timeout(deadline, execute(executor, &task)).await;

    match outcome {
        Ok(Ok(output)) => task.succeed(output)?,
        Ok(Err(err)) => task.fail(err.to_string())?,
        Err(_elapsed) => task.timeout()?,
    }

    tasks.save(&task).await?;
    events
        .publish(Event::task_status(task.id, task.deployment_id, Some(worker_id), &task.status.to_string()))
        .await?;
    Ok(())
}

/// Drives the executor port through `generate_config -> init -> plan ->
/// (apply|destroy)` for one task, returning the resulting state map as the
/// task's output.
async fn execute(executor: &dyn Executor, task: &Task) -> anyhow::Result<serde_json::Value> {
    let working_dir = std::env::temp_dir().join(format!("orch-task-{}", task.id));
    tokio::fs::create_dir_all(&working_dir).await?;

    executor.generate_config(&task.input_data, &working_dir).await?;
    let (ok, msg) = executor.init(&working_dir, &task.provider).await?;
    anyhow::ensure!(ok, "terraform init failed: {msg}");

    let (ok, msg) = executor.plan(&working_dir).await?;
    anyhow::ensure!(ok, "terraform plan failed: {msg}");

    let (ok, msg) = match task.terraform_action {
        StepAction::Destroy => executor.destroy(&working_dir, true).await?,
        StepAction::Create | StepAction::Update => executor.apply(&working_dir, true).await?,
    };
    anyhow::ensure!(ok, "terraform {} failed: {msg}", task.terraform_action);

    let state = executor.show_state(&working_dir).await?;
    Ok(serde_json::to_value(state)?)
}
