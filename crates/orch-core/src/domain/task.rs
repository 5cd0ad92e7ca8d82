use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, MaxRetriesExceeded};

use super::plan::StepAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Acquired,
    Running,
    Succeeded,
    Failed,
    Retrying,
    Cancelled,
    TimedOut,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Cancelled)
    }

    pub fn is_valid_transition(from: TaskStatus, to: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (from, to),
            (Pending, Queued)
                | (Pending, Cancelled)
                | (Queued, Acquired)
                | (Queued, Cancelled)
                | (Queued, TimedOut)
                | (Acquired, Running)
                | (Acquired, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Failed, Retrying)
                | (Failed, Cancelled)
                | (TimedOut, Retrying)
                | (TimedOut, Cancelled)
                | (TimedOut, Failed)
                | (Retrying, Queued)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Acquired => "acquired",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Retrying => "retrying",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use TaskStatus::*;
        Ok(match s {
            "pending" => Pending,
            "queued" => Queued,
            "acquired" => Acquired,
            "running" => Running,
            "succeeded" => Succeeded,
            "failed" => Failed,
            "retrying" => Retrying,
            "cancelled" => Cancelled,
            "timed_out" => TimedOut,
            other => return Err(TaskStatusParseError(other.to_owned())),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

/// The worker-visible unit of execution, corresponding to a single step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub step_id: Uuid,
    pub name: String,
    pub status: TaskStatus,
    pub provider: String,
    pub terraform_action: StepAction,
    pub worker_id: Option<String>,
    pub idempotency_key: String,
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub timeout_seconds: i64,
    #[serde(default)]
    pub input_data: serde_json::Value,
    #[serde(default)]
    pub output_data: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Task {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        deployment_id: Uuid,
        step_id: Uuid,
        name: String,
        provider: String,
        terraform_action: StepAction,
        idempotency_key: String,
        max_attempts: u32,
        timeout_seconds: i64,
        input_data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            deployment_id,
            step_id,
            name,
            status: TaskStatus::Pending,
            provider,
            terraform_action,
            worker_id: None,
            idempotency_key,
            attempt_number: 1,
            max_attempts,
            timeout_seconds,
            input_data,
            output_data: serde_json::Value::Null,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }

    fn transition(&mut self, to: TaskStatus) -> Result<(), DomainError> {
        if self.status.is_terminal() || !TaskStatus::is_valid_transition(self.status, to) {
            return Err(DomainError::InvalidStateTransition {
                entity: "task",
                id: self.id,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    /// `PENDING -> QUEUED`: the task becomes claimable.
    pub fn enqueue(&mut self) -> Result<(), DomainError> {
        self.transition(TaskStatus::Queued)
    }

    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition(TaskStatus::Cancelled)
    }

    /// Invoked by the repository's `acquire_next`: `QUEUED -> ACQUIRED`.
    pub fn acquire(&mut self, worker_id: impl Into<String>) -> Result<(), DomainError> {
        self.transition(TaskStatus::Acquired)?;
        self.worker_id = Some(worker_id.into());
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), DomainError> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn succeed(&mut self, output: serde_json::Value) -> Result<(), DomainError> {
        self.transition(TaskStatus::Succeeded)?;
        self.output_data = output;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn fail(&mut self, error_message: impl Into<String>) -> Result<(), DomainError> {
        self.transition(TaskStatus::Failed)?;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn timeout(&mut self) -> Result<(), DomainError> {
        self.transition(TaskStatus::TimedOut)?;
        self.error_message = Some("deadline exceeded".to_owned());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `retry()` fails with `MaxRetriesExceeded` once `attempt_number` has
    /// reached `max_attempts`; otherwise clears `worker_id`/`error_message`,
    /// increments `attempt_number`, and traverses `RETRYING -> QUEUED` so the
    /// task is immediately re-claimable under the same idempotency key.
    pub fn retry(&mut self) -> anyhow::Result<()> {
        if self.attempt_number >= self.max_attempts {
            return Err(MaxRetriesExceeded {
                task_id: self.id,
                max_attempts: self.max_attempts,
            }
            .into());
        }
        let retrying_from = match self.status {
            TaskStatus::Failed | TaskStatus::TimedOut => TaskStatus::Retrying,
            other => {
                return Err(DomainError::InvalidStateTransition {
                    entity: "task",
                    id: self.id,
                    from: other.to_string(),
                    to: "retrying".to_owned(),
                }
                .into())
            }
        };
        self.transition(retrying_from)?;
        self.worker_id = None;
        self.error_message = None;
        self.attempt_number += 1;
        self.started_at = None;
        self.completed_at = None;
        self.transition(TaskStatus::Queued)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_task(max_attempts: u32) -> Task {
        Task::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "deploy-web".to_owned(),
            "aws".to_owned(),
            StepAction::Create,
            "key-1".to_owned(),
            max_attempts,
            60,
            serde_json::Value::Null,
        )
    }

    #[test]
    fn attempt_number_never_exceeds_max_attempts() {
        let mut t = new_task(2);
        t.enqueue().unwrap();
        t.acquire("worker-1").unwrap();
        t.start().unwrap();
        t.fail("boom").unwrap();
        assert_eq!(t.attempt_number, 1);
        t.retry().unwrap();
        assert_eq!(t.attempt_number, 2);
        assert_eq!(t.status, TaskStatus::Queued);

        t.acquire("worker-1").unwrap();
        t.start().unwrap();
        t.fail("boom again").unwrap();
        let err = t.retry().unwrap_err();
        assert!(err.downcast_ref::<MaxRetriesExceeded>().is_some());
        assert_eq!(t.attempt_number, 2);
    }

    #[test]
    fn retry_clears_worker_and_error() {
        let mut t = new_task(3);
        t.enqueue().unwrap();
        t.acquire("worker-1").unwrap();
        t.start().unwrap();
        t.fail("boom").unwrap();
        t.retry().unwrap();
        assert!(t.worker_id.is_none());
        assert!(t.error_message.is_none());
    }

    #[test]
    fn worker_id_set_only_while_claimed_or_after_completion() {
        let mut t = new_task(3);
        assert!(t.worker_id.is_none());
        t.enqueue().unwrap();
        assert!(t.worker_id.is_none());
        t.acquire("worker-1").unwrap();
        assert!(t.worker_id.is_some());
        t.start().unwrap();
        t.succeed(serde_json::json!({"ok": true})).unwrap();
        assert!(t.worker_id.is_some());
    }

    #[test]
    fn timeout_then_retry_is_allowed() {
        let mut t = new_task(3);
        t.enqueue().unwrap();
        t.acquire("worker-1").unwrap();
        t.start().unwrap();
        t.timeout().unwrap();
        assert_eq!(t.status, TaskStatus::TimedOut);
        t.retry().unwrap();
        assert_eq!(t.status, TaskStatus::Queued);
    }

    #[test]
    fn succeeded_and_cancelled_are_terminal() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn display_and_from_str_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Queued,
            TaskStatus::Acquired,
            TaskStatus::Running,
            TaskStatus::Succeeded,
            TaskStatus::Failed,
            TaskStatus::Retrying,
            TaskStatus::Cancelled,
            TaskStatus::TimedOut,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<TaskStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<TaskStatus>().is_err());
    }
}
