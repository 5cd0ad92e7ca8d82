use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping every domain event. `payload` shapes are bit-exact per
/// the external-interfaces contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(event_type: impl Into<String>, correlation_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            occurred_at: Utc::now(),
            correlation_id,
            payload,
        }
    }

    pub fn deployment_created(deployment_id: Uuid, tenant_id: &str) -> Self {
        Self::new(
            "deployment.created",
            deployment_id,
            serde_json::json!({ "deployment_id": deployment_id, "tenant_id": tenant_id }),
        )
    }

    pub fn deployment_plan_generated(deployment_id: Uuid, plan_id: Uuid, step_count: usize) -> Self {
        Self::new(
            "deployment.plan_generated",
            deployment_id,
            serde_json::json!({
                "deployment_id": deployment_id,
                "plan_id": plan_id,
                "step_count": step_count,
            }),
        )
    }

    pub fn deployment_approved(deployment_id: Uuid, approved_by: &str) -> Self {
        Self::new(
            "deployment.approved",
            deployment_id,
            serde_json::json!({ "deployment_id": deployment_id, "approved_by": approved_by }),
        )
    }

    pub fn deployment_simple(event_type: &str, deployment_id: Uuid) -> Self {
        Self::new(
            event_type.to_owned(),
            deployment_id,
            serde_json::json!({ "deployment_id": deployment_id }),
        )
    }

    pub fn deployment_failed(deployment_id: Uuid, error_message: &str) -> Self {
        Self::new(
            "deployment.failed",
            deployment_id,
            serde_json::json!({ "deployment_id": deployment_id, "error_message": error_message }),
        )
    }

    pub fn task_status(
        task_id: Uuid,
        deployment_id: Uuid,
        worker_id: Option<&str>,
        status: &str,
    ) -> Self {
        Self::new(
            format!("task.{status}"),
            deployment_id,
            serde_json::json!({
                "task_id": task_id,
                "deployment_id": deployment_id,
                "worker_id": worker_id,
                "status": status,
            }),
        )
    }

    pub fn drift_detected(deployment_id: Uuid, drift_count: usize, max_severity: &str) -> Self {
        Self::new(
            "drift.detected",
            deployment_id,
            serde_json::json!({
                "deployment_id": deployment_id,
                "drift_count": drift_count,
                "max_severity": max_severity,
            }),
        )
    }
}
