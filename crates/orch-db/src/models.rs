use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Status and enum columns are plain `TEXT`, validated/parsed by the domain
/// layer (`orch-core`) which owns the enum types and their `FromStr`
/// implementations; `orch-db` stays domain-agnostic, matching the split
/// between `gator-db` (raw rows) and `gator-core` (typed state machines).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeploymentRow {
    pub id: Uuid,
    pub name: String,
    pub intent: serde_json::Value,
    pub status: String,
    pub plan: Option<serde_json::Value>,
    pub step_results: serde_json::Value,
    pub initiated_by: String,
    pub tenant_id: String,
    pub error_message: Option<String>,
    pub rollback_deployment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub step_id: Uuid,
    pub name: String,
    pub status: String,
    pub provider: String,
    pub terraform_action: String,
    pub worker_id: Option<String>,
    pub idempotency_key: String,
    pub attempt_number: i32,
    pub max_attempts: i32,
    pub timeout_seconds: i64,
    pub input_data: serde_json::Value,
    pub output_data: serde_json::Value,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DriftReportRow {
    pub id: Uuid,
    pub deployment_id: Uuid,
    pub scan_type: String,
    pub items: serde_json::Value,
    pub summary: String,
    pub remediation_deployment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LockRow {
    pub resource_id: String,
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}
