use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::intent::ResourceSpec;

/// Immutable once produced by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: Uuid,
    pub steps: Vec<ExecutionStep>,
    pub estimated_total_duration_seconds: i64,
    pub risk_assessment: RiskLevel,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub provider: String,
    pub resource_spec: ResourceSpec,
    pub action: StepAction,
    /// Ids of other steps in the same plan this step depends on.
    pub dependencies: Vec<Uuid>,
    pub estimated_duration_seconds: i64,
    /// Stable across retries of the corresponding task.
    pub idempotency_key: String,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl ExecutionStep {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Create,
    Update,
    Destroy,
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepAction::Create => "create",
            StepAction::Update => "update",
            StepAction::Destroy => "destroy",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StepAction {
    type Err = StepActionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(StepAction::Create),
            "update" => Ok(StepAction::Update),
            "destroy" => Ok(StepAction::Destroy),
            other => Err(StepActionParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepActionParseError(pub String);

impl fmt::Display for StepActionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid step action: {}", self.0)
    }
}

impl std::error::Error for StepActionParseError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        };
        write!(f, "{s}")
    }
}

/// A maximal antichain of steps whose dependencies are satisfied by earlier
/// waves. See [`crate::planner::wave_partition`].
pub type Wave = Vec<ExecutionStep>;
