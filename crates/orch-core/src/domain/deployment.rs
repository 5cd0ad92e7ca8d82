use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

use super::events::Event;
use super::intent::DeploymentIntent;
use super::plan::ExecutionPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Planning,
    Planned,
    AwaitingApproval,
    Approved,
    Executing,
    Verifying,
    Completed,
    Failed,
    RollingBack,
    RolledBack,
    Cancelled,
}

impl DeploymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DeploymentStatus::Completed | DeploymentStatus::Cancelled | DeploymentStatus::RolledBack
        )
    }

    /// The allowed-transition table from the deployment state machine.
    pub fn is_valid_transition(from: DeploymentStatus, to: DeploymentStatus) -> bool {
        use DeploymentStatus::*;
        matches!(
            (from, to),
            (Pending, Planning)
                | (Pending, Cancelled)
                | (Planning, Planned)
                | (Planning, Failed)
                | (Planned, AwaitingApproval)
                | (Planned, Approved)
                | (Planned, Executing)
                | (Planned, Cancelled)
                | (AwaitingApproval, Approved)
                | (AwaitingApproval, Cancelled)
                | (Approved, Executing)
                | (Approved, Cancelled)
                | (Executing, Verifying)
                | (Executing, Failed)
                | (Executing, RollingBack)
                | (Verifying, Completed)
                | (Verifying, Failed)
                | (Verifying, RollingBack)
                | (Failed, RollingBack)
                | (Failed, Pending)
                | (RollingBack, RolledBack)
                | (RollingBack, Failed)
                | (RolledBack, Pending)
        )
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Planning => "planning",
            DeploymentStatus::Planned => "planned",
            DeploymentStatus::AwaitingApproval => "awaiting_approval",
            DeploymentStatus::Approved => "approved",
            DeploymentStatus::Executing => "executing",
            DeploymentStatus::Verifying => "verifying",
            DeploymentStatus::Completed => "completed",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::RollingBack => "rolling_back",
            DeploymentStatus::RolledBack => "rolled_back",
            DeploymentStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DeploymentStatus {
    type Err = DeploymentStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use DeploymentStatus::*;
        Ok(match s {
            "pending" => Pending,
            "planning" => Planning,
            "planned" => Planned,
            "awaiting_approval" => AwaitingApproval,
            "approved" => Approved,
            "executing" => Executing,
            "verifying" => Verifying,
            "completed" => Completed,
            "failed" => Failed,
            "rolling_back" => RollingBack,
            "rolled_back" => RolledBack,
            "cancelled" => Cancelled,
            other => return Err(DeploymentStatusParseError(other.to_owned())),
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentStatusParseError(pub String);

impl fmt::Display for DeploymentStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid deployment status: {}", self.0)
    }
}

impl std::error::Error for DeploymentStatusParseError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: Uuid,
    pub success: bool,
    #[serde(default)]
    pub output: serde_json::Value,
    pub error_message: Option<String>,
    #[serde(default)]
    pub resource_ids: std::collections::HashMap<String, String>,
    pub duration_seconds: f64,
    pub idempotency_key: String,
    pub attempt_number: u32,
}

/// The aggregate root. Mutated only through its own methods; every mutating
/// method appends to an internal event buffer drained by [`Self::collect_events`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub name: String,
    pub intent: DeploymentIntent,
    pub status: DeploymentStatus,
    pub plan: Option<ExecutionPlan>,
    pub step_results: Vec<StepResult>,
    pub initiated_by: String,
    pub tenant_id: String,
    pub error_message: Option<String>,
    pub rollback_deployment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,

    #[serde(skip, default)]
    pub(crate) pending_events: Vec<Event>,
}

impl Deployment {
    pub fn new(intent: DeploymentIntent, name: String, initiated_by: String, tenant_id: String) -> Self {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let mut d = Self {
            id,
            name,
            intent,
            status: DeploymentStatus::Pending,
            plan: None,
            step_results: Vec::new(),
            initiated_by,
            tenant_id: tenant_id.clone(),
            error_message: None,
            rollback_deployment_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
            pending_events: Vec::new(),
        };
        d.pending_events.push(Event::deployment_created(id, &tenant_id));
        d
    }

    /// Returns and clears the pending-event buffer. The caller must publish
    /// these only after the corresponding persistence write has committed.
    pub fn collect_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending_events)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }

    fn transition(&mut self, to: DeploymentStatus) -> Result<(), DomainError> {
        if self.status.is_terminal() || !DeploymentStatus::is_valid_transition(self.status, to) {
            return Err(DomainError::InvalidStateTransition {
                entity: "deployment",
                id: self.id,
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    pub fn start_planning(&mut self) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Planning)
    }

    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Cancelled)?;
        self.pending_events
            .push(Event::deployment_simple("deployment.cancelled", self.id));
        Ok(())
    }

    /// Plan-attachment policy: `PLANNING -> PLANNED`, emit
    /// `deployment.plan_generated`, then immediately auto-advance to
    /// `APPROVED` or `AWAITING_APPROVAL` depending on `intent.auto_approve`.
    pub fn set_plan(&mut self, plan: ExecutionPlan) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Planned)?;
        let step_count = plan.steps.len();
        let plan_id = plan.id;
        self.plan = Some(plan);
        self.pending_events
            .push(Event::deployment_plan_generated(self.id, plan_id, step_count));

        if self.intent.auto_approve {
            self.transition(DeploymentStatus::Approved)?;
            self.pending_events.push(Event::deployment_approved(self.id, "auto"));
        } else {
            self.transition(DeploymentStatus::AwaitingApproval)?;
        }
        Ok(())
    }

    pub fn approve(&mut self, approved_by: &str) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Approved)?;
        self.pending_events
            .push(Event::deployment_approved(self.id, approved_by));
        Ok(())
    }

    pub fn start_execution(&mut self) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Executing)?;
        self.pending_events
            .push(Event::deployment_simple("deployment.started", self.id));
        Ok(())
    }

    pub fn start_verification(&mut self) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Verifying)
    }

    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Completed)?;
        self.pending_events
            .push(Event::deployment_simple("deployment.completed", self.id));
        Ok(())
    }

    pub fn fail(&mut self, error_message: impl Into<String>) -> Result<(), DomainError> {
        let error_message = error_message.into();
        self.transition(DeploymentStatus::Failed)?;
        self.error_message = Some(error_message.clone());
        self.pending_events
            .push(Event::deployment_failed(self.id, &error_message));
        Ok(())
    }

    pub fn start_rollback(&mut self) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::RollingBack)?;
        self.pending_events
            .push(Event::deployment_simple("deployment.rollback_started", self.id));
        Ok(())
    }

    pub fn complete_rollback(&mut self) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::RolledBack)?;
        self.pending_events
            .push(Event::deployment_simple("deployment.rollback_completed", self.id));
        Ok(())
    }

    /// Re-plan permitted from a rolled-back or failed deployment.
    pub fn reset_to_pending(&mut self) -> Result<(), DomainError> {
        self.transition(DeploymentStatus::Pending)
    }

    /// Step-result policy: appending a failed result when
    /// `intent.rollback_on_failure` synchronously fails the aggregate.
    pub fn append_step_result(&mut self, result: StepResult) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                entity: "deployment",
                id: self.id,
                from: self.status.to_string(),
                to: "append_step_result".to_owned(),
            });
        }
        let max_results = self.plan.as_ref().map(|p| p.steps.len()).unwrap_or(0);
        if self.step_results.len() >= max_results {
            return Err(DomainError::PreconditionMissing(format!(
                "deployment {} already has {} step results, bounded by plan step count {}",
                self.id,
                self.step_results.len(),
                max_results
            )));
        }
        let failed = !result.success;
        let error_message = result.error_message.clone();
        self.step_results.push(result);
        self.touch();

        if failed && self.intent.rollback_on_failure {
            self.fail(error_message.unwrap_or_else(|| "step failed".to_owned()))?;
        }
        Ok(())
    }

    pub fn is_complete_success(&self) -> bool {
        match &self.plan {
            Some(plan) => {
                self.step_results.len() == plan.steps.len()
                    && self.step_results.iter().all(|r| r.success)
            }
            None => false,
        }
    }

    pub fn has_failed_step(&self) -> bool {
        self.step_results.iter().any(|r| !r.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::{DeploymentStrategy, Environment};
    use std::collections::HashMap;

    fn intent(auto_approve: bool, rollback_on_failure: bool) -> DeploymentIntent {
        DeploymentIntent {
            description: "test".to_owned(),
            target_providers: vec!["aws".to_owned()],
            target_regions: vec!["us-east-1".to_owned()],
            resources: Vec::new(),
            strategy: DeploymentStrategy::Rolling,
            environment: Environment::Development,
            auto_approve,
            rollback_on_failure,
            parameters: HashMap::new(),
        }
    }

    fn plan_with_one_step() -> ExecutionPlan {
        use crate::domain::plan::{ExecutionStep, StepAction};
        use crate::domain::intent::{ResourceSpec, ResourceType};

        ExecutionPlan {
            id: Uuid::new_v4(),
            steps: vec![ExecutionStep {
                id: Uuid::new_v4(),
                name: "deploy-web".to_owned(),
                description: "".to_owned(),
                provider: "aws".to_owned(),
                resource_spec: ResourceSpec {
                    resource_type: ResourceType::Compute,
                    provider: "aws".to_owned(),
                    region: "us-east-1".to_owned(),
                    name: "web".to_owned(),
                    properties: HashMap::new(),
                    tags: HashMap::new(),
                    dependencies: Vec::new(),
                },
                action: StepAction::Create,
                dependencies: Vec::new(),
                estimated_duration_seconds: 60,
                idempotency_key: "key-1".to_owned(),
                retry_count: 0,
                max_retries: 3,
            }],
            estimated_total_duration_seconds: 60,
            risk_assessment: crate::domain::RiskLevel::Low,
            reasoning: String::new(),
        }
    }

    #[test]
    fn invalid_transition_is_rejected_and_state_unchanged() {
        let mut d = Deployment::new(intent(false, false), "d".to_owned(), "a".to_owned(), "t".to_owned());
        let before = d.status;
        let err = d.complete().unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
        assert_eq!(d.status, before);
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        let mut d = Deployment::new(intent(false, false), "d".to_owned(), "a".to_owned(), "t".to_owned());
        d.cancel().unwrap();
        assert!(d.status.is_terminal());
        assert!(d.start_planning().is_err());
    }

    #[test]
    fn set_plan_auto_approves_when_requested() {
        let mut d = Deployment::new(intent(true, false), "d".to_owned(), "a".to_owned(), "t".to_owned());
        d.start_planning().unwrap();
        d.set_plan(plan_with_one_step()).unwrap();
        assert_eq!(d.status, DeploymentStatus::Approved);
    }

    #[test]
    fn set_plan_awaits_approval_by_default() {
        let mut d = Deployment::new(intent(false, false), "d".to_owned(), "a".to_owned(), "t".to_owned());
        d.start_planning().unwrap();
        d.set_plan(plan_with_one_step()).unwrap();
        assert_eq!(d.status, DeploymentStatus::AwaitingApproval);
    }

    #[test]
    fn failed_step_with_rollback_on_failure_fails_the_deployment() {
        let mut d = Deployment::new(intent(true, true), "d".to_owned(), "a".to_owned(), "t".to_owned());
        d.start_planning().unwrap();
        let plan = plan_with_one_step();
        let step_id = plan.steps[0].id;
        d.set_plan(plan).unwrap();
        d.start_execution().unwrap();

        d.append_step_result(StepResult {
            step_id,
            success: false,
            output: serde_json::Value::Null,
            error_message: Some("boom".to_owned()),
            resource_ids: HashMap::new(),
            duration_seconds: 1.0,
            idempotency_key: "key-1".to_owned(),
            attempt_number: 1,
        })
        .unwrap();

        assert_eq!(d.status, DeploymentStatus::Failed);
        assert_eq!(d.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn step_results_are_bounded_by_plan_step_count() {
        let mut d = Deployment::new(intent(true, false), "d".to_owned(), "a".to_owned(), "t".to_owned());
        d.start_planning().unwrap();
        let plan = plan_with_one_step();
        let step_id = plan.steps[0].id;
        d.set_plan(plan).unwrap();
        d.start_execution().unwrap();

        let result = StepResult {
            step_id,
            success: true,
            output: serde_json::Value::Null,
            error_message: None,
            resource_ids: HashMap::new(),
            duration_seconds: 1.0,
            idempotency_key: "key-1".to_owned(),
            attempt_number: 1,
        };
        d.append_step_result(result.clone()).unwrap();
        assert!(d.append_step_result(result).is_err());
    }

    #[test]
    fn collect_events_drains_the_buffer() {
        let mut d = Deployment::new(intent(false, false), "d".to_owned(), "a".to_owned(), "t".to_owned());
        let events = d.collect_events();
        assert!(!events.is_empty());
        assert!(d.collect_events().is_empty());
    }

    #[test]
    fn display_and_from_str_round_trip() {
        for status in [
            DeploymentStatus::Pending,
            DeploymentStatus::Planning,
            DeploymentStatus::Planned,
            DeploymentStatus::AwaitingApproval,
            DeploymentStatus::Approved,
            DeploymentStatus::Executing,
            DeploymentStatus::Verifying,
            DeploymentStatus::Completed,
            DeploymentStatus::Failed,
            DeploymentStatus::RollingBack,
            DeploymentStatus::RolledBack,
            DeploymentStatus::Cancelled,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<DeploymentStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<DeploymentStatus>().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let mut d = Deployment::new(intent(true, false), "d".to_owned(), "a".to_owned(), "t".to_owned());
        d.start_planning().unwrap();
        d.set_plan(plan_with_one_step()).unwrap();
        d.collect_events();

        let json = serde_json::to_string(&d).unwrap();
        let round_tripped: Deployment = serde_json::from_str(&json).unwrap();
        assert_eq!(d.id, round_tripped.id);
        assert_eq!(d.status, round_tripped.status);
        assert_eq!(d.plan, round_tripped.plan);
    }
}
