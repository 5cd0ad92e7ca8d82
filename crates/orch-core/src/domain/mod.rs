pub mod deployment;
pub mod drift;
pub mod events;
pub mod intent;
pub mod plan;
pub mod task;

pub use deployment::{Deployment, DeploymentStatus, StepResult};
pub use drift::{DriftItem, DriftReport, DriftType, ScanType, Severity};
pub use events::Event;
pub use intent::{DeploymentIntent, DeploymentStrategy, Environment, ResourceSpec, ResourceType};
pub use plan::{ExecutionPlan, ExecutionStep, RiskLevel, StepAction, Wave};
pub use task::{Task, TaskStatus};
