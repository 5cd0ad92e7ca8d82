pub mod deployments;
pub mod drift_reports;
pub mod locks;
pub mod tasks;
