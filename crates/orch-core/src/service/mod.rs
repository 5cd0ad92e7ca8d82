pub mod deployment_service;
pub mod drift_service;

pub use deployment_service::DeploymentService;
pub use drift_service::DriftService;
