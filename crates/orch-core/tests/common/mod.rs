use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use orch_core::domain::{DriftItem, DriftReport, DriftType, ScanType, Severity};
use orch_core::ports::{DriftDetector, Executor};
use serde_json::Value;
use uuid::Uuid;

/// Always-succeeds executor for tests exercising the worker/service layers
/// without a real Terraform binary.
pub struct StubExecutor;

#[async_trait]
impl Executor for StubExecutor {
    async fn init(&self, _working_dir: &Path, _provider: &str) -> anyhow::Result<(bool, String)> {
        Ok((true, "initialized".to_owned()))
    }

    async fn plan(&self, _working_dir: &Path) -> anyhow::Result<(bool, String)> {
        Ok((true, "plan ok".to_owned()))
    }

    async fn apply(&self, _working_dir: &Path, _auto_approve: bool) -> anyhow::Result<(bool, String)> {
        Ok((true, "applied".to_owned()))
    }

    async fn destroy(&self, _working_dir: &Path, _auto_approve: bool) -> anyhow::Result<(bool, String)> {
        Ok((true, "destroyed".to_owned()))
    }

    async fn show_state(&self, _working_dir: &Path) -> anyhow::Result<HashMap<String, Value>> {
        Ok(HashMap::from([("status".to_owned(), Value::String("applied".to_owned()))]))
    }

    async fn generate_config(&self, _spec: &Value, _working_dir: &Path) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

/// Detector that reports a fixed property change for every expected
/// resource, used by the drift-detected end-to-end scenario.
pub struct AlwaysDriftingDetector;

#[async_trait]
impl DriftDetector for AlwaysDriftingDetector {
    async fn detect_drift(
        &self,
        deployment_id: Uuid,
        expected_state: HashMap<String, Value>,
    ) -> anyhow::Result<DriftReport> {
        let items: Vec<DriftItem> = expected_state
            .keys()
            .map(|identifier| DriftItem {
                drift_type: DriftType::PropertyChanged,
                resource_identifier: identifier.clone(),
                property_path: Some("instance_type".to_owned()),
                expected_value: Some(Value::String("t3.medium".to_owned())),
                actual_value: Some(Value::String("t3.small".to_owned())),
                severity: Severity::Medium,
            })
            .collect();
        let has_drift = !items.is_empty();
        Ok(DriftReport {
            id: Uuid::new_v4(),
            deployment_id,
            scan_type: ScanType::Full,
            summary: if has_drift { "drift detected".to_owned() } else { "no drift".to_owned() },
            items,
            remediation_deployment_id: None,
            created_at: chrono::Utc::now(),
        })
    }

    async fn get_current_state(
        &self,
        _provider: &str,
        _resource_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Value>> {
        Ok(HashMap::new())
    }
}

pub fn base_intent() -> orch_core::domain::DeploymentIntent {
    use orch_core::domain::{DeploymentIntent, DeploymentStrategy, Environment};
    DeploymentIntent {
        description: "web application".to_owned(),
        target_providers: vec!["aws".to_owned()],
        target_regions: vec!["us-east-1".to_owned()],
        resources: Vec::new(),
        strategy: DeploymentStrategy::Rolling,
        environment: Environment::Development,
        auto_approve: false,
        rollback_on_failure: false,
        parameters: HashMap::new(),
    }
}
