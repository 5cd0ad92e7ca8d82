use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::domain::Event;
use crate::error::DomainError;
use crate::ports::{DeploymentRepository, DriftDetector, DriftReportRepository, EventSink};

pub struct DriftService {
    deployments: Arc<dyn DeploymentRepository>,
    reports: Arc<dyn DriftReportRepository>,
    detector: Arc<dyn DriftDetector>,
    events: Arc<dyn EventSink>,
}

impl DriftService {
    pub fn new(
        deployments: Arc<dyn DeploymentRepository>,
        reports: Arc<dyn DriftReportRepository>,
        detector: Arc<dyn DriftDetector>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            deployments,
            reports,
            detector,
            events,
        }
    }

    pub async fn scan_deployment(&self, deployment_id: Uuid) -> anyhow::Result<crate::domain::DriftReport> {
        let deployment = self
            .deployments
            .get(deployment_id)
            .await?
            .ok_or_else(|| DomainError::NotFound { entity: "deployment", id: deployment_id })?;

        let expected_state: HashMap<String, serde_json::Value> = match &deployment.plan {
            Some(plan) => plan
                .steps
                .iter()
                .map(|step| {
                    let value = serde_json::to_value(&step.resource_spec).unwrap_or(serde_json::Value::Null);
                    (step.resource_spec.resource_identifier(), value)
                })
                .collect(),
            None => HashMap::new(),
        };

        let report = self.detector.detect_drift(deployment_id, expected_state).await?;
        self.reports.save(&report).await?;

        if report.has_drift() {
            self.events
                .publish(Event::drift_detected(
                    deployment_id,
                    report.items.len(),
                    &report.max_severity().to_string(),
                ))
                .await?;
        }
        Ok(report)
    }
}
