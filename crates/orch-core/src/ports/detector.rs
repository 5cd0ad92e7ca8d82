use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::DriftReport;

#[async_trait]
pub trait DriftDetector: Send + Sync {
    /// `expected_state` is keyed by resource identifier
    /// (`"{provider}/{region}/{type}/{name}"`). Implementations must emit one
    /// `RESOURCE_REMOVED`/`CRITICAL` item per resource present in expected but
    /// missing from actual, `PROPERTY_CHANGED` items for property-level
    /// differences, and `RESOURCE_ADDED` items for resources present in
    /// actual but absent from expected.
    async fn detect_drift(
        &self,
        deployment_id: Uuid,
        expected_state: HashMap<String, Value>,
    ) -> anyhow::Result<DriftReport>;

    async fn get_current_state(
        &self,
        provider: &str,
        resource_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Value>>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn DriftDetector) {}
};
