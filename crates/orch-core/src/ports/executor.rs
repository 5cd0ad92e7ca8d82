use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

/// Abstracts the side-effectful Terraform-driving operations. The action
/// ordering a worker uses is `generate_config -> init -> plan -> (apply|destroy)`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn init(&self, working_dir: &Path, provider: &str) -> anyhow::Result<(bool, String)>;
    async fn plan(&self, working_dir: &Path) -> anyhow::Result<(bool, String)>;
    async fn apply(&self, working_dir: &Path, auto_approve: bool) -> anyhow::Result<(bool, String)>;
    async fn destroy(&self, working_dir: &Path, auto_approve: bool) -> anyhow::Result<(bool, String)>;
    async fn show_state(&self, working_dir: &Path) -> anyhow::Result<HashMap<String, Value>>;
    async fn generate_config(&self, spec: &Value, working_dir: &Path) -> anyhow::Result<String>;
}

const _: () = {
    fn _assert_object_safe(_: &dyn Executor) {}
};
