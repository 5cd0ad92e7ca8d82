use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Declarative description of what should be deployed. Immutable once
/// attached to a [`super::deployment::Deployment`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentIntent {
    pub description: String,
    pub target_providers: Vec<String>,
    pub target_regions: Vec<String>,
    pub resources: Vec<ResourceSpec>,
    pub strategy: DeploymentStrategy,
    pub environment: Environment,
    pub auto_approve: bool,
    pub rollback_on_failure: bool,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub resource_type: ResourceType,
    pub provider: String,
    pub region: String,
    pub name: String,
    #[serde(default)]
    pub properties: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Resource identifiers (`"{provider}/{region}/{type}/{name}"`) this
    /// resource depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ResourceSpec {
    /// `"{provider}/{region}/{type}/{name}"`, the planner's dependency key.
    pub fn resource_identifier(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.provider, self.region, self.resource_type, self.name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Network,
    Dns,
    Storage,
    Database,
    Cache,
    Queue,
    Compute,
    Container,
    Serverless,
    LoadBalancer,
    Cdn,
    Other(String),
}

impl ResourceType {
    /// Planner sort priority; unknown types sort last (99).
    pub fn priority(&self) -> u32 {
        match self {
            ResourceType::Network => 1,
            ResourceType::Dns => 2,
            ResourceType::Storage => 3,
            ResourceType::Database => 4,
            ResourceType::Cache => 5,
            ResourceType::Queue => 6,
            ResourceType::Compute => 7,
            ResourceType::Container => 8,
            ResourceType::Serverless => 9,
            ResourceType::LoadBalancer => 10,
            ResourceType::Cdn => 11,
            ResourceType::Other(_) => 99,
        }
    }

    pub fn estimated_duration_seconds(&self) -> i64 {
        match self {
            ResourceType::Network => 30,
            ResourceType::Compute => 60,
            ResourceType::Database => 120,
            ResourceType::Container => 90,
            ResourceType::Storage => 15,
            ResourceType::Serverless => 30,
            ResourceType::LoadBalancer => 45,
            ResourceType::Cache => 60,
            _ => 60,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceType::Network => "network",
            ResourceType::Dns => "dns",
            ResourceType::Storage => "storage",
            ResourceType::Database => "database",
            ResourceType::Cache => "cache",
            ResourceType::Queue => "queue",
            ResourceType::Compute => "compute",
            ResourceType::Container => "container",
            ResourceType::Serverless => "serverless",
            ResourceType::LoadBalancer => "load_balancer",
            ResourceType::Cdn => "cdn",
            ResourceType::Other(other) => other,
        };
        write!(f, "{s}")
    }
}

impl FromStr for ResourceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "network" => ResourceType::Network,
            "dns" => ResourceType::Dns,
            "storage" => ResourceType::Storage,
            "database" => ResourceType::Database,
            "cache" => ResourceType::Cache,
            "queue" => ResourceType::Queue,
            "compute" => ResourceType::Compute,
            "container" => ResourceType::Container,
            "serverless" => ResourceType::Serverless,
            "load_balancer" => ResourceType::LoadBalancer,
            "cdn" => ResourceType::Cdn,
            other => ResourceType::Other(other.to_owned()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStrategy {
    Rolling,
    BlueGreen,
    Canary,
    Recreate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        };
        write!(f, "{s}")
    }
}
