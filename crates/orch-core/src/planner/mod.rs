pub mod reasoning;

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::domain::{
    DeploymentIntent, ExecutionPlan, ExecutionStep, ResourceSpec, ResourceType, RiskLevel,
    StepAction, Wave,
};

/// Rule-based translation from an intent to an execution plan. No I/O, no
/// suspension: this step is CPU-only.
pub fn generate_plan(intent: &DeploymentIntent) -> ExecutionPlan {
    let reasoning = reasoning::summarize(intent);

    let specs: Vec<ResourceSpec> = if intent.resources.is_empty() {
        synthesize_default_resources(intent)
    } else {
        let mut specs = intent.resources.clone();
        specs.sort_by_key(|r| r.resource_type.priority());
        specs
    };

    let mut steps: Vec<ExecutionStep> = Vec::with_capacity(specs.len());
    let mut id_by_identifier: HashMap<String, Uuid> = HashMap::new();

    for spec in &specs {
        let id = Uuid::new_v4();
        id_by_identifier.insert(spec.resource_identifier(), id);
        let duration = spec.resource_type.estimated_duration_seconds();
        steps.push(ExecutionStep {
            id,
            name: format!("deploy-{}", spec.name),
            description: format!("{} {} in {}", spec.resource_type, spec.name, spec.region),
            provider: spec.provider.clone(),
            resource_spec: spec.clone(),
            action: StepAction::Create,
            dependencies: Vec::new(),
            estimated_duration_seconds: duration,
            idempotency_key: format!("{}:{}", spec.resource_identifier(), id),
            retry_count: 0,
            max_retries: ExecutionStep::DEFAULT_MAX_RETRIES,
        });
    }

    // Dependency resolution: translate each resource's declared dependency
    // identifiers into step ids. A missing referent is silently skipped here
    // (validate_plan flags it).
    for step in &mut steps {
        for dep_identifier in &step.resource_spec.dependencies {
            if let Some(&dep_step_id) = id_by_identifier.get(dep_identifier) {
                if dep_step_id != step.id && !step.dependencies.contains(&dep_step_id) {
                    step.dependencies.push(dep_step_id);
                }
            }
        }
    }

    // Intent-level default-step synthesis already wires network->compute
    // dependencies directly (see `synthesize_default_resources`); nothing
    // further to resolve for the synthesized case beyond the loop above,
    // since the synthesized specs also carry `dependencies` identifiers.

    let estimated_total_duration_seconds: i64 = steps.iter().map(|s| s.estimated_duration_seconds).sum();
    let risk_assessment = assess_risk(intent, steps.len());

    ExecutionPlan {
        id: Uuid::new_v4(),
        steps,
        estimated_total_duration_seconds,
        risk_assessment,
        reasoning,
    }
}

fn synthesize_default_resources(intent: &DeploymentIntent) -> Vec<ResourceSpec> {
    let region = intent
        .target_regions
        .first()
        .cloned()
        .unwrap_or_else(|| "us-east-1".to_owned());

    let mut specs = Vec::with_capacity(intent.target_providers.len() * 2);
    for provider in &intent.target_providers {
        let network = ResourceSpec {
            resource_type: ResourceType::Network,
            provider: provider.clone(),
            region: region.clone(),
            name: "default-network".to_owned(),
            properties: Default::default(),
            tags: Default::default(),
            dependencies: Vec::new(),
        };
        let network_identifier = network.resource_identifier();
        let compute = ResourceSpec {
            resource_type: ResourceType::Compute,
            provider: provider.clone(),
            region: region.clone(),
            name: "default-compute".to_owned(),
            properties: Default::default(),
            tags: Default::default(),
            dependencies: vec![network_identifier],
        };
        specs.push(network);
        specs.push(compute);
    }
    specs
}

fn assess_risk(intent: &DeploymentIntent, step_count: usize) -> RiskLevel {
    use crate::domain::Environment;
    if matches!(intent.environment, Environment::Production) {
        RiskLevel::High
    } else if intent.target_providers.len() >= 2 {
        RiskLevel::Medium
    } else if step_count > 10 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Partitions a plan's steps into waves such that every step's dependencies
/// lie in strictly earlier waves. Guarantees termination even in the
/// presence of a cycle or a dangling reference by admitting the next
/// remaining step when nothing is otherwise eligible — surfacing the bug as
/// an ordering violation rather than looping forever.
pub fn wave_partition(plan: &ExecutionPlan) -> Vec<Wave> {
    let mut remaining: Vec<ExecutionStep> = plan.steps.clone();
    let mut completed: HashSet<Uuid> = HashSet::new();
    let mut waves: Vec<Wave> = Vec::new();

    while !remaining.is_empty() {
        let (eligible, mut rest): (Vec<ExecutionStep>, Vec<ExecutionStep>) = remaining
            .into_iter()
            .partition(|s| s.dependencies.iter().all(|d| completed.contains(d)));

        let wave = if eligible.is_empty() {
            // No step is eligible: cycle or broken reference. Take the next
            // remaining step anyway so the algorithm terminates.
            vec![rest.remove(0)]
        } else {
            eligible
        };

        for step in &wave {
            completed.insert(step.id);
        }
        waves.push(wave);
        remaining = rest;
    }

    waves
}

/// One error per step dependency that doesn't resolve to another step in the
/// same plan, plus one error when the plan has no steps.
pub fn validate_plan(plan: &ExecutionPlan) -> (bool, Vec<String>) {
    let mut errors = Vec::new();
    if plan.steps.is_empty() {
        errors.push("plan has no steps".to_owned());
    }

    let ids: HashSet<Uuid> = plan.steps.iter().map(|s| s.id).collect();
    for step in &plan.steps {
        for dep in &step.dependencies {
            if !ids.contains(dep) {
                errors.push(format!(
                    "step {} ({}) depends on unknown step {}",
                    step.id, step.name, dep
                ));
            }
        }
    }

    (errors.is_empty(), errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeploymentStrategy, Environment};
    use std::collections::HashMap;

    fn base_intent() -> DeploymentIntent {
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

    #[test]
    fn synthesizes_default_network_and_compute_when_no_resources() {
        let intent = base_intent();
        let plan = generate_plan(&intent);
        assert_eq!(plan.steps.len(), 2);
        let network = plan
            .steps
            .iter()
            .find(|s| matches!(s.resource_spec.resource_type, ResourceType::Network))
            .unwrap();
        let compute = plan
            .steps
            .iter()
            .find(|s| matches!(s.resource_spec.resource_type, ResourceType::Compute))
            .unwrap();
        assert_eq!(compute.dependencies, vec![network.id]);
    }

    #[test]
    fn single_resource_happy_path_matches_s1() {
        let mut intent = base_intent();
        intent.resources.push(ResourceSpec {
            resource_type: ResourceType::Compute,
            provider: "aws".to_owned(),
            region: "us-east-1".to_owned(),
            name: "web".to_owned(),
            properties: HashMap::new(),
            tags: HashMap::new(),
            dependencies: Vec::new(),
        });
        let plan = generate_plan(&intent);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].name, "deploy-web");
        assert_eq!(plan.steps[0].action, StepAction::Create);
        assert_eq!(plan.risk_assessment, RiskLevel::Low);
    }

    #[test]
    fn dependency_ordering_matches_s3() {
        let mut intent = base_intent();
        let vpc = ResourceSpec {
            resource_type: ResourceType::Network,
            provider: "aws".to_owned(),
            region: "us-east-1".to_owned(),
            name: "vpc".to_owned(),
            properties: HashMap::new(),
            tags: HashMap::new(),
            dependencies: Vec::new(),
        };
        let vpc_identifier = vpc.resource_identifier();
        let app = ResourceSpec {
            resource_type: ResourceType::Compute,
            provider: "aws".to_owned(),
            region: "us-east-1".to_owned(),
            name: "app".to_owned(),
            properties: HashMap::new(),
            tags: HashMap::new(),
            dependencies: vec![vpc_identifier],
        };
        intent.resources.push(app);
        intent.resources.push(vpc);

        let plan = generate_plan(&intent);
        assert_eq!(plan.steps.len(), 2);
        let vpc_step = plan.steps.iter().find(|s| s.name == "deploy-vpc").unwrap();
        let app_step = plan.steps.iter().find(|s| s.name == "deploy-app").unwrap();
        assert_eq!(app_step.dependencies, vec![vpc_step.id]);

        let waves = wave_partition(&plan);
        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0][0].id, vpc_step.id);
        assert_eq!(waves[1][0].id, app_step.id);
    }

    #[test]
    fn production_is_always_high_risk() {
        let mut intent = base_intent();
        intent.environment = Environment::Production;
        let plan = generate_plan(&intent);
        assert_eq!(plan.risk_assessment, RiskLevel::High);
    }

    #[test]
    fn multi_provider_is_medium_risk() {
        let mut intent = base_intent();
        intent.target_providers.push("gcp".to_owned());
        let plan = generate_plan(&intent);
        assert_eq!(plan.risk_assessment, RiskLevel::Medium);
    }

    #[test]
    fn wave_partition_covers_every_step_exactly_once() {
        let mut intent = base_intent();
        intent.target_providers.push("gcp".to_owned());
        let plan = generate_plan(&intent);
        let waves = wave_partition(&plan);
        let total: usize = waves.iter().map(|w| w.len()).sum();
        assert_eq!(total, plan.steps.len());
    }

    #[test]
    fn validate_plan_flags_unknown_dependency() {
        let mut plan = generate_plan(&base_intent());
        plan.steps[1].dependencies.push(Uuid::new_v4());
        let (ok, errors) = validate_plan(&plan);
        assert!(!ok);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn validate_plan_flags_empty_plan() {
        let plan = ExecutionPlan {
            id: Uuid::new_v4(),
            steps: Vec::new(),
            estimated_total_duration_seconds: 0,
            risk_assessment: RiskLevel::Low,
            reasoning: String::new(),
        };
        let (ok, errors) = validate_plan(&plan);
        assert!(!ok);
        assert_eq!(errors, vec!["plan has no steps".to_owned()]);
    }
}
