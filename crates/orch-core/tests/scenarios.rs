mod common;

use std::sync::Arc;

use orch_core::domain::{DeploymentStatus, ResourceSpec, ResourceType};
use orch_core::infra::{InMemoryDeploymentRepository, InMemoryDriftReportRepository, InMemoryLock, InMemoryTaskRepository};
use orch_core::ports::{DriftReportRepository, LoggingEventSink, TaskRepository};
use orch_core::service::{DeploymentService, DriftService};

fn new_service() -> (
    DeploymentService,
    Arc<InMemoryDeploymentRepository>,
    Arc<InMemoryTaskRepository>,
) {
    let deployments = Arc::new(InMemoryDeploymentRepository::new());
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let lock = Arc::new(InMemoryLock::new());
    let events = Arc::new(LoggingEventSink);
    let service = DeploymentService::new(deployments.clone(), tasks.clone(), lock, events);
    (service, deployments, tasks)
}

/// S1: happy path with one resource.
#[tokio::test]
async fn s1_happy_path_single_resource() {
    let (service, _deployments, tasks) = new_service();
    let mut intent = common::base_intent();
    intent.resources.push(ResourceSpec {
        resource_type: ResourceType::Compute,
        provider: "aws".to_owned(),
        region: "us-east-1".to_owned(),
        name: "web".to_owned(),
        properties: Default::default(),
        tags: Default::default(),
        dependencies: Vec::new(),
    });

    let deployment = service
        .create_deployment(intent, "web deployment", "alice", "tenant-a")
        .await
        .unwrap();
    let deployment = service.plan_deployment(deployment.id).await.unwrap();
    assert_eq!(deployment.plan.as_ref().unwrap().steps.len(), 1);
    assert_eq!(deployment.plan.as_ref().unwrap().steps[0].name, "deploy-web");
    assert_eq!(deployment.status, DeploymentStatus::AwaitingApproval);

    let deployment = service.approve_deployment(deployment.id, "alice").await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Approved);

    let created_tasks = service.execute_deployment(deployment.id).await.unwrap();
    assert_eq!(created_tasks.len(), 1);
    assert_eq!(created_tasks[0].status, orch_core::domain::TaskStatus::Queued);

    let claimed = tasks.acquire_next("worker-1").await.unwrap().unwrap();
    let deployment = service
        .handle_task_completion(claimed.id, true, Some(serde_json::json!({"ok": true})), None)
        .await
        .unwrap();

    assert_eq!(deployment.status, DeploymentStatus::Verifying);
    assert_eq!(deployment.step_results.len(), 1);
}

/// S2: auto-approve skips AWAITING_APPROVAL.
#[tokio::test]
async fn s2_auto_approve() {
    let (service, _deployments, _tasks) = new_service();
    let mut intent = common::base_intent();
    intent.auto_approve = true;

    let deployment = service
        .create_deployment(intent, "auto deployment", "alice", "tenant-a")
        .await
        .unwrap();
    let deployment = service.plan_deployment(deployment.id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Approved);
}

/// S3: dependency ordering produces two waves.
#[tokio::test]
async fn s3_dependency_ordering() {
    let (service, _deployments, _tasks) = new_service();
    let mut intent = common::base_intent();
    let vpc = ResourceSpec {
        resource_type: ResourceType::Network,
        provider: "aws".to_owned(),
        region: "us-east-1".to_owned(),
        name: "vpc".to_owned(),
        properties: Default::default(),
        tags: Default::default(),
        dependencies: Vec::new(),
    };
    let app = ResourceSpec {
        resource_type: ResourceType::Compute,
        provider: "aws".to_owned(),
        region: "us-east-1".to_owned(),
        name: "app".to_owned(),
        properties: Default::default(),
        tags: Default::default(),
        dependencies: vec![vpc.resource_identifier()],
    };
    intent.resources.push(app);
    intent.resources.push(vpc);

    let deployment = service
        .create_deployment(intent, "dep ordering", "alice", "tenant-a")
        .await
        .unwrap();
    let deployment = service.plan_deployment(deployment.id).await.unwrap();
    let plan = deployment.plan.as_ref().unwrap();
    let waves = orch_core::planner::wave_partition(plan);
    assert_eq!(waves.len(), 2);
}

/// S4: production is always high risk.
#[tokio::test]
async fn s4_production_is_high_risk() {
    let (service, _deployments, _tasks) = new_service();
    let mut intent = common::base_intent();
    intent.environment = orch_core::domain::Environment::Production;

    let deployment = service
        .create_deployment(intent, "prod deployment", "alice", "tenant-a")
        .await
        .unwrap();
    let deployment = service.plan_deployment(deployment.id).await.unwrap();
    assert_eq!(
        deployment.plan.as_ref().unwrap().risk_assessment,
        orch_core::domain::RiskLevel::High
    );
}

/// S5: failure with rollback_on_failure transitions to FAILED, then
/// rollback_deployment succeeds.
#[tokio::test]
async fn s5_failure_and_rollback() {
    let (service, _deployments, tasks) = new_service();
    let mut intent = common::base_intent();
    intent.rollback_on_failure = true;
    intent.resources.push(ResourceSpec {
        resource_type: ResourceType::Compute,
        provider: "aws".to_owned(),
        region: "us-east-1".to_owned(),
        name: "web".to_owned(),
        properties: Default::default(),
        tags: Default::default(),
        dependencies: Vec::new(),
    });

    let deployment = service
        .create_deployment(intent, "failing deployment", "alice", "tenant-a")
        .await
        .unwrap();
    let deployment = service.plan_deployment(deployment.id).await.unwrap();
    let deployment = service.approve_deployment(deployment.id, "alice").await.unwrap();
    service.execute_deployment(deployment.id).await.unwrap();

    let claimed = tasks.acquire_next("worker-1").await.unwrap().unwrap();
    let deployment = service
        .handle_task_completion(claimed.id, false, None, Some("boom".to_owned()))
        .await
        .unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);

    let deployment = service.rollback_deployment(deployment.id).await.unwrap();
    assert_eq!(deployment.status, DeploymentStatus::RollingBack);
}

/// S6: drift detected persists a report and publishes an event.
#[tokio::test]
async fn s6_drift_detected() {
    let (service, deployments, _tasks) = new_service();
    let mut intent = common::base_intent();
    intent.resources.push(ResourceSpec {
        resource_type: ResourceType::Compute,
        provider: "aws".to_owned(),
        region: "us-east-1".to_owned(),
        name: "web".to_owned(),
        properties: Default::default(),
        tags: Default::default(),
        dependencies: Vec::new(),
    });

    let deployment = service
        .create_deployment(intent, "drift deployment", "alice", "tenant-a")
        .await
        .unwrap();
    let deployment = service.plan_deployment(deployment.id).await.unwrap();

    let reports = Arc::new(InMemoryDriftReportRepository::new());
    let detector = Arc::new(common::AlwaysDriftingDetector);
    let events = Arc::new(LoggingEventSink);
    let drift_service = DriftService::new(deployments, reports.clone(), detector, events);

    let report = drift_service.scan_deployment(deployment.id).await.unwrap();
    assert!(report.has_drift());
    assert_eq!(report.deployment_id, deployment.id);

    let latest = reports.get_latest(deployment.id).await.unwrap().unwrap();
    assert_eq!(latest.id, report.id);
}
