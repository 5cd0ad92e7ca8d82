use std::sync::Arc;

use orch_core::domain::{StepAction, Task};
use orch_core::infra::PostgresTaskRepository;
use orch_core::ports::TaskRepository;
use orch_test_utils::{create_test_db, drop_test_db};
use uuid::Uuid;

fn new_task(deployment_id: Uuid) -> Task {
    Task::new(
        deployment_id,
        Uuid::new_v4(),
        "deploy-web".to_owned(),
        "aws".to_owned(),
        StepAction::Create,
        format!("key-{}", Uuid::new_v4()),
        3,
        60,
        serde_json::Value::Null,
    )
}

/// Testable property 6: with exactly one QUEUED task and many concurrent
/// callers of `acquire_next`, exactly one caller receives it.
#[tokio::test]
async fn acquire_next_hands_out_exactly_one_task_under_concurrency() {
    let (pool, db_name) = create_test_db().await;
    let repo = Arc::new(PostgresTaskRepository::new(pool));

    let deployment_id = Uuid::new_v4();
    let mut task = new_task(deployment_id);
    task.enqueue().unwrap();
    repo.save(&task).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move { repo.acquire_next(&format!("worker-{i}")).await }));
    }

    let mut claims = 0;
    for handle in handles {
        if let Ok(Some(_)) = handle.await.unwrap() {
            claims += 1;
        }
    }
    assert_eq!(claims, 1);

    drop_test_db(&db_name).await;
}

/// Testable property 8: a deployment round-trips through the repository.
#[tokio::test]
async fn task_round_trips_through_repository() {
    let (pool, db_name) = create_test_db().await;
    let repo = PostgresTaskRepository::new(pool);

    let mut task = new_task(Uuid::new_v4());
    task.enqueue().unwrap();
    repo.save(&task).await.unwrap();

    let fetched = repo.get(task.id).await.unwrap().unwrap();
    assert_eq!(fetched.id, task.id);
    assert_eq!(fetched.status, task.status);
    assert_eq!(fetched.idempotency_key, task.idempotency_key);

    drop_test_db(&db_name).await;
}

/// `reset_orphaned` moves crashed-worker tasks back to `failed` so the
/// retry/escalate path can pick them up.
#[tokio::test]
async fn reset_orphaned_recovers_stuck_tasks() {
    let (pool, db_name) = create_test_db().await;
    let repo = PostgresTaskRepository::new(pool);

    let deployment_id = Uuid::new_v4();
    let mut task = new_task(deployment_id);
    task.enqueue().unwrap();
    task.acquire("dead-worker").unwrap();
    repo.save(&task).await.unwrap();

    let reset = repo.reset_orphaned(deployment_id).await.unwrap();
    assert_eq!(reset.len(), 1);
    assert_eq!(reset[0].status, orch_core::domain::TaskStatus::Failed);

    drop_test_db(&db_name).await;
}
