use super::*;
use crate::clock::FakeClock;
use crate::command::CommandConfig;

fn wrapper_command(id: &str) -> Command {
    let clock = FakeClock::new();
    Command::new(id, "small", "echo wrapper", CommandConfig::new("small"), &clock)
}

#[tokio::test]
async fn fake_executor_records_lifecycle_calls() {
    let executor = FakeExecutor::new("x1");
    let config = PoolConfig::new("small");
    let command = wrapper_command("h1");

    executor
        .start(&config, &command, Path::new("/tmp/out"), Path::new("/tmp/err"))
        .await
        .unwrap();
    assert_eq!(executor.status().await, ExecutorStatus::Running);

    executor.set_job_name("small").await.unwrap();
    executor.stop().await.unwrap();
    assert_eq!(executor.status().await, ExecutorStatus::Complete);

    assert_eq!(
        executor.calls(),
        vec![
            ExecutorCall::Start {
                command_id: "h1".to_string()
            },
            ExecutorCall::SetJobName {
                name: "small".to_string()
            },
            ExecutorCall::Stop,
        ]
    );
    assert_eq!(executor.job_name().as_deref(), Some("small"));
}

#[tokio::test]
async fn fake_executor_start_failure_mode() {
    let executor = FakeExecutor::new("x1");
    executor.fail_starts();

    let result = executor
        .start(
            &PoolConfig::new("small"),
            &wrapper_command("h1"),
            Path::new("/tmp/out"),
            Path::new("/tmp/err"),
        )
        .await;

    assert!(matches!(result, Err(ExecutorError::Submit(_))));
    assert_eq!(executor.status().await, ExecutorStatus::Unknown);
}

#[tokio::test]
async fn factory_counts_creations() {
    let factory = FakeExecutorFactory::new();
    let config = PoolConfig::new("small");

    factory.create(&config).await.unwrap();
    factory.create(&config).await.unwrap();

    assert_eq!(factory.created_count(), 2);
    let ids: Vec<_> = factory.created().iter().map(|e| e.id().to_string()).collect();
    assert_eq!(ids, vec!["small-0", "small-1"]);
}

#[tokio::test]
async fn factory_reattach_uses_seeded_status() {
    let factory = FakeExecutorFactory::new();
    factory.set_reattach_status("small-0", ExecutorStatus::Complete);

    let handle = ExecutorHandle::new("fake", serde_json::json!({ "id": "small-0" }));
    let reattached = factory.reattach(&handle).await.unwrap();
    assert_eq!(reattached.status().await, ExecutorStatus::Complete);

    let unseeded = ExecutorHandle::new("fake", serde_json::json!({ "id": "small-1" }));
    let reattached = factory.reattach(&unseeded).await.unwrap();
    assert_eq!(reattached.status().await, ExecutorStatus::Running);

    assert_eq!(factory.reattached_ids(), vec!["small-0", "small-1"]);
}

#[tokio::test]
async fn factory_rejects_foreign_handles() {
    let factory = FakeExecutorFactory::new();
    let handle = ExecutorHandle::new("slurm", serde_json::json!({ "job": 9 }));

    assert!(matches!(
        factory.reattach(&handle).await,
        Err(ExecutorError::Reattach(_))
    ));
}
