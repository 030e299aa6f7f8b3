use super::*;
use crate::clock::FakeClock;
use crate::executor::{CommandExecutor, ExecutorStatus};
use crate::fake::{ExecutorCall, FakeExecutorFactory};
use crate::heartbeat::HeartbeatTicker;
use crate::id::NumericIdGen;
use crate::protocol::ProtocolTimings;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    _root: TempDir,
    registry: PoolRegistry,
    factory: FakeExecutorFactory,
    clock: FakeClock,
}

fn harness() -> Harness {
    let root = TempDir::new().unwrap();
    let clock = FakeClock::new();
    let factory = FakeExecutorFactory::new();
    let deps = PoolDeps {
        factory: Arc::new(factory.clone()),
        clock: Arc::new(clock.clone()),
        ids: Arc::new(NumericIdGen::starting_at(1000)),
        timings: ProtocolTimings {
            exit_poll: Duration::from_millis(5),
            exit_settle: Duration::from_millis(1),
            ..ProtocolTimings::default()
        },
        state_root: root.path().to_path_buf(),
        ticker: HeartbeatTicker::new(Duration::from_secs(10), Arc::new(clock.clone())),
    };
    Harness {
        _root: root,
        registry: PoolRegistry::new(deps),
        factory,
        clock,
    }
}

fn pipeline_command(id: &str, config_name: &str, clock: &FakeClock) -> Command {
    Command::new(
        id,
        "stage",
        "echo stage",
        CommandConfig::new(config_name),
        clock,
    )
}

#[tokio::test]
async fn init_pools_builds_one_pool_per_section() {
    let h = harness();

    h.registry
        .init_pools(&json!({
            "small": { "jobs": 2 },
            "big": { "configs": ["bwa", "gatk"], "jobs": 1 },
        }))
        .await
        .unwrap();

    let pools = h.registry.pools();
    assert_eq!(pools.len(), 2);
    assert_eq!(h.factory.created_count(), 3);

    let small = h.registry.pool("small").unwrap();
    assert_eq!(small.idle_len(), 2);
    assert!(small.serves("small"));

    let big = h.registry.pool("big").unwrap();
    assert!(big.serves("bwa"));
    assert!(big.serves("gatk"));
    assert!(!big.serves("big"));
}

#[tokio::test]
async fn init_pools_rejects_non_object_sections() {
    let h = harness();

    assert!(matches!(
        h.registry.init_pools(&json!("nope")).await,
        Err(RegistryError::NotAnObject)
    ));
    assert!(matches!(
        h.registry.init_pools(&json!({ "bad": 5 })).await,
        Err(RegistryError::Config(ConfigError::SectionNotObject(_)))
    ));
}

#[tokio::test]
async fn request_executor_skips_pools_serving_other_configs() {
    let h = harness();
    h.registry
        .init_pools(&json!({ "small": { "configs": "bwa" } }))
        .await
        .unwrap();

    let command = pipeline_command("c1", "gatk", &h.clock);
    let dispatch = h
        .registry
        .request_executor(command, &CommandConfig::new("gatk"), Box::new(std::io::sink()))
        .await
        .unwrap();

    match dispatch {
        Dispatch::Direct(command, _log) => {
            assert_eq!(command.id, "c1");
            assert!(command.host.is_none());
        }
        Dispatch::Adopted(_) => panic!("no pool serves gatk"),
    }
    // The mismatched pool was skipped entirely, so its wrapper is still idle
    assert_eq!(h.registry.pool("small").unwrap().idle_len(), 1);
}

#[tokio::test]
async fn request_executor_prefers_registration_order() {
    let h = harness();
    h.registry
        .init_pools(&json!({
            "alpha": { "configs": "bwa" },
            "beta": { "configs": "bwa" },
        }))
        .await
        .unwrap();

    let command = pipeline_command("c1", "bwa", &h.clock);
    let adopted = h
        .registry
        .request_executor(command, &CommandConfig::new("bwa"), Box::new(std::io::sink()))
        .await
        .unwrap()
        .adopted()
        .unwrap();

    let alpha = h.registry.pool("alpha").unwrap();
    let beta = h.registry.pool("beta").unwrap();
    assert_eq!(alpha.idle_len(), 0);
    assert_eq!(beta.idle_len(), 1);
    assert!(adopted.command().host.is_some());
}

#[tokio::test]
async fn request_executor_falls_through_a_busy_pool() {
    let h = harness();
    h.registry
        .init_pools(&json!({
            "alpha": { "configs": "bwa", "jobs": 1 },
            "beta": { "configs": "bwa", "jobs": 1 },
        }))
        .await
        .unwrap();

    let first = pipeline_command("c1", "bwa", &h.clock);
    h.registry
        .request_executor(first, &CommandConfig::new("bwa"), Box::new(std::io::sink()))
        .await
        .unwrap()
        .adopted()
        .unwrap();

    // alpha is now occupied; the second command lands on beta
    let second = pipeline_command("c2", "bwa", &h.clock);
    h.registry
        .request_executor(second, &CommandConfig::new("bwa"), Box::new(std::io::sink()))
        .await
        .unwrap()
        .adopted()
        .unwrap();

    assert_eq!(h.registry.pool("alpha").unwrap().idle_len(), 0);
    assert_eq!(h.registry.pool("beta").unwrap().idle_len(), 0);
}

#[tokio::test]
async fn shutdown_all_spares_persistent_pools() {
    let h = harness();
    h.registry
        .init_pools(&json!({
            "ephemeral": {},
            "durable": { "persist": true },
        }))
        .await
        .unwrap();

    h.registry.shutdown_all().await;

    let executors = h.factory.created();
    assert_eq!(executors.len(), 2);

    let stopped: Vec<bool> = executors
        .iter()
        .map(|e| e.calls().contains(&ExecutorCall::Stop))
        .collect();
    // Exactly one wrapper was stopped: the ephemeral pool's
    assert_eq!(stopped.iter().filter(|s| **s).count(), 1);

    // The durable pool's wrapper was left running for the next controller
    let durable = executors
        .iter()
        .find(|e| !e.calls().contains(&ExecutorCall::Stop))
        .unwrap();
    assert_eq!(durable.status().await, ExecutorStatus::Running);
}
