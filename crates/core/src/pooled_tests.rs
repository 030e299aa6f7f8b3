use super::*;
use crate::clock::FakeClock;
use crate::fake::FakeExecutor;
use std::time::Duration;
use tempfile::TempDir;
use yare::parameterized;

fn fast_timings() -> ProtocolTimings {
    ProtocolTimings {
        exit_poll: Duration::from_millis(5),
        exit_settle: Duration::from_millis(1),
        ..ProtocolTimings::default()
    }
}

fn make_pe(
    clock: &FakeClock,
    root: &TempDir,
    pool_config: PoolConfig,
) -> (Arc<PooledExecutor>, FakeExecutor) {
    let backend = FakeExecutor::running("backend-1");
    let wrapper = WrapperDir::new(root.path(), "12345");
    wrapper.create().unwrap();
    let command = Command::new(
        "12345",
        pool_config.name.clone(),
        "wrapper script",
        CommandConfig::new(pool_config.name.clone()),
        clock,
    );
    let pe = PooledExecutor::new(
        "12345",
        Box::new(backend.clone()),
        pool_config,
        command,
        wrapper,
        fast_timings(),
        Arc::new(clock.clone()),
    );
    pe.mark_idle();
    (pe, backend)
}

fn pipeline_command(id: &str, clock: &FakeClock) -> Command {
    Command::new(id, "align", "echo aligned", CommandConfig::new("bwa"), clock)
}

#[parameterized(
    no_budgets = { None, None, 0, true },
    pool_budget_only = { Some(60), None, 55, true },
    command_budget_only = { None, Some(10), 55, true },
    plenty_remaining = { Some(60), Some(10), 30, true },
    exact_fit = { Some(60), Some(10), 50, true },
    too_little_remaining = { Some(60), Some(10), 55, false },
)]
fn can_accept_weighs_walltime_budgets(
    pool_secs: Option<u64>,
    command_secs: Option<u64>,
    elapsed_secs: u64,
    expected: bool,
) {
    let clock = FakeClock::new();
    let root = TempDir::new().unwrap();

    let mut pool_config = PoolConfig::new("small");
    if let Some(secs) = pool_secs {
        pool_config = pool_config.with_walltime(Duration::from_secs(secs));
    }
    let (pe, _backend) = make_pe(&clock, &root, pool_config);

    clock.advance(Duration::from_secs(elapsed_secs));

    let mut config = CommandConfig::new("bwa");
    if let Some(secs) = command_secs {
        config = config.with_walltime(Duration::from_secs(secs));
    }

    assert_eq!(pe.can_accept(&config), expected);
}

#[tokio::test]
async fn execute_adopts_and_publishes_the_script() {
    let clock = FakeClock::new();
    let root = TempDir::new().unwrap();
    let (pe, backend) = make_pe(&clock, &root, PoolConfig::new("small"));

    let mut command = pipeline_command("c1", &clock);
    pe.execute(&mut command, Box::new(std::io::sink()))
        .await
        .unwrap();

    assert_eq!(command.host.as_deref(), Some("12345"));
    assert_eq!(pe.current_command_id().as_deref(), Some("c1"));
    assert_eq!(pe.state(), PooledState::Running);
    assert!(pe.output_log().is_wired());

    let script = pe.wrapper().script_path("c1");
    assert_eq!(std::fs::read_to_string(script).unwrap(), "echo aligned");

    // Job renamed after the adopted command for operator visibility
    assert_eq!(backend.job_name().as_deref(), Some("align"));
}

#[tokio::test]
async fn execute_refuses_an_occupied_reservation() {
    let clock = FakeClock::new();
    let root = TempDir::new().unwrap();
    let (pe, _backend) = make_pe(&clock, &root, PoolConfig::new("small"));

    let mut first = pipeline_command("c1", &clock);
    pe.execute(&mut first, Box::new(std::io::sink()))
        .await
        .unwrap();

    let mut second = pipeline_command("c2", &clock);
    let result = pe.execute(&mut second, Box::new(std::io::sink())).await;

    assert!(matches!(result, Err(ExecutorError::Occupied { .. })));
    assert!(second.host.is_none());
}

#[tokio::test]
async fn wait_for_returns_the_wrapper_exit_code() {
    let clock = FakeClock::new();
    let root = TempDir::new().unwrap();
    let (pe, backend) = make_pe(&clock, &root, PoolConfig::new("small"));

    let mut command = pipeline_command("c1", &clock);
    pe.execute(&mut command, Box::new(std::io::sink()))
        .await
        .unwrap();

    std::fs::write(pe.wrapper().exit_path("c1"), "7\n").unwrap();

    assert_eq!(pe.wait_for().await.unwrap(), 7);
    assert_eq!(pe.state(), PooledState::Idle);
    assert!(pe.current_command_id().is_none());
    assert!(!pe.output_log().is_wired());
    // Job name restored to the pool after the command finished
    assert_eq!(backend.job_name().as_deref(), Some("small"));
}

#[tokio::test]
async fn wait_for_surfaces_malformed_exit_as_failure() {
    let clock = FakeClock::new();
    let root = TempDir::new().unwrap();
    let (pe, _backend) = make_pe(&clock, &root, PoolConfig::new("small"));

    let mut command = pipeline_command("c1", &clock);
    pe.execute(&mut command, Box::new(std::io::sink()))
        .await
        .unwrap();

    std::fs::write(pe.wrapper().exit_path("c1"), "not a number\n").unwrap();

    assert_eq!(pe.wait_for().await.unwrap(), MALFORMED_EXIT_CODE);
    // The wrapper itself finished the command, so the reservation is idle again
    assert_eq!(pe.state(), PooledState::Idle);
}

#[tokio::test]
async fn wait_for_without_adoption_is_an_error() {
    let clock = FakeClock::new();
    let root = TempDir::new().unwrap();
    let (pe, _backend) = make_pe(&clock, &root, PoolConfig::new("small"));

    assert!(matches!(
        pe.wait_for().await,
        Err(ExecutorError::NoAdoptedCommand { .. })
    ));
}

struct RecordingPool {
    released: Mutex<Vec<String>>,
}

impl RecordingPool {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            released: Mutex::new(Vec::new()),
        })
    }

    fn released(&self) -> Vec<String> {
        self.released.lock().unwrap().clone()
    }
}

impl PoolMembership for RecordingPool {
    fn release(&self, member: Arc<PooledExecutor>) {
        self.released
            .lock()
            .unwrap()
            .push(member.host_command_id().to_string());
    }
}

#[tokio::test]
async fn wait_for_hands_the_reservation_back_to_its_pool() {
    let clock = FakeClock::new();
    let root = TempDir::new().unwrap();
    let (pe, _backend) = make_pe(&clock, &root, PoolConfig::new("small"));

    let pool = RecordingPool::new();
    let membership: Weak<dyn PoolMembership> = Arc::downgrade(&(Arc::clone(&pool) as Arc<dyn PoolMembership>));
    pe.bind_membership(membership);

    let mut command = pipeline_command("c1", &clock);
    pe.execute(&mut command, Box::new(std::io::sink()))
        .await
        .unwrap();
    std::fs::write(pe.wrapper().exit_path("c1"), "0\n").unwrap();
    pe.wait_for().await.unwrap();

    assert_eq!(pool.released(), vec!["12345".to_string()]);
}

#[tokio::test]
async fn stop_is_idempotent_on_filesystem_state() {
    let clock = FakeClock::new();
    clock.set_millis(99_000);
    let root = TempDir::new().unwrap();
    let (pe, backend) = make_pe(&clock, &root, PoolConfig::new("small"));
    pe.touch_heartbeat().unwrap();

    pe.stop().await.unwrap();

    assert!(pe.wrapper().stop_exists());
    assert!(!pe.heartbeat_exists());
    assert_eq!(pe.state(), PooledState::Terminated);
    assert!(pe.is_stopped());

    pe.stop().await.unwrap();

    assert!(pe.wrapper().stop_exists());
    assert!(!pe.heartbeat_exists());
    assert_eq!(pe.state(), PooledState::Terminated);
    assert_eq!(
        std::fs::read_to_string(pe.wrapper().stop_path()).unwrap(),
        "99000\n"
    );
    // Backend stop requested both times; backends must tolerate that
    assert_eq!(
        backend
            .calls()
            .iter()
            .filter(|c| matches!(c, crate::fake::ExecutorCall::Stop))
            .count(),
        2
    );
}

#[tokio::test]
async fn stopped_during_run_stays_terminated_after_wait() {
    let clock = FakeClock::new();
    let root = TempDir::new().unwrap();
    let (pe, _backend) = make_pe(&clock, &root, PoolConfig::new("small"));

    let pool = RecordingPool::new();
    let membership: Weak<dyn PoolMembership> = Arc::downgrade(&(Arc::clone(&pool) as Arc<dyn PoolMembership>));
    pe.bind_membership(membership);

    let mut command = pipeline_command("c1", &clock);
    pe.execute(&mut command, Box::new(std::io::sink()))
        .await
        .unwrap();

    pe.stop().await.unwrap();
    std::fs::write(pe.wrapper().exit_path("c1"), "0\n").unwrap();
    pe.wait_for().await.unwrap();

    // The callback still fired, but the reservation stayed terminated;
    // refusing re-admission is the pool's job
    assert_eq!(pe.state(), PooledState::Terminated);
    assert_eq!(pool.released(), vec!["12345".to_string()]);
}
