// tests/stop_behaviour.rs

use std::error::Error;
use std::time::Duration;

use runctl_test_utils::builders::{ConfigFileBuilder, RunRequestBuilder, orchestrator};
use runctl_test_utils::fake_launcher::ControllableLauncher;
use runctl_test_utils::{init_tracing, with_timeout};

use runctl::errors::RunctlError;
use runctl::types::{Phase, PhasePlan, RunId, RunKey, RunStatus, StatusReport};

type TestResult = Result<(), Box<dyn Error>>;

fn key(run_id: &RunId) -> RunKey {
    RunKey::new("p1", "DEV", run_id.clone()).unwrap()
}

#[tokio::test]
async fn stopping_an_unknown_run_is_a_noop() -> TestResult {
    let root = tempfile::tempdir()?;
    let orch = orchestrator(
        ConfigFileBuilder::new(root.path()).build(),
        ControllableLauncher::new(),
    );

    let k = key(&RunId::parse("R-none")?);
    orch.stop(&k)?;
    assert!(orch.tracker().is_empty());
    assert_eq!(orch.status(&k), StatusReport::Unknown);
    Ok(())
}

#[tokio::test]
async fn stop_flips_to_error_before_the_process_exits() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let launcher = ControllableLauncher::ignoring_terminate();
    let orch = orchestrator(ConfigFileBuilder::new(root.path()).build(), launcher.clone());

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").wet().build())
        .await?;
    let k = key(&run_id);
    with_timeout(launcher.wait_for_launch(Phase::Dry)).await;
    assert_eq!(orch.status(&k), StatusReport::Running);

    orch.stop(&k)?;
    assert_eq!(orch.status(&k), StatusReport::Error);
    assert_eq!(launcher.terminate_requests_eventually(1).await, 1);

    // The process ignores the signal and later exits cleanly on its own.
    assert!(launcher.finish(Phase::Dry, 0));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(orch.status(&k), StatusReport::Error);
    assert_eq!(orch.tracker().get(&k), Some(RunStatus::Error));
    assert_eq!(launcher.launched_phases(), vec![Phase::Dry]);
    Ok(())
}

#[tokio::test]
async fn stop_during_dry_phase_prevents_wet() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let launcher = ControllableLauncher::new();
    let orch = orchestrator(ConfigFileBuilder::new(root.path()).build(), launcher.clone());

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").wet().build())
        .await?;
    let k = key(&run_id);
    with_timeout(launcher.wait_for_launch(Phase::Dry)).await;

    orch.stop(&k)?;
    assert_eq!(with_timeout(orch.wait_for_terminal(&k)).await, StatusReport::Error);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(launcher.launched_phases(), vec![Phase::Dry]);
    assert!(!orch.tracker().has_process(&k));
    Ok(())
}

#[tokio::test]
async fn second_stop_and_stop_after_completion_change_nothing() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let launcher = ControllableLauncher::new();
    let orch = orchestrator(ConfigFileBuilder::new(root.path()).build(), launcher.clone());

    let done = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").build())
        .await?;
    with_timeout(launcher.wait_for_launch(Phase::Dry)).await;
    assert!(launcher.finish(Phase::Dry, 0));
    assert_eq!(
        with_timeout(orch.wait_for_terminal(&key(&done))).await,
        StatusReport::Completed
    );

    orch.stop(&key(&done))?;
    orch.stop(&key(&done))?;
    assert_eq!(orch.status(&key(&done)), StatusReport::Completed);
    assert_eq!(launcher.terminate_requests(), 0);
    Ok(())
}

#[tokio::test]
async fn resuming_a_running_run_is_rejected() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let launcher = ControllableLauncher::new();
    let orch = orchestrator(ConfigFileBuilder::new(root.path()).build(), launcher.clone());

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").build())
        .await?;
    with_timeout(launcher.wait_for_launch(Phase::Dry)).await;
    let before = orch.layout().read_options_snapshot(&key(&run_id))?;

    let err = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").resume(&run_id).build())
        .await
        .unwrap_err();
    assert!(matches!(err, RunctlError::InvalidRequest(_)), "{err:?}");

    // The rejected resume must not have rewritten the live run's snapshot.
    assert_eq!(orch.layout().read_options_snapshot(&key(&run_id))?, before);
    assert_eq!(before.plan, PhasePlan::DryOnly);

    assert!(launcher.finish(Phase::Dry, 0));
    assert_eq!(
        with_timeout(orch.wait_for_terminal(&key(&run_id))).await,
        StatusReport::Completed
    );
    Ok(())
}

#[tokio::test]
async fn delete_of_a_running_run_stops_it_and_removes_its_directory() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let launcher = ControllableLauncher::new();
    let orch = orchestrator(ConfigFileBuilder::new(root.path()).build(), launcher.clone());

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").build())
        .await?;
    let k = key(&run_id);
    with_timeout(launcher.wait_for_launch(Phase::Dry)).await;

    orch.delete_run(&k)?;
    assert_eq!(launcher.terminate_requests_eventually(1).await, 1);
    assert!(!root.path().join("p1").join("DEV").exists());
    assert_eq!(orch.status(&k), StatusReport::Unknown);
    Ok(())
}

#[tokio::test]
async fn live_output_reaches_subscribers() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let launcher = ControllableLauncher::new();
    let orch = orchestrator(ConfigFileBuilder::new(root.path()).build(), launcher.clone());

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").build())
        .await?;
    let k = key(&run_id);
    with_timeout(launcher.wait_for_launch(Phase::Dry)).await;

    let mut rx = with_timeout(async {
        loop {
            if let Some(rx) = orch.subscribe_output(&k) {
                break rx;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    assert!(launcher.emit(Phase::Dry, b"row 1\n"));
    assert_eq!(with_timeout(rx.recv()).await?, b"row 1\n".to_vec());

    assert!(launcher.finish(Phase::Dry, 0));
    assert_eq!(with_timeout(orch.wait_for_terminal(&k)).await, StatusReport::Completed);
    Ok(())
}
