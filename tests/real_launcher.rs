// tests/real_launcher.rs
#![cfg(unix)]

use std::error::Error;
use std::sync::Arc;

use runctl_test_utils::builders::{ConfigFileBuilder, RunRequestBuilder};
use runctl_test_utils::{init_tracing, with_timeout};

use runctl::config::ConfigFile;
use runctl::engine::Orchestrator;
use runctl::exec::RealProcessLauncher;
use runctl::fs::RealFileSystem;
use runctl::types::{RunKey, StatusReport};

type TestResult = Result<(), Box<dyn Error>>;

/// `sh -c <script> migrate <run flags…>`: the run flags land in `$@`.
fn sh_config(root: &std::path::Path, script: &str) -> ConfigFile {
    ConfigFileBuilder::new(root)
        .program("/bin/sh")
        .prefix_arg("-c")
        .prefix_arg(script)
        .prefix_arg("migrate")
        .build()
}

fn orchestrator(config: ConfigFile) -> Orchestrator {
    Orchestrator::new(
        config,
        Arc::new(RealFileSystem),
        Arc::new(RealProcessLauncher::new()),
    )
    .with_ambient_env(std::env::vars().collect())
}

#[tokio::test]
async fn dry_then_wet_with_a_real_process() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let orch = orchestrator(sh_config(
        root.path(),
        r#"echo "args: $*"; echo "pw=$DEV_PASSWORD""#,
    ));

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").wet().limit(3).secret("hunter2").build())
        .await?;
    let key = RunKey::new("p1", "DEV", run_id.clone())?;
    assert_eq!(with_timeout(orch.wait_for_terminal(&key)).await, StatusReport::Completed);

    let dry = orch.read_artifact(&key, "dry-output.log")?;
    assert!(
        dry.contains(&format!(
            "args: --env DEV --project p1 --job j1 --dry-run true --limit 3 --threads 4 --run-id {run_id} --yes"
        )),
        "{dry}"
    );
    assert!(dry.contains("pw=hunter2"), "{dry}");

    let wet = orch.read_artifact(&key, "wet-output.log")?;
    assert!(wet.contains("--dry-run false"), "{wet}");
    Ok(())
}

#[tokio::test]
async fn failing_dry_phase_leaves_only_the_dry_log() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let orch = orchestrator(sh_config(root.path(), "echo checking; exit 2"));

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").wet().build())
        .await?;
    let key = RunKey::new("p1", "DEV", run_id)?;
    assert_eq!(with_timeout(orch.wait_for_terminal(&key)).await, StatusReport::Error);

    let files = orch.list_artifact_files(&key)?;
    assert!(files.contains(&"dry-output.log".to_string()));
    assert!(!files.contains(&"wet-output.log".to_string()));

    let dry = orch.read_artifact(&key, "dry-output.log")?;
    assert!(dry.contains("checking"), "{dry}");
    assert!(dry.contains("exited with code 2"), "{dry}");
    Ok(())
}

#[tokio::test]
async fn stop_terminates_a_hung_phase() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let orch = orchestrator(sh_config(root.path(), "echo started; exec sleep 30"));

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").build())
        .await?;
    let key = RunKey::new("p1", "DEV", run_id)?;

    with_timeout(async {
        while !orch.tracker().has_process(&key) {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await;

    orch.stop(&key)?;
    assert_eq!(orch.status(&key), StatusReport::Error);

    // The log gets its closing note once the process is gone.
    with_timeout(async {
        loop {
            let log = orch.read_artifact(&key, "dry-output.log").unwrap_or_default();
            if log.contains("terminated by signal") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    })
    .await;
    assert_eq!(orch.status(&key), StatusReport::Error);
    Ok(())
}

#[tokio::test]
async fn missing_program_ends_in_error_with_a_note() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let config = ConfigFileBuilder::new(root.path())
        .program("/definitely/not/here/migrate")
        .build();
    let orch = orchestrator(config);

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").wet().build())
        .await?;
    let key = RunKey::new("p1", "DEV", run_id)?;
    assert_eq!(with_timeout(orch.wait_for_terminal(&key)).await, StatusReport::Error);

    let dry = orch.read_artifact(&key, "dry-output.log")?;
    assert!(dry.contains("failed to launch"), "{dry}");
    Ok(())
}

#[tokio::test]
async fn log_with_invalid_utf8_is_still_readable() -> TestResult {
    init_tracing();
    let root = tempfile::tempdir()?;
    let orch = orchestrator(sh_config(root.path(), r"printf 'row \377\376 done\n'"));

    let run_id = orch
        .submit(RunRequestBuilder::new("p1", "DEV", "j1").build())
        .await?;
    let key = RunKey::new("p1", "DEV", run_id)?;
    assert_eq!(with_timeout(orch.wait_for_terminal(&key)).await, StatusReport::Completed);

    let dry = orch.read_artifact(&key, "dry-output.log")?;
    assert_eq!(dry, "row \u{FFFD}\u{FFFD} done\n");
    Ok(())
}
