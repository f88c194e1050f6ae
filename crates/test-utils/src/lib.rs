//! Shared helpers for runctl's unit and integration tests.
//!
//! - [`fake_launcher`]: process launchers that never spawn anything.
//! - [`builders`]: configs, run requests and a test-wired `Orchestrator`.

pub mod builders;
pub mod fake_launcher;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Upper bound for anything a test awaits on a run: launches, exits, stops.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Route runctl's tracing output into the test harness.
///
/// The filter comes from `RUNCTL_LOG`, the same variable the binary reads,
/// then `RUST_LOG`, then `runctl=info`. Output is only shown for failing
/// tests unless `--nocapture` is passed, e.g.
/// `RUNCTL_LOG=runctl::engine=debug cargo test --test stop_behaviour`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(runctl::logging::LOG_ENV_VAR)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("runctl=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Await `f`, failing the test if it takes longer than [`TEST_TIMEOUT`].
///
/// Runs that never leave `Running` or phases that are never launched show
/// up as this panic instead of a hung test binary.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(TEST_TIMEOUT, f)
        .await
        .unwrap_or_else(|_| panic!("run did not settle within {TEST_TIMEOUT:?}"))
}
