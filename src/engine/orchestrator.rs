// src/engine/orchestrator.rs

//! Public run API: submit, status, stop, artifacts, delete.
//!
//! Setup work (ids, run directory, options snapshot, environment) happens
//! synchronously in [`Orchestrator::submit`] and its failures are returned
//! to the caller. Phase execution happens in a background task per run and
//! only ever surfaces through the tracker and the phase logs.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::credentials;
use crate::errors::{Result, RunctlError};
use crate::exec::{ProcessLauncher, RealProcessLauncher};
use crate::fs::{FileSystem, RealFileSystem};
use crate::runs::{OptionsSnapshot, RunIdGenerator, RunLayout};
use crate::types::{
    ensure_path_component, RunId, RunKey, RunRequest, RunStatus, StatusReport,
};

use super::sequencer::{PhaseDriver, PhaseTemplate};
use super::status::resolve_status;
use super::tracker::{CancelOutcome, RunTracker};

const TERMINAL_POLL: Duration = Duration::from_millis(50);

/// Cheap to clone; clones share the tracker and id generator.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<ConfigFile>,
    layout: RunLayout,
    tracker: RunTracker,
    launcher: Arc<dyn ProcessLauncher>,
    ids: Arc<RunIdGenerator>,
    /// Environment to start children from; `None` means our own.
    ambient: Option<Arc<HashMap<String, String>>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("runs_root", &self.layout.root())
            .field("tracked_runs", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: ConfigFile,
        fs: Arc<dyn FileSystem>,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let layout = RunLayout::new(config.orchestrator.runs_root.clone(), fs);
        Self {
            config: Arc::new(config),
            layout,
            tracker: RunTracker::new(),
            launcher,
            ids: Arc::new(RunIdGenerator::new()),
            ambient: None,
        }
    }

    /// Production wiring: real filesystem, real processes.
    pub fn from_config(config: ConfigFile) -> Self {
        Self::new(
            config,
            Arc::new(RealFileSystem),
            Arc::new(RealProcessLauncher::new()),
        )
    }

    /// Start children from `ambient` instead of this process's environment.
    pub fn with_ambient_env(mut self, ambient: HashMap<String, String>) -> Self {
        self.ambient = Some(Arc::new(ambient));
        self
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    /// Validate and set up a run, then start its first phase in the
    /// background. Returns the run id.
    pub async fn submit(&self, request: RunRequest) -> Result<RunId> {
        ensure_path_component("job", &request.job)?;

        let threads = request
            .options
            .threads
            .unwrap_or(self.config.orchestrator.default_threads);
        if threads == 0 {
            return Err(RunctlError::InvalidRequest(
                "threads must be >= 1".to_string(),
            ));
        }

        let plan = request.plan();
        let run_id = match &request.resume {
            Some(id) => id.clone(),
            None => self.ids.next(),
        };
        let key = RunKey::new(&request.project, &request.environment, run_id.clone())?;

        if request.resume.is_some() && !self.layout.run_dir_exists(&key) {
            return Err(RunctlError::NotFound(format!("run {key} to resume")));
        }
        // Claim the key before touching its directory; a failed setup
        // releases it as Error.
        let generation = self.tracker.try_begin(&key).ok_or_else(|| {
            RunctlError::InvalidRequest(format!("run {key} is already running"))
        })?;

        let snapshot = OptionsSnapshot {
            project: key.project.clone(),
            environment: key.environment.clone(),
            job: request.job.clone(),
            run_id: run_id.to_string(),
            plan,
            limit: request.options.limit,
            threads,
            dry_run: request.options.dry_run,
            program: self.config.command.program.clone(),
            submitted_at: Utc::now(),
        };
        let run_dir = match self.prepare_run_directory(&key, &snapshot) {
            Ok(dir) => dir,
            Err(e) => {
                self.tracker.finish(&key, generation, RunStatus::Error);
                return Err(e);
            }
        };

        let env = match &self.ambient {
            Some(ambient) => credentials::resolve_environment(
                &key.environment,
                request.secret.as_ref(),
                ambient.iter().map(|(k, v)| (k.clone(), v.clone())),
                &self.config.credentials,
            ),
            None => credentials::resolve_from_process(
                &key.environment,
                request.secret.as_ref(),
                &self.config.credentials,
            ),
        };

        info!(
            run = %key,
            job = %request.job,
            plan = ?plan,
            limit = ?request.options.limit,
            threads,
            "run submitted"
        );

        let template = PhaseTemplate {
            key,
            job: request.job,
            program: self.config.command.program.clone(),
            prefix_args: self.config.command.args.clone(),
            working_dir: self.config.command.working_dir.clone(),
            env,
            limit: request.options.limit,
            threads,
            run_dir,
        };
        let driver = PhaseDriver {
            template,
            plan,
            generation,
            tracker: self.tracker.clone(),
            launcher: Arc::clone(&self.launcher),
        };
        tokio::spawn(driver.run());

        Ok(run_id)
    }

    fn prepare_run_directory(&self, key: &RunKey, snapshot: &OptionsSnapshot) -> Result<PathBuf> {
        let run_dir = self.layout.ensure_run_directory(key)?;
        self.layout.write_options_snapshot(key, snapshot)?;
        Ok(run_dir)
    }

    /// Current status; see [`resolve_status`] for the restart policy.
    pub fn status(&self, key: &RunKey) -> StatusReport {
        resolve_status(self.tracker.get(key), || self.layout.run_dir_exists(key))
    }

    /// Stop a running run.
    ///
    /// The status flips to `Error` before this returns; the process is
    /// signalled but its exit is not awaited. Stopping anything that is not
    /// running is a successful no-op.
    pub fn stop(&self, key: &RunKey) -> Result<()> {
        match self.tracker.cancel(key) {
            CancelOutcome::Cancelled(control) => {
                info!(run = %key, "run stopped");
                if let Some(control) = control {
                    control.terminate();
                } else {
                    debug!(run = %key, "no live process at stop time");
                }
            }
            CancelOutcome::NotRunning => {
                debug!(run = %key, "stop requested for a run that is not running");
            }
        }
        Ok(())
    }

    pub fn list_artifact_files(&self, key: &RunKey) -> Result<Vec<String>> {
        self.layout.list_artifact_files(key)
    }

    pub fn read_artifact(&self, key: &RunKey, name: &str) -> Result<String> {
        self.layout.read_artifact(key, name)
    }

    /// Delete the run's artifacts and forget it. A running run is stopped
    /// first.
    pub fn delete_run(&self, key: &RunKey) -> Result<()> {
        self.stop(key)?;
        self.tracker.remove(key);
        self.layout.delete_run_directory(key)
    }

    /// Live output of the phase currently running, if any.
    pub fn subscribe_output(&self, key: &RunKey) -> Option<broadcast::Receiver<Vec<u8>>> {
        self.tracker.subscribe(key)
    }

    /// Poll until the run is no longer `Running`.
    pub async fn wait_for_terminal(&self, key: &RunKey) -> StatusReport {
        loop {
            let status = self.status(key);
            if status != StatusReport::Running {
                return status;
            }
            tokio::time::sleep(TERMINAL_POLL).await;
        }
    }
}
