// src/engine/sequencer.rs

//! Async phase driver.
//!
//! One `PhaseDriver` runs per submitted run, in its own Tokio task. It is a
//! thin IO shell around [`PhaseMachine`]: it launches whatever the machine
//! asks for, waits for the exit event and feeds the outcome back in. All
//! status changes go through the [`RunTracker`] with the driver's
//! generation, so a concurrent stop always wins.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::exec::{LaunchSpec, ProcessLauncher};
use crate::types::{Phase, PhasePlan, RunKey};

use super::machine::{PhaseCommand, PhaseEvent, PhaseMachine};
use super::tracker::RunTracker;
use super::PhaseOutcome;

/// Argument vector for one phase of the external tool.
///
/// `[prefix…] --env E --project P --job J --dry-run true|false [--limit N]
/// --threads T --run-id R --yes`
pub fn build_phase_args(
    prefix: &[String],
    key: &RunKey,
    job: &str,
    phase: Phase,
    limit: Option<u64>,
    threads: u32,
) -> Vec<String> {
    let mut args: Vec<String> = prefix.to_vec();
    args.extend([
        "--env".to_string(),
        key.environment.clone(),
        "--project".to_string(),
        key.project.clone(),
        "--job".to_string(),
        job.to_string(),
        "--dry-run".to_string(),
        phase.is_dry().to_string(),
    ]);
    if let Some(limit) = limit {
        args.push("--limit".to_string());
        args.push(limit.to_string());
    }
    args.extend([
        "--threads".to_string(),
        threads.to_string(),
        "--run-id".to_string(),
        key.run_id.to_string(),
        "--yes".to_string(),
    ]);
    args
}

/// Everything that is identical between the phases of one run.
#[derive(Clone)]
pub struct PhaseTemplate {
    pub key: RunKey,
    pub job: String,
    pub program: String,
    pub prefix_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub limit: Option<u64>,
    pub threads: u32,
    /// Run directory; phase logs are created inside it.
    pub run_dir: PathBuf,
}

impl PhaseTemplate {
    pub fn args_for(&self, phase: Phase) -> Vec<String> {
        build_phase_args(
            &self.prefix_args,
            &self.key,
            &self.job,
            phase,
            self.limit,
            self.threads,
        )
    }

    pub fn spec_for(&self, phase: Phase) -> LaunchSpec {
        LaunchSpec {
            key: self.key.clone(),
            phase,
            program: self.program.clone(),
            args: self.args_for(phase),
            working_dir: self.working_dir.clone(),
            env: self.env.clone(),
            log_path: self.run_dir.join(phase.log_file_name()),
        }
    }
}

pub(crate) struct PhaseDriver {
    pub template: PhaseTemplate,
    pub plan: PhasePlan,
    pub generation: u64,
    pub tracker: RunTracker,
    pub launcher: Arc<dyn ProcessLauncher>,
}

impl PhaseDriver {
    /// Drive the run to a terminal state.
    pub async fn run(self) {
        let key = self.template.key.clone();
        let mut machine = PhaseMachine::new(self.plan);
        let mut commands: VecDeque<PhaseCommand> = machine.step(PhaseEvent::Start).into();

        while let Some(command) = commands.pop_front() {
            match command {
                PhaseCommand::Launch(phase) => {
                    if !self.tracker.is_running(&key, self.generation) {
                        debug!(run = %key, phase = %phase, "run no longer active; not launching");
                        machine.step(PhaseEvent::Cancelled);
                        break;
                    }
                    let event = self.run_phase(phase).await;
                    commands.extend(machine.step(event));
                }
                PhaseCommand::Finish(status) => {
                    if self.tracker.finish(&key, self.generation, status) {
                        info!(run = %key, status = ?status, "run finished");
                    } else {
                        debug!(
                            run = %key,
                            status = ?status,
                            "run was stopped or replaced; keeping recorded status"
                        );
                    }
                }
            }
        }

        debug!(run = %key, state = ?machine.state(), "phase driver done");
    }

    /// Launch one phase and wait for it.
    ///
    /// A stop can land while `launch` is still spawning, after the
    /// `is_running` check in [`PhaseDriver::run`]. The process then starts,
    /// `attach` refuses it, and it is terminated here without being waited
    /// on.
    async fn run_phase(&self, phase: Phase) -> PhaseEvent {
        let key = &self.template.key;
        let spec = self.template.spec_for(phase);

        let handle = match self.launcher.launch(spec).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(run = %key, phase = %phase, error = %e, "phase launch failed");
                return PhaseEvent::LaunchFailed { phase };
            }
        };

        if !self
            .tracker
            .attach(key, self.generation, handle.control.clone(), handle.output())
        {
            warn!(run = %key, phase = %phase, "run stopped while launching; terminating");
            handle.control.terminate();
            return PhaseEvent::Cancelled;
        }

        let exit = handle.wait().await;
        self.tracker.detach(key, self.generation);

        info!(run = %key, phase = %phase, exit = ?exit, "phase ended");
        PhaseEvent::PhaseExited {
            phase,
            outcome: PhaseOutcome::from(&exit),
        }
    }
}
