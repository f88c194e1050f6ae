// src/exec/backend.rs

//! Pluggable process launcher abstraction.
//!
//! The phase sequencer talks to a `ProcessLauncher` instead of
//! `tokio::process` directly. Production code uses
//! [`super::RealProcessLauncher`]; tests provide launchers that never spawn
//! anything and decide exit codes themselves.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use tokio::sync::{broadcast, oneshot};

use crate::errors::Result;
use crate::types::{Phase, RunKey};

use super::control::ProcessControl;

/// Capacity of the live output channel; slow subscribers lag, the log
/// file never does.
pub const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// Everything needed to start one phase process.
#[derive(Clone)]
pub struct LaunchSpec {
    pub key: RunKey,
    pub phase: Phase,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Complete child environment (the child does not inherit ours).
    pub env: HashMap<String, String>,
    /// Phase log, opened in append mode.
    pub log_path: PathBuf,
}

// Hand-written so the environment (and the secret in it) never hits a log.
impl fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("key", &self.key)
            .field("phase", &self.phase)
            .field("program", &self.program)
            .field("args", &self.args)
            .field("working_dir", &self.working_dir)
            .field("env_vars", &self.env.len())
            .field("log_path", &self.log_path)
            .finish()
    }
}

/// How a phase process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseExit {
    /// Exited on its own with this code.
    Exited(i32),
    /// Ended by a signal (no exit code).
    Terminated,
    /// The exit could not be observed.
    WaitFailed(String),
}

impl PhaseExit {
    pub fn is_success(&self) -> bool {
        matches!(self, PhaseExit::Exited(0))
    }
}

/// A running phase: terminate capability, live output and exit event.
#[derive(Debug)]
pub struct PhaseHandle {
    pub control: ProcessControl,
    output: broadcast::Sender<Vec<u8>>,
    exit: oneshot::Receiver<PhaseExit>,
}

impl PhaseHandle {
    pub fn new(
        control: ProcessControl,
        output: broadcast::Sender<Vec<u8>>,
        exit: oneshot::Receiver<PhaseExit>,
    ) -> Self {
        Self {
            control,
            output,
            exit,
        }
    }

    /// Sender side of the live output, for handing out further subscriptions.
    pub fn output(&self) -> broadcast::Sender<Vec<u8>> {
        self.output.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output.subscribe()
    }

    /// Wait for the process to end.
    pub async fn wait(self) -> PhaseExit {
        self.exit
            .await
            .unwrap_or_else(|_| PhaseExit::WaitFailed("exit channel closed".to_string()))
    }
}

/// Trait abstracting how phase processes are started.
pub trait ProcessLauncher: Send + Sync {
    /// Start the process described by `spec`.
    ///
    /// An `Err` means nothing was started (`LaunchFailure` for a missing or
    /// unstartable executable, `Io` if the log could not be opened).
    fn launch(
        &self,
        spec: LaunchSpec,
    ) -> Pin<Box<dyn Future<Output = Result<PhaseHandle>> + Send + '_>>;
}
