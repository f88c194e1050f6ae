// src/engine/mod.rs

//! Run orchestration engine.
//!
//! This module ties together:
//! - the pure phase state machine ([`machine`])
//! - the shared run registry ([`tracker`])
//! - the async driver that launches phases for one run ([`sequencer`])
//! - the status policy ([`status`])
//! - the public submit/status/stop/artifact API ([`orchestrator`])

use crate::exec::PhaseExit;

/// Outcome of a phase process as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    Success,
    /// Non-zero exit code, or -1 when there was none (signal, wait error).
    Failed(i32),
}

impl From<&PhaseExit> for PhaseOutcome {
    fn from(exit: &PhaseExit) -> Self {
        match exit {
            PhaseExit::Exited(0) => PhaseOutcome::Success,
            PhaseExit::Exited(code) => PhaseOutcome::Failed(*code),
            PhaseExit::Terminated | PhaseExit::WaitFailed(_) => PhaseOutcome::Failed(-1),
        }
    }
}

pub mod machine;
pub mod orchestrator;
pub mod sequencer;
pub mod status;
pub mod tracker;

pub use machine::{MachineState, PhaseCommand, PhaseEvent, PhaseMachine};
pub use orchestrator::Orchestrator;
pub use sequencer::{build_phase_args, PhaseTemplate};
pub use status::resolve_status;
pub use tracker::{CancelOutcome, RunTracker};
