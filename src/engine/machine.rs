// src/engine/machine.rs

//! Pure phase state machine.
//!
//! `PhaseMachine` consumes [`PhaseEvent`]s and returns the
//! [`PhaseCommand`]s the async driver (`engine::sequencer`) should carry
//! out. It has no channels, no Tokio types and performs no IO, so every
//! transition can be tested without spawning processes.

use crate::types::{Phase, PhasePlan, RunStatus};

use super::PhaseOutcome;

/// Where a run is in its phase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    Idle,
    DryRunning,
    WetRunning,
    Completed,
    Failed,
}

impl MachineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MachineState::Completed | MachineState::Failed)
    }

    fn running(phase: Phase) -> Self {
        match phase {
            Phase::Dry => MachineState::DryRunning,
            Phase::Wet => MachineState::WetRunning,
        }
    }

    fn running_phase(self) -> Option<Phase> {
        match self {
            MachineState::DryRunning => Some(Phase::Dry),
            MachineState::WetRunning => Some(Phase::Wet),
            _ => None,
        }
    }
}

/// Inputs to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    Start,
    /// The phase's process exited.
    PhaseExited { phase: Phase, outcome: PhaseOutcome },
    /// The phase's process could not be started.
    LaunchFailed { phase: Phase },
    /// The run was stopped; the stop request already recorded `Error`.
    Cancelled,
}

/// What the driver should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseCommand {
    Launch(Phase),
    Finish(RunStatus),
}

#[derive(Debug, Clone)]
pub struct PhaseMachine {
    plan: PhasePlan,
    state: MachineState,
}

impl PhaseMachine {
    pub fn new(plan: PhasePlan) -> Self {
        Self {
            plan,
            state: MachineState::Idle,
        }
    }

    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn plan(&self) -> PhasePlan {
        self.plan
    }

    /// Single transition function.
    ///
    /// Events that do not apply to the current state (a wet exit while dry
    /// is running, anything after a terminal state) are ignored.
    pub fn step(&mut self, event: PhaseEvent) -> Vec<PhaseCommand> {
        if self.state.is_terminal() {
            return Vec::new();
        }

        match (self.state, event) {
            (MachineState::Idle, PhaseEvent::Start) => {
                let first = self.plan.first_phase();
                self.state = MachineState::running(first);
                vec![PhaseCommand::Launch(first)]
            }

            (MachineState::Idle, PhaseEvent::Cancelled) => {
                self.state = MachineState::Failed;
                Vec::new()
            }

            (state, PhaseEvent::PhaseExited { phase, outcome })
                if state.running_phase() == Some(phase) =>
            {
                self.on_phase_exit(phase, outcome)
            }

            (state, PhaseEvent::LaunchFailed { phase }) if state.running_phase() == Some(phase) => {
                self.fail()
            }

            (state, PhaseEvent::Cancelled) if state.running_phase().is_some() => {
                self.state = MachineState::Failed;
                Vec::new()
            }

            _ => Vec::new(),
        }
    }

    fn on_phase_exit(&mut self, phase: Phase, outcome: PhaseOutcome) -> Vec<PhaseCommand> {
        if outcome != PhaseOutcome::Success {
            return self.fail();
        }

        match (phase, self.plan) {
            (Phase::Dry, PhasePlan::DryThenWet) => {
                self.state = MachineState::WetRunning;
                vec![PhaseCommand::Launch(Phase::Wet)]
            }
            _ => {
                self.state = MachineState::Completed;
                vec![PhaseCommand::Finish(RunStatus::Completed)]
            }
        }
    }

    fn fail(&mut self) -> Vec<PhaseCommand> {
        self.state = MachineState::Failed;
        vec![PhaseCommand::Finish(RunStatus::Error)]
    }
}
