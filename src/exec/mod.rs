// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the external migration
//! tool, one phase at a time, using `tokio::process::Command`.
//!
//! - [`backend`] provides the `ProcessLauncher` trait and the handle types
//!   the phase sequencer depends on, so tests can swap in a fake launcher.
//! - [`control`] holds `ProcessControl`, the terminate capability stored in
//!   the run tracker while a phase is alive.
//! - [`phase_runner`] is the production launcher: it spawns the child,
//!   appends its output to the phase log and reports the exit.

pub mod backend;
pub mod control;
pub mod phase_runner;

pub use backend::{LaunchSpec, PhaseExit, PhaseHandle, ProcessLauncher};
pub use control::ProcessControl;
pub use phase_runner::RealProcessLauncher;
