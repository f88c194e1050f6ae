// src/types.rs

//! Shared domain types: run identifiers, requests, phases and statuses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, RunctlError};

/// Opaque, lexicographically sortable run identifier.
///
/// Fresh identifiers come from [`crate::runs::RunIdGenerator`]; resumed runs
/// carry the identifier supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Wrap a caller-supplied identifier, rejecting anything that is not a
    /// single safe path component.
    pub fn parse(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        ensure_path_component("run id", &value)?;
        Ok(RunId(value))
    }

    pub(crate) fn from_generated(value: String) -> Self {
        RunId(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Coordinates of a run: the tracker key and the artifact directory key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunKey {
    pub project: String,
    pub environment: String,
    pub run_id: RunId,
}

impl RunKey {
    pub fn new(
        project: impl Into<String>,
        environment: impl Into<String>,
        run_id: RunId,
    ) -> Result<Self> {
        let project = project.into();
        let environment = environment.into();
        ensure_path_component("project", &project)?;
        ensure_path_component("environment", &environment)?;
        Ok(Self {
            project,
            environment,
            run_id,
        })
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.environment, self.run_id)
    }
}

/// Reject values that would not stay inside their parent directory when
/// used as a single path component.
pub fn ensure_path_component(kind: &str, value: &str) -> Result<()> {
    let bad = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
        || value.starts_with('~');

    if bad {
        return Err(RunctlError::AccessDenied(format!(
            "{kind} '{value}' is not a valid path component"
        )));
    }
    Ok(())
}

/// One of the two phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Non-destructive pass.
    Dry,
    /// Destructive pass.
    Wet,
}

impl Phase {
    /// File name of this phase's log inside the run directory.
    pub fn log_file_name(self) -> &'static str {
        match self {
            Phase::Dry => "dry-output.log",
            Phase::Wet => "wet-output.log",
        }
    }

    pub fn is_dry(self) -> bool {
        matches!(self, Phase::Dry)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Dry => f.write_str("dry"),
            Phase::Wet => f.write_str("wet"),
        }
    }
}

/// Which phases a request will execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhasePlan {
    DryOnly,
    DryThenWet,
    /// Resume an existing run straight into the wet phase.
    WetOnly,
}

impl PhasePlan {
    pub fn first_phase(self) -> Phase {
        match self {
            PhasePlan::DryOnly | PhasePlan::DryThenWet => Phase::Dry,
            PhasePlan::WetOnly => Phase::Wet,
        }
    }
}

/// Lifecycle state of a tracked run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Answer of a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusReport {
    Running,
    Completed,
    Error,
    Unknown,
}

impl From<RunStatus> for StatusReport {
    fn from(status: RunStatus) -> Self {
        match status {
            RunStatus::Running => StatusReport::Running,
            RunStatus::Completed => StatusReport::Completed,
            RunStatus::Error => StatusReport::Error,
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusReport::Running => "running",
            StatusReport::Completed => "completed",
            StatusReport::Error => "error",
            StatusReport::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Execution options forwarded to the external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Row limit; `None` means unbounded.
    pub limit: Option<u64>,
    /// Thread count; `None` falls back to `[orchestrator].default_threads`.
    pub threads: Option<u32>,
    /// Dry-run only, no wet phase.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: None,
            threads: None,
            dry_run: true,
        }
    }
}

/// Operator-supplied secret. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// A request to start (or resume) a run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub project: String,
    pub job: String,
    pub environment: String,
    pub options: RunOptions,
    pub secret: Option<Secret>,
    /// Existing run to resume instead of generating a fresh identifier.
    pub resume: Option<RunId>,
}

impl RunRequest {
    /// Derive the phase plan from the dry-run flag and the resume id.
    pub fn plan(&self) -> PhasePlan {
        match (self.options.dry_run, self.resume.is_some()) {
            (true, _) => PhasePlan::DryOnly,
            (false, false) => PhasePlan::DryThenWet,
            (false, true) => PhasePlan::WetOnly,
        }
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dry" => Ok(Phase::Dry),
            "wet" => Ok(Phase::Wet),
            other => Err(format!("invalid phase: {other} (expected \"dry\" or \"wet\")")),
        }
    }
}
