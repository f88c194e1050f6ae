// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [orchestrator]
/// runs_root = "runs"
/// default_threads = 4
///
/// [command]
/// program = "migrate"
/// args = ["--quiet"]
/// working_dir = "/srv/migrations"
///
/// [credentials]
/// prefix = ""
/// suffix = "_PASSWORD"
///
/// [server]
/// bind = "127.0.0.1:8080"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    #[serde(default)]
    pub command: CommandSection,

    #[serde(default)]
    pub credentials: CredentialsSection,

    #[serde(default)]
    pub server: ServerSection,
}

/// Validated configuration.
///
/// Only constructible through `TryFrom<RawConfigFile>` (see `validate.rs`),
/// so holders can rely on the invariants checked there.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub orchestrator: OrchestratorSection,
    pub command: CommandSection,
    pub credentials: CredentialsSection,
    pub server: ServerSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            orchestrator: raw.orchestrator,
            command: raw.command,
            credentials: raw.credentials,
            server: raw.server,
        }
    }
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorSection {
    /// Root directory holding `<project>/<environment>/<run_id>/`.
    #[serde(default = "default_runs_root")]
    pub runs_root: PathBuf,

    /// Thread count passed to the tool when a request does not set one.
    #[serde(default = "default_threads")]
    pub default_threads: u32,
}

fn default_runs_root() -> PathBuf {
    PathBuf::from("runs")
}

fn default_threads() -> u32 {
    4
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            runs_root: default_runs_root(),
            default_threads: default_threads(),
        }
    }
}

/// `[command]` section: the external migration tool.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSection {
    /// Executable name or path.
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the run flags.
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory of the child; `None` inherits ours.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_program() -> String {
    "migrate".to_string()
}

impl Default for CommandSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            working_dir: None,
        }
    }
}

/// `[credentials]` section.
///
/// The secret variable for environment `01-TEST` is
/// `prefix + "TEST" + suffix`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsSection {
    #[serde(default)]
    pub prefix: String,

    #[serde(default = "default_suffix")]
    pub suffix: String,
}

fn default_suffix() -> String {
    "_PASSWORD".to_string()
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            suffix: default_suffix(),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}
