#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use runctl::config::{ConfigFile, RawConfigFile};
use runctl::engine::Orchestrator;
use runctl::exec::ProcessLauncher;
use runctl::fs::RealFileSystem;
use runctl::types::{RunId, RunOptions, RunRequest, Secret};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    /// Defaults, with runs stored under `runs_root`.
    pub fn new(runs_root: &Path) -> Self {
        let mut config = RawConfigFile::default();
        config.orchestrator.runs_root = runs_root.to_path_buf();
        Self { config }
    }

    pub fn program(mut self, program: &str) -> Self {
        self.config.command.program = program.to_string();
        self
    }

    pub fn prefix_arg(mut self, arg: &str) -> Self {
        self.config.command.args.push(arg.to_string());
        self
    }

    pub fn default_threads(mut self, threads: u32) -> Self {
        self.config.orchestrator.default_threads = threads;
        self
    }

    pub fn credential_affixes(mut self, prefix: &str, suffix: &str) -> Self {
        self.config.credentials.prefix = prefix.to_string();
        self.config.credentials.suffix = suffix.to_string();
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `RunRequest`. Starts as a dry-only run.
pub struct RunRequestBuilder {
    request: RunRequest,
}

impl RunRequestBuilder {
    pub fn new(project: &str, environment: &str, job: &str) -> Self {
        Self {
            request: RunRequest {
                project: project.to_string(),
                job: job.to_string(),
                environment: environment.to_string(),
                options: RunOptions::default(),
                secret: None,
                resume: None,
            },
        }
    }

    /// Dry phase followed by the wet phase.
    pub fn wet(mut self) -> Self {
        self.request.options.dry_run = false;
        self
    }

    /// Resume `run_id` with its wet phase only.
    pub fn resume(mut self, run_id: &RunId) -> Self {
        self.request.options.dry_run = false;
        self.request.resume = Some(run_id.clone());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.request.options.limit = Some(limit);
        self
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.request.options.threads = Some(threads);
        self
    }

    pub fn secret(mut self, secret: &str) -> Self {
        self.request.secret = Some(Secret::new(secret));
        self
    }

    pub fn build(self) -> RunRequest {
        self.request
    }
}

/// Orchestrator over the real filesystem with an empty ambient environment.
pub fn orchestrator<L>(config: ConfigFile, launcher: L) -> Orchestrator
where
    L: ProcessLauncher + 'static,
{
    Orchestrator::new(config, Arc::new(RealFileSystem), Arc::new(launcher))
        .with_ambient_env(HashMap::new())
}
