// src/runs/layout.rs

//! On-disk layout of a run's artifacts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Result, RunctlError};
use crate::fs::FileSystem;
use crate::types::{Phase, PhasePlan, RunKey};

/// Name of the options snapshot inside a run directory.
pub const OPTIONS_FILE_NAME: &str = "options.json";

/// Resolved options of a submission, as persisted next to the logs.
///
/// Never contains the secret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsSnapshot {
    pub project: String,
    pub environment: String,
    pub job: String,
    pub run_id: String,
    pub plan: PhasePlan,
    pub limit: Option<u64>,
    pub threads: u32,
    pub dry_run: bool,
    pub program: String,
    pub submitted_at: DateTime<Utc>,
}

/// Maps run coordinates to directories under a root.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn environment_dir(&self, project: &str, environment: &str) -> PathBuf {
        self.root.join(project).join(environment)
    }

    pub fn run_dir(&self, key: &RunKey) -> PathBuf {
        self.environment_dir(&key.project, &key.environment)
            .join(key.run_id.as_str())
    }

    pub fn log_path(&self, key: &RunKey, phase: Phase) -> PathBuf {
        self.run_dir(key).join(phase.log_file_name())
    }

    pub fn options_path(&self, key: &RunKey) -> PathBuf {
        self.run_dir(key).join(OPTIONS_FILE_NAME)
    }

    /// Create the run directory and all missing ancestors.
    ///
    /// Idempotent; existing content is left untouched.
    pub fn ensure_run_directory(&self, key: &RunKey) -> Result<PathBuf> {
        let dir = self.run_dir(key);
        self.fs
            .create_dir_all(&dir)
            .map_err(|e| RunctlError::io_at(&dir, e))?;
        debug!(run = %key, dir = ?dir, "run directory ready");
        Ok(dir)
    }

    pub fn run_dir_exists(&self, key: &RunKey) -> bool {
        self.fs.is_dir(&self.run_dir(key))
    }

    pub fn write_options_snapshot(&self, key: &RunKey, snapshot: &OptionsSnapshot) -> Result<()> {
        let path = self.options_path(key);
        let json = serde_json::to_vec_pretty(snapshot)?;
        self.fs
            .write(&path, &json)
            .map_err(|e| RunctlError::io_at(&path, e))
    }

    pub fn read_options_snapshot(&self, key: &RunKey) -> Result<OptionsSnapshot> {
        let path = self.options_path(key);
        let text = self
            .fs
            .read_to_string(&path)
            .map_err(|e| RunctlError::io_at(&path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}
