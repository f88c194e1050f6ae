// src/runs/artifacts.rs

//! Read and delete access to a run's artifact directory.
//!
//! File names coming from callers are checked before any file operation:
//! anything that is not a single plain component is `AccessDenied`.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::errors::{Result, RunctlError};
use crate::runs::RunLayout;
use crate::types::{ensure_path_component, RunKey};

impl RunLayout {
    /// Resolve `name` inside the run directory, refusing escapes.
    pub fn artifact_path(&self, key: &RunKey, name: &str) -> Result<PathBuf> {
        ensure_path_component("artifact", name)?;

        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.run_dir(key).join(name)),
            _ => Err(RunctlError::AccessDenied(format!(
                "artifact '{name}' escapes the run directory"
            ))),
        }
    }

    /// Names of the files in the run directory, sorted.
    pub fn list_artifact_files(&self, key: &RunKey) -> Result<Vec<String>> {
        let dir = self.run_dir(key);
        if !self.fs().is_dir(&dir) {
            return Err(RunctlError::NotFound(format!("run {key}")));
        }

        let entries = self
            .fs()
            .read_dir(&dir)
            .map_err(|e| RunctlError::io_at(&dir, e))?;

        let mut names: Vec<String> = entries
            .into_iter()
            .filter(|p| self.fs().is_file(p))
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Text content of one artifact, decoded lossily.
    pub fn read_artifact(&self, key: &RunKey, name: &str) -> Result<String> {
        let path = self.artifact_path(key, name)?;
        if !self.fs().is_file(&path) {
            return Err(RunctlError::NotFound(format!("artifact '{name}' of run {key}")));
        }
        let bytes = self
            .fs()
            .read(&path)
            .map_err(|e| RunctlError::io_at(&path, e))?;
        // Logs hold the child's raw bytes; invalid UTF-8 becomes U+FFFD.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Remove the run directory; drop the environment directory too if that
    /// leaves it empty.
    pub fn delete_run_directory(&self, key: &RunKey) -> Result<()> {
        let dir = self.run_dir(key);
        if !self.fs().is_dir(&dir) {
            return Err(RunctlError::NotFound(format!("run {key}")));
        }

        self.fs()
            .remove_dir_all(&dir)
            .map_err(|e| RunctlError::io_at(&dir, e))?;
        info!(run = %key, "run directory deleted");

        let env_dir = self.environment_dir(&key.project, &key.environment);
        let now_empty = self
            .fs()
            .read_dir(&env_dir)
            .map(|entries| entries.is_empty())
            .unwrap_or(false);
        if now_empty {
            self.fs()
                .remove_dir(&env_dir)
                .map_err(|e| RunctlError::io_at(&env_dir, e))?;
            debug!(dir = ?env_dir, "removed empty environment directory");
        }

        Ok(())
    }
}
