// src/config/validate.rs

use std::net::SocketAddr;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, RunctlError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::RunctlError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_orchestrator(cfg)?;
    validate_command(cfg)?;
    validate_server(cfg)?;
    Ok(())
}

fn validate_orchestrator(cfg: &RawConfigFile) -> Result<()> {
    if cfg.orchestrator.runs_root.as_os_str().is_empty() {
        return Err(RunctlError::ConfigError(
            "[orchestrator].runs_root must not be empty".to_string(),
        ));
    }

    if cfg.orchestrator.default_threads == 0 {
        return Err(RunctlError::ConfigError(
            "[orchestrator].default_threads must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_command(cfg: &RawConfigFile) -> Result<()> {
    if cfg.command.program.trim().is_empty() {
        return Err(RunctlError::ConfigError(
            "[command].program must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    cfg.server.bind.parse::<SocketAddr>().map_err(|e| {
        RunctlError::ConfigError(format!(
            "[server].bind '{}' is not a socket address: {e}",
            cfg.server.bind
        ))
    })?;
    Ok(())
}
