// src/engine/status.rs

//! Status policy.
//!
//! The tracker lives in memory, so after an orchestrator restart it knows
//! nothing about earlier runs. A run the tracker does not know, but whose
//! directory exists, is reported as `Completed`: a directory only exists
//! once some phase has started, and a run whose process and tracker entry
//! are both gone is assumed finished, not lost.
//!
//! A run that crashed mid-phase and one that finished cleanly before the
//! restart look the same here.

use crate::types::{RunStatus, StatusReport};

/// Combine the tracker's view with the on-disk evidence.
///
/// `dir_exists` is only consulted when the tracker has no entry.
pub fn resolve_status<F>(tracked: Option<RunStatus>, dir_exists: F) -> StatusReport
where
    F: FnOnce() -> bool,
{
    match tracked {
        Some(status) => status.into(),
        None if dir_exists() => StatusReport::Completed,
        None => StatusReport::Unknown,
    }
}
