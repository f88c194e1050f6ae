// src/runs/mod.rs

//! Durable run artifacts.
//!
//! - [`run_id`] generates sortable run identifiers.
//! - [`layout`] computes and creates `<root>/<project>/<environment>/<run_id>/`
//!   and writes the options snapshot.
//! - [`artifacts`] lists, reads and deletes what a run left on disk.

pub mod artifacts;
pub mod layout;
pub mod run_id;

pub use layout::{OptionsSnapshot, RunLayout, OPTIONS_FILE_NAME};
pub use run_id::RunIdGenerator;
