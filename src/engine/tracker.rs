// src/engine/tracker.rs

//! In-memory registry of run states.
//!
//! Every operation on a key runs under that key's map entry, so a stop
//! request racing a natural exit is serialized: whichever lands first wins,
//! and a terminal state is never flipped back to `Running` by a late event.
//!
//! Each (re)creation of an entry gets a fresh generation. Drivers carry the
//! generation they were started with, so a driver from an earlier dry run
//! cannot touch the entry of a newer one for the same run id.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::broadcast;

use crate::exec::ProcessControl;
use crate::types::{RunKey, RunStatus};

#[derive(Debug)]
struct RunEntry {
    status: RunStatus,
    generation: u64,
    /// Present only while a phase process is alive.
    control: Option<ProcessControl>,
    output: Option<broadcast::Sender<Vec<u8>>>,
}

impl RunEntry {
    fn live(&self, generation: u64) -> bool {
        self.generation == generation && self.status == RunStatus::Running
    }

    fn release_process(&mut self) {
        self.control = None;
        self.output = None;
    }
}

/// Result of [`RunTracker::cancel`].
#[derive(Debug)]
pub enum CancelOutcome {
    /// No entry, or already terminal. Nothing changed.
    NotRunning,
    /// Flipped to `Error`; the caller should terminate the process, if any.
    Cancelled(Option<ProcessControl>),
}

/// Shared run registry. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct RunTracker {
    runs: Arc<DashMap<RunKey, RunEntry>>,
    generations: Arc<AtomicU64>,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, key: &RunKey) -> Option<RunStatus> {
        self.runs.get(key).map(|e| e.status)
    }

    /// Overwrite the status of `key`, creating the entry if needed.
    ///
    /// Any process handle is released. Prefer the generation-checked
    /// operations below from phase drivers.
    pub fn set(&self, key: &RunKey, status: RunStatus) {
        match self.runs.entry(key.clone()) {
            Entry::Occupied(mut occ) => {
                let entry = occ.get_mut();
                entry.status = status;
                entry.release_process();
            }
            Entry::Vacant(vac) => {
                vac.insert(RunEntry {
                    status,
                    generation: self.next_generation(),
                    control: None,
                    output: None,
                });
            }
        }
    }

    /// Create a fresh `Running` entry unless `key` is already running.
    ///
    /// Returns the new generation.
    pub fn try_begin(&self, key: &RunKey) -> Option<u64> {
        let generation = self.next_generation();
        let fresh = RunEntry {
            status: RunStatus::Running,
            generation,
            control: None,
            output: None,
        };

        match self.runs.entry(key.clone()) {
            Entry::Occupied(mut occ) => {
                if occ.get().status == RunStatus::Running {
                    return None;
                }
                occ.insert(fresh);
            }
            Entry::Vacant(vac) => {
                vac.insert(fresh);
            }
        }
        Some(generation)
    }

    pub fn is_running(&self, key: &RunKey, generation: u64) -> bool {
        self.runs
            .get(key)
            .map(|e| e.live(generation))
            .unwrap_or(false)
    }

    /// Record the live process of the current phase.
    ///
    /// Returns `false` (and stores nothing) if the run was stopped or
    /// recreated meanwhile; the caller then owns terminating the process.
    pub fn attach(
        &self,
        key: &RunKey,
        generation: u64,
        control: ProcessControl,
        output: broadcast::Sender<Vec<u8>>,
    ) -> bool {
        match self.runs.get_mut(key) {
            Some(mut entry) if entry.live(generation) => {
                entry.control = Some(control);
                entry.output = Some(output);
                true
            }
            _ => false,
        }
    }

    /// Drop the process handle once the phase has exited.
    pub fn detach(&self, key: &RunKey, generation: u64) {
        if let Some(mut entry) = self.runs.get_mut(key) {
            if entry.generation == generation {
                entry.release_process();
            }
        }
    }

    /// Move a running entry to its terminal status.
    ///
    /// Only applies while the entry is still `Running` with the same
    /// generation; a stopped run stays `Error`.
    pub fn finish(&self, key: &RunKey, generation: u64, status: RunStatus) -> bool {
        match self.runs.get_mut(key) {
            Some(mut entry) if entry.live(generation) => {
                entry.status = status;
                entry.release_process();
                true
            }
            _ => false,
        }
    }

    /// Flip a running entry to `Error` and hand back its process control.
    ///
    /// Never creates an entry.
    pub fn cancel(&self, key: &RunKey) -> CancelOutcome {
        match self.runs.get_mut(key) {
            Some(mut entry) if entry.status == RunStatus::Running => {
                entry.status = RunStatus::Error;
                entry.output = None;
                CancelOutcome::Cancelled(entry.control.take())
            }
            _ => CancelOutcome::NotRunning,
        }
    }

    pub fn remove(&self, key: &RunKey) -> Option<RunStatus> {
        self.runs.remove(key).map(|(_, e)| e.status)
    }

    /// Live output of the active phase, if one is running.
    pub fn subscribe(&self, key: &RunKey) -> Option<broadcast::Receiver<Vec<u8>>> {
        self.runs
            .get(key)
            .and_then(|e| e.output.as_ref().map(|tx| tx.subscribe()))
    }

    pub fn has_process(&self, key: &RunKey) -> bool {
        self.runs
            .get(key)
            .map(|e| e.control.is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;

    fn key(run: &str) -> RunKey {
        RunKey::new("p1", "DEV", RunId::parse(run).unwrap()).unwrap()
    }

    fn output() -> broadcast::Sender<Vec<u8>> {
        broadcast::channel(4).0
    }

    #[test]
    fn cancel_without_entry_creates_nothing() {
        let tracker = RunTracker::new();
        assert!(matches!(tracker.cancel(&key("R1")), CancelOutcome::NotRunning));
        assert!(tracker.is_empty());
    }

    #[test]
    fn cancel_beats_late_finish() {
        let tracker = RunTracker::new();
        let k = key("R1");
        let generation = tracker.try_begin(&k).unwrap();
        let control = ProcessControl::new();
        assert!(tracker.attach(&k, generation, control.clone(), output()));

        match tracker.cancel(&k) {
            CancelOutcome::Cancelled(Some(c)) => {
                c.terminate();
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(control.is_terminate_requested());
        assert!(!tracker.has_process(&k));

        assert!(!tracker.finish(&k, generation, RunStatus::Completed));
        assert_eq!(tracker.get(&k), Some(RunStatus::Error));
    }

    #[test]
    fn try_begin_refuses_a_running_key_but_recreates_terminal_ones() {
        let tracker = RunTracker::new();
        let k = key("R1");
        let first = tracker.try_begin(&k).unwrap();
        assert!(tracker.try_begin(&k).is_none());

        assert!(tracker.finish(&k, first, RunStatus::Completed));
        let second = tracker.try_begin(&k).unwrap();
        assert_ne!(first, second);
        assert_eq!(tracker.get(&k), Some(RunStatus::Running));

        // The old driver can no longer touch the recreated entry.
        assert!(!tracker.finish(&k, first, RunStatus::Error));
        assert!(!tracker.attach(&k, first, ProcessControl::new(), output()));
        assert_eq!(tracker.get(&k), Some(RunStatus::Running));
    }

    #[test]
    fn attach_after_cancel_is_refused() {
        let tracker = RunTracker::new();
        let k = key("R1");
        let generation = tracker.try_begin(&k).unwrap();
        tracker.cancel(&k);
        assert!(!tracker.attach(&k, generation, ProcessControl::new(), output()));
    }

    #[test]
    fn detach_releases_the_handle_but_keeps_status() {
        let tracker = RunTracker::new();
        let k = key("R1");
        let generation = tracker.try_begin(&k).unwrap();
        tracker.attach(&k, generation, ProcessControl::new(), output());
        assert!(tracker.subscribe(&k).is_some());

        tracker.detach(&k, generation);
        assert!(!tracker.has_process(&k));
        assert!(tracker.subscribe(&k).is_none());
        assert_eq!(tracker.get(&k), Some(RunStatus::Running));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let tracker = RunTracker::new();
        let a = key("R1");
        let b = key("R2");
        tracker.try_begin(&a).unwrap();
        let gb = tracker.try_begin(&b).unwrap();

        tracker.cancel(&a);
        assert!(tracker.finish(&b, gb, RunStatus::Completed));
        assert_eq!(tracker.get(&a), Some(RunStatus::Error));
        assert_eq!(tracker.get(&b), Some(RunStatus::Completed));
    }

    #[test]
    fn set_and_remove() {
        let tracker = RunTracker::new();
        let k = key("R1");
        tracker.set(&k, RunStatus::Completed);
        assert_eq!(tracker.get(&k), Some(RunStatus::Completed));
        assert_eq!(tracker.remove(&k), Some(RunStatus::Completed));
        assert_eq!(tracker.get(&k), None);
    }
}
