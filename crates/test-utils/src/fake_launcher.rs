//! Launchers that never spawn a process.
//!
//! - [`FakeLauncher`] ends every phase right away with a scripted exit code.
//! - [`ControllableLauncher`] keeps each phase "running" until the test
//!   releases it, so stop/exit races can be staged deterministically.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, oneshot, watch};

use runctl::errors::{Result, RunctlError};
use runctl::exec::{LaunchSpec, PhaseExit, PhaseHandle, ProcessControl, ProcessLauncher};
use runctl::types::Phase;

fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

type Launched<'a> = Pin<Box<dyn Future<Output = Result<PhaseHandle>> + Send + 'a>>;

// ── FakeLauncher ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FakeInner {
    exit_codes: Mutex<HashMap<Phase, i32>>,
    fail_launch: Mutex<HashSet<Phase>>,
    launches: Mutex<Vec<LaunchSpec>>,
}

/// Exits every phase immediately.
///
/// Each launch is recorded, and one line `fake <phase> output` is appended to
/// the phase log so the usual artifacts appear on disk. Unscripted phases
/// exit with code 0.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    inner: Arc<FakeInner>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exit_code(self, phase: Phase, code: i32) -> Self {
        self.inner.exit_codes.lock().unwrap().insert(phase, code);
        self
    }

    /// Make launching `phase` fail as if the executable were missing.
    pub fn failing_launch(self, phase: Phase) -> Self {
        self.inner.fail_launch.lock().unwrap().insert(phase);
        self
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.inner.launches.lock().unwrap().clone()
    }

    pub fn launched_phases(&self) -> Vec<Phase> {
        self.launches().iter().map(|s| s.phase).collect()
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: LaunchSpec) -> Launched<'_> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            inner.launches.lock().unwrap().push(spec.clone());

            if inner.fail_launch.lock().unwrap().contains(&spec.phase) {
                let _ = append_line(&spec.log_path, "[fake] launch failed");
                return Err(RunctlError::LaunchFailure {
                    program: spec.program,
                    source: io::Error::new(io::ErrorKind::NotFound, "no such program"),
                });
            }

            let code = inner
                .exit_codes
                .lock()
                .unwrap()
                .get(&spec.phase)
                .copied()
                .unwrap_or(0);
            append_line(&spec.log_path, &format!("fake {} output", spec.phase))?;

            let (output, _) = broadcast::channel(16);
            let (exit_tx, exit_rx) = oneshot::channel();
            let _ = exit_tx.send(PhaseExit::Exited(code));
            Ok::<_, RunctlError>(PhaseHandle::new(ProcessControl::new(), output, exit_rx))
        })
    }
}

// ── ControllableLauncher ──────────────────────────────────────────────

#[derive(Debug)]
struct ControlInner {
    pending: Mutex<HashMap<Phase, oneshot::Sender<PhaseExit>>>,
    outputs: Mutex<HashMap<Phase, broadcast::Sender<Vec<u8>>>>,
    launched: watch::Sender<Vec<LaunchSpec>>,
    terminate_requests: AtomicUsize,
    honour_terminate: bool,
}

/// Phases run until [`ControllableLauncher::finish`] is called.
#[derive(Debug, Clone)]
pub struct ControllableLauncher {
    inner: Arc<ControlInner>,
}

impl Default for ControllableLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ControllableLauncher {
    /// Terminate requests end the phase as `Terminated`.
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Terminate requests are counted but the phase keeps running, like a
    /// process that ignores SIGTERM.
    pub fn ignoring_terminate() -> Self {
        Self::build(false)
    }

    fn build(honour_terminate: bool) -> Self {
        let (launched, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(ControlInner {
                pending: Mutex::new(HashMap::new()),
                outputs: Mutex::new(HashMap::new()),
                launched,
                terminate_requests: AtomicUsize::new(0),
                honour_terminate,
            }),
        }
    }

    /// Wait until `phase` has been launched and return its spec.
    pub async fn wait_for_launch(&self, phase: Phase) -> LaunchSpec {
        let mut rx = self.inner.launched.subscribe();
        let specs = rx
            .wait_for(|specs| specs.iter().any(|s| s.phase == phase))
            .await
            .expect("launcher dropped");
        specs
            .iter()
            .find(|s| s.phase == phase)
            .cloned()
            .expect("checked above")
    }

    /// Let a running phase exit with `code`. Returns `false` if the phase is
    /// not running (never launched, or already ended).
    pub fn finish(&self, phase: Phase, code: i32) -> bool {
        match self.inner.pending.lock().unwrap().remove(&phase) {
            Some(tx) => tx.send(PhaseExit::Exited(code)).is_ok(),
            None => false,
        }
    }

    /// Publish a chunk on the live output of a running phase.
    pub fn emit(&self, phase: Phase, chunk: &[u8]) -> bool {
        match self.inner.outputs.lock().unwrap().get(&phase) {
            Some(tx) => tx.send(chunk.to_vec()).is_ok(),
            None => false,
        }
    }

    pub fn launched_phases(&self) -> Vec<Phase> {
        self.inner.launched.borrow().iter().map(|s| s.phase).collect()
    }

    pub fn terminate_requests(&self) -> usize {
        self.inner.terminate_requests.load(Ordering::SeqCst)
    }

    /// Poll until at least `expected` terminate requests were seen (or one
    /// second passed) and return the count.
    pub async fn terminate_requests_eventually(&self, expected: usize) -> usize {
        for _ in 0..100 {
            let seen = self.terminate_requests();
            if seen >= expected {
                return seen;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.terminate_requests()
    }
}

impl ProcessLauncher for ControllableLauncher {
    fn launch(&self, spec: LaunchSpec) -> Launched<'_> {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            append_line(&spec.log_path, &format!("fake {} started", spec.phase))?;

            let control = ProcessControl::new();
            let (output, _) = broadcast::channel(16);
            let (exit_tx, exit_rx) = oneshot::channel();
            let (release_tx, mut release_rx) = oneshot::channel::<PhaseExit>();

            let phase = spec.phase;
            inner.pending.lock().unwrap().insert(phase, release_tx);
            inner.outputs.lock().unwrap().insert(phase, output.clone());

            let watcher = control.clone();
            let task_inner = Arc::clone(&inner);
            tokio::spawn(async move {
                let mut signalled = false;
                let exit = loop {
                    tokio::select! {
                        res = &mut release_rx => {
                            break res.unwrap_or(PhaseExit::Terminated);
                        }
                        _ = watcher.terminated(), if !signalled => {
                            signalled = true;
                            task_inner.terminate_requests.fetch_add(1, Ordering::SeqCst);
                            if task_inner.honour_terminate {
                                task_inner.pending.lock().unwrap().remove(&phase);
                                break PhaseExit::Terminated;
                            }
                        }
                    }
                };
                task_inner.outputs.lock().unwrap().remove(&phase);
                let _ = exit_tx.send(exit);
            });

            inner.launched.send_modify(|specs| specs.push(spec));
            Ok::<_, RunctlError>(PhaseHandle::new(control, output, exit_rx))
        })
    }
}
