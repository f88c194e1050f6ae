// src/exec/phase_runner.rs

//! Production launcher: one OS process per phase.
//!
//! Stdout and stderr are read by two tasks that forward chunks to a single
//! writer task, which appends them to the phase log in arrival order and
//! republishes them on the live output channel. The exit event is sent after
//! the writer has drained (or [`DRAIN_GRACE`] has passed), so the log is
//! normally complete when observers see the phase end.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::errors::{Result, RunctlError};

use super::backend::{LaunchSpec, OUTPUT_CHANNEL_CAPACITY, PhaseExit, PhaseHandle, ProcessLauncher};
use super::control::ProcessControl;

const READ_CHUNK: usize = 8 * 1024;

/// How long to wait for the pipes to drain once the child has exited.
/// Grandchildren that inherited the pipes can hold them open indefinitely.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Launcher used in production.
#[derive(Debug, Clone, Default)]
pub struct RealProcessLauncher;

impl RealProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for RealProcessLauncher {
    fn launch(
        &self,
        spec: LaunchSpec,
    ) -> Pin<Box<dyn Future<Output = Result<PhaseHandle>> + Send + '_>> {
        Box::pin(launch_phase(spec))
    }
}

async fn open_log(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| RunctlError::io_at(path, e))
}

/// Append one orchestrator note to a phase log.
pub async fn append_note(log: &mut File, note: &str) -> io::Result<()> {
    log.write_all(format!("[runctl] {note}\n").as_bytes()).await?;
    log.flush().await
}

async fn launch_phase(spec: LaunchSpec) -> Result<PhaseHandle> {
    let mut log = open_log(&spec.log_path).await?;

    info!(
        run = %spec.key,
        phase = %spec.phase,
        program = %spec.program,
        args = ?spec.args,
        "starting phase process"
    );

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .env_clear()
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            error!(
                run = %spec.key,
                phase = %spec.phase,
                program = %spec.program,
                error = %source,
                "failed to launch phase process"
            );
            let note = format!("failed to launch '{}': {source}", spec.program);
            if let Err(e) = append_note(&mut log, &note).await {
                warn!(run = %spec.key, error = %e, "could not record launch failure in log");
            }
            return Err(RunctlError::LaunchFailure {
                program: spec.program,
                source,
            });
        }
    };

    let control = ProcessControl::new();
    let (output_tx, _) = broadcast::channel::<Vec<u8>>(OUTPUT_CHANNEL_CAPACITY);
    let (exit_tx, exit_rx) = oneshot::channel::<PhaseExit>();
    let (chunk_tx, chunk_rx) = mpsc::channel::<Vec<u8>>(64);

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(pump(stdout, chunk_tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(pump(stderr, chunk_tx.clone()));
    }
    drop(chunk_tx);

    let writer = tokio::spawn(write_log(log, chunk_rx, output_tx.clone()));

    tokio::spawn(supervise(spec, child, control.clone(), writer, exit_tx));

    Ok(PhaseHandle::new(control, output_tx, exit_rx))
}

/// Forward raw chunks from one pipe until EOF.
async fn pump<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(error = %e, "pipe read failed; stopping reader");
                break;
            }
        }
    }
}

/// Append chunks to the log as they arrive; returns the file for the
/// closing note.
async fn write_log(
    mut log: File,
    mut rx: mpsc::Receiver<Vec<u8>>,
    output: broadcast::Sender<Vec<u8>>,
) -> File {
    while let Some(chunk) = rx.recv().await {
        if let Err(e) = log.write_all(&chunk).await {
            warn!(error = %e, "failed to append to phase log");
        } else if let Err(e) = log.flush().await {
            warn!(error = %e, "failed to flush phase log");
        }
        // No subscribers is fine.
        let _ = output.send(chunk);
    }
    log
}

/// Wait for the child (delivering a termination request if one arrives),
/// finish the log and publish the exit.
async fn supervise(
    spec: LaunchSpec,
    mut child: Child,
    control: ProcessControl,
    writer: tokio::task::JoinHandle<File>,
    exit_tx: oneshot::Sender<PhaseExit>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = control.terminated() => {
            info!(run = %spec.key, phase = %spec.phase, "termination requested; signalling process");
            if let Err(e) = request_termination(&mut child) {
                warn!(run = %spec.key, phase = %spec.phase, error = %e, "failed to signal process");
            }
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => match status.code() {
            Some(code) => PhaseExit::Exited(code),
            None => PhaseExit::Terminated,
        },
        Err(e) => PhaseExit::WaitFailed(e.to_string()),
    };

    info!(
        run = %spec.key,
        phase = %spec.phase,
        exit = ?exit,
        "phase process exited"
    );

    match tokio::time::timeout(DRAIN_GRACE, writer).await {
        Ok(Ok(mut log)) => {
            let note = match &exit {
                PhaseExit::Exited(0) => None,
                PhaseExit::Exited(code) => Some(format!("{} phase exited with code {code}", spec.phase)),
                PhaseExit::Terminated => Some(format!("{} phase terminated by signal", spec.phase)),
                PhaseExit::WaitFailed(e) => Some(format!("{} phase exit unknown: {e}", spec.phase)),
            };
            if let Some(note) = note {
                if let Err(e) = append_note(&mut log, &note).await {
                    warn!(run = %spec.key, error = %e, "could not record exit in log");
                }
            }
        }
        Ok(Err(e)) => warn!(run = %spec.key, error = %e, "log writer task failed"),
        Err(_) => warn!(
            run = %spec.key,
            phase = %spec.phase,
            "output pipes still open after exit; late output keeps being appended"
        ),
    }

    // Receiver gone means nobody is waiting for this phase any more.
    let _ = exit_tx.send(exit);
}

#[cfg(unix)]
fn request_termination(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return Ok(());
    };
    let pid = libc::pid_t::try_from(pid)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: plain syscall on a pid we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
