// src/lib.rs

pub mod cli;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod runs;
pub mod server;
pub mod types;

use std::time::Duration;

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::{CliArgs, Command, RunRef, SubmitArgs};
use crate::config::load_or_default;
use crate::engine::Orchestrator;
use crate::types::{RunId, RunKey, RunOptions, RunRequest, Secret, StatusReport};

const FOLLOW_POLL: Duration = Duration::from_millis(50);

/// High-level entry point used by `main.rs`.
///
/// Returns the process exit code: `0`, or `1` when a followed run ended in
/// `Error`.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_or_default(args.config.as_deref())?;

    match args.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            let orchestrator = Orchestrator::from_config(cfg);
            server::start_server(orchestrator, &bind).await?;
            Ok(0)
        }
        Command::Submit(submit) => {
            let orchestrator = Orchestrator::from_config(cfg);
            submit_and_follow(&orchestrator, submit).await
        }
        Command::Status(run) => {
            let orchestrator = Orchestrator::from_config(cfg);
            let key = run_key(&run)?;
            println!("{}", orchestrator.status(&key));
            Ok(0)
        }
        Command::Files(run) => {
            let orchestrator = Orchestrator::from_config(cfg);
            for name in orchestrator.list_artifact_files(&run_key(&run)?)? {
                println!("{name}");
            }
            Ok(0)
        }
        Command::Cat { run, name } => {
            let orchestrator = Orchestrator::from_config(cfg);
            print!("{}", orchestrator.read_artifact(&run_key(&run)?, &name)?);
            Ok(0)
        }
        Command::Delete(run) => {
            let orchestrator = Orchestrator::from_config(cfg);
            let key = run_key(&run)?;
            orchestrator.delete_run(&key)?;
            info!(run = %key, "run deleted");
            Ok(0)
        }
    }
}

fn run_key(run: &RunRef) -> Result<RunKey> {
    let run_id = RunId::parse(run.run_id.as_str())?;
    Ok(RunKey::new(&run.project, &run.environment, run_id)?)
}

/// Submit in the foreground: echo phase output to stdout until the run
/// ends. Ctrl-C stops the run.
async fn submit_and_follow(orchestrator: &Orchestrator, args: SubmitArgs) -> Result<i32> {
    let resume = args.run_id.map(RunId::parse).transpose()?;
    let request = RunRequest {
        project: args.project.clone(),
        job: args.job,
        environment: args.environment.clone(),
        options: RunOptions {
            limit: args.limit,
            threads: args.threads,
            dry_run: !args.wet,
        },
        secret: args.secret.map(Secret::new),
        resume,
    };

    let run_id = orchestrator.submit(request).await?;
    let key = RunKey::new(&args.project, &args.environment, run_id)?;
    eprintln!("run {key} started");

    let status = tokio::select! {
        status = follow_output(orchestrator, &key) => status,
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            orchestrator.stop(&key)?;
            orchestrator.wait_for_terminal(&key).await
        }
    };

    eprintln!("run {key} finished: {status}");
    Ok(match status {
        StatusReport::Completed => 0,
        _ => 1,
    })
}

/// Copy live output of each phase to stdout until the run is terminal.
async fn follow_output(orchestrator: &Orchestrator, key: &RunKey) -> StatusReport {
    let mut stdout = tokio::io::stdout();
    loop {
        if let Some(mut rx) = orchestrator.subscribe_output(key) {
            loop {
                match rx.recv().await {
                    Ok(chunk) => {
                        if stdout.write_all(&chunk).await.is_ok() {
                            let _ = stdout.flush().await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(run = %key, skipped, "output consumer lagged; chunks dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }

        let status = orchestrator.status(key);
        if status != StatusReport::Running {
            return status;
        }
        tokio::time::sleep(FOLLOW_POLL).await;
    }
}
