// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `runctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "runctl",
    version,
    about = "Run migration jobs as a dry phase followed by a wet phase.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `RUNCTL_CONFIG`, or `Runctl.toml` in the current directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNCTL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Overrides `[server] bind`.
        #[arg(long, value_name = "ADDR")]
        bind: Option<String>,
    },

    /// Submit a run and follow it until it ends.
    Submit(SubmitArgs),

    /// Print the status of a run.
    Status(RunRef),

    /// List the files in a run directory.
    Files(RunRef),

    /// Print one file from a run directory.
    Cat {
        #[command(flatten)]
        run: RunRef,

        /// File name inside the run directory.
        #[arg(long)]
        name: String,
    },

    /// Delete a run directory.
    Delete(RunRef),
}

/// Identifies one run.
#[derive(Debug, Clone, Args)]
pub struct RunRef {
    #[arg(long)]
    pub project: String,

    #[arg(long = "env", value_name = "ENV")]
    pub environment: String,

    #[arg(long)]
    pub run_id: String,
}

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long)]
    pub project: String,

    #[arg(long = "env", value_name = "ENV")]
    pub environment: String,

    #[arg(long)]
    pub job: String,

    /// Row limit for the run.
    #[arg(long, value_name = "N")]
    pub limit: Option<u64>,

    /// Worker threads for the tool; defaults to `[orchestrator] default_threads`.
    #[arg(long, value_name = "N")]
    pub threads: Option<u32>,

    /// Also run the wet phase. Without it only the dry phase runs.
    #[arg(long)]
    pub wet: bool,

    /// Reuse an existing run: its wet phase with `--wet`, otherwise its
    /// dry phase again.
    #[arg(long, value_name = "RUN_ID")]
    pub run_id: Option<String>,

    /// Password for the target environment.
    #[arg(long, value_name = "SECRET")]
    pub secret: Option<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_parses_run_options() {
        let args = CliArgs::try_parse_from([
            "runctl", "submit", "--project", "p1", "--env", "01-DEV", "--job", "j1",
            "--limit", "10",
        ])
        .unwrap();
        match args.command {
            Command::Submit(s) => {
                assert_eq!(s.environment, "01-DEV");
                assert_eq!(s.limit, Some(10));
                assert!(!s.wet, "dry only unless --wet is given");
                assert!(s.run_id.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn run_id_reruns_dry_unless_wet_is_given() {
        let dry = CliArgs::try_parse_from([
            "runctl", "submit", "--project", "p1", "--env", "DEV", "--job", "j1",
            "--run-id", "R1",
        ])
        .unwrap();
        let wet = CliArgs::try_parse_from([
            "runctl", "submit", "--project", "p1", "--env", "DEV", "--job", "j1",
            "--run-id", "R1", "--wet",
        ])
        .unwrap();
        match (dry.command, wet.command) {
            (Command::Submit(dry), Command::Submit(wet)) => {
                assert_eq!(dry.run_id.as_deref(), Some("R1"));
                assert!(!dry.wet);
                assert_eq!(wet.run_id.as_deref(), Some("R1"));
                assert!(wet.wet);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let args = CliArgs::try_parse_from([
            "runctl", "status", "--project", "p1", "--env", "DEV", "--run-id", "R1",
            "--config", "custom.toml", "--log-level", "debug",
        ])
        .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    }
}
