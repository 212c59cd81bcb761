//! Command-line interface for Vitals
//!
//! Uses clap with derive for type-safe CLI parsing. The commands are kept
//! deliberately lightweight: orchestrator health check hooks run with
//! timeouts of a couple of seconds, so startup cost matters.

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config;

/// Vitals - liveness and readiness probing for task-queue workers
#[derive(Parser)]
#[command(name = "vitals")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the vitals version
    Version,

    /// Execute an HTTP health check call against the provided endpoint
    ///
    /// If no host or domain is provided with the endpoint option, a default
    /// of http://localhost:8000 is used.
    HealthCheck {
        /// Endpoint/path to test for connection and status code
        #[arg(long, env = "VITALS_HEALTH_ENDPOINT", default_value = "/_healthz/livez/")]
        endpoint: String,

        /// Timeout for the GET request (in seconds)
        #[arg(long, default_value_t = 3)]
        timeout: u64,
    },

    /// Run health checks for the task-queue worker
    ///
    /// The worker health checks consist of separate components. The defaults
    /// are geared towards liveness checks; disable or enable parts to adapt
    /// to your situation. The first enabled check that fails determines the
    /// exit code: 1 for a broken event loop, 2 for a failed ping roundtrip,
    /// 4 for a missing readiness marker.
    WorkerHealthCheck {
        /// The event loop liveness file, created and updated by the worker
        #[arg(
            long,
            env = "VITALS_WORKER_LIVENESS_FILE",
            default_value = config::DEFAULT_WORKER_LIVENESS_FILE
        )]
        liveness_file: PathBuf,

        /// How long ago the last update of the liveness file is allowed to
        /// be, in seconds; match this to the worker's probe frequency
        #[arg(long, default_value_t = 70, allow_hyphen_values = true)]
        max_age: i64,

        /// Opt-out from the event loop liveness check
        #[arg(long)]
        skip_event_loop_liveness: bool,

        /// Broker URL used for the ping roundtrip check
        #[arg(long, env = "VITALS_BROKER_URL", default_value = config::DEFAULT_BROKER_URL)]
        broker: String,

        /// Worker name, typically composed from <queue>@<host>
        #[arg(
            long,
            env = "VITALS_WORKER_NAME",
            default_value_t = config::default_worker_name()
        )]
        worker_name: String,

        /// Timeout after which the ping check fails (in seconds)
        #[arg(long, default_value_t = 3)]
        ping_timeout: u64,

        /// Opt-out from the ping roundtrip check
        #[arg(long)]
        skip_ping: bool,

        /// The readiness file, created when the worker is ready to process
        /// tasks
        #[arg(
            long,
            env = "VITALS_WORKER_READINESS_FILE",
            default_value = config::DEFAULT_WORKER_READINESS_FILE
        )]
        readiness_file: PathBuf,

        /// Opt-out from the readiness check (the default)
        #[arg(long, conflicts_with = "no_skip_readiness")]
        skip_readiness: bool,

        /// Opt-in to the readiness check
        #[arg(long)]
        no_skip_readiness: bool,
    },

    /// Check the last modified timestamp of the scheduler liveness file
    ///
    /// If it's older than max-age, the scheduler is considered unhealthy.
    BeatHealthCheck {
        /// The liveness file, created and updated by the scheduler probe
        #[arg(
            long,
            env = "VITALS_BEAT_LIVENESS_FILE",
            default_value = config::DEFAULT_BEAT_LIVENESS_FILE
        )]
        file: PathBuf,

        /// How long ago the last update of the liveness file is allowed to
        /// be, in seconds; tune this to the schedule of your application
        #[arg(long, default_value_t = 3600, allow_hyphen_values = true)]
        max_age: i64,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "vitals", &mut std::io::stdout());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_worker_health_check_defaults() {
        let cli = Cli::try_parse_from(["vitals", "worker-health-check"]).unwrap();

        match cli.command {
            Commands::WorkerHealthCheck {
                liveness_file,
                max_age,
                skip_event_loop_liveness,
                skip_ping,
                skip_readiness,
                no_skip_readiness,
                ping_timeout,
                ..
            } => {
                assert_eq!(
                    liveness_file,
                    PathBuf::from(config::DEFAULT_WORKER_LIVENESS_FILE)
                );
                assert_eq!(max_age, 70);
                assert_eq!(ping_timeout, 3);
                assert!(!skip_event_loop_liveness);
                assert!(!skip_ping);
                assert!(!skip_readiness);
                assert!(!no_skip_readiness);
            }
            _ => panic!("expected worker-health-check"),
        }
    }

    #[test]
    fn test_cli_accepts_negative_max_age() {
        let cli =
            Cli::try_parse_from(["vitals", "worker-health-check", "--max-age", "-1"]).unwrap();

        match cli.command {
            Commands::WorkerHealthCheck { max_age, .. } => assert_eq!(max_age, -1),
            _ => panic!("expected worker-health-check"),
        }
    }

    #[test]
    fn test_cli_rejects_conflicting_readiness_flags() {
        let result = Cli::try_parse_from([
            "vitals",
            "worker-health-check",
            "--skip-readiness",
            "--no-skip-readiness",
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parses_beat_health_check() {
        let cli = Cli::try_parse_from([
            "vitals",
            "beat-health-check",
            "--file",
            "/var/run/beat",
            "--max-age",
            "-1",
        ])
        .unwrap();

        match cli.command {
            Commands::BeatHealthCheck { file, max_age } => {
                assert_eq!(file, PathBuf::from("/var/run/beat"));
                assert_eq!(max_age, -1);
            }
            _ => panic!("expected beat-health-check"),
        }
    }
}
