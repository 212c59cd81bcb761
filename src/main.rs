//! Vitals - liveness and readiness probing for task-queue workers
//!
//! Command-line companion to the `vitals` library. Deliberately thin: health
//! check hooks in orchestrators run with short timeouts, so every command is
//! a single pass with no background machinery.

use std::time::Duration;

use tracing_subscriber::EnvFilter;

use vitals::beacon::{Beacon, Freshness, Staleness, format_age};
use vitals::cli::{Cli, Commands};
use vitals::error::Result;
use vitals::lookout;
use vitals::sonar::RedisRoundtrip;
use vitals::triage::WorkerProbe;

fn main() {
    // a .env file is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();

    let filter = if cli.verbose {
        EnvFilter::new("vitals=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Version => {
            println!("vitals v{}", env!("CARGO_PKG_VERSION"));
        }

        Commands::Completion { shell } => {
            Cli::generate_completion(shell);
        }

        Commands::HealthCheck { endpoint, timeout } => {
            let outcome = lookout::check(&endpoint, Duration::from_secs(timeout));
            match &outcome {
                lookout::HttpStatus::Up { status } => {
                    pass(&format!("UP, response status code: {}", status));
                }
                lookout::HttpStatus::Down { status } => {
                    fail(&format!("DOWN, response status code: {}", status));
                }
                lookout::HttpStatus::Error { detail } => {
                    fail(&format!("DOWN ({})", detail));
                }
            }
            std::process::exit(outcome.exit_code());
        }

        Commands::WorkerHealthCheck {
            liveness_file,
            max_age,
            skip_event_loop_liveness,
            broker,
            worker_name,
            ping_timeout,
            skip_ping,
            readiness_file,
            skip_readiness,
            no_skip_readiness,
        } => {
            let probe = WorkerProbe {
                liveness_file,
                max_age,
                check_event_loop: !skip_event_loop_liveness,
                check_ping: !skip_ping,
                readiness_file,
                check_readiness: no_skip_readiness && !skip_readiness,
            };
            // validate the broker URL up front as a sanity check, even when
            // the ping is skipped; a malformed URL is a setup error, not a
            // failed check
            let roundtrip =
                RedisRoundtrip::new(&broker, &worker_name, Duration::from_secs(ping_timeout))?;

            let report = probe.evaluate(&roundtrip)?;
            for line in &report.passed {
                pass(line);
            }
            if let Some(failure) = &report.failure {
                fail(failure.message());
            }
            std::process::exit(report.exit_code());
        }

        Commands::BeatHealthCheck { file, max_age } => {
            let beacon = Beacon::new(&file);
            match beacon.check(max_age) {
                Freshness::Fresh { age } => {
                    pass(&format!("Last scheduled task: {} ago.", format_age(age)));
                }
                Freshness::Stale(Staleness::Missing) => {
                    fail(&format!(
                        "File '{}' does not exist or is not a file.",
                        file.display()
                    ));
                    std::process::exit(1);
                }
                Freshness::Stale(Staleness::Expired { .. }) => {
                    fail(&format!("File '{}' is older than max-age.", file.display()));
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Print a passing status line (green, stdout); color is advisory only
fn pass(message: &str) {
    println!("\x1b[32m{}\x1b[0m", message);
}

/// Print a failing status line (red, stderr); color is advisory only
fn fail(message: &str) {
    eprintln!("\x1b[31m{}\x1b[0m", message);
}
