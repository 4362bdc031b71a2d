use anyhow::Result;
use std::path::PathBuf;

use mediasift::config::Config;
use mediasift::logging;
use mediasift::pipeline::{self, StageStatus, StepOrchestrator};
use mediasift::state::StateStore;

#[derive(Debug, Default)]
struct RunnerArgs {
    config_path: Option<PathBuf>,
    state_path: Option<PathBuf>,
    reset: bool,
    trace_signals: bool,
}

fn parse_args() -> RunnerArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut runner = RunnerArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("mediasift {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    runner.config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--state" | "-s" => {
                if i + 1 < args.len() {
                    runner.state_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --state requires a path argument");
                    std::process::exit(1);
                }
            }
            "--reset" => {
                runner.reset = true;
            }
            "--trace-signals" => {
                runner.trace_signals = true;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    runner
}

fn print_help() {
    println!(
        r#"mediasift - Rank and deduplicate media candidates

USAGE:
    mediasift [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --state, -s PATH    Path to the pipeline state document
    --reset             Forget completed stages and cursors before running
    --trace-signals     Log every per-signal scoring failure
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    MEDIASIFT_CONFIG    Path to config file (overrides default location)
    MEDIASIFT_LOG       Log level (trace, debug, info, warn, error)
    MEDIASIFT_LOG_SIGNALS  Set to 1 to behave as --trace-signals

Stages already recorded as complete are skipped. A failing stage stops
the run; re-run to resume from it.

Config file location: $XDG_CONFIG_HOME/mediasift/config.toml"#
    );
}

fn main() -> Result<()> {
    let args = parse_args();

    // Initialize logging (uses journald on Linux, file fallback otherwise)
    let _ = logging::init(Some(Config::config_dir().join("logs")), args.trace_signals);

    let config = match args.config_path {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let state = StateStore::new(args.state_path.unwrap_or_else(|| config.state_path.clone()));
    if args.reset {
        tracing::info!(path = ?state.path(), "Resetting pipeline state");
        state.clear()?;
    }

    let mut stages = pipeline::build_stages(&config)?;
    let orchestrator = StepOrchestrator::new(state);
    let report = orchestrator.run_stages(&mut stages)?;

    for outcome in &report.outcomes {
        let status = match &outcome.status {
            StageStatus::Pending => "pending".to_string(),
            StageStatus::Running => "running".to_string(),
            StageStatus::Skipped => "skipped".to_string(),
            StageStatus::Completed => match outcome.elapsed() {
                Some(elapsed) => format!("done ({}ms)", elapsed.num_milliseconds()),
                None => "done".to_string(),
            },
            StageStatus::Failed(reason) => format!("FAILED: {}", reason),
        };
        println!("{:<12} {}", outcome.name, status);
    }

    if let Some(failure) = report.failure {
        eprintln!("{}", failure);
        std::process::exit(1);
    }

    Ok(())
}
