//! Headless droid kernel runner.
//!
//! Runs scenarios without graphics for CI and determinism checks.
//!
//! # Usage
//!
//! ```bash
//! # Run the built-in skirmish
//! cargo run -p wz_headless -- run
//!
//! # Run a scenario twice and compare the final hashes
//! cargo run -p wz_headless -- run --scenario duel.ron --verify-determinism
//!
//! # Play a recorded replay back
//! cargo run -p wz_headless -- verify --scenario duel.ron --replay duel.replay
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wz_headless::{run_scenario, verify_replay, RunOptions, Scenario, ScenarioError};

#[derive(Parser)]
#[command(name = "wz_headless")]
#[command(about = "Headless droid kernel runner for CI and determinism checks")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and print a JSON summary
    Run {
        /// Scenario file to load (built-in skirmish if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Override the scenario seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the number of ticks
        #[arg(long)]
        ticks: Option<u64>,

        /// Run twice and compare final state hashes
        #[arg(long)]
        verify_determinism: bool,

        /// Write a replay of the run
        #[arg(long)]
        replay_out: Option<PathBuf>,
    },

    /// Play a replay back and check every recorded hash
    Verify {
        /// Scenario the replay was recorded from (built-in skirmish if omitted)
        #[arg(short, long)]
        scenario: Option<PathBuf>,

        /// Replay file
        #[arg(short, long)]
        replay: PathBuf,
    },
}

fn load(path: Option<&PathBuf>) -> Result<Scenario, ScenarioError> {
    match path {
        Some(path) => Scenario::load(path),
        None => Ok(Scenario::skirmish()),
    }
}

fn cmd_run(
    scenario: Option<PathBuf>,
    seed: Option<u64>,
    ticks: Option<u64>,
    verify_determinism: bool,
    replay_out: Option<PathBuf>,
) -> Result<bool, ScenarioError> {
    let scenario = load(scenario.as_ref())?;
    let options = RunOptions {
        seed,
        ticks,
        verify_determinism,
        replay_out,
    };
    let outcome = run_scenario(&scenario, &options)?;
    match serde_json::to_string_pretty(&outcome.summary) {
        Ok(json) => println!("{json}"),
        Err(e) => error!(error = %e, "failed to encode summary"),
    }
    Ok(outcome.summary.deterministic != Some(false))
}

fn cmd_verify(scenario: Option<PathBuf>, replay: PathBuf) -> Result<bool, ScenarioError> {
    let scenario = load(scenario.as_ref())?;
    let hash = verify_replay(&scenario, &replay)?;
    println!("{}", serde_json::json!({ "verified": true, "final_state_hash": hash }));
    Ok(true)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the summary.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Some(Commands::Run {
            scenario,
            seed,
            ticks,
            verify_determinism,
            replay_out,
        }) => cmd_run(scenario, seed, ticks, verify_determinism, replay_out),
        Some(Commands::Verify { scenario, replay }) => cmd_verify(scenario, replay),
        None => cmd_run(None, None, None, false, None),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            error!("determinism check failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "run failed");
            ExitCode::FAILURE
        }
    }
}
