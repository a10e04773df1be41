//! Headless scenario runner for CI verification and determinism checks.
//!
//! Loads a RON [`Scenario`], runs it through the kernel without any
//! rendering and prints a JSON [`RunSummary`]. Runs can be recorded to a
//! replay file and verified later against the same scenario.
//!
//! # Output
//!
//! - **stdout**: the JSON summary
//! - **stderr**: logs (`RUST_LOG` controls the filter)
//!
//! # Example
//!
//! ```bash
//! # Run the built-in skirmish and check it twice
//! cargo run -p wz_headless -- run --verify-determinism
//!
//! # Run a scenario file and record a replay
//! cargo run -p wz_headless -- run --scenario duel.ron --replay-out duel.replay
//!
//! # Verify the replay
//! cargo run -p wz_headless -- verify --scenario duel.ron --replay duel.replay
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod metrics;
pub mod runner;
pub mod scenario;

pub use metrics::{EventCounts, PlayerSummary, RunSummary};
pub use runner::{run_scenario, verify_replay, write_replay, RunOptions, RunOutcome};
pub use scenario::{Scenario, ScenarioError};
