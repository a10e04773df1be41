//! Headless scenario runner.
//!
//! Instantiates a scenario, feeds it its scripted commands at the right
//! ticks and records everything into a [`RunSummary`] and, optionally, a
//! [`Replay`] that [`verify_replay`] can check later.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use wz_core::replay::{Replay, ReplayPlayer};
use wz_core::simulation::Simulation;

use crate::metrics::{EventCounts, RunSummary};
use crate::scenario::{Scenario, ScenarioError};

/// Ticks between replay checkpoints.
pub const CHECKPOINT_INTERVAL: u64 = 50;

/// Options for a headless run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Override the scenario seed.
    pub seed: Option<u64>,
    /// Override the scenario length.
    pub ticks: Option<u64>,
    /// Run a second time and compare the final hashes.
    pub verify_determinism: bool,
    /// Write the recorded replay here.
    pub replay_out: Option<PathBuf>,
}

/// Result of one run.
#[derive(Debug)]
pub struct RunOutcome {
    /// Report of the run.
    pub summary: RunSummary,
    /// Recording of the run.
    pub replay: Replay,
    /// Final state.
    pub simulation: Simulation,
}

/// Run a scenario to completion.
pub fn run_scenario(scenario: &Scenario, options: &RunOptions) -> Result<RunOutcome, ScenarioError> {
    let seed = options.seed.unwrap_or(scenario.seed);
    let ticks = options.ticks.unwrap_or(scenario.ticks);
    info!(scenario = %scenario.name, seed, ticks, "starting run");

    let mut outcome = run_once(scenario, seed, ticks)?;
    if options.verify_determinism {
        let second = run_once(scenario, seed, ticks)?;
        let same = second.summary.final_state_hash == outcome.summary.final_state_hash;
        if same {
            info!(hash = outcome.summary.final_state_hash, "determinism verified");
        } else {
            warn!(
                first = outcome.summary.final_state_hash,
                second = second.summary.final_state_hash,
                "runs diverged"
            );
        }
        outcome.summary.deterministic = Some(same);
    }

    if let Some(path) = &options.replay_out {
        write_replay(&outcome.replay, path)?;
    }

    info!(
        ticks = outcome.summary.ticks,
        hash = outcome.summary.final_state_hash,
        destroyed = outcome.summary.events.destroyed,
        "run finished"
    );
    Ok(outcome)
}

fn run_once(scenario: &Scenario, seed: u64, ticks: u64) -> Result<RunOutcome, ScenarioError> {
    let (mut sim, spawned) = scenario.instantiate(seed)?;
    let mut replay = Replay::new(seed, &sim)?;
    let mut summary = RunSummary {
        scenario: scenario.name.clone(),
        seed,
        ..RunSummary::default()
    };
    let mut events = EventCounts::default();

    let schedule = scenario.schedule();
    let mut next = 0;
    while sim.get_tick() < ticks {
        let now = sim.get_tick();
        while let Some(scripted) = schedule.get(next).filter(|c| c.tick <= now) {
            next += 1;
            let command = scripted.resolve(&spawned)?;
            summary.commands_issued += 1;
            match command.apply(&mut sim) {
                Ok(()) => {}
                Err(e) => {
                    summary.commands_failed += 1;
                    debug!(tick = now, error = %e, "scripted command failed");
                }
            }
            replay.record(now, command);
        }

        let tick_events = sim.tick();
        events.record(&tick_events);
        if sim.get_tick() % CHECKPOINT_INTERVAL == 0 {
            replay.checkpoint(sim.get_tick(), sim.state_hash());
        }
    }
    replay.finalize(sim.get_tick(), sim.state_hash());

    summary.events = events;
    summary.capture(&sim);
    Ok(RunOutcome {
        summary,
        replay,
        simulation: sim,
    })
}

/// Save a replay.
pub fn write_replay(replay: &Replay, path: &Path) -> Result<(), ScenarioError> {
    let bytes = replay.to_bytes()?;
    std::fs::write(path, bytes)?;
    info!(path = %path.display(), commands = replay.command_count(), "replay written");
    Ok(())
}

/// Load a replay and play it back against the scenario's environment.
///
/// Returns the final state hash.
pub fn verify_replay(scenario: &Scenario, path: &Path) -> Result<u64, ScenarioError> {
    let bytes = std::fs::read(path)?;
    let replay = Replay::from_bytes(&bytes)?;
    info!(
        path = %path.display(),
        commands = replay.command_count(),
        ticks = replay.final_tick,
        "verifying replay"
    );
    let sim = ReplayPlayer::new(replay, scenario.environment())?.verify()?;
    let hash = sim.state_hash();
    info!(hash, "replay verified");
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short() -> Scenario {
        Scenario {
            ticks: 120,
            ..Scenario::skirmish()
        }
    }

    #[test]
    fn test_run_reaches_requested_tick() {
        let outcome = run_scenario(&short(), &RunOptions::default()).unwrap();
        assert_eq!(outcome.summary.ticks, 120);
        assert_eq!(outcome.summary.time_ms, 12_000);
        assert_eq!(outcome.summary.commands_issued, 10);
        assert_eq!(outcome.summary.commands_failed, 0);
        assert_eq!(outcome.replay.command_count(), 10);
        assert_eq!(outcome.summary.deterministic, None);
    }

    #[test]
    fn test_ticks_override() {
        let options = RunOptions {
            ticks: Some(30),
            ..RunOptions::default()
        };
        let outcome = run_scenario(&short(), &options).unwrap();
        assert_eq!(outcome.summary.ticks, 30);
    }

    #[test]
    fn test_verify_determinism_flag() {
        let options = RunOptions {
            verify_determinism: true,
            ..RunOptions::default()
        };
        let outcome = run_scenario(&short(), &options).unwrap();
        assert_eq!(outcome.summary.deterministic, Some(true));
    }

    #[test]
    fn test_replay_written_and_verified() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.replay");
        let options = RunOptions {
            replay_out: Some(path.clone()),
            ..RunOptions::default()
        };
        let scenario = short();
        let outcome = run_scenario(&scenario, &options).unwrap();
        let hash = verify_replay(&scenario, &path).unwrap();
        assert_eq!(hash, outcome.summary.final_state_hash);
    }

    #[test]
    fn test_corrupt_replay_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.replay");
        std::fs::write(&path, b"not a replay").unwrap();
        assert!(matches!(
            verify_replay(&short(), &path),
            Err(ScenarioError::Simulation(_))
        ));
    }
}
