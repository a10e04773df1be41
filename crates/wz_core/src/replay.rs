//! Replay recording and verification.
//!
//! A replay stores the serialised starting world and the stream of
//! commands issued to it, stamped with the tick at which they were given.
//! Feeding the same commands to the restored world must reproduce the
//! recorded state hashes; [`ReplayPlayer::verify`] reports the first tick
//! where it does not.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::environment::Environment;
use crate::error::{Result, SimError};
use crate::object::ObjectId;
use crate::order::OrderRequest;
use crate::secondary::{SecondaryKind, SecondaryState};
use crate::simulation::Simulation;

/// An input to the simulation that a replay must reproduce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimCommand {
    /// A primary order.
    Order {
        /// Droid addressed.
        droid: ObjectId,
        /// What it was told.
        request: OrderRequest,
        /// Appended to the queue instead of replacing the order.
        queue: bool,
    },
    /// A secondary toggle change.
    Secondary {
        /// Droid addressed.
        droid: ObjectId,
        /// Toggle.
        kind: SecondaryKind,
        /// New value.
        state: SecondaryState,
        /// Buffered until the next tick.
        queue: bool,
    },
    /// An object killed from outside the kernel.
    Destroy(ObjectId),
}

impl SimCommand {
    /// Apply the command to a simulation.
    pub fn apply(&self, sim: &mut Simulation) -> Result<()> {
        match self {
            Self::Order { droid, request, queue } => sim.issue_order(*droid, request, *queue).map(|_| ()),
            Self::Secondary {
                droid,
                kind,
                state,
                queue,
            } => sim.issue_secondary_order(*droid, *kind, *state, *queue).map(|_| ()),
            Self::Destroy(id) => sim.destroy_object(*id),
        }
    }
}

/// A single command record for replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayCommand {
    /// Ticks completed when the command was issued.
    pub tick: u64,
    /// The command.
    pub command: SimCommand,
}

/// Replay file format version for compatibility.
pub const REPLAY_VERSION: u32 = 1;

/// Complete replay data structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// Random seed used for the game.
    pub seed: u64,
    /// Serialised starting simulation.
    pub initial_state: Vec<u8>,
    /// Commands in the order they were issued.
    pub commands: Vec<ReplayCommand>,
    /// `(tick, state hash)` pairs recorded along the way.
    pub checkpoints: Vec<(u64, u64)>,
    /// Last tick of the recording.
    pub final_tick: u64,
    /// State hash after the last tick.
    pub final_hash: u64,
}

impl Replay {
    /// Start a recording from the current state of `sim`.
    ///
    /// # Errors
    /// Returns an error if the simulation cannot be serialised.
    pub fn new(seed: u64, sim: &Simulation) -> Result<Self> {
        Ok(Self {
            version: REPLAY_VERSION,
            seed,
            initial_state: sim.serialize()?,
            commands: Vec::new(),
            checkpoints: Vec::new(),
            final_tick: sim.get_tick(),
            final_hash: sim.state_hash(),
        })
    }

    /// Record a command issued after `tick` ticks.
    pub fn record(&mut self, tick: u64, command: SimCommand) {
        self.commands.push(ReplayCommand { tick, command });
    }

    /// Record the state hash after `tick` ticks.
    pub fn checkpoint(&mut self, tick: u64, hash: u64) {
        self.checkpoints.push((tick, hash));
    }

    /// Close the recording.
    pub fn finalize(&mut self, final_tick: u64, final_hash: u64) {
        self.final_tick = final_tick;
        self.final_hash = final_hash;
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    /// Encode the replay.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| SimError::InvalidState(format!("Failed to serialize replay: {e}")))
    }

    /// Decode a replay produced by [`Replay::to_bytes`].
    ///
    /// # Errors
    /// Returns an error on malformed input or a version mismatch.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let replay: Self = bincode::deserialize(bytes)
            .map_err(|e| SimError::InvalidState(format!("Failed to deserialize replay: {e}")))?;
        if replay.version != REPLAY_VERSION {
            return Err(SimError::InvalidState(format!(
                "Replay version mismatch: expected {REPLAY_VERSION}, got {}",
                replay.version
            )));
        }
        Ok(replay)
    }
}

/// Plays a replay back against a restored simulation.
#[derive(Debug)]
pub struct ReplayPlayer {
    replay: Replay,
    simulation: Simulation,
    command_index: usize,
    checkpoint_index: usize,
}

impl ReplayPlayer {
    /// Restore the starting state, paired with `env`.
    ///
    /// # Errors
    /// Returns an error if the initial state cannot be restored.
    pub fn new(replay: Replay, env: Environment) -> Result<Self> {
        let simulation = Simulation::deserialize(&replay.initial_state, env)?;
        Ok(Self {
            replay,
            simulation,
            command_index: 0,
            checkpoint_index: 0,
        })
    }

    /// Apply the commands due now and advance one tick.
    ///
    /// Returns `Ok(true)` while there are more ticks to play.
    ///
    /// # Errors
    /// Returns [`SimError::DesyncDetected`] if a recorded checkpoint does not
    /// match.
    pub fn advance(&mut self) -> Result<bool> {
        let final_tick = self.replay.final_tick;
        if self.simulation.get_tick() >= final_tick {
            return Ok(false);
        }
        let now = self.simulation.get_tick();
        while let Some(cmd) = self.replay.commands.get(self.command_index) {
            if cmd.tick > now {
                break;
            }
            if let Err(e) = cmd.command.apply(&mut self.simulation) {
                // The recording saw the same failure.
                debug!(tick = now, error = %e, "replayed command failed");
            }
            self.command_index += 1;
        }
        self.simulation.tick();
        self.check_checkpoints()?;
        Ok(self.simulation.get_tick() < final_tick)
    }

    fn check_checkpoints(&mut self) -> Result<()> {
        let tick = self.simulation.get_tick();
        while let Some(&(at, expected)) = self.replay.checkpoints.get(self.checkpoint_index) {
            if at > tick {
                break;
            }
            self.checkpoint_index += 1;
            if at < tick {
                continue;
            }
            let local = self.simulation.state_hash();
            if local != expected {
                warn!(tick, local, expected, "replay desync");
                return Err(SimError::DesyncDetected {
                    tick,
                    local_hash: local,
                    remote_hash: expected,
                });
            }
        }
        Ok(())
    }

    /// Play to the end and compare the final hash.
    ///
    /// # Errors
    /// Returns [`SimError::DesyncDetected`] at the first mismatching
    /// checkpoint or at the end.
    pub fn verify(mut self) -> Result<Simulation> {
        while self.advance()? {}
        let local = self.simulation.state_hash();
        if local != self.replay.final_hash {
            return Err(SimError::DesyncDetected {
                tick: self.simulation.get_tick(),
                local_hash: local,
                remote_hash: self.replay.final_hash,
            });
        }
        Ok(self.simulation)
    }

    /// Ticks played so far.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.simulation.get_tick()
    }

    /// The simulation being played.
    #[must_use]
    pub const fn simulation(&self) -> &Simulation {
        &self.simulation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::droid::DroidTemplate;
    use crate::math::TilePos;
    use crate::order::OrderKind;

    fn recorded() -> Replay {
        let mut sim = Simulation::new(3, Tuning::default(), Environment::flat(24, 24));
        let a = sim.spawn_droid(0, &DroidTemplate::default(), TilePos::new(2, 2).center());
        let b = sim.spawn_droid(0, &DroidTemplate::default(), TilePos::new(3, 2).center());
        let mut replay = Replay::new(3, &sim).unwrap();

        for tick in 0..40u64 {
            if tick == 5 {
                let command = SimCommand::Order {
                    droid: a,
                    request: OrderRequest::loc(OrderKind::Move, TilePos::new(15, 10).center()),
                    queue: false,
                };
                command.apply(&mut sim).unwrap();
                replay.record(sim.get_tick(), command);
            }
            if tick == 12 {
                let command = SimCommand::Order {
                    droid: b,
                    request: OrderRequest::loc(OrderKind::Scout, TilePos::new(10, 18).center()),
                    queue: false,
                };
                command.apply(&mut sim).unwrap();
                replay.record(sim.get_tick(), command);
            }
            sim.tick();
            if sim.get_tick() % 10 == 0 {
                replay.checkpoint(sim.get_tick(), sim.state_hash());
            }
        }
        replay.finalize(sim.get_tick(), sim.state_hash());
        replay
    }

    #[test]
    fn test_replay_records_commands() {
        let replay = recorded();
        assert_eq!(replay.command_count(), 2);
        assert_eq!(replay.commands[0].tick, 5);
        assert_eq!(replay.final_tick, 40);
        assert_eq!(replay.checkpoints.len(), 4);
    }

    #[test]
    fn test_replay_verifies() {
        let replay = recorded();
        let sim = ReplayPlayer::new(replay.clone(), Environment::flat(24, 24))
            .unwrap()
            .verify()
            .unwrap();
        assert_eq!(sim.state_hash(), replay.final_hash);
    }

    #[test]
    fn test_tampered_replay_desyncs() {
        let mut replay = recorded();
        replay.commands.remove(1);
        let err = ReplayPlayer::new(replay, Environment::flat(24, 24))
            .unwrap()
            .verify();
        assert!(matches!(err, Err(SimError::DesyncDetected { tick: 20, .. })));
    }

    #[test]
    fn test_bytes_round_trip() {
        let replay = recorded();
        let bytes = replay.to_bytes().unwrap();
        let back = Replay::from_bytes(&bytes).unwrap();
        assert_eq!(back.commands, replay.commands);
        assert_eq!(back.final_hash, replay.final_hash);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut replay = recorded();
        replay.version = 99;
        let bytes = replay.to_bytes().unwrap();
        assert!(matches!(Replay::from_bytes(&bytes), Err(SimError::InvalidState(_))));
    }
}
