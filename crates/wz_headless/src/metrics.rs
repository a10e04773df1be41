//! Run summaries.
//!
//! Tallies the tick events of a run and the final world into a
//! serialisable report for CI logs and determinism checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use wz_core::simulation::{Simulation, TickEvents};
use wz_core::world::TickEvent;

/// Per-player state at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    /// Droids still alive.
    pub droids: usize,
    /// Structures still standing.
    pub structures: usize,
    /// Sum of droid body points.
    pub body: u64,
}

/// Event tallies over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCounts {
    /// Objects destroyed.
    pub destroyed: u64,
    /// Weapon discharges.
    pub shots: u64,
    /// Droids fully repaired.
    pub repaired: u64,
    /// VTOLs fully rearmed.
    pub rearmed: u64,
    /// Structures completed.
    pub built: u64,
    /// Droids recycled.
    pub recycled: u64,
    /// Everything else.
    pub other: u64,
}

impl EventCounts {
    /// Count one tick's events.
    pub fn record(&mut self, events: &TickEvents) {
        for event in &events.events {
            match event {
                TickEvent::Destroyed { .. } | TickEvent::Squished { .. } => self.destroyed += 1,
                TickEvent::ShotFired { .. } => self.shots += 1,
                TickEvent::Repaired { .. } => self.repaired += 1,
                TickEvent::Rearmed { .. } => self.rearmed += 1,
                TickEvent::StructureBuilt { .. } => self.built += 1,
                TickEvent::Recycled { .. } => self.recycled += 1,
                _ => self.other += 1,
            }
        }
    }
}

/// Final report of a headless run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scenario name.
    pub scenario: String,
    /// Random seed used.
    pub seed: u64,
    /// Ticks simulated.
    pub ticks: u64,
    /// Game time at the end, in milliseconds.
    pub time_ms: u64,
    /// Final simulation state hash (for determinism validation).
    pub final_state_hash: u64,
    /// Scripted commands issued.
    pub commands_issued: usize,
    /// Scripted commands addressed to droids that were already gone.
    pub commands_failed: usize,
    /// Event tallies.
    pub events: EventCounts,
    /// Per-player final state.
    pub players: BTreeMap<u8, PlayerSummary>,
    /// Number of droids per current order name.
    pub orders: BTreeMap<String, usize>,
    /// Whether a second run reproduced the final hash, if checked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deterministic: Option<bool>,
}

impl RunSummary {
    /// Fill the end-of-run fields from the simulation.
    pub fn capture(&mut self, sim: &Simulation) {
        let world = sim.world();
        self.ticks = sim.get_tick();
        self.time_ms = world.time_ms;
        self.final_state_hash = sim.state_hash();
        self.players.clear();
        self.orders.clear();
        for d in world.droids().filter(|d| d.died.is_none()) {
            let player = self.players.entry(d.player).or_default();
            player.droids += 1;
            player.body += u64::from(d.body);
            *self.orders.entry(d.order.kind().name().to_string()).or_default() += 1;
        }
        for s in world.structures().filter(|s| s.died.is_none()) {
            self.players.entry(s.player).or_default().structures += 1;
        }
    }
}
