//! Simulation facade.
//!
//! [`Simulation`] pairs a [`World`] with its [`Environment`] and runs the
//! per-tick pipeline. It is the surface offered to UI, network and script
//! layers: spawning, issuing orders, spatial queries, hashing and
//! persistence.
//!
//! # Determinism
//!
//! - Droids are updated in ascending id order, structures after droids.
//! - Randomness comes only from the world's seeded generator.
//! - Positions are fixed-point.
//! - Changes to other droids requested during a droid's turn are applied
//!   right after that turn, in request order.
//!
//! # Example
//!
//! ```
//! use wz_core::prelude::*;
//!
//! let mut sim = Simulation::new(7, Tuning::default(), Environment::flat(32, 32));
//! let droid = sim.spawn_droid(0, &DroidTemplate::default(), TilePos::new(4, 4).center());
//! let outcome = sim
//!     .issue_order(droid, &OrderRequest::loc(OrderKind::Move, TilePos::new(10, 4).center()), false)
//!     .unwrap();
//! assert!(outcome.is_ok());
//! sim.tick();
//! assert_eq!(sim.current_order_name(droid).unwrap(), "DORDER_MOVE");
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::action::update::action_update_droid;
use crate::action::vtol::update_rearm_pad;
use crate::config::Tuning;
use crate::droid::{Droid, DroidTemplate};
use crate::environment::Environment;
use crate::error::{Result, SimError};
use crate::math::Vec2Fixed;
use crate::movement::{move_shuffle_droid, move_update_droid};
use crate::object::{ObjectId, PlayerId};
use crate::order::update::{order_health_check, order_update_droid};
use crate::order::{order_droid_request, OrderOutcome, OrderRequest};
use crate::repair::update_repair_facility;
use crate::secondary::{secondary_check_damage_level, secondary_set_state, QueuedSecondary, SecondaryKind, SecondaryState};
use crate::structure::{Feature, FeatureKind, Structure, StructureKind, StructureStatus, StructureTemplate};
use crate::world::{DeferredCommand, TickEvent, World};

/// Everything that happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickEvents {
    /// Tick these events belong to.
    pub tick: u64,
    /// Events in the order they occurred.
    pub events: Vec<TickEvent>,
}

impl TickEvents {
    /// Objects marked dead this tick.
    #[must_use]
    pub fn destroyed(&self) -> Vec<ObjectId> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TickEvent::Destroyed { id } => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// True if nothing happened.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Serialised form of a simulation. The environment is not part of it.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    world: World,
    queued_secondaries: Vec<QueuedSecondary>,
}

/// The droid kernel with its collaborators.
#[derive(Debug)]
pub struct Simulation {
    world: World,
    env: Environment,
    queued_secondaries: Vec<QueuedSecondary>,
}

impl Simulation {
    /// Create an empty simulation sized to the environment's map.
    #[must_use]
    pub fn new(seed: u64, tuning: Tuning, env: Environment) -> Self {
        let world = World::new(seed, tuning, env.map_size());
        Self::from_parts(world, env)
    }

    /// Wrap an existing world.
    #[must_use]
    pub fn from_parts(world: World, env: Environment) -> Self {
        Self {
            world,
            env,
            queued_secondaries: Vec::new(),
        }
    }

    /// Ticks completed so far.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.world.tick
    }

    /// The simulated objects.
    #[must_use]
    pub const fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access for scenario setup.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The collaborators.
    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Create a droid for `player` at `pos`.
    pub fn spawn_droid(&mut self, player: PlayerId, template: &DroidTemplate, pos: Vec2Fixed) -> ObjectId {
        let id = self.world.allocate_id();
        debug!(droid = id.0, player, category = ?template.category, "droid spawned");
        self.world.insert_droid(Droid::new(id, player, template, pos))
    }

    /// Create a structure for `player` centred on `pos`.
    pub fn spawn_structure(
        &mut self,
        player: PlayerId,
        template: &StructureTemplate,
        pos: Vec2Fixed,
        status: StructureStatus,
    ) -> ObjectId {
        let id = self.world.allocate_id();
        debug!(structure = id.0, player, kind = ?template.kind, "structure spawned");
        self.world
            .insert_structure(Structure::new(id, player, template, pos, status))
    }

    /// Create a feature at `pos`.
    pub fn spawn_feature(&mut self, kind: FeatureKind, pos: Vec2Fixed) -> ObjectId {
        let id = self.world.allocate_id();
        self.world.insert_feature(Feature::new(id, kind, pos))
    }

    /// Mark an object dead. It stays visible as dead for one tick.
    pub fn destroy_object(&mut self, id: ObjectId) -> Result<()> {
        if self.world.object(id).is_none() {
            return Err(SimError::ObjectNotFound(id.0));
        }
        self.world.destroy(id);
        Ok(())
    }

    fn live_droid(&self, id: ObjectId) -> Result<()> {
        match self.world.droid(id) {
            Some(d) if d.died.is_none() => Ok(()),
            _ => Err(SimError::DroidNotFound(id.0)),
        }
    }

    /// Give a droid an order, now or at the back of its queue.
    ///
    /// A refused order is not an error; it comes back as
    /// [`OrderOutcome::Rejected`] and leaves the droid unchanged.
    pub fn issue_order(&mut self, droid: ObjectId, request: &OrderRequest, queue: bool) -> Result<OrderOutcome> {
        self.live_droid(droid)?;
        let env = &mut self.env;
        let outcome = self
            .world
            .with_droid(droid, |world, d| order_droid_request(world, env, d, request, queue))
            .ok_or(SimError::DroidNotFound(droid.0))?;
        if !outcome.is_ok() {
            debug!(droid = droid.0, kind = request.kind.name(), ?outcome, "order rejected");
        }
        Ok(outcome)
    }

    /// Change a secondary toggle.
    ///
    /// With `queue` the change is buffered and applied at the start of the
    /// next tick. Returns whether the value was (or will be) applied.
    pub fn issue_secondary_order(
        &mut self,
        droid: ObjectId,
        kind: SecondaryKind,
        state: SecondaryState,
        queue: bool,
    ) -> Result<bool> {
        self.live_droid(droid)?;
        if queue {
            if !state.fits(kind) {
                return Ok(false);
            }
            self.queued_secondaries.push(QueuedSecondary { droid, kind, state });
            return Ok(true);
        }
        let env = &mut self.env;
        self.world
            .with_droid(droid, |world, d| secondary_set_state(world, env, d, kind, state))
            .ok_or(SimError::DroidNotFound(droid.0))
    }

    /// Diagnostic name of a droid's current order, e.g. `DORDER_MOVE`.
    pub fn current_order_name(&self, droid: ObjectId) -> Result<&'static str> {
        self.world
            .droid(droid)
            .map(|d| d.order.kind().name())
            .ok_or(SimError::DroidNotFound(droid.0))
    }

    /// Objects whose grid coverage touches the circle, sorted by id.
    ///
    /// The answer is coarse: callers filter by true distance.
    #[must_use]
    pub fn query_near(&self, x: i32, y: i32, radius: i32) -> Vec<ObjectId> {
        self.world.grid.query(Vec2Fixed::from_ints(x, y), radius)
    }

    /// Advance the simulation by one tick.
    ///
    /// # Order of work
    ///
    /// 1. Queued secondary orders are applied.
    /// 2. Each live droid, in id order, runs its health checks and then its
    ///    order, action and movement updates.
    /// 3. Repair facilities and rearm pads run; idle gates close.
    /// 4. Objects marked dead before this tick are purged.
    ///
    /// Events raised between ticks (for instance by
    /// [`Simulation::destroy_object`]) are reported with the next tick.
    pub fn tick(&mut self) -> TickEvents {
        self.world.tick += 1;
        self.world.time_ms += u64::from(self.world.tuning.tick_ms);

        self.apply_queued_secondaries();

        for id in self.world.droid_ids() {
            self.update_droid(id);
            self.apply_deferred();
        }

        for id in self.world.structure_ids() {
            let kind = self.world.structure(id).filter(|s| s.died.is_none()).map(|s| s.kind);
            match kind {
                Some(StructureKind::RepairFacility) => update_repair_facility(&mut self.world, &mut self.env, id),
                Some(StructureKind::RearmPad) => update_rearm_pad(&mut self.world, &mut self.env, id),
                _ => {}
            }
            self.apply_deferred();
        }
        self.world.close_idle_gates();

        self.world.purge_dead();
        self.world.grid.garbage_collect_step();

        #[cfg(feature = "debug-validation")]
        self.validate();

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            debug!(tick = self.world.tick, state_hash = hash, "simulation state hash");
        }

        TickEvents {
            tick: self.world.tick,
            events: std::mem::take(&mut self.world.events),
        }
    }

    fn apply_queued_secondaries(&mut self) {
        for q in std::mem::take(&mut self.queued_secondaries) {
            let env = &mut self.env;
            let applied = self
                .world
                .with_droid(q.droid, |world, d| {
                    d.died.is_none() && secondary_set_state(world, env, d, q.kind, q.state)
                })
                .unwrap_or(false);
            trace!(droid = q.droid.0, kind = ?q.kind, applied, "queued secondary applied");
        }
    }

    fn update_droid(&mut self, id: ObjectId) {
        let env = &mut self.env;
        self.world.with_droid(id, |world, droid| {
            if droid.died.is_some() {
                return;
            }
            order_health_check(world, env, droid);
            secondary_check_damage_level(world, env, droid);
            order_update_droid(world, env, droid);
            if droid.died.is_none() {
                action_update_droid(world, env, droid);
            }
            if droid.died.is_none() {
                move_update_droid(world, env, droid);
            }
        });
        self.world.reindex_droid(id);
    }

    fn apply_deferred(&mut self) {
        for command in self.world.take_deferred() {
            match command {
                DeferredCommand::Shuffle { droid, vec } => {
                    let env = &mut self.env;
                    self.world
                        .with_droid(droid, |world, d| move_shuffle_droid(world, env, d, vec));
                }
                DeferredCommand::Destroy(id) => {
                    self.world.destroy(id);
                }
                DeferredCommand::Damage {
                    target,
                    damage,
                    by,
                    electronic,
                } => self.world.apply_damage(target, damage, by, electronic),
            }
        }
    }

    #[cfg(feature = "debug-validation")]
    fn validate(&self) {
        for d in self.world.droids() {
            debug_assert!(self.world.grid.contains(d.id), "droid {} missing from grid", d.id.0);
            debug_assert!(d.body <= d.original_body, "droid {} overhealed", d.id.0);
        }
        for s in self.world.structures() {
            debug_assert!(self.world.grid.contains(s.id), "structure {} missing from grid", s.id.0);
        }
    }

    /// Hash of the simulated state.
    ///
    /// Two simulations fed the same seed, setup and commands hash equal
    /// after every tick.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.world.tick.hash(&mut hasher);
        self.world.time_ms.hash(&mut hasher);
        self.world.rng.word_pos().hash(&mut hasher);

        let (droids, structures, features) = self.world.counts();
        droids.hash(&mut hasher);
        for d in self.world.droids() {
            d.id.hash(&mut hasher);
            d.player.hash(&mut hasher);
            d.pos.hash(&mut hasher);
            d.rot.direction.hash(&mut hasher);
            d.body.hash(&mut hasher);
            d.order.kind().hash(&mut hasher);
            d.order.target().hash(&mut hasher);
            d.order_queue.len().hash(&mut hasher);
            d.action.kind.hash(&mut hasher);
            d.action.target().hash(&mut hasher);
            d.movement.status.hash(&mut hasher);
            d.movement.speed.hash(&mut hasher);
            d.secondary.hash(&mut hasher);
            d.died.hash(&mut hasher);
            for w in &d.weapons {
                w.used_ammo.hash(&mut hasher);
                w.last_fired.hash(&mut hasher);
            }
        }
        structures.hash(&mut hasher);
        for s in self.world.structures() {
            s.id.hash(&mut hasher);
            s.player.hash(&mut hasher);
            s.status.hash(&mut hasher);
            s.body.hash(&mut hasher);
            s.build_points.hash(&mut hasher);
            s.died.hash(&mut hasher);
        }
        features.hash(&mut hasher);
        for f in self.world.features() {
            f.id.hash(&mut hasher);
            f.body.hash(&mut hasher);
            f.died.hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Serialise the world and pending secondary orders.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidState`] if encoding fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let snapshot = SnapshotRef {
            world: &self.world,
            queued_secondaries: &self.queued_secondaries,
        };
        bincode::serialize(&snapshot)
            .map_err(|e| SimError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Restore a simulation from [`Simulation::serialize`] output, pairing it
    /// with a fresh environment.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InvalidState`] if decoding fails.
    pub fn deserialize(data: &[u8], env: Environment) -> Result<Self> {
        let snapshot: Snapshot = bincode::deserialize(data)
            .map_err(|e| SimError::InvalidState(format!("Failed to deserialize simulation: {e}")))?;
        Ok(Self {
            world: snapshot.world,
            env,
            queued_secondaries: snapshot.queued_secondaries,
        })
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    world: &'a World,
    queued_secondaries: &'a Vec<QueuedSecondary>,
}
