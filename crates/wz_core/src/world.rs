//! World context.
//!
//! The [`World`] owns every droid, structure and feature, the spatial grid,
//! the shared random generator and per-player bookkeeping. It is passed by
//! reference into every order, action and movement update.
//!
//! # Object lifetime
//!
//! Objects are never dropped mid-tick. [`World::destroy`] marks an object
//! dead with the current tick; the next tick's order updates observe the
//! marker and drop references to it, and [`World::purge_dead`] removes it
//! from storage and from the grid at the end of that tick.
//!
//! # Updating a droid
//!
//! A droid being updated is taken out of storage by [`World::with_droid`]
//! for the duration of its turn, so it can be borrowed mutably next to the
//! rest of the world. Changes to *other* droids that cannot wait are queued
//! with [`World::defer`] and applied after the turn.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::Tuning;
use crate::droid::{Droid, PropulsionKind};
use crate::environment::{Terrain, TileBlocking};
use crate::grid::SpatialGrid;
use crate::math::{option_vec_serde, TilePos, Vec2Fixed, TILE_UNITS};
use crate::object::{ObjectId, ObjectRef, PlayerId};
use crate::rng::DeterministicRng;
use crate::structure::{Feature, FeatureKind, Structure, StructureFunction, StructureKind};

/// How long a friendly gate stays open after the last request, in ms.
const GATE_OPEN_MS: u64 = 1000;

/// Something that happened during a tick, reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickEvent {
    /// An object was marked dead.
    Destroyed {
        /// Object that died.
        id: ObjectId,
    },
    /// A person was run over.
    Squished {
        /// Person that died.
        victim: ObjectId,
        /// Vehicle that ran it over.
        by: ObjectId,
    },
    /// A droid was recycled at a factory or repair facility.
    Recycled {
        /// Droid removed.
        droid: ObjectId,
        /// Structure it was recycled at.
        at: ObjectId,
    },
    /// A droid boarded a transporter and left the map.
    Embarked {
        /// Droid removed.
        droid: ObjectId,
        /// Transporter it boarded.
        transporter: ObjectId,
    },
    /// An artifact was picked up.
    ArtifactRecovered {
        /// Artifact feature.
        feature: ObjectId,
        /// Player who gets the technology.
        player: PlayerId,
    },
    /// A structure finished construction.
    StructureBuilt {
        /// Structure completed.
        structure: ObjectId,
        /// Droid that placed the last points.
        by: ObjectId,
    },
    /// A weapon was discharged.
    ShotFired {
        /// Firing droid.
        firer: ObjectId,
        /// Weapon slot.
        mount: usize,
        /// Object aimed at.
        target: ObjectId,
    },
    /// Electronic warfare took over a structure.
    TakenOver {
        /// Structure that changed hands.
        structure: ObjectId,
        /// New owner.
        player: PlayerId,
    },
    /// A droid was fully repaired.
    Repaired {
        /// Droid healed.
        droid: ObjectId,
        /// Repair facility or repair droid.
        by: ObjectId,
    },
    /// A VTOL was fully rearmed on a pad.
    Rearmed {
        /// VTOL.
        droid: ObjectId,
        /// Rearm pad.
        pad: ObjectId,
    },
}

/// A change to another object requested during a droid's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeferredCommand {
    /// Ask a droid to step aside from `vec`.
    Shuffle {
        /// Droid to shuffle.
        droid: ObjectId,
        /// Direction of the shove.
        vec: Vec2Fixed,
    },
    /// Mark an object dead.
    Destroy(ObjectId),
    /// Apply weapon damage.
    Damage {
        /// Object hit.
        target: ObjectId,
        /// Body points removed.
        damage: u32,
        /// Player who fired.
        by: PlayerId,
        /// Electronic warfare weapon.
        electronic: bool,
    },
}

/// Per-player locations and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerInfo {
    /// Where transporters land; the fallback return-to-base point.
    #[serde(with = "option_vec_serde", default)]
    pub landing_zone: Option<Vec2Fixed>,
    /// Where RETREAT and RUN send droids.
    #[serde(with = "option_vec_serde", default)]
    pub retreat_point: Option<Vec2Fixed>,
    /// Health percentage below which droids run.
    #[serde(default)]
    pub run_health: u32,
}

/// Owner of all simulated objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    /// Gameplay constants.
    pub tuning: Tuning,
    /// Ticks completed, or the tick being processed during an update.
    pub tick: u64,
    /// Game time in milliseconds.
    pub time_ms: u64,
    /// Shared deterministic generator.
    pub rng: DeterministicRng,
    /// Spatial index over every object.
    pub grid: SpatialGrid,
    /// Events of the tick in progress.
    #[serde(skip)]
    pub events: Vec<TickEvent>,
    map_size: (i32, i32),
    droids: BTreeMap<ObjectId, Droid>,
    structures: BTreeMap<ObjectId, Structure>,
    features: BTreeMap<ObjectId, Feature>,
    /// Tiles covered by structures and blocking features.
    tile_owners: BTreeMap<TilePos, ObjectId>,
    /// Unordered pairs of allied players, stored low id first.
    alliances: BTreeSet<(PlayerId, PlayerId)>,
    players: BTreeMap<PlayerId, PlayerInfo>,
    deferred: Vec<DeferredCommand>,
    next_id: u32,
}

impl World {
    /// Create an empty world for a map of `map_size` tiles.
    #[must_use]
    pub fn new(seed: u64, tuning: Tuning, map_size: (i32, i32)) -> Self {
        let grid = SpatialGrid::new(map_size.0, map_size.1, tuning.grid_cell_tiles);
        Self {
            tuning,
            tick: 0,
            time_ms: 0,
            rng: DeterministicRng::new(seed),
            grid,
            events: Vec::new(),
            map_size,
            droids: BTreeMap::new(),
            structures: BTreeMap::new(),
            features: BTreeMap::new(),
            tile_owners: BTreeMap::new(),
            alliances: BTreeSet::new(),
            players: BTreeMap::new(),
            deferred: Vec::new(),
            next_id: 1,
        }
    }

    /// Map size in tiles.
    #[must_use]
    pub const fn map_size(&self) -> (i32, i32) {
        self.map_size
    }

    /// Reserve a fresh object id.
    pub fn allocate_id(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert a droid and index it.
    pub fn insert_droid(&mut self, droid: Droid) -> ObjectId {
        let id = droid.id;
        self.next_id = self.next_id.max(id.0 + 1);
        self.grid.insert(id, droid.pos, self.droid_range());
        self.droids.insert(id, droid);
        id
    }

    /// Insert a structure, index it and claim its footprint.
    pub fn insert_structure(&mut self, structure: Structure) -> ObjectId {
        let id = structure.id;
        self.next_id = self.next_id.max(id.0 + 1);
        self.grid.insert(id, structure.pos, structure.radius());
        for tile in structure.footprint() {
            self.tile_owners.insert(tile, id);
        }
        self.structures.insert(id, structure);
        id
    }

    /// Insert a feature and index it. Wrecks and scenery block their tile.
    pub fn insert_feature(&mut self, feature: Feature) -> ObjectId {
        let id = feature.id;
        self.next_id = self.next_id.max(id.0 + 1);
        self.grid.insert(id, feature.pos, feature.radius);
        if matches!(feature.kind, FeatureKind::Wreck | FeatureKind::Generic) {
            self.tile_owners.insert(TilePos::of(feature.pos), id);
        }
        self.features.insert(id, feature);
        id
    }

    fn droid_range(&self) -> i32 {
        self.tuning.droid_grid_range_tiles * TILE_UNITS
    }

    /// Droid by id, including dead droids awaiting purge.
    #[must_use]
    pub fn droid(&self, id: ObjectId) -> Option<&Droid> {
        self.droids.get(&id)
    }

    /// Mutable droid by id.
    pub fn droid_mut(&mut self, id: ObjectId) -> Option<&mut Droid> {
        self.droids.get_mut(&id)
    }

    /// Structure by id.
    #[must_use]
    pub fn structure(&self, id: ObjectId) -> Option<&Structure> {
        self.structures.get(&id)
    }

    /// Mutable structure by id.
    pub fn structure_mut(&mut self, id: ObjectId) -> Option<&mut Structure> {
        self.structures.get_mut(&id)
    }

    /// Feature by id.
    #[must_use]
    pub fn feature(&self, id: ObjectId) -> Option<&Feature> {
        self.features.get(&id)
    }

    /// Mutable feature by id.
    pub fn feature_mut(&mut self, id: ObjectId) -> Option<&mut Feature> {
        self.features.get_mut(&id)
    }

    /// Any object by id, dead or alive.
    #[must_use]
    pub fn object(&self, id: ObjectId) -> Option<ObjectRef<'_>> {
        if let Some(d) = self.droids.get(&id) {
            return Some(ObjectRef::Droid(d));
        }
        if let Some(s) = self.structures.get(&id) {
            return Some(ObjectRef::Structure(s));
        }
        self.features.get(&id).map(ObjectRef::Feature)
    }

    /// A living object by id. This is how weak references are resolved.
    #[must_use]
    pub fn live(&self, id: ObjectId) -> Option<ObjectRef<'_>> {
        self.object(id).filter(|o| o.is_alive())
    }

    /// True if the id resolves to a living object.
    #[must_use]
    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.live(id).is_some()
    }

    /// Structure covering a tile.
    #[must_use]
    pub fn structure_at(&self, tile: TilePos) -> Option<&Structure> {
        self.tile_owners.get(&tile).and_then(|id| self.structures.get(id))
    }

    /// Blocking feature on a tile.
    #[must_use]
    pub fn feature_at(&self, tile: TilePos) -> Option<&Feature> {
        self.tile_owners.get(&tile).and_then(|id| self.features.get(id))
    }

    /// Ids of all stored droids in update order.
    #[must_use]
    pub fn droid_ids(&self) -> Vec<ObjectId> {
        self.droids.keys().copied().collect()
    }

    /// Ids of all stored structures in update order.
    #[must_use]
    pub fn structure_ids(&self) -> Vec<ObjectId> {
        self.structures.keys().copied().collect()
    }

    /// Ids of stored droids satisfying a predicate, in update order.
    pub fn droid_ids_matching<F>(&self, mut pred: F) -> Vec<ObjectId>
    where
        F: FnMut(&Droid) -> bool,
    {
        self.droids
            .iter()
            .filter(|(_, d)| pred(d))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Every stored droid, in id order.
    pub fn droids(&self) -> impl Iterator<Item = &Droid> {
        self.droids.values()
    }

    /// Every stored structure, in id order.
    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    /// Every stored feature, in id order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    /// Number of stored objects of each kind.
    #[must_use]
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.droids.len(), self.structures.len(), self.features.len())
    }

    /// Take a droid out of storage, run `f` on it and put it back.
    ///
    /// Returns `None` if the droid is not stored (for instance because it is
    /// the one currently being updated).
    pub fn with_droid<R, F>(&mut self, id: ObjectId, f: F) -> Option<R>
    where
        F: FnOnce(&mut World, &mut Droid) -> R,
    {
        let mut droid = self.droids.remove(&id)?;
        let result = f(self, &mut droid);
        self.droids.insert(id, droid);
        Some(result)
    }

    /// Living droids commanded by `commander`.
    #[must_use]
    pub fn group_members(&self, commander: ObjectId) -> Vec<ObjectId> {
        self.droid_ids_matching(|d| d.commander == Some(commander) && d.died.is_none())
    }

    /// True if the player has a built factory or repair facility.
    #[must_use]
    pub fn has_recycling_point(&self, player: PlayerId) -> bool {
        self.structures.values().any(|s| {
            s.player == player
                && s.died.is_none()
                && s.is_built()
                && (s.kind.is_factory() || s.kind == StructureKind::RepairFacility)
        })
    }

    /// First living transporter of a player.
    #[must_use]
    pub fn find_transporter(&self, player: PlayerId) -> Option<ObjectId> {
        self.droids
            .values()
            .find(|d| d.player == player && d.died.is_none() && d.is_transporter())
            .map(|d| d.id)
    }

    /// First living built structure of a kind owned by a player.
    #[must_use]
    pub fn find_structure(&self, player: PlayerId, kind: StructureKind) -> Option<&Structure> {
        self.structures
            .values()
            .find(|s| s.player == player && s.kind == kind && s.died.is_none() && s.is_built())
    }

    /// True if two players are the same or allied.
    #[must_use]
    pub fn allied(&self, a: PlayerId, b: PlayerId) -> bool {
        a == b || self.alliances.contains(&(a.min(b), a.max(b)))
    }

    /// Form or break an alliance.
    pub fn set_alliance(&mut self, a: PlayerId, b: PlayerId, allied: bool) {
        if a == b {
            return;
        }
        let key = (a.min(b), a.max(b));
        if allied {
            self.alliances.insert(key);
        } else {
            self.alliances.remove(&key);
        }
    }

    /// Locations and thresholds of a player.
    #[must_use]
    pub fn player(&self, player: PlayerId) -> PlayerInfo {
        self.players.get(&player).copied().unwrap_or_default()
    }

    /// Mutable player info, created on first use.
    pub fn player_mut(&mut self, player: PlayerId) -> &mut PlayerInfo {
        self.players.entry(player).or_default()
    }

    /// Queue a change to another object until the current turn ends.
    pub fn defer(&mut self, command: DeferredCommand) {
        self.deferred.push(command);
    }

    /// Drain queued changes in the order they were made.
    pub fn take_deferred(&mut self) -> Vec<DeferredCommand> {
        std::mem::take(&mut self.deferred)
    }

    /// Blocking oracle combining terrain with structures as seen by `player`.
    #[must_use]
    pub fn blocking_map<'a>(&'a self, terrain: &'a dyn Terrain, player: Option<PlayerId>) -> BlockingMap<'a> {
        BlockingMap {
            terrain,
            world: self,
            player,
        }
    }

    /// Open the gate on `tile` if it belongs to a friend of `player`.
    pub fn open_gate_if_friendly(&mut self, tile: TilePos, player: PlayerId) {
        let Some(&id) = self.tile_owners.get(&tile) else {
            return;
        };
        let now = self.time_ms;
        let allied = match self.structures.get(&id) {
            Some(s) => self.allied(s.player, player),
            None => return,
        };
        let Some(gate) = self.structures.get_mut(&id) else {
            return;
        };
        if !allied || !gate.is_built() {
            return;
        }
        if let StructureFunction::Gate { open, opened_at } = &mut gate.function {
            if !*open {
                trace!(gate = id.0, "gate opened");
            }
            *open = true;
            *opened_at = now;
        }
    }

    /// Close gates that have not been asked to stay open and are clear.
    pub fn close_idle_gates(&mut self) {
        let now = self.time_ms;
        let occupied: BTreeSet<TilePos> = self.droids.values().map(Droid::tile).collect();
        for gate in self.structures.values_mut() {
            let tile = gate.footprint_origin();
            if let StructureFunction::Gate { open, opened_at } = &mut gate.function {
                if *open && *opened_at + GATE_OPEN_MS < now && !occupied.contains(&tile) {
                    *open = false;
                }
            }
        }
    }

    /// Mark a stored object dead. Returns false if it is unknown or
    /// already dead.
    pub fn destroy(&mut self, id: ObjectId) -> bool {
        let tick = self.tick;
        let died = if let Some(d) = self.droids.get_mut(&id) {
            &mut d.died
        } else if let Some(s) = self.structures.get_mut(&id) {
            &mut s.died
        } else if let Some(f) = self.features.get_mut(&id) {
            &mut f.died
        } else {
            return false;
        };
        if died.is_some() {
            return false;
        }
        *died = Some(tick);
        debug!(id = id.0, tick, "object destroyed");
        self.events.push(TickEvent::Destroyed { id });
        true
    }

    /// Mark the droid currently being updated dead.
    pub fn destroy_droid(&mut self, droid: &mut Droid) {
        if droid.died.is_some() {
            return;
        }
        droid.died = Some(self.tick);
        debug!(droid = droid.id.0, tick = self.tick, "droid destroyed");
        self.events.push(TickEvent::Destroyed { id: droid.id });
    }

    /// Take the droid currently being updated off the map without a death,
    /// reporting `event` instead.
    pub fn retire_droid(&mut self, droid: &mut Droid, event: TickEvent) {
        if droid.died.is_some() {
            return;
        }
        droid.died = Some(self.tick);
        debug!(droid = droid.id.0, ?event, "droid left the map");
        self.events.push(event);
    }

    /// Apply weapon damage to a stored object.
    ///
    /// Electronic damage wears down a structure's resistance and hands it
    /// to the attacker when none is left; it does not hurt droids.
    pub fn apply_damage(&mut self, target: ObjectId, damage: u32, by: PlayerId, electronic: bool) {
        let mut kill = false;
        if electronic {
            if let Some(s) = self.structures.get_mut(&target) {
                if s.died.is_none() && s.player != by {
                    s.resistance = s.resistance.saturating_sub(damage);
                    if s.resistance == 0 {
                        s.player = by;
                        s.resistance = s.max_resistance;
                        debug!(structure = target.0, player = by, "structure taken over");
                        self.events.push(TickEvent::TakenOver {
                            structure: target,
                            player: by,
                        });
                    }
                }
            }
            return;
        }
        if let Some(d) = self.droids.get_mut(&target) {
            d.body = d.body.saturating_sub(damage);
            kill = d.body == 0;
        } else if let Some(s) = self.structures.get_mut(&target) {
            s.body = s.body.saturating_sub(damage);
            kill = s.body == 0;
        } else if let Some(f) = self.features.get_mut(&target) {
            f.body = f.body.saturating_sub(damage);
            kill = f.body == 0;
        }
        if kill {
            self.destroy(target);
        }
    }

    /// Update a droid's grid coverage after it moved.
    pub fn reindex_droid(&mut self, id: ObjectId) {
        if let Some(d) = self.droids.get(&id) {
            let pos = d.pos;
            self.grid.move_object(id, pos);
        }
    }

    /// Remove objects that died before the current tick.
    ///
    /// Claims held by structures on removed droids are released.
    pub fn purge_dead(&mut self) {
        let tick = self.tick;
        let expired = |died: Option<u64>| died.is_some_and(|t| t < tick);

        let droids: Vec<ObjectId> = self
            .droids
            .values()
            .filter(|d| expired(d.died))
            .map(|d| d.id)
            .collect();
        let structures: Vec<ObjectId> = self
            .structures
            .values()
            .filter(|s| expired(s.died))
            .map(|s| s.id)
            .collect();
        let features: Vec<ObjectId> = self
            .features
            .values()
            .filter(|f| expired(f.died))
            .map(|f| f.id)
            .collect();

        for id in &droids {
            self.droids.remove(id);
            self.grid.remove(*id);
        }
        for id in structures.iter().chain(&features) {
            self.structures.remove(id);
            self.features.remove(id);
            self.grid.remove(*id);
        }
        if !structures.is_empty() || !features.is_empty() {
            self.tile_owners.retain(|_, owner| !structures.contains(owner) && !features.contains(owner));
        }
        if droids.is_empty() {
            return;
        }
        trace!(count = droids.len(), "purged dead droids");
        for s in self.structures.values_mut() {
            match &mut s.function {
                StructureFunction::RepairFacility { patient, .. } => {
                    if patient.is_some_and(|p| droids.contains(&p)) {
                        *patient = None;
                    }
                }
                StructureFunction::RearmPad { vtol, progress_ms, .. } => {
                    if vtol.is_some_and(|v| droids.contains(&v)) {
                        *vtol = None;
                        *progress_ms = 0;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Tile blocking as seen by one player: terrain plus structure footprints
/// and blocking features. Friendly gates let ground units through; VTOLs
/// only care about terrain.
#[derive(Clone, Copy)]
pub struct BlockingMap<'a> {
    terrain: &'a dyn Terrain,
    world: &'a World,
    player: Option<PlayerId>,
}

impl TileBlocking for BlockingMap<'_> {
    fn map_size(&self) -> (i32, i32) {
        self.terrain.map_size()
    }

    fn is_blocked(&self, tile: TilePos, propulsion: PropulsionKind) -> bool {
        if self.terrain.is_blocking_tile(tile, propulsion) {
            return true;
        }
        if propulsion.is_lift() {
            return false;
        }
        let Some(&owner) = self.world.tile_owners.get(&tile) else {
            return false;
        };
        match self.world.structures.get(&owner) {
            Some(s) if s.kind == StructureKind::Gate => match self.player {
                Some(player) => !self.world.allied(s.player, player),
                None => s.gate_open() != Some(true),
            },
            Some(_) => true,
            None => self.world.features.contains_key(&owner),
        }
    }
}
