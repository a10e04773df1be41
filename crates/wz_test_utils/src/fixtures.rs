//! Test fixtures and helpers.
//!
//! Collaborators with scripted behaviour, common droid templates and a
//! builder for small scenarios.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use fixed::types::I32F32;
use tracing::debug;

use wz_core::droid::Droid;
use wz_core::environment::{
    Combat, Environment, PathRequest, PathResult, Pathfinder, Shot, Terrain, TerrainType, TileBlocking,
};
use wz_core::object::ObjectRef;
use wz_core::pathfinding::AStarPathfinder;
use wz_core::prelude::*;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// World position from integer world units.
#[must_use]
pub fn pos(x: i32, y: i32) -> Vec2Fixed {
    Vec2Fixed::from_ints(x, y)
}

/// Open, level ground everywhere on the map.
#[derive(Debug, Clone, Copy)]
pub struct FlatTerrain {
    /// Width in tiles.
    pub width: i32,
    /// Height in tiles.
    pub height: i32,
}

impl FlatTerrain {
    /// A flat map of the given size.
    #[must_use]
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    fn on_map(&self, tile: TilePos) -> bool {
        tile.x >= 0 && tile.y >= 0 && tile.x < self.width && tile.y < self.height
    }
}

impl Terrain for FlatTerrain {
    fn map_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn is_blocking_tile(&self, tile: TilePos, _propulsion: PropulsionKind) -> bool {
        !self.on_map(tile)
    }

    fn height_at(&self, _pos: Vec2Fixed) -> Fixed {
        Fixed::ZERO
    }

    fn terrain_type(&self, tile: TilePos) -> TerrainType {
        if self.on_map(tile) {
            TerrainType::Normal
        } else {
            TerrainType::Cliff
        }
    }
}

/// Flat ground with cliff tiles that only lift propulsion crosses.
#[derive(Debug, Clone)]
pub struct WallTerrain {
    flat: FlatTerrain,
    walls: BTreeSet<TilePos>,
}

impl WallTerrain {
    /// A flat map without walls yet.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            flat: FlatTerrain::new(width, height),
            walls: BTreeSet::new(),
        }
    }

    /// Add one cliff tile.
    #[must_use]
    pub fn with_wall(mut self, tile: TilePos) -> Self {
        self.walls.insert(tile);
        self
    }

    /// Add a vertical run of cliff tiles at column `x` from `y0` to `y1` inclusive.
    #[must_use]
    pub fn with_vertical_wall(mut self, x: i32, y0: i32, y1: i32) -> Self {
        for y in y0..=y1 {
            self.walls.insert(TilePos::new(x, y));
        }
        self
    }
}

impl Terrain for WallTerrain {
    fn map_size(&self) -> (i32, i32) {
        self.flat.map_size()
    }

    fn is_blocking_tile(&self, tile: TilePos, propulsion: PropulsionKind) -> bool {
        self.terrain_type(tile).blocks(propulsion) || self.flat.is_blocking_tile(tile, propulsion)
    }

    fn height_at(&self, _pos: Vec2Fixed) -> Fixed {
        Fixed::ZERO
    }

    fn terrain_type(&self, tile: TilePos) -> TerrainType {
        if self.walls.contains(&tile) {
            TerrainType::Cliff
        } else {
            self.flat.terrain_type(tile)
        }
    }
}

/// Shared log of route requests, readable after the pathfinder was boxed.
pub type RequestLog = Arc<Mutex<Vec<PathRequest>>>;

/// Pathfinder answering from a script.
///
/// Scripted answers are handed out in order; once they run out, every
/// request gets a straight route to its destination. `Pending` answers
/// resolve to a straight route on the next poll.
#[derive(Debug, Default)]
pub struct ScriptedPathfinder {
    script: VecDeque<PathResult>,
    pending: BTreeMap<ObjectId, PathRequest>,
    log: RequestLog,
    unreachable: bool,
}

impl ScriptedPathfinder {
    /// Straight routes for every request.
    #[must_use]
    pub fn straight() -> Self {
        Self::default()
    }

    /// Every destination is unreachable at assignment time.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Queue an answer for the next request.
    #[must_use]
    pub fn then(mut self, result: PathResult) -> Self {
        self.script.push_back(result);
        self
    }

    /// Handle on the request log.
    #[must_use]
    pub fn log(&self) -> RequestLog {
        Arc::clone(&self.log)
    }
}

impl Pathfinder for ScriptedPathfinder {
    fn request_path(&mut self, request: &PathRequest, _map: &dyn TileBlocking) -> PathResult {
        if let Ok(mut log) = self.log.lock() {
            log.push(*request);
        }
        let result = self
            .script
            .pop_front()
            .unwrap_or_else(|| PathResult::Ready(vec![request.to]));
        if result == PathResult::Pending {
            self.pending.insert(request.droid, *request);
        }
        result
    }

    fn poll(&mut self, droid: ObjectId, _map: &dyn TileBlocking) -> PathResult {
        match self.pending.remove(&droid) {
            Some(request) => PathResult::Ready(vec![request.to]),
            None => PathResult::Failed,
        }
    }

    fn is_reachable(&self, _from: Vec2Fixed, _to: Vec2Fixed, _propulsion: PropulsionKind, _map: &dyn TileBlocking) -> bool {
        !self.unreachable
    }

    fn cancel(&mut self, droid: ObjectId) {
        self.pending.remove(&droid);
    }
}

/// One recorded weapon discharge: firer, mount, target.
pub type ShotRecord = (ObjectId, usize, ObjectId);

/// Shared log of shots, readable after the combat was boxed.
pub type ShotLog = Arc<Mutex<Vec<ShotRecord>>>;

/// Combat that always fires, records every shot and deals fixed damage.
#[derive(Debug, Default)]
pub struct RecordingCombat {
    damage: u32,
    log: ShotLog,
}

impl RecordingCombat {
    /// Combat dealing `damage` body points per shot.
    #[must_use]
    pub fn new(damage: u32) -> Self {
        Self {
            damage,
            log: ShotLog::default(),
        }
    }

    /// Handle on the shot log.
    #[must_use]
    pub fn log(&self) -> ShotLog {
        Arc::clone(&self.log)
    }
}

impl Combat for RecordingCombat {
    fn fire_weapon(&mut self, firer: &Droid, mount: usize, target: ObjectRef<'_>) -> Option<Shot> {
        if let Ok(mut log) = self.log.lock() {
            log.push((firer.id, mount, target.id()));
        }
        Some(Shot {
            target: target.id(),
            damage: self.damage,
        })
    }
}

/// Medium wheeled droid with one rotating gun.
#[must_use]
pub fn tank() -> DroidTemplate {
    DroidTemplate {
        weapons: vec![WeaponStats::default()],
        ..DroidTemplate::default()
    }
}

/// Tank with a custom long range.
#[must_use]
pub fn tank_with_range(long_range: i32) -> DroidTemplate {
    DroidTemplate {
        weapons: vec![WeaponStats {
            long_range,
            short_range: long_range / 2,
            ..WeaponStats::default()
        }],
        ..DroidTemplate::default()
    }
}

/// Wheeled repair turret.
#[must_use]
pub fn repair_droid() -> DroidTemplate {
    DroidTemplate {
        category: DroidCategory::Repair,
        repair_points: 30,
        ..DroidTemplate::default()
    }
}

/// Wheeled construction droid.
#[must_use]
pub fn constructor() -> DroidTemplate {
    DroidTemplate {
        category: DroidCategory::Construct,
        construct_points: 40,
        ..DroidTemplate::default()
    }
}

/// VTOL with one bomb bay of `runs` attack runs.
#[must_use]
pub fn vtol(runs: u32) -> DroidTemplate {
    DroidTemplate {
        body_size: BodySize::Light,
        propulsion: PropulsionStats {
            kind: PropulsionKind::Lift,
            max_speed: 700,
        },
        weapons: vec![WeaponStats {
            num_attack_runs: runs,
            rotates: false,
            ..WeaponStats::default()
        }],
        ..DroidTemplate::default()
    }
}

/// Parse a RON map of named droid templates.
pub fn templates_from_ron(source: &str) -> Result<BTreeMap<String, DroidTemplate>> {
    ron::from_str(source).map_err(|e| SimError::Config(format!("templates: {e}")))
}

/// A built scenario with the ids of everything spawned, in spawn order.
#[derive(Debug)]
pub struct Scenario {
    /// The simulation.
    pub sim: Simulation,
    /// Spawned droids.
    pub droids: Vec<ObjectId>,
    /// Spawned structures.
    pub structures: Vec<ObjectId>,
    /// Spawned features.
    pub features: Vec<ObjectId>,
}

enum Spawn {
    Droid(PlayerId, DroidTemplate, Vec2Fixed),
    Structure(PlayerId, StructureTemplate, Vec2Fixed, StructureStatus),
    Feature(FeatureKind, Vec2Fixed),
}

/// Builder for small deterministic scenarios.
///
/// # Example
///
/// ```
/// use wz_core::prelude::*;
/// use wz_test_utils::fixtures::{tank, ScenarioBuilder};
///
/// let scenario = ScenarioBuilder::new(32, 32)
///     .seed(9)
///     .droid(0, tank(), TilePos::new(3, 3))
///     .build();
/// assert_eq!(scenario.droids.len(), 1);
/// ```
pub struct ScenarioBuilder {
    width: i32,
    height: i32,
    seed: u64,
    tuning: Tuning,
    terrain: Option<Box<dyn Terrain>>,
    pathfinder: Option<Box<dyn Pathfinder>>,
    combat: Option<Box<dyn Combat>>,
    spawns: Vec<Spawn>,
    alliances: Vec<(PlayerId, PlayerId)>,
}

impl ScenarioBuilder {
    /// Empty flat map with the built-in planner and harmless combat.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            seed: 0,
            tuning: Tuning::default(),
            terrain: None,
            pathfinder: None,
            combat: None,
            spawns: Vec::new(),
            alliances: Vec::new(),
        }
    }

    /// Random seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Gameplay constants.
    #[must_use]
    pub fn tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Replace the terrain.
    #[must_use]
    pub fn terrain(mut self, terrain: impl Terrain + 'static) -> Self {
        self.terrain = Some(Box::new(terrain));
        self
    }

    /// Replace the pathfinder.
    #[must_use]
    pub fn pathfinder(mut self, pathfinder: impl Pathfinder + 'static) -> Self {
        self.pathfinder = Some(Box::new(pathfinder));
        self
    }

    /// Replace the combat resolver.
    #[must_use]
    pub fn combat(mut self, combat: impl Combat + 'static) -> Self {
        self.combat = Some(Box::new(combat));
        self
    }

    /// Spawn a droid centred on a tile.
    #[must_use]
    pub fn droid(self, player: PlayerId, template: DroidTemplate, tile: TilePos) -> Self {
        self.droid_at(player, template, tile.center())
    }

    /// Spawn a droid at a world position.
    #[must_use]
    pub fn droid_at(mut self, player: PlayerId, template: DroidTemplate, at: Vec2Fixed) -> Self {
        self.spawns.push(Spawn::Droid(player, template, at));
        self
    }

    /// Spawn a finished one-tile structure.
    #[must_use]
    pub fn structure(self, player: PlayerId, kind: StructureKind, tile: TilePos) -> Self {
        self.structure_with(player, StructureTemplate::single_tile(kind), tile, StructureStatus::Built)
    }

    /// Spawn a structure from a template.
    #[must_use]
    pub fn structure_with(
        mut self,
        player: PlayerId,
        template: StructureTemplate,
        tile: TilePos,
        status: StructureStatus,
    ) -> Self {
        self.spawns
            .push(Spawn::Structure(player, template, tile.center(), status));
        self
    }

    /// Spawn a feature centred on a tile.
    #[must_use]
    pub fn feature(mut self, kind: FeatureKind, tile: TilePos) -> Self {
        self.spawns.push(Spawn::Feature(kind, tile.center()));
        self
    }

    /// Ally two players.
    #[must_use]
    pub fn alliance(mut self, a: PlayerId, b: PlayerId) -> Self {
        self.alliances.push((a, b));
        self
    }

    /// Create the simulation and spawn everything.
    #[must_use]
    pub fn build(self) -> Scenario {
        let terrain = self
            .terrain
            .unwrap_or_else(|| Box::new(FlatTerrain::new(self.width, self.height)));
        let pathfinder = self
            .pathfinder
            .unwrap_or_else(|| Box::new(AStarPathfinder::new()));
        let combat = self
            .combat
            .unwrap_or_else(|| Box::new(wz_core::environment::NullCombat));
        let env = Environment::new(terrain, pathfinder, combat);
        let mut sim = Simulation::new(self.seed, self.tuning, env);
        for (a, b) in self.alliances {
            sim.world_mut().set_alliance(a, b, true);
        }

        let mut scenario = Scenario {
            sim,
            droids: Vec::new(),
            structures: Vec::new(),
            features: Vec::new(),
        };
        for spawn in self.spawns {
            match spawn {
                Spawn::Droid(player, template, at) => {
                    let id = scenario.sim.spawn_droid(player, &template, at);
                    scenario.droids.push(id);
                }
                Spawn::Structure(player, template, at, status) => {
                    let id = scenario.sim.spawn_structure(player, &template, at, status);
                    scenario.structures.push(id);
                }
                Spawn::Feature(kind, at) => {
                    let id = scenario.sim.spawn_feature(kind, at);
                    scenario.features.push(id);
                }
            }
        }
        debug!(
            droids = scenario.droids.len(),
            structures = scenario.structures.len(),
            features = scenario.features.len(),
            "scenario built"
        );
        scenario
    }
}

impl Scenario {
    /// Run `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.sim.tick();
        }
    }

    /// Tick until `done` holds or `limit` ticks pass. Returns the ticks run,
    /// or `None` if the limit was hit.
    pub fn run_until<F>(&mut self, limit: u64, mut done: F) -> Option<u64>
    where
        F: FnMut(&Simulation) -> bool,
    {
        for n in 0..=limit {
            if done(&self.sim) {
                return Some(n);
            }
            self.sim.tick();
        }
        None
    }

    /// A droid by id. Panics if it is gone.
    #[must_use]
    pub fn droid(&self, id: ObjectId) -> &Droid {
        self.sim
            .world()
            .droid(id)
            .unwrap_or_else(|| panic!("droid {} not in world", id.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_helpers() {
        assert_eq!(fixed(3), I32F32::from_num(3));
        assert_eq!(fixed_f(0.5), I32F32::from_num(0.5));
    }

    #[test]
    fn test_wall_terrain_blocks_ground_not_lift() {
        let t = WallTerrain::new(8, 8).with_vertical_wall(4, 0, 7);
        assert!(t.is_blocking_tile(TilePos::new(4, 3), PropulsionKind::Wheeled));
        assert!(!t.is_blocking_tile(TilePos::new(4, 3), PropulsionKind::Lift));
        assert!(!t.is_blocking_tile(TilePos::new(3, 3), PropulsionKind::Wheeled));
        assert!(t.is_blocking_tile(TilePos::new(-1, 3), PropulsionKind::Lift));
    }

    #[test]
    fn test_scripted_pathfinder_order() {
        let mut pf = ScriptedPathfinder::straight().then(PathResult::Failed);
        let log = pf.log();
        let map = FlatTerrain::new(8, 8);
        let blocking = wz_core::environment::TerrainBlocking(&map);
        let request = PathRequest {
            droid: ObjectId(1),
            from: pos(0, 0),
            to: pos(500, 0),
            propulsion: PropulsionKind::Wheeled,
        };
        assert_eq!(pf.request_path(&request, &blocking), PathResult::Failed);
        assert_eq!(pf.request_path(&request, &blocking), PathResult::Ready(vec![pos(500, 0)]));
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_templates_from_ron() {
        let source = r#"{
            "scout": (
                category: Weapon,
                body_size: Light,
                propulsion: (kind: Wheeled, max_speed: 500),
                body: 150,
            ),
        }"#;
        let templates = templates_from_ron(source).unwrap();
        assert_eq!(templates["scout"].body, 150);
        assert_eq!(templates["scout"].sensor_range, 1024);
    }

    #[test]
    fn test_bad_templates_are_config_errors() {
        let err = templates_from_ron("{ \"scout\": (body: \"lots\") }").unwrap_err();
        assert!(matches!(err, SimError::Config(ref msg) if msg.starts_with("templates:")));
    }

    #[test]
    fn test_builder_spawns_in_order() {
        let scenario = ScenarioBuilder::new(16, 16)
            .structure(0, StructureKind::Hq, TilePos::new(2, 2))
            .droid(0, tank(), TilePos::new(5, 5))
            .droid(1, tank(), TilePos::new(9, 9))
            .alliance(0, 1)
            .build();
        assert_eq!(scenario.droids.len(), 2);
        assert!(scenario.droids[0] < scenario.droids[1]);
        assert!(scenario.sim.world().allied(0, 1));
    }
}
