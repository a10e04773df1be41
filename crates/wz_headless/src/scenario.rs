//! Scenario loading and configuration.
//!
//! Scenarios define the starting world for a headless run: map size and
//! walls, named droid templates, placed droids and structures, and a
//! script of orders to issue at given ticks.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use wz_core::config::Tuning;
use wz_core::droid::{DroidTemplate, WeaponStats};
use wz_core::environment::{Environment, TerrainType};
use wz_core::error::SimError;
use wz_core::math::TilePos;
use wz_core::object::{ObjectId, PlayerId};
use wz_core::order::{OrderKind, OrderRequest};
use wz_core::pathfinding::TileMap;
use wz_core::secondary::{SecondaryKind, SecondaryState};
use wz_core::simulation::Simulation;
use wz_core::structure::{FeatureKind, StructureKind, StructureStatus, StructureTemplate};

/// Error type for scenario operations.
#[derive(Error, Debug)]
pub enum ScenarioError {
    /// File not found.
    #[error("Scenario file not found: {0}")]
    FileNotFound(String),
    /// Failed to read or write a file.
    #[error("Failed to read scenario file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse scenario: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// A droid placement names a template that is not defined.
    #[error("Unknown droid template: {0}")]
    UnknownTemplate(String),
    /// A scripted command refers to a placement that does not exist.
    #[error("Scripted command at tick {tick} refers to missing {what} #{index}")]
    BadReference {
        /// Tick of the command.
        tick: u64,
        /// "droid" or "structure".
        what: &'static str,
        /// Index into the placement list.
        index: usize,
    },
    /// The kernel refused an operation.
    #[error(transparent)]
    Simulation(#[from] SimError),
}

/// A droid to spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroidPlacement {
    /// Owner.
    pub player: PlayerId,
    /// Key into [`Scenario::templates`].
    pub template: String,
    /// Tile to spawn on.
    pub tile: (i32, i32),
}

/// A structure to spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructurePlacement {
    /// Owner.
    pub player: PlayerId,
    /// Structure type; a one-tile template is used.
    pub kind: StructureKind,
    /// Tile to spawn on.
    pub tile: (i32, i32),
    /// Finished, or a foundation still being built.
    #[serde(default = "default_built")]
    pub built: bool,
}

fn default_built() -> bool {
    true
}

/// A feature to spawn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturePlacement {
    /// Feature type.
    pub kind: FeatureKind,
    /// Tile to spawn on.
    pub tile: (i32, i32),
}

/// What a scripted order points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetRef {
    /// Index into [`Scenario::droids`].
    Droid(usize),
    /// Index into [`Scenario::structures`].
    Structure(usize),
}

/// An input the scenario feeds to the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScriptedAction {
    /// A primary order.
    Order {
        /// Order kind.
        kind: OrderKind,
        /// Tile to go to, for location orders.
        #[serde(default)]
        tile: Option<(i32, i32)>,
        /// Object to act on, for object orders.
        #[serde(default)]
        target: Option<TargetRef>,
        /// Structure to build, for build orders.
        #[serde(default)]
        build: Option<StructureKind>,
        /// Append to the queue instead of replacing the order.
        #[serde(default)]
        queue: bool,
    },
    /// A secondary toggle change.
    Secondary {
        /// Toggle.
        kind: SecondaryKind,
        /// New value.
        state: SecondaryState,
    },
    /// Kill the droid from outside the kernel.
    Destroy,
}

/// One scripted input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedCommand {
    /// Ticks completed before the command is issued.
    pub tick: u64,
    /// Index into [`Scenario::droids`] of the droid addressed.
    pub droid: usize,
    /// What to do.
    pub action: ScriptedAction,
}

/// A complete scenario configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Random seed.
    #[serde(default)]
    pub seed: u64,
    /// Map dimensions (width, height) in tiles.
    pub map_size: (i32, i32),
    /// Ticks to run.
    pub ticks: u64,
    /// Gameplay constants; defaults when omitted.
    #[serde(default)]
    pub tuning: Tuning,
    /// Cliff tiles.
    #[serde(default)]
    pub walls: Vec<(i32, i32)>,
    /// Player pairs that are allied.
    #[serde(default)]
    pub alliances: Vec<(PlayerId, PlayerId)>,
    /// Named droid templates.
    pub templates: BTreeMap<String, DroidTemplate>,
    /// Droids to spawn, in order.
    #[serde(default)]
    pub droids: Vec<DroidPlacement>,
    /// Structures to spawn, in order.
    #[serde(default)]
    pub structures: Vec<StructurePlacement>,
    /// Features to spawn, in order.
    #[serde(default)]
    pub features: Vec<FeaturePlacement>,
    /// Scripted inputs, sorted by tick when the scenario is instantiated.
    #[serde(default)]
    pub commands: Vec<ScriptedCommand>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::skirmish()
    }
}

/// Ids of everything a scenario spawned, by placement index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spawned {
    /// Droid ids.
    pub droids: Vec<ObjectId>,
    /// Structure ids.
    pub structures: Vec<ObjectId>,
    /// Feature ids.
    pub features: Vec<ObjectId>,
}

impl Scenario {
    /// Load a scenario from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Load from a RON string (useful for embedded scenarios).
    pub fn from_ron_str(ron: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = ron::from_str(ron)?;
        Ok(scenario)
    }

    /// Two small armies meeting in the middle of an open map, with a repair
    /// facility behind one of them.
    #[must_use]
    pub fn skirmish() -> Self {
        let mut templates = BTreeMap::new();
        templates.insert(
            "tank".to_string(),
            DroidTemplate {
                weapons: vec![WeaponStats::default()],
                ..DroidTemplate::default()
            },
        );
        let mut droids = Vec::new();
        for i in 0..5 {
            droids.push(DroidPlacement {
                player: 0,
                template: "tank".to_string(),
                tile: (4, 12 + i * 2),
            });
            droids.push(DroidPlacement {
                player: 1,
                template: "tank".to_string(),
                tile: (27, 12 + i * 2),
            });
        }
        let commands = (0..droids.len())
            .map(|droid| ScriptedCommand {
                tick: 0,
                droid,
                action: ScriptedAction::Order {
                    kind: OrderKind::Scout,
                    tile: Some((16, 16)),
                    target: None,
                    build: None,
                    queue: false,
                },
            })
            .collect();

        Self {
            name: "Skirmish".to_string(),
            description: "Five tanks a side scouting into each other".to_string(),
            seed: 0,
            map_size: (32, 32),
            ticks: 600,
            tuning: Tuning::default(),
            walls: Vec::new(),
            alliances: Vec::new(),
            templates,
            droids,
            structures: vec![StructurePlacement {
                player: 0,
                kind: StructureKind::RepairFacility,
                tile: (2, 16),
                built: true,
            }],
            features: Vec::new(),
            commands,
        }
    }

    /// Terrain, planner and combat for this scenario.
    #[must_use]
    pub fn environment(&self) -> Environment {
        let mut map = TileMap::new(self.map_size.0, self.map_size.1);
        for &(x, y) in &self.walls {
            map.set(TilePos::new(x, y), TerrainType::Cliff);
        }
        Environment::from_tile_map(map)
    }

    /// Create the simulation and spawn everything.
    pub fn instantiate(&self, seed: u64) -> Result<(Simulation, Spawned), ScenarioError> {
        let mut sim = Simulation::new(seed, self.tuning.clone(), self.environment());
        for &(a, b) in &self.alliances {
            sim.world_mut().set_alliance(a, b, true);
        }

        let mut spawned = Spawned::default();
        for placement in &self.droids {
            let template = self
                .templates
                .get(&placement.template)
                .ok_or_else(|| ScenarioError::UnknownTemplate(placement.template.clone()))?;
            let at = TilePos::new(placement.tile.0, placement.tile.1).center();
            spawned.droids.push(sim.spawn_droid(placement.player, template, at));
        }
        for placement in &self.structures {
            let status = if placement.built {
                StructureStatus::Built
            } else {
                StructureStatus::BeingBuilt
            };
            let at = TilePos::new(placement.tile.0, placement.tile.1).center();
            let template = StructureTemplate::single_tile(placement.kind);
            spawned
                .structures
                .push(sim.spawn_structure(placement.player, &template, at, status));
        }
        for placement in &self.features {
            let at = TilePos::new(placement.tile.0, placement.tile.1).center();
            spawned.features.push(sim.spawn_feature(placement.kind, at));
        }
        Ok((sim, spawned))
    }

    /// Scripted commands in issue order.
    #[must_use]
    pub fn schedule(&self) -> Vec<&ScriptedCommand> {
        let mut commands: Vec<&ScriptedCommand> = self.commands.iter().collect();
        commands.sort_by_key(|c| c.tick);
        commands
    }
}

impl ScriptedCommand {
    /// Translate into a kernel command against the spawned ids.
    pub fn resolve(&self, spawned: &Spawned) -> Result<wz_core::replay::SimCommand, ScenarioError> {
        use wz_core::replay::SimCommand;

        let droid = *spawned.droids.get(self.droid).ok_or(ScenarioError::BadReference {
            tick: self.tick,
            what: "droid",
            index: self.droid,
        })?;
        Ok(match &self.action {
            ScriptedAction::Order {
                kind,
                tile,
                target,
                build,
                queue,
            } => {
                let pos = tile.map(|(x, y)| TilePos::new(x, y).center());
                let target = match target {
                    None => None,
                    Some(TargetRef::Droid(i)) => Some(self.lookup(&spawned.droids, *i, "droid")?),
                    Some(TargetRef::Structure(i)) => Some(self.lookup(&spawned.structures, *i, "structure")?),
                };
                let mut request = OrderRequest::new(*kind);
                request.pos = pos;
                request.target = target;
                request.template = build.map(StructureTemplate::single_tile);
                SimCommand::Order {
                    droid,
                    request,
                    queue: *queue,
                }
            }
            ScriptedAction::Secondary { kind, state } => SimCommand::Secondary {
                droid,
                kind: *kind,
                state: *state,
                queue: false,
            },
            ScriptedAction::Destroy => SimCommand::Destroy(droid),
        })
    }

    fn lookup(&self, ids: &[ObjectId], index: usize, what: &'static str) -> Result<ObjectId, ScenarioError> {
        ids.get(index).copied().ok_or(ScenarioError::BadReference {
            tick: self.tick,
            what,
            index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"(
        name: "Duel",
        seed: 4,
        map_size: (16, 16),
        ticks: 50,
        walls: [(8, 3), (8, 4)],
        templates: {
            "tank": (
                category: Weapon,
                body_size: Medium,
                propulsion: (kind: Wheeled, max_speed: 500),
                body: 300,
                weapons: [(long_range: 640)],
            ),
        },
        droids: [
            (player: 0, template: "tank", tile: (2, 2)),
            (player: 1, template: "tank", tile: (13, 13)),
        ],
        structures: [
            (player: 0, kind: Hq, tile: (1, 1)),
        ],
        commands: [
            (tick: 5, droid: 0, action: Order(kind: AttackTarget, target: Some(Droid(1)))),
            (tick: 1, droid: 1, action: Order(kind: Move, tile: Some((10, 10)))),
        ],
    )"#;

    #[test]
    fn test_default_scenario() {
        let scenario = Scenario::default();
        assert_eq!(scenario.droids.len(), 10);
        assert_eq!(scenario.commands.len(), 10);
        assert!(scenario.templates.contains_key("tank"));
    }

    #[test]
    fn test_scenario_from_ron() {
        let scenario = Scenario::from_ron_str(SMALL).unwrap();
        assert_eq!(scenario.name, "Duel");
        assert_eq!(scenario.ticks, 50);
        assert_eq!(scenario.templates["tank"].body, 300);
        assert_eq!(scenario.templates["tank"].weapons.len(), 1);
        assert!(scenario.structures[0].built);
        assert_eq!(scenario.tuning, Tuning::default());
    }

    #[test]
    fn test_schedule_is_sorted() {
        let scenario = Scenario::from_ron_str(SMALL).unwrap();
        let ticks: Vec<u64> = scenario.schedule().iter().map(|c| c.tick).collect();
        assert_eq!(ticks, vec![1, 5]);
    }

    #[test]
    fn test_instantiate_spawns_everything() {
        let scenario = Scenario::from_ron_str(SMALL).unwrap();
        let (sim, spawned) = scenario.instantiate(scenario.seed).unwrap();
        assert_eq!(spawned.droids.len(), 2);
        assert_eq!(spawned.structures.len(), 1);
        assert_eq!(sim.world().counts(), (2, 1, 0));
    }

    #[test]
    fn test_unknown_template_rejected() {
        let mut scenario = Scenario::from_ron_str(SMALL).unwrap();
        scenario.droids[0].template = "missing".to_string();
        assert!(matches!(
            scenario.instantiate(0),
            Err(ScenarioError::UnknownTemplate(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_bad_target_reference() {
        let scenario = Scenario::from_ron_str(SMALL).unwrap();
        let (_, spawned) = scenario.instantiate(0).unwrap();
        let command = ScriptedCommand {
            tick: 3,
            droid: 0,
            action: ScriptedAction::Order {
                kind: OrderKind::AttackTarget,
                tile: None,
                target: Some(TargetRef::Structure(7)),
                build: None,
                queue: false,
            },
        };
        assert!(matches!(
            command.resolve(&spawned),
            Err(ScenarioError::BadReference { what: "structure", index: 7, .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Scenario::load("/definitely/not/here.ron"),
            Err(ScenarioError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_walls_block_ground_units() {
        use wz_core::droid::PropulsionKind;
        use wz_core::environment::Terrain;

        let scenario = Scenario::from_ron_str(SMALL).unwrap();
        let env = scenario.environment();
        assert!(env.terrain.is_blocking_tile(TilePos::new(8, 3), PropulsionKind::Wheeled));
        assert!(!env.terrain.is_blocking_tile(TilePos::new(7, 3), PropulsionKind::Wheeled));
    }

    #[test]
    fn test_bundled_duel_scenario_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/scenarios/duel.ron");
        let scenario = Scenario::load(path).unwrap();
        assert_eq!(scenario.name, "Duel");
        let (sim, spawned) = scenario.instantiate(scenario.seed).unwrap();
        assert_eq!(spawned.droids.len(), 2);
        assert_eq!(spawned.structures.len(), 2);
        assert_eq!(sim.world().droid_ids().len(), 2);
        for command in scenario.schedule() {
            command.resolve(&spawned).unwrap();
        }
    }
}
