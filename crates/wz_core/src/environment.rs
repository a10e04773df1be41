//! Collaborator interfaces consumed by the kernel.
//!
//! Terrain queries, route planning and weapon resolution belong to other
//! subsystems. The kernel only sees them through the traits below, bundled
//! into an [`Environment`] that is passed into every update call next to the
//! [`World`](crate::world::World).
//!
//! The environment is never serialised: a restored world is paired with a
//! freshly built environment.

use serde::{Deserialize, Serialize};

use crate::droid::{Droid, PropulsionKind};
use crate::math::{Fixed, TilePos, Vec2Fixed};
use crate::object::{ObjectId, ObjectRef};
use crate::pathfinding::{AStarPathfinder, TileMap};

/// Surface type of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TerrainType {
    /// Ordinary ground.
    #[default]
    Normal,
    /// Paved road; faster for ground units.
    Road,
    /// Water; only hover, lift and boats cross it.
    Water,
    /// Cliff face; only lift crosses it.
    Cliff,
}

impl TerrainType {
    /// Whether a propulsion type can enter a tile of this type.
    #[must_use]
    pub const fn blocks(self, propulsion: PropulsionKind) -> bool {
        match self {
            Self::Normal | Self::Road => false,
            Self::Water => !matches!(
                propulsion,
                PropulsionKind::Hover | PropulsionKind::Lift | PropulsionKind::Propellor
            ),
            Self::Cliff => !matches!(propulsion, PropulsionKind::Lift),
        }
    }

    /// Speed modifier in percent of the propulsion's top speed.
    #[must_use]
    pub const fn speed_percent(self, propulsion: PropulsionKind) -> i32 {
        match (self, propulsion) {
            (_, PropulsionKind::Lift) => 100,
            (Self::Road, PropulsionKind::Wheeled | PropulsionKind::HalfTracked) => 125,
            (Self::Road, _) => 110,
            (Self::Water, PropulsionKind::Hover) => 110,
            _ => 100,
        }
    }
}

/// Terrain queries.
pub trait Terrain: Send {
    /// Map width and height in tiles.
    fn map_size(&self) -> (i32, i32);

    /// True if a unit with this propulsion cannot enter the tile.
    /// Off-map tiles are always blocking.
    fn is_blocking_tile(&self, tile: TilePos, propulsion: PropulsionKind) -> bool;

    /// Ground height at a world position.
    fn height_at(&self, pos: Vec2Fixed) -> Fixed;

    /// Surface type of a tile.
    fn terrain_type(&self, tile: TilePos) -> TerrainType;

    /// Speed modifier for a propulsion on a tile, in percent.
    fn speed_percent(&self, tile: TilePos, propulsion: PropulsionKind) -> i32 {
        self.terrain_type(tile).speed_percent(propulsion)
    }
}

/// A blocking oracle over tiles, used by route planning and collision.
///
/// [`TerrainBlocking`] answers from terrain alone;
/// [`BlockingMap`](crate::world::BlockingMap) layers structures on top.
pub trait TileBlocking {
    /// Map width and height in tiles.
    fn map_size(&self) -> (i32, i32);

    /// True if a unit with this propulsion cannot enter the tile.
    fn is_blocked(&self, tile: TilePos, propulsion: PropulsionKind) -> bool;
}

/// Blocking by terrain alone, ignoring structures.
#[derive(Clone, Copy)]
pub struct TerrainBlocking<'a>(pub &'a dyn Terrain);

impl TileBlocking for TerrainBlocking<'_> {
    fn map_size(&self) -> (i32, i32) {
        self.0.map_size()
    }

    fn is_blocked(&self, tile: TilePos, propulsion: PropulsionKind) -> bool {
        self.0.is_blocking_tile(tile, propulsion)
    }
}

/// A route request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathRequest {
    /// Droid the route is for.
    pub droid: ObjectId,
    /// Start position.
    pub from: Vec2Fixed,
    /// Destination.
    pub to: Vec2Fixed,
    /// Propulsion of the droid.
    pub propulsion: PropulsionKind,
}

/// Outcome of a route request or poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathResult {
    /// Waypoints from the start (exclusive) to the destination.
    Ready(Vec<Vec2Fixed>),
    /// Still being computed; poll again next tick.
    Pending,
    /// No route exists.
    Failed,
}

/// Route planning service.
pub trait Pathfinder: Send {
    /// Ask for a route. May answer immediately or later via [`Pathfinder::poll`].
    fn request_path(&mut self, request: &PathRequest, map: &dyn TileBlocking) -> PathResult;

    /// Check on an outstanding request. Unknown droids fail.
    fn poll(&mut self, droid: ObjectId, map: &dyn TileBlocking) -> PathResult;

    /// Assignment-time pre-check: could a unit ever travel between the points?
    fn is_reachable(
        &self,
        from: Vec2Fixed,
        to: Vec2Fixed,
        propulsion: PropulsionKind,
        map: &dyn TileBlocking,
    ) -> bool;

    /// Forget any outstanding request for a droid.
    fn cancel(&mut self, _droid: ObjectId) {}
}

/// Damage produced by one weapon discharge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shot {
    /// Object hit.
    pub target: ObjectId,
    /// Body points removed.
    pub damage: u32,
}

/// Weapon resolution service.
pub trait Combat: Send {
    /// Discharge weapon `mount` of `firer` at `target`.
    ///
    /// Returns `None` if the weapon did not fire. The kernel applies the
    /// damage of a returned shot after the firer's turn.
    fn fire_weapon(&mut self, firer: &Droid, mount: usize, target: ObjectRef<'_>) -> Option<Shot>;

    /// True if shots already in flight will probably kill the target.
    fn is_probably_doomed(&self, _target: ObjectRef<'_>) -> bool {
        false
    }
}

/// Combat that always fires and never hurts anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCombat;

impl Combat for NullCombat {
    fn fire_weapon(&mut self, _firer: &Droid, _mount: usize, target: ObjectRef<'_>) -> Option<Shot> {
        Some(Shot {
            target: target.id(),
            damage: 0,
        })
    }
}

/// The bundle of collaborators handed to every update.
pub struct Environment {
    /// Terrain queries.
    pub terrain: Box<dyn Terrain>,
    /// Route planning.
    pub pathfinder: Box<dyn Pathfinder>,
    /// Weapon resolution.
    pub combat: Box<dyn Combat>,
}

impl Environment {
    /// Bundle collaborators.
    #[must_use]
    pub fn new(
        terrain: Box<dyn Terrain>,
        pathfinder: Box<dyn Pathfinder>,
        combat: Box<dyn Combat>,
    ) -> Self {
        Self {
            terrain,
            pathfinder,
            combat,
        }
    }

    /// Flat open map with the built-in A* planner and harmless combat.
    #[must_use]
    pub fn flat(width: i32, height: i32) -> Self {
        Self::from_tile_map(TileMap::new(width, height))
    }

    /// A tile map with the built-in A* planner and harmless combat.
    #[must_use]
    pub fn from_tile_map(map: TileMap) -> Self {
        Self::new(
            Box::new(map),
            Box::new(AStarPathfinder::new()),
            Box::new(NullCombat),
        )
    }

    /// Map size reported by the terrain.
    #[must_use]
    pub fn map_size(&self) -> (i32, i32) {
        self.terrain.map_size()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("map_size", &self.terrain.map_size())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_water_blocks_ground_only() {
        assert!(TerrainType::Water.blocks(PropulsionKind::Tracked));
        assert!(TerrainType::Water.blocks(PropulsionKind::Legged));
        assert!(!TerrainType::Water.blocks(PropulsionKind::Hover));
        assert!(!TerrainType::Water.blocks(PropulsionKind::Lift));
    }

    #[test]
    fn test_cliff_blocks_all_but_lift() {
        assert!(TerrainType::Cliff.blocks(PropulsionKind::Hover));
        assert!(!TerrainType::Cliff.blocks(PropulsionKind::Lift));
        assert!(!TerrainType::Road.blocks(PropulsionKind::Wheeled));
    }

    #[test]
    fn test_road_is_faster_for_wheels() {
        assert!(
            TerrainType::Road.speed_percent(PropulsionKind::Wheeled)
                > TerrainType::Normal.speed_percent(PropulsionKind::Wheeled)
        );
        assert_eq!(TerrainType::Road.speed_percent(PropulsionKind::Lift), 100);
    }

    #[test]
    fn test_flat_environment_map_size() {
        let env = Environment::flat(16, 8);
        assert_eq!(env.map_size(), (16, 8));
        assert!(!env.terrain.is_blocking_tile(TilePos::new(3, 3), PropulsionKind::Wheeled));
        assert!(env.terrain.is_blocking_tile(TilePos::new(16, 3), PropulsionKind::Wheeled));
    }
}
