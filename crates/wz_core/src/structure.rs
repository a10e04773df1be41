//! Structures and features.
//!
//! These are collaborator-owned objects in the wider game; the kernel keeps
//! just the bookkeeping droids interact with: footprints for blocking and
//! build-position tests, build/repair progress, repair facility patients,
//! rearm pad claims and gate state.

use serde::{Deserialize, Serialize};

use crate::math::{TilePos, Vec2Fixed, TILE_UNITS};
use crate::object::{ObjectId, PlayerId};

/// Structure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureKind {
    /// Command centre.
    Hq,
    /// Vehicle factory.
    Factory,
    /// Cyborg factory.
    CyborgFactory,
    /// VTOL factory.
    VtolFactory,
    /// Repair facility.
    RepairFacility,
    /// VTOL rearm pad.
    RearmPad,
    /// Gate; opens for friendly droids.
    Gate,
    /// Wall segment.
    Wall,
    /// Defensive emplacement.
    Defense,
    /// Oil derrick; built on an oil resource.
    ResourceExtractor,
    /// Anything else.
    Generic,
}

impl StructureKind {
    /// Factories that can recycle droids.
    #[must_use]
    pub const fn is_factory(self) -> bool {
        matches!(self, Self::Factory | Self::CyborgFactory | Self::VtolFactory)
    }
}

/// Construction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureStatus {
    /// Foundation laid; accumulating build points.
    BeingBuilt,
    /// Finished.
    Built,
}

/// Stats reference carried by build orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureTemplate {
    /// Structure type.
    pub kind: StructureKind,
    /// Footprint width in tiles.
    pub width: i32,
    /// Footprint breadth in tiles.
    pub breadth: i32,
    /// Build points needed to finish.
    pub build_points: u32,
    /// Body points when finished.
    pub body: u32,
}

impl StructureTemplate {
    /// A one-tile template.
    #[must_use]
    pub fn single_tile(kind: StructureKind) -> Self {
        Self {
            kind,
            width: 1,
            breadth: 1,
            build_points: 500,
            body: 1000,
        }
    }
}

/// Type-specific bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureFunction {
    /// No special behaviour.
    None,
    /// A repair facility and the droid it is servicing.
    RepairFacility {
        /// Droid currently being repaired.
        patient: Option<ObjectId>,
        /// Body points healed per second.
        repair_rate: u32,
        /// Game time (ms) healing of the current patient began.
        started: Option<u64>,
        /// Body points already restored on the current patient.
        points: u32,
    },
    /// A rearm pad and the VTOL it is assigned to.
    RearmPad {
        /// VTOL assigned to (approaching or on) the pad.
        vtol: Option<ObjectId>,
        /// Attack runs restored per second.
        rearm_rate: u32,
        /// Fractional rearm progress in milliseconds.
        progress_ms: u32,
    },
    /// A gate.
    Gate {
        /// Open for friendly traffic.
        open: bool,
        /// Game time (ms) the gate was last opened.
        opened_at: u64,
    },
}

/// A structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    /// Unique id.
    pub id: ObjectId,
    /// Owning player.
    pub player: PlayerId,
    /// Structure type.
    pub kind: StructureKind,
    /// Centre of the footprint.
    pub pos: Vec2Fixed,
    /// Footprint width in tiles.
    pub width: i32,
    /// Footprint breadth in tiles.
    pub breadth: i32,
    /// Construction state.
    pub status: StructureStatus,
    /// Current body points.
    pub body: u32,
    /// Maximum body points.
    pub max_body: u32,
    /// Accumulated build points.
    pub build_points: u32,
    /// Build points needed to finish.
    pub build_points_required: u32,
    /// Number of modules built onto the base structure.
    pub modules: u8,
    /// Electronic resistance remaining.
    pub resistance: u32,
    /// Maximum electronic resistance.
    pub max_resistance: u32,
    /// Sensor range for visibility.
    pub sensor_range: i32,
    /// Type-specific bookkeeping.
    pub function: StructureFunction,
    /// Tick at which the structure was marked dead.
    pub died: Option<u64>,
}

impl Structure {
    /// Create a structure from a template.
    #[must_use]
    pub fn new(
        id: ObjectId,
        player: PlayerId,
        template: &StructureTemplate,
        pos: Vec2Fixed,
        status: StructureStatus,
    ) -> Self {
        let function = match template.kind {
            StructureKind::RepairFacility => StructureFunction::RepairFacility {
                patient: None,
                repair_rate: 100,
                started: None,
                points: 0,
            },
            StructureKind::RearmPad => StructureFunction::RearmPad {
                vtol: None,
                rearm_rate: 1,
                progress_ms: 0,
            },
            StructureKind::Gate => StructureFunction::Gate {
                open: false,
                opened_at: 0,
            },
            _ => StructureFunction::None,
        };
        let built = status == StructureStatus::Built;
        Self {
            id,
            player,
            kind: template.kind,
            pos,
            width: template.width.max(1),
            breadth: template.breadth.max(1),
            status,
            body: if built { template.body } else { template.body / 10 },
            max_body: template.body,
            build_points: if built { template.build_points } else { 0 },
            build_points_required: template.build_points,
            modules: 0,
            resistance: 100,
            max_resistance: 100,
            sensor_range: 1024,
            function,
            died: None,
        }
    }

    /// Collision radius.
    #[must_use]
    pub fn radius(&self) -> i32 {
        self.width.max(self.breadth) * TILE_UNITS / 2
    }

    /// Top-left tile of the footprint.
    #[must_use]
    pub fn footprint_origin(&self) -> TilePos {
        footprint_origin(self.pos, self.width, self.breadth)
    }

    /// Every tile covered by the footprint.
    pub fn footprint(&self) -> impl Iterator<Item = TilePos> {
        let origin = self.footprint_origin();
        let (w, b) = (self.width, self.breadth);
        (0..b).flat_map(move |dy| (0..w).map(move |dx| origin.offset(dx, dy)))
    }

    /// True if the tile lies inside the footprint.
    #[must_use]
    pub fn covers(&self, tile: TilePos) -> bool {
        let o = self.footprint_origin();
        tile.x >= o.x && tile.x < o.x + self.width && tile.y >= o.y && tile.y < o.y + self.breadth
    }

    /// True once construction finished.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.status == StructureStatus::Built
    }

    /// True if the structure is damaged.
    #[must_use]
    pub fn is_damaged(&self) -> bool {
        self.body < self.max_body
    }

    /// Open gate state, `None` for non-gates.
    #[must_use]
    pub fn gate_open(&self) -> Option<bool> {
        match self.function {
            StructureFunction::Gate { open, .. } => Some(open),
            _ => None,
        }
    }

    /// Droid assigned to a rearm pad.
    #[must_use]
    pub fn pad_vtol(&self) -> Option<ObjectId> {
        match self.function {
            StructureFunction::RearmPad { vtol, .. } => vtol,
            _ => None,
        }
    }

    /// Droid being serviced by a repair facility.
    #[must_use]
    pub fn facility_patient(&self) -> Option<ObjectId> {
        match self.function {
            StructureFunction::RepairFacility { patient, .. } => patient,
            _ => None,
        }
    }
}

/// Top-left tile of a footprint centred at `pos`.
#[must_use]
pub fn footprint_origin(pos: Vec2Fixed, width: i32, breadth: i32) -> TilePos {
    let (x, y) = pos.to_ints();
    TilePos::new(
        (x - width * TILE_UNITS / 2).div_euclid(TILE_UNITS),
        (y - breadth * TILE_UNITS / 2).div_euclid(TILE_UNITS),
    )
}

/// Feature type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureKind {
    /// Building wreckage; constructors clear it.
    Wreck,
    /// Oil resource; derricks are built on it.
    OilResource,
    /// Technology artifact; picked up by RECOVER.
    Artifact,
    /// Trees, boulders and so on.
    Generic,
}

/// A map feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Unique id.
    pub id: ObjectId,
    /// Feature type.
    pub kind: FeatureKind,
    /// World position.
    pub pos: Vec2Fixed,
    /// Collision radius.
    pub radius: i32,
    /// Body points (clearing progress for wrecks).
    pub body: u32,
    /// Game time (ms) until which an oil resource is burning.
    pub burning_until: Option<u64>,
    /// Tick at which the feature was marked dead.
    pub died: Option<u64>,
}

impl Feature {
    /// Create a feature.
    #[must_use]
    pub fn new(id: ObjectId, kind: FeatureKind, pos: Vec2Fixed) -> Self {
        Self {
            id,
            kind,
            pos,
            radius: TILE_UNITS / 2,
            body: 200,
            burning_until: None,
            died: None,
        }
    }

    /// True while an oil fire is burning at `now`.
    #[must_use]
    pub fn is_burning(&self, now: u64) -> bool {
        self.burning_until.is_some_and(|t| t > now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footprint_of_two_by_two() {
        let t = StructureTemplate {
            kind: StructureKind::Factory,
            width: 2,
            breadth: 2,
            build_points: 100,
            body: 100,
        };
        let s = Structure::new(
            ObjectId(1),
            0,
            &t,
            Vec2Fixed::from_ints(5 * TILE_UNITS, 5 * TILE_UNITS),
            StructureStatus::Built,
        );
        let tiles: Vec<_> = s.footprint().collect();
        assert_eq!(
            tiles,
            vec![
                TilePos::new(4, 4),
                TilePos::new(5, 4),
                TilePos::new(4, 5),
                TilePos::new(5, 5)
            ]
        );
        assert!(s.covers(TilePos::new(5, 5)));
        assert!(!s.covers(TilePos::new(6, 5)));
    }

    #[test]
    fn test_single_tile_footprint_is_its_tile() {
        let s = Structure::new(
            ObjectId(1),
            0,
            &StructureTemplate::single_tile(StructureKind::Wall),
            TilePos::new(3, 7).center(),
            StructureStatus::Built,
        );
        assert_eq!(s.footprint_origin(), TilePos::new(3, 7));
        assert_eq!(s.footprint().count(), 1);
    }

    #[test]
    fn test_function_matches_kind() {
        let pad = Structure::new(
            ObjectId(2),
            0,
            &StructureTemplate::single_tile(StructureKind::RearmPad),
            Vec2Fixed::ZERO,
            StructureStatus::Built,
        );
        assert_eq!(pad.pad_vtol(), None);
        assert!(matches!(pad.function, StructureFunction::RearmPad { .. }));
        assert_eq!(pad.gate_open(), None);
    }

    #[test]
    fn test_burning_feature() {
        let mut oil = Feature::new(ObjectId(3), FeatureKind::OilResource, Vec2Fixed::ZERO);
        assert!(!oil.is_burning(0));
        oil.burning_until = Some(500);
        assert!(oil.is_burning(100));
        assert!(!oil.is_burning(500));
    }
}
