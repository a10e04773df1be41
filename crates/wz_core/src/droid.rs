//! Droid records.
//!
//! A [`Droid`] carries its identity, kinematic state, component stats and
//! the three layers of intent the kernel drives every tick: the order
//! (what), the action (how) and the movement state (where to next).

use serde::{Deserialize, Serialize};

use crate::action::{ActionKind, ActionState};
use crate::math::{fixed_serde, Angle, Fixed, TilePos, Vec2Fixed};
use crate::movement::{MoveState, MoveStatus};
use crate::object::{percent, ObjectId, PlayerId};
use crate::order::{Order, OrderQueue};
use crate::secondary::SecondaryOrders;

/// Role of a droid. Decides which orders and actions are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DroidCategory {
    /// Weapon carrier.
    Weapon,
    /// Sensor turret.
    Sensor,
    /// Electronic countermeasures.
    Ecm,
    /// Construction vehicle.
    Construct,
    /// Infantry.
    Person,
    /// Weapon cyborg.
    Cyborg,
    /// Combat engineer.
    CyborgConstruct,
    /// Cyborg mechanic.
    CyborgRepair,
    /// Super cyborg.
    CyborgSuper,
    /// Troop transporter.
    Transporter,
    /// Commander.
    Command,
    /// Repair vehicle.
    Repair,
    /// Anything else (e.g. a bare body).
    Default,
}

/// Per-category capabilities consulted at decision points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryTraits {
    /// Diagnostic name.
    pub name: &'static str,
    /// Uses the cyborg movement model.
    pub cyborg: bool,
    /// Uses the person movement model and can be squished.
    pub person: bool,
    /// Can build, demolish, repair structures and clear wrecks.
    pub constructor: bool,
    /// Can repair other droids.
    pub droid_repairer: bool,
    /// Spots for indirect fire.
    pub sensor: bool,
    /// Leads a command group.
    pub commander: bool,
    /// Carries other droids.
    pub transporter: bool,
}

const fn traits(name: &'static str) -> CategoryTraits {
    CategoryTraits {
        name,
        cyborg: false,
        person: false,
        constructor: false,
        droid_repairer: false,
        sensor: false,
        commander: false,
        transporter: false,
    }
}

static CATEGORY_TRAITS: [CategoryTraits; 13] = [
    traits("DROID_WEAPON"),
    CategoryTraits {
        sensor: true,
        ..traits("DROID_SENSOR")
    },
    traits("DROID_ECM"),
    CategoryTraits {
        constructor: true,
        ..traits("DROID_CONSTRUCT")
    },
    CategoryTraits {
        person: true,
        ..traits("DROID_PERSON")
    },
    CategoryTraits {
        cyborg: true,
        ..traits("DROID_CYBORG")
    },
    CategoryTraits {
        cyborg: true,
        constructor: true,
        ..traits("DROID_CYBORG_CONSTRUCT")
    },
    CategoryTraits {
        cyborg: true,
        droid_repairer: true,
        ..traits("DROID_CYBORG_REPAIR")
    },
    CategoryTraits {
        cyborg: true,
        ..traits("DROID_CYBORG_SUPER")
    },
    CategoryTraits {
        transporter: true,
        ..traits("DROID_TRANSPORTER")
    },
    CategoryTraits {
        commander: true,
        ..traits("DROID_COMMAND")
    },
    CategoryTraits {
        droid_repairer: true,
        ..traits("DROID_REPAIR")
    },
    traits("DROID_DEFAULT"),
];

impl DroidCategory {
    /// Capability row for this category.
    #[must_use]
    pub fn traits(self) -> &'static CategoryTraits {
        let index = match self {
            Self::Weapon => 0,
            Self::Sensor => 1,
            Self::Ecm => 2,
            Self::Construct => 3,
            Self::Person => 4,
            Self::Cyborg => 5,
            Self::CyborgConstruct => 6,
            Self::CyborgRepair => 7,
            Self::CyborgSuper => 8,
            Self::Transporter => 9,
            Self::Command => 10,
            Self::Repair => 11,
            Self::Default => 12,
        };
        &CATEGORY_TRAITS[index]
    }
}

/// Propulsion type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropulsionKind {
    /// Wheels.
    Wheeled,
    /// Half-tracks.
    HalfTracked,
    /// Tracks.
    Tracked,
    /// Legs (people and cyborgs).
    Legged,
    /// Hover craft; crosses water.
    Hover,
    /// VTOL lift.
    Lift,
    /// Boats.
    Propellor,
}

impl PropulsionKind {
    /// True for VTOL propulsion.
    #[must_use]
    pub const fn is_lift(self) -> bool {
        matches!(self, Self::Lift)
    }
}

/// Propulsion statistics supplied at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropulsionStats {
    /// Propulsion type.
    pub kind: PropulsionKind,
    /// Top speed on ideal terrain, world units per second.
    pub max_speed: i32,
}

/// Body size class; decides the collision radius of vehicles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodySize {
    /// Light body.
    Light,
    /// Medium body.
    Medium,
    /// Heavy body.
    Heavy,
    /// Super heavy body.
    SuperHeavy,
}

/// Weapon statistics for one mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponStats {
    /// Long range in world units.
    pub long_range: i32,
    /// Short range in world units.
    pub short_range: i32,
    /// Minimum range in world units.
    pub min_range: i32,
    /// Hit chance at long range (percent).
    pub long_hit: u8,
    /// Hit chance at short range (percent).
    pub short_hit: u8,
    /// Lobbed (indirect) fire.
    pub indirect: bool,
    /// May fire while moving.
    pub fire_on_move: bool,
    /// Mounted on a rotating turret.
    pub rotates: bool,
    /// Weight; heavier turrets turn slower.
    pub weight: u32,
    /// Lowest elevation in degrees.
    pub min_elevation: i32,
    /// Highest elevation in degrees.
    pub max_elevation: i32,
    /// Attack runs per load for VTOL weapons, `0` for unlimited.
    pub num_attack_runs: u32,
    /// VTOL weapons that cannot aim off-centre (bombs, EMP).
    pub fixed_aim: bool,
    /// Electronic warfare weapon.
    pub electronic: bool,
    /// Reload time in milliseconds.
    pub firing_delay: u32,
}

impl Default for WeaponStats {
    fn default() -> Self {
        Self {
            long_range: 768,
            short_range: 384,
            min_range: 0,
            long_hit: 50,
            short_hit: 70,
            indirect: false,
            fire_on_move: true,
            rotates: true,
            weight: 1000,
            min_elevation: -30,
            max_elevation: 60,
            num_attack_runs: 0,
            fixed_aim: false,
            electronic: false,
            firing_delay: 1000,
        }
    }
}

/// A weapon mount on a droid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponMount {
    /// Stats of the mounted weapon.
    pub stats: WeaponStats,
    /// Game time (ms) the weapon last fired.
    pub last_fired: u64,
    /// Attack runs used since the last rearm.
    pub used_ammo: u32,
    /// Turret yaw relative to the body.
    pub rotation: Angle,
    /// Turret pitch.
    pub pitch: Angle,
}

impl WeaponMount {
    /// Fresh mount for a weapon.
    #[must_use]
    pub fn new(stats: WeaponStats) -> Self {
        Self {
            stats,
            last_fired: 0,
            used_ammo: 0,
            rotation: 0,
            pitch: 0,
        }
    }

    /// True when a VTOL weapon has used all its runs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stats.num_attack_runs > 0 && self.used_ammo >= self.stats.num_attack_runs
    }
}

/// Body orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rotation {
    /// Yaw.
    pub direction: Angle,
    /// Pitch, nose up positive.
    pub pitch: Angle,
    /// Roll.
    pub roll: Angle,
}

/// Everything needed to spawn a droid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroidTemplate {
    /// Role.
    pub category: DroidCategory,
    /// Body size class.
    pub body_size: BodySize,
    /// Propulsion.
    pub propulsion: PropulsionStats,
    /// Maximum body points.
    pub body: u32,
    /// Weapons, at most three.
    #[serde(default)]
    pub weapons: Vec<WeaponStats>,
    /// Sensor range in world units.
    #[serde(default = "default_sensor_range")]
    pub sensor_range: i32,
    /// Build points added per second while constructing.
    #[serde(default)]
    pub construct_points: u32,
    /// Body points healed per second while repairing.
    #[serde(default)]
    pub repair_points: u32,
}

impl Default for DroidTemplate {
    /// Unarmed medium wheeled weapon droid.
    fn default() -> Self {
        Self {
            category: DroidCategory::Weapon,
            body_size: BodySize::Medium,
            propulsion: PropulsionStats {
                kind: PropulsionKind::Wheeled,
                max_speed: 400,
            },
            body: 200,
            weapons: Vec::new(),
            sensor_range: default_sensor_range(),
            construct_points: 0,
            repair_points: 0,
        }
    }
}

fn default_sensor_range() -> i32 {
    1024
}

/// Maximum number of weapon mounts.
pub const MAX_WEAPONS: usize = 3;

/// A simulated unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Droid {
    /// Unique id.
    pub id: ObjectId,
    /// Owning player.
    pub player: PlayerId,
    /// Role.
    pub category: DroidCategory,
    /// Body size class.
    pub body_size: BodySize,
    /// Propulsion.
    pub propulsion: PropulsionStats,
    /// World position.
    pub pos: Vec2Fixed,
    /// Height.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
    /// Orientation.
    pub rot: Rotation,
    /// Current body points.
    pub body: u32,
    /// Maximum body points.
    pub original_body: u32,
    /// Weapon mounts.
    pub weapons: Vec<WeaponMount>,
    /// Sensor range in world units.
    pub sensor_range: i32,
    /// Build points per second.
    pub construct_points: u32,
    /// Repair points per second.
    pub repair_points: u32,
    /// Current order.
    pub order: Order,
    /// Pending orders.
    pub order_queue: OrderQueue,
    /// Current action and its payload.
    pub action: ActionState,
    /// Movement state.
    pub movement: MoveState,
    /// Secondary order bits.
    pub secondary: SecondaryOrders,
    /// Commander this droid is attached to.
    pub commander: Option<ObjectId>,
    /// Numeric selection group.
    pub group: Option<u8>,
    /// Home rearm pad for VTOLs.
    pub base_structure: Option<ObjectId>,
    /// Tick at which the droid was marked dead.
    pub died: Option<u64>,
}

impl Droid {
    /// Create a droid from a template.
    #[must_use]
    pub fn new(id: ObjectId, player: PlayerId, template: &DroidTemplate, pos: Vec2Fixed) -> Self {
        Self {
            id,
            player,
            category: template.category,
            body_size: template.body_size,
            propulsion: template.propulsion,
            pos,
            z: Fixed::ZERO,
            rot: Rotation::default(),
            body: template.body,
            original_body: template.body,
            weapons: template
                .weapons
                .iter()
                .take(MAX_WEAPONS)
                .cloned()
                .map(WeaponMount::new)
                .collect(),
            sensor_range: template.sensor_range,
            construct_points: template.construct_points,
            repair_points: template.repair_points,
            order: Order::None,
            order_queue: OrderQueue::default(),
            action: ActionState::default(),
            movement: MoveState::default(),
            secondary: SecondaryOrders::default(),
            commander: None,
            group: None,
            base_structure: None,
            died: None,
        }
    }

    /// Capability row of this droid's category.
    #[must_use]
    pub fn traits(&self) -> &'static CategoryTraits {
        self.category.traits()
    }

    /// VTOL (lift propulsion).
    #[must_use]
    pub fn is_vtol(&self) -> bool {
        self.propulsion.kind.is_lift()
    }

    /// Transporter.
    #[must_use]
    pub fn is_transporter(&self) -> bool {
        self.traits().transporter
    }

    /// Cyborg of any kind.
    #[must_use]
    pub fn is_cyborg(&self) -> bool {
        self.traits().cyborg
    }

    /// Person (infantry).
    #[must_use]
    pub fn is_person(&self) -> bool {
        self.traits().person
    }

    /// Construction droid or combat engineer.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.traits().constructor
    }

    /// Repair droid or cyborg mechanic.
    #[must_use]
    pub fn is_repairer(&self) -> bool {
        self.traits().droid_repairer
    }

    /// Commander.
    #[must_use]
    pub fn is_commander(&self) -> bool {
        self.traits().commander
    }

    /// Carries an electronic warfare weapon.
    #[must_use]
    pub fn is_electronic(&self) -> bool {
        self.weapons.iter().any(|w| w.stats.electronic)
    }

    /// Has at least one weapon.
    #[must_use]
    pub fn has_weapon(&self) -> bool {
        !self.weapons.is_empty()
    }

    /// Tile under the droid.
    #[must_use]
    pub fn tile(&self) -> TilePos {
        TilePos::of(self.pos)
    }

    /// Collision radius derived from the category and body size.
    #[must_use]
    pub fn radius(&self) -> i32 {
        if self.is_person() {
            return 20;
        }
        if self.is_cyborg() {
            return 30;
        }
        match self.body_size {
            BodySize::Light => 40,
            BodySize::Medium => 50,
            BodySize::Heavy => 60,
            BodySize::SuperHeavy => 130,
        }
    }

    /// Body points as a percentage of the maximum.
    #[must_use]
    pub fn health_percent(&self) -> u32 {
        percent(self.body, self.original_body)
    }

    /// True when the movement state is not translating.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(
            self.movement.status,
            MoveStatus::Inactive | MoveStatus::Hover | MoveStatus::Shuffle
        )
    }

    /// Every limited-ammo weapon is out of attack runs.
    #[must_use]
    pub fn vtol_empty(&self) -> bool {
        self.is_vtol()
            && self
                .weapons
                .iter()
                .filter(|w| w.stats.num_attack_runs > 0)
                .all(WeaponMount::is_empty)
            && self.weapons.iter().any(|w| w.stats.num_attack_runs > 0)
    }

    /// No attack runs used on any weapon.
    #[must_use]
    pub fn vtol_full(&self) -> bool {
        self.is_vtol() && self.weapons.iter().all(|w| w.used_ammo == 0)
    }

    /// Fully rearmed and repaired.
    #[must_use]
    pub fn vtol_happy(&self) -> bool {
        self.vtol_full() && self.body >= self.original_body
    }

    /// Somewhere in the rearm cycle.
    #[must_use]
    pub fn vtol_rearming(&self) -> bool {
        self.is_vtol()
            && matches!(
                self.action.kind,
                ActionKind::MoveToRearm
                    | ActionKind::WaitForRearm
                    | ActionKind::MoveToRearmPoint
                    | ActionKind::WaitDuringRearm
            )
    }

    /// Weapon slot 0 fired within `window_ms` of `now`.
    #[must_use]
    pub fn fired_recently(&self, now: u64, window_ms: u32) -> bool {
        self.weapons
            .first()
            .is_some_and(|w| w.last_fired > 0 && now.saturating_sub(w.last_fired) < u64::from(window_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(category: DroidCategory, kind: PropulsionKind) -> DroidTemplate {
        DroidTemplate {
            category,
            body_size: BodySize::Medium,
            propulsion: PropulsionStats {
                kind,
                max_speed: 500,
            },
            body: 200,
            weapons: vec![WeaponStats::default()],
            sensor_range: 1024,
            construct_points: 0,
            repair_points: 0,
        }
    }

    #[test]
    fn test_category_traits_table() {
        assert!(DroidCategory::Construct.traits().constructor);
        assert!(DroidCategory::CyborgConstruct.traits().constructor);
        assert!(DroidCategory::CyborgConstruct.traits().cyborg);
        assert!(DroidCategory::Repair.traits().droid_repairer);
        assert!(DroidCategory::Command.traits().commander);
        assert!(!DroidCategory::Weapon.traits().constructor);
        assert_eq!(DroidCategory::Person.traits().name, "DROID_PERSON");
    }

    #[test]
    fn test_radius_ordering() {
        let pos = Vec2Fixed::ZERO;
        let person = Droid::new(ObjectId(1), 0, &template(DroidCategory::Person, PropulsionKind::Legged), pos);
        let cyborg = Droid::new(ObjectId(2), 0, &template(DroidCategory::Cyborg, PropulsionKind::Legged), pos);
        let tank = Droid::new(ObjectId(3), 0, &template(DroidCategory::Weapon, PropulsionKind::Tracked), pos);
        assert!(person.radius() < cyborg.radius());
        assert!(cyborg.radius() < tank.radius());
    }

    #[test]
    fn test_vtol_ammo_states() {
        let mut t = template(DroidCategory::Weapon, PropulsionKind::Lift);
        t.weapons[0].num_attack_runs = 2;
        let mut vtol = Droid::new(ObjectId(1), 0, &t, Vec2Fixed::ZERO);
        assert!(vtol.vtol_full());
        assert!(!vtol.vtol_empty());
        vtol.weapons[0].used_ammo = 2;
        assert!(vtol.vtol_empty());
        assert!(!vtol.vtol_happy());
    }

    #[test]
    fn test_ground_droid_is_never_vtol_empty() {
        let tank = Droid::new(
            ObjectId(1),
            0,
            &template(DroidCategory::Weapon, PropulsionKind::Wheeled),
            Vec2Fixed::ZERO,
        );
        assert!(!tank.vtol_empty());
        assert!(tank.is_stopped());
    }
}
