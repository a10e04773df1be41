//! Action state machine.
//!
//! An action is the concrete, moment-to-moment behaviour that serves the
//! droid's current order: "move to attack", "rotate to attack", "attack",
//! "move to build" and so on. The order layer picks an action with one of
//! the `action_droid*` calls; [`update::action_update_droid`] then advances
//! it every tick until it falls back to [`ActionKind::None`].
//!
//! Assigning an action immediately decides the first transitional step: an
//! ATTACK on a far target becomes MOVETOATTACK, a BUILD becomes MOVETOBUILD,
//! and so on.

pub mod targeting;
pub mod update;
pub mod vtol;
pub mod work;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::droid::{Droid, MAX_WEAPONS};
use crate::environment::Environment;
use crate::math::{Fixed, Vec2Fixed, TILE_UNITS};
use crate::movement::{
    move_droid_to, move_droid_to_direct, move_droid_to_no_formation, move_stop_droid, move_turn_droid,
};
use crate::object::{ObjectId, ObjectRef, PlayerId};
use crate::order::{order_droid, OrderKind};
use crate::secondary::{halt_type, HaltType};
use crate::structure::{footprint_origin, StructureKind};
use crate::world::World;

pub use update::action_update_droid;

/// What a droid is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ActionKind {
    /// Idle.
    #[default]
    None,
    /// Driving to a point.
    Move,
    /// Constructing a structure.
    Build,
    /// Laying a foundation.
    BuildFoundation,
    /// Tearing a structure down.
    Demolish,
    /// Repairing a structure.
    Repair,
    /// Shooting at a target in range.
    Attack,
    /// Watching a target with the sensor.
    Observe,
    /// Supporting a sensor with indirect fire.
    FireSupport,
    /// Sulking after a failed route.
    Sulk,
    /// Counting down to self destruction.
    Destruct,
    /// Transporter flying off the map.
    TransportOut,
    /// Transporter waiting to fly in.
    TransportWaitToFlyIn,
    /// Transporter flying in.
    TransportIn,
    /// Repairing another droid.
    DroidRepair,
    /// Restoring a structure's resistance.
    Restore,
    /// Clearing a wreck.
    ClearWreck,
    /// Moving and shooting at targets of opportunity.
    MoveFire,
    /// Driving to a build site.
    MoveToBuild,
    /// Driving to a structure to demolish it.
    MoveToDemolish,
    /// Driving to a structure to repair it.
    MoveToRepair,
    /// Wandering around a build site.
    BuildWander,
    /// Wandering around a foundation.
    FoundationWander,
    /// Closing in on a target.
    MoveToAttack,
    /// Turning a fixed weapon towards a target.
    RotateToAttack,
    /// Closing in to observe a target.
    MoveToObserve,
    /// Waiting for a repair facility.
    WaitForRepair,
    /// Driving onto a repair facility.
    MoveToRepairPoint,
    /// Being repaired at a facility.
    WaitDuringRepair,
    /// Closing in on a droid to repair it.
    MoveToDroidRepair,
    /// Driving to a structure to restore it.
    MoveToRestore,
    /// Driving to a wreck to clear it.
    MoveToClear,
    /// Flying back to a rearm pad.
    MoveToRearm,
    /// Waiting for a free rearm pad.
    WaitForRearm,
    /// Landing on a rearm pad.
    MoveToRearmPoint,
    /// Being rearmed on a pad.
    WaitDuringRearm,
    /// Flying an attack run.
    VtolAttack,
    /// Moving off a rearm pad for another VTOL.
    ClearRearmPad,
    /// Returning to where an attack began.
    ReturnToPos,
    /// Falling back from a sensor target.
    FireSupportRetreat,
    /// Circling a point.
    Circle,
}

impl ActionKind {
    /// Diagnostic name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "DACTION_NONE",
            Self::Move => "DACTION_MOVE",
            Self::Build => "DACTION_BUILD",
            Self::BuildFoundation => "DACTION_BUILD_FOUNDATION",
            Self::Demolish => "DACTION_DEMOLISH",
            Self::Repair => "DACTION_REPAIR",
            Self::Attack => "DACTION_ATTACK",
            Self::Observe => "DACTION_OBSERVE",
            Self::FireSupport => "DACTION_FIRESUPPORT",
            Self::Sulk => "DACTION_SULK",
            Self::Destruct => "DACTION_DESTRUCT",
            Self::TransportOut => "DACTION_TRANSPORTOUT",
            Self::TransportWaitToFlyIn => "DACTION_TRANSPORTWAITTOFLYIN",
            Self::TransportIn => "DACTION_TRANSPORTIN",
            Self::DroidRepair => "DACTION_DROIDREPAIR",
            Self::Restore => "DACTION_RESTORE",
            Self::ClearWreck => "DACTION_CLEARWRECK",
            Self::MoveFire => "DACTION_MOVEFIRE",
            Self::MoveToBuild => "DACTION_MOVETOBUILD",
            Self::MoveToDemolish => "DACTION_MOVETODEMOLISH",
            Self::MoveToRepair => "DACTION_MOVETOREPAIR",
            Self::BuildWander => "DACTION_BUILDWANDER",
            Self::FoundationWander => "DACTION_FOUNDATION_WANDER",
            Self::MoveToAttack => "DACTION_MOVETOATTACK",
            Self::RotateToAttack => "DACTION_ROTATETOATTACK",
            Self::MoveToObserve => "DACTION_MOVETOOBSERVE",
            Self::WaitForRepair => "DACTION_WAITFORREPAIR",
            Self::MoveToRepairPoint => "DACTION_MOVETOREPAIRPOINT",
            Self::WaitDuringRepair => "DACTION_WAITDURINGREPAIR",
            Self::MoveToDroidRepair => "DACTION_MOVETODROIDREPAIR",
            Self::MoveToRestore => "DACTION_MOVETORESTORE",
            Self::MoveToClear => "DACTION_MOVETOCLEAR",
            Self::MoveToRearm => "DACTION_MOVETOREARM",
            Self::WaitForRearm => "DACTION_WAITFORREARM",
            Self::MoveToRearmPoint => "DACTION_MOVETOREARMPOINT",
            Self::WaitDuringRearm => "DACTION_WAITDURINGREARM",
            Self::VtolAttack => "DACTION_VTOLATTACK",
            Self::ClearRearmPad => "DACTION_CLEARREARMPAD",
            Self::ReturnToPos => "DACTION_RETURNTOPOS",
            Self::FireSupportRetreat => "DACTION_FIRESUPPORT_RETREAT",
            Self::Circle => "DACTION_CIRCLE",
        }
    }

    /// True for the actions that engage an enemy.
    #[must_use]
    pub const fn is_attacking(self) -> bool {
        matches!(
            self,
            Self::Attack | Self::MoveToAttack | Self::RotateToAttack | Self::VtolAttack | Self::MoveFire
        )
    }

    /// True for the actions whose turret keeps tracking its target; all
    /// other actions let turrets drift back to the centre.
    #[must_use]
    pub const fn keeps_turret(self) -> bool {
        matches!(
            self,
            Self::MoveFire
                | Self::Attack
                | Self::MoveToAttack
                | Self::MoveToDroidRepair
                | Self::DroidRepair
                | Self::Build
                | Self::Observe
                | Self::MoveToObserve
        )
    }
}

/// Current action and its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionState {
    /// Action kind.
    pub kind: ActionKind,
    /// One target per weapon mount; slot 0 is the primary target.
    pub targets: [Option<ObjectId>; MAX_WEAPONS],
    /// Position the action is about.
    pub pos: Vec2Fixed,
    /// Game time (ms) the action started; the end of a sulk.
    pub started: u64,
    /// Work points already applied by this action.
    pub points: u32,
}

impl ActionState {
    /// Primary target.
    #[must_use]
    pub fn target(&self) -> Option<ObjectId> {
        self.targets[0]
    }

    /// Set the target of one mount. Out-of-range slots are ignored.
    pub fn set_target(&mut self, slot: usize, target: Option<ObjectId>) {
        if let Some(t) = self.targets.get_mut(slot) {
            *t = target;
        }
    }

    /// Drop every target.
    pub fn clear_targets(&mut self) {
        self.targets = [None; MAX_WEAPONS];
    }

    /// True if any mount has a target.
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.targets.iter().any(Option::is_some)
    }

    /// Drop every reference to `id`.
    pub fn forget(&mut self, id: ObjectId) {
        for t in &mut self.targets {
            if *t == Some(id) {
                *t = None;
            }
        }
    }
}

/// Everything an action assignment needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActionRequest {
    kind: ActionKind,
    target: Option<ObjectId>,
    pos: Vec2Fixed,
}

/// Set an action without a target or position.
pub fn action_droid(world: &mut World, env: &mut Environment, droid: &mut Droid, kind: ActionKind) {
    let request = ActionRequest {
        kind,
        target: None,
        pos: droid.pos,
    };
    action_droid_base(world, env, droid, request);
}

/// Set an action about a position.
pub fn action_droid_loc(world: &mut World, env: &mut Environment, droid: &mut Droid, kind: ActionKind, pos: Vec2Fixed) {
    let request = ActionRequest {
        kind,
        target: None,
        pos,
    };
    action_droid_base(world, env, droid, request);
}

/// Set an action about an object. Unknown or dead objects are ignored.
pub fn action_droid_obj(world: &mut World, env: &mut Environment, droid: &mut Droid, kind: ActionKind, target: ObjectId) {
    let Some(pos) = world.live(target).map(ObjectRef::pos) else {
        debug!(droid = droid.id.0, target = target.0, action = kind.name(), "action target is gone");
        return;
    };
    let request = ActionRequest {
        kind,
        target: Some(target),
        pos,
    };
    action_droid_base(world, env, droid, request);
}

/// Set an action about an object at an explicit position.
pub fn action_droid_obj_loc(
    world: &mut World,
    env: &mut Environment,
    droid: &mut Droid,
    kind: ActionKind,
    target: ObjectId,
    pos: Vec2Fixed,
) {
    if !world.is_alive(target) {
        return;
    }
    let request = ActionRequest {
        kind,
        target: Some(target),
        pos,
    };
    action_droid_base(world, env, droid, request);
}

/// Change the action of a droid, logging the transition.
fn set_kind(droid: &mut Droid, kind: ActionKind) {
    if droid.action.kind != kind {
        debug!(
            droid = droid.id.0,
            from = droid.action.kind.name(),
            to = kind.name(),
            "action changed"
        );
    }
    droid.action.kind = kind;
}

/// Point `PULL_BACK_DIST` tiles behind `droid`, away from `target`,
/// clipped to the map.
pub(crate) fn pull_back_pos(world: &World, droid: &Droid, target: Vec2Fixed) -> Vec2Fixed {
    let away = droid.pos - target;
    let unit = if away.is_zero() {
        Vec2Fixed::from_ints(TILE_UNITS, TILE_UNITS)
    } else {
        away.with_length(Fixed::from_num(TILE_UNITS))
    };
    let dist = Fixed::from_num(world.tuning.pull_back_dist_tiles);
    clip_to_map(world, droid.pos + unit.scale(dist))
}

/// Clamp a world position inside the map.
pub(crate) fn clip_to_map(world: &World, pos: Vec2Fixed) -> Vec2Fixed {
    let (w, h) = world.map_size();
    let (x, y) = pos.to_ints();
    Vec2Fixed::from_ints(x.clamp(1, w * TILE_UNITS - 1), y.clamp(1, h * TILE_UNITS - 1))
}

/// True if the droid stands in the ring of tiles around a footprint of
/// `size` tiles centred at `pos`.
#[must_use]
pub fn reached_build_pos(droid: &Droid, pos: Vec2Fixed, size: (i32, i32)) -> bool {
    let (width, breadth) = size;
    let t = footprint_origin(pos, width, breadth);
    let d = droid.tile();
    if d.x == t.x - 1 || d.x == t.x + width {
        d.y >= t.y - 1 && d.y <= t.y + breadth
    } else if d.y == t.y - 1 || d.y == t.y + breadth {
        d.x >= t.x - 1 && d.x <= t.x + width
    } else {
        false
    }
}

/// True if the droid stands on a footprint of `size` tiles centred at `pos`.
#[must_use]
pub fn droid_on_build_pos(droid: &Droid, pos: Vec2Fixed, size: (i32, i32)) -> bool {
    let (width, breadth) = size;
    let t = footprint_origin(pos, width, breadth);
    let d = droid.tile();
    d.x >= t.x && d.x < t.x + width && d.y >= t.y && d.y < t.y + breadth
}

/// Where a player's droids retreat to when nothing else is known: the HQ,
/// else the landing zone.
#[must_use]
pub fn home_base_pos(world: &World, player: PlayerId) -> Option<Vec2Fixed> {
    world
        .structures()
        .find(|s| s.player == player && s.kind == StructureKind::Hq && s.died.is_none())
        .map(|s| s.pos)
        .or_else(|| world.player(player).landing_zone)
}

/// Footprint size of an object for the ring test.
#[must_use]
pub fn object_footprint(obj: ObjectRef<'_>) -> (i32, i32) {
    match obj {
        ObjectRef::Structure(s) => (s.width, s.breadth),
        ObjectRef::Droid(_) | ObjectRef::Feature(_) => (1, 1),
    }
}

/// Footprint the current build-family action works on: the order's
/// template for a new structure, else the primary target.
#[must_use]
pub(crate) fn action_footprint(world: &World, droid: &Droid) -> Option<(i32, i32)> {
    if let Some(template) = droid.order.template() {
        return Some((template.width.max(1), template.breadth.max(1)));
    }
    droid
        .action
        .target()
        .or_else(|| droid.order.target())
        .and_then(|id| world.live(id))
        .map(object_footprint)
}

fn holding_idle(droid: &Droid) -> bool {
    halt_type(droid) == HaltType::Hold && matches!(droid.order.kind(), OrderKind::None | OrderKind::TempHold)
}

fn action_droid_base(world: &mut World, env: &mut Environment, droid: &mut Droid, request: ActionRequest) {
    let now = world.time_ms;
    droid.action.started = now;

    match request.kind {
        ActionKind::None => {
            if !droid.is_stopped() {
                move_stop_droid(droid);
            }
            set_kind(droid, ActionKind::None);
            droid.action.pos = Vec2Fixed::ZERO;
            droid.action.started = 0;
            droid.action.points = 0;
            droid.action.clear_targets();
        }

        ActionKind::Attack => start_attack(world, env, droid, request),

        ActionKind::MoveToRearm => {
            let Some(pad) = request.target else {
                return;
            };
            set_kind(droid, ActionKind::MoveToRearm);
            droid.action.pos = request.pos;
            droid.action.set_target(0, Some(pad));
            land_near(world, env, droid, request.pos);
        }

        ActionKind::ClearRearmPad => {
            let Some(pad) = request.target else {
                return;
            };
            set_kind(droid, ActionKind::ClearRearmPad);
            droid.action.set_target(0, Some(pad));
            land_near(world, env, droid, request.pos);
        }

        ActionKind::Move
        | ActionKind::TransportIn
        | ActionKind::TransportOut
        | ActionKind::ReturnToPos
        | ActionKind::FireSupportRetreat => {
            set_kind(droid, request.kind);
            droid.action.pos = request.pos;
            droid.action.set_target(0, request.target);
            move_droid_to(world, env, droid, request.pos);
        }

        ActionKind::Build => {
            let Some(size) = action_footprint(world, droid) else {
                set_kind(droid, ActionKind::None);
                return;
            };
            set_kind(droid, ActionKind::MoveToBuild);
            droid.action.pos = request.pos;
            droid.action.set_target(0, droid.order.target());
            if droid_on_build_pos(droid, request.pos, size) {
                match home_base_pos(world, droid.player) {
                    Some(base) => {
                        move_droid_to_no_formation(world, env, droid, base);
                    }
                    None => set_kind(droid, ActionKind::None),
                }
            } else {
                move_droid_to_no_formation(world, env, droid, request.pos);
            }
        }

        ActionKind::Demolish => {
            set_kind(droid, ActionKind::MoveToDemolish);
            droid.action.pos = request.pos;
            droid.action.set_target(0, request.target);
            move_droid_to(world, env, droid, request.pos);
        }

        ActionKind::Repair => {
            droid.action.pos = request.pos;
            droid.action.set_target(0, request.target);
            if holding_idle(droid) {
                set_kind(droid, ActionKind::Repair);
            } else {
                set_kind(droid, ActionKind::MoveToRepair);
                move_droid_to(world, env, droid, request.pos);
            }
        }

        ActionKind::Observe => {
            droid.action.set_target(0, request.target);
            droid.action.pos = droid.pos;
            if holding_idle(droid) {
                set_kind(droid, ActionKind::Observe);
            } else {
                set_kind(droid, ActionKind::MoveToObserve);
                move_droid_to(world, env, droid, request.pos);
            }
        }

        ActionKind::FireSupport => {
            set_kind(droid, ActionKind::FireSupport);
            let spotter = droid.order.target().and_then(|id| world.live(id)).and_then(ObjectRef::as_droid);
            if let Some(spotter_pos) = spotter.map(|s| s.pos) {
                if !droid.is_vtol() && halt_type(droid) != HaltType::Hold {
                    move_droid_to(world, env, droid, spotter_pos);
                }
            }
        }

        ActionKind::Sulk => {
            set_kind(droid, ActionKind::Sulk);
            let tuning = &world.tuning;
            let spread = tuning.max_sulk_time.saturating_sub(tuning.min_sulk_time);
            let min = tuning.min_sulk_time;
            let extra = world.rng.below(spread);
            droid.action.started = now + u64::from(min) + u64::from(extra);
            debug!(droid = droid.id.0, until = droid.action.started, "sulking");
        }

        ActionKind::Destruct | ActionKind::WaitForRepair => {
            set_kind(droid, request.kind);
            droid.action.started = now;
        }

        ActionKind::MoveToRepairPoint => {
            set_kind(droid, ActionKind::MoveToRepairPoint);
            droid.action.pos = request.pos;
            droid.action.set_target(0, request.target);
            move_droid_to_no_formation(world, env, droid, request.pos);
        }

        ActionKind::WaitDuringRepair => set_kind(droid, ActionKind::WaitDuringRepair),

        ActionKind::MoveToRearmPoint => {
            set_kind(droid, ActionKind::MoveToRearmPoint);
            droid.action.pos = request.pos;
            droid.action.set_target(0, request.target);
            move_droid_to_direct(droid, request.pos);
            if let Some(pad) = request.target {
                vtol::ensure_rearm_pad_clear(world, env, pad, droid.id);
            }
        }

        ActionKind::DroidRepair => {
            droid.action.pos = request.pos;
            droid.action.set_target(0, request.target);
            droid.action.points = 0;
            if holding_idle(droid) {
                set_kind(droid, ActionKind::DroidRepair);
            } else {
                set_kind(droid, ActionKind::MoveToDroidRepair);
                move_droid_to(world, env, droid, request.pos);
            }
        }

        ActionKind::Restore => {
            set_kind(droid, ActionKind::MoveToRestore);
            droid.action.pos = request.pos;
            droid.action.set_target(0, request.target);
            move_droid_to(world, env, droid, request.pos);
        }

        ActionKind::ClearWreck => {
            set_kind(droid, ActionKind::MoveToClear);
            droid.action.pos = request.pos;
            droid.action.set_target(0, droid.order.target().or(request.target));
            move_droid_to(world, env, droid, request.pos);
        }

        kind => {
            set_kind(droid, kind);
            droid.action.pos = request.pos;
            droid.action.set_target(0, request.target);
        }
    }
}

fn start_attack(world: &mut World, env: &mut Environment, droid: &mut Droid, request: ActionRequest) {
    let Some(target_id) = request.target else {
        return;
    };
    if !droid.has_weapon() || droid.is_transporter() || target_id == droid.id {
        return;
    }
    let Some(target) = world.live(target_id) else {
        return;
    };
    if droid.is_electronic() && target.as_structure().is_some_and(|s| s.resistance == 0) {
        set_kind(droid, ActionKind::None);
        return;
    }
    let target_pos = target.pos();
    let min_range = targeting::inside_min_range(droid, target, 0);
    let indirect = droid.weapons[0].stats.indirect;

    droid.action.pos = droid.pos;
    droid.action.set_target(0, Some(target_id));

    let order = droid.order.kind();
    let holds_ground = matches!(
        order,
        OrderKind::AttackTarget | OrderKind::None | OrderKind::TempHold | OrderKind::FireSupport
    ) && halt_type(droid) == HaltType::Hold;
    let structure_spotter = order == OrderKind::FireSupport
        && !droid.is_vtol()
        && droid
            .order
            .target()
            .and_then(|id| world.live(id))
            .is_some_and(|o| o.as_structure().is_some());

    if holds_ground || structure_spotter {
        set_kind(droid, ActionKind::Attack);
    } else if min_range {
        if indirect {
            rotate_or_attack(droid, target_pos);
        } else {
            set_kind(droid, ActionKind::MoveToAttack);
            let back = pull_back_pos(world, droid, target_pos);
            move_droid_to(world, env, droid, back);
        }
    } else {
        set_kind(droid, ActionKind::MoveToAttack);
        move_droid_to(world, env, droid, target_pos);
    }
}

/// ATTACK for turreted weapons, ROTATETOATTACK for fixed ones.
pub(crate) fn rotate_or_attack(droid: &mut Droid, target_pos: Vec2Fixed) {
    if droid.weapons.first().is_some_and(|w| w.stats.rotates) {
        set_kind(droid, ActionKind::Attack);
    } else {
        set_kind(droid, ActionKind::RotateToAttack);
        move_turn_droid(droid, target_pos);
    }
}

/// Fly to a free landing spot near `pos`, or give up and return to base.
fn land_near(world: &mut World, env: &mut Environment, droid: &mut Droid, pos: Vec2Fixed) {
    match vtol::landing_pos(world, &*env.terrain, droid, pos) {
        Some(spot) => move_droid_to_direct(droid, spot),
        None => order_droid(world, env, droid, OrderKind::Rtb),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::droid::{BodySize, DroidCategory, DroidTemplate, PropulsionKind, PropulsionStats, WeaponStats};
    use crate::math::TilePos;
    use crate::movement::MoveStatus;
    use crate::structure::{Structure, StructureStatus, StructureTemplate};

    fn template(weapons: Vec<WeaponStats>) -> DroidTemplate {
        DroidTemplate {
            category: DroidCategory::Weapon,
            body_size: BodySize::Medium,
            propulsion: PropulsionStats {
                kind: PropulsionKind::Wheeled,
                max_speed: 400,
            },
            body: 100,
            weapons,
            sensor_range: 2048,
            construct_points: 10,
            repair_points: 10,
        }
    }

    fn setup() -> (World, Environment) {
        (World::new(3, Tuning::default(), (64, 64)), Environment::flat(64, 64))
    }

    #[test]
    fn test_action_names_use_legacy_spelling() {
        assert_eq!(ActionKind::None.name(), "DACTION_NONE");
        assert_eq!(ActionKind::MoveToRearmPoint.name(), "DACTION_MOVETOREARMPOINT");
        assert_eq!(ActionKind::FireSupportRetreat.name(), "DACTION_FIRESUPPORT_RETREAT");
        assert!(ActionKind::MoveFire.is_attacking());
        assert!(!ActionKind::Observe.is_attacking());
    }

    #[test]
    fn test_ring_and_footprint_tests() {
        let droid = Droid::new(ObjectId(1), 0, &template(vec![]), TilePos::new(4, 5).center());
        let site = TilePos::new(5, 5).center();
        assert!(reached_build_pos(&droid, site, (1, 1)));
        assert!(!droid_on_build_pos(&droid, site, (1, 1)));
        let far = TilePos::new(9, 5).center();
        assert!(!reached_build_pos(&droid, far, (1, 1)));
        let under = TilePos::new(4, 5).center();
        assert!(droid_on_build_pos(&droid, under, (1, 1)));
        assert!(!reached_build_pos(&droid, under, (1, 1)));
    }

    #[test]
    fn test_attack_far_target_moves_to_attack() {
        let (mut world, mut env) = setup();
        let mut droid = Droid::new(ObjectId(1), 0, &template(vec![WeaponStats::default()]), Vec2Fixed::from_ints(1000, 1000));
        let enemy = Droid::new(ObjectId(2), 1, &template(vec![]), Vec2Fixed::from_ints(3000, 1000));
        world.insert_droid(enemy);
        action_droid_obj(&mut world, &mut env, &mut droid, ActionKind::Attack, ObjectId(2));
        assert_eq!(droid.action.kind, ActionKind::MoveToAttack);
        assert_eq!(droid.action.target(), Some(ObjectId(2)));
        assert_ne!(droid.movement.status, MoveStatus::Inactive);
    }

    #[test]
    fn test_unarmed_droid_ignores_attack() {
        let (mut world, mut env) = setup();
        let mut droid = Droid::new(ObjectId(1), 0, &template(vec![]), Vec2Fixed::from_ints(1000, 1000));
        world.insert_droid(Droid::new(ObjectId(2), 1, &template(vec![]), Vec2Fixed::from_ints(1200, 1000)));
        action_droid_obj(&mut world, &mut env, &mut droid, ActionKind::Attack, ObjectId(2));
        assert_eq!(droid.action.kind, ActionKind::None);
    }

    #[test]
    fn test_none_clears_targets_and_stops() {
        let (mut world, mut env) = setup();
        let mut droid = Droid::new(ObjectId(1), 0, &template(vec![WeaponStats::default()]), Vec2Fixed::from_ints(500, 500));
        droid.action.kind = ActionKind::Move;
        droid.action.set_target(1, Some(ObjectId(9)));
        droid.movement.status = MoveStatus::PointToPoint;
        action_droid(&mut world, &mut env, &mut droid, ActionKind::None);
        assert_eq!(droid.action, ActionState::default());
        assert_eq!(droid.movement.status, MoveStatus::Inactive);
    }

    #[test]
    fn test_sulk_duration_is_bounded() {
        let (mut world, mut env) = setup();
        world.time_ms = 10_000;
        let mut droid = Droid::new(ObjectId(1), 0, &template(vec![]), Vec2Fixed::from_ints(500, 500));
        action_droid(&mut world, &mut env, &mut droid, ActionKind::Sulk);
        let tuning = Tuning::default();
        assert_eq!(droid.action.kind, ActionKind::Sulk);
        assert!(droid.action.started >= 10_000 + u64::from(tuning.min_sulk_time));
        assert!(droid.action.started < 10_000 + u64::from(tuning.max_sulk_time));
    }

    #[test]
    fn test_home_base_prefers_hq() {
        let (mut world, _) = setup();
        world.player_mut(0).landing_zone = Some(Vec2Fixed::from_ints(300, 300));
        assert_eq!(home_base_pos(&world, 0), Some(Vec2Fixed::from_ints(300, 300)));
        let hq = Structure::new(
            ObjectId(7),
            0,
            &StructureTemplate::single_tile(StructureKind::Hq),
            TilePos::new(20, 20).center(),
            StructureStatus::Built,
        );
        world.insert_structure(hq);
        assert_eq!(home_base_pos(&world, 0), Some(TilePos::new(20, 20).center()));
        assert_eq!(home_base_pos(&world, 3), None);
    }
}
