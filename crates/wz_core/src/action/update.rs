//! Per-tick advancement of the current action.

use tracing::{debug, trace};

use super::targeting::{
    align_turret, best_target, facing, fire, in_attack_range, in_range, inside_min_range, sees, target_turret,
    valid_target, visible,
};
use super::vtol::{find_nearest_rearm_pad, landing_pos, move_to_rearm, update_attack_run, update_vtol_attack};
use super::work::{
    check_for_wreckage, oil_burning, self_repair, start_build, start_work, update_build, update_clear_wreck,
    update_demolish, update_droid_repair, update_repair, update_restore,
};
use super::{
    action_droid_loc, action_footprint, droid_on_build_pos, holding_idle, home_base_pos, object_footprint,
    pull_back_pos, reached_build_pos, rotate_or_attack, set_kind, ActionKind,
};
use crate::droid::{Droid, PropulsionKind};
use crate::environment::Environment;
use crate::math::{TilePos, Vec2Fixed};
use crate::movement::{
    move_droid_to, move_droid_to_direct, move_droid_to_no_formation, move_stop_droid, move_turn_droid, MoveStatus,
};
use crate::object::{ObjectId, ObjectRef};
use crate::order::{cancel_build, order_droid, order_droid_obj, order_state, order_state_obj, OrderKind};
use crate::secondary::{halt_type, AttackLevel, HaltType};
use crate::structure::{footprint_origin, StructureKind, StructureTemplate};
use crate::world::World;

fn range_sq(range: i32) -> i64 {
    i64::from(range) * i64::from(range)
}

/// Advance the droid's action by one tick.
///
/// Dead targets are dropped first; losing the primary target ends most
/// actions. Turrets of droids that are not engaging drift back to the
/// front at the end of the tick.
pub fn action_update_droid(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    prune_dead_targets(world, env, droid);

    match droid.action.kind {
        ActionKind::None | ActionKind::WaitForRepair => update_idle(world, env, droid),
        ActionKind::WaitDuringRepair => update_wait_during_repair(world, env, droid),
        ActionKind::Move => update_move(world, env, droid),
        ActionKind::ReturnToPos
        | ActionKind::FireSupportRetreat
        | ActionKind::Circle
        | ActionKind::TransportIn
        | ActionKind::TransportOut
        | ActionKind::ClearRearmPad => {
            if droid.is_stopped() {
                set_kind(droid, ActionKind::None);
            }
        }
        ActionKind::TransportWaitToFlyIn | ActionKind::BuildWander | ActionKind::FoundationWander => {
            set_kind(droid, ActionKind::None);
        }
        ActionKind::MoveFire => {
            update_move_fire(world, env, droid);
            if droid.is_vtol() && !droid.vtol_rearming() {
                update_vtol_attack(world, env, droid);
            }
        }
        ActionKind::Attack => update_attack(world, env, droid),
        ActionKind::VtolAttack => update_attack_run(world, env, droid),
        ActionKind::MoveToAttack => update_move_to_attack(world, env, droid),
        ActionKind::Sulk => {
            if world.time_ms > droid.action.started {
                debug!(droid = droid.id.0, "sulk over");
                set_kind(droid, ActionKind::None);
            }
        }
        ActionKind::RotateToAttack => {
            if droid.movement.status != MoveStatus::TurnToTarget {
                set_kind(droid, ActionKind::Attack);
            }
        }
        ActionKind::MoveToBuild => update_move_to_build(world, env, droid),
        ActionKind::BuildFoundation => update_build_foundation(world, env, droid),
        ActionKind::Build => update_build_action(world, env, droid),
        ActionKind::MoveToDemolish | ActionKind::MoveToRepair | ActionKind::MoveToClear | ActionKind::MoveToRestore => {
            update_move_to_work(world, env, droid);
        }
        ActionKind::Demolish | ActionKind::Repair | ActionKind::ClearWreck | ActionKind::Restore => {
            update_work(world, env, droid);
        }
        ActionKind::MoveToRearmPoint => {
            if droid.is_stopped() {
                set_kind(droid, ActionKind::WaitDuringRearm);
            }
        }
        ActionKind::MoveToRepairPoint => update_move_to_repair_point(world, env, droid),
        ActionKind::Observe => update_observe(world, env, droid),
        ActionKind::MoveToObserve => update_move_to_observe(world, env, droid),
        ActionKind::FireSupport => update_fire_support(world, env, droid),
        ActionKind::Destruct => {
            let fuse = droid.action.started + u64::from(world.tuning.destruct_time);
            if fuse < world.time_ms {
                if droid.is_person() {
                    order_droid(world, env, droid, OrderKind::RunBurn);
                } else {
                    debug!(droid = droid.id.0, "self destructed");
                    world.destroy_droid(droid);
                }
            }
        }
        ActionKind::MoveToDroidRepair => update_move_to_droid_repair(world, env, droid),
        ActionKind::DroidRepair => update_droid_repair_action(world, env, droid),
        ActionKind::WaitForRearm => {
            if droid.action.target().is_none() {
                move_to_rearm(world, env, droid);
            } else if droid.is_stopped() && droid.vtol_happy() {
                set_kind(droid, ActionKind::None);
            }
        }
        ActionKind::WaitDuringRearm => {}
        ActionKind::MoveToRearm => update_move_to_rearm(world, env, droid),
    }

    if !droid.action.kind.keeps_turret() {
        for slot in 0..droid.weapons.len() {
            let mount = &droid.weapons[slot];
            if mount.rotation != 0 || mount.pitch != 0 {
                align_turret(world, droid, slot);
            }
        }
    }
}

/// Drop targets that died. Losing the primary target ends the action;
/// VTOLs then go back to their patrol or to rearm.
fn prune_dead_targets(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    for slot in 0..droid.action.targets.len() {
        let Some(target) = droid.action.targets[slot] else {
            continue;
        };
        // A repair droid working on itself is out of storage during its turn.
        if target == droid.id || world.is_alive(target) {
            continue;
        }
        trace!(droid = droid.id.0, target = target.0, slot, "action target died");
        droid.action.set_target(slot, None);
        if slot != 0
            || matches!(
                droid.action.kind,
                ActionKind::MoveFire | ActionKind::TransportIn | ActionKind::TransportOut
            )
        {
            continue;
        }
        set_kind(droid, ActionKind::None);
        if droid.is_vtol() {
            match droid.order.pos().filter(|_| droid.order.kind() == OrderKind::Patrol) {
                Some(pos) => action_droid_loc(world, env, droid, ActionKind::Move, pos),
                None => move_to_rearm(world, env, droid),
            }
        }
    }
}

/// A new target worth turning towards for an idle or moving droid.
fn opportunity_target(world: &World, env: &Environment, droid: &Droid, while_moving: bool) -> Option<ObjectId> {
    if droid.is_vtol() || droid.secondary.attack_level != AttackLevel::Always {
        return None;
    }
    (0..droid.weapons.len())
        .filter(|&slot| {
            let stats = &droid.weapons[slot].stats;
            stats.rotates && (!while_moving || stats.fire_on_move)
        })
        .find_map(|slot| best_target(world, env, droid, slot))
}

fn update_idle(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    // Guarding droids pick their own targets; the other orders steer the action themselves.
    let free = matches!(
        droid.order.kind(),
        OrderKind::None | OrderKind::TempHold | OrderKind::Rtr | OrderKind::Guard
    );
    if free && droid.has_weapon() {
        if let Some(target) = opportunity_target(world, env, droid, false) {
            set_kind(droid, ActionKind::Attack);
            droid.action.set_target(0, Some(target));
        }
    }
    if matches!(droid.action.kind, ActionKind::None | ActionKind::WaitForRepair) {
        self_repair(world, droid);
    }
}

fn update_wait_during_repair(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some((pos, size)) = droid
        .order
        .target()
        .and_then(|id| world.live(id))
        .map(|o| (o.pos(), object_footprint(o)))
    else {
        set_kind(droid, ActionKind::None);
        return;
    };
    if droid.is_stopped() && !reached_build_pos(droid, pos, size) {
        move_droid_to_no_formation(world, env, droid, pos);
    }
}

fn update_move(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    if droid.is_stopped() {
        set_kind(droid, ActionKind::None);
        return;
    }
    if let Some(target) = opportunity_target(world, env, droid, true) {
        set_kind(droid, ActionKind::MoveFire);
        droid.action.set_target(0, Some(target));
    }
}

fn update_move_fire(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    if droid.vtol_empty() {
        move_to_rearm(world, env, droid);
        return;
    }

    let mut found_new = false;
    let mut any_visible = false;
    for slot in 0..droid.weapons.len() {
        if let Some(t) = droid.action.targets[slot] {
            let doomed = world.live(t).map_or(true, |o| env.combat.is_probably_doomed(o));
            if doomed {
                droid.action.set_target(slot, None);
            }
        }
        if droid.action.targets[slot].is_none() {
            if let Some(t) = best_target(world, env, droid, slot) {
                droid.action.set_target(slot, Some(t));
                found_new = true;
            }
        }
        if droid.action.targets[slot]
            .and_then(|t| world.live(t))
            .is_some_and(|o| visible(world, droid, o, slot))
        {
            any_visible = true;
        }
    }

    if !droid.action.has_target() || (!any_visible && !found_new) {
        droid.action.clear_targets();
        set_kind(droid, ActionKind::Move);
        return;
    }
    if droid.is_stopped() {
        set_kind(droid, ActionKind::None);
        return;
    }
    if droid.secondary.attack_level != AttackLevel::Always {
        set_kind(droid, ActionKind::Move);
        return;
    }

    let primary = droid.action.target();
    for slot in 0..droid.weapons.len() {
        let Some(target) = droid.action.targets[slot].or(primary) else {
            continue;
        };
        let Some(obj) = world.live(target) else {
            continue;
        };
        if !valid_target(world, droid, obj, slot) {
            continue;
        }
        if droid.is_electronic() && obj.player() == Some(droid.player) {
            droid.action.set_target(slot, None);
            set_kind(droid, ActionKind::None);
            return;
        }
        if visible(world, droid, obj, slot) && target_turret(world, droid, slot, target) {
            fire(world, env, droid, slot, target);
        }
    }
}

/// True if the droid should give up rather than chase a target that left
/// its weapon range.
fn holds_position(world: &World, droid: &Droid) -> bool {
    let order = droid.order.kind();
    let hold = halt_type(droid) == HaltType::Hold;
    let supports_structure = !droid.is_vtol()
        && order_state_obj(droid, OrderKind::FireSupport)
            .and_then(|id| world.live(id))
            .is_some_and(|o| o.as_structure().is_some());
    (matches!(order, OrderKind::AttackTarget | OrderKind::FireSupport) && hold)
        || supports_structure
        || matches!(order, OrderKind::None | OrderKind::TempHold | OrderKind::Rtr)
}

fn update_attack(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(primary) = droid.action.target() else {
        set_kind(droid, ActionKind::None);
        return;
    };
    let flipped = world.live(primary).and_then(ObjectRef::player) == Some(droid.player);
    if droid.is_electronic() && flipped {
        droid.action.clear_targets();
        set_kind(droid, ActionKind::None);
        return;
    }

    let ordered = matches!(droid.order.kind(), OrderKind::Attack | OrderKind::AttackTarget);
    let mut has_target = false;
    for slot in 0..droid.weapons.len() {
        if slot > 0 {
            let current = droid.action.targets[slot];
            let share = ordered
                && current != Some(primary)
                && world
                    .live(primary)
                    .is_some_and(|o| valid_target(world, droid, o, slot) && in_range(droid, o, slot));
            if share {
                droid.action.set_target(slot, Some(primary));
            } else if current.is_none() {
                let found = best_target(world, env, droid, slot);
                droid.action.set_target(slot, found);
            }
        }

        let target = droid.action.targets[slot].unwrap_or(primary);
        let Some(obj) = world.live(target) else {
            continue;
        };
        let engage = visible(world, droid, obj, slot)
            && in_range(droid, obj, slot)
            && (ordered || !env.combat.is_probably_doomed(obj));
        let valid = valid_target(world, droid, obj, slot);
        let aligned = facing(world, droid, obj);
        let target_pos = obj.pos();
        if !engage || !valid {
            if slot > 0 {
                droid.action.set_target(slot, None);
            }
            has_target |= engage;
            continue;
        }
        has_target = true;

        let rotates = droid.weapons[slot].stats.rotates;
        if !rotates && !aligned {
            if slot > 0 {
                if target != primary {
                    droid.action.set_target(slot, None);
                }
            } else if droid.movement.status != MoveStatus::Shuffle {
                set_kind(droid, ActionKind::RotateToAttack);
                move_turn_droid(droid, target_pos);
            }
        } else if !rotates || target_turret(world, droid, slot, target) {
            fire(world, env, droid, slot, target);
        }
    }

    if !has_target {
        if holds_position(world, droid) {
            set_kind(droid, ActionKind::None);
        } else {
            set_kind(droid, ActionKind::MoveToAttack);
        }
    }
}

fn update_move_to_attack(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    if droid.vtol_empty() {
        move_to_rearm(world, env, droid);
        return;
    }
    let Some(primary) = droid.action.target() else {
        set_kind(droid, ActionKind::None);
        return;
    };
    let usable = world.live(primary).is_some_and(|o| {
        !(droid.is_electronic() && o.player() == Some(droid.player)) && valid_target(world, droid, o, 0)
    });
    if !usable {
        droid.action.clear_targets();
        set_kind(droid, ActionKind::None);
        return;
    }

    let seen = world.live(primary).is_some_and(|o| visible(world, droid, o, 0));
    if seen {
        for slot in 0..droid.weapons.len() {
            let Some(obj) = world.live(primary) else {
                break;
            };
            if !valid_target(world, droid, obj, slot) || !visible(world, droid, obj, slot) {
                continue;
            }
            let stats = &droid.weapons[slot].stats;
            let (rotates, fire_on_move) = (stats.rotates, stats.fire_on_move);
            let chase_person = !droid.is_vtol() && fire_on_move && obj.as_droid().is_some_and(Droid::is_person);
            let close_enough = in_attack_range(droid, obj, slot);
            let reachable = in_range(droid, obj, slot);
            let target_pos = obj.pos();
            if rotates {
                target_turret(world, droid, slot, primary);
            }
            if close_enough && !chase_person {
                if droid.is_vtol() {
                    set_kind(droid, ActionKind::VtolAttack);
                } else {
                    move_stop_droid(droid);
                    if rotates {
                        set_kind(droid, ActionKind::Attack);
                    } else {
                        set_kind(droid, ActionKind::RotateToAttack);
                        move_turn_droid(droid, target_pos);
                    }
                }
            } else if reachable {
                fire(world, env, droid, slot, primary);
            }
        }
    } else {
        for slot in 0..droid.weapons.len() {
            let mount = &droid.weapons[slot];
            if mount.rotation != 0 || mount.pitch != 0 {
                align_turret(world, droid, slot);
            }
        }
    }

    if !droid.is_stopped() || droid.action.kind == ActionKind::Attack {
        return;
    }
    let Some((target_pos, too_close)) = world
        .live(primary)
        .map(|o| (o.pos(), inside_min_range(droid, o, 0)))
    else {
        return;
    };
    if droid.order.kind() == OrderKind::AttackTarget && halt_type(droid) == HaltType::Hold {
        set_kind(droid, ActionKind::None);
    } else if too_close {
        let indirect = droid.weapons.first().is_some_and(|w| w.stats.indirect);
        if indirect {
            rotate_or_attack(droid, target_pos);
        } else {
            let back = pull_back_pos(world, droid, target_pos);
            move_droid_to(world, env, droid, back);
        }
    } else {
        move_droid_to(world, env, droid, target_pos);
    }
}

/// True if every tile of the footprint can take a new structure.
fn site_clear(world: &World, env: &Environment, template: &StructureTemplate, site: Vec2Fixed) -> bool {
    let (width, breadth) = (template.width.max(1), template.breadth.max(1));
    let origin = footprint_origin(site, width, breadth);
    let propulsion = PropulsionKind::Wheeled;
    (0..breadth).all(|dy| {
        (0..width).all(|dx| {
            let tile = origin.offset(dx, dy);
            !env.terrain.is_blocking_tile(tile, propulsion)
                && world.structure_at(tile).is_none()
                && world.feature_at(tile).is_none()
        })
    })
}

/// Join or start the build once the droid stands next to the site.
fn begin_build(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    if start_build(world, env, droid) {
        set_kind(droid, ActionKind::Build);
    } else if droid.action.kind != ActionKind::None {
        set_kind(droid, ActionKind::None);
    }
}

fn arrive_at_site(world: &mut World, env: &mut Environment, droid: &mut Droid, site: Vec2Fixed) {
    let Some(template) = droid.order.template().cloned() else {
        // Helping with a structure someone else started.
        begin_build(world, env, droid);
        return;
    };
    if droid.order.target().is_some() {
        begin_build(world, env, droid);
        return;
    }
    let tile = TilePos::of(site);
    if template.kind == StructureKind::ResourceExtractor && oil_burning(world, tile) {
        trace!(droid = droid.id.0, "waiting for the fire to burn out");
        return;
    }

    let existing = world.structure_at(tile).map(|s| (s.id, s.kind, s.player));
    match existing {
        Some((id, kind, owner)) if kind == template.kind && world.allied(owner, droid.player) => {
            debug!(droid = droid.id.0, structure = id.0, "helping with existing structure");
            droid.order.set_target(Some(id));
            begin_build(world, env, droid);
        }
        Some((id, StructureKind::Wall, owner))
            if template.kind == StructureKind::Defense && world.allied(owner, droid.player) =>
        {
            debug!(droid = droid.id.0, wall = id.0, "replacing wall with tower");
            world.destroy(id);
            begin_build(world, env, droid);
        }
        Some(_) => {
            debug!(droid = droid.id.0, "build site already taken");
            cancel_build(world, env, droid);
        }
        None if !site_clear(world, env, &template, site) => {
            debug!(droid = droid.id.0, "build site blocked");
            cancel_build(world, env, droid);
        }
        None => {
            set_kind(droid, ActionKind::BuildFoundation);
            start_work(world, droid);
        }
    }
}

fn update_move_to_build(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let (Some(size), Some(site)) = (action_footprint(world, droid), droid.order.pos()) else {
        set_kind(droid, ActionKind::None);
        return;
    };
    if reached_build_pos(droid, site, size) && !droid_on_build_pos(droid, site, size) {
        move_stop_droid(droid);
        trace!(droid = droid.id.0, "at construction site");
        arrive_at_site(world, env, droid, site);
    } else if droid.is_stopped() {
        step_off_or_approach(world, env, droid, droid.action.pos, size);
    }
}

/// A stopped worker standing on its site drives towards home to get off
/// it; otherwise it drives back to the site.
fn step_off_or_approach(world: &mut World, env: &mut Environment, droid: &mut Droid, site: Vec2Fixed, size: (i32, i32)) {
    if droid_on_build_pos(droid, site, size) {
        match home_base_pos(world, droid.player) {
            Some(base) => {
                move_droid_to_no_formation(world, env, droid, base);
            }
            None => {
                debug!(droid = droid.id.0, "no home base to step off the site towards");
                set_kind(droid, ActionKind::None);
            }
        }
    } else {
        move_droid_to_no_formation(world, env, droid, site);
    }
}

fn update_build_foundation(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(site) = droid.order.pos() else {
        set_kind(droid, ActionKind::None);
        return;
    };
    if droid.order.target().is_none() {
        let template_kind = droid.order.template().map(|t| t.kind);
        if let Some((id, kind)) = world.structure_at(TilePos::of(site)).map(|s| (s.id, s.kind)) {
            if Some(kind) == template_kind {
                droid.order.set_target(Some(id));
            } else {
                set_kind(droid, ActionKind::None);
                return;
            }
        }
    }
    begin_build(world, env, droid);
}

fn update_build_action(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let (Some(size), Some(site)) = (action_footprint(world, droid), droid.order.pos()) else {
        set_kind(droid, ActionKind::None);
        return;
    };
    let reached = reached_build_pos(droid, site, size);
    if droid.is_stopped() && !reached {
        move_droid_to_no_formation(world, env, droid, site);
    } else if !droid.is_stopped()
        && !matches!(droid.movement.status, MoveStatus::TurnToTarget | MoveStatus::Shuffle)
        && reached
    {
        move_stop_droid(droid);
    }
    if droid.action.kind == ActionKind::Sulk {
        debug!(droid = droid.id.0, "cannot reach site, aborting build");
        set_kind(droid, ActionKind::None);
        return;
    }
    if update_build(world, env, droid) {
        if let Some(target) = droid.action.target().or_else(|| droid.order.target()) {
            target_turret(world, droid, 0, target);
        }
    } else if droid.action.kind == ActionKind::Build {
        set_kind(droid, ActionKind::None);
    }
}

/// Work action that follows each approach action.
const fn work_for(approach: ActionKind) -> ActionKind {
    match approach {
        ActionKind::MoveToDemolish => ActionKind::Demolish,
        ActionKind::MoveToRepair => ActionKind::Repair,
        ActionKind::MoveToClear => ActionKind::ClearWreck,
        ActionKind::MoveToRestore => ActionKind::Restore,
        other => other,
    }
}

fn target_site(world: &World, droid: &Droid) -> Option<(i32, i32)> {
    droid
        .action
        .target()
        .and_then(|id| world.live(id))
        .map(object_footprint)
}

fn update_move_to_work(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(size) = target_site(world, droid) else {
        set_kind(droid, ActionKind::None);
        return;
    };
    let site = droid.action.pos;
    if reached_build_pos(droid, site, size) && !droid_on_build_pos(droid, site, size) {
        move_stop_droid(droid);
        let work = work_for(droid.action.kind);
        set_kind(droid, work);
        start_work(world, droid);
    } else if droid.is_stopped() {
        step_off_or_approach(world, env, droid, site, size);
    }
}

fn update_work(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(size) = target_site(world, droid) else {
        set_kind(droid, ActionKind::None);
        return;
    };
    let site = droid.action.pos;
    let reached = reached_build_pos(droid, site, size);
    if droid.is_stopped() && !reached {
        if holding_idle(droid) {
            set_kind(droid, ActionKind::None);
        } else {
            move_droid_to_no_formation(world, env, droid, site);
        }
        return;
    }
    if !droid.is_stopped() && !matches!(droid.movement.status, MoveStatus::TurnToTarget | MoveStatus::Shuffle) && reached
    {
        move_stop_droid(droid);
        return;
    }

    let kind = droid.action.kind;
    let busy = match kind {
        ActionKind::Demolish => update_demolish(world, droid),
        ActionKind::Repair => update_repair(world, droid),
        ActionKind::ClearWreck => update_clear_wreck(world, droid),
        _ => update_restore(world, droid),
    };
    if busy {
        if let Some(target) = droid.action.target() {
            target_turret(world, droid, 0, target);
        }
        return;
    }
    set_kind(droid, ActionKind::None);
    if kind == ActionKind::ClearWreck {
        if let Some(next) = check_for_wreckage(world, droid) {
            debug!(droid = droid.id.0, wreck = next.0, "moving on to the next wreck");
            order_droid_obj(world, env, droid, OrderKind::ClearWreck, next);
        }
    }
}

fn update_move_to_repair_point(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some((pos, size)) = droid
        .action
        .target()
        .and_then(|id| world.live(id))
        .map(|o| (o.pos(), object_footprint(o)))
    else {
        set_kind(droid, ActionKind::None);
        return;
    };
    if reached_build_pos(droid, pos, size) {
        trace!(droid = droid.id.0, "arrived at repair point");
        move_stop_droid(droid);
        set_kind(droid, ActionKind::WaitDuringRepair);
    } else if droid.is_stopped() {
        move_droid_to_no_formation(world, env, droid, pos);
    }
}

fn update_observe(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(target) = droid.action.target() else {
        set_kind(droid, ActionKind::None);
        return;
    };
    target_turret(world, droid, 0, target);
    let Some((pos, seen)) = world.live(target).map(|o| (o.pos(), sees(droid, o))) else {
        return;
    };
    if seen {
        return;
    }
    if holding_idle(droid) {
        set_kind(droid, ActionKind::None);
    } else {
        set_kind(droid, ActionKind::MoveToObserve);
        move_droid_to(world, env, droid, pos);
    }
}

fn update_move_to_observe(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(target) = droid.action.target() else {
        set_kind(droid, ActionKind::None);
        return;
    };
    target_turret(world, droid, 0, target);
    let Some((pos, seen)) = world.live(target).map(|o| (o.pos(), sees(droid, o))) else {
        return;
    };
    if seen {
        set_kind(droid, ActionKind::Observe);
        if !droid.is_stopped() {
            move_stop_droid(droid);
        }
    } else if droid.is_stopped() {
        move_droid_to(world, env, droid, pos);
    }
}

fn update_fire_support(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some((spotter_pos, is_structure)) = droid
        .order
        .target()
        .and_then(|id| world.live(id))
        .map(|o| (o.pos(), o.as_structure().is_some()))
    else {
        set_kind(droid, ActionKind::None);
        return;
    };
    if droid.is_vtol() || is_structure {
        return;
    }
    let short = range_sq(droid.weapons.first().map_or(0, |w| w.stats.short_range));
    if droid.pos.distance_squared(spotter_pos) < short {
        if !droid.is_stopped() {
            move_stop_droid(droid);
        }
        return;
    }
    let drift = if droid.is_stopped() {
        droid.pos.distance_squared(spotter_pos)
    } else {
        droid.movement.destination.distance_squared(spotter_pos)
    };
    if droid.is_stopped() || drift > short {
        if halt_type(droid) == HaltType::Hold {
            set_kind(droid, ActionKind::None);
        } else {
            move_droid_to(world, env, droid, spotter_pos);
        }
    }
}

fn update_move_to_droid_repair(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(patient) = droid.action.target() else {
        set_kind(droid, ActionKind::None);
        return;
    };
    let Some(patient_pos) = world.live(patient).map(ObjectRef::pos) else {
        set_kind(droid, ActionKind::None);
        return;
    };
    if droid.pos.distance_squared(patient_pos) < range_sq(world.tuning.repair_range) {
        target_turret(world, droid, 0, patient);
        set_kind(droid, ActionKind::DroidRepair);
        start_work(world, droid);
        return;
    }
    if droid.is_stopped() {
        droid.action.pos = patient_pos;
        move_droid_to(world, env, droid, patient_pos);
    }
}

fn update_droid_repair_action(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(patient) = droid.action.target() else {
        set_kind(droid, ActionKind::None);
        return;
    };
    if patient == droid.id {
        // Guarding droids pick their own targets; the other orders steer the action themselves.
    let free = matches!(
        droid.order.kind(),
        OrderKind::None | OrderKind::TempHold | OrderKind::Rtr | OrderKind::Guard
    );
        if free && droid.has_weapon() {
            if let Some(target) = opportunity_target(world, env, droid, false) {
                set_kind(droid, ActionKind::Attack);
                droid.action.set_target(0, Some(target));
                return;
            }
        }
    } else {
        target_turret(world, droid, 0, patient);
    }

    let patient_pos = if patient == droid.id {
        droid.pos
    } else {
        match world.live(patient).map(ObjectRef::pos) {
            Some(pos) => pos,
            None => {
                set_kind(droid, ActionKind::None);
                return;
            }
        }
    };
    if droid.pos.distance_squared(patient_pos) > range_sq(world.tuning.repair_range) {
        if halt_type(droid) != HaltType::Hold || droid.order.kind() == OrderKind::DroidRepair {
            droid.action.pos = patient_pos;
            set_kind(droid, ActionKind::MoveToDroidRepair);
            move_droid_to(world, env, droid, patient_pos);
        } else {
            set_kind(droid, ActionKind::None);
        }
        return;
    }

    if update_droid_repair(world, droid) {
        if let Some(p) = world.droid_mut(patient).filter(|p| p.movement.status == MoveStatus::Shuffle) {
            move_stop_droid(p);
        }
    } else {
        set_kind(droid, ActionKind::None);
        if order_state(droid, OrderKind::Rtr) {
            order_droid(world, env, droid, OrderKind::Rtr);
        }
    }
}

fn update_move_to_rearm(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(pad) = droid.action.target() else {
        move_to_rearm(world, env, droid);
        return;
    };
    if world.live(pad).is_some_and(|o| sees(droid, o)) {
        if let Some(clear) = find_nearest_rearm_pad(world, droid, Some(pad), true) {
            droid.action.set_target(0, Some(clear));
        }
        trace!(droid = droid.id.0, "rearm pad in sight");
        set_kind(droid, ActionKind::WaitForRearm);
    }
    if !droid.is_stopped() && droid.action.kind != ActionKind::WaitForRearm {
        return;
    }
    let Some(pad_pos) = droid.action.target().and_then(|id| world.live(id)).map(ObjectRef::pos) else {
        return;
    };
    match landing_pos(world, &*env.terrain, droid, pad_pos) {
        Some(spot) => move_droid_to_direct(droid, spot),
        None => {
            debug!(droid = droid.id.0, "no clear tile near rearm pad");
            order_droid(world, env, droid, OrderKind::Rtb);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::droid::{BodySize, DroidCategory, DroidTemplate, PropulsionKind, PropulsionStats, WeaponStats};
    use crate::order::Order;
    use crate::structure::{Structure, StructureStatus};

    fn template(category: DroidCategory, weapons: Vec<WeaponStats>) -> DroidTemplate {
        DroidTemplate {
            category,
            body_size: BodySize::Medium,
            propulsion: PropulsionStats {
                kind: PropulsionKind::Wheeled,
                max_speed: 400,
            },
            body: 100,
            weapons,
            sensor_range: 1024,
            construct_points: 100,
            repair_points: 0,
        }
    }

    fn tank(id: u32, player: u8, pos: Vec2Fixed) -> Droid {
        Droid::new(ObjectId(id), player, &template(DroidCategory::Weapon, vec![WeaponStats::default()]), pos)
    }

    fn setup() -> (World, Environment) {
        (World::new(11, Tuning::default(), (64, 64)), Environment::flat(64, 64))
    }

    #[test]
    fn test_idle_droid_engages_nearby_enemy() {
        let (mut world, mut env) = setup();
        world.insert_droid(tank(2, 1, Vec2Fixed::from_ints(1400, 1000)));
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        action_update_droid(&mut world, &mut env, &mut droid);
        assert_eq!(droid.action.kind, ActionKind::Attack);
        assert_eq!(droid.action.target(), Some(ObjectId(2)));
    }

    #[test]
    fn test_idle_droid_ignores_allies() {
        let (mut world, mut env) = setup();
        world.insert_droid(tank(2, 0, Vec2Fixed::from_ints(1400, 1000)));
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        action_update_droid(&mut world, &mut env, &mut droid);
        assert_eq!(droid.action.kind, ActionKind::None);
    }

    #[test]
    fn test_attack_fires_at_target_in_range() {
        let (mut world, mut env) = setup();
        world.time_ms = 5000;
        world.insert_droid(tank(2, 1, Vec2Fixed::from_ints(1300, 1000)));
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        droid.action.kind = ActionKind::Attack;
        droid.action.set_target(0, Some(ObjectId(2)));
        for _ in 0..40 {
            action_update_droid(&mut world, &mut env, &mut droid);
            world.time_ms += 100;
        }
        assert_eq!(droid.action.kind, ActionKind::Attack);
        assert!(droid.weapons[0].last_fired > 0);
    }

    #[test]
    fn test_attack_out_of_range_chases_or_gives_up() {
        let (mut world, mut env) = setup();
        world.insert_droid(tank(2, 1, Vec2Fixed::from_ints(3000, 1000)));
        let mut chaser = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        chaser.order = Order::Attack {
            target: Some(ObjectId(2)),
        };
        chaser.action.kind = ActionKind::Attack;
        chaser.action.set_target(0, Some(ObjectId(2)));
        action_update_droid(&mut world, &mut env, &mut chaser);
        assert_eq!(chaser.action.kind, ActionKind::MoveToAttack);

        let mut idle = tank(3, 0, Vec2Fixed::from_ints(1000, 1200));
        idle.action.kind = ActionKind::Attack;
        idle.action.set_target(0, Some(ObjectId(2)));
        action_update_droid(&mut world, &mut env, &mut idle);
        assert_ne!(idle.action.kind, ActionKind::Attack);
        assert_ne!(idle.action.kind, ActionKind::MoveToAttack);
    }

    #[test]
    fn test_dead_primary_target_ends_action() {
        let (mut world, mut env) = setup();
        world.insert_droid(tank(2, 1, Vec2Fixed::from_ints(3000, 3000)));
        world.destroy(ObjectId(2));
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        droid.order = Order::Attack {
            target: Some(ObjectId(2)),
        };
        droid.action.kind = ActionKind::MoveToAttack;
        droid.action.set_target(0, Some(ObjectId(2)));
        action_update_droid(&mut world, &mut env, &mut droid);
        assert_eq!(droid.action.kind, ActionKind::None);
        assert_eq!(droid.action.target(), None);
    }

    #[test]
    fn test_move_ends_when_stopped() {
        let (mut world, mut env) = setup();
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        droid.action.kind = ActionKind::Move;
        action_update_droid(&mut world, &mut env, &mut droid);
        assert_eq!(droid.action.kind, ActionKind::None);
    }

    #[test]
    fn test_moving_droid_fires_on_the_move() {
        let (mut world, mut env) = setup();
        world.insert_droid(tank(2, 1, Vec2Fixed::from_ints(1400, 1000)));
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        droid.action.kind = ActionKind::Move;
        droid.movement.status = MoveStatus::PointToPoint;
        action_update_droid(&mut world, &mut env, &mut droid);
        assert_eq!(droid.action.kind, ActionKind::MoveFire);
        assert_eq!(droid.action.target(), Some(ObjectId(2)));
    }

    #[test]
    fn test_sulk_expires() {
        let (mut world, mut env) = setup();
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        droid.action.kind = ActionKind::Sulk;
        droid.action.started = 2000;
        world.time_ms = 1500;
        action_update_droid(&mut world, &mut env, &mut droid);
        assert_eq!(droid.action.kind, ActionKind::Sulk);
        world.time_ms = 2100;
        action_update_droid(&mut world, &mut env, &mut droid);
        assert_eq!(droid.action.kind, ActionKind::None);
    }

    #[test]
    fn test_destruct_after_fuse() {
        let (mut world, mut env) = setup();
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        droid.action.kind = ActionKind::Destruct;
        droid.action.started = 0;
        world.time_ms = 1000;
        action_update_droid(&mut world, &mut env, &mut droid);
        assert!(droid.died.is_none());
        world.time_ms = u64::from(world.tuning.destruct_time) + 100;
        action_update_droid(&mut world, &mut env, &mut droid);
        assert!(droid.died.is_some());
    }

    #[test]
    fn test_arrival_at_site_lays_foundation_then_builds() {
        let (mut world, mut env) = setup();
        let site = TilePos::new(10, 10).center();
        let mut truck = Droid::new(
            ObjectId(1),
            0,
            &template(DroidCategory::Construct, vec![]),
            TilePos::new(9, 10).center(),
        );
        truck.order = Order::Build {
            template: StructureTemplate::single_tile(StructureKind::Defense),
            pos: site,
            direction: 0,
            target: None,
        };
        truck.action.kind = ActionKind::MoveToBuild;
        truck.action.pos = site;
        action_update_droid(&mut world, &mut env, &mut truck);
        assert_eq!(truck.action.kind, ActionKind::BuildFoundation);

        action_update_droid(&mut world, &mut env, &mut truck);
        assert_eq!(truck.action.kind, ActionKind::Build);
        let id = truck.order.target().expect("structure placed");
        assert_eq!(world.structure(id).map(|s| s.status), Some(StructureStatus::BeingBuilt));
    }

    #[test]
    fn test_arrival_at_foreign_structure_cancels_build() {
        let (mut world, mut env) = setup();
        let site = TilePos::new(10, 10).center();
        world.insert_structure(Structure::new(
            ObjectId(5),
            0,
            &StructureTemplate::single_tile(StructureKind::Hq),
            site,
            StructureStatus::Built,
        ));
        let mut truck = Droid::new(
            ObjectId(1),
            0,
            &template(DroidCategory::Construct, vec![]),
            TilePos::new(9, 10).center(),
        );
        truck.order = Order::Build {
            template: StructureTemplate::single_tile(StructureKind::Defense),
            pos: site,
            direction: 0,
            target: None,
        };
        truck.action.kind = ActionKind::MoveToBuild;
        truck.action.pos = site;
        action_update_droid(&mut world, &mut env, &mut truck);
        assert_eq!(truck.action.kind, ActionKind::None);
        assert_eq!(truck.order, Order::None);
    }

    #[test]
    fn test_idle_turret_recentres() {
        let (mut world, mut env) = setup();
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        droid.weapons[0].rotation = 2000;
        action_update_droid(&mut world, &mut env, &mut droid);
        assert!(droid.weapons[0].rotation < 2000);
    }

    #[test]
    fn test_rotate_to_attack_resumes_after_turn() {
        let (mut world, mut env) = setup();
        world.insert_droid(tank(2, 1, Vec2Fixed::from_ints(5000, 5000)));
        let mut droid = tank(1, 0, Vec2Fixed::from_ints(1000, 1000));
        droid.action.kind = ActionKind::RotateToAttack;
        droid.action.set_target(0, Some(ObjectId(2)));
        droid.movement.status = MoveStatus::TurnToTarget;
        action_update_droid(&mut world, &mut env, &mut droid);
        assert_eq!(droid.action.kind, ActionKind::RotateToAttack);
        droid.movement.status = MoveStatus::Inactive;
        action_update_droid(&mut world, &mut env, &mut droid);
        assert_ne!(droid.action.kind, ActionKind::RotateToAttack);
    }
}
