//! Per-tick order reconciliation.
//!
//! Every tick [`order_update_droid`] drops references to dead objects and
//! then checks, by order kind, whether the action layer is still serving
//! the order. A finished action either pulls the next queued order or
//! falls back to a default behaviour.

use tracing::{debug, trace};

use super::{order_droid, order_droid_list, order_droid_loc, order_droid_obj, Order, OrderKind};
use crate::action::targeting::{best_target, in_range, visible};
use crate::action::vtol::{all_vtols_rearmed, move_to_rearm};
use crate::action::{action_droid, action_droid_loc, action_droid_obj, object_footprint, reached_build_pos, ActionKind};
use crate::droid::{Droid, DroidCategory};
use crate::environment::Environment;
use crate::math::{angle_add, atan2, cos, deg_units, sin, Fixed, TilePos, Vec2Fixed, TILE_UNITS};
use crate::movement::move_stop_droid;
use crate::object::{ObjectId, ObjectRef};
use crate::repair::{decide_where_to_repair, release_repaired};
use crate::secondary::{halt_type, AttackLevel, HaltType, ReturnToLoc};
use crate::world::{TickEvent, World};

/// Wait before a circling droid picks its next waypoint, in ms.
const CIRCLE_SETTLE_MS: u64 = 500;

fn within(a: Vec2Fixed, b: Vec2Fixed, range: i32) -> bool {
    a.distance_squared(b) <= i64::from(range) * i64::from(range)
}

/// Drop references to dead objects from the order and the queue.
fn prune_dead(world: &World, droid: &mut Droid) {
    if let Some(target) = droid.order.target() {
        if !world.is_alive(target) {
            trace!(droid = droid.id.0, target = target.0, "order target died");
            droid.order.set_target(None);
        }
    }
    if droid.base_structure.is_some_and(|b| !world.is_alive(b)) {
        droid.base_structure = None;
    }
    droid.order_queue.check_list(world);
}

/// Advance the order of one droid by a tick.
pub fn order_update_droid(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    prune_dead(world, droid);

    match droid.order.kind() {
        OrderKind::None | OrderKind::TempHold => update_idle(world, env, droid),
        OrderKind::TransportOut | OrderKind::TransportReturn => {
            if droid.action.kind == ActionKind::None {
                droid.order = Order::None;
            }
        }
        OrderKind::TransportIn => {
            if droid.action.kind == ActionKind::None && droid.is_stopped() {
                droid.order = Order::None;
            }
        }
        OrderKind::Move | OrderKind::Retreat | OrderKind::Destruct => {
            if matches!(droid.action.kind, ActionKind::None | ActionKind::Attack) {
                droid.order = Order::None;
            }
        }
        OrderKind::Recover => match droid.order.target().and_then(|t| world.live(t)).map(ObjectRef::pos) {
            None => droid.order = Order::None,
            Some(pos) => {
                if droid.action.kind == ActionKind::None {
                    action_droid_loc(world, env, droid, ActionKind::Move, pos);
                }
            }
        },
        OrderKind::MoveAttackWall | OrderKind::ScoutAttackWall => update_attack_wall(world, env, droid),
        OrderKind::Scout | OrderKind::Patrol => update_scout(world, env, droid),
        OrderKind::Circle => update_circle(world, env, droid),
        OrderKind::HelpBuild
        | OrderKind::Demolish
        | OrderKind::Observe
        | OrderKind::Repair
        | OrderKind::DroidRepair
        | OrderKind::Restore
        | OrderKind::ClearWreck => {
            if droid.action.kind == ActionKind::None || droid.order.target().is_none() {
                droid.order = Order::None;
                action_droid(world, env, droid, ActionKind::None);
            }
        }
        OrderKind::Rearm => {
            if droid.order.target().is_none() || droid.action.target().is_none() {
                droid.order = Order::None;
                move_to_rearm(world, env, droid);
            } else if droid.action.kind == ActionKind::None {
                droid.order = Order::None;
            }
        }
        OrderKind::Attack | OrderKind::AttackTarget => update_attack(world, env, droid),
        OrderKind::Build => {
            if droid.action.kind == ActionKind::Build && droid.order.target().is_none() {
                droid.order = Order::None;
                action_droid(world, env, droid, ActionKind::None);
            } else if droid.action.kind == ActionKind::None {
                droid.order = Order::None;
            }
        }
        OrderKind::Embark => update_embark(world, env, droid),
        OrderKind::Disembark => {
            if droid.is_transporter()
                && !matches!(droid.action.kind, ActionKind::Move | ActionKind::MoveFire)
                && droid.is_stopped()
            {
                droid.order = Order::None;
            }
        }
        OrderKind::Rtb => {
            if droid.action.kind == ActionKind::None {
                droid.order = Order::None;
                droid.secondary.return_to_loc = ReturnToLoc::None;
            }
        }
        OrderKind::LeaveMap => {
            let (w, h) = world.map_size();
            let t = droid.tile();
            let at_edge = t.x < 2 || t.y < 2 || t.x >= w - 2 || t.y >= h - 2;
            if at_edge || droid.action.kind == ActionKind::None {
                droid.order = Order::None;
            }
        }
        OrderKind::Rtr | OrderKind::RtrSpecified => update_rtr(world, env, droid),
        OrderKind::RunBurn => {
            if let Order::RunBurn { started, .. } = droid.order {
                if started + u64::from(world.tuning.run_burn_time) < world.time_ms {
                    debug!(droid = droid.id.0, "burnt out");
                    world.destroy_droid(droid);
                }
            }
        }
        OrderKind::Run => {
            let expired = matches!(droid.order, Order::Run { started, .. }
                if started + u64::from(world.tuning.run_time) < world.time_ms);
            if droid.action.kind == ActionKind::None {
                droid.order = Order::None;
            } else if expired {
                action_droid(world, env, droid, ActionKind::None);
                droid.order = Order::None;
            }
        }
        OrderKind::LineBuild => update_line_build(world, env, droid),
        OrderKind::FireSupport => update_fire_support(world, env, droid),
        OrderKind::Recycle => update_recycle(world, env, droid),
        OrderKind::Guard => update_guard(world, env, droid),
        // BuildModule is stored as Build.
        OrderKind::Stop | OrderKind::Command | OrderKind::BuildModule => {}
    }

    if droid.order.kind() == OrderKind::None && droid.vtol_rearming() {
        let pad = droid.action.target();
        if pad.map_or(true, |p| world.is_alive(p)) {
            droid.order = Order::Rearm { target: pad };
        }
    }
}

fn update_idle(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    if order_droid_list(world, env, droid) {
        return;
    }
    let temp_hold = droid.order.kind() == OrderKind::TempHold;
    if let Some(commander) = droid.commander.filter(|c| world.is_alive(*c)) {
        if !temp_hold {
            order_droid_obj(world, env, droid, OrderKind::Guard, commander);
            return;
        }
    }
    if try_do_repairlike_action(world, env, droid) {
        return;
    }
    if !temp_hold && halt_type(droid) == HaltType::Guard && !droid.is_vtol() && !droid.is_transporter() {
        let here = droid.pos;
        order_droid_loc(world, env, droid, OrderKind::Guard, here);
    }
}

/// Idle repair droids look for patients and idle constructors for damaged
/// structures. Returns false for droids that do neither.
fn try_do_repairlike_action(world: &mut World, env: &mut Environment, droid: &mut Droid) -> bool {
    if matches!(
        droid.action.kind,
        ActionKind::Build
            | ActionKind::MoveToBuild
            | ActionKind::Repair
            | ActionKind::MoveToRepair
            | ActionKind::DroidRepair
            | ActionKind::MoveToDroidRepair
            | ActionKind::BuildWander
    ) {
        return true;
    }
    if droid.is_repairer() {
        if matches!(droid.action.kind, ActionKind::None | ActionKind::Sulk) {
            if let Some(patient) = check_for_repair_range(world, droid) {
                action_droid_obj(world, env, droid, ActionKind::DroidRepair, patient);
            }
        }
        return true;
    }
    if droid.is_constructor() {
        if droid.action.kind == ActionKind::None {
            if let Some(structure) = check_for_damaged_struct(world, droid) {
                action_droid_obj(world, env, droid, ActionKind::Repair, structure);
            }
        }
        return true;
    }
    false
}

/// Radius an idle repairer or constructor searches: short when holding
/// with no order, long otherwise.
fn work_radius(world: &World, droid: &Droid) -> i32 {
    let holding = halt_type(droid) == HaltType::Hold && matches!(droid.order.kind(), OrderKind::None | OrderKind::TempHold);
    if holding {
        world.tuning.repair_range
    } else {
        world.tuning.repair_max_dist
    }
}

/// Damaged friendly droid a repair droid should see to, nearest first.
///
/// A damaged droid being guarded always comes first.
#[must_use]
pub fn check_for_repair_range(world: &World, droid: &Droid) -> Option<ObjectId> {
    if let Some(guarded) = super::order_state_obj(droid, OrderKind::Guard).and_then(|t| world.droid(t)) {
        if guarded.died.is_none() && guarded.body < guarded.original_body {
            return Some(guarded.id);
        }
    }
    let radius = work_radius(world, droid);
    world
        .grid
        .query(droid.pos, radius)
        .into_iter()
        .filter_map(|id| world.droid(id))
        .filter(|d| {
            d.id != droid.id
                && d.died.is_none()
                && world.allied(d.player, droid.player)
                && d.body < d.original_body
                && !d.is_vtol()
                && within(d.pos, droid.pos, radius)
        })
        .min_by_key(|d| (d.pos.distance_squared(droid.pos), d.id))
        .map(|d| d.id)
}

/// Damaged friendly structure a constructor should see to, nearest first.
#[must_use]
pub fn check_for_damaged_struct(world: &World, droid: &Droid) -> Option<ObjectId> {
    let radius = work_radius(world, droid);
    world
        .grid
        .query(droid.pos, radius)
        .into_iter()
        .filter_map(|id| world.structure(id))
        .filter(|s| {
            s.died.is_none()
                && s.player == droid.player
                && s.is_built()
                && s.is_damaged()
                && within(s.pos, droid.pos, radius)
        })
        .min_by_key(|s| (s.pos.distance_squared(droid.pos), s.id))
        .map(|s| s.id)
}

/// Keep a guarding droid within `range` of what it guards.
pub fn check_guard_position(world: &mut World, env: &mut Environment, droid: &mut Droid, range: i32) {
    let target = droid.order.target().and_then(|t| world.live(t));
    let guard_pos = match target {
        Some(ObjectRef::Droid(d)) if !droid.is_repairer() && d.order.kind() == OrderKind::Move => {
            d.order.pos().unwrap_or(d.pos)
        }
        Some(obj) => obj.pos(),
        None => match droid.order.pos() {
            Some(pos) => pos,
            None => return,
        },
    };
    if let Order::Guard { pos, .. } = &mut droid.order {
        *pos = guard_pos;
    }
    if within(droid.pos, guard_pos, range) {
        return;
    }
    let moving = !droid.is_stopped() && matches!(droid.action.kind, ActionKind::Move | ActionKind::MoveFire);
    if moving && within(droid.movement.destination, guard_pos, range) {
        return;
    }
    action_droid_loc(world, env, droid, ActionKind::Move, guard_pos);
}

fn update_attack_wall(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(pos) = droid.order.pos() else {
        return;
    };
    let scouting = droid.order.kind() == OrderKind::ScoutAttackWall;
    let Some(wall) = droid.order.target().filter(|t| world.is_alive(*t)) else {
        droid.order = if scouting { Order::Scout { pos } } else { Order::Move { pos } };
        action_droid_loc(world, env, droid, ActionKind::Move, pos);
        return;
    };
    let attacking_wall = droid.action.kind.is_attacking() && droid.action.target() == Some(wall);
    if !attacking_wall && world.live(wall).is_some_and(|w| in_range(droid, w, 0)) {
        action_droid_obj(world, env, droid, ActionKind::Attack, wall);
    } else if droid.action.kind == ActionKind::None {
        if scouting {
            droid.order = Order::Scout { pos };
        }
        if let Some(wall_pos) = world.live(wall).map(ObjectRef::pos) {
            action_droid_loc(world, env, droid, ActionKind::Move, wall_pos);
        }
    }
}

/// True if a patrolling VTOL strayed more than `limit` from the line
/// between its patrol points.
fn too_far_from_path(pos: Vec2Fixed, from: Vec2Fixed, to: Vec2Fixed, limit: i32) -> bool {
    let (px, py) = pos.to_ints();
    let (ax, ay) = from.to_ints();
    let (bx, by) = to.to_ints();
    let (dx, dy) = (i64::from(ax - bx), i64::from(ay - by));
    let (px, py, ax, ay) = (i64::from(px), i64::from(py), i64::from(ax), i64::from(ay));
    let limit = i64::from(limit);
    if dx == 0 && dy == 0 {
        return false;
    }
    let (lo_x, hi_x) = (ax.min(i64::from(bx)), ax.max(i64::from(bx)));
    let (lo_y, hi_y) = (ay.min(i64::from(by)), ay.max(i64::from(by)));
    if dx.abs() >= dy.abs() && lo_x - limit <= px && px <= hi_x + limit {
        ((px - ax) * dy / dx + ay - py).abs() > limit
    } else if dx.abs() <= dy.abs() && lo_y - limit <= py && py <= hi_y + limit {
        ((py - ay) * dx / dy + ax - px).abs() > limit
    } else {
        true
    }
}

/// Attack or observe a target of opportunity, by category.
fn engage(world: &mut World, env: &mut Environment, droid: &mut Droid, target: ObjectId) {
    match droid.category {
        DroidCategory::Weapon
        | DroidCategory::Cyborg
        | DroidCategory::CyborgSuper
        | DroidCategory::Person
        | DroidCategory::Command => action_droid_obj(world, env, droid, ActionKind::Attack, target),
        DroidCategory::Sensor => action_droid_obj(world, env, droid, ActionKind::Observe, target),
        _ => action_droid(world, env, droid, ActionKind::None),
    }
}

fn update_scout(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(order_pos) = droid.order.pos() else {
        return;
    };
    let tuning = world.tuning.clone();
    let patrol = droid.order.kind() == OrderKind::Patrol;

    if droid.action.kind == ActionKind::Move || (droid.action.kind == ActionKind::None && droid.is_vtol()) {
        let straying = match droid.order {
            Order::Patrol { pos, origin } if droid.is_vtol() => too_far_from_path(droid.pos, pos, origin, tuning.scout_dist),
            _ => false,
        };
        if !straying && droid.secondary.attack_level == AttackLevel::Always {
            let target = best_target(world, env, droid, 0)
                .filter(|t| world.live(*t).is_some_and(|o| within(o.pos(), droid.pos, tuning.scout_attack_dist)));
            if let Some(target) = target {
                trace!(droid = droid.id.0, target = target.0, "scout found a target");
                engage(world, env, droid, target);
            }
        }
    }

    if droid.action.kind == ActionKind::None {
        if within(droid.pos, order_pos, tuning.scout_dist) {
            if patrol {
                if order_droid_list(world, env, droid) {
                    return;
                }
                if droid.is_vtol() && !droid.vtol_full() && droid.secondary.attack_level != AttackLevel::Never {
                    move_to_rearm(world, env, droid);
                    return;
                }
                if let Order::Patrol { pos, origin } = &mut droid.order {
                    std::mem::swap(pos, origin);
                }
                if let Some(next) = droid.order.pos() {
                    action_droid_loc(world, env, droid, ActionKind::Move, next);
                }
            } else {
                droid.order = Order::None;
            }
        } else {
            action_droid_loc(world, env, droid, ActionKind::Move, order_pos);
        }
    } else if matches!(
        droid.action.kind,
        ActionKind::Attack
            | ActionKind::MoveToAttack
            | ActionKind::RotateToAttack
            | ActionKind::Observe
            | ActionKind::MoveToObserve
    ) && halt_type(droid) != HaltType::Pursue
        && !within(droid.pos, droid.action.pos, tuning.scout_attack_dist)
    {
        let back = droid.action.pos;
        action_droid_loc(world, env, droid, ActionKind::ReturnToPos, back);
    }
}

fn update_circle(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(center) = droid.order.pos() else {
        return;
    };
    let tuning = world.tuning.clone();

    if droid.action.kind == ActionKind::Move && droid.secondary.attack_level == AttackLevel::Always {
        let target = best_target(world, env, droid, 0)
            .filter(|t| world.live(*t).is_some_and(|o| within(o.pos(), droid.pos, tuning.scout_attack_dist)));
        if let Some(target) = target {
            engage(world, env, droid, target);
            return;
        }
    }

    if matches!(droid.action.kind, ActionKind::None | ActionKind::Move) {
        if droid.action.kind == ActionKind::Move {
            if world.time_ms < droid.action.started + CIRCLE_SETTLE_MS {
                return;
            }
            if order_droid_list(world, env, droid) {
                return;
            }
        }
        if !within(droid.pos, center, tuning.circle_leash) {
            if droid.action.kind == ActionKind::None {
                action_droid_loc(world, env, droid, ActionKind::Move, center);
            }
            return;
        }
        let rel = droid.pos - center;
        let radius = Fixed::from_num(tuning.circle_radius);
        let offset = |angle| Vec2Fixed::new(sin(angle) * radius, cos(angle) * radius);
        let mut angle = atan2(rel.x, rel.y);
        let mut waypoint = center + offset(angle);
        if within(droid.pos, waypoint, TILE_UNITS) {
            angle = angle_add(angle, -deg_units(tuning.circle_step_degrees));
            waypoint = center + offset(angle);
        }
        if droid.action.kind != ActionKind::Move || droid.movement.destination != waypoint {
            action_droid_loc(world, env, droid, ActionKind::Move, waypoint);
        }
    } else if droid.action.kind.is_attacking() && !within(droid.pos, droid.action.pos, tuning.circle_leash) {
        action_droid_loc(world, env, droid, ActionKind::ReturnToPos, center);
    }
}

fn update_attack(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(target) = droid.order.target() else {
        if droid.is_vtol() {
            if !order_droid_list(world, env, droid) {
                droid.order = Order::None;
                move_to_rearm(world, env, droid);
            }
        } else {
            droid.order = Order::None;
            action_droid(world, env, droid, ActionKind::None);
        }
        return;
    };
    let Some(obj) = world.live(target) else {
        return;
    };
    let seen = visible(world, droid, obj, 0);
    let target_pos = obj.pos();
    let reachable = in_range(droid, obj, 0);
    let action = droid.action.kind;

    if matches!(action, ActionKind::Move | ActionKind::MoveFire) && seen && !droid.is_vtol() {
        action_droid_obj(world, env, droid, ActionKind::Attack, target);
    } else if action == ActionKind::MoveToAttack && !droid.is_vtol() && !seen && halt_type(droid) != HaltType::Hold {
        action_droid_loc(world, env, droid, ActionKind::Move, target_pos);
    } else if matches!(action, ActionKind::None | ActionKind::ClearRearmPad) {
        if halt_type(droid) == HaltType::Hold && !reachable {
            debug!(droid = droid.id.0, target = target.0, "holding and out of range, giving up");
            droid.order = Order::None;
        } else if !droid.is_vtol() || all_vtols_rearmed(world, droid) {
            action_droid_obj(world, env, droid, ActionKind::Attack, target);
        }
    }
}

fn update_embark(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(transporter) = droid.order.target().and_then(|t| world.droid(t)).map(|t| (t.id, t.pos)) else {
        droid.order = Order::None;
        action_droid(world, env, droid, ActionKind::None);
        return;
    };
    let (id, pos) = transporter;
    let (dx, dy) = (droid.pos - pos).to_ints();
    if dx.abs() < TILE_UNITS && dy.abs() < TILE_UNITS {
        move_stop_droid(droid);
        droid.order = Order::None;
        droid.action.clear_targets();
        droid.secondary.return_to_loc = ReturnToLoc::None;
        world.retire_droid(
            droid,
            TickEvent::Embarked {
                droid: droid.id,
                transporter: id,
            },
        );
    } else if droid.action.kind == ActionKind::None {
        action_droid_loc(world, env, droid, ActionKind::Move, pos);
    }
}

fn update_rtr(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(target) = droid.order.target() else {
        droid.order = Order::None;
        order_droid(world, env, droid, OrderKind::Rtr);
        return;
    };
    let Some(target_pos) = world.live(target).map(ObjectRef::pos) else {
        return;
    };
    if droid.body >= droid.original_body
        && matches!(droid.action.kind, ActionKind::WaitForRepair | ActionKind::WaitDuringRepair)
    {
        release_repaired(world, env, droid);
        return;
    }
    match droid.action.kind {
        ActionKind::None => {
            if within(droid.pos, target_pos, world.tuning.rtr_wait_dist) {
                action_droid(world, env, droid, ActionKind::WaitForRepair);
                droid.action.set_target(0, Some(target));
            } else {
                action_droid_loc(world, env, droid, ActionKind::Move, target_pos);
            }
        }
        ActionKind::Move | ActionKind::MoveFire if droid.order.kind() == OrderKind::Rtr => {
            let now = world.time_ms;
            let prev = now.saturating_sub(u64::from(world.tuning.tick_ms));
            let id = u64::from(droid.id.0);
            if (id + now) / 1000 != (id + prev) / 1000 {
                let better = decide_where_to_repair(world, droid).map(|p| p.id);
                if better.is_some_and(|b| b != target) {
                    debug!(droid = droid.id.0, "switching repair provider");
                    droid.order = Order::None;
                    order_droid(world, env, droid, OrderKind::Rtr);
                }
            }
        }
        _ => {}
    }
}

fn update_line_build(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let finished = droid.action.kind == ActionKind::None
        || (droid.action.kind == ActionKind::Build && droid.order.target().is_none());
    if !finished {
        return;
    }
    let Order::LineBuild { pos, end, target, .. } = &mut droid.order else {
        return;
    };
    let here = TilePos::of(*pos);
    let last = TilePos::of(*end);
    let next = if here == last {
        None
    } else if here.x == last.x {
        Some(here.offset(0, (last.y - here.y).signum()))
    } else if here.y == last.y {
        Some(here.offset((last.x - here.x).signum(), 0))
    } else {
        None
    };
    let Some(next) = next else {
        trace!(droid = droid.id.0, "line build finished");
        droid.order = Order::None;
        return;
    };
    *pos = next.center();
    *target = None;
    let site = *pos;
    droid.action.clear_targets();
    action_droid_loc(world, env, droid, ActionKind::Build, site);
}

fn update_fire_support(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(spotter) = droid.order.target() else {
        droid.order = Order::None;
        if droid.is_vtol() {
            move_to_rearm(world, env, droid);
        } else {
            action_droid(world, env, droid, ActionKind::None);
        }
        return;
    };
    if droid.vtol_empty() {
        move_to_rearm(world, env, droid);
        return;
    }

    let fire_target = world.droid(spotter).and_then(|s| {
        let spotting = (s.action.kind == ActionKind::Observe)
            || (s.category == DroidCategory::Command && s.action.kind == ActionKind::Attack);
        if spotting {
            s.action.target().filter(|t| world.is_alive(*t))
        } else {
            None
        }
    });

    if let Some(fire_target) = fire_target {
        let attack = if droid.is_vtol() {
            let in_cycle = !droid.vtol_empty()
                && matches!(droid.action.kind, ActionKind::MoveToRearm | ActionKind::WaitForRearm)
                && !droid.is_stopped();
            in_cycle || all_vtols_rearmed(world, droid)
        } else {
            true
        };
        let engaged = droid.action.kind.is_attacking() && droid.action.target() == Some(fire_target);
        if attack && !engaged {
            action_droid_obj(world, env, droid, ActionKind::Attack, fire_target);
        }
    } else if droid.is_vtol() && !matches!(droid.action.kind, ActionKind::None | ActionKind::FireSupport) {
        move_to_rearm(world, env, droid);
    } else if !matches!(droid.action.kind, ActionKind::FireSupport | ActionKind::FireSupportRetreat) {
        action_droid_obj(world, env, droid, ActionKind::FireSupport, spotter);
    }
}

fn update_recycle(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(site) = droid.order.target() else {
        droid.order = Order::None;
        action_droid(world, env, droid, ActionKind::None);
        return;
    };
    let Some((pos, size)) = world.live(site).map(|o| (o.pos(), object_footprint(o))) else {
        return;
    };
    if reached_build_pos(droid, pos, size) {
        debug!(droid = droid.id.0, site = site.0, "recycled");
        world.retire_droid(droid, TickEvent::Recycled { droid: droid.id, at: site });
    } else if droid.action.kind == ActionKind::None {
        let dest = droid.order.pos().unwrap_or(pos);
        action_droid_loc(world, env, droid, ActionKind::Move, dest);
    }
}

fn update_guard(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    if order_droid_list(world, env, droid) {
        return;
    }
    let tuning = world.tuning.clone();
    let guarding_commander = droid
        .order
        .target()
        .and_then(|t| world.droid(t))
        .is_some_and(|g| g.category == DroidCategory::Command);

    if matches!(droid.action.kind, ActionKind::None | ActionKind::Move | ActionKind::MoveFire) {
        let range = if !droid.is_repairer() && guarding_commander {
            tuning.defend_cmd_base_dist
        } else {
            tuning.defend_base_dist
        };
        check_guard_position(world, env, droid, range);
    } else if droid.is_repairer() {
        check_guard_position(world, env, droid, tuning.repair_max_dist);
    } else if droid.is_constructor() {
        check_guard_position(world, env, droid, tuning.construct_max_dist);
    } else if !droid.is_transporter() && !droid.vtol_rearming() {
        let range = if guarding_commander {
            tuning.defend_cmd_max_dist
        } else {
            tuning.defend_max_dist
        };
        check_guard_position(world, env, droid, range);
    }

    if let Some(commander) = droid.commander.filter(|c| world.is_alive(*c)) {
        if droid.has_weapon() {
            let commander_target = world
                .droid(commander)
                .filter(|c| c.action.kind == ActionKind::Attack)
                .and_then(|c| c.action.target())
                .filter(|t| world.is_alive(*t));
            if let Some(t) = commander_target {
                if matches!(droid.action.kind, ActionKind::Attack | ActionKind::MoveToAttack) {
                    if droid.action.target() != Some(t) {
                        action_droid_obj(world, env, droid, ActionKind::Attack, t);
                    }
                } else if droid.action.kind != ActionKind::Move {
                    action_droid_obj(world, env, droid, ActionKind::Attack, t);
                }
            }
            if super::order_state_obj(droid, OrderKind::Guard) != Some(commander) {
                order_droid_obj(world, env, droid, OrderKind::Guard, commander);
            }
        }
    }

    try_do_repairlike_action(world, env, droid);
}

/// Send a droid running when its health drops below its player's run level.
pub fn order_health_check(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let run_health = world.player(droid.player).run_health;
    if run_health == 0 || droid.is_vtol() || droid.is_transporter() {
        return;
    }
    if matches!(
        droid.order.kind(),
        OrderKind::Run | OrderKind::RunBurn | OrderKind::Rtr | OrderKind::RtrSpecified | OrderKind::Rtb | OrderKind::Retreat
    ) {
        return;
    }
    if droid.health_percent() < run_health {
        debug!(droid = droid.id.0, health = droid.health_percent(), "running");
        order_droid(world, env, droid, OrderKind::Run);
    }
}
