//! Order assignment.
//!
//! [`order_droid_base`] validates a request against the droid's category
//! and the map, stores the resulting [`Order`] and picks the first action.
//! Commanders hand most orders on to their group.

use tracing::{debug, trace};

use super::{Order, OrderKind, OrderOutcome, OrderRequest, RejectReason};
use crate::action::targeting::inside_min_range;
use crate::action::vtol::{assign_vtol_pad, landing_pos, move_to_rearm};
use crate::action::{action_droid, action_droid_loc, action_droid_obj, action_droid_obj_loc, ActionKind};
use crate::droid::Droid;
use crate::environment::{Environment, TileBlocking};
use crate::math::{TilePos, Vec2Fixed, TILE_UNITS};
use crate::object::{ObjectId, ObjectRef};
use crate::repair::decide_where_to_repair;
use crate::secondary::{halt_type, secondary_got_primary_order, HaltType};
use crate::structure::{StructureKind, StructureTemplate};
use crate::world::World;

fn reject(droid: &Droid, kind: OrderKind, reason: RejectReason) -> OrderOutcome {
    debug!(droid = droid.id.0, order = kind.name(), ?reason, "order rejected");
    OrderOutcome::Rejected(reason)
}

/// Position of a live target, or the reason the order cannot use it.
fn live_target(world: &World, request: &OrderRequest) -> Result<(ObjectId, Vec2Fixed), RejectReason> {
    let id = request.target.ok_or(RejectReason::MissingTarget)?;
    let obj = world.live(id).ok_or(RejectReason::DeadTarget)?;
    Ok((id, obj.pos()))
}

/// Make `request` the droid's current order.
pub fn order_droid_base(
    world: &mut World,
    env: &mut Environment,
    droid: &mut Droid,
    request: &OrderRequest,
) -> OrderOutcome {
    let kind = request.kind;
    trace!(droid = droid.id.0, order = kind.name(), "order given");

    if kind != OrderKind::TransportIn && request.target.is_none() && (kind.valid_for_loc() || kind == OrderKind::Build) {
        if let Some(pos) = request.pos {
            let map = world.blocking_map(&*env.terrain, Some(droid.player));
            if !env.pathfinder.is_reachable(droid.pos, pos, droid.propulsion.kind, &map) {
                return reject(droid, kind, RejectReason::Unreachable);
            }
        }
    }

    secondary_got_primary_order(droid, kind);

    let mut own_kind = kind;
    if droid.is_commander()
        && !matches!(
            kind,
            OrderKind::Guard | OrderKind::Rtr | OrderKind::Recycle | OrderKind::Move | OrderKind::None
        )
    {
        let members = world.group_members(droid.id);
        if !members.is_empty() {
            order_group(world, env, droid, &members, request);
            if kind == OrderKind::Recover {
                own_kind = OrderKind::None;
            }
        }
    }
    if own_kind == OrderKind::None {
        return OrderOutcome::Accepted;
    }

    assign(world, env, droid, request)
}

/// Hand an order given to a commander on to its group.
fn order_group(world: &mut World, env: &mut Environment, commander: &Droid, members: &[ObjectId], request: &OrderRequest) {
    let mut member_request = request.clone();
    if request.kind == OrderKind::Attack {
        member_request.kind = OrderKind::AttackTarget;
    }

    if request.kind == OrderKind::Recover {
        let Some(target_pos) = request.target.and_then(|t| world.live(t)).map(ObjectRef::pos) else {
            return;
        };
        let nearest = members
            .iter()
            .filter_map(|id| world.droid(*id))
            .filter(|d| !matches!(d.order.kind(), OrderKind::Rtr | OrderKind::RtrSpecified))
            .min_by_key(|d| (d.pos.distance_squared(target_pos), d.id))
            .map(|d| d.id);
        if let Some(id) = nearest {
            world.with_droid(id, |w, d| order_droid_base(w, env, d, &member_request));
        }
        return;
    }

    debug!(commander = commander.id.0, members = members.len(), order = request.kind.name(), "order handed to group");
    for &id in members {
        let on_rtr = world
            .droid(id)
            .is_some_and(|d| matches!(d.order.kind(), OrderKind::Rtr | OrderKind::RtrSpecified));
        if on_rtr {
            continue;
        }
        world.with_droid(id, |w, d| {
            d.order_queue.clear();
            order_droid_base(w, env, d, &member_request)
        });
    }
}

#[allow(clippy::too_many_lines)]
fn assign(world: &mut World, env: &mut Environment, droid: &mut Droid, request: &OrderRequest) -> OrderOutcome {
    let kind = request.kind;
    match kind {
        OrderKind::None | OrderKind::Command => {}

        OrderKind::Stop | OrderKind::TempHold => {
            droid.order = if kind == OrderKind::TempHold {
                Order::TempHold
            } else {
                Order::None
            };
            action_droid(world, env, droid, ActionKind::None);
        }

        OrderKind::Move | OrderKind::Scout => {
            let Some(pos) = request.pos else {
                return reject(droid, kind, RejectReason::MissingTarget);
            };
            if droid.is_vtol() || droid.is_transporter() {
                let map = world.blocking_map(&*env.terrain, Some(droid.player));
                if map.is_blocked(TilePos::of(pos), droid.propulsion.kind) {
                    return reject(droid, kind, RejectReason::BlockedDestination);
                }
            }
            droid.order = if kind == OrderKind::Move {
                Order::Move { pos }
            } else {
                Order::Scout { pos }
            };
            action_droid_loc(world, env, droid, ActionKind::Move, pos);
        }

        OrderKind::Patrol => {
            let Some(pos) = request.pos else {
                return reject(droid, kind, RejectReason::MissingTarget);
            };
            droid.order = Order::Patrol {
                pos,
                origin: droid.pos,
            };
            action_droid_loc(world, env, droid, ActionKind::Move, pos);
        }

        OrderKind::Recover => {
            let (target, pos) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            droid.order = Order::Recover { target: Some(target) };
            action_droid_loc(world, env, droid, ActionKind::Move, pos);
        }

        OrderKind::TransportOut | OrderKind::TransportReturn | OrderKind::TransportIn => {
            if !droid.is_transporter() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let pos = request.pos.unwrap_or(droid.pos);
            let action = match kind {
                OrderKind::TransportIn => {
                    droid.order = Order::TransportIn { pos };
                    ActionKind::TransportIn
                }
                OrderKind::TransportOut => {
                    droid.order = Order::TransportOut { pos };
                    ActionKind::TransportOut
                }
                _ => {
                    droid.order = Order::TransportReturn { pos };
                    ActionKind::TransportOut
                }
            };
            action_droid_loc(world, env, droid, action, pos);
        }

        OrderKind::Attack | OrderKind::AttackTarget => {
            if !droid.has_weapon() || droid.is_transporter() {
                return reject(droid, kind, RejectReason::NoWeapon);
            }
            let (target, target_pos) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            if target == droid.id {
                return reject(droid, kind, RejectReason::InvalidTarget);
            }
            if droid.order.kind() == OrderKind::Guard && kind == OrderKind::AttackTarget {
                action_droid_obj(world, env, droid, ActionKind::Attack, target);
                return OrderOutcome::Accepted;
            }
            let target_is_transporter = world.droid(target).is_some_and(Droid::is_transporter);
            if droid.is_electronic() && target_is_transporter {
                return reject(droid, kind, RejectReason::InvalidTarget);
            }
            droid.order = if kind == OrderKind::Attack {
                Order::Attack { target: Some(target) }
            } else {
                Order::AttackTarget { target: Some(target) }
            };
            let too_close = world.live(target).is_some_and(|t| inside_min_range(droid, t, 0));
            let holding = kind == OrderKind::AttackTarget && halt_type(droid) == HaltType::Hold;
            if droid.is_vtol() || too_close || holding {
                action_droid_obj(world, env, droid, ActionKind::Attack, target);
            } else {
                action_droid_loc(world, env, droid, ActionKind::Move, target_pos);
            }
        }

        OrderKind::Build => {
            if !droid.is_constructor() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let (Some(template), Some(pos)) = (request.template.clone(), request.pos) else {
                return reject(droid, kind, RejectReason::MissingTarget);
            };
            droid.order = Order::Build {
                template,
                pos,
                direction: request.direction,
                target: None,
            };
            action_droid_loc(world, env, droid, ActionKind::Build, pos);
        }

        OrderKind::BuildModule => {
            if !droid.is_constructor() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let (target, pos) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            let Some(template) = request.template.clone().or_else(|| module_template(world, target)) else {
                return reject(droid, kind, RejectReason::InvalidTarget);
            };
            droid.order = Order::Build {
                template,
                pos,
                direction: request.direction,
                target: Some(target),
            };
            action_droid_loc(world, env, droid, ActionKind::Build, pos);
        }

        OrderKind::LineBuild => {
            if !droid.is_constructor() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let (Some(template), Some(pos), Some(end)) = (request.template.clone(), request.pos, request.end) else {
                return reject(droid, kind, RejectReason::MissingTarget);
            };
            droid.order = Order::LineBuild {
                template,
                pos,
                end,
                direction: request.direction,
                target: None,
            };
            action_droid_loc(world, env, droid, ActionKind::Build, pos);
        }

        OrderKind::HelpBuild => {
            if !droid.is_constructor() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let (target, pos) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            if world.structure(target).is_none() {
                return reject(droid, kind, RejectReason::InvalidTarget);
            }
            droid.order = Order::HelpBuild {
                target: Some(target),
                pos,
            };
            action_droid_loc(world, env, droid, ActionKind::Build, pos);
        }

        OrderKind::Demolish | OrderKind::Repair => {
            if !droid.is_constructor() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let (target, pos) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            if world.structure(target).is_none() {
                return reject(droid, kind, RejectReason::InvalidTarget);
            }
            let action = if kind == OrderKind::Demolish {
                droid.order = Order::Demolish {
                    target: Some(target),
                    pos,
                };
                ActionKind::Demolish
            } else {
                droid.order = Order::Repair {
                    target: Some(target),
                    pos,
                };
                ActionKind::Repair
            };
            action_droid_obj(world, env, droid, action, target);
        }

        OrderKind::DroidRepair => {
            if !droid.is_repairer() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let (target, _) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            droid.order = Order::DroidRepair { target: Some(target) };
            action_droid_obj(world, env, droid, ActionKind::DroidRepair, target);
        }

        OrderKind::Observe => {
            let (target, _) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            droid.order = Order::Observe { target: Some(target) };
            action_droid_obj(world, env, droid, ActionKind::Observe, target);
        }

        OrderKind::FireSupport => {
            if !droid.has_weapon() || droid.is_transporter() {
                return reject(droid, kind, RejectReason::NoWeapon);
            }
            let (target, _) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            droid.order = Order::FireSupport { target: Some(target) };
            if !droid.is_vtol() {
                action_droid(world, env, droid, ActionKind::FireSupport);
            }
        }

        OrderKind::Retreat | OrderKind::RunBurn | OrderKind::Run => {
            let given = request.pos.filter(|p| kind == OrderKind::Run && !p.is_zero());
            let pos = given.or_else(|| world.player(droid.player).retreat_point);
            let stored = pos.unwrap_or(droid.pos);
            let started = world.time_ms;
            droid.order = match kind {
                OrderKind::Retreat => Order::Retreat { pos: stored },
                OrderKind::RunBurn => Order::RunBurn { pos: stored, started },
                _ => Order::Run { pos: stored, started },
            };
            match pos {
                Some(pos) => action_droid_loc(world, env, droid, ActionKind::Move, pos),
                None => action_droid(world, env, droid, ActionKind::None),
            }
        }

        OrderKind::Destruct => {
            droid.order = Order::Destruct;
            action_droid(world, env, droid, ActionKind::Destruct);
        }

        OrderKind::Rtb => assign_rtb(world, env, droid),

        OrderKind::Rtr | OrderKind::RtrSpecified => {
            if droid.is_vtol() {
                droid.order = Order::None;
                move_to_rearm(world, env, droid);
                return OrderOutcome::Accepted;
            }
            let provider = match request.target {
                Some(id) => world.live(id).map(|o| (id, o.pos())),
                None => decide_where_to_repair(world, droid).map(|p| (p.id, p.pos)),
            };
            let Some((target, pos)) = provider else {
                debug!(droid = droid.id.0, "nowhere to repair, returning to base");
                assign_rtb(world, env, droid);
                return OrderOutcome::Accepted;
            };
            let current = droid.order.kind();
            if matches!(current, OrderKind::Rtr | OrderKind::RtrSpecified) && droid.order.target() == Some(target) {
                return OrderOutcome::Accepted;
            }
            droid.order = if kind == OrderKind::Rtr {
                Order::Rtr {
                    target: Some(target),
                    pos,
                }
            } else {
                Order::RtrSpecified {
                    target: Some(target),
                    pos,
                }
            };
            action_droid_obj_loc(world, env, droid, ActionKind::Move, target, pos);
        }

        OrderKind::Embark => {
            let (target, pos) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            if !world.droid(target).is_some_and(Droid::is_transporter) || droid.is_transporter() {
                return reject(droid, kind, RejectReason::InvalidTarget);
            }
            droid.order = Order::Embark {
                target: Some(target),
                pos: droid.pos,
            };
            action_droid_loc(world, env, droid, ActionKind::Move, pos);
        }

        OrderKind::Disembark => {
            if !droid.is_transporter() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let Some(pos) = request.pos else {
                return reject(droid, kind, RejectReason::MissingTarget);
            };
            droid.order = Order::Disembark { pos };
            action_droid_loc(world, env, droid, ActionKind::Move, pos);
        }

        OrderKind::Recycle => {
            let here = droid.pos;
            let site = world
                .structures()
                .filter(|s| {
                    s.player == droid.player
                        && s.died.is_none()
                        && s.is_built()
                        && (s.kind.is_factory() || s.kind == StructureKind::RepairFacility)
                })
                .min_by_key(|s| (s.pos.distance_squared(here), s.id))
                .map(|s| (s.id, s.pos, s.breadth));
            let Some((target, pos, breadth)) = site else {
                return reject(droid, kind, RejectReason::NoDestination);
            };
            let front = pos + Vec2Fixed::from_ints(0, breadth * TILE_UNITS / 2 + TILE_UNITS / 2);
            droid.order = Order::Recycle {
                target: Some(target),
                pos: front,
            };
            droid.secondary.recycle = true;
            action_droid_obj_loc(world, env, droid, ActionKind::Move, target, front);
        }

        OrderKind::Guard => {
            let target = request.target.filter(|t| world.is_alive(*t));
            let pos = target
                .and_then(|t| world.live(t))
                .map(ObjectRef::pos)
                .or(request.pos)
                .unwrap_or(droid.pos);
            droid.order = Order::Guard { target, pos };
            action_droid(world, env, droid, ActionKind::None);
        }

        OrderKind::Restore => {
            if !droid.is_electronic() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let (target, pos) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            if world.structure(target).is_none() {
                return reject(droid, kind, RejectReason::InvalidTarget);
            }
            droid.order = Order::Restore {
                target: Some(target),
                pos,
            };
            action_droid_obj(world, env, droid, ActionKind::Restore, target);
        }

        OrderKind::ClearWreck => {
            if !droid.is_constructor() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let (target, pos) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            if world.feature(target).is_none() {
                return reject(droid, kind, RejectReason::InvalidTarget);
            }
            droid.order = Order::ClearWreck {
                target: Some(target),
                pos,
            };
            action_droid_obj(world, env, droid, ActionKind::ClearWreck, target);
        }

        OrderKind::Rearm => {
            if !droid.is_vtol() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let (pad, _) = match live_target(world, request) {
                Ok(t) => t,
                Err(reason) => return reject(droid, kind, reason),
            };
            if !world.structure(pad).is_some_and(|s| s.kind == StructureKind::RearmPad) {
                return reject(droid, kind, RejectReason::InvalidTarget);
            }
            droid.order = Order::Rearm { target: Some(pad) };
            action_droid_obj(world, env, droid, ActionKind::MoveToRearm, pad);
            assign_vtol_pad(world, droid, pad);
        }

        OrderKind::Circle => {
            if !droid.is_vtol() {
                return reject(droid, kind, RejectReason::WrongCategory);
            }
            let Some(center) = request.pos else {
                return reject(droid, kind, RejectReason::MissingTarget);
            };
            droid.order = Order::Circle { center };
            action_droid_loc(world, env, droid, ActionKind::Move, center);
        }

        OrderKind::LeaveMap => {
            let pos = request.pos.unwrap_or_else(|| nearest_edge(world, droid.pos));
            droid.order = Order::LeaveMap { pos };
            action_droid_loc(world, env, droid, ActionKind::Move, pos);
        }

        OrderKind::MoveAttackWall | OrderKind::ScoutAttackWall => {
            let Some(pos) = request.pos else {
                return reject(droid, kind, RejectReason::MissingTarget);
            };
            let target = request.target.filter(|t| world.is_alive(*t));
            droid.order = if kind == OrderKind::MoveAttackWall {
                Order::MoveAttackWall { target, pos }
            } else {
                Order::ScoutAttackWall { target, pos }
            };
            match target {
                Some(wall) => action_droid_obj(world, env, droid, ActionKind::Attack, wall),
                None => action_droid_loc(world, env, droid, ActionKind::Move, pos),
            }
        }
    }
    OrderOutcome::Accepted
}

/// Send a droid home: HQ first, then the landing zone, else idle.
fn assign_rtb(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let hq = world.find_structure(droid.player, StructureKind::Hq).map(|s| s.pos);
    if let Some(hq_pos) = hq {
        let pos = if droid.is_vtol() {
            landing_pos(world, &*env.terrain, droid, hq_pos).unwrap_or(hq_pos)
        } else {
            hq_pos
        };
        droid.order = Order::Rtb { pos };
        action_droid_loc(world, env, droid, ActionKind::Move, pos);
        return;
    }
    if let Some(zone) = world.player(droid.player).landing_zone {
        droid.order = Order::Rtb { pos: zone };
        action_droid_loc(world, env, droid, ActionKind::Move, zone);
        return;
    }
    debug!(droid = droid.id.0, "no base to return to");
    droid.order = Order::None;
    action_droid(world, env, droid, ActionKind::None);
}

/// Template for the next module on a structure. Only factories take
/// modules.
fn module_template(world: &World, target: ObjectId) -> Option<StructureTemplate> {
    let s = world.structure(target)?;
    if !s.kind.is_factory() {
        return None;
    }
    Some(StructureTemplate {
        kind: s.kind,
        width: s.width,
        breadth: s.breadth,
        build_points: s.build_points_required,
        body: s.max_body,
    })
}

/// Closest point just inside the map edge.
fn nearest_edge(world: &World, pos: Vec2Fixed) -> Vec2Fixed {
    let (w, h) = world.map_size();
    let (x, y) = pos.to_ints();
    let max_x = w * TILE_UNITS - 1;
    let max_y = h * TILE_UNITS - 1;
    let candidates = [(1, y), (max_x, y), (x, 1), (x, max_y)];
    let (ex, ey) = candidates
        .into_iter()
        .min_by_key(|&(cx, cy)| (i64::from(cx - x).abs() + i64::from(cy - y).abs(), cx, cy))
        .unwrap_or((x, y));
    Vec2Fixed::from_ints(ex, ey)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::droid::{BodySize, DroidCategory, DroidTemplate, PropulsionKind, PropulsionStats, WeaponStats};
    use crate::math::TilePos;
    use crate::structure::{Structure, StructureStatus, StructureTemplate};

    fn template(category: DroidCategory, weapons: Vec<WeaponStats>) -> DroidTemplate {
        DroidTemplate {
            category,
            body_size: BodySize::Medium,
            propulsion: PropulsionStats {
                kind: PropulsionKind::Wheeled,
                max_speed: 400,
            },
            body: 200,
            weapons,
            sensor_range: 1024,
            construct_points: 20,
            repair_points: 20,
        }
    }

    fn setup() -> (World, Environment) {
        (World::new(11, Tuning::default(), (32, 32)), Environment::flat(32, 32))
    }

    #[test]
    fn test_move_sets_order_and_action() {
        let (mut world, mut env) = setup();
        let mut droid = Droid::new(ObjectId(1), 0, &template(DroidCategory::Weapon, vec![]), TilePos::new(2, 2).center());
        let dest = TilePos::new(10, 10).center();
        let outcome = order_droid_base(&mut world, &mut env, &mut droid, &OrderRequest::loc(OrderKind::Move, dest));
        assert_eq!(outcome, OrderOutcome::Accepted);
        assert_eq!(droid.order, Order::Move { pos: dest });
        assert_eq!(droid.action.kind, ActionKind::Move);
    }

    #[test]
    fn test_unarmed_attack_is_rejected() {
        let (mut world, mut env) = setup();
        let mut droid = Droid::new(ObjectId(1), 0, &template(DroidCategory::Sensor, vec![]), TilePos::new(2, 2).center());
        world.insert_droid(Droid::new(ObjectId(2), 1, &template(DroidCategory::Weapon, vec![]), TilePos::new(4, 2).center()));
        let outcome = order_droid_base(&mut world, &mut env, &mut droid, &OrderRequest::obj(OrderKind::Attack, ObjectId(2)));
        assert_eq!(outcome, OrderOutcome::Rejected(RejectReason::NoWeapon));
        assert_eq!(droid.order, Order::None);
    }

    #[test]
    fn test_build_needs_constructor() {
        let (mut world, mut env) = setup();
        let mut tank = Droid::new(ObjectId(1), 0, &template(DroidCategory::Weapon, vec![]), TilePos::new(2, 2).center());
        let request = OrderRequest::build(
            StructureTemplate::single_tile(StructureKind::Wall),
            TilePos::new(6, 6).center(),
            0,
        );
        let outcome = order_droid_base(&mut world, &mut env, &mut tank, &request);
        assert_eq!(outcome, OrderOutcome::Rejected(RejectReason::WrongCategory));

        let mut truck = Droid::new(ObjectId(3), 0, &template(DroidCategory::Construct, vec![]), TilePos::new(2, 2).center());
        let outcome = order_droid_base(&mut world, &mut env, &mut truck, &request);
        assert_eq!(outcome, OrderOutcome::Accepted);
        assert_eq!(truck.order.kind(), OrderKind::Build);
        assert_eq!(truck.action.kind, ActionKind::MoveToBuild);
    }

    #[test]
    fn test_rtb_without_base_goes_idle() {
        let (mut world, mut env) = setup();
        let mut droid = Droid::new(ObjectId(1), 0, &template(DroidCategory::Weapon, vec![]), TilePos::new(2, 2).center());
        order_droid_base(&mut world, &mut env, &mut droid, &OrderRequest::new(OrderKind::Rtb));
        assert_eq!(droid.order, Order::None);

        let hq = Structure::new(
            ObjectId(9),
            0,
            &StructureTemplate::single_tile(StructureKind::Hq),
            TilePos::new(12, 12).center(),
            StructureStatus::Built,
        );
        world.insert_structure(hq);
        order_droid_base(&mut world, &mut env, &mut droid, &OrderRequest::new(OrderKind::Rtb));
        assert_eq!(droid.order, Order::Rtb { pos: TilePos::new(12, 12).center() });
        assert_eq!(droid.action.kind, ActionKind::Move);
    }

    #[test]
    fn test_recycle_heads_for_front_of_factory() {
        let (mut world, mut env) = setup();
        let factory_tmpl = StructureTemplate {
            kind: StructureKind::Factory,
            width: 3,
            breadth: 3,
            build_points: 1000,
            body: 2000,
        };
        let factory_pos = Vec2Fixed::from_ints(1280 + 64, 1280 + 64);
        world.insert_structure(Structure::new(ObjectId(5), 0, &factory_tmpl, factory_pos, StructureStatus::Built));
        let mut droid = Droid::new(ObjectId(1), 0, &template(DroidCategory::Weapon, vec![]), TilePos::new(2, 2).center());
        order_droid_base(&mut world, &mut env, &mut droid, &OrderRequest::new(OrderKind::Recycle));
        assert_eq!(droid.order.target(), Some(ObjectId(5)));
        assert_eq!(droid.order.pos(), Some(factory_pos + Vec2Fixed::from_ints(0, 3 * 64 + 64)));
        assert!(droid.secondary.recycle);
    }

    #[test]
    fn test_commander_fans_attack_out_as_attack_target() {
        let (mut world, mut env) = setup();
        let gun = template(DroidCategory::Weapon, vec![WeaponStats::default()]);
        let mut commander = Droid::new(ObjectId(1), 0, &template(DroidCategory::Command, vec![WeaponStats::default()]), TilePos::new(2, 2).center());
        let mut member = Droid::new(ObjectId(2), 0, &gun, TilePos::new(3, 2).center());
        member.commander = Some(ObjectId(1));
        world.insert_droid(member);
        world.insert_droid(Droid::new(ObjectId(3), 1, &gun, TilePos::new(20, 2).center()));

        order_droid_base(&mut world, &mut env, &mut commander, &OrderRequest::obj(OrderKind::Attack, ObjectId(3)));
        assert_eq!(commander.order.kind(), OrderKind::Attack);
        let member = world.droid(ObjectId(2)).map(|d| d.order.kind());
        assert_eq!(member, Some(OrderKind::AttackTarget));
    }

    #[test]
    fn test_nearest_edge_picks_closest_side() {
        let (world, _) = setup();
        let edge = nearest_edge(&world, Vec2Fixed::from_ints(100, 2000));
        assert_eq!(edge, Vec2Fixed::from_ints(1, 2000));
    }
}
