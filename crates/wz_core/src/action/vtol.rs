//! VTOL support: landing spots, attack runs and the rearm cycle.
//!
//! A VTOL that runs out of attack runs flies back to a rearm pad
//! ([`move_to_rearm`]), lands next to it and waits. Each pad picks the
//! waiting VTOL that has been waiting longest, calls it onto the pad and
//! reloads and repairs it there ([`update_rearm_pad`]).

use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::targeting::{fire, in_range, target_turret, valid_target, visible};
use super::{action_droid, action_droid_obj, ActionKind};
use crate::droid::Droid;
use crate::environment::{Environment, Terrain, TerrainType};
use crate::math::{i_hypot, TilePos, Vec2Fixed, TILE_UNITS};
use crate::movement::{move_droid_to_direct, MoveStatus};
use crate::object::{ObjectId, ObjectRef, PlayerId};
use crate::order::{order_droid, order_droid_obj, order_state_obj, Order, OrderKind};
use crate::spiral::spiral_search;
use crate::structure::{StructureFunction, StructureKind};
use crate::world::{TickEvent, World};

fn on_map(world: &World, tile: TilePos) -> bool {
    let (w, h) = world.map_size();
    tile.x >= 0 && tile.y >= 0 && tile.x < w && tile.y < h
}

fn tile_has_feature(world: &World, tile: TilePos) -> bool {
    world
        .grid
        .query(tile.center(), TILE_UNITS / 2)
        .into_iter()
        .filter_map(|id| world.feature(id))
        .any(|f| f.died.is_none() && TilePos::of(f.pos) == tile)
}

/// Free tile near `pos` for `droid` to land on, as a tile centre.
///
/// Tiles under other droids of the same player (or under the destination
/// of those still moving) are taken, as are tiles with a structure or a
/// feature, water and cliffs.
#[must_use]
pub fn landing_pos(world: &World, terrain: &dyn Terrain, droid: &Droid, pos: Vec2Fixed) -> Option<Vec2Fixed> {
    let reserved: BTreeSet<TilePos> = world
        .droids()
        .filter(|d| d.player == droid.player && d.id != droid.id && d.died.is_none())
        .map(|d| {
            if d.is_stopped() {
                d.tile()
            } else {
                TilePos::of(d.movement.destination)
            }
        })
        .collect();

    let found = spiral_search(TilePos::of(pos), world.tuning.vtol_landing_radius, |tile| {
        on_map(world, tile)
            && !reserved.contains(&tile)
            && !matches!(terrain.terrain_type(tile), TerrainType::Water | TerrainType::Cliff)
            && world.structure_at(tile).is_none()
            && !tile_has_feature(world, tile)
    });
    match found {
        Some(tile) => {
            trace!(droid = droid.id.0, x = tile.x, y = tile.y, "landing tile");
            Some(tile.center())
        }
        None => {
            debug!(droid = droid.id.0, "no landing tile");
            None
        }
    }
}

/// True if a droid of the pad's owner other than `droid` sits on the pad.
#[must_use]
pub fn vtol_on_rearm_pad(world: &World, pad: ObjectId, droid: ObjectId) -> bool {
    let Some(pad) = world.structure(pad) else {
        return false;
    };
    let tile = TilePos::of(pad.pos);
    world
        .droids()
        .any(|d| d.id != droid && d.player == pad.player && d.died.is_none() && d.tile() == tile)
}

/// True if the pad is free or its VTOL is done.
#[must_use]
pub fn clear_rearm_pad(world: &World, pad: ObjectId) -> bool {
    let Some(pad) = world.structure(pad) else {
        return false;
    };
    if pad.kind != StructureKind::RearmPad {
        return false;
    }
    pad.pad_vtol()
        .and_then(|v| world.droid(v))
        .map_or(true, Droid::vtol_happy)
}

/// Nearest built rearm pad of the droid's player.
///
/// A `preferred` pad nobody sits on wins outright. With `clear`, only pads
/// that are free or hold a finished VTOL count, and empty ones are
/// preferred over those.
#[must_use]
pub fn find_nearest_rearm_pad(
    world: &World,
    droid: &Droid,
    preferred: Option<ObjectId>,
    clear: bool,
) -> Option<ObjectId> {
    let preferred = preferred
        .and_then(|id| world.structure(id))
        .filter(|s| s.died.is_none() && s.kind == StructureKind::RearmPad);
    if let Some(pad) = preferred {
        if !vtol_on_rearm_pad(world, pad.id, droid.id) {
            return Some(pad.id);
        }
    }
    let centre = preferred.map_or(droid.pos, |p| p.pos);

    let mut nearest: Option<(i64, ObjectId)> = None;
    let mut empty: Option<(i64, ObjectId)> = None;
    for pad in world.structures() {
        if pad.player != droid.player
            || pad.kind != StructureKind::RearmPad
            || !pad.is_built()
            || pad.died.is_some()
            || (clear && !clear_rearm_pad(world, pad.id))
        {
            continue;
        }
        let dist = pad.pos.distance_squared(centre);
        let slot = if clear && !vtol_on_rearm_pad(world, pad.id, droid.id) {
            &mut empty
        } else {
            &mut nearest
        };
        if slot.map_or(true, |(best, _)| dist < best) {
            *slot = Some((dist, pad.id));
        }
    }
    empty.or(nearest).map(|(_, id)| id)
}

/// Make `pad` the home pad of a VTOL.
pub fn assign_vtol_pad(world: &World, droid: &mut Droid, pad: ObjectId) {
    if !droid.is_vtol() {
        return;
    }
    if world
        .structure(pad)
        .is_some_and(|s| s.kind == StructureKind::RearmPad && s.died.is_none())
    {
        droid.base_structure = Some(pad);
    }
}

/// Send a VTOL back to the nearest rearm pad, or home if there is none.
pub fn move_to_rearm(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    if !droid.is_vtol() || droid.vtol_rearming() {
        return;
    }
    let Some(pad) = find_nearest_rearm_pad(world, droid, droid.base_structure, false) else {
        debug!(droid = droid.id.0, "no rearm pad, returning to base");
        order_droid(world, env, droid, OrderKind::Rtb);
        return;
    };
    if droid.base_structure.is_none() {
        assign_vtol_pad(world, droid, pad);
    }
    debug!(droid = droid.id.0, pad = pad.0, "heading back to rearm");
    if droid.order.kind() == OrderKind::None {
        order_droid_obj(world, env, droid, OrderKind::Rearm, pad);
    } else {
        action_droid_obj(world, env, droid, ActionKind::MoveToRearm, pad);
    }
}

/// Ask allied VTOLs parked on `pad` to make room for `droid`.
pub fn ensure_rearm_pad_clear(world: &mut World, env: &mut Environment, pad: ObjectId, droid: ObjectId) {
    let Some((owner, tile)) = world.structure(pad).map(|s| (s.player, TilePos::of(s.pos))) else {
        return;
    };
    let shared: &World = world;
    let parked = shared.droid_ids_matching(|d| {
        d.id != droid && d.died.is_none() && d.is_vtol() && d.tile() == tile && shared.allied(owner, d.player)
    });
    for id in parked {
        trace!(droid = id.0, pad = pad.0, "clearing rearm pad");
        world.with_droid(id, |w, d| action_droid_obj(w, env, d, ActionKind::ClearRearmPad, pad));
    }
}

/// True if a VTOL waiting near `pad` may be called onto it.
#[must_use]
pub fn ready_to_rearm(world: &World, droid: &Droid, pad: ObjectId) -> bool {
    if !droid.is_vtol() || droid.action.kind != ActionKind::WaitForRearm {
        return false;
    }
    if let Some(ordered) = order_state_obj(droid, OrderKind::Rearm) {
        if ordered != pad && !vtol_on_rearm_pad(world, ordered, droid.id) {
            return false;
        }
    }
    !(droid.vtol_happy() && vtol_on_rearm_pad(world, pad, droid.id))
}

/// True once no VTOL sharing the droid's order and target is still in the
/// rearm cycle. Ground droids are always ready.
#[must_use]
pub fn all_vtols_rearmed(world: &World, droid: &Droid) -> bool {
    if !droid.is_vtol() {
        return true;
    }
    if droid.vtol_rearming() {
        return false;
    }
    let kind = droid.order.kind();
    let target = droid.order.target();
    !world.droids().any(|d| {
        d.player == droid.player
            && d.died.is_none()
            && d.vtol_rearming()
            && d.order.kind() == kind
            && d.order.target() == target
    })
}

/// Fly a straight run through the target and out the other side.
pub fn add_attack_run(world: &World, droid: &mut Droid) {
    let target = droid
        .action
        .target()
        .or_else(|| droid.order.target())
        .and_then(|t| world.live(t))
        .map(ObjectRef::pos);
    let Some(target) = target else {
        return;
    };
    let (dx, dy) = (target - droid.pos).to_ints();
    let (dx, dy) = (i64::from(dx), i64::from(dy));
    let (tx, ty) = target.to_ints();
    let (tx, ty) = (i64::from(tx), i64::from(ty));
    let len = i_hypot(dx, dy);
    let run = i64::from(world.tuning.vtol_attack_length);
    let (x, y) = if len == 0 {
        (tx, ty)
    } else {
        (tx + dx * run / len, ty + dy * run / len)
    };

    let (w, h) = world.map_size();
    let on_map = x > 0 && y > 0 && x <= i64::from(w * TILE_UNITS) && y <= i64::from(h * TILE_UNITS);
    match (i32::try_from(x), i32::try_from(y)) {
        (Ok(x), Ok(y)) if on_map => move_droid_to_direct(droid, Vec2Fixed::from_ints(x, y)),
        _ => trace!(droid = droid.id.0, "attack run would leave the map"),
    }
}

/// Attack-run bookkeeping while a VTOL fires on the move.
pub fn update_vtol_attack(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    if droid.order.kind() == OrderKind::Rtb {
        return;
    }
    if droid.has_weapon() && droid.vtol_empty() {
        move_to_rearm(world, env, droid);
        return;
    }
    if droid.movement.status == MoveStatus::Hover && !droid.is_cyborg() {
        add_attack_run(world, droid);
    }
}

/// One tick of the VTOL attack run action.
pub(crate) fn update_attack_run(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let Some(target) = droid.action.target() else {
        move_to_rearm(world, env, droid);
        return;
    };
    let valid = world.live(target).is_some_and(|o| valid_target(world, droid, o, 0));
    if valid {
        let flipped = droid.is_electronic() && world.live(target).and_then(ObjectRef::player) == Some(droid.player);
        if droid.vtol_empty() || flipped {
            move_to_rearm(world, env, droid);
            return;
        }
        for slot in 0..droid.weapons.len() {
            let Some(obj) = world.live(target) else {
                break;
            };
            if !valid_target(world, droid, obj, slot) || !visible(world, droid, obj, slot) {
                continue;
            }
            let reachable = in_range(droid, obj, slot);
            if target_turret(world, droid, slot, target) && reachable {
                fire(world, env, droid, slot, target);
            }
        }
    }

    let Some(target_pos) = world.live(target).map(ObjectRef::pos) else {
        return;
    };
    if droid.is_stopped() {
        add_attack_run(world, droid);
        return;
    }
    let turn_dist = i64::from(world.tuning.vtol_attack_target_dist);
    let turn_sq = turn_dist * turn_dist;
    let range_sq = droid.pos.distance_squared(target_pos);
    let dest_sq = droid.movement.destination.distance_squared(target_pos);
    if range_sq < turn_sq {
        // Only turn around while still heading for the target.
        if dest_sq < turn_sq {
            add_attack_run(world, droid);
        }
    } else if let Some(long) = droid.weapons.first().map(|w| i64::from(w.stats.long_range)) {
        if range_sq > long * long && dest_sq > turn_sq {
            move_droid_to_direct(droid, target_pos);
        }
    }
}

fn holds_claim(droid: &Droid, pad: ObjectId) -> bool {
    match droid.action.kind {
        ActionKind::WaitForRearm => true,
        ActionKind::MoveToRearmPoint | ActionKind::WaitDuringRearm => droid.action.target() == Some(pad),
        _ => false,
    }
}

fn set_claim(world: &mut World, pad: ObjectId, claim: Option<ObjectId>) {
    if let Some(s) = world.structure_mut(pad) {
        if let StructureFunction::RearmPad { vtol, progress_ms, .. } = &mut s.function {
            *vtol = claim;
            *progress_ms = 0;
        }
    }
}

/// Longest-waiting VTOL ready for `pad`: own droids first, then allies.
fn next_in_line(world: &World, pad: ObjectId, owner: PlayerId) -> Option<ObjectId> {
    let mut best: Option<&Droid> = None;
    for d in world.droids().filter(|d| d.player == owner && d.died.is_none()) {
        if ready_to_rearm(world, d, pad) && best.map_or(true, |b| d.action.started < b.action.started) {
            best = Some(d);
        }
    }
    if let Some(d) = best {
        return Some(d.id);
    }
    world
        .droids()
        .find(|d| d.player != owner && d.died.is_none() && world.allied(owner, d.player) && ready_to_rearm(world, d, pad))
        .map(|d| d.id)
}

/// One tick of a rearm pad.
///
/// An idle pad calls the next waiting VTOL onto itself. A VTOL that has
/// landed on the pad is reloaded one attack run per weapon every
/// `1000 / rearm_rate` ms and repaired at the tuned rate; once full it is
/// released.
pub fn update_rearm_pad(world: &mut World, env: &mut Environment, pad_id: ObjectId) {
    let Some(pad) = world.structure(pad_id) else {
        return;
    };
    if pad.died.is_some() || !pad.is_built() {
        return;
    }
    let StructureFunction::RearmPad { vtol, .. } = pad.function else {
        return;
    };
    let owner = pad.player;

    let claim = vtol.filter(|id| {
        world
            .droid(*id)
            .is_some_and(|d| d.died.is_none() && holds_claim(d, pad_id))
    });
    if claim != vtol {
        trace!(pad = pad_id.0, "rearm pad released");
        set_claim(world, pad_id, claim);
    }

    let Some(id) = claim else {
        let Some(next) = next_in_line(world, pad_id, owner) else {
            return;
        };
        debug!(pad = pad_id.0, droid = next.0, "calling vtol onto pad");
        world.with_droid(next, |w, d| action_droid_obj(w, env, d, ActionKind::MoveToRearmPoint, pad_id));
        set_claim(world, pad_id, Some(next));
        return;
    };

    let Some((action, status)) = world.droid(id).map(|d| (d.action.kind, d.movement.status)) else {
        return;
    };
    match action {
        ActionKind::WaitForRearm if matches!(status, MoveStatus::Inactive | MoveStatus::Hover) => {
            world.with_droid(id, |w, d| action_droid_obj(w, env, d, ActionKind::MoveToRearmPoint, pad_id));
            set_claim(world, pad_id, Some(id));
        }
        ActionKind::WaitDuringRearm if status == MoveStatus::Inactive => rearm_step(world, env, pad_id, id),
        _ => {}
    }
}

fn rearm_step(world: &mut World, env: &mut Environment, pad_id: ObjectId, id: ObjectId) {
    let tick_ms = world.tuning.tick_ms;
    let heal = u32::try_from(world.tuning.per_tick_i(i32::try_from(world.tuning.vtol_repair_rate).unwrap_or(i32::MAX)))
        .unwrap_or(0)
        .max(1);

    let mut reloads = 0;
    if let Some(s) = world.structure_mut(pad_id) {
        if let StructureFunction::RearmPad {
            rearm_rate,
            progress_ms,
            ..
        } = &mut s.function
        {
            let period = 1000 / (*rearm_rate).max(1);
            *progress_ms += tick_ms;
            reloads = *progress_ms / period.max(1);
            *progress_ms %= period.max(1);
        }
    }

    let Some(droid) = world.droid_mut(id) else {
        return;
    };
    for mount in &mut droid.weapons {
        mount.used_ammo = mount.used_ammo.saturating_sub(reloads);
    }
    droid.body = (droid.body + heal).min(droid.original_body);
    if !droid.vtol_happy() {
        return;
    }
    for mount in &mut droid.weapons {
        mount.last_fired = 0;
    }

    debug!(droid = id.0, pad = pad_id.0, "vtol rearmed");
    world.with_droid(id, |w, d| {
        action_droid(w, env, d, ActionKind::None);
        if matches!(d.order, Order::Rearm { .. }) {
            d.order = Order::None;
        }
    });
    set_claim(world, pad_id, None);
    world.events.push(TickEvent::Rearmed { droid: id, pad: pad_id });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tuning;
    use crate::droid::{BodySize, DroidCategory, DroidTemplate, PropulsionKind, PropulsionStats, WeaponStats};
    use crate::structure::{Feature, FeatureKind, Structure, StructureStatus, StructureTemplate};

    fn vtol(id: u32, player: PlayerId, tile: TilePos) -> Droid {
        let template = DroidTemplate {
            category: DroidCategory::Weapon,
            body_size: BodySize::Light,
            propulsion: PropulsionStats {
                kind: PropulsionKind::Lift,
                max_speed: 700,
            },
            body: 100,
            weapons: vec![WeaponStats {
                num_attack_runs: 2,
                ..WeaponStats::default()
            }],
            sensor_range: 1024,
            construct_points: 0,
            repair_points: 0,
        };
        Droid::new(ObjectId(id), player, &template, tile.center())
    }

    fn setup() -> (World, Environment) {
        (World::new(9, Tuning::default(), (32, 32)), Environment::flat(32, 32))
    }

    fn pad(world: &mut World, player: PlayerId, tile: TilePos) -> ObjectId {
        let id = world.allocate_id();
        world.insert_structure(Structure::new(
            id,
            player,
            &StructureTemplate::single_tile(StructureKind::RearmPad),
            tile.center(),
            StructureStatus::Built,
        ))
    }

    #[test]
    fn test_landing_pos_skips_taken_tiles() {
        let (mut world, env) = setup();
        let here = TilePos::new(10, 10);
        let me = vtol(1, 0, here);
        assert_eq!(landing_pos(&world, &*env.terrain, &me, here.center()), Some(here.center()));

        world.insert_droid(vtol(2, 0, here));
        let spot = landing_pos(&world, &*env.terrain, &me, here.center()).map(TilePos::of);
        assert!(spot.is_some_and(|t| t != here));

        let fid = world.allocate_id();
        world.insert_feature(Feature::new(fid, FeatureKind::OilResource, TilePos::new(11, 10).center()));
        let spot = landing_pos(&world, &*env.terrain, &me, TilePos::new(11, 10).center()).map(TilePos::of);
        assert!(spot.is_some_and(|t| t != TilePos::new(11, 10)));
    }

    #[test]
    fn test_enemy_droids_do_not_reserve_tiles() {
        let (mut world, env) = setup();
        let here = TilePos::new(4, 4);
        world.insert_droid(vtol(2, 1, here));
        let me = vtol(1, 0, TilePos::new(8, 8));
        assert_eq!(landing_pos(&world, &*env.terrain, &me, here.center()), Some(here.center()));
    }

    #[test]
    fn test_move_to_rearm_orders_idle_vtol_to_pad() {
        let (mut world, mut env) = setup();
        let p = pad(&mut world, 0, TilePos::new(5, 5));
        let mut v = vtol(1, 0, TilePos::new(20, 20));
        v.weapons[0].used_ammo = 2;
        move_to_rearm(&mut world, &mut env, &mut v);
        assert_eq!(v.order, Order::Rearm { target: Some(p) });
        assert_eq!(v.action.kind, ActionKind::MoveToRearm);
        assert_eq!(v.base_structure, Some(p));

        // Already on the way: nothing changes.
        let before = v.action;
        move_to_rearm(&mut world, &mut env, &mut v);
        assert_eq!(v.action, before);
    }

    #[test]
    fn test_move_to_rearm_without_pad_returns_to_base() {
        let (mut world, mut env) = setup();
        world.player_mut(0).landing_zone = Some(TilePos::new(2, 2).center());
        let mut v = vtol(1, 0, TilePos::new(20, 20));
        move_to_rearm(&mut world, &mut env, &mut v);
        assert_eq!(v.order.kind(), OrderKind::Rtb);
    }

    #[test]
    fn test_nearest_clear_pad_prefers_empty_pads() {
        let (mut world, _) = setup();
        let near = pad(&mut world, 0, TilePos::new(10, 10));
        let far = pad(&mut world, 0, TilePos::new(20, 10));
        let me = vtol(1, 0, TilePos::new(9, 10));
        assert_eq!(find_nearest_rearm_pad(&world, &me, None, true), Some(near));

        // A finished VTOL parked on the near pad keeps it usable but not preferred.
        let mut parked = vtol(2, 0, TilePos::new(10, 10));
        parked.action.kind = ActionKind::None;
        world.insert_droid(parked);
        assert_eq!(find_nearest_rearm_pad(&world, &me, None, true), Some(far));
        assert_eq!(find_nearest_rearm_pad(&world, &me, None, false), Some(near));
        assert_eq!(find_nearest_rearm_pad(&world, &me, Some(far), false), Some(far));
    }

    #[test]
    fn test_all_vtols_rearmed_tracks_wingmates() {
        let (mut world, _) = setup();
        let target = ObjectId(99);
        let mut lead = vtol(1, 0, TilePos::new(3, 3));
        lead.order = Order::AttackTarget { target: Some(target) };
        let mut wing = vtol(2, 0, TilePos::new(4, 3));
        wing.order = Order::AttackTarget { target: Some(target) };
        wing.action.kind = ActionKind::WaitDuringRearm;
        world.insert_droid(wing);
        assert!(!all_vtols_rearmed(&world, &lead));
        if let Some(w) = world.droid_mut(ObjectId(2)) {
            w.action.kind = ActionKind::None;
        }
        assert!(all_vtols_rearmed(&world, &lead));
    }

    #[test]
    fn test_attack_run_overshoots_target() {
        let (mut world, _) = setup();
        let mut enemy = vtol(2, 1, TilePos::new(10, 10));
        enemy.propulsion.kind = PropulsionKind::Tracked;
        world.insert_droid(enemy);
        let mut me = vtol(1, 0, TilePos::new(10, 4));
        me.action.set_target(0, Some(ObjectId(2)));
        add_attack_run(&world, &mut me);
        let dest = me.movement.destination.to_ints();
        let target = TilePos::new(10, 10).center().to_ints();
        assert_eq!(dest.0, target.0);
        assert_eq!(dest.1, target.1 + Tuning::default().vtol_attack_length);
    }

    #[test]
    fn test_pad_cycle_calls_rearms_and_releases() {
        let (mut world, mut env) = setup();
        let p = pad(&mut world, 0, TilePos::new(6, 6));
        let mut v = vtol(1, 0, TilePos::new(7, 6));
        v.weapons[0].used_ammo = 2;
        v.action.kind = ActionKind::WaitForRearm;
        v.action.set_target(0, Some(p));
        world.insert_droid(v);

        update_rearm_pad(&mut world, &mut env, p);
        assert_eq!(world.structure(p).and_then(|s| s.pad_vtol()), Some(ObjectId(1)));
        assert_eq!(world.droid(ObjectId(1)).map(|d| d.action.kind), Some(ActionKind::MoveToRearmPoint));

        // Pretend the VTOL has landed on the pad.
        if let Some(d) = world.droid_mut(ObjectId(1)) {
            d.pos = TilePos::new(6, 6).center();
            d.action.kind = ActionKind::WaitDuringRearm;
            d.movement.status = MoveStatus::Inactive;
        }
        for _ in 0..30 {
            world.time_ms += u64::from(world.tuning.tick_ms);
            update_rearm_pad(&mut world, &mut env, p);
        }
        let d = world.droid(ObjectId(1)).map(|d| (d.action.kind, d.weapons[0].used_ammo));
        assert_eq!(d, Some((ActionKind::None, 0)));
        assert_eq!(world.structure(p).and_then(|s| s.pad_vtol()), None);
        assert!(world.events.contains(&TickEvent::Rearmed {
            droid: ObjectId(1),
            pad: p
        }));
    }

    #[test]
    fn test_parked_vtol_is_moved_off_pad() {
        let (mut world, mut env) = setup();
        let p = pad(&mut world, 0, TilePos::new(6, 6));
        world.insert_droid(vtol(2, 0, TilePos::new(6, 6)));
        ensure_rearm_pad_clear(&mut world, &mut env, p, ObjectId(1));
        assert_eq!(world.droid(ObjectId(2)).map(|d| d.action.kind), Some(ActionKind::ClearRearmPad));
    }
}
