//! Weapon ranges, target selection and turret aiming.
//!
//! Visibility is approximated by sensor range: a droid sees what lies within
//! its sensor range, and a player sees what any of its (or an ally's)
//! droids or built structures sees.

use tracing::trace;

use crate::droid::{Droid, DroidCategory, WeaponStats};
use crate::environment::Environment;
use crate::math::{angle_add, angle_delta, atan2, deg_units, i_hypot, Angle, Fixed};
use crate::object::{ObjectId, ObjectRef, PlayerId};
use crate::order::OrderKind;
use crate::secondary::{halt_type, AttackRange, HaltType};
use crate::world::{DeferredCommand, TickEvent, World};

fn range_sq(range: i32) -> i64 {
    i64::from(range) * i64::from(range)
}

/// Outside the minimum range, unless the weapon lobs its shots.
fn clears_min_range(dist_sq: i64, stats: &WeaponStats) -> bool {
    stats.indirect || dist_sq >= range_sq(stats.min_range)
}

/// True if the target is within the droid's preferred engagement range for
/// weapon `slot`.
#[must_use]
pub fn in_attack_range(droid: &Droid, target: ObjectRef<'_>, slot: usize) -> bool {
    let Some(mount) = droid.weapons.get(slot) else {
        return false;
    };
    let stats = &mount.stats;
    let dist_sq = droid.pos.distance_squared(target.pos());
    let long = range_sq(stats.long_range);
    let short = range_sq(stats.short_range);

    let limit = if droid.order.kind() == OrderKind::AttackTarget && halt_type(droid) == HaltType::Hold {
        long
    } else {
        match droid.secondary.attack_range {
            AttackRange::Optimum if stats.short_hit > stats.long_hit => short,
            AttackRange::Optimum | AttackRange::Long => long,
            AttackRange::Short => short,
        }
    };
    dist_sq <= limit && clears_min_range(dist_sq, stats)
}

/// True if the target is within long range of weapon `slot`.
#[must_use]
pub fn in_range(droid: &Droid, target: ObjectRef<'_>, slot: usize) -> bool {
    let Some(mount) = droid.weapons.get(slot) else {
        return false;
    };
    let dist_sq = droid.pos.distance_squared(target.pos());
    dist_sq <= range_sq(mount.stats.long_range) && clears_min_range(dist_sq, &mount.stats)
}

/// True if the target is too close for weapon `slot` to engage directly.
#[must_use]
pub fn inside_min_range(droid: &Droid, target: ObjectRef<'_>, slot: usize) -> bool {
    let Some(mount) = droid.weapons.get(slot) else {
        return false;
    };
    droid.pos.distance_squared(target.pos()) <= range_sq(mount.stats.min_range)
}

/// True if `droid` itself can see `target`.
#[must_use]
pub fn sees(droid: &Droid, target: ObjectRef<'_>) -> bool {
    droid.pos.distance_squared(target.pos()) <= range_sq(droid.sensor_range)
}

/// True if `player` or one of its allies has anything watching `target`.
#[must_use]
pub fn player_sees(world: &World, player: PlayerId, target: ObjectRef<'_>) -> bool {
    let pos = target.pos();
    if target.player().is_some_and(|owner| world.allied(owner, player)) {
        return true;
    }
    world
        .droids()
        .filter(|d| d.died.is_none() && world.allied(d.player, player))
        .any(|d| d.pos.distance_squared(pos) <= range_sq(d.sensor_range))
        || world
            .structures()
            .filter(|s| s.died.is_none() && s.is_built() && world.allied(s.player, player))
            .any(|s| s.pos.distance_squared(pos) <= range_sq(s.sensor_range))
}

/// True if weapon `slot` can see `target` well enough to shoot at it.
///
/// Indirect weapons under a fire support order use whatever their player
/// can see, so a spotter extends their reach.
#[must_use]
pub fn visible(world: &World, droid: &Droid, target: ObjectRef<'_>, slot: usize) -> bool {
    if droid.weapons.is_empty() || droid.is_vtol() {
        return sees(droid, target);
    }
    let Some(mount) = droid.weapons.get(slot) else {
        return false;
    };
    if mount.stats.indirect && droid.order.kind() == OrderKind::FireSupport {
        player_sees(world, droid.player, target)
    } else {
        sees(droid, target)
    }
}

/// True if weapon `slot` may shoot at `target` at all.
#[must_use]
pub fn valid_target(world: &World, droid: &Droid, target: ObjectRef<'_>, slot: usize) -> bool {
    if !target.is_alive() || target.id() == droid.id {
        return false;
    }
    let Some(mount) = droid.weapons.get(slot) else {
        return false;
    };
    match target {
        ObjectRef::Feature(_) => false,
        ObjectRef::Structure(s) => {
            !world.allied(s.player, droid.player) && (!mount.stats.electronic || s.resistance > 0)
        }
        ObjectRef::Droid(d) => {
            if world.allied(d.player, droid.player) || mount.stats.electronic {
                return false;
            }
            // Ground weapons cannot reach VTOLs in flight.
            !d.is_vtol() || d.is_stopped() || droid.is_vtol()
        }
    }
}

/// Nearest hostile object weapon `slot` could engage, or `None`.
///
/// Candidates come from the spatial grid around the droid and are limited
/// to the larger of sensor and weapon range. Ties go to the lower id.
#[must_use]
pub fn best_target(world: &World, env: &Environment, droid: &Droid, slot: usize) -> Option<ObjectId> {
    let mount = droid.weapons.get(slot)?;
    let reach = droid.sensor_range.max(mount.stats.long_range);
    let reach_sq = range_sq(reach);
    let mut best: Option<(i64, ObjectId)> = None;
    for id in world.grid.query(droid.pos, reach) {
        let Some(obj) = world.live(id) else {
            continue;
        };
        if !valid_target(world, droid, obj, slot) || env.combat.is_probably_doomed(obj) {
            continue;
        }
        let dist_sq = droid.pos.distance_squared(obj.pos());
        if dist_sq > reach_sq {
            continue;
        }
        let closer = match best {
            Some((d, b)) => dist_sq < d || (dist_sq == d && id < b),
            None => true,
        };
        if closer {
            best = Some((dist_sq, id));
        }
    }
    best.map(|(_, id)| id)
}

/// Turn the turret of `slot` back towards the front, one step per tick.
pub fn align_turret(world: &World, droid: &mut Droid, slot: usize) {
    let rate = world.tuning.per_tick_i(deg_units(world.tuning.turret_rotation_rate_degrees)).max(1);
    let Some(mount) = droid.weapons.get_mut(slot) else {
        return;
    };
    let rot_err = angle_delta(0u16.wrapping_sub(mount.rotation));
    mount.rotation = step_angle(mount.rotation, rot_err, rate);
    let pitch_err = angle_delta(0u16.wrapping_sub(mount.pitch));
    mount.pitch = step_angle(mount.pitch, pitch_err, (rate / 2).max(1));
}

fn step_angle(angle: Angle, error: i32, rate: i32) -> Angle {
    angle_add(angle, error.clamp(-rate, rate))
}

/// Pitch limits in angle units for the turret of a category.
fn pitch_limits(world: &World, droid: &Droid, stats: Option<&WeaponStats>) -> (i32, i32) {
    match (droid.category, stats) {
        (
            DroidCategory::Weapon
            | DroidCategory::Transporter
            | DroidCategory::Command
            | DroidCategory::Cyborg
            | DroidCategory::CyborgSuper,
            Some(stats),
        ) => (deg_units(stats.min_elevation), deg_units(stats.max_elevation)),
        (DroidCategory::Repair | DroidCategory::CyborgRepair, _) => (
            deg_units(world.tuning.repair_pitch_upper_degrees),
            deg_units(world.tuning.repair_pitch_lower_degrees),
        ),
        _ => (0, 0),
    }
}

/// Swing the turret of `slot` towards `target`. Returns true once it is
/// on target.
///
/// Heavy weapons turn slower. VTOL weapons only traverse a limited arc
/// either side of the nose; bombs do not traverse at all and accept a
/// wider facing tolerance instead. Droids without a weapon mount have
/// nothing to aim and are always on target.
pub fn target_turret(world: &World, droid: &mut Droid, slot: usize, target: ObjectId) -> bool {
    let Some(obj) = world.live(target) else {
        return false;
    };
    let tuning = &world.tuning;
    let repairer = droid.is_repairer();
    let is_vtol = droid.is_vtol();
    let body_dir = droid.rot.direction;
    let stats = droid.weapons.get(slot).map(|m| m.stats.clone());
    let (pitch_lower, pitch_upper) = pitch_limits(world, droid, stats.as_ref());
    let Some(stats) = stats else {
        return true;
    };

    let base_rate = deg_units(tuning.turret_rotation_rate_degrees);
    let (mut rot_rate, mut pitch_rate) = (base_rate * 4, base_rate * 2);
    if stats.weight > tuning.heavy_weapon_weight && !repairer {
        let excess = i64::from(deg_units(100)) * i64::from(stats.weight - tuning.heavy_weapon_weight)
            / i64::from(stats.weight);
        rot_rate = base_rate * 2 - i32::try_from(excess).unwrap_or(base_rate * 2);
        pitch_rate = rot_rate / 2;
    }
    let floor = deg_units(1);
    let rot_rate = tuning.per_tick_i(rot_rate).max(floor);
    let pitch_rate = tuning.per_tick_i(pitch_rate).max(floor);

    let delta = obj.pos() - droid.pos;
    let target_rotation = atan2(delta.x, delta.y);

    let Some(mount) = droid.weapons.get_mut(slot) else {
        return true;
    };
    let rot_err = angle_delta(target_rotation.wrapping_sub(mount.rotation.wrapping_add(body_dir)));
    let mut rotation = step_angle(mount.rotation, rot_err, rot_rate);

    let mut tolerance = 0;
    if is_vtol {
        let limit = if stats.fixed_aim {
            tolerance = deg_units(tuning.vtol_bomb_tolerance_degrees);
            0
        } else {
            deg_units(tuning.vtol_turret_limit_degrees)
        };
        rotation = angle_delta(rotation).clamp(-limit, limit) as Angle;
    }
    let mut on_target = angle_delta(target_rotation.wrapping_sub(rotation.wrapping_add(body_dir))).abs() <= tolerance;

    let mut pitch = mount.pitch;
    let aims = !repairer && (!stats.indirect || delta.length_squared() <= range_sq(stats.min_range));
    if aims {
        let dz = obj.z() - droid.z;
        let dxy = i_hypot(delta.x.to_num::<i64>(), delta.y.to_num::<i64>());
        let target_pitch = atan2(dz, Fixed::from_num(dxy));
        let pitch_err = angle_delta(target_pitch.wrapping_sub(pitch));
        pitch = step_angle(pitch, pitch_err, pitch_rate);
        pitch = angle_delta(pitch).clamp(pitch_lower, pitch_upper) as Angle;
        on_target = on_target && target_pitch == pitch;
    }

    mount.rotation = rotation;
    mount.pitch = pitch;
    on_target
}

/// True if the body of `droid` faces `target` closely enough for a fixed
/// weapon to fire.
#[must_use]
pub fn facing(world: &World, droid: &Droid, target: ObjectRef<'_>) -> bool {
    let delta = target.pos() - droid.pos;
    let dir = atan2(delta.x, delta.y);
    angle_delta(dir.wrapping_sub(droid.rot.direction)).abs() <= deg_units(world.tuning.fixed_turret_dir_degrees)
}

/// Discharge weapon `slot` at `target`. Returns true if a shot went off.
///
/// Respects the reload delay, keeps weapons that cannot fire on the move
/// quiet while the droid is driving, and counts VTOL attack runs. Damage
/// is applied after the droid's turn.
pub fn fire(world: &mut World, env: &mut Environment, droid: &mut Droid, slot: usize, target: ObjectId) -> bool {
    let now = world.time_ms;
    let moving = !droid.is_stopped();
    let Some(mount) = droid.weapons.get(slot) else {
        return false;
    };
    if mount.is_empty() || (moving && !mount.stats.fire_on_move) {
        return false;
    }
    if mount.last_fired > 0 && now < mount.last_fired + u64::from(mount.stats.firing_delay) {
        return false;
    }
    let electronic = mount.stats.electronic;
    let Some(obj) = world.live(target) else {
        return false;
    };
    let Some(shot) = env.combat.fire_weapon(droid, slot, obj) else {
        return false;
    };

    if let Some(mount) = droid.weapons.get_mut(slot) {
        mount.last_fired = now.max(1);
        if mount.stats.num_attack_runs > 0 {
            mount.used_ammo += 1;
        }
    }
    trace!(droid = droid.id.0, mount = slot, target = target.0, damage = shot.damage, "weapon fired");
    world.events.push(TickEvent::ShotFired {
        firer: droid.id,
        mount: slot,
        target,
    });
    if shot.damage > 0 {
        world.defer(DeferredCommand::Damage {
            target: shot.target,
            damage: shot.damage,
            by: droid.player,
            electronic,
        });
    }
    true
}
