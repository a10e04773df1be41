//! Speed, heading and obstacle avoidance.
//!
//! Speeds are world units per second and turn rates angle units per second;
//! everything is scaled down to a single tick with [`Tuning::per_tick_i`].

use crate::config::Tuning;
use crate::droid::{Droid, PropulsionKind};
use crate::environment::{Terrain, TileBlocking};
use crate::math::{
    angle_add, angle_delta, angle_diff, atan2, cos, deg_units, i_hypot, sin, Angle, Fixed,
    TilePos, Vec2Fixed,
};
use crate::world::World;

use super::MoveStatus;

const TRACKED_SPIN_ANGLE: i32 = deg_units(45);
const GROUND_ACCEL: i32 = 250;
const GROUND_DECEL: i32 = 800;
const TRACKED_SKID_DECEL: i32 = 600;
const WHEELED_SKID_DECEL: i32 = 350;
const HOVER_SKID_DECEL: i32 = 120;

const PERSON_SPIN_ANGLE: i32 = deg_units(45);
const PERSON_SPIN_SPEED: i32 = deg_units(500);
const PERSON_TURN_SPEED: i32 = deg_units(250);
const PERSON_ACCEL: i32 = 250;
const PERSON_DECEL: i32 = 450;

const VTOL_SPIN_ANGLE: i32 = deg_units(180);
const VTOL_SPIN_SPEED: i32 = deg_units(200);
const VTOL_TURN_SPEED: i32 = deg_units(100);
const VTOL_ACCEL: i32 = 200;
const VTOL_DECEL: i32 = 200;
const VTOL_SKID_DECEL: i32 = 600;

/// Half the spacing of the four ground samples used for pitch and roll.
const ORIENTATION_SAMPLE: i32 = 20;

/// Turning and acceleration limits of one movement model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionModel {
    /// Turns this large or larger get the full spin rate.
    pub spin_angle: i32,
    /// Turn rate when turning on the spot.
    pub spin_speed: i32,
    /// Turn rate at full speed.
    pub turn_speed: i32,
    /// Forward acceleration.
    pub accel: i32,
    /// Forward deceleration.
    pub decel: i32,
    /// Sideways deceleration; `None` for models that never skid.
    pub skid_decel: Option<i32>,
}

fn scaled_rate(base: i32, degrees: i32, divisor: i32) -> i32 {
    let rate = i64::from(base) * i64::from(deg_units(degrees)) / i64::from(divisor);
    i32::try_from(rate).unwrap_or(i32::MAX)
}

impl MotionModel {
    /// Legged infantry and cyborgs.
    #[must_use]
    pub const fn person() -> Self {
        Self {
            spin_angle: PERSON_SPIN_ANGLE,
            spin_speed: PERSON_SPIN_SPEED,
            turn_speed: PERSON_TURN_SPEED,
            accel: PERSON_ACCEL,
            decel: PERSON_DECEL,
            skid_decel: None,
        }
    }

    /// Wheels, tracks, hover and everything else that drives on the ground.
    #[must_use]
    pub fn ground(kind: PropulsionKind, base_speed: i32) -> Self {
        let spin_speed = scaled_rate(base_speed, 3, 4);
        let (turn_speed, spin_angle, skid) = match kind {
            PropulsionKind::Hover => (scaled_rate(base_speed, 1, 4), deg_units(180), HOVER_SKID_DECEL),
            PropulsionKind::Wheeled => (scaled_rate(base_speed, 1, 3), deg_units(180), WHEELED_SKID_DECEL),
            _ => (scaled_rate(base_speed, 1, 3), TRACKED_SPIN_ANGLE, TRACKED_SKID_DECEL),
        };
        Self {
            spin_angle,
            spin_speed,
            turn_speed,
            accel: GROUND_ACCEL,
            decel: GROUND_DECEL,
            skid_decel: Some(skid),
        }
    }

    /// Aircraft. Transporters use the fixed rates.
    #[must_use]
    pub fn vtol(base_speed: i32, transporter: bool) -> Self {
        let (spin_speed, turn_speed) = if transporter {
            (VTOL_SPIN_SPEED, VTOL_TURN_SPEED)
        } else {
            (
                scaled_rate(base_speed, 1, 2).max(VTOL_SPIN_SPEED),
                scaled_rate(base_speed, 1, 8).max(VTOL_TURN_SPEED),
            )
        };
        Self {
            spin_angle: VTOL_SPIN_ANGLE,
            spin_speed,
            turn_speed,
            accel: VTOL_ACCEL,
            decel: VTOL_DECEL,
            skid_decel: Some(VTOL_SKID_DECEL),
        }
    }

    /// The model a droid moves with.
    #[must_use]
    pub fn for_droid(droid: &Droid) -> Self {
        if droid.is_person() || droid.is_cyborg() {
            Self::person()
        } else if droid.propulsion.kind.is_lift() {
            Self::vtol(droid.propulsion.max_speed, droid.is_transporter())
        } else {
            Self::ground(droid.propulsion.kind, droid.propulsion.max_speed)
        }
    }
}

/// `sin(angle) * r` in integer units.
#[must_use]
pub fn sin_r(angle: Angle, r: i64) -> i64 {
    ((i128::from(sin(angle).to_bits()) * i128::from(r)) >> 32) as i64
}

/// `cos(angle) * r` in integer units.
#[must_use]
pub fn cos_r(angle: Angle, r: i64) -> i64 {
    ((i128::from(cos(angle).to_bits()) * i128::from(r)) >> 32) as i64
}

fn int_atan2(x: i64, y: i64) -> Angle {
    atan2(Fixed::saturating_from_num(x), Fixed::saturating_from_num(y))
}

/// Top speed available this tick before turning and tapering.
///
/// Terrain scales the propulsion's top speed; pitch slows climbs and
/// speeds descents, floored so a badly marked slope cannot pin a unit in
/// place. Weapons that cannot fire on the move hold the unit still for a
/// moment after each shot.
#[must_use]
pub fn droid_speed(droid: &Droid, terrain: &dyn Terrain, tuning: &Tuning, now: u64) -> i32 {
    let percent = terrain.speed_percent(droid.tile(), droid.propulsion.kind);
    let mut speed = droid.propulsion.max_speed * percent / 100;

    let max_pitch = deg_units(tuning.max_speed_pitch_degrees);
    let pitch = angle_delta(droid.rot.pitch);
    speed = ((i64::from(max_pitch - pitch) * i64::from(speed)) / i64::from(max_pitch.max(1))) as i32;
    if speed <= tuning.min_pitch_speed {
        speed = tuning.min_pitch_speed;
    }

    if let Some(mount) = droid.weapons.first() {
        if !mount.stats.fire_on_move && droid.fired_recently(now, tuning.fire_on_move_pause) {
            speed = 0;
        }
    }

    if droid.is_vtol() && droid.movement.status == MoveStatus::Shuffle {
        speed = speed.min(tuning.min_end_speed);
    }
    speed
}

/// Brake quadratically inside the end range of the last waypoint.
#[must_use]
pub fn taper_final_waypoint(droid: &Droid, speed: i32, tuning: &Tuning, vtol_attacking: bool) -> i32 {
    if droid.is_vtol() && vtol_attacking {
        return speed;
    }
    let movement = &droid.movement;
    if movement.status == MoveStatus::Shuffle || !movement.on_last_leg() {
        return speed;
    }
    let min_end = ((speed + 2) / 3).min(tuning.min_end_speed);
    let dist_sq = droid.pos.distance_squared(movement.target);
    let range_sq = i64::from(tuning.end_speed_range) * i64::from(tuning.end_speed_range);
    if dist_sq < range_sq {
        let tapered = i64::from(speed - min_end) * dist_sq / range_sq + i64::from(min_end);
        return tapered as i32;
    }
    speed
}

/// Turn `current` towards `direction`, trading speed for turn rate.
///
/// Returns the new facing. A paused droid neither turns nor slows.
#[must_use]
pub fn turn_towards(
    status: MoveStatus,
    current: Angle,
    speed: &mut i32,
    direction: Angle,
    spin_angle: i32,
    spin_speed: i32,
    turn_speed: i32,
    tuning: &Tuning,
) -> Angle {
    if status == MoveStatus::Pause {
        return current;
    }
    let diff = angle_diff(direction, current);
    let spin_angle = spin_angle.max(1);
    *speed = ((i64::from(*speed) * i64::from(spin_angle - diff.abs())) / i64::from(spin_angle)).max(0) as i32;

    let boost = i64::from(spin_speed - turn_speed) * i64::from(diff.abs()) / i64::from(spin_angle);
    let rate = (i64::from(turn_speed) + boost).min(i64::from(spin_speed));
    let max_change = tuning.per_tick_i(i32::try_from(rate).unwrap_or(i32::MAX));
    angle_add(current, diff.clamp(-max_change, max_change))
}

/// Forward speed after accelerating or braking towards `target_speed`.
#[must_use]
pub fn normal_speed(droid: &Droid, target_speed: i32, facing: Angle, model: &MotionModel, tuning: &Tuning) -> i32 {
    let offset = facing.wrapping_sub(droid.movement.move_dir);
    let mut normal = cos_r(offset, i64::from(droid.movement.speed)) as i32;
    if normal < target_speed {
        normal = (normal + tuning.per_tick_i(model.accel)).min(target_speed);
    } else {
        normal = (normal - tuning.per_tick_i(model.decel)).max(target_speed);
    }
    normal
}

/// Sideways skid speed left after this tick's friction.
#[must_use]
pub fn perp_speed(droid: &Droid, facing: Angle, skid_decel: i32, tuning: &Tuning) -> i32 {
    let diff = angle_diff(facing, droid.movement.move_dir);
    let perp = sin_r(diff.unsigned_abs() as Angle, i64::from(droid.movement.speed)) as i32;
    (perp - tuning.per_tick_i(skid_decel)).max(0)
}

/// Set facing, speed and travel direction from the forward and skid parts.
pub fn combine_speeds(droid: &mut Droid, normal: i32, perp: i32, facing: Angle) {
    droid.rot.direction = facing;
    if perp == 0 {
        droid.movement.speed = normal;
        droid.movement.move_dir = facing;
        return;
    }
    let rel = int_atan2(i64::from(perp), i64::from(normal));
    let side = angle_diff(facing, droid.movement.move_dir);
    droid.movement.move_dir = if side < 0 {
        facing.wrapping_add(rel)
    } else {
        facing.wrapping_sub(rel)
    };
    droid.movement.speed = i_hypot(i64::from(normal), i64::from(perp)) as i32;
}

/// Displacement for one tick at the current speed and travel direction.
#[must_use]
pub fn step_vector(droid: &Droid, tuning: &Tuning) -> Vec2Fixed {
    let distance = tuning.per_tick(Fixed::from_num(droid.movement.speed));
    Vec2Fixed::new(sin(droid.movement.move_dir) * distance, cos(droid.movement.move_dir) * distance)
}

/// Heading towards the current leg target, bent around nearby units.
#[must_use]
pub fn move_direction(world: &World, map: &dyn TileBlocking, droid: &Droid) -> Angle {
    let (sx, sy) = droid.pos.to_ints();
    let (tx, ty) = droid.movement.target.to_ints();
    let mut dest = (i64::from(tx - sx), i64::from(ty - sy));
    if !droid.is_transporter() {
        dest = obstacle_vector(world, map, droid, dest);
    }
    int_atan2(dest.0, dest.1)
}

/// Bend `dest` away from the predicted positions of nearby droids.
///
/// Each obstacle's velocity is guessed as the average of where it is going
/// and where it wants to go; a blocked obstacle is assumed to stay put.
/// Closer obstacles weigh more, and the avoidance share grows with the
/// crowding so a lone distant unit barely changes course.
#[must_use]
pub fn obstacle_vector(world: &World, map: &dyn TileBlocking, droid: &Droid, dest: (i64, i64)) -> (i64, i64) {
    let our_max = i64::from(droid.propulsion.max_speed);
    let our_radius = i64::from(droid.radius());
    if our_max == 0 {
        return dest;
    }
    let tuning = &world.tuning;
    let avoid = i64::from(tuning.avoid_dist);
    let (px, py) = droid.pos.to_ints();

    let mut dir = (0i64, 0i64);
    let mut dist_total = 0i64;
    let mut count = 0i64;
    for id in world.grid.query(droid.pos, tuning.avoid_dist) {
        let Some(other) = world.droid(id) else {
            continue;
        };
        if other.id == droid.id || other.died.is_some() || other.is_vtol() != droid.is_vtol() {
            continue;
        }
        if other.is_transporter() || (other.is_person() && other.player != droid.player) {
            continue;
        }

        let total_radius = our_radius + i64::from(other.radius());
        let (ox, oy) = other.pos.to_ints();
        let (otx, oty) = other.movement.target.to_ints();

        let guess1 = (
            sin_r(other.movement.move_dir, i64::from(other.movement.speed)),
            cos_r(other.movement.move_dir, i64::from(other.movement.speed)),
        );
        let target_diff = (i64::from(otx - ox), i64::from(oty - oy));
        let want = i64::from(other.propulsion.max_speed) * i_hypot(target_diff.0, target_diff.1).min(avoid) / avoid.max(1);
        let want_dir = int_atan2(target_diff.0, target_diff.1);
        let guess2 = if super::blocked_now(other, world.time_ms, tuning) {
            (0, 0)
        } else {
            (sin_r(want_dir, want), cos_r(want_dir, want))
        };
        let guess = ((guess1.0 + guess2.0) / 2, (guess1.1 + guess2.1) / 2);
        let guess_speed = i_hypot(guess.0, guess.1).min(our_max / 2);
        let guess_dir = int_atan2(guess.0, guess.1);

        let mut diff = (i64::from(ox - px), i64::from(oy - py));
        let ahead = (i_hypot(diff.0, diff.1) - total_radius * 2 / 3).max(0) * guess_speed / our_max;
        let delta = (sin_r(guess_dir, ahead), cos_r(guess_dir, ahead));
        let future = TilePos::new(
            ((i64::from(ox) + delta.0) >> 7) as i32,
            ((i64::from(oy) + delta.1) >> 7) as i32,
        );
        if !map.is_blocked(future, other.propulsion.kind) {
            diff = (diff.0 + delta.0, diff.1 + delta.1);
        }

        if diff.0 * dest.0 + diff.1 * dest.1 < 0 {
            continue;
        }

        let centre_dist = i_hypot(diff.0, diff.1).max(1);
        let dist = (centre_dist - total_radius).max(1);
        dir.0 += diff.0 * 65536 / (centre_dist * dist);
        dir.1 += diff.1 * 65536 / (centre_dist * dist);
        dist_total += 65536 / dist;
        count += 1;
    }

    if dir == (0, 0) || count == 0 {
        return dest;
    }
    let dir = (dir.0 / count, dir.1 / count);
    let dist_total = dist_total / count;

    let o = (dir.1, -dir.0);
    let avoid_vec = if dest.0 * o.0 + dest.1 * o.1 < 0 { (-o.0, -o.1) } else { o };

    let dest_len = i_hypot(dest.0, dest.1) + 1;
    let dest = (dest.0 * 32768 / dest_len, dest.1 * 32768 / dest_len);
    let avoid_len = i_hypot(avoid_vec.0, avoid_vec.1) + 1;
    let avoid_vec = (avoid_vec.0 * 32768 / avoid_len, avoid_vec.1 * 32768 / avoid_len);

    let ratio = (dist_total * our_radius / 2).min(65536);
    (
        dest.0 * (65536 - ratio) + avoid_vec.0 * ratio,
        dest.1 * (65536 - ratio) + avoid_vec.1 * ratio,
    )
}

/// Conform pitch and roll to the ground under a vehicle.
///
/// The nose may rise instantly but only drops at a limited rate.
pub fn update_orientation(droid: &mut Droid, terrain: &dyn Terrain, tuning: &Tuning) {
    if droid.is_person() || droid.is_cyborg() || droid.is_transporter() || droid.is_vtol() {
        return;
    }
    let d = Fixed::from_num(ORIENTATION_SAMPLE);
    let Vec2Fixed { x, y } = droid.pos;
    let hx1 = terrain.height_at(Vec2Fixed::new(x + d, y));
    let hx0 = terrain.height_at(Vec2Fixed::new((x - d).max(Fixed::ZERO), y));
    let hy1 = terrain.height_at(Vec2Fixed::new(x, y + d));
    let hy0 = terrain.height_at(Vec2Fixed::new(x, (y - d).max(Fixed::ZERO)));

    let two = Fixed::from_num(2);
    droid.z = droid.z.max((hx0 + hx1) / two).max((hy0 + hy1) / two);

    let vx = sin(droid.rot.direction);
    let vy = cos(droid.rot.direction);
    let dzdx = hx1 - hx0;
    let dzdy = hy1 - hy0;
    let span = d * two;

    let target_pitch = atan2(dzdx * vx + dzdy * vy, span);
    let limit = tuning.per_tick_i(deg_units(tuning.pitch_limit_degrees));
    let delta = angle_diff(target_pitch, droid.rot.pitch).max(-limit);
    droid.rot.pitch = angle_add(droid.rot.pitch, delta);
    droid.rot.roll = atan2(dzdx * vy - dzdy * vx, span);
}

/// Vertical speed VTOLs climb and descend with.
#[must_use]
pub fn vtol_vertical_speed(droid: &Droid, tuning: &Tuning) -> i32 {
    (droid.propulsion.max_speed / 4).max(tuning.vtol_min_vertical_speed)
}

/// Bang-bang altitude controller keeping VTOLs inside their height band.
pub fn adjust_vtol_height(droid: &mut Droid, ground: Fixed, tuning: &Tuning) {
    let vs = vtol_vertical_speed(droid, tuning);
    let z = droid.z;
    let movement = &mut droid.movement;
    if z >= ground + Fixed::from_num(tuning.vtol_height_max) {
        movement.vertical_speed = -vs;
    } else if z < ground + Fixed::from_num(tuning.vtol_height_min) {
        movement.vertical_speed = vs;
    } else if z < Fixed::from_num(tuning.vtol_height_level) && movement.vertical_speed < 0 {
        movement.vertical_speed = 0;
    } else if z > Fixed::from_num(tuning.vtol_height_level) && movement.vertical_speed > 0 {
        movement.vertical_speed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::deg;

    #[test]
    fn test_person_model_never_skids() {
        assert_eq!(MotionModel::person().skid_decel, None);
        assert!(MotionModel::ground(PropulsionKind::Wheeled, 300).skid_decel.is_some());
    }

    #[test]
    fn test_tracked_spin_angle_is_narrow() {
        let tracked = MotionModel::ground(PropulsionKind::Tracked, 300);
        let wheeled = MotionModel::ground(PropulsionKind::Wheeled, 300);
        assert!(tracked.spin_angle < wheeled.spin_angle);
        assert_eq!(tracked.turn_speed, wheeled.turn_speed);
        let hover = MotionModel::ground(PropulsionKind::Hover, 300);
        assert!(hover.turn_speed < wheeled.turn_speed);
    }

    #[test]
    fn test_vtol_rates_have_floor() {
        let slow = MotionModel::vtol(10, false);
        assert_eq!(slow.spin_speed, deg_units(200));
        assert_eq!(slow.turn_speed, deg_units(100));
        let fast = MotionModel::vtol(2000, false);
        assert!(fast.spin_speed > deg_units(200));
    }

    #[test]
    fn test_turn_limited_per_tick() {
        let tuning = Tuning::default();
        let mut speed = 100;
        let model = MotionModel::ground(PropulsionKind::Wheeled, 100);
        let facing = turn_towards(
            MoveStatus::PointToPoint,
            0,
            &mut speed,
            deg(90),
            model.spin_angle,
            model.spin_speed,
            model.turn_speed,
            &tuning,
        );
        assert!(facing > 0 && facing < deg(90));
        assert!(speed < 100);
    }

    #[test]
    fn test_small_turn_completes() {
        let tuning = Tuning::default();
        let mut speed = 100;
        let facing = turn_towards(
            MoveStatus::PointToPoint,
            deg(10),
            &mut speed,
            deg(11),
            deg_units(180),
            deg_units(360),
            deg_units(180),
            &tuning,
        );
        assert_eq!(facing, deg(11));
    }

    #[test]
    fn test_paused_droid_keeps_facing() {
        let tuning = Tuning::default();
        let mut speed = 100;
        let facing = turn_towards(MoveStatus::Pause, 5, &mut speed, deg(90), 1, 1, 1, &tuning);
        assert_eq!(facing, 5);
        assert_eq!(speed, 100);
    }

    #[test]
    fn test_sin_cos_r() {
        assert!((sin_r(deg(90), 1000) - 1000).abs() <= 2);
        assert!(cos_r(deg(90), 1000).abs() <= 2);
        assert!((cos_r(0, 500) - 500).abs() <= 1);
    }
}
