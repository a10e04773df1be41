//! Per-tick droid movement.
//!
//! A droid follows its route one leg at a time. Every tick the movement
//! state machine picks the leg target, works out the speed and heading the
//! propulsion allows, and then resolves the step against squished infantry,
//! other droids and blocking tiles before moving.
//!
//! # State machine
//!
//! ```text
//! Inactive --move--> WaitRoute --route--> Navigate --> PointToPoint <--> Pause
//!                                                          |
//!                          arrived: Turn (ground) / Hover (lift) --> Inactive
//! ```
//!
//! `Shuffle` is a short sidestep requested by another droid and
//! `TurnToTarget` rotates on the spot.

pub mod collision;
pub mod steering;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::action::{action_droid, vtol::landing_pos, ActionKind};
use crate::config::Tuning;
use crate::droid::Droid;
use crate::environment::{Environment, PathRequest, PathResult, TerrainType, TileBlocking};
use crate::math::{angle_add, angle_delta, angle_diff, deg_units, Angle, Fixed, TilePos, Vec2Fixed, TILE_UNITS};
use crate::order::OrderKind;
use crate::pathfinding::has_line_of_sight;
use crate::structure::FeatureKind;
use crate::world::{TickEvent, World};

use collision::{blocking_slide, check_squished, droid_slide, slide_direction, TileSlide};
use steering::MotionModel;

/// Radius around a droid inside which it picks up artifacts.
const PICKUP_DIST: i32 = TILE_UNITS * 5 / 2;

/// How far ahead, in milliseconds of travel, friendly gates are opened.
const GATE_LOOKAHEAD_MS: i32 = 1000;

/// Movement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MoveStatus {
    /// Not moving.
    #[default]
    Inactive,
    /// About to take the next waypoint.
    Navigate,
    /// Finishing the facing after arrival.
    Turn,
    /// Waiting for the route planner.
    WaitRoute,
    /// Travelling along a leg.
    PointToPoint,
    /// Turning on the spot towards a point.
    TurnToTarget,
    /// Briefly held up by a blockage.
    Pause,
    /// VTOL hanging in the air before landing.
    Hover,
    /// Stepping aside for another droid.
    Shuffle,
}

impl MoveStatus {
    /// Diagnostic name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Inactive => "Inactive",
            Self::Navigate => "Navigate",
            Self::Turn => "Turn",
            Self::WaitRoute => "WaitRoute",
            Self::PointToPoint => "PointToPoint",
            Self::TurnToTarget => "TurnToTarget",
            Self::Pause => "Pause",
            Self::Hover => "Hover",
            Self::Shuffle => "Shuffle",
        }
    }
}

/// Route-following and kinematic state of a droid.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoveState {
    /// Current status.
    pub status: MoveStatus,
    /// Waypoints of the current route.
    pub path: Vec<Vec2Fixed>,
    /// Index of the next waypoint to take; equal to the path length once
    /// the final leg is under way.
    pub path_index: usize,
    /// Where the route ends.
    pub destination: Vec2Fixed,
    /// Start of the current leg.
    pub src: Vec2Fixed,
    /// End of the current leg.
    pub target: Vec2Fixed,
    /// Speed in world units per second.
    pub speed: i32,
    /// Direction of travel; differs from the facing while skidding.
    pub move_dir: Angle,
    /// Vertical speed of VTOLs, world units per second.
    pub vertical_speed: i32,
    /// Game time (ms) of the first bump of the current blockage.
    pub bump_time: Option<u64>,
    /// Milliseconds between the first bump and the latest one.
    pub last_bump: u64,
    /// Milliseconds after the first bump at which pausing last toggled.
    pub pause_time: u64,
    /// Position at the first bump.
    pub bump_pos: Vec2Fixed,
    /// Facing at the first bump.
    pub bump_dir: Angle,
    /// Game time (ms) the current shuffle began.
    pub shuffle_start: u64,
}

impl MoveState {
    /// True once the final waypoint is the leg target.
    #[must_use]
    pub fn on_last_leg(&self) -> bool {
        self.path_index == self.path.len()
    }

    /// Record the start of a blockage. Returns false if one is already
    /// being timed.
    pub fn note_bump(&mut self, now: u64, pos: Vec2Fixed, dir: Angle) -> bool {
        if self.bump_time.is_some() {
            return false;
        }
        self.bump_time = Some(now);
        self.last_bump = 0;
        self.pause_time = 0;
        self.bump_pos = pos;
        self.bump_dir = dir;
        true
    }

    /// Milliseconds since the blockage began, zero if none.
    #[must_use]
    pub fn time_since_bump(&self, now: u64) -> u64 {
        self.bump_time.map_or(0, |t| now.saturating_sub(t))
    }

    fn clear_bump(&mut self) {
        self.bump_time = None;
        self.last_bump = 0;
    }

    fn clear_route(&mut self) {
        self.path.clear();
        self.path_index = 0;
    }

    fn set_route(&mut self, path: Vec<Vec2Fixed>, fallback: Vec2Fixed) {
        self.destination = path.last().copied().unwrap_or(fallback);
        self.path = path;
        self.path_index = 0;
        self.status = MoveStatus::Navigate;
    }
}

/// Blockage verdict without side effects, used when guessing where other
/// droids will go.
#[must_use]
pub fn blocked_now(droid: &Droid, now: u64, tuning: &Tuning) -> bool {
    let movement = &droid.movement;
    let Some(bump) = movement.bump_time else {
        return false;
    };
    if bump > now
        || angle_diff(droid.rot.direction, movement.bump_dir).abs() > deg_units(tuning.block_dir_degrees)
    {
        return false;
    }
    let block_dist = i64::from(tuning.block_dist);
    if droid.pos.distance_squared(movement.bump_pos) > block_dist * block_dist {
        return false;
    }
    now - bump > block_timeout(movement.status, tuning)
}

fn block_timeout(status: MoveStatus, tuning: &Tuning) -> u64 {
    if status == MoveStatus::Shuffle {
        u64::from(tuning.shuffle_block_time)
    } else {
        u64::from(tuning.block_time)
    }
}

/// Route a droid to `pos` through the route planner.
///
/// Returns false if no route exists; the droid then sulks.
pub fn move_droid_to(world: &mut World, env: &mut Environment, droid: &mut Droid, pos: Vec2Fixed) -> bool {
    move_droid_to_base(world, env, droid, pos)
}

/// Route used by scripted moves. Droids travel alone, so this matches
/// [`move_droid_to`].
pub fn move_droid_to_no_formation(
    world: &mut World,
    env: &mut Environment,
    droid: &mut Droid,
    pos: Vec2Fixed,
) -> bool {
    move_droid_to_base(world, env, droid, pos)
}

fn move_droid_to_base(world: &mut World, env: &mut Environment, droid: &mut Droid, pos: Vec2Fixed) -> bool {
    if droid.is_transporter() {
        move_droid_to_direct(droid, pos);
        return true;
    }

    let request = PathRequest {
        droid: droid.id,
        from: droid.pos,
        to: pos,
        propulsion: droid.propulsion.kind,
    };
    let result = {
        let map = world.blocking_map(&*env.terrain, Some(droid.player));
        env.pathfinder.request_path(&request, &map)
    };
    apply_route(world, env, droid, result, pos)
}

fn apply_route(
    world: &mut World,
    env: &mut Environment,
    droid: &mut Droid,
    result: PathResult,
    pos: Vec2Fixed,
) -> bool {
    match result {
        PathResult::Ready(path) => {
            droid.movement.set_route(path, pos);
            trace!(droid = droid.id.0, waypoints = droid.movement.path.len(), "route ready");
            true
        }
        PathResult::Pending => {
            droid.movement.status = MoveStatus::WaitRoute;
            droid.movement.destination = pos;
            true
        }
        PathResult::Failed => {
            debug!(droid = droid.id.0, x = %pos.x, y = %pos.y, "route failed");
            droid.movement.status = MoveStatus::Inactive;
            action_droid(world, env, droid, ActionKind::Sulk);
            false
        }
    }
}

/// Single straight leg to `pos`, bypassing the route planner.
pub fn move_droid_to_direct(droid: &mut Droid, pos: Vec2Fixed) {
    droid.movement.set_route(vec![pos], pos);
}

/// Turn on the spot to face `pos`.
pub fn move_turn_droid(droid: &mut Droid, pos: Vec2Fixed) {
    let dir = (pos - droid.pos).angle();
    if droid.rot.direction != dir {
        droid.movement.target = pos;
        droid.movement.status = MoveStatus::TurnToTarget;
    }
}

/// Stop following the route; the droid coasts to a halt.
pub fn move_stop_droid(droid: &mut Droid) {
    droid.movement.status = if droid.propulsion.kind.is_lift() {
        MoveStatus::Hover
    } else {
        MoveStatus::Inactive
    };
    droid.movement.clear_route();
}

/// Stop dead, without skidding.
pub fn move_really_stop_droid(droid: &mut Droid) {
    droid.movement.status = MoveStatus::Inactive;
    droid.movement.speed = 0;
    droid.movement.clear_route();
}

/// Step aside, roughly at right angles to `shove`.
///
/// Left is preferred, then right, then straight ahead. A side counts as
/// taken if a blocking tile or another droid is there.
pub fn move_shuffle_droid(world: &mut World, env: &mut Environment, droid: &mut Droid, shove: Vec2Fixed) {
    let magnitude = shove.length();
    if magnitude == Fixed::ZERO {
        return;
    }
    let tuning = &world.tuning;
    let straight = shove.scale(Fixed::from_num(tuning.shuffle_move) / magnitude);
    let left = straight.perp_left();
    let right = straight.perp_right();
    let shuffle_dir = shove.angle();

    let mut left_clear = true;
    let mut right_clear = true;
    let mut front_clear = true;
    {
        let map = world.blocking_map(&*env.terrain, Some(droid.player));
        let kind = droid.propulsion.kind;
        if map.is_blocked(TilePos::of(droid.pos + left), kind) {
            left_clear = false;
        } else if map.is_blocked(TilePos::of(droid.pos + right), kind) {
            right_clear = false;
        } else if map.is_blocked(TilePos::of(droid.pos + straight), kind) {
            front_clear = false;
        }
    }

    for id in world.grid.query(droid.pos, tuning.shuffle_dist) {
        let Some(other) = world.droid(id) else {
            continue;
        };
        if other.died.is_some() || other.id == droid.id {
            continue;
        }
        let diff = angle_diff(shuffle_dir, (other.pos - droid.pos).angle());
        if diff > -deg_units(135) && diff < -deg_units(45) {
            left_clear = false;
        } else if diff > deg_units(45) && diff < deg_units(135) {
            right_clear = false;
        }
    }

    let offset = if left_clear {
        left
    } else if right_clear {
        right
    } else if front_clear {
        straight
    } else {
        return;
    };

    let mut target = droid.pos + offset;
    if droid.is_vtol() {
        if let Some(spot) = landing_pos(world, &*env.terrain, droid, target) {
            target = spot;
        }
    }

    let movement = &mut droid.movement;
    if movement.status != MoveStatus::Shuffle {
        movement.shuffle_start = world.time_ms;
    }
    movement.status = MoveStatus::Shuffle;
    movement.src = droid.pos;
    movement.target = target;
    movement.path.clear();
    movement.path_index = 0;
    trace!(droid = droid.id.0, "shuffling");
}

fn direct_path_distance(world: &World, env: &Environment, droid: &Droid, index: usize) -> i64 {
    let dst = droid.movement.path[index];
    let dist = i64::from(droid.pos.distance(dst).to_num::<i32>());
    let map = world.blocking_map(&*env.terrain, Some(droid.player));
    if has_line_of_sight(&map, TilePos::of(droid.pos), TilePos::of(dst), droid.propulsion.kind) {
        dist
    } else {
        -1 - dist
    }
}

/// Pick the furthest waypoint in direct view, or backtrack to one if the
/// current leg is out of sight. Returns false if the route is lost.
fn best_target(world: &World, env: &Environment, droid: &mut Droid) -> bool {
    let len = droid.movement.path.len();
    let mut index = droid.movement.path_index.saturating_sub(1);
    let look_ahead = i64::from(TILE_UNITS * 5);
    let backtrack = -i64::from(TILE_UNITS * 7);

    let mut dist = direct_path_distance(world, env, droid, index);
    if dist >= 0 {
        while dist >= 0 && dist < look_ahead {
            index += 1;
            if index >= len {
                dist = -1;
                break;
            }
            dist = direct_path_distance(world, env, droid, index);
        }
        if dist < 0 {
            index -= 1;
        }
    } else {
        while dist < 0 && dist >= backtrack && index > 0 {
            index -= 1;
            dist = direct_path_distance(world, env, droid, index);
        }
        if dist < 0 {
            return false;
        }
    }
    let movement = &mut droid.movement;
    movement.path_index = index + 1;
    movement.src = droid.pos;
    movement.target = movement.path[index];
    true
}

fn next_target(droid: &mut Droid) -> bool {
    let movement = &mut droid.movement;
    if movement.path_index >= movement.path.len() {
        return false;
    }
    movement.src = match movement.path_index {
        0 => droid.pos,
        i => movement.path[i - 1],
    };
    movement.target = movement.path[movement.path_index];
    movement.path_index += 1;
    true
}

fn reached_waypoint(droid: &Droid, now: u64) -> bool {
    let movement = &droid.movement;
    let last = movement.on_last_leg();
    let mut precision = if last {
        i64::from((TILE_UNITS / 4) * (TILE_UNITS / 4))
    } else {
        i64::from((TILE_UNITS / 2) * (TILE_UNITS / 2))
    };
    if last {
        if let Some(bump) = movement.bump_time {
            // One tile of slack straight away, growing while the blockage lasts.
            let elapsed = now.saturating_sub(bump) as i64;
            precision = (elapsed + 1000) * i64::from(TILE_UNITS * TILE_UNITS / 1000);
        }
    }
    droid.pos.distance_squared(movement.target) < precision
}

/// Time out a blockage. On timeout the droid reroutes if route remains,
/// otherwise the blockage is reported.
fn move_blocked(world: &mut World, env: &mut Environment, droid: &mut Droid) -> bool {
    let now = world.time_ms;
    let tuning = &world.tuning;
    let Some(bump) = droid.movement.bump_time else {
        return false;
    };
    if bump > now {
        return false;
    }
    if angle_diff(droid.rot.direction, droid.movement.bump_dir).abs() > deg_units(tuning.block_dir_degrees) {
        droid.movement.clear_bump();
        return false;
    }
    let block_dist = i64::from(tuning.block_dist);
    if droid.pos.distance_squared(droid.movement.bump_pos) > block_dist * block_dist {
        droid.movement.clear_bump();
        return false;
    }
    if now - bump <= block_timeout(droid.movement.status, tuning) {
        return false;
    }

    droid.movement.clear_bump();
    debug!(droid = droid.id.0, "blocked");
    if !droid.movement.on_last_leg() {
        let destination = droid.movement.destination;
        move_droid_to(world, env, droid, destination);
        return false;
    }
    true
}

fn open_gates_ahead(world: &mut World, droid: &Droid) {
    if droid.is_vtol() {
        return;
    }
    let reach = i64::from(droid.movement.speed) * i64::from(GATE_LOOKAHEAD_MS) / 1000;
    let ahead = Vec2Fixed::new(
        droid.pos.x + Fixed::from_num(steering::sin_r(droid.movement.move_dir, reach)),
        droid.pos.y + Fixed::from_num(steering::cos_r(droid.movement.move_dir, reach)),
    );
    world.open_gate_if_friendly(TilePos::of(ahead), droid.player);
}

fn apply_step(world: &mut World, env: &Environment, droid: &mut Droid, step: Vec2Fixed) {
    if droid.movement.status == MoveStatus::Pause || droid.died.is_some() {
        return;
    }
    droid.pos += step;
    let (width, height) = env.map_size();
    let (x, y) = droid.pos.to_ints();
    let on_map = x >= 0 && y >= 0 && x < width * TILE_UNITS && y < height * TILE_UNITS;
    if !on_map {
        if droid.is_transporter() {
            return;
        }
        debug!(droid = droid.id.0, x, y, "moved off the map");
        world.destroy_droid(droid);
        return;
    }
    if droid.is_transporter() {
        if droid.pos.x == Fixed::ZERO {
            droid.pos.x = Fixed::ONE;
        }
        if droid.pos.y == Fixed::ZERO {
            droid.pos.y = Fixed::ONE;
        }
    }
}

/// Resolve a step against blocking tiles, noting bumps and hops.
fn resolve_tiles(world: &mut World, env: &Environment, droid: &mut Droid, step: Vec2Fixed) -> Vec2Fixed {
    let slide = {
        let map = world.blocking_map(&*env.terrain, Some(droid.player));
        blocking_slide(&map, droid.propulsion.kind, droid.pos, step)
    };
    if slide == TileSlide::Clear {
        return step;
    }
    if droid.movement.status == MoveStatus::Shuffle {
        droid.movement.status = MoveStatus::Inactive;
    }
    if !droid.is_vtol() {
        let _ = droid.movement.note_bump(world.time_ms, droid.pos, droid.rot.direction);
    }
    match slide {
        TileSlide::Clear => step,
        TileSlide::Slide(out) => out,
        TileSlide::Corner(step) => {
            if world.rng.coin() {
                Vec2Fixed::new(Fixed::ZERO, -step.y)
            } else {
                Vec2Fixed::new(-step.x, Fixed::ZERO)
            }
        }
        TileSlide::Jump(to) => {
            droid.pos = to;
            Vec2Fixed::ZERO
        }
    }
}

fn is_stopped(droid: &Droid, speed: i32) -> bool {
    droid.movement.status == MoveStatus::Inactive && speed == 0 && droid.movement.speed == 0
}

fn vtol_attacking(droid: &Droid) -> bool {
    droid.action.kind == ActionKind::VtolAttack
}

fn update_ground_model(world: &mut World, env: &Environment, droid: &mut Droid, speed: i32, direction: Angle) {
    let model = MotionModel::for_droid(droid);
    if is_stopped(droid, speed) {
        return;
    }
    let tuning = world.tuning.clone();
    let mut speed = steering::taper_final_waypoint(droid, speed, &tuning, vtol_attacking(droid));
    let facing = steering::turn_towards(
        droid.movement.status,
        droid.rot.direction,
        &mut speed,
        direction,
        model.spin_angle,
        model.spin_speed,
        model.turn_speed,
        &tuning,
    );
    let normal = steering::normal_speed(droid, speed, facing, &model, &tuning);
    let perp = steering::perp_speed(droid, facing, model.skid_decel.unwrap_or(0), &tuning);
    steering::combine_speeds(droid, normal, perp, facing);

    let step = steering::step_vector(droid, &tuning);
    open_gates_ahead(world, droid);
    check_squished(world, droid, step);
    let step = droid_slide(world, droid, step);
    let here = TilePos::of(droid.pos);
    let next = TilePos::of(droid.pos + step);
    let slid = resolve_tiles(world, env, droid, step);
    if slid != step {
        let slide_dir = slide_direction(here, next, direction, slid);
        let base = droid.propulsion.max_speed;
        let spin = base.saturating_mul(deg_units(1));
        let facing = steering::turn_towards(
            droid.movement.status,
            droid.rot.direction,
            &mut speed,
            slide_dir,
            model.spin_angle,
            spin,
            spin / 3,
            &tuning,
        );
        droid.rot.direction = facing;
    }
    apply_step(world, env, droid, slid);

    droid.z = env.terrain.height_at(droid.pos);
    steering::update_orientation(droid, &*env.terrain, &tuning);
}

fn update_person_model(world: &mut World, env: &Environment, droid: &mut Droid, speed: i32, direction: Angle) {
    if is_stopped(droid, speed) {
        return;
    }
    let tuning = world.tuning.clone();
    let model = MotionModel::person();
    let mut speed = speed;
    let facing = steering::turn_towards(
        droid.movement.status,
        droid.rot.direction,
        &mut speed,
        direction,
        model.spin_angle,
        model.spin_speed,
        model.turn_speed,
        &tuning,
    );
    let normal = steering::normal_speed(droid, speed, facing, &model, &tuning);
    steering::combine_speeds(droid, normal, 0, facing);

    let step = steering::step_vector(droid, &tuning);
    open_gates_ahead(world, droid);
    let step = droid_slide(world, droid, step);
    let step = resolve_tiles(world, env, droid, step);
    apply_step(world, env, droid, step);
    droid.z = env.terrain.height_at(droid.pos);
}

fn update_vtol_model(world: &mut World, env: &Environment, droid: &mut Droid, speed: i32, direction: Angle) {
    if is_stopped(droid, speed) {
        return;
    }
    let tuning = world.tuning.clone();
    let model = MotionModel::for_droid(droid);
    let mut speed = steering::taper_final_waypoint(droid, speed, &tuning, vtol_attacking(droid));
    let facing = steering::turn_towards(
        droid.movement.status,
        droid.rot.direction,
        &mut speed,
        direction,
        model.spin_angle,
        model.spin_speed,
        model.turn_speed,
        &tuning,
    );
    let normal = steering::normal_speed(droid, speed, facing, &model, &tuning);
    let perp = steering::perp_speed(droid, facing, model.skid_decel.unwrap_or(0), &tuning);
    steering::combine_speeds(droid, normal, perp, facing);

    let mut step = steering::step_vector(droid, &tuning);
    if !droid.is_transporter() {
        step = resolve_tiles(world, env, droid, step);
    }
    apply_step(world, env, droid, step);

    let roll_limit = deg_units(60);
    let target_roll = (4 * angle_diff(droid.movement.move_dir, droid.rot.direction)).clamp(-roll_limit, roll_limit);
    let roll_delta = angle_delta((target_roll as Angle).wrapping_sub(droid.rot.roll));
    droid.rot.roll = angle_add(droid.rot.roll, tuning.per_tick_i(3 * roll_delta));

    let ground = env.terrain.height_at(droid.pos);
    let climb = tuning.per_tick(Fixed::from_num(droid.movement.vertical_speed));
    droid.z = ground.max(droid.z + climb);
    steering::adjust_vtol_height(droid, ground, &tuning);
}

fn descend(env: &Environment, droid: &mut Droid, tuning: &Tuning) {
    let ground = env.terrain.height_at(droid.pos);
    droid.movement.speed = 0;
    if droid.z > ground {
        droid.movement.vertical_speed = -steering::vtol_vertical_speed(droid, tuning);
    } else {
        droid.z = ground;
        droid.movement.vertical_speed = 0;
        droid.movement.status = MoveStatus::Inactive;
        steering::update_orientation(droid, &*env.terrain, tuning);
    }
}

fn finish_route(droid: &mut Droid) {
    droid.movement.status = if droid.propulsion.kind.is_lift() {
        MoveStatus::Hover
    } else {
        MoveStatus::Inactive
    };
}

fn leg_heading(world: &World, env: &Environment, droid: &Droid) -> (i32, Angle) {
    let map = world.blocking_map(&*env.terrain, Some(droid.player));
    let dir = steering::move_direction(world, &map, droid);
    let speed = steering::droid_speed(droid, &*env.terrain, &world.tuning, world.time_ms);
    (speed, dir)
}

/// Follow the current route. Returns the speed and heading to drive at.
fn follow_route(world: &mut World, env: &mut Environment, droid: &mut Droid) -> Option<(i32, Angle)> {
    let now = world.time_ms;
    if droid.movement.status == MoveStatus::WaitRoute {
        let result = {
            let map = world.blocking_map(&*env.terrain, Some(droid.player));
            env.pathfinder.poll(droid.id, &map)
        };
        if matches!(result, PathResult::Pending) {
            return None;
        }
        let destination = droid.movement.destination;
        apply_route(world, env, droid, result, destination);
        if droid.movement.status != MoveStatus::Navigate {
            return None;
        }
    }

    if droid.movement.status == MoveStatus::Navigate {
        if !next_target(droid) {
            finish_route(droid);
            return None;
        }
        if droid.is_vtol() {
            droid.rot.pitch = 0;
        }
        droid.movement.status = MoveStatus::PointToPoint;
        droid.movement.bump_time = None;
    }

    if droid.movement.path.is_empty() || !best_target(world, env, droid) {
        let destination = droid.movement.destination;
        move_droid_to(world, env, droid, destination);
        if !matches!(droid.movement.status, MoveStatus::PointToPoint | MoveStatus::Pause) {
            return None;
        }
    }

    if reached_waypoint(droid, now) && !next_target(droid) {
        if droid.propulsion.kind.is_lift() {
            let keeps_flying = matches!(droid.order.kind(), OrderKind::Patrol | OrderKind::Circle)
                || matches!(droid.action.kind, ActionKind::MoveToRearm | ActionKind::MoveToRearmPoint);
            let landing = if keeps_flying {
                None
            } else {
                landing_pos(world, &*env.terrain, droid, droid.pos)
            };
            match landing {
                Some(spot) if TilePos::of(spot) != TilePos::of(droid.movement.destination) => {
                    droid.movement.destination = spot;
                    move_droid_to(world, env, droid, spot);
                }
                _ => droid.movement.status = MoveStatus::Hover,
            }
        } else {
            droid.movement.status = MoveStatus::Turn;
        }
        trace!(droid = droid.id.0, "arrived");
        return None;
    }

    let (speed, dir) = leg_heading(world, env, droid);

    let tuning = &world.tuning;
    let movement = &mut droid.movement;
    if let Some(bump) = movement.bump_time {
        if movement.pause_time + bump + u64::from(tuning.block_pause_time) < now {
            movement.status = if movement.status == MoveStatus::PointToPoint {
                MoveStatus::Pause
            } else {
                MoveStatus::PointToPoint
            };
            movement.pause_time = now - bump;
        }
        if movement.status == MoveStatus::Pause
            && movement.last_bump > movement.pause_time
            && movement.last_bump + bump + u64::from(tuning.block_pause_release) < now
        {
            movement.status = MoveStatus::PointToPoint;
        }
    }
    Some((speed, dir))
}

fn pick_up_artifacts(world: &mut World, droid: &Droid) {
    if droid.is_vtol() || droid.is_transporter() {
        return;
    }
    let reach = i64::from(PICKUP_DIST) * i64::from(PICKUP_DIST);
    let found: Vec<_> = world
        .grid
        .query(droid.pos, PICKUP_DIST)
        .into_iter()
        .filter(|id| {
            world.feature(*id).is_some_and(|f| {
                f.kind == FeatureKind::Artifact && f.died.is_none() && f.pos.distance_squared(droid.pos) <= reach
            })
        })
        .collect();
    for id in found {
        world.events.push(TickEvent::ArtifactRecovered {
            feature: id,
            player: droid.player,
        });
        world.destroy(id);
    }
}

/// Advance a droid's movement by one tick.
pub fn move_update_droid(world: &mut World, env: &mut Environment, droid: &mut Droid) {
    let tuning = world.tuning.clone();
    let now = world.time_ms;
    let mut speed = 0;
    let mut direction = droid.rot.direction;

    match droid.movement.status {
        MoveStatus::Inactive => {}
        MoveStatus::Shuffle => {
            let timed_out = droid.movement.shuffle_start + u64::from(tuning.shuffle_time) < now;
            if reached_waypoint(droid, now) || timed_out {
                finish_route(droid);
            } else {
                (speed, direction) = leg_heading(world, env, droid);
            }
        }
        MoveStatus::WaitRoute | MoveStatus::Navigate | MoveStatus::PointToPoint | MoveStatus::Pause => {
            if let Some((s, d)) = follow_route(world, env, droid) {
                speed = s;
                direction = d;
            }
        }
        MoveStatus::Turn => {
            droid.movement.status = if droid.propulsion.kind.is_lift() {
                MoveStatus::PointToPoint
            } else {
                MoveStatus::Inactive
            };
        }
        MoveStatus::TurnToTarget => {
            direction = (droid.movement.target - droid.pos).angle();
        }
        MoveStatus::Hover => descend(env, droid, &tuning),
    }

    let old_tile = TilePos::of(droid.pos);
    if droid.is_person() || droid.is_cyborg() {
        update_person_model(world, env, droid, speed, direction);
    } else if droid.propulsion.kind.is_lift() {
        update_vtol_model(world, env, droid, speed, direction);
    } else {
        update_ground_model(world, env, droid, speed, direction);
    }
    if droid.died.is_some() {
        return;
    }

    if TilePos::of(droid.pos) != old_tile {
        pick_up_artifacts(world, droid);
    }

    if !droid.propulsion.kind.is_lift() && move_blocked(world, env, droid) {
        droid.movement.status = MoveStatus::Turn;
    }

    if env.terrain.terrain_type(TilePos::of(droid.pos)) == TerrainType::Water {
        steering::update_orientation(droid, &*env.terrain, &tuning);
    }

    if droid.movement.status == MoveStatus::TurnToTarget && droid.rot.direction == direction {
        droid.movement.status = if droid.propulsion.kind.is_lift() {
            MoveStatus::PointToPoint
        } else {
            MoveStatus::Inactive
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::droid::{BodySize, DroidCategory, DroidTemplate, PropulsionKind, PropulsionStats};
    use crate::object::ObjectId;

    fn droid_at(x: i32, y: i32) -> Droid {
        let template = DroidTemplate {
            category: DroidCategory::Weapon,
            body_size: BodySize::Medium,
            propulsion: PropulsionStats {
                kind: PropulsionKind::Wheeled,
                max_speed: 400,
            },
            body: 100,
            weapons: vec![],
            sensor_range: 1024,
            construct_points: 0,
            repair_points: 0,
        };
        Droid::new(ObjectId(1), 0, &template, Vec2Fixed::from_ints(x, y))
    }

    #[test]
    fn test_move_status_default_inactive() {
        assert_eq!(MoveState::default().status, MoveStatus::Inactive);
        assert_eq!(MoveStatus::WaitRoute.name(), "WaitRoute");
    }

    #[test]
    fn test_note_bump_only_once() {
        let mut state = MoveState::default();
        assert!(state.note_bump(100, Vec2Fixed::ZERO, 0));
        assert!(!state.note_bump(200, Vec2Fixed::from_ints(5, 5), 10));
        assert_eq!(state.bump_time, Some(100));
        assert_eq!(state.time_since_bump(350), 250);
    }

    #[test]
    fn test_next_target_walks_path() {
        let mut droid = droid_at(0, 0);
        droid.movement.set_route(vec![Vec2Fixed::from_ints(100, 0), Vec2Fixed::from_ints(200, 0)], Vec2Fixed::ZERO);
        assert!(next_target(&mut droid));
        assert_eq!(droid.movement.src, Vec2Fixed::ZERO);
        assert_eq!(droid.movement.target, Vec2Fixed::from_ints(100, 0));
        assert!(next_target(&mut droid));
        assert_eq!(droid.movement.src, Vec2Fixed::from_ints(100, 0));
        assert!(droid.movement.on_last_leg());
        assert!(!next_target(&mut droid));
        assert_eq!(droid.movement.destination, Vec2Fixed::from_ints(200, 0));
    }

    #[test]
    fn test_reached_waypoint_tolerance() {
        let mut droid = droid_at(0, 0);
        droid.movement.set_route(vec![Vec2Fixed::from_ints(31, 0)], Vec2Fixed::ZERO);
        assert!(next_target(&mut droid));
        assert!(reached_waypoint(&droid, 0));
        droid.movement.target = Vec2Fixed::from_ints(40, 0);
        assert!(!reached_waypoint(&droid, 0));
        droid.movement.bump_time = Some(0);
        assert!(reached_waypoint(&droid, 0));
    }

    #[test]
    fn test_turn_droid_only_when_needed() {
        let mut droid = droid_at(0, 0);
        move_turn_droid(&mut droid, Vec2Fixed::from_ints(0, 100));
        assert_eq!(droid.movement.status, MoveStatus::Inactive);
        move_turn_droid(&mut droid, Vec2Fixed::from_ints(100, 0));
        assert_eq!(droid.movement.status, MoveStatus::TurnToTarget);
    }

    #[test]
    fn test_really_stop_zeroes_speed() {
        let mut droid = droid_at(0, 0);
        droid.movement.status = MoveStatus::PointToPoint;
        droid.movement.speed = 250;
        move_stop_droid(&mut droid);
        assert_eq!(droid.movement.status, MoveStatus::Inactive);
        assert_eq!(droid.movement.speed, 250);
        move_really_stop_droid(&mut droid);
        assert_eq!(droid.movement.speed, 0);
    }

    #[test]
    fn test_stop_drops_route() {
        let mut droid = droid_at(0, 0);
        droid.movement.status = MoveStatus::PointToPoint;
        droid.movement.path = vec![Vec2Fixed::from_ints(300, 0), Vec2Fixed::from_ints(600, 0)];
        droid.movement.path_index = 1;
        move_stop_droid(&mut droid);
        assert!(droid.movement.path.is_empty());
        assert_eq!(droid.movement.path_index, 0);

        droid.movement.status = MoveStatus::PointToPoint;
        droid.movement.path = vec![Vec2Fixed::from_ints(300, 0)];
        droid.movement.path_index = 1;
        move_really_stop_droid(&mut droid);
        assert!(droid.movement.path.is_empty());
        assert_eq!(droid.movement.path_index, 0);
    }

    #[test]
    fn test_blocked_now_needs_timeout() {
        let tuning = Tuning::default();
        let mut droid = droid_at(0, 0);
        droid.movement.status = MoveStatus::PointToPoint;
        droid.movement.note_bump(1000, droid.pos, 0);
        assert!(!blocked_now(&droid, 2000, &tuning));
        assert!(blocked_now(&droid, 1000 + u64::from(tuning.block_time) + 1, &tuning));
        droid.pos = Vec2Fixed::from_ints(500, 0);
        assert!(!blocked_now(&droid, 1000 + u64::from(tuning.block_time) + 1, &tuning));
    }
}
