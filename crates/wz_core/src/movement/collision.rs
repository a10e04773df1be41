//! Collision response against blocking tiles and other droids.

use crate::droid::{Droid, PropulsionKind};
use crate::environment::TileBlocking;
use crate::math::{atan2, deg, Angle, Fixed, TilePos, Vec2Fixed, TILE_UNITS};
use crate::object::ObjectId;
use crate::world::{DeferredCommand, TickEvent, World};

use super::MoveStatus;

/// Project `step` onto the tangent of the obstacle at `obstacle`.
///
/// Steps that already lead away from the obstacle are returned unchanged.
/// The tangent on the same side as the step is chosen, and the result is
/// the step's component along it, so sliding never adds speed.
#[must_use]
pub fn slide_vector(pos: Vec2Fixed, obstacle: Vec2Fixed, step: Vec2Fixed) -> Vec2Fixed {
    let obst = pos - obstacle;
    if obst.dot(step) >= Fixed::ZERO {
        return step;
    }
    let mut along = step.cross(obst);
    let dir = if along >= Fixed::ZERO {
        obst.perp_right()
    } else {
        along = -along;
        obst.perp_left()
    };
    let mag_sq = dir.dot(dir);
    let Some(ratio) = along.checked_div(mag_sq) else {
        return Vec2Fixed::ZERO;
    };
    dir.scale(ratio)
}

/// Result of resolving a step against blocking tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileSlide {
    /// The destination tile is passable.
    Clear,
    /// The step was bent or cut to stay out of the blocking tile.
    Slide(Vec2Fixed),
    /// Wedged into a corner; the caller picks which axis to bounce along.
    Corner(Vec2Fixed),
    /// Stuck on a blocking tile; hop to this position and stand still.
    Jump(Vec2Fixed),
}

fn sub_tile(coord: Fixed) -> i32 {
    coord.floor().to_num::<i32>().rem_euclid(TILE_UNITS)
}

fn tile_floor(coord: Fixed) -> i32 {
    coord.floor().to_num::<i32>().div_euclid(TILE_UNITS) * TILE_UNITS
}

/// Resolve a one-tick `step` from `pos` against blocking tiles.
///
/// A diagonal step into a blocked tile looks at the two orthogonal
/// neighbours: one blocked side cuts the matching axis, both blocked is a
/// corner. A straight step checks the neighbour on the side of the tile the
/// droid is in. A droid already standing on a blocked tile hops off it
/// across the nearest edges that lead back into open ground.
#[must_use]
pub fn blocking_slide(
    map: &dyn TileBlocking,
    propulsion: PropulsionKind,
    pos: Vec2Fixed,
    step: Vec2Fixed,
) -> TileSlide {
    let here = TilePos::of(pos);
    let next = TilePos::of(pos + step);
    if !map.is_blocked(next, propulsion) {
        return TileSlide::Clear;
    }
    let blocked = |tile: TilePos| map.is_blocked(tile, propulsion);
    let centre = next.center();
    let half = TILE_UNITS / 2;
    let (mx, my) = (step.x, step.y);
    let zero = Fixed::ZERO;

    if here.x != next.x && here.y != next.y {
        let horiz = TilePos::new(if mx < zero { next.x + 1 } else { next.x - 1 }, next.y);
        let vert = TilePos::new(next.x, if my < zero { next.y + 1 } else { next.y - 1 });
        return match (blocked(horiz), blocked(vert)) {
            (true, true) => TileSlide::Corner(step),
            (true, false) => TileSlide::Slide(Vec2Fixed::new(mx, zero)),
            (false, true) => TileSlide::Slide(Vec2Fixed::new(zero, my)),
            (false, false) => TileSlide::Slide(slide_vector(pos, centre, step)),
        };
    }
    if here.x != next.x {
        let side = if sub_tile(pos.y) > half { next.offset(0, 1) } else { next.offset(0, -1) };
        return if blocked(side) {
            TileSlide::Slide(Vec2Fixed::new(zero, my))
        } else {
            TileSlide::Slide(slide_vector(pos, centre, step))
        };
    }
    if here.y != next.y {
        let side = if sub_tile(pos.x) > half { next.offset(1, 0) } else { next.offset(-1, 0) };
        return if blocked(side) {
            TileSlide::Slide(Vec2Fixed::new(mx, zero))
        } else {
            TileSlide::Slide(slide_vector(pos, centre, step))
        };
    }

    let left = sub_tile(pos.x) < half;
    let top = sub_tile(pos.y) < half;
    let base_x = tile_floor(pos.x);
    let base_y = tile_floor(pos.y);
    let (mut jump_x, mut jump_y) = pos.to_ints();
    let mut jumped = false;

    let x_toward = if left { mx < zero } else { mx >= zero };
    let y_toward = if top { my < zero } else { my >= zero };
    let x_side = if left { here.offset(-1, 0) } else { here.offset(1, 0) };
    let y_side = if top { here.offset(0, -1) } else { here.offset(0, 1) };
    if x_toward && blocked(x_side) {
        jumped = true;
        jump_y = if top { base_y - 1 } else { base_y + TILE_UNITS };
    }
    if y_toward && blocked(y_side) {
        jumped = true;
        jump_x = if left { base_x - 1 } else { base_x + TILE_UNITS };
    }
    if jumped {
        TileSlide::Jump(Vec2Fixed::from_ints(jump_x.max(0), jump_y.max(0)))
    } else {
        TileSlide::Slide(slide_vector(pos, centre, step))
    }
}

/// Direction to turn towards after sliding along a blocking tile.
///
/// The slide direction is replaced by the intended heading whenever it
/// points back across the edge that was hit.
#[must_use]
pub fn slide_direction(here: TilePos, next: TilePos, target_dir: Angle, slid: Vec2Fixed) -> Angle {
    let mut slide_dir = atan2(slid.x, slid.y);
    let forward = |a: Angle| a < deg(90) || a > deg(270);
    if next.x != here.x && forward(target_dir) != forward(slide_dir) {
        slide_dir = target_dir;
    }
    let east = |a: Angle| a < deg(180);
    if next.y != here.y && east(target_dir) != east(slide_dir) {
        slide_dir = target_dir;
    }
    slide_dir
}

/// Slide around a single stationary droid in the way; two at once is a
/// dead stop.
///
/// Allied idle droids that are hit are asked to shuffle out of the path.
/// The request is queued and carried out once this droid's turn ends.
#[must_use]
pub fn droid_slide(world: &mut World, droid: &mut Droid, step: Vec2Fixed) -> Vec2Fixed {
    let legs = droid.is_person() || droid.is_cyborg();
    let radius = droid.radius();
    let now = world.time_ms;

    let mut obstacle: Option<(ObjectId, Vec2Fixed)> = None;
    let mut shuffle = None;
    for id in world.grid.query(droid.pos, world.tuning.obj_max_radius) {
        let Some(other) = world.droid(id) else {
            continue;
        };
        if other.died.is_some() || other.is_transporter() || (!legs && other.is_person()) {
            continue;
        }
        let diff = droid.pos + step - other.pos;
        if diff.dot(step) >= Fixed::ZERO {
            continue;
        }
        let rad = i64::from(radius + other.radius());
        if rad * rad <= diff.length_squared() {
            continue;
        }
        if obstacle.is_some() {
            if let Some((id, vec)) = shuffle {
                world.defer(DeferredCommand::Shuffle { droid: id, vec });
            }
            return Vec2Fixed::ZERO;
        }
        obstacle = Some((other.id, other.pos));

        if !droid.movement.note_bump(now, droid.pos, droid.rot.direction) {
            droid.movement.last_bump = droid.movement.time_since_bump(now);
        }
        if world.allied(other.player, droid.player)
            && other.action.kind != crate::action::ActionKind::WaitDuringRearm
            && other.movement.status == MoveStatus::Inactive
        {
            shuffle = Some((other.id, droid.movement.target - droid.pos));
        }
    }

    if let Some((id, vec)) = shuffle {
        world.defer(DeferredCommand::Shuffle { droid: id, vec });
    }
    match obstacle {
        Some((_, pos)) => slide_vector(droid.pos, pos, step),
        None => step,
    }
}

/// Run over enemy infantry in the path of this step.
pub fn check_squished(world: &mut World, droid: &Droid, step: Vec2Fixed) {
    let radius = droid.radius();
    let mut victims = Vec::new();
    for id in world.grid.query(droid.pos, world.tuning.obj_max_radius) {
        let Some(other) = world.droid(id) else {
            continue;
        };
        if !other.is_person() || other.died.is_some() {
            continue;
        }
        let rad = i64::from(radius + other.radius());
        let dist_sq = (droid.pos + step - other.pos).length_squared();
        if (2 * rad * rad) / 3 > dist_sq && !world.allied(droid.player, other.player) {
            victims.push(other.id);
        }
    }
    for victim in victims {
        world.events.push(TickEvent::Squished { victim, by: droid.id });
        world.defer(DeferredCommand::Destroy(victim));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    struct Blocks(BTreeSet<TilePos>);

    impl TileBlocking for Blocks {
        fn map_size(&self) -> (i32, i32) {
            (64, 64)
        }

        fn is_blocked(&self, tile: TilePos, _propulsion: PropulsionKind) -> bool {
            self.0.contains(&tile)
        }
    }

    fn single_block() -> Blocks {
        Blocks([TilePos::new(5, 5)].into_iter().collect())
    }

    fn v(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    fn resolved(slide: TileSlide, step: Vec2Fixed) -> Vec2Fixed {
        match slide {
            TileSlide::Clear => step,
            TileSlide::Slide(s) | TileSlide::Corner(s) => s,
            TileSlide::Jump(_) => Vec2Fixed::ZERO,
        }
    }

    #[test]
    fn test_slide_vector_ignores_receding_step() {
        let step = v(10, 0);
        assert_eq!(slide_vector(v(100, 0), v(0, 0), step), step);
    }

    #[test]
    fn test_slide_vector_head_on_is_zero() {
        let out = slide_vector(v(0, 0), v(100, 0), v(10, 0));
        assert!(out.length() < Fixed::from_num(0.001));
    }

    #[test]
    fn test_slide_vector_tangent() {
        let out = slide_vector(v(0, 0), v(100, 50), v(10, 0));
        let radial = v(100, 50);
        assert!(out.dot(radial).abs() < Fixed::from_num(0.01));
        assert!(out.y < Fixed::ZERO);
    }

    #[test]
    fn test_clear_tile() {
        let map = single_block();
        let slide = blocking_slide(&map, PropulsionKind::Wheeled, v(3 * 128 + 64, 5 * 128 + 64), v(10, 0));
        assert_eq!(slide, TileSlide::Clear);
    }

    #[test]
    fn test_head_on_cardinal_stops() {
        let map = single_block();
        for (pos, step) in [
            (v(5 * 128 - 2, 5 * 128 + 64), v(8, 0)),
            (v(6 * 128 + 1, 5 * 128 + 64), v(-8, 0)),
            (v(5 * 128 + 64, 5 * 128 - 2), v(0, 8)),
            (v(5 * 128 + 64, 6 * 128 + 1), v(0, -8)),
        ] {
            let out = resolved(blocking_slide(&map, PropulsionKind::Wheeled, pos, step), step);
            assert!(out.length() < Fixed::from_num(0.01), "{pos:?} {step:?} -> {out:?}");
        }
    }

    #[test]
    fn test_wall_cuts_axis() {
        let map = Blocks((0..10).map(|y| TilePos::new(5, y)).collect());
        let pos = v(5 * 128 - 2, 3 * 128 + 20);
        let step = v(8, 6);
        match blocking_slide(&map, PropulsionKind::Wheeled, pos, step) {
            TileSlide::Slide(out) => {
                assert_eq!(out.x, Fixed::ZERO);
                assert_eq!(out.y, step.y);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_corner_detected() {
        let map = Blocks([TilePos::new(5, 5), TilePos::new(4, 5), TilePos::new(5, 4)].into_iter().collect());
        let pos = v(5 * 128 - 2, 5 * 128 - 2);
        let step = v(5, 5);
        assert_eq!(blocking_slide(&map, PropulsionKind::Wheeled, pos, step), TileSlide::Corner(step));
    }

    #[test]
    fn test_jump_off_blocked_tile() {
        let map = Blocks([TilePos::new(5, 5), TilePos::new(4, 5)].into_iter().collect());
        let pos = v(5 * 128 + 10, 5 * 128 + 10);
        match blocking_slide(&map, PropulsionKind::Wheeled, pos, v(-4, 1)) {
            TileSlide::Jump(to) => assert_eq!(to.to_ints(), (5 * 128 + 10, 5 * 128 - 1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_slide_direction_keeps_heading_across_edge() {
        let here = TilePos::new(4, 5);
        let next = TilePos::new(5, 5);
        let dir = slide_direction(here, next, deg(80), v(-5, 0));
        assert_eq!(dir, deg(80));
    }

    proptest! {
        #[test]
        fn prop_blocking_slide_never_pushes_inward(
            approach in 0usize..8,
            along in 8i32..120,
            len in 1i32..12,
            wobble in -3i32..=3,
        ) {
            let map = single_block();
            // Start just outside each face or corner of tile (5, 5) so that
            // every step ends inside it.
            let lo = 5 * 128;
            let hi = 6 * 128;
            let (pos, step) = match approach {
                0 => (v(lo - 1, lo + along), v(len, wobble)),
                1 => (v(hi, lo + along), v(-len, wobble)),
                2 => (v(lo + along, lo - 1), v(wobble, len)),
                3 => (v(lo + along, hi), v(wobble, -len)),
                4 => (v(lo - 1, lo - 1), v(len, len)),
                5 => (v(hi, lo - 1), v(-len, len)),
                6 => (v(lo - 1, hi), v(len, -len)),
                _ => (v(hi, hi), v(-len, -len)),
            };
            prop_assert_ne!(TilePos::of(pos), TilePos::new(5, 5));
            prop_assert_eq!(TilePos::of(pos + step), TilePos::new(5, 5));
            let out = resolved(blocking_slide(&map, PropulsionKind::Tracked, pos, step), step);
            let centre = TilePos::new(5, 5).center();
            let inward = out.dot(centre - pos);
            prop_assert!(inward <= Fixed::from_num(0.5), "inward {inward} for {out:?}");
            prop_assert!(out.length() <= step.length() + Fixed::from_num(0.01));
        }
    }
}
