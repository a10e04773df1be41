//! Property tests for the spatial grid, spiral search and collision sliding.

use std::collections::BTreeSet;

use wz_core::grid::SpatialGrid;
use wz_core::movement::collision::slide_vector;
use wz_core::prelude::*;
use wz_core::spiral::spiral_order;
use wz_test_utils::determinism::strategies::{arb_position, arb_radius, arb_tile};
use wz_test_utils::proptest::prelude::*;

const MAP_TILES: i32 = 32;

fn isqrt(n: i32) -> i32 {
    let mut r = 0;
    while (r + 1) * (r + 1) <= n {
        r += 1;
    }
    r
}

proptest! {
    #[test]
    fn prop_query_finds_every_object_in_range(
        objects in proptest::collection::vec(arb_position(MAP_TILES), 1..40),
        center in arb_position(MAP_TILES),
        radius in arb_radius(),
    ) {
        let mut grid = SpatialGrid::new(MAP_TILES, MAP_TILES, 4);
        for (i, p) in objects.iter().enumerate() {
            grid.insert(ObjectId(i as u32 + 1), *p, 0);
        }
        let found: BTreeSet<ObjectId> = grid.query(center, radius).into_iter().collect();
        let r2 = i64::from(radius) * i64::from(radius);
        for (i, p) in objects.iter().enumerate() {
            if p.distance_squared(center) <= r2 {
                prop_assert!(found.contains(&ObjectId(i as u32 + 1)), "missed object at {:?}", p);
            }
        }
    }

    #[test]
    fn prop_remove_undoes_insert(
        positions in proptest::collection::vec((arb_position(MAP_TILES), 0..512i32), 1..30),
        point in arb_position(MAP_TILES),
    ) {
        let mut grid = SpatialGrid::new(MAP_TILES, MAP_TILES, 4);
        for (i, (p, range)) in positions.iter().enumerate() {
            grid.insert(ObjectId(i as u32 + 1), *p, *range);
        }
        for i in 0..positions.len() {
            prop_assert!(grid.remove(ObjectId(i as u32 + 1)));
        }
        prop_assert!(grid.is_empty());
        prop_assert!(grid.query(point, MAP_TILES * TILE_UNITS).is_empty());
        grid.garbage_collect_all();
        prop_assert_eq!(grid.slot_count(), 0);
    }

    #[test]
    fn prop_query_is_sorted_and_unique(
        positions in proptest::collection::vec((arb_position(MAP_TILES), 0..512i32), 0..30),
        center in arb_position(MAP_TILES),
        radius in arb_radius(),
    ) {
        let mut grid = SpatialGrid::new(MAP_TILES, MAP_TILES, 4);
        for (i, (p, range)) in positions.iter().enumerate() {
            grid.insert(ObjectId(i as u32 + 1), *p, *range);
        }
        let found = grid.query(center, radius);
        prop_assert!(found.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn prop_spiral_visits_each_tile_once_ring_by_ring(start in arb_tile(MAP_TILES), max_radius in 0..6i32) {
        let order = spiral_order(start, max_radius);
        let unique: BTreeSet<TilePos> = order.iter().copied().collect();
        prop_assert_eq!(unique.len(), order.len());

        let rings: Vec<i32> = order
            .iter()
            .map(|t| {
                let (dx, dy) = (t.x - start.x, t.y - start.y);
                isqrt(dx * dx + dy * dy)
            })
            .collect();
        prop_assert!(rings.windows(2).all(|w| w[0] <= w[1]));

        let mut expected = 0;
        for dx in -max_radius..=max_radius {
            for dy in -max_radius..=max_radius {
                if isqrt(dx * dx + dy * dy) <= max_radius {
                    expected += 1;
                    prop_assert!(unique.contains(&start.offset(dx, dy)));
                }
            }
        }
        prop_assert_eq!(order.len(), expected);
    }

    #[test]
    fn prop_slide_never_adds_speed(
        pos in (0..4000i32, 0..4000i32),
        obstacle in (0..4000i32, 0..4000i32),
        step in (-200..200i32, -200..200i32),
    ) {
        let pos = Vec2Fixed::from_ints(pos.0, pos.1);
        let obstacle = Vec2Fixed::from_ints(obstacle.0, obstacle.1);
        let step = Vec2Fixed::from_ints(step.0, step.1);
        let slid = slide_vector(pos, obstacle, step);
        prop_assert!(slid.length() <= step.length() + Fixed::from_num(1));

        // Sliding never closes in on the obstacle.
        let away = pos - obstacle;
        if away.dot(step) < Fixed::ZERO {
            prop_assert!(away.dot(slid) >= -Fixed::from_num(1));
        } else {
            prop_assert_eq!(slid, step);
        }
    }
}
