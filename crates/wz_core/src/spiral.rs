//! Outward spiral tile search.
//!
//! Tiles are visited ring by ring: ring `r` holds the tiles whose squared
//! distance from the start lies in `r² ..= r² + 2r`, so rings partition the
//! disc without gaps or repeats. Inside a ring, every offset `(dx, dy)` with
//! `dx >= 1, dy >= 0` is tried in its four quarter-turn rotations. The
//! visitation order is fixed, which keeps landing-tile and target discovery
//! identical across peers.

use crate::math::TilePos;

/// Visit tiles around `start` out to `max_radius` (inclusive) and return the
/// first one `accept` agrees to.
pub fn spiral_search<F>(start: TilePos, max_radius: i32, mut accept: F) -> Option<TilePos>
where
    F: FnMut(TilePos) -> bool,
{
    let mut found = None;
    visit(start, max_radius, |tile| {
        if accept(tile) {
            found = Some(tile);
            true
        } else {
            false
        }
    });
    found
}

/// Every tile the search would visit, in order.
#[must_use]
pub fn spiral_order(start: TilePos, max_radius: i32) -> Vec<TilePos> {
    let mut tiles = Vec::new();
    visit(start, max_radius, |tile| {
        tiles.push(tile);
        false
    });
    tiles
}

fn visit<F>(start: TilePos, max_radius: i32, mut stop: F)
where
    F: FnMut(TilePos) -> bool,
{
    if stop(start) {
        return;
    }
    for radius in 1..=max_radius {
        let min_distance = radius * radius;
        let max_distance = min_distance + 2 * radius;
        for dx in 1..=max_radius {
            for dy in 0..=max_radius {
                let distance = dx * dx + dy * dy;
                if distance < min_distance || distance > max_distance {
                    continue;
                }
                if stop(start.offset(dx, dy))
                    || stop(start.offset(-dx, -dy))
                    || stop(start.offset(dy, -dx))
                    || stop(start.offset(-dy, dx))
                {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn ring(start: TilePos, tile: TilePos) -> i32 {
        let dx = tile.x - start.x;
        let dy = tile.y - start.y;
        let d2 = dx * dx + dy * dy;
        let mut r = 0;
        while (r + 1) * (r + 1) <= d2 {
            r += 1;
        }
        r
    }

    #[test]
    fn test_start_tile_first() {
        let start = TilePos::new(10, 10);
        assert_eq!(spiral_search(start, 3, |_| true), Some(start));
    }

    #[test]
    fn test_first_ring_order() {
        let order = spiral_order(TilePos::new(0, 0), 1);
        assert_eq!(
            order,
            vec![
                TilePos::new(0, 0),
                TilePos::new(1, 0),
                TilePos::new(-1, 0),
                TilePos::new(0, -1),
                TilePos::new(0, 1),
                TilePos::new(1, 1),
                TilePos::new(-1, -1),
                TilePos::new(1, -1),
                TilePos::new(-1, 1),
            ]
        );
    }

    #[test]
    fn test_finds_nearest_free_tile() {
        let start = TilePos::new(5, 5);
        let taken: BTreeSet<TilePos> = [start, TilePos::new(6, 5), TilePos::new(4, 5)].into_iter().collect();
        let found = spiral_search(start, 5, |t| !taken.contains(&t));
        assert_eq!(found, Some(TilePos::new(5, 4)));
    }

    #[test]
    fn test_gives_up_past_radius() {
        assert_eq!(spiral_search(TilePos::new(0, 0), 2, |t| t.x == 10), None);
    }

    proptest! {
        #[test]
        fn prop_rings_never_shrink(x in -50i32..50, y in -50i32..50, radius in 0i32..8) {
            let start = TilePos::new(x, y);
            let order = spiral_order(start, radius);
            for pair in order.windows(2) {
                prop_assert!(ring(start, pair[0]) <= ring(start, pair[1]));
            }
        }

        #[test]
        fn prop_each_tile_once(radius in 0i32..8) {
            let start = TilePos::new(0, 0);
            let order = spiral_order(start, radius);
            let unique: BTreeSet<TilePos> = order.iter().copied().collect();
            prop_assert_eq!(unique.len(), order.len());
            for tile in &order {
                prop_assert!(ring(start, *tile) <= radius);
            }
        }

        #[test]
        fn prop_search_returns_first_accepted(seed in 0u32..1000, radius in 1i32..6) {
            let start = TilePos::new(3, -2);
            let accept = |t: TilePos| ((t.x * 31 + t.y * 17) as u32).wrapping_add(seed) % 7 == 0;
            let expected = spiral_order(start, radius).into_iter().find(|t| accept(*t));
            prop_assert_eq!(spiral_search(start, radius, accept), expected);
        }
    }
}
