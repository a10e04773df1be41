//! Spatial index.
//!
//! The map is cut into square cells of `grid_cell_tiles` tiles. An object
//! is appended to the bucket of every cell whose square intersects the
//! circle of its influence range, so a query only needs to visit the cells
//! its own circle touches. Objects therefore live in several buckets at
//! once; the grid never owns them and only stores their ids.
//!
//! Removal clears the object's slots in place. The resulting holes are
//! compacted by [`SpatialGrid::garbage_collect_step`], one bucket column per
//! call, round-robin. The index stays correct without compaction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::math::{map_coord, TilePos, Vec2Fixed, TILE_UNITS};
use crate::object::ObjectId;

/// Slots per bucket chunk.
const CHUNK_SIZE: usize = 16;

/// An array-chunked list of object ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Bucket {
    chunks: Vec<Vec<Option<ObjectId>>>,
}

impl Bucket {
    fn push(&mut self, id: ObjectId) {
        match self.chunks.last_mut() {
            Some(chunk) if chunk.len() < CHUNK_SIZE => chunk.push(Some(id)),
            _ => {
                let mut chunk = Vec::with_capacity(CHUNK_SIZE);
                chunk.push(Some(id));
                self.chunks.push(chunk);
            }
        }
    }

    fn clear(&mut self, id: ObjectId) {
        for slot in self.chunks.iter_mut().flatten() {
            if *slot == Some(id) {
                *slot = None;
                return;
            }
        }
    }

    fn live(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.chunks.iter().flatten().filter_map(|slot| *slot)
    }

    fn slot_count(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    fn compact(&mut self) {
        let live: Vec<ObjectId> = self.live().collect();
        self.chunks.clear();
        for id in live {
            self.push(id);
        }
    }
}

/// Where an object was inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Coverage {
    tile: TilePos,
    range: i32,
    cells: Vec<usize>,
}

/// Bucketed index from world regions to nearby objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialGrid {
    cell_size: i32,
    cols: i32,
    rows: i32,
    buckets: Vec<Bucket>,
    coverage: BTreeMap<ObjectId, Coverage>,
    gc_column: i32,
}

impl SpatialGrid {
    /// Create a grid covering a map of `width` x `height` tiles.
    #[must_use]
    pub fn new(width_tiles: i32, height_tiles: i32, cell_tiles: i32) -> Self {
        let cell_tiles = cell_tiles.max(1);
        let cols = (width_tiles.max(1) + cell_tiles - 1) / cell_tiles;
        let rows = (height_tiles.max(1) + cell_tiles - 1) / cell_tiles;
        Self {
            cell_size: cell_tiles * TILE_UNITS,
            cols,
            rows,
            buckets: vec![Bucket::default(); (cols * rows) as usize],
            coverage: BTreeMap::new(),
            gc_column: 0,
        }
    }

    /// Cell edge length in world units.
    #[must_use]
    pub const fn cell_size(&self) -> i32 {
        self.cell_size
    }

    /// Number of cell columns and rows.
    #[must_use]
    pub const fn dimensions(&self) -> (i32, i32) {
        (self.cols, self.rows)
    }

    /// True if the object is in the index.
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.coverage.contains_key(&id)
    }

    /// Number of indexed objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.coverage.len()
    }

    /// True if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coverage.is_empty()
    }

    /// Exact test whether the circle at `center` with `radius` intersects
    /// the square of cell `(col, row)`.
    #[must_use]
    pub fn circle_hits_cell(&self, center: Vec2Fixed, radius: i32, col: i32, row: i32) -> bool {
        let size = i128::from(self.cell_size) << 32;
        let x0 = i128::from(col) * size;
        let y0 = i128::from(row) * size;
        let cx = i128::from(center.x.to_bits());
        let cy = i128::from(center.y.to_bits());
        let dx = cx.clamp(x0, x0 + size) - cx;
        let dy = cy.clamp(y0, y0 + size) - cy;
        let r = i128::from(radius.max(0)) << 32;
        // Values are at most 2^80, so the squares fit in i128.
        dx * dx + dy * dy <= r * r
    }

    fn cells_for_circle(&self, center: Vec2Fixed, radius: i32) -> Vec<usize> {
        let radius = radius.max(0);
        let (x, y) = center.to_ints();
        let min_col = ((x - radius).div_euclid(self.cell_size)).clamp(0, self.cols - 1);
        let max_col = ((x + radius).div_euclid(self.cell_size)).clamp(0, self.cols - 1);
        let min_row = ((y - radius).div_euclid(self.cell_size)).clamp(0, self.rows - 1);
        let max_row = ((y + radius).div_euclid(self.cell_size)).clamp(0, self.rows - 1);
        let mut cells = Vec::new();
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                if self.circle_hits_cell(center, radius, col, row) {
                    cells.push((row * self.cols + col) as usize);
                }
            }
        }
        cells
    }

    /// Index an object with the given influence range.
    ///
    /// Re-inserting an indexed object replaces its previous coverage.
    pub fn insert(&mut self, id: ObjectId, pos: Vec2Fixed, range: i32) {
        self.remove(id);
        let cells = self.cells_for_circle(pos, range);
        for &cell in &cells {
            self.buckets[cell].push(id);
        }
        self.coverage.insert(
            id,
            Coverage {
                tile: TilePos::new(map_coord(pos.x), map_coord(pos.y)),
                range,
                cells,
            },
        );
    }

    /// Update an object's coverage after it moved.
    ///
    /// Returns `false` (and does nothing) if it is still on the same tile.
    pub fn move_object(&mut self, id: ObjectId, pos: Vec2Fixed) -> bool {
        let Some(coverage) = self.coverage.get(&id) else {
            return false;
        };
        if coverage.tile == TilePos::of(pos) {
            return false;
        }
        let range = coverage.range;
        self.insert(id, pos, range);
        true
    }

    /// Remove an object from every bucket it was inserted into.
    pub fn remove(&mut self, id: ObjectId) -> bool {
        let Some(coverage) = self.coverage.remove(&id) else {
            return false;
        };
        for cell in coverage.cells {
            self.buckets[cell].clear(id);
        }
        true
    }

    /// Objects whose coverage shares a cell with the query circle.
    ///
    /// The result is sorted by id and contains each object once. Callers
    /// still filter by true distance.
    #[must_use]
    pub fn query(&self, center: Vec2Fixed, radius: i32) -> Vec<ObjectId> {
        let mut found = BTreeSet::new();
        for cell in self.cells_for_circle(center, radius) {
            found.extend(self.buckets[cell].live());
        }
        found.into_iter().collect()
    }

    /// Live ids in one bucket, in slot order.
    #[must_use]
    pub fn bucket_contents(&self, col: i32, row: i32) -> Vec<ObjectId> {
        if col < 0 || row < 0 || col >= self.cols || row >= self.rows {
            return Vec::new();
        }
        self.buckets[(row * self.cols + col) as usize].live().collect()
    }

    /// Total number of slots (live and cleared) across all buckets.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.buckets.iter().map(Bucket::slot_count).sum()
    }

    /// Compact the next bucket column, round-robin.
    pub fn garbage_collect_step(&mut self) {
        if self.cols == 0 {
            return;
        }
        let col = self.gc_column;
        for row in 0..self.rows {
            self.buckets[(row * self.cols + col) as usize].compact();
        }
        self.gc_column = (col + 1) % self.cols;
    }

    /// Compact every bucket.
    pub fn garbage_collect_all(&mut self) {
        for bucket in &mut self.buckets {
            bucket.compact();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pos(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::from_ints(x, y)
    }

    #[test]
    fn test_empty_grid_query() {
        let grid = SpatialGrid::new(64, 64, 8);
        assert!(grid.query(pos(1000, 1000), 500).is_empty());
        assert!(grid.is_empty());
    }

    #[test]
    fn test_insert_spans_multiple_cells() {
        let mut grid = SpatialGrid::new(64, 64, 8);
        // Cell edge is 1024; an object at a cell corner with range 100 covers four cells.
        grid.insert(ObjectId(1), pos(1024, 1024), 100);
        for (col, row) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(grid.bucket_contents(col, row), vec![ObjectId(1)]);
        }
        assert!(grid.bucket_contents(2, 2).is_empty());
    }

    #[test]
    fn test_query_is_sorted_and_unique() {
        let mut grid = SpatialGrid::new(64, 64, 8);
        grid.insert(ObjectId(9), pos(1024, 1024), 600);
        grid.insert(ObjectId(3), pos(1100, 900), 600);
        grid.insert(ObjectId(5), pos(7000, 7000), 10);
        assert_eq!(grid.query(pos(1024, 1024), 10), vec![ObjectId(3), ObjectId(9)]);
    }

    #[test]
    fn test_move_within_tile_is_noop() {
        let mut grid = SpatialGrid::new(64, 64, 8);
        grid.insert(ObjectId(1), pos(200, 200), 50);
        assert!(!grid.move_object(ObjectId(1), pos(210, 220)));
        assert!(grid.move_object(ObjectId(1), pos(5000, 5000)));
        assert!(grid.bucket_contents(0, 0).is_empty());
        assert_eq!(grid.bucket_contents(4, 4), vec![ObjectId(1)]);
    }

    #[test]
    fn test_garbage_collection_frees_slots() {
        let mut grid = SpatialGrid::new(16, 16, 8);
        for i in 0..40 {
            grid.insert(ObjectId(i), pos(100, 100), 10);
        }
        for i in 0..40 {
            grid.remove(ObjectId(i));
        }
        assert_eq!(grid.slot_count(), 40);
        grid.garbage_collect_step();
        assert_eq!(grid.slot_count(), 0);
    }

    #[test]
    fn test_gc_column_round_robin() {
        let mut grid = SpatialGrid::new(16, 8, 8);
        grid.insert(ObjectId(1), pos(100, 100), 10);
        grid.insert(ObjectId(2), pos(1100, 100), 10);
        grid.remove(ObjectId(1));
        grid.remove(ObjectId(2));
        grid.garbage_collect_step();
        assert_eq!(grid.slot_count(), 1);
        grid.garbage_collect_step();
        assert_eq!(grid.slot_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_query_matches_cell_predicate(
            ox in 0i32..8192, oy in 0i32..8192, orange in 0i32..3000,
            qx in 0i32..8192, qy in 0i32..8192, qr in 0i32..3000,
        ) {
            let mut grid = SpatialGrid::new(64, 64, 8);
            grid.insert(ObjectId(1), pos(ox, oy), orange);
            let (cols, rows) = grid.dimensions();
            let mut shared = false;
            for row in 0..rows {
                for col in 0..cols {
                    if grid.circle_hits_cell(pos(ox, oy), orange, col, row)
                        && grid.circle_hits_cell(pos(qx, qy), qr, col, row)
                    {
                        shared = true;
                    }
                }
            }
            let found = grid.query(pos(qx, qy), qr).contains(&ObjectId(1));
            prop_assert_eq!(found, shared);
            // Intersecting circles always share a cell.
            let d2 = i64::from(ox - qx).pow(2) + i64::from(oy - qy).pow(2);
            if d2 <= i64::from(orange + qr).pow(2) {
                prop_assert!(found);
            }
        }

        #[test]
        fn prop_insert_remove_round_trip(
            others in proptest::collection::vec((0i32..4096, 0i32..4096, 0i32..1500), 0..8),
            x in 0i32..4096, y in 0i32..4096, range in 0i32..2000,
        ) {
            let mut grid = SpatialGrid::new(32, 32, 8);
            for (i, (ox, oy, r)) in others.iter().enumerate() {
                grid.insert(ObjectId(i as u32 + 10), pos(*ox, *oy), *r);
            }
            grid.garbage_collect_all();
            let before = grid.clone();
            grid.insert(ObjectId(1), pos(x, y), range);
            grid.remove(ObjectId(1));
            grid.garbage_collect_all();
            prop_assert_eq!(before, grid);
        }
    }
}
