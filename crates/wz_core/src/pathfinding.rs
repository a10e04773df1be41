//! Built-in terrain map and tile A* route planner.
//!
//! All calculations use integer costs and a fixed neighbour order, so the
//! same request always yields the same route on every client.
//!
//! [`TileMap`] implements [`Terrain`] and [`AStarPathfinder`] implements
//! [`Pathfinder`] over whatever [`TileBlocking`] oracle the caller passes in
//! (terrain alone, or terrain plus structures).

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::droid::PropulsionKind;
use crate::environment::{
    PathRequest, PathResult, Pathfinder, Terrain, TerrainType, TileBlocking,
};
use crate::math::{Fixed, TilePos, Vec2Fixed, TILE_UNITS};
use crate::object::ObjectId;

/// A rectangular terrain map with per-tile surface types and per-vertex
/// heights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<TerrainType>,
    /// `(width + 1) * (height + 1)` corner heights, row-major.
    heights: Vec<i32>,
}

impl TileMap {
    /// A flat map of normal ground.
    ///
    /// Sizes below one tile are clamped to one.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            tiles: vec![TerrainType::Normal; (width * height) as usize],
            heights: vec![0; ((width + 1) * (height + 1)) as usize],
        }
    }

    /// Width in tiles.
    #[must_use]
    pub const fn width(&self) -> i32 {
        self.width
    }

    /// Height in tiles.
    #[must_use]
    pub const fn height(&self) -> i32 {
        self.height
    }

    /// True if the tile lies on the map.
    #[must_use]
    pub fn in_bounds(&self, tile: TilePos) -> bool {
        tile.x >= 0 && tile.y >= 0 && tile.x < self.width && tile.y < self.height
    }

    fn index(&self, tile: TilePos) -> Option<usize> {
        self.in_bounds(tile)
            .then(|| (tile.y * self.width + tile.x) as usize)
    }

    /// Surface type of a tile, `None` off the map.
    #[must_use]
    pub fn get(&self, tile: TilePos) -> Option<TerrainType> {
        self.index(tile).map(|i| self.tiles[i])
    }

    /// Set the surface type of a tile. Returns `false` off the map.
    pub fn set(&mut self, tile: TilePos, terrain: TerrainType) -> bool {
        match self.index(tile) {
            Some(i) => {
                self.tiles[i] = terrain;
                true
            }
            None => false,
        }
    }

    /// Set the height of a tile corner. Returns `false` off the map.
    pub fn set_vertex_height(&mut self, x: i32, y: i32, height: i32) -> bool {
        if x < 0 || y < 0 || x > self.width || y > self.height {
            return false;
        }
        let i = (y * (self.width + 1) + x) as usize;
        self.heights[i] = height;
        true
    }

    fn vertex_height(&self, x: i32, y: i32) -> i32 {
        let x = x.clamp(0, self.width);
        let y = y.clamp(0, self.height);
        self.heights[(y * (self.width + 1) + x) as usize]
    }
}

impl Terrain for TileMap {
    fn map_size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn is_blocking_tile(&self, tile: TilePos, propulsion: PropulsionKind) -> bool {
        self.get(tile).map_or(true, |t| t.blocks(propulsion))
    }

    /// Bilinear interpolation between the four corners of the tile.
    fn height_at(&self, pos: Vec2Fixed) -> Fixed {
        let tile = TilePos::of(pos);
        let tiles = Fixed::from_num(TILE_UNITS);
        let fx = ((pos.x - Fixed::from_num(tile.x * TILE_UNITS)) / tiles).clamp(Fixed::ZERO, Fixed::ONE);
        let fy = ((pos.y - Fixed::from_num(tile.y * TILE_UNITS)) / tiles).clamp(Fixed::ZERO, Fixed::ONE);
        let h = |dx: i32, dy: i32| Fixed::from_num(self.vertex_height(tile.x + dx, tile.y + dy));
        let top = h(0, 0) + (h(1, 0) - h(0, 0)) * fx;
        let bottom = h(0, 1) + (h(1, 1) - h(0, 1)) * fx;
        top + (bottom - top) * fy
    }

    fn terrain_type(&self, tile: TilePos) -> TerrainType {
        self.get(tile).unwrap_or(TerrainType::Cliff)
    }
}

/// A node in the A* open set priority queue.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
struct AStarNode {
    tile: TilePos,
    /// `g + h`.
    f_score: u32,
    /// Tie-breaker for determinism: lower coordinates first.
    tie_breaker: u64,
}

impl Ord for AStarNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for lowest f first.
        match other.f_score.cmp(&self.f_score) {
            Ordering::Equal => other.tie_breaker.cmp(&self.tie_breaker),
            ord => ord,
        }
    }
}

impl PartialOrd for AStarNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Neighbour offsets for 8-directional movement.
const DIRECTIONS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

const STRAIGHT_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;

/// Octile distance heuristic in the same units as the step costs.
#[inline]
fn octile_heuristic(a: TilePos, b: TilePos) -> u32 {
    let dx = a.x.abs_diff(b.x);
    let dy = a.y.abs_diff(b.y);
    STRAIGHT_COST * dx.max(dy) + (DIAGONAL_COST - STRAIGHT_COST) * dx.min(dy)
}

#[inline]
fn tie_breaker(tile: TilePos) -> u64 {
    ((tile.y as u32 as u64) << 32) | u64::from(tile.x as u32)
}

/// A diagonal step may not cut the corner of a blocked tile.
#[inline]
fn is_diagonal_valid(
    map: &dyn TileBlocking,
    from: TilePos,
    dx: i32,
    dy: i32,
    propulsion: PropulsionKind,
) -> bool {
    if dx == 0 || dy == 0 {
        return true;
    }
    !map.is_blocked(from.offset(dx, 0), propulsion) && !map.is_blocked(from.offset(0, dy), propulsion)
}

/// What a search reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Tiles from start to goal, both inclusive.
    Exact(Vec<TilePos>),
    /// The goal was unreachable; tiles from start to the reachable tile
    /// closest to it.
    Nearest(Vec<TilePos>),
}

/// Tile A* from `start` to `goal`.
///
/// A blocked start tile is allowed so droids pushed into an obstacle can
/// still leave. When the goal cannot be reached the route to the closest
/// reached tile is returned instead.
#[must_use]
pub fn find_route(
    map: &dyn TileBlocking,
    start: TilePos,
    goal: TilePos,
    propulsion: PropulsionKind,
) -> Route {
    if start == goal {
        return Route::Exact(vec![start]);
    }

    let mut open_set: BinaryHeap<AStarNode> = BinaryHeap::new();
    let mut came_from: HashMap<TilePos, TilePos> = HashMap::new();
    let mut g_score: HashMap<TilePos, u32> = HashMap::new();

    let mut nearest = start;
    let mut nearest_h = octile_heuristic(start, goal);

    g_score.insert(start, 0);
    open_set.push(AStarNode {
        tile: start,
        f_score: nearest_h,
        tie_breaker: tie_breaker(start),
    });

    while let Some(current) = open_set.pop() {
        if current.tile == goal {
            return Route::Exact(reconstruct(&came_from, goal));
        }

        let current_g = g_score.get(&current.tile).copied().unwrap_or(u32::MAX);
        if current.f_score > current_g.saturating_add(octile_heuristic(current.tile, goal)) {
            // Stale heap entry.
            continue;
        }

        let h = octile_heuristic(current.tile, goal);
        if h < nearest_h || (h == nearest_h && tie_breaker(current.tile) < tie_breaker(nearest)) {
            nearest = current.tile;
            nearest_h = h;
        }

        for &(dx, dy) in &DIRECTIONS {
            let next = current.tile.offset(dx, dy);
            if map.is_blocked(next, propulsion) {
                continue;
            }
            if !is_diagonal_valid(map, current.tile, dx, dy, propulsion) {
                continue;
            }

            let step = if dx != 0 && dy != 0 {
                DIAGONAL_COST
            } else {
                STRAIGHT_COST
            };
            let tentative_g = current_g.saturating_add(step);
            let neighbor_g = g_score.get(&next).copied().unwrap_or(u32::MAX);

            if tentative_g < neighbor_g {
                came_from.insert(next, current.tile);
                g_score.insert(next, tentative_g);
                open_set.push(AStarNode {
                    tile: next,
                    f_score: tentative_g + octile_heuristic(next, goal),
                    tie_breaker: tie_breaker(next),
                });
            }
        }
    }

    Route::Nearest(reconstruct(&came_from, nearest))
}

fn reconstruct(came_from: &HashMap<TilePos, TilePos>, goal: TilePos) -> Vec<TilePos> {
    let mut path = vec![goal];
    let mut current = goal;
    while let Some(&prev) = came_from.get(&current) {
        path.push(prev);
        current = prev;
    }
    path.reverse();
    path
}

/// Remove intermediate tiles that are in straight line of sight of an
/// earlier one.
#[must_use]
pub fn smooth_path(map: &dyn TileBlocking, path: Vec<TilePos>, propulsion: PropulsionKind) -> Vec<TilePos> {
    if path.len() <= 2 {
        return path;
    }

    let mut smoothed = Vec::with_capacity(path.len());
    smoothed.push(path[0]);

    let mut current_idx = 0;
    while current_idx < path.len() - 1 {
        let mut furthest_visible = current_idx + 1;
        for check_idx in (current_idx + 2)..path.len() {
            if has_line_of_sight(map, path[current_idx], path[check_idx], propulsion) {
                furthest_visible = check_idx;
            }
        }
        smoothed.push(path[furthest_visible]);
        current_idx = furthest_visible;
    }

    smoothed
}

/// Bresenham walk between two tiles, refusing to cut blocked corners.
#[must_use]
pub fn has_line_of_sight(
    map: &dyn TileBlocking,
    from: TilePos,
    to: TilePos,
    propulsion: PropulsionKind,
) -> bool {
    let dx = (to.x - from.x).abs();
    let dy = (to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx - dy;
    let mut x = from.x;
    let mut y = from.y;

    loop {
        let here = TilePos::new(x, y);
        if here != from && map.is_blocked(here, propulsion) {
            return false;
        }
        if x == to.x && y == to.y {
            return true;
        }

        let e2 = 2 * err;
        if e2 > -dy && e2 < dx
            && (map.is_blocked(TilePos::new(x + sx, y), propulsion)
                || map.is_blocked(TilePos::new(x, y + sy), propulsion))
        {
            return false;
        }
        if e2 > -dy {
            err -= dy;
            x += sx;
        }
        if e2 < dx {
            err += dx;
            y += sy;
        }
    }
}

/// Turn a tile route into world waypoints.
///
/// The start tile is dropped. An exact route ends on the requested
/// destination itself, not the centre of its tile.
#[must_use]
pub fn route_waypoints(route: Route, to: Vec2Fixed, map: &dyn TileBlocking, propulsion: PropulsionKind) -> Vec<Vec2Fixed> {
    let (tiles, exact) = match route {
        Route::Exact(tiles) => (tiles, true),
        Route::Nearest(tiles) => (tiles, false),
    };
    let tiles = smooth_path(map, tiles, propulsion);
    let mut waypoints: Vec<Vec2Fixed> = tiles.iter().skip(1).map(|t| t.center()).collect();
    if exact {
        match waypoints.last_mut() {
            Some(last) => *last = to,
            None => waypoints.push(to),
        }
    }
    waypoints
}

/// A* route planner.
///
/// In immediate mode every request is answered on the spot. In deferred mode
/// requests are parked and answered on the next [`Pathfinder::poll`], which
/// mimics an asynchronous planning service.
#[derive(Debug, Clone, Default)]
pub struct AStarPathfinder {
    deferred: bool,
    pending: BTreeMap<ObjectId, PathRequest>,
}

impl AStarPathfinder {
    /// Planner that answers immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Planner that answers on the following poll.
    #[must_use]
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            pending: BTreeMap::new(),
        }
    }

    /// Number of parked requests.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn solve(request: &PathRequest, map: &dyn TileBlocking) -> PathResult {
        let start = TilePos::of(request.from);
        let goal = TilePos::of(request.to);
        let route = find_route(map, start, goal, request.propulsion);
        if let Route::Nearest(tiles) = &route {
            if tiles.len() <= 1 {
                return PathResult::Failed;
            }
        }
        PathResult::Ready(route_waypoints(route, request.to, map, request.propulsion))
    }
}

impl Pathfinder for AStarPathfinder {
    fn request_path(&mut self, request: &PathRequest, map: &dyn TileBlocking) -> PathResult {
        if self.deferred {
            self.pending.insert(request.droid, *request);
            return PathResult::Pending;
        }
        Self::solve(request, map)
    }

    fn poll(&mut self, droid: ObjectId, map: &dyn TileBlocking) -> PathResult {
        match self.pending.remove(&droid) {
            Some(request) => Self::solve(&request, map),
            None => PathResult::Failed,
        }
    }

    fn is_reachable(
        &self,
        from: Vec2Fixed,
        to: Vec2Fixed,
        propulsion: PropulsionKind,
        map: &dyn TileBlocking,
    ) -> bool {
        let goal = TilePos::of(to);
        if map.is_blocked(goal, propulsion) {
            return false;
        }
        matches!(find_route(map, TilePos::of(from), goal, propulsion), Route::Exact(_))
    }

    fn cancel(&mut self, droid: ObjectId) {
        self.pending.remove(&droid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::TerrainBlocking;

    fn wall_map() -> TileMap {
        let mut map = TileMap::new(10, 10);
        for y in 2..8 {
            map.set(TilePos::new(5, y), TerrainType::Cliff);
        }
        map
    }

    #[test]
    fn test_tile_map_bounds() {
        let map = TileMap::new(10, 5);
        assert_eq!(Terrain::map_size(&map), (10, 5));
        assert_eq!(map.get(TilePos::new(9, 4)), Some(TerrainType::Normal));
        assert_eq!(map.get(TilePos::new(10, 4)), None);
        assert!(map.is_blocking_tile(TilePos::new(-1, 0), PropulsionKind::Lift));
    }

    #[test]
    fn test_height_interpolation() {
        let mut map = TileMap::new(2, 2);
        map.set_vertex_height(1, 0, 100);
        map.set_vertex_height(1, 1, 100);
        let mid = map.height_at(Vec2Fixed::from_ints(64, 64));
        assert_eq!(mid, Fixed::from_num(50));
        assert_eq!(map.height_at(Vec2Fixed::from_ints(128, 10)), Fixed::from_num(100));
    }

    #[test]
    fn test_simple_route() {
        let map = TileMap::new(10, 10);
        let route = find_route(&TerrainBlocking(&map), TilePos::new(0, 0), TilePos::new(5, 5), PropulsionKind::Wheeled);
        let Route::Exact(tiles) = route else {
            panic!("expected exact route");
        };
        assert_eq!(tiles.first(), Some(&TilePos::new(0, 0)));
        assert_eq!(tiles.last(), Some(&TilePos::new(5, 5)));
        assert_eq!(tiles.len(), 6);
    }

    #[test]
    fn test_route_around_obstacle() {
        let map = wall_map();
        let blocking = TerrainBlocking(&map);
        let Route::Exact(tiles) = find_route(&blocking, TilePos::new(2, 5), TilePos::new(8, 5), PropulsionKind::Tracked) else {
            panic!("expected exact route");
        };
        for tile in &tiles {
            assert!(!blocking.is_blocked(*tile, PropulsionKind::Tracked), "route crosses {tile:?}");
        }
    }

    #[test]
    fn test_lift_flies_over_cliffs() {
        let map = wall_map();
        let Route::Exact(tiles) = find_route(&TerrainBlocking(&map), TilePos::new(2, 5), TilePos::new(8, 5), PropulsionKind::Lift) else {
            panic!("expected exact route");
        };
        assert_eq!(tiles.len(), 7);
    }

    #[test]
    fn test_unreachable_goal_gives_nearest() {
        let mut map = TileMap::new(10, 10);
        for y in 0..10 {
            map.set(TilePos::new(5, y), TerrainType::Water);
        }
        let route = find_route(&TerrainBlocking(&map), TilePos::new(2, 5), TilePos::new(8, 5), PropulsionKind::Wheeled);
        let Route::Nearest(tiles) = route else {
            panic!("expected nearest route");
        };
        assert_eq!(tiles.last(), Some(&TilePos::new(4, 5)));
    }

    #[test]
    fn test_exact_route_ends_on_destination() {
        let map = TileMap::new(10, 10);
        let mut planner = AStarPathfinder::new();
        let to = Vec2Fixed::from_ints(900, 300);
        let request = PathRequest {
            droid: ObjectId(1),
            from: Vec2Fixed::from_ints(100, 100),
            to,
            propulsion: PropulsionKind::Wheeled,
        };
        let PathResult::Ready(waypoints) = planner.request_path(&request, &TerrainBlocking(&map)) else {
            panic!("expected a route");
        };
        assert_eq!(waypoints.last(), Some(&to));
        // Open ground smooths down to a single leg.
        assert_eq!(waypoints.len(), 1);
    }

    #[test]
    fn test_deferred_mode_answers_on_poll() {
        let map = TileMap::new(10, 10);
        let blocking = TerrainBlocking(&map);
        let mut planner = AStarPathfinder::deferred();
        let request = PathRequest {
            droid: ObjectId(4),
            from: Vec2Fixed::from_ints(100, 100),
            to: Vec2Fixed::from_ints(700, 700),
            propulsion: PropulsionKind::Tracked,
        };
        assert_eq!(planner.request_path(&request, &blocking), PathResult::Pending);
        assert_eq!(planner.pending_len(), 1);
        assert!(matches!(planner.poll(ObjectId(4), &blocking), PathResult::Ready(_)));
        assert_eq!(planner.poll(ObjectId(4), &blocking), PathResult::Failed);
    }

    #[test]
    fn test_reachability_precheck() {
        let mut map = TileMap::new(10, 10);
        for y in 0..10 {
            map.set(TilePos::new(5, y), TerrainType::Water);
        }
        let blocking = TerrainBlocking(&map);
        let planner = AStarPathfinder::new();
        let from = TilePos::new(1, 1).center();
        assert!(planner.is_reachable(from, TilePos::new(3, 8).center(), PropulsionKind::Wheeled, &blocking));
        assert!(!planner.is_reachable(from, TilePos::new(8, 8).center(), PropulsionKind::Wheeled, &blocking));
        assert!(planner.is_reachable(from, TilePos::new(8, 8).center(), PropulsionKind::Hover, &blocking));
    }

    #[test]
    fn test_determinism() {
        let map = wall_map();
        let blocking = TerrainBlocking(&map);
        let a = find_route(&blocking, TilePos::new(1, 5), TilePos::new(9, 5), PropulsionKind::Tracked);
        let b = find_route(&blocking, TilePos::new(1, 5), TilePos::new(9, 5), PropulsionKind::Tracked);
        assert_eq!(a, b);
    }

    #[test]
    fn test_line_of_sight_blocked_by_wall() {
        let map = wall_map();
        let blocking = TerrainBlocking(&map);
        assert!(!has_line_of_sight(&blocking, TilePos::new(2, 5), TilePos::new(8, 5), PropulsionKind::Tracked));
        assert!(has_line_of_sight(&blocking, TilePos::new(2, 1), TilePos::new(8, 1), PropulsionKind::Tracked));
    }

    #[test]
    fn test_octile_heuristic() {
        assert_eq!(octile_heuristic(TilePos::new(0, 0), TilePos::new(5, 5)), 70);
        assert_eq!(octile_heuristic(TilePos::new(0, 0), TilePos::new(3, 7)), 82);
        assert_eq!(octile_heuristic(TilePos::new(4, 4), TilePos::new(4, 4)), 0);
    }
}
