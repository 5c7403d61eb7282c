//! A* pathfinding over a tile map
//!
//! Eight-way horizontal steps plus single-level climbs and drops, all gated
//! by the map's `can_enter_tile`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ahash::AHashMap;
use glam::IVec3;
use ordered_float::OrderedFloat;

use crate::battle::services::TileMap;
use crate::core::types::TilePos;

const STRAIGHT_STEP_COST: f32 = 1.0;
const DIAGONAL_STEP_COST: f32 = 1.5;
const CLIMB_STEP_COST: f32 = 1.0;

/// Node in the A* open set
#[derive(Debug, Clone)]
struct PathNode {
    tile: TilePos,
    f_cost: OrderedFloat<f32>, // g_cost + heuristic
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.tile == other.tile && self.f_cost == other.f_cost
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap, tile order keeps pops deterministic
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.tile.to_array().cmp(&self.tile.to_array()))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Admissible estimate of the remaining cost
pub fn heuristic(from: TilePos, to: TilePos) -> f32 {
    let d = (to - from).abs();
    let straight = d.x.max(d.y) - d.x.min(d.y);
    let diagonal = d.x.min(d.y);
    straight as f32 * STRAIGHT_STEP_COST
        + diagonal as f32 * DIAGONAL_STEP_COST
        + d.z as f32 * CLIMB_STEP_COST
}

/// Cost of a single step between neighbouring tiles
pub fn step_cost(from: TilePos, to: TilePos) -> f32 {
    let d = (to - from).abs();
    let horizontal = if d.x != 0 && d.y != 0 {
        DIAGONAL_STEP_COST
    } else if d.x != 0 || d.y != 0 {
        STRAIGHT_STEP_COST
    } else {
        0.0
    };
    horizontal + d.z as f32 * CLIMB_STEP_COST
}

fn neighbours(tile: TilePos) -> impl Iterator<Item = TilePos> {
    (-1..=1).flat_map(move |dz| {
        (-1..=1).flat_map(move |dy| {
            (-1..=1).filter_map(move |dx| {
                let offset = IVec3::new(dx, dy, dz);
                (offset != IVec3::ZERO).then_some(tile + offset)
            })
        })
    })
}

/// Find path using A*
///
/// Returns the tiles after `start` up to and including `goal`. If `goal`
/// is unreachable within `cost_limit`, returns the path to the explored
/// tile nearest to it (possibly empty).
pub fn find_path<M: TileMap + ?Sized>(
    map: &M,
    start: TilePos,
    goal: TilePos,
    cost_limit: f32,
    large: bool,
) -> Vec<TilePos> {
    if start == goal {
        return Vec::new();
    }

    let mut open_set = BinaryHeap::new();
    let mut came_from: AHashMap<TilePos, TilePos> = AHashMap::new();
    let mut g_scores: AHashMap<TilePos, f32> = AHashMap::new();

    let mut closest = start;
    let mut closest_estimate = heuristic(start, goal);

    g_scores.insert(start, 0.0);
    open_set.push(PathNode {
        tile: start,
        f_cost: OrderedFloat(closest_estimate),
    });

    while let Some(current) = open_set.pop() {
        if current.tile == goal {
            return reconstruct_path(&came_from, start, goal);
        }

        let current_g = *g_scores.get(&current.tile).unwrap_or(&f32::INFINITY);
        if current.f_cost.0 > current_g + heuristic(current.tile, goal) {
            // Stale entry
            continue;
        }

        for neighbour in neighbours(current.tile) {
            if !map.contains(neighbour) || !map.can_enter_tile(current.tile, neighbour, large) {
                continue;
            }

            let tentative_g = current_g + step_cost(current.tile, neighbour);
            if tentative_g > cost_limit {
                continue;
            }
            let neighbour_g = *g_scores.get(&neighbour).unwrap_or(&f32::INFINITY);

            if tentative_g < neighbour_g {
                came_from.insert(neighbour, current.tile);
                g_scores.insert(neighbour, tentative_g);

                let estimate = heuristic(neighbour, goal);
                if estimate < closest_estimate {
                    closest_estimate = estimate;
                    closest = neighbour;
                }
                open_set.push(PathNode {
                    tile: neighbour,
                    f_cost: OrderedFloat(tentative_g + estimate),
                });
            }
        }
    }

    reconstruct_path(&came_from, start, closest)
}

/// Reconstruct path from came_from map, dropping the start tile
fn reconstruct_path(
    came_from: &AHashMap<TilePos, TilePos>,
    start: TilePos,
    mut current: TilePos,
) -> Vec<TilePos> {
    let mut path = Vec::new();
    while current != start {
        path.push(current);
        match came_from.get(&current) {
            Some(&prev) => current = prev,
            None => break,
        }
    }
    path.reverse();
    path
}

/// Sum of step costs along a path starting at `start`
pub fn path_cost(start: TilePos, path: &[TilePos]) -> f32 {
    let mut previous = start;
    let mut total = 0.0;
    for &tile in path {
        total += step_cost(previous, tile);
        previous = tile;
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::grid_map::GridMap;

    #[test]
    fn test_straight_path() {
        let map = GridMap::new(IVec3::new(10, 10, 1));
        let path = find_path(&map, IVec3::new(1, 1, 0), IVec3::new(5, 1, 0), f32::INFINITY, false);
        assert_eq!(path.len(), 4);
        assert_eq!(path.last(), Some(&IVec3::new(5, 1, 0)));
        assert!(path.iter().all(|t| t.y == 1));
    }

    #[test]
    fn test_same_tile_is_empty() {
        let map = GridMap::new(IVec3::new(4, 4, 1));
        let tile = IVec3::new(2, 2, 0);
        assert!(find_path(&map, tile, tile, f32::INFINITY, false).is_empty());
    }

    #[test]
    fn test_path_around_wall_of_features() {
        let mut map = GridMap::new(IVec3::new(10, 10, 1));
        for y in 0..9 {
            map.set_feature(IVec3::new(4, y, 0), true);
        }
        let start = IVec3::new(2, 2, 0);
        let goal = IVec3::new(6, 2, 0);
        let path = find_path(&map, start, goal, f32::INFINITY, false);
        assert_eq!(path.last(), Some(&goal));
        assert!(path.iter().any(|t| t.y == 9));
        assert!(path.iter().all(|t| t.x != 4 || t.y == 9));
    }

    #[test]
    fn test_unreachable_goal_gives_closest() {
        let mut map = GridMap::new(IVec3::new(10, 10, 1));
        for y in 0..10 {
            map.set_feature(IVec3::new(5, y, 0), true);
        }
        let path = find_path(&map, IVec3::new(1, 4, 0), IVec3::new(8, 4, 0), f32::INFINITY, false);
        assert_eq!(path.last(), Some(&IVec3::new(4, 4, 0)));
    }

    #[test]
    fn test_cost_limit_truncates() {
        let map = GridMap::new(IVec3::new(20, 3, 1));
        let start = IVec3::new(0, 1, 0);
        let path = find_path(&map, start, IVec3::new(15, 1, 0), 3.0, false);
        assert_eq!(path.last(), Some(&IVec3::new(3, 1, 0)));
        assert!(path_cost(start, &path) <= 3.0);
    }

    #[test]
    fn test_heuristic_never_overestimates_step() {
        let a = IVec3::new(0, 0, 0);
        for n in neighbours(a) {
            assert!(heuristic(a, n) <= step_cost(a, n) + f32::EPSILON);
        }
    }
}
