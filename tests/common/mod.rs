#![allow(dead_code)]

use sampling_planners::error::{CallbackError, CallbackResult};
use sampling_planners::euclidean::euclidean_distance;
use sampling_planners::prm::{grow_roadmap, RoadmapConfig, RoadmapGraph};

pub type Point = [f64; 2];

/// Axis-aligned rectangle, closed on every side.
#[derive(Clone, Copy, Debug)]
pub struct Rect {
    pub min: Point,
    pub max: Point,
}

impl Rect {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, point: &Point) -> bool {
        (0..2).all(|axis| point[axis] >= self.min[axis] && point[axis] <= self.max[axis])
    }

    /// Liang-Barsky clipping of the segment against the rectangle's slabs.
    pub fn intersects_segment(&self, start: &Point, end: &Point) -> bool {
        let mut t_min: f64 = 0.0;
        let mut t_max: f64 = 1.0;
        for axis in 0..2 {
            let origin = start[axis];
            let direction = end[axis] - start[axis];
            if direction == 0.0 {
                if origin < self.min[axis] || origin > self.max[axis] {
                    return false;
                }
                continue;
            }
            let mut t1 = (self.min[axis] - origin) / direction;
            let mut t2 = (self.max[axis] - origin) / direction;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return false;
            }
        }
        !(t_max < 0.0 || t_min > 1.0)
    }
}

/// A bounded 2D world with rectangular obstacles.
#[derive(Clone, Debug)]
pub struct World {
    pub bounds: Rect,
    pub obstacles: Vec<Rect>,
}

impl World {
    pub fn is_state_valid(&self, state: &Point) -> bool {
        self.bounds.contains(state) && !self.obstacles.iter().any(|o| o.contains(state))
    }

    pub fn is_edge_valid(&self, a: &Point, b: &Point) -> bool {
        self.is_state_valid(a)
            && self.is_state_valid(b)
            && !self.obstacles.iter().any(|o| o.intersects_segment(a, b))
    }

    pub fn with_obstacle(mut self, obstacle: Rect) -> Self {
        self.obstacles.push(obstacle);
        self
    }
}

/// 20x20 grid with the cells of rows 2-11 and columns 5-9 blocked.
pub fn grid_world() -> World {
    World {
        bounds: Rect::new([0.0, 0.0], [20.0, 20.0]),
        obstacles: vec![Rect::new([5.0, 2.0], [10.0, 12.0])],
    }
}

/// 3x3 world with a block at x in [1, 2], y <= 2.
pub fn blocked_corridor_world() -> World {
    World {
        bounds: Rect::new([0.0, 0.0], [3.0, 3.0]),
        obstacles: vec![Rect::new([1.0, 0.0], [2.0, 2.0])],
    }
}

/// Radical inverse of `index` in `base`.
pub fn halton(mut index: usize, base: usize) -> f64 {
    let mut fraction = 1.0;
    let mut result = 0.0;
    while index > 0 {
        fraction /= base as f64;
        result += fraction * (index % base) as f64;
        index /= base;
    }
    result
}

/// Deterministic, well spread samples over `[0, size]^2`.
pub fn halton_sampler(size: f64) -> impl FnMut() -> CallbackResult<Point> {
    let mut index = 0;
    move || {
        index += 1;
        Ok([size * halton(index, 2), size * halton(index, 3)])
    }
}

/// Samples from a fixed list, then fails.
pub fn list_sampler(points: Vec<Point>) -> impl FnMut() -> CallbackResult<Point> {
    let mut points = points.into_iter();
    move || points.next().ok_or_else(|| CallbackError::from("sample list exhausted"))
}

/// Grows a roadmap over `world` from Halton samples until it has `nodes` nodes.
pub fn grow_grid_roadmap(world: &World, nodes: usize, config: &RoadmapConfig) -> RoadmapGraph<Point> {
    let mut roadmap = RoadmapGraph::new();
    grow_roadmap(
        &mut roadmap,
        halton_sampler(20.0),
        euclidean_distance::<2>,
        |state: &Point| world.is_state_valid(state),
        |a: &Point, b: &Point| world.is_edge_valid(a, b),
        |size| size >= nodes,
        config,
    )
    .unwrap();
    roadmap
}

/// Checks that every segment of `path` is valid in `world` and returns the path length.
pub fn assert_path_valid(world: &World, path: &[Point]) -> f64 {
    assert!(!path.is_empty(), "empty path");
    for pair in path.windows(2) {
        assert!(
            world.is_edge_valid(&pair[0], &pair[1]),
            "invalid segment {:?} -> {:?}",
            pair[0],
            pair[1]
        );
    }
    path.windows(2)
        .map(|pair| euclidean_distance(&pair[0], &pair[1]))
        .sum()
}
