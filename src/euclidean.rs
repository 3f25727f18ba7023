//! Helpers for states that are points in `R^N`, stored as `[f64; N]`.
//!
//! The planners treat states as opaque; these functions supply the distance, steering and
//! propagation callbacks for the common real-vector case.

use crate::rrt::tree::PropagatedState;

pub fn euclidean_distance_squared<const N: usize>(a: &[f64; N], b: &[f64; N]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn euclidean_distance<const N: usize>(a: &[f64; N], b: &[f64; N]) -> f64 {
    euclidean_distance_squared(a, b).sqrt()
}

/// Linear interpolation, `t = 0` at `a` and `t = 1` at `b`.
pub fn interpolate<const N: usize>(a: &[f64; N], b: &[f64; N], t: f64) -> [f64; N] {
    let mut state = *a;
    for (value, (x, y)) in state.iter_mut().zip(a.iter().zip(b.iter())) {
        *value = x + (y - x) * t;
    }
    state
}

/// Steers from one state towards another, moving at most `steering_range`.
pub fn steer<const N: usize>(from: &[f64; N], to: &[f64; N], steering_range: f64) -> [f64; N] {
    let distance = euclidean_distance(from, to);
    if distance > steering_range {
        interpolate(from, to, steering_range / distance)
    } else {
        *to
    }
}

/// Checks an edge by testing states along it no further than `resolution` apart,
/// endpoints included.
pub fn check_edge_by_interpolation<const N: usize>(
    a: &[f64; N],
    b: &[f64; N],
    resolution: f64,
    is_state_valid: impl Fn(&[f64; N]) -> bool,
) -> bool {
    if !(resolution > 0.0) {
        return false;
    }
    let distance = euclidean_distance(a, b);
    let steps = (distance / resolution).ceil().max(1.0) as usize;
    (0..=steps).all(|step| is_state_valid(&interpolate(a, b, step as f64 / steps as f64)))
}

/// One RRT "extend" step: a single state at most `step_size` towards `to`, if the edge to it is
/// valid. Returns an empty batch when blocked or already at `to`.
pub fn extend_toward<const N: usize>(
    from: &[f64; N],
    to: &[f64; N],
    step_size: f64,
    is_edge_valid: impl Fn(&[f64; N], &[f64; N]) -> bool,
) -> Vec<PropagatedState<[f64; N]>> {
    if from == to || !(step_size > 0.0) {
        return Vec::new();
    }
    let next = steer(from, to, step_size);
    if next != *from && is_edge_valid(from, &next) {
        vec![PropagatedState::from_origin(next)]
    } else {
        Vec::new()
    }
}

/// The RRT-Connect extension: repeated steps of at most `step_size` towards `to` until it is
/// reached, a step makes no progress, or the next edge is invalid. Non-finite endpoints yield an
/// empty batch. Each state is chained to the previous one in the batch.
pub fn connect_toward<const N: usize>(
    from: &[f64; N],
    to: &[f64; N],
    step_size: f64,
    is_edge_valid: impl Fn(&[f64; N], &[f64; N]) -> bool,
) -> Vec<PropagatedState<[f64; N]>> {
    let mut batch: Vec<PropagatedState<[f64; N]>> = Vec::new();
    if !(step_size > 0.0) || !from.iter().chain(to).all(|v| v.is_finite()) {
        return batch;
    }
    let mut current = *from;
    while current != *to {
        let next = steer(&current, to, step_size);
        // A step below the float spacing at this magnitude makes no progress.
        if next == current || !is_edge_valid(&current, &next) {
            break;
        }
        let relative_parent_index = batch.len() as isize - 1;
        batch.push(PropagatedState::new(next, relative_parent_index));
        current = next;
    }
    batch
}
