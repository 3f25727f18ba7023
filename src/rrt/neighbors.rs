use crate::error::{checked_distance, PlanningError, PlanningResult};
use kiddo::float::{distance::SquaredEuclidean, kdtree::KdTree};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Smallest number of candidates handed to one rayon task during a parallel search.
const PARALLEL_MIN_CHUNK: usize = 64;

/// A nearest neighbor index over a growing set of states.
///
/// Indices are assigned in insertion order, starting at zero, so a planner can keep its
/// arena and its index in lockstep. Query results are ordered nearest first with ties
/// broken by the lowest index.
pub trait NearestNeighbors<T> {
    /// Adds a state to the index.
    ///
    /// Returns the index of the new state.
    fn insert(&mut self, state: T) -> usize;

    /// Returns the number of states in the index.
    fn len(&self) -> usize;

    /// Returns true if the index holds no states.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gets the nearest neighbor to the given state.
    ///
    /// Returns `PlanningError::EmptyIndex` if the index is empty.
    fn query_nearest(&self, state: &T) -> PlanningResult<usize> {
        self.query_k_nearest(state, 1)?
            .first()
            .copied()
            .ok_or(PlanningError::EmptyIndex)
    }

    /// Gets the k nearest neighbors to the given state, nearest first.
    ///
    /// Parameters:
    /// - `state`: The state to find the nearest neighbors to.
    /// - `k`: The number of neighbors to find. Fewer are returned if the index is smaller.
    fn query_k_nearest(&self, state: &T, k: usize) -> PlanningResult<Vec<usize>>;
}

/// Bounded best-k list, sorted by (distance, index).
#[derive(Clone, Debug)]
struct KBest {
    k: usize,
    entries: Vec<(f64, usize)>,
}

fn precedes(a: (f64, usize), b: (f64, usize)) -> bool {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)) == Ordering::Less
}

impl KBest {
    fn new(k: usize) -> Self {
        Self {
            k,
            entries: Vec::with_capacity(k.min(1024) + 1),
        }
    }

    fn offer(&mut self, distance: f64, index: usize) {
        let candidate = (distance, index);
        if self.entries.len() == self.k {
            match self.entries.last() {
                Some(&worst) if precedes(candidate, worst) => {}
                _ => return,
            }
        }
        let position = self.entries.partition_point(|&e| precedes(e, candidate));
        self.entries.insert(position, candidate);
        self.entries.truncate(self.k);
    }

    fn merge(mut self, other: KBest) -> KBest {
        for (distance, index) in other.entries {
            self.offer(distance, index);
        }
        self
    }
}

/// Linear k-nearest search over `len` candidates identified by index.
///
/// `distance_to(i)` returns the distance from candidate `i` to the query. In parallel mode the
/// candidates are split across rayon's pool, each partition keeps a local best-k and the partial
/// lists are merged by (distance, index), so both modes return identical results.
///
/// Returns `(index, distance)` pairs, nearest first.
pub fn linear_k_nearest<D>(
    len: usize,
    k: usize,
    distance_to: D,
    parallel: bool,
) -> PlanningResult<Vec<(usize, f64)>>
where
    D: Fn(usize) -> f64 + Sync,
{
    if len == 0 {
        return Err(PlanningError::EmptyIndex);
    }
    if k == 0 {
        return Err(PlanningError::Configuration(
            "k must be at least 1 for a nearest neighbor query".to_string(),
        ));
    }

    let best = if parallel && len > PARALLEL_MIN_CHUNK {
        (0..len)
            .into_par_iter()
            .with_min_len(PARALLEL_MIN_CHUNK)
            .try_fold(
                || KBest::new(k),
                |mut best, index| {
                    best.offer(checked_distance(distance_to(index))?, index);
                    Ok::<_, PlanningError>(best)
                },
            )
            .try_reduce(|| KBest::new(k), |a, b| Ok(a.merge(b)))?
    } else {
        let mut best = KBest::new(k);
        for index in 0..len {
            best.offer(checked_distance(distance_to(index))?, index);
        }
        best
    };

    Ok(best
        .entries
        .into_iter()
        .map(|(distance, index)| (index, distance))
        .collect())
}

/// A nearest neighbor index that uses a linear search with a caller-supplied distance function.
/// Works for any state type; distances are measured from the stored state to the query.
pub struct LinearNearestNeighbors<T, D> {
    states: Vec<T>,
    distance_fn: D,
    parallel: bool,
}

impl<T, D> LinearNearestNeighbors<T, D>
where
    D: Fn(&T, &T) -> f64,
{
    /// Constructs an empty, serial index.
    pub fn new(distance_fn: D) -> Self {
        Self {
            states: Vec::new(),
            distance_fn,
            parallel: false,
        }
    }

    /// Enables or disables the parallel search.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn states(&self) -> &[T] {
        &self.states
    }
}

impl<T, D> NearestNeighbors<T> for LinearNearestNeighbors<T, D>
where
    T: Sync,
    D: Fn(&T, &T) -> f64 + Sync,
{
    fn insert(&mut self, state: T) -> usize {
        self.states.push(state);
        self.states.len() - 1
    }

    fn len(&self) -> usize {
        self.states.len()
    }

    fn query_k_nearest(&self, state: &T, k: usize) -> PlanningResult<Vec<usize>> {
        let nearest = linear_k_nearest(
            self.states.len(),
            k,
            |i| (self.distance_fn)(&self.states[i], state),
            self.parallel,
        )?;
        Ok(nearest.into_iter().map(|(index, _)| index).collect())
    }
}

/// A k-d tree index for `[f64; N]` states under the Euclidean metric.
///
/// Only the first of several bitwise-identical states enters the k-d tree. Later copies are
/// kept beside it and merged into query results, so any number of coincident states can be
/// inserted.
pub struct KdTreeNearestNeighbors<const N: usize> {
    kdtree: KdTree<f64, usize, N, 32, u32>,
    first_at: HashMap<[u64; N], usize>,
    coincident: HashMap<usize, Vec<usize>>,
    len: usize,
}

impl<const N: usize> KdTreeNearestNeighbors<N> {
    pub fn new() -> Self {
        Self {
            kdtree: KdTree::new(),
            first_at: HashMap::new(),
            coincident: HashMap::new(),
            len: 0,
        }
    }
}

impl<const N: usize> Default for KdTreeNearestNeighbors<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Bit pattern of a state, with negative zero folded into zero.
fn point_key<const N: usize>(state: &[f64; N]) -> [u64; N] {
    state.map(|v| (v + 0.0).to_bits())
}

impl<const N: usize> NearestNeighbors<[f64; N]> for KdTreeNearestNeighbors<N> {
    fn insert(&mut self, state: [f64; N]) -> usize {
        let index = self.len;
        match self.first_at.entry(point_key(&state)) {
            Entry::Occupied(first) => {
                self.coincident.entry(*first.get()).or_default().push(index);
            }
            Entry::Vacant(slot) => {
                slot.insert(index);
                self.kdtree.add(&state, index);
            }
        }
        self.len += 1;
        index
    }

    fn len(&self) -> usize {
        self.len
    }

    fn query_k_nearest(&self, state: &[f64; N], k: usize) -> PlanningResult<Vec<usize>> {
        if self.len == 0 {
            return Err(PlanningError::EmptyIndex);
        }
        if k == 0 {
            return Err(PlanningError::Configuration(
                "k must be at least 1 for a nearest neighbor query".to_string(),
            ));
        }
        let mut nearest: Vec<(f64, usize)> = self
            .kdtree
            .nearest_n::<SquaredEuclidean>(state, k)
            .iter()
            .flat_map(|n| {
                let copies = self.coincident.get(&n.item).map(Vec::as_slice).unwrap_or(&[]);
                std::iter::once(n.item)
                    .chain(copies.iter().copied())
                    .map(move |index| (n.distance, index))
            })
            .collect();
        // kiddo does not order equidistant results by item.
        nearest.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        nearest.truncate(k);
        Ok(nearest.into_iter().map(|(_, index)| index).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::euclidean::euclidean_distance;

    fn grid_states() -> Vec<[f64; 2]> {
        let mut states = Vec::new();
        for x in 0..20 {
            for y in 0..20 {
                states.push([x as f64, y as f64]);
            }
        }
        states
    }

    #[test]
    fn empty_index_signals_error() {
        let index = LinearNearestNeighbors::new(euclidean_distance::<2>);
        assert!(matches!(
            index.query_nearest(&[0.0, 0.0]),
            Err(PlanningError::EmptyIndex)
        ));
        let kd = KdTreeNearestNeighbors::<2>::new();
        assert!(matches!(
            kd.query_k_nearest(&[0.0, 0.0], 3),
            Err(PlanningError::EmptyIndex)
        ));
    }

    #[test]
    fn ties_break_by_lowest_index() {
        let mut index = LinearNearestNeighbors::new(euclidean_distance::<2>);
        index.insert([1.0, 0.0]);
        index.insert([-1.0, 0.0]);
        index.insert([0.0, 1.0]);
        assert_eq!(index.query_nearest(&[0.0, 0.0]).unwrap(), 0);
        assert_eq!(
            index.query_k_nearest(&[0.0, 0.0], 2).unwrap(),
            vec![0, 1]
        );
    }

    #[test]
    fn parallel_search_matches_serial_search() {
        let mut serial = LinearNearestNeighbors::new(euclidean_distance::<2>);
        let mut parallel = LinearNearestNeighbors::new(euclidean_distance::<2>).with_parallel(true);
        for state in grid_states() {
            serial.insert(state);
            parallel.insert(state);
        }
        for query in [[3.5, 3.5], [0.0, 0.0], [19.2, 7.7], [10.0, 10.5]] {
            assert_eq!(
                serial.query_k_nearest(&query, 7).unwrap(),
                parallel.query_k_nearest(&query, 7).unwrap()
            );
        }
    }

    #[test]
    fn kdtree_agrees_with_linear_search() {
        let mut linear = LinearNearestNeighbors::new(euclidean_distance::<2>);
        let mut kd = KdTreeNearestNeighbors::<2>::new();
        for state in grid_states() {
            linear.insert(state);
            kd.insert(state);
        }
        for query in [[3.5, 3.5], [0.1, 0.2], [19.2, 7.7]] {
            assert_eq!(
                linear.query_k_nearest(&query, 4).unwrap(),
                kd.query_k_nearest(&query, 4).unwrap()
            );
        }
    }

    #[test]
    fn kdtree_accepts_many_identical_states() {
        let mut kd = KdTreeNearestNeighbors::<2>::new();
        for expected in 0..40 {
            assert_eq!(kd.insert([1.0, 1.0]), expected);
        }
        kd.insert([-0.0, 3.0]);
        kd.insert([0.0, 3.0]);
        assert_eq!(kd.len(), 42);
        assert_eq!(kd.query_nearest(&[1.2, 1.0]).unwrap(), 0);
        assert_eq!(
            kd.query_k_nearest(&[1.0, 1.1], 5).unwrap(),
            vec![0, 1, 2, 3, 4]
        );
        let all = kd.query_k_nearest(&[0.0, 3.0], 42).unwrap();
        assert_eq!(&all[..2], &[40, 41]);
        assert_eq!(all.len(), 42);
        assert_eq!(all[2..].to_vec(), (0..40).collect::<Vec<_>>());
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        let mut index = LinearNearestNeighbors::new(euclidean_distance::<2>);
        index.insert([0.0, 0.0]);
        index.insert([5.0, 0.0]);
        assert_eq!(index.query_k_nearest(&[4.0, 0.0], 10).unwrap(), vec![1, 0]);
    }

    #[test]
    fn nan_distance_is_a_callback_error() {
        let mut index = LinearNearestNeighbors::new(|_: &f64, _: &f64| f64::NAN);
        index.insert(1.0);
        assert!(matches!(
            index.query_nearest(&0.0),
            Err(PlanningError::Callback(_))
        ));
    }
}
