use crate::error::{checked_distance, CallbackResult, PlanningResult};
use crate::prm::config::{EdgeValidation, RoadmapConfig};
use crate::prm::roadmap::{EdgeInfo, RoadmapGraph};
use crate::rrt::neighbors::linear_k_nearest;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Read access to node states, shared by the roadmap and the query overlay so both connect new
/// states the same way.
pub(crate) trait RoadmapView<T> {
    fn len(&self) -> usize;

    /// Panics if `index` is out of range; callers only pass indices below `len()`.
    fn state(&self, index: usize) -> &T;
}

impl<T> RoadmapView<T> for RoadmapGraph<T> {
    fn len(&self) -> usize {
        RoadmapGraph::len(self)
    }

    fn state(&self, index: usize) -> &T {
        self.nodes()[index].state()
    }
}

/// How a new state attaches to a roadmap.
#[derive(Debug)]
pub(crate) enum Connection {
    /// The state duplicates an existing node.
    Duplicate(usize),
    New {
        /// Edges from the new node, as `(neighbor, edge)`.
        outgoing: Vec<(usize, EdgeInfo)>,
        /// Edges into the new node, as `(neighbor, edge)`.
        incoming: Vec<(usize, EdgeInfo)>,
        edge_checks: usize,
    },
}

struct CandidateEdges {
    neighbor: usize,
    outgoing: Option<EdgeInfo>,
    incoming: Option<EdgeInfo>,
    edge_checks: usize,
}

/// Finds the k nearest nodes of `view` and decides which edges connect `state` to them.
pub(crate) fn plan_connection<T, V, D, E>(
    view: &V,
    state: &T,
    distance_fn: &D,
    edge_validity_fn: &E,
    config: &RoadmapConfig,
) -> PlanningResult<Connection>
where
    T: Sync,
    V: RoadmapView<T> + Sync,
    D: Fn(&T, &T) -> f64 + Sync,
    E: Fn(&T, &T) -> bool + Sync,
{
    if view.len() == 0 {
        return Ok(Connection::New {
            outgoing: Vec::new(),
            incoming: Vec::new(),
            edge_checks: 0,
        });
    }

    let nearest = linear_k_nearest(
        view.len(),
        config.k,
        |index| distance_fn(view.state(index), state),
        config.parallel,
    )?;
    if !config.allow_duplicates {
        if let Some(&(index, distance)) = nearest.first() {
            if distance <= config.duplicate_tolerance {
                return Ok(Connection::Duplicate(index));
            }
        }
    }

    let decide = |&(neighbor, _): &(usize, f64)| -> PlanningResult<CandidateEdges> {
        let other = view.state(neighbor);
        match config.edge_validation {
            EdgeValidation::Deferred => {
                let out_weight = checked_distance(distance_fn(state, other))?;
                let in_weight = if config.symmetric {
                    out_weight
                } else {
                    checked_distance(distance_fn(other, state))?
                };
                Ok(CandidateEdges {
                    neighbor,
                    outgoing: Some(EdgeInfo::unvalidated(out_weight)),
                    incoming: Some(EdgeInfo::unvalidated(in_weight)),
                    edge_checks: 0,
                })
            }
            EdgeValidation::Eager => {
                let outgoing = if edge_validity_fn(state, other) {
                    Some(EdgeInfo::validated(checked_distance(distance_fn(
                        state, other,
                    ))?))
                } else {
                    None
                };
                if config.symmetric {
                    return Ok(CandidateEdges {
                        neighbor,
                        outgoing,
                        incoming: outgoing,
                        edge_checks: 1,
                    });
                }
                let incoming = if edge_validity_fn(other, state) {
                    Some(EdgeInfo::validated(checked_distance(distance_fn(
                        other, state,
                    ))?))
                } else {
                    None
                };
                Ok(CandidateEdges {
                    neighbor,
                    outgoing,
                    incoming,
                    edge_checks: 2,
                })
            }
        }
    };

    let candidates: Vec<CandidateEdges> = if config.parallel {
        nearest.par_iter().map(decide).collect::<PlanningResult<_>>()?
    } else {
        nearest.iter().map(decide).collect::<PlanningResult<_>>()?
    };

    let mut outgoing = Vec::with_capacity(candidates.len());
    let mut incoming = Vec::with_capacity(candidates.len());
    let mut edge_checks = 0;
    for candidate in candidates {
        edge_checks += candidate.edge_checks;
        if let Some(edge) = candidate.outgoing {
            outgoing.push((candidate.neighbor, edge));
        }
        if let Some(edge) = candidate.incoming {
            incoming.push((candidate.neighbor, edge));
        }
    }
    Ok(Connection::New {
        outgoing,
        incoming,
        edge_checks,
    })
}

/// Statistics of one `grow_roadmap` call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GrowStatistics {
    pub samples_drawn: usize,
    pub invalid_samples: usize,
    pub duplicate_samples: usize,
    pub nodes_added: usize,
    pub edges_added: usize,
    pub edge_checks: usize,
    pub elapsed: Duration,
}

/// Grows a roadmap by sampling until `termination_fn` returns true.
///
/// Parameters:
/// - `roadmap`: The roadmap to grow. It may already contain nodes.
/// - `sampling_fn`: Draws the next candidate state.
/// - `distance_fn`: Distance (and edge weight) from the first state to the second.
/// - `state_validity_fn`: Rejects invalid samples before any neighbor search.
/// - `edge_validity_fn`: Validity of the directed edge from the first state to the second.
/// - `termination_fn`: Called with the current roadmap size before every sample.
/// - `config`: Connection settings.
pub fn grow_roadmap<T, S, D, V, E, F>(
    roadmap: &mut RoadmapGraph<T>,
    mut sampling_fn: S,
    distance_fn: D,
    state_validity_fn: V,
    edge_validity_fn: E,
    mut termination_fn: F,
    config: &RoadmapConfig,
) -> PlanningResult<GrowStatistics>
where
    T: Sync,
    S: FnMut() -> CallbackResult<T>,
    D: Fn(&T, &T) -> f64 + Sync,
    V: Fn(&T) -> bool,
    E: Fn(&T, &T) -> bool + Sync,
    F: FnMut(usize) -> bool,
{
    config.validate()?;
    let start_time = Instant::now();
    let mut statistics = GrowStatistics::default();

    while !termination_fn(roadmap.len()) {
        let sample = sampling_fn()?;
        statistics.samples_drawn += 1;
        if !state_validity_fn(&sample) {
            statistics.invalid_samples += 1;
            continue;
        }
        match plan_connection(&*roadmap, &sample, &distance_fn, &edge_validity_fn, config)? {
            Connection::Duplicate(existing) => {
                trace!("Discarding sample duplicating roadmap node {}", existing);
                statistics.duplicate_samples += 1;
            }
            Connection::New {
                outgoing,
                incoming,
                edge_checks,
            } => {
                statistics.edge_checks += edge_checks;
                statistics.edges_added += outgoing.len() + incoming.len();
                let index = insert_connected(roadmap, sample, outgoing, incoming)?;
                statistics.nodes_added += 1;
                trace!("Added roadmap node {}", index);
            }
        }
    }

    statistics.elapsed = start_time.elapsed();
    debug!(
        "Grew roadmap to {} nodes ({} added, {} samples, {} edge checks) in {:?}",
        roadmap.len(),
        statistics.nodes_added,
        statistics.samples_drawn,
        statistics.edge_checks,
        statistics.elapsed
    );
    Ok(statistics)
}

fn insert_connected<T>(
    roadmap: &mut RoadmapGraph<T>,
    state: T,
    outgoing: Vec<(usize, EdgeInfo)>,
    incoming: Vec<(usize, EdgeInfo)>,
) -> PlanningResult<usize> {
    let index = roadmap.add_node(state);
    for (neighbor, edge) in outgoing {
        roadmap.add_edge(index, neighbor, edge)?;
    }
    for (neighbor, edge) in incoming {
        roadmap.add_edge(neighbor, index, edge)?;
    }
    Ok(index)
}

/// Statistics of one `update_roadmap_edges` call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeUpdateStatistics {
    pub edges_checked: usize,
    pub edges_removed: usize,
    pub edges_retained: usize,
    pub elapsed: Duration,
}

/// Re-validates every directed edge of the roadmap, e.g. after the environment changed.
///
/// Invalid edges are removed; surviving edges get a fresh weight and are marked validated. Nodes
/// are never added or removed. With `parallel`, the checks run on rayon's pool and the roadmap is
/// updated afterwards.
pub fn update_roadmap_edges<T, E, D>(
    roadmap: &mut RoadmapGraph<T>,
    edge_validity_fn: E,
    distance_fn: D,
    parallel: bool,
) -> PlanningResult<EdgeUpdateStatistics>
where
    T: Sync,
    E: Fn(&T, &T) -> bool + Sync,
    D: Fn(&T, &T) -> f64 + Sync,
{
    let start_time = Instant::now();

    let recheck = |index: usize| -> PlanningResult<Vec<(usize, Option<f64>)>> {
        let nodes = roadmap.nodes();
        let state = nodes[index].state();
        nodes[index]
            .edges()
            .keys()
            .map(|&neighbor| {
                let other = nodes[neighbor].state();
                if edge_validity_fn(state, other) {
                    Ok((neighbor, Some(checked_distance(distance_fn(state, other))?)))
                } else {
                    Ok((neighbor, None))
                }
            })
            .collect()
    };
    let decisions: Vec<Vec<(usize, Option<f64>)>> = if parallel {
        (0..roadmap.len())
            .into_par_iter()
            .map(recheck)
            .collect::<PlanningResult<_>>()?
    } else {
        (0..roadmap.len())
            .map(recheck)
            .collect::<PlanningResult<_>>()?
    };

    let mut statistics = EdgeUpdateStatistics::default();
    for (node, node_decisions) in roadmap.nodes_mut().iter_mut().zip(decisions) {
        let edges = node.edges_mut();
        for (neighbor, weight) in node_decisions {
            statistics.edges_checked += 1;
            match weight {
                Some(weight) => {
                    edges.insert(neighbor, EdgeInfo::validated(weight));
                    statistics.edges_retained += 1;
                }
                None => {
                    edges.remove(&neighbor);
                    statistics.edges_removed += 1;
                }
            }
        }
    }

    statistics.elapsed = start_time.elapsed();
    debug!(
        "Updated roadmap edges: {} checked, {} removed in {:?}",
        statistics.edges_checked, statistics.edges_removed, statistics.elapsed
    );
    Ok(statistics)
}

/// Returns a compacted copy of `roadmap` without `indices_to_remove`.
/// See [`RoadmapGraph::make_pruned_copy`].
pub fn make_pruned_copy<T: Clone + Send + Sync>(
    roadmap: &RoadmapGraph<T>,
    indices_to_remove: &[usize],
    parallel: bool,
) -> PlanningResult<RoadmapGraph<T>> {
    let pruned = roadmap.make_pruned_copy(indices_to_remove, parallel)?;
    debug!(
        "Pruned roadmap from {} to {} nodes",
        roadmap.len(),
        pruned.len()
    );
    Ok(pruned)
}

/// See [`RoadmapGraph::check_graph_linkage`].
pub fn check_graph_linkage<T>(roadmap: &RoadmapGraph<T>, symmetric: bool) -> bool {
    roadmap.check_graph_linkage(symmetric)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CallbackError, PlanningError};
    use crate::euclidean::euclidean_distance;
    use std::cell::Cell;

    fn line_sampler(values: Vec<f64>) -> impl FnMut() -> CallbackResult<[f64; 1]> {
        let mut values = values.into_iter();
        move || {
            values
                .next()
                .map(|value| [value])
                .ok_or_else(|| CallbackError::from("out of samples"))
        }
    }

    fn grow_line(values: Vec<f64>, config: &RoadmapConfig) -> (RoadmapGraph<[f64; 1]>, GrowStatistics) {
        let target = values.len();
        let mut roadmap = RoadmapGraph::new();
        let drawn = Cell::new(0);
        let mut sampler = line_sampler(values);
        let statistics = grow_roadmap(
            &mut roadmap,
            || {
                drawn.set(drawn.get() + 1);
                sampler()
            },
            euclidean_distance::<1>,
            |_| true,
            |_, _| true,
            |_| drawn.get() >= target,
            config,
        )
        .unwrap();
        (roadmap, statistics)
    }

    #[test]
    fn grown_roadmap_links_k_nearest_both_ways() {
        let config = RoadmapConfig::new(2);
        let (roadmap, statistics) = grow_line(vec![0.0, 1.0, 2.0, 3.0], &config);
        assert_eq!(roadmap.len(), 4);
        assert_eq!(statistics.nodes_added, 4);
        assert!(roadmap.check_graph_linkage(true));
        // Node 3 connects to its two nearest, 2 and 1.
        assert_eq!(
            roadmap.nodes()[3].edges().keys().copied().collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(roadmap.edge(3, 1).map(|e| e.weight), Some(2.0));
        // One check per symmetric candidate: 0 + 1 + 2 + 2.
        assert_eq!(statistics.edge_checks, 5);
    }

    #[test]
    fn exact_duplicates_are_discarded() {
        let config = RoadmapConfig::new(3);
        let (roadmap, statistics) = grow_line(vec![0.0, 1.0, 1.0, 2.0], &config);
        assert_eq!(roadmap.len(), 3);
        assert_eq!(statistics.duplicate_samples, 1);

        let (roadmap, _) = grow_line(vec![0.0, 1.0, 1.0, 2.0], &config.with_allow_duplicates(true));
        assert_eq!(roadmap.len(), 4);
    }

    #[test]
    fn duplicate_tolerance_widens_the_match() {
        let config = RoadmapConfig::new(3).with_duplicate_tolerance(0.25);
        let (roadmap, statistics) = grow_line(vec![0.0, 0.2, 1.0], &config);
        assert_eq!(roadmap.len(), 2);
        assert_eq!(statistics.duplicate_samples, 1);
    }

    #[test]
    fn asymmetric_validity_keeps_one_direction() {
        let mut roadmap = RoadmapGraph::new();
        let mut samples = line_sampler(vec![0.0, 1.0]);
        // Only "uphill" edges are valid.
        grow_roadmap(
            &mut roadmap,
            &mut samples,
            euclidean_distance::<1>,
            |_| true,
            |a: &[f64; 1], b: &[f64; 1]| b[0] > a[0],
            |size| size == 2,
            &RoadmapConfig::new(1).with_symmetric(false),
        )
        .unwrap();
        assert!(roadmap.edge(0, 1).is_some());
        assert!(roadmap.edge(1, 0).is_none());
        assert!(roadmap.check_graph_linkage(false));
        assert!(!roadmap.check_graph_linkage(true));
    }

    #[test]
    fn deferred_edges_are_validated_by_update() {
        let config = RoadmapConfig::new(3).with_edge_validation(EdgeValidation::Deferred);
        let (mut roadmap, statistics) = grow_line(vec![0.0, 1.0, 2.0, 3.0], &config);
        assert_eq!(statistics.edge_checks, 0);
        assert!(roadmap
            .nodes()
            .iter()
            .flat_map(|node| node.edges().values())
            .all(|edge| !edge.validated));

        // A wall at 1.5 cuts every edge crossing it.
        let wall = |a: &[f64; 1], b: &[f64; 1]| (a[0] - 1.5) * (b[0] - 1.5) > 0.0;
        let update = update_roadmap_edges(&mut roadmap, wall, euclidean_distance::<1>, true).unwrap();
        assert_eq!(update.edges_checked, 12);
        assert_eq!(update.edges_removed, 8);
        assert_eq!(roadmap.len(), 4);
        assert!(roadmap.check_graph_linkage(true));
        assert!(roadmap
            .nodes()
            .iter()
            .flat_map(|node| node.edges().values())
            .all(|edge| edge.validated));
    }

    #[test]
    fn parallel_growth_matches_serial_growth() {
        let values: Vec<f64> = (0..200).map(|i| ((i * 37) % 200) as f64 * 0.1).collect();
        let (serial, _) = grow_line(values.clone(), &RoadmapConfig::new(6));
        let (parallel, _) = grow_line(values, &RoadmapConfig::new(6).with_parallel(true));
        assert_eq!(serial.len(), parallel.len());
        for (a, b) in serial.nodes().iter().zip(parallel.nodes()) {
            assert_eq!(a.state(), b.state());
            assert_eq!(a.edges(), b.edges());
        }
    }

    #[test]
    fn sampling_errors_abort_growth() {
        let mut roadmap = RoadmapGraph::new();
        let result = grow_roadmap(
            &mut roadmap,
            line_sampler(vec![0.0]),
            euclidean_distance::<1>,
            |_| true,
            |_, _| true,
            |_| false,
            &RoadmapConfig::new(2),
        );
        assert!(matches!(result, Err(PlanningError::Callback(_))));
        assert_eq!(roadmap.len(), 1);
    }

    #[test]
    fn invalid_samples_are_skipped() {
        let mut roadmap = RoadmapGraph::new();
        let statistics = grow_roadmap(
            &mut roadmap,
            line_sampler(vec![0.0, -1.0, 1.0]),
            euclidean_distance::<1>,
            |s: &[f64; 1]| s[0] >= 0.0,
            |_, _| true,
            |size| size == 2,
            &RoadmapConfig::new(2),
        )
        .unwrap();
        assert_eq!(statistics.samples_drawn, 3);
        assert_eq!(statistics.invalid_samples, 1);
        assert_eq!(roadmap.len(), 2);
    }
}
