use crate::error::{checked_distance, CallbackError, PlanningError, PlanningResult};
use crate::prm::builder::{plan_connection, Connection, RoadmapView};
use crate::prm::config::{EdgeValidation, QueryConfig, RoadmapConfig};
use crate::prm::roadmap::{EdgeInfo, RoadmapGraph};
use crate::rrt::result::PlanStatus;
use crate::util::ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Which A* variant answers a roadmap query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStrategy {
    /// Unvalidated edges are checked as soon as the search relaxes them.
    Eager,
    /// Unvalidated edges are assumed valid and only checked along candidate paths.
    Lazy,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStatistics {
    /// Nodes closed by A*, summed over all search rounds.
    pub expansions: usize,
    pub max_open_set_size: usize,
    /// Calls made to `edge_validity_fn`, including the ones connecting starts and goals.
    pub edge_checks: usize,
    /// Number of A* searches run (always 1 for eager queries).
    pub search_rounds: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryResult<T> {
    /// States from a start to a goal; empty unless `status` is `Solved`.
    pub path: Vec<T>,
    /// Sum of edge weights along `path`, `+inf` without a path.
    pub path_cost: f64,
    pub status: PlanStatus,
    pub statistics: QueryStatistics,
}

impl<T> QueryResult<T> {
    fn no_path_found(statistics: QueryStatistics) -> Self {
        Self {
            path: Vec::new(),
            path_cost: f64::INFINITY,
            status: PlanStatus::NoPathFound,
            statistics,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Converts the result into its path, turning `NoPathFound` into an error.
    pub fn into_path(self) -> PlanningResult<Vec<T>> {
        match self.status {
            PlanStatus::Solved => Ok(self.path),
            PlanStatus::NoPathFound => Err(PlanningError::NoPathFound),
        }
    }
}

/// A query-local view of a roadmap with starts and goals attached.
///
/// Overlay nodes are numbered after the roadmap's nodes. The roadmap itself is only borrowed.
struct RoadmapOverlay<'r, T> {
    roadmap: &'r RoadmapGraph<T>,
    states: Vec<T>,
    /// Extra outgoing edges, for roadmap and overlay nodes alike.
    edges: HashMap<usize, BTreeMap<usize, EdgeInfo>>,
}

impl<'r, T> RoadmapView<T> for RoadmapOverlay<'r, T> {
    fn len(&self) -> usize {
        self.roadmap.len() + self.states.len()
    }

    fn state(&self, index: usize) -> &T {
        match index.checked_sub(self.roadmap.len()) {
            Some(overlay_index) => &self.states[overlay_index],
            None => self.roadmap.nodes()[index].state(),
        }
    }
}

impl<'r, T> RoadmapOverlay<'r, T> {
    fn new(roadmap: &'r RoadmapGraph<T>) -> Self {
        Self {
            roadmap,
            states: Vec::new(),
            edges: HashMap::new(),
        }
    }

    fn add_node(
        &mut self,
        state: T,
        outgoing: Vec<(usize, EdgeInfo)>,
        incoming: Vec<(usize, EdgeInfo)>,
    ) -> usize {
        let index = self.len();
        self.states.push(state);
        self.edges.entry(index).or_default().extend(outgoing);
        for (neighbor, edge) in incoming {
            self.edges.entry(neighbor).or_default().insert(index, edge);
        }
        index
    }

    fn edges(&self, index: usize) -> impl Iterator<Item = (usize, &EdgeInfo)> + '_ {
        let stored = self.roadmap.nodes().get(index).map(|node| node.edges().iter());
        let extra = self.edges.get(&index).map(|edges| edges.iter());
        stored
            .into_iter()
            .flatten()
            .chain(extra.into_iter().flatten())
            .map(|(neighbor, edge)| (*neighbor, edge))
    }

    fn edge(&self, from: usize, to: usize) -> Option<&EdgeInfo> {
        self.roadmap
            .edge(from, to)
            .or_else(|| self.edges.get(&from).and_then(|edges| edges.get(&to)))
    }
}

/// Per-query outcomes of `edge_validity_fn` on unvalidated edges.
struct EdgeCheckCache {
    symmetric: bool,
    results: HashMap<(usize, usize), bool>,
}

impl EdgeCheckCache {
    fn new(symmetric: bool) -> Self {
        Self {
            symmetric,
            results: HashMap::new(),
        }
    }

    fn key(&self, from: usize, to: usize) -> (usize, usize) {
        if self.symmetric {
            (from.min(to), from.max(to))
        } else {
            (from, to)
        }
    }

    fn known(&self, from: usize, to: usize) -> Option<bool> {
        self.results.get(&self.key(from, to)).copied()
    }

    fn record(&mut self, from: usize, to: usize, valid: bool) {
        let key = self.key(from, to);
        self.results.insert(key, valid);
    }
}

/// Open set entry, ordered by (f, g, node) with the smallest first.
type OpenEntry = Reverse<(OrderedFloat<f64>, OrderedFloat<f64>, usize, Option<usize>)>;

fn open_entry(f: f64, g: f64, node: usize, parent: Option<usize>) -> PlanningResult<OpenEntry> {
    let f = OrderedFloat::new(f).ok_or_else(|| CallbackError::from("path cost became NaN"))?;
    let g = OrderedFloat::new(g).ok_or_else(|| CallbackError::from("path cost became NaN"))?;
    Ok(Reverse((f, g, node, parent)))
}

struct SearchOutcome {
    nodes: Vec<usize>,
    cost: f64,
}

/// Multi-source, multi-goal A* over the overlay.
///
/// With `check_unvalidated`, unvalidated edges are checked (and cached) when relaxed; otherwise
/// they are assumed valid unless the cache already knows them to be invalid.
#[allow(clippy::too_many_arguments)]
fn astar<T, D, E>(
    overlay: &RoadmapOverlay<'_, T>,
    starts: &[usize],
    goals: &[usize],
    distance_fn: &D,
    edge_validity_fn: &E,
    check_unvalidated: bool,
    limit_pqueue_duplicates: bool,
    cache: &mut EdgeCheckCache,
    statistics: &mut QueryStatistics,
) -> PlanningResult<Option<SearchOutcome>>
where
    D: Fn(&T, &T) -> f64,
    E: Fn(&T, &T) -> bool,
{
    statistics.search_rounds += 1;
    let size = overlay.len();
    let mut heuristic: Vec<Option<f64>> = vec![None; size];
    let mut estimate = |node: usize| -> PlanningResult<f64> {
        if let Some(h) = heuristic[node] {
            return Ok(h);
        }
        let state = overlay.state(node);
        let mut h = f64::INFINITY;
        for &goal in goals {
            h = h.min(checked_distance(distance_fn(state, overlay.state(goal)))?);
        }
        heuristic[node] = Some(h);
        Ok(h)
    };

    let mut is_goal = vec![false; size];
    for &goal in goals {
        is_goal[goal] = true;
    }
    let mut closed: Vec<Option<(f64, Option<usize>)>> = vec![None; size];
    let mut best_pending = vec![f64::INFINITY; size];
    let mut open: BinaryHeap<OpenEntry> = BinaryHeap::new();
    for &start in starts {
        if best_pending[start] > 0.0 {
            best_pending[start] = 0.0;
            open.push(open_entry(estimate(start)?, 0.0, start, None)?);
        }
    }
    statistics.max_open_set_size = statistics.max_open_set_size.max(open.len());

    while let Some(Reverse((_, g, node, parent))) = open.pop() {
        if closed[node].is_some() {
            continue;
        }
        let g = g.value();
        closed[node] = Some((g, parent));
        statistics.expansions += 1;

        if is_goal[node] {
            let mut nodes = vec![node];
            let mut current = parent;
            while let Some(index) = current {
                nodes.push(index);
                current = closed[index].and_then(|(_, parent)| parent);
            }
            nodes.reverse();
            return Ok(Some(SearchOutcome { nodes, cost: g }));
        }

        for (neighbor, edge) in overlay.edges(node) {
            if closed[neighbor].is_some() {
                continue;
            }
            if !edge.validated {
                match cache.known(node, neighbor) {
                    Some(false) => continue,
                    Some(true) => {}
                    None if check_unvalidated => {
                        let valid =
                            edge_validity_fn(overlay.state(node), overlay.state(neighbor));
                        statistics.edge_checks += 1;
                        cache.record(node, neighbor, valid);
                        if !valid {
                            continue;
                        }
                    }
                    None => {}
                }
            }
            let tentative = g + edge.weight;
            if limit_pqueue_duplicates {
                if best_pending[neighbor] <= tentative {
                    continue;
                }
                best_pending[neighbor] = tentative;
            }
            open.push(open_entry(
                tentative + estimate(neighbor)?,
                tentative,
                neighbor,
                Some(node),
            )?);
        }
        statistics.max_open_set_size = statistics.max_open_set_size.max(open.len());
    }
    Ok(None)
}

/// Attaches starts, then goals, to the overlay. Returns their overlay indices.
fn connect_endpoints<T, D, E>(
    overlay: &mut RoadmapOverlay<'_, T>,
    endpoints: &[T],
    distance_fn: &D,
    edge_validity_fn: &E,
    config: &RoadmapConfig,
    statistics: &mut QueryStatistics,
) -> PlanningResult<Vec<usize>>
where
    T: Clone + Sync,
    D: Fn(&T, &T) -> f64 + Sync,
    E: Fn(&T, &T) -> bool + Sync,
{
    let mut indices = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let index = match plan_connection(&*overlay, endpoint, distance_fn, edge_validity_fn, config)? {
            Connection::Duplicate(existing) => existing,
            Connection::New {
                outgoing,
                incoming,
                edge_checks,
            } => {
                statistics.edge_checks += edge_checks;
                overlay.add_node(endpoint.clone(), outgoing, incoming)
            }
        };
        indices.push(index);
    }
    Ok(indices)
}

fn run_query<T, D, E>(
    starts: &[T],
    goals: &[T],
    roadmap: &RoadmapGraph<T>,
    distance_fn: D,
    edge_validity_fn: E,
    config: &QueryConfig,
    strategy: QueryStrategy,
) -> PlanningResult<QueryResult<T>>
where
    T: Clone + Sync,
    D: Fn(&T, &T) -> f64 + Sync,
    E: Fn(&T, &T) -> bool + Sync,
{
    config.validate()?;
    if starts.is_empty() || goals.is_empty() {
        return Err(PlanningError::Configuration(
            "a roadmap query needs at least one start and one goal".to_string(),
        ));
    }
    if config.roadmap.k > roadmap.len() {
        warn!(
            "Query k = {} exceeds the roadmap size {}",
            config.roadmap.k,
            roadmap.len()
        );
    }

    let start_time = Instant::now();
    let mut statistics = QueryStatistics::default();
    let mut connection = config.roadmap.clone();
    if strategy == QueryStrategy::Lazy {
        connection.edge_validation = EdgeValidation::Deferred;
    }

    let mut overlay = RoadmapOverlay::new(roadmap);
    let start_indices = connect_endpoints(
        &mut overlay,
        starts,
        &distance_fn,
        &edge_validity_fn,
        &connection,
        &mut statistics,
    )?;
    let goal_indices = connect_endpoints(
        &mut overlay,
        goals,
        &distance_fn,
        &edge_validity_fn,
        &connection,
        &mut statistics,
    )?;

    let mut cache = EdgeCheckCache::new(config.roadmap.symmetric);
    let outcome = match strategy {
        QueryStrategy::Eager => astar(
            &overlay,
            &start_indices,
            &goal_indices,
            &distance_fn,
            &edge_validity_fn,
            true,
            config.limit_astar_pqueue_duplicates,
            &mut cache,
            &mut statistics,
        )?,
        QueryStrategy::Lazy => loop {
            let candidate = match astar(
                &overlay,
                &start_indices,
                &goal_indices,
                &distance_fn,
                &edge_validity_fn,
                false,
                config.limit_astar_pqueue_duplicates,
                &mut cache,
                &mut statistics,
            )? {
                Some(candidate) => candidate,
                None => break None,
            };
            let mut path_valid = true;
            for pair in candidate.nodes.windows(2) {
                let (from, to) = (pair[0], pair[1]);
                let unvalidated = overlay.edge(from, to).map_or(false, |edge| !edge.validated);
                if !unvalidated || cache.known(from, to).is_some() {
                    continue;
                }
                let valid = edge_validity_fn(overlay.state(from), overlay.state(to));
                statistics.edge_checks += 1;
                cache.record(from, to, valid);
                if !valid {
                    trace!("Lazy query rejected edge {} -> {}", from, to);
                    path_valid = false;
                }
            }
            if path_valid {
                break Some(candidate);
            }
        },
    };

    statistics.elapsed = start_time.elapsed();
    let result = match outcome {
        Some(outcome) => QueryResult {
            path: outcome
                .nodes
                .iter()
                .map(|&index| overlay.state(index).clone())
                .collect(),
            path_cost: outcome.cost,
            status: PlanStatus::Solved,
            statistics,
        },
        None => QueryResult::no_path_found(statistics),
    };
    debug!(
        "{:?} roadmap query: {} with cost {} after {} expansions, {} edge checks, {} rounds",
        strategy,
        result.status,
        result.path_cost,
        result.statistics.expansions,
        result.statistics.edge_checks,
        result.statistics.search_rounds
    );
    Ok(result)
}

/// Finds the cheapest path from any start to any goal through the roadmap.
///
/// Starts and goals are connected to the roadmap in a query-local overlay; `roadmap` is never
/// modified. Unvalidated edges are checked with `edge_validity_fn` when the search first relaxes
/// them.
///
/// Parameters:
/// - `starts`, `goals`: At least one of each.
/// - `roadmap`: The roadmap to search.
/// - `distance_fn`: Edge weight for new edges and the A* heuristic (distance to the nearest goal).
/// - `edge_validity_fn`: Validity of the directed edge from the first state to the second.
/// - `config`: Connection and search settings.
pub fn query_path<T, D, E>(
    starts: &[T],
    goals: &[T],
    roadmap: &RoadmapGraph<T>,
    distance_fn: D,
    edge_validity_fn: E,
    config: &QueryConfig,
) -> PlanningResult<QueryResult<T>>
where
    T: Clone + Sync,
    D: Fn(&T, &T) -> f64 + Sync,
    E: Fn(&T, &T) -> bool + Sync,
{
    run_query(
        starts,
        goals,
        roadmap,
        distance_fn,
        edge_validity_fn,
        config,
        QueryStrategy::Eager,
    )
}

/// Same contract as [`query_path`], but unvalidated edges, including the ones attaching starts
/// and goals, are only checked along candidate paths. A failing edge is excluded for the rest of
/// the query and the search is repeated.
pub fn lazy_query_path<T, D, E>(
    starts: &[T],
    goals: &[T],
    roadmap: &RoadmapGraph<T>,
    distance_fn: D,
    edge_validity_fn: E,
    config: &QueryConfig,
) -> PlanningResult<QueryResult<T>>
where
    T: Clone + Sync,
    D: Fn(&T, &T) -> f64 + Sync,
    E: Fn(&T, &T) -> bool + Sync,
{
    run_query(
        starts,
        goals,
        roadmap,
        distance_fn,
        edge_validity_fn,
        config,
        QueryStrategy::Lazy,
    )
}

pub fn query_path_with_strategy<T, D, E>(
    strategy: QueryStrategy,
    starts: &[T],
    goals: &[T],
    roadmap: &RoadmapGraph<T>,
    distance_fn: D,
    edge_validity_fn: E,
    config: &QueryConfig,
) -> PlanningResult<QueryResult<T>>
where
    T: Clone + Sync,
    D: Fn(&T, &T) -> f64 + Sync,
    E: Fn(&T, &T) -> bool + Sync,
{
    run_query(
        starts,
        goals,
        roadmap,
        distance_fn,
        edge_validity_fn,
        config,
        strategy,
    )
}
