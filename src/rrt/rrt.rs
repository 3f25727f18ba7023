use crate::error::{CallbackError, CallbackResult, PlanningError, PlanningResult};
use crate::rrt::neighbors::NearestNeighbors;
use crate::rrt::result::{PlanningStatistics, SinglePathResult};
use crate::rrt::termination::TerminationCondition;
use crate::rrt::tree::{PlannerTree, PropagatedState};
use std::time::Instant;
use tracing::{debug, trace};

/// Appends one propagated batch to a tree and its nearest neighbor index.
///
/// `on_added` is called after each append with the tree and the new index; returning true stops
/// the append (the remaining states of the batch are dropped).
///
/// Returns the indices of the appended nodes, in batch order.
pub(crate) fn append_propagated<T, NN, C>(
    tree: &mut PlannerTree<T>,
    nearest_neighbors: &mut NN,
    origin: usize,
    propagated: Vec<PropagatedState<T>>,
    mut on_added: C,
) -> PlanningResult<Vec<usize>>
where
    T: Clone,
    NN: NearestNeighbors<T>,
    C: FnMut(&PlannerTree<T>, usize) -> bool,
{
    let first_index = tree.len();
    let mut added = Vec::with_capacity(propagated.len());
    for propagated_state in propagated {
        let parent = match propagated_state.relative_parent_index {
            -1 => origin,
            // Forward references land past the end of the tree and are rejected by add_node.
            offset if offset >= 0 => first_index + offset as usize,
            offset => {
                return Err(CallbackError::new(format!(
                    "propagation returned relative parent index {}",
                    offset
                ))
                .into())
            }
        };
        let index = tree.add_node(propagated_state.state.clone(), parent)?;
        let nn_index = nearest_neighbors.insert(propagated_state.state);
        debug_assert_eq!(index, nn_index, "tree and nearest neighbor index out of step");
        added.push(index);
        if on_added(tree, index) {
            break;
        }
    }
    Ok(added)
}

/// A Rapidly-exploring Random Tree (RRT) planner over opaque states.
/// Template Parameters:
/// - `T`: The state type.
/// - `NN`: The nearest neighbors data structure.
pub struct RRT<'a, T, NN: NearestNeighbors<T>> {
    /// The tree rooted at the start state.
    tree: PlannerTree<T>,
    nearest_neighbors: NN,
    /// Index of the solution node (None if no solution has been found).
    solution: Option<usize>,
    sampling_fn: Box<dyn FnMut() -> CallbackResult<T> + 'a>,
    forward_propagation_fn:
        Box<dyn FnMut(&T, &T) -> CallbackResult<Vec<PropagatedState<T>>> + 'a>,
    check_goal_fn: Box<dyn FnMut(&T) -> bool + 'a>,
    state_added_callback_fn: Option<Box<dyn FnMut(&T, usize) + 'a>>,
    goal_reached_callback_fn: Option<Box<dyn FnMut(&T, usize) + 'a>>,
}

impl<'a, T: Clone, NN: NearestNeighbors<T>> RRT<'a, T, NN> {
    /// Constructs a new RRT planner.
    ///
    /// Parameters:
    /// - `start`: The root of the tree.
    /// - `nearest_neighbors`: An empty nearest neighbors index; the planner inserts every node.
    /// - `sampling_fn`: Draws the next (possibly goal-biased) sample.
    /// - `forward_propagation_fn`: Extends from the nearest tree state towards the sample.
    /// - `check_goal_fn`: Returns true for states that satisfy the goal.
    ///
    /// Returns a `Configuration` error if the index is not empty.
    pub fn new(
        start: T,
        mut nearest_neighbors: NN,
        sampling_fn: impl FnMut() -> CallbackResult<T> + 'a,
        forward_propagation_fn: impl FnMut(&T, &T) -> CallbackResult<Vec<PropagatedState<T>>>
            + 'a,
        check_goal_fn: impl FnMut(&T) -> bool + 'a,
    ) -> PlanningResult<Self> {
        if !nearest_neighbors.is_empty() {
            return Err(PlanningError::Configuration(
                "the nearest neighbors index of a new planner must be empty".to_string(),
            ));
        }
        nearest_neighbors.insert(start.clone());
        Ok(Self {
            tree: PlannerTree::new(start),
            nearest_neighbors,
            solution: None,
            sampling_fn: Box::new(sampling_fn),
            forward_propagation_fn: Box::new(forward_propagation_fn),
            check_goal_fn: Box::new(check_goal_fn),
            state_added_callback_fn: None,
            goal_reached_callback_fn: None,
        })
    }

    /// Sets a callback fired synchronously for every node added to the tree.
    pub fn with_state_added_callback(mut self, callback: impl FnMut(&T, usize) + 'a) -> Self {
        self.state_added_callback_fn = Some(Box::new(callback));
        self
    }

    /// Sets a callback fired once, when the first goal node is added.
    pub fn with_goal_reached_callback(mut self, callback: impl FnMut(&T, usize) + 'a) -> Self {
        self.goal_reached_callback_fn = Some(Box::new(callback));
        self
    }

    /// Plans until a goal node is added or the termination condition is met.
    ///
    /// Termination is not an error: the result carries `PlanStatus::NoPathFound`.
    /// Errors from callbacks or a corrupted propagation batch abort the call.
    ///
    /// Parameters:
    /// - `termination`: Polled once per iteration.
    pub fn plan_single_path<TC: TerminationCondition>(
        &mut self,
        termination: &mut TC,
    ) -> PlanningResult<SinglePathResult<T>> {
        let start_time = Instant::now();
        let mut iterations = 0;

        if self.solution.is_none() && (self.check_goal_fn)(self.tree.root().state()) {
            self.mark_solution(0);
        }

        while self.solution.is_none() {
            if termination.evaluate() {
                let statistics = self.statistics(start_time, iterations);
                debug!(
                    "RRT terminated without a path after {} iterations ({} nodes)",
                    iterations,
                    self.tree.len()
                );
                return Ok(SinglePathResult::no_path_found(statistics));
            }
            iterations += 1;
            self.iteration()?;
        }

        let path = self.get_path().unwrap_or_default();
        let statistics = self.statistics(start_time, iterations);
        debug!(
            "RRT found a path with {} states after {} iterations ({} nodes)",
            path.len(),
            iterations,
            self.tree.len()
        );
        Ok(SinglePathResult::solved(path, statistics))
    }

    /// Returns true if a solution was found.
    pub fn solved(&self) -> bool {
        self.solution.is_some()
    }

    /// Returns the path from the start to the goal, if a solution was found.
    pub fn get_path(&self) -> Option<Vec<T>> {
        self.solution
            .and_then(|solution| self.tree.extract_path(solution).ok())
    }

    pub fn get_tree(&self) -> &PlannerTree<T> {
        &self.tree
    }

    /// Expands the tree by one iteration.
    ///
    /// 1. Sample a state.
    /// 2. Find the nearest node in the tree to the sample.
    /// 3. Propagate from the nearest node towards the sample.
    /// 4. Append every propagated state, checking the goal after each append.
    fn iteration(&mut self) -> PlanningResult<()> {
        let sample = (self.sampling_fn)()?;
        let nearest_index = self.nearest_neighbors.query_nearest(&sample)?;
        let propagated =
            (self.forward_propagation_fn)(self.tree.nodes()[nearest_index].state(), &sample)?;
        if propagated.is_empty() {
            return Ok(());
        }

        let check_goal_fn = &mut self.check_goal_fn;
        let state_added_callback_fn = &mut self.state_added_callback_fn;
        let mut reached = None;
        append_propagated(
            &mut self.tree,
            &mut self.nearest_neighbors,
            nearest_index,
            propagated,
            |tree, index| {
                let state = tree.nodes()[index].state();
                trace!("RRT added node {}", index);
                if let Some(callback) = state_added_callback_fn.as_mut() {
                    callback(state, index);
                }
                if check_goal_fn(state) {
                    reached = Some(index);
                    return true;
                }
                false
            },
        )?;

        if let Some(index) = reached {
            self.mark_solution(index);
        }
        Ok(())
    }

    fn mark_solution(&mut self, index: usize) {
        self.solution = Some(index);
        if let Some(callback) = self.goal_reached_callback_fn.as_mut() {
            callback(self.tree.nodes()[index].state(), index);
        }
    }

    fn statistics(&self, start_time: Instant, iterations: usize) -> PlanningStatistics {
        PlanningStatistics {
            tree_sizes: vec![self.tree.len()],
            elapsed: start_time.elapsed(),
            bridges_found: 0,
            iterations,
        }
    }

    /// Deconstructs the RRT planner into its tree and nearest neighbors index.
    /// This enables the underlying data structures to be accessed without cloning them.
    pub fn deconstruct_into_components(self) -> (PlannerTree<T>, NN) {
        (self.tree, self.nearest_neighbors)
    }
}
