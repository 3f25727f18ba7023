use crate::error::{CallbackResult, PlanningError, PlanningResult};
use crate::rrt::neighbors::NearestNeighbors;
use crate::rrt::result::{PlanningStatistics, SinglePathResult};
use crate::rrt::rrt::append_propagated;
use crate::rrt::termination::TerminationCondition;
use crate::rrt::tree::{PlannerTree, PropagatedState};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, trace};

/// Which of the two BiRRT trees an operation applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActiveTree {
    Start,
    Goal,
}

impl ActiveTree {
    pub fn other(self) -> Self {
        match self {
            ActiveTree::Start => ActiveTree::Goal,
            ActiveTree::Goal => ActiveTree::Start,
        }
    }
}

/// Where the extension target of one BiRRT iteration comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleType {
    /// A fresh sample from `sampling_fn`.
    Random,
    /// A state drawn from the other tree, pulling the trees towards each other.
    OtherTree,
}

/// A pair of mutually connectable nodes, one per tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalBridge {
    pub start_tree_index: usize,
    pub goal_tree_index: usize,
}

type PropagationFn<'a, T> =
    dyn FnMut(&T, &T, ActiveTree) -> CallbackResult<Vec<PropagatedState<T>>> + 'a;

/// A bidirectional RRT planner.
///
/// Grows one tree from the start and one from the goal, alternating between them according to
/// the injected selection policies, until a node of one tree is connectable to a node of the
/// other. All randomness comes from the callbacks, so the planner is deterministic given
/// deterministic callbacks.
pub struct BiRRT<'a, T, NN: NearestNeighbors<T>> {
    start_tree: PlannerTree<T>,
    goal_tree: PlannerTree<T>,
    start_neighbors: NN,
    goal_neighbors: NN,
    bridge: Option<GoalBridge>,
    /// Next tree for the default (alternating) selection.
    next_alternating: ActiveTree,

    sampling_fn: Box<dyn FnMut() -> CallbackResult<T> + 'a>,
    propagation_fn: Box<PropagationFn<'a, T>>,
    states_connected_fn: Box<dyn FnMut(&T, &T, ActiveTree) -> bool + 'a>,
    select_active_tree_fn: Option<Box<dyn FnMut() -> ActiveTree + 'a>>,
    select_sample_type_fn: Option<Box<dyn FnMut() -> SampleType + 'a>>,
    tree_sampling_fn: Option<Box<dyn FnMut(&PlannerTree<T>) -> CallbackResult<T> + 'a>>,
    state_added_callback_fn: Option<Box<dyn FnMut(&T, usize, ActiveTree) + 'a>>,
    goal_bridge_callback_fn: Option<Box<dyn FnMut(&GoalBridge) + 'a>>,
}

impl<'a, T: Clone, NN: NearestNeighbors<T>> BiRRT<'a, T, NN> {
    /// Constructs a new BiRRT planner.
    ///
    /// Parameters:
    /// - `start`, `goal`: The roots of the two trees.
    /// - `start_neighbors`, `goal_neighbors`: Empty nearest neighbor indices, one per tree.
    /// - `sampling_fn`: Draws a fresh sample.
    /// - `propagation_fn`: Extends the given tree from its nearest state towards the target.
    /// - `states_connected_fn`: Returns true if a state of the active tree (first argument)
    ///   can be joined to a state of the other tree (second argument).
    pub fn new(
        start: T,
        goal: T,
        mut start_neighbors: NN,
        mut goal_neighbors: NN,
        sampling_fn: impl FnMut() -> CallbackResult<T> + 'a,
        propagation_fn: impl FnMut(&T, &T, ActiveTree) -> CallbackResult<Vec<PropagatedState<T>>>
            + 'a,
        states_connected_fn: impl FnMut(&T, &T, ActiveTree) -> bool + 'a,
    ) -> PlanningResult<Self> {
        if !start_neighbors.is_empty() || !goal_neighbors.is_empty() {
            return Err(PlanningError::Configuration(
                "the nearest neighbors indices of a new planner must be empty".to_string(),
            ));
        }
        start_neighbors.insert(start.clone());
        goal_neighbors.insert(goal.clone());
        Ok(Self {
            start_tree: PlannerTree::new(start),
            goal_tree: PlannerTree::new(goal),
            start_neighbors,
            goal_neighbors,
            bridge: None,
            next_alternating: ActiveTree::Start,
            sampling_fn: Box::new(sampling_fn),
            propagation_fn: Box::new(propagation_fn),
            states_connected_fn: Box::new(states_connected_fn),
            select_active_tree_fn: None,
            select_sample_type_fn: None,
            tree_sampling_fn: None,
            state_added_callback_fn: None,
            goal_bridge_callback_fn: None,
        })
    }

    /// Sets the policy choosing which tree extends each iteration.
    /// Without it the trees alternate, starting with the start tree.
    pub fn with_select_active_tree_fn(mut self, select: impl FnMut() -> ActiveTree + 'a) -> Self {
        self.select_active_tree_fn = Some(Box::new(select));
        self
    }

    /// Sets the policy choosing between a random sample and a sample from the other tree.
    /// Without it every iteration uses a random sample.
    pub fn with_select_sample_type_fn(mut self, select: impl FnMut() -> SampleType + 'a) -> Self {
        self.select_sample_type_fn = Some(Box::new(select));
        self
    }

    /// Sets how a target is drawn from the other tree.
    /// Without it the other tree's most recently added node is used.
    pub fn with_tree_sampling_fn(
        mut self,
        sample: impl FnMut(&PlannerTree<T>) -> CallbackResult<T> + 'a,
    ) -> Self {
        self.tree_sampling_fn = Some(Box::new(sample));
        self
    }

    pub fn with_state_added_callback(
        mut self,
        callback: impl FnMut(&T, usize, ActiveTree) + 'a,
    ) -> Self {
        self.state_added_callback_fn = Some(Box::new(callback));
        self
    }

    pub fn with_goal_bridge_callback(mut self, callback: impl FnMut(&GoalBridge) + 'a) -> Self {
        self.goal_bridge_callback_fn = Some(Box::new(callback));
        self
    }

    /// Plans until the trees are bridged or the termination condition is met.
    ///
    /// Termination is not an error: the result carries `PlanStatus::NoPathFound`.
    pub fn plan_single_path<TC: TerminationCondition>(
        &mut self,
        termination: &mut TC,
    ) -> PlanningResult<SinglePathResult<T>> {
        let start_time = Instant::now();
        let mut iterations = 0;

        if self.bridge.is_none()
            && (self.states_connected_fn)(
                self.start_tree.root().state(),
                self.goal_tree.root().state(),
                ActiveTree::Start,
            )
        {
            self.record_bridge(GoalBridge {
                start_tree_index: 0,
                goal_tree_index: 0,
            });
        }

        while self.bridge.is_none() {
            if termination.evaluate() {
                debug!(
                    "BiRRT terminated without a bridge after {} iterations ({} + {} nodes)",
                    iterations,
                    self.start_tree.len(),
                    self.goal_tree.len()
                );
                return Ok(SinglePathResult::no_path_found(
                    self.statistics(start_time, iterations),
                ));
            }
            iterations += 1;
            self.iteration()?;
        }

        let path = self.get_path().unwrap_or_default();
        let statistics = self.statistics(start_time, iterations);
        debug!(
            "BiRRT found a path with {} states after {} iterations ({} + {} nodes)",
            path.len(),
            iterations,
            self.start_tree.len(),
            self.goal_tree.len()
        );
        Ok(SinglePathResult::solved(path, statistics))
    }

    pub fn bridge(&self) -> Option<GoalBridge> {
        self.bridge
    }

    /// Returns the start-to-goal path across the bridge, if one was found.
    ///
    /// The start tree contributes its chain from the root to the bridge node, the goal tree its
    /// chain from the bridge node back to the goal root.
    pub fn get_path(&self) -> Option<Vec<T>> {
        let bridge = self.bridge?;
        let mut path = self.start_tree.extract_path(bridge.start_tree_index).ok()?;
        let goal_chain = self.goal_tree.extract_path(bridge.goal_tree_index).ok()?;
        path.extend(goal_chain.into_iter().rev());
        Some(path)
    }

    pub fn start_tree(&self) -> &PlannerTree<T> {
        &self.start_tree
    }

    pub fn goal_tree(&self) -> &PlannerTree<T> {
        &self.goal_tree
    }

    fn iteration(&mut self) -> PlanningResult<()> {
        let active = match self.select_active_tree_fn.as_mut() {
            Some(select) => select(),
            None => {
                let active = self.next_alternating;
                self.next_alternating = active.other();
                active
            }
        };
        let sample_type = match self.select_sample_type_fn.as_mut() {
            Some(select) => select(),
            None => SampleType::Random,
        };

        let (active_tree, active_neighbors, other_tree) = match active {
            ActiveTree::Start => (
                &mut self.start_tree,
                &mut self.start_neighbors,
                &self.goal_tree,
            ),
            ActiveTree::Goal => (
                &mut self.goal_tree,
                &mut self.goal_neighbors,
                &self.start_tree,
            ),
        };

        let target = match sample_type {
            SampleType::Random => (self.sampling_fn)()?,
            SampleType::OtherTree => match self.tree_sampling_fn.as_mut() {
                Some(sample) => sample(other_tree)?,
                None => other_tree.nodes()[other_tree.newest_index()]
                    .state()
                    .clone(),
            },
        };

        let nearest_index = active_neighbors.query_nearest(&target)?;
        let propagated =
            (self.propagation_fn)(active_tree.nodes()[nearest_index].state(), &target, active)?;
        if propagated.is_empty() {
            return Ok(());
        }

        let state_added_callback_fn = &mut self.state_added_callback_fn;
        let added = append_propagated(
            active_tree,
            active_neighbors,
            nearest_index,
            propagated,
            |tree, index| {
                trace!("BiRRT added node {} to the {:?} tree", index, active);
                if let Some(callback) = state_added_callback_fn.as_mut() {
                    callback(tree.nodes()[index].state(), index, active);
                }
                false
            },
        )?;

        let Some(&newest_index) = added.last() else {
            return Ok(());
        };
        let newest_state = active_tree.nodes()[newest_index].state();
        let connected = other_tree
            .nodes()
            .iter()
            .position(|other| (self.states_connected_fn)(newest_state, other.state(), active));

        if let Some(other_index) = connected {
            let bridge = match active {
                ActiveTree::Start => GoalBridge {
                    start_tree_index: newest_index,
                    goal_tree_index: other_index,
                },
                ActiveTree::Goal => GoalBridge {
                    start_tree_index: other_index,
                    goal_tree_index: newest_index,
                },
            };
            self.record_bridge(bridge);
        }
        Ok(())
    }

    fn record_bridge(&mut self, bridge: GoalBridge) {
        trace!(
            "BiRRT bridged start node {} and goal node {}",
            bridge.start_tree_index,
            bridge.goal_tree_index
        );
        if let Some(callback) = self.goal_bridge_callback_fn.as_mut() {
            callback(&bridge);
        }
        self.bridge = Some(bridge);
    }

    fn statistics(&self, start_time: Instant, iterations: usize) -> PlanningStatistics {
        PlanningStatistics {
            tree_sizes: vec![self.start_tree.len(), self.goal_tree.len()],
            elapsed: start_time.elapsed(),
            bridges_found: usize::from(self.bridge.is_some()),
            iterations,
        }
    }

    /// Deconstructs the planner into its start and goal trees.
    pub fn deconstruct_into_trees(self) -> (PlannerTree<T>, PlannerTree<T>) {
        (self.start_tree, self.goal_tree)
    }
}
