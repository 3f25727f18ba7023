pub mod birrt;
pub mod neighbors;
pub mod result;
pub mod rrt;
pub mod sampling;
pub mod termination;
pub mod tree;

pub use birrt::{ActiveTree, BiRRT, GoalBridge, SampleType};
pub use neighbors::{KdTreeNearestNeighbors, LinearNearestNeighbors, NearestNeighbors};
pub use result::{PlanStatus, PlanningStatistics, SinglePathResult};
pub use rrt::RRT;
pub use sampling::{
    GoalBiasedSampler, RandomSampleTypeSelection, RandomTreeSelection, UniformSampler,
};
pub use termination::{
    AnyTermination, MaxIterationsTermination, MaxTimeTermination, TerminationCondition,
};
pub use tree::{PlannerTree, PropagatedState, TreeNode};
