//! Sampling-based motion planning over opaque states.
//!
//! Two families of planners share one nearest neighbor layer:
//! - tree planners ([`rrt::RRT`], [`rrt::BiRRT`]) that grow trees from the start (and goal)
//!   through caller-supplied sampling and propagation callbacks;
//! - probabilistic roadmaps ([`prm::RoadmapGraph`]) that are grown once with
//!   [`prm::grow_roadmap`] and answered repeatedly with [`prm::query_path`] or
//!   [`prm::lazy_query_path`].
//!
//! The planners never look inside a state. Distances, validity checks and propagation are
//! injected as closures, and so is all randomness. [`euclidean`] provides those callbacks for
//! states in `R^N`.

pub mod error;
pub mod euclidean;
pub mod prm;
pub mod rrt;
pub mod util;

pub use error::{CallbackError, CallbackResult, PlanningError, PlanningResult};
