//! Error types shared by the tree planners and the roadmap.

use thiserror::Error;

/// Boxed error type accepted from fallible callbacks.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// An error raised by a caller-supplied callback (sampling, propagation, tree sampling),
/// or a callback result the planner cannot work with (e.g. a NaN distance).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CallbackError(BoxedError);

impl CallbackError {
    /// Wraps any error (or message) raised by a callback.
    pub fn new<E: Into<BoxedError>>(error: E) -> Self {
        Self(error.into())
    }

    /// Returns the wrapped error.
    pub fn into_inner(self) -> BoxedError {
        self.0
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Result type returned by fallible callbacks.
pub type CallbackResult<T> = Result<T, CallbackError>;

/// Planning errors
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Nearest neighbor query on an empty index")]
    EmptyIndex,

    #[error("Parent index {parent} is out of range for a tree with {size} nodes")]
    InvalidParent { parent: usize, size: usize },

    #[error("Node index {index} is out of range for a structure with {size} nodes")]
    InvalidNodeIndex { index: usize, size: usize },

    /// The search was exhausted or terminated without a path. Planners report this
    /// through the status of their result; it only surfaces as an `Err` through `into_path`.
    #[error("No path found")]
    NoPathFound,

    #[error("Callback failed: {0}")]
    Callback(#[from] CallbackError),

    #[error("Roadmap serialization failed: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Corrupt roadmap: {0}")]
    CorruptRoadmap(String),

    #[error("Roadmap I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for planning operations
pub type PlanningResult<T> = Result<T, PlanningError>;

/// Rejects NaN distances coming from a caller's `distance_fn`.
pub(crate) fn checked_distance(distance: f64) -> PlanningResult<f64> {
    if distance.is_nan() {
        Err(CallbackError::from("distance_fn returned NaN").into())
    } else {
        Ok(distance)
    }
}
