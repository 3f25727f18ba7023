use crate::error::{PlanningError, PlanningResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of a planning or query call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Solved,
    NoPathFound,
}

impl PlanStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, PlanStatus::Solved)
    }

    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlanStatus::Solved => "Solved",
            PlanStatus::NoPathFound => "NoPathFound",
        };
        write!(f, "{}", s)
    }
}

/// Statistics of one tree-planner call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningStatistics {
    /// Size of each tree when planning stopped (one entry for RRT, start then goal for BiRRT).
    pub tree_sizes: Vec<usize>,
    pub elapsed: Duration,
    pub bridges_found: usize,
    pub iterations: usize,
}

/// Result of a tree-planner call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SinglePathResult<T> {
    /// The path from start to goal; empty unless `status` is `Solved`.
    pub path: Vec<T>,
    pub status: PlanStatus,
    pub statistics: PlanningStatistics,
}

impl<T> SinglePathResult<T> {
    pub fn solved(path: Vec<T>, statistics: PlanningStatistics) -> Self {
        Self {
            path,
            status: PlanStatus::Solved,
            statistics,
        }
    }

    pub fn no_path_found(statistics: PlanningStatistics) -> Self {
        Self {
            path: Vec::new(),
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
