use crate::error::{PlanningError, PlanningResult};
use serde::{Deserialize, Serialize};

/// When candidate edges are checked with `edge_validity_fn`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeValidation {
    /// Edges are checked before insertion and only valid ones are stored.
    Eager,
    /// Every k-NN edge is stored unvalidated; queries (or `update_roadmap_edges`) check it later.
    Deferred,
}

/// Settings for connecting a state into a roadmap, used while growing and when overlaying
/// query starts and goals.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadmapConfig {
    /// Number of nearest roadmap nodes considered as neighbors.
    pub k: usize,
    /// Fan nearest neighbor search and edge validation out over rayon's pool.
    pub parallel: bool,
    /// Validity (and weight) of one direction of an edge implies the other.
    pub symmetric: bool,
    /// Admit states that duplicate an existing node.
    pub allow_duplicates: bool,
    /// States closer than this to an existing node count as duplicates. `0.0` means only an
    /// exact match (distance zero) is a duplicate.
    pub duplicate_tolerance: f64,
    pub edge_validation: EdgeValidation,
}

impl Default for RoadmapConfig {
    fn default() -> Self {
        Self {
            k: 10,
            parallel: false,
            symmetric: true,
            allow_duplicates: false,
            duplicate_tolerance: 0.0,
            edge_validation: EdgeValidation::Eager,
        }
    }
}

impl RoadmapConfig {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_symmetric(mut self, symmetric: bool) -> Self {
        self.symmetric = symmetric;
        self
    }

    pub fn with_allow_duplicates(mut self, allow_duplicates: bool) -> Self {
        self.allow_duplicates = allow_duplicates;
        self
    }

    pub fn with_duplicate_tolerance(mut self, duplicate_tolerance: f64) -> Self {
        self.duplicate_tolerance = duplicate_tolerance;
        self
    }

    pub fn with_edge_validation(mut self, edge_validation: EdgeValidation) -> Self {
        self.edge_validation = edge_validation;
        self
    }

    pub fn validate(&self) -> PlanningResult<()> {
        if self.k == 0 {
            return Err(PlanningError::Configuration(
                "k must be at least 1".to_string(),
            ));
        }
        if !(self.duplicate_tolerance >= 0.0) {
            return Err(PlanningError::Configuration(format!(
                "duplicate_tolerance must be non-negative, got {}",
                self.duplicate_tolerance
            )));
        }
        Ok(())
    }
}

/// Settings for a roadmap query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// How starts and goals are connected into the roadmap.
    pub roadmap: RoadmapConfig,
    /// Skip pushing a node into the A* open set when an entry at least as good is pending.
    pub limit_astar_pqueue_duplicates: bool,
}

impl QueryConfig {
    pub fn new(roadmap: RoadmapConfig) -> Self {
        Self {
            roadmap,
            limit_astar_pqueue_duplicates: false,
        }
    }

    pub fn with_limit_astar_pqueue_duplicates(mut self, limit: bool) -> Self {
        self.limit_astar_pqueue_duplicates = limit;
        self
    }

    pub fn validate(&self) -> PlanningResult<()> {
        self.roadmap.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_k_is_rejected() {
        assert!(matches!(
            RoadmapConfig::new(0).validate(),
            Err(PlanningError::Configuration(_))
        ));
        assert!(RoadmapConfig::new(5).validate().is_ok());
    }

    #[test]
    fn negative_or_nan_tolerance_is_rejected() {
        assert!(RoadmapConfig::new(5)
            .with_duplicate_tolerance(-1.0)
            .validate()
            .is_err());
        assert!(RoadmapConfig::new(5)
            .with_duplicate_tolerance(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn setters_keep_remaining_defaults() {
        let config = QueryConfig::new(RoadmapConfig::new(7).with_parallel(true))
            .with_limit_astar_pqueue_duplicates(true);
        assert_eq!(config.roadmap.k, 7);
        assert!(config.roadmap.parallel);
        assert!(config.roadmap.symmetric);
        assert!(!config.roadmap.allow_duplicates);
        assert_eq!(config.roadmap.edge_validation, EdgeValidation::Eager);
        assert!(config.limit_astar_pqueue_duplicates);
    }
}
