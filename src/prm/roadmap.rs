use crate::error::{PlanningError, PlanningResult};
use rayon::prelude::*;
use std::collections::BTreeMap;

/// A directed roadmap edge.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeInfo {
    pub weight: f64,
    /// True once the edge passed `edge_validity_fn`. Unvalidated edges are checked on demand by
    /// queries or in bulk by `update_roadmap_edges`.
    pub validated: bool,
}

impl EdgeInfo {
    pub fn validated(weight: f64) -> Self {
        Self {
            weight,
            validated: true,
        }
    }

    pub fn unvalidated(weight: f64) -> Self {
        Self {
            weight,
            validated: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RoadmapNode<T> {
    state: T,
    edges: BTreeMap<usize, EdgeInfo>,
}

impl<T> RoadmapNode<T> {
    pub fn state(&self) -> &T {
        &self.state
    }

    /// Outgoing edges keyed by neighbor index.
    pub fn edges(&self) -> &BTreeMap<usize, EdgeInfo> {
        &self.edges
    }

    pub(crate) fn edges_mut(&mut self) -> &mut BTreeMap<usize, EdgeInfo> {
        &mut self.edges
    }
}

/// A probabilistic roadmap: nodes in an arena, each owning its outgoing edges.
#[derive(Clone, Debug)]
pub struct RoadmapGraph<T> {
    nodes: Vec<RoadmapNode<T>>,
}

impl<T> Default for RoadmapGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RoadmapGraph<T> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[RoadmapNode<T>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> PlanningResult<&RoadmapNode<T>> {
        self.nodes.get(index).ok_or(PlanningError::InvalidNodeIndex {
            index,
            size: self.nodes.len(),
        })
    }

    pub fn state(&self, index: usize) -> PlanningResult<&T> {
        self.node(index).map(RoadmapNode::state)
    }

    /// Total number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.edges.len()).sum()
    }

    pub fn edge(&self, from: usize, to: usize) -> Option<&EdgeInfo> {
        self.nodes.get(from).and_then(|node| node.edges.get(&to))
    }

    /// Adds an unconnected node and returns its index.
    pub fn add_node(&mut self, state: T) -> usize {
        self.nodes.push(RoadmapNode {
            state,
            edges: BTreeMap::new(),
        });
        self.nodes.len() - 1
    }

    /// Adds (or replaces) the directed edge `from -> to`.
    pub fn add_edge(&mut self, from: usize, to: usize, info: EdgeInfo) -> PlanningResult<()> {
        self.check_index(to)?;
        if from == to {
            return Err(PlanningError::Configuration(format!(
                "self edge on node {} is not allowed",
                from
            )));
        }
        let size = self.nodes.len();
        let node = self
            .nodes
            .get_mut(from)
            .ok_or(PlanningError::InvalidNodeIndex { index: from, size })?;
        node.edges.insert(to, info);
        Ok(())
    }

    /// Removes the directed edge `from -> to`, returning it if it existed.
    pub fn remove_edge(&mut self, from: usize, to: usize) -> Option<EdgeInfo> {
        self.nodes
            .get_mut(from)
            .and_then(|node| node.edges.remove(&to))
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [RoadmapNode<T>] {
        &mut self.nodes
    }

    pub(crate) fn from_parts(parts: Vec<(T, BTreeMap<usize, EdgeInfo>)>) -> Self {
        Self {
            nodes: parts
                .into_iter()
                .map(|(state, edges)| RoadmapNode { state, edges })
                .collect(),
        }
    }

    fn check_index(&self, index: usize) -> PlanningResult<()> {
        if index < self.nodes.len() {
            Ok(())
        } else {
            Err(PlanningError::InvalidNodeIndex {
                index,
                size: self.nodes.len(),
            })
        }
    }

    /// Checks that every neighbor index is in range and no node links to itself. With
    /// `symmetric`, also checks that every edge has its reverse.
    pub fn check_graph_linkage(&self, symmetric: bool) -> bool {
        let size = self.nodes.len();
        self.nodes.iter().enumerate().all(|(index, node)| {
            node.edges.keys().all(|&neighbor| {
                neighbor < size
                    && neighbor != index
                    && (!symmetric || self.nodes[neighbor].edges.contains_key(&index))
            })
        })
    }
}

impl<T: Clone + Send + Sync> RoadmapGraph<T> {
    /// Builds a copy without the nodes in `indices_to_remove` and without any edge touching them.
    /// Remaining nodes keep their relative order and are renumbered densely.
    ///
    /// Parameters:
    /// - `indices_to_remove`: Node indices to drop. Repeats are ignored.
    /// - `parallel`: Rebuild the nodes on rayon's pool.
    pub fn make_pruned_copy(
        &self,
        indices_to_remove: &[usize],
        parallel: bool,
    ) -> PlanningResult<Self> {
        let mut remapped: Vec<Option<usize>> = vec![Some(0); self.nodes.len()];
        for &index in indices_to_remove {
            if index >= self.nodes.len() {
                return Err(PlanningError::Configuration(format!(
                    "cannot prune node {} from a roadmap with {} nodes",
                    index,
                    self.nodes.len()
                )));
            }
            remapped[index] = None;
        }
        let mut next = 0;
        for slot in remapped.iter_mut().flatten() {
            *slot = next;
            next += 1;
        }

        let rebuild = |node: &RoadmapNode<T>| RoadmapNode {
            state: node.state.clone(),
            edges: node
                .edges
                .iter()
                .filter_map(|(neighbor, info)| remapped[*neighbor].map(|n| (n, *info)))
                .collect(),
        };
        let kept = |(index, _): &(usize, &RoadmapNode<T>)| remapped[*index].is_some();

        let nodes = if parallel {
            self.nodes
                .par_iter()
                .enumerate()
                .filter(kept)
                .map(|(_, node)| rebuild(node))
                .collect()
        } else {
            self.nodes
                .iter()
                .enumerate()
                .filter(kept)
                .map(|(_, node)| rebuild(node))
                .collect()
        };
        Ok(Self { nodes })
    }
}
