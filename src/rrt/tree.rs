use crate::error::{PlanningError, PlanningResult};
use serde::{Deserialize, Serialize};

/// A node in a planner tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TreeNode<T> {
    /// The state.
    state: T,
    /// The index of the parent node (None if the node is the root).
    parent: Option<usize>,
}

impl<T> TreeNode<T> {
    pub fn state(&self) -> &T {
        &self.state
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }
}

/// A state produced by one extension step.
///
/// `relative_parent_index == -1` attaches the state to the node the extension started from;
/// any other value is the offset of an earlier state in the same batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropagatedState<T> {
    pub state: T,
    pub relative_parent_index: isize,
}

impl<T> PropagatedState<T> {
    pub fn new(state: T, relative_parent_index: isize) -> Self {
        Self {
            state,
            relative_parent_index,
        }
    }

    /// A state attached to the node the extension started from.
    pub fn from_origin(state: T) -> Self {
        Self::new(state, -1)
    }
}

/// An arena-backed tree rooted at index 0.
///
/// Every node `i > 0` has a parent index `< i`, which rules out cycles without any runtime check.
/// Serializable for export; trees are only built through `new` and `add_node`.
#[derive(Clone, Debug, Serialize)]
pub struct PlannerTree<T> {
    nodes: Vec<TreeNode<T>>,
}

impl<T> PlannerTree<T> {
    /// Constructs a tree holding only the root.
    pub fn new(root: T) -> Self {
        Self {
            nodes: vec![TreeNode {
                state: root,
                parent: None,
            }],
        }
    }

    /// Appends a node as a child of `parent_index`.
    ///
    /// Returns the index of the new node, or `InvalidParent` if the parent does not exist yet.
    pub fn add_node(&mut self, state: T, parent_index: usize) -> PlanningResult<usize> {
        if parent_index >= self.nodes.len() {
            return Err(PlanningError::InvalidParent {
                parent: parent_index,
                size: self.nodes.len(),
            });
        }
        let index = self.nodes.len();
        self.nodes.push(TreeNode {
            state,
            parent: Some(parent_index),
        });
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[TreeNode<T>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&TreeNode<T>> {
        self.nodes.get(index)
    }

    pub fn root(&self) -> &TreeNode<T> {
        &self.nodes[0]
    }

    /// Index of the most recently added node.
    pub fn newest_index(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Returns the indices from the root down to `leaf_index`.
    pub fn ancestry(&self, leaf_index: usize) -> PlanningResult<Vec<usize>> {
        if leaf_index >= self.nodes.len() {
            return Err(PlanningError::InvalidNodeIndex {
                index: leaf_index,
                size: self.nodes.len(),
            });
        }
        let mut chain = vec![leaf_index];
        let mut current = leaf_index;
        // Reconstruct the chain by backtracking up the tree (following the parent indices).
        while let Some(parent) = self.nodes[current].parent {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Checks the monotonic-parent invariant on every node.
    pub fn check_tree_linkage(&self) -> bool {
        self.nodes.iter().enumerate().all(|(index, node)| match node.parent {
            None => index == 0,
            Some(parent) => parent < index,
        })
    }
}

impl<T: Clone> PlannerTree<T> {
    /// Returns the states from the root to `leaf_index`.
    pub fn extract_path(&self, leaf_index: usize) -> PlanningResult<Vec<T>> {
        Ok(self
            .ancestry(leaf_index)?
            .into_iter()
            .map(|index| self.nodes[index].state.clone())
            .collect())
    }
}
