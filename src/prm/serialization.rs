//! Persisted roadmap layout.
//!
//! A roadmap is stored as `{ node_count, nodes: [{ state, edges: [(neighbor, weight, validated)] }] }`
//! and encoded with bincode. States are written with their own `Serialize` impl.

use crate::error::{PlanningError, PlanningResult};
use crate::prm::roadmap::{EdgeInfo, RoadmapGraph};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

#[derive(Serialize)]
struct StoredNodeRef<'a, T> {
    state: &'a T,
    edges: Vec<(usize, f64, bool)>,
}

#[derive(Serialize)]
struct StoredRoadmapRef<'a, T> {
    node_count: usize,
    nodes: Vec<StoredNodeRef<'a, T>>,
}

#[derive(Deserialize)]
struct StoredNode<T> {
    state: T,
    edges: Vec<(usize, f64, bool)>,
}

#[derive(Deserialize)]
struct StoredRoadmap<T> {
    node_count: usize,
    nodes: Vec<StoredNode<T>>,
}

fn to_stored<T>(roadmap: &RoadmapGraph<T>) -> StoredRoadmapRef<'_, T> {
    StoredRoadmapRef {
        node_count: roadmap.len(),
        nodes: roadmap
            .nodes()
            .iter()
            .map(|node| StoredNodeRef {
                state: node.state(),
                edges: node
                    .edges()
                    .iter()
                    .map(|(&neighbor, edge)| (neighbor, edge.weight, edge.validated))
                    .collect(),
            })
            .collect(),
    }
}

fn from_stored<T>(stored: StoredRoadmap<T>) -> PlanningResult<RoadmapGraph<T>> {
    if stored.node_count != stored.nodes.len() {
        return Err(PlanningError::CorruptRoadmap(format!(
            "header declares {} nodes but {} are stored",
            stored.node_count,
            stored.nodes.len()
        )));
    }
    let node_count = stored.node_count;
    let mut parts = Vec::with_capacity(node_count);
    for (index, node) in stored.nodes.into_iter().enumerate() {
        let mut edges = BTreeMap::new();
        for (neighbor, weight, validated) in node.edges {
            if neighbor >= node_count || neighbor == index {
                return Err(PlanningError::CorruptRoadmap(format!(
                    "node {} has an edge to node {} in a roadmap of {} nodes",
                    index, neighbor, node_count
                )));
            }
            if weight.is_nan() {
                return Err(PlanningError::CorruptRoadmap(format!(
                    "edge {} -> {} has a NaN weight",
                    index, neighbor
                )));
            }
            if edges
                .insert(neighbor, EdgeInfo { weight, validated })
                .is_some()
            {
                return Err(PlanningError::CorruptRoadmap(format!(
                    "node {} lists node {} twice",
                    index, neighbor
                )));
            }
        }
        parts.push((node.state, edges));
    }
    Ok(RoadmapGraph::from_parts(parts))
}

/// Encodes a roadmap into bytes.
pub fn serialize_roadmap<T: Serialize>(roadmap: &RoadmapGraph<T>) -> PlanningResult<Vec<u8>> {
    Ok(bincode::serialize(&to_stored(roadmap))?)
}

/// Decodes a roadmap, rejecting inconsistent node counts and out of range neighbors.
pub fn deserialize_roadmap<T: DeserializeOwned>(bytes: &[u8]) -> PlanningResult<RoadmapGraph<T>> {
    from_stored(bincode::deserialize(bytes)?)
}

pub fn save_roadmap<T: Serialize, P: AsRef<Path>>(
    roadmap: &RoadmapGraph<T>,
    path: P,
) -> PlanningResult<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    bincode::serialize_into(&mut writer, &to_stored(roadmap))?;
    writer.flush()?;
    debug!(
        "Saved roadmap with {} nodes to {}",
        roadmap.len(),
        path.as_ref().display()
    );
    Ok(())
}

pub fn load_roadmap<T: DeserializeOwned, P: AsRef<Path>>(
    path: P,
) -> PlanningResult<RoadmapGraph<T>> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let roadmap = from_stored(bincode::deserialize_from(reader)?)?;
    debug!(
        "Loaded roadmap with {} nodes from {}",
        roadmap.len(),
        path.as_ref().display()
    );
    Ok(roadmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> RoadmapGraph<(i32, i32)> {
        let mut roadmap = RoadmapGraph::new();
        roadmap.add_node((0, 0));
        roadmap.add_node((3, 0));
        roadmap.add_node((0, 4));
        roadmap.add_edge(0, 1, EdgeInfo::validated(3.0)).unwrap();
        roadmap.add_edge(1, 0, EdgeInfo::validated(3.0)).unwrap();
        roadmap.add_edge(1, 2, EdgeInfo::unvalidated(5.0)).unwrap();
        roadmap.add_edge(2, 1, EdgeInfo::unvalidated(5.0)).unwrap();
        roadmap
    }

    #[test]
    fn decoded_roadmap_keeps_adjacency_and_flags() {
        let roadmap = triangle();
        let decoded: RoadmapGraph<(i32, i32)> =
            deserialize_roadmap(&serialize_roadmap(&roadmap).unwrap()).unwrap();
        assert_eq!(decoded.len(), 3);
        for (a, b) in roadmap.nodes().iter().zip(decoded.nodes()) {
            assert_eq!(a.state(), b.state());
            assert_eq!(a.edges(), b.edges());
        }
        assert_eq!(decoded.edge(1, 2), Some(&EdgeInfo::unvalidated(5.0)));
        assert!(decoded.check_graph_linkage(true));
    }

    #[test]
    fn mismatched_node_count_is_corrupt() {
        let roadmap = triangle();
        let mut stored = to_stored(&roadmap);
        stored.node_count = 4;
        let bytes = bincode::serialize(&stored).unwrap();
        assert!(matches!(
            deserialize_roadmap::<(i32, i32)>(&bytes),
            Err(PlanningError::CorruptRoadmap(_))
        ));
    }

    #[test]
    fn out_of_range_neighbor_is_corrupt() {
        let roadmap = triangle();
        let mut stored = to_stored(&roadmap);
        stored.nodes[0].edges.push((7, 1.0, true));
        let bytes = bincode::serialize(&stored).unwrap();
        assert!(matches!(
            deserialize_roadmap::<(i32, i32)>(&bytes),
            Err(PlanningError::CorruptRoadmap(_))
        ));
    }

    #[test]
    fn truncated_bytes_are_a_serialization_error() {
        let bytes = serialize_roadmap(&triangle()).unwrap();
        assert!(matches!(
            deserialize_roadmap::<(i32, i32)>(&bytes[..bytes.len() / 2]),
            Err(PlanningError::Serialization(_))
        ));
    }
}
