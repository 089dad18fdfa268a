//! Label-keyed store over an undirected petgraph.

use std::collections::HashMap;
use std::path::Path;

use petgraph::algo::astar;
use petgraph::graph::{NodeIndex, UnGraph};

use super::{GraphDescription, NodeRecord, DEFAULT_RELATION};
use crate::error::{Result, TrafficRagError};

/// In-memory traffic knowledge graph.
///
/// Loaded once from a JSON description and immutable afterwards, so `&self`
/// queries are safe to share across concurrent callers. Path queries are
/// unweighted (hop count); edge relations carry no cost.
#[derive(Debug)]
pub struct KnowledgeGraph {
    graph: UnGraph<NodeRecord, String>,
    id_to_index: HashMap<String, NodeIndex>,
    label_to_id: HashMap<String, String>,
    id_to_label: HashMap<String, String>,
}

impl KnowledgeGraph {
    /// Load a graph description from a JSON file.
    ///
    /// Fails with `Load` if the file is missing or the content is not
    /// well-formed; no partial graph is kept. An edge referencing a node id
    /// that does not appear in `nodes` counts as malformed content.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TrafficRagError::Load(format!(
                "cannot read graph description {}: {}",
                path.display(),
                e
            ))
        })?;
        let description: GraphDescription = serde_json::from_str(&raw).map_err(|e| {
            TrafficRagError::Load(format!(
                "malformed graph description {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_description(description)
    }

    fn from_description(description: GraphDescription) -> Result<Self> {
        let mut graph: UnGraph<NodeRecord, String> = UnGraph::default();
        let mut id_to_index = HashMap::new();
        let mut label_to_id = HashMap::new();
        let mut id_to_label = HashMap::new();

        for node in description.nodes {
            let id = node.id.clone();
            let label = node.label.clone().unwrap_or_else(|| id.clone());
            let index = graph.add_node(node);
            id_to_index.insert(id.clone(), index);
            // Both maps are updated together so they stay strict inverses.
            label_to_id.insert(label.clone(), id.clone());
            id_to_label.insert(id, label);
        }

        for edge in description.edges {
            let src = *id_to_index.get(&edge.from).ok_or_else(|| {
                TrafficRagError::Load(format!("edge references unknown node id {:?}", edge.from))
            })?;
            let dst = *id_to_index.get(&edge.to).ok_or_else(|| {
                TrafficRagError::Load(format!("edge references unknown node id {:?}", edge.to))
            })?;
            let relation = edge
                .relation
                .unwrap_or_else(|| DEFAULT_RELATION.to_string());
            graph.add_edge(src, dst, relation);
        }

        log::debug!(
            "loaded knowledge graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );

        Ok(Self {
            graph,
            id_to_index,
            label_to_id,
            id_to_label,
        })
    }

    /// Labels of all nodes directly connected to `label`'s node.
    ///
    /// Unknown labels yield an empty list, not an error. Order follows the
    /// underlying adjacency enumeration; treat the result as a set.
    pub fn neighbors(&self, label: &str) -> Vec<String> {
        let Some(index) = self.index_of_label(label) else {
            return Vec::new();
        };
        self.graph
            .neighbors(index)
            .map(|n| self.label_of_index(n))
            .collect()
    }

    /// One hop-count shortest path from `source` to `target`, endpoints
    /// inclusive, as a label sequence.
    ///
    /// Empty when either label is unknown or no path exists; the two cases
    /// are not distinguished. `shortest_path(a, a)` is `[a]`.
    pub fn shortest_path(&self, source: &str, target: &str) -> Vec<String> {
        let (Some(src), Some(dst)) = (self.index_of_label(source), self.index_of_label(target))
        else {
            return Vec::new();
        };
        match astar(&self.graph, src, |n| n == dst, |_| 1usize, |_| 0usize) {
            Some((_, path)) => path.into_iter().map(|n| self.label_of_index(n)).collect(),
            None => Vec::new(),
        }
    }

    /// Type tag of the node with the given label, if the label is known and
    /// the node carries one.
    pub fn node_type(&self, label: &str) -> Option<&str> {
        let index = self.index_of_label(label)?;
        self.graph[index].node_type.as_deref()
    }

    /// Labels of every node whose type tag equals `node_type` exactly
    /// (case-sensitive). Empty for a type with no members.
    pub fn nodes_of_type(&self, node_type: &str) -> Vec<String> {
        self.graph
            .node_indices()
            .filter(|&i| self.graph[i].node_type.as_deref() == Some(node_type))
            .map(|i| self.label_of_index(i))
            .collect()
    }

    /// Nearest node of `target_type` reachable from `source`, together with
    /// the path to it.
    ///
    /// Runs one shortest-path search per candidate; among equal-length
    /// candidates the first one in node insertion order wins. Fine for
    /// graphs of hundreds of nodes, which is the expected scale. Absent when
    /// the source is unknown, no node of the type exists, or none is
    /// reachable. A source whose own type matches is a valid result with a
    /// single-node path.
    pub fn nearest_of_type(&self, source: &str, target_type: &str) -> Option<(String, Vec<String>)> {
        let src = self.index_of_label(source)?;

        let mut best: Option<(NodeIndex, Vec<NodeIndex>)> = None;
        for candidate in self.graph.node_indices() {
            if self.graph[candidate].node_type.as_deref() != Some(target_type) {
                continue;
            }
            let Some((_, path)) =
                astar(&self.graph, src, |n| n == candidate, |_| 1usize, |_| 0usize)
            else {
                continue;
            };
            if best
                .as_ref()
                .map_or(true, |(_, shortest)| path.len() < shortest.len())
            {
                best = Some((candidate, path));
            }
        }

        let (target, path) = best?;
        Some((
            self.label_of_index(target),
            path.into_iter().map(|n| self.label_of_index(n)).collect(),
        ))
    }

    /// Full record of the node with the given label (id, type, extra
    /// attributes carried through from the description file).
    pub fn node(&self, label: &str) -> Option<&NodeRecord> {
        let index = self.index_of_label(label)?;
        Some(&self.graph[index])
    }

    /// Relation tag on the edge between two labeled nodes, if one exists.
    pub fn relation(&self, a: &str, b: &str) -> Option<&str> {
        let (src, dst) = (self.index_of_label(a)?, self.index_of_label(b)?);
        let edge = self.graph.find_edge(src, dst)?;
        Some(self.graph[edge].as_str())
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn index_of_label(&self, label: &str) -> Option<NodeIndex> {
        let id = self.label_to_id.get(label)?;
        self.id_to_index.get(id).copied()
    }

    fn label_of_index(&self, index: NodeIndex) -> String {
        let node = &self.graph[index];
        self.id_to_label
            .get(&node.id)
            .cloned()
            .unwrap_or_else(|| node.id.clone())
    }
}
