//! Traffic knowledge graph: description format and label-keyed queries.
//!
//! Nodes carry stable ids (INT_1, RD_1, HOSP_1, ...) but every query
//! operation is keyed by the human-readable `label` value
//! (e.g. "Intersection 4", "Central Hospital").

mod store;

pub use store::KnowledgeGraph;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Relation tag applied to edges that do not carry one.
pub const DEFAULT_RELATION: &str = "CONNECTED_TO";

/// A node record as it appears in the graph description file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable unique identifier, e.g. `INT_1`.
    pub id: String,
    /// Human-readable unique name; falls back to the id when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Free-form category tag, e.g. `intersection`, `road`, `hospital`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// Any additional fields, preserved verbatim.
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

/// An edge record as it appears in the graph description file.
///
/// Edges are undirected; `from`/`to` only name the endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

/// Top-level shape of the graph description file.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GraphDescription {
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}
