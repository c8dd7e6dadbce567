use serde::Serialize;

use super::graph::{NodeId, NodeKind};

/// Serializable view of the active part of the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    #[serde(rename = "branchIndex", skip_serializing_if = "Option::is_none")]
    pub branch_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeSnapshot {
    pub source: NodeId,
    pub target: NodeId,
    /// Number of pools traversing the edge.
    pub weight: usize,
}

impl GraphSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_named(&self, kind: NodeKind, name: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.kind == kind && n.name == name)
    }
}
