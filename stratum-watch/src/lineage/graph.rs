use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use strum::Display;
use thiserror::Error;

use crate::tracing::prelude::*;

use super::snapshot::{EdgeSnapshot, GraphSnapshot, NodeSnapshot};

/// Node identifier, assigned on first sight and never reused until
/// [`MerkleLineageGraph::reset`].
pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Pool,
    Branch,
}

/// An edge left out of the graph because it would break acyclicity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdgeRejection {
    #[error("{pool}: branch {node} follows itself")]
    SelfLoop { pool: String, node: String },

    #[error("{pool}: edge {from} -> {to} would close a cycle")]
    ClosesCycle {
        pool: String,
        from: String,
        to: String,
    },
}

/// Outcome of applying one pool's chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainUpdate {
    /// Edges now attributed to the pool.
    pub applied: usize,
    pub rejected: Vec<EdgeRejection>,
}

/// A pool's last resolvable branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TerminalBranch {
    pub pool: String,
    pub node: NodeId,
    pub name: String,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    name: String,
    branch_index: Option<usize>,
}

/// Directed acyclic graph of pools and the merkle branches they announce.
///
/// All mutation goes through [`apply_chain`](Self::apply_chain): the pool's
/// previous chain is retracted in full, then the new chain's edges are
/// inserted one by one, each checked for cycles first. Branch node names are
/// stored lowercase.
#[derive(Debug, Default)]
pub struct MerkleLineageGraph {
    nodes: Vec<Node>,
    ids: HashMap<(NodeKind, String), NodeId>,
    edges: BTreeMap<(NodeId, NodeId), BTreeSet<String>>,
    chains: BTreeMap<String, Vec<String>>,
}

impl MerkleLineageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `pool`'s chain with `branches` (display-order hashes,
    /// coinbase sibling first).
    pub fn apply_chain(&mut self, pool: &str, branches: &[String]) -> ChainUpdate {
        self.retract(pool);
        self.chains.insert(pool.to_string(), branches.to_vec());

        let mut path = Vec::with_capacity(branches.len() + 1);
        path.push(self.intern(NodeKind::Pool, pool));
        for (index, branch) in branches.iter().enumerate() {
            let id = self.intern(NodeKind::Branch, branch);
            self.nodes[id as usize].branch_index = Some(index);
            path.push(id);
        }

        let mut update = ChainUpdate::default();
        for pair in path.windows(2) {
            match self.insert_edge(pool, pair[0], pair[1]) {
                Ok(()) => update.applied += 1,
                Err(rejection) => {
                    warn!(
                        pool = %pool,
                        from = %self.name_of(pair[0]),
                        to = %self.name_of(pair[1]),
                        reason = %rejection,
                        "Rejected lineage edge"
                    );
                    update.rejected.push(rejection);
                }
            }
        }

        debug!(
            pool = %pool,
            branches = branches.len(),
            applied = update.applied,
            rejected = update.rejected.len(),
            "Applied chain"
        );
        update
    }

    /// Forget `pool` entirely, retracting its edges.
    pub fn remove_pool(&mut self, pool: &str) -> bool {
        let had_chain = self.chains.contains_key(pool);
        self.retract(pool);
        had_chain
    }

    pub fn chain(&self, pool: &str) -> Option<&[String]> {
        self.chains.get(pool).map(Vec::as_slice)
    }

    pub fn node_id(&self, kind: NodeKind, name: &str) -> Option<NodeId> {
        self.ids.get(&(kind, node_key(kind, name))).copied()
    }

    /// Pools traversing `source → target`, None if the edge does not exist.
    pub fn pools_for_edge(&self, source: NodeId, target: NodeId) -> Option<&BTreeSet<String>> {
        self.edges.get(&(source, target))
    }

    /// Every pool whose current chain passes through branch `name`.
    pub fn pools_through_branch(&self, name: &str) -> BTreeSet<String> {
        let mut pools = BTreeSet::new();

        if let Some(id) = self.node_id(NodeKind::Branch, name) {
            for ((source, target), set) in &self.edges {
                if *source == id || *target == id {
                    pools.extend(set.iter().cloned());
                }
            }
        }

        for (pool, chain) in &self.chains {
            if chain.iter().any(|b| b.eq_ignore_ascii_case(name)) {
                pools.insert(pool.clone());
            }
        }

        pools
    }

    /// Each pool's last branch that resolves to an active node.
    ///
    /// The literal hash is tried first, then a case-insensitive match; if
    /// neither resolves, earlier branches of the chain are tried in turn.
    pub fn terminal_branches(&self) -> Vec<TerminalBranch> {
        let active = self.active_nodes();

        let resolve = |name: &str| -> Option<NodeId> {
            if let Some(&id) = self.ids.get(&(NodeKind::Branch, name.to_string())) {
                if active.contains(&id) {
                    return Some(id);
                }
            }
            self.nodes
                .iter()
                .enumerate()
                .filter(|(_, n)| n.kind == NodeKind::Branch && n.name.eq_ignore_ascii_case(name))
                .map(|(i, _)| i as NodeId)
                .find(|id| active.contains(id))
        };

        self.chains
            .iter()
            .filter_map(|(pool, chain)| {
                let node = chain.iter().rev().find_map(|b| resolve(b.as_str()))?;
                Some(TerminalBranch {
                    pool: pool.clone(),
                    node,
                    name: self.nodes[node as usize].name.clone(),
                })
            })
            .collect()
    }

    /// Nodes touching at least one edge and all edges, ordered by id.
    pub fn snapshot(&self) -> GraphSnapshot {
        let active = self.active_nodes();

        let nodes = active
            .iter()
            .map(|&id| {
                let node = &self.nodes[id as usize];
                NodeSnapshot {
                    id,
                    kind: node.kind,
                    name: node.name.clone(),
                    branch_index: node.branch_index,
                }
            })
            .collect();

        let edges = self
            .edges
            .iter()
            .map(|(&(source, target), pools)| EdgeSnapshot {
                source,
                target,
                weight: pools.len(),
            })
            .collect();

        GraphSnapshot { nodes, edges }
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn reset(&mut self) {
        self.nodes.clear();
        self.ids.clear();
        self.edges.clear();
        self.chains.clear();
    }

    fn intern(&mut self, kind: NodeKind, name: &str) -> NodeId {
        let key = (kind, node_key(kind, name));
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }

        let id = self.nodes.len() as NodeId;
        self.nodes.push(Node {
            kind,
            name: key.1.clone(),
            branch_index: None,
        });
        self.ids.insert(key, id);
        id
    }

    fn name_of(&self, id: NodeId) -> &str {
        self.nodes
            .get(id as usize)
            .map(|n| n.name.as_str())
            .unwrap_or("?")
    }

    fn retract(&mut self, pool: &str) {
        let Some(chain) = self.chains.remove(pool) else {
            return;
        };

        let mut path = vec![self.node_id(NodeKind::Pool, pool)];
        path.extend(chain.iter().map(|b| self.node_id(NodeKind::Branch, b)));

        for pair in path.windows(2) {
            let (Some(source), Some(target)) = (pair[0], pair[1]) else {
                continue;
            };
            let key = (source, target);
            if let Some(pools) = self.edges.get_mut(&key) {
                pools.remove(pool);
                if pools.is_empty() {
                    self.edges.remove(&key);
                    trace!(pool = %pool, from = source, to = target, "Removed edge");
                }
            }
        }
    }

    fn insert_edge(
        &mut self,
        pool: &str,
        source: NodeId,
        target: NodeId,
    ) -> Result<(), EdgeRejection> {
        if source == target {
            return Err(EdgeRejection::SelfLoop {
                pool: pool.to_string(),
                node: self.name_of(source).to_string(),
            });
        }

        if !self.edges.contains_key(&(source, target)) && self.reaches(target, source) {
            return Err(EdgeRejection::ClosesCycle {
                pool: pool.to_string(),
                from: self.name_of(source).to_string(),
                to: self.name_of(target).to_string(),
            });
        }

        self.edges
            .entry((source, target))
            .or_default()
            .insert(pool.to_string());
        Ok(())
    }

    /// Depth-first search for a path `from →* to` over the current edges.
    fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();

        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            stack.extend(
                self.edges
                    .range((node, NodeId::MIN)..=(node, NodeId::MAX))
                    .map(|(&(_, next), _)| next),
            );
        }

        false
    }

    fn active_nodes(&self) -> BTreeSet<NodeId> {
        self.edges
            .keys()
            .flat_map(|&(source, target)| [source, target])
            .collect()
    }
}

fn node_key(kind: NodeKind, name: &str) -> String {
    match kind {
        NodeKind::Pool => name.to_string(),
        NodeKind::Branch => name.to_ascii_lowercase(),
    }
}
