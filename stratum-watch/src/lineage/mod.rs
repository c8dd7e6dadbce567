//! Pool → merkle branch lineage graph.
//!
//! Every pool's latest template contributes a chain `pool → b0 → b1 → …`.
//! Overlapping chains show which pools currently build on the same
//! transaction set. The graph stays acyclic: an edge that would close a cycle
//! is dropped and reported instead of inserted.

mod graph;
mod snapshot;

pub use graph::{ChainUpdate, EdgeRejection, MerkleLineageGraph, NodeId, NodeKind, TerminalBranch};
pub use snapshot::{EdgeSnapshot, GraphSnapshot, NodeSnapshot};
