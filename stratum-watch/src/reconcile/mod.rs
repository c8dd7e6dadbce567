//! The service object that owns all per-session state.
//!
//! Nothing in this crate is global: the parse caches, the lineage graph, the
//! change detector and the fee rate table all hang off one
//! [`StreamReconciliationCache`]. Two sessions (say, a live one and a replay)
//! are two values and cannot see each other's state.

mod service;
mod view;

pub use service::{IngestError, IngestOutcome, StreamReconciliationCache};
pub use view::ActiveView;
