//! Decoding and lineage tracking for Stratum v1 job announcements.
//!
//! Pools announce new work with `mining.notify`. Each announcement carries
//! the two halves of the coinbase transaction and the merkle branches the
//! miner needs to reach the block's merkle root. This crate rebuilds the
//! coinbase, decodes what the pool embedded in it, and tracks which pools
//! currently share which merkle branches.
//!
//! The pieces, leaves first:
//!
//! - [`coinbase`]: transaction wire decoding, scriptSig analysis (BIP34
//!   height, merge-mining commitment) and OP_RETURN protocol dispatch.
//! - [`lineage`]: the acyclic pool → branch graph.
//! - [`decoded`]: the per-template view-model built from a decode.
//! - [`changes`]: template-to-template change classification per pool.
//! - [`fee_rate`]: deduplicated fee-rate lookups for each template's first
//!   transaction.
//! - [`reconcile`]: the service object tying the above together over a
//!   live stream, with bounded caches and fee-rate lookups.

pub mod changes;
pub mod coinbase;
pub mod config;
pub mod decoded;
pub mod fee_rate;
pub mod lineage;
pub mod reconcile;
pub mod template;
pub mod tracing;

pub use config::ServiceConfig;
pub use decoded::DecodedTemplate;
pub use reconcile::StreamReconciliationCache;
pub use template::{CoinbaseRaw, StratumTemplate};
