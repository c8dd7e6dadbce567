//! First-transaction fee rate lookups.
//!
//! The first merkle branch of a template is the txid of the first
//! transaction the pool put in the block, which makes its fee rate a cheap
//! hint of how the pool orders its mempool. Lookups go to an external
//! service, so they run on spawned tasks and never hold up template
//! ingestion. Results arrive later as [`FeeRateUpdate`]s.

mod esplora;
mod tracker;

use async_trait::async_trait;
use bitcoin::Txid;
use serde::Serialize;
use thiserror::Error;

pub use esplora::EsploraClient;
pub use tracker::FeeRateTracker;

#[derive(Debug, Error)]
pub enum FeeRateError {
    #[error("transaction not found")]
    NotFound,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unusable response: {0}")]
    InvalidResponse(String),
}

/// Where a fee rate can be looked up.
#[async_trait]
pub trait FeeRateSource: Send + Sync {
    /// Fee rate of `txid` in sat/vB.
    async fn fee_rate(&self, txid: Txid) -> Result<f64, FeeRateError>;
}

/// Lookup state of one transaction's fee rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeeRateState {
    Pending,
    Known { sat_per_vb: f64 },
    NotFound,
    Failed { reason: String },
}

impl FeeRateState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl From<Result<f64, FeeRateError>> for FeeRateState {
    fn from(result: Result<f64, FeeRateError>) -> Self {
        match result {
            Ok(sat_per_vb) => Self::Known { sat_per_vb },
            Err(FeeRateError::NotFound) => Self::NotFound,
            Err(e) => Self::Failed {
                reason: e.to_string(),
            },
        }
    }
}

/// A lookup that reached a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeRateUpdate {
    pub txid: Txid,
    pub state: FeeRateState,
}
