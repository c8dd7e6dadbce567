//! Service configuration.

use bitcoin::Network;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Entries kept in the parsed-transaction cache before the oldest is
    /// evicted.
    pub parsed_tx_cache_capacity: usize,

    /// Entries kept in the per-coinbase analysis cache (ASCII tag, outputs,
    /// output value).
    pub analysis_cache_capacity: usize,

    /// Number of distinct heights retained for historical views.
    pub history_depth: usize,

    /// Display length of the scriptSig ASCII tag before it is cut with an
    /// ellipsis.
    pub ascii_tag_max_chars: usize,

    /// Network used to render output addresses.
    pub network: Network,

    /// Base URL of an Esplora-style API for first-transaction fee rates.
    /// None disables lookups.
    pub fee_rate_api_url: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            parsed_tx_cache_capacity: 1000,
            analysis_cache_capacity: 1000,
            history_depth: 100,
            ascii_tag_max_chars: 64,
            network: Network::Bitcoin,
            fee_rate_api_url: None,
        }
    }
}
