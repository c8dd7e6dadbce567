use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::changes::{ChangeKind, TemplateChange, TemplateChangeDetector};
use crate::coinbase::CoinbaseDecoder;
use crate::config::ServiceConfig;
use crate::decoded::DecodedTemplate;
use crate::fee_rate::{
    EsploraClient, FeeRateError, FeeRateSource, FeeRateState, FeeRateTracker, FeeRateUpdate,
};
use crate::lineage::{EdgeRejection, GraphSnapshot, MerkleLineageGraph};
use crate::template::{StratumTemplate, TemplateError};
use crate::tracing::prelude::*;

use super::view::ActiveView;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("rejected template from {pool:?}: {source}")]
    Invalid {
        pool: String,
        #[source]
        source: TemplateError,
    },
}

/// What happened to one ingested template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub change: TemplateChange,
    /// Lineage edges of the template's chain that were left out.
    pub rejected_edges: Vec<EdgeRejection>,
    /// False for duplicates and for templates older than the pool's live
    /// one.
    pub live: bool,
}

impl IngestOutcome {
    pub fn indicator(&self) -> String {
        self.change.indicator()
    }
}

/// Decodes a stream of templates and keeps the derived state consistent.
///
/// Each call to [`ingest`](Self::ingest) fully applies one template before
/// returning. Fee rate lookups are the only deferred work; their results
/// are folded into the stored templates by
/// [`apply_fee_rate_updates`](Self::apply_fee_rate_updates).
pub struct StreamReconciliationCache {
    config: ServiceConfig,
    decoder: CoinbaseDecoder,
    graph: MerkleLineageGraph,
    changes: TemplateChangeDetector,
    fee_rates: FeeRateTracker,
    /// Latest template per pool.
    live: BTreeMap<String, DecodedTemplate>,
    /// Last template per pool at each retained height.
    history: BTreeMap<u64, BTreeMap<String, DecodedTemplate>>,
    view: ActiveView,
}

impl StreamReconciliationCache {
    /// Build a service, querying `fee_rate_api_url` for fee rates if set.
    pub fn new(config: ServiceConfig) -> Result<Self, FeeRateError> {
        let source = match &config.fee_rate_api_url {
            Some(url) => {
                let client: Arc<dyn FeeRateSource> = Arc::new(EsploraClient::new(url.as_str())?);
                Some(client)
            }
            None => None,
        };
        Ok(Self::with_fee_rate_source(config, source))
    }

    pub fn with_fee_rate_source(
        config: ServiceConfig,
        source: Option<Arc<dyn FeeRateSource>>,
    ) -> Self {
        Self {
            decoder: CoinbaseDecoder::new(&config),
            graph: MerkleLineageGraph::new(),
            changes: TemplateChangeDetector::new(),
            fee_rates: FeeRateTracker::new(source),
            live: BTreeMap::new(),
            history: BTreeMap::new(),
            view: ActiveView::Live,
            config,
        }
    }

    /// Decode `template` and apply it.
    pub fn ingest(&mut self, template: StratumTemplate) -> Result<IngestOutcome, IngestError> {
        if let Err(source) = template.validate() {
            warn!(
                pool = %template.pool_name,
                job_id = %template.job_id,
                error = %source,
                "Rejected template"
            );
            return Err(IngestError::Invalid {
                pool: template.pool_name,
                source,
            });
        }

        if self.changes.is_duplicate(&template.pool_name, &template.job_id) {
            trace!(pool = %template.pool_name, job_id = %template.job_id, "Duplicate job");
            return Ok(IngestOutcome {
                change: TemplateChange {
                    pool: template.pool_name,
                    job_id: template.job_id,
                    kind: ChangeKind::Duplicate,
                    changes: Vec::new(),
                },
                rejected_edges: Vec::new(),
                live: false,
            });
        }

        let raw = template.coinbase_raw();
        let analysis = self.decoder.analyze(&raw);
        let mut decoded = DecodedTemplate::new(template, &analysis);

        let change = self.changes.observe(&decoded);

        let pool = decoded.pool_name().to_string();
        let height = decoded.height();

        let newest = self
            .live
            .get(&pool)
            .is_none_or(|current| height >= current.height());

        if newest && self.view == ActiveView::Live {
            self.request_fee_rate(&mut decoded);
        }

        self.history
            .entry(height)
            .or_default()
            .insert(pool.clone(), decoded.clone());
        self.trim_history();

        let mut rejected_edges = Vec::new();
        if newest {
            rejected_edges = self
                .graph
                .apply_chain(&pool, &decoded.merkle_branches_display)
                .rejected;

            if let Some(previous) = self.live.insert(pool.clone(), decoded) {
                self.release_coinbase(&previous);
            }
        } else {
            self.release_coinbase(&decoded);
        }

        debug!(
            pool = %pool,
            job_id = %change.job_id,
            height,
            indicator = %change.indicator(),
            "Ingested template"
        );

        Ok(IngestOutcome {
            change,
            rejected_edges,
            live: newest,
        })
    }

    /// Ingest several templates. Each succeeds or fails on its own.
    pub fn ingest_batch(
        &mut self,
        templates: impl IntoIterator<Item = StratumTemplate>,
    ) -> Vec<Result<IngestOutcome, IngestError>> {
        templates.into_iter().map(|t| self.ingest(t)).collect()
    }

    /// Latest template of every pool, ordered by pool name.
    pub fn live_view(&self) -> Vec<&DecodedTemplate> {
        self.live.values().collect()
    }

    /// Every pool's last template at `height`, ordered by pool name.
    pub fn historical_view(&self, height: u64) -> Vec<&DecodedTemplate> {
        self.history
            .get(&height)
            .map(|pools| pools.values().collect())
            .unwrap_or_default()
    }

    /// Retained heights, oldest first.
    pub fn heights(&self) -> Vec<u64> {
        self.history.keys().copied().collect()
    }

    pub fn active_view(&self) -> ActiveView {
        self.view
    }

    /// Switch views. Lookups still in flight for the old view are
    /// cancelled; the new view's templates get lookups of their own.
    pub fn set_active_view(&mut self, view: ActiveView) {
        if view == self.view {
            return;
        }
        debug!(from = ?self.view, to = ?view, "Switching view");

        self.fee_rates.cancel_view();
        for decoded in self.stored_mut() {
            if decoded.first_tx_fee_rate == Some(FeeRateState::Pending) {
                decoded.first_tx_fee_rate = None;
            }
        }

        self.view = view;
        let targets: Vec<(String, u64)> = match view {
            ActiveView::Live => self
                .live
                .values()
                .map(|d| (d.pool_name().to_string(), d.height()))
                .collect(),
            ActiveView::Historical(height) => self
                .historical_view(height)
                .into_iter()
                .map(|d| (d.pool_name().to_string(), height))
                .collect(),
        };

        for (pool, height) in targets {
            let state = match view {
                ActiveView::Live => self.live.get(&pool),
                ActiveView::Historical(_) => self.history.get(&height).and_then(|p| p.get(&pool)),
            }
            .and_then(|d| d.first_txid)
            .and_then(|txid| self.fee_rates.request(txid));

            let target = match view {
                ActiveView::Live => self.live.get_mut(&pool),
                ActiveView::Historical(_) => self
                    .history
                    .get_mut(&height)
                    .and_then(|p| p.get_mut(&pool)),
            };
            if let Some(decoded) = target {
                decoded.first_tx_fee_rate = state;
            }
        }
    }

    /// Fold resolved fee rate lookups into the stored templates. Returns the
    /// number of templates updated.
    pub fn apply_fee_rate_updates(&mut self) -> usize {
        let updates = self.fee_rates.drain_updates();
        updates.iter().map(|u| self.apply_fee_rate(u)).sum()
    }

    /// Wait for the next fee rate lookup to resolve and apply it.
    pub async fn next_fee_rate_update(&mut self) -> Option<FeeRateUpdate> {
        let update = self.fee_rates.next_update().await?;
        self.apply_fee_rate(&update);
        Some(update)
    }

    pub fn fee_rates_enabled(&self) -> bool {
        self.fee_rates.is_enabled()
    }

    pub fn fee_rates_in_flight(&self) -> usize {
        self.fee_rates.in_flight()
    }

    pub fn graph(&self) -> &MerkleLineageGraph {
        &self.graph
    }

    pub fn graph_snapshot(&self) -> GraphSnapshot {
        self.graph.snapshot()
    }

    pub fn decoder(&self) -> &CoinbaseDecoder {
        &self.decoder
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Drop all state, including cached fee rate results.
    pub fn reset(&mut self) {
        self.decoder.clear();
        self.graph.reset();
        self.changes.reset();
        self.fee_rates.reset();
        self.live.clear();
        self.history.clear();
        self.view = ActiveView::Live;
        info!("Session state reset");
    }

    fn request_fee_rate(&self, decoded: &mut DecodedTemplate) {
        decoded.first_tx_fee_rate = decoded
            .first_txid
            .and_then(|txid| self.fee_rates.request(txid));
    }

    fn apply_fee_rate(&mut self, update: &FeeRateUpdate) -> usize {
        let mut applied = 0;
        for decoded in self.stored_mut() {
            if decoded.first_txid == Some(update.txid) {
                decoded.first_tx_fee_rate = Some(update.state.clone());
                applied += 1;
            }
        }
        applied
    }

    fn stored_mut(&mut self) -> impl Iterator<Item = &mut DecodedTemplate> {
        self.live
            .values_mut()
            .chain(self.history.values_mut().flat_map(|pools| pools.values_mut()))
    }

    fn trim_history(&mut self) {
        let depth = self.config.history_depth.max(1);
        while self.history.len() > depth {
            if let Some((height, _)) = self.history.pop_first() {
                trace!(height, "Dropped history height");
            }
        }
    }

    /// Evict the cached decode of `previous` unless a live template still
    /// uses the same coinbase.
    fn release_coinbase(&mut self, previous: &DecodedTemplate) {
        let raw = &previous.coinbase_raw;
        if self.live.values().any(|d| &d.coinbase_raw == raw) {
            return;
        }
        self.decoder.evict(raw);
        trace!(pool = %previous.pool_name(), "Evicted unreferenced coinbase");
    }
}
