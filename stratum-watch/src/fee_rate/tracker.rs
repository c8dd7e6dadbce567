use std::collections::HashMap;
use std::sync::Arc;

use bitcoin::Txid;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::tracing::prelude::*;

use super::{FeeRateSource, FeeRateState, FeeRateUpdate};

/// Deduplicating fee rate lookup table.
///
/// Each txid is looked up at most once per session. `Pending` entries are
/// the in-flight markers; terminal states (including `NotFound` and
/// `Failed`) stay cached until [`reset`](Self::reset).
///
/// Lookups are tied to the active view. [`cancel_view`](Self::cancel_view)
/// stops every lookup still in flight and removes its marker, so a later
/// request for the same txid starts over.
pub struct FeeRateTracker {
    source: Option<Arc<dyn FeeRateSource>>,
    states: Arc<Mutex<HashMap<Txid, FeeRateState>>>,
    view: CancellationToken,
    updates_tx: mpsc::UnboundedSender<FeeRateUpdate>,
    updates_rx: mpsc::UnboundedReceiver<FeeRateUpdate>,
}

impl FeeRateTracker {
    /// A tracker without a source never starts lookups.
    pub fn new(source: Option<Arc<dyn FeeRateSource>>) -> Self {
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        Self {
            source,
            states: Arc::new(Mutex::new(HashMap::new())),
            view: CancellationToken::new(),
            updates_tx,
            updates_rx,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    /// Current state for `txid`, starting a lookup if there is none.
    ///
    /// Returns None when lookups are disabled.
    pub fn request(&self, txid: Txid) -> Option<FeeRateState> {
        let source = self.source.as_ref()?;

        let mut states = self.states.lock();
        if let Some(state) = states.get(&txid) {
            return Some(state.clone());
        }

        let Ok(runtime) = Handle::try_current() else {
            let state = FeeRateState::Failed {
                reason: "no async runtime".to_string(),
            };
            states.insert(txid, state.clone());
            return Some(state);
        };

        states.insert(txid, FeeRateState::Pending);
        drop(states);

        let source = Arc::clone(source);
        let states = Arc::clone(&self.states);
        let updates = self.updates_tx.clone();
        let cancelled = self.view.clone();

        trace!(txid = %txid, "Starting fee rate lookup");
        runtime.spawn(async move {
            tokio::select! {
                result = source.fee_rate(txid) => {
                    let state = FeeRateState::from(result);
                    {
                        let mut states = states.lock();
                        // The marker is gone if the view was cancelled or
                        // the tracker reset while the request was out.
                        if states.get(&txid) != Some(&FeeRateState::Pending) {
                            return;
                        }
                        states.insert(txid, state.clone());
                    }
                    debug!(txid = %txid, state = ?state, "Fee rate resolved");
                    if updates.send(FeeRateUpdate { txid, state }).is_err() {
                        trace!(txid = %txid, "Fee rate receiver gone, update dropped");
                    }
                }
                _ = cancelled.cancelled() => {
                    trace!(txid = %txid, "Fee rate lookup cancelled");
                }
            }
        });

        Some(FeeRateState::Pending)
    }

    pub fn state(&self, txid: &Txid) -> Option<FeeRateState> {
        self.states.lock().get(txid).cloned()
    }

    pub fn in_flight(&self) -> usize {
        self.states
            .lock()
            .values()
            .filter(|s| !s.is_terminal())
            .count()
    }

    /// Stop lookups started for the current view and drop their markers.
    /// Results already resolved stay cached.
    pub fn cancel_view(&mut self) {
        self.view.cancel();
        self.view = CancellationToken::new();

        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|_, s| s.is_terminal());
        let dropped = before - states.len();
        if dropped > 0 {
            debug!(dropped, "Cancelled in-flight fee rate lookups");
        }
    }

    /// Resolved lookups not yet collected.
    pub fn drain_updates(&mut self) -> Vec<FeeRateUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.updates_rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    /// Wait for the next resolved lookup.
    pub async fn next_update(&mut self) -> Option<FeeRateUpdate> {
        self.updates_rx.recv().await
    }

    /// Cancel everything and forget every cached result.
    pub fn reset(&mut self) {
        self.cancel_view();
        self.states.lock().clear();
        self.drain_updates();
    }
}
