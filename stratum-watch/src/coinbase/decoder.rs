use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use bitcoin::{Amount, Network};
use lru::LruCache;

use crate::config::ServiceConfig;
use crate::template::CoinbaseRaw;
use crate::tracing::prelude::*;

use super::outputs::{DecodedOutput, decode_outputs};
use super::script_sig::{ScriptSigInfo, analyze_script_sig};
use super::transaction::{ParsedTransaction, decode_coinbase};

/// Values derived from one coinbase transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinbaseAnalysis {
    pub tx: Arc<ParsedTransaction>,
    /// None when the transaction has no input to analyze.
    pub script_sig: Option<ScriptSigInfo>,
    pub outputs: Vec<DecodedOutput>,
    pub total_output_value: Amount,
    /// Printable pool tag from the scriptSig, None if it has none.
    pub ascii_tag: Option<String>,
}

/// Memoizing coinbase decoder.
///
/// Both caches key on [`CoinbaseRaw`]. A given raw value is parsed at most
/// once while it stays cached, and every caller gets the same
/// `Arc<ParsedTransaction>`. Lookups use `peek`, so entries age by insertion
/// and the oldest one is evicted first.
#[derive(Debug)]
pub struct CoinbaseDecoder {
    parsed: LruCache<CoinbaseRaw, Arc<ParsedTransaction>>,
    analyses: LruCache<CoinbaseRaw, Arc<CoinbaseAnalysis>>,
    network: Network,
    ascii_max_chars: usize,
}

impl CoinbaseDecoder {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            parsed: bounded(config.parsed_tx_cache_capacity),
            analyses: bounded(config.analysis_cache_capacity),
            network: config.network,
            ascii_max_chars: config.ascii_tag_max_chars,
        }
    }

    /// Parse `raw`, reusing the cached result when there is one.
    pub fn parse(&mut self, raw: &CoinbaseRaw) -> Arc<ParsedTransaction> {
        if let Some(tx) = self.parsed.peek(raw) {
            return Arc::clone(tx);
        }

        let tx = Arc::new(decode_coinbase(raw));
        if let Some(error) = &tx.error {
            debug!(error = %error, len = raw.as_str().len(), "Coinbase decoded partially");
        }

        if let Some((evicted, _)) = self.parsed.push(raw.clone(), Arc::clone(&tx)) {
            if &evicted != raw {
                trace!(coinbase_len = evicted.as_str().len(), "Evicted parsed coinbase");
            }
        }
        tx
    }

    /// Full analysis of `raw`, cached alongside the parse.
    pub fn analyze(&mut self, raw: &CoinbaseRaw) -> Arc<CoinbaseAnalysis> {
        if let Some(analysis) = self.analyses.peek(raw) {
            return Arc::clone(analysis);
        }

        let tx = self.parse(raw);
        let script_sig = tx
            .script_sig()
            .map(|script| analyze_script_sig(script, self.ascii_max_chars));
        let ascii_tag = script_sig
            .as_ref()
            .map(|info| info.remaining_ascii.clone())
            .filter(|tag| !tag.is_empty());

        let analysis = Arc::new(CoinbaseAnalysis {
            outputs: decode_outputs(&tx.outputs, self.network),
            total_output_value: tx.total_output_value(),
            script_sig,
            ascii_tag,
            tx,
        });

        if let Some((evicted, _)) = self.analyses.push(raw.clone(), Arc::clone(&analysis)) {
            if &evicted != raw {
                trace!(coinbase_len = evicted.as_str().len(), "Evicted coinbase analysis");
            }
        }
        analysis
    }

    /// Drop everything cached for `raw`.
    pub fn evict(&mut self, raw: &CoinbaseRaw) {
        self.parsed.pop(raw);
        self.analyses.pop(raw);
    }

    pub fn is_cached(&self, raw: &CoinbaseRaw) -> bool {
        self.parsed.contains(raw) || self.analyses.contains(raw)
    }

    pub fn parsed_len(&self) -> usize {
        self.parsed.len()
    }

    pub fn analysis_len(&self) -> usize {
        self.analyses.len()
    }

    pub fn clear(&mut self) {
        self.parsed.clear();
        self.analyses.clear();
    }
}

/// An LRU cache holding at most `capacity` entries; zero is treated as one.
fn bounded<K: Hash + Eq, V>(capacity: usize) -> LruCache<K, V> {
    LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coinbase::test_data::foundry;

    fn decoder_with_capacity(capacity: usize) -> CoinbaseDecoder {
        CoinbaseDecoder::new(&ServiceConfig {
            parsed_tx_cache_capacity: capacity,
            analysis_cache_capacity: capacity,
            ..Default::default()
        })
    }

    #[test]
    fn parse_is_memoized_per_raw_value() {
        let mut decoder = decoder_with_capacity(10);
        let a = decoder.parse(&foundry::coinbase_raw());
        let b = decoder.parse(&foundry::coinbase_raw());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(decoder.parsed_len(), 1);
    }

    #[test]
    fn analysis_shares_the_cached_parse() {
        let mut decoder = decoder_with_capacity(10);
        let raw = foundry::coinbase_raw();
        let tx = decoder.parse(&raw);
        let analysis = decoder.analyze(&raw);

        assert!(Arc::ptr_eq(&tx, &analysis.tx));
        assert_eq!(analysis.ascii_tag.as_deref(), Some(foundry::ASCII_TAG));
        assert_eq!(analysis.total_output_value.to_sat(), foundry::TOTAL_OUTPUT_SAT);
        assert_eq!(analysis.outputs.len(), 3);
        assert_eq!(
            analysis.script_sig.as_ref().and_then(|s| s.height),
            Some(foundry::HEIGHT)
        );
    }

    #[test]
    fn undecodable_coinbase_still_analyzes() {
        let mut decoder = decoder_with_capacity(10);
        let analysis = decoder.analyze(&CoinbaseRaw::from_parts("nothex", "", 0, ""));

        assert!(analysis.tx.error.is_some());
        assert!(analysis.script_sig.is_none());
        assert!(analysis.ascii_tag.is_none());
        assert!(analysis.outputs.is_empty());
        assert_eq!(analysis.total_output_value, Amount::ZERO);
    }

    #[test]
    fn caches_stay_within_capacity() {
        let mut decoder = decoder_with_capacity(3);
        for i in 0..10u8 {
            let raw = CoinbaseRaw::from_parts(&hex::encode([i]), "", 0, "");
            decoder.analyze(&raw);
            assert!(decoder.parsed_len() <= 3);
            assert!(decoder.analysis_len() <= 3);
        }
        assert_eq!(decoder.parsed_len(), 3);
    }

    #[test]
    fn evicts_oldest_insertion_even_after_reads() {
        let mut decoder = decoder_with_capacity(2);
        let raws: Vec<_> = (0..3u8)
            .map(|i| CoinbaseRaw::from_parts(&hex::encode([i]), "", 0, ""))
            .collect();

        decoder.parse(&raws[0]);
        decoder.parse(&raws[1]);
        // A cache hit must not make the first entry younger.
        decoder.parse(&raws[0]);
        decoder.parse(&raws[2]);

        assert!(!decoder.is_cached(&raws[0]));
        assert!(decoder.is_cached(&raws[1]));
        assert!(decoder.is_cached(&raws[2]));
    }

    #[test]
    fn zero_capacity_keeps_one_entry() {
        let mut decoder = decoder_with_capacity(0);
        decoder.parse(&CoinbaseRaw::from_parts("01", "", 0, ""));
        decoder.parse(&CoinbaseRaw::from_parts("02", "", 0, ""));

        assert_eq!(decoder.parsed_len(), 1);
    }

    #[test]
    fn evict_drops_both_entries() {
        let mut decoder = decoder_with_capacity(10);
        let raw = foundry::coinbase_raw();
        decoder.analyze(&raw);
        assert!(decoder.is_cached(&raw));

        decoder.evict(&raw);

        assert!(!decoder.is_cached(&raw));
        assert_eq!(decoder.parsed_len(), 0);
        assert_eq!(decoder.analysis_len(), 0);
    }
}
