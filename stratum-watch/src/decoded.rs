//! The per-template view-model handed to collaborators.

use std::collections::BTreeMap;

use bitcoin::Txid;
use serde::Serialize;

use crate::coinbase::{
    CoinbaseAnalysis, DecodedOutput, OpReturnRecord, ProtocolFamily, ScriptSigInfo,
};
use crate::fee_rate::FeeRateState;
use crate::template::{self, CoinbaseRaw, StratumTemplate};

/// A template with everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedTemplate {
    #[serde(flatten)]
    pub template: StratumTemplate,
    pub coinbase_raw: CoinbaseRaw,

    /// Previous block hash in explorer order, None if the field is unusable.
    pub prev_hash_display: Option<String>,
    /// Merkle branches in txid order.
    pub merkle_branches_display: Vec<String>,

    pub tx_version: Option<i32>,
    pub segwit: bool,
    pub input_sequence: Option<u32>,
    pub lock_time: Option<u32>,
    pub witness_nonce: Option<String>,
    /// Why decoding stopped early, if it did.
    pub decode_error: Option<String>,

    pub script_sig: Option<ScriptSigInfo>,
    pub ascii_tag: Option<String>,
    pub total_output_sat: u64,
    pub outputs: Vec<DecodedOutput>,

    /// First non-coinbase transaction, from the first merkle branch.
    pub first_txid: Option<Txid>,
    /// None when lookups are disabled or the template has no branches.
    pub first_tx_fee_rate: Option<FeeRateState>,
}

impl DecodedTemplate {
    pub fn new(template: StratumTemplate, analysis: &CoinbaseAnalysis) -> Self {
        let tx = &analysis.tx;
        Self {
            coinbase_raw: template.coinbase_raw(),
            prev_hash_display: template::prev_hash_display(&template.prev_hash),
            merkle_branches_display: template.merkle_branches_display(),
            tx_version: tx.version,
            segwit: tx.segwit,
            input_sequence: tx.input_sequence(),
            lock_time: tx.lock_time,
            witness_nonce: tx.witness_nonce(),
            decode_error: tx.error.as_ref().map(ToString::to_string),
            script_sig: analysis.script_sig.clone(),
            ascii_tag: analysis.ascii_tag.clone(),
            total_output_sat: analysis.total_output_value.to_sat(),
            outputs: analysis.outputs.clone(),
            first_txid: template.first_transaction_txid(),
            first_tx_fee_rate: None,
            template,
        }
    }

    pub fn pool_name(&self) -> &str {
        &self.template.pool_name
    }

    pub fn job_id(&self) -> &str {
        &self.template.job_id
    }

    pub fn height(&self) -> u64 {
        self.template.height
    }

    /// OP_RETURN records grouped by protocol family, in output order.
    pub fn protocols(&self) -> BTreeMap<ProtocolFamily, Vec<&OpReturnRecord>> {
        let mut by_family: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for record in self.outputs.iter().filter_map(|o| o.op_return.as_ref()) {
            by_family.entry(record.family()).or_default().push(record);
        }
        by_family
    }
}
