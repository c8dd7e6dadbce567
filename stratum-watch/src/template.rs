//! Inbound job announcements and the byte-order rules for their hashes.
//!
//! A [`StratumTemplate`] is one `mining.notify` as delivered by the
//! transport, flattened together with the pool's subscription data
//! (extranonce1 and extranonce2 size). Templates are immutable; a pool's
//! next job id supersedes the previous one.
//!
//! # Byte order
//!
//! Hashes arrive in whatever order the Stratum wire uses, and every place
//! that displays them goes through this module:
//!
//! - Merkle branches are sent in internal byte order. They are displayed in
//!   txid order (the full 32 bytes reversed), which is also the form used for
//!   graph node names.
//! - `prev_hash` is sent with every 4-byte word byte-swapped. Swapping the
//!   words back yields internal order; reversing that yields the familiar
//!   block hash.
//! - `version`, `nbits` and `ntime` are big-endian 32-bit hex.

use std::fmt;

use bitcoin::hashes::Hash;
use bitcoin::{BlockHash, TxMerkleNode, Txid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest extranonce2 accepted from a pool, in bytes.
pub const MAX_EXTRANONCE2_LENGTH: usize = 16;

/// Errors detected when checking an inbound template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template has an empty pool name")]
    EmptyPoolName,

    #[error("template from {0} has an empty job id")]
    EmptyJobId(String),

    #[error("field {field} must be {expected} hex characters, got {value:?}")]
    InvalidHexField {
        field: &'static str,
        expected: usize,
        value: String,
    },

    #[error("extranonce2 length {0} exceeds {max} bytes", max = MAX_EXTRANONCE2_LENGTH)]
    InvalidExtranonce2Length(usize),

    #[error("merkle branch {index} is not a 32-byte hex hash: {value:?}")]
    InvalidMerkleBranch { index: usize, value: String },
}

/// One job announcement from one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratumTemplate {
    pub pool_name: String,
    pub job_id: String,
    pub height: u64,
    /// Previous block hash, Stratum word-swapped order (64 hex).
    pub prev_hash: String,
    /// Block version, big-endian (8 hex).
    pub version: String,
    pub coinbase1: String,
    pub coinbase2: String,
    pub extranonce1: String,
    pub extranonce2_length: usize,
    /// Merkle branches in internal byte order, coinbase sibling first.
    #[serde(default)]
    pub merkle_branches: Vec<String>,
    pub nbits: String,
    pub ntime: String,
    #[serde(default)]
    pub clean_jobs: bool,
}

impl StratumTemplate {
    /// Check the fixed-width fields. Coinbase parts are not checked here;
    /// bad coinbase hex becomes a decode failure instead.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.pool_name.trim().is_empty() {
            return Err(TemplateError::EmptyPoolName);
        }
        if self.job_id.is_empty() {
            return Err(TemplateError::EmptyJobId(self.pool_name.clone()));
        }

        check_hex_field("prev_hash", &self.prev_hash, 64)?;
        check_hex_field("version", &self.version, 8)?;
        check_hex_field("nbits", &self.nbits, 8)?;
        check_hex_field("ntime", &self.ntime, 8)?;

        if self.extranonce2_length > MAX_EXTRANONCE2_LENGTH {
            return Err(TemplateError::InvalidExtranonce2Length(
                self.extranonce2_length,
            ));
        }

        for (index, branch) in self.merkle_branches.iter().enumerate() {
            if !is_hex_of_len(branch, 64) {
                return Err(TemplateError::InvalidMerkleBranch {
                    index,
                    value: branch.clone(),
                });
            }
        }

        Ok(())
    }

    /// The coinbase transaction this template commits to, with an all-zero
    /// extranonce2.
    pub fn coinbase_raw(&self) -> CoinbaseRaw {
        CoinbaseRaw::from_parts(
            &self.coinbase1,
            &self.extranonce1,
            self.extranonce2_length,
            &self.coinbase2,
        )
    }

    /// Merkle branches in display (txid) order.
    pub fn merkle_branches_display(&self) -> Vec<String> {
        self.merkle_branches
            .iter()
            .map(|b| merkle_branch_display(b))
            .collect()
    }

    /// Txid of the first non-coinbase transaction, if the template has any.
    ///
    /// The coinbase's sibling at the bottom of the tree is the first branch.
    pub fn first_transaction_txid(&self) -> Option<Txid> {
        let bytes = decode_hash(self.merkle_branches.first()?)?;
        Some(Txid::from_byte_array(bytes))
    }

    pub fn version_u32(&self) -> Option<u32> {
        parse_be_u32(&self.version)
    }

    pub fn nbits_u32(&self) -> Option<u32> {
        parse_be_u32(&self.nbits)
    }

    pub fn ntime_u32(&self) -> Option<u32> {
        parse_be_u32(&self.ntime)
    }
}

fn check_hex_field(field: &'static str, value: &str, expected: usize) -> Result<(), TemplateError> {
    if is_hex_of_len(value, expected) {
        Ok(())
    } else {
        Err(TemplateError::InvalidHexField {
            field,
            expected,
            value: value.to_string(),
        })
    }
}

fn is_hex_of_len(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn decode_hash(hex_str: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(hex_str).ok()?;
    <[u8; 32]>::try_from(bytes).ok()
}

/// Parse an 8-hex big-endian field such as `nbits`.
pub fn parse_be_u32(hex_str: &str) -> Option<u32> {
    if hex_str.len() != 8 {
        return None;
    }
    u32::from_str_radix(hex_str, 16).ok()
}

/// Display form of a merkle branch: the wire bytes reversed.
///
/// Input that is not a 32-byte hash is returned lowercased, unchanged
/// otherwise, so callers always get a usable name.
pub fn merkle_branch_display(wire_hex: &str) -> String {
    match decode_hash(wire_hex) {
        Some(bytes) => TxMerkleNode::from_byte_array(bytes).to_string(),
        None => wire_hex.to_ascii_lowercase(),
    }
}

/// Display form of the Stratum `prev_hash` field.
pub fn prev_hash_display(stratum_hex: &str) -> Option<String> {
    let mut bytes = decode_hash(stratum_hex)?;
    for word in bytes.chunks_exact_mut(4) {
        word.reverse();
    }
    Some(BlockHash::from_byte_array(bytes).to_string())
}

/// Serialized coinbase transaction: coinbase1 ‖ extranonce1 ‖ zero
/// extranonce2 ‖ coinbase2, as hex.
///
/// This is a pure function of its four inputs and serves as the cache key
/// for everything derived from the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CoinbaseRaw(String);

impl CoinbaseRaw {
    pub fn from_parts(
        coinbase1: &str,
        extranonce1: &str,
        extranonce2_length: usize,
        coinbase2: &str,
    ) -> Self {
        let mut raw = String::with_capacity(coinbase1.len() + extranonce1.len() + coinbase2.len());
        raw.push_str(coinbase1);
        raw.push_str(extranonce1);
        raw.extend(std::iter::repeat_n("00", extranonce2_length));
        raw.push_str(coinbase2);
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.0)
    }
}

impl fmt::Display for CoinbaseRaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use test_case::test_case;

    pub(crate) fn template(pool: &str, job_id: &str, height: u64) -> StratumTemplate {
        StratumTemplate {
            pool_name: pool.to_string(),
            job_id: job_id.to_string(),
            height,
            prev_hash: "00".repeat(32),
            version: "20000000".to_string(),
            coinbase1: String::new(),
            coinbase2: String::new(),
            extranonce1: String::new(),
            extranonce2_length: 0,
            merkle_branches: Vec::new(),
            nbits: "17034219".to_string(),
            ntime: "66f1a2b3".to_string(),
            clean_jobs: false,
        }
    }

    #[test]
    fn coinbase_raw_concatenates_parts_with_zero_extranonce2() {
        let raw = CoinbaseRaw::from_parts("0100", "abcd", 4, "ff");
        assert_eq!(raw.as_str(), "0100abcd00000000ff");
        assert_eq!(raw.to_bytes().unwrap(), vec![1, 0, 0xab, 0xcd, 0, 0, 0, 0, 0xff]);
    }

    #[test]
    fn coinbase_raw_is_deterministic() {
        let a = CoinbaseRaw::from_parts("01", "02", 8, "03");
        let b = CoinbaseRaw::from_parts("01", "02", 8, "03");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 2 + 2 + 16 + 2);
    }

    #[test]
    fn coinbase_raw_with_no_extranonce2() {
        let raw = CoinbaseRaw::from_parts("aa", "", 0, "bb");
        assert_eq!(raw.as_str(), "aabb");
    }

    #[test]
    fn merkle_branch_display_reverses_bytes() {
        let wire = format!("01{}ff", "00".repeat(30));
        let display = merkle_branch_display(&wire);
        assert_eq!(display, format!("ff{}01", "00".repeat(30)));
    }

    #[test]
    fn merkle_branch_display_passes_through_garbage() {
        assert_eq!(merkle_branch_display("ABC"), "abc");
    }

    #[test]
    fn prev_hash_display_reverses_word_order() {
        let wire: String = (1..=8u32).map(|w| format!("{:08x}", w)).collect();
        let expected: String = (1..=8u32).rev().map(|w| format!("{:08x}", w)).collect();
        assert_eq!(prev_hash_display(&wire).unwrap(), expected);
    }

    #[test]
    fn prev_hash_display_of_real_block() {
        // Pools send the words of the explorer form in reverse order.
        let display = "0000000000000000000172014ba58d66455762add0512355ad651207918494ab";
        let words: Vec<&str> = (0..8).map(|i| &display[i * 8..i * 8 + 8]).collect();
        let wire: String = words.iter().rev().copied().collect();
        assert_eq!(prev_hash_display(&wire).unwrap(), display);
    }

    #[test]
    fn first_transaction_txid_reverses_first_branch() {
        let mut t = template("pool", "1", 1);
        let wire = format!("{}aa", "00".repeat(31));
        t.merkle_branches = vec![wire];
        let txid = t.first_transaction_txid().unwrap();
        assert_eq!(txid.to_string(), format!("aa{}", "00".repeat(31)));
    }

    #[test]
    fn first_transaction_txid_absent_without_branches() {
        assert!(template("pool", "1", 1).first_transaction_txid().is_none());
    }

    #[test_case("20000000", Some(0x2000_0000); "version")]
    #[test_case("17034219", Some(0x1703_4219); "nbits")]
    #[test_case("zz000000", None; "not hex")]
    #[test_case("2000", None; "too short")]
    fn parse_be_u32_vectors(input: &str, expected: Option<u32>) {
        assert_eq!(parse_be_u32(input), expected);
    }

    #[test]
    fn validate_accepts_well_formed_template() {
        let mut t = template("pool", "1", 1);
        t.merkle_branches = vec!["ab".repeat(32)];
        assert_eq!(t.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_empty_pool_name() {
        assert_eq!(
            template(" ", "1", 1).validate(),
            Err(TemplateError::EmptyPoolName)
        );
    }

    #[test]
    fn validate_rejects_short_prev_hash() {
        let mut t = template("pool", "1", 1);
        t.prev_hash = "00".to_string();
        assert!(matches!(
            t.validate(),
            Err(TemplateError::InvalidHexField {
                field: "prev_hash",
                ..
            })
        ));
    }

    #[test]
    fn validate_rejects_bad_branch() {
        let mut t = template("pool", "1", 1);
        t.merkle_branches = vec!["ab".repeat(32), "xyz".to_string()];
        assert!(matches!(
            t.validate(),
            Err(TemplateError::InvalidMerkleBranch { index: 1, .. })
        ));
    }

    #[test]
    fn validate_rejects_oversized_extranonce2() {
        let mut t = template("pool", "1", 1);
        t.extranonce2_length = MAX_EXTRANONCE2_LENGTH;
        assert_eq!(t.validate(), Ok(()));

        t.extranonce2_length = 1 << 62;
        assert_eq!(
            t.validate(),
            Err(TemplateError::InvalidExtranonce2Length(1 << 62))
        );
    }

    #[test]
    fn deserializes_transport_json() {
        let json = serde_json::json!({
            "pool_name": "Foundry USA",
            "job_id": "6a1f",
            "height": 840000,
            "prev_hash": "00".repeat(32),
            "version": "20000000",
            "coinbase1": "01",
            "coinbase2": "02",
            "extranonce1": "f0a1b2c3",
            "extranonce2_length": 8,
            "merkle_branches": ["11".repeat(32)],
            "nbits": "17034219",
            "ntime": "66f1a2b3",
            "clean_jobs": true
        });

        let t: StratumTemplate = serde_json::from_value(json).unwrap();
        assert_eq!(t.pool_name, "Foundry USA");
        assert_eq!(t.extranonce2_length, 8);
        assert!(t.clean_jobs);
        assert_eq!(t.merkle_branches.len(), 1);
    }
}
