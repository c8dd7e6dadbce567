//! Reference coinbase for tests.
//!
//! A segwit coinbase in the shape large pools publish: BIP34 height,
//! merge-mining commitment, ASCII pool tag, then the extranonce space at the
//! end of the scriptSig. Outputs are a P2WPKH payout, the witness commitment
//! and an RSK merge-mining tag.

pub mod foundry {
    use crate::template::{CoinbaseRaw, StratumTemplate};

    pub const COINBASE1: &str = concat!(
        "0200000000010100000000000000000000000000000000000000000000000000",
        "00000000000000ffffffff490340d10cfabe6d6da0a1a2a3a4a5a6a7a8a9aaab",
        "acadaeafb0b1b2b3b4b5b6b7b8b9babbbcbdbebf04000000000000002f466f75",
        "6e647279205553412f",
    );

    pub const EXTRANONCE1: &str = "f0a1b2c3";

    pub const EXTRANONCE2_LENGTH: usize = 8;

    pub const COINBASE2: &str = concat!(
        "ffffffff03c3eda31200000000160014101112131415161718191a1b1c1d1e1f",
        "202122230000000000000000266a24aa21a9ed404142434445464748494a4b4c",
        "4d4e4f505152535455565758595a5b5c5d5e5f00000000000000002b6a295253",
        "4b424c4f434b3a606162636465666768696a6b6c6d6e6f707172737475767778",
        "797a7b7c7d7e7f01200000000000000000000000000000000000000000000000",
        "00000000000000000000000000",
    );

    pub const HEIGHT: u64 = 840_000;

    pub const SCRIPT_SIG_LEN: usize = 73;

    pub const PAYOUT_SAT: u64 = 312_733_123;

    pub const TOTAL_OUTPUT_SAT: u64 = PAYOUT_SAT;

    pub const PAYOUT_ADDRESS: &str = "bc1qzqg3yyc5z5tpwxqergd3c8g7ruszzg3r8jj72z";

    /// Merge-mining root as displayed (byte-reversed).
    pub const AUXPOW_ROOT: &str =
        "bfbebdbcbbbab9b8b7b6b5b4b3b2b1b0afaeadacabaaa9a8a7a6a5a4a3a2a1a0";

    pub const AUXPOW_MERKLE_SIZE: u32 = 4;

    pub const AUXPOW_NONCE: u32 = 0;

    /// Pool tag followed by extranonce1 and the zeroed extranonce2.
    pub const REMAINING_HEX: &str = "2f466f756e647279205553412ff0a1b2c30000000000000000";

    pub const ASCII_TAG: &str = "/Foundry USA/";

    pub const WITNESS_COMMITMENT: &str =
        "404142434445464748494a4b4c4d4e4f505152535455565758595a5b5c5d5e5f";

    pub const RSK_BLOCK_HASH: &str =
        "606162636465666768696a6b6c6d6e6f707172737475767778797a7b7c7d7e7f";

    pub fn coinbase_raw() -> CoinbaseRaw {
        CoinbaseRaw::from_parts(COINBASE1, EXTRANONCE1, EXTRANONCE2_LENGTH, COINBASE2)
    }

    /// A template carrying this coinbase.
    pub fn template(pool: &str, job_id: &str, branches: &[&str]) -> StratumTemplate {
        StratumTemplate {
            pool_name: pool.to_string(),
            job_id: job_id.to_string(),
            height: HEIGHT,
            prev_hash: "00".repeat(32),
            version: "20000000".to_string(),
            coinbase1: COINBASE1.to_string(),
            coinbase2: COINBASE2.to_string(),
            extranonce1: EXTRANONCE1.to_string(),
            extranonce2_length: EXTRANONCE2_LENGTH,
            merkle_branches: branches.iter().map(|b| b.to_string()).collect(),
            nbits: "17034219".to_string(),
            ntime: "66f1a2b3".to_string(),
            clean_jobs: false,
        }
    }
}
