//! OP_RETURN sub-protocol classification.
//!
//! Coinbase null-data outputs carry commitments for a handful of other
//! systems. Each known system is a [`ProtocolFamily`]; classification walks
//! [`DISPATCH_ORDER`] and the first family that recognizes the output wins.
//! Families whose markers overlap (Stacks and BIP47 share a prefix and
//! length) are told apart inside their matchers, so order only matters
//! between families with genuinely ambiguous markers.
//!
//! The payload is the data of the single push following `OP_RETURN`. A push
//! claiming more bytes than the script holds is malformed; the record then
//! keeps whatever bytes followed the push opcode. The payload hex is kept
//! on every record whatever the outcome.

use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter};

pub const OP_RETURN: u8 = 0x6a;

const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

/// `OP_RETURN OP_13`, the Runes marker.
const RUNESTONE_PREFIX: [u8; 2] = [0x6a, 0x5d];

/// `OP_RETURN OP_PUSHDATA1 80`, shared by Stacks and BIP47.
const PUSH80_PREFIX: [u8; 3] = [0x6a, 0x4c, 0x50];
const PUSH80_SCRIPT_LEN: usize = 83;

/// Stacks block commit payloads open with `X2[`.
const STACKS_MAGIC: [u8; 3] = [0x58, 0x32, 0x5b];

const WITNESS_COMMITMENT_MAGIC: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];
const OMNI_MAGIC: &[u8] = b"omni";
const RSK_MAGIC: &[u8] = b"RSKBLOCK:";
const COREDAO_MAGIC: &[u8] = b"CORE\x01";
const EXSAT_MAGIC: &[u8] = b"EXSAT\x01";
const HATHOR_MAGIC: &[u8] = b"Hath";
const SYSCOIN_MAGIC: &[u8] = b"sys";

const HASH_LEN: usize = 32;
const EVM_ADDRESS_LEN: usize = 20;

/// Account-name alphabet used by ExSat (EOSIO-style names).
const EXSAT_ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz12345.";

/// Every classification an OP_RETURN output can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Display, AsRefStr, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProtocolFamily {
    Runestone,
    StacksBlockCommit,
    Bip47PaymentCode,
    WitnessCommitment,
    Omni,
    RskBlock,
    CoreDao,
    ExSat,
    Hathor,
    Syscoin,
    /// Empty payload.
    Empty,
    /// 20-byte payload with no known marker.
    Bytes20,
    /// 80-byte payload with no known marker.
    Bytes80,
    Unknown,
    Malformed,
}

/// Priority order for classification. `Unknown` and `Malformed` are
/// outcomes, not matchers, and are absent.
pub const DISPATCH_ORDER: [ProtocolFamily; 13] = [
    ProtocolFamily::Runestone,
    ProtocolFamily::StacksBlockCommit,
    ProtocolFamily::Bip47PaymentCode,
    ProtocolFamily::WitnessCommitment,
    ProtocolFamily::Omni,
    ProtocolFamily::RskBlock,
    ProtocolFamily::CoreDao,
    ProtocolFamily::ExSat,
    ProtocolFamily::Hathor,
    ProtocolFamily::Syscoin,
    ProtocolFamily::Empty,
    ProtocolFamily::Bytes20,
    ProtocolFamily::Bytes80,
];

/// Fields decoded for a classified output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum OpReturnProtocol {
    Runestone,
    StacksBlockCommit,
    Bip47PaymentCode,
    WitnessCommitment {
        commitment: Option<String>,
    },
    Omni,
    /// `block_hash` is None when the payload is too short ("incomplete").
    RskBlock {
        block_hash: Option<String>,
    },
    CoreDao {
        validator: Option<String>,
        reward_address: Option<String>,
    },
    ExSat {
        account: String,
    },
    Hathor {
        aux_block_hash: Option<String>,
    },
    Syscoin {
        related_hash: Option<String>,
        suffix: String,
    },
    Empty,
    Bytes20,
    Bytes80,
    Unknown,
    Malformed,
}

impl OpReturnProtocol {
    pub fn family(&self) -> ProtocolFamily {
        match self {
            Self::Runestone => ProtocolFamily::Runestone,
            Self::StacksBlockCommit => ProtocolFamily::StacksBlockCommit,
            Self::Bip47PaymentCode => ProtocolFamily::Bip47PaymentCode,
            Self::WitnessCommitment { .. } => ProtocolFamily::WitnessCommitment,
            Self::Omni => ProtocolFamily::Omni,
            Self::RskBlock { .. } => ProtocolFamily::RskBlock,
            Self::CoreDao { .. } => ProtocolFamily::CoreDao,
            Self::ExSat { .. } => ProtocolFamily::ExSat,
            Self::Hathor { .. } => ProtocolFamily::Hathor,
            Self::Syscoin { .. } => ProtocolFamily::Syscoin,
            Self::Empty => ProtocolFamily::Empty,
            Self::Bytes20 => ProtocolFamily::Bytes20,
            Self::Bytes80 => ProtocolFamily::Bytes80,
            Self::Unknown => ProtocolFamily::Unknown,
            Self::Malformed => ProtocolFamily::Malformed,
        }
    }
}

/// A classified OP_RETURN output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OpReturnRecord {
    #[serde(flatten)]
    pub protocol: OpReturnProtocol,
    pub payload_hex: String,
}

impl OpReturnRecord {
    pub fn family(&self) -> ProtocolFamily {
        self.protocol.family()
    }
}

/// Result of reading the push after `OP_RETURN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Push<'a> {
    Data(&'a [u8]),
    /// The push claimed more bytes than remain; carries what does remain.
    Malformed(&'a [u8]),
}

/// Everything a matcher may look at.
struct Candidate<'a> {
    script: &'a [u8],
    /// None when the push was malformed.
    payload: Option<&'a [u8]>,
}

impl ProtocolFamily {
    /// Try to recognize the candidate as this family. Returns the decoded
    /// fields and the payload to retain.
    fn try_match<'a>(self, c: &Candidate<'a>) -> Option<(OpReturnProtocol, &'a [u8])> {
        use OpReturnProtocol as P;

        match self {
            Self::Runestone => c
                .script
                .strip_prefix(&RUNESTONE_PREFIX[..])
                .map(|rest| (P::Runestone, rest)),

            Self::StacksBlockCommit => {
                let payload = push80_payload(c.script)?;
                payload
                    .starts_with(&STACKS_MAGIC)
                    .then_some((P::StacksBlockCommit, payload))
            }

            Self::Bip47PaymentCode => {
                let payload = push80_payload(c.script)?;
                let version_ok = matches!(payload[0], 0x01 | 0x02);
                let sign_ok = matches!(payload[2], 0x02 | 0x03);
                (version_ok && sign_ok).then_some((P::Bip47PaymentCode, payload))
            }

            Self::WitnessCommitment => {
                let payload = c.payload?;
                let rest = payload.strip_prefix(&WITNESS_COMMITMENT_MAGIC[..])?;
                let commitment = rest.get(..HASH_LEN).map(hex::encode);
                Some((P::WitnessCommitment { commitment }, payload))
            }

            Self::Omni => {
                let payload = c.payload?;
                payload
                    .starts_with(OMNI_MAGIC)
                    .then_some((P::Omni, payload))
            }

            Self::RskBlock => {
                let payload = c.payload?;
                let rest = payload.strip_prefix(RSK_MAGIC)?;
                let block_hash = rest.get(..HASH_LEN).map(hex::encode);
                Some((P::RskBlock { block_hash }, payload))
            }

            Self::CoreDao => {
                let payload = c.payload?;
                let rest = payload.strip_prefix(COREDAO_MAGIC)?;
                let validator = rest.get(..EVM_ADDRESS_LEN).map(evm_address);
                let reward_address = rest
                    .get(EVM_ADDRESS_LEN..2 * EVM_ADDRESS_LEN)
                    .map(evm_address);
                Some((
                    P::CoreDao {
                        validator,
                        reward_address,
                    },
                    payload,
                ))
            }

            Self::ExSat => {
                let payload = c.payload?;
                let rest = payload.strip_prefix(EXSAT_MAGIC)?;
                Some((
                    P::ExSat {
                        account: exsat_account(rest),
                    },
                    payload,
                ))
            }

            Self::Hathor => {
                let payload = c.payload?;
                let rest = payload.strip_prefix(HATHOR_MAGIC)?;
                let aux_block_hash = rest.get(..HASH_LEN).map(hex::encode);
                Some((P::Hathor { aux_block_hash }, payload))
            }

            Self::Syscoin => {
                let payload = c.payload?;
                let rest = payload.strip_prefix(SYSCOIN_MAGIC)?;
                let (related_hash, suffix) = match rest.split_at_checked(HASH_LEN) {
                    Some((hash, suffix)) => (Some(hex::encode(hash)), hex::encode(suffix)),
                    None => (None, hex::encode(rest)),
                };
                Some((
                    P::Syscoin {
                        related_hash,
                        suffix,
                    },
                    payload,
                ))
            }

            Self::Empty => {
                let payload = c.payload?;
                payload.is_empty().then_some((P::Empty, payload))
            }

            Self::Bytes20 => {
                let payload = c.payload?;
                (payload.len() == 20).then_some((P::Bytes20, payload))
            }

            Self::Bytes80 => {
                let payload = c.payload?;
                (payload.len() == 80).then_some((P::Bytes80, payload))
            }

            Self::Unknown | Self::Malformed => None,
        }
    }
}

/// Classify an output script. Returns None unless the script starts with
/// `OP_RETURN`.
pub fn decode_op_return(script: &[u8]) -> Option<OpReturnRecord> {
    let rest = script.strip_prefix(&[OP_RETURN])?;
    let push = read_push(rest);
    let candidate = Candidate {
        script,
        payload: match push {
            Push::Data(data) => Some(data),
            Push::Malformed(_) => None,
        },
    };

    for family in DISPATCH_ORDER {
        if let Some((protocol, payload)) = family.try_match(&candidate) {
            return Some(OpReturnRecord {
                protocol,
                payload_hex: hex::encode(payload),
            });
        }
    }

    let (protocol, payload) = match push {
        Push::Data(data) => (OpReturnProtocol::Unknown, data),
        Push::Malformed(remainder) => (OpReturnProtocol::Malformed, remainder),
    };
    Some(OpReturnRecord {
        protocol,
        payload_hex: hex::encode(payload),
    })
}

/// Read the single push following `OP_RETURN`.
///
/// A non-push opcode yields the raw remainder as data so marker matching can
/// still run on it.
fn read_push(rest: &[u8]) -> Push<'_> {
    let Some((&opcode, after)) = rest.split_first() else {
        return Push::Data(rest);
    };

    let (len_size, len) = match opcode {
        0x00 => return Push::Data(&[]),
        0x01..=0x4b => (0, opcode as usize),
        OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4 => {
            let len_size = match opcode {
                OP_PUSHDATA1 => 1,
                OP_PUSHDATA2 => 2,
                _ => 4,
            };
            let Some(len_bytes) = after.get(..len_size) else {
                return Push::Malformed(after);
            };
            let mut le = [0u8; 4];
            le[..len_size].copy_from_slice(len_bytes);
            (len_size, u32::from_le_bytes(le) as usize)
        }
        _ => return Push::Data(rest),
    };

    let data = &after[len_size..];
    match data.get(..len) {
        Some(pushed) => Push::Data(pushed),
        None => Push::Malformed(data),
    }
}

fn push80_payload(script: &[u8]) -> Option<&[u8]> {
    if script.len() != PUSH80_SCRIPT_LEN {
        return None;
    }
    script.strip_prefix(&PUSH80_PREFIX[..])
}

fn evm_address(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn exsat_account(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            EXSAT_ALPHABET
                .get(b as usize)
                .map(|&c| c as char)
                .unwrap_or('?')
        })
        .collect()
}
