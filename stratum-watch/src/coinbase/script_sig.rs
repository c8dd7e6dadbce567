//! Coinbase scriptSig analysis.
//!
//! The coinbase scriptSig is free-form except for the BIP34 height push that
//! must open it. Pools pack the rest with merge-mining commitments, a pool
//! tag and the extranonce space. This module pulls out the two structured
//! pieces and leaves everything else as "remaining" bytes.
//!
//! The height push is read first. The merge-mining magic is then searched for
//! only in the bytes after it, so the two spans never overlap even for very
//! short scripts.

use memchr::memmem;
use serde::Serialize;

/// Merge-mining commitment marker (`fabe` followed by ASCII `mm`).
pub const AUXPOW_MAGIC: [u8; 4] = [0xfa, 0xbe, 0x6d, 0x6d];

const AUXPOW_ROOT_LEN: usize = 32;

/// Largest direct-push opcode; bytes 0x01..=0x4b push that many bytes.
const MAX_DIRECT_PUSH: u8 = 0x4b;

/// Shortest height push accepted; heights have needed three bytes since
/// block 32768.
const MIN_HEIGHT_PUSH: u8 = 3;

const ELLIPSIS: char = '…';

/// Merge-mining commitment found in the scriptSig.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AuxPow {
    /// Aux chain merkle root, byte-reversed for display.
    pub root: String,
    pub merkle_size: Option<u32>,
    pub nonce: Option<u32>,
}

/// Structured view of a coinbase scriptSig.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptSigInfo {
    pub height: Option<u64>,
    pub aux_pow: Option<AuxPow>,
    /// Bytes not attributed to the height push or the commitment.
    pub remaining_hex: String,
    /// Printable ASCII of the remaining bytes, cut for display.
    pub remaining_ascii: String,
}

/// Analyze a coinbase scriptSig.
///
/// Always returns a result; when nothing is recognized both fields are None
/// and the whole script is "remaining".
pub fn analyze_script_sig(script: &[u8], ascii_max_chars: usize) -> ScriptSigInfo {
    let (height, after_height) = match read_height(script) {
        Some((height, end)) => (Some(height), end),
        None => (None, 0),
    };

    let aux = find_aux_pow(script, after_height);

    let mut remaining = Vec::with_capacity(script.len());
    match &aux {
        Some((_, span)) => {
            remaining.extend_from_slice(&script[after_height..span.start]);
            remaining.extend_from_slice(&script[span.end..]);
        }
        None => remaining.extend_from_slice(&script[after_height..]),
    }

    ScriptSigInfo {
        height,
        aux_pow: aux.map(|(aux, _)| aux),
        remaining_hex: hex::encode(&remaining),
        remaining_ascii: printable_ascii(&remaining, ascii_max_chars),
    }
}

/// Read the BIP34 height push, returning the height and the offset just past
/// the push.
///
/// Only the first three pushed bytes form the height.
fn read_height(script: &[u8]) -> Option<(u64, usize)> {
    let len = *script.first()?;
    if !(MIN_HEIGHT_PUSH..=MAX_DIRECT_PUSH).contains(&len) {
        return None;
    }

    let end = 1 + len as usize;
    let push = script.get(1..end)?;
    let height = u64::from(push[0]) | u64::from(push[1]) << 8 | u64::from(push[2]) << 16;
    Some((height, end))
}

fn find_aux_pow(script: &[u8], from: usize) -> Option<(AuxPow, std::ops::Range<usize>)> {
    let start = from + memmem::find(&script[from..], &AUXPOW_MAGIC)?;
    let root_start = start + AUXPOW_MAGIC.len();
    let root_end = root_start + AUXPOW_ROOT_LEN;

    let mut root = script.get(root_start..root_end)?.to_vec();
    root.reverse();

    let (merkle_size, nonce, end) = match script.get(root_end..root_end + 8) {
        Some(tail) => (
            Some(u32::from_le_bytes([tail[0], tail[1], tail[2], tail[3]])),
            Some(u32::from_le_bytes([tail[4], tail[5], tail[6], tail[7]])),
            root_end + 8,
        ),
        None => (None, None, root_end),
    };

    Some((
        AuxPow {
            root: hex::encode(root),
            merkle_size,
            nonce,
        },
        start..end,
    ))
}

/// Keep bytes 0x20..=0x7e and cut to `max_chars`, marking the cut with an
/// ellipsis.
pub fn printable_ascii(bytes: &[u8], max_chars: usize) -> String {
    let printable: String = bytes
        .iter()
        .filter(|b| (0x20..=0x7e).contains(*b))
        .map(|&b| b as char)
        .collect();

    if printable.len() <= max_chars {
        return printable;
    }

    let mut cut: String = printable.chars().take(max_chars).collect();
    cut.push(ELLIPSIS);
    cut
}
