//! Coinbase transaction wire decoding.
//!
//! Pools hand out the coinbase in two halves, so a template can carry
//! anything from a perfect transaction to a truncated or garbled one. The
//! parser here never fails outright: it fills in as much of a
//! [`ParsedTransaction`] as the bytes allow and records where it stopped in
//! [`ParsedTransaction::error`]. Downstream analysis works with whatever was
//! recovered (for example, an empty input list).
//!
//! Field decoding is delegated to `bitcoin`'s consensus `Decodable` impls;
//! this module only walks the layout:
//!
//! ```text
//! version(4) [marker 0x00, flag 0x01] n_in(varint) inputs
//! n_out(varint) outputs [witness stack per input] locktime(4)
//! ```

use bitcoin::consensus::encode::{self, Decodable};
use bitcoin::consensus::deserialize_partial;
use bitcoin::{Amount, TxIn, TxOut, VarInt, Witness};
use thiserror::Error;

use crate::template::CoinbaseRaw;

/// Why decoding stopped early.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("coinbase is not valid hex: {0}")]
    InvalidHex(String),

    #[error("truncated while reading {field} at byte {offset}")]
    Truncated { field: &'static str, offset: usize },

    #[error("malformed {field} at byte {offset}: {reason}")]
    Malformed {
        field: &'static str,
        offset: usize,
        reason: String,
    },

    #[error("{0} unexpected bytes after locktime")]
    TrailingBytes(usize),
}

/// A possibly partial decode of a coinbase transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTransaction {
    pub version: Option<i32>,
    pub segwit: bool,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: Option<u32>,
    /// Set when decoding stopped before the end of the transaction.
    pub error: Option<DecodeError>,
}

impl ParsedTransaction {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// True if the first input spends the null outpoint (all-zero hash,
    /// index 0xffffffff).
    pub fn is_coinbase(&self) -> bool {
        self.inputs
            .first()
            .is_some_and(|input| input.previous_output.is_null())
    }

    pub fn script_sig(&self) -> Option<&[u8]> {
        self.inputs.first().map(|input| input.script_sig.as_bytes())
    }

    pub fn input_sequence(&self) -> Option<u32> {
        self.inputs.first().map(|input| input.sequence.0)
    }

    /// The coinbase witness reserved value, conventionally a single 32-byte
    /// item.
    pub fn witness_nonce(&self) -> Option<String> {
        let input = self.inputs.first()?;
        input.witness.nth(0).map(hex::encode)
    }

    /// Sum of all decoded output values. Saturates instead of overflowing on
    /// absurd inputs.
    pub fn total_output_value(&self) -> Amount {
        self.outputs.iter().fold(Amount::ZERO, |sum, out| {
            sum.checked_add(out.value).unwrap_or(Amount::MAX)
        })
    }
}

/// Decode the transaction serialized in `raw`.
pub fn decode_coinbase(raw: &CoinbaseRaw) -> ParsedTransaction {
    match raw.to_bytes() {
        Ok(bytes) => parse_transaction(&bytes),
        Err(e) => ParsedTransaction {
            error: Some(DecodeError::InvalidHex(e.to_string())),
            ..Default::default()
        },
    }
}

/// Decode a serialized transaction, keeping whatever was read before an
/// error.
pub fn parse_transaction(bytes: &[u8]) -> ParsedTransaction {
    let mut tx = ParsedTransaction::default();
    if let Err(e) = parse_into(bytes, &mut tx) {
        tx.error = Some(e);
    }
    tx
}

fn parse_into(bytes: &[u8], tx: &mut ParsedTransaction) -> Result<(), DecodeError> {
    let mut reader = Reader::new(bytes);

    tx.version = Some(reader.read::<i32>("version")?);

    if reader.peek(2) == Some(&[0x00, 0x01][..]) {
        tx.segwit = true;
        reader.skip(2);
    }

    // Counts are not trusted for allocation; items are pushed as they
    // decode and a lying count runs out of bytes.
    let input_count = reader.read::<VarInt>("input count")?.0;
    for _ in 0..input_count {
        let input = reader.read::<TxIn>("input")?;
        tx.inputs.push(input);
    }

    let output_count = reader.read::<VarInt>("output count")?.0;
    for _ in 0..output_count {
        let output = reader.read::<TxOut>("output")?;
        tx.outputs.push(output);
    }

    if tx.segwit {
        for input in tx.inputs.iter_mut() {
            input.witness = reader.read::<Witness>("witness")?;
        }
    }

    tx.lock_time = Some(reader.read::<u32>("locktime")?);

    match reader.remaining() {
        0 => Ok(()),
        n => Err(DecodeError::TrailingBytes(n)),
    }
}

/// Cursor over a byte slice that decodes consensus-encoded fields.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn peek(&self, n: usize) -> Option<&'a [u8]> {
        self.bytes.get(self.pos..self.pos + n)
    }

    fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.bytes.len());
    }

    fn read<T: Decodable>(&mut self, field: &'static str) -> Result<T, DecodeError> {
        match deserialize_partial::<T>(&self.bytes[self.pos..]) {
            Ok((value, consumed)) => {
                self.pos += consumed;
                Ok(value)
            }
            Err(e) => Err(classify(e, field, self.pos)),
        }
    }
}

fn classify(err: encode::Error, field: &'static str, offset: usize) -> DecodeError {
    match err {
        encode::Error::Io(ref io) if io.kind() == bitcoin::io::ErrorKind::UnexpectedEof => {
            DecodeError::Truncated { field, offset }
        }
        other => DecodeError::Malformed {
            field,
            offset,
            reason: other.to_string(),
        },
    }
}
