//! Everything derived from a template's coinbase transaction.

mod decoder;
pub mod op_return;
pub mod outputs;
pub mod script_sig;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_data;

pub use decoder::{CoinbaseAnalysis, CoinbaseDecoder};
pub use op_return::{DISPATCH_ORDER, OpReturnProtocol, OpReturnRecord, ProtocolFamily};
pub use outputs::{DecodedOutput, OutputKind};
pub use script_sig::{AuxPow, ScriptSigInfo};
pub use transaction::{DecodeError, ParsedTransaction};
