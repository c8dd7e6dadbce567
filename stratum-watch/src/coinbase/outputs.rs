//! Coinbase output classification.

use bitcoin::{Address, Network, Script, TxOut};
use serde::Serialize;
use strum::{AsRefStr, Display};

use super::op_return::{OpReturnRecord, decode_op_return};

/// Standard script template of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    P2pk,
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    OpReturn,
    Nonstandard,
}

impl OutputKind {
    pub fn of(script: &Script) -> Self {
        if script.is_op_return() {
            Self::OpReturn
        } else if script.is_p2wpkh() {
            Self::P2wpkh
        } else if script.is_p2tr() {
            Self::P2tr
        } else if script.is_p2wsh() {
            Self::P2wsh
        } else if script.is_p2pkh() {
            Self::P2pkh
        } else if script.is_p2sh() {
            Self::P2sh
        } else if script.is_p2pk() {
            Self::P2pk
        } else {
            Self::Nonstandard
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodedOutput {
    pub index: usize,
    pub value_sat: u64,
    pub kind: OutputKind,
    /// Present for script templates that have an address form.
    pub address: Option<String>,
    /// Present for `OpReturn` outputs.
    pub op_return: Option<OpReturnRecord>,
    pub script_hex: String,
}

impl DecodedOutput {
    /// The part of the output that defines the payout layout: the kind,
    /// the address, and the protocol family for null-data outputs.
    pub fn structure(&self) -> String {
        match (&self.address, &self.op_return) {
            (Some(address), _) => format!("{}:{}", self.kind, address),
            (None, Some(record)) => format!("{}:{}", self.kind, record.family()),
            (None, None) => self.kind.to_string(),
        }
    }
}

pub fn decode_outputs(outputs: &[TxOut], network: Network) -> Vec<DecodedOutput> {
    outputs
        .iter()
        .enumerate()
        .map(|(index, out)| decode_output(index, out, network))
        .collect()
}

fn decode_output(index: usize, out: &TxOut, network: Network) -> DecodedOutput {
    let script = out.script_pubkey.as_script();
    let kind = OutputKind::of(script);

    let address = match kind {
        OutputKind::OpReturn | OutputKind::Nonstandard | OutputKind::P2pk => None,
        _ => Address::from_script(script, network)
            .ok()
            .map(|a| a.to_string()),
    };

    let op_return = match kind {
        OutputKind::OpReturn => decode_op_return(script.as_bytes()),
        _ => None,
    };

    DecodedOutput {
        index,
        value_sat: out.value.to_sat(),
        kind,
        address,
        op_return,
        script_hex: hex::encode(script.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coinbase::op_return::OpReturnProtocol;
    use crate::coinbase::test_data::foundry;
    use crate::coinbase::transaction::decode_coinbase;
    use bitcoin::{Amount, ScriptBuf};
    use test_case::test_case;

    fn out(script_hex: &str) -> TxOut {
        TxOut {
            value: Amount::from_sat(1_000),
            script_pubkey: ScriptBuf::from_bytes(hex::decode(script_hex).unwrap()),
        }
    }

    #[test]
    fn classifies_reference_outputs() {
        let tx = decode_coinbase(&foundry::coinbase_raw());
        let outputs = decode_outputs(&tx.outputs, Network::Bitcoin);

        assert_eq!(outputs.len(), 3);

        assert_eq!(outputs[0].kind, OutputKind::P2wpkh);
        assert_eq!(outputs[0].value_sat, foundry::PAYOUT_SAT);
        assert_eq!(outputs[0].address.as_deref(), Some(foundry::PAYOUT_ADDRESS));
        assert!(outputs[0].op_return.is_none());

        assert_eq!(outputs[1].kind, OutputKind::OpReturn);
        assert_eq!(
            outputs[1].op_return.as_ref().map(|r| &r.protocol),
            Some(&OpReturnProtocol::WitnessCommitment {
                commitment: Some(foundry::WITNESS_COMMITMENT.to_string())
            })
        );

        assert_eq!(
            outputs[2].op_return.as_ref().map(|r| &r.protocol),
            Some(&OpReturnProtocol::RskBlock {
                block_hash: Some(foundry::RSK_BLOCK_HASH.to_string())
            })
        );
        assert_eq!(outputs[2].index, 2);
    }

    #[test_case("76a914000102030405060708090a0b0c0d0e0f1011121388ac", OutputKind::P2pkh; "p2pkh")]
    #[test_case("a914000102030405060708090a0b0c0d0e0f1011121387", OutputKind::P2sh; "p2sh")]
    #[test_case(
        "0020000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
        OutputKind::P2wsh;
        "p2wsh"
    )]
    #[test_case(
        "5120000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f",
        OutputKind::P2tr;
        "p2tr"
    )]
    #[test_case("51", OutputKind::Nonstandard; "bare op_true")]
    #[test_case("6a", OutputKind::OpReturn; "bare op_return")]
    fn output_kind_vectors(script_hex: &str, expected: OutputKind) {
        let script = ScriptBuf::from_bytes(hex::decode(script_hex).unwrap());
        assert_eq!(OutputKind::of(&script), expected);
    }

    #[test]
    fn p2pkh_carries_address() {
        let decoded = decode_outputs(
            &[out("76a914000102030405060708090a0b0c0d0e0f1011121388ac")],
            Network::Bitcoin,
        );
        let address = decoded[0].address.as_deref().unwrap();
        assert!(address.starts_with('1'), "{address}");
    }

    #[test]
    fn nonstandard_has_no_address() {
        let decoded = decode_outputs(&[out("51")], Network::Bitcoin);
        assert_eq!(decoded[0].kind, OutputKind::Nonstandard);
        assert!(decoded[0].address.is_none());
        assert_eq!(decoded[0].structure(), "nonstandard");
    }

    #[test]
    fn structure_ignores_op_return_payload() {
        let a = decode_outputs(&[out("6a0b68656c6c6f20776f726c64")], Network::Bitcoin);
        let b = decode_outputs(&[out("6a0568656c6c6f")], Network::Bitcoin);
        assert_eq!(a[0].structure(), "op_return:unknown");
        assert_eq!(a[0].structure(), b[0].structure());
    }
}
