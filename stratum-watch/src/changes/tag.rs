use std::fmt;

use serde::{Serialize, Serializer};

use crate::coinbase::ProtocolFamily;

/// What changed between two consecutive templates of one pool.
///
/// Tags sort in the order they appear in a change indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeTag {
    MerkleBranches,
    CleanJobs,
    PrevHash,
    Height,
    Version,
    Nbits,
    Ntime,
    Extranonce2Length,
    TxVersion,
    InputSequence,
    LockTime,
    WitnessNonce,
    AsciiTag,
    OutputValue,
    OutputStructure,
    ProtocolAdded(ProtocolFamily),
    ProtocolRemoved(ProtocolFamily),
    ProtocolChanged(ProtocolFamily),
}

impl fmt::Display for ChangeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MerkleBranches => "branches",
            Self::CleanJobs => "clean",
            Self::PrevHash => "prevhash",
            Self::Height => "height",
            Self::Version => "version",
            Self::Nbits => "nbits",
            Self::Ntime => "ntime",
            Self::Extranonce2Length => "en2len",
            Self::TxVersion => "txversion",
            Self::InputSequence => "sequence",
            Self::LockTime => "locktime",
            Self::WitnessNonce => "witnessnonce",
            Self::AsciiTag => "tag",
            Self::OutputValue => "value",
            Self::OutputStructure => "outputs",
            Self::ProtocolAdded(family) => return write!(f, "+{family}"),
            Self::ProtocolRemoved(family) => return write!(f, "-{family}"),
            Self::ProtocolChanged(family) => return write!(f, "~{family}"),
        };
        f.write_str(name)
    }
}

impl Serialize for ChangeTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One changed field with its before and after values, rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub tag: ChangeTag,
    pub before: String,
    pub after: String,
}
