//! Canonical Encoding Strategies
//!
//! Each supported chain family provides the same contract: serialize a typed
//! field set into deterministic canonical bytes with an exact field order,
//! derive the signable digest from those bytes, and decode bytes back into
//! fields (best-effort inverse, used for recovery verification and display).
//!
//! Chain families are a closed set selected at construction time; each
//! family's rules are a field table plus shape rules, not a class hierarchy.

pub mod bank;
pub mod commitment;
pub mod rlp;

use crate::error::MeridianError;

/// Supported chain families
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainFamily {
    /// RLP-encoded commitment chain (keccak256 digest, 65-byte recoverable sigs)
    Commitment,
    /// Length-delimited transfer chain (sha256 digest, 64-byte compact sigs)
    Bank,
}

impl ChainFamily {
    /// Raw signature length the family's signer must produce
    pub fn signature_len(&self) -> usize {
        match self {
            ChainFamily::Commitment => commitment::SIGNATURE_LEN,
            ChainFamily::Bank => bank::SIGNATURE_LEN,
        }
    }
}

/// Per-chain canonical encoding contract
pub trait CanonicalCodec {
    /// Typed field set this codec serializes
    type Fields;

    /// Serialize fields into deterministic canonical bytes.
    /// Identical inputs always produce byte-identical output.
    fn encode(&self, fields: &Self::Fields) -> Result<Vec<u8>, MeridianError>;

    /// Derive the 32-byte signable digest from canonical bytes
    fn digest(&self, canonical: &[u8]) -> [u8; 32];

    /// Decode canonical bytes back into fields
    fn decode(&self, bytes: &[u8]) -> Result<Self::Fields, MeridianError>;
}

/// Low-level decode failures, converted to `MeridianError` at module boundaries
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Input truncated")]
    Truncated,

    #[error("{0} trailing bytes after top-level item")]
    TrailingBytes(usize),

    #[error("Wrong byte shape: {0}")]
    WrongShape(String),

    #[error("Field {field} has wrong length: expected {expected}, got {actual}")]
    WrongLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    #[error("Unknown field tag {0:#x}")]
    UnknownTag(u8),
}

impl From<DecodeError> for MeridianError {
    fn from(e: DecodeError) -> Self {
        MeridianError::decode(e.to_string())
    }
}
