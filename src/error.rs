//! Unified error types for Meridian Core
//!
//! All errors flow through this module for consistent handling
//! across builders, codecs, and the recovery planner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all Meridian operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeridianError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl MeridianError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, msg)
    }

    /// A required field was not set before `build()`
    pub fn missing_field(field: &str) -> Self {
        Self::new(ErrorCode::MissingField, format!("{} is required", field))
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Decode, msg)
    }

    pub fn signature(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Signature, msg)
    }

    pub fn signature_mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SignatureMismatch, msg)
    }

    pub fn quorum_unmet(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::QuorumUnmet, msg)
    }

    pub fn oracle(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalOracle, msg)
    }

    pub fn no_funds_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoFundsFound, msg)
    }

    pub fn bounds(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Bounds, msg)
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Crypto, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }
}

impl fmt::Display for MeridianError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for MeridianError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Input errors: bad/missing field, caught before any network or crypto work
    Validation,
    MissingField,

    // Malformed raw input to a round-trip `from()`
    Decode,

    // Signature errors: wrong length, digest mismatch, quorum unmet
    Signature,
    SignatureMismatch,
    QuorumUnmet,

    // Account/fee/anchor fetch failed
    ExternalOracle,

    // Recovery scan found nothing to sweep
    NoFundsFound,

    // Scan range invalid or too large
    Bounds,

    // Crypto/internal
    Crypto,
    Internal,
}

/// Result type alias for Meridian operations
pub type MeridianResult<T> = Result<T, MeridianError>;

// Conversions from common error types

impl From<serde_json::Error> for MeridianError {
    fn from(e: serde_json::Error) -> Self {
        MeridianError::new(ErrorCode::Decode, e.to_string())
    }
}

impl From<hex::FromHexError> for MeridianError {
    fn from(e: hex::FromHexError) -> Self {
        MeridianError::new(ErrorCode::Decode, e.to_string())
    }
}

impl From<bitcoin::bip32::Error> for MeridianError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        MeridianError::new(ErrorCode::Crypto, format!("BIP32 error: {}", e))
    }
}

impl From<secp256k1::Error> for MeridianError {
    fn from(e: secp256k1::Error) -> Self {
        MeridianError::new(ErrorCode::Crypto, format!("Secp256k1 error: {}", e))
    }
}

impl From<bip39::Error> for MeridianError {
    fn from(e: bip39::Error) -> Self {
        MeridianError::new(ErrorCode::Validation, format!("BIP39 error: {}", e))
    }
}

impl From<reqwest::Error> for MeridianError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MeridianError::new(ErrorCode::ExternalOracle, "Request timed out")
        } else if e.is_connect() {
            MeridianError::new(ErrorCode::ExternalOracle, "Connection failed")
        } else {
            MeridianError::new(ErrorCode::ExternalOracle, e.to_string())
        }
    }
}
