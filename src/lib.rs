//! Meridian Core Library
//!
//! Cross-chain transaction construction, signing, and recovery.
//!
//! # Architecture
//!
//! This crate provides:
//! - **keys**: Signing key material and scan-address derivation
//! - **codec**: Canonical per-chain encodings and digests
//! - **tx**: Transaction building, signing, broadcast serialization
//! - **oracle**: Live chain state behind an explicit trait
//! - **recovery**: Sweep planning over derivation-index ranges
//!
//! # Security
//!
//! This crate uses `zeroize` to clear sensitive data from memory. Raw private
//! keys and seeds are zeroed when dropped, and the structured logger redacts
//! key material by field name.
//!
//! # Example
//!
//! ```rust,ignore
//! use meridian_core::codec::commitment::CommitmentType;
//! use meridian_core::tx::CommitmentBuilder;
//!
//! let tx = CommitmentBuilder::new()
//!     .commitment_type(CommitmentType::Stake)
//!     .fee(100)
//!     .value("20000000000000000000000")?
//!     .signer("0x22f9C9f1845D9b6C22b96Ef35E46E265aC4Af30c")?
//!     .anchor("8JR2rD5DejnM2NuVSqqGa68dfye6ZKruT9rdh2Cn4B8y")?
//!     .build_offline()?;
//! let digest = tx.digest();
//! ```

pub mod codec;
pub mod error;
pub mod keys;
pub mod oracle;
pub mod recovery;
pub mod tx;
pub mod utils;

// Re-export key types for convenience
pub use error::{ErrorCode, MeridianError, MeridianResult};

pub use codec::{CanonicalCodec, ChainFamily};
pub use keys::{SignatureAlgorithm, SigningKeyMaterial};
pub use oracle::{AccountOracle, AccountState, HttpOracle, OracleConfig, RetryPolicy};
pub use recovery::{
    RecoveredPayload, RecoveredTransaction, RecoveryMode, RecoveryParams, RecoveryPlanner,
    RecoveryReport,
};
pub use tx::{CommitmentBuilder, Transaction, TransferBuilder};
