//! Transaction Layer
//!
//! The immutable `Transaction` value object and the per-chain builders that
//! produce it. Builders own all mutation; a `Transaction` only ever grows
//! its signature list.

pub mod commitment_builder;
pub mod transaction;
pub mod transfer_builder;

pub use commitment_builder::CommitmentBuilder;
pub use transaction::{AttachedSignature, Transaction, TxFields};
pub use transfer_builder::TransferBuilder;
