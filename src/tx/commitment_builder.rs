//! Commitment Transaction Builder
//!
//! Builds stake and pledge transactions for the commitment chain. Setters
//! validate their own argument in isolation and fail fast; `build` re-checks
//! the cross-field picture, fetches the freshness anchor last (anchors expire
//! within minutes and are never cached across builds), freezes the field set,
//! and hands back the immutable `Transaction`.

use ethers_core::types::U256;

use super::transaction::{Transaction, TxFields};
use crate::codec::commitment::{
    self, CommitmentCodec, CommitmentFields, CommitmentType, ANCHOR_LEN, COMMITMENT_TX_VERSION,
    SIGNER_LEN, TESTNET_CHAIN_ID,
};
use crate::codec::CanonicalCodec;
use crate::error::{MeridianError, MeridianResult};
use crate::log_debug;
use crate::oracle::AccountOracle;

/// Builder for commitment-chain transactions
#[derive(Debug, Clone)]
pub struct CommitmentBuilder {
    commitment_type: Option<CommitmentType>,
    fee: Option<U256>,
    value: Option<U256>,
    signer: Option<[u8; SIGNER_LEN]>,
    anchor: Option<[u8; ANCHOR_LEN]>,
    chain_id: Option<u64>,
    quorum: usize,
    // Carried through `from()` so a co-signer round-trip keeps prior work
    pending_signature: Option<Vec<u8>>,
}

impl Default for CommitmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitmentBuilder {
    pub fn new() -> Self {
        Self {
            commitment_type: None,
            fee: None,
            value: None,
            signer: None,
            anchor: None,
            chain_id: None,
            quorum: 1,
            pending_signature: None,
        }
    }

    /// Reconstruct builder state from a broadcast JSON envelope. Any
    /// signature in the envelope is re-verified and re-attached by
    /// `build_offline`.
    pub fn from_broadcast_json(bytes: &[u8]) -> MeridianResult<Self> {
        let (fields, signature) = commitment::parse_broadcast_payload(bytes)?;
        if fields.version != COMMITMENT_TX_VERSION {
            return Err(MeridianError::decode(format!(
                "unsupported transaction version {}",
                fields.version
            )));
        }
        Ok(Self {
            commitment_type: Some(fields.commitment_type),
            fee: Some(fields.fee),
            value: Some(fields.value),
            signer: Some(fields.signer),
            anchor: Some(fields.anchor),
            chain_id: Some(fields.chain_id),
            quorum: 1,
            pending_signature: signature,
        })
    }

    /// Reconstruct builder state from raw canonical hex (unsigned hand-off)
    pub fn from_canonical_hex(hex_str: &str) -> MeridianResult<Self> {
        let bytes = hex::decode(hex_str.trim_start_matches("0x"))?;
        let fields = CommitmentCodec.decode(&bytes)?;
        if fields.version != COMMITMENT_TX_VERSION {
            return Err(MeridianError::decode(format!(
                "unsupported transaction version {}",
                fields.version
            )));
        }
        Ok(Self {
            commitment_type: Some(fields.commitment_type),
            fee: Some(fields.fee),
            value: Some(fields.value),
            signer: Some(fields.signer),
            anchor: Some(fields.anchor),
            chain_id: Some(fields.chain_id),
            quorum: 1,
            pending_signature: None,
        })
    }

    // === Setters ===

    pub fn commitment_type(mut self, commitment_type: CommitmentType) -> Self {
        self.commitment_type = Some(commitment_type);
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = Some(U256::from(fee));
        self
    }

    /// Amount in base units as a decimal string
    pub fn value(mut self, value: &str) -> MeridianResult<Self> {
        // from_dec_str maps "" to zero; reject anything but plain digits up front
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MeridianError::validation(format!(
                "Value must be a decimal string, got {:?}",
                value
            )));
        }
        let parsed = U256::from_dec_str(value)
            .map_err(|_| MeridianError::validation(format!("Invalid value: {:?}", value)))?;
        self.value = Some(parsed);
        Ok(self)
    }

    /// Signer address as 0x-prefixed hex, 20 bytes
    pub fn signer(mut self, signer: &str) -> MeridianResult<Self> {
        let bytes = hex::decode(signer.trim_start_matches("0x"))?;
        let signer: [u8; SIGNER_LEN] = bytes.as_slice().try_into().map_err(|_| {
            MeridianError::validation(format!(
                "Signer must be {} bytes, got {}",
                SIGNER_LEN,
                bytes.len()
            ))
        })?;
        self.signer = Some(signer);
        Ok(self)
    }

    /// Anchor as a base58 string decoding to 32 bytes. Optional; when unset,
    /// `build` fetches a fresh one from the oracle.
    pub fn anchor(mut self, anchor: &str) -> MeridianResult<Self> {
        let bytes = bs58::decode(anchor)
            .into_vec()
            .map_err(|e| MeridianError::validation(format!("Anchor is not base58: {}", e)))?;
        let anchor: [u8; ANCHOR_LEN] = bytes.as_slice().try_into().map_err(|_| {
            MeridianError::validation(format!(
                "Anchor must be {} bytes, got {}",
                ANCHOR_LEN,
                bytes.len()
            ))
        })?;
        self.anchor = Some(anchor);
        Ok(self)
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    /// Signatures required before broadcast; defaults to 1
    pub fn quorum(mut self, quorum: usize) -> MeridianResult<Self> {
        if quorum == 0 {
            return Err(MeridianError::validation("quorum must be at least 1"));
        }
        self.quorum = quorum;
        Ok(self)
    }

    // === Build ===

    /// Freeze the transaction, fetching the anchor from the oracle last if
    /// one was not supplied explicitly
    pub async fn build<O: AccountOracle>(mut self, oracle: &O) -> MeridianResult<Transaction> {
        self.check_required()?;
        if self.anchor.is_none() {
            // Fetched after every other check so the anchor is as fresh as
            // possible when the transaction goes out for signing
            let anchor = oracle.get_freshness_anchor().await?;
            log_debug!(
                "builder",
                "fetched freshness anchor",
                anchor = bs58::encode(anchor).into_string()
            );
            self.anchor = Some(anchor);
        }
        self.freeze()
    }

    /// Freeze without an oracle; the anchor must have been set explicitly
    pub fn build_offline(self) -> MeridianResult<Transaction> {
        self.check_required()?;
        if self.anchor.is_none() {
            return Err(MeridianError::missing_field("anchor"));
        }
        self.freeze()
    }

    fn check_required(&self) -> MeridianResult<()> {
        if self.commitment_type.is_none() {
            return Err(MeridianError::missing_field("commitment type"));
        }
        if self.fee.is_none() {
            return Err(MeridianError::missing_field("fee"));
        }
        if self.value.is_none() {
            return Err(MeridianError::missing_field("value"));
        }
        if self.signer.is_none() {
            return Err(MeridianError::missing_field("signer"));
        }
        Ok(())
    }

    fn freeze(self) -> MeridianResult<Transaction> {
        let fields = CommitmentFields {
            version: COMMITMENT_TX_VERSION,
            anchor: self.anchor.ok_or_else(|| MeridianError::missing_field("anchor"))?,
            signer: self.signer.ok_or_else(|| MeridianError::missing_field("signer"))?,
            commitment_type: self
                .commitment_type
                .ok_or_else(|| MeridianError::missing_field("commitment type"))?,
            chain_id: self.chain_id.unwrap_or(TESTNET_CHAIN_ID),
            fee: self.fee.ok_or_else(|| MeridianError::missing_field("fee"))?,
            value: self.value.ok_or_else(|| MeridianError::missing_field("value"))?,
        };

        let codec = CommitmentCodec;
        let canonical = codec.encode(&fields)?;
        let digest = codec.digest(&canonical);
        let mut tx = Transaction::new(TxFields::Commitment(fields), canonical, digest, self.quorum);

        if let Some(signature) = self.pending_signature {
            tx.add_signature(&signature)?;
        }
        Ok(tx)
    }
}
