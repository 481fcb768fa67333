//! Bank Transfer Builder
//!
//! Builds account/sequence transfers for the bank chain. This is the builder
//! the recovery planner drives: one transfer per funded scan address, each
//! with that address's own sequence.

use super::transaction::{Transaction, TxFields};
use crate::codec::bank::{self, BankCodec, BankFields, Coin, PUBLIC_KEY_LEN};
use crate::codec::CanonicalCodec;
use crate::error::{MeridianError, MeridianResult};
use crate::oracle::AccountOracle;

/// Builder for bank-chain transfers
#[derive(Debug, Clone)]
pub struct TransferBuilder {
    sender: Option<String>,
    recipient: Option<String>,
    amount: Option<u128>,
    fee: Option<u128>,
    sequence: Option<u64>,
    chain_id: Option<String>,
    memo: String,
    public_key: Option<Vec<u8>>,
    quorum: usize,
    pending_signature: Option<Vec<u8>>,
}

impl Default for TransferBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferBuilder {
    pub fn new() -> Self {
        Self {
            sender: None,
            recipient: None,
            amount: None,
            fee: None,
            sequence: None,
            chain_id: None,
            memo: String::new(),
            public_key: None,
            quorum: 1,
            pending_signature: None,
        }
    }

    /// Reconstruct builder state from base64 broadcast bytes. The chain id
    /// is not carried in the envelope, so the caller supplies it.
    pub fn from_broadcast_base64(encoded: &str, chain_id: &str) -> MeridianResult<Self> {
        use base64::Engine;
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| MeridianError::decode(format!("broadcast is not base64: {}", e)))?;
        let (fields, signature) = bank::parse_broadcast(&raw, chain_id)?;
        Ok(Self {
            sender: Some(fields.sender),
            recipient: Some(fields.recipient),
            amount: Some(parse_amount(&fields.amount.amount)?),
            fee: Some(parse_amount(&fields.fee.amount)?),
            sequence: Some(fields.sequence),
            chain_id: Some(fields.chain_id),
            memo: fields.memo,
            public_key: Some(fields.public_key),
            quorum: 1,
            pending_signature: Some(signature),
        })
    }

    // === Setters ===

    pub fn sender(mut self, sender: &str) -> MeridianResult<Self> {
        bank::validate_address(sender, "sender")?;
        self.sender = Some(sender.to_string());
        Ok(self)
    }

    pub fn recipient(mut self, recipient: &str) -> MeridianResult<Self> {
        bank::validate_address(recipient, "recipient")?;
        self.recipient = Some(recipient.to_string());
        Ok(self)
    }

    pub fn amount(mut self, amount: u128) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn fee(mut self, fee: u128) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn chain_id(mut self, chain_id: &str) -> Self {
        self.chain_id = Some(chain_id.to_string());
        self
    }

    pub fn memo(mut self, memo: &str) -> Self {
        self.memo = memo.to_string();
        self
    }

    /// Compressed secp256k1 public key of the sender account
    pub fn public_key(mut self, public_key: &[u8]) -> MeridianResult<Self> {
        if public_key.len() != PUBLIC_KEY_LEN {
            return Err(MeridianError::validation(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_KEY_LEN,
                public_key.len()
            )));
        }
        self.public_key = Some(public_key.to_vec());
        Ok(self)
    }

    pub fn quorum(mut self, quorum: usize) -> MeridianResult<Self> {
        if quorum == 0 {
            return Err(MeridianError::validation("quorum must be at least 1"));
        }
        // Every signature must verify against the one frozen account key, so a
        // higher quorum could never be met.
        if quorum > 1 {
            return Err(MeridianError::validation(
                "bank transfers are single-signer; quorum above 1 is unsatisfiable",
            ));
        }
        self.quorum = quorum;
        Ok(self)
    }

    // === Build ===

    /// Freeze the transfer; the sequence must have been set explicitly
    pub fn build(self) -> MeridianResult<Transaction> {
        if self.sequence.is_none() {
            return Err(MeridianError::missing_field("sequence"));
        }
        self.freeze()
    }

    /// Freeze the transfer, fetching the sender's sequence from the oracle
    /// when one was not supplied
    pub async fn build_with_oracle<O: AccountOracle>(
        mut self,
        oracle: &O,
    ) -> MeridianResult<Transaction> {
        if self.sequence.is_none() {
            let sender = self
                .sender
                .as_deref()
                .ok_or_else(|| MeridianError::missing_field("sender"))?;
            let state = oracle.get_account_state(sender).await?;
            self.sequence = Some(state.sequence);
        }
        self.freeze()
    }

    fn freeze(self) -> MeridianResult<Transaction> {
        let fields = BankFields {
            sender: self.sender.ok_or_else(|| MeridianError::missing_field("sender"))?,
            recipient: self
                .recipient
                .ok_or_else(|| MeridianError::missing_field("recipient"))?,
            amount: Coin::new(
                bank::DENOM_WHITELIST[0],
                self.amount.ok_or_else(|| MeridianError::missing_field("amount"))?,
            ),
            fee: Coin::new(
                bank::DENOM_WHITELIST[0],
                self.fee.ok_or_else(|| MeridianError::missing_field("fee"))?,
            ),
            sequence: self
                .sequence
                .ok_or_else(|| MeridianError::missing_field("sequence"))?,
            chain_id: self
                .chain_id
                .ok_or_else(|| MeridianError::missing_field("chain id"))?,
            memo: self.memo,
            public_key: self
                .public_key
                .ok_or_else(|| MeridianError::missing_field("public key"))?,
        };

        let codec = BankCodec;
        let canonical = codec.encode(&fields)?;
        let digest = codec.digest(&canonical);
        let mut tx = Transaction::new(TxFields::Bank(fields), canonical, digest, self.quorum);

        if let Some(signature) = self.pending_signature {
            tx.add_signature(&signature)?;
        }
        Ok(tx)
    }
}

fn parse_amount(s: &str) -> MeridianResult<u128> {
    s.parse::<u128>()
        .map_err(|_| MeridianError::decode(format!("bad amount string {:?}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{derivation, SigningKeyMaterial};

    fn builder_for(material: &SigningKeyMaterial) -> TransferBuilder {
        let public_key = material.public_key().unwrap();
        let sender = derivation::bank_address(&public_key).unwrap();
        let other = SigningKeyMaterial::from_secp256k1_bytes(&[0x55; 32]).unwrap();
        let recipient = derivation::bank_address(&other.public_key().unwrap()).unwrap();

        TransferBuilder::new()
            .sender(&sender)
            .unwrap()
            .recipient(&recipient)
            .unwrap()
            .amount(900_000)
            .fee(1_000)
            .sequence(11)
            .chain_id("meridian-1")
            .public_key(&public_key)
            .unwrap()
    }

    #[test]
    fn test_build_and_sign_round_trip() {
        let material = SigningKeyMaterial::from_secp256k1_bytes(&[0x66; 32]).unwrap();
        let mut tx = builder_for(&material).build().unwrap();

        let full = material.sign_digest(&tx.digest()).unwrap();
        tx.add_signature(&full[..64]).unwrap();
        let broadcast = tx.to_broadcast_format().unwrap();

        let encoded = String::from_utf8(broadcast.clone()).unwrap();
        let mut rebuilt = TransferBuilder::from_broadcast_base64(&encoded, "meridian-1")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(rebuilt.digest(), tx.digest());
        assert!(rebuilt.is_signed());
        assert_eq!(rebuilt.to_broadcast_format().unwrap(), broadcast);
    }

    #[test]
    fn test_quorum_above_one_is_rejected() {
        assert!(TransferBuilder::new().quorum(1).is_ok());
        assert!(TransferBuilder::new().quorum(0).is_err());
        assert!(TransferBuilder::new().quorum(2).is_err());
    }

    #[test]
    fn test_sequence_is_required_offline() {
        let material = SigningKeyMaterial::from_secp256k1_bytes(&[0x66; 32]).unwrap();
        let public_key = material.public_key().unwrap();
        let sender = derivation::bank_address(&public_key).unwrap();
        let err = TransferBuilder::new()
            .sender(&sender)
            .unwrap()
            .recipient(&sender)
            .unwrap()
            .amount(1)
            .fee(1)
            .chain_id("meridian-1")
            .public_key(&public_key)
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.message.contains("sequence"));
    }

    #[test]
    fn test_setter_rejects_foreign_address() {
        assert!(TransferBuilder::new().sender("cosmos1xyz").is_err());
    }

    #[tokio::test]
    async fn test_oracle_supplies_missing_sequence() {
        use crate::codec::commitment::ANCHOR_LEN;
        use crate::oracle::AccountState;

        struct SequenceOracle;

        impl AccountOracle for SequenceOracle {
            async fn get_account_state(&self, _address: &str) -> MeridianResult<AccountState> {
                Ok(AccountState {
                    sequence: 42,
                    balance: 1_000_000,
                })
            }

            async fn get_freshness_anchor(&self) -> MeridianResult<[u8; ANCHOR_LEN]> {
                Ok([0u8; ANCHOR_LEN])
            }

            async fn estimate_fee(&self) -> MeridianResult<u128> {
                Ok(100)
            }
        }

        let material = SigningKeyMaterial::from_secp256k1_bytes(&[0x66; 32]).unwrap();
        let public_key = material.public_key().unwrap();
        let sender = derivation::bank_address(&public_key).unwrap();
        let tx = TransferBuilder::new()
            .sender(&sender)
            .unwrap()
            .recipient(&sender)
            .unwrap()
            .amount(10)
            .fee(1)
            .chain_id("meridian-1")
            .public_key(&public_key)
            .unwrap()
            .build_with_oracle(&SequenceOracle)
            .await
            .unwrap();
        match tx.fields() {
            crate::tx::TxFields::Bank(fields) => assert_eq!(fields.sequence, 42),
            _ => unreachable!(),
        }
    }
}
