//! Immutable Transaction
//!
//! A `Transaction` is produced by a builder and never mutates its field set.
//! The only append operation is attaching signatures; everything else is
//! derived (canonical bytes, digest, id, broadcast form). Zero-signature
//! transactions are valid values: they serialize for offline co-signing but
//! refuse `to_broadcast_format` until the quorum is met.

use crate::codec::commitment::{self, CommitmentFields};
use crate::codec::bank::{self, BankFields};
use crate::codec::ChainFamily;
use crate::error::{MeridianError, MeridianResult};
use crate::keys::{self, derivation};

/// Frozen per-chain field set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxFields {
    Commitment(CommitmentFields),
    Bank(BankFields),
}

impl TxFields {
    pub fn family(&self) -> ChainFamily {
        match self {
            TxFields::Commitment(_) => ChainFamily::Commitment,
            TxFields::Bank(_) => ChainFamily::Bank,
        }
    }
}

/// A signature attached to a transaction, with the signer identity it
/// verified against. Identity is the 20-byte address for the commitment
/// chain and the compressed public key for the bank chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedSignature {
    pub raw: Vec<u8>,
    pub signer: Vec<u8>,
}

/// Immutable transaction with an append-only signature list
#[derive(Debug, Clone)]
pub struct Transaction {
    fields: TxFields,
    canonical: Vec<u8>,
    digest: [u8; 32],
    signatures: Vec<AttachedSignature>,
    quorum: usize,
    broadcast_cache: Option<Vec<u8>>,
}

impl Transaction {
    /// Used by the builders once every invariant has been checked
    pub(crate) fn new(
        fields: TxFields,
        canonical: Vec<u8>,
        digest: [u8; 32],
        quorum: usize,
    ) -> Self {
        Self {
            fields,
            canonical,
            digest,
            signatures: Vec::new(),
            quorum,
            broadcast_cache: None,
        }
    }

    pub fn fields(&self) -> &TxFields {
        &self.fields
    }

    pub fn family(&self) -> ChainFamily {
        self.fields.family()
    }

    /// Canonical unsigned encoding; what the digest is computed over
    pub fn canonical_bytes(&self) -> &[u8] {
        &self.canonical
    }

    /// Hex form of the canonical bytes, for offline hand-off
    pub fn unsigned_hex(&self) -> String {
        hex::encode(&self.canonical)
    }

    /// The 32-byte digest to sign
    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    pub fn signatures(&self) -> &[AttachedSignature] {
        &self.signatures
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Distinct signer identities among the attached signatures. A duplicate
    /// signature never advances this count.
    pub fn distinct_signers(&self) -> usize {
        let mut seen: Vec<&[u8]> = Vec::new();
        for sig in &self.signatures {
            if !seen.contains(&sig.signer.as_slice()) {
                seen.push(&sig.signer);
            }
        }
        seen.len()
    }

    /// Whether the quorum threshold is met
    pub fn is_signed(&self) -> bool {
        self.distinct_signers() >= self.quorum
    }

    /// Transaction id. `None` until the first signature is attached: the
    /// commitment chain derives the id from the signature itself, and the
    /// bank chain hashes the signed broadcast bytes.
    pub fn id(&self) -> MeridianResult<Option<String>> {
        let first = match self.signatures.first() {
            Some(sig) => sig,
            None => return Ok(None),
        };
        match &self.fields {
            TxFields::Commitment(_) => Ok(Some(commitment::compute_tx_id(&first.raw)?)),
            TxFields::Bank(fields) => {
                let raw = bank::broadcast_bytes(fields, &first.raw)?;
                Ok(Some(bank::compute_tx_id(&raw)))
            }
        }
    }

    /// Attach a raw signature after verifying it against the re-derived
    /// digest and the frozen signer identity. Caller-supplied metadata is
    /// never trusted; everything is re-checked here.
    pub fn add_signature(&mut self, signature: &[u8]) -> MeridianResult<()> {
        let expected_len = self.family().signature_len();
        if signature.len() != expected_len {
            return Err(MeridianError::signature(format!(
                "Signature must be {} bytes, got {}",
                expected_len,
                signature.len()
            )));
        }

        let signer = match &self.fields {
            TxFields::Commitment(fields) => {
                let pubkey = keys::recover_public_key(&self.digest, signature)?;
                let address = derivation::commitment_address(&pubkey)?;
                // With a single-signer quorum the recovered address must be
                // the frozen signer. Co-signing setups (quorum > 1) accept
                // any cleanly recovering signer and count identities.
                if self.quorum == 1 && address != fields.signer {
                    return Err(MeridianError::signature_mismatch(format!(
                        "signature recovers to 0x{}, transaction signer is 0x{}",
                        hex::encode(address),
                        hex::encode(fields.signer)
                    )));
                }
                address.to_vec()
            }
            TxFields::Bank(fields) => {
                verify_bank_signature(&self.digest, signature, &fields.public_key)?;
                fields.public_key.clone()
            }
        };

        self.signatures.push(AttachedSignature {
            raw: signature.to_vec(),
            signer,
        });
        self.broadcast_cache = None;
        Ok(())
    }

    /// Serialize for broadcast. Fails below quorum; above it the result is
    /// cached and every call returns identical bytes.
    pub fn to_broadcast_format(&mut self) -> MeridianResult<Vec<u8>> {
        if let Some(cached) = &self.broadcast_cache {
            return Ok(cached.clone());
        }
        if !self.is_signed() {
            return Err(MeridianError::quorum_unmet(format!(
                "{} of {} required signers present",
                self.distinct_signers(),
                self.quorum
            )));
        }

        let first = &self.signatures[0];
        let bytes = match &self.fields {
            TxFields::Commitment(fields) => {
                let payload = commitment::broadcast_payload(fields, Some(&first.raw))?;
                serde_json::to_vec(&payload)?
            }
            TxFields::Bank(fields) => {
                bank::broadcast_base64(fields, &first.raw)?.into_bytes()
            }
        };

        self.broadcast_cache = Some(bytes.clone());
        Ok(bytes)
    }
}

/// Verify a compact r || s bank-chain signature against a frozen public key
fn verify_bank_signature(
    digest: &[u8; 32],
    signature: &[u8],
    public_key: &[u8],
) -> MeridianResult<()> {
    use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};

    let sig = Signature::from_compact(signature)?;
    let pubkey = PublicKey::from_slice(public_key)?;
    let msg = Message::from_digest(*digest);
    Secp256k1::new()
        .verify_ecdsa(&msg, &sig, &pubkey)
        .map_err(|_| MeridianError::signature_mismatch("signature does not verify against the transaction public key"))
}
