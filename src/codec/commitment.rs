//! Commitment Chain Codec
//!
//! Seven ordered fields, RLP encoded:
//! `[version, anchor(32), signer(20), commitment_type, chain_id, fee, value]`
//!
//! The commitment type is shape-sensitive: `Stake` serializes as a flat
//! scalar while `Pledge` serializes as a nested `[type, count]` list. Nodes
//! reject the wrong shape even when the semantic value coincides.
//!
//! Digest is keccak256 of the canonical bytes, signed directly. The
//! transaction id is base58(keccak256(signature)), so it only exists once a
//! signature does.

use ethers_core::types::U256;
use tiny_keccak::{Hasher, Keccak};

use super::rlp;
use super::{CanonicalCodec, DecodeError};
use crate::error::{MeridianError, MeridianResult};

/// Protocol version for commitment transactions
pub const COMMITMENT_TX_VERSION: u64 = 2;

/// Testnet chain id
pub const TESTNET_CHAIN_ID: u64 = 1270;

pub const ANCHOR_LEN: usize = 32;
pub const SIGNER_LEN: usize = 20;

/// Recoverable ECDSA r || s || v
pub const SIGNATURE_LEN: usize = 65;

const STAKE_TYPE_ID: u64 = 1;
const PLEDGE_TYPE_ID: u64 = 2;

/// Commitment directive carried by the transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitmentType {
    Stake,
    Pledge { count: U256 },
}

impl CommitmentType {
    /// Signing shape: flat scalar for Stake, nested list for Pledge
    fn rlp_item(&self) -> Vec<u8> {
        match self {
            CommitmentType::Stake => rlp::encode_u64(STAKE_TYPE_ID),
            CommitmentType::Pledge { count } => {
                rlp::encode_list(&[rlp::encode_u64(PLEDGE_TYPE_ID), rlp::encode_u256(*count)])
            }
        }
    }

    fn from_rlp_item(item: &rlp::Item) -> Result<Self, DecodeError> {
        match item {
            rlp::Item::Str(_) => {
                if item.as_u64()? != STAKE_TYPE_ID {
                    return Err(DecodeError::WrongShape(
                        "flat commitment type is not stake".into(),
                    ));
                }
                Ok(CommitmentType::Stake)
            }
            rlp::Item::List(items) => {
                if items.len() != 2 || items[0].as_u64()? != PLEDGE_TYPE_ID {
                    return Err(DecodeError::WrongShape(
                        "nested commitment type is not [pledge, count]".into(),
                    ));
                }
                Ok(CommitmentType::Pledge {
                    count: items[1].as_u256()?,
                })
            }
        }
    }

    /// Broadcast shape, with the pledge count as a decimal string
    fn broadcast_json(&self) -> serde_json::Value {
        match self {
            CommitmentType::Stake => serde_json::json!({ "type": "stake" }),
            CommitmentType::Pledge { count } => serde_json::json!({
                "type": "pledge",
                "pledgeCountBeforeExecuting": count.to_string(),
            }),
        }
    }

    fn from_broadcast_json(value: &serde_json::Value) -> MeridianResult<Self> {
        match value.get("type").and_then(|t| t.as_str()) {
            Some("stake") => Ok(CommitmentType::Stake),
            Some("pledge") => {
                let count = value
                    .get("pledgeCountBeforeExecuting")
                    .and_then(|c| c.as_str())
                    .ok_or_else(|| MeridianError::decode("pledge missing count"))?;
                let count = U256::from_dec_str(count)
                    .map_err(|e| MeridianError::decode(format!("bad pledge count: {}", e)))?;
                Ok(CommitmentType::Pledge { count })
            }
            _ => Err(MeridianError::decode("unknown commitment type")),
        }
    }
}

/// Frozen field set of a commitment transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentFields {
    pub version: u64,
    pub anchor: [u8; ANCHOR_LEN],
    pub signer: [u8; SIGNER_LEN],
    pub commitment_type: CommitmentType,
    pub chain_id: u64,
    pub fee: U256,
    pub value: U256,
}

/// Codec for the commitment chain
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitmentCodec;

impl CanonicalCodec for CommitmentCodec {
    type Fields = CommitmentFields;

    fn encode(&self, fields: &CommitmentFields) -> MeridianResult<Vec<u8>> {
        Ok(rlp::encode_list(&[
            rlp::encode_u64(fields.version),
            rlp::encode_bytes(&fields.anchor),
            rlp::encode_bytes(&fields.signer),
            fields.commitment_type.rlp_item(),
            rlp::encode_u64(fields.chain_id),
            rlp::encode_u256(fields.fee),
            rlp::encode_u256(fields.value),
        ]))
    }

    fn digest(&self, canonical: &[u8]) -> [u8; 32] {
        keccak256(canonical)
    }

    fn decode(&self, bytes: &[u8]) -> MeridianResult<CommitmentFields> {
        let item = rlp::decode(bytes)?;
        let items = item.as_list()?;
        if items.len() != 7 {
            return Err(MeridianError::decode(format!(
                "commitment transaction has {} fields, expected 7",
                items.len()
            )));
        }

        let anchor = fixed_bytes::<ANCHOR_LEN>(items[1].as_bytes()?, "anchor")?;
        let signer = fixed_bytes::<SIGNER_LEN>(items[2].as_bytes()?, "signer")?;

        Ok(CommitmentFields {
            version: items[0].as_u64()?,
            anchor,
            signer,
            commitment_type: CommitmentType::from_rlp_item(&items[3])?,
            chain_id: items[4].as_u64()?,
            fee: items[5].as_u256()?,
            value: items[6].as_u256()?,
        })
    }
}

fn fixed_bytes<const N: usize>(bytes: &[u8], field: &'static str) -> Result<[u8; N], DecodeError> {
    bytes.try_into().map_err(|_| DecodeError::WrongLength {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

/// keccak256 helper shared by digest and tx-id computation
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Transaction id: base58(keccak256(signature)).
/// Derived from the signature, not the unsigned bytes, so two distinct valid
/// signatures over the same transaction produce two distinct ids. Protocol
/// behavior; do not "fix" it to be signature-independent.
pub fn compute_tx_id(signature: &[u8]) -> MeridianResult<String> {
    if signature.len() != SIGNATURE_LEN {
        return Err(MeridianError::signature(format!(
            "Signature must be {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }
    Ok(bs58::encode(keccak256(signature)).into_string())
}

/// Build the broadcast JSON envelope. Big integers are decimal strings,
/// never floats. The id and signature entries are present only when signed.
pub fn broadcast_payload(
    fields: &CommitmentFields,
    signature: Option<&[u8]>,
) -> MeridianResult<serde_json::Value> {
    let mut payload = serde_json::json!({
        "version": fields.version,
        "anchor": bs58::encode(fields.anchor).into_string(),
        "signer": format!("0x{}", hex::encode(fields.signer)),
        "commitmentType": fields.commitment_type.broadcast_json(),
        "chainId": fields.chain_id.to_string(),
        "fee": fields.fee.to_string(),
        "value": fields.value.to_string(),
    });

    if let Some(sig) = signature {
        let id = compute_tx_id(sig)?;
        payload["id"] = serde_json::Value::String(id);
        payload["signature"] = serde_json::Value::String(bs58::encode(sig).into_string());
    }

    Ok(payload)
}

/// Parse a broadcast envelope back into fields plus the signature, if any
pub fn parse_broadcast_payload(
    bytes: &[u8],
) -> MeridianResult<(CommitmentFields, Option<Vec<u8>>)> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;

    let anchor = decode_base58_fixed::<ANCHOR_LEN>(str_field(&value, "anchor")?, "anchor")?;
    let signer_hex = str_field(&value, "signer")?;
    let signer_bytes = hex::decode(signer_hex.trim_start_matches("0x"))?;
    let signer = fixed_bytes::<SIGNER_LEN>(&signer_bytes, "signer")
        .map_err(MeridianError::from)?;

    let commitment_type = CommitmentType::from_broadcast_json(
        value
            .get("commitmentType")
            .ok_or_else(|| MeridianError::decode("missing commitmentType"))?,
    )?;

    let fields = CommitmentFields {
        version: value
            .get("version")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| MeridianError::decode("missing version"))?,
        anchor,
        signer,
        commitment_type,
        chain_id: str_field(&value, "chainId")?
            .parse()
            .map_err(|_| MeridianError::decode("bad chainId"))?,
        fee: U256::from_dec_str(str_field(&value, "fee")?)
            .map_err(|e| MeridianError::decode(format!("bad fee: {}", e)))?,
        value: U256::from_dec_str(str_field(&value, "value")?)
            .map_err(|e| MeridianError::decode(format!("bad value: {}", e)))?,
    };

    let signature = match value.get("signature").and_then(|s| s.as_str()) {
        Some(sig) => {
            let raw = bs58::decode(sig)
                .into_vec()
                .map_err(|e| MeridianError::decode(format!("bad signature encoding: {}", e)))?;
            if raw.len() != SIGNATURE_LEN {
                return Err(MeridianError::decode(format!(
                    "signature must be {} bytes, got {}",
                    SIGNATURE_LEN,
                    raw.len()
                )));
            }
            Some(raw)
        }
        None => None,
    };

    Ok((fields, signature))
}

fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> MeridianResult<&'a str> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| MeridianError::decode(format!("missing {}", key)))
}

fn decode_base58_fixed<const N: usize>(s: &str, field: &'static str) -> MeridianResult<[u8; N]> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| MeridianError::decode(format!("bad base58 {}: {}", field, e)))?;
    fixed_bytes::<N>(&bytes, field).map_err(MeridianError::from)
}
