//! Bank Chain Codec
//!
//! Length-delimited transfer codec for the account/sequence chain used by
//! recovery sweeps. The sign doc is a protobuf-style message with an exact
//! field order; the digest is sha256 of the sign doc bytes. The broadcast
//! form wraps body, auth info, and the raw signature into one envelope,
//! base64-encoded; the tx id is the uppercase hex sha256 of those bytes.
//!
//! Field tables:
//!
//! ```text
//! body:     1 sender (string)   2 recipient (string)  3 amount (Coin)  4 memo (string, omitted when empty)
//! auth:     1 public_key (33B)  2 sequence (varint)   3 fee (Coin)
//! sign_doc: 1 body (bytes)      2 auth (bytes)        3 chain_id (string)
//! tx_raw:   1 body (bytes)      2 auth (bytes)        3 signature (64B)
//! Coin:     1 denom (string)    2 amount (decimal string)
//! ```

use base64::Engine;
use sha2::{Digest, Sha256};

use super::{CanonicalCodec, DecodeError};
use crate::error::{MeridianError, MeridianResult};

/// Compact ECDSA r || s
pub const SIGNATURE_LEN: usize = 64;

/// Compressed secp256k1 public key
pub const PUBLIC_KEY_LEN: usize = 33;

/// Bech32 human-readable prefix for bank-chain addresses
pub const ADDRESS_HRP: &str = "mrd";

/// Denominations the chain accepts; anything else is a validation error
pub const DENOM_WHITELIST: &[&str] = &["umrd"];

const MAX_MEMO_LEN: usize = 256;

/// Denomination and amount, amount as a decimal string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount: amount.to_string(),
        }
    }

    fn validate(&self, field: &str) -> MeridianResult<()> {
        if !DENOM_WHITELIST.contains(&self.denom.as_str()) {
            return Err(MeridianError::validation(format!(
                "{}: denom {:?} not in whitelist",
                field, self.denom
            )));
        }
        if self.amount.is_empty() || !self.amount.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MeridianError::validation(format!(
                "{}: amount must be a decimal string, got {:?}",
                field, self.amount
            )));
        }
        Ok(())
    }
}

/// Frozen field set of a bank transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankFields {
    pub sender: String,
    pub recipient: String,
    pub amount: Coin,
    pub fee: Coin,
    pub sequence: u64,
    pub chain_id: String,
    pub memo: String,
    pub public_key: Vec<u8>,
}

impl BankFields {
    /// Pre-encode validation; every failure is local, nothing is coerced
    pub fn validate(&self) -> MeridianResult<()> {
        validate_address(&self.sender, "sender")?;
        validate_address(&self.recipient, "recipient")?;
        self.amount.validate("amount")?;
        self.fee.validate("fee")?;
        if self.public_key.len() != PUBLIC_KEY_LEN {
            return Err(MeridianError::validation(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_KEY_LEN,
                self.public_key.len()
            )));
        }
        if self.chain_id.is_empty() {
            return Err(MeridianError::validation("chain id must not be empty"));
        }
        if self.memo.len() > MAX_MEMO_LEN {
            return Err(MeridianError::validation(format!(
                "memo exceeds {} bytes",
                MAX_MEMO_LEN
            )));
        }
        Ok(())
    }
}

/// Validate a bech32 address against the chain prefix
pub fn validate_address(address: &str, field: &str) -> MeridianResult<()> {
    let (hrp, _, _) = bech32::decode(address)
        .map_err(|e| MeridianError::validation(format!("{}: invalid bech32: {}", field, e)))?;
    if hrp != ADDRESS_HRP {
        return Err(MeridianError::validation(format!(
            "{}: expected {} prefix, got {}",
            field, ADDRESS_HRP, hrp
        )));
    }
    Ok(())
}

/// Codec for the bank chain
#[derive(Debug, Clone, Copy, Default)]
pub struct BankCodec;

impl CanonicalCodec for BankCodec {
    type Fields = BankFields;

    fn encode(&self, fields: &BankFields) -> MeridianResult<Vec<u8>> {
        fields.validate()?;

        let body = encode_body(fields);
        let auth = encode_auth(fields);

        let mut doc = Vec::new();
        write_len_delimited(1, &body, &mut doc);
        write_len_delimited(2, &auth, &mut doc);
        write_len_delimited(3, fields.chain_id.as_bytes(), &mut doc);
        Ok(doc)
    }

    fn digest(&self, canonical: &[u8]) -> [u8; 32] {
        sha256(canonical)
    }

    fn decode(&self, bytes: &[u8]) -> MeridianResult<BankFields> {
        let (body, auth, chain_id) = split_envelope(bytes)?;
        let chain_id = String::from_utf8(chain_id.to_vec())
            .map_err(|_| DecodeError::InvalidUtf8("chain_id"))?;
        Ok(decode_fields(body, auth, chain_id)?)
    }
}

/// Broadcast envelope bytes: body, auth info, and the raw signature
pub fn broadcast_bytes(fields: &BankFields, signature: &[u8]) -> MeridianResult<Vec<u8>> {
    fields.validate()?;
    if signature.len() != SIGNATURE_LEN {
        return Err(MeridianError::signature(format!(
            "Signature must be {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }

    let body = encode_body(fields);
    let auth = encode_auth(fields);

    let mut raw = Vec::new();
    write_len_delimited(1, &body, &mut raw);
    write_len_delimited(2, &auth, &mut raw);
    write_len_delimited(3, signature, &mut raw);
    Ok(raw)
}

/// Base64 broadcast string, the form nodes accept over RPC
pub fn broadcast_base64(fields: &BankFields, signature: &[u8]) -> MeridianResult<String> {
    Ok(base64::engine::general_purpose::STANDARD.encode(broadcast_bytes(fields, signature)?))
}

/// Transaction id: uppercase hex sha256 of the broadcast bytes
pub fn compute_tx_id(broadcast: &[u8]) -> String {
    hex::encode_upper(sha256(broadcast))
}

/// Parse broadcast bytes back into fields and signature. The chain id is not
/// part of the broadcast envelope (it lives in the sign doc only), so the
/// caller supplies it for re-derivation.
pub fn parse_broadcast(bytes: &[u8], chain_id: &str) -> MeridianResult<(BankFields, Vec<u8>)> {
    let (body, auth, signature) = split_envelope(bytes)?;
    if signature.len() != SIGNATURE_LEN {
        return Err(MeridianError::decode(format!(
            "signature must be {} bytes, got {}",
            SIGNATURE_LEN,
            signature.len()
        )));
    }
    let fields = decode_fields(body, auth, chain_id.to_string())?;
    Ok((fields, signature.to_vec()))
}

fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

// === Encoding ===

fn encode_coin(coin: &Coin) -> Vec<u8> {
    let mut buf = Vec::new();
    write_len_delimited(1, coin.denom.as_bytes(), &mut buf);
    write_len_delimited(2, coin.amount.as_bytes(), &mut buf);
    buf
}

fn encode_body(fields: &BankFields) -> Vec<u8> {
    let mut body = Vec::new();
    write_len_delimited(1, fields.sender.as_bytes(), &mut body);
    write_len_delimited(2, fields.recipient.as_bytes(), &mut body);
    write_len_delimited(3, &encode_coin(&fields.amount), &mut body);
    if !fields.memo.is_empty() {
        write_len_delimited(4, fields.memo.as_bytes(), &mut body);
    }
    body
}

fn encode_auth(fields: &BankFields) -> Vec<u8> {
    let mut auth = Vec::new();
    write_len_delimited(1, &fields.public_key, &mut auth);
    write_varint_field(2, fields.sequence, &mut auth);
    write_len_delimited(3, &encode_coin(&fields.fee), &mut auth);
    auth
}

fn write_len_delimited(field: u8, data: &[u8], buf: &mut Vec<u8>) {
    buf.push((field << 3) | 2);
    write_varint(data.len() as u64, buf);
    buf.extend_from_slice(data);
}

fn write_varint_field(field: u8, value: u64, buf: &mut Vec<u8>) {
    buf.push(field << 3);
    write_varint(value, buf);
}

fn write_varint(mut value: u64, buf: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

// === Decoding ===

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn done(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn read_byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self.data.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.read_byte()?;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(DecodeError::WrongShape("varint too long".into()));
            }
        }
    }

    fn read_len_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()? as usize;
        let end = self.pos.checked_add(len).ok_or(DecodeError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(DecodeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }
}

/// Split a three-field envelope (sign doc or tx raw) into its parts
fn split_envelope(bytes: &[u8]) -> Result<(&[u8], &[u8], &[u8]), DecodeError> {
    let mut reader = Reader::new(bytes);
    let mut body = None;
    let mut auth = None;
    let mut third = None;

    while !reader.done() {
        let tag = reader.read_byte()?;
        match tag {
            0x0a => body = Some(reader.read_len_delimited()?),
            0x12 => auth = Some(reader.read_len_delimited()?),
            0x1a => third = Some(reader.read_len_delimited()?),
            other => return Err(DecodeError::UnknownTag(other)),
        }
    }

    match (body, auth, third) {
        (Some(b), Some(a), Some(t)) => Ok((b, a, t)),
        _ => Err(DecodeError::WrongShape("envelope missing fields".into())),
    }
}

fn decode_coin(bytes: &[u8]) -> Result<Coin, DecodeError> {
    let mut reader = Reader::new(bytes);
    let mut denom = None;
    let mut amount = None;

    while !reader.done() {
        match reader.read_byte()? {
            0x0a => denom = Some(reader.read_len_delimited()?),
            0x12 => amount = Some(reader.read_len_delimited()?),
            other => return Err(DecodeError::UnknownTag(other)),
        }
    }

    Ok(Coin {
        denom: utf8(denom.ok_or(DecodeError::WrongShape("coin missing denom".into()))?, "denom")?,
        amount: utf8(
            amount.ok_or(DecodeError::WrongShape("coin missing amount".into()))?,
            "amount",
        )?,
    })
}

fn decode_fields(body: &[u8], auth: &[u8], chain_id: String) -> Result<BankFields, DecodeError> {
    let mut reader = Reader::new(body);
    let mut sender = None;
    let mut recipient = None;
    let mut amount = None;
    let mut memo = String::new();

    while !reader.done() {
        match reader.read_byte()? {
            0x0a => sender = Some(reader.read_len_delimited()?),
            0x12 => recipient = Some(reader.read_len_delimited()?),
            0x1a => amount = Some(decode_coin(reader.read_len_delimited()?)?),
            0x22 => memo = utf8(reader.read_len_delimited()?, "memo")?,
            other => return Err(DecodeError::UnknownTag(other)),
        }
    }

    let mut reader = Reader::new(auth);
    let mut public_key = None;
    let mut sequence = None;
    let mut fee = None;

    while !reader.done() {
        match reader.read_byte()? {
            0x0a => public_key = Some(reader.read_len_delimited()?.to_vec()),
            0x10 => sequence = Some(reader.read_varint()?),
            0x1a => fee = Some(decode_coin(reader.read_len_delimited()?)?),
            other => return Err(DecodeError::UnknownTag(other)),
        }
    }

    Ok(BankFields {
        sender: utf8(
            sender.ok_or(DecodeError::WrongShape("body missing sender".into()))?,
            "sender",
        )?,
        recipient: utf8(
            recipient.ok_or(DecodeError::WrongShape("body missing recipient".into()))?,
            "recipient",
        )?,
        amount: amount.ok_or(DecodeError::WrongShape("body missing amount".into()))?,
        fee: fee.ok_or(DecodeError::WrongShape("auth missing fee".into()))?,
        sequence: sequence.ok_or(DecodeError::WrongShape("auth missing sequence".into()))?,
        chain_id,
        memo,
        public_key: public_key.ok_or(DecodeError::WrongShape("auth missing public key".into()))?,
    })
}

fn utf8(bytes: &[u8], field: &'static str) -> Result<String, DecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(field))
}
