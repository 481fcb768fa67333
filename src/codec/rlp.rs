//! RLP Encoding and Decoding
//!
//! Length-prefixed recursive byte-string/list codec used by the commitment
//! chain. Field order and byte shape are protocol-mandated: a scalar and a
//! single-element list holding the same value are different encodings, and
//! receiving nodes reject the wrong shape.

use ethers_core::types::U256;

use super::DecodeError;

/// RLP encode a u64 as a minimal big-endian scalar
pub fn encode_u64(val: u64) -> Vec<u8> {
    if val == 0 {
        return vec![0x80];
    }
    let bytes = val.to_be_bytes();
    let leading_zeros = bytes.iter().take_while(|&&b| b == 0).count();
    let significant = &bytes[leading_zeros..];

    if significant.len() == 1 && significant[0] < 0x80 {
        significant.to_vec()
    } else {
        let mut result = vec![0x80 + significant.len() as u8];
        result.extend_from_slice(significant);
        result
    }
}

/// RLP encode a U256 as a minimal big-endian scalar
pub fn encode_u256(val: U256) -> Vec<u8> {
    if val.is_zero() {
        return vec![0x80];
    }
    let mut buf = [0u8; 32];
    val.to_big_endian(&mut buf);
    let leading_zeros = buf.iter().take_while(|&&b| b == 0).count();
    let significant = &buf[leading_zeros..];

    if significant.len() == 1 && significant[0] < 0x80 {
        significant.to_vec()
    } else {
        let mut result = vec![0x80 + significant.len() as u8];
        result.extend_from_slice(significant);
        result
    }
}

/// RLP encode a byte string verbatim (no leading-zero stripping; fixed-width
/// fields like anchors and signer addresses must keep their exact length)
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    if data.len() == 1 && data[0] < 0x80 {
        return data.to_vec();
    }

    if data.len() < 56 {
        let mut result = vec![0x80 + data.len() as u8];
        result.extend_from_slice(data);
        result
    } else {
        let len_bytes = encode_length(data.len());
        let mut result = vec![0xb7 + len_bytes.len() as u8];
        result.extend_from_slice(&len_bytes);
        result.extend_from_slice(data);
        result
    }
}

/// RLP encode a list from already-encoded items
pub fn encode_list(items: &[Vec<u8>]) -> Vec<u8> {
    let mut payload = Vec::new();
    for item in items {
        payload.extend_from_slice(item);
    }

    if payload.len() < 56 {
        let mut result = vec![0xc0 + payload.len() as u8];
        result.extend_from_slice(&payload);
        result
    } else {
        let len_bytes = encode_length(payload.len());
        let mut result = vec![0xf7 + len_bytes.len() as u8];
        result.extend_from_slice(&len_bytes);
        result.extend_from_slice(&payload);
        result
    }
}

fn encode_length(len: usize) -> Vec<u8> {
    if len == 0 {
        return vec![];
    }
    let bytes = len.to_be_bytes();
    let leading_zeros = bytes.iter().take_while(|&&b| b == 0).count();
    bytes[leading_zeros..].to_vec()
}

/// A decoded RLP item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Str(Vec<u8>),
    List(Vec<Item>),
}

impl Item {
    pub fn as_bytes(&self) -> Result<&[u8], DecodeError> {
        match self {
            Item::Str(b) => Ok(b),
            Item::List(_) => Err(DecodeError::WrongShape(
                "expected byte string, found list".into(),
            )),
        }
    }

    pub fn as_list(&self) -> Result<&[Item], DecodeError> {
        match self {
            Item::List(items) => Ok(items),
            Item::Str(_) => Err(DecodeError::WrongShape(
                "expected list, found byte string".into(),
            )),
        }
    }

    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 8 {
            return Err(DecodeError::WrongShape("scalar exceeds 8 bytes".into()));
        }
        let mut val = 0u64;
        for &b in bytes {
            val = (val << 8) | b as u64;
        }
        Ok(val)
    }

    pub fn as_u256(&self) -> Result<U256, DecodeError> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 32 {
            return Err(DecodeError::WrongShape("scalar exceeds 32 bytes".into()));
        }
        Ok(U256::from_big_endian(bytes))
    }
}

/// Decode a single top-level RLP item; trailing bytes are an error
pub fn decode(data: &[u8]) -> Result<Item, DecodeError> {
    let (item, consumed) = decode_item(data)?;
    if consumed != data.len() {
        return Err(DecodeError::TrailingBytes(data.len() - consumed));
    }
    Ok(item)
}

fn decode_item(data: &[u8]) -> Result<(Item, usize), DecodeError> {
    let &prefix = data.first().ok_or(DecodeError::Truncated)?;

    match prefix {
        0x00..=0x7f => Ok((Item::Str(vec![prefix]), 1)),
        0x80..=0xb7 => {
            let len = (prefix - 0x80) as usize;
            let payload = data.get(1..1 + len).ok_or(DecodeError::Truncated)?;
            Ok((Item::Str(payload.to_vec()), 1 + len))
        }
        0xb8..=0xbf => {
            let len_of_len = (prefix - 0xb7) as usize;
            let len = read_length(data.get(1..1 + len_of_len).ok_or(DecodeError::Truncated)?)?;
            let start = 1 + len_of_len;
            let end = start.checked_add(len).ok_or(DecodeError::Truncated)?;
            let payload = data.get(start..end).ok_or(DecodeError::Truncated)?;
            Ok((Item::Str(payload.to_vec()), end))
        }
        0xc0..=0xf7 => {
            let len = (prefix - 0xc0) as usize;
            let payload = data.get(1..1 + len).ok_or(DecodeError::Truncated)?;
            Ok((Item::List(decode_list_payload(payload)?), 1 + len))
        }
        0xf8..=0xff => {
            let len_of_len = (prefix - 0xf7) as usize;
            let len = read_length(data.get(1..1 + len_of_len).ok_or(DecodeError::Truncated)?)?;
            let start = 1 + len_of_len;
            let end = start.checked_add(len).ok_or(DecodeError::Truncated)?;
            let payload = data.get(start..end).ok_or(DecodeError::Truncated)?;
            Ok((Item::List(decode_list_payload(payload)?), end))
        }
    }
}

fn decode_list_payload(mut payload: &[u8]) -> Result<Vec<Item>, DecodeError> {
    let mut items = Vec::new();
    while !payload.is_empty() {
        let (item, consumed) = decode_item(payload)?;
        items.push(item);
        payload = &payload[consumed..];
    }
    Ok(items)
}

fn read_length(bytes: &[u8]) -> Result<usize, DecodeError> {
    if bytes.is_empty() || bytes[0] == 0 {
        return Err(DecodeError::WrongShape("non-canonical length prefix".into()));
    }
    if bytes.len() > std::mem::size_of::<usize>() {
        return Err(DecodeError::WrongShape("length prefix too large".into()));
    }
    let mut len = 0usize;
    for &b in bytes {
        len = (len << 8) | b as usize;
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_encoding() {
        assert_eq!(encode_u64(0), vec![0x80]);
        assert_eq!(encode_u64(127), vec![127]);
        assert_eq!(encode_u64(128), vec![0x81, 128]);
        assert_eq!(encode_u64(1270), vec![0x82, 0x04, 0xf6]);
    }

    #[test]
    fn test_u256_encoding() {
        // 20000 * 10^18
        let val = U256::from_dec_str("20000000000000000000000").unwrap();
        let encoded = encode_u256(val);
        assert_eq!(hex::encode(&encoded), "8a043c33c1937564800000");
    }

    #[test]
    fn test_fixed_width_bytes_keep_leading_zeros() {
        let anchor = [0u8; 32];
        let encoded = encode_bytes(&anchor);
        assert_eq!(encoded.len(), 33);
        assert_eq!(encoded[0], 0xa0);
    }

    #[test]
    fn test_roundtrip_nested_list() {
        let inner = encode_list(&[encode_u64(2), encode_u64(0)]);
        assert_eq!(inner, vec![0xc2, 0x02, 0x80]);

        let outer = encode_list(&[encode_u64(1), inner.clone(), encode_bytes(b"abc")]);
        let decoded = decode(&outer).unwrap();
        let items = decoded.as_list().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_u64().unwrap(), 1);
        assert_eq!(items[1].as_list().unwrap().len(), 2);
        assert_eq!(items[2].as_bytes().unwrap(), b"abc");
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut encoded = encode_list(&[encode_u64(1)]);
        encoded.push(0x00);
        assert!(matches!(
            decode(&encoded),
            Err(DecodeError::TrailingBytes(1))
        ));
    }
}
