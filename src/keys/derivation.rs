//! Scan Address Derivation
//!
//! Recovery scans walk unhardened child indices of a base key. Index 0 is the
//! base address and is never scanned; indices 1.. are scan addresses. Each
//! chain family formats addresses its own way:
//!
//! - commitment: last 20 bytes of keccak256 of the uncompressed public key
//! - bank: bech32 of ripemd160(sha256(compressed public key))

use bech32::ToBase32;
use ripemd::Ripemd160;
use secp256k1::PublicKey;
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

use super::SigningKeyMaterial;
use crate::codec::bank::ADDRESS_HRP;
use crate::codec::commitment::SIGNER_LEN;
use crate::error::{MeridianError, MeridianResult};

/// Derivation path string for a scan index, shown in recovery reports
pub fn scan_path(index: u32) -> String {
    format!("m/{}", index)
}

/// 20-byte commitment-chain signer address from a compressed public key
pub fn commitment_address(compressed: &[u8]) -> MeridianResult<[u8; SIGNER_LEN]> {
    let pubkey = PublicKey::from_slice(compressed)?;
    let uncompressed = pubkey.serialize_uncompressed();

    let mut hasher = Keccak::v256();
    let mut hash = [0u8; 32];
    // Skip the 0x04 point-format byte
    hasher.update(&uncompressed[1..]);
    hasher.finalize(&mut hash);

    let mut address = [0u8; SIGNER_LEN];
    address.copy_from_slice(&hash[12..]);
    Ok(address)
}

/// Bech32 bank-chain address from a compressed public key
pub fn bank_address(compressed: &[u8]) -> MeridianResult<String> {
    if compressed.len() != 33 {
        return Err(MeridianError::validation(format!(
            "compressed public key must be 33 bytes, got {}",
            compressed.len()
        )));
    }
    let sha = Sha256::digest(compressed);
    let hash = Ripemd160::digest(sha);
    bech32::encode(ADDRESS_HRP, hash.as_slice().to_base32(), bech32::Variant::Bech32)
        .map_err(|e| MeridianError::crypto(format!("bech32 encoding failed: {}", e)))
}

/// Child material at a scan index, with its public key
pub fn derive_scan_key(
    material: &SigningKeyMaterial,
    index: u32,
) -> MeridianResult<(SigningKeyMaterial, Vec<u8>)> {
    let child = material.derive_child(index)?;
    let public_key = child.public_key()?;
    Ok((child, public_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_commitment_address_is_20_bytes_and_stable() {
        let material = SigningKeyMaterial::from_mnemonic(MNEMONIC, "").unwrap();
        let pubkey = material.public_key().unwrap();
        let a = commitment_address(&pubkey).unwrap();
        let b = commitment_address(&pubkey).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_bank_address_has_chain_prefix() {
        let material = SigningKeyMaterial::from_mnemonic(MNEMONIC, "").unwrap();
        let address = bank_address(&material.public_key().unwrap()).unwrap();
        assert!(address.starts_with(ADDRESS_HRP));
        crate::codec::bank::validate_address(&address, "derived").unwrap();
    }

    #[test]
    fn test_scan_indices_yield_distinct_addresses() {
        let material = SigningKeyMaterial::from_mnemonic(MNEMONIC, "").unwrap();
        let (_, pk1) = derive_scan_key(&material, 1).unwrap();
        let (_, pk2) = derive_scan_key(&material, 2).unwrap();
        assert_ne!(pk1, pk2);
        assert_ne!(
            bank_address(&pk1).unwrap(),
            bank_address(&pk2).unwrap()
        );
    }

    #[test]
    fn test_scan_path_format() {
        assert_eq!(scan_path(1), "m/1");
        assert_eq!(scan_path(42), "m/42");
    }
}
