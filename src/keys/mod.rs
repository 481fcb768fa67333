//! Signing Key Material
//!
//! Key material is a tagged union validated once at construction. Call sites
//! never inspect string prefixes or guess at key formats; a constructed value
//! is known-good for its variant, and `can_sign` / `algorithm` answer the only
//! questions the rest of the crate asks.
//!
//! SECURITY: Raw private key bytes are held in `Zeroizing` buffers and cleared
//! on drop. Debug output never contains key material.

pub mod derivation;

use std::fmt;

use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::Network;
use ed25519_dalek::Signer;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use zeroize::Zeroizing;

use crate::error::{MeridianError, MeridianResult};

/// Recoverable secp256k1 signature: r || s || v
pub const SECP256K1_SIGNATURE_LEN: usize = 65;

/// Ed25519 signature: R || s
pub const ED25519_SIGNATURE_LEN: usize = 64;

/// Signature algorithm a key material produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Secp256k1,
    Ed25519,
}

impl SignatureAlgorithm {
    /// Raw signature length in bytes for the algorithm
    pub fn signature_len(&self) -> usize {
        match self {
            SignatureAlgorithm::Secp256k1 => SECP256K1_SIGNATURE_LEN,
            SignatureAlgorithm::Ed25519 => ED25519_SIGNATURE_LEN,
        }
    }
}

/// Key material for signing or scan-address derivation
#[derive(Clone)]
pub enum SigningKeyMaterial {
    /// Raw 32-byte secp256k1 secret
    RawSecp256k1 { secret: Zeroizing<[u8; 32]> },
    /// Raw 32-byte Ed25519 seed
    RawEd25519 { seed: Zeroizing<[u8; 32]> },
    /// BIP32 extended private key
    Extended { xprv: Xpriv },
    /// BIP32 extended public key; derives scan addresses, cannot sign
    PublicOnly { xpub: Xpub },
    /// Opaque handle to an HSM/TSS signer; the public key is supplied
    /// alongside so addresses and verification still work locally
    External {
        handle: String,
        public_key: Vec<u8>,
        algorithm: SignatureAlgorithm,
    },
}

impl SigningKeyMaterial {
    /// Construct from raw secp256k1 secret bytes
    pub fn from_secp256k1_bytes(bytes: &[u8]) -> MeridianResult<Self> {
        // Curve-order check happens here, not at sign time
        let sk = SecretKey::from_slice(bytes)?;
        Ok(Self::RawSecp256k1 {
            secret: Zeroizing::new(sk.secret_bytes()),
        })
    }

    /// Construct from a 32-byte Ed25519 seed
    pub fn from_ed25519_seed(bytes: &[u8]) -> MeridianResult<Self> {
        let seed: [u8; 32] = bytes.try_into().map_err(|_| {
            MeridianError::validation(format!(
                "ed25519 seed must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::RawEd25519 {
            seed: Zeroizing::new(seed),
        })
    }

    /// Construct from a base58check extended private key string
    pub fn from_xprv_str(s: &str) -> MeridianResult<Self> {
        let xprv: Xpriv = s
            .parse()
            .map_err(|e| MeridianError::validation(format!("invalid xprv: {}", e)))?;
        Ok(Self::Extended { xprv })
    }

    /// Construct from a base58check extended public key string
    pub fn from_xpub_str(s: &str) -> MeridianResult<Self> {
        let xpub: Xpub = s
            .parse()
            .map_err(|e| MeridianError::validation(format!("invalid xpub: {}", e)))?;
        Ok(Self::PublicOnly { xpub })
    }

    /// Construct extended material from a BIP39 seed phrase
    ///
    /// SECURITY: The intermediate seed is zeroized on drop.
    pub fn from_mnemonic(phrase: &str, passphrase: &str) -> MeridianResult<Self> {
        let mnemonic = bip39::Mnemonic::parse(phrase)?;
        let seed = Zeroizing::new(mnemonic.to_seed(passphrase));
        let xprv = Xpriv::new_master(Network::Bitcoin, seed.as_ref())?;
        Ok(Self::Extended { xprv })
    }

    /// Construct a handle to an external signer
    pub fn external(
        handle: impl Into<String>,
        public_key: Vec<u8>,
        algorithm: SignatureAlgorithm,
    ) -> MeridianResult<Self> {
        match algorithm {
            SignatureAlgorithm::Secp256k1 => {
                PublicKey::from_slice(&public_key)?;
            }
            SignatureAlgorithm::Ed25519 => {
                let bytes: [u8; 32] = public_key.as_slice().try_into().map_err(|_| {
                    MeridianError::validation("ed25519 public key must be 32 bytes")
                })?;
                ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| MeridianError::validation(format!("invalid ed25519 key: {}", e)))?;
            }
        }
        Ok(Self::External {
            handle: handle.into(),
            public_key,
            algorithm,
        })
    }

    /// Generate fresh secp256k1 material from the OS RNG
    pub fn generate() -> Self {
        let (sk, _) = Secp256k1::new().generate_keypair(&mut rand::thread_rng());
        Self::RawSecp256k1 {
            secret: Zeroizing::new(sk.secret_bytes()),
        }
    }

    /// Whether this material can produce signatures locally
    pub fn can_sign(&self) -> bool {
        matches!(
            self,
            Self::RawSecp256k1 { .. } | Self::RawEd25519 { .. } | Self::Extended { .. }
        )
    }

    /// Signature algorithm this material works with
    pub fn algorithm(&self) -> SignatureAlgorithm {
        match self {
            Self::RawSecp256k1 { .. } | Self::Extended { .. } | Self::PublicOnly { .. } => {
                SignatureAlgorithm::Secp256k1
            }
            Self::RawEd25519 { .. } => SignatureAlgorithm::Ed25519,
            Self::External { algorithm, .. } => *algorithm,
        }
    }

    /// Public key bytes: 33-byte compressed secp256k1 or 32-byte Ed25519
    pub fn public_key(&self) -> MeridianResult<Vec<u8>> {
        match self {
            Self::RawSecp256k1 { secret } => {
                let sk = SecretKey::from_slice(secret.as_ref())?;
                Ok(sk.public_key(&Secp256k1::new()).serialize().to_vec())
            }
            Self::RawEd25519 { seed } => {
                let sk = ed25519_dalek::SigningKey::from_bytes(seed);
                Ok(sk.verifying_key().to_bytes().to_vec())
            }
            Self::Extended { xprv } => {
                let sk = SecretKey::from_slice(&xprv.private_key.secret_bytes())?;
                Ok(sk.public_key(&Secp256k1::new()).serialize().to_vec())
            }
            Self::PublicOnly { xpub } => Ok(xpub.public_key.serialize().to_vec()),
            Self::External { public_key, .. } => Ok(public_key.clone()),
        }
    }

    /// Derive the child material at an unhardened index
    ///
    /// Only extended material derives; raw keys have no chain code and
    /// external handles derive on the signer's side.
    pub fn derive_child(&self, index: u32) -> MeridianResult<Self> {
        let child = ChildNumber::from_normal_idx(index)
            .map_err(|e| MeridianError::validation(format!("invalid child index: {}", e)))?;
        let secp = bitcoin::secp256k1::Secp256k1::new();
        match self {
            Self::Extended { xprv } => Ok(Self::Extended {
                xprv: xprv.derive_priv(&secp, &[child])?,
            }),
            Self::PublicOnly { xpub } => Ok(Self::PublicOnly {
                xpub: xpub.derive_pub(&secp, &[child])?,
            }),
            _ => Err(MeridianError::validation(
                "only extended key material supports derivation",
            )),
        }
    }

    /// Sign a 32-byte digest
    ///
    /// Returns 65 bytes (r || s || v, v in {0..3}) for secp256k1 or 64 bytes
    /// for Ed25519. Fails for public-only and external material.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> MeridianResult<Vec<u8>> {
        match self {
            Self::RawSecp256k1 { secret } => {
                sign_recoverable(secret, digest).map(|s| s.to_vec())
            }
            Self::Extended { xprv } => {
                sign_recoverable(&xprv.private_key.secret_bytes(), digest).map(|s| s.to_vec())
            }
            Self::RawEd25519 { seed } => {
                let sk = ed25519_dalek::SigningKey::from_bytes(seed);
                Ok(sk.sign(digest).to_bytes().to_vec())
            }
            Self::PublicOnly { .. } => Err(MeridianError::signature(
                "public-only material cannot sign",
            )),
            Self::External { handle, .. } => Err(MeridianError::signature(format!(
                "external signer {:?} must sign out-of-band",
                handle
            ))),
        }
    }
}

impl fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawSecp256k1 { .. } => write!(f, "SigningKeyMaterial::RawSecp256k1(<redacted>)"),
            Self::RawEd25519 { .. } => write!(f, "SigningKeyMaterial::RawEd25519(<redacted>)"),
            Self::Extended { .. } => write!(f, "SigningKeyMaterial::Extended(<redacted>)"),
            Self::PublicOnly { xpub } => write!(f, "SigningKeyMaterial::PublicOnly({})", xpub),
            Self::External { handle, .. } => {
                write!(f, "SigningKeyMaterial::External({:?})", handle)
            }
        }
    }
}

/// Recoverable sign over a digest: r || s || v with v the raw recovery id
fn sign_recoverable(secret: &[u8; 32], digest: &[u8; 32]) -> MeridianResult<[u8; 65]> {
    let sk = SecretKey::from_slice(secret)?;
    let msg = Message::from_digest(*digest);
    let sig = Secp256k1::new().sign_ecdsa_recoverable(&msg, &sk);
    let (recid, compact) = sig.serialize_compact();
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&compact);
    out[64] = recid.to_i32() as u8;
    Ok(out)
}

/// Recover the compressed public key from a 65-byte signature over a digest
///
/// Accepts v in {0..3} as well as the legacy 27/28 offset.
pub fn recover_public_key(digest: &[u8; 32], signature: &[u8]) -> MeridianResult<Vec<u8>> {
    if signature.len() != SECP256K1_SIGNATURE_LEN {
        return Err(MeridianError::signature(format!(
            "Signature must be {} bytes, got {}",
            SECP256K1_SIGNATURE_LEN,
            signature.len()
        )));
    }
    let v = signature[64];
    let recid_raw = if v >= 27 { v - 27 } else { v };
    let recid = RecoveryId::from_i32(recid_raw as i32)?;
    let sig = RecoverableSignature::from_compact(&signature[..64], recid)?;
    let msg = Message::from_digest(*digest);
    let pubkey = Secp256k1::new().recover_ecdsa(&msg, &sig)?;
    Ok(pubkey.serialize().to_vec())
}

/// Verify a 64-byte Ed25519 signature over a digest
pub fn verify_ed25519(digest: &[u8; 32], signature: &[u8], public_key: &[u8]) -> MeridianResult<()> {
    let sig_bytes: [u8; 64] = signature.try_into().map_err(|_| {
        MeridianError::signature(format!(
            "Signature must be {} bytes, got {}",
            ED25519_SIGNATURE_LEN,
            signature.len()
        ))
    })?;
    let key_bytes: [u8; 32] = public_key
        .try_into()
        .map_err(|_| MeridianError::signature("ed25519 public key must be 32 bytes"))?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| MeridianError::signature(format!("invalid ed25519 key: {}", e)))?;
    key.verify_strict(digest, &ed25519_dalek::Signature::from_bytes(&sig_bytes))
        .map_err(|_| MeridianError::signature_mismatch("ed25519 verification failed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: [u8; 32] = [0x11; 32];

    #[test]
    fn test_raw_secp256k1_sign_and_recover() {
        let material = SigningKeyMaterial::from_secp256k1_bytes(&TEST_SECRET).unwrap();
        assert!(material.can_sign());
        assert_eq!(material.algorithm(), SignatureAlgorithm::Secp256k1);

        let digest = [0xabu8; 32];
        let sig = material.sign_digest(&digest).unwrap();
        assert_eq!(sig.len(), SECP256K1_SIGNATURE_LEN);

        let recovered = recover_public_key(&digest, &sig).unwrap();
        assert_eq!(recovered, material.public_key().unwrap());
    }

    #[test]
    fn test_raw_material_signs_like_the_bare_secret() {
        let material = SigningKeyMaterial::from_secp256k1_bytes(&TEST_SECRET).unwrap();
        let digest = [0x5au8; 32];
        let via_material = material.sign_digest(&digest).unwrap();
        let via_secret = sign_recoverable(&TEST_SECRET, &digest).unwrap();
        assert_eq!(via_material, via_secret.to_vec());
    }

    #[test]
    fn test_recover_accepts_legacy_v_offset() {
        let material = SigningKeyMaterial::from_secp256k1_bytes(&TEST_SECRET).unwrap();
        let digest = [0x42u8; 32];
        let mut sig = material.sign_digest(&digest).unwrap();
        sig[64] += 27;
        let recovered = recover_public_key(&digest, &sig).unwrap();
        assert_eq!(recovered, material.public_key().unwrap());
    }

    #[test]
    fn test_ed25519_sign_and_verify() {
        let material = SigningKeyMaterial::from_ed25519_seed(&[0x22; 32]).unwrap();
        assert_eq!(material.algorithm(), SignatureAlgorithm::Ed25519);

        let digest = [0x01u8; 32];
        let sig = material.sign_digest(&digest).unwrap();
        assert_eq!(sig.len(), ED25519_SIGNATURE_LEN);

        verify_ed25519(&digest, &sig, &material.public_key().unwrap()).unwrap();
        assert!(verify_ed25519(&[0x02u8; 32], &sig, &material.public_key().unwrap()).is_err());
    }

    #[test]
    fn test_invalid_secret_rejected_at_construction() {
        assert!(SigningKeyMaterial::from_secp256k1_bytes(&[0u8; 32]).is_err());
        assert!(SigningKeyMaterial::from_secp256k1_bytes(&[1u8; 31]).is_err());
        assert!(SigningKeyMaterial::from_ed25519_seed(&[1u8; 16]).is_err());
    }

    #[test]
    fn test_extended_and_public_only_derive_matching_children() {
        let material = SigningKeyMaterial::from_mnemonic(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
            "",
        )
        .unwrap();
        let xprv = match &material {
            SigningKeyMaterial::Extended { xprv } => *xprv,
            _ => unreachable!(),
        };
        let xpub = Xpub::from_priv(&bitcoin::secp256k1::Secp256k1::new(), &xprv);
        let public_only = SigningKeyMaterial::PublicOnly { xpub };
        assert!(!public_only.can_sign());

        for index in [1u32, 2, 7] {
            let child_priv = material.derive_child(index).unwrap();
            let child_pub = public_only.derive_child(index).unwrap();
            assert_eq!(
                child_priv.public_key().unwrap(),
                child_pub.public_key().unwrap()
            );
        }
    }

    #[test]
    fn test_public_only_cannot_sign() {
        let material = SigningKeyMaterial::from_mnemonic(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
            "",
        )
        .unwrap();
        let xprv = match &material {
            SigningKeyMaterial::Extended { xprv } => *xprv,
            _ => unreachable!(),
        };
        let xpub = Xpub::from_priv(&bitcoin::secp256k1::Secp256k1::new(), &xprv);
        let public_only = SigningKeyMaterial::PublicOnly { xpub };
        assert!(public_only.sign_digest(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_external_material_holds_key_but_cannot_sign() {
        let local = SigningKeyMaterial::from_secp256k1_bytes(&TEST_SECRET).unwrap();
        let external = SigningKeyMaterial::external(
            "hsm-slot-3",
            local.public_key().unwrap(),
            SignatureAlgorithm::Secp256k1,
        )
        .unwrap();
        assert!(!external.can_sign());
        assert_eq!(external.public_key().unwrap(), local.public_key().unwrap());
        assert!(external.sign_digest(&[0u8; 32]).is_err());

        // Garbage public keys are rejected at construction
        assert!(SigningKeyMaterial::external(
            "hsm-slot-4",
            vec![0u8; 33],
            SignatureAlgorithm::Secp256k1
        )
        .is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let material = SigningKeyMaterial::from_secp256k1_bytes(&TEST_SECRET).unwrap();
        let rendered = format!("{:?}", material);
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("11111111"));
    }
}
