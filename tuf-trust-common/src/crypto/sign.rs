use der::Decode;
use signature::Signer;
use spki::{EncodePublicKey, SubjectPublicKeyInfoOwned};

use crate::crypto::KeyIdBytes;
use crate::TufError;

/// Private keys that can create metadata signatures.
#[derive(Debug, Clone)]
pub enum SigningKey {
    #[cfg(feature = "ed25519")]
    Ed25519Dalek(ed25519_dalek::SigningKey),
    #[cfg(feature = "ecdsa")]
    Ecdsa(p256::ecdsa::SigningKey),
}

#[derive(Debug, Clone, Copy)]
pub enum Cipher {
    #[cfg(feature = "ed25519")]
    Ed25519Dalek,
    #[cfg(feature = "ecdsa")]
    Ecdsa,
}

#[derive(Debug)]
pub enum RawSignature {
    #[cfg(feature = "ed25519")]
    Ed25519Dalek(ed25519_dalek::Signature),
    #[cfg(feature = "ecdsa")]
    Ecdsa(p256::ecdsa::Signature),
}

impl RawSignature {
    pub fn to_vec(&self) -> Vec<u8> {
        match self {
            #[cfg(feature = "ed25519")]
            RawSignature::Ed25519Dalek(sig) => sig.to_vec(),
            #[cfg(feature = "ecdsa")]
            RawSignature::Ecdsa(sig) => sig.to_bytes().to_vec(),
        }
    }
}

#[cfg(feature = "sign")]
impl SigningKey {
    #[cfg(feature = "rand")]
    pub fn new(cipher: Cipher) -> Self {
        match cipher {
            #[cfg(feature = "ed25519")]
            Cipher::Ed25519Dalek => {
                Self::Ed25519Dalek(ed25519_dalek::SigningKey::generate(&mut rand_core::OsRng))
            }
            #[cfg(feature = "ecdsa")]
            Cipher::Ecdsa => Self::Ecdsa(p256::ecdsa::SigningKey::random(&mut rand_core::OsRng)),
        }
    }

    pub fn sign(&self, msg: &[u8]) -> Result<RawSignature, TufError> {
        match self {
            #[cfg(feature = "ed25519")]
            SigningKey::Ed25519Dalek(key) => key
                .try_sign(msg)
                .map(RawSignature::Ed25519Dalek)
                .map_err(|_| TufError::InternalError("signing failed".into())),
            #[cfg(feature = "ecdsa")]
            SigningKey::Ecdsa(key) => key
                .try_sign(msg)
                .map(RawSignature::Ecdsa)
                .map_err(|_| TufError::InternalError("signing failed".into())),
        }
    }

    /// Key ID of the public key that belongs to this signing key.
    pub fn key_id(&self) -> Result<KeyIdBytes, TufError> {
        self.as_spki().and_then(|spki| crate::crypto::key_id(&spki))
    }

    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned, TufError> {
        let pubkey_der = match self {
            #[cfg(feature = "ed25519")]
            SigningKey::Ed25519Dalek(key) => key.verifying_key().to_public_key_der(),
            #[cfg(feature = "ecdsa")]
            SigningKey::Ecdsa(key) => key.verifying_key().to_public_key_der(),
        }
        .map_err(|_| TufError::Encoding("public key".into()))?;
        SubjectPublicKeyInfoOwned::from_der(pubkey_der.as_bytes())
            .map_err(|_| TufError::DecodingPublicKeyFailed)
    }
}
