pub mod sign;

use std::collections::HashMap;
use std::fmt;

use const_oid::ObjectIdentifier;
use sha2::{Digest, Sha256, Sha512};
use spki::{SubjectPublicKeyInfoOwned, SubjectPublicKeyInfoRef};

use crate::TufError;

/// SHA-256 fingerprint of the DER encoded SPKI of a key.
pub type KeyIdBytes = [u8; 32];

/// Calculates the key ID of a public key, the SHA-256 digest of its DER encoded SPKI.
pub fn key_id(spki: &SubjectPublicKeyInfoOwned) -> Result<KeyIdBytes, TufError> {
    spki.fingerprint_bytes()
        .map_err(|_| TufError::Encoding("public key".into()))
}

/// Hash algorithms that can be used to pin metadata and target files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        match *oid {
            const_oid::db::rfc5912::ID_SHA_256 => Some(HashAlgorithm::Sha256),
            const_oid::db::rfc5912::ID_SHA_512 => Some(HashAlgorithm::Sha512),
            _ => None,
        }
    }

    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            HashAlgorithm::Sha256 => const_oid::db::rfc5912::ID_SHA_256,
            HashAlgorithm::Sha512 => const_oid::db::rfc5912::ID_SHA_512,
        }
    }

    pub fn digest(&self, data: impl AsRef<[u8]>) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    /// Returns `true` if `expected` is the digest of `data`.
    pub fn verify(&self, expected: &[u8], data: impl AsRef<[u8]>) -> bool {
        self.digest(data).as_slice() == expected
    }
}

/// Lowercase hex encoding of the SHA-256 digest of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data))
}

/// A signature scheme that verifies signatures for one kind of public key.
pub trait SignatureScheme: Send + Sync {
    /// Verifies `sig` over `msg` with `key`.
    fn verify(&self, key: SubjectPublicKeyInfoRef<'_>, msg: &[u8], sig: &[u8])
        -> Result<(), TufError>;
}

#[cfg(feature = "ed25519")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Scheme;

#[cfg(feature = "ed25519")]
impl SignatureScheme for Ed25519Scheme {
    fn verify(
        &self,
        key: SubjectPublicKeyInfoRef<'_>,
        msg: &[u8],
        sig: &[u8],
    ) -> Result<(), TufError> {
        use signature::Verifier;
        let key = ed25519_dalek::VerifyingKey::try_from(key)
            .map_err(|_| TufError::DecodingPublicKeyFailed)?;
        let sig =
            ed25519::Signature::from_slice(sig).map_err(|_| TufError::DecodingSignatureFailed)?;
        key.verify(msg, &sig).map_err(|_| TufError::InvalidSignature)
    }
}

/// ECDSA over P-256 with SHA-256, signatures are the fixed size `r || s` encoding.
#[cfg(feature = "ecdsa")]
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaP256Scheme;

#[cfg(feature = "ecdsa")]
impl SignatureScheme for EcdsaP256Scheme {
    fn verify(
        &self,
        key: SubjectPublicKeyInfoRef<'_>,
        msg: &[u8],
        sig: &[u8],
    ) -> Result<(), TufError> {
        use signature::Verifier;
        let key = p256::ecdsa::VerifyingKey::try_from(key)
            .map_err(|_| TufError::DecodingPublicKeyFailed)?;
        let sig = p256::ecdsa::Signature::from_slice(sig)
            .map_err(|_| TufError::DecodingSignatureFailed)?;
        key.verify(msg, &sig).map_err(|_| TufError::InvalidSignature)
    }
}

/// RSASSA-PSS with SHA-256.
#[cfg(feature = "rsa")]
#[derive(Debug, Default, Clone, Copy)]
pub struct RsaPssScheme;

#[cfg(feature = "rsa")]
impl SignatureScheme for RsaPssScheme {
    fn verify(
        &self,
        key: SubjectPublicKeyInfoRef<'_>,
        msg: &[u8],
        sig: &[u8],
    ) -> Result<(), TufError> {
        use signature::Verifier;
        let sig = rsa::pss::Signature::try_from(sig)
            .map_err(|_| TufError::DecodingSignatureFailed)?;
        let key = rsa::RsaPublicKey::try_from(key)
            .map(rsa::pss::VerifyingKey::<Sha256>::new)
            .map_err(|_| TufError::DecodingPublicKeyFailed)?;
        key.verify(msg, &sig).map_err(|_| TufError::InvalidSignature)
    }
}

/// Maps the algorithm OID of a public key to the scheme that verifies its signatures.
///
/// The default registry knows every scheme that was enabled at compile time.
pub struct SchemeRegistry {
    schemes: HashMap<ObjectIdentifier, Box<dyn SignatureScheme>>,
}

impl SchemeRegistry {
    /// A registry without any scheme, every verification fails.
    pub fn empty() -> Self {
        SchemeRegistry {
            schemes: HashMap::new(),
        }
    }

    /// Registers `scheme` for keys with the algorithm `oid`, replacing a previous one.
    pub fn register(&mut self, oid: ObjectIdentifier, scheme: impl SignatureScheme + 'static) {
        self.schemes.insert(oid, Box::new(scheme));
    }

    pub fn with_scheme(
        mut self,
        oid: ObjectIdentifier,
        scheme: impl SignatureScheme + 'static,
    ) -> Self {
        self.register(oid, scheme);
        self
    }

    pub fn supports(&self, oid: &ObjectIdentifier) -> bool {
        self.schemes.contains_key(oid)
    }

    /// Verifies `sig` over `msg` with the scheme registered for the algorithm of `key`.
    pub fn verify(
        &self,
        key: SubjectPublicKeyInfoRef<'_>,
        msg: &[u8],
        sig: &[u8],
    ) -> Result<(), TufError> {
        let scheme =
            self.schemes
                .get(&key.algorithm.oid)
                .ok_or_else(|| TufError::UnsupportedKeyType {
                    oid: key.algorithm.oid.to_string(),
                })?;
        scheme.verify(key, msg, sig)
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        #[allow(unused_mut)]
        let mut registry = SchemeRegistry::empty();
        #[cfg(feature = "ed25519")]
        registry.register(const_oid::db::rfc8410::ID_ED_25519, Ed25519Scheme);
        #[cfg(feature = "ecdsa")]
        registry.register(const_oid::db::rfc5912::ID_EC_PUBLIC_KEY, EcdsaP256Scheme);
        #[cfg(feature = "rsa")]
        registry.register(const_oid::db::rfc5912::ID_RSASSA_PSS, RsaPssScheme);
        registry
    }
}

impl fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.schemes.keys()).finish()
    }
}
