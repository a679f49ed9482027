use der::asn1::{BitString, UtcTime};
use der::{
    Decode, DecodeValue, Encode, EncodeValue, FixedTag, Header, Length as DerLength, Reader,
    Sequence, Tag, Writer,
};
use spki::{AlgorithmIdentifier, AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use tuf_trust_common::constants::METADATA_EXTENSION;
use tuf_trust_common::crypto::{HashAlgorithm, KeyIdBytes};
use tuf_trust_common::{Threshold, TufError};

pub mod root;
pub mod snapshot;
pub mod targets;
pub mod timestamp;

#[cfg(feature = "sign")]
use tuf_trust_common::crypto::sign::SigningKey;

pub type KeyId = BitString;
pub type RawSignature = BitString;
pub type SpecVersion = String;
pub type DateTime = UtcTime;
/// Not using usize because the traits are not implemented for it
pub type Length = u64;

/// Version of the TUF specification the metadata follows.
pub const SPEC_VERSION: &str = "1.0.31";

/// Name of the metadata file of `role`, e.g. `snapshot.der`.
pub fn metapath(role: &str) -> String {
    format!("{role}.{METADATA_EXTENSION}")
}

/// Converts an encoded key ID to its raw bytes, `None` if it is not a SHA-256 fingerprint.
pub fn key_id_bytes(keyid: &KeyId) -> Option<KeyIdBytes> {
    keyid.as_bytes().and_then(|b| TryFrom::try_from(b).ok())
}

pub fn key_id_from_bytes(bytes: &KeyIdBytes) -> Result<KeyId, TufError> {
    BitString::from_bytes(bytes).map_err(|_| TufError::Encoding("key ID".into()))
}

/// Looks up the key with the given ID in `keys`.
pub fn find_key<'k>(
    keys: &'k [SubjectPublicKeyInfoOwned],
    keyid: &KeyIdBytes,
) -> Option<&'k SubjectPublicKeyInfoOwned> {
    keys.iter()
        .find(|key| key.fingerprint_bytes().is_ok_and(|fp| &fp == keyid))
}

/// DER encoded signature.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Signature {
    /// SHA256 digest of the canonical form of the key.
    pub keyid: KeyId,
    /// Canonical encoding of the signature.
    pub sig: RawSignature,
}

impl Signature {
    pub fn keyid_bytes(&self) -> Option<KeyIdBytes> {
        key_id_bytes(&self.keyid)
    }

    pub fn sig_bytes(&self) -> Option<&[u8]> {
        self.sig.as_bytes()
    }
}

/// DER encoding of a TUF role.
#[derive(Debug, Eq, PartialEq, Sequence, Clone)]
pub struct Role {
    /// The name of the role, e.g. "root".
    pub name: String,
    /// A collection of [KeyId]s that specify which keys are associated with this role.
    pub keyids: Vec<KeyId>,
    /// The signature threshold that needs to be reached for validity.
    pub threshold: Threshold,
}

/// DER encoding of a Hash
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Hash {
    pub algorithm: AlgorithmIdentifierOwned,
    pub value: BitString,
}

impl Hash {
    pub fn new(algorithm: HashAlgorithm, digest: &[u8]) -> Result<Self, TufError> {
        Ok(Hash {
            algorithm: AlgorithmIdentifier {
                oid: algorithm.oid(),
                parameters: None,
            },
            value: BitString::from_bytes(digest).map_err(|_| TufError::Encoding("hash".into()))?,
        })
    }

    /// Hashes `data` with `algorithm`.
    pub fn from_data(algorithm: HashAlgorithm, data: impl AsRef<[u8]>) -> Result<Self, TufError> {
        Hash::new(algorithm, &algorithm.digest(data))
    }

    pub fn from_sha256_bytes(bytes: &[u8; 32]) -> Result<Self, TufError> {
        Hash::new(HashAlgorithm::Sha256, bytes)
    }

    /// Returns `None` if the algorithm is not supported.
    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        HashAlgorithm::from_oid(&self.algorithm.oid)
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_bytes()
    }

    /// Returns `Some` if this is a SHA-256 hash.
    pub fn sha256(&self) -> Option<&[u8; 32]> {
        if self.algorithm() != Some(HashAlgorithm::Sha256) {
            return None;
        }
        self.value().and_then(|b| TryFrom::try_from(b).ok())
    }
}

/// A signed TUF file.
///
/// ```der
/// Signed ::= SEQUENCE {
///     signatures  SEQUENCE OF Signature,
///     signed      T
/// }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Signed<T> {
    pub signatures: Vec<Signature>,
    pub signed: T,
}

impl<'a, T> DecodeValue<'a> for Signed<T>
where
    T: Decode<'a>,
{
    fn decode_value<R: Reader<'a>>(reader: &mut R, header: Header) -> der::Result<Self> {
        reader.read_nested(header.length, |reader| {
            Ok(Signed {
                signatures: reader.decode()?,
                signed: reader.decode()?,
            })
        })
    }
}

impl<T> EncodeValue for Signed<T>
where
    T: Encode,
{
    fn value_len(&self) -> der::Result<DerLength> {
        self.signatures.encoded_len()? + self.signed.encoded_len()?
    }

    fn encode_value(&self, writer: &mut impl Writer) -> der::Result<()> {
        self.signatures.encode(writer)?;
        self.signed.encode(writer)
    }
}

impl<T> FixedTag for Signed<T> {
    const TAG: Tag = Tag::Sequence;
}

impl<T> Signed<T>
where
    T: Encode,
{
    /// Creates a signed object using the given signing keys from the data in `signed`.
    #[cfg(feature = "sign")]
    pub fn from_signed(signed: T, signing_keys: &[SigningKey]) -> Result<Signed<T>, TufError> {
        let encoded = signed
            .to_der()
            .map_err(|_| TufError::Encoding("signed metadata".into()))?;
        let signatures = signing_keys
            .iter()
            .map(|key| {
                let sig = key.sign(&encoded)?;
                Ok(Signature {
                    keyid: key_id_from_bytes(&key.key_id()?)?,
                    sig: BitString::from_bytes(&sig.to_vec())
                        .map_err(|_| TufError::Encoding("signature".into()))?,
                })
            })
            .collect::<Result<Vec<_>, TufError>>()?;
        Ok(Signed { signatures, signed })
    }

    /// The bytes the signatures are calculated over.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, TufError> {
        self.signed
            .to_der()
            .map_err(|_| TufError::Encoding("signed metadata".into()))
    }

    pub fn encode_as_file(&self) -> Result<Vec<u8>, TufError> {
        self.to_der()
            .map_err(|_| TufError::Encoding("metadata file".into()))
    }
}
