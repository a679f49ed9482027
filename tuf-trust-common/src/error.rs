use der::DateTime;
use thiserror::Error;

use crate::remote::TransportError;
use crate::Version;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TufError {
    // The expiration date is not after the reference time -> freeze attack
    #[error("{role} metadata expired at {expires}, reference time is {now}")]
    ExpiredMetadata {
        role: String,
        expires: DateTime,
        now: DateTime,
    },
    // version or cross-reference moved backwards -> rollback attack
    #[error("rollback of {role}: trusted version {trusted}, new version {new}")]
    RollbackAttack {
        role: String,
        trusted: Version,
        new: Version,
    },
    // version differs from the one pinned by the referencing metadata
    #[error("unexpected version of {role}: expected {expected}, got {actual}")]
    BadVersionNumber {
        role: String,
        expected: Version,
        actual: Version,
    },
    // fewer distinct valid signatures than the role's threshold -> arbitrary software attack possible
    #[error("{role} is signed by {valid} valid keys, threshold is {threshold}")]
    ThresholdNotMet {
        role: String,
        threshold: u32,
        valid: u32,
    },
    #[error("signature verification failed")]
    InvalidSignature,
    #[error("failed to decode signature")]
    DecodingSignatureFailed,
    #[error("failed to decode public key")]
    DecodingPublicKeyFailed,
    #[error("no signature scheme registered for key algorithm {oid}")]
    UnsupportedKeyType { oid: String },
    #[error("malformed {role} metadata: {reason}")]
    MalformedMetadata { role: String, reason: String },
    #[error("length of {name} is {actual}, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
    #[error("hash of {name} does not match")]
    HashMismatch { name: String },
    #[error("none of the hashes of {name} uses a supported algorithm")]
    NoSupportedHash { name: String },
    #[error("root rotation stopped after {max} rotations, repository offers version {latest}")]
    RotationLimitExceeded { max: u32, latest: Version },
    #[error("delegation search for {path} stopped after visiting {max} roles")]
    DelegationLimitExceeded { path: String, max: u32 },
    #[error("failed to fetch {name}: {source}")]
    Fetch {
        name: String,
        source: TransportError,
    },
    #[error("{name} does not exist on the remote")]
    NotFound { name: String },
    // metadata that is required for the current step is not available
    #[error("missing metadata: {name}")]
    MissingMetadata { name: String },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("failed to encode {0}")]
    Encoding(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid UTC timestamp")]
    InvalidUtcTimestamp,
    #[error("internal error: {0}")]
    InternalError(String),
}

impl TufError {
    pub fn malformed(role: impl Into<String>, reason: impl ToString) -> Self {
        TufError::MalformedMetadata {
            role: role.into(),
            reason: reason.to_string(),
        }
    }

    /// Converts a transport failure while fetching `name` into the matching error.
    pub fn from_transport(name: impl Into<String>, source: TransportError) -> Self {
        match source {
            TransportError::NotFound => TufError::NotFound { name: name.into() },
            source => TufError::Fetch {
                name: name.into(),
                source,
            },
        }
    }
}
