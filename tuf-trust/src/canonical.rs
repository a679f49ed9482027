use der::Encode;
use tuf_trust_common::TufError;
use tuf_trust_der::root::Root;
use tuf_trust_der::snapshot::Snapshot;
use tuf_trust_der::targets::Targets;
use tuf_trust_der::timestamp::Timestamp;

/// Trait used to abstract files being encoded canonically.
pub trait EncodeCanonically {
    /// Encodes the file canonically.
    /// It is important to note that this **does never** encode the
    /// `signatures` field, as it is not used as part of the canonical encoding.
    fn encode_canonically(&self) -> Result<Vec<u8>, TufError>;
}

macro_rules! impl_encode_canonically {
    ($($ty:ty),*) => {
        $(
            impl EncodeCanonically for $ty {
                fn encode_canonically(&self) -> Result<Vec<u8>, TufError> {
                    self.to_der()
                        .map_err(|_| TufError::Encoding(stringify!($ty).into()))
                }
            }
        )*
    };
}

impl_encode_canonically!(Root, Timestamp, Snapshot, Targets);
