pub mod delegation;
pub mod root;
pub mod snapshot;
pub mod targets;
pub mod timestamp;

use der::asn1::UtcTime;
use der::{Decode, Encode};
use tuf_trust_common::{RoleType, TufError, Version};
use tuf_trust_der::root::Root;
use tuf_trust_der::snapshot::Snapshot;
use tuf_trust_der::targets::Targets;
use tuf_trust_der::timestamp::Timestamp;
use tuf_trust_der::{Hash, Signed};

use crate::canonical::EncodeCanonically;
use crate::clock::ReferenceClock;
use crate::config::UpdaterConfig;

mod private {
    pub trait Sealed {}
    impl Sealed for tuf_trust_der::root::Root {}
    impl Sealed for tuf_trust_der::timestamp::Timestamp {}
    impl Sealed for tuf_trust_der::snapshot::Snapshot {}
    impl Sealed for tuf_trust_der::targets::Targets {}
}

/// Trait for easy access to a constant that specifies the role.
pub trait TufRole {
    const TYPE: RoleType;
}

/// Trait to extract information that is required to update a TUF role.
///
/// Only implemented by the four metadata types.
pub trait RoleUpdate: TufRole + EncodeCanonically + private::Sealed {
    fn version(&self) -> Version;
    fn expires(&self) -> UtcTime;
}

macro_rules! impl_role_update {
    ($($ty:ty => $role:expr),*) => {
        $(
            impl TufRole for $ty {
                const TYPE: RoleType = $role;
            }

            impl RoleUpdate for $ty {
                fn version(&self) -> Version {
                    self.version
                }

                fn expires(&self) -> UtcTime {
                    self.expires
                }
            }
        )*
    };
}

impl_role_update!(
    Root => RoleType::Root,
    Timestamp => RoleType::Timestamp,
    Snapshot => RoleType::Snapshot,
    Targets => RoleType::Targets
);

/// Decodes a signed metadata file of `role`.
pub fn decode_role<T>(role: &str, data: &[u8]) -> Result<Signed<T>, TufError>
where
    T: RoleUpdate + for<'a> Decode<'a> + Encode,
{
    Signed::<T>::from_der(data).map_err(|err| TufError::malformed(role, err))
}

/// Fails if the metadata is expired at the time the clock reports. Expired means `now >= expires`.
pub fn check_expiry<T: RoleUpdate>(
    role: &str,
    metadata: &T,
    clock: &impl ReferenceClock,
) -> Result<(), TufError> {
    let now = clock.now()?;
    let expires = metadata.expires();
    if now >= expires {
        return Err(TufError::ExpiredMetadata {
            role: role.into(),
            expires: expires.to_date_time(),
            now: now.to_date_time(),
        });
    }
    Ok(())
}

pub(crate) fn check_length(name: &str, expected: u64, data: &[u8]) -> Result<(), TufError> {
    let actual = data.len() as u64;
    if actual != expected {
        return Err(TufError::LengthMismatch {
            name: name.into(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Every hash with a supported algorithm has to match. Unsupported ones are ignored,
/// but at least one has to be supported if any are declared.
pub(crate) fn check_hashes(name: &str, hashes: &[Hash], data: &[u8]) -> Result<(), TufError> {
    if hashes.is_empty() {
        return Ok(());
    }
    let mut supported = 0;
    for hash in hashes {
        let Some(algorithm) = hash.algorithm() else {
            continue;
        };
        supported += 1;
        let matches = hash
            .value()
            .is_some_and(|expected| algorithm.verify(expected, data));
        if !matches {
            return Err(TufError::HashMismatch { name: name.into() });
        }
    }
    if supported == 0 {
        return Err(TufError::NoSupportedHash { name: name.into() });
    }
    Ok(())
}

/// Checks `data` against the length and hashes a referencing metadata file declared.
pub(crate) fn check_meta_file(
    name: &str,
    data: &[u8],
    length: Option<u64>,
    hashes: &[Hash],
) -> Result<(), TufError> {
    if let Some(length) = length {
        check_length(name, length, data)?;
    }
    check_hashes(name, hashes, data)
}

/// Metadata and targets are addressed by version and hash.
pub(crate) fn consistent_snapshot(config: &UpdaterConfig, root: &Signed<Root>) -> bool {
    config.consistent_snapshot && root.signed.consistent_snapshot
}
