use std::cmp::Ordering;

use tracing::{debug, info};
use tuf_trust_common::remote::{TransportError, TufTransport};
use tuf_trust_common::storage::TufStorage;
use tuf_trust_common::{RoleType, TufError, Version};
use tuf_trust_der::root::Root;
use tuf_trust_der::{metapath, Signed};

use crate::canonical::EncodeCanonically;
use crate::clock::ReferenceClock;
use crate::config::UpdaterConfig;
use crate::role::{check_expiry, decode_role};
use crate::signature::{RoleKeys, SignatureVerifier};
use crate::trust_store::TrustStore;

/// Verify that the new root is valid given the old root. Returns the new root if successful.
pub(crate) fn update_root_step(
    verifier: &SignatureVerifier,
    old_root: &Signed<Root>,
    new_root: &[u8],
) -> Result<Signed<Root>, TufError> {
    let next_root = decode_role::<Root>(RoleType::Root.as_str(), new_root)?;
    let msg = next_root.signed.encode_canonically()?;
    // signed by the keys the client trusts (5.3.4)
    verifier.verify(
        &RoleKeys::from_root(&old_root.signed, RoleType::Root)?,
        &msg,
        &next_root.signatures,
    )?;
    // and by the keys it declares itself
    verifier.verify(
        &RoleKeys::from_root(&next_root.signed, RoleType::Root)?,
        &msg,
        &next_root.signatures,
    )?;
    // check for a rollback attack (5.3.5)
    let expected = old_root
        .signed
        .version
        .checked_add(1)
        .ok_or_else(|| TufError::malformed(RoleType::Root.as_str(), "version overflow"))?;
    if next_root.signed.version != expected {
        return Err(TufError::BadVersionNumber {
            role: RoleType::Root.as_str().into(),
            expected,
            actual: next_root.signed.version,
        });
    }
    Ok(next_root)
}

/// Compares the most recent root the remote offers with the trusted one.
///
/// A newer one means the chain of versioned roots was cut short.
fn check_latest_root<T: TufTransport, S: TufStorage>(
    transport: &T,
    store: &TrustStore<S>,
    config: &UpdaterConfig,
    accepted: u32,
) -> Result<(), TufError> {
    let root = RoleType::Root.as_str();
    let data = transport
        .fetch_metadata(root, None, config.root_max_length)
        .map_err(|err| TufError::from_transport(metapath(root), err))?;
    let latest = decode_role::<Root>(root, &data)?;
    let trusted = store.root();
    let (latest_version, trusted_version) = (latest.signed.version, trusted.signed.version);
    match latest_version.cmp(&trusted_version) {
        Ordering::Greater if accepted >= config.max_root_rotations => {
            Err(TufError::RotationLimitExceeded {
                max: config.max_root_rotations,
                latest: latest_version,
            })
        }
        Ordering::Greater => Err(TufError::BadVersionNumber {
            role: root.into(),
            expected: trusted_version,
            actual: latest_version,
        }),
        Ordering::Less => Err(TufError::RollbackAttack {
            role: root.into(),
            trusted: trusted_version,
            new: latest_version,
        }),
        Ordering::Equal if latest.signed != trusted.signed => Err(TufError::malformed(
            root,
            format!("remote serves a different root with version {latest_version}"),
        )),
        Ordering::Equal => Ok(()),
    }
}

/// Refer to the [TUF specification section on updating the root role](https://theupdateframework.github.io/specification/latest/#update-root) for more information
///
/// Every accepted root is committed right away, so a failure later on keeps the progress.
/// Returns the version of the trusted root.
pub fn update_root<T, S, C>(
    transport: &T,
    store: &mut TrustStore<S>,
    verifier: &SignatureVerifier,
    config: &UpdaterConfig,
    clock: &C,
) -> Result<Version, TufError>
where
    T: TufTransport,
    S: TufStorage,
    C: ReferenceClock,
{
    let root = RoleType::Root.as_str();
    let initial_timestamp_keys = store.root().signed.role_keyids(RoleType::Timestamp);
    let initial_snapshot_keys = store.root().signed.role_keyids(RoleType::Snapshot);

    let mut accepted = 0;
    while accepted < config.max_root_rotations {
        let next_version = store
            .root()
            .signed
            .version
            .checked_add(1)
            .ok_or_else(|| TufError::malformed(root, "version overflow"))?;
        let data = match transport.fetch_metadata(root, Some(next_version), config.root_max_length)
        {
            Ok(data) => data,
            Err(TransportError::NotFound) => {
                debug!(version = next_version, "no newer root available");
                break;
            }
            Err(err) => {
                return Err(TufError::from_transport(
                    format!("{next_version}.{}", metapath(root)),
                    err,
                ))
            }
        };
        let next_root = update_root_step(verifier, store.root(), &data)?;
        store.commit_root(next_root, &data)?;
        info!(version = next_version, "accepted new root");
        accepted += 1;
        // rotated keys invalidate the trusted timestamp or snapshot
        for (role, initial) in [
            (RoleType::Timestamp, &initial_timestamp_keys),
            (RoleType::Snapshot, &initial_snapshot_keys),
        ] {
            if store.root().signed.role_keyids(role) != *initial && store.has_trusted(role) {
                store.discard(role)?;
            }
        }
    }

    check_latest_root(transport, store, config, accepted)?;
    // only the final root has to be valid (5.3.10)
    check_expiry(root, &store.root().signed, clock)?;
    Ok(store.root().signed.version)
}
