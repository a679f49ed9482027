use tracing::debug;
use tuf_trust_common::crypto::HashAlgorithm;
use tuf_trust_common::remote::TufTransport;
use tuf_trust_common::storage::TufStorage;
use tuf_trust_common::{RoleType, TufError};
use tuf_trust_der::snapshot::Snapshot;
use tuf_trust_der::targets::{TargetValue, Targets};
use tuf_trust_der::{metapath, Signed};

use crate::clock::ReferenceClock;
use crate::config::UpdaterConfig;
use crate::role::{
    check_expiry, check_hashes, check_length, check_meta_file, consistent_snapshot, decode_role,
};
use crate::signature::{RoleKeys, SignatureVerifier};
use crate::trust_store::{Staged, TrustStore};

/// Verifies the metadata of a targets role, top-level or delegated, against the snapshot.
pub fn verify_targets<C: ReferenceClock>(
    verifier: &SignatureVerifier,
    keys: &RoleKeys<'_>,
    snapshot: &Signed<Snapshot>,
    data: &[u8],
    clock: &C,
) -> Result<Signed<Targets>, TufError> {
    let role = keys.role.as_str();
    let meta = snapshot
        .signed
        .meta_for(role)
        .ok_or_else(|| TufError::MissingMetadata {
            name: metapath(role),
        })?;
    check_meta_file(&meta.metapath, data, meta.length, &meta.hashes)?;
    let new = decode_role::<Targets>(role, data)?;
    verifier.verify_signed(keys, &new)?;
    if new.signed.version != meta.version {
        return Err(TufError::BadVersionNumber {
            role: role.into(),
            expected: meta.version,
            actual: new.signed.version,
        });
    }
    // check for a freeze attack (5.6.5)
    check_expiry(role, &new.signed, clock)?;
    Ok(new)
}

/// Fetches the metadata of a targets role at the version the snapshot pins.
pub(crate) fn fetch_targets_metadata<T: TufTransport>(
    transport: &T,
    role: &str,
    snapshot: &Signed<Snapshot>,
    consistent: bool,
    config: &UpdaterConfig,
) -> Result<Vec<u8>, TufError> {
    let meta = snapshot
        .signed
        .meta_for(role)
        .ok_or_else(|| TufError::MissingMetadata {
            name: metapath(role),
        })?;
    let version = consistent.then_some(meta.version);
    transport
        .fetch_metadata(role, version, meta.length.unwrap_or(config.targets_max_length))
        .map_err(|err| TufError::from_transport(metapath(role), err))
}

/// Refer to the [TUF specification section on updating the targets role](https://theupdateframework.github.io/specification/latest/#update-targets) for more information
///
/// The trusted targets metadata is kept without a download if it still matches `snapshot`.
pub fn update_targets<T, S, C>(
    transport: &T,
    store: &TrustStore<S>,
    snapshot: &Signed<Snapshot>,
    verifier: &SignatureVerifier,
    config: &UpdaterConfig,
    clock: &C,
) -> Result<Staged<Targets>, TufError>
where
    T: TufTransport,
    S: TufStorage,
    C: ReferenceClock,
{
    let keys = RoleKeys::from_root(&store.root().signed, RoleType::Targets)?;
    if let Some(trusted) = store.targets() {
        let reverified = trusted
            .encode_as_file()
            .and_then(|data| verify_targets(verifier, &keys, snapshot, &data, clock));
        match reverified {
            Ok(_) => {
                debug!(version = trusted.signed.version, "trusted targets are current");
                return Ok(Staged::Unchanged);
            }
            Err(err) => debug!("trusted targets cannot be kept: {err}"),
        }
    }

    let consistent = consistent_snapshot(config, store.root());
    let data = fetch_targets_metadata(
        transport,
        RoleType::Targets.as_str(),
        snapshot,
        consistent,
        config,
    )?;
    let signed = verify_targets(verifier, &keys, snapshot, &data, clock)?;
    Ok(Staged::New {
        signed,
        bytes: data,
    })
}

/// Path under which a target is requested from the remote.
///
/// With consistent snapshots the file name is prefixed with the hex digest of the target,
/// SHA-256 is used if available.
pub fn target_remote_path(
    path: &str,
    target: &TargetValue,
    consistent: bool,
) -> Result<String, TufError> {
    if !consistent {
        return Ok(path.into());
    }
    let digest = target
        .hashes
        .iter()
        .find(|hash| hash.algorithm() == Some(HashAlgorithm::Sha256))
        .or_else(|| target.hashes.iter().find(|hash| hash.algorithm().is_some()))
        .and_then(|hash| hash.value())
        .ok_or_else(|| TufError::NoSupportedHash { name: path.into() })?;
    let digest = hex::encode(digest);
    Ok(match path.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/{digest}.{name}"),
        None => format!("{digest}.{path}"),
    })
}

/// Verifies the contents of a target file against its description.
///
/// The length has to be equal and every hash of a supported algorithm has to match.
pub fn verify_target_file(path: &str, target: &TargetValue, data: &[u8]) -> Result<(), TufError> {
    check_length(path, target.length, data)?;
    if target.hashes.is_empty() {
        return Err(TufError::NoSupportedHash { name: path.into() });
    }
    check_hashes(path, &target.hashes, data)
}
