use tracing::debug;
use tuf_trust_common::remote::TufTransport;
use tuf_trust_common::storage::TufStorage;
use tuf_trust_common::{RoleType, TufError};
use tuf_trust_der::root::Root;
use tuf_trust_der::snapshot::Snapshot;
use tuf_trust_der::timestamp::Timestamp;
use tuf_trust_der::{metapath, Signed};

use crate::clock::ReferenceClock;
use crate::config::UpdaterConfig;
use crate::role::{check_expiry, check_meta_file, consistent_snapshot, decode_role};
use crate::signature::{RoleKeys, SignatureVerifier};
use crate::trust_store::{Staged, TrustStore};

/// Verifies a snapshot against the timestamp that references it and the trusted snapshot.
pub fn verify_snapshot<C: ReferenceClock>(
    verifier: &SignatureVerifier,
    root: &Signed<Root>,
    timestamp: &Signed<Timestamp>,
    trusted: Option<&Signed<Snapshot>>,
    data: &[u8],
    clock: &C,
) -> Result<Signed<Snapshot>, TufError> {
    let role = RoleType::Snapshot.as_str();
    let meta = &timestamp.signed.meta;
    check_meta_file(&meta.metapath, data, meta.length, &meta.hashes)?;
    let new = decode_role::<Snapshot>(role, data)?;
    verifier.verify_signed(&RoleKeys::from_root(&root.signed, RoleType::Snapshot)?, &new)?;

    if new.signed.version != meta.version {
        return Err(TufError::BadVersionNumber {
            role: role.into(),
            expected: meta.version,
            actual: new.signed.version,
        });
    }
    // check for a rollback attack (5.5.5)
    if let Some(trusted) = trusted {
        if new.signed.version < trusted.signed.version {
            return Err(TufError::RollbackAttack {
                role: role.into(),
                trusted: trusted.signed.version,
                new: new.signed.version,
            });
        }
        for old in &trusted.signed.meta {
            let Some(current) = new.signed.meta.iter().find(|m| m.metapath == old.metapath) else {
                return Err(TufError::MissingMetadata {
                    name: old.metapath.clone(),
                });
            };
            if current.version < old.version {
                return Err(TufError::RollbackAttack {
                    role: old.role_name().unwrap_or(&old.metapath).into(),
                    trusted: old.version,
                    new: current.version,
                });
            }
        }
    }
    // check for a freeze attack (5.5.6)
    check_expiry(role, &new.signed, clock)?;
    if new.signed.meta_for(RoleType::Targets.as_str()).is_none() {
        return Err(TufError::MissingMetadata {
            name: metapath(RoleType::Targets.as_str()),
        });
    }
    Ok(new)
}

/// Refer to the [TUF specification section on updating the snapshot role](https://theupdateframework.github.io/specification/latest/#update-snapshot) for more information
///
/// The trusted snapshot is kept without a download if it still matches `timestamp`.
pub fn update_snapshot<T, S, C>(
    transport: &T,
    store: &TrustStore<S>,
    timestamp: &Signed<Timestamp>,
    verifier: &SignatureVerifier,
    config: &UpdaterConfig,
    clock: &C,
) -> Result<Staged<Snapshot>, TufError>
where
    T: TufTransport,
    S: TufStorage,
    C: ReferenceClock,
{
    let role = RoleType::Snapshot.as_str();
    let meta = &timestamp.signed.meta;
    if let Some(trusted) = store.snapshot() {
        if trusted.signed.version == meta.version {
            let reverified = trusted.encode_as_file().and_then(|data| {
                verify_snapshot(verifier, store.root(), timestamp, Some(trusted), &data, clock)
            });
            match reverified {
                Ok(_) => {
                    debug!(version = meta.version, "trusted snapshot is current");
                    return Ok(Staged::Unchanged);
                }
                Err(err) => debug!("trusted snapshot cannot be kept: {err}"),
            }
        }
    }

    let version = consistent_snapshot(config, store.root()).then_some(meta.version);
    let data = transport
        .fetch_metadata(role, version, meta.length.unwrap_or(config.snapshot_max_length))
        .map_err(|err| TufError::from_transport(metapath(role), err))?;
    let signed = verify_snapshot(
        verifier,
        store.root(),
        timestamp,
        store.snapshot(),
        &data,
        clock,
    )?;
    Ok(Staged::New {
        signed,
        bytes: data,
    })
}
