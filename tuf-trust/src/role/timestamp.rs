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
use crate::role::{check_expiry, decode_role};
use crate::signature::{RoleKeys, SignatureVerifier};
use crate::trust_store::{Staged, TrustStore};

/// Verifies a new timestamp against the trusted metadata.
///
/// A timestamp with the same version as the trusted one leaves the trusted one in place.
pub fn verify_timestamp<C: ReferenceClock>(
    verifier: &SignatureVerifier,
    root: &Signed<Root>,
    trusted: Option<&Signed<Timestamp>>,
    trusted_snapshot: Option<&Signed<Snapshot>>,
    data: &[u8],
    clock: &C,
) -> Result<Staged<Timestamp>, TufError> {
    let role = RoleType::Timestamp.as_str();
    let new = decode_role::<Timestamp>(role, data)?;
    verifier.verify_signed(&RoleKeys::from_root(&root.signed, RoleType::Timestamp)?, &new)?;

    // check for a rollback attack (5.4.3)
    if let Some(trusted) = trusted {
        if new.signed.version < trusted.signed.version {
            return Err(TufError::RollbackAttack {
                role: role.into(),
                trusted: trusted.signed.version,
                new: new.signed.version,
            });
        }
        if new.signed.version == trusted.signed.version {
            check_expiry(role, &trusted.signed, clock)?;
            debug!(version = trusted.signed.version, "timestamp is unchanged");
            return Ok(Staged::Unchanged);
        }
        if new.signed.meta.version < trusted.signed.meta.version {
            return Err(TufError::RollbackAttack {
                role: RoleType::Snapshot.as_str().into(),
                trusted: trusted.signed.meta.version,
                new: new.signed.meta.version,
            });
        }
    }
    if new.signed.meta.metapath != metapath(RoleType::Snapshot.as_str()) {
        return Err(TufError::malformed(
            role,
            format!("references {} instead of the snapshot", new.signed.meta.metapath),
        ));
    }
    if let Some(snapshot) = trusted_snapshot {
        if new.signed.meta.version < snapshot.signed.version {
            return Err(TufError::RollbackAttack {
                role: RoleType::Snapshot.as_str().into(),
                trusted: snapshot.signed.version,
                new: new.signed.meta.version,
            });
        }
    }
    // check for a freeze attack (5.4.4)
    check_expiry(role, &new.signed, clock)?;
    Ok(Staged::New {
        signed: new,
        bytes: data.to_vec(),
    })
}

/// Refer to the [TUF specification section on updating the timestamp role](https://theupdateframework.github.io/specification/latest/#update-timestamp) for more information
pub fn update_timestamp<T, S, C>(
    transport: &T,
    store: &TrustStore<S>,
    verifier: &SignatureVerifier,
    config: &UpdaterConfig,
    clock: &C,
) -> Result<Staged<Timestamp>, TufError>
where
    T: TufTransport,
    S: TufStorage,
    C: ReferenceClock,
{
    let role = RoleType::Timestamp.as_str();
    let data = transport
        .fetch_metadata(role, None, config.timestamp_max_length)
        .map_err(|err| TufError::from_transport(metapath(role), err))?;
    verify_timestamp(
        verifier,
        store.root(),
        store.timestamp(),
        store.snapshot(),
        &data,
        clock,
    )
}
