use std::time::Duration;

use der::asn1::UtcTime;
use der::{DateTime, Encode};
use spki::SubjectPublicKeyInfoOwned;
use tuf_trust_common::crypto::{key_id, HashAlgorithm};
use tuf_trust_common::{RoleType, Threshold, TufError, Version};
use tuf_trust_der::{
    key_id_from_bytes, metapath,
    root::Root,
    snapshot::{MetaFile, Snapshot},
    targets::{DelegatedRole, Delegations, Target, TargetValue, Targets},
    timestamp::Timestamp,
    Hash, KeyId, Role, Signed, SPEC_VERSION,
};

fn utc(
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minutes: u8,
    seconds: u8,
) -> Result<UtcTime, TufError> {
    DateTime::new(year, month, day, hour, minutes, seconds)
        .and_then(UtcTime::from_date_time)
        .map_err(|_| TufError::InvalidUtcTimestamp)
}

fn epoch() -> UtcTime {
    UtcTime::from_unix_duration(Duration::ZERO).expect("the epoch is a valid UTC time")
}

fn key_ids(keys: &[SubjectPublicKeyInfoOwned]) -> Result<Vec<KeyId>, TufError> {
    keys.iter()
        .map(|key| key_id(key).and_then(|id| key_id_from_bytes(&id)))
        .collect()
}

/// Reference to `data` that pins its version, length and SHA-256 hash.
pub(crate) fn meta_file(role: &str, data: &[u8], version: Version) -> Result<MetaFile, TufError> {
    Ok(MetaFile {
        metapath: metapath(role),
        version,
        length: Some(data.len() as u64),
        hashes: vec![Hash::from_data(HashAlgorithm::Sha256, data)?],
    })
}

/// Builders defer errors until `build` so they can be chained.
macro_rules! builder_common {
    ($builder:ident) => {
        impl $builder {
            /// Set the expiration date to this [UTC date](https://en.wikipedia.org/wiki/Coordinated_Universal_Time).
            pub fn with_expiration_utc(
                mut self,
                year: u16,
                month: u8,
                day: u8,
                hour: u8,
                minutes: u8,
                seconds: u8,
            ) -> Self {
                match utc(year, month, day, hour, minutes, seconds) {
                    Ok(expires) => self.inner.expires = expires,
                    Err(err) => {
                        self.error.get_or_insert(err);
                    }
                }
                self
            }

            pub fn with_expires(mut self, expires: UtcTime) -> Self {
                self.inner.expires = expires;
                self
            }

            /// Set the version of the file. Has to increase between iterations.
            pub fn with_version(mut self, version: Version) -> Self {
                self.inner.version = version;
                self
            }

            fn fail(mut self, err: TufError) -> Self {
                self.error.get_or_insert(err);
                self
            }
        }
    };
}

pub struct RootBuilder {
    inner: Root,
    error: Option<TufError>,
}

impl Default for RootBuilder {
    fn default() -> Self {
        RootBuilder {
            inner: Root {
                consistent_snapshot: false,
                expires: epoch(),
                keys: Default::default(),
                roles: Default::default(),
                spec_version: SPEC_VERSION.into(),
                version: 0,
            },
            error: None,
        }
    }
}

builder_common!(RootBuilder);

impl RootBuilder {
    /// Add add a role to the root file.
    pub fn with_role(mut self, role: Role) -> Self {
        self.inner.roles.push(role);
        self
    }

    /// Add a key to the root file. Keys that are already present are not added twice.
    pub fn with_key(mut self, key: SubjectPublicKeyInfoOwned) -> Self {
        if !self.inner.keys.contains(&key) {
            self.inner.keys.push(key);
        }
        self
    }

    /// Add a role that is signed by the given keys.
    pub fn with_role_and_key(
        self,
        role: &str,
        keys: &[SubjectPublicKeyInfoOwned],
        threshold: Threshold,
    ) -> Self {
        let keyids = match key_ids(keys) {
            Ok(keyids) => keyids,
            Err(err) => return self.fail(err),
        };
        let builder = self.with_role(Role {
            name: role.into(),
            keyids,
            threshold,
        });
        keys.iter()
            .fold(builder, |builder, key| builder.with_key(key.clone()))
    }

    /// Set the flag whether [consistent snapshots](https://theupdateframework.github.io/specification/latest/#consistent-snapshots) are enabled.
    pub fn consistent_snapshot(mut self, consistent_snapshots: bool) -> Self {
        self.inner.consistent_snapshot = consistent_snapshots;
        self
    }

    /// Return the constructed root file.
    pub fn build(self) -> Result<Root, TufError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.inner),
        }
    }
}

pub struct TimestampBuilder {
    inner: Timestamp,
    error: Option<TufError>,
}

impl Default for TimestampBuilder {
    fn default() -> Self {
        TimestampBuilder {
            inner: Timestamp {
                expires: epoch(),
                meta: MetaFile {
                    metapath: metapath(RoleType::Snapshot.as_str()),
                    version: 0,
                    length: None,
                    hashes: Default::default(),
                },
                spec_version: SPEC_VERSION.into(),
                version: 0,
            },
            error: None,
        }
    }
}

builder_common!(TimestampBuilder);

impl TimestampBuilder {
    /// Pin the snapshot file by version, length and hash.
    pub fn with_snapshot(mut self, snapshot: &Signed<Snapshot>) -> Self {
        let meta = snapshot
            .encode_as_file()
            .and_then(|data| meta_file(RoleType::Snapshot.as_str(), &data, snapshot.signed.version));
        match meta {
            Ok(meta) => self.inner.meta = meta,
            Err(err) => return self.fail(err),
        }
        self
    }

    /// Replace the snapshot reference, e.g. to pin only the version.
    pub fn with_snapshot_meta(mut self, meta: MetaFile) -> Self {
        self.inner.meta = meta;
        self
    }

    /// Finish the construction.
    pub fn build(self) -> Result<Timestamp, TufError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.inner),
        }
    }
}

pub struct SnapshotBuilder {
    inner: Snapshot,
    error: Option<TufError>,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        SnapshotBuilder {
            inner: Snapshot {
                expires: epoch(),
                meta: Default::default(),
                spec_version: SPEC_VERSION.into(),
                version: 0,
            },
            error: None,
        }
    }
}

builder_common!(SnapshotBuilder);

impl SnapshotBuilder {
    /// Pin the metadata of `role` by version, length and hash of `data`.
    pub fn with_meta(mut self, role: &str, data: &[u8], version: Version) -> Self {
        match meta_file(role, data, version) {
            Ok(meta) => self.inner.meta.push(meta),
            Err(err) => return self.fail(err),
        }
        self
    }

    /// Pin the metadata of `role` by version only.
    pub fn with_meta_version(mut self, role: &str, version: Version) -> Self {
        self.inner.meta.push(MetaFile {
            metapath: metapath(role),
            version,
            length: None,
            hashes: vec![],
        });
        self
    }

    /// Pin a signed targets file of `role`.
    pub fn with_targets(self, role: &str, targets: &Signed<Targets>) -> Self {
        match targets.encode_as_file() {
            Ok(data) => self.with_meta(role, &data, targets.signed.version),
            Err(err) => self.fail(err),
        }
    }

    pub fn build(self) -> Result<Snapshot, TufError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.inner),
        }
    }
}

pub struct TargetsBuilder {
    inner: Targets,
    error: Option<TufError>,
}

impl Default for TargetsBuilder {
    fn default() -> Self {
        TargetsBuilder {
            inner: Targets {
                expires: epoch(),
                spec_version: SPEC_VERSION.into(),
                version: 0,
                targets: Default::default(),
                delegations: Default::default(),
            },
            error: None,
        }
    }
}

builder_common!(TargetsBuilder);

impl TargetsBuilder {
    /// Add target file to the targets role.
    pub fn with_target(mut self, path: &str, target_file: &[u8]) -> Self {
        let hash = match Hash::from_data(HashAlgorithm::Sha256, target_file) {
            Ok(hash) => hash,
            Err(err) => return self.fail(err),
        };
        self.inner.targets.push(Target {
            path: path.into(),
            value: TargetValue {
                length: target_file.len() as u64,
                hashes: vec![hash],
                custom: None,
            },
        });
        self
    }

    /// Add a target with an explicit description.
    pub fn with_target_value(mut self, path: &str, value: TargetValue) -> Self {
        self.inner.targets.push(Target {
            path: path.into(),
            value,
        });
        self
    }

    /// Delegate to `role`, whose signatures are verified with `keys`.
    /// Roles are searched in the order they are added.
    pub fn with_delegation(mut self, role: DelegatedRole, keys: &[SubjectPublicKeyInfoOwned]) -> Self {
        let delegations = self.inner.delegations.get_or_insert_with(|| Delegations {
            keys: vec![],
            roles: vec![],
        });
        for key in keys {
            if !delegations.keys.contains(key) {
                delegations.keys.push(key.clone());
            }
        }
        delegations.roles.push(role);
        self
    }

    /// Finish the construction.
    pub fn build(self) -> Result<Targets, TufError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.inner),
        }
    }
}

/// Builds a [DelegatedRole]. Without paths the role is responsible for no target.
pub struct DelegatedRoleBuilder {
    inner: DelegatedRole,
    error: Option<TufError>,
}

impl DelegatedRoleBuilder {
    pub fn new(name: &str) -> Self {
        DelegatedRoleBuilder {
            inner: DelegatedRole {
                name: name.into(),
                keyids: vec![],
                threshold: 1,
                terminating: false,
                paths: vec![],
                path_hash_prefixes: vec![],
            },
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn with_keys(mut self, keys: &[SubjectPublicKeyInfoOwned]) -> Self {
        match key_ids(keys) {
            Ok(keyids) => self.inner.keyids.extend(keyids),
            Err(err) => {
                self.error.get_or_insert(err);
            }
        }
        self
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.inner.threshold = threshold;
        self
    }

    pub fn terminating(mut self, terminating: bool) -> Self {
        self.inner.terminating = terminating;
        self
    }

    pub fn with_paths(mut self, paths: &[&str]) -> Self {
        self.inner.paths.extend(paths.iter().map(|p| p.to_string()));
        self
    }

    pub fn with_path_hash_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.inner
            .path_hash_prefixes
            .extend(prefixes.iter().map(|p| p.to_string()));
        self
    }

    pub fn build(self) -> Result<DelegatedRole, TufError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.inner),
        }
    }
}

/// Signs `signed` with `keys` and returns the object together with its file encoding.
#[cfg(feature = "sign")]
pub fn sign_and_encode<T: Encode>(
    signed: T,
    keys: &[tuf_trust_common::crypto::sign::SigningKey],
) -> Result<(Signed<T>, Vec<u8>), TufError> {
    let signed = Signed::from_signed(signed, keys)?;
    let encoded = signed.encode_as_file()?;
    Ok((signed, encoded))
}
