//! A signing repository that publishes into a [MemoryTransport].
//!
//! The metadata fields are public, tests modify them and publish again to
//! simulate repository changes and attacks.

use std::collections::{BTreeMap, HashMap};

use der::asn1::UtcTime;
use der::{DateTime, Decode, Encode};
use sha2::{Digest, Sha256};
use tuf_trust_common::crypto::sign::SigningKey;
use tuf_trust_common::crypto::HashAlgorithm;
use tuf_trust_common::{RoleType, TufError, Version};
use tuf_trust_der::root::Root;
use tuf_trust_der::snapshot::{MetaFile, Snapshot};
use tuf_trust_der::targets::{Delegations, Target, TargetValue, Targets};
use tuf_trust_der::timestamp::Timestamp;
use tuf_trust_der::{key_id_from_bytes, metapath, Hash, Signed};

use crate::builder::{
    meta_file, DelegatedRoleBuilder, RootBuilder, SnapshotBuilder, TargetsBuilder,
    TimestampBuilder,
};
use crate::role::targets::target_remote_path;
use crate::utils::MemoryTransport;

/// Expiry of all metadata the simulator creates.
pub fn default_expires() -> Result<UtcTime, TufError> {
    DateTime::new(2040, 1, 1, 0, 0, 0)
        .and_then(UtcTime::from_date_time)
        .map_err(|_| TufError::InvalidUtcTimestamp)
}

pub struct RepositorySimulator {
    pub root: Root,
    pub timestamp: Timestamp,
    pub snapshot: Snapshot,
    pub targets: Targets,
    /// Delegated targets roles by name.
    pub delegates: BTreeMap<String, Targets>,
    pub transport: MemoryTransport,
    /// Pin referenced metadata by length and hash in addition to the version.
    pub compute_metafile_hashes_length: bool,
    signers: HashMap<String, Vec<SigningKey>>,
    /// Root keys that sign the next published root once more.
    retiring_root_signers: Vec<SigningKey>,
    published: HashMap<String, Vec<u8>>,
    published_roots: BTreeMap<Version, Vec<u8>>,
    keys_created: u64,
}

impl RepositorySimulator {
    /// Creates and publishes version 1 of all top-level roles.
    pub fn new() -> Result<Self, TufError> {
        let expires = default_expires()?;
        let mut sim = RepositorySimulator {
            root: RootBuilder::default().build()?,
            timestamp: TimestampBuilder::default().with_expires(expires).build()?,
            snapshot: SnapshotBuilder::default().with_expires(expires).build()?,
            targets: TargetsBuilder::default()
                .with_expires(expires)
                .with_version(1)
                .build()?,
            delegates: BTreeMap::new(),
            transport: MemoryTransport::default(),
            compute_metafile_hashes_length: false,
            signers: HashMap::new(),
            retiring_root_signers: vec![],
            published: HashMap::new(),
            published_roots: BTreeMap::new(),
            keys_created: 0,
        };
        let mut root = RootBuilder::default()
            .with_expires(expires)
            .with_version(1)
            .consistent_snapshot(true);
        for role in [
            RoleType::Root,
            RoleType::Timestamp,
            RoleType::Snapshot,
            RoleType::Targets,
        ] {
            let key = sim.next_key();
            root = root.with_role_and_key(role.as_str(), &[key.as_spki()?], 1);
            sim.signers.insert(role.as_str().into(), vec![key]);
        }
        sim.root = root.build()?;
        sim.publish_root()?;
        sim.update_snapshot()?;
        Ok(sim)
    }

    /// Deterministic Ed25519 keys, distinct within a simulator.
    fn next_key(&mut self) -> SigningKey {
        self.keys_created += 1;
        let seed: [u8; 32] = Sha256::digest(format!("simulator key {}", self.keys_created)).into();
        SigningKey::Ed25519Dalek(ed25519_dalek::SigningKey::from_bytes(&seed))
    }

    fn sign<T: Encode + Clone>(&self, role: &str, signed: &T) -> Result<Vec<u8>, TufError> {
        let mut keys = self.signers.get(role).cloned().unwrap_or_default();
        if role == RoleType::Root.as_str() {
            keys.extend(self.retiring_root_signers.iter().cloned());
        }
        Signed::from_signed(signed.clone(), &keys)?.encode_as_file()
    }

    fn published(&self, role: &str) -> Result<&Vec<u8>, TufError> {
        self.published
            .get(role)
            .ok_or_else(|| TufError::MissingMetadata {
                name: metapath(role),
            })
    }

    fn decode_published<T>(&self, role: &str) -> Result<(Signed<T>, Vec<u8>), TufError>
    where
        T: for<'a> Decode<'a> + Encode,
    {
        let bytes = self.published(role)?.clone();
        let signed = Signed::<T>::from_der(&bytes).map_err(|err| TufError::malformed(role, err))?;
        Ok((signed, bytes))
    }

    /// The current root signed by the current root keys.
    pub fn signed_root(&self) -> Result<Vec<u8>, TufError> {
        let keys = self
            .signers
            .get(RoleType::Root.as_str())
            .cloned()
            .unwrap_or_default();
        Signed::from_signed(self.root.clone(), &keys)?.encode_as_file()
    }

    pub fn signed_root_metadata(&self) -> Result<(Signed<Root>, Vec<u8>), TufError> {
        let bytes = self.signed_root()?;
        let signed =
            Signed::<Root>::from_der(&bytes).map_err(|err| TufError::malformed("root", err))?;
        Ok((signed, bytes))
    }

    /// A root version as it was published.
    pub fn signed_root_version(&self, version: Version) -> Result<Vec<u8>, TufError> {
        self.published_roots
            .get(&version)
            .cloned()
            .ok_or_else(|| TufError::NotFound {
                name: format!("{version}.{}", metapath("root")),
            })
    }

    /// The timestamp the remote currently serves.
    pub fn signed_timestamp(&self) -> Result<(Signed<Timestamp>, Vec<u8>), TufError> {
        self.decode_published(RoleType::Timestamp.as_str())
    }

    /// The snapshot the remote currently serves.
    pub fn signed_snapshot(&self) -> Result<(Signed<Snapshot>, Vec<u8>), TufError> {
        self.decode_published(RoleType::Snapshot.as_str())
    }

    /// The metadata of a targets role the remote currently serves.
    pub fn signed_targets(&self, role: &str) -> Result<Vec<u8>, TufError> {
        self.published(role).cloned()
    }

    /// Removes all keys that sign `role`, its metadata is published without signatures.
    pub fn clear_signers(&mut self, role: &str) {
        self.signers.insert(role.into(), vec![]);
    }

    pub fn add_signer(&mut self, role: &str, key: SigningKey) {
        self.signers.entry(role.into()).or_default().push(key);
    }

    /// Replaces the keys of a top-level role in the root with a new key.
    ///
    /// The old root keys sign the next published root as well.
    pub fn rotate_keys(&mut self, role: &str) -> Result<(), TufError> {
        let key = self.next_key();
        let spki = key.as_spki()?;
        let keyid = key_id_from_bytes(&key.key_id()?)?;
        let declared = self
            .root
            .roles
            .iter_mut()
            .find(|r| r.name == role)
            .ok_or_else(|| TufError::malformed("root", format!("missing role {role}")))?;
        declared.keyids = vec![keyid];
        if !self.root.keys.contains(&spki) {
            self.root.keys.push(spki);
        }
        let old = self.signers.insert(role.into(), vec![key]).unwrap_or_default();
        if role == RoleType::Root.as_str() {
            self.retiring_root_signers.extend(old);
        }
        Ok(())
    }

    /// The keys a rotation replaced will not sign the next root.
    pub fn drop_retiring_root_keys(&mut self) {
        self.retiring_root_signers.clear();
    }

    /// Publishes the root under its version.
    pub fn publish_root(&mut self) -> Result<(), TufError> {
        let bytes = self.sign(RoleType::Root.as_str(), &self.root)?;
        self.retiring_root_signers.clear();
        self.transport
            .add_metadata(RoleType::Root.as_str(), self.root.version, bytes.clone());
        self.published_roots.insert(self.root.version, bytes.clone());
        self.published.insert(RoleType::Root.as_str().into(), bytes);
        Ok(())
    }

    pub fn bump_root(&mut self) -> Result<(), TufError> {
        self.root.version += 1;
        self.publish_root()
    }

    /// Publishes all targets roles at their current versions.
    pub fn publish_targets(&mut self) -> Result<(), TufError> {
        let mut roles = vec![(RoleType::Targets.as_str().to_string(), self.targets.clone())];
        roles.extend(self.delegates.iter().map(|(n, t)| (n.clone(), t.clone())));
        for (name, targets) in roles {
            let bytes = self.sign(&name, &targets)?;
            self.transport
                .add_metadata(&name, targets.version, bytes.clone());
            self.published.insert(name, bytes);
        }
        Ok(())
    }

    /// Publishes the snapshot as it is, without updating its references.
    pub fn publish_snapshot(&mut self) -> Result<(), TufError> {
        let bytes = self.sign(RoleType::Snapshot.as_str(), &self.snapshot)?;
        self.transport
            .add_metadata(RoleType::Snapshot.as_str(), self.snapshot.version, bytes.clone());
        self.published
            .insert(RoleType::Snapshot.as_str().into(), bytes);
        Ok(())
    }

    /// Publishes the timestamp as it is, without updating its reference.
    pub fn publish_timestamp(&mut self) -> Result<(), TufError> {
        let bytes = self.sign(RoleType::Timestamp.as_str(), &self.timestamp)?;
        self.transport.add_metadata(
            RoleType::Timestamp.as_str(),
            self.timestamp.version,
            bytes.clone(),
        );
        self.published
            .insert(RoleType::Timestamp.as_str().into(), bytes);
        Ok(())
    }

    fn reference(&self, role: &str, version: Version) -> Result<MetaFile, TufError> {
        if self.compute_metafile_hashes_length {
            meta_file(role, self.published(role)?, version)
        } else {
            Ok(MetaFile {
                metapath: metapath(role),
                version,
                length: None,
                hashes: vec![],
            })
        }
    }

    /// Points the timestamp at the published snapshot and publishes a new version.
    pub fn update_timestamp(&mut self) -> Result<(), TufError> {
        self.timestamp.meta = self.reference(RoleType::Snapshot.as_str(), self.snapshot.version)?;
        self.timestamp.version += 1;
        self.publish_timestamp()
    }

    /// Publishes all targets roles, then a new snapshot that references them and
    /// a new timestamp.
    pub fn update_snapshot(&mut self) -> Result<(), TufError> {
        self.publish_targets()?;
        let mut meta = vec![self.reference(RoleType::Targets.as_str(), self.targets.version)?];
        for (name, targets) in &self.delegates {
            meta.push(self.reference(name, targets.version)?);
        }
        self.snapshot.meta = meta;
        self.snapshot.version += 1;
        self.publish_snapshot()?;
        self.update_timestamp()
    }

    fn targets_mut(&mut self, role: &str) -> Result<&mut Targets, TufError> {
        if role == RoleType::Targets.as_str() {
            return Ok(&mut self.targets);
        }
        self.delegates
            .get_mut(role)
            .ok_or_else(|| TufError::MissingMetadata {
                name: metapath(role),
            })
    }

    /// Delegates from `delegator` to the role `delegated` builds.
    ///
    /// A role that already exists keeps its key and metadata, so several roles can
    /// delegate to the same one. Nothing is published.
    pub fn add_delegation(
        &mut self,
        delegator: &str,
        delegated: DelegatedRoleBuilder,
    ) -> Result<(), TufError> {
        let name = delegated.name().to_string();
        let key = match self.signers.get(&name).and_then(|keys| keys.first()) {
            Some(key) => key.clone(),
            None => {
                let key = self.next_key();
                self.signers.insert(name.clone(), vec![key.clone()]);
                key
            }
        };
        let spki = key.as_spki()?;
        let role = delegated.with_keys(&[spki.clone()]).build()?;
        if !self.delegates.contains_key(&name) && !RoleType::is_top_level(&name) {
            let targets = TargetsBuilder::default()
                .with_expires(default_expires()?)
                .with_version(1)
                .build()?;
            self.delegates.insert(name, targets);
        }
        let delegations = self
            .targets_mut(delegator)?
            .delegations
            .get_or_insert_with(|| Delegations {
                keys: vec![],
                roles: vec![],
            });
        if !delegations.keys.contains(&spki) {
            delegations.keys.push(spki);
        }
        delegations.roles.push(role);
        Ok(())
    }

    /// Stops publishing a delegated role, delegations to it stay in place.
    pub fn remove_delegate(&mut self, name: &str) {
        self.delegates.remove(name);
    }

    /// Lists a target in `role` and serves its contents under the plain and the
    /// hash-prefixed path.
    pub fn add_target(&mut self, role: &str, path: &str, data: &[u8]) -> Result<(), TufError> {
        let value = TargetValue {
            length: data.len() as u64,
            hashes: vec![Hash::from_data(HashAlgorithm::Sha256, data)?],
            custom: None,
        };
        self.transport.add_target(path, data.to_vec());
        self.transport
            .add_target(&target_remote_path(path, &value, true)?, data.to_vec());
        self.targets_mut(role)?.targets.push(Target {
            path: path.into(),
            value,
        });
        Ok(())
    }
}
