use std::collections::HashMap;

use der::{Decode, Encode};
use tracing::{debug, info, warn};
use tuf_trust_common::storage::TufStorage;
use tuf_trust_common::{RoleType, TufError};
use tuf_trust_der::root::Root;
use tuf_trust_der::snapshot::Snapshot;
use tuf_trust_der::targets::Targets;
use tuf_trust_der::timestamp::Timestamp;
use tuf_trust_der::Signed;

use crate::role::{decode_role, RoleUpdate};
use crate::signature::{RoleKeys, SignatureVerifier};

/// Result of verifying a top-level role during a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staged<T> {
    /// The trusted metadata stays as it is.
    Unchanged,
    /// Verified metadata together with the bytes it was decoded from.
    New { signed: Signed<T>, bytes: Vec<u8> },
}

impl<T> Staged<T> {
    /// The staged metadata, or `trusted` if nothing changed.
    pub fn or_trusted<'a>(&'a self, trusted: Option<&'a Signed<T>>) -> Option<&'a Signed<T>> {
        match self {
            Staged::Unchanged => trusted,
            Staged::New { signed, .. } => Some(signed),
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Staged::New { .. })
    }
}

/// Everything a refresh accepted after the root, committed at once.
#[derive(Debug, Clone)]
pub struct TopLevelUpdate {
    pub timestamp: Staged<Timestamp>,
    pub snapshot: Staged<Snapshot>,
    pub targets: Staged<Targets>,
}

/// The trusted metadata of a client.
///
/// Every object held here passed verification. Changes are written to the storage
/// before they become visible in memory.
pub struct TrustStore<S> {
    storage: S,
    root: Signed<Root>,
    timestamp: Option<Signed<Timestamp>>,
    snapshot: Option<Signed<Snapshot>>,
    targets: Option<Signed<Targets>>,
    delegated: HashMap<String, Signed<Targets>>,
}

impl<S: TufStorage> TrustStore<S> {
    /// Establishes trust from a root that was distributed out of band.
    ///
    /// The root has to be signed by a threshold of its own keys, it may be expired.
    pub fn bootstrap(
        mut storage: S,
        root: &[u8],
        verifier: &SignatureVerifier,
    ) -> Result<Self, TufError> {
        let signed = decode_role::<Root>(RoleType::Root.as_str(), root)?;
        verifier.verify_signed(&RoleKeys::from_root(&signed.signed, RoleType::Root)?, &signed)?;
        storage.persist_metadata(RoleType::Root.as_str(), root)?;
        storage.persist_root_history(signed.signed.version, root)?;
        info!(version = signed.signed.version, "bootstrapped trusted root");
        Ok(TrustStore {
            storage,
            root: signed,
            timestamp: None,
            snapshot: None,
            targets: None,
            delegated: HashMap::new(),
        })
    }

    /// Restores the trusted state from `storage`.
    ///
    /// The persisted root is trusted as it is. Persisted timestamp, snapshot and targets
    /// metadata is only used if it is still signed by the keys the root declares.
    pub fn open(storage: S, verifier: &SignatureVerifier) -> Result<Self, TufError> {
        let root = storage
            .load_metadata(RoleType::Root.as_str())?
            .ok_or_else(|| TufError::MissingMetadata {
                name: RoleType::Root.as_str().into(),
            })?;
        let root = decode_role::<Root>(RoleType::Root.as_str(), &root)?;
        let mut store = TrustStore {
            storage,
            root,
            timestamp: None,
            snapshot: None,
            targets: None,
            delegated: HashMap::new(),
        };
        store.timestamp = store.load_persisted(verifier);
        store.snapshot = store.load_persisted(verifier);
        store.targets = store.load_persisted(verifier);
        debug!(
            root = store.root.signed.version,
            timestamp = store.timestamp.is_some(),
            snapshot = store.snapshot.is_some(),
            targets = store.targets.is_some(),
            "opened trust store"
        );
        Ok(store)
    }

    fn load_persisted<T>(&self, verifier: &SignatureVerifier) -> Option<Signed<T>>
    where
        T: RoleUpdate + for<'a> Decode<'a> + Encode,
    {
        let role = T::TYPE;
        let data = match self.storage.load_metadata(role.as_str()) {
            Ok(data) => data?,
            Err(err) => {
                warn!(%role, "failed to load persisted metadata: {err}");
                return None;
            }
        };
        let verified = decode_role::<T>(role.as_str(), &data).and_then(|signed| {
            verifier.verify_signed(&RoleKeys::from_root(&self.root.signed, role)?, &signed)?;
            Ok(signed)
        });
        match verified {
            Ok(signed) => Some(signed),
            Err(err) => {
                warn!(%role, "ignoring persisted metadata: {err}");
                None
            }
        }
    }

    pub fn root(&self) -> &Signed<Root> {
        &self.root
    }

    pub fn timestamp(&self) -> Option<&Signed<Timestamp>> {
        self.timestamp.as_ref()
    }

    pub fn snapshot(&self) -> Option<&Signed<Snapshot>> {
        self.snapshot.as_ref()
    }

    pub fn targets(&self) -> Option<&Signed<Targets>> {
        self.targets.as_ref()
    }

    /// A delegated role that was verified against the current snapshot.
    pub fn delegated(&self, name: &str) -> Option<&Signed<Targets>> {
        self.delegated.get(name)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Replaces the trusted root and appends it to the root history.
    pub fn commit_root(&mut self, root: Signed<Root>, bytes: &[u8]) -> Result<(), TufError> {
        self.storage
            .persist_metadata(RoleType::Root.as_str(), bytes)?;
        self.storage
            .persist_root_history(root.signed.version, bytes)?;
        self.root = root;
        Ok(())
    }

    /// Returns `true` if trusted metadata of `role` is held.
    pub fn has_trusted(&self, role: RoleType) -> bool {
        match role {
            RoleType::Root => true,
            RoleType::Timestamp => self.timestamp.is_some(),
            RoleType::Snapshot => self.snapshot.is_some(),
            RoleType::Targets => self.targets.is_some(),
        }
    }

    /// Forgets the trusted metadata of `role`, e.g. after its keys were rotated.
    pub fn discard(&mut self, role: RoleType) -> Result<(), TufError> {
        match role {
            RoleType::Root => {
                return Err(TufError::InternalError(
                    "the trusted root cannot be discarded".into(),
                ))
            }
            RoleType::Timestamp => self.timestamp = None,
            RoleType::Snapshot => {
                self.snapshot = None;
                self.delegated.clear();
            }
            RoleType::Targets => self.targets = None,
        }
        self.storage.delete_metadata(role.as_str())?;
        info!(%role, "discarded trusted metadata");
        Ok(())
    }

    /// Persists and adopts the result of a refresh.
    ///
    /// Targets and snapshot are written before the timestamp, so a failed write never
    /// leaves a persisted timestamp that is ahead of the trusted state. Memory is only
    /// updated once every write succeeded. A new snapshot invalidates every cached
    /// delegated role.
    pub fn commit_top_level(&mut self, update: TopLevelUpdate) -> Result<(), TufError> {
        if let Staged::New { bytes, .. } = &update.targets {
            self.storage
                .persist_metadata(RoleType::Targets.as_str(), bytes)?;
        }
        if let Staged::New { bytes, .. } = &update.snapshot {
            self.storage
                .persist_metadata(RoleType::Snapshot.as_str(), bytes)?;
        }
        if let Staged::New { bytes, .. } = &update.timestamp {
            self.storage
                .persist_metadata(RoleType::Timestamp.as_str(), bytes)?;
        }

        if let Staged::New { signed, .. } = update.timestamp {
            debug!(version = signed.signed.version, "committed timestamp");
            self.timestamp = Some(signed);
        }
        if let Staged::New { signed, .. } = update.snapshot {
            debug!(version = signed.signed.version, "committed snapshot");
            self.snapshot = Some(signed);
            self.delegated.clear();
        }
        if let Staged::New { signed, .. } = update.targets {
            debug!(version = signed.signed.version, "committed targets");
            self.targets = Some(signed);
        }
        Ok(())
    }

    /// Keeps a delegated role that was loaded from storage.
    pub fn cache_delegated(&mut self, name: &str, signed: Signed<Targets>) {
        self.delegated.insert(name.into(), signed);
    }

    /// Persists and caches a freshly fetched delegated role.
    pub fn commit_delegated(
        &mut self,
        name: &str,
        signed: Signed<Targets>,
        bytes: &[u8],
    ) -> Result<(), TufError> {
        self.storage.persist_metadata(name, bytes)?;
        self.delegated.insert(name.into(), signed);
        Ok(())
    }

    /// Raw metadata of a delegated role from a previous session.
    pub fn load_delegated(&self, name: &str) -> Result<Option<Vec<u8>>, TufError> {
        self.storage.load_metadata(name)
    }
}

#[cfg(test)]
mod test {
    use super::{Staged, TopLevelUpdate, TrustStore};
    use crate::signature::SignatureVerifier;
    use crate::simulator::RepositorySimulator;
    use crate::utils::MemoryStorage;
    use der::Decode;
    use tuf_trust_common::storage::TufStorage;
    use tuf_trust_common::{RoleType, TufError, Version};
    use tuf_trust_der::targets::Targets;
    use tuf_trust_der::Signed;

    /// Fails every write of one role.
    struct FailingStorage {
        inner: MemoryStorage,
        fail_on: &'static str,
    }

    impl TufStorage for FailingStorage {
        fn load_metadata(&self, role: &str) -> Result<Option<Vec<u8>>, TufError> {
            self.inner.load_metadata(role)
        }

        fn persist_metadata(&mut self, role: &str, data: &[u8]) -> Result<(), TufError> {
            if role == self.fail_on {
                return Err(TufError::Storage(format!("cannot write {role}")));
            }
            self.inner.persist_metadata(role, data)
        }

        fn delete_metadata(&mut self, role: &str) -> Result<(), TufError> {
            self.inner.delete_metadata(role)
        }

        fn persist_root_history(&mut self, version: Version, data: &[u8]) -> Result<(), TufError> {
            self.inner.persist_root_history(version, data)
        }

        fn root_history(&self) -> Result<Vec<Version>, TufError> {
            self.inner.root_history()
        }
    }

    #[test]
    fn test_bootstrap_persists_root() {
        let sim = RepositorySimulator::new().unwrap();
        let verifier = SignatureVerifier::default();
        let store =
            TrustStore::bootstrap(MemoryStorage::default(), &sim.signed_root().unwrap(), &verifier)
                .unwrap();
        assert_eq!(store.root().signed.version, 1);
        assert_eq!(store.storage().root_history().unwrap(), vec![1]);
        assert_eq!(
            store.storage().load_metadata("root").unwrap(),
            Some(sim.signed_root().unwrap())
        );
    }

    #[test]
    fn test_bootstrap_rejects_unsigned_root() {
        let mut sim = RepositorySimulator::new().unwrap();
        sim.clear_signers("root");
        let root = sim.signed_root().unwrap();
        let err = TrustStore::bootstrap(
            MemoryStorage::default(),
            &root,
            &SignatureVerifier::default(),
        )
        .err()
        .expect("root without signatures");
        assert!(matches!(err, TufError::ThresholdNotMet { .. }));
    }

    #[test]
    fn test_open_requires_root() {
        let err = TrustStore::open(MemoryStorage::default(), &SignatureVerifier::default())
            .err()
            .expect("empty storage");
        assert_eq!(
            err,
            TufError::MissingMetadata {
                name: "root".into()
            }
        );
    }

    #[test]
    fn test_open_restores_committed_metadata() {
        let sim = RepositorySimulator::new().unwrap();
        let verifier = SignatureVerifier::default();
        let mut store =
            TrustStore::bootstrap(MemoryStorage::default(), &sim.signed_root().unwrap(), &verifier)
                .unwrap();
        let (timestamp, bytes) = sim.signed_timestamp().unwrap();
        store
            .commit_top_level(TopLevelUpdate {
                timestamp: Staged::New {
                    signed: timestamp.clone(),
                    bytes,
                },
                snapshot: Staged::Unchanged,
                targets: Staged::Unchanged,
            })
            .unwrap();

        let reopened = TrustStore::open(store.into_storage(), &verifier).unwrap();
        assert_eq!(reopened.timestamp(), Some(&timestamp));
        assert!(reopened.snapshot().is_none());
    }

    #[test]
    fn test_discard() {
        let sim = RepositorySimulator::new().unwrap();
        let verifier = SignatureVerifier::default();
        let mut store =
            TrustStore::bootstrap(MemoryStorage::default(), &sim.signed_root().unwrap(), &verifier)
                .unwrap();
        let (timestamp, bytes) = sim.signed_timestamp().unwrap();
        store
            .commit_top_level(TopLevelUpdate {
                timestamp: Staged::New {
                    signed: timestamp,
                    bytes,
                },
                snapshot: Staged::Unchanged,
                targets: Staged::Unchanged,
            })
            .unwrap();
        store.discard(RoleType::Timestamp).unwrap();
        assert!(store.timestamp().is_none());
        assert_eq!(store.storage().load_metadata("timestamp").unwrap(), None);
        store
            .discard(RoleType::Root)
            .expect_err("the root always stays");
    }

    #[test]
    fn test_failed_commit_keeps_timestamp_behind() {
        let sim = RepositorySimulator::new().unwrap();
        let verifier = SignatureVerifier::default();
        let storage = FailingStorage {
            inner: MemoryStorage::default(),
            fail_on: "snapshot",
        };
        let mut store = TrustStore::bootstrap(storage, &sim.signed_root().unwrap(), &verifier)
            .unwrap();
        let (timestamp, timestamp_bytes) = sim.signed_timestamp().unwrap();
        let (snapshot, snapshot_bytes) = sim.signed_snapshot().unwrap();
        let targets_bytes = sim.signed_targets("targets").unwrap();
        let targets = Signed::<Targets>::from_der(&targets_bytes).unwrap();

        let err = store
            .commit_top_level(TopLevelUpdate {
                timestamp: Staged::New {
                    signed: timestamp,
                    bytes: timestamp_bytes,
                },
                snapshot: Staged::New {
                    signed: snapshot,
                    bytes: snapshot_bytes,
                },
                targets: Staged::New {
                    signed: targets,
                    bytes: targets_bytes,
                },
            })
            .expect_err("the snapshot cannot be written");
        assert!(matches!(err, TufError::Storage(_)));
        assert!(store.timestamp().is_none());
        assert!(store.snapshot().is_none());
        assert!(store.targets().is_none());
        assert_eq!(store.storage().load_metadata("timestamp").unwrap(), None);
    }
}
