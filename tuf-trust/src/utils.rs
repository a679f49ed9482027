use std::collections::{BTreeMap, HashMap};
#[cfg(any(test, feature = "memory-transport"))]
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[cfg(any(test, feature = "memory-transport"))]
use tuf_trust_common::remote::{check_length, TransportError, TufTransport};
use tuf_trust_common::storage::TufStorage;
use tuf_trust_common::{TufError, Version};

/// In-memory implementation for TUF storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    metadata: HashMap<String, Vec<u8>>,
    root_history: BTreeMap<Version, Vec<u8>>,
}

impl MemoryStorage {
    /// Names of all roles that have metadata stored.
    pub fn metadata_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.metadata.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn root_from_history(&self, version: Version) -> Option<&[u8]> {
        self.root_history.get(&version).map(Vec::as_slice)
    }
}

impl TufStorage for MemoryStorage {
    fn load_metadata(&self, role: &str) -> Result<Option<Vec<u8>>, TufError> {
        Ok(self.metadata.get(role).cloned())
    }

    fn persist_metadata(&mut self, role: &str, data: &[u8]) -> Result<(), TufError> {
        self.metadata.insert(role.into(), data.to_vec());
        Ok(())
    }

    fn delete_metadata(&mut self, role: &str) -> Result<(), TufError> {
        self.metadata.remove(role);
        Ok(())
    }

    fn persist_root_history(&mut self, version: Version, data: &[u8]) -> Result<(), TufError> {
        self.root_history.insert(version, data.to_vec());
        Ok(())
    }

    fn root_history(&self) -> Result<Vec<Version>, TufError> {
        Ok(self.root_history.keys().copied().collect())
    }
}

/// Files served by a [MemoryTransport].
#[cfg(any(test, feature = "memory-transport"))]
#[derive(Debug, Default)]
struct RemoteFiles {
    versioned: HashMap<(String, Version), Vec<u8>>,
    latest: HashMap<String, Vec<u8>>,
    targets: HashMap<String, Vec<u8>>,
    fetched: Vec<(String, Option<Version>)>,
}

/// A remote repository that lives in memory.
///
/// Clones share their files, so a repository can be modified while a client holds it.
/// Every metadata request is logged.
#[cfg(any(test, feature = "memory-transport"))]
#[derive(Debug, Default, Clone)]
pub struct MemoryTransport {
    files: Arc<Mutex<RemoteFiles>>,
}

#[cfg(any(test, feature = "memory-transport"))]
impl MemoryTransport {
    fn files(&self) -> MutexGuard<'_, RemoteFiles> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serves `data` as `version` of `role` and as the most recent one.
    pub fn add_metadata(&self, role: &str, version: Version, data: Vec<u8>) {
        let mut files = self.files();
        files.latest.insert(role.into(), data.clone());
        files.versioned.insert((role.into(), version), data);
    }

    /// Serves `data` as the most recent metadata of `role` without touching the versioned files.
    pub fn set_latest(&self, role: &str, data: Vec<u8>) {
        self.files().latest.insert(role.into(), data);
    }

    /// Stops serving `version` of `role`, or every version if `version` is `None`.
    pub fn remove_metadata(&self, role: &str, version: Option<Version>) {
        let mut files = self.files();
        match version {
            Some(version) => {
                files.versioned.remove(&(role.to_string(), version));
            }
            None => {
                files.versioned.retain(|(name, _), _| name != role);
                files.latest.remove(role);
            }
        }
    }

    pub fn add_target(&self, path: &str, data: Vec<u8>) {
        self.files().targets.insert(path.into(), data);
    }

    /// Metadata requests in the order they were made.
    pub fn fetched_metadata(&self) -> Vec<(String, Option<Version>)> {
        self.files().fetched.clone()
    }

    /// Names of the requested roles in the order they were requested.
    pub fn fetched_roles(&self) -> Vec<String> {
        self.files()
            .fetched
            .iter()
            .map(|(role, _)| role.clone())
            .collect()
    }

    pub fn clear_fetch_log(&self) {
        self.files().fetched.clear();
    }
}

#[cfg(any(test, feature = "memory-transport"))]
impl TufTransport for MemoryTransport {
    fn fetch_metadata(
        &self,
        role: &str,
        version: Option<Version>,
        max_length: u64,
    ) -> Result<Vec<u8>, TransportError> {
        let mut files = self.files();
        files.fetched.push((role.into(), version));
        let data = match version {
            Some(version) => files.versioned.get(&(role.to_string(), version)),
            None => files.latest.get(role),
        }
        .cloned()
        .ok_or(TransportError::NotFound)?;
        check_length(data, max_length)
    }

    fn fetch_target(&self, path: &str, max_length: u64) -> Result<Vec<u8>, TransportError> {
        let data = self
            .files()
            .targets
            .get(path)
            .cloned()
            .ok_or(TransportError::NotFound)?;
        check_length(data, max_length)
    }
}
