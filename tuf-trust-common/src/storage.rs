use crate::{TufError, Version};

/// A trait to abstract persistent file storage for TUF metadata.
///
/// Metadata is addressed by role name, top-level and delegated roles share
/// the same namespace. Every accepted root is additionally kept in the root history.
pub trait TufStorage {
    /// Loads the persisted metadata of `role`, `None` if nothing is stored.
    fn load_metadata(&self, role: &str) -> Result<Option<Vec<u8>>, TufError>;
    /// Persistently stores the metadata of `role`, replacing the previous one.
    fn persist_metadata(&mut self, role: &str, data: &[u8]) -> Result<(), TufError>;
    /// Deletes the metadata of `role`. Deleting missing metadata is not an error.
    fn delete_metadata(&mut self, role: &str) -> Result<(), TufError>;
    /// Appends an accepted root to the root history.
    fn persist_root_history(&mut self, version: Version, data: &[u8]) -> Result<(), TufError>;
    /// Versions of all roots in the history in ascending order.
    fn root_history(&self) -> Result<Vec<Version>, TufError>;
}
