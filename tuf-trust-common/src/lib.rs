pub mod constants;
pub mod crypto;
pub mod error;
pub mod remote;
pub mod storage;

use core::fmt;

pub use error::TufError;

/// Version number of a metadata file.
pub type Version = u32;

/// Number of distinct valid signatures a role requires.
pub type Threshold = u8;

/// The top-level roles that are described by the root file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleType {
    Root,
    Snapshot,
    Targets,
    Timestamp,
}

impl RoleType {
    /// Name of the role as it appears in metadata.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RoleType::Root => "root",
            RoleType::Snapshot => "snapshot",
            RoleType::Targets => "targets",
            RoleType::Timestamp => "timestamp",
        }
    }

    /// Returns `true` if `name` is reserved for one of the top-level roles.
    pub fn is_top_level(name: &str) -> bool {
        [
            RoleType::Root,
            RoleType::Snapshot,
            RoleType::Targets,
            RoleType::Timestamp,
        ]
        .iter()
        .any(|role| role == name)
    }
}

impl fmt::Display for RoleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialEq<str> for RoleType {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for RoleType {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<String> for RoleType {
    fn eq(&self, other: &String) -> bool {
        self.as_str() == other.as_str()
    }
}
