use serde::{Deserialize, Serialize};
use tuf_trust_common::constants::{
    DEFAULT_MAX_DELEGATIONS, DEFAULT_MAX_ROOT_ROTATIONS, DEFAULT_ROOT_MAX_LENGTH,
    DEFAULT_SNAPSHOT_MAX_LENGTH, DEFAULT_TARGETS_MAX_LENGTH, DEFAULT_TIMESTAMP_MAX_LENGTH,
};
use tuf_trust_common::TufError;

/// Limits and switches of an [crate::Updater].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Maximum number of root versions accepted during a single refresh.
    pub max_root_rotations: u32,
    /// Maximum number of delegated roles visited while resolving a single target path.
    pub max_delegations: u32,
    pub root_max_length: u64,
    pub timestamp_max_length: u64,
    /// Used if the timestamp does not declare the length of the snapshot.
    pub snapshot_max_length: u64,
    /// Used if the snapshot does not declare the length of a targets file.
    pub targets_max_length: u64,
    /// Fetch metadata by version and targets by hash if the root enables consistent snapshots.
    pub consistent_snapshot: bool,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        UpdaterConfig {
            max_root_rotations: DEFAULT_MAX_ROOT_ROTATIONS,
            max_delegations: DEFAULT_MAX_DELEGATIONS,
            root_max_length: DEFAULT_ROOT_MAX_LENGTH,
            timestamp_max_length: DEFAULT_TIMESTAMP_MAX_LENGTH,
            snapshot_max_length: DEFAULT_SNAPSHOT_MAX_LENGTH,
            targets_max_length: DEFAULT_TARGETS_MAX_LENGTH,
            consistent_snapshot: true,
        }
    }
}

impl UpdaterConfig {
    /// Parses a YAML document, missing fields keep their default.
    pub fn from_yaml_str(s: &str) -> Result<Self, TufError> {
        serde_yaml::from_str(s).map_err(|err| TufError::InvalidConfig(err.to_string()))
    }
}
