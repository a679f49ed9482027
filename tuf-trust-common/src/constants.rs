/// Maximum number of root rotations accepted during a single refresh.
pub const DEFAULT_MAX_ROOT_ROTATIONS: u32 = 32;
/// Maximum number of delegated roles visited while resolving a single target path.
pub const DEFAULT_MAX_DELEGATIONS: u32 = 32;

pub const DEFAULT_ROOT_MAX_LENGTH: u64 = 512_000;
pub const DEFAULT_TIMESTAMP_MAX_LENGTH: u64 = 16_384;
pub const DEFAULT_SNAPSHOT_MAX_LENGTH: u64 = 2_000_000;
pub const DEFAULT_TARGETS_MAX_LENGTH: u64 = 5_000_000;

/// File extension of DER encoded metadata.
pub const METADATA_EXTENSION: &str = "der";
