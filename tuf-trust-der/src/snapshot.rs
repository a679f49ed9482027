use der::asn1::UtcTime;
use der::Sequence;
use tuf_trust_common::constants::METADATA_EXTENSION;
use tuf_trust_common::Version;

use crate::{metapath, Hash, Length, SpecVersion};

/// DER encoding of the TUF Snapshot format.
/// [Refer to the TUF specification.](https://theupdateframework.github.io/specification/latest/#file-formats-snapshot)
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Snapshot {
    pub expires: UtcTime,
    /// One entry per targets role, top-level and delegated.
    pub meta: Vec<MetaFile>,
    pub spec_version: SpecVersion,
    pub version: Version,
}

impl Snapshot {
    /// Returns the entry of `role`.
    pub fn meta_for(&self, role: &str) -> Option<&MetaFile> {
        let path = metapath(role);
        self.meta.iter().find(|m| m.metapath == path)
    }
}

/// Reference to a metadata file, used by timestamp and snapshot.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct MetaFile {
    /// Name of the file, e.g. `targets.der`.
    pub metapath: String,
    pub version: Version,
    pub length: Option<Length>,
    /// May be empty, the file is then only pinned by its version.
    pub hashes: Vec<Hash>,
}

impl MetaFile {
    /// Name of the role the file belongs to.
    pub fn role_name(&self) -> Option<&str> {
        self.metapath
            .strip_suffix(METADATA_EXTENSION)
            .and_then(|p| p.strip_suffix('.'))
    }
}
