use std::collections::BTreeSet;

use der::asn1::UtcTime;
use der::Sequence;
use spki::SubjectPublicKeyInfoOwned;
use tuf_trust_common::crypto::KeyIdBytes;
use tuf_trust_common::{RoleType, Version};

use crate::{find_key, key_id_bytes, Role, SpecVersion};

/// DER encoding of a TUF root file.
/// [Refer to the TUF specification.](https://theupdateframework.github.io/specification/latest/#file-formats-root)
#[derive(Debug, Eq, PartialEq, Sequence, Clone)]
pub struct Root {
    /// Metadata and targets are addressed by version and hash, refer to the [TUF specification section on consistent snapshots](https://theupdateframework.github.io/specification/latest/#consistent-snapshots).
    pub consistent_snapshot: bool,
    pub expires: UtcTime,
    // Keys sorted by key ID.
    pub keys: Vec<SubjectPublicKeyInfoOwned>,
    /// Roles sorted by name.
    pub roles: Vec<Role>,
    /// Version of the TUF spec.
    pub spec_version: SpecVersion,
    /// Version of the root file.
    pub version: Version,
}

impl Root {
    pub fn role(&self, role: RoleType) -> Option<&Role> {
        self.roles.iter().find(|r| role == r.name)
    }

    /// Key IDs that are declared for `role`. Malformed key IDs are left out.
    pub fn role_keyids(&self, role: RoleType) -> BTreeSet<KeyIdBytes> {
        self.role(role)
            .map(|r| r.keyids.iter().filter_map(key_id_bytes).collect())
            .unwrap_or_default()
    }

    pub fn key(&self, keyid: &KeyIdBytes) -> Option<&SubjectPublicKeyInfoOwned> {
        find_key(&self.keys, keyid)
    }
}
