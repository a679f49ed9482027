use der::asn1::{Any, UtcTime};
use der::Sequence;
use spki::SubjectPublicKeyInfoOwned;
use tuf_trust_common::crypto::KeyIdBytes;
use tuf_trust_common::{Threshold, Version};

use crate::{find_key, key_id_bytes, Hash, KeyId, Length, SpecVersion};

/// DER encoding of the TUF Targets format, used by the top-level targets role and delegated roles.
/// [Refer to the TUF specification.](https://theupdateframework.github.io/specification/latest/#file-formats-targets)
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Targets {
    pub expires: UtcTime,
    pub spec_version: SpecVersion,
    /// Version of the targets file.
    pub version: Version,
    /// Target files this role is directly responsible for.
    pub targets: Vec<Target>,
    pub delegations: Option<Delegations>,
}

impl Targets {
    pub fn target(&self, path: &str) -> Option<&TargetValue> {
        self.targets
            .iter()
            .find(|t| t.path == path)
            .map(|t| &t.value)
    }

    /// Delegated roles in the order they are declared.
    pub fn delegated_roles(&self) -> &[DelegatedRole] {
        self.delegations
            .as_ref()
            .map(|d| d.roles.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Target {
    /// Path of the target relative to the targets directory of the repository.
    pub path: String,
    pub value: TargetValue,
}

#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct TargetValue {
    pub length: Length,
    pub hashes: Vec<Hash>,
    pub custom: Option<Custom>,
}

/// Application specific data attached to a target.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Custom {
    pub name: String,
    pub value: Any,
}

/// Keys and roles a targets role delegates to.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct Delegations {
    pub keys: Vec<SubjectPublicKeyInfoOwned>,
    /// The order is significant, earlier roles are searched first.
    pub roles: Vec<DelegatedRole>,
}

impl Delegations {
    pub fn key(&self, keyid: &KeyIdBytes) -> Option<&SubjectPublicKeyInfoOwned> {
        find_key(&self.keys, keyid)
    }
}

/// A role that is trusted for a subset of target paths.
///
/// Exactly one of `paths` and `path_hash_prefixes` is expected to be non-empty.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
pub struct DelegatedRole {
    pub name: String,
    pub keyids: Vec<KeyId>,
    pub threshold: Threshold,
    /// No further roles are searched below this one for matching paths.
    pub terminating: bool,
    /// Shell-style glob patterns.
    pub paths: Vec<String>,
    /// Hex prefixes of the SHA-256 digest of target paths.
    pub path_hash_prefixes: Vec<String>,
}

impl DelegatedRole {
    pub fn keyid_bytes(&self) -> impl Iterator<Item = KeyIdBytes> + '_ {
        self.keyids.iter().filter_map(key_id_bytes)
    }
}
