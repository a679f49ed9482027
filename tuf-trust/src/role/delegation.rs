use std::collections::HashSet;
use std::rc::Rc;

use globset::GlobBuilder;
use spki::SubjectPublicKeyInfoOwned;
use tracing::{debug, warn};
use tuf_trust_common::crypto::sha256_hex;
use tuf_trust_common::remote::TufTransport;
use tuf_trust_common::storage::TufStorage;
use tuf_trust_common::{RoleType, TufError};
use tuf_trust_der::targets::{DelegatedRole, Delegations, TargetValue, Targets};
use tuf_trust_der::{metapath, Signed};

use crate::clock::ReferenceClock;
use crate::config::UpdaterConfig;
use crate::role::consistent_snapshot;
use crate::role::targets::{fetch_targets_metadata, verify_targets};
use crate::signature::{RoleKeys, SignatureVerifier};
use crate::trust_store::TrustStore;

/// A target together with the role that describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub path: String,
    pub value: TargetValue,
    /// Name of the role that listed the target.
    pub role: String,
}

/// Outcome of a search through the delegation graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub target: Option<TargetInfo>,
    /// Delegated roles in the order they were visited.
    pub visited: Vec<String>,
    /// Roles whose metadata could not be used. The search went on without them.
    pub failures: Vec<(String, TufError)>,
    /// Set if the search stopped because too many roles were visited.
    pub limit_exceeded: Option<TufError>,
}

/// Returns `true` if `role` is trusted for `path`.
///
/// Paths are matched with shell-style globs in which `*` does not cross a `/`.
/// A role that declares neither paths nor hash prefixes is trusted for nothing.
pub fn is_delegated_path(role: &DelegatedRole, path: &str) -> Result<bool, TufError> {
    match (role.paths.is_empty(), role.path_hash_prefixes.is_empty()) {
        (false, false) => Err(TufError::malformed(
            &role.name,
            "both paths and path hash prefixes are set",
        )),
        (true, true) => Ok(false),
        (false, true) => {
            for pattern in &role.paths {
                let glob = GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|err| TufError::malformed(&role.name, err))?;
                if glob.compile_matcher().is_match(path) {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        (true, false) => {
            let digest = sha256_hex(path.as_bytes());
            Ok(role
                .path_hash_prefixes
                .iter()
                .any(|prefix| digest.starts_with(&prefix.to_ascii_lowercase())))
        }
    }
}

/// A delegation that still has to be looked at.
struct Pending {
    role: DelegatedRole,
    /// Keys declared by the delegator.
    keys: Rc<[SubjectPublicKeyInfoOwned]>,
    delegator: String,
    /// Set if the delegation itself is invalid.
    invalid: Option<TufError>,
}

/// Pushes the roles of `delegations` that are trusted for `path`, so that the first
/// declared role is popped first.
///
/// A matching terminating role discards everything that is still pending, as well as
/// the roles declared after it.
fn push_delegations(
    stack: &mut Vec<Pending>,
    delegator: &str,
    delegations: &Delegations,
    path: &str,
) {
    let keys: Rc<[SubjectPublicKeyInfoOwned]> = delegations.keys.clone().into();
    let mut children = Vec::new();
    for role in &delegations.roles {
        let invalid = match is_delegated_path(role, path) {
            Ok(true) => None,
            Ok(false) => {
                debug!(role = %role.name, delegator, path, "role is not trusted for path");
                continue;
            }
            Err(err) => Some(err),
        };
        let terminating = role.terminating && invalid.is_none();
        children.push(Pending {
            role: role.clone(),
            keys: Rc::clone(&keys),
            delegator: delegator.into(),
            invalid,
        });
        if terminating {
            debug!(role = %role.name, delegator, "terminating delegation, dropping pending roles");
            stack.clear();
            break;
        }
    }
    stack.extend(children.into_iter().rev());
}

/// Searches the delegation graph for targets, loading delegated roles on demand.
///
/// Refer to the [TUF specification section on preorder depth-first search](https://theupdateframework.github.io/specification/latest/#targets-role-delegation) for more information
pub struct DelegationResolver<'a, T, S, C> {
    transport: &'a T,
    store: &'a mut TrustStore<S>,
    verifier: &'a SignatureVerifier,
    config: &'a UpdaterConfig,
    clock: &'a C,
}

impl<'a, T, S, C> DelegationResolver<'a, T, S, C>
where
    T: TufTransport,
    S: TufStorage,
    C: ReferenceClock,
{
    pub fn new(
        transport: &'a T,
        store: &'a mut TrustStore<S>,
        verifier: &'a SignatureVerifier,
        config: &'a UpdaterConfig,
        clock: &'a C,
    ) -> Self {
        DelegationResolver {
            transport,
            store,
            verifier,
            config,
            clock,
        }
    }

    /// Finds the role that is responsible for `path`.
    ///
    /// Roles that fail to load or verify are skipped and reported in the [Resolution].
    /// Errors are only returned if the top-level metadata is missing.
    pub fn resolve(&mut self, path: &str) -> Result<Resolution, TufError> {
        let top_level = RoleType::Targets.as_str();
        let targets = self
            .store
            .targets()
            .ok_or_else(|| TufError::MissingMetadata {
                name: metapath(top_level),
            })?;
        let mut resolution = Resolution::default();
        if let Some(value) = targets.signed.target(path) {
            resolution.target = Some(TargetInfo {
                path: path.into(),
                value: value.clone(),
                role: top_level.into(),
            });
            return Ok(resolution);
        }

        let mut stack = Vec::new();
        if let Some(delegations) = &targets.signed.delegations {
            push_delegations(&mut stack, top_level, delegations, path);
        }
        let mut visited = HashSet::from([top_level.to_string()]);

        while let Some(mut pending) = stack.pop() {
            let name = pending.role.name.clone();
            if visited.contains(&name) {
                debug!(role = %name, "skipping role that was already visited");
                continue;
            }
            if let Some(err) = pending.invalid.take() {
                warn!(role = %name, delegator = %pending.delegator, "{err}");
                resolution.failures.push((name, err));
                continue;
            }
            if resolution.visited.len() as u32 >= self.config.max_delegations {
                let err = TufError::DelegationLimitExceeded {
                    path: path.into(),
                    max: self.config.max_delegations,
                };
                warn!("{err}");
                resolution.limit_exceeded = Some(err);
                break;
            }
            visited.insert(name.clone());
            resolution.visited.push(name.clone());

            let role = match self.load_role(&pending) {
                Ok(role) => role,
                Err(err) => {
                    warn!(role = %name, delegator = %pending.delegator, "skipping role: {err}");
                    resolution.failures.push((name, err));
                    continue;
                }
            };
            if let Some(value) = role.signed.target(path) {
                resolution.target = Some(TargetInfo {
                    path: path.into(),
                    value: value.clone(),
                    role: name,
                });
                break;
            }
            if let Some(delegations) = &role.signed.delegations {
                push_delegations(&mut stack, &name, delegations, path);
            }
        }
        Ok(resolution)
    }

    /// Loads a delegated role from the cache, the storage or the remote, in that order.
    ///
    /// Cached and persisted metadata goes through the same checks as fetched metadata.
    fn load_role(&mut self, pending: &Pending) -> Result<Signed<Targets>, TufError> {
        let name = pending.role.name.as_str();
        if RoleType::is_top_level(name) {
            return Err(TufError::malformed(
                &pending.delegator,
                format!("delegates to the reserved role name {name}"),
            ));
        }
        let keys = RoleKeys::from_delegation(&pending.keys, &pending.role);
        let snapshot = self
            .store
            .snapshot()
            .ok_or_else(|| TufError::MissingMetadata {
                name: metapath(RoleType::Snapshot.as_str()),
            })?;

        let (local, cached) = match self.store.delegated(name) {
            Some(signed) => (Some(signed.encode_as_file()?), true),
            None => (self.store.load_delegated(name)?, false),
        };
        if let Some(data) = local {
            match verify_targets(self.verifier, &keys, snapshot, &data, self.clock) {
                Ok(signed) => {
                    if !cached {
                        debug!(role = name, "using persisted metadata");
                        self.store.cache_delegated(name, signed.clone());
                    }
                    return Ok(signed);
                }
                Err(err) => debug!(role = name, "local metadata cannot be used: {err}"),
            }
        }

        let consistent = consistent_snapshot(self.config, self.store.root());
        let data = fetch_targets_metadata(self.transport, name, snapshot, consistent, self.config)?;
        let signed = verify_targets(self.verifier, &keys, snapshot, &data, self.clock)?;
        self.store.commit_delegated(name, signed.clone(), &data)?;
        debug!(role = name, version = signed.signed.version, "loaded delegated role");
        Ok(signed)
    }
}

#[cfg(test)]
mod test {
    use super::is_delegated_path;
    use crate::builder::DelegatedRoleBuilder;
    use tuf_trust_common::crypto::sha256_hex;
    use tuf_trust_common::TufError;

    #[test]
    fn test_glob_paths() {
        let role = DelegatedRoleBuilder::new("a")
            .with_paths(&["*.md", "releases/*/*"])
            .build()
            .unwrap();
        assert!(is_delegated_path(&role, "README.md").unwrap());
        assert!(!is_delegated_path(&role, "docs/README.md").unwrap());
        assert!(is_delegated_path(&role, "releases/x/x_v1").unwrap());
        assert!(!is_delegated_path(&role, "releases/x/y/x_v1").unwrap());
        assert!(!is_delegated_path(&role, "releases").unwrap());
    }

    #[test]
    fn test_hash_prefixes() {
        let digest = sha256_hex(b"targetfile");
        let role = DelegatedRoleBuilder::new("bin")
            .with_path_hash_prefixes(&[&digest[..2].to_ascii_uppercase(), "zz"])
            .build()
            .unwrap();
        assert!(is_delegated_path(&role, "targetfile").unwrap());
        let other = DelegatedRoleBuilder::new("bin")
            .with_path_hash_prefixes(&["zz"])
            .build()
            .unwrap();
        assert!(!is_delegated_path(&other, "targetfile").unwrap());
    }

    #[test]
    fn test_neither_paths_nor_prefixes() {
        let role = DelegatedRoleBuilder::new("empty").build().unwrap();
        assert!(!is_delegated_path(&role, "anything").unwrap());
    }

    #[test]
    fn test_paths_and_prefixes_are_malformed() {
        let role = DelegatedRoleBuilder::new("both")
            .with_paths(&["*"])
            .with_path_hash_prefixes(&["ab"])
            .build()
            .unwrap();
        assert!(matches!(
            is_delegated_path(&role, "a"),
            Err(TufError::MalformedMetadata { role, .. }) if role == "both"
        ));
    }

    #[test]
    fn test_invalid_glob() {
        let role = DelegatedRoleBuilder::new("bad")
            .with_paths(&["[a-"])
            .build()
            .unwrap();
        is_delegated_path(&role, "a").expect_err("unclosed character class");
    }
}
