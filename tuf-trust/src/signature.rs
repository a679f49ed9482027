use std::collections::BTreeSet;

use der::referenced::OwnedToRef;
use spki::SubjectPublicKeyInfoOwned;
use tracing::debug;
use tuf_trust_common::crypto::{KeyIdBytes, SchemeRegistry};
use tuf_trust_common::{RoleType, Threshold, TufError};
use tuf_trust_der::root::Root;
use tuf_trust_der::targets::DelegatedRole;
use tuf_trust_der::{find_key, Signature, Signed};

use crate::canonical::EncodeCanonically;

/// The keys and the threshold that a role is verified with.
#[derive(Debug, Clone)]
pub struct RoleKeys<'k> {
    /// Name of the role, used for diagnostics.
    pub role: String,
    pub keyids: BTreeSet<KeyIdBytes>,
    pub threshold: Threshold,
    /// Keys declared by the delegating metadata.
    pub keys: &'k [SubjectPublicKeyInfoOwned],
}

impl<'k> RoleKeys<'k> {
    /// Keys of a top-level role as declared by the root.
    pub fn from_root(root: &'k Root, role: RoleType) -> Result<Self, TufError> {
        let declared = root
            .role(role)
            .ok_or_else(|| TufError::malformed("root", format!("missing role {role}")))?;
        Ok(RoleKeys {
            role: role.to_string(),
            keyids: root.role_keyids(role),
            threshold: declared.threshold,
            keys: &root.keys,
        })
    }

    /// Keys of a delegated role as declared by its delegator.
    pub fn from_delegation(keys: &'k [SubjectPublicKeyInfoOwned], role: &DelegatedRole) -> Self {
        RoleKeys {
            role: role.name.clone(),
            keyids: role.keyid_bytes().collect(),
            threshold: role.threshold,
            keys,
        }
    }
}

/// Checks threshold signatures with the registered signature schemes.
#[derive(Debug, Default)]
pub struct SignatureVerifier {
    schemes: SchemeRegistry,
}

impl SignatureVerifier {
    pub fn new(schemes: SchemeRegistry) -> Self {
        SignatureVerifier { schemes }
    }

    pub fn schemes(&self) -> &SchemeRegistry {
        &self.schemes
    }

    /// Counts the distinct declared keys that created a valid signature over `msg`.
    pub fn count_valid(&self, role: &RoleKeys<'_>, msg: &[u8], signatures: &[Signature]) -> u32 {
        let mut counted = BTreeSet::new();
        for sig in signatures {
            let Some(keyid) = sig.keyid_bytes() else {
                continue;
            };
            // Each key counts once, no matter how many signatures it made.
            if !role.keyids.contains(&keyid) || counted.contains(&keyid) {
                continue;
            }
            let Some(key) = find_key(role.keys, &keyid) else {
                debug!(role = %role.role, "key {} is not declared", hex::encode(keyid));
                continue;
            };
            let Some(raw_sig) = sig.sig_bytes() else {
                continue;
            };
            match self.schemes.verify(key.owned_to_ref(), msg, raw_sig) {
                Ok(()) => {
                    counted.insert(keyid);
                }
                Err(err) => {
                    debug!(role = %role.role, "signature of key {} rejected: {err}", hex::encode(keyid));
                }
            }
        }
        counted.len() as u32
    }

    /// Succeeds iff at least `threshold` distinct declared keys signed `msg`.
    pub fn verify(
        &self,
        role: &RoleKeys<'_>,
        msg: &[u8],
        signatures: &[Signature],
    ) -> Result<(), TufError> {
        if role.threshold == 0 {
            return Err(TufError::malformed(&role.role, "threshold is zero"));
        }
        let valid = self.count_valid(role, msg, signatures);
        if valid < role.threshold as u32 {
            return Err(TufError::ThresholdNotMet {
                role: role.role.clone(),
                threshold: role.threshold as u32,
                valid,
            });
        }
        Ok(())
    }

    /// Verifies the signatures of a signed metadata object over its canonical encoding.
    pub fn verify_signed<T>(&self, role: &RoleKeys<'_>, signed: &Signed<T>) -> Result<(), TufError>
    where
        T: EncodeCanonically,
    {
        let msg = signed.signed.encode_canonically()?;
        self.verify(role, &msg, &signed.signatures)
    }
}

#[cfg(test)]
mod test {
    use super::{RoleKeys, SignatureVerifier};
    use crate::builder::RootBuilder;
    use ed25519_dalek::SigningKey;
    use rand_core::OsRng;
    use tuf_trust_common::crypto::sign::SigningKey::{Ecdsa, Ed25519Dalek};
    use tuf_trust_common::crypto::SchemeRegistry;
    use tuf_trust_common::{RoleType, TufError};
    use tuf_trust_der::Signed;

    fn keys() -> Vec<tuf_trust_common::crypto::sign::SigningKey> {
        vec![
            Ed25519Dalek(SigningKey::generate(&mut OsRng)),
            Ecdsa(p256::ecdsa::SigningKey::random(&mut OsRng)),
            Ed25519Dalek(SigningKey::generate(&mut OsRng)),
        ]
    }

    #[test]
    fn test_threshold_reached_with_mixed_schemes() {
        let keys = keys();
        let spkis: Vec<_> = keys.iter().map(|k| k.as_spki().unwrap()).collect();
        let root = RootBuilder::default()
            .with_role_and_key("root", &spkis, 2)
            .with_expiration_utc(2030, 1, 1, 0, 0, 0)
            .with_version(1)
            .build()
            .unwrap();
        let signed = Signed::from_signed(root, &keys[..2]).unwrap();
        let role = RoleKeys::from_root(&signed.signed, RoleType::Root).unwrap();
        SignatureVerifier::default()
            .verify_signed(&role, &signed)
            .expect("two of three keys signed");
    }

    #[test]
    fn test_duplicate_signatures_count_once() {
        let keys = keys();
        let spkis: Vec<_> = keys.iter().map(|k| k.as_spki().unwrap()).collect();
        let root = RootBuilder::default()
            .with_role_and_key("root", &spkis, 2)
            .with_expiration_utc(2030, 1, 1, 0, 0, 0)
            .with_version(1)
            .build()
            .unwrap();
        let signed =
            Signed::from_signed(root, &[keys[0].clone(), keys[0].clone(), keys[0].clone()])
                .unwrap();
        let role = RoleKeys::from_root(&signed.signed, RoleType::Root).unwrap();
        assert_eq!(
            SignatureVerifier::default().verify_signed(&role, &signed),
            Err(TufError::ThresholdNotMet {
                role: "root".into(),
                threshold: 2,
                valid: 1
            })
        );
    }

    #[test]
    fn test_undeclared_key_is_ignored() {
        let keys = keys();
        let root = RootBuilder::default()
            .with_role_and_key("root", &[keys[0].as_spki().unwrap()], 1)
            .with_role_and_key("timestamp", &[keys[1].as_spki().unwrap()], 1)
            .with_expiration_utc(2030, 1, 1, 0, 0, 0)
            .with_version(1)
            .build()
            .unwrap();
        // Valid signature by a key that belongs to another role.
        let signed = Signed::from_signed(root, &[keys[1].clone()]).unwrap();
        let role = RoleKeys::from_root(&signed.signed, RoleType::Root).unwrap();
        let verifier = SignatureVerifier::default();
        assert_eq!(
            verifier.count_valid(&role, &signed.canonical_bytes().unwrap(), &signed.signatures),
            0
        );
    }

    #[test]
    fn test_signature_over_other_data_is_invalid() {
        let keys = keys();
        let root = RootBuilder::default()
            .with_role_and_key("root", &[keys[0].as_spki().unwrap()], 1)
            .with_expiration_utc(2030, 1, 1, 0, 0, 0)
            .with_version(1)
            .build()
            .unwrap();
        let mut signed = Signed::from_signed(root, &keys[..1]).unwrap();
        signed.signed.version = 2;
        let role = RoleKeys::from_root(&signed.signed, RoleType::Root).unwrap();
        SignatureVerifier::default()
            .verify_signed(&role, &signed)
            .expect_err("signature does not cover the modified version");
    }

    #[test]
    fn test_zero_threshold_is_malformed() {
        let keys = keys();
        let root = RootBuilder::default()
            .with_role_and_key("root", &[keys[0].as_spki().unwrap()], 0)
            .with_expiration_utc(2030, 1, 1, 0, 0, 0)
            .with_version(1)
            .build()
            .unwrap();
        let signed = Signed::from_signed(root, &keys[..1]).unwrap();
        let role = RoleKeys::from_root(&signed.signed, RoleType::Root).unwrap();
        let err = SignatureVerifier::default()
            .verify_signed(&role, &signed)
            .expect_err("threshold zero");
        assert!(matches!(err, TufError::MalformedMetadata { .. }));
    }

    #[test]
    fn test_without_schemes_nothing_verifies() {
        let keys = keys();
        let root = RootBuilder::default()
            .with_role_and_key("root", &[keys[0].as_spki().unwrap()], 1)
            .with_expiration_utc(2030, 1, 1, 0, 0, 0)
            .with_version(1)
            .build()
            .unwrap();
        let signed = Signed::from_signed(root, &keys[..1]).unwrap();
        let role = RoleKeys::from_root(&signed.signed, RoleType::Root).unwrap();
        SignatureVerifier::new(SchemeRegistry::empty())
            .verify_signed(&role, &signed)
            .expect_err("no scheme registered");
    }
}
