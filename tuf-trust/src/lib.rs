//! A client side trust engine for [TUF](https://theupdateframework.io/) repositories
//! based on the [DER format](https://en.wikipedia.org/wiki/X.690#DER_encoding).
//! This implementation aims to fulfill the [TUF specification](https://theupdateframework.github.io/specification/v1.0.33/index.html),
//! however, it is not guaranteed that it does so fully.
//!
//! ## Why DER?
//! - DER is an encoding that is deterministic,
//! which is important for TUF as it requires signatures of *canonically* encoded files.
//! - DER parsing and encoding is more readily available than for canonical JSON.
//! - DER is also required for certificate parsing and therefore potentially adds less overhead regarding dependencies.
//!
//! ## Example
//!
//! ```ignore
//! use tuf_trust::{TrustStore, Updater, UpdaterConfig};
//! use tuf_trust::fs::{FilesystemStorage, FilesystemTransport};
//! use tuf_trust::signature::SignatureVerifier;
//!
//! const TUF_ROOT: &[u8] = include_bytes!("path/to/root.der");
//!
//! let storage = FilesystemStorage::new("/var/lib/device/tuf")?;
//! let store = TrustStore::bootstrap(storage, TUF_ROOT, &SignatureVerifier::default())?;
//! let transport = FilesystemTransport::new("/mnt/mirror")?;
//!
//! let mut updater = Updater::new(transport, store, UpdaterConfig::default());
//! updater.refresh()?;
//! let firmware = updater.fetch_and_verify_target("firmware/device.bin")?;
//! ```
//!
//! ## Storage
//!
//! If you need a implementor of the [TufStorage] trait you can use [utils::MemoryStorage],
//! [fs::FilesystemStorage] or implement your own solution using the trait.
//!
//! ## TufTransport/Remote
//!
//! The crate does not decide how bytes are fetched. [fs::FilesystemTransport] serves a
//! repository from a local directory, with the `memory-transport` feature
//! [utils::MemoryTransport] serves one from memory.

use tracing::{debug, info};

pub use der::asn1::UtcTime;
pub use der::DateTime;
pub use tuf_trust_common::{remote::TufTransport, storage::TufStorage, TufError};

use crate::role::delegation::DelegationResolver;
use crate::role::root::update_root;
use crate::role::snapshot::update_snapshot;
use crate::role::targets::{target_remote_path, update_targets, verify_target_file};
use crate::role::timestamp::update_timestamp;

/// Module for builders to create TUF repositories.
pub mod builder;
/// Canonical encoding of metadata files.
pub mod canonical;
/// Reference time for expiry checks.
pub mod clock;
pub mod config;
/// Metadata storage and transport backed by a directory.
pub mod fs;
/// Implementation of TUF roles.
pub mod role;
/// Threshold signature verification.
pub mod signature;
#[cfg(feature = "memory-transport")]
pub mod simulator;
pub mod trust_store;
/// Utility functions.
pub mod utils;

/// Error types and more traits.
pub use tuf_trust_common as common;
/// Re-export of constants.
pub use tuf_trust_common::constants;
/// Re-export of errors.
pub use tuf_trust_common::error;
/// Fetching TUF files from remotes.
pub use tuf_trust_common::remote;
/// Storage of TUF files. Only has traits, there is an in-memory implementation available in [utils::MemoryStorage].
pub use tuf_trust_common::storage;
/// The DER data model.
pub use tuf_trust_der as der_format;

pub use clock::{FixedClock, ReferenceClock, SystemClock};
pub use config::UpdaterConfig;
pub use role::delegation::{Resolution, TargetInfo};
pub use trust_store::TrustStore;

use crate::signature::SignatureVerifier;

/// A TUF client.
///
/// Owns the trusted state and runs refreshes and target lookups against one remote.
/// A single updater must not be used concurrently, reads of the trusted state through
/// [Updater::store] are fine.
pub struct Updater<T, S, C = SystemClock> {
    transport: T,
    store: TrustStore<S>,
    verifier: SignatureVerifier,
    config: UpdaterConfig,
    clock: C,
    refreshed: bool,
}

impl<T, S> Updater<T, S, SystemClock>
where
    T: TufTransport,
    S: TufStorage,
{
    /// Creates an updater that checks expiry against the system clock.
    pub fn new(transport: T, store: TrustStore<S>, config: UpdaterConfig) -> Self {
        Updater {
            transport,
            store,
            verifier: SignatureVerifier::default(),
            config,
            clock: SystemClock,
            refreshed: false,
        }
    }
}

impl<T, S, C> Updater<T, S, C>
where
    T: TufTransport,
    S: TufStorage,
    C: ReferenceClock,
{
    /// Replaces the reference clock.
    pub fn with_clock<C2: ReferenceClock>(self, clock: C2) -> Updater<T, S, C2> {
        Updater {
            transport: self.transport,
            store: self.store,
            verifier: self.verifier,
            config: self.config,
            clock,
            refreshed: self.refreshed,
        }
    }

    /// Replaces the signature verifier, e.g. to register additional schemes.
    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn store(&self) -> &TrustStore<S> {
        &self.store
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn into_store(self) -> TrustStore<S> {
        self.store
    }

    /// Run a full TUF repo update. For more information refer to the [TUF specification](https://theupdateframework.github.io/specification/latest/).
    ///
    /// Roots are committed one by one. Timestamp, snapshot and targets are only committed
    /// together if all of them verify, a failure leaves them as they were.
    pub fn refresh(&mut self) -> Result<(), TufError> {
        debug!("starting refresh");
        let root_version = update_root(
            &self.transport,
            &mut self.store,
            &self.verifier,
            &self.config,
            &self.clock,
        )?;

        let timestamp = update_timestamp(
            &self.transport,
            &self.store,
            &self.verifier,
            &self.config,
            &self.clock,
        )?;
        let trusted_timestamp = timestamp
            .or_trusted(self.store.timestamp())
            .cloned()
            .ok_or_else(|| missing("timestamp"))?;

        let snapshot = update_snapshot(
            &self.transport,
            &self.store,
            &trusted_timestamp,
            &self.verifier,
            &self.config,
            &self.clock,
        )?;
        let trusted_snapshot = snapshot
            .or_trusted(self.store.snapshot())
            .cloned()
            .ok_or_else(|| missing("snapshot"))?;

        let targets = update_targets(
            &self.transport,
            &self.store,
            &trusted_snapshot,
            &self.verifier,
            &self.config,
            &self.clock,
        )?;

        let changed = (timestamp.is_new(), snapshot.is_new(), targets.is_new());
        self.store
            .commit_top_level(trust_store::TopLevelUpdate {
                timestamp,
                snapshot,
                targets,
            })?;
        self.refreshed = true;
        info!(
            root = root_version,
            timestamp = trusted_timestamp.signed.version,
            snapshot = trusted_snapshot.signed.version,
            new_timestamp = changed.0,
            new_snapshot = changed.1,
            new_targets = changed.2,
            "refresh finished"
        );
        Ok(())
    }

    /// Searches the delegation graph for `path` and reports how the search went.
    ///
    /// Refreshes first if no refresh succeeded yet.
    pub fn resolve(&mut self, path: &str) -> Result<Resolution, TufError> {
        if !self.refreshed {
            self.refresh()?;
        }
        DelegationResolver::new(
            &self.transport,
            &mut self.store,
            &self.verifier,
            &self.config,
            &self.clock,
        )
        .resolve(path)
    }

    /// Returns the description of the target at `path`, `None` if no trusted role lists it.
    pub fn get_target_info(&mut self, path: &str) -> Result<Option<TargetInfo>, TufError> {
        Ok(self.resolve(path)?.target)
    }

    /// Fetches the target at `path` and returns it if it matches its trusted description.
    pub fn fetch_and_verify_target(&mut self, path: &str) -> Result<Vec<u8>, TufError> {
        let info = self
            .get_target_info(path)?
            .ok_or_else(|| TufError::NotFound { name: path.into() })?;
        self.fetch_and_verify(&info)
    }

    /// Fetches a target that was looked up before.
    pub fn fetch_and_verify(&self, info: &TargetInfo) -> Result<Vec<u8>, TufError> {
        let consistent = role::consistent_snapshot(&self.config, self.store.root());
        let remote_path = target_remote_path(&info.path, &info.value, consistent)?;
        let data = self
            .transport
            .fetch_target(&remote_path, info.value.length)
            .map_err(|err| TufError::from_transport(&info.path, err))?;
        verify_target_file(&info.path, &info.value, &data)?;
        debug!(path = %info.path, role = %info.role, "verified target");
        Ok(data)
    }
}

fn missing(role: &str) -> TufError {
    TufError::MissingMetadata {
        name: tuf_trust_der::metapath(role),
    }
}
