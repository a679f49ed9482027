mod common;

use common::{add_delegations, clock, delegation, updater};
use tuf_trust::common::Version;
use tuf_trust::fs::FilesystemStorage;
use tuf_trust::signature::SignatureVerifier;
use tuf_trust::simulator::RepositorySimulator;
use tuf_trust::utils::MemoryStorage;
use tuf_trust::{FixedClock, TrustStore, TufError, TufStorage, Updater, UpdaterConfig};

fn versions<S: TufStorage>(store: &TrustStore<S>) -> (Version, Version, Version, Version) {
    (
        store.root().signed.version,
        store.timestamp().unwrap().signed.version,
        store.snapshot().unwrap().signed.version,
        store.targets().unwrap().signed.version,
    )
}

#[test]
fn test_first_refresh() {
    let sim = RepositorySimulator::new().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    updater.refresh().unwrap();

    assert_eq!(versions(updater.store()), (1, 1, 1, 1));
    assert_eq!(
        sim.transport.fetched_metadata(),
        [
            ("root".to_string(), Some(2)),
            ("root".to_string(), None),
            ("timestamp".to_string(), None),
            ("snapshot".to_string(), Some(1)),
            ("targets".to_string(), Some(1)),
        ]
    );
    let storage = updater.store().storage();
    assert_eq!(
        storage.metadata_names(),
        ["root", "snapshot", "targets", "timestamp"]
    );
}

#[test]
fn test_unchanged_repository_is_not_downloaded_again() {
    let sim = RepositorySimulator::new().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    updater.refresh().unwrap();
    sim.transport.clear_fetch_log();

    updater.refresh().unwrap();
    assert_eq!(sim.transport.fetched_roles(), ["root", "root", "timestamp"]);
    assert_eq!(versions(updater.store()), (1, 1, 1, 1));
}

#[test]
fn test_metadata_without_consistent_snapshot() {
    let sim = RepositorySimulator::new().unwrap();
    let config = UpdaterConfig {
        consistent_snapshot: false,
        ..Default::default()
    };
    let mut updater = updater(&sim, config);
    updater.refresh().unwrap();
    assert_eq!(
        &sim.transport.fetched_metadata()[2..],
        [
            ("timestamp".to_string(), None),
            ("snapshot".to_string(), None),
            ("targets".to_string(), None),
        ]
    );
}

#[test]
fn test_root_chain_is_followed() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.bump_root().unwrap();
    sim.bump_root().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    updater.refresh().unwrap();

    assert_eq!(updater.store().root().signed.version, 3);
    assert_eq!(updater.store().storage().root_history().unwrap(), [1, 2, 3]);
}

#[test]
fn test_root_without_old_signatures_stops_the_rotation() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.rotate_keys("root").unwrap();
    sim.drop_retiring_root_keys();
    sim.bump_root().unwrap();
    sim.bump_root().unwrap();

    let mut updater = updater(&sim, UpdaterConfig::default());
    let err = updater.refresh().expect_err("root 2 is not signed by root 1 keys");
    assert!(
        matches!(&err, TufError::ThresholdNotMet { role, .. } if role == "root"),
        "{err}"
    );
    assert_eq!(updater.store().root().signed.version, 1);
    assert_eq!(
        sim.transport.fetched_metadata(),
        [("root".to_string(), Some(2))]
    );
    assert!(updater.store().timestamp().is_none());
}

#[test]
fn test_root_rotation_limit() {
    let mut sim = RepositorySimulator::new().unwrap();
    for _ in 0..3 {
        sim.bump_root().unwrap();
    }
    let config = UpdaterConfig {
        max_root_rotations: 2,
        ..Default::default()
    };
    let mut updater = updater(&sim, config);
    assert_eq!(
        updater.refresh(),
        Err(TufError::RotationLimitExceeded { max: 2, latest: 4 })
    );
    assert_eq!(updater.store().root().signed.version, 3);
}

#[test]
fn test_snapshot_rollback_leaves_state_unchanged() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.update_snapshot().unwrap();
    sim.update_snapshot().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    updater.refresh().unwrap();
    let trusted = versions(updater.store());
    assert_eq!(trusted, (1, 3, 3, 1));

    // a newer timestamp that points to an older snapshot
    sim.timestamp.meta.version = 2;
    sim.timestamp.version += 1;
    sim.publish_timestamp().unwrap();
    assert_eq!(
        updater.refresh(),
        Err(TufError::RollbackAttack {
            role: "snapshot".into(),
            trusted: 3,
            new: 2
        })
    );
    assert_eq!(versions(updater.store()), trusted);
}

#[test]
fn test_targets_rollback_commits_nothing() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.targets.version = 2;
    sim.update_snapshot().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    updater.refresh().unwrap();
    let trusted = versions(updater.store());
    assert_eq!(trusted, (1, 2, 2, 2));

    let persisted = updater.store().storage().load_metadata("timestamp").unwrap();

    sim.targets.version = 1;
    sim.update_snapshot().unwrap();
    assert_eq!(
        updater.refresh(),
        Err(TufError::RollbackAttack {
            role: "targets".into(),
            trusted: 2,
            new: 1
        })
    );
    // the new timestamp verified, but is not adopted without its snapshot
    assert_eq!(versions(updater.store()), trusted);
    assert_eq!(
        updater.store().storage().load_metadata("timestamp").unwrap(),
        persisted
    );
}

#[test]
fn test_expired_timestamp_is_rejected() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.timestamp.expires = FixedClock::from_utc(2029, 1, 1, 0, 0, 0).unwrap().0;
    sim.update_timestamp().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    let err = updater.refresh().expect_err("timestamp expired in 2029");
    assert!(
        matches!(&err, TufError::ExpiredMetadata { role, .. } if role == "timestamp"),
        "{err}"
    );
    assert!(updater.store().timestamp().is_none());
}

#[test]
fn test_expired_targets_is_rejected() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.targets.expires = FixedClock::from_utc(2029, 1, 1, 0, 0, 0).unwrap().0;
    sim.update_snapshot().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    let err = updater.refresh().expect_err("targets expired in 2029");
    assert!(
        matches!(&err, TufError::ExpiredMetadata { role, .. } if role == "targets"),
        "{err}"
    );
    assert!(updater.store().snapshot().is_none());
}

#[test]
fn test_expired_root_stops_the_refresh() {
    let mut sim = RepositorySimulator::new().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default())
        .with_clock(FixedClock::from_utc(2041, 1, 1, 0, 0, 0).unwrap());
    let err = updater.refresh().expect_err("everything expired in 2040");
    assert!(
        matches!(&err, TufError::ExpiredMetadata { role, .. } if role == "root"),
        "{err}"
    );
    assert_eq!(sim.transport.fetched_roles(), ["root", "root"]);

    // a newer root does not help if it is expired too
    sim.bump_root().unwrap();
    assert!(updater.refresh().is_err());
    assert_eq!(updater.store().root().signed.version, 2);
}

#[test]
fn test_timestamp_key_rotation_recovers_from_fast_forward() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.timestamp.version = 1000;
    sim.update_timestamp().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    updater.refresh().unwrap();
    assert_eq!(updater.store().timestamp().unwrap().signed.version, 1001);

    sim.rotate_keys("timestamp").unwrap();
    sim.bump_root().unwrap();
    sim.timestamp.version = 0;
    sim.update_timestamp().unwrap();
    updater.refresh().unwrap();
    assert_eq!(versions(updater.store()), (2, 1, 1, 1));
}

#[test]
fn test_rotated_timestamp_keys_are_honoured_when_a_later_root_fails() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.timestamp.version = 1000;
    sim.update_timestamp().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    updater.refresh().unwrap();
    assert_eq!(updater.store().timestamp().unwrap().signed.version, 1001);

    // root 2 rotates the timestamp keys, root 3 is not signed at all
    sim.rotate_keys("timestamp").unwrap();
    sim.bump_root().unwrap();
    let root_v2 = sim.signed_root_version(2).unwrap();
    sim.clear_signers("root");
    sim.bump_root().unwrap();
    let err = updater.refresh().expect_err("root 3 has no signatures");
    assert!(
        matches!(&err, TufError::ThresholdNotMet { role, .. } if role == "root"),
        "{err}"
    );
    assert_eq!(updater.store().root().signed.version, 2);
    assert!(updater.store().timestamp().is_none());

    sim.transport.remove_metadata("root", Some(3));
    sim.transport.set_latest("root", root_v2);
    sim.timestamp.version = 0;
    sim.update_timestamp().unwrap();
    updater.refresh().unwrap();
    assert_eq!(versions(updater.store()), (2, 1, 1, 1));
}

#[test]
fn test_snapshot_key_rotation_recovers_from_fast_forward() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.snapshot.version = 1000;
    sim.update_snapshot().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    updater.refresh().unwrap();
    assert_eq!(updater.store().snapshot().unwrap().signed.version, 1001);

    sim.rotate_keys("snapshot").unwrap();
    sim.rotate_keys("timestamp").unwrap();
    sim.bump_root().unwrap();
    sim.snapshot.version = 0;
    sim.timestamp.version = 0;
    sim.update_snapshot().unwrap();
    updater.refresh().unwrap();
    assert_eq!(versions(updater.store()), (2, 1, 1, 1));
}

#[test]
fn test_delegated_roles_are_reused_after_reopen() {
    let mut sim = RepositorySimulator::new().unwrap();
    add_delegations(
        &mut sim,
        &[delegation("targets", "A"), delegation("targets", "B")],
    );
    sim.add_target("B", "file.txt", b"from b").unwrap();
    sim.update_snapshot().unwrap();
    let mut first = updater(&sim, UpdaterConfig::default());
    assert_eq!(first.get_target_info("file.txt").unwrap().unwrap().role, "B");

    let verifier = SignatureVerifier::default();
    let store = TrustStore::open(first.into_store().into_storage(), &verifier).unwrap();
    let mut second =
        Updater::new(sim.transport.clone(), store, UpdaterConfig::default()).with_clock(clock());
    sim.transport.clear_fetch_log();
    let resolution = second.resolve("file.txt").unwrap();
    assert_eq!(resolution.visited, ["A", "B"]);
    assert_eq!(resolution.target.unwrap().role, "B");
    assert_eq!(sim.transport.fetched_roles(), ["root", "root", "timestamp"]);
}

#[test]
fn test_new_snapshot_reloads_delegated_roles() {
    let mut sim = RepositorySimulator::new().unwrap();
    add_delegations(&mut sim, &[delegation("targets", "A")]);
    sim.add_target("A", "v1.bin", b"v1").unwrap();
    sim.update_snapshot().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    assert!(updater.get_target_info("v1.bin").unwrap().is_some());

    sim.delegates.get_mut("A").unwrap().version = 2;
    sim.add_target("A", "v2.bin", b"v2").unwrap();
    sim.update_snapshot().unwrap();
    updater.refresh().unwrap();
    sim.transport.clear_fetch_log();
    assert_eq!(updater.fetch_and_verify_target("v2.bin").unwrap(), b"v2");
    assert_eq!(
        sim.transport.fetched_metadata(),
        [("A".to_string(), Some(2))]
    );
    assert_eq!(updater.store().delegated("A").unwrap().signed.version, 2);
}

#[test]
fn test_filesystem_storage_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = RepositorySimulator::new().unwrap();
    sim.bump_root().unwrap();
    sim.add_target("targets", "file.txt", b"content").unwrap();
    sim.update_snapshot().unwrap();

    let verifier = SignatureVerifier::default();
    let storage = FilesystemStorage::new(dir.path()).unwrap();
    let root = sim.signed_root_version(1).unwrap();
    let store = TrustStore::bootstrap(storage, &root, &verifier).unwrap();
    let mut updater =
        Updater::new(sim.transport.clone(), store, UpdaterConfig::default()).with_clock(clock());
    updater.refresh().unwrap();
    let before = versions(updater.store());
    drop(updater);

    let store = TrustStore::open(FilesystemStorage::new(dir.path()).unwrap(), &verifier).unwrap();
    assert_eq!(versions(&store), before);
    assert_eq!(store.storage().root_history().unwrap(), [1, 2]);

    let mut updater =
        Updater::new(sim.transport.clone(), store, UpdaterConfig::default()).with_clock(clock());
    sim.transport.clear_fetch_log();
    assert_eq!(updater.fetch_and_verify_target("file.txt").unwrap(), b"content");
    assert_eq!(sim.transport.fetched_roles(), ["root", "root", "timestamp"]);
}

#[test]
fn test_tampered_storage_is_not_trusted() {
    let sim = RepositorySimulator::new().unwrap();
    let mut updater = updater(&sim, UpdaterConfig::default());
    updater.refresh().unwrap();
    let mut storage = updater.into_store().into_storage();
    let mut timestamp = storage.load_metadata("timestamp").unwrap().unwrap();
    let last = timestamp.len() - 1;
    timestamp[last] ^= 0xff;
    storage.persist_metadata("timestamp", &timestamp).unwrap();

    let store = TrustStore::open(storage, &SignatureVerifier::default()).unwrap();
    assert!(store.timestamp().is_none());
    assert!(store.snapshot().is_some());
}

#[test]
fn test_bootstrap_rejects_unsigned_root() {
    let mut sim = RepositorySimulator::new().unwrap();
    sim.clear_signers("root");
    let root = sim.signed_root().unwrap();
    let err = TrustStore::bootstrap(MemoryStorage::default(), &root, &SignatureVerifier::default())
        .err()
        .unwrap();
    assert!(matches!(err, TufError::ThresholdNotMet { .. }), "{err}");
}
