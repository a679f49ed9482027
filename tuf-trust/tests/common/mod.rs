#![allow(dead_code)]

use tuf_trust::builder::DelegatedRoleBuilder;
use tuf_trust::signature::SignatureVerifier;
use tuf_trust::simulator::RepositorySimulator;
use tuf_trust::utils::{MemoryStorage, MemoryTransport};
use tuf_trust::{FixedClock, TrustStore, Updater, UpdaterConfig};

pub type TestUpdater = Updater<MemoryTransport, MemoryStorage, FixedClock>;

/// All simulator metadata is valid at this time.
pub fn clock() -> FixedClock {
    FixedClock::from_utc(2030, 1, 1, 0, 0, 0).unwrap()
}

/// A client that trusts version 1 of the simulator's root.
pub fn updater(sim: &RepositorySimulator, config: UpdaterConfig) -> TestUpdater {
    let root = sim.signed_root_version(1).unwrap();
    let store =
        TrustStore::bootstrap(MemoryStorage::default(), &root, &SignatureVerifier::default())
            .unwrap();
    Updater::new(sim.transport.clone(), store, config).with_clock(clock())
}

/// An edge of a delegation graph.
pub struct Delegation {
    pub delegator: &'static str,
    pub name: &'static str,
    pub paths: &'static [&'static str],
    pub terminating: bool,
}

pub fn delegation(delegator: &'static str, name: &'static str) -> Delegation {
    Delegation {
        delegator,
        name,
        paths: &["*"],
        terminating: false,
    }
}

impl Delegation {
    pub fn paths(mut self, paths: &'static [&'static str]) -> Self {
        self.paths = paths;
        self
    }

    pub fn terminating(mut self) -> Self {
        self.terminating = true;
        self
    }
}

/// Adds the delegations in order and publishes a new snapshot.
pub fn add_delegations(sim: &mut RepositorySimulator, delegations: &[Delegation]) {
    for d in delegations {
        sim.add_delegation(
            d.delegator,
            DelegatedRoleBuilder::new(d.name)
                .with_paths(d.paths)
                .terminating(d.terminating),
        )
        .unwrap();
    }
    sim.update_snapshot().unwrap();
}
