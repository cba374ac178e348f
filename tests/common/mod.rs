#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use advance_reservation::domain::accounting::accounting_sink::{AccountingReservationRecord, AccountingSink};
use advance_reservation::domain::cluster::cluster_state::ClusterState;
use advance_reservation::domain::cluster::node::NodeRecord;
use advance_reservation::domain::controller::Controller;
use advance_reservation::domain::identity::resolver::{KnownAccounts, StaticUserResolver};
use advance_reservation::domain::persistence::state_writer::ResvStateWriter;
use advance_reservation::domain::reservation::reservation_request::CreateReservationRequest;
use advance_reservation::domain::reservation::resv_manager::ResvManager;
use advance_reservation::domain::simulator::simulator_mock::MockSimulator;
use advance_reservation::domain::utils::id::ClusterName;
use advance_reservation::error::Result;

pub const NOW: i64 = 1_700_000_000;
pub const HOUR: i64 = 3_600;

pub const ALICE: u32 = 1001;
pub const BOB: u32 = 1002;
pub const CAROL: u32 = 1003;

/// tux[0-7], 8 CPUs each. tux[4-5] carry `gpu`.
/// `batch` (default, 60 minute limit) holds every node, `debug` holds tux[6-7].
pub fn cluster() -> ClusterState {
    let nodes = (0..8)
        .map(|i| {
            let node = NodeRecord::new(format!("tux{}", i), 8);
            if i == 4 || i == 5 { node.with_features(["gpu"]) } else { node }
        })
        .collect();
    let mut cluster = ClusterState::new("tux", nodes, true).unwrap();
    let batch = cluster.partition_from_hostlist("batch", "tux[0-7]").unwrap().with_max_time(60).as_default();
    let debug = cluster.partition_from_hostlist("debug", "tux[6-7]").unwrap();
    cluster.add_partition(batch);
    cluster.add_partition(debug);
    cluster
}

pub fn users() -> StaticUserResolver {
    StaticUserResolver::new().with_user("alice", ALICE).with_user("bob", BOB).with_user("carol", CAROL)
}

pub fn accounts() -> KnownAccounts {
    KnownAccounts::new(["acctA", "acctB", "acctC"])
}

/// Accounting sink keeping every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(&'static str, AccountingReservationRecord)>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<(&'static str, AccountingReservationRecord)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events.lock().unwrap().iter().filter(|(e, _)| *e == event).count()
    }
}

impl AccountingSink for RecordingSink {
    fn add_reservation(&self, record: &AccountingReservationRecord) -> Result<()> {
        self.events.lock().unwrap().push(("add", record.clone()));
        Ok(())
    }

    fn modify_reservation(&self, record: &AccountingReservationRecord) -> Result<()> {
        self.events.lock().unwrap().push(("modify", record.clone()));
        Ok(())
    }

    fn remove_reservation(&self, record: &AccountingReservationRecord) -> Result<()> {
        self.events.lock().unwrap().push(("remove", record.clone()));
        Ok(())
    }
}

/// Fresh, empty directory under the system temp dir.
pub fn state_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("resv_it_{}_{}", tag, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

pub struct Fixture {
    pub clock: MockSimulator,
    pub sink: Arc<RecordingSink>,
    pub manager: ResvManager,
    pub cluster: ClusterState,
}

/// Manager without a state writer.
pub fn fixture() -> Fixture {
    let clock = MockSimulator::new(NOW);
    let sink = Arc::new(RecordingSink::default());
    let manager = manager(&clock, sink.clone());
    Fixture { clock, sink, manager, cluster: cluster() }
}

pub fn manager(clock: &MockSimulator, sink: Arc<RecordingSink>) -> ResvManager {
    ResvManager::new(ClusterName::new("tux"), Arc::new(clock.clone()))
        .with_accounting(sink)
        .with_user_resolver(Arc::new(users()))
        .with_account_validator(Arc::new(accounts()))
        .with_resv_over_run(Some(0))
}

/// Controller persisting into `dir`.
pub fn controller(clock: &MockSimulator, sink: Arc<RecordingSink>, dir: &PathBuf) -> Controller {
    let writer = ResvStateWriter::spawn(dir).unwrap();
    Controller::new(cluster(), manager(clock, sink).with_state_writer(writer))
}

/// Reservation of `node_list` for `accounts` over [start, start + hours).
pub fn request(name: &str, accounts: &str, node_list: &str, start: i64, hours: i64) -> CreateReservationRequest {
    CreateReservationRequest {
        name: Some(name.to_string()),
        start_time: Some(start),
        end_time: Some(start + hours * HOUR),
        accounts: Some(accounts.to_string()),
        node_list: Some(node_list.to_string()),
        ..Default::default()
    }
}
