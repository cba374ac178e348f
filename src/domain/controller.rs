use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::api::cluster_dto::ClusterDto;
use crate::domain::accounting::accounting_sink::{AccountingSink, LogAccountingSink};
use crate::domain::accounting::csv_sink::CsvAccountingSink;
use crate::domain::cluster::cluster_state::ClusterState;
use crate::domain::cluster::node::NodeState;
use crate::domain::cluster::node_bitmap::NodeBitmap;
use crate::domain::identity::resolver::{KnownAccounts, StaticUserResolver};
use crate::domain::job::job::JobRecord;
use crate::domain::job::job_table::JobTable;
use crate::domain::persistence::recovery::RecoverMode;
use crate::domain::persistence::state_writer::ResvStateWriter;
use crate::domain::reservation::reservation_request::{CreateReservationRequest, UpdateReservationRequest};
use crate::domain::reservation::resv_manager::ResvManager;
use crate::domain::simulator::simulator::SharedSimulator;
use crate::domain::utils::id::{ClusterName, ReservationName};
use crate::error::{Error, Result};

/// Everything guarded by the controller lock.
#[derive(Debug)]
pub struct ControllerState {
    pub cluster: ClusterState,
    pub jobs: JobTable,
    pub resv: ResvManager,
}

/// Cheap to clone handle on the controller state.
///
/// Every operation takes the lock once for its whole duration, so reservation,
/// job and node data are always seen consistently. State file writes happen on
/// the writer thread, outside the lock.
#[derive(Debug, Clone)]
pub struct Controller {
    inner: Arc<RwLock<ControllerState>>,
}

impl Controller {
    pub fn new(cluster: ClusterState, resv: ResvManager) -> Self {
        Self { inner: Arc::new(RwLock::new(ControllerState { cluster, jobs: JobTable::new(), resv })) }
    }

    /// Builds the cluster model, the state writer, the accounting sink and the
    /// identity lookups from a cluster description.
    pub fn from_dto(dto: &ClusterDto, simulator: SharedSimulator) -> Result<Self> {
        let cluster = ClusterState::try_from(dto)?;
        let writer = ResvStateWriter::spawn(&dto.state_save_location)?;
        let accounting: Arc<dyn AccountingSink> = match &dto.accounting_csv {
            Some(path) => Arc::new(CsvAccountingSink::spawn(path)?),
            None => Arc::new(LogAccountingSink),
        };

        let resv = ResvManager::new(ClusterName::new(dto.cluster_name.as_str()), simulator)
            .with_accounting(accounting)
            .with_state_writer(writer)
            .with_user_resolver(Arc::new(StaticUserResolver::from(dto)))
            .with_account_validator(Arc::new(KnownAccounts::from(dto)))
            .with_resv_over_run(dto.resv_over_run);

        log::info!(
            "Controller for cluster {} built: {} nodes, {} partitions, state in '{}'",
            dto.cluster_name,
            cluster.node_count(),
            dto.partitions.len(),
            dto.state_save_location
        );
        Ok(Self::new(cluster, resv))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ControllerState> {
        self.inner.read().expect("RwLock poisoned")
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ControllerState> {
        self.inner.write().expect("RwLock poisoned")
    }

    pub fn create_resv(&self, request: &CreateReservationRequest) -> Result<ReservationName> {
        let mut guard = self.write();
        let state = &mut *guard;
        state.resv.create_resv(request, &state.cluster)
    }

    pub fn update_resv(&self, request: &UpdateReservationRequest) -> Result<()> {
        let mut guard = self.write();
        let state = &mut *guard;
        state.resv.update_resv(request, &state.cluster)
    }

    pub fn delete_resv(&self, name: &str) -> Result<()> {
        let mut guard = self.write();
        let state = &mut *guard;
        state.resv.delete_resv(name, &state.jobs)
    }

    pub fn show_resv(&self) -> Result<Vec<u8>> {
        self.read().resv.show_resv()
    }

    /// See [`ResvManager::load_all_resv_state`].
    pub fn load_state(&self, mode: RecoverMode) -> Result<usize> {
        let mut guard = self.write();
        let state = &mut *guard;
        state.resv.load_all_resv_state(mode, &state.cluster)
    }

    /// Binds the job to the reservation it asks for and queues it.
    pub fn submit_job(&self, mut job: JobRecord) -> Result<u32> {
        let mut guard = self.write();
        guard.resv.validate_job_resv(&mut job)?;
        let job_id = job.job_id;
        if guard.jobs.insert(job).is_some() {
            log::warn!("JobId={} replaced an existing job record", job_id);
        }
        Ok(job_id)
    }

    /// Nodes the job may use starting at `when`, and the start time actually
    /// probed.
    pub fn job_test_resv(&self, job_id: u32, when: i64) -> (Result<NodeBitmap>, i64) {
        let mut guard = self.write();
        let state = &mut *guard;
        let mut when = when;
        let Some(job) = state.jobs.get_mut(job_id) else {
            return (Err(Error::ReservationInvalid(format!("JobId={} not found", job_id))), when);
        };
        let result = state.resv.job_test_resv(job, &state.cluster, &mut when);
        (result, when)
    }

    pub fn set_node_state(&self, node: &str, node_state: NodeState) -> Result<()> {
        self.write().cluster.set_node_state(node, node_state)
    }

    /// One job check sweep over all unfinished jobs. Purges reservations that
    /// ended unused and returns the jobs whose reservation is gone or over.
    pub fn run_job_resv_check(&self) -> Vec<u32> {
        let mut guard = self.write();
        let state = &mut *guard;

        state.resv.begin_job_resv_check();
        let mut failed = Vec::new();
        for job in state.jobs.iter().filter(|job| !job.state.is_finished()) {
            if let Err(e) = state.resv.job_resv_check(job) {
                log::info!("JobId={} failed reservation check: {}", job.job_id, e);
                failed.push(job.job_id);
            }
        }
        let purged = state.resv.fini_job_resv_check();
        if !purged.is_empty() {
            log::info!("Job check sweep purged {} reservations", purged.len());
        }
        failed
    }

    /// Waits for pending state writes without holding the controller lock.
    pub fn flush_state(&self) {
        let writer = self.read().resv.state_writer();
        if let Some(writer) = writer {
            writer.flush();
        }
    }
}
