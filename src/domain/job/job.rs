use crate::domain::cluster::node_bitmap::NodeBitmap;
use crate::domain::reservation::reservation_flags::ReservationFlags;
use crate::domain::utils::id::{PartitionName, ReservationName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Pending,
    Running,
    Suspended,
    Completed,
    Cancelled,
    Failed,
    Timeout,
    NodeFail,
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running | JobState::Suspended)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeLimit {
    /// Falls back to the partition limit.
    #[default]
    Unset,
    Minutes(u32),
    Infinite,
}

/// The parts of a job the reservation engine reads and writes.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub job_id: u32,
    pub user_id: u32,
    pub account: Option<String>,
    pub partition: Option<PartitionName>,
    /// Reservation requested by name, resolved on demand.
    pub resv_name: Option<ReservationName>,
    /// Bound reservation id, 0 when unbound.
    pub resv_id: u32,
    pub resv_flags: ReservationFlags,
    pub state: JobState,
    /// 0 is an administrative hold.
    pub priority: u32,
    pub time_limit: TimeLimit,
    /// Nodes the job must run on.
    pub req_node_bitmap: Option<NodeBitmap>,
}

impl JobRecord {
    pub fn new(job_id: u32, user_id: u32) -> Self {
        JobRecord {
            job_id,
            user_id,
            account: None,
            partition: None,
            resv_name: None,
            resv_id: 0,
            resv_flags: ReservationFlags::default(),
            state: JobState::Pending,
            priority: 1,
            time_limit: TimeLimit::Unset,
            req_node_bitmap: None,
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(PartitionName::new(partition));
        self
    }

    pub fn with_reservation(mut self, name: impl Into<String>) -> Self {
        self.resv_name = Some(ReservationName::new(name));
        self
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = state;
        self
    }

    pub fn with_time_limit(mut self, time_limit: TimeLimit) -> Self {
        self.time_limit = time_limit;
        self
    }

    pub fn with_required_nodes(mut self, bitmap: NodeBitmap) -> Self {
        self.req_node_bitmap = Some(bitmap);
        self
    }

    pub fn is_held(&self) -> bool {
        self.priority == 0
    }
}
