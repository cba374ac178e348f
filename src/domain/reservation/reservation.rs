use serde::{Deserialize, Serialize};

use crate::domain::cluster::node_bitmap::NodeBitmap;
use crate::domain::identity::identity_list::{AccountList, UserList};
use crate::domain::reservation::reservation_flags::ReservationFlags;
use crate::domain::utils::id::{PartitionName, ReservationName};

/// End time of a reservation without expiry.
pub const INFINITE_END: i64 = i64::MAX;

/// Human readable UTC timestamp for logs.
pub fn format_time(time: i64) -> String {
    if time == INFINITE_END {
        return "INFINITE".to_string();
    }
    chrono::DateTime::from_timestamp(time, 0).map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()).unwrap_or_else(|| time.to_string())
}

/// A named, time bounded grant of nodes to a set of users and accounts.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub name: ReservationName,
    pub resv_id: u32,
    pub start_time: i64,
    pub end_time: i64,
    /// Start time before the last reschedule, reported to accounting.
    pub start_time_prev: i64,
    pub node_bitmap: Option<NodeBitmap>,
    /// Node list as requested (`ALL` or a hostlist) or as selected.
    pub node_list: Option<String>,
    pub node_count: u32,
    pub cpu_count: u32,
    pub partition: Option<PartitionName>,
    pub features: Option<String>,
    pub accounts: AccountList,
    pub users: UserList,
    pub flags: ReservationFlags,
    /// Jobs seen in the current job check sweep.
    pub job_count: u32,
}

impl Reservation {
    /// `start < other_end && other_start < end`
    pub fn window_intersects(&self, start_time: i64, end_time: i64) -> bool {
        self.start_time < end_time && start_time < self.end_time
    }

    /// Window intersects and at least one node is shared.
    pub fn overlaps(&self, start_time: i64, end_time: i64, node_bitmap: &NodeBitmap) -> bool {
        match &self.node_bitmap {
            Some(bitmap) => self.window_intersects(start_time, end_time) && bitmap.overlaps(node_bitmap),
            None => false,
        }
    }

    pub fn has_infinite_end(&self) -> bool {
        self.end_time == INFINITE_END
    }

    /// Public view, as shown to clients and as the first part of a saved record.
    pub fn to_info(&self) -> ReservationInfo {
        ReservationInfo {
            accounts: self.accounts.as_canonical().map(str::to_string),
            end_time: self.end_time,
            features: self.features.clone(),
            name: self.name.id.clone(),
            node_count: self.node_count,
            node_list: self.node_list.clone(),
            partition: self.partition.as_ref().map(|p| p.id.clone()),
            start_time: self.start_time,
            flags: self.flags.to_bits(),
            users: self.users.as_canonical().map(str::to_string),
        }
    }
}

/// Public fields of a reservation in wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationInfo {
    pub accounts: Option<String>,
    pub end_time: i64,
    pub features: Option<String>,
    pub name: String,
    pub node_count: u32,
    pub node_list: Option<String>,
    pub partition: Option<String>,
    pub start_time: i64,
    pub flags: u16,
    pub users: Option<String>,
}
