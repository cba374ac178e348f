use std::fmt;

use crate::domain::reservation::reservation::format_time;
use crate::domain::reservation::reservation_flags::{FlagUpdate, FlagsUpdate, ReservationFlags};

/// Administrative create request. Times are unix seconds, `duration` is minutes.
#[derive(Debug, Clone, Default)]
pub struct CreateReservationRequest {
    pub name: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub duration: Option<u32>,
    pub flags: ReservationFlags,
    pub partition: Option<String>,
    pub features: Option<String>,
    pub accounts: Option<String>,
    pub users: Option<String>,
    /// Hostlist expression or `ALL`.
    pub node_list: Option<String>,
    pub node_count: Option<u32>,
}

/// Selective update. `None` leaves a field unchanged, `partition: Some("")` clears it.
#[derive(Debug, Clone, Default)]
pub struct UpdateReservationRequest {
    pub name: String,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub duration: Option<u32>,
    pub flags: FlagsUpdate,
    pub partition: Option<String>,
    pub features: Option<String>,
    pub accounts: Option<String>,
    pub users: Option<String>,
    pub node_list: Option<String>,
    pub node_count: Option<u32>,
}

impl UpdateReservationRequest {
    pub fn new(name: impl Into<String>) -> Self {
        UpdateReservationRequest { name: name.into(), ..Default::default() }
    }

    pub(crate) fn changes_window_or_nodes(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some() || self.duration.is_some() || self.node_list.is_some() || self.node_count.is_some()
    }
}

fn opt_time(time: Option<i64>) -> String {
    time.map(format_time).unwrap_or_else(|| "N/A".to_string())
}

fn opt<T: fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "(null)".to_string())
}

fn duration(minutes: Option<u32>) -> i64 {
    minutes.map(i64::from).unwrap_or(-1)
}

impl fmt::Display for CreateReservationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Name={} StartTime={} EndTime={} Duration={} Flags={} NodeCnt={} NodeList={} Features={} PartitionName={} Users={} Accounts={}",
            opt(&self.name),
            opt_time(self.start_time),
            opt_time(self.end_time),
            duration(self.duration),
            self.flags,
            opt(&self.node_count),
            opt(&self.node_list),
            opt(&self.features),
            opt(&self.partition),
            opt(&self.users),
            opt(&self.accounts)
        )
    }
}

impl fmt::Display for FlagsUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        for (update, set, clear) in [(self.maint, "MAINT", "NO_MAINT"), (self.daily, "DAILY", "NO_DAILY"), (self.weekly, "WEEKLY", "NO_WEEKLY")] {
            match update {
                FlagUpdate::Set => names.push(set),
                FlagUpdate::Clear => names.push(clear),
                FlagUpdate::Unchanged => {}
            }
        }
        write!(f, "{}", names.join(","))
    }
}

impl fmt::Display for UpdateReservationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Name={} StartTime={} EndTime={} Duration={} Flags={} NodeCnt={} NodeList={} Features={} PartitionName={} Users={} Accounts={}",
            self.name,
            opt_time(self.start_time),
            opt_time(self.end_time),
            duration(self.duration),
            self.flags,
            opt(&self.node_count),
            opt(&self.node_list),
            opt(&self.features),
            opt(&self.partition),
            opt(&self.users),
            opt(&self.accounts)
        )
    }
}
