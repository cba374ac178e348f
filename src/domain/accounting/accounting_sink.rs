use std::fmt::Debug;

use crate::domain::reservation::reservation::Reservation;
use crate::domain::utils::id::ClusterName;
use crate::error::Result;

/// Reservation fields the accounting database keeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountingReservationRecord {
    pub cluster: ClusterName,
    pub id: u32,
    pub nodes: Option<String>,
    pub cpus: u32,
    pub flags: u16,
    pub time_start: i64,
    pub time_end: i64,
    /// Previous start on modify, removal stamp on remove.
    pub time_start_prev: i64,
}

impl AccountingReservationRecord {
    pub fn for_create(cluster: &ClusterName, resv: &Reservation) -> Self {
        AccountingReservationRecord {
            cluster: cluster.clone(),
            id: resv.resv_id,
            nodes: resv.node_list.clone(),
            cpus: resv.cpu_count,
            flags: resv.flags.to_bits(),
            time_start: resv.start_time,
            time_end: resv.end_time,
            time_start_prev: 0,
        }
    }

    pub fn for_update(cluster: &ClusterName, resv: &Reservation) -> Self {
        AccountingReservationRecord { time_start_prev: resv.start_time_prev, ..Self::for_create(cluster, resv) }
    }

    /// Only id and start are meaningful. `now` lets the database drop records
    /// of reservations that never started.
    pub fn for_remove(cluster: &ClusterName, resv: &Reservation, now: i64) -> Self {
        AccountingReservationRecord {
            cluster: cluster.clone(),
            id: resv.resv_id,
            nodes: None,
            cpus: 0,
            flags: 0,
            time_start: resv.start_time,
            time_end: 0,
            time_start_prev: now,
        }
    }
}

/// Receives reservation lifecycle events. Failures are reported to the caller,
/// which logs them and carries on.
pub trait AccountingSink: Debug + Send + Sync {
    fn add_reservation(&self, record: &AccountingReservationRecord) -> Result<()>;
    fn modify_reservation(&self, record: &AccountingReservationRecord) -> Result<()>;
    fn remove_reservation(&self, record: &AccountingReservationRecord) -> Result<()>;
}

/// Writes lifecycle events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAccountingSink;

impl AccountingSink for LogAccountingSink {
    fn add_reservation(&self, record: &AccountingReservationRecord) -> Result<()> {
        log::info!(
            "accounting: add reservation id={} cluster={} nodes={} cpus={} flags={:#x} start={} end={}",
            record.id,
            record.cluster,
            record.nodes.as_deref().unwrap_or(""),
            record.cpus,
            record.flags,
            record.time_start,
            record.time_end
        );
        Ok(())
    }

    fn modify_reservation(&self, record: &AccountingReservationRecord) -> Result<()> {
        log::info!(
            "accounting: modify reservation id={} cluster={} nodes={} cpus={} flags={:#x} start={} end={} start_prev={}",
            record.id,
            record.cluster,
            record.nodes.as_deref().unwrap_or(""),
            record.cpus,
            record.flags,
            record.time_start,
            record.time_end,
            record.time_start_prev
        );
        Ok(())
    }

    fn remove_reservation(&self, record: &AccountingReservationRecord) -> Result<()> {
        log::info!("accounting: remove reservation id={} cluster={} start={} at={}", record.id, record.cluster, record.time_start, record.time_start_prev);
        Ok(())
    }
}
