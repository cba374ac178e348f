use std::time::Instant;

use crate::domain::cluster::cluster_state::ClusterState;
use crate::domain::identity::identity_list::{AccountList, UserList};
use crate::domain::persistence::state_codec::{ResvStateRecord, unpack_state};
use crate::domain::reservation::reservation::{Reservation, ReservationInfo};
use crate::domain::reservation::reservation_flags::ReservationFlags;
use crate::domain::reservation::resv_manager::ResvManager;
use crate::domain::utils::id::ReservationName;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverMode {
    /// Re-check the reservations in memory against the current configuration.
    Validate,
    /// Drop the reservations in memory and reload them from the state file.
    Recover,
}

/// Numeric suffix after the last `_` of a reservation name.
fn name_suffix(name: &str) -> Option<u32> {
    name.rsplit_once('_').and_then(|(_, suffix)| suffix.parse().ok())
}

impl ResvManager {
    /// Rebuilds or re-checks the registry. Records no longer valid for the
    /// current cluster configuration are purged.
    ///
    /// Returns the number of reservations held afterwards. A state file with an
    /// unknown version leaves the registry empty, a truncated one keeps every
    /// complete record; both are reported as errors.
    pub fn load_all_resv_state(&mut self, mode: RecoverMode, cluster: &ClusterState) -> Result<usize> {
        let result = match mode {
            RecoverMode::Validate => {
                self.validate_all_reservations(cluster);
                Ok(self.store.len())
            }
            RecoverMode::Recover => self.recover_from_disk(cluster),
        };
        self.last_resv_update = self.now();
        result
    }

    fn validate_all_reservations(&mut self, cluster: &ClusterState) {
        for key in self.store.keys() {
            let Some(resv) = self.store.get(key) else {
                continue;
            };
            let record = ResvStateRecord { info: resv.to_info(), cpu_count: resv.cpu_count, resv_id: resv.resv_id };
            let (start_time_prev, job_count) = (resv.start_time_prev, resv.job_count);

            match self.validate_one_reservation(&record, cluster) {
                Ok(mut validated) => {
                    validated.start_time_prev = start_time_prev;
                    validated.job_count = job_count;
                    if let Some(slot) = self.store.get_mut(key) {
                        *slot = validated;
                    }
                }
                Err(reason) => {
                    if let Some(purged) = self.store.remove(key) {
                        log::error!("Purging invalid reservation record {}: {}", purged.name, reason);
                    }
                }
            }
        }
    }

    fn recover_from_disk(&mut self, cluster: &ClusterState) -> Result<usize> {
        let started = Instant::now();
        self.flush_state();
        self.store.clear();

        let Some(writer) = self.writer.clone() else {
            log::info!("No reservation state save location configured, nothing to recover");
            return Ok(0);
        };
        let Some(bytes) = writer.read_state()? else {
            log::info!("No reservation state file ({}) to recover", writer.paths().reg_file.display());
            return Ok(0);
        };

        let state = match unpack_state(&bytes) {
            Ok(state) => state,
            Err(e @ Error::IncompatibleStateVersion { .. }) => {
                tracing::error!("***********************************************");
                tracing::error!("Can not recover reservation state, data version incompatible");
                tracing::error!("***********************************************");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.top_suffix = self.top_suffix.max(state.top_suffix);
        for record in &state.records {
            match self.validate_one_reservation(record, cluster) {
                Ok(resv) => {
                    if let Some(suffix) = name_suffix(resv.name.as_str()) {
                        self.top_suffix = self.top_suffix.max(suffix);
                    }
                    if let Err(e) = self.store.insert(resv) {
                        log::error!("Purging invalid reservation record {}: {}", record.info.name, e);
                    }
                }
                Err(reason) => log::error!("Purging invalid reservation record {}: {}", record.info.name, reason),
            }
        }

        let recovered = self.store.len();
        tracing::debug!(records = state.records.len(), recovered, elapsed_us = started.elapsed().as_micros() as u64, "load_all_resv_state");
        if state.truncated {
            log::error!("Incomplete reservation data checkpoint file");
            return Err(Error::IncompleteState { recovered });
        }
        log::info!("Recovered state of {} reservations", recovered);
        Ok(recovered)
    }

    /// Rebuilds a reservation from its saved fields against the live cluster
    /// configuration. Fails with the reason if anything no longer resolves.
    pub(crate) fn validate_one_reservation(&self, record: &ResvStateRecord, cluster: &ClusterState) -> std::result::Result<Reservation, String> {
        let info: &ReservationInfo = &record.info;
        if info.name.is_empty() {
            return Err("reservation has no name".to_string());
        }

        let partition = match info.partition.as_deref().filter(|p| !p.is_empty()) {
            Some(name) => match cluster.find_part_record(name) {
                Some(part) => Some(part.name.clone()),
                None => return Err(format!("invalid partition ({})", name)),
            },
            None => None,
        };

        let mut accounts = AccountList::new();
        if let Some(expr) = info.accounts.as_deref().filter(|a| !a.is_empty()) {
            accounts.apply_accounts(expr, self.accounts.as_ref()).map_err(|e| format!("invalid accounts ({}): {}", expr, e))?;
        }
        let mut users = UserList::new();
        if let Some(expr) = info.users.as_deref().filter(|u| !u.is_empty()) {
            users.apply_users(expr, self.users.as_ref()).map_err(|e| format!("invalid users ({}): {}", expr, e))?;
        }

        let node_bitmap = match info.node_list.as_deref().filter(|n| !n.is_empty()) {
            Some(list) => Some(cluster.resolve_node_list(list).map_err(|e| format!("invalid nodes ({}): {}", list, e))?),
            None => None,
        };
        let (node_count, cpu_count) = match &node_bitmap {
            Some(bitmap) => (bitmap.count() as u32, cluster.cpu_count(bitmap)),
            None => (info.node_count, record.cpu_count),
        };

        Ok(Reservation {
            name: ReservationName::new(info.name.as_str()),
            resv_id: record.resv_id,
            start_time: info.start_time,
            end_time: info.end_time,
            start_time_prev: info.start_time,
            node_bitmap,
            node_list: info.node_list.clone(),
            node_count,
            cpu_count,
            partition,
            features: info.features.clone(),
            accounts,
            users,
            flags: ReservationFlags::from_bits(info.flags),
            job_count: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::node::NodeRecord;
    use crate::domain::persistence::state_file::write_state_file;
    use crate::domain::persistence::state_writer::ResvStateWriter;
    use crate::domain::simulator::simulator_mock::MockSimulator;
    use crate::domain::utils::id::ClusterName;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn cluster() -> ClusterState {
        let nodes = (0..4).map(|i| NodeRecord::new(format!("tux{}", i), 8)).collect();
        let mut cluster = ClusterState::new("tux", nodes, true).unwrap();
        let batch = cluster.partition_from_hostlist("batch", "tux[0-3]").unwrap().as_default();
        cluster.add_partition(batch);
        cluster
    }

    fn state_dir(tag: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("resv_recovery_{}_{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_name_suffix() {
        assert_eq!(name_suffix("acctA_17"), Some(17));
        assert_eq!(name_suffix("maint_window_3"), Some(3));
        assert_eq!(name_suffix("maint"), None);
        assert_eq!(name_suffix("acct_x"), None);
    }

    #[test]
    #[traced_test]
    fn test_incompatible_version_logs_banner_and_leaves_registry_empty() {
        let dir = state_dir("version");
        let writer = ResvStateWriter::spawn(&dir).unwrap();

        let mut bytes = Vec::new();
        bincode::serialize_into(&mut bytes, "VER999").unwrap();
        write_state_file(writer.paths(), &bytes).unwrap();

        let mut manager = ResvManager::new(ClusterName::new("tux"), Arc::new(MockSimulator::new(1_000))).with_state_writer(writer);
        let result = manager.load_all_resv_state(RecoverMode::Recover, &cluster());

        assert!(matches!(result, Err(Error::IncompatibleStateVersion { .. })));
        assert!(manager.is_empty());
        assert!(logs_contain("data version incompatible"));

        drop(manager);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
