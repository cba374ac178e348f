use std::sync::Arc;

use crate::domain::accounting::accounting_sink::{AccountingReservationRecord, AccountingSink, LogAccountingSink};
use crate::domain::cluster::cluster_state::ClusterState;
use crate::domain::cluster::node_bitmap::NodeBitmap;
use crate::domain::identity::identity_list::{AccountList, UserList};
use crate::domain::identity::resolver::{AccountValidator, KnownAccounts, StaticUserResolver, UserResolver};
use crate::domain::job::job_table::JobTable;
use crate::domain::persistence::state_codec::{ResvStateRecord, pack_show, pack_state};
use crate::domain::persistence::state_writer::ResvStateWriter;
use crate::domain::reservation::node_selector::{NodeSelectionRequest, ResizeRequest, resize_node_bitmap, select_nodes};
use crate::domain::reservation::reservation::{INFINITE_END, Reservation, format_time};
use crate::domain::reservation::reservation_request::{CreateReservationRequest, UpdateReservationRequest};
use crate::domain::reservation::reservation_store::{ReservationKey, ReservationStore};
use crate::domain::simulator::simulator::SharedSimulator;
use crate::domain::utils::id::{ClusterName, PartitionName, ReservationName};
use crate::error::{Error, Result};

/// Seconds a requested start or end may lie in the past.
pub const RESV_TIME_SKEW: i64 = 60;

/// The id counter restarts once it passes this value.
pub const TOP_SUFFIX_WRAP: u32 = 0xffff_ff00;

/// Owns the reservation registry and everything needed to mutate it: the id
/// counter, the accounting sink, the state writer and the identity lookups.
///
/// One instance per controller, guarded by the controller lock.
#[derive(Debug)]
pub struct ResvManager {
    pub(crate) store: ReservationStore,
    pub(crate) top_suffix: u32,
    pub(crate) last_resv_update: i64,
    /// Minutes, `None` is unlimited.
    resv_over_run: Option<u32>,
    /// Overrun grace in seconds, loaded when a job check sweep begins.
    pub(crate) over_run_secs: i64,
    cluster_name: ClusterName,
    accounting: Arc<dyn AccountingSink>,
    pub(crate) writer: Option<Arc<ResvStateWriter>>,
    simulator: SharedSimulator,
    pub(crate) users: Arc<dyn UserResolver>,
    pub(crate) accounts: Arc<dyn AccountValidator>,
}

/// New window and node set of an update, committed only if it overlaps nothing.
struct StagedWindow {
    start_time: i64,
    end_time: i64,
    start_time_prev: i64,
    nodes: Option<(NodeBitmap, String)>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn check_not_past(what: &str, time: i64, now: i64) -> Result<()> {
    if time < now - RESV_TIME_SKEW {
        log::info!("Reservation request has invalid {} time {}", what, format_time(time));
        return Err(Error::InvalidTimeValue(format!("{} time {} is in the past", what, time)));
    }
    Ok(())
}

fn check_window(start_time: i64, end_time: i64) -> Result<()> {
    if end_time <= start_time {
        return Err(Error::InvalidTimeValue(format!("end time {} is not after start time {}", format_time(end_time), format_time(start_time))));
    }
    Ok(())
}

fn minutes_to_secs(minutes: u32) -> i64 {
    i64::from(minutes) * 60
}

impl ResvManager {
    pub fn new(cluster_name: ClusterName, simulator: SharedSimulator) -> Self {
        ResvManager {
            store: ReservationStore::new(),
            top_suffix: 0,
            last_resv_update: 0,
            resv_over_run: None,
            over_run_secs: 0,
            cluster_name,
            accounting: Arc::new(LogAccountingSink),
            writer: None,
            simulator,
            users: Arc::new(StaticUserResolver::new()),
            accounts: Arc::new(KnownAccounts::default()),
        }
    }

    pub fn with_accounting(mut self, accounting: Arc<dyn AccountingSink>) -> Self {
        self.accounting = accounting;
        self
    }

    pub fn with_state_writer(mut self, writer: ResvStateWriter) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    pub fn with_user_resolver(mut self, users: Arc<dyn UserResolver>) -> Self {
        self.users = users;
        self
    }

    pub fn with_account_validator(mut self, accounts: Arc<dyn AccountValidator>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Grace in minutes for jobs running past a reservation's end, `None` for unlimited.
    pub fn with_resv_over_run(mut self, minutes: Option<u32>) -> Self {
        self.resv_over_run = minutes;
        self
    }

    pub fn cluster_name(&self) -> &ClusterName {
        &self.cluster_name
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Reservation> {
        self.store.get_by_name(name)
    }

    pub fn reservations(&self) -> impl Iterator<Item = &Reservation> {
        self.store.iter()
    }

    pub fn top_suffix(&self) -> u32 {
        self.top_suffix
    }

    pub fn last_resv_update(&self) -> i64 {
        self.last_resv_update
    }

    pub fn state_writer(&self) -> Option<Arc<ResvStateWriter>> {
        self.writer.clone()
    }

    pub(crate) fn now(&self) -> i64 {
        self.simulator.get_current_time_in_s()
    }

    pub(crate) fn over_run_config_secs(&self) -> i64 {
        match self.resv_over_run {
            Some(minutes) => minutes_to_secs(minutes),
            None => crate::domain::job::job_resv::ONE_YEAR_SECS,
        }
    }

    /// Creates a reservation and returns its (possibly generated) name.
    ///
    /// Nothing is registered unless every check passes.
    pub fn create_resv(&mut self, request: &CreateReservationRequest, cluster: &ClusterState) -> Result<ReservationName> {
        log::debug!("create_resv: {}", request);
        let now = self.now();

        let start_time = match request.start_time {
            Some(start) => {
                check_not_past("start", start, now)?;
                start
            }
            None => now,
        };
        let end_time = match (request.end_time, request.duration) {
            (Some(end), _) => {
                check_not_past("end", end, now)?;
                end
            }
            (None, Some(duration)) => start_time.saturating_add(minutes_to_secs(duration)),
            (None, None) => INFINITE_END,
        };
        check_window(start_time, end_time)?;

        let mut partition = match non_empty(request.partition.as_deref()) {
            Some(name) => match cluster.find_part_record(name) {
                Some(part) => Some(part.name.clone()),
                None => {
                    log::info!("Reservation request has invalid partition {}", name);
                    return Err(Error::InvalidPartitionName(name.to_string()));
                }
            },
            None => None,
        };

        if request.accounts.is_none() && request.users.is_none() {
            log::info!("Reservation request lacks users or accounts");
            return Err(Error::InvalidAccount("reservation request lacks users or accounts".to_string()));
        }
        let mut accounts = AccountList::new();
        if let Some(expr) = &request.accounts {
            accounts.apply_accounts(expr, self.accounts.as_ref()).map_err(|e| Error::InvalidAccount(e.to_string()))?;
        }
        let mut users = UserList::new();
        if let Some(expr) = &request.users {
            users.apply_users(expr, self.users.as_ref()).map_err(|e| Error::InvalidUser(e.to_string()))?;
        }
        if accounts.is_empty() && users.is_empty() {
            return Err(Error::InvalidAccount("reservation request has empty users and accounts".to_string()));
        }

        let features = non_empty(request.features.as_deref()).map(str::to_string);
        let (node_bitmap, node_list) = match (non_empty(request.node_list.as_deref()), request.node_count) {
            (Some(list), _) => (cluster.resolve_node_list(list)?, list.to_string()),
            (None, Some(count)) if count > 0 => {
                let selection = select_nodes(
                    &NodeSelectionRequest {
                        node_count: count,
                        partition: partition.as_ref().map(PartitionName::as_str),
                        features: features.as_deref(),
                        start_time,
                        end_time,
                        exclude: None,
                    },
                    cluster,
                    &self.store,
                )?;
                partition = Some(selection.partition);
                (selection.node_bitmap, selection.node_list)
            }
            _ => {
                log::info!("Reservation request lacks node specification");
                return Err(Error::InvalidNodeName("reservation request lacks node specification".to_string()));
            }
        };

        if let Some(other) = self.store.find_overlap(start_time, end_time, &node_bitmap, None) {
            log::info!("Reservation request overlaps {}", other.name);
            return Err(Error::InvalidTimeValue(format!("reservation request overlaps {}", other.name)));
        }

        let explicit_name = non_empty(request.name.as_deref());
        if let Some(name) = explicit_name {
            if self.store.contains_name(name) {
                log::info!("Reservation request name duplication ({})", name);
                return Err(Error::ReservationInvalid(format!("reservation {} already exists", name)));
            }
        }

        self.bump_top_suffix();
        let name = match explicit_name {
            Some(name) => ReservationName::new(name),
            None => self.generate_resv_name(&accounts, &users),
        };

        let reservation = Reservation {
            name: name.clone(),
            resv_id: self.top_suffix,
            start_time,
            end_time,
            start_time_prev: start_time,
            node_count: node_bitmap.count() as u32,
            cpu_count: cluster.cpu_count(&node_bitmap),
            node_bitmap: Some(node_bitmap),
            node_list: Some(node_list),
            partition,
            features,
            accounts,
            users,
            flags: request.flags,
            job_count: 0,
        };

        self.post_resv_create(&reservation);
        log::info!(
            "Created reservation {} accounts={} users={} nodes={} start={} end={}",
            reservation.name,
            reservation.accounts.as_canonical().unwrap_or(""),
            reservation.users.as_canonical().unwrap_or(""),
            reservation.node_list.as_deref().unwrap_or(""),
            format_time(reservation.start_time),
            format_time(reservation.end_time)
        );
        self.store.insert(reservation)?;
        self.last_resv_update = now;
        self.schedule_resv_save();

        Ok(name)
    }

    /// Applies the fields present in `request` to an existing reservation.
    ///
    /// Flags, partition, accounts, features and users are applied in that order
    /// and stay applied if a later step fails. The time window and node set are
    /// staged and replace the current ones only if they overlap no other
    /// reservation. Accounting and persistence are notified in every case once
    /// the reservation was found.
    pub fn update_resv(&mut self, request: &UpdateReservationRequest, cluster: &ClusterState) -> Result<()> {
        log::debug!("update_resv: {}", request);

        if request.name.is_empty() {
            return Err(Error::ReservationInvalid("update request lacks a reservation name".to_string()));
        }
        let key = self.store.key_for_name(&request.name).ok_or_else(|| Error::ReservationInvalid(format!("reservation {} not found", request.name)))?;
        let now = self.now();

        let result = self.apply_update(key, request, cluster, now);

        if let Some(resv) = self.store.get(key) {
            log::info!(
                "Update reservation {} accounts={} users={} nodes={} start={} end={}",
                resv.name,
                resv.accounts.as_canonical().unwrap_or(""),
                resv.users.as_canonical().unwrap_or(""),
                resv.node_list.as_deref().unwrap_or(""),
                format_time(resv.start_time),
                format_time(resv.end_time)
            );
            self.post_resv_update(resv);
        }
        self.last_resv_update = now;
        self.schedule_resv_save();

        result
    }

    fn apply_update(&mut self, key: ReservationKey, request: &UpdateReservationRequest, cluster: &ClusterState, now: i64) -> Result<()> {
        self.apply_attribute_update(key, request, cluster)?;

        if !request.changes_window_or_nodes() {
            return Ok(());
        }
        let staged = self.stage_window_and_nodes(key, request, cluster, now)?;

        let resv = self.store.get_mut(key).ok_or_else(|| Error::ReservationInvalid(request.name.clone()))?;
        resv.start_time = staged.start_time;
        resv.end_time = staged.end_time;
        resv.start_time_prev = staged.start_time_prev;
        if let Some((bitmap, node_list)) = staged.nodes {
            resv.node_count = bitmap.count() as u32;
            resv.cpu_count = cluster.cpu_count(&bitmap);
            resv.node_list = Some(node_list);
            resv.node_bitmap = Some(bitmap);
        }
        Ok(())
    }

    fn apply_attribute_update(&mut self, key: ReservationKey, request: &UpdateReservationRequest, cluster: &ClusterState) -> Result<()> {
        let resv = self.store.get_mut(key).ok_or_else(|| Error::ReservationInvalid(request.name.clone()))?;

        request.flags.apply(&mut resv.flags);

        match request.partition.as_deref().map(str::trim) {
            Some("") => resv.partition = None,
            Some(name) => match cluster.find_part_record(name) {
                Some(part) => resv.partition = Some(part.name.clone()),
                None => {
                    log::info!("Reservation request has invalid partition ({})", name);
                    return Err(Error::InvalidPartitionName(name.to_string()));
                }
            },
            None => {}
        }

        if let Some(expr) = &request.accounts {
            resv.accounts.apply_accounts(expr, self.accounts.as_ref()).map_err(|e| Error::InvalidAccount(e.to_string()))?;
        }

        if let Some(features) = &request.features {
            resv.features = non_empty(Some(features)).map(str::to_string);
        }

        if let Some(expr) = &request.users {
            resv.users.apply_users(expr, self.users.as_ref()).map_err(|e| Error::InvalidUser(e.to_string()))?;
        }
        Ok(())
    }

    fn stage_window_and_nodes(&self, key: ReservationKey, request: &UpdateReservationRequest, cluster: &ClusterState, now: i64) -> Result<StagedWindow> {
        let resv = self.store.get(key).ok_or_else(|| Error::ReservationInvalid(request.name.clone()))?;

        let mut start_time = resv.start_time;
        let mut end_time = resv.end_time;
        let mut start_time_prev = resv.start_time_prev;
        if let Some(start) = request.start_time {
            check_not_past("start", start, now)?;
            start_time_prev = resv.start_time;
            start_time = start;
        }
        if let Some(end) = request.end_time {
            check_not_past("end", end, now)?;
            end_time = end;
        }
        if let Some(duration) = request.duration {
            end_time = start_time.saturating_add(minutes_to_secs(duration));
        }
        check_window(start_time, end_time)?;

        let mut nodes = match non_empty(request.node_list.as_deref()) {
            Some(list) => Some((cluster.resolve_node_list(list)?, list.to_string())),
            None => None,
        };

        if let Some(count) = request.node_count {
            if count == 0 {
                return Err(Error::InvalidNodeName("reservation node count must be positive".to_string()));
            }
            let current = match &nodes {
                Some((bitmap, _)) => bitmap.clone(),
                None => resv.node_bitmap.clone().unwrap_or_else(|| cluster.empty_bitmap()),
            };
            if current.count() != count as usize {
                let resized = resize_node_bitmap(
                    &current,
                    &ResizeRequest {
                        target: count,
                        partition: resv.partition.as_ref().map(PartitionName::as_str),
                        features: resv.features.as_deref(),
                        start_time,
                        end_time,
                    },
                    cluster,
                    &self.store,
                )?;
                let node_list = cluster.bitmap2node_name(&resized);
                nodes = Some((resized, node_list));
            }
        }

        let candidate = nodes.as_ref().map(|(bitmap, _)| bitmap).or(resv.node_bitmap.as_ref());
        if let Some(bitmap) = candidate {
            if let Some(other) = self.store.find_overlap(start_time, end_time, bitmap, Some(key)) {
                log::info!("Reservation update of {} overlaps {}", resv.name, other.name);
                return Err(Error::InvalidTimeValue(format!("reservation {} would overlap {}", resv.name, other.name)));
            }
        }

        Ok(StagedWindow { start_time, end_time, start_time_prev, nodes })
    }

    /// Removes a reservation no active job references.
    pub fn delete_resv(&mut self, name: &str, jobs: &JobTable) -> Result<()> {
        log::debug!("delete_resv: Name={}", name);

        let Some(key) = self.store.key_for_name(name) else {
            log::info!("Reservation {} not found for deletion", name);
            return Err(Error::ReservationInvalid(format!("reservation {} not found", name)));
        };
        let resv_id = self.store.get(key).map(|resv| resv.resv_id).unwrap_or_default();
        if jobs.iter().any(|job| !job.state.is_finished() && job.resv_id == resv_id) {
            return Err(Error::ReservationBusy(name.to_string()));
        }

        let now = self.now();
        if let Some(removed) = self.store.remove(key) {
            self.post_resv_delete(&removed, now);
            log::info!("Deleted reservation {}", removed.name);
        }
        self.last_resv_update = now;
        self.schedule_resv_save();
        Ok(())
    }

    /// Public fields of every reservation, packed for clients.
    pub fn show_resv(&self) -> Result<Vec<u8>> {
        let infos: Vec<_> = self.store.iter().map(Reservation::to_info).collect();
        let buffer = pack_show(self.now(), &infos)?;
        tracing::debug!(reservations = infos.len(), bytes = buffer.len(), "show_resv");
        Ok(buffer)
    }

    /// Full records as saved to disk.
    pub fn state_records(&self) -> Vec<ResvStateRecord> {
        self.store.iter().map(|resv| ResvStateRecord { info: resv.to_info(), cpu_count: resv.cpu_count, resv_id: resv.resv_id }).collect()
    }

    /// Packs the registry and hands it to the state writer. The disk write
    /// happens later, off the caller's lock.
    pub fn schedule_resv_save(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        match pack_state(self.now(), self.top_suffix, &self.state_records()) {
            Ok(data) => writer.save(data),
            Err(e) => log::error!("Can't pack reservation state: {}", e),
        }
    }

    /// Blocks until all scheduled saves completed.
    pub fn flush_state(&self) {
        if let Some(writer) = &self.writer {
            writer.flush();
        }
    }

    fn bump_top_suffix(&mut self) {
        if self.top_suffix > TOP_SUFFIX_WRAP {
            self.top_suffix = 0;
        }
        self.top_suffix += 1;
    }

    /// `<first account or user>_<suffix>`, bumping the suffix until the name is free.
    fn generate_resv_name(&mut self, accounts: &AccountList, users: &UserList) -> ReservationName {
        let prefix = accounts.first_name().or(users.first_name()).unwrap_or("resv").to_string();
        loop {
            let candidate = format!("{}_{}", prefix, self.top_suffix);
            if !self.store.contains_name(&candidate) {
                return ReservationName::new(candidate);
            }
            self.bump_top_suffix();
        }
    }

    fn post_resv_create(&self, resv: &Reservation) {
        if let Err(e) = self.accounting.add_reservation(&AccountingReservationRecord::for_create(&self.cluster_name, resv)) {
            log::error!("Accounting add of reservation {} failed: {}", resv.name, e);
        }
    }

    fn post_resv_update(&self, resv: &Reservation) {
        if let Err(e) = self.accounting.modify_reservation(&AccountingReservationRecord::for_update(&self.cluster_name, resv)) {
            log::error!("Accounting modify of reservation {} failed: {}", resv.name, e);
        }
    }

    pub(crate) fn post_resv_delete(&self, resv: &Reservation, now: i64) {
        if let Err(e) = self.accounting.remove_reservation(&AccountingReservationRecord::for_remove(&self.cluster_name, resv, now)) {
            log::error!("Accounting remove of reservation {} failed: {}", resv.name, e);
        }
    }
}
