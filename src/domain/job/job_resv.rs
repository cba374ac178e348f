//! Binding of jobs to reservations and the periodic job check sweep.

use crate::domain::cluster::cluster_state::ClusterState;
use crate::domain::cluster::node_bitmap::NodeBitmap;
use crate::domain::job::job::{JobRecord, TimeLimit};
use crate::domain::reservation::reservation::Reservation;
use crate::domain::reservation::resv_manager::ResvManager;
use crate::domain::reservation::reservation_flags::ReservationFlags;
use crate::domain::utils::id::ReservationName;
use crate::error::{Error, Result};

/// Stand-in for "unlimited" durations and overrun grace.
pub const ONE_YEAR_SECS: i64 = 365 * 24 * 60 * 60;

/// Later start times probed by `job_test_resv` after the first one.
pub const MAX_RESV_RETRIES: usize = 10;

/// A job may use a reservation if its user or its account is listed.
fn valid_job_access_resv(job: &JobRecord, resv: &Reservation) -> Result<()> {
    if resv.users.contains(&job.user_id) {
        return Ok(());
    }
    if let Some(account) = &job.account {
        if resv.accounts.contains_account(account) {
            return Ok(());
        }
    }
    log::warn!("Security violation, uid={} attempt to use reservation {} (JobId={})", job.user_id, resv.name, job.job_id);
    Err(Error::ReservationAccess { reservation: resv.name.id.clone(), uid: job.user_id })
}

fn requested_reservation(job: &JobRecord) -> Option<&ReservationName> {
    job.resv_name.as_ref().filter(|name| !name.is_empty())
}

impl ResvManager {
    /// Resolves the reservation a job asks for and binds its id and flags.
    /// A job asking for none is unbound.
    pub fn validate_job_resv(&self, job: &mut JobRecord) -> Result<()> {
        let Some(name) = requested_reservation(job) else {
            job.resv_name = None;
            job.resv_id = 0;
            job.resv_flags = ReservationFlags::default();
            return Ok(());
        };

        let Some(resv) = self.store.get_by_name(name.as_str()) else {
            log::info!("Reservation name not found ({})", name);
            return Err(Error::ReservationInvalid(format!("reservation {} not found", name)));
        };

        valid_job_access_resv(job, resv)?;
        job.resv_id = resv.resv_id;
        job.resv_flags = resv.flags;
        Ok(())
    }

    /// Nodes `job` may use when starting at `when`.
    ///
    /// For a job in a reservation this is the reservation's node set. Before the
    /// window `when` is moved to its start, after it `when` is moved to its end
    /// and the job is held.
    ///
    /// Other jobs get every node not held by a reservation overlapping the job's
    /// run time. If a reservation holds one of the job's required nodes, `when`
    /// moves to that reservation's end and the probe repeats, up to
    /// [`MAX_RESV_RETRIES`] times.
    pub fn job_test_resv(&self, job: &mut JobRecord, cluster: &ClusterState, when: &mut i64) -> Result<NodeBitmap> {
        if let Some(name) = requested_reservation(job) {
            let Some(resv) = self.store.get_by_name(name.as_str()) else {
                return Err(Error::ReservationInvalid(format!("reservation {} not found", name)));
            };
            valid_job_access_resv(job, resv)?;

            if *when < resv.start_time {
                *when = resv.start_time;
                return Err(Error::InvalidTimeValue(format!("reservation {} starts later", resv.name)));
            }
            if *when > resv.end_time {
                *when = resv.end_time;
                job.priority = 0;
                return Err(Error::ReservationInvalid(format!("reservation {} has ended", resv.name)));
            }
            return Ok(resv.node_bitmap.clone().unwrap_or_else(|| cluster.empty_bitmap()));
        }

        if self.store.is_empty() {
            return Ok(cluster.full_bitmap());
        }

        let duration = job_duration(job, cluster);
        for attempt in 0..=MAX_RESV_RETRIES {
            let job_start = *when;
            let job_end = job_start.saturating_add(duration);
            let mut node_bitmap = cluster.full_bitmap();
            let mut blocked_until = None;

            for resv in self.store.iter() {
                let Some(resv_bitmap) = &resv.node_bitmap else {
                    continue;
                };
                if !resv.window_intersects(job_start, job_end) {
                    continue;
                }
                if job.req_node_bitmap.as_ref().is_some_and(|required| required.overlaps(resv_bitmap)) {
                    blocked_until = Some(resv.end_time);
                    break;
                }
                node_bitmap.and_not(resv_bitmap);
            }

            match blocked_until {
                None => return Ok(node_bitmap),
                Some(resv_end) => {
                    log::debug!("JobId={} required nodes reserved until {}, attempt {}", job.job_id, resv_end, attempt);
                    *when = resv_end;
                }
            }
        }

        Err(Error::InvalidTimeValue(format!("no reservation free window found for JobId={}", job.job_id)))
    }

    /// Starts a sweep: clears every job counter and loads the overrun grace.
    pub fn begin_job_resv_check(&mut self) {
        self.over_run_secs = self.over_run_config_secs();
        for resv in self.store.iter_mut() {
            resv.job_count = 0;
        }
    }

    /// Counts `job` against its reservation. Fails if the reservation is gone
    /// or ended longer ago than the overrun grace.
    pub fn job_resv_check(&mut self, job: &JobRecord) -> Result<()> {
        let Some(name) = requested_reservation(job) else {
            return Ok(());
        };
        let now = self.now();
        let over_run = self.over_run_secs;

        let Some(resv) = self.store.get_by_name_mut(name.as_str()) else {
            log::error!("JobId {} linked to defunct reservation {}", job.job_id, name);
            return Err(Error::InvalidTimeValue(format!("reservation {} no longer exists", name)));
        };

        resv.job_count += 1;
        if resv.end_time.saturating_add(over_run) < now {
            return Err(Error::InvalidTimeValue(format!("reservation {} has ended", resv.name)));
        }
        Ok(())
    }

    /// Ends a sweep: purges reservations that ended and saw no job.
    pub fn fini_job_resv_check(&mut self) -> Vec<ReservationName> {
        let now = self.now();
        let vestigial: Vec<_> = self.store.keys().into_iter().filter(|key| self.store.get(*key).is_some_and(|resv| resv.job_count == 0 && resv.end_time <= now)).collect();

        let mut purged = Vec::new();
        for key in vestigial {
            if let Some(resv) = self.store.remove(key) {
                log::debug!("Purging vestigial reservation record {}", resv.name);
                self.post_resv_delete(&resv, now);
                purged.push(resv.name);
            }
        }

        if !purged.is_empty() {
            self.last_resv_update = now;
            self.schedule_resv_save();
        }
        purged
    }
}

fn job_duration(job: &JobRecord, cluster: &ClusterState) -> i64 {
    match job.time_limit {
        TimeLimit::Infinite => ONE_YEAR_SECS,
        TimeLimit::Minutes(minutes) => i64::from(minutes) * 60,
        TimeLimit::Unset => {
            let partition = match &job.partition {
                Some(name) => cluster.find_part_record(name.as_str()),
                None => cluster.default_partition(),
            };
            match partition.and_then(|p| p.max_time) {
                Some(minutes) => i64::from(minutes) * 60,
                None => ONE_YEAR_SECS,
            }
        }
    }
}
