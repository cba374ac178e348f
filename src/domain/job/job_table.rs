use std::collections::BTreeMap;

use crate::domain::job::job::{JobRecord, JobState};

/// Jobs known to the controller, ordered by id.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<u32, JobRecord>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the job with the same id.
    pub fn insert(&mut self, job: JobRecord) -> Option<JobRecord> {
        self.jobs.insert(job.job_id, job)
    }

    pub fn get(&self, job_id: u32) -> Option<&JobRecord> {
        self.jobs.get(&job_id)
    }

    pub fn get_mut(&mut self, job_id: u32) -> Option<&mut JobRecord> {
        self.jobs.get_mut(&job_id)
    }

    pub fn remove(&mut self, job_id: u32) -> Option<JobRecord> {
        self.jobs.remove(&job_id)
    }

    /// Returns false if the job is unknown.
    pub fn set_state(&mut self, job_id: u32, state: JobState) -> bool {
        match self.jobs.get_mut(&job_id) {
            Some(job) => {
                job.state = state;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobRecord> {
        self.jobs.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut JobRecord> {
        self.jobs.values_mut()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
