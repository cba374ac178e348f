pub mod job;
pub mod job_resv;
pub mod job_table;
