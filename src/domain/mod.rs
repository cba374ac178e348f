pub mod accounting;
pub mod cluster;
pub mod controller;
pub mod identity;
pub mod job;
pub mod persistence;
pub mod reservation;
pub mod simulator;
pub mod utils;
