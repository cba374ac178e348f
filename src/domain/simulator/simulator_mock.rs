use crate::domain::simulator::simulator::SystemSimulator;

use std::sync::{Arc, RwLock};

/// Manually driven clock. Clones share the same time, so a test can keep one
/// handle and advance the clock the controller sees.
#[derive(Debug, Clone)]
pub struct MockSimulator {
    time: Arc<RwLock<i64>>,
}

impl MockSimulator {
    pub fn new(time: i64) -> MockSimulator {
        MockSimulator { time: Arc::new(RwLock::new(time)) }
    }

    pub fn set_current_time(&self, time: i64) {
        *self.time.write().expect("RwLock poisoned") = time;
    }

    pub fn advance(&self, seconds: i64) {
        *self.time.write().expect("RwLock poisoned") += seconds;
    }
}

impl SystemSimulator for MockSimulator {
    fn get_current_time_in_s(&self) -> i64 {
        *self.time.read().expect("RwLock poisoned")
    }

    fn get_current_time_in_ms(&self) -> i64 {
        self.get_current_time_in_s() * 1000
    }
}
