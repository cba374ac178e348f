use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" for every time-window decision in the controller.
///
/// Production code runs on [`Simulator`] bound to the wall clock; tests drive a
/// [`MockSimulator`](super::simulator_mock::MockSimulator) instead.
pub trait SystemSimulator: std::fmt::Debug + Send + Sync {
    fn get_current_time_in_s(&self) -> i64;
    fn get_current_time_in_ms(&self) -> i64;
}

pub type SharedSimulator = Arc<dyn SystemSimulator>;

#[derive(Debug)]
struct SimulatorState {
    is_simulation: bool,
    simulation_base_timestamp: i64,
    real_time_base_timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    state: Arc<Mutex<SimulatorState>>,
}

impl Simulator {
    /// Wall clock.
    pub fn real_time() -> Simulator {
        Self::with_state(false, 0)
    }

    /// Clock that starts at `simulation_start_s` and advances with real time.
    pub fn simulation(simulation_start_s: i64) -> Simulator {
        Self::with_state(true, simulation_start_s * 1000)
    }

    fn with_state(is_simulation: bool, simulation_base_timestamp: i64) -> Simulator {
        let state = SimulatorState { is_simulation, simulation_base_timestamp, real_time_base_timestamp: Self::get_system_time_ms() };
        Simulator { state: Arc::new(Mutex::new(state)) }
    }

    fn get_system_time_ms() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_millis() as i64
    }
}

impl SystemSimulator for Simulator {
    fn get_current_time_in_s(&self) -> i64 {
        self.get_current_time_in_ms() / 1000
    }

    fn get_current_time_in_ms(&self) -> i64 {
        let state = self.state.lock().expect("Simulator mutex poisoned");

        if state.is_simulation {
            let current_real = Self::get_system_time_ms();
            state.simulation_base_timestamp + (current_real - state.real_time_base_timestamp)
        } else {
            Self::get_system_time_ms()
        }
    }
}
