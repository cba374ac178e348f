use crate::domain::controller::Controller;
use crate::domain::simulator::simulator::SharedSimulator;
use crate::error::Result;
use crate::loader::parser::load_cluster_config;

pub mod api;
pub mod domain;
pub mod error;
pub mod loader;
pub mod logger;

/// Parses the cluster description at `file_path` and builds a controller on it.
pub fn generate_controller(file_path: &str, simulator: SharedSimulator) -> Result<Controller> {
    let cluster_dto = load_cluster_config(file_path)?;
    log::info!("JSON file parsed successfully.");

    let controller = Controller::from_dto(&cluster_dto, simulator)?;
    log::info!("Controller for cluster {} constructed successfully.", cluster_dto.cluster_name);

    Ok(controller)
}
