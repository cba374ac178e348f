use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::api::cluster_dto::ClusterDto;
use crate::api::reservation_dto::ReservationRequestDto;
use crate::error::Result;

/// Parses a JSON file into a given type `T`.
///
/// Errors are converted into `crate::error::Error` variants:
/// - `Error::IoError` if the file cannot be read.
/// - `Error::DeserializationError` if the JSON is malformed.
pub fn parse_json_file<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let data = fs::read_to_string(file_path.as_ref())?;
    let parsed_data: T = serde_json::from_str(&data)?;

    Ok(parsed_data)
}

/// Loads the cluster description (nodes, partitions, identities, controller settings).
pub fn load_cluster_config(file_path: impl AsRef<Path>) -> Result<ClusterDto> {
    let path = file_path.as_ref();
    let dto: ClusterDto = parse_json_file(path)?;
    log::info!("Cluster configuration '{}' parsed: {} nodes, {} partitions.", path.display(), dto.nodes.len(), dto.partitions.len());

    Ok(dto)
}

/// Loads a batch of administrative reservation requests, applied in file order.
pub fn load_reservation_requests(file_path: impl AsRef<Path>) -> Result<Vec<ReservationRequestDto>> {
    let path = file_path.as_ref();
    let requests: Vec<ReservationRequestDto> = parse_json_file(path)?;
    log::info!("Loaded {} reservation requests from '{}'.", requests.len(), path.display());

    Ok(requests)
}
