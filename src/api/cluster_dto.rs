use serde::{Deserialize, Serialize};

/// Root of the cluster description file.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDto {
    pub cluster_name: String,
    pub state_save_location: String,
    /// Minutes a reservation may keep running jobs past its end. Absent means unlimited.
    #[serde(default)]
    pub resv_over_run: Option<u32>,
    /// Use the configured CPU counts instead of what the nodes reported.
    #[serde(default)]
    pub fast_schedule: bool,
    /// Optional CSV file receiving reservation accounting events.
    #[serde(default)]
    pub accounting_csv: Option<String>,
    pub nodes: Vec<NodeDto>,
    pub partitions: Vec<PartitionDto>,
    #[serde(default)]
    pub users: Vec<UserDto>,
    /// Known bank accounts. An empty list accepts any well-formed account name.
    #[serde(default)]
    pub accounts: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDto {
    pub name: String,
    pub cpus: u32,
    #[serde(default)]
    pub config_cpus: Option<u32>,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub state: NodeStateDto,
}

#[derive(Debug, Deserialize, Clone, Copy, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeStateDto {
    #[default]
    Idle,
    Allocated,
    Mixed,
    Down,
    Drained,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionDto {
    pub name: String,
    /// Hostlist expression, e.g. `tux[0-15]`.
    pub nodes: String,
    /// Minutes. Absent means unlimited.
    #[serde(default)]
    pub max_time: Option<u32>,
    #[serde(default)]
    pub default: bool,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub name: String,
    pub uid: u32,
}
