use crate::api::cluster_dto::{NodeDto, NodeStateDto};
use crate::domain::utils::id::NodeName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Idle,
    Allocated,
    Mixed,
    Down,
    Drained,
}

impl NodeState {
    /// Not administratively disabled.
    pub fn is_available(&self) -> bool {
        !matches!(self, NodeState::Down | NodeState::Drained)
    }

    /// Available and running no workload.
    pub fn is_idle(&self) -> bool {
        matches!(self, NodeState::Idle)
    }
}

impl From<NodeStateDto> for NodeState {
    fn from(dto: NodeStateDto) -> Self {
        match dto {
            NodeStateDto::Idle => NodeState::Idle,
            NodeStateDto::Allocated => NodeState::Allocated,
            NodeStateDto::Mixed => NodeState::Mixed,
            NodeStateDto::Down => NodeState::Down,
            NodeStateDto::Drained => NodeState::Drained,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub name: NodeName,
    /// CPUs the node reported at registration.
    pub cpus: u32,
    /// CPUs from the configuration, used when fast scheduling is enabled.
    pub config_cpus: u32,
    pub features: Vec<String>,
    pub state: NodeState,
}

impl NodeRecord {
    pub fn new(name: impl Into<String>, cpus: u32) -> Self {
        NodeRecord { name: NodeName::new(name), cpus, config_cpus: cpus, features: Vec::new(), state: NodeState::Idle }
    }

    pub fn with_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    pub fn cpu_count(&self, fast_schedule: bool) -> u32 {
        if fast_schedule { self.config_cpus } else { self.cpus }
    }
}

impl From<&NodeDto> for NodeRecord {
    fn from(dto: &NodeDto) -> Self {
        NodeRecord {
            name: NodeName::new(dto.name.clone()),
            cpus: dto.cpus,
            config_cpus: dto.config_cpus.unwrap_or(dto.cpus),
            features: dto.features.clone(),
            state: dto.state.into(),
        }
    }
}
