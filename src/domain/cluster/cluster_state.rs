use bimap::BiMap;
use std::collections::HashMap;

use crate::api::cluster_dto::ClusterDto;
use crate::domain::cluster::hostlist::{compress_hostlist, expand_hostlist};
use crate::domain::cluster::node::{NodeRecord, NodeState};
use crate::domain::cluster::node_bitmap::NodeBitmap;
use crate::domain::cluster::partition::Partition;
use crate::domain::utils::id::{ClusterName, NodeName, PartitionName};
use crate::error::{Error, Result};

/// Node list keyword selecting every node of the cluster.
pub const ALL_NODES: &str = "ALL";

/// Live node and partition configuration the reservation engine reads from.
///
/// The node table order defines the bitmap universe: bit `i` is `nodes[i]`.
#[derive(Debug)]
pub struct ClusterState {
    pub cluster_name: ClusterName,
    nodes: Vec<NodeRecord>,
    node_index: BiMap<NodeName, usize>,
    partitions: HashMap<PartitionName, Partition>,
    default_partition: Option<PartitionName>,
    avail_node_bitmap: NodeBitmap,
    idle_node_bitmap: NodeBitmap,
    pub fast_schedule: bool,
}

impl ClusterState {
    pub fn new(cluster_name: impl Into<String>, nodes: Vec<NodeRecord>, fast_schedule: bool) -> Result<Self> {
        let mut node_index = BiMap::new();
        for (index, node) in nodes.iter().enumerate() {
            if node_index.insert_no_overwrite(node.name.clone(), index).is_err() {
                return Err(Error::ModelConstructionError(format!("Duplicate node name '{}'", node.name)));
            }
        }

        let size = nodes.len();
        let mut cluster = ClusterState {
            cluster_name: ClusterName::new(cluster_name),
            nodes,
            node_index,
            partitions: HashMap::new(),
            default_partition: None,
            avail_node_bitmap: NodeBitmap::new(size),
            idle_node_bitmap: NodeBitmap::new(size),
            fast_schedule,
        };
        cluster.rebuild_state_bitmaps();
        Ok(cluster)
    }

    /// Registers a partition. A partition flagged as default replaces the previous default.
    pub fn add_partition(&mut self, partition: Partition) {
        if partition.is_default {
            if let Some(previous) = &self.default_partition {
                if previous != &partition.name {
                    log::warn!("Default partition changed from {} to {}", previous, partition.name);
                }
            }
            self.default_partition = Some(partition.name.clone());
        }
        self.partitions.insert(partition.name.clone(), partition);
    }

    /// Builds a partition over a hostlist expression of this cluster's nodes.
    pub fn partition_from_hostlist(&self, name: &str, hostlist: &str) -> Result<Partition> {
        let bitmap = self.resolve_node_list(hostlist)?;
        Ok(Partition::new(name, bitmap))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&NodeRecord> {
        self.nodes.get(index)
    }

    pub fn node_index(&self, name: &str) -> Option<usize> {
        self.node_index.get_by_left(name).copied()
    }

    pub fn find_part_record(&self, name: &str) -> Option<&Partition> {
        self.partitions.get(name)
    }

    pub fn default_partition(&self) -> Option<&Partition> {
        self.default_partition.as_ref().and_then(|name| self.partitions.get(name))
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    /// Nodes not administratively down or drained.
    pub fn avail_node_bitmap(&self) -> &NodeBitmap {
        &self.avail_node_bitmap
    }

    /// Nodes with no running workload.
    pub fn idle_node_bitmap(&self) -> &NodeBitmap {
        &self.idle_node_bitmap
    }

    pub fn full_bitmap(&self) -> NodeBitmap {
        NodeBitmap::full(self.nodes.len())
    }

    pub fn empty_bitmap(&self) -> NodeBitmap {
        NodeBitmap::new(self.nodes.len())
    }

    /// Translates a hostlist expression into a bitmap. Every name must exist.
    pub fn node_name2bitmap(&self, expr: &str) -> Result<NodeBitmap> {
        let names = expand_hostlist(expr).map_err(Error::InvalidNodeName)?;
        if names.is_empty() {
            return Err(Error::InvalidNodeName(format!("empty node list '{}'", expr)));
        }

        let mut bitmap = self.empty_bitmap();
        for name in names {
            match self.node_index(&name) {
                Some(index) => {
                    bitmap.set(index);
                }
                None => return Err(Error::InvalidNodeName(name)),
            }
        }
        Ok(bitmap)
    }

    /// Like [`Self::node_name2bitmap`], but `ALL` selects every node.
    pub fn resolve_node_list(&self, expr: &str) -> Result<NodeBitmap> {
        if expr.trim() == ALL_NODES {
            return Ok(self.full_bitmap());
        }
        self.node_name2bitmap(expr)
    }

    /// Compressed hostlist expression of the nodes set in `bitmap`.
    pub fn bitmap2node_name(&self, bitmap: &NodeBitmap) -> String {
        compress_hostlist(bitmap.iter_set().filter_map(|index| self.node_index.get_by_right(&index)).map(|name| name.as_str()))
    }

    /// Nodes whose configured feature set contains `feature`.
    pub fn feature_bitmap(&self, feature: &str) -> NodeBitmap {
        NodeBitmap::from_indices(self.nodes.len(), self.nodes.iter().enumerate().filter(|(_, node)| node.has_feature(feature)).map(|(index, _)| index))
    }

    /// Sum of the CPUs of the nodes in `bitmap`, honoring fast scheduling.
    pub fn cpu_count(&self, bitmap: &NodeBitmap) -> u32 {
        bitmap.iter_set().filter_map(|index| self.nodes.get(index)).fold(0u32, |total, node| total.saturating_add(node.cpu_count(self.fast_schedule)))
    }

    pub fn set_node_state(&mut self, name: &str, state: NodeState) -> Result<()> {
        let index = self.node_index(name).ok_or_else(|| Error::InvalidNodeName(name.to_string()))?;
        self.nodes[index].state = state;
        self.update_state_bits(index);
        Ok(())
    }

    fn rebuild_state_bitmaps(&mut self) {
        for index in 0..self.nodes.len() {
            self.update_state_bits(index);
        }
    }

    fn update_state_bits(&mut self, index: usize) {
        let state = self.nodes[index].state;
        if state.is_available() {
            self.avail_node_bitmap.set(index);
        } else {
            self.avail_node_bitmap.clear(index);
        }
        if state.is_idle() {
            self.idle_node_bitmap.set(index);
        } else {
            self.idle_node_bitmap.clear(index);
        }
    }
}

impl TryFrom<&ClusterDto> for ClusterState {
    type Error = Error;

    fn try_from(dto: &ClusterDto) -> Result<Self> {
        let nodes = dto.nodes.iter().map(NodeRecord::from).collect();
        let mut cluster = ClusterState::new(dto.cluster_name.clone(), nodes, dto.fast_schedule)?;

        for partition_dto in &dto.partitions {
            let mut partition = cluster
                .partition_from_hostlist(&partition_dto.name, &partition_dto.nodes)
                .map_err(|e| Error::ModelConstructionError(format!("Partition {}: {}", partition_dto.name, e)))?;
            partition.max_time = partition_dto.max_time;
            partition.is_default = partition_dto.default;
            cluster.add_partition(partition);
        }

        if cluster.default_partition.is_none() {
            log::warn!("Cluster {} has no default partition configured", cluster.cluster_name);
        }
        log::info!("Cluster {} built with {} nodes and {} partitions", cluster.cluster_name, cluster.node_count(), cluster.partitions.len());

        Ok(cluster)
    }
}
