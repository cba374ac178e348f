use crate::domain::cluster::cluster_state::ClusterState;
use crate::domain::cluster::node_bitmap::NodeBitmap;
use crate::domain::reservation::reservation_store::ReservationStore;
use crate::domain::utils::id::PartitionName;
use crate::error::{Error, Result};

/// Inputs of a count driven node selection.
#[derive(Debug, Clone)]
pub struct NodeSelectionRequest<'a> {
    pub node_count: u32,
    /// Falls back to the default partition.
    pub partition: Option<&'a str>,
    /// Single feature every selected node must carry.
    pub features: Option<&'a str>,
    pub start_time: i64,
    pub end_time: i64,
    /// Nodes never selected, e.g. the current nodes of a growing reservation.
    pub exclude: Option<&'a NodeBitmap>,
}

#[derive(Debug, Clone)]
pub struct NodeSelection {
    pub partition: PartitionName,
    pub node_bitmap: NodeBitmap,
    pub node_list: String,
}

/// Picks `node_count` nodes of the partition that no intersecting reservation
/// holds, that carry the feature and that are available.
///
/// Idle nodes are preferred. When there are not enough idle nodes the rest is
/// filled with busy nodes, lowest node index first.
pub fn select_nodes(request: &NodeSelectionRequest<'_>, cluster: &ClusterState, store: &ReservationStore) -> Result<NodeSelection> {
    let partition = match request.partition {
        Some(name) => cluster.find_part_record(name).ok_or_else(|| Error::InvalidPartitionName(name.to_string()))?,
        None => cluster.default_partition().ok_or(Error::DefaultPartitionNotSet)?,
    };

    let mut candidates = partition.node_bitmap.clone();
    candidates.and_not(&store.reserved_nodes(request.start_time, request.end_time, cluster.node_count()));

    if let Some(feature) = request.features {
        candidates.and(&cluster.feature_bitmap(feature));
    }
    if let Some(exclude) = request.exclude {
        candidates.and_not(exclude);
    }
    candidates.and(cluster.avail_node_bitmap());

    let wanted = request.node_count as usize;
    let available = candidates.count();
    if available < wanted {
        log::debug!("Reservation requests {} nodes, only {} available in partition {}", wanted, available, partition.name);
        return Err(Error::TooManyRequestedNodes { requested: request.node_count, available: available as u32 });
    }

    let mut idle = candidates.clone();
    idle.and(cluster.idle_node_bitmap());

    let selected = if idle.count() >= wanted {
        idle.pick_cnt(wanted)
    } else {
        // TODO: pick the busy nodes that become free soonest once job end times are tracked here.
        let mut busy = candidates;
        busy.and_not(&idle);
        busy.pick_cnt(wanted - idle.count()).map(|mut picked| {
            picked.or(&idle);
            picked
        })
    }
    .ok_or(Error::TooManyRequestedNodes { requested: request.node_count, available: available as u32 })?;

    let node_list = cluster.bitmap2node_name(&selected);
    Ok(NodeSelection { partition: partition.name.clone(), node_bitmap: selected, node_list })
}

/// Parameters of a resize, taken from the reservation being resized.
#[derive(Debug, Clone)]
pub struct ResizeRequest<'a> {
    pub target: u32,
    pub partition: Option<&'a str>,
    pub features: Option<&'a str>,
    pub start_time: i64,
    pub end_time: i64,
}

/// Returns `current` resized to exactly `target` nodes.
///
/// Shrinking drops idle nodes first, then the highest indexed remaining nodes.
/// Growing selects the missing nodes like a new request and adds them.
pub fn resize_node_bitmap(current: &NodeBitmap, request: &ResizeRequest<'_>, cluster: &ClusterState, store: &ReservationStore) -> Result<NodeBitmap> {
    let count = current.count();
    let target = request.target as usize;

    if count == target {
        return Ok(current.clone());
    }

    if count > target {
        let mut resized = current.clone();
        let mut idle = current.clone();
        idle.and(cluster.idle_node_bitmap());

        let drop_idle = idle.count().min(count - target);
        if let Some(dropped) = idle.pick_cnt(drop_idle) {
            resized.and_not(&dropped);
        }
        if resized.count() > target {
            resized = resized.pick_cnt(target).unwrap_or_else(|| cluster.empty_bitmap());
        }
        return Ok(resized);
    }

    let selection = select_nodes(
        &NodeSelectionRequest {
            node_count: (target - count) as u32,
            partition: request.partition,
            features: request.features,
            start_time: request.start_time,
            end_time: request.end_time,
            exclude: Some(current),
        },
        cluster,
        store,
    )?;

    let mut resized = current.clone();
    resized.or(&selection.node_bitmap);
    Ok(resized)
}
