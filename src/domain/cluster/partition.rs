use crate::domain::cluster::node_bitmap::NodeBitmap;
use crate::domain::utils::id::PartitionName;

#[derive(Debug, Clone)]
pub struct Partition {
    pub name: PartitionName,
    pub node_bitmap: NodeBitmap,
    /// Minutes, `None` is unlimited.
    pub max_time: Option<u32>,
    pub is_default: bool,
}

impl Partition {
    pub fn new(name: impl Into<String>, node_bitmap: NodeBitmap) -> Self {
        Partition { name: PartitionName::new(name), node_bitmap, max_time: None, is_default: false }
    }

    pub fn with_max_time(mut self, minutes: u32) -> Self {
        self.max_time = Some(minutes);
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn total_nodes(&self) -> usize {
        self.node_bitmap.count()
    }
}
