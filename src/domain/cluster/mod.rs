pub mod cluster_state;
pub mod hostlist;
pub mod node;
pub mod node_bitmap;
pub mod partition;
