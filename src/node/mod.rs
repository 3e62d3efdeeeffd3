pub mod node_behavior;
pub mod node_config;
pub mod node_identity;
pub mod worker_node;
