// name_meta holds the authoritative namespace of the controller: the in-memory tree,
// its journal + snapshot durability, and block placement over registered storage nodes.
// The transport layer only talks to NameMetaService.

pub mod block_placement;
pub mod boot;
pub mod checkpoint;
pub mod config;
pub mod journal;
pub mod name_meta_service;
pub mod namespace_tree;
pub mod node_registry;
pub mod snapshot;


pub use block_placement::{BlockPlacement, DEFAULT_BLOCK_SIZE};
pub use checkpoint::{CheckpointExecutor, CheckpointPolicy, CheckpointWorker};
pub use config::{read_json_config, NameMetaConfig};
pub use name_meta_service::NameMetaService;
pub use namespace_tree::{Directory, NamespaceTree};
pub use node_registry::NodeRegistry;
