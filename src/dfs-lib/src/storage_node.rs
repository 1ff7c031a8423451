use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNodeRecord {
    pub node_id: String,
    pub address: String,
    /// unix millis
    pub registered_at: u64,
    /// unix millis, equal to `registered_at` until the first heartbeat
    pub last_heartbeat: u64,
}
