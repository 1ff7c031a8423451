use dfs_lib::{unix_timestamp_ms, DfsError, DfsResult, StorageNodeRecord};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Default)]
struct RegistryInner {
    // registration order, which is also the placement order
    nodes: Vec<StorageNodeRecord>,
    by_address: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl RegistryInner {
    fn position(&self, id_or_address: &str) -> Option<usize> {
        self.by_id
            .get(id_or_address)
            .or_else(|| self.by_address.get(id_or_address))
            .copied()
    }
}

/// Known storage nodes. Guarded by its own lock, independent from the
/// namespace lock, so placement and heartbeats never wait on metadata writes.
pub struct NodeRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Register a node by address and return its id. Registering an address
    /// again returns the id minted the first time.
    pub async fn register(&self, address: &str) -> DfsResult<String> {
        let address = address.trim();
        if address.is_empty() {
            return Err(DfsError::InvalidParam(
                "storage node address is empty".to_string(),
            ));
        }

        let mut inner = self.inner.write().await;
        if let Some(idx) = inner.by_address.get(address).copied() {
            let node = &inner.nodes[idx];
            debug!(
                "storage node {} already registered as {}",
                address, node.node_id
            );
            return Ok(node.node_id.clone());
        }

        let now = unix_timestamp_ms();
        let node_id = uuid::Uuid::new_v4().to_string();
        let idx = inner.nodes.len();
        inner.nodes.push(StorageNodeRecord {
            node_id: node_id.clone(),
            address: address.to_string(),
            registered_at: now,
            last_heartbeat: now,
        });
        inner.by_address.insert(address.to_string(), idx);
        inner.by_id.insert(node_id.clone(), idx);
        info!("storage node registered: address={}, id={}", address, node_id);
        Ok(node_id)
    }

    /// Record a heartbeat from a node id (or its address). Returns whether the
    /// node was known; unknown senders are logged and otherwise ignored.
    pub async fn heartbeat(&self, id_or_address: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.position(id_or_address) {
            Some(idx) => {
                inner.nodes[idx].last_heartbeat = unix_timestamp_ms();
                true
            }
            None => {
                warn!("heartbeat from unregistered storage node {}", id_or_address);
                false
            }
        }
    }

    /// Point-in-time copy of known addresses, in registration order.
    pub async fn list_addresses(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.nodes.iter().map(|n| n.address.clone()).collect()
    }

    pub async fn list_nodes(&self) -> Vec<StorageNodeRecord> {
        self.inner.read().await.nodes.clone()
    }

    pub async fn get(&self, id_or_address: &str) -> Option<StorageNodeRecord> {
        let inner = self.inner.read().await;
        inner.position(id_or_address).map(|idx| inner.nodes[idx].clone())
    }

    /// Nodes whose last heartbeat is older than `timeout`. Advisory only.
    pub async fn stale_nodes(&self, timeout: Duration) -> Vec<StorageNodeRecord> {
        let now = unix_timestamp_ms();
        let timeout_ms = timeout.as_millis() as u64;
        let inner = self.inner.read().await;
        inner
            .nodes
            .iter()
            .filter(|n| now.saturating_sub(n.last_heartbeat) > timeout_ms)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.nodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let registry = NodeRegistry::new();
        let id1 = registry.register("10.0.0.1:9000").await.unwrap();
        let id2 = registry.register("10.0.0.2:9000").await.unwrap();
        let again = registry.register("10.0.0.1:9000").await.unwrap();

        assert_eq!(id1, again);
        assert_ne!(id1, id2);
        assert_eq!(registry.len().await, 2);
        assert_eq!(
            registry.list_addresses().await,
            vec!["10.0.0.1:9000".to_string(), "10.0.0.2:9000".to_string()]
        );
    }

    #[tokio::test]
    async fn test_register_rejects_empty_address() {
        let registry = NodeRegistry::new();
        assert!(matches!(
            registry.register("  ").await,
            Err(DfsError::InvalidParam(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_register_same_address() {
        let registry = Arc::new(NodeRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.register("10.0.0.9:9000").await.unwrap()
            }));
        }
        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_heartbeat_and_staleness() {
        let registry = NodeRegistry::new();
        let id = registry.register("10.0.0.1:9000").await.unwrap();
        registry.register("10.0.0.2:9000").await.unwrap();

        sleep(Duration::from_millis(60)).await;
        assert!(registry.heartbeat(&id).await);
        assert!(registry.heartbeat("10.0.0.2:9000").await);
        assert!(!registry.heartbeat("unknown-node").await);
        assert_eq!(registry.len().await, 2);

        let record = registry.get(&id).await.unwrap();
        assert!(record.last_heartbeat > record.registered_at);

        assert!(registry
            .stale_nodes(Duration::from_secs(60))
            .await
            .is_empty());
        sleep(Duration::from_millis(60)).await;
        registry.heartbeat(&id).await;
        let stale = registry.stale_nodes(Duration::from_millis(30)).await;
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].address, "10.0.0.2:9000");
    }
}
