use crate::node_registry::NodeRegistry;
use dfs_lib::{BlockAssignment, DfsError, DfsPath, DfsResult, ROOT_DIR_NAME};
use log::debug;
use std::sync::Arc;

pub const DEFAULT_BLOCK_SIZE: u64 = 64 * 1024 * 1024;
/// 64 MiB blocks up to 64 TiB per file.
pub const DEFAULT_MAX_BLOCKS_PER_FILE: u64 = 1024 * 1024;

pub fn block_count(size: u64, block_size: u64) -> u64 {
    size / block_size + u64::from(size % block_size != 0)
}

/// Split `size` bytes into fixed-size blocks and spread them round-robin over
/// `addresses`. The cursor starts at the first address for every call, so the
/// same inputs always produce the same assignment. Requests needing more than
/// `max_blocks` blocks are rejected before anything is allocated.
pub fn assign_blocks(
    base_name: &str,
    size: u64,
    block_size: u64,
    replication: usize,
    max_blocks: u64,
    addresses: &[String],
) -> DfsResult<Vec<BlockAssignment>> {
    if addresses.is_empty() {
        return Err(DfsError::NoCapacity(
            "no storage nodes available".to_string(),
        ));
    }
    if block_size == 0 {
        return Err(DfsError::InvalidParam("block size must be > 0".to_string()));
    }

    let count = block_count(size, block_size);
    if count > max_blocks {
        return Err(DfsError::InvalidParam(format!(
            "{} bytes needs {} blocks of {} bytes, limit is {}",
            size, count, block_size, max_blocks
        )));
    }

    let node_count = addresses.len();
    let copies = replication.clamp(1, node_count);
    let mut cursor = 0usize;
    let mut blocks = Vec::new();
    for index in 0..count {
        let node_addresses = (0..copies)
            .map(|k| addresses[(cursor + k) % node_count].clone())
            .collect();
        blocks.push(BlockAssignment {
            block_id: BlockAssignment::block_id_for(base_name, index),
            node_addresses,
        });
        cursor = (cursor + 1) % node_count;
    }
    Ok(blocks)
}

/// Placement over the live registry. Liveness is not checked.
pub struct BlockPlacement {
    registry: Arc<NodeRegistry>,
    block_size: u64,
    replication: usize,
    max_blocks: u64,
}

impl BlockPlacement {
    pub fn new(
        registry: Arc<NodeRegistry>,
        block_size: u64,
        replication: usize,
        max_blocks: u64,
    ) -> Self {
        Self {
            registry,
            block_size,
            replication,
            max_blocks,
        }
    }

    pub async fn allocate(&self, path: &DfsPath, size: u64) -> DfsResult<Vec<BlockAssignment>> {
        let addresses = self.registry.list_addresses().await;
        let base_name = path.file_name().unwrap_or(ROOT_DIR_NAME);
        let blocks = assign_blocks(
            base_name,
            size,
            self.block_size,
            self.replication,
            self.max_blocks,
            &addresses,
        )?;
        debug!(
            "placed {} ({} bytes) as {} blocks over {} nodes",
            path,
            size,
            blocks.len(),
            addresses.len()
        );
        Ok(blocks)
    }
}
