use dfs_lib::{DfsError, DfsResult, StorageNodeRecord};
use log::{error, info, warn};
use name_meta::{read_json_config, CheckpointWorker, NameMetaConfig, NameMetaService, NodeRegistry};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const DEFAULT_NAME_DAEMON_CONFIG_PATH: &str = "/opt/dfs/etc/name_daemon.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NameDaemonRunOptions {
    pub config_path: PathBuf,
    /// Overrides `data_dir` from the config file.
    pub data_dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct NameDaemonConfig {
    #[serde(flatten)]
    pub meta: NameMetaConfig,
    #[serde(alias = "storage_nodes", alias = "datanodes")]
    pub seed_storage_nodes: Vec<String>,
}

pub fn load_daemon_config(options: &NameDaemonRunOptions) -> DfsResult<NameDaemonConfig> {
    let mut config = if options.config_path.exists() {
        read_json_config::<NameDaemonConfig>(&options.config_path)?
    } else {
        warn!(
            "config {} not found, using defaults",
            options.config_path.display()
        );
        NameDaemonConfig::default()
    };

    if let Some(data_dir) = options.data_dir.as_ref() {
        config.meta.data_dir = data_dir.clone();
    }
    config.meta.validate()?;
    Ok(config)
}

/// Recover the namespace and register the configured storage nodes.
pub async fn init_name_meta(config: &NameDaemonConfig) -> DfsResult<Arc<NameMetaService>> {
    let registry = Arc::new(NodeRegistry::new());
    let service = NameMetaService::open(config.meta.clone(), registry).await?;

    for address in config.seed_storage_nodes.iter() {
        service.register_storage_node(address).await.map_err(|e| {
            DfsError::InvalidParam(format!("seed storage node '{}': {}", address, e))
        })?;
    }
    Ok(Arc::new(service))
}

/// Periodically log storage nodes that stopped sending heartbeats, and the ones
/// that came back. Nothing is evicted.
pub fn spawn_stale_node_monitor(
    registry: Arc<NodeRegistry>,
    timeout: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reported = HashSet::new();
        loop {
            ticker.tick().await;
            let stale = registry.stale_nodes(timeout).await;
            report_stale_nodes(&mut reported, &stale, timeout);
        }
    })
}

/// Returns the ids that became stale in this round.
pub fn report_stale_nodes(
    reported: &mut HashSet<String>,
    stale: &[StorageNodeRecord],
    timeout: Duration,
) -> Vec<String> {
    let current: HashSet<String> = stale.iter().map(|n| n.node_id.clone()).collect();

    let mut newly_stale = Vec::new();
    for node in stale {
        if !reported.contains(&node.node_id) {
            warn!(
                "storage node {} ({}) missed heartbeats for more than {:?}",
                node.node_id, node.address, timeout
            );
            newly_stale.push(node.node_id.clone());
        }
    }
    for node_id in reported.difference(&current) {
        info!("storage node {} is heartbeating again", node_id);
    }

    *reported = current;
    newly_stale
}

pub fn run_name_daemon(options: NameDaemonRunOptions) -> DfsResult<()> {
    let config = load_daemon_config(&options)?;
    let runtime = Runtime::new().map_err(|e| DfsError::Internal(e.to_string()))?;

    runtime.block_on(async move {
        let service = init_name_meta(&config).await?;

        let checkpoint_worker = CheckpointWorker::spawn(
            service.clone(),
            config.meta.checkpoint_poll_interval(),
        );
        let heartbeat_timeout = config.meta.heartbeat_timeout();
        let monitor = spawn_stale_node_monitor(
            service.registry(),
            heartbeat_timeout,
            (heartbeat_timeout / 2).max(Duration::from_secs(1)),
        );

        info!(
            "name_daemon started, data_dir={}, config={}, storage_nodes={}",
            config.meta.data_dir.display(),
            options.config_path.display(),
            config.seed_storage_nodes.len()
        );

        let signal = tokio::signal::ctrl_c().await;
        checkpoint_worker.abort();
        monitor.abort();
        if let Err(e) = signal {
            error!("wait for shutdown signal failed: {}", e);
        }

        info!("name_daemon shutting down, running final checkpoint");
        match service.checkpoint().await {
            Ok(true) => info!("final checkpoint done"),
            Ok(false) => info!("final checkpoint skipped, journal is empty"),
            Err(e) => error!("final checkpoint failed, journal kept: {}", e),
        }
        Ok::<(), DfsError>(())
    })
}
