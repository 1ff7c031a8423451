use crate::name_daemon::{
    init_name_meta, load_daemon_config, report_stale_nodes, NameDaemonRunOptions,
    DEFAULT_NAME_DAEMON_CONFIG_PATH,
};
use crate::parse_args;
use dfs_lib::{DfsError, StorageNodeRecord};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn write_config(tmp: &TempDir, value: serde_json::Value) -> PathBuf {
    let path = tmp.path().join("name_daemon.json");
    std::fs::write(
        &path,
        serde_json::to_string_pretty(&value).expect("serialize daemon config"),
    )
    .expect("write daemon config");
    path
}

fn node(id: &str) -> StorageNodeRecord {
    StorageNodeRecord {
        node_id: id.to_string(),
        address: format!("{}.local:9000", id),
        registered_at: 0,
        last_heartbeat: 0,
    }
}

#[test]
fn test_parse_args_defaults_and_overrides() {
    let options = parse_args(&[]).expect("parse empty args");
    assert_eq!(
        options.config_path,
        PathBuf::from(DEFAULT_NAME_DAEMON_CONFIG_PATH)
    );
    assert!(options.data_dir.is_none());

    let options = parse_args(&args(&["--config", "/etc/n.json", "--data-dir", "/var/n"]))
        .expect("parse full args");
    assert_eq!(options.config_path, PathBuf::from("/etc/n.json"));
    assert_eq!(options.data_dir, Some(PathBuf::from("/var/n")));
}

#[test]
fn test_parse_args_errors() {
    assert!(parse_args(&args(&["--help"])).is_err());
    assert!(parse_args(&args(&["--config"]))
        .unwrap_err()
        .contains("missing value"));
    assert!(parse_args(&args(&["--bogus"]))
        .unwrap_err()
        .contains("unknown argument"));
}

#[test]
fn test_load_config_with_override() {
    let tmp = TempDir::new().expect("create temp dir");
    let config_path = write_config(
        &tmp,
        serde_json::json!({
            "data_dir": "/should/be/replaced",
            "replication": 2,
            "edit_log_size_threshold": 5,
            "storage_nodes": ["10.0.0.1:9000", "10.0.0.2:9000"]
        }),
    );

    let options = NameDaemonRunOptions {
        config_path,
        data_dir: Some(tmp.path().join("meta")),
    };
    let config = load_daemon_config(&options).expect("load daemon config");
    assert_eq!(config.meta.data_dir, tmp.path().join("meta"));
    assert_eq!(config.meta.replication, 2);
    assert_eq!(config.meta.edit_log_size_threshold, 5);
    assert_eq!(config.meta.checkpoint_interval_secs, 60);
    assert_eq!(config.seed_storage_nodes.len(), 2);
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().expect("create temp dir");
    let options = NameDaemonRunOptions {
        config_path: tmp.path().join("absent.json"),
        data_dir: None,
    };
    let config = load_daemon_config(&options).expect("load default config");
    assert_eq!(config.meta.edit_log_size_threshold, 1000);
    assert!(config.seed_storage_nodes.is_empty());

    let bad = write_config(&tmp, serde_json::json!({ "block_size": 0 }));
    let options = NameDaemonRunOptions {
        config_path: bad,
        data_dir: None,
    };
    assert!(matches!(
        load_daemon_config(&options),
        Err(DfsError::InvalidParam(_))
    ));
}

#[tokio::test]
async fn test_init_registers_seed_nodes() {
    let tmp = TempDir::new().expect("create temp dir");
    let config_path = write_config(
        &tmp,
        serde_json::json!({
            "data_dir": tmp.path().join("meta"),
            "seed_storage_nodes": ["10.0.0.1:9000", "10.0.0.2:9000", "10.0.0.1:9000"]
        }),
    );
    let options = NameDaemonRunOptions {
        config_path,
        data_dir: None,
    };
    let config = load_daemon_config(&options).expect("load daemon config");
    let service = init_name_meta(&config).await.expect("init name meta");

    assert_eq!(service.registry().len().await, 2);
    let blocks = service
        .allocate_file_blocks("/x", 3 * config.meta.block_size)
        .await
        .expect("allocate blocks");
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[1].node_addresses, vec!["10.0.0.2:9000".to_string()]);
}

#[test]
fn test_report_stale_nodes_once() {
    let timeout = Duration::from_secs(30);
    let mut reported = HashSet::new();

    let first = report_stale_nodes(&mut reported, &[node("a"), node("b")], timeout);
    assert_eq!(first.len(), 2);

    // still stale: no new report
    let second = report_stale_nodes(&mut reported, &[node("a"), node("b")], timeout);
    assert!(second.is_empty());

    // b recovered, then went stale again
    report_stale_nodes(&mut reported, &[node("a")], timeout);
    let again = report_stale_nodes(&mut reported, &[node("a"), node("b")], timeout);
    assert_eq!(again, vec!["b".to_string()]);
}
