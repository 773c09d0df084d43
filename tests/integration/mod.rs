#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for VaultFS
//!
//! These tests spawn real registry, name and data services on loopback
//! sockets and drive them through the client library.

mod admission_test;
mod data_test;
mod registry_test;
mod upload_flow_test;

use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::sleep;
use vaultfs_client::StoreClient;
use vaultfs_common::{DataConfig, NameConfig};
use vaultfs_data::DataServer;
use vaultfs_name::NameServer;
use vaultfs_registry::RegistryServer;

pub const TEST_TOKEN: &str = "test-secret-token";

static NEXT_PORT: std::sync::atomic::AtomicU16 = std::sync::atomic::AtomicU16::new(31000);

pub fn get_free_port() -> u16 {
    use std::sync::atomic::Ordering;
    loop {
        let port = NEXT_PORT.fetch_add(1, Ordering::Relaxed);
        if std::net::TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return port;
        }
    }
}

/// Wait for a server to start listening
pub async fn wait_for_server(addr: &str, timeout: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Spawn a registry; returns its loopback address.
pub async fn spawn_registry(heartbeat_timeout_ms: u64) -> String {
    let port = get_free_port();
    let bind: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();
    let server = RegistryServer::new(bind, Some(TEST_TOKEN.to_owned()), heartbeat_timeout_ms);
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    let addr = format!("127.0.0.1:{port}");
    assert!(wait_for_server(&addr, Duration::from_secs(5)).await);
    addr
}

/// Spawn a data service over a fresh storage root.
pub async fn spawn_data(registries: Vec<String>) -> (String, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let mut config = DataConfig::default();
    config.server.port = get_free_port();
    config.server.advertised_host = Some("127.0.0.1".to_owned());
    config.registry.addresses = registries;
    config.storage.paths = vec![root.path().to_path_buf()];
    config.auth.token = Some(TEST_TOKEN.to_owned());

    let addr = format!("127.0.0.1:{}", config.server.port);
    let server = DataServer::new(&config).unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    assert!(wait_for_server(&addr, Duration::from_secs(5)).await);
    (addr, root)
}

/// Spawn a name service with a file metadata backend.
pub async fn spawn_name(registries: Vec<String>) -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NameConfig::default();
    config.server.port = get_free_port();
    config.server.advertised_host = Some("127.0.0.1".to_owned());
    config.registry.addresses = registries;
    config.metadata.file.path = dir.path().join("meta.log");
    config.auth.token = Some(TEST_TOKEN.to_owned());

    let addr = format!("127.0.0.1:{}", config.server.port);
    let server = NameServer::new(&config).await.unwrap();
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    assert!(wait_for_server(&addr, Duration::from_secs(5)).await);
    (addr, dir)
}

/// A full registry + name + data trio, ready for uploads.
pub struct TestCluster {
    pub name_addr: String,
    pub data_addr: String,
    _meta_dir: tempfile::TempDir,
    pub storage_root: tempfile::TempDir,
}

impl TestCluster {
    pub async fn start() -> Self {
        let registry_addr = spawn_registry(30_000).await;
        let (data_addr, storage_root) = spawn_data(vec![registry_addr.clone()]).await;
        let (name_addr, meta_dir) = spawn_name(vec![registry_addr.clone()]).await;

        // The name service only sees the data node once a pull lands after
        // the data node's first heartbeat; poll until placement works.
        let client = StoreClient::new(name_addr.clone(), Some(TEST_TOKEN.to_owned()));
        let start = std::time::Instant::now();
        loop {
            if client.request_upload_loc().await.is_ok() {
                break;
            }
            assert!(
                start.elapsed() < Duration::from_secs(25),
                "data node never became visible to the name service"
            );
            sleep(Duration::from_millis(200)).await;
        }

        Self {
            name_addr,
            data_addr,
            _meta_dir: meta_dir,
            storage_root,
        }
    }

    pub fn client(&self) -> StoreClient {
        StoreClient::new(self.name_addr.clone(), Some(TEST_TOKEN.to_owned()))
    }
}

/// Count regular files under a directory tree, split into (blobs, temps).
pub fn count_files(root: &std::path::Path) -> (usize, usize) {
    let mut blobs = 0;
    let mut temps = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                pending.push(entry.path());
            } else if entry.path().extension().is_some_and(|e| e == "tmp") {
                temps += 1;
            } else {
                blobs += 1;
            }
        }
    }
    (blobs, temps)
}
