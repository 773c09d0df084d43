//! Registry heartbeat publisher
//!
//! Pushes `address|freeSpace` to every configured registry on a short-lived
//! connection. Broadcasting to all registries keeps replicas consistent
//! without any gossip between them; one dead registry never delays the
//! others.

use crate::store::BlobStore;
use futures::SinkExt;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::debug;
use vaultfs_common::constants::{CONNECT_TIMEOUT, DATA_HEARTBEAT_INTERVAL};
use vaultfs_protocol::{Command, Packet, StoreCodec};

/// Spawn the periodic publisher. The first round announces with
/// REGISTER so the node is visible before its first heartbeat tick.
pub fn spawn_publisher(
    registries: Vec<String>,
    token: Option<String>,
    advertised: String,
    store: Arc<BlobStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut command = Command::RegisterDatanode;
        let mut interval = tokio::time::interval(DATA_HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            let payload = format!("{}|{}", advertised, store.free_space());
            for registry in &registries {
                if let Err(e) = send_once(registry, command, token.clone(), &payload).await {
                    debug!("Heartbeat to {} failed: {}", registry, e);
                }
            }
            command = Command::HeartbeatDatanode;
        }
    })
}

/// One short-lived, time-bounded push.
pub(crate) async fn send_once(
    registry: &str,
    command: Command,
    token: Option<String>,
    payload: &str,
) -> std::io::Result<()> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(registry))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
    let mut framed = Framed::new(stream, StoreCodec::new());
    framed
        .send(Packet::new(command, token, payload.to_owned()))
        .await?;
    Ok(())
}
