//! Registry discovery
//!
//! Pull: refresh the live data-node snapshot from the first registry that
//! answers, atomically replacing the previous snapshot; total failure
//! keeps the last one. Push: announce this name service to every registry
//! so registry replicas converge without gossip.

use crate::selector::DataNode;
use arc_swap::ArcSwap;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::debug;
use vaultfs_common::constants::{
    CONNECT_TIMEOUT, DATANODE_PULL_INTERVAL, NAME_HEARTBEAT_INTERVAL,
};
use vaultfs_common::{Result, StoreError};
use vaultfs_protocol::{Command, Packet, StoreCodec, WireEvent};

/// Atomically replaceable view of the live data set.
pub type DatanodeSnapshot = Arc<ArcSwap<Vec<DataNode>>>;

#[must_use]
pub fn empty_snapshot() -> DatanodeSnapshot {
    Arc::new(ArcSwap::from_pointee(Vec::new()))
}

/// Parse `addr|free,addr|free`; malformed entries are skipped.
#[must_use]
pub fn parse_datanode_list(payload: &str) -> Vec<DataNode> {
    payload
        .split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let mut parts = entry.splitn(2, '|');
            let address = parts.next()?.to_owned();
            let free_space = parts
                .next()
                .and_then(|raw| raw.trim().parse::<i64>().ok())
                .unwrap_or(0);
            Some(DataNode {
                address,
                free_space,
            })
        })
        .collect()
}

/// Periodic snapshot refresh.
pub fn spawn_pull(
    registries: Vec<String>,
    token: Option<String>,
    snapshot: DatanodeSnapshot,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(DATANODE_PULL_INTERVAL);
        loop {
            interval.tick().await;
            let mut refreshed = false;
            for registry in &registries {
                match fetch_datanodes(registry, token.clone()).await {
                    Ok(nodes) => {
                        snapshot.store(Arc::new(nodes));
                        refreshed = true;
                        break;
                    }
                    Err(e) => debug!("Datanode pull from {} failed: {}", registry, e),
                }
            }
            if !refreshed {
                // Keep serving from the last snapshot.
                debug!("All registries unreachable; keeping previous data set");
            }
        }
    })
}

async fn fetch_datanodes(registry: &str, token: Option<String>) -> Result<Vec<DataNode>> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(registry))
        .await
        .map_err(|_| StoreError::Timeout(format!("connect to {registry} timed out")))?
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    let mut framed = Framed::new(stream, StoreCodec::new());
    framed
        .send(Packet::new(Command::GetDatanodes, token, ""))
        .await?;

    let reply = tokio::time::timeout(CONNECT_TIMEOUT, framed.next())
        .await
        .map_err(|_| StoreError::Timeout(format!("registry {registry} reply timed out")))?
        .ok_or_else(|| StoreError::Connection("registry closed the connection".into()))??;
    match reply {
        WireEvent::Packet(p) if p.command == Command::ResponseDatanodes => {
            Ok(parse_datanode_list(&p.text()))
        }
        WireEvent::Packet(p) => Err(StoreError::Protocol(format!(
            "unexpected registry reply: {:?} {}",
            p.command,
            p.text()
        ))),
        WireEvent::Chunk { .. } => Err(StoreError::Protocol("unexpected stream payload".into())),
    }
}

/// Announce this name service to every registry; REGISTER first, then
/// heartbeats.
pub fn spawn_push(
    registries: Vec<String>,
    token: Option<String>,
    advertised: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut command = Command::RegisterNamenode;
        let mut interval = tokio::time::interval(NAME_HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            for registry in &registries {
                if let Err(e) = push_once(registry, command, token.clone(), &advertised).await {
                    debug!("Name heartbeat to {} failed: {}", registry, e);
                }
            }
            command = Command::HeartbeatNamenode;
        }
    })
}

async fn push_once(
    registry: &str,
    command: Command,
    token: Option<String>,
    advertised: &str,
) -> Result<()> {
    let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(registry))
        .await
        .map_err(|_| StoreError::Timeout(format!("connect to {registry} timed out")))?
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    let mut framed = Framed::new(stream, StoreCodec::new());
    framed
        .send(Packet::new(command, token, advertised.to_owned()))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datanode_list() {
        let nodes = parse_datanode_list("a:1|100,b:2|200");
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].address, "a:1");
        assert_eq!(nodes[0].free_space, 100);
        assert_eq!(nodes[1].free_space, 200);
    }

    #[test]
    fn test_parse_tolerates_gaps_and_missing_free() {
        assert!(parse_datanode_list("").is_empty());
        let nodes = parse_datanode_list("a:1, ,b:2|junk,c:3|7");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].free_space, 0);
        assert_eq!(nodes[1].free_space, 0);
        assert_eq!(nodes[2].free_space, 7);
    }

    #[test]
    fn test_snapshot_swap() {
        let snapshot = empty_snapshot();
        assert!(snapshot.load().is_empty());
        snapshot.store(Arc::new(parse_datanode_list("a:1|5")));
        assert_eq!(snapshot.load().len(), 1);
    }
}
