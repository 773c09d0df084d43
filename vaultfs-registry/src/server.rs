//! Registry server loop

use crate::table::NodeTable;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use vaultfs_common::constants::REGISTRY_SWEEP_INTERVAL;
use vaultfs_common::{token_matches, Result, StoreError};
use vaultfs_protocol::{Command, Packet, StoreCodec, WireEvent};

/// Registry service: two membership tables behind one listener.
pub struct RegistryServer {
    addr: SocketAddr,
    token: Option<String>,
    datanodes: Arc<NodeTable>,
    namenodes: Arc<NodeTable>,
}

impl RegistryServer {
    #[must_use]
    pub fn new(addr: SocketAddr, token: Option<String>, heartbeat_timeout_ms: u64) -> Self {
        Self {
            addr,
            token,
            datanodes: Arc::new(NodeTable::new(heartbeat_timeout_ms)),
            namenodes: Arc::new(NodeTable::new(heartbeat_timeout_ms)),
        }
    }

    pub fn datanodes(&self) -> Arc<NodeTable> {
        self.datanodes.clone()
    }

    pub fn namenodes(&self) -> Arc<NodeTable> {
        self.namenodes.clone()
    }

    /// Bind and serve until the task is cancelled.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        let local = listener.local_addr()?;
        info!("Registry listening on {}", local);

        let sweep_data = self.datanodes.clone();
        let sweep_name = self.namenodes.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REGISTRY_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let dropped = sweep_data.sweep() + sweep_name.sweep();
                if dropped > 0 {
                    info!("Swept {} expired member(s)", dropped);
                }
            }
        });

        loop {
            let (stream, peer) = listener.accept().await?;
            let datanodes = self.datanodes.clone();
            let namenodes = self.namenodes.clone();
            let token = self.token.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, token, datanodes, namenodes).await {
                    debug!("Registry connection from {} ended: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    token: Option<String>,
    datanodes: Arc<NodeTable>,
    namenodes: Arc<NodeTable>,
) -> Result<()> {
    let mut framed = Framed::new(stream, StoreCodec::new());

    while let Some(event) = framed.next().await {
        let packet = match event? {
            WireEvent::Packet(p) => p,
            WireEvent::Chunk { .. } => {
                // No registry command carries a stream region.
                framed.send(Packet::error("unexpected stream payload")).await?;
                return Err(StoreError::Protocol("unexpected stream payload".into()));
            }
        };

        if let Some(expected) = &token {
            if !token_matches(expected, packet.token.as_deref()) {
                warn!("Rejecting registry request with bad token");
                framed.send(Packet::error("Authentication Failed")).await?;
                return Err(StoreError::Authentication);
            }
        }

        match packet.command {
            Command::RegisterDatanode | Command::HeartbeatDatanode => {
                let (address, free_space) = parse_datanode_payload(&packet.text())?;
                datanodes.upsert(&address, free_space);
            }
            Command::RegisterNamenode | Command::HeartbeatNamenode => {
                let address = packet.text();
                if address.is_empty() {
                    framed.send(Packet::error("empty address")).await?;
                    return Err(StoreError::Validation("empty address".into()));
                }
                namenodes.upsert(&address, 0);
            }
            Command::GetDatanodes => {
                let list = datanodes
                    .active()
                    .into_iter()
                    .map(|n| format!("{}|{}", n.address, n.free_space))
                    .collect::<Vec<_>>()
                    .join(",");
                framed
                    .send(Packet::new(Command::ResponseDatanodes, None, list))
                    .await?;
            }
            Command::GetNamenodes => {
                let list = namenodes
                    .active()
                    .into_iter()
                    .map(|n| n.address)
                    .collect::<Vec<_>>()
                    .join(",");
                framed
                    .send(Packet::new(Command::ResponseNamenodes, None, list))
                    .await?;
            }
            other => {
                framed.send(Packet::error("Unknown Command")).await?;
                return Err(StoreError::Protocol(format!(
                    "unknown registry command {other:?}"
                )));
            }
        }
    }
    Ok(())
}

/// `address` or `address|freeSpace`.
fn parse_datanode_payload(payload: &str) -> Result<(String, i64)> {
    let mut parts = payload.splitn(2, '|');
    let address = parts.next().unwrap_or_default().trim();
    if address.is_empty() {
        return Err(StoreError::Validation("empty address".into()));
    }
    let free_space = match parts.next() {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| StoreError::Validation(format!("bad free-space value: {raw}")))?,
        None => 0,
    };
    Ok((address.to_owned(), free_space))
}
