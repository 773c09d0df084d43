//! Name service wiring
//!
//! Pure dispatch: validate the token, hand decoded frames to the
//! admission controller and serialise replies. Every hard decision lives
//! in [`crate::admission`].

use crate::admission::{Admission, AdmissionController};
use crate::discovery::{self, DatanodeSnapshot};
use crate::meta;
use crate::selector;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use vaultfs_common::{advertised_addr, token_matches, NameConfig, Result, StoreError};
use vaultfs_protocol::{Command, Packet, StoreCodec, WireEvent};

/// Name service: admission control, metadata commit and location lookup.
pub struct NameServer {
    bind: SocketAddr,
    advertised: String,
    token: Option<String>,
    registries: Vec<String>,
    admission: Arc<AdmissionController>,
    datanodes: DatanodeSnapshot,
}

impl NameServer {
    /// Build the metadata backend and admission state from configuration.
    pub async fn new(config: &NameConfig) -> Result<Self> {
        let advertised = advertised_addr(
            config.server.advertised_host.as_deref(),
            config.server.port,
        );
        let meta = meta::build(&config.metadata).await?;
        let admission = Arc::new(AdmissionController::new(meta, advertised.clone()));
        Ok(Self {
            bind: SocketAddr::from(([0, 0, 0, 0], config.server.port)),
            advertised,
            token: config.auth.token.clone(),
            registries: config.registry.addresses.clone(),
            admission,
            datanodes: discovery::empty_snapshot(),
        })
    }

    pub fn admission(&self) -> Arc<AdmissionController> {
        self.admission.clone()
    }

    /// The `host:port` this service announces to registries.
    #[must_use]
    pub fn advertised(&self) -> &str {
        &self.advertised
    }

    /// Bind and serve until the task is cancelled.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.bind).await?;
        let local = listener.local_addr()?;
        info!(
            "Name service listening on {} (advertised as {}), registries: {:?}",
            local, self.advertised, self.registries
        );

        self.admission.spawn_sweeper();
        discovery::spawn_pull(
            self.registries.clone(),
            self.token.clone(),
            self.datanodes.clone(),
        );
        discovery::spawn_push(
            self.registries.clone(),
            self.token.clone(),
            self.advertised.clone(),
        );

        loop {
            let (stream, peer) = listener.accept().await?;
            let admission = self.admission.clone();
            let datanodes = self.datanodes.clone();
            let token = self.token.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, token, admission, datanodes).await {
                    debug!("Name connection from {} ended: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    token: Option<String>,
    admission: Arc<AdmissionController>,
    datanodes: DatanodeSnapshot,
) -> Result<()> {
    let mut framed = Framed::new(stream, StoreCodec::new());

    while let Some(event) = framed.next().await {
        let packet = match event? {
            WireEvent::Packet(p) => p,
            WireEvent::Chunk { .. } => {
                // No name-service command carries a stream region.
                return Err(StoreError::Protocol("unexpected stream payload".into()));
            }
        };

        if let Some(expected) = &token {
            if !token_matches(expected, packet.token.as_deref()) {
                warn!("Rejecting name request with bad token");
                framed.send(Packet::error("Authentication Failed")).await?;
                return Err(StoreError::Authentication);
            }
        }

        match dispatch(&packet, &admission, &datanodes).await {
            Ok(reply) => framed.send(reply).await?,
            Err(e) => {
                framed.send(Packet::error(e.to_string())).await?;
                match e {
                    // Transient conditions keep the connection; the reply
                    // already told the client this request is over.
                    StoreError::Timeout(_)
                    | StoreError::Unavailable(_)
                    | StoreError::Persistence(_) => {}
                    other => return Err(other),
                }
            }
        }
    }
    Ok(())
}

async fn dispatch(
    packet: &Packet,
    admission: &AdmissionController,
    datanodes: &DatanodeSnapshot,
) -> Result<Packet> {
    match packet.command {
        Command::RequestUploadLoc => {
            let snapshot = datanodes.load();
            match selector::pick_upload_target(&snapshot) {
                Some(node) => Ok(Packet::new(
                    Command::ResponseUploadLoc,
                    None,
                    node.address.clone(),
                )),
                None => Err(StoreError::Unavailable("no Data service".into())),
            }
        }
        Command::PreUpload => {
            let hash = packet.text();
            match admission.pre_upload(&hash).await? {
                Admission::Exist { location } => {
                    Ok(Packet::new(Command::ResponseExist, None, location))
                }
                Admission::Wait => Ok(Packet::new(Command::ResponseWait, None, "")),
                Admission::Allow => Ok(Packet::new(Command::ResponseAllow, None, "OK")),
            }
        }
        Command::CommitFile => {
            let payload = packet.text();
            let (filename, hash, location) = parse_commit_payload(&payload)?;
            let storage_id = admission.commit(filename, hash, location).await?;
            Ok(Packet::new(Command::ResponseCommit, None, storage_id))
        }
        Command::RequestDownloadLoc => {
            let id = packet.text();
            match admission.resolve_download(&id).await? {
                Some((filename, hash, location)) => Ok(Packet::new(
                    Command::ResponseDownloadLoc,
                    None,
                    format!("{filename}|{hash}|{location}"),
                )),
                None => Err(StoreError::Unavailable(format!("no file for {id}"))),
            }
        }
        other => Err(StoreError::Protocol(format!(
            "unknown name command {other:?}"
        ))),
    }
}

/// `filename|hash|address`, exactly three fields.
fn parse_commit_payload(payload: &str) -> Result<(&str, &str, &str)> {
    let mut parts = payload.split('|');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(filename), Some(hash), Some(location), None)
            if !filename.is_empty() && !hash.is_empty() && !location.is_empty() =>
        {
            Ok((filename, hash, location))
        }
        _ => Err(StoreError::Validation(format!(
            "malformed commit payload: {payload:?}"
        ))),
    }
}
