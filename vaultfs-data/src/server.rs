//! Data service connection handling

use crate::heartbeat;
use crate::store::{BlobStore, IngestOutcome};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use vaultfs_common::constants::{TMP_GC_INTERVAL, TMP_MAX_AGE};
use vaultfs_common::{advertised_addr, token_matches, DataConfig, Result, StoreError};
use vaultfs_protocol::{Command, Packet, StoreCodec, WireEvent};

/// Data service: blob listener plus heartbeat and GC background tasks.
pub struct DataServer {
    bind: SocketAddr,
    advertised: String,
    token: Option<String>,
    registries: Vec<String>,
    store: Arc<BlobStore>,
}

impl DataServer {
    pub fn new(config: &DataConfig) -> Result<Self> {
        let store = BlobStore::open(&config.storage.paths)?;
        let advertised = advertised_addr(
            config.server.advertised_host.as_deref(),
            config.server.port,
        );
        Ok(Self {
            bind: SocketAddr::from(([0, 0, 0, 0], config.server.port)),
            advertised,
            token: config.auth.token.clone(),
            registries: config.registry.addresses.clone(),
            store: Arc::new(store),
        })
    }

    pub fn store(&self) -> Arc<BlobStore> {
        self.store.clone()
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
            "Data service listening on {} (advertised as {})",
            local, self.advertised
        );

        heartbeat::spawn_publisher(
            self.registries.clone(),
            self.token.clone(),
            self.advertised.clone(),
            self.store.clone(),
        );

        let gc_store = self.store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TMP_GC_INTERVAL);
            // The first tick fires immediately; skip it so a restart does
            // not race uploads recovering from the previous process.
            interval.tick().await;
            loop {
                interval.tick().await;
                match gc_store.gc_sweep(TMP_MAX_AGE).await {
                    Ok(0) => {}
                    Ok(n) => info!("GC removed {} stale temp file(s)", n),
                    Err(e) => warn!("GC sweep failed: {}", e),
                }
            }
        });

        loop {
            let (stream, peer) = listener.accept().await?;
            let store = self.store.clone();
            let token = self.token.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, token, store).await {
                    debug!("Data connection from {} ended: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    token: Option<String>,
    store: Arc<BlobStore>,
) -> Result<()> {
    let mut framed = Framed::new(stream, StoreCodec::new());

    while let Some(event) = framed.next().await {
        let packet = match event? {
            WireEvent::Packet(p) => p,
            WireEvent::Chunk { .. } => {
                return Err(StoreError::Protocol("stream bytes outside an upload".into()));
            }
        };

        if let Some(expected) = &token {
            if !token_matches(expected, packet.token.as_deref()) {
                framed.send(Packet::error("Authentication Failed")).await?;
                return Err(StoreError::Authentication);
            }
        }

        match packet.command {
            Command::UploadRequest => {
                handle_upload(&mut framed, &store, &packet).await?;
            }
            Command::DownloadRequest => {
                handle_download(&mut framed, &store, &packet).await?;
            }
            other => {
                framed.send(Packet::error("Unknown Command")).await?;
                return Err(StoreError::Protocol(format!(
                    "unknown data command {other:?}"
                )));
            }
        }
    }
    Ok(())
}

async fn handle_upload(
    framed: &mut Framed<TcpStream, StoreCodec>,
    store: &BlobStore,
    packet: &Packet,
) -> Result<()> {
    let hash = packet.text();
    let mut upload = match store.begin_upload(&hash, packet.stream_len).await {
        Ok(upload) => upload,
        Err(e @ StoreError::Validation(_)) => {
            framed.send(Packet::error("non-conformant hash")).await?;
            return Err(e);
        }
        Err(e) => {
            framed.send(Packet::error("storage unavailable")).await?;
            return Err(e);
        }
    };

    while !upload.is_complete() {
        match framed.next().await {
            Some(Ok(WireEvent::Chunk { data, .. })) => {
                if let Err(e) = upload.write_chunk(&data).await {
                    upload.abort().await;
                    framed.send(Packet::error("write failed")).await?;
                    return Err(e);
                }
            }
            Some(Ok(WireEvent::Packet(_))) => {
                // The codec never yields a frame before the stream region
                // is drained; seeing one here is a codec bug.
                upload.abort().await;
                return Err(StoreError::Protocol("frame inside stream region".into()));
            }
            Some(Err(e)) => {
                upload.abort().await;
                return Err(e.into());
            }
            None => {
                // Peer went away mid-stream; no reply possible.
                debug!(
                    "Upload of {} aborted at {}/{} bytes",
                    upload.hash,
                    upload.received(),
                    packet.stream_len
                );
                upload.abort().await;
                return Ok(());
            }
        }
    }

    match store.finalize(upload).await {
        Ok(IngestOutcome::Stored) => {
            framed
                .send(Packet::new(Command::UploadResponse, None, "success"))
                .await?;
        }
        Ok(IngestOutcome::Deduplicated) => {
            framed
                .send(Packet::new(Command::UploadResponse, None, "success (dedup)"))
                .await?;
        }
        Err(e) => {
            framed.send(Packet::error("persist failed")).await?;
            return Err(e);
        }
    }
    Ok(())
}

async fn handle_download(
    framed: &mut Framed<TcpStream, StoreCodec>,
    store: &BlobStore,
    packet: &Packet,
) -> Result<()> {
    let hash = packet.text();
    let located = match store.locate(&hash).await {
        Ok(located) => located,
        Err(e @ StoreError::Validation(_)) => {
            framed.send(Packet::error("non-conformant hash")).await?;
            return Err(e);
        }
        Err(e) => {
            framed.send(Packet::error("storage unavailable")).await?;
            return Err(e);
        }
    };
    let Some((path, size)) = located else {
        framed.send(Packet::error("file not found")).await?;
        return Err(StoreError::Unavailable(format!("no blob for {hash}")));
    };

    framed
        .send(Packet::with_stream(
            Command::DownloadResponse,
            None,
            size.to_string(),
            size,
        ))
        .await?;

    // send() flushed the frame; the blob bytes ride the raw socket.
    let mut file = tokio::fs::File::open(&path).await?;
    let copied = tokio::io::copy(&mut file, framed.get_mut()).await?;
    if copied != size {
        return Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("blob {hash} truncated mid-send: {copied}/{size}"),
        )));
    }
    Ok(())
}
