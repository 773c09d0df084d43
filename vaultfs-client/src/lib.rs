//! VaultFS client library.
//!
//! One short-lived connection per request, one in-flight request per
//! connection. [`StoreClient::put_blob`] and [`StoreClient::get_blob`]
//! compose the full flows: admission against a name service, bulk
//! transfer against a data service, then commit.

pub mod cipher;

use cipher::{sha256_hex, ContentCipher};
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;
use vaultfs_common::constants::{CONNECT_TIMEOUT, WAIT_RETRY_BACKOFF};
use vaultfs_common::{Result, StoreError};
use vaultfs_protocol::{Command, Packet, StoreCodec, WireEvent};

/// Give up on a WAIT-looping upload after this many retries.
const MAX_WAIT_RETRIES: u32 = 120;

/// Admission reply as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreUploadReply {
    /// Already stored at this location; skip the transfer.
    Exist { location: String },
    /// Another writer is uploading this content; retry later.
    Wait,
    /// Go ahead and upload.
    Allow,
}

/// Client for one name service (and the data services it points at).
pub struct StoreClient {
    name_addr: String,
    token: Option<String>,
    cipher: ContentCipher,
}

impl StoreClient {
    #[must_use]
    pub fn new(name_addr: impl Into<String>, token: Option<String>) -> Self {
        Self {
            name_addr: name_addr.into(),
            token,
            cipher: ContentCipher::default(),
        }
    }

    /// Replace the deployment content key.
    #[must_use]
    pub fn with_key(mut self, key: [u8; 32]) -> Self {
        self.cipher = ContentCipher::new(key);
        self
    }

    async fn connect(addr: &str) -> Result<Framed<TcpStream, StoreCodec>> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| StoreError::Timeout(format!("connect to {addr} timed out")))?
            .map_err(|e| StoreError::Connection(format!("{addr}: {e}")))?;
        Ok(Framed::new(stream, StoreCodec::new()))
    }

    /// One request, one reply, connection dropped afterwards.
    async fn call(&self, addr: &str, command: Command, data: impl Into<Vec<u8>>) -> Result<Packet> {
        let mut framed = Self::connect(addr).await?;
        framed
            .send(Packet::new(command, self.token.clone(), data.into()))
            .await?;
        expect_packet(&mut framed).await
    }

    /// Ask the name service for an upload target.
    pub async fn request_upload_loc(&self) -> Result<String> {
        let reply = self
            .call(&self.name_addr, Command::RequestUploadLoc, Vec::new())
            .await?;
        match reply.command {
            Command::ResponseUploadLoc => Ok(reply.text()),
            _ => Err(unexpected(&reply)),
        }
    }

    /// Ask for admission to upload `hash`.
    pub async fn pre_upload(&self, hash: &str) -> Result<PreUploadReply> {
        let reply = self
            .call(&self.name_addr, Command::PreUpload, hash.as_bytes().to_vec())
            .await?;
        match reply.command {
            Command::ResponseAllow => Ok(PreUploadReply::Allow),
            Command::ResponseWait => Ok(PreUploadReply::Wait),
            Command::ResponseExist => Ok(PreUploadReply::Exist {
                location: reply.text(),
            }),
            _ => Err(unexpected(&reply)),
        }
    }

    /// Commit `(filename, hash, location)`; returns the storage id.
    pub async fn commit(&self, filename: &str, hash: &str, location: &str) -> Result<String> {
        let payload = format!("{filename}|{hash}|{location}");
        let reply = self
            .call(&self.name_addr, Command::CommitFile, payload.into_bytes())
            .await?;
        match reply.command {
            Command::ResponseCommit => Ok(reply.text()),
            _ => Err(unexpected(&reply)),
        }
    }

    /// Resolve a storage id to `(filename, hash, location)`.
    pub async fn resolve_download(&self, storage_id: &str) -> Result<(String, String, String)> {
        let reply = self
            .call(
                &self.name_addr,
                Command::RequestDownloadLoc,
                storage_id.as_bytes().to_vec(),
            )
            .await?;
        if reply.command != Command::ResponseDownloadLoc {
            return Err(unexpected(&reply));
        }
        let payload = reply.text();
        let mut parts = payload.split('|');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(filename), Some(hash), Some(location), None) => Ok((
                filename.to_owned(),
                hash.to_owned(),
                location.to_owned(),
            )),
            _ => Err(StoreError::Protocol(format!(
                "malformed download location: {payload:?}"
            ))),
        }
    }

    /// Stream an already-encrypted blob to a data service.
    pub async fn upload_blob(&self, data_addr: &str, hash: &str, body: &[u8]) -> Result<()> {
        let mut framed = Self::connect(data_addr).await?;
        framed
            .send(Packet::with_stream(
                Command::UploadRequest,
                self.token.clone(),
                hash.as_bytes().to_vec(),
                body.len() as u64,
            ))
            .await?;
        // The frame is flushed; the blob rides the raw socket.
        framed.get_mut().write_all(body).await?;
        framed.get_mut().flush().await?;

        let reply = expect_packet(&mut framed).await?;
        match reply.command {
            Command::UploadResponse => {
                debug!("Upload of {} finished: {}", hash, reply.text());
                Ok(())
            }
            _ => Err(unexpected(&reply)),
        }
    }

    /// Fetch the encrypted blob for `hash` from a data service.
    pub async fn download_blob(&self, data_addr: &str, hash: &str) -> Result<Vec<u8>> {
        let mut framed = Self::connect(data_addr).await?;
        framed
            .send(Packet::new(
                Command::DownloadRequest,
                self.token.clone(),
                hash.as_bytes().to_vec(),
            ))
            .await?;

        let header = expect_packet(&mut framed).await?;
        if header.command != Command::DownloadResponse {
            return Err(unexpected(&header));
        }
        let size = header.stream_len;
        let mut body = Vec::with_capacity(usize::try_from(size).unwrap_or(0));
        if size == 0 {
            return Ok(body);
        }
        while let Some(event) = framed.next().await {
            match event? {
                WireEvent::Chunk { data, end } => {
                    body.extend_from_slice(&data);
                    if end {
                        return Ok(body);
                    }
                }
                WireEvent::Packet(p) => return Err(unexpected(&p)),
            }
        }
        Err(StoreError::Connection(format!(
            "download of {hash} truncated at {}/{size} bytes",
            body.len()
        )))
    }

    /// Full upload flow: admission with back-off, transfer, commit.
    /// Returns the storage id; content already known to the store is
    /// committed without transferring a byte.
    pub async fn put_blob(&self, filename: &str, plaintext: &[u8]) -> Result<String> {
        let hash = sha256_hex(plaintext);
        for _ in 0..MAX_WAIT_RETRIES {
            match self.pre_upload(&hash).await? {
                PreUploadReply::Exist { location } => {
                    // Instant upload: the content is already there.
                    return self.commit(filename, &hash, &location).await;
                }
                PreUploadReply::Wait => {
                    tokio::time::sleep(WAIT_RETRY_BACKOFF).await;
                }
                PreUploadReply::Allow => {
                    let location = self.request_upload_loc().await?;
                    let mut body = plaintext.to_vec();
                    self.cipher.apply(&hash, &mut body);
                    self.upload_blob(&location, &hash, &body).await?;
                    // Commit only after the data service acknowledged
                    // durability.
                    return self.commit(filename, &hash, &location).await;
                }
            }
        }
        Err(StoreError::Timeout(format!(
            "upload of {hash} still locked by another writer"
        )))
    }

    /// Full download flow: resolve, fetch, decrypt, verify.
    /// Returns `(filename, plaintext)`.
    pub async fn get_blob(&self, storage_id: &str) -> Result<(String, Vec<u8>)> {
        let (filename, hash, location) = self.resolve_download(storage_id).await?;
        let mut body = self.download_blob(&location, &hash).await?;
        self.cipher.apply(&hash, &mut body);
        if sha256_hex(&body) != hash {
            return Err(StoreError::Validation(format!(
                "content of {storage_id} does not match its hash"
            )));
        }
        Ok((filename, body))
    }
}

async fn expect_packet(framed: &mut Framed<TcpStream, StoreCodec>) -> Result<Packet> {
    let reply = tokio::time::timeout(CONNECT_TIMEOUT, framed.next())
        .await
        .map_err(|_| StoreError::Timeout("reply timed out".into()))?
        .ok_or_else(|| StoreError::Connection("peer closed the connection".into()))??;
    match reply {
        WireEvent::Packet(p) => Ok(p),
        WireEvent::Chunk { .. } => Err(StoreError::Protocol("unexpected stream payload".into())),
    }
}

fn unexpected(reply: &Packet) -> StoreError {
    if reply.command == Command::Error {
        StoreError::Protocol(format!("peer error: {}", reply.text()))
    } else {
        StoreError::Protocol(format!("unexpected reply {:?}", reply.command))
    }
}
