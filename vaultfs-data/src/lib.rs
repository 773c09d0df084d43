//! VaultFS data service.
//!
//! Stores blobs under a deterministic hash-derived path and serves them
//! back over the wire protocol. Ingest goes through a unique temp file and
//! an atomic rename so concurrent uploads of the same content can never
//! corrupt each other.

pub mod heartbeat;
pub mod server;
pub mod store;

pub use server::DataServer;
pub use store::{BlobStore, IngestOutcome};
