//! VaultFS name service.
//!
//! The control plane of the store: pre-upload admission (dedup plus a
//! per-hash single-writer gate), durable metadata commit and location
//! lookup. Metadata lives behind one capability trait with an append-only
//! file log and a MySQL backend, fronted by an optional write-through
//! cache.

pub mod admission;
pub mod discovery;
pub mod meta;
pub mod selector;
pub mod server;

pub use admission::{Admission, AdmissionController};
pub use meta::{MetaRecord, MetaStore};
pub use selector::DataNode;
pub use server::NameServer;
