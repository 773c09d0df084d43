//! Default ports and timing constants for VaultFS services.
//!
//! Use these constants instead of magic numbers so defaults stay consistent
//! across the services, the CLI and the client.

use std::time::Duration;

/// Default port for the registry service.
pub const DEFAULT_REGISTRY_PORT: u16 = 9500;

/// Default port for the name service.
pub const DEFAULT_NAME_PORT: u16 = 9600;

/// Default port for the data service.
pub const DEFAULT_DATA_PORT: u16 = 9700;

/// Registry considers a node dead after this much heartbeat silence.
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 30_000;

/// Registry sweep cadence for expired members.
pub const REGISTRY_SWEEP_INTERVAL: Duration = Duration::from_secs(10);

/// Data services push a heartbeat this often.
pub const DATA_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Name services push a heartbeat this often.
pub const NAME_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Name services refresh the data-node snapshot this often.
pub const DATANODE_PULL_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on connect and on any call issued under an admission
/// segment lock.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Admission reservations expire after this long without a commit.
pub const PENDING_TTL: Duration = Duration::from_secs(10 * 60);

/// Cadence of the pending-set sweeper.
pub const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Cluster-wide upload lock TTL in the relational backend.
pub const UPLOAD_LOCK_TTL: Duration = Duration::from_secs(30 * 60);

/// Cadence of the orphan-temp garbage collector.
pub const TMP_GC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// `.tmp` files older than this are reclaimed.
pub const TMP_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Client back-off after a WAIT admission reply.
pub const WAIT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Number of admission segment locks on a name service.
pub const ADMISSION_SEGMENTS: usize = 128;
