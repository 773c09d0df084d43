//! Common utilities and types for VaultFS

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod net;

pub use auth::{constant_time_eq, token_matches};
pub use config::{
    AuthConfig, CacheConfig, DataConfig, MetadataConfig, MetadataMode, MysqlConfig, NameConfig,
    RegistryConfig, ServerConfig,
};
pub use error::{Result, StoreError};
pub use net::{advertised_addr, detect_host, epoch_ms};
