//! Configuration model for the three services.
//!
//! Each service loads one YAML document. All fields default so a minimal
//! file (or none at all) yields a runnable local configuration.
//! `registry.addresses` accepts either a YAML list or a single
//! comma-separated string.

use crate::constants::{
    DEFAULT_DATA_PORT, DEFAULT_HEARTBEAT_TIMEOUT_MS, DEFAULT_NAME_PORT, DEFAULT_REGISTRY_PORT,
};
use crate::error::{Result, StoreError};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Listener settings shared by all services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Address other nodes should dial. Detected from the outbound
    /// interface when unset.
    pub advertised_host: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0,
            advertised_host: None,
        }
    }
}

/// Shared bearer token. Every frame a service accepts must carry it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryPeers {
    #[serde(deserialize_with = "list_or_csv")]
    pub addresses: Vec<String>,
}

impl Default for RegistryPeers {
    fn default() -> Self {
        Self {
            addresses: vec![format!("127.0.0.1:{DEFAULT_REGISTRY_PORT}")],
        }
    }
}

/// `addresses: [a:1, b:2]` and `addresses: "a:1,b:2"` both parse.
fn list_or_csv<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Csv(String),
    }
    let parsed = match Raw::deserialize(deserializer)? {
        Raw::List(list) => list,
        Raw::Csv(csv) => csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
    };
    Ok(parsed)
}

/// Metadata backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataMode {
    File,
    Mysql,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileBackendConfig {
    /// Append-only metadata log, replayed on startup.
    pub path: PathBuf,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("metadata.log"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3306,
            database: "vaultfs".into(),
            user: "vaultfs".into(),
            password: String::new(),
        }
    }
}

impl MysqlConfig {
    /// Connection URL for the pool.
    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.database
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_size: u64,
    /// Only `write-through` is implemented; other values are accepted and
    /// behave the same, with a warning at startup.
    pub write_policy: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100_000,
            write_policy: "write-through".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub mode: MetadataMode,
    pub file: FileBackendConfig,
    pub mysql: MysqlConfig,
    pub cache: CacheConfig,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            mode: MetadataMode::File,
            file: FileBackendConfig::default(),
            mysql: MysqlConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage roots holding content-addressed blobs.
    pub paths: Vec<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            paths: vec![PathBuf::from("blobs")],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub timeout_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_HEARTBEAT_TIMEOUT_MS,
        }
    }
}

/// Registry service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub server: ServerConfig,
    pub heartbeat: HeartbeatConfig,
    pub auth: AuthConfig,
}

/// Name service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NameConfig {
    pub server: ServerConfig,
    pub registry: RegistryPeers,
    pub metadata: MetadataConfig,
    pub auth: AuthConfig,
}

/// Data service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub server: ServerConfig,
    pub registry: RegistryPeers,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

fn load_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_yaml::from_str(&raw)
        .map_err(|e| StoreError::Config(format!("cannot parse {}: {e}", path.display())))
}

impl RegistryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = load_yaml(path)?;
        if config.server.port == 0 {
            config.server.port = DEFAULT_REGISTRY_PORT;
        }
        Ok(config)
    }
}

impl NameConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = load_yaml(path)?;
        if config.server.port == 0 {
            config.server.port = DEFAULT_NAME_PORT;
        }
        Ok(config)
    }
}

impl DataConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = load_yaml(path)?;
        if config.server.port == 0 {
            config.server.port = DEFAULT_DATA_PORT;
        }
        if config.storage.paths.is_empty() {
            return Err(StoreError::Config("storage.paths must not be empty".into()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_name_config_defaults() {
        let f = write_tmp("{}");
        let config = NameConfig::load(f.path()).unwrap();
        assert_eq!(config.server.port, DEFAULT_NAME_PORT);
        assert_eq!(config.metadata.mode, MetadataMode::File);
        assert!(config.metadata.cache.enabled);
    }

    #[test]
    fn test_registry_addresses_as_list() {
        let f = write_tmp("registry:\n  addresses:\n    - 10.0.0.1:9500\n    - 10.0.0.2:9500\n");
        let config = NameConfig::load(f.path()).unwrap();
        assert_eq!(
            config.registry.addresses,
            vec!["10.0.0.1:9500", "10.0.0.2:9500"]
        );
    }

    #[test]
    fn test_registry_addresses_as_csv() {
        let f = write_tmp("registry:\n  addresses: \"10.0.0.1:9500, 10.0.0.2:9500\"\n");
        let config = DataConfig::load(f.path()).unwrap();
        assert_eq!(
            config.registry.addresses,
            vec!["10.0.0.1:9500", "10.0.0.2:9500"]
        );
    }

    #[test]
    fn test_data_config_full() {
        let f = write_tmp(
            "server:\n  port: 9701\n  advertised_host: node1\nstorage:\n  paths:\n    - /srv/a\n    - /srv/b\nauth:\n  token: s3cret\n",
        );
        let config = DataConfig::load(f.path()).unwrap();
        assert_eq!(config.server.port, 9701);
        assert_eq!(config.server.advertised_host.as_deref(), Some("node1"));
        assert_eq!(config.storage.paths.len(), 2);
        assert_eq!(config.auth.token.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_mysql_and_cache_sections() {
        let f = write_tmp(
            "metadata:\n  mode: mysql\n  mysql:\n    host: db\n    port: 3307\n    database: meta\n    user: u\n    password: p\n  cache:\n    enabled: false\n    max-size: 42\n    write-policy: write-through\n",
        );
        let config = NameConfig::load(f.path()).unwrap();
        assert_eq!(config.metadata.mode, MetadataMode::Mysql);
        assert_eq!(config.metadata.mysql.url(), "mysql://u:p@db:3307/meta");
        assert!(!config.metadata.cache.enabled);
        assert_eq!(config.metadata.cache.max_size, 42);
    }
}
