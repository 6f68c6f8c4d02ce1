//! meshregd.toml configuration parser.
//!
//! Every section and key is optional; a missing file section falls back to
//! the defaults below.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use meshreg_state::{DEFAULT_REGION, RankOrder};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_WAL_FILE: &str = "wal.log";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub wal: WalConfig,
    pub registry: RegistrySettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalConfig {
    pub data_dir: PathBuf,
    pub file_name: String,
    /// fsync after every append.
    pub sync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySettings {
    pub rank_order: RankOrder,
    pub default_top_k: usize,
    pub default_region: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
        }
    }
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            file_name: DEFAULT_WAL_FILE.to_string(),
            sync: true,
        }
    }
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            rank_order: RankOrder::Ascending,
            default_top_k: meshreg_api::DEFAULT_TOP_K,
            default_region: DEFAULT_REGION.to_string(),
        }
    }
}

impl WalConfig {
    pub fn path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply a `PORT` environment value to the listen address.
    pub fn apply_port_env(&mut self, port: Option<&str>) -> anyhow::Result<()> {
        if let Some(port) = port.filter(|p| !p.is_empty()) {
            let port: u16 = port.parse().with_context(|| format!("invalid PORT {port:?}"))?;
            self.server.listen.set_port(port);
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.registry.default_top_k > 0, "registry.default_top_k must be at least 1");
        anyhow::ensure!(!self.wal.file_name.is_empty(), "wal.file_name must not be empty");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DaemonConfig::parse("").unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.server.listen.port(), 50051);
        assert_eq!(config.wal.path(), PathBuf::from("./wal.log"));
        assert_eq!(config.registry.default_top_k, 10);
        assert_eq!(config.registry.default_region, "global");
        assert!(config.wal.sync);
        assert!(!config.logging.json);
    }

    #[test]
    fn test_parse_full() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:7000"

[wal]
data_dir = "/var/lib/meshreg"
file_name = "registry.wal"
sync = false

[registry]
rank_order = "descending"
default_top_k = 3
default_region = "us-east"

[logging]
json = true
filter = "warn"
"#;
        let config = DaemonConfig::parse(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(config.wal.path(), PathBuf::from("/var/lib/meshreg/registry.wal"));
        assert!(!config.wal.sync);
        assert_eq!(config.registry.rank_order, RankOrder::Descending);
        assert_eq!(config.registry.default_top_k, 3);
        assert_eq!(config.logging.filter.as_deref(), Some("warn"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(DaemonConfig::parse("[registry]\ndefault_top_k = 0\n").is_err());
        assert!(DaemonConfig::parse("[registry]\nrank_order = \"sideways\"\n").is_err());
        assert!(DaemonConfig::parse("[server]\nport = 1\n").is_err());
    }

    #[test]
    fn test_port_env() {
        let mut config = DaemonConfig::default();
        config.apply_port_env(Some("6000")).unwrap();
        assert_eq!(config.server.listen.port(), 6000);

        config.apply_port_env(None).unwrap();
        config.apply_port_env(Some("")).unwrap();
        assert_eq!(config.server.listen.port(), 6000);

        assert!(config.apply_port_env(Some("http")).is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = DaemonConfig::default();
        config.registry.rank_order = RankOrder::Descending;
        let parsed = DaemonConfig::parse(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meshregd.toml");
        std::fs::write(&path, "[wal]\nsync = false\n").unwrap();
        let config = DaemonConfig::from_file(&path).unwrap();
        assert!(!config.wal.sync);

        assert!(DaemonConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
