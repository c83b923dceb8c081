use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use cultivation::catalog::{Catalog, CatalogError};
use cultivation::{BattleConfig, ServicesConfig};
use net::PushConfig;
use presence::PresenceConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetSection {
    pub bind_addr: String,
    pub push_queue_capacity: usize,
    pub ping_interval_ms: u64,
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4100".to_string(),
            push_queue_capacity: net::DEFAULT_QUEUE_CAPACITY,
            ping_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: "data/cultivation.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub shards: usize,
    pub purge_interval_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            shards: 16,
            purge_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresenceSection {
    pub heartbeat_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub entry_ttl_secs: u64,
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: 10,
            sweep_interval_secs: 5,
            entry_ttl_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceSection {
    pub ttl_secs: u64,
    pub lock_ttl_secs: u64,
    pub sync_interval_secs: u64,
}

impl Default for ResourceSection {
    fn default() -> Self {
        Self {
            ttl_secs: 20,
            lock_ttl_secs: 20,
            sync_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpiritSection {
    pub tick_interval_ms: u64,
    pub base_rate: f64,
}

impl Default for SpiritSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            base_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BattleSection {
    pub session_ttl_secs: u64,
    pub min_round_interval_ms: u64,
    pub max_rounds: u32,
}

impl Default for BattleSection {
    fn default() -> Self {
        Self {
            session_ttl_secs: 60 * 60,
            min_round_interval_ms: 1000,
            max_rounds: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    /// Built-in tables when unset.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetSection,
    pub database: DatabaseSection,
    pub cache: CacheSection,
    pub presence: PresenceSection,
    pub resources: ResourceSection,
    pub spirit: SpiritSection,
    pub battle: BattleSection,
    pub catalog: CatalogSection,
    pub log: LogSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path.
    /// Falls back to defaults if path is None or file doesn't exist.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    /// Environment variables win over the file.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(path) = get("CULTIVATION_DB_PATH") {
            self.database.path = path;
        }
        if let Some(addr) = get("CULTIVATION_BIND_ADDR") {
            self.net.bind_addr = addr;
        }
        if let Some(level) = get("CULTIVATION_LOG_LEVEL") {
            self.log.level = level;
        }
    }

    /// Resource caches and locks must outlive the heartbeat timeout so the
    /// offline cleanup can flush them first.
    pub fn validate(&self) -> Result<(), String> {
        let heartbeat = self.presence.heartbeat_timeout_secs;
        if self.resources.ttl_secs <= heartbeat {
            return Err(format!(
                "resources.ttl_secs ({}) must exceed presence.heartbeat_timeout_secs ({})",
                self.resources.ttl_secs, heartbeat
            ));
        }
        if self.resources.lock_ttl_secs <= heartbeat {
            return Err(format!(
                "resources.lock_ttl_secs ({}) must exceed presence.heartbeat_timeout_secs ({})",
                self.resources.lock_ttl_secs, heartbeat
            ));
        }
        if self.cache.shards == 0 {
            return Err("cache.shards must be at least 1".to_string());
        }
        if self.net.push_queue_capacity == 0 {
            return Err("net.push_queue_capacity must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn to_services_config(&self) -> ServicesConfig {
        ServicesConfig {
            presence: PresenceConfig {
                heartbeat_timeout: Duration::from_secs(self.presence.heartbeat_timeout_secs),
                entry_ttl: Duration::from_secs(self.presence.entry_ttl_secs),
            },
            resource_ttl: Duration::from_secs(self.resources.ttl_secs),
            lock_ttl: Duration::from_secs(self.resources.lock_ttl_secs),
            spirit_base_rate: self.spirit.base_rate,
            battle: BattleConfig {
                session_ttl: Duration::from_secs(self.battle.session_ttl_secs),
                min_round_interval: Duration::from_millis(self.battle.min_round_interval_ms),
                max_rounds: self.battle.max_rounds,
            },
            push_queue_capacity: self.net.push_queue_capacity,
        }
    }

    /// The push transport shares the presence heartbeat timeout.
    pub fn to_push_config(&self) -> PushConfig {
        PushConfig {
            ping_interval: Duration::from_millis(self.net.ping_interval_ms),
            silence_timeout: Duration::from_secs(self.presence.heartbeat_timeout_secs),
        }
    }

    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog.path {
            Some(path) => Catalog::load(path),
            None => Ok(Catalog::default()),
        }
    }
}

/// Parse CLI arguments and merge with config and environment.
/// Supports: --config <path>
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(val) = args.get(i + 1) {
                    config_path = Some(val.as_str());
                    i += 2;
                } else {
                    eprintln!("--config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    let mut config = match ServerConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };
    config.apply_env(|key| std::env::var(key).ok());
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.net.bind_addr, "0.0.0.0:4100");
        assert_eq!(config.net.push_queue_capacity, 64);
        assert_eq!(config.presence.heartbeat_timeout_secs, 10);
        assert_eq!(config.presence.sweep_interval_secs, 5);
        assert_eq!(config.resources.ttl_secs, 20);
        assert_eq!(config.resources.sync_interval_secs, 300);
        assert_eq!(config.battle.max_rounds, 100);
        assert_eq!(config.log.level, "info");
        assert!(config.catalog.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let config = ServerConfig::load(Some("/tmp/nonexistent_cultivation_config.toml")).unwrap();
        assert_eq!(config.database.path, "data/cultivation.db");
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.spirit.tick_interval_ms, 1000);
    }

    #[test]
    fn load_partial_toml() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[database]
path = "/var/lib/cultivation.db"

[battle]
max_rounds = 50
"#
        )
        .unwrap();

        let config = ServerConfig::load(Some(f.path().to_str().unwrap())).unwrap();
        assert_eq!(config.database.path, "/var/lib/cultivation.db");
        assert_eq!(config.battle.max_rounds, 50);
        // Unset fields remain default
        assert_eq!(config.battle.session_ttl_secs, 3600);
        assert_eq!(config.net.bind_addr, "0.0.0.0:4100");
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        write!(f, "[net\nbind_addr = 1").unwrap();
        assert!(ServerConfig::load(Some(f.path().to_str().unwrap())).is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = ServerConfig::default();
        config.apply_env(|key| match key {
            "CULTIVATION_DB_PATH" => Some("/tmp/env.db".to_string()),
            "CULTIVATION_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });
        assert_eq!(config.database.path, "/tmp/env.db");
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.net.bind_addr, "0.0.0.0:4100");
    }

    #[test]
    fn ttl_must_exceed_heartbeat_timeout() {
        let mut config = ServerConfig::default();
        config.resources.ttl_secs = 10;
        assert!(config.validate().unwrap_err().contains("resources.ttl_secs"));

        let mut config = ServerConfig::default();
        config.presence.heartbeat_timeout_secs = 30;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sections_convert_to_runtime_configs() {
        let config = ServerConfig::default();
        let services = config.to_services_config();
        assert_eq!(services.resource_ttl, Duration::from_secs(20));
        assert_eq!(services.presence.heartbeat_timeout, Duration::from_secs(10));
        assert_eq!(services.battle.min_round_interval, Duration::from_secs(1));
        let push = config.to_push_config();
        assert_eq!(push.ping_interval, Duration::from_secs(1));
        assert_eq!(push.silence_timeout, Duration::from_secs(10));
    }

    #[test]
    fn catalog_path_loads_tables() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[[realms]]
level = 1
name = "Mortal"
max_cultivation = 50.0
"#
        )
        .unwrap();
        let mut config = ServerConfig::default();
        config.catalog.path = Some(f.path().to_str().unwrap().to_string());
        let catalog = config.load_catalog().unwrap();
        assert_eq!(catalog.realms.len(), 1);
        assert_eq!(catalog.realms[0].name, "Mortal");
    }
}
