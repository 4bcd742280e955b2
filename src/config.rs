use serde::{Deserialize, Serialize};
use std::fs;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid config value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub server: ServerConfig,
    /// PostgreSQL connection URL. Unset means the in-memory ledger.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub postgres_max_connections: u32,
    #[serde(default)]
    pub transfer: TransferConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Transfer retry and deadline settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub max_attempts: u32,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    /// Deadline for one transfer call, retries included
    pub timeout_ms: u64,
    /// Row lock wait limit; a wait past it is a retryable conflict
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_min_ms: 10,
            backoff_max_ms: 50,
            timeout_ms: 5000,
            lock_timeout_ms: Some(1000),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

impl AppConfig {
    /// Read `config/<env>.yaml`, then apply environment overrides
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: config_path,
            source,
        })?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// `DB_SOURCE` replaces `postgres_url`, `SERVER_ADDRESS` (`host:port`)
    /// replaces the listen address.
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("DB_SOURCE")
            && !url.trim().is_empty()
        {
            self.postgres_url = Some(url);
        }

        if let Some(addr) = lookup("SERVER_ADDRESS") {
            let (host, port) = addr.rsplit_once(':').ok_or_else(|| ConfigError::Invalid {
                key: "SERVER_ADDRESS",
                value: addr.clone(),
            })?;
            let port = port.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "SERVER_ADDRESS",
                value: addr.clone(),
            })?;
            if !host.is_empty() {
                self.server.host = host.to_string();
            }
            self.server.port = port;
        }

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
