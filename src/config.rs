//! Configuration management for CMS Sync Server

use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty means any origin
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root directory for content snapshots
    pub data_dir: PathBuf,
    /// Optional JSON file listing the instances to register at startup
    pub instances_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub page_size: u32,
}

impl PlatformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            timeout_secs: 30,
            max_retries: 3,
            page_size: 100,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                cors_origins: Vec::new(),
            },
            database: DatabaseConfig {
                url: "sqlite:./cms_sync.db".to_string(),
            },
            storage: StorageConfig {
                data_dir: PathBuf::from("./data"),
                instances_file: None,
            },
            platform: PlatformConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = PlatformConfig::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 8000)?,
                cors_origins: env::var("CORS_ORIGINS")
                    .map(|v| {
                        v.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:./cms_sync.db".to_string()),
            },
            storage: StorageConfig {
                data_dir: env::var("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data")),
                instances_file: env::var("INSTANCES_FILE").ok().map(PathBuf::from),
            },
            platform: PlatformConfig {
                timeout_secs: parse_var("PLATFORM_TIMEOUT_SECS", defaults.timeout_secs)?,
                max_retries: parse_var("PLATFORM_MAX_RETRIES", defaults.max_retries)?,
                page_size: parse_var("PLATFORM_PAGE_SIZE", defaults.page_size)?,
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}
