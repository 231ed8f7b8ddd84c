// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use crate::messenger::MessengerConfig;
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/kittengames/kittengames-data/main/games.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub messenger: MessengerSection,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,
    /// Base for relative game paths. Defaults to the directory of `url`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            base_url: None,
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CatalogConfig {
    pub fn url(&self) -> Result<Url> {
        Url::parse(&self.url).with_context(|| format!("Invalid catalog.url '{}'", self.url))
    }

    pub fn base_url(&self) -> Result<Url> {
        match &self.base_url {
            Some(base) => {
                Url::parse(base).with_context(|| format!("Invalid catalog.base_url '{}'", base))
            }
            None => self
                .url()?
                .join("./")
                .context("Failed to derive catalog base url"),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessengerSection {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_restore_grace_ms")]
    pub restore_grace_ms: u64,
}

impl Default for MessengerSection {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            restore_grace_ms: default_restore_grace_ms(),
        }
    }
}

impl MessengerSection {
    pub fn to_config(&self) -> MessengerConfig {
        MessengerConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            restore_grace: Duration::from_millis(self.restore_grace_ms),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => PathBuf::from(expand_tilde(dir)),
            None => paths::data_dir(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_catalog_url() -> String {
    DEFAULT_CATALOG_URL.to_string()
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_restore_grace_ms() -> u64 {
    1_500
}

/// Expand tilde (~) to home directory in paths
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    }
    path.to_string()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. KITTENGAMES_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/kittengames/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("KITTENGAMES_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        let mut config = if let Some(config_path) = Self::find_config_file() {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("KITTENGAMES_CATALOG_URL") {
            self.catalog.url = val;
        }
        if let Ok(val) = std::env::var("KITTENGAMES_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = std::env::var("KITTENGAMES_PORT") {
            self.server.port = val
                .parse()
                .with_context(|| format!("KITTENGAMES_PORT must be a port number, got '{}'", val))?;
        }
        if let Ok(val) = std::env::var("KITTENGAMES_DATA_DIR") {
            self.storage.data_dir = Some(val);
        }
        if let Ok(val) = std::env::var("KITTENGAMES_CACHE_TTL_SECS") {
            self.catalog.ttl_secs = val.parse().with_context(|| {
                format!("KITTENGAMES_CACHE_TTL_SECS must be a number, got '{}'", val)
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.catalog.url.trim().is_empty() {
            anyhow::bail!(
                "catalog.url is required (set in config.toml or KITTENGAMES_CATALOG_URL env var)"
            );
        }
        self.catalog.url()?;
        self.catalog.base_url()?;
        if self.server.port == 0 {
            anyhow::bail!("server.port must not be 0");
        }
        if self.messenger.restore_grace_ms > self.messenger.request_timeout_ms {
            anyhow::bail!(
                "messenger.restore_grace_ms ({}) must not exceed messenger.request_timeout_ms ({})",
                self.messenger.restore_grace_ms,
                self.messenger.request_timeout_ms
            );
        }
        Ok(())
    }
}
