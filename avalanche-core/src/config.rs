use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{cache::Ttl, model::AvalancheCenterId, query::QueryOptions};

/// Base URLs of the services queries are sent to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hosts {
    pub nwac: String,
    pub national_avalanche_center: String,
    pub snowbound: String,
}

impl Default for Hosts {
    fn default() -> Self {
        Self {
            nwac: "https://nwac.us".to_string(),
            national_avalanche_center: "https://api.avalanche.org".to_string(),
            snowbound: "https://api.snowobs.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub stale_time_secs: u64,
    pub cache_time_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: Ttl::DEFAULT_STALE_TIME.as_secs(),
            cache_time_secs: Ttl::DEFAULT_CACHE_TIME.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// default_center = "NWAC"
///
/// [hosts]
/// nwac = "https://nwac.us"
///
/// [cache]
/// stale_time_secs = 3600
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Avalanche center used when a command does not name one, e.g. "NWAC".
    pub default_center: Option<String>,
    pub hosts: Hosts,
    pub cache: CacheConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Return the default center as a strongly-typed id.
    pub fn default_center_id(&self) -> Result<AvalancheCenterId> {
        let s = self.default_center.as_ref().ok_or_else(|| {
            anyhow!(
                "No default avalanche center configured.\n\
                 Hint: pass `--center <ID>` or run `avalanche configure` first."
            )
        })?;

        AvalancheCenterId::try_from(s.as_str())
    }

    /// Explicit center if given, otherwise the configured default.
    pub fn center_or_default(&self, center: Option<AvalancheCenterId>) -> Result<AvalancheCenterId> {
        match center {
            Some(id) => Ok(id),
            None => self.default_center_id(),
        }
    }

    pub fn set_default_center(&mut self, id: AvalancheCenterId) {
        self.default_center = Some(id.as_str().to_string());
    }

    /// Default query options. A cache time shorter than the stale time is
    /// raised to match it.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions {
            enabled: true,
            ttl: Ttl::new(
                Duration::from_secs(self.cache.stale_time_secs),
                Duration::from_secs(self.cache.cache_time_secs),
            ),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs.max(1))
    }

    /// Load config from disk, or return defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "avalanche-data", "avalanche-cli")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}
