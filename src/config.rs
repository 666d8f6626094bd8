//! Settings from `~/.portal-geo/config.toml`, overridden by `PORTAL_GEO_*`
//! environment variables.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::location::{
    DpaClient, FileCache, LocationCache, LocationResolver, MemoryCache, OfflineSource,
    RemoteSource, ResolverConfig, DPA_BASE_URL,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: '{value}'")]
    InvalidEnv { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub all_communes_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache: CacheBackend,
    pub cache_path: Option<PathBuf>,
    pub placeholder_communes: bool,
    pub offline: bool,
    pub host: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DPA_BASE_URL.to_string(),
            timeout_secs: 10,
            all_communes_timeout_secs: 15,
            cache_ttl_secs: 24 * 3600,
            cache: CacheBackend::Memory,
            cache_path: None,
            placeholder_communes: true,
            offline: false,
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Settings {
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".portal-geo")
            .join("config.toml")
    }

    /// Load `path` (or the default file, which may be absent), then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let p = Self::default_path();
                if p.exists() { Self::from_file(&p)? } else { Self::default() }
            }
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Ok(toml::from_str(&data)?)
    }

    /// Environment wins over the file. `lookup` is injected for tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PORTAL_GEO_BASE_URL") {
            self.base_url = url;
        }
        if let Some(ttl) = lookup("PORTAL_GEO_CACHE_TTL_SECS") {
            self.cache_ttl_secs = ttl.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                key: "PORTAL_GEO_CACHE_TTL_SECS",
                value: ttl.clone(),
            })?;
        }
        if let Some(backend) = lookup("PORTAL_GEO_CACHE") {
            self.cache = match backend.trim().to_lowercase().as_str() {
                "memory" => CacheBackend::Memory,
                "file" => CacheBackend::File,
                _ => return Err(ConfigError::InvalidEnv { key: "PORTAL_GEO_CACHE", value: backend }),
            };
        }
        if let Some(offline) = lookup("PORTAL_GEO_OFFLINE") {
            self.offline = match offline.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => return Err(ConfigError::InvalidEnv { key: "PORTAL_GEO_OFFLINE", value: offline }),
            };
        }
        Ok(())
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            placeholder_communes: self.placeholder_communes,
        }
    }

    pub fn build_cache(&self) -> Arc<dyn LocationCache> {
        match self.cache {
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
            CacheBackend::File => {
                let path = self.cache_path.clone().unwrap_or_else(FileCache::default_path);
                Arc::new(FileCache::load_from(path))
            }
        }
    }

    pub fn build_remote(&self) -> Arc<dyn RemoteSource> {
        if self.offline {
            return Arc::new(OfflineSource);
        }
        Arc::new(DpaClient::new(
            self.base_url.clone(),
            Duration::from_secs(self.timeout_secs),
            Duration::from_secs(self.all_communes_timeout_secs),
        ))
    }

    pub fn build_resolver(&self) -> LocationResolver {
        LocationResolver::with_config(self.build_remote(), self.build_cache(), self.resolver_config())
    }
}
