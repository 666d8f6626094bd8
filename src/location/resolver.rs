//! Location resolver — orchestrates the fallback chain.
//!
//! Region flow:  Cache → DPA API → built-in dataset
//! Commune flow: Cache → DPA API → built-in dataset → placeholder
//!
//! Every outcome is cached for the configured TTL, fallbacks included, so a
//! dead upstream is only retried once per window. Nothing here returns an
//! error to the caller except selection validation.

use super::cache::LocationCache;
use super::providers::{self, RemoteResult, RemoteSource};
use super::types::{Commune, LocationError, LocationSource, Region, Resolved, Selection, SelectionError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 3600);

/// Name given to the synthesized commune of an unknown region.
pub const PLACEHOLDER_COMMUNE_NAME: &str = "Comuna no especificada";

const REGIONS_KEY: &str = "regions";
const ALL_COMMUNES_KEY: &str = "communes";

fn communes_key(region_code: &str) -> String {
    format!("communes:{}", region_code)
}

/// Third-party sources may hand back `Ok(vec![])`; treat it like a failure.
fn non_empty<T>(result: RemoteResult<T>) -> RemoteResult<T> {
    match result {
        Ok(items) if items.is_empty() => Err(LocationError::Empty),
        other => other,
    }
}

/// Tunables of the resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub ttl: Duration,
    /// Synthesize `{code}001` for regions with no data at all.
    pub placeholder_communes: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL, placeholder_communes: true }
    }
}

/// The location resolver with its fallback pipeline.
pub struct LocationResolver {
    remote: Arc<dyn RemoteSource>,
    cache: Arc<dyn LocationCache>,
    config: ResolverConfig,
}

impl LocationResolver {
    pub fn new(remote: Arc<dyn RemoteSource>, cache: Arc<dyn LocationCache>) -> Self {
        Self::with_config(remote, cache, ResolverConfig::default())
    }

    pub fn with_config(
        remote: Arc<dyn RemoteSource>,
        cache: Arc<dyn LocationCache>,
        config: ResolverConfig,
    ) -> Self {
        Self { remote, cache, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// All regions. Never empty.
    pub fn list_regions(&self) -> Vec<Region> {
        self.resolve_regions().items
    }

    /// Communes of one region. Empty only for an empty code (or an unknown
    /// code with placeholders disabled).
    pub fn list_communes(&self, region_code: &str) -> Vec<Commune> {
        self.resolve_communes(region_code).items
    }

    /// Every commune in the country.
    pub fn list_all_communes(&self) -> Vec<Commune> {
        self.resolve_all_communes().items
    }

    pub fn resolve_regions(&self) -> Resolved<Region> {
        if let Some(regions) = self.cached::<Region>(REGIONS_KEY) {
            return Resolved::new(regions, LocationSource::Cache);
        }

        let resolved = match non_empty(self.remote.fetch_regions()) {
            Ok(regions) => Resolved::new(regions, LocationSource::Remote),
            Err(e) => {
                log::warn!("region lookup failed, using built-in list: {}", e);
                Resolved::new(providers::builtin_regions(), LocationSource::Fallback)
            }
        };

        self.store(REGIONS_KEY, &resolved.items);
        resolved
    }

    pub fn resolve_communes(&self, region_code: &str) -> Resolved<Commune> {
        let region_code = region_code.trim();
        if region_code.is_empty() {
            return Resolved::new(Vec::new(), LocationSource::Empty);
        }

        let key = communes_key(region_code);
        if let Some(communes) = self.cached::<Commune>(&key) {
            return Resolved::new(communes, LocationSource::Cache);
        }

        let resolved = match non_empty(self.remote.fetch_communes(region_code)) {
            Ok(communes) => Resolved::new(communes, LocationSource::Remote),
            Err(e) => {
                log::warn!("commune lookup for region {} failed: {}", region_code, e);
                self.fallback_communes(region_code)
            }
        };

        self.store(&key, &resolved.items);
        resolved
    }

    pub fn resolve_all_communes(&self) -> Resolved<Commune> {
        if let Some(communes) = self.cached::<Commune>(ALL_COMMUNES_KEY) {
            return Resolved::new(communes, LocationSource::Cache);
        }

        let resolved = match non_empty(self.remote.fetch_all_communes()) {
            Ok(communes) => Resolved::new(communes, LocationSource::Remote),
            Err(e) => {
                log::warn!("full commune lookup failed, using built-in list: {}", e);
                Resolved::new(providers::builtin_all_communes(), LocationSource::Fallback)
            }
        };

        self.store(ALL_COMMUNES_KEY, &resolved.items);
        resolved
    }

    /// Check a submitted pair against the lists the form offers and return
    /// both names.
    pub fn validate_selection(
        &self,
        region_code: &str,
        commune_code: &str,
    ) -> Result<Selection, SelectionError> {
        let (region_code, commune_code) = (region_code.trim(), commune_code.trim());
        if region_code.is_empty() {
            return Err(SelectionError::MissingRegion);
        }
        if commune_code.is_empty() {
            return Err(SelectionError::MissingCommune);
        }

        let region = self
            .list_regions()
            .into_iter()
            .find(|r| r.code == region_code)
            .ok_or_else(|| SelectionError::UnknownRegion(region_code.to_string()))?;

        let commune = self
            .list_communes(&region.code)
            .into_iter()
            .find(|c| c.code == commune_code)
            .ok_or_else(|| SelectionError::UnknownCommune {
                region: region.code.clone(),
                commune: commune_code.to_string(),
            })?;

        Ok(Selection { region, commune })
    }

    fn fallback_communes(&self, region_code: &str) -> Resolved<Commune> {
        if let Some(communes) = providers::builtin_communes(region_code) {
            return Resolved::new(communes, LocationSource::Fallback);
        }

        log::warn!("no built-in communes for unknown region '{}'", region_code);
        if self.config.placeholder_communes {
            let placeholder = Commune::new(format!("{}001", region_code), PLACEHOLDER_COMMUNE_NAME);
            Resolved::new(vec![placeholder], LocationSource::Placeholder)
        } else {
            Resolved::new(Vec::new(), LocationSource::Empty)
        }
    }

    fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<Vec<T>> {
        let raw = self.cache.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(items) => Some(items),
            Err(e) => {
                log::warn!("ignoring corrupt cache entry '{}': {}", key, e);
                None
            }
        }
    }

    fn store<T: Serialize>(&self, key: &str, items: &[T]) {
        match serde_json::to_string(items) {
            Ok(json) => self.cache.set(key, json, self.config.ttl),
            Err(e) => log::warn!("could not cache '{}': {}", key, e),
        }
    }
}
