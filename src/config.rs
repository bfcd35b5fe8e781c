//! Runtime configuration
//!
//! Loads and validates the YAML runtime configuration: environment identity,
//! local cache scope and the cache regions.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sqlweave_cache::{Cache, CacheConfig, CacheError};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const CONFIG_ENV_VAR: &str = "SQLWEAVE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "sqlweave.yaml";

/// How long session-local query results live
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalCacheScope {
    /// Until commit, rollback, close or an explicit clear
    #[default]
    Session,
    /// Cleared whenever a top-level statement completes
    Statement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Environment identity folded into every cache key
    pub environment: String,
    /// Exposed to templates as `_databaseId`
    pub database_id: Option<String>,
    pub local_cache_scope: LocalCacheScope,
    /// Global switch for cross-session regions
    pub cache_enabled: bool,
    pub regions: BTreeMap<String, CacheConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            environment: "default".to_string(),
            database_id: None,
            local_cache_scope: LocalCacheScope::Session,
            cache_enabled: true,
            regions: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: RuntimeConfig =
            serde_yaml::from_str(content).context("Failed to parse runtime configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.environment.trim().is_empty() {
            return Err(anyhow!("environment must not be empty"));
        }
        for (name, region) in &self.regions {
            region
                .validate()
                .with_context(|| format!("Invalid cache region '{}'", name))?;
        }
        Ok(())
    }

    /// Build every configured region, keyed by name
    pub fn build_regions(&self) -> std::result::Result<HashMap<String, Arc<dyn Cache>>, CacheError> {
        self.regions
            .iter()
            .map(|(name, region)| Ok((name.clone(), region.build(name)?)))
            .collect()
    }
}

pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create loader from SQLWEAVE_CONFIG env var or default to "sqlweave.yaml"
    pub fn from_env() -> Self {
        let path =
            std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<RuntimeConfig> {
        info!("Loading runtime configuration from {}", self.path.display());

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;

        let config: RuntimeConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", self.path.display()))?;

        info!(
            "Loaded environment '{}' with {} cache regions",
            config.environment,
            config.regions.len()
        );

        Ok(config)
    }
}
