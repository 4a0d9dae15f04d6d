//! YAML configuration.
//!
//! Every section and field is optional:
//!
//! ```yaml
//! database:
//!   path: ~/.config/hopmap/hopmap.db   # or :memory:
//! traceroute:
//!   command: traceroute
//!   max_hops: 38
//!   timeout_secs: 120
//! geolocation:
//!   base_url: http://ip-api.com/json
//!   min_interval_ms: 100
//!   timeout_secs: 10
//! ```

use crate::data::{GraphStore, StoreLocation};
use crate::error::ConfigError;
use hopmap_scanner::{GeoLocator, Traceroute, geolocation, traceroute};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_DATABASE_PATH: &str = "~/.config/hopmap/hopmap.db";
pub const MEMORY_DATABASE: &str = ":memory:";

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub traceroute: TracerouteConfig,
    pub geolocation: GeolocationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerouteConfig {
    pub command: String,
    pub max_hops: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub base_url: String,
    pub min_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

impl Default for TracerouteConfig {
    fn default() -> Self {
        Self {
            command: traceroute::DEFAULT_PROGRAM.to_string(),
            max_hops: u32::from(traceroute::DEFAULT_MAX_HOPS),
            timeout_secs: traceroute::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            base_url: geolocation::DEFAULT_BASE_URL.to_string(),
            min_interval_ms: geolocation::DEFAULT_MIN_INTERVAL_MS,
            timeout_secs: geolocation::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document deserializes to unit, not to an empty mapping.
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&contents)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file is missing. A
    /// missing file is only an error when the user named it explicitly.
    pub fn load_or_default(path: &Path, explicit: bool) -> Result<Self> {
        if !explicit && !path.exists() {
            warn!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=255).contains(&self.traceroute.max_hops) {
            return Err(ConfigError::Invalid(format!(
                "traceroute.max_hops must be between 1 and 255, got {}",
                self.traceroute.max_hops
            )));
        }
        if self.traceroute.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "traceroute.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.geolocation.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "geolocation.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::Invalid("database.path is empty".into()));
        }
        Ok(())
    }

    pub fn tracer(&self) -> Traceroute {
        Traceroute::new()
            .with_program(&self.traceroute.command)
            .with_max_hops(u8::try_from(self.traceroute.max_hops).unwrap_or(u8::MAX))
            .with_timeout(self.traceroute.timeout_secs)
    }

    pub fn locator(&self) -> GeoLocator {
        GeoLocator::new()
            .with_base_url(&self.geolocation.base_url)
            .with_min_interval(Duration::from_millis(self.geolocation.min_interval_ms))
            .with_timeout(self.geolocation.timeout_secs)
    }

    pub fn store(&self) -> GraphStore {
        GraphStore::with_location(self.database.location())
    }
}

impl DatabaseConfig {
    pub fn location(&self) -> StoreLocation {
        if self.path == MEMORY_DATABASE {
            return StoreLocation::Memory;
        }
        let expanded = shellexpand::tilde(&self.path);
        StoreLocation::File(PathBuf::from(expanded.as_ref()))
    }
}
