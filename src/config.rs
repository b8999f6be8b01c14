//! Service configuration module.
//!
//! Handles loading, validating, and merging the service's TOML config file.
//! Configuration is layered: stock defaults, then the optional config file,
//! then command-line flags (and the `PORT` environment variable).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8000
//! # public_dir = "public"            # Static files served ahead of the proxy
//! # fallback_image = "no-image.jpg"  # JPEG served when a transform fails
//! cache_max_age_secs = 7776000       # Cache-Control max-age (90 days)
//!
//! [fetch]
//! timeout_secs = 30                  # Whole-request timeout for source GETs
//! max_bytes = 104857600              # Largest accepted source body (100 MiB)
//! # user_agent = "image-proxy/<version>"
//!
//! [cache]
//! enabled = true
//! # parent_dir = "/var/tmp"          # Where the per-process cache dir is created
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse; override just the values you want:
//!
//! ```toml
//! [server]
//! port = 9000
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration.
///
/// All fields have sensible defaults. Config files need only specify the
/// values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Listener, static files, fallback image, response caching.
    pub server: ServerConfig,
    /// Outbound source fetching.
    pub fetch: FetchConfig,
    /// Transformed-image cache.
    pub cache: CacheConfig,
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "server.host must not be empty".into(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Validation("server.port must be non-zero".into()));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch.timeout_secs must be non-zero".into(),
            ));
        }
        if self.fetch.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "fetch.max_bytes must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply command-line overrides, then re-validate.
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        if let Some(host) = &overrides.host {
            self.server.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(dir) = &overrides.public_dir {
            self.server.public_dir = Some(dir.clone());
        }
        if overrides.no_cache {
            self.cache.enabled = false;
        }
        self.validate()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory of static files served before the proxy route.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_dir: Option<PathBuf>,
    /// JPEG served on any failure. A grey placeholder is generated if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_image: Option<PathBuf>,
    /// `max-age` of the `Cache-Control` header on transformed images.
    pub cache_max_age_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            public_dir: None,
            fallback_image: None,
            cache_max_age_secs: 90 * 24 * 60 * 60,
        }
    }
}

impl ServerConfig {
    /// Address to bind, in a form `TcpListener::bind` accepts (IPv6 included).
    pub fn bind_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_bytes: 100 * 1024 * 1024,
            user_agent: concat!("image-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Parent of the per-process cache directory; the system temp dir if unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            parent_dir: None,
        }
    }
}

/// Values supplied on the command line. `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_dir: Option<PathBuf>,
    pub no_cache: bool,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(ServiceConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Unlike a discovered config, an explicitly named file must exist.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ServiceConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ServiceConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or stock defaults when no path is given.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = path.map(load_raw_config).transpose()?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# image-proxy Configuration
# ========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Command-line flags override values from this file:
#   --host, --port (or the PORT environment variable), --public-dir, --no-cache
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
# Interface to listen on.
host = "0.0.0.0"

# TCP port.
port = 8000

# Directory of static files (favicon, robots.txt, ...) served ahead of the
# transform route. Disabled when unset.
# public_dir = "public"

# JPEG served, with status 200, whenever a transform fails for any reason.
# A neutral grey placeholder is generated when unset.
# fallback_image = "public/no-image.jpg"

# Cache-Control max-age for transformed images, in seconds (90 days).
cache_max_age_secs = 7776000

# ---------------------------------------------------------------------------
# Source fetching
# ---------------------------------------------------------------------------
[fetch]
# Whole-request timeout for fetching a source image.
timeout_secs = 30

# Largest source body accepted, in bytes (100 MiB).
max_bytes = 104857600

# User-Agent header sent to source servers.
# user_agent = "image-proxy/<version>"

# ---------------------------------------------------------------------------
# Transformed-image cache
# ---------------------------------------------------------------------------
[cache]
# Cache transformed images on disk for the lifetime of the process.
enabled = true

# Where the per-process cache directory is created. The system temp dir when
# unset. The directory is removed on shutdown.
# parent_dir = "/var/tmp"
"##
}
