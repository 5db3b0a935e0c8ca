//! Engine configuration.
//!
//! The desired-state set and engine settings live in a single YAML document.
//! The reconcile loop never holds on to a `Config` between passes: it asks a
//! [`ConfigSource`] for a fresh one at every pass boundary.
//!
//! # Example
//!
//! ```yaml
//! services:
//!   network:
//!     image: keelos/network:v1
//!     labels: { io.keelos.scope: system, io.keelos.reloadconfig: "true" }
//! services_include:
//!   ntp: true
//! console: default
//! engine: docker-24.0
//! default_engine: docker-24.0
//! repositories:
//!   core: { url: "https://example.org/os-services" }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::DEFAULT_CONSOLE;
use crate::platform::paths;
use crate::service::ServiceSet;
use crate::util::fs::write_atomic;

const FORCE_CONSOLE_REBUILD_KEY: &str = "force_console_rebuild";

fn default_http_load_retries() -> u32 {
  3
}

/// A remote service catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
  pub url: String,
}

/// Engine configuration, re-read at every pass boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Inline name -> specification map.
  pub services: ServiceSet,

  /// Name -> enabled. Enabled names are resolved through the loader.
  pub services_include: BTreeMap<String, bool>,

  /// Console substitution. Empty or `default` keeps the built-in console.
  pub console: String,

  /// Engine substitution. Empty or equal to `default_engine` keeps the default.
  pub engine: String,

  pub default_engine: String,

  /// Repositories, tried in key order.
  pub repositories: BTreeMap<String, Repository>,

  /// One-shot request to rebuild the console on the next apply.
  pub force_console_rebuild: bool,

  /// Retries for transport failures while fetching a remote document.
  #[serde(default = "default_http_load_retries")]
  pub http_load_retries: u32,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      services: ServiceSet::new(),
      services_include: BTreeMap::new(),
      console: String::new(),
      engine: String::new(),
      default_engine: String::new(),
      repositories: BTreeMap::new(),
      force_console_rebuild: false,
      http_load_retries: default_http_load_retries(),
      cache_dir: None,
    }
  }
}

impl Config {
  /// Parse a configuration document.
  pub fn from_yaml(bytes: &[u8]) -> Result<Self, serde_yaml::Error> {
    let parsed: Option<Config> = serde_yaml::from_slice(bytes)?;
    Ok(parsed.unwrap_or_default())
  }

  /// Repository URLs in lookup order.
  pub fn repository_urls(&self) -> Vec<String> {
    self.repositories.values().map(|r| r.url.clone()).collect()
  }

  /// Enabled include names, in key order.
  pub fn enabled_includes(&self) -> impl Iterator<Item = &str> {
    self
      .services_include
      .iter()
      .filter(|(_, enabled)| **enabled)
      .map(|(name, _)| name.as_str())
  }

  /// The console service to substitute, if one is selected.
  pub fn console_substitution(&self) -> Option<&str> {
    match self.console.as_str() {
      "" | DEFAULT_CONSOLE => None,
      name => Some(name),
    }
  }

  /// The engine service to substitute, if one other than the default is selected.
  pub fn engine_substitution(&self) -> Option<&str> {
    match self.engine.as_str() {
      "" => None,
      name if name == self.default_engine => None,
      name => Some(name),
    }
  }

  /// The resource cache directory.
  pub fn cache_dir(&self) -> PathBuf {
    self.cache_dir.clone().unwrap_or_else(paths::cache_dir)
  }
}

/// Errors that can occur when loading or updating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("failed to write config {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Where the reconcile loop gets its configuration from.
pub trait ConfigSource: Send + Sync {
  /// Produce the current configuration.
  fn load(&self) -> Result<Config, ConfigError>;

  /// Persist that the one-shot console rebuild request has been consumed.
  fn clear_force_console_rebuild(&self) -> Result<(), ConfigError>;
}

/// Configuration read from a YAML file on every load.
#[derive(Debug, Clone)]
pub struct FileConfigSource {
  path: PathBuf,
}

impl FileConfigSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// Source at [`paths::default_config_path`].
  pub fn from_default_path() -> Self {
    Self::new(paths::default_config_path())
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn read(&self) -> Result<Vec<u8>, ConfigError> {
    fs::read(&self.path).map_err(|source| ConfigError::Read {
      path: self.path.clone(),
      source,
    })
  }

  fn parse_error(&self, source: serde_yaml::Error) -> ConfigError {
    ConfigError::Parse {
      path: self.path.clone(),
      source,
    }
  }
}

impl ConfigSource for FileConfigSource {
  fn load(&self) -> Result<Config, ConfigError> {
    let bytes = self.read()?;
    let config = Config::from_yaml(&bytes).map_err(|e| self.parse_error(e))?;
    debug!(
      path = %self.path.display(),
      services = config.services.len(),
      includes = config.services_include.len(),
      "loaded config"
    );
    Ok(config)
  }

  fn clear_force_console_rebuild(&self) -> Result<(), ConfigError> {
    let bytes = self.read()?;
    let mut doc: Value = serde_yaml::from_slice(&bytes).map_err(|e| self.parse_error(e))?;

    // Edit the raw document so unknown keys and the author's layout of other
    // entries survive the rewrite.
    let Value::Mapping(map) = &mut doc else {
      return Ok(());
    };
    let key = Value::String(FORCE_CONSOLE_REBUILD_KEY.to_string());
    if map.get(&key) != Some(&Value::Bool(true)) {
      return Ok(());
    }
    map.insert(key, Value::Bool(false));

    let rendered = serde_yaml::to_string(&doc).map_err(|e| self.parse_error(e))?;
    write_atomic(&self.path, rendered.as_bytes()).map_err(|source| ConfigError::Write {
      path: self.path.clone(),
      source,
    })?;
    info!(path = %self.path.display(), "cleared force_console_rebuild");
    Ok(())
  }
}
