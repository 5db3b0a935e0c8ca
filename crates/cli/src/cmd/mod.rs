mod cache;
mod plan;
mod service;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use keelos_lib::config::{Config, ConfigSource, FileConfigSource};

pub use cache::cmd_cache_refresh;
pub use plan::cmd_plan;
pub use service::{cmd_service_list, cmd_service_show};

/// Load the configuration at `path`, or at the platform default.
fn load_config(path: Option<&Path>) -> Result<Config> {
  let source = match path {
    Some(path) => FileConfigSource::new(path),
    None => FileConfigSource::from_default_path(),
  };
  debug!(path = %source.path().display(), "loading config");
  source
    .load()
    .with_context(|| format!("Failed to load config: {}", source.path().display()))
}

fn async_runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
