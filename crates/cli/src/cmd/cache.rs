//! Implementation of the `keel cache refresh` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Result, bail};

use keelos_lib::loader::{CatalogKind, SpecLoader};

use super::{async_runtime, load_config};
use crate::output::{format_duration, print_error, print_info, print_stat, print_success};

pub fn cmd_cache_refresh(config_path: Option<&Path>, kinds: &[CatalogKind]) -> Result<()> {
  let start = Instant::now();
  let config = load_config(config_path)?;

  if config.repositories.is_empty() {
    print_info("No repositories configured");
    return Ok(());
  }

  let loader = SpecLoader::from_config(&config);
  let rt = async_runtime()?;

  let mut failed = 0;
  for kind in kinds {
    let report = rt.block_on(loader.refresh_catalog(*kind, &config));
    print_stat(
      kind.as_str(),
      &format!("{} refreshed, {} failed", report.refreshed, report.failed),
    );
    failed += report.failed;
  }

  print_stat("Cache", &loader.cache().dir().display().to_string());
  print_stat("Duration", &format_duration(start.elapsed()));

  if failed > 0 {
    print_error(&format!("{} cache entries kept their previous content", failed));
    bail!("cache refresh incomplete");
  }
  print_success("Cache refreshed");
  Ok(())
}
