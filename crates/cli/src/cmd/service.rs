//! Implementation of the `keel service` commands.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use keelos_lib::loader::{CatalogKind, SpecLoader};
use keelos_lib::service::{
  ApplyPolicy, Link, RebuildPolicy, Scope, ServiceSet, StartMode, parse_services, resolve_links, service_hash,
};

use super::{async_runtime, load_config};
use crate::output::{
  OutputFormat, format_list, print_heading, print_info, print_json, print_stat, print_success, symbols, truncate_hash,
};

#[derive(Debug, Serialize)]
struct ServiceView {
  name: String,
  hash: String,
  image: String,
  container_name: String,
  policy: ApplyPolicy,
  links: Vec<Link>,
}

/// Resolve `name` through the loader and describe every service it defines.
pub fn cmd_service_show(config_path: Option<&Path>, name: &str, network: bool, output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;
  let loader = SpecLoader::from_config(&config);

  let bytes = async_runtime()?
    .block_on(loader.resolve(name, network, &config))
    .with_context(|| format!("Failed to load service: {}", name))?;
  let document = parse_services(&bytes).with_context(|| format!("Failed to parse service: {}", name))?;

  let mut set: ServiceSet = config.services.clone();
  set.extend(document.clone());

  let views = document
    .iter()
    .map(|(service, spec)| {
      let hash = service_hash(service, spec).with_context(|| format!("Failed to hash service: {}", service))?;
      Ok(ServiceView {
        name: service.clone(),
        hash: hash.0,
        image: spec.image.clone(),
        container_name: spec.container_name(service).to_string(),
        policy: ApplyPolicy::from_spec(spec),
        // A dry view assumes a fresh host with no images pulled yet.
        links: resolve_links(service, spec, &set, false),
      })
    })
    .collect::<Result<Vec<_>>>()?;

  if output.is_json() {
    return print_json(&views);
  }

  for (i, view) in views.iter().enumerate() {
    if i > 0 {
      println!();
    }
    print_success(&format!("{} ({})", view.name, truncate_hash(&view.hash)));
    print_stat("Image", &view.image);
    print_stat("Container", &view.container_name);
    print_stat("Scope", scope_label(view.policy.scope));
    print_stat("Start", start_label(view.policy.start));
    print_stat("Rebuild", &rebuild_label(&view.policy.rebuild));
    print_stat("Reload config", if view.policy.reload_config { "yes" } else { "no" });
    print_stat("Links", &format_list(&view.links));
  }

  Ok(())
}

/// List the catalog sections published by the configured repositories.
pub fn cmd_service_list(config_path: Option<&Path>, kinds: &[CatalogKind], output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;
  let loader = SpecLoader::from_config(&config);
  let rt = async_runtime()?;

  let mut catalog: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
  for kind in kinds {
    let names = rt.block_on(loader.list_catalog(*kind, true, &config));
    catalog.insert(kind.as_str(), names);
  }

  if output.is_json() {
    return print_json(&catalog);
  }

  if config.repositories.is_empty() {
    print_info("No repositories configured");
    return Ok(());
  }

  for kind in kinds {
    let names = catalog.get(kind.as_str()).map(Vec::as_slice).unwrap_or_default();
    print_heading(&format!("{} ({})", kind, names.len()));
    for name in names {
      println!("  {} {}", symbols::INFO, name);
    }
  }

  Ok(())
}

fn scope_label(scope: Scope) -> &'static str {
  match scope {
    Scope::System => "system",
    Scope::User => "user",
  }
}

fn start_label(start: StartMode) -> &'static str {
  match start {
    StartMode::CreateOnly => "create only",
    StartMode::Detached => "detached",
    StartMode::Blocking => "blocking",
  }
}

fn rebuild_label(rebuild: &RebuildPolicy) -> String {
  match rebuild {
    RebuildPolicy::Always => "always".to_string(),
    RebuildPolicy::OnChange(None) => "on change".to_string(),
    RebuildPolicy::OnChange(Some(label)) => format!("on change ({})", label),
  }
}
