//! Service specification loading.
//!
//! [`SpecLoader::resolve`] turns a service name into the bytes of a service
//! document. Sources are tried in order:
//!
//! 1. An inline spec of that name in the configuration
//! 2. A local path (`/…`, `./…`, `../…`)
//! 3. Remote locations: the name itself when it is an `http(s)://` URL,
//!    otherwise `{repo}/{initial}/{name}.yml` for each configured repository.
//!    The cache is consulted first; the network only when it is allowed.
//!
//! A load that would need the network while it is unavailable fails with
//! [`LoadError::NoNetwork`] so callers can retry on a later pass.

pub mod cache;
pub mod fetch;

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::service::{ParseError, ServiceSet, render_services};

pub use cache::{CacheError, ResourceCache};
pub use fetch::{FetchError, HttpFetcher};

const INDEX_FILE: &str = "index.yml";

#[derive(Debug, Error)]
pub enum LoadError {
  /// The document is only reachable over the network, which is not up yet.
  #[error("{name}: network not available")]
  NoNetwork { name: String },

  /// No source produced a document for this name.
  #[error("{name}: service not found")]
  NotFound { name: String },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to render inline spec for {name}: {source}")]
  Render {
    name: String,
    #[source]
    source: ParseError,
  },

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Cache(#[from] CacheError),
}

impl LoadError {
  /// Whether a later pass may succeed where this one failed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, LoadError::NoNetwork { .. } | LoadError::NotFound { .. })
  }

  pub fn is_no_network(&self) -> bool {
    matches!(self, LoadError::NoNetwork { .. })
  }
}

/// Catalog sections published in each repository's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogKind {
  Services,
  Consoles,
  Engines,
}

impl CatalogKind {
  pub const ALL: [CatalogKind; 3] = [CatalogKind::Services, CatalogKind::Consoles, CatalogKind::Engines];

  pub fn as_str(&self) -> &'static str {
    match self {
      CatalogKind::Services => "services",
      CatalogKind::Consoles => "consoles",
      CatalogKind::Engines => "engines",
    }
  }
}

impl fmt::Display for CatalogKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CatalogIndex {
  services: Vec<String>,
  consoles: Vec<String>,
  engines: Vec<String>,
}

impl CatalogIndex {
  fn section(&self, kind: CatalogKind) -> &[String] {
    match kind {
      CatalogKind::Services => &self.services,
      CatalogKind::Consoles => &self.consoles,
      CatalogKind::Engines => &self.engines,
    }
  }
}

/// Outcome of [`SpecLoader::refresh_catalog`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
  pub refreshed: usize,
  pub failed: usize,
}

/// Location of `name` in the repository at `repo_url`.
pub fn service_url(repo_url: &str, name: &str) -> String {
  let repo_url = repo_url.trim_end_matches('/');
  let initial = name.chars().next().map(String::from).unwrap_or_default();
  format!("{}/{}/{}.yml", repo_url, initial, name)
}

fn index_url(repo_url: &str) -> String {
  format!("{}/{}", repo_url.trim_end_matches('/'), INDEX_FILE)
}

fn is_path(name: &str) -> bool {
  name.starts_with('/') || name.starts_with("./") || name.starts_with("../")
}

fn is_url(name: &str) -> bool {
  name.starts_with("http://") || name.starts_with("https://")
}

/// Resolves service names to service documents.
#[derive(Debug, Clone)]
pub struct SpecLoader {
  cache: ResourceCache,
  fetcher: HttpFetcher,
}

impl SpecLoader {
  pub fn new(cache: ResourceCache, fetcher: HttpFetcher) -> Self {
    Self { cache, fetcher }
  }

  /// Loader using the configured cache directory and retry count.
  pub fn from_config(config: &Config) -> Self {
    Self::new(
      ResourceCache::new(config.cache_dir()),
      HttpFetcher::new(config.http_load_retries),
    )
  }

  pub fn cache(&self) -> &ResourceCache {
    &self.cache
  }

  /// Resolve `name` to the bytes of a service document.
  pub async fn resolve(&self, name: &str, allow_network: bool, config: &Config) -> Result<Vec<u8>, LoadError> {
    if name.is_empty() {
      return Err(LoadError::NotFound { name: String::new() });
    }

    if let Some(spec) = config.services.get(name) {
      debug!(service = %name, "using inline spec");
      let mut single = ServiceSet::new();
      single.insert(name.to_string(), spec.clone());
      return render_services(&single).map_err(|source| LoadError::Render {
        name: name.to_string(),
        source,
      });
    }

    if is_path(name) {
      debug!(service = %name, "reading spec from disk");
      return tokio::fs::read(name).await.map_err(|source| LoadError::Read {
        path: PathBuf::from(name),
        source,
      });
    }

    let locations = if is_url(name) {
      vec![name.to_string()]
    } else {
      config
        .repository_urls()
        .iter()
        .map(|url| service_url(url, name))
        .collect()
    };

    self.load_remote(name, &locations, allow_network).await
  }

  async fn load_remote(&self, name: &str, locations: &[String], allow_network: bool) -> Result<Vec<u8>, LoadError> {
    for location in locations {
      if let Some(bytes) = self.cache.get(location)? {
        debug!(service = %name, location = %location, "loaded from cache");
        return Ok(bytes);
      }
    }

    if !allow_network {
      return Err(LoadError::NoNetwork { name: name.to_string() });
    }

    for location in locations {
      match self.fetcher.fetch(location).await {
        Ok(bytes) => {
          // A failed cache write only costs a refetch later.
          if let Err(e) = self.cache.put(location, &bytes) {
            warn!(location = %location, error = %e, "failed to cache fetched document");
          }
          info!(service = %name, location = %location, "loaded from network");
          return Ok(bytes);
        }
        Err(e) => debug!(service = %name, location = %location, error = %e, "location failed"),
      }
    }

    Err(LoadError::NotFound { name: name.to_string() })
  }

  /// Names listed under `kind` across all repositories, sorted and deduplicated.
  ///
  /// Repositories whose index cannot be loaded are logged and skipped.
  pub async fn list_catalog(&self, kind: CatalogKind, allow_network: bool, config: &Config) -> Vec<String> {
    let mut names = BTreeSet::new();
    for repo in config.repository_urls() {
      let location = index_url(&repo);
      match self.load_remote(&location, std::slice::from_ref(&location), allow_network).await {
        Ok(bytes) => match serde_yaml::from_slice::<CatalogIndex>(&bytes) {
          Ok(index) => names.extend(index.section(kind).iter().cloned()),
          Err(e) => error!(location = %location, error = %e, "malformed catalog index"),
        },
        Err(e) if e.is_no_network() => debug!(location = %location, "catalog index needs network"),
        Err(e) => error!(location = %location, error = %e, "failed to load catalog index"),
      }
    }
    names.into_iter().collect()
  }

  /// Refetch each repository's index and every document it lists under `kind`.
  ///
  /// Entries that fail to refresh keep their previous cached content.
  pub async fn refresh_catalog(&self, kind: CatalogKind, config: &Config) -> RefreshReport {
    let mut report = RefreshReport::default();
    for repo in config.repository_urls() {
      let location = index_url(&repo);
      let index = match self.refresh_location(&location).await {
        Ok(bytes) => {
          report.refreshed += 1;
          match serde_yaml::from_slice::<CatalogIndex>(&bytes) {
            Ok(index) => index,
            Err(e) => {
              error!(location = %location, error = %e, "malformed catalog index");
              continue;
            }
          }
        }
        Err(e) => {
          report.failed += 1;
          error!(location = %location, error = %e, "failed to refresh catalog index");
          continue;
        }
      };

      for name in index.section(kind) {
        let location = service_url(&repo, name);
        match self.refresh_location(&location).await {
          Ok(_) => report.refreshed += 1,
          Err(e) => {
            report.failed += 1;
            error!(service = %name, location = %location, error = %e, "failed to refresh");
          }
        }
      }
    }
    info!(kind = %kind, refreshed = report.refreshed, failed = report.failed, "catalog refresh finished");
    report
  }

  async fn refresh_location(&self, location: &str) -> Result<Vec<u8>, LoadError> {
    self
      .cache
      .refresh(location, || async { self.fetcher.fetch(location).await.map_err(LoadError::from) })
      .await
  }
}
