//! Shared helpers for library integration tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use keelos_lib::config::{Config, Repository};
use keelos_lib::loader::{HttpFetcher, ResourceCache, SpecLoader};
use keelos_lib::reconcile::{ReconcileOptions, Reconciler};
use keelos_lib::runtime::MemoryRuntime;
use keelos_lib::service::ServiceSpec;
use tempfile::TempDir;

/// Isolated engine: temp cache dir, fresh runtime, fresh reconciler.
pub struct Harness {
  pub temp: TempDir,
  pub rt: Arc<MemoryRuntime>,
  pub reconciler: Reconciler,
}

impl Harness {
  pub fn new(network: bool) -> Self {
    Self::with_options(network, ReconcileOptions::default())
  }

  pub fn with_options(network: bool, options: ReconcileOptions) -> Self {
    let temp = TempDir::new().unwrap();
    let rt = Arc::new(MemoryRuntime::new());
    let reconciler = Reconciler::new(rt.clone(), loader(&temp), options).with_network(network);
    Self { temp, rt, reconciler }
  }

  /// Write a file relative to the temp directory and return its absolute path.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
  }
}

pub fn loader(temp: &TempDir) -> SpecLoader {
  SpecLoader::new(
    ResourceCache::new(temp.path().join("cache")),
    HttpFetcher::new(0).with_backoff(Duration::ZERO),
  )
}

pub fn spec(image: &str, labels: &[(&str, &str)]) -> ServiceSpec {
  ServiceSpec {
    image: image.to_string(),
    labels: labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
    ..Default::default()
  }
}

pub fn config(services: &[(&str, ServiceSpec)]) -> Config {
  let mut config = Config::default();
  for (name, spec) in services {
    config.services.insert(name.to_string(), spec.clone());
  }
  config
}

pub fn with_repo(mut config: Config, url: &str) -> Config {
  config.repositories.insert("core".into(), Repository { url: url.to_string() });
  config
}
