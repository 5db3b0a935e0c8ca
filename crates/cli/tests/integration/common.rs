//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Isolated test environment.
///
/// Each test gets its own temporary directory holding the config file and the
/// resource cache.
pub struct TestEnv {
  pub temp: TempDir,
  pub config_path: PathBuf,
}

impl TestEnv {
  /// Create with `content` as the engine configuration.
  pub fn with_config(content: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("keelos.yml");
    std::fs::write(&config_path, content).unwrap();
    Self { temp, config_path }
  }

  /// Write a file relative to the temp directory and return its path.
  pub fn write_file(&self, relative_path: &str, content: &str) -> PathBuf {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    dunce::canonicalize(&path).unwrap_or(path)
  }

  /// Cache path (isolated per test).
  pub fn cache_path(&self) -> PathBuf {
    let p = self.temp.path().join("cache");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Get a pre-configured Command for the keel binary.
  ///
  /// Sets environment variables for isolated testing:
  /// - `KEELOS_CONFIG`: the test's config file
  /// - `KEELOS_CACHE_DIR`: isolated resource cache
  pub fn keel_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("keel");
    cmd.env("KEELOS_CONFIG", &self.config_path);
    cmd.env("KEELOS_CACHE_DIR", self.cache_path());
    cmd
  }
}
