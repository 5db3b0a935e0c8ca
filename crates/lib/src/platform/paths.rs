use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Environment variable overriding the configuration file location.
pub const CONFIG_ENV: &str = "KEELOS_CONFIG";

/// Environment variable overriding the resource cache directory.
pub const CACHE_DIR_ENV: &str = "KEELOS_CACHE_DIR";

/// Returns the user's home directory, or `/` when `HOME` is unset (early boot).
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/"))
}

/// Returns the directory for configuration files for the application
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for cache files for the application
///
/// `KEELOS_CACHE_DIR` wins over the XDG location.
pub fn cache_dir() -> PathBuf {
  if let Some(dir) = std::env::var_os(CACHE_DIR_ENV) {
    return PathBuf::from(dir);
  }
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the path of the engine configuration file.
///
/// `KEELOS_CONFIG` wins over `{config_dir}/keelos.yml`.
pub fn default_config_path() -> PathBuf {
  if let Some(path) = std::env::var_os(CONFIG_ENV) {
    return PathBuf::from(path);
  }
  config_dir().join(format!("{}.yml", APP_NAME))
}
