//! On-disk cache of fetched documents.
//!
//! Entries are opaque bytes keyed by the SHA-256 of the location string they
//! were fetched from.
//!
//! # Layout
//!
//! ```text
//! <cache_dir>/
//! ├── 3f2a…c9          # entry for one location
//! └── 3f2a…c9.old      # present only while that entry is being refreshed
//! ```

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::util::fs::write_atomic;
use crate::util::hash::hash_bytes;

const STASH_SUFFIX: &str = "old";

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to read cache entry {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write cache entry {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Content cache for remote locations.
#[derive(Debug, Clone)]
pub struct ResourceCache {
  dir: PathBuf,
}

impl ResourceCache {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// Path of the entry for `location`.
  pub fn path_for(&self, location: &str) -> PathBuf {
    self.dir.join(hash_bytes(location.as_bytes()).0)
  }

  /// Cached bytes for `location`, or `None` on a miss.
  pub fn get(&self, location: &str) -> Result<Option<Vec<u8>>, CacheError> {
    let path = self.path_for(location);
    match fs::read(&path) {
      Ok(bytes) => {
        trace!(location = %location, path = %path.display(), "cache hit");
        Ok(Some(bytes))
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        trace!(location = %location, "cache miss");
        Ok(None)
      }
      Err(source) => Err(CacheError::Read { path, source }),
    }
  }

  /// Store `bytes` for `location`. Readers never observe a partial entry.
  pub fn put(&self, location: &str, bytes: &[u8]) -> Result<(), CacheError> {
    let path = self.path_for(location);
    write_atomic(&path, bytes).map_err(|source| CacheError::Write {
      path: path.clone(),
      source,
    })?;
    debug!(location = %location, path = %path.display(), size = bytes.len(), "cached");
    Ok(())
  }

  /// Replace the entry for `location` with freshly fetched bytes.
  ///
  /// The current entry is moved aside first so `fetch` cannot be answered from
  /// it. If `fetch` fails the old entry is moved back and the fetch error is
  /// returned.
  pub async fn refresh<F, Fut, E>(&self, location: &str, fetch: F) -> Result<Vec<u8>, E>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<u8>, E>>,
    E: From<CacheError>,
  {
    let path = self.path_for(location);
    let stash = path.with_extension(STASH_SUFFIX);

    let stashed = match fs::rename(&path, &stash) {
      Ok(()) => true,
      Err(e) if e.kind() == io::ErrorKind::NotFound => false,
      Err(source) => return Err(CacheError::Write { path, source }.into()),
    };

    match fetch().await {
      Ok(bytes) => {
        self.put(location, &bytes)?;
        if stashed && let Err(e) = fs::remove_file(&stash) {
          warn!(path = %stash.display(), error = %e, "failed to remove stale cache entry");
        }
        info!(location = %location, "refreshed cache entry");
        Ok(bytes)
      }
      Err(e) => {
        if stashed {
          fs::rename(&stash, &path).map_err(|source| CacheError::Write {
            path: path.clone(),
            source,
          })?;
          debug!(location = %location, "restored previous cache entry");
        }
        Err(e)
      }
    }
  }
}
