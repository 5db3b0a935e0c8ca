//! HTTP fetching with retries.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Error)]
pub enum FetchError {
  /// The server answered with a non-success status. Not retried.
  #[error("GET {url} returned HTTP {status}")]
  Status { url: String, status: u16 },

  /// The request failed before a response arrived.
  #[error("GET {url} failed: {source}")]
  Transport {
    url: String,
    #[source]
    source: reqwest::Error,
  },
}

/// Fetches remote documents, retrying transport failures.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  retries: u32,
  backoff: Duration,
}

impl HttpFetcher {
  /// A fetcher that retries transport failures up to `retries` times.
  pub fn new(retries: u32) -> Self {
    Self {
      client: reqwest::Client::new(),
      retries,
      backoff: DEFAULT_BACKOFF,
    }
  }

  /// Base delay between attempts; attempt `n` waits `n * backoff`.
  pub fn with_backoff(mut self, backoff: Duration) -> Self {
    self.backoff = backoff;
    self
  }

  pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    let mut attempt = 0;
    loop {
      match self.fetch_once(url).await {
        Err(FetchError::Transport { source, .. }) if attempt < self.retries => {
          attempt += 1;
          warn!(location = %url, attempt, error = %source, "fetch failed, retrying");
          tokio::time::sleep(self.backoff * attempt).await;
        }
        result => return result,
      }
    }
  }

  async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
    let transport = |source| FetchError::Transport {
      url: url.to_string(),
      source,
    };

    let response = self.client.get(url).send().await.map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Status {
        url: url.to_string(),
        status: status.as_u16(),
      });
    }

    let bytes = response.bytes().await.map_err(transport)?;
    debug!(location = %url, size = bytes.len(), "fetched");
    Ok(bytes.to_vec())
  }
}
