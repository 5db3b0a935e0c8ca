//! Image staging.
//!
//! Staging pre-pulls the images of named services without creating any
//! containers, so a later switch to them does not wait on the network.

use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::loader::{LoadError, SpecLoader};
use crate::runtime::{ContainerRuntime, RuntimeError};
use crate::service::{ParseError, parse_services};

#[derive(Debug, Error)]
pub enum StageError {
  #[error("failed to load {name}: {source}")]
  Load {
    name: String,
    #[source]
    source: LoadError,
  },

  #[error("failed to parse {name}: {source}")]
  Parse {
    name: String,
    #[source]
    source: ParseError,
  },

  #[error("failed to stage {service}: {source}")]
  Runtime {
    service: String,
    #[source]
    source: RuntimeError,
  },
}

/// Load each named document and pull the images of every service it defines.
///
/// Only image and labels are registered with the runtime. Fails on the first
/// error. Returns the staged service names.
pub async fn stage_services(
  runtime: &dyn ContainerRuntime,
  loader: &SpecLoader,
  config: &Config,
  names: &[String],
) -> Result<Vec<String>, StageError> {
  let mut staged = Vec::new();
  for name in names {
    let bytes = loader
      .resolve(name, true, config)
      .await
      .map_err(|source| StageError::Load {
        name: name.clone(),
        source,
      })?;
    let services = parse_services(&bytes).map_err(|source| StageError::Parse {
      name: name.clone(),
      source,
    })?;

    for (service, spec) in services {
      runtime
        .define(&service, &spec.image_only(), &[])
        .await
        .map_err(|source| StageError::Runtime {
          service: service.clone(),
          source,
        })?;
      staged.push(service);
    }
  }

  for service in &staged {
    runtime.pull(service).await.map_err(|source| StageError::Runtime {
      service: service.clone(),
      source,
    })?;
    info!(service = %service, "staged");
  }
  Ok(staged)
}
