//! The container runtime seam.
//!
//! The engine drives a Docker-compatible runtime through [`ContainerRuntime`]
//! and never talks to a daemon directly. [`memory::MemoryRuntime`] is an
//! in-process implementation that records every mutating call.

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::service::{Link, ServiceSpec};

pub use memory::{MemoryRuntime, Op, RuntimeCall};

/// Daemon error text for the benign mount-name conflict seen on some boot paths.
const MOUNT_NAME_CONFLICT_TEXT: &str = "mount name conflict";

#[derive(Debug, Error)]
pub enum RuntimeError {
  #[error("no such service or container: {name}")]
  NotFound { name: String },

  #[error("mount name conflict recreating {container}")]
  MountNameConflict { container: String },

  #[error("runtime error: {message}")]
  Api { message: String },
}

impl RuntimeError {
  /// Whether this is the benign mount-name conflict class of recreate failure.
  pub fn is_mount_name_conflict(&self) -> bool {
    match self {
      RuntimeError::MountNameConflict { .. } => true,
      RuntimeError::Api { message } => message.to_lowercase().contains(MOUNT_NAME_CONFLICT_TEXT),
      RuntimeError::NotFound { .. } => false,
    }
  }
}

/// A runtime container as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
  pub id: String,
  pub name: String,
  pub service: String,
  pub image: String,
  /// Digest of the image the container was created from.
  pub image_id: Option<String>,
  pub labels: BTreeMap<String, String>,
  pub running: bool,
  pub pid: Option<u32>,
}

impl ContainerInfo {
  pub fn label(&self, key: &str) -> Option<&str> {
    self.labels.get(key).map(String::as_str)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
  Created,
  Started,
  Stopped,
  Renamed,
}

impl fmt::Display for EventKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      EventKind::Created => "created",
      EventKind::Started => "started",
      EventKind::Stopped => "stopped",
      EventKind::Renamed => "renamed",
    };
    f.write_str(s)
  }
}

/// A container lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeEvent {
  pub service: String,
  pub container_id: String,
  pub kind: EventKind,
}

/// Operations the engine needs from a container runtime.
///
/// Services are addressed by name; individual containers by id. Every call
/// may block for as long as the runtime takes; the engine imposes no deadline.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
  /// Register (or replace) the definition of a service and its links.
  async fn define(&self, name: &str, spec: &ServiceSpec, links: &[Link]) -> Result<(), RuntimeError>;

  /// Create the service's container if none exists. Idempotent.
  async fn create(&self, name: &str) -> Result<(), RuntimeError>;

  /// Start every container of the service.
  async fn start(&self, name: &str) -> Result<(), RuntimeError>;

  /// Block until the service's container exits; returns its exit code.
  async fn wait(&self, name: &str) -> Result<i64, RuntimeError>;

  /// Containers currently belonging to the service.
  async fn containers(&self, name: &str) -> Result<Vec<ContainerInfo>, RuntimeError>;

  async fn inspect(&self, container_id: &str) -> Result<ContainerInfo, RuntimeError>;

  /// Replace a container with a fresh one built from `image` and the
  /// service's current definition. The replacement may carry a different name.
  async fn recreate(&self, container_id: &str, image: &str) -> Result<ContainerInfo, RuntimeError>;

  async fn rename(&self, container_id: &str, new_name: &str) -> Result<(), RuntimeError>;

  /// Local image digest, or `None` if the image is not present.
  async fn image_id(&self, image: &str) -> Result<Option<String>, RuntimeError>;

  /// Pull the image of a defined service.
  async fn pull(&self, name: &str) -> Result<(), RuntimeError>;

  /// Subscribe to container lifecycle events.
  fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent>;
}
