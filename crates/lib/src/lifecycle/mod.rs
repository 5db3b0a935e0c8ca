//! Applying one service against the runtime.
//!
//! Each apply walks a service through
//!
//! ```text
//! absent -> defined -> created -> created-only
//!                              \-> started -> [waited] -> done
//! ```
//!
//! with a `rebuilding` excursion out of `created` when an existing container
//! has to be recreated. Which branch is taken is decided by the service's
//! [`ApplyPolicy`], never by inspecting labels here.

pub mod rebuild;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::{CONSOLE_SERVICE, LABEL_CONFIG_HASH};
use crate::runtime::{ContainerInfo, ContainerRuntime, RuntimeError};
use crate::service::{ApplyPolicy, Link, ServiceSet, ServiceSpec, StartMode, resolve_links, service_hash};
use crate::util::hash::{HashError, ObjectHash};

pub use rebuild::{ConsoleRebuildLatch, RebuildDecision, decide_rebuild};

/// Where a service is within one apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceState {
  Absent,
  Defined,
  Created,
  Rebuilding,
  Started,
  Waited,
  Done,
  CreatedOnly,
}

impl fmt::Display for ServiceState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ServiceState::Absent => "absent",
      ServiceState::Defined => "defined",
      ServiceState::Created => "created",
      ServiceState::Rebuilding => "rebuilding",
      ServiceState::Started => "started",
      ServiceState::Waited => "waited",
      ServiceState::Done => "done",
      ServiceState::CreatedOnly => "created-only",
    };
    f.write_str(s)
  }
}

/// What one apply did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
  pub service: String,
  pub hash: ObjectHash,
  pub state: ServiceState,
  pub links: Vec<Link>,
  /// Rebuild decision per container found after create.
  pub decisions: Vec<RebuildDecision>,
  /// Ids of the replacement containers.
  pub rebuilt: Vec<String>,
  pub exit_code: Option<i64>,
}

/// Result of a successful apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
  Done(ApplyReport),
  /// The service asked for the whole pass to start over.
  RestartRequested(ApplyReport),
}

impl ApplyOutcome {
  pub fn report(&self) -> &ApplyReport {
    match self {
      ApplyOutcome::Done(report) | ApplyOutcome::RestartRequested(report) => report,
    }
  }

  pub fn is_restart(&self) -> bool {
    matches!(self, ApplyOutcome::RestartRequested(_))
  }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error("{service}: failed to hash spec: {source}")]
  Hash {
    service: String,
    #[source]
    source: HashError,
  },

  #[error("{service}: {op} failed: {source}")]
  Runtime {
    service: String,
    op: &'static str,
    #[source]
    source: RuntimeError,
  },
}

impl LifecycleError {
  pub fn service(&self) -> &str {
    match self {
      LifecycleError::Hash { service, .. } | LifecycleError::Runtime { service, .. } => service,
    }
  }
}

fn runtime_err<'a>(service: &'a str, op: &'static str) -> impl FnOnce(RuntimeError) -> LifecycleError + 'a {
  move |source| LifecycleError::Runtime {
    service: service.to_string(),
    op,
    source,
  }
}

struct Progress<'a> {
  service: &'a str,
  state: ServiceState,
}

impl Progress<'_> {
  fn to(&mut self, next: ServiceState) {
    debug!(service = %self.service, from = %self.state, to = %next, "state transition");
    self.state = next;
  }
}

/// Drives single services through their lifecycle.
pub struct LifecycleController {
  runtime: Arc<dyn ContainerRuntime>,
  latch: ConsoleRebuildLatch,
}

impl LifecycleController {
  pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
    Self {
      runtime,
      latch: ConsoleRebuildLatch::default(),
    }
  }

  pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
    &self.runtime
  }

  pub fn latch(&self) -> &ConsoleRebuildLatch {
    &self.latch
  }

  /// Apply `spec` under `name`, with links resolved against `set`.
  pub async fn apply(&self, name: &str, spec: &ServiceSpec, set: &ServiceSet) -> Result<ApplyOutcome, LifecycleError> {
    let mut progress = Progress {
      service: name,
      state: ServiceState::Absent,
    };
    let policy = ApplyPolicy::from_spec(spec);
    let hash = service_hash(name, spec).map_err(|source| LifecycleError::Hash {
      service: name.to_string(),
      source,
    })?;

    let mut desired = spec.normalized(name);
    desired.labels.insert(LABEL_CONFIG_HASH.to_string(), hash.0.clone());

    // nothing to pull for an image-less spec
    let image_present = spec.image.is_empty()
      || self
        .runtime
        .image_id(&spec.image)
        .await
        .map_err(runtime_err(name, "image lookup"))?
        .is_some();
    let links = resolve_links(name, spec, set, image_present);

    self
      .runtime
      .define(name, &desired, &links)
      .await
      .map_err(runtime_err(name, "define"))?;
    progress.to(ServiceState::Defined);

    self.runtime.create(name).await.map_err(runtime_err(name, "create"))?;
    progress.to(ServiceState::Created);

    let (decisions, rebuilt) = self.rebuild_if_needed(name, &desired, &policy, &mut progress).await?;

    let mut exit_code = None;
    if policy.start == StartMode::CreateOnly {
      progress.to(ServiceState::CreatedOnly);
    } else {
      self.runtime.start(name).await.map_err(runtime_err(name, "start"))?;
      progress.to(ServiceState::Started);

      if policy.start == StartMode::Blocking {
        debug!(service = %name, "waiting for exit");
        let code = self.runtime.wait(name).await.map_err(runtime_err(name, "wait"))?;
        if code != 0 {
          warn!(service = %name, exit_code = code, "service exited with non-zero status");
        }
        exit_code = Some(code);
        progress.to(ServiceState::Waited);
      }
      progress.to(ServiceState::Done);
    }

    let report = ApplyReport {
      service: name.to_string(),
      hash,
      state: progress.state,
      links,
      decisions,
      rebuilt,
      exit_code,
    };

    if policy.reload_config {
      info!(service = %name, "service requests a configuration reload");
      Ok(ApplyOutcome::RestartRequested(report))
    } else {
      Ok(ApplyOutcome::Done(report))
    }
  }

  async fn rebuild_if_needed(
    &self,
    name: &str,
    desired: &ServiceSpec,
    policy: &ApplyPolicy,
    progress: &mut Progress<'_>,
  ) -> Result<(Vec<RebuildDecision>, Vec<String>), LifecycleError> {
    let containers = self.runtime.containers(name).await.map_err(runtime_err(name, "list"))?;
    let mut decisions = Vec::with_capacity(containers.len());
    let mut rebuilt = Vec::new();

    for container in containers {
      let out_of_sync = self.out_of_sync(desired, &container).await.map_err(runtime_err(name, "inspect"))?;
      let force_console = !policy.always_reprocess() && name == CONSOLE_SERVICE && self.latch.take();
      let decision = decide_rebuild(
        name,
        &policy.rebuild,
        &desired.labels,
        &container,
        out_of_sync,
        force_console,
      );
      decisions.push(decision);

      if decision == RebuildDecision::Suppressed {
        warn!(service = %name, container = %container.id, "container is out of sync and needs rebuilding");
        continue;
      }
      if !decision.rebuild() {
        continue;
      }

      info!(service = %name, container = %container.id, reason = ?decision, "rebuilding");
      progress.to(ServiceState::Rebuilding);
      let survivors = match self.runtime.recreate(&container.id, &desired.image).await {
        Ok(replacement) => {
          rebuilt.push(replacement.id.clone());
          vec![replacement]
        }
        Err(e) if e.is_mount_name_conflict() => {
          warn!(service = %name, container = %container.id, error = %e, "ignoring mount name conflict during rebuild");
          self.runtime.containers(name).await.map_err(runtime_err(name, "list"))?
        }
        Err(e) => return Err(runtime_err(name, "recreate")(e)),
      };

      let target = desired.container_name(name);
      for survivor in survivors.iter().filter(|c| c.name != target) {
        debug!(service = %name, from = %survivor.name, to = %target, "renaming container back");
        self
          .runtime
          .rename(&survivor.id, target)
          .await
          .map_err(runtime_err(name, "rename"))?;
      }
      progress.to(ServiceState::Created);
    }

    Ok((decisions, rebuilt))
  }

  /// A container is out of sync when its image, image digest, or config hash
  /// differs from what `desired` would produce now.
  async fn out_of_sync(&self, desired: &ServiceSpec, container: &ContainerInfo) -> Result<bool, RuntimeError> {
    if container.image != desired.image {
      return Ok(true);
    }
    if container.label(LABEL_CONFIG_HASH) != desired.label(LABEL_CONFIG_HASH) {
      return Ok(true);
    }
    let current = self.runtime.image_id(&desired.image).await?;
    Ok(current.is_some() && current != container.image_id)
  }
}
