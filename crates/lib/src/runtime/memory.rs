//! In-process container runtime.
//!
//! `MemoryRuntime` keeps definitions, containers and images in memory, emits
//! lifecycle events like a daemon would, and records every mutating call so
//! callers can see exactly what a pass did. Queries (`containers`, `inspect`,
//! `image_id`) are not recorded.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Notify, broadcast};
use tracing::trace;

use crate::consts::LABEL_SERVICE;
use crate::runtime::{ContainerInfo, ContainerRuntime, EventKind, RuntimeError, RuntimeEvent};
use crate::service::{Link, ServiceSpec};
use crate::util::hash::hash_bytes;

const EVENT_CAPACITY: usize = 256;

/// Kinds of mutating runtime operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
  Define,
  Create,
  Start,
  Wait,
  Recreate,
  Rename,
  Pull,
}

/// A recorded mutating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum RuntimeCall {
  Define { service: String, links: Vec<String> },
  Create { service: String },
  Start { service: String },
  Wait { service: String, exit_code: i64 },
  Recreate { service: String, image: String },
  Rename { service: String, from: String, to: String },
  Pull { service: String, image: String },
}

impl RuntimeCall {
  pub fn op(&self) -> Op {
    match self {
      RuntimeCall::Define { .. } => Op::Define,
      RuntimeCall::Create { .. } => Op::Create,
      RuntimeCall::Start { .. } => Op::Start,
      RuntimeCall::Wait { .. } => Op::Wait,
      RuntimeCall::Recreate { .. } => Op::Recreate,
      RuntimeCall::Rename { .. } => Op::Rename,
      RuntimeCall::Pull { .. } => Op::Pull,
    }
  }

  pub fn service(&self) -> &str {
    match self {
      RuntimeCall::Define { service, .. }
      | RuntimeCall::Create { service }
      | RuntimeCall::Start { service }
      | RuntimeCall::Wait { service, .. }
      | RuntimeCall::Recreate { service, .. }
      | RuntimeCall::Rename { service, .. }
      | RuntimeCall::Pull { service, .. } => service,
    }
  }
}

#[derive(Debug, Clone)]
struct Definition {
  spec: ServiceSpec,
}

#[derive(Default)]
struct State {
  definitions: BTreeMap<String, Definition>,
  containers: BTreeMap<String, ContainerInfo>,
  images: BTreeMap<String, String>,
  calls: Vec<RuntimeCall>,
  failures: Vec<(Op, String, RuntimeError)>,
  holds: HashMap<String, Arc<Notify>>,
  exit_codes: HashMap<String, i64>,
  next_id: u64,
}

impl State {
  fn take_failure(&mut self, op: Op, service: &str) -> Option<RuntimeError> {
    let pos = self.failures.iter().position(|(o, s, _)| *o == op && s == service)?;
    Some(self.failures.remove(pos).2)
  }

  fn next_id(&mut self) -> String {
    self.next_id += 1;
    let digest = hash_bytes(self.next_id.to_string().as_bytes());
    digest.0[..12].to_string()
  }

  fn definition(&self, name: &str) -> Result<&Definition, RuntimeError> {
    self
      .definitions
      .get(name)
      .ok_or_else(|| RuntimeError::NotFound { name: name.to_string() })
  }

  fn container(&self, id: &str) -> Result<&ContainerInfo, RuntimeError> {
    self
      .containers
      .get(id)
      .ok_or_else(|| RuntimeError::NotFound { name: id.to_string() })
  }

  fn ids_for(&self, service: &str) -> Vec<String> {
    self
      .containers
      .values()
      .filter(|c| c.service == service)
      .map(|c| c.id.clone())
      .collect()
  }

  fn build_container(&mut self, service: &str, name: String, image: &str) -> Result<ContainerInfo, RuntimeError> {
    let spec = self.definition(service)?.spec.clone();
    let mut labels = spec.labels.clone();
    labels.insert(LABEL_SERVICE.to_string(), service.to_string());
    Ok(ContainerInfo {
      id: self.next_id(),
      name,
      service: service.to_string(),
      image: image.to_string(),
      image_id: self.images.get(image).cloned(),
      labels,
      running: false,
      pid: None,
    })
  }
}

/// Recording in-memory runtime.
pub struct MemoryRuntime {
  state: Mutex<State>,
  events: broadcast::Sender<RuntimeEvent>,
}

impl Default for MemoryRuntime {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryRuntime {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      state: Mutex::new(State::default()),
      events,
    }
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn emit(&self, service: &str, container_id: &str, kind: EventKind) {
    trace!(service = %service, container = %container_id, kind = %kind, "runtime event");
    // no subscribers is fine
    let _ = self.events.send(RuntimeEvent {
      service: service.to_string(),
      container_id: container_id.to_string(),
      kind,
    });
  }

  /// Mark `image` as present locally with digest `image_id`.
  pub fn add_image(&self, image: &str, image_id: &str) {
    self.state().images.insert(image.to_string(), image_id.to_string());
  }

  pub fn with_image(self, image: &str, image_id: &str) -> Self {
    self.add_image(image, image_id);
    self
  }

  /// Place a pre-existing container, as if left over from an earlier boot.
  pub fn insert_container(&self, container: ContainerInfo) {
    self.state().containers.insert(container.id.clone(), container);
  }

  /// Make the next `op` on `service` fail with `error`.
  pub fn fail_next(&self, op: Op, service: &str, error: RuntimeError) {
    self.state().failures.push((op, service.to_string(), error));
  }

  /// Make `wait` on `service` block until the returned handle is notified.
  pub fn hold_wait(&self, service: &str) -> Arc<Notify> {
    let notify = Arc::new(Notify::new());
    self.state().holds.insert(service.to_string(), notify.clone());
    notify
  }

  /// Exit code `wait` reports for `service` (default 0).
  pub fn set_exit_code(&self, service: &str, code: i64) {
    self.state().exit_codes.insert(service.to_string(), code);
  }

  pub fn calls(&self) -> Vec<RuntimeCall> {
    self.state().calls.clone()
  }

  pub fn take_calls(&self) -> Vec<RuntimeCall> {
    std::mem::take(&mut self.state().calls)
  }

  pub fn clear_calls(&self) {
    self.state().calls.clear();
  }

  /// Number of recorded calls of kind `op`.
  pub fn count(&self, op: Op) -> usize {
    self.state().calls.iter().filter(|c| c.op() == op).count()
  }

  /// Number of recorded calls of kind `op` against `service`.
  pub fn count_for(&self, op: Op, service: &str) -> usize {
    self
      .state()
      .calls
      .iter()
      .filter(|c| c.op() == op && c.service() == service)
      .count()
  }

  /// Spec last defined for `service`.
  pub fn definition(&self, service: &str) -> Option<ServiceSpec> {
    self.state().definitions.get(service).map(|d| d.spec.clone())
  }

  pub fn all_containers(&self) -> Vec<ContainerInfo> {
    self.state().containers.values().cloned().collect()
  }
}

#[async_trait]
impl ContainerRuntime for MemoryRuntime {
  async fn define(&self, name: &str, spec: &ServiceSpec, links: &[Link]) -> Result<(), RuntimeError> {
    let mut state = self.state();
    if let Some(err) = state.take_failure(Op::Define, name) {
      return Err(err);
    }
    state.calls.push(RuntimeCall::Define {
      service: name.to_string(),
      links: links.iter().map(|l| l.target.clone()).collect(),
    });
    state
      .definitions
      .insert(name.to_string(), Definition { spec: spec.clone() });
    Ok(())
  }

  async fn create(&self, name: &str) -> Result<(), RuntimeError> {
    let created = {
      let mut state = self.state();
      if let Some(err) = state.take_failure(Op::Create, name) {
        return Err(err);
      }
      state.calls.push(RuntimeCall::Create { service: name.to_string() });
      if !state.ids_for(name).is_empty() {
        return Ok(());
      }
      let spec = state.definition(name)?.spec.clone();
      let container = state.build_container(name, spec.container_name(name).to_string(), &spec.image)?;
      let id = container.id.clone();
      state.containers.insert(id.clone(), container);
      id
    };
    self.emit(name, &created, EventKind::Created);
    Ok(())
  }

  async fn start(&self, name: &str) -> Result<(), RuntimeError> {
    let started = {
      let mut state = self.state();
      if let Some(err) = state.take_failure(Op::Start, name) {
        return Err(err);
      }
      state.calls.push(RuntimeCall::Start { service: name.to_string() });
      let ids = state.ids_for(name);
      if ids.is_empty() {
        return Err(RuntimeError::NotFound { name: name.to_string() });
      }
      let mut pid = 100 + state.next_id as u32;
      for id in &ids {
        if let Some(container) = state.containers.get_mut(id) {
          container.running = true;
          container.pid = Some(pid);
          pid += 1;
        }
      }
      ids
    };
    for id in started {
      self.emit(name, &id, EventKind::Started);
    }
    Ok(())
  }

  async fn wait(&self, name: &str) -> Result<i64, RuntimeError> {
    let hold = {
      let mut state = self.state();
      if let Some(err) = state.take_failure(Op::Wait, name) {
        return Err(err);
      }
      if state.ids_for(name).is_empty() {
        return Err(RuntimeError::NotFound { name: name.to_string() });
      }
      state.holds.remove(name)
    };

    if let Some(notify) = hold {
      notify.notified().await;
    }

    let stopped = {
      let mut state = self.state();
      let exit_code = state.exit_codes.get(name).copied().unwrap_or(0);
      state.calls.push(RuntimeCall::Wait {
        service: name.to_string(),
        exit_code,
      });
      let ids = state.ids_for(name);
      for id in &ids {
        if let Some(container) = state.containers.get_mut(id) {
          container.running = false;
          container.pid = None;
        }
      }
      (ids, exit_code)
    };
    for id in &stopped.0 {
      self.emit(name, id, EventKind::Stopped);
    }
    Ok(stopped.1)
  }

  async fn containers(&self, name: &str) -> Result<Vec<ContainerInfo>, RuntimeError> {
    Ok(
      self
        .state()
        .containers
        .values()
        .filter(|c| c.service == name)
        .cloned()
        .collect(),
    )
  }

  async fn inspect(&self, container_id: &str) -> Result<ContainerInfo, RuntimeError> {
    self.state().container(container_id).cloned()
  }

  async fn recreate(&self, container_id: &str, image: &str) -> Result<ContainerInfo, RuntimeError> {
    let replacement = {
      let mut state = self.state();
      let old = state.container(container_id)?.clone();
      if let Some(err) = state.take_failure(Op::Recreate, &old.service) {
        return Err(err);
      }
      state.calls.push(RuntimeCall::Recreate {
        service: old.service.clone(),
        image: image.to_string(),
      });
      let spec = state.definition(&old.service)?.spec.clone();
      // Docker-style temporary name; the caller renames it back.
      let short: String = old.id.chars().take(6).collect();
      let temp_name = format!("{}_{}", short, spec.container_name(&old.service));
      let replacement = state.build_container(&old.service, temp_name, image)?;
      state.containers.remove(container_id);
      state.containers.insert(replacement.id.clone(), replacement.clone());
      replacement
    };
    self.emit(&replacement.service, &replacement.id, EventKind::Created);
    Ok(replacement)
  }

  async fn rename(&self, container_id: &str, new_name: &str) -> Result<(), RuntimeError> {
    let service = {
      let mut state = self.state();
      let service = state.container(container_id)?.service.clone();
      if let Some(err) = state.take_failure(Op::Rename, &service) {
        return Err(err);
      }
      let container = state
        .containers
        .get_mut(container_id)
        .ok_or_else(|| RuntimeError::NotFound {
          name: container_id.to_string(),
        })?;
      let from = std::mem::replace(&mut container.name, new_name.to_string());
      state.calls.push(RuntimeCall::Rename {
        service: service.clone(),
        from,
        to: new_name.to_string(),
      });
      service
    };
    self.emit(&service, container_id, EventKind::Renamed);
    Ok(())
  }

  async fn image_id(&self, image: &str) -> Result<Option<String>, RuntimeError> {
    Ok(self.state().images.get(image).cloned())
  }

  async fn pull(&self, name: &str) -> Result<(), RuntimeError> {
    let mut state = self.state();
    if let Some(err) = state.take_failure(Op::Pull, name) {
      return Err(err);
    }
    let image = state.definition(name)?.spec.image.clone();
    state.calls.push(RuntimeCall::Pull {
      service: name.to_string(),
      image: image.clone(),
    });
    let digest = format!("sha256:{}", hash_bytes(image.as_bytes()).0);
    state.images.entry(image).or_insert(digest);
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
    self.events.subscribe()
  }
}
