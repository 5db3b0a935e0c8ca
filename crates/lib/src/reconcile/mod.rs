//! The reconcile loop.
//!
//! A pass converges the runtime toward the desired-state set:
//!
//! 1. Merge the configuration's inline services into the desired set
//! 2. Apply every known service whose hash differs from the applied table
//! 3. Load enabled includes not seen before; defer those that need the network
//! 4. Stop here while the network gate is closed
//! 5. Load and apply the console and engine substitutions
//!
//! A service asking for a configuration reload aborts the pass; [`Reconciler::run`]
//! then starts a fresh one. Failures of individual services are logged and
//! counted but never abort a pass.

pub mod gate;
pub mod stage;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::{Config, ConfigError, ConfigSource};
use crate::consts::{CONSOLE_SERVICE, ENGINE_SERVICE};
use crate::lifecycle::LifecycleController;
use crate::loader::SpecLoader;
use crate::runtime::ContainerRuntime;
use crate::service::{ApplyPolicy, ServiceSet, ServiceSpec, parse_services, service_hash};
use crate::util::hash::{ObjectHash, hash_bytes};

pub use gate::{NetworkGate, spawn_network_watcher};
pub use stage::{StageError, stage_services};

const DEFAULT_MAX_RESTARTS: u32 = 32;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
  /// Consecutive restart requests honoured before waiting for an external trigger.
  pub max_restarts: u32,
}

impl Default for ReconcileOptions {
  fn default() -> Self {
    Self {
      max_restarts: DEFAULT_MAX_RESTARTS,
    }
  }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
  /// The configuration could not be read for the first pass.
  #[error("initial configuration load failed: {0}")]
  Config(#[from] ConfigError),
}

/// Hashes of what has been processed this session.
#[derive(Debug, Default, Clone, Serialize)]
pub struct AppliedTable {
  /// Service name -> hash of the spec last applied successfully.
  pub services: BTreeMap<String, ObjectHash>,
  /// Include or substitution name -> hash of the document it loaded.
  pub includes: BTreeMap<String, ObjectHash>,
}

impl AppliedTable {
  pub fn service(&self, name: &str) -> Option<&ObjectHash> {
    self.services.get(name)
  }
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PassOutcome {
  /// Every step ran.
  Completed,
  /// Stopped before substitutions because the network is not up.
  NetworkGated,
  /// A service requested a fresh pass.
  Restart,
}

/// What one pass did, by service name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
  pub outcome: PassOutcome,
  pub applied: Vec<String>,
  /// Unchanged since the last apply.
  pub skipped: Vec<String>,
  /// Includes waiting for the network.
  pub deferred: Vec<String>,
  pub failed: Vec<String>,
}

impl PassReport {
  fn new() -> Self {
    Self {
      outcome: PassOutcome::Completed,
      applied: Vec::new(),
      skipped: Vec::new(),
      deferred: Vec::new(),
      failed: Vec::new(),
    }
  }
}

/// Owns the desired-state set and the applied table for one session.
pub struct Reconciler {
  controller: LifecycleController,
  loader: SpecLoader,
  desired: ServiceSet,
  applied: AppliedTable,
  /// Special service name -> substitution currently in effect.
  substituted: BTreeMap<String, String>,
  gate: NetworkGate,
  options: ReconcileOptions,
}

impl Reconciler {
  pub fn new(runtime: Arc<dyn ContainerRuntime>, loader: SpecLoader, options: ReconcileOptions) -> Self {
    Self {
      controller: LifecycleController::new(runtime),
      loader,
      desired: ServiceSet::new(),
      applied: AppliedTable::default(),
      substituted: BTreeMap::new(),
      gate: NetworkGate::new(false),
      options,
    }
  }

  /// Start with the network gate already open (or closed). Call before
  /// [`Reconciler::watch_network`].
  pub fn with_network(mut self, open: bool) -> Self {
    self.gate = NetworkGate::new(open);
    self
  }

  pub fn gate(&self) -> &NetworkGate {
    &self.gate
  }

  pub fn desired(&self) -> &ServiceSet {
    &self.desired
  }

  pub fn applied(&self) -> &AppliedTable {
    &self.applied
  }

  pub fn controller(&self) -> &LifecycleController {
    &self.controller
  }

  /// Spawn the task that opens the network gate when `network` starts.
  pub fn watch_network(&self) -> JoinHandle<()> {
    spawn_network_watcher(self.controller.runtime().subscribe(), self.gate.clone())
  }

  /// Run one pass against `config`.
  pub async fn pass(&mut self, config: &Config) -> PassReport {
    let mut report = PassReport::new();
    let network = self.gate.is_open();
    info!(network, services = self.desired.len(), "reconcile pass started");
    self.controller.latch().arm(config.force_console_rebuild);

    self
      .substituted
      .retain(|special, choice| substitution_for(config, special) == Some(choice.as_str()));
    for (name, spec) in &config.services {
      // an active substitution owns its service name
      if !self.substituted.contains_key(name) {
        self.desired.insert(name.clone(), spec.clone());
      }
    }

    let known: Vec<(String, ServiceSpec)> = self.desired.iter().map(|(n, s)| (n.clone(), s.clone())).collect();
    for (name, spec) in known {
      if self.apply_one(&name, &spec, &mut report).await {
        return finish(report, PassOutcome::Restart);
      }
    }

    for include in config.enabled_includes() {
      if self.applied.includes.contains_key(include) {
        continue;
      }
      let Some(services) = self.load_document(include, network, config, &mut report).await else {
        continue;
      };
      for (name, spec) in &services {
        self.desired.insert(name.clone(), spec.clone());
      }
      for (name, spec) in services {
        if self.apply_one(&name, &spec, &mut report).await {
          return finish(report, PassOutcome::Restart);
        }
      }
    }

    if !network {
      return finish(report, PassOutcome::NetworkGated);
    }

    for special in [CONSOLE_SERVICE, ENGINE_SERVICE] {
      let Some(choice) = substitution_for(config, special) else {
        continue;
      };
      if self.load_special(special, choice, config, &mut report).await {
        return finish(report, PassOutcome::Restart);
      }
    }

    finish(report, PassOutcome::Completed)
  }

  /// Apply `name` unless its hash is unchanged. Returns `true` on a restart request.
  async fn apply_one(&mut self, name: &str, spec: &ServiceSpec, report: &mut PassReport) -> bool {
    let hash = match service_hash(name, spec) {
      Ok(hash) => hash,
      Err(e) => {
        error!(service = %name, error = %e, "failed to hash spec");
        report.failed.push(name.to_string());
        return false;
      }
    };

    let forced = ApplyPolicy::from_spec(spec).always_reprocess()
      || (name == CONSOLE_SERVICE && self.controller.latch().is_armed());
    if !forced && self.applied.service(name) == Some(&hash) {
      trace!(service = %name, hash = %hash, "unchanged");
      report.skipped.push(name.to_string());
      return false;
    }

    match self.controller.apply(name, spec, &self.desired).await {
      Ok(outcome) => {
        debug!(service = %name, hash = %hash, state = %outcome.report().state, "applied");
        self.applied.services.insert(name.to_string(), hash);
        report.applied.push(name.to_string());
        outcome.is_restart()
      }
      Err(e) => {
        error!(service = %name, error = %e, "failed to apply service");
        report.failed.push(name.to_string());
        false
      }
    }
  }

  /// Resolve and parse an include, recording it as processed on success.
  async fn load_document(
    &mut self,
    include: &str,
    network: bool,
    config: &Config,
    report: &mut PassReport,
  ) -> Option<ServiceSet> {
    let bytes = match self.loader.resolve(include, network, config).await {
      Ok(bytes) => bytes,
      Err(e) if e.is_no_network() => {
        debug!(include = %include, "deferred until network is available");
        report.deferred.push(include.to_string());
        return None;
      }
      Err(e) => {
        error!(include = %include, error = %e, "failed to load service");
        report.failed.push(include.to_string());
        return None;
      }
    };

    match parse_services(&bytes) {
      Ok(services) => {
        let marker = ObjectHash::from(&hash_bytes(&bytes));
        self.applied.includes.insert(include.to_string(), marker);
        Some(services)
      }
      Err(e) => {
        error!(include = %include, error = %e, "malformed service document");
        report.failed.push(include.to_string());
        None
      }
    }
  }

  /// Load the substitution `choice` for `special`, along with any other
  /// services its document defines. The previous spec of `special` stays in
  /// place unless the new one loads. Returns `true` on a restart request.
  async fn load_special(&mut self, special: &str, choice: &str, config: &Config, report: &mut PassReport) -> bool {
    if self.substituted.get(special).map(String::as_str) == Some(choice) {
      return false;
    }

    let bytes = match self.loader.resolve(choice, true, config).await {
      Ok(bytes) => bytes,
      Err(e) => {
        error!(service = %special, choice = %choice, error = %e, "failed to load substitution, keeping previous spec");
        report.failed.push(choice.to_string());
        return false;
      }
    };
    let mut services = match parse_services(&bytes) {
      Ok(services) => services,
      Err(e) => {
        error!(service = %special, choice = %choice, error = %e, "malformed substitution, keeping previous spec");
        report.failed.push(choice.to_string());
        return false;
      }
    };

    let Some(spec) = services.remove(special) else {
      error!(service = %special, choice = %choice, "substitution does not define the service, keeping previous spec");
      report.failed.push(choice.to_string());
      return false;
    };

    info!(service = %special, choice = %choice, "substituting service");
    self
      .applied
      .includes
      .insert(choice.to_string(), ObjectHash::from(&hash_bytes(&bytes)));
    self.substituted.insert(special.to_string(), choice.to_string());
    self.desired.insert(special.to_string(), spec.clone());
    for (name, companion) in &services {
      self.desired.insert(name.clone(), companion.clone());
    }

    if self.apply_one(special, &spec, report).await {
      return true;
    }
    for (name, companion) in services {
      if self.apply_one(&name, &companion, report).await {
        return true;
      }
    }
    false
  }

  /// Re-run passes until `triggers` closes.
  ///
  /// A pass runs on start, after every restart request (up to
  /// `max_restarts` in a row), whenever the network gate opens, and whenever a
  /// trigger is received. Configuration is re-read from `source` for each pass.
  /// Only a failure to read configuration for the very first pass is returned.
  pub async fn run(&mut self, source: &dyn ConfigSource, mut triggers: mpsc::Receiver<()>) -> Result<(), ReconcileError> {
    let mut first = true;
    let mut restarts = 0u32;

    loop {
      match source.load() {
        Ok(config) => {
          first = false;
          let report = self.pass(&config).await;

          if self.controller.latch().take_consumed()
            && let Err(e) = source.clear_force_console_rebuild()
          {
            error!(error = %e, "failed to clear force_console_rebuild");
          }

          if report.outcome == PassOutcome::Restart {
            restarts += 1;
            if restarts <= self.options.max_restarts {
              info!(restarts, "restarting reconcile pass");
              continue;
            }
            warn!(
              limit = self.options.max_restarts,
              "restart limit reached, waiting for the next trigger"
            );
          }
          restarts = 0;
        }
        Err(e) if first => return Err(e.into()),
        Err(e) => error!(error = %e, "failed to reload configuration, skipping pass"),
      }

      tokio::select! {
        biased;
        _ = self.gate.changed() => debug!("network gate opened"),
        trigger = triggers.recv() => {
          if trigger.is_none() {
            debug!("trigger channel closed, stopping");
            return Ok(());
          }
        }
      }
    }
  }
}

fn substitution_for<'a>(config: &'a Config, special: &str) -> Option<&'a str> {
  match special {
    CONSOLE_SERVICE => config.console_substitution(),
    ENGINE_SERVICE => config.engine_substitution(),
    _ => None,
  }
}

fn finish(mut report: PassReport, outcome: PassOutcome) -> PassReport {
  report.outcome = outcome;
  info!(
    outcome = ?outcome,
    applied = report.applied.len(),
    skipped = report.skipped.len(),
    deferred = report.deferred.len(),
    failed = report.failed.len(),
    "reconcile pass finished"
  );
  report
}
