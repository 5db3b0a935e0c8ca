//! Label-derived apply policy.
//!
//! Labels are read once per specification into an [`ApplyPolicy`]; the
//! lifecycle controller matches on the policy instead of comparing label
//! strings.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::consts::{
  LABEL_CREATE_ONLY, LABEL_DETACH, LABEL_REBUILD, LABEL_RELOAD_CONFIG, LABEL_SCOPE, REBUILD_ALWAYS, SCOPE_SYSTEM,
};
use crate::service::types::ServiceSpec;

/// How far the controller drives a service after creating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartMode {
  /// Create the container and never start it.
  CreateOnly,
  /// Start and return immediately.
  Detached,
  /// Start and wait for the container to exit.
  Blocking,
}

/// When an existing container is recreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildPolicy {
  /// Recreate on every apply.
  Always,
  /// Recreate only when out of sync. Carries the raw rebuild label, if any,
  /// which modulates out-of-sync suppression.
  OnChange(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
  System,
  User,
}

/// Everything the labels say about how to apply one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyPolicy {
  pub start: StartMode,
  pub rebuild: RebuildPolicy,
  pub reload_config: bool,
  pub scope: Scope,
}

impl ApplyPolicy {
  pub fn from_spec(spec: &ServiceSpec) -> Self {
    Self::from_labels(&spec.labels)
  }

  pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
    let get = |key: &str| labels.get(key).map(String::as_str);

    // createonly wins over detach
    let start = if get(LABEL_CREATE_ONLY) == Some("true") {
      StartMode::CreateOnly
    } else if get(LABEL_DETACH) == Some("false") {
      StartMode::Blocking
    } else {
      StartMode::Detached
    };

    let rebuild = match get(LABEL_REBUILD) {
      Some(REBUILD_ALWAYS) => RebuildPolicy::Always,
      other => RebuildPolicy::OnChange(other.map(str::to_string)),
    };

    let scope = if get(LABEL_SCOPE) == Some(SCOPE_SYSTEM) {
      Scope::System
    } else {
      Scope::User
    };

    Self {
      start,
      rebuild,
      reload_config: get(LABEL_RELOAD_CONFIG) == Some("true"),
      scope,
    }
  }

  /// Whether the service is reprocessed even when its hash is unchanged.
  pub fn always_reprocess(&self) -> bool {
    self.rebuild == RebuildPolicy::Always
  }

  pub fn is_system(&self) -> bool {
    self.scope == Scope::System
  }
}
