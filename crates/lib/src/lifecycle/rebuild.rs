//! Rebuild decisions.
//!
//! Whether an existing container is recreated depends on the service's
//! rebuild policy, the console carve-outs, and whether the container is out of
//! sync with the spec. The decision is a pure function of those inputs.
//!
//! The console service is judged by its identity label rather than by the
//! rebuild label: a changed console identity always rebuilds, while an
//! out-of-sync console with an unchanged identity is left alone. Every other
//! service rebuilds when out of sync unless its container was created with
//! `rebuild=false` and the label is unchanged, in which case only a warning is
//! logged.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::consts::{CONSOLE_SERVICE, LABEL_CONSOLE, LABEL_REBUILD};
use crate::runtime::ContainerInfo;
use crate::service::RebuildPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildDecision {
  /// `rebuild=always`.
  Always,
  /// One-shot console rebuild request.
  ForcedConsole,
  /// Console identity label changed.
  ConsoleChanged,
  /// Out of sync and rebuilds are allowed.
  OutOfSync,
  /// Out of sync but rebuilding is suppressed.
  Suppressed,
  InSync,
}

impl RebuildDecision {
  pub fn rebuild(&self) -> bool {
    matches!(
      self,
      RebuildDecision::Always | RebuildDecision::ForcedConsole | RebuildDecision::ConsoleChanged | RebuildDecision::OutOfSync
    )
  }
}

/// Decide whether `container` of `service` must be recreated.
///
/// `force_console` must only be `true` when the one-shot console request has
/// been taken for this call.
pub fn decide_rebuild(
  service: &str,
  policy: &RebuildPolicy,
  desired_labels: &BTreeMap<String, String>,
  container: &ContainerInfo,
  out_of_sync: bool,
  force_console: bool,
) -> RebuildDecision {
  let RebuildPolicy::OnChange(desired_rebuild) = policy else {
    return RebuildDecision::Always;
  };

  if service == CONSOLE_SERVICE {
    if force_console {
      return RebuildDecision::ForcedConsole;
    }
    if desired_labels.get(LABEL_CONSOLE).map(String::as_str) != container.label(LABEL_CONSOLE) {
      return RebuildDecision::ConsoleChanged;
    }
    return if out_of_sync {
      RebuildDecision::Suppressed
    } else {
      RebuildDecision::InSync
    };
  }

  if !out_of_sync {
    return RebuildDecision::InSync;
  }

  let original = container.label(LABEL_REBUILD);
  let label_changed = desired_rebuild.as_deref() != original;
  if label_changed || original != Some("false") {
    RebuildDecision::OutOfSync
  } else {
    RebuildDecision::Suppressed
  }
}

/// One-shot "force console rebuild" request.
///
/// Armed from configuration at the start of a pass; taken by the first
/// console apply that consults it. The consumer of [`take_consumed`] persists
/// the reset.
///
/// [`take_consumed`]: ConsoleRebuildLatch::take_consumed
#[derive(Debug, Default)]
pub struct ConsoleRebuildLatch {
  armed: AtomicBool,
  consumed: AtomicBool,
}

impl ConsoleRebuildLatch {
  pub fn arm(&self, requested: bool) {
    self.armed.store(requested, Ordering::SeqCst);
  }

  /// Take the request, disarming the latch.
  pub fn take(&self) -> bool {
    let was_armed = self.armed.swap(false, Ordering::SeqCst);
    if was_armed {
      self.consumed.store(true, Ordering::SeqCst);
    }
    was_armed
  }

  pub fn is_armed(&self) -> bool {
    self.armed.load(Ordering::SeqCst)
  }

  /// Whether a request was taken since the last call.
  pub fn take_consumed(&self) -> bool {
    self.consumed.swap(false, Ordering::SeqCst)
  }
}
