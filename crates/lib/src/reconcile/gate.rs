//! The "network is available" flag.
//!
//! Written by the event watcher task, read by the reconcile loop. Opening the
//! gate also wakes the loop so the next pass can load network-gated services.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::consts::NETWORK_SERVICE;
use crate::runtime::{EventKind, RuntimeEvent};

#[derive(Debug, Default)]
struct Inner {
  open: AtomicBool,
  changed: Notify,
}

/// Shared, clonable network availability flag.
#[derive(Debug, Clone, Default)]
pub struct NetworkGate {
  inner: Arc<Inner>,
}

impl NetworkGate {
  pub fn new(open: bool) -> Self {
    let gate = Self::default();
    gate.inner.open.store(open, Ordering::SeqCst);
    gate
  }

  pub fn is_open(&self) -> bool {
    self.inner.open.load(Ordering::SeqCst)
  }

  /// Open the gate. Returns `true` if it was closed before.
  pub fn open(&self) -> bool {
    let was_open = self.inner.open.swap(true, Ordering::SeqCst);
    if !was_open {
      self.inner.changed.notify_one();
    }
    !was_open
  }

  /// Resolves after the gate has been opened. A change that happened while
  /// nobody was waiting is delivered to the next caller.
  pub async fn changed(&self) {
    self.inner.changed.notified().await;
  }
}

/// Watch runtime events and open `gate` once the network service starts.
pub fn spawn_network_watcher(mut events: broadcast::Receiver<RuntimeEvent>, gate: NetworkGate) -> JoinHandle<()> {
  tokio::spawn(async move {
    loop {
      match events.recv().await {
        Ok(event) if event.service == NETWORK_SERVICE && event.kind == EventKind::Started => {
          if gate.open() {
            info!(service = %event.service, container = %event.container_id, "network is up");
          }
        }
        Ok(_) => {}
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          warn!(skipped, "runtime event stream lagged");
        }
        Err(broadcast::error::RecvError::Closed) => {
          debug!("runtime event stream closed");
          break;
        }
      }
    }
  })
}
