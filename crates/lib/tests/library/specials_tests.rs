use keelos_lib::consts::{CONSOLE_SERVICE, ENGINE_SERVICE, LABEL_CONSOLE, LABEL_SCOPE};
use keelos_lib::reconcile::PassOutcome;
use keelos_lib::runtime::Op;

use super::common::{Harness, config, spec};

fn builtin_console() -> keelos_lib::service::ServiceSpec {
  spec(
    "keelos/console:v1",
    &[(LABEL_SCOPE, "system"), (LABEL_CONSOLE, "default")],
  )
}

#[tokio::test]
async fn console_substitution_replaces_the_console() {
  let mut h = Harness::new(true);
  let path = h.write_file(
    "consoles/ubuntu.yml",
    "console:\n  image: keelos/ubuntu-console:v1\n  labels:\n    io.keelos.scope: system\n    io.keelos.console: ubuntu\n",
  );
  let mut cfg = config(&[(CONSOLE_SERVICE, builtin_console())]);
  h.reconciler.pass(&cfg).await;

  cfg.console = path.to_string_lossy().into_owned();
  h.rt.clear_calls();
  let report = h.reconciler.pass(&cfg).await;

  assert_eq!(report.outcome, PassOutcome::Completed);
  assert_eq!(report.applied, vec![CONSOLE_SERVICE]);
  assert_eq!(h.reconciler.desired()[CONSOLE_SERVICE].image, "keelos/ubuntu-console:v1");
  assert_eq!(h.rt.count_for(Op::Recreate, CONSOLE_SERVICE), 1);
  let console = h.rt.all_containers().into_iter().find(|c| c.service == CONSOLE_SERVICE).unwrap();
  assert_eq!(console.label(LABEL_CONSOLE), Some("ubuntu"));
  assert_eq!(console.name, CONSOLE_SERVICE);

  // The inline built-in console does not take the name back while the
  // substitution stays selected.
  h.rt.clear_calls();
  let steady = h.reconciler.pass(&cfg).await;
  assert_eq!(steady.skipped, vec![CONSOLE_SERVICE]);
  assert!(h.rt.calls().is_empty());

  // Selecting the default again restores the built-in console.
  cfg.console = "default".into();
  let restored = h.reconciler.pass(&cfg).await;
  assert_eq!(restored.applied, vec![CONSOLE_SERVICE]);
  assert_eq!(h.reconciler.desired()[CONSOLE_SERVICE], builtin_console());
}

#[tokio::test]
async fn substitution_document_brings_its_companion_services() {
  let mut h = Harness::new(true);
  let path = h.write_file(
    "consoles/ubuntu.yml",
    "console:\n  image: keelos/ubuntu-console:v1\n  labels:\n    io.keelos.scope: system\n    io.keelos.console: ubuntu\nconsole-helper:\n  image: keelos/console-helper:v1\n  labels:\n    io.keelos.scope: system\n",
  );
  let mut cfg = config(&[(CONSOLE_SERVICE, builtin_console())]);
  cfg.console = path.to_string_lossy().into_owned();

  let report = h.reconciler.pass(&cfg).await;

  assert_eq!(report.outcome, PassOutcome::Completed);
  assert!(report.applied.contains(&"console-helper".to_string()));
  assert!(h.reconciler.desired().contains_key("console-helper"));
  assert_eq!(h.rt.count_for(Op::Create, "console-helper"), 1);
  assert_eq!(h.rt.count_for(Op::Start, "console-helper"), 1);

  // later passes leave the companion alone
  h.rt.clear_calls();
  let steady = h.reconciler.pass(&cfg).await;
  assert!(steady.skipped.contains(&"console-helper".to_string()));
  assert_eq!(h.rt.count_for(Op::Create, "console-helper"), 0);
}

#[tokio::test]
async fn failed_substitution_keeps_previous_console() {
  let mut h = Harness::new(true);
  let mut cfg = config(&[(CONSOLE_SERVICE, builtin_console())]);
  h.reconciler.pass(&cfg).await;

  cfg.console = h.temp.path().join("absent.yml").to_string_lossy().into_owned();
  let report = h.reconciler.pass(&cfg).await;

  assert_eq!(report.failed, vec![cfg.console.clone()]);
  assert_eq!(h.reconciler.desired()[CONSOLE_SERVICE], builtin_console());
}

#[tokio::test]
async fn substitution_without_the_service_is_rejected() {
  let mut h = Harness::new(true);
  let path = h.write_file("consoles/broken.yml", "shell:\n  image: keelos/shell\n");
  let mut cfg = config(&[(CONSOLE_SERVICE, builtin_console())]);
  cfg.console = path.to_string_lossy().into_owned();

  let report = h.reconciler.pass(&cfg).await;

  assert_eq!(report.failed, vec![cfg.console.clone()]);
  assert_eq!(h.reconciler.desired()[CONSOLE_SERVICE], builtin_console());
  assert!(!h.reconciler.desired().contains_key("shell"));
}

#[tokio::test]
async fn engine_substitution_only_when_not_default() {
  let mut h = Harness::new(true);
  let path = h.write_file(
    "engines/docker-25.yml",
    "docker:\n  image: keelos/docker:25.0\n  labels: {io.keelos.scope: system}\n",
  );
  let engine = path.to_string_lossy().into_owned();
  let mut cfg = config(&[]);
  cfg.engine = engine.clone();
  cfg.default_engine = engine.clone();

  let unchanged = h.reconciler.pass(&cfg).await;
  assert!(unchanged.applied.is_empty());

  cfg.default_engine = "docker-24.0".into();
  let switched = h.reconciler.pass(&cfg).await;
  assert_eq!(switched.applied, vec![ENGINE_SERVICE]);
  assert_eq!(h.rt.count_for(Op::Start, ENGINE_SERVICE), 1);
}

#[tokio::test]
async fn force_console_rebuild_recreates_once() {
  let mut h = Harness::new(true);
  let mut cfg = config(&[(CONSOLE_SERVICE, builtin_console())]);
  h.reconciler.pass(&cfg).await;
  h.rt.clear_calls();

  cfg.force_console_rebuild = true;
  let forced = h.reconciler.pass(&cfg).await;
  assert_eq!(forced.applied, vec![CONSOLE_SERVICE]);
  assert!(h.reconciler.controller().latch().take_consumed());

  cfg.force_console_rebuild = false;
  let after = h.reconciler.pass(&cfg).await;
  assert_eq!(after.skipped, vec![CONSOLE_SERVICE]);
  assert_eq!(h.rt.count_for(Op::Recreate, CONSOLE_SERVICE), 1);
}
