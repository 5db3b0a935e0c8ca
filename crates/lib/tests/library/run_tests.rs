use std::time::Duration;

use keelos_lib::config::{ConfigSource, FileConfigSource};
use keelos_lib::consts::{LABEL_REBUILD, LABEL_RELOAD_CONFIG, LABEL_SCOPE};
use keelos_lib::reconcile::ReconcileOptions;
use keelos_lib::runtime::Op;
use tokio::sync::mpsc;

use super::common::Harness;

#[tokio::test]
async fn network_start_triggers_a_pass_for_gated_includes() {
  let mut server = mockito::Server::new_async().await;
  let _doc = server
    .mock("GET", "/n/ntp.yml")
    .with_body("ntp:\n  image: keelos/ntp:v1\n  labels: {io.keelos.scope: system}\n")
    .create_async()
    .await;
  let h = Harness::new(false);
  let config_path = h.write_file(
    "keelos.yml",
    &format!(
      r#"
services:
  network:
    image: keelos/network:v1
    labels:
      {scope}: system
      {reload}: true
services_include:
  ntp: true
repositories:
  core: {{ url: "{url}" }}
"#,
      scope = LABEL_SCOPE,
      reload = LABEL_RELOAD_CONFIG,
      url = server.url()
    ),
  );
  let rt = h.rt.clone();
  let mut reconciler = h.reconciler;
  let watcher = reconciler.watch_network();
  let (tx, rx) = mpsc::channel(1);

  let task = tokio::spawn(async move {
    let source = FileConfigSource::new(config_path);
    reconciler.run(&source, rx).await
  });

  tokio::time::timeout(Duration::from_secs(5), async {
    while rt.count_for(Op::Start, "ntp") == 0 {
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  })
  .await
  .expect("ntp was never started");

  drop(tx);
  task.await.unwrap().unwrap();
  watcher.abort();
  assert_eq!(rt.count_for(Op::Start, "network"), 1);
  assert_eq!(rt.count_for(Op::Start, "ntp"), 1);
}

#[tokio::test]
async fn restart_storm_is_bounded() {
  let h = Harness::with_options(true, ReconcileOptions { max_restarts: 3 });
  let config_path = h.write_file(
    "keelos.yml",
    &format!(
      "services:\n  flappy:\n    image: keelos/flappy\n    labels:\n      {}: system\n      {}: always\n      {}: true\n",
      LABEL_SCOPE, LABEL_REBUILD, LABEL_RELOAD_CONFIG
    ),
  );
  let rt = h.rt.clone();
  let mut reconciler = h.reconciler;
  let (tx, rx) = mpsc::channel(1);
  drop(tx);

  let source = FileConfigSource::new(config_path);
  tokio::time::timeout(Duration::from_secs(5), reconciler.run(&source, rx))
    .await
    .expect("run did not stop")
    .unwrap();

  // the initial pass plus three restarts
  assert_eq!(rt.count_for(Op::Define, "flappy"), 4);
}

#[tokio::test]
async fn consumed_console_rebuild_is_persisted() {
  let h = Harness::new(true);
  let config_path = h.write_file(
    "keelos.yml",
    &format!(
      "services:\n  console:\n    image: keelos/console\n    labels:\n      {}: system\nforce_console_rebuild: true\n",
      LABEL_SCOPE
    ),
  );
  let rt = h.rt.clone();
  let mut reconciler = h.reconciler;
  let source = FileConfigSource::new(&config_path);
  let (tx, rx) = mpsc::channel(1);
  drop(tx);

  reconciler.run(&source, rx).await.unwrap();

  assert!(!source.load().unwrap().force_console_rebuild);
  assert_eq!(rt.count_for(Op::Recreate, "console"), 1);
}
