use keelos_lib::consts::{LABEL_CREATE_ONLY, LABEL_DETACH, LABEL_REBUILD, LABEL_SCOPE};
use keelos_lib::reconcile::PassOutcome;
use keelos_lib::runtime::Op;

use super::common::{Harness, config, spec};

#[tokio::test]
async fn unchanged_set_issues_no_runtime_calls() {
  let mut h = Harness::new(true);
  let cfg = config(&[
    ("acpid", spec("keelos/acpid:v1", &[(LABEL_SCOPE, "system")])),
    ("ntp", spec("keelos/ntp:v1", &[(LABEL_SCOPE, "system")])),
    ("udev", spec("keelos/udev:v1", &[(LABEL_SCOPE, "system"), (LABEL_DETACH, "false")])),
  ]);

  let first = h.reconciler.pass(&cfg).await;
  assert_eq!(first.outcome, PassOutcome::Completed);
  assert_eq!(first.applied.len(), 3);

  h.rt.clear_calls();
  let second = h.reconciler.pass(&cfg).await;

  assert_eq!(second.applied.len(), 0);
  assert_eq!(second.skipped.len(), 3);
  assert_eq!(h.rt.count(Op::Create), 0);
  assert_eq!(h.rt.count(Op::Start), 0);
  assert_eq!(h.rt.count(Op::Recreate), 0);
}

#[tokio::test]
async fn only_changed_services_are_reprocessed() {
  let mut h = Harness::new(true);
  h.rt.add_image("keelos/ntp:v2", "sha256:ntp2");
  let before = config(&[
    ("acpid", spec("keelos/acpid:v1", &[(LABEL_SCOPE, "system")])),
    ("ntp", spec("keelos/ntp:v1", &[(LABEL_SCOPE, "system")])),
  ]);
  h.reconciler.pass(&before).await;
  let old_hash = h.reconciler.applied().service("ntp").cloned().unwrap();

  let after = config(&[
    ("acpid", spec("keelos/acpid:v1", &[(LABEL_SCOPE, "system")])),
    ("ntp", spec("keelos/ntp:v2", &[(LABEL_SCOPE, "system")])),
  ]);
  h.rt.clear_calls();
  let report = h.reconciler.pass(&after).await;

  assert_eq!(report.applied, vec!["ntp"]);
  assert_eq!(report.skipped, vec!["acpid"]);
  assert_eq!(h.rt.count_for(Op::Create, "acpid"), 0);
  assert_eq!(h.rt.count_for(Op::Recreate, "ntp"), 1);
  assert_ne!(h.reconciler.applied().service("ntp"), Some(&old_hash));
  let ntp = h.rt.all_containers().into_iter().find(|c| c.service == "ntp").unwrap();
  assert_eq!(ntp.image, "keelos/ntp:v2");
  assert_eq!(ntp.name, "ntp");
}

#[tokio::test]
async fn label_edit_alone_triggers_reprocessing() {
  let mut h = Harness::new(true);
  h.reconciler
    .pass(&config(&[("ntp", spec("keelos/ntp:v1", &[(LABEL_SCOPE, "system")]))]))
    .await;

  h.rt.clear_calls();
  let report = h
    .reconciler
    .pass(&config(&[(
      "ntp",
      spec("keelos/ntp:v1", &[(LABEL_SCOPE, "system"), ("io.example.tier", "base")]),
    )]))
    .await;

  assert_eq!(report.applied, vec!["ntp"]);
  assert_eq!(h.rt.count_for(Op::Recreate, "ntp"), 1);
}

#[tokio::test]
async fn createonly_never_starts_across_passes() {
  let mut h = Harness::new(true);
  let data = spec(
    "keelos/data:v1",
    &[(LABEL_SCOPE, "system"), (LABEL_CREATE_ONLY, "true"), (LABEL_REBUILD, "always")],
  );
  let cfg = config(&[("data", data)]);

  for _ in 0..3 {
    h.reconciler.pass(&cfg).await;
  }

  assert_eq!(h.rt.count_for(Op::Start, "data"), 0);
  assert_eq!(h.rt.count_for(Op::Create, "data"), 3);
}

#[tokio::test]
async fn rebuild_always_recreates_every_pass() {
  let mut h = Harness::new(true);
  let cfg = config(&[(
    "udev",
    spec("keelos/udev:v1", &[(LABEL_SCOPE, "system"), (LABEL_REBUILD, "always")]),
  )]);

  h.reconciler.pass(&cfg).await;
  h.rt.clear_calls();
  h.reconciler.pass(&cfg).await;
  h.reconciler.pass(&cfg).await;

  assert_eq!(h.rt.count_for(Op::Recreate, "udev"), 2);
  assert_eq!(h.rt.count_for(Op::Start, "udev"), 2);
  let containers = h.rt.all_containers();
  assert_eq!(containers.len(), 1);
  assert_eq!(containers[0].name, "udev");
}

#[tokio::test]
async fn blocking_services_wait_before_the_next_service() {
  let mut h = Harness::new(true);
  let cfg = config(&[
    ("a-bootstrap", spec("keelos/bootstrap", &[(LABEL_SCOPE, "system"), (LABEL_DETACH, "false")])),
    ("b-syslog", spec("keelos/syslog", &[(LABEL_SCOPE, "system")])),
  ]);

  h.reconciler.pass(&cfg).await;

  let calls = h.rt.calls();
  let waited = calls
    .iter()
    .position(|c| c.op() == Op::Wait && c.service() == "a-bootstrap")
    .unwrap();
  let next = calls.iter().position(|c| c.service() == "b-syslog").unwrap();
  assert!(waited < next);
}

#[tokio::test]
async fn user_services_link_the_engine_when_present() {
  let mut h = Harness::new(true);
  let cfg = config(&[
    ("docker", spec("keelos/docker", &[(LABEL_SCOPE, "system")])),
    ("portal", spec("example/portal", &[])),
  ]);

  h.reconciler.pass(&cfg).await;

  let define = h
    .rt
    .calls()
    .into_iter()
    .find(|c| c.op() == Op::Define && c.service() == "portal")
    .unwrap();
  assert_eq!(
    define,
    keelos_lib::runtime::RuntimeCall::Define {
      service: "portal".into(),
      links: vec!["docker".into()],
    }
  );
}
