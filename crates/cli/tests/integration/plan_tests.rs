//! Plan command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

const BOOT_CONFIG: &str = r#"
services:
  network:
    image: keelos/network:v1
    labels:
      io.keelos.scope: system
  bootstrap:
    image: keelos/bootstrap:v1
    labels:
      io.keelos.scope: system
      io.keelos.detach: "false"
"#;

#[test]
fn plan_lists_calls_per_service() {
  let env = TestEnv::with_config(BOOT_CONFIG);

  env
    .keel_cmd()
    .args(["plan", "--network"])
    .assert()
    .success()
    .stdout(predicate::str::contains("bootstrap"))
    .stdout(predicate::str::contains("wait (exit 0)"))
    .stdout(predicate::str::contains("Outcome: completed"))
    .stdout(predicate::str::contains("Applied: bootstrap, network"));
}

#[test]
fn plan_json_reports_calls_and_outcome() {
  let env = TestEnv::with_config(BOOT_CONFIG);

  let output = env.keel_cmd().args(["plan", "--network", "--json"]).output().unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["report"]["outcome"], "completed");
  assert_eq!(json["report"]["applied"], serde_json::json!(["bootstrap", "network"]));
  let calls = json["calls"].as_array().unwrap();
  assert!(
    calls
      .iter()
      .any(|c| c["op"] == "start" && c["service"] == "network")
  );
  assert!(
    calls
      .iter()
      .any(|c| c["op"] == "wait" && c["service"] == "bootstrap" && c["exit_code"] == 0)
  );
}

#[test]
fn plan_without_network_is_gated() {
  let env = TestEnv::with_config(BOOT_CONFIG);

  env
    .keel_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("Outcome: waiting for network"))
    .stdout(predicate::str::contains("Applied: bootstrap, network"));
}

#[test]
fn plan_reports_requested_restart() {
  let env = TestEnv::with_config(
    r#"
services:
  network:
    image: keelos/network:v1
    labels:
      io.keelos.scope: system
      io.keelos.reloadconfig: true
"#,
  );

  env
    .keel_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("Outcome: restart requested"));
}

#[test]
fn plan_defers_remote_includes_without_network() {
  let env = TestEnv::with_config(
    r#"
services_include:
  ntp: true
repositories:
  core: { url: "http://127.0.0.1:9/os-services" }
"#,
  );

  env
    .keel_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("Deferred: ntp"))
    .stdout(predicate::str::contains("waiting for network"));
}

#[test]
fn plan_loads_path_includes_offline() {
  let env = TestEnv::with_config("");
  let extras = env.write_file(
    "services/extras.yml",
    "kexec:\n  image: keelos/kexec\n  labels: {io.keelos.scope: system}\n",
  );
  std::fs::write(
    &env.config_path,
    format!("services_include:\n  {}: true\n", extras.display()),
  )
  .unwrap();

  env
    .keel_cmd()
    .arg("plan")
    .assert()
    .success()
    .stdout(predicate::str::contains("kexec"))
    .stdout(predicate::str::contains("Applied: kexec"));
}

#[test]
fn plan_respects_createonly() {
  let env = TestEnv::with_config(
    r#"
services:
  data:
    image: keelos/data:v1
    labels:
      io.keelos.scope: system
      io.keelos.createonly: "true"
"#,
  );

  let output = env.keel_cmd().args(["plan", "--json"]).output().unwrap();
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let ops: Vec<&str> = json["calls"]
    .as_array()
    .unwrap()
    .iter()
    .filter_map(|c| c["op"].as_str())
    .collect();

  assert_eq!(ops, vec!["define", "create"]);
}
