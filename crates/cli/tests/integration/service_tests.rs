//! Service command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

const CONFIG: &str = r#"
services:
  docker:
    image: keelos/docker:24.0
    labels:
      io.keelos.scope: system
  portal:
    image: example/portal:1
    logging:
      driver: syslog
  syslog:
    image: keelos/syslog:v1
    labels:
      io.keelos.scope: system
"#;

#[test]
fn show_inline_service() {
  let env = TestEnv::with_config(CONFIG);

  env
    .keel_cmd()
    .args(["service", "show", "docker"])
    .assert()
    .success()
    .stdout(predicate::str::contains("docker ("))
    .stdout(predicate::str::contains("Scope: system"))
    .stdout(predicate::str::contains("Start: detached"))
    .stdout(predicate::str::contains("Container: docker"));
}

#[test]
fn show_user_service_links_engine_and_syslog() {
  let env = TestEnv::with_config(CONFIG);

  env
    .keel_cmd()
    .args(["service", "show", "portal"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Scope: user"))
    .stdout(predicate::str::contains("Links: syslog, docker"));
}

#[test]
fn show_multi_service_document_as_json() {
  let env = TestEnv::with_config(CONFIG);
  let doc = env.write_file(
    "extras.yml",
    "kexec:\n  image: keelos/kexec\n  labels: {io.keelos.scope: system, io.keelos.rebuild: always}\nzfs:\n  image: keelos/zfs\n",
  );

  let output = env
    .keel_cmd()
    .args(["service", "show", "--json"])
    .arg(&doc)
    .output()
    .unwrap();
  assert!(output.status.success());

  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let services = json.as_array().unwrap();
  assert_eq!(services.len(), 2);
  assert_eq!(services[0]["name"], "kexec");
  assert_eq!(services[0]["policy"]["rebuild"], "always");
  assert_eq!(services[1]["name"], "zfs");
  assert_eq!(services[1]["container_name"], "zfs");
}

#[test]
fn show_unknown_service_fails() {
  let env = TestEnv::with_config(CONFIG);

  env
    .keel_cmd()
    .args(["service", "show", "ghost"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load service: ghost"));
}
