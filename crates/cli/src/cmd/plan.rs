//! Implementation of the `keel plan` command.
//!
//! Runs one reconcile pass against an in-memory runtime and prints the calls
//! each service would receive. Nothing touches a real container daemon.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use keelos_lib::loader::SpecLoader;
use keelos_lib::reconcile::{PassOutcome, PassReport, ReconcileOptions, Reconciler};
use keelos_lib::runtime::{MemoryRuntime, RuntimeCall};

use super::{async_runtime, load_config};
use crate::output::{OutputFormat, format_list, print_heading, print_info, print_json, print_stat, print_warning, symbols};

#[derive(Serialize)]
struct PlanOutput<'a> {
  report: &'a PassReport,
  calls: &'a [RuntimeCall],
}

pub fn cmd_plan(config_path: Option<&Path>, network: bool, output: OutputFormat) -> Result<()> {
  let config = load_config(config_path)?;

  let runtime = Arc::new(MemoryRuntime::new());
  let loader = SpecLoader::from_config(&config);
  let mut reconciler =
    Reconciler::new(runtime.clone(), loader, ReconcileOptions::default()).with_network(network);

  let report = async_runtime()?.block_on(reconciler.pass(&config));
  let calls = runtime.take_calls();

  if output.is_json() {
    return print_json(&PlanOutput {
      report: &report,
      calls: &calls,
    });
  }

  if calls.is_empty() {
    print_info("No runtime calls would be made");
  }
  for (service, service_calls) in group_by_service(&calls) {
    print_heading(service);
    for call in service_calls {
      println!("  {} {}", symbols::ARROW, describe(call));
    }
  }

  println!();
  print_stat("Outcome", outcome_label(report.outcome));
  print_stat("Applied", &format_list(&report.applied));
  print_stat("Unchanged", &format_list(&report.skipped));
  print_stat("Deferred", &format_list(&report.deferred));
  print_stat("Failed", &format_list(&report.failed));

  if !report.deferred.is_empty() && !network {
    print_info("Deferred services load once the network is up (try --network)");
  }
  if !report.failed.is_empty() {
    print_warning(&format!("{} service(s) could not be loaded", report.failed.len()));
  }

  Ok(())
}

/// Group calls by service, in the order services were first touched.
fn group_by_service(calls: &[RuntimeCall]) -> Vec<(&str, Vec<&RuntimeCall>)> {
  let mut groups: Vec<(&str, Vec<&RuntimeCall>)> = Vec::new();
  for call in calls {
    match groups.iter_mut().find(|(service, _)| *service == call.service()) {
      Some((_, group)) => group.push(call),
      None => groups.push((call.service(), vec![call])),
    }
  }
  groups
}

fn describe(call: &RuntimeCall) -> String {
  match call {
    RuntimeCall::Define { links, .. } if links.is_empty() => "define".to_string(),
    RuntimeCall::Define { links, .. } => format!("define (links: {})", links.join(", ")),
    RuntimeCall::Create { .. } => "create".to_string(),
    RuntimeCall::Start { .. } => "start".to_string(),
    RuntimeCall::Wait { exit_code, .. } => format!("wait (exit {})", exit_code),
    RuntimeCall::Recreate { image, .. } => format!("recreate from {}", image),
    RuntimeCall::Rename { from, to, .. } => format!("rename {} {} {}", from, symbols::ARROW, to),
    RuntimeCall::Pull { image, .. } => format!("pull {}", image),
  }
}

fn outcome_label(outcome: PassOutcome) -> &'static str {
  match outcome {
    PassOutcome::Completed => "completed",
    PassOutcome::NetworkGated => "waiting for network",
    PassOutcome::Restart => "restart requested",
  }
}
