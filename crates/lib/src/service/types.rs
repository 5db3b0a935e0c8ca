//! Service specification types.
//!
//! A `ServiceSpec` is the declarative description of one named service: the
//! compose-style subset keelos understands. All maps are ordered so that
//! serialization, and therefore hashing, is stable.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::service::parse::deserialize_key_values;
use crate::util::hash::{HashError, Hashable, ObjectHash};

/// The desired-state set: service name -> specification.
pub type ServiceSet = BTreeMap<String, ServiceSpec>;

/// Command or entrypoint override, in shell or exec form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
  Shell(String),
  Exec(Vec<String>),
}

/// Logging driver selection for a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
  #[serde(skip_serializing_if = "String::is_empty")]
  pub driver: String,
  #[serde(deserialize_with = "deserialize_key_values", skip_serializing_if = "BTreeMap::is_empty")]
  pub options: BTreeMap<String, String>,
}

/// Declarative description of one service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSpec {
  #[serde(skip_serializing_if = "String::is_empty")]
  pub image: String,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub command: Option<Command>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub entrypoint: Option<Command>,

  #[serde(deserialize_with = "deserialize_key_values", skip_serializing_if = "BTreeMap::is_empty")]
  pub labels: BTreeMap<String, String>,

  #[serde(deserialize_with = "deserialize_key_values", skip_serializing_if = "BTreeMap::is_empty")]
  pub environment: BTreeMap<String, String>,

  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub volumes: Vec<String>,

  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub volumes_from: Vec<String>,

  /// Network namespace mode (`host`, `none`, `container:<name>`).
  #[serde(skip_serializing_if = "Option::is_none")]
  pub net: Option<String>,

  /// Process namespace mode.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub pid: Option<String>,

  /// IPC namespace mode.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub ipc: Option<String>,

  #[serde(skip_serializing_if = "std::ops::Not::not")]
  pub privileged: bool,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub restart: Option<String>,

  /// Author-declared links, `service` or `service:alias`.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub links: Vec<String>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub logging: Option<Logging>,

  #[serde(skip_serializing_if = "Option::is_none")]
  pub container_name: Option<String>,
}

impl ServiceSpec {
  /// Look up a label value.
  pub fn label(&self, key: &str) -> Option<&str> {
    self.labels.get(key).map(String::as_str)
  }

  /// The container name this service should run under.
  pub fn container_name<'a>(&'a self, service: &'a str) -> &'a str {
    self.container_name.as_deref().unwrap_or(service)
  }

  /// The logging driver, if one is configured.
  pub fn logging_driver(&self) -> Option<&str> {
    self
      .logging
      .as_ref()
      .map(|l| l.driver.as_str())
      .filter(|driver| !driver.is_empty())
  }

  /// Returns the spec with derived defaults filled in.
  ///
  /// A missing `container_name` becomes the service name, so two documents
  /// that differ only in spelling that default out hash identically.
  pub fn normalized(&self, service: &str) -> ServiceSpec {
    let mut spec = self.clone();
    if spec.container_name.is_none() {
      spec.container_name = Some(service.to_string());
    }
    spec
  }

  /// Reduce to what image staging needs.
  pub fn image_only(&self) -> ServiceSpec {
    ServiceSpec {
      image: self.image.clone(),
      labels: self.labels.clone(),
      ..Default::default()
    }
  }
}

/// A dependency edge from one service to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
  pub target: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub alias: Option<String>,
  pub optional: bool,
  /// Inferred by the resolver rather than declared by the author.
  pub implicit: bool,
}

impl Link {
  /// Parse an author-declared link (`target` or `target:alias`).
  pub fn declared(raw: &str) -> Self {
    let (target, alias) = match raw.split_once(':') {
      Some((target, alias)) if !alias.is_empty() => (target, Some(alias.to_string())),
      Some((target, _)) => (target, None),
      None => (raw, None),
    };
    Self {
      target: target.to_string(),
      alias,
      optional: false,
      implicit: false,
    }
  }

  pub fn implicit(target: &str, optional: bool) -> Self {
    Self {
      target: target.to_string(),
      alias: None,
      optional,
      implicit: true,
    }
  }
}

impl fmt::Display for Link {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.target)?;
    if let Some(alias) = &self.alias {
      write!(f, ":{}", alias)?;
    }
    if self.optional {
      write!(f, " (optional)")?;
    }
    Ok(())
  }
}

#[derive(Serialize)]
struct HashInput<'a> {
  name: &'a str,
  spec: &'a ServiceSpec,
}

impl Hashable for HashInput<'_> {}

/// Hash of a service's normalized specification, keyed by its name.
pub fn service_hash(name: &str, spec: &ServiceSpec) -> Result<ObjectHash, HashError> {
  let normalized = spec.normalized(name);
  HashInput {
    name,
    spec: &normalized,
  }
  .compute_hash()
}
