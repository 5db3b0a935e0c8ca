//! Parsing service documents.
//!
//! A service document is a YAML mapping of service name to specification and
//! may define several services at once. Scalar label and environment values are
//! coerced to strings (`true` becomes `"true"`) and compose-style `KEY=VALUE`
//! lists are accepted wherever a map is.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use thiserror::Error;

use crate::service::types::{ServiceSet, ServiceSpec};

/// Errors that can occur while parsing a service document.
#[derive(Debug, Error)]
pub enum ParseError {
  /// The document is not valid YAML or does not match the service schema.
  #[error("malformed service document: {0}")]
  Yaml(#[from] serde_yaml::Error),

  /// The document defines no services.
  #[error("service document defines no services")]
  Empty,

  /// A service key is blank.
  #[error("service document contains a service with an empty name")]
  EmptyName,
}

/// Parse a service document into its services.
///
/// Each parsed spec has its container name defaulted to its service name.
pub fn parse_services(bytes: &[u8]) -> Result<ServiceSet, ParseError> {
  let parsed: Option<BTreeMap<String, Option<ServiceSpec>>> = serde_yaml::from_slice(bytes)?;
  let parsed = parsed.unwrap_or_default();
  if parsed.is_empty() {
    return Err(ParseError::Empty);
  }

  let mut services = ServiceSet::new();
  for (name, spec) in parsed {
    if name.trim().is_empty() {
      return Err(ParseError::EmptyName);
    }
    let spec = spec.unwrap_or_default().normalized(&name);
    services.insert(name, spec);
  }
  Ok(services)
}

/// Render services back into a service document.
pub fn render_services(services: &ServiceSet) -> Result<Vec<u8>, ParseError> {
  Ok(serde_yaml::to_string(services)?.into_bytes())
}

/// Deserialize a string map from either a mapping of scalars or a `KEY=VALUE` list.
pub(crate) fn deserialize_key_values<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  coerce_key_values(value.unwrap_or(Value::Null)).map_err(serde::de::Error::custom)
}

fn coerce_key_values(value: Value) -> Result<BTreeMap<String, String>, String> {
  let mut out = BTreeMap::new();
  match value {
    Value::Null => {}
    Value::Mapping(map) => {
      for (key, value) in map {
        let key = coerce_scalar(key).ok_or("map keys must be scalars")?;
        let value = coerce_scalar(value).ok_or_else(|| format!("value for '{}' must be a scalar", key))?;
        out.insert(key, value);
      }
    }
    Value::Sequence(items) => {
      for item in items {
        let entry = coerce_scalar(item).ok_or("list entries must be scalars")?;
        match entry.split_once('=') {
          Some((key, value)) => out.insert(key.to_string(), value.to_string()),
          None => out.insert(entry, String::new()),
        };
      }
    }
    other => return Err(format!("expected a map or a list, found {:?}", other)),
  }
  Ok(out)
}

fn coerce_scalar(value: Value) -> Option<String> {
  match value {
    Value::Null => Some(String::new()),
    Value::Bool(b) => Some(b.to_string()),
    Value::Number(n) => Some(n.to_string()),
    Value::String(s) => Some(s),
    Value::Tagged(tagged) => coerce_scalar(tagged.value),
    Value::Sequence(_) | Value::Mapping(_) => None,
  }
}
