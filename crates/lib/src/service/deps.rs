//! Implicit dependency inference.
//!
//! Links are computed fresh on every pass from current set membership and are
//! never written back into a specification.

use crate::consts::{ENGINE_SERVICE, NETWORK_SERVICE, SYSLOG_DRIVER, SYSLOG_SERVICE};
use crate::service::policy::ApplyPolicy;
use crate::service::types::{Link, ServiceSet, ServiceSpec};

/// Compute the full link list for `name`: declared links first, then inferred ones.
///
/// Inference rules:
/// - a `syslog` logging driver links to `syslog`
/// - a non-system service links to the user-facing engine (`docker`)
/// - a system service whose image is not present locally gets an optional
///   link to `network`
///
/// Inferred links to services absent from `set` are dropped, as are
/// self-links and duplicates. `image_present` is the caller's runtime lookup,
/// which keeps this function pure.
pub fn resolve_links(name: &str, spec: &ServiceSpec, set: &ServiceSet, image_present: bool) -> Vec<Link> {
  let mut links: Vec<Link> = Vec::new();

  for raw in &spec.links {
    let link = Link::declared(raw);
    if !links.iter().any(|l| l.target == link.target) {
      links.push(link);
    }
  }

  let mut implicit = Vec::new();
  if spec.logging_driver() == Some(SYSLOG_DRIVER) {
    implicit.push(Link::implicit(SYSLOG_SERVICE, false));
  }
  if !ApplyPolicy::from_spec(spec).is_system() {
    implicit.push(Link::implicit(ENGINE_SERVICE, false));
  } else if !image_present {
    implicit.push(Link::implicit(NETWORK_SERVICE, true));
  }

  for link in implicit {
    if link.target == name || !set.contains_key(&link.target) {
      continue;
    }
    if links.iter().any(|l| l.target == link.target) {
      continue;
    }
    links.push(link);
  }

  links
}
