//! Service specifications.
//!
//! A service is a named, declaratively described container. Everything the
//! engine decides about a service is derived from its specification:
//!
//! - **Identity**: the hash of the normalized spec gates reprocessing
//! - **Policy**: labels select how the service is started and rebuilt
//! - **Dependencies**: implicit links are inferred from labels and set membership
//!
//! # Submodules
//!
//! - [`parse`] - Service document parsing and label coercion
//! - [`policy`] - Label-derived apply policy
//! - [`deps`] - Implicit dependency inference

pub mod deps;
pub mod parse;
pub mod policy;
mod types;

pub use deps::resolve_links;
pub use parse::{ParseError, parse_services, render_services};
pub use policy::{ApplyPolicy, RebuildPolicy, Scope, StartMode};
pub use types::*;
