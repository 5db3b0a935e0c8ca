//! keelos-lib: the service reconciliation engine for keelos.
//!
//! Every piece of keelos userspace runs as a declaratively specified
//! container. This crate converges a container runtime toward that
//! declaration:
//! - `ServiceSpec`: the declarative description of one named service
//! - `SpecLoader`: resolves service names from config, disk, or remote catalogs
//! - `LifecycleController`: applies one service against the runtime
//! - `Reconciler`: runs hash-gated passes over the desired-state set

pub mod config;
pub mod consts;
pub mod lifecycle;
pub mod loader;
pub mod platform;
pub mod reconcile;
pub mod runtime;
pub mod service;
pub mod util;
