//! Host platform integration.
//!
//! keelos only targets Linux; this module resolves where the engine keeps its
//! configuration and cache on the host.

pub mod paths;
