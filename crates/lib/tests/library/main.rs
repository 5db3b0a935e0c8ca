//! Library integration tests: whole passes against the in-memory runtime.

mod common;
mod passes_tests;
mod run_tests;
mod specials_tests;
