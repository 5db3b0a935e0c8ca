mod common;
mod plan_tests;
mod service_tests;
