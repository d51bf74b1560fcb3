//! Unit tests for individual components

mod audit_test;
mod config_test;
mod cost_test;
mod error_test;
