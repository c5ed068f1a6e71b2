//! Integration tests for `src/config.rs`.

#[path = "config/config_test.rs"]
mod config_test;
