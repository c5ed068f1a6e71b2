//! Integration tests for `src/expand.rs`.

#[path = "support/fixtures.rs"]
mod fixtures;

#[path = "expand/expand_test.rs"]
mod expand_test;
