//! Integration tests for `src/link/`.

#[path = "support/fixtures.rs"]
mod fixtures;

#[path = "link/link_test.rs"]
mod link_test;
