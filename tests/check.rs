//! Integration tests for `src/assertion.rs` and `src/hierarchy.rs`.

#[path = "support/fixtures.rs"]
mod fixtures;

#[path = "check/assertion_test.rs"]
mod assertion_test;
#[path = "check/hierarchy_test.rs"]
mod hierarchy_test;
