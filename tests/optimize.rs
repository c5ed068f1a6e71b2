//! Integration tests for `src/optimize.rs` and `src/sort.rs`.

#[path = "support/fixtures.rs"]
mod fixtures;

#[path = "optimize/optimize_test.rs"]
mod optimize_test;
#[path = "optimize/sort_test.rs"]
mod sort_test;
