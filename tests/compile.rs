//! Integration tests for `src/compile.rs`.

#[path = "support/fixtures.rs"]
mod fixtures;

#[path = "compile/compile_test.rs"]
mod compile_test;
