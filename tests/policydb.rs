//! Integration tests for `src/policydb/`.

#[path = "support/fixtures.rs"]
mod fixtures;

#[path = "policydb/build_test.rs"]
mod build_test;
#[path = "policydb/symtab_test.rs"]
mod symtab_test;
