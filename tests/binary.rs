//! Integration tests for the binary policy format in `src/binary/`.

#[path = "support/fixtures.rs"]
mod fixtures;

#[path = "binary/malformed_test.rs"]
mod malformed_test;
#[path = "binary/roundtrip_test.rs"]
mod roundtrip_test;
