//! Decoding of damaged or foreign input.

use macpol::{read_policy, PolicyError};

use crate::fixtures;

/// magic, platform length, "SE Linux", version
const CONFIG_OFFSET: usize = 20;

fn kernel_bytes() -> Vec<u8> {
    fixtures::compile(fixtures::rich_base(), Vec::new())
        .to_bytes()
        .expect("serialize")
}

fn patch(bytes: &mut [u8], offset: usize, value: u32) {
    bytes
        .get_mut(offset..offset + 4)
        .expect("field in range")
        .copy_from_slice(&value.to_le_bytes());
}

#[test]
fn empty_input_rejected() {
    assert!(matches!(
        read_policy(&[]),
        Err(PolicyError::MalformedInput { offset: 0, .. })
    ));
}

#[test]
fn truncated_kernel_policy_rejected() {
    let bytes = kernel_bytes();
    for cut in [1, 4, bytes.len() / 2, bytes.len() - 1] {
        let prefix = &bytes[..bytes.len() - cut];
        assert!(
            matches!(read_policy(prefix), Err(PolicyError::MalformedInput { .. })),
            "cut {cut}"
        );
    }
}

#[test]
fn unknown_config_bits_rejected() {
    let mut bytes = kernel_bytes();
    patch(&mut bytes, CONFIG_OFFSET, 0x80);
    assert!(matches!(
        read_policy(&bytes),
        Err(PolicyError::MalformedInput { offset: 24, .. })
    ));
}

#[test]
fn mls_flag_below_its_version_rejected() {
    let mut bytes = fixtures::compile_version(fixtures::scenario_a(), 15)
        .to_bytes()
        .expect("serialize");
    patch(&mut bytes, CONFIG_OFFSET, 1);
    assert!(matches!(
        read_policy(&bytes),
        Err(PolicyError::UnsupportedFeature { feature: "MLS", version: 15, .. })
    ));
}

#[test]
fn kernel_body_under_module_magic_rejected() {
    // version 19 is valid for both families, so decoding reaches the kind word
    let mut bytes = fixtures::compile_version(fixtures::scenario_a(), 19)
        .to_bytes()
        .expect("serialize");
    patch(&mut bytes, 0, macpol::binary::MODULE_MAGIC);
    assert!(matches!(
        read_policy(&bytes),
        Err(PolicyError::MalformedInput { .. })
    ));
}

#[test]
fn foreign_platform_rejected() {
    let mut bytes = kernel_bytes();
    bytes[8..16].copy_from_slice(b"NotLinux");
    assert!(matches!(
        read_policy(&bytes),
        Err(PolicyError::MalformedInput { .. })
    ));
}

#[test]
fn kernel_version_out_of_range_rejected() {
    let mut bytes = kernel_bytes();
    patch(&mut bytes, 16, 14);
    assert!(matches!(
        read_policy(&bytes),
        Err(PolicyError::UnsupportedVersion {
            version: 14,
            min: 15,
            max: 33,
            ..
        })
    ));
}
