//! Tests for the construction API in `src/policydb/build.rs`.

use macpol::policydb::{PolicyDb, SymbolKind};
use macpol::PolicyError;

use crate::fixtures;

#[test]
fn unknown_names_are_reported() {
    let mut db = fixtures::base();
    let err = db
        .allow("t1", "missing_t", "file", &["read"])
        .expect_err("unknown type");
    assert!(matches!(
        err,
        PolicyError::UnknownSymbol { kind: SymbolKind::Type, ref name } if name == "missing_t"
    ));
    assert!(db.allow("t1", "t2", "file", &["execute"]).is_err());
}

#[test]
fn permission_bits_follow_the_common() {
    let mut db = PolicyDb::base();
    db.declare_common("file_common", &["read", "write"])
        .expect("common");
    let class = db
        .declare_class("file", Some("file_common"), &["entrypoint"])
        .expect("class");
    assert_eq!(db.permission_bit(class, "read"), Some(0));
    assert_eq!(db.permission_bit(class, "entrypoint"), Some(2));
    assert_eq!(db.class_perm_mask(class), Some(0b111));
}

#[test]
fn class_permission_limit() {
    let names: Vec<String> = (0..33).map(|i| format!("p{i}")).collect();
    let perms: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut db = PolicyDb::base();
    assert!(matches!(
        db.declare_class("big", None, &perms),
        Err(PolicyError::InvalidDeclaration(_))
    ));
    assert!(db.declare_class("ok", None, &perms[..32]).is_ok());
}

#[test]
fn sensitivity_without_level_fails_declaration_check() {
    let mut db = PolicyDb::base();
    db.mls = true;
    db.declare_sensitivity("s0").expect("s0");
    db.declare_sensitivity("s1").expect("s1");
    db.declare_category("c0").expect("c0");
    db.define_level("s0", &["c0"]).expect("level");
    assert!(matches!(
        db.check_declarations(),
        Err(PolicyError::InvalidDeclaration(_))
    ));
    db.define_level("s1", &[]).expect("level");
    assert!(db.check_declarations().is_ok());
}

#[test]
fn context_range_must_match_mls() {
    let db = fixtures::base();
    assert!(db.context("system_u", "system_r", "t1", None).is_ok());
    let mut mls = fixtures::base();
    mls.mls = true;
    assert!(matches!(
        mls.context("system_u", "system_r", "t1", None),
        Err(PolicyError::InvalidDeclaration(_))
    ));
}

#[test]
fn self_target_sets_flag() {
    let mut db = fixtures::base();
    db.allow("t1", "self", "process", &["signal"])
        .expect("allow");
    let rule = db.global.rules.avrules.last().expect("rule");
    assert!(rule.self_target);
    assert!(rule.target.types.is_empty());
}

#[test]
fn unknown_capability_rejected() {
    let mut db = PolicyDb::base();
    assert!(db.enable_capability("network_peer_controls").is_ok());
    assert!(db.enable_capability("time_travel").is_err());
}
