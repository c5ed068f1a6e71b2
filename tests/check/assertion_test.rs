//! Tests for never-allow assertions through the compile pipeline.

use macpol::policydb::rules::{CondExpr, CondRule};
use macpol::policydb::{AvRule, AvRuleKind, BlockRef};
use macpol::{Compiler, CompilerConfig, PolicyError};

use crate::fixtures;

#[test]
fn neverallow_matching_an_allow_fails() {
    let mut db = fixtures::scenario_a();
    db.neverallow("t1", "t1", "file", &["read"])
        .expect("neverallow");
    let err = Compiler::default()
        .compile(db, Vec::new())
        .expect_err("violation");
    match err {
        PolicyError::AssertionViolation {
            assertion,
            pattern,
            rule,
        } => {
            assert_eq!(assertion, 1);
            assert!(pattern.starts_with("neverallow"), "{pattern}");
            assert!(pattern.contains("read"), "{pattern}");
            assert!(rule.contains("t1"), "{rule}");
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn disjoint_permissions_pass() {
    let mut db = fixtures::scenario_a();
    db.neverallow("t1", "t1", "file", &["write"])
        .expect("neverallow");
    let compiled = fixtures::compile(db, Vec::new());
    assert_eq!(compiled.stats.assertions_checked, 1);
}

#[test]
fn self_assertion_only_matches_equal_pairs() {
    let mut db = fixtures::base();
    db.allow("t1", "t2", "file", &["read"]).expect("allow");
    db.neverallow("t1", "self", "file", &["read"])
        .expect("neverallow");
    assert!(Compiler::default().compile(db.clone(), Vec::new()).is_ok());

    db.allow("t1", "t1", "file", &["read"]).expect("allow self");
    assert!(matches!(
        Compiler::default().compile(db, Vec::new()),
        Err(PolicyError::AssertionViolation { .. })
    ));
}

#[test]
fn both_conditional_branches_are_checked() {
    let mut db = fixtures::base();
    let b = db.declare_bool("b", true).expect("bool");
    let cond = CondRule {
        expr: CondExpr::boolean(b),
        true_rules: Vec::new(),
        false_rules: vec![AvRule::new(
            AvRuleKind::Allow,
            fixtures::types(&db, &["t2"]),
            fixtures::types(&db, &["t3"]),
            vec![db.class_perms("file", &["write"]).expect("perms")],
        )],
    };
    db.add_conditional(BlockRef::Global, cond)
        .expect("conditional");
    db.neverallow("t2", "t3", "file", &["write"])
        .expect("neverallow");
    assert!(matches!(
        Compiler::default().compile(db, Vec::new()),
        Err(PolicyError::AssertionViolation { assertion: 1, .. })
    ));
}

#[test]
fn disabled_assertion_checks_are_skipped() {
    let mut db = fixtures::scenario_a();
    db.neverallow("t1", "t1", "file", &["read"])
        .expect("neverallow");
    let mut config = CompilerConfig::default();
    config.checks.assertions = false;
    let compiled = Compiler::new(config)
        .compile(db, Vec::new())
        .expect("compile");
    assert_eq!(compiled.stats.assertions_checked, 0);
}
