//! Tests for attribute expansion.

use macpol::expand::{expand, ExpandOptions};
use macpol::policydb::rules::{CondExpr, CondRule};
use macpol::policydb::{AvRule, AvRuleKind, AvtabKind, BlockRef, PolicyKind, SymbolKind};
use macpol::PolicyError;

use crate::fixtures;

#[test]
fn attribute_source_becomes_one_rule_per_member() {
    let mut db = fixtures::base();
    db.declare_attribute("attrA").expect("attribute");
    db.add_to_attribute("attrA", "t1").expect("t1");
    db.add_to_attribute("attrA", "t2").expect("t2");
    db.allow("attrA", "t3", "file", &["write"]).expect("allow");
    let (t1, t2, t3) = (
        db.type_value("t1").expect("t1"),
        db.type_value("t2").expect("t2"),
        db.type_value("t3").expect("t3"),
    );

    let expanded = expand(db, &ExpandOptions::default()).expect("expand");
    let avtab = &expanded.db.kernel.avtab;
    assert_eq!(avtab.len(), 2);
    let mut sources: Vec<u32> = avtab.iter().map(|e| e.key.source).collect();
    sources.sort_unstable();
    assert_eq!(sources, vec![t1, t2]);
    assert!(avtab.iter().all(|e| e.key.target == t3));
    assert_eq!(expanded.db.kind, PolicyKind::Kernel);
    assert_eq!(expanded.expanded_rules, 2);
}

#[test]
fn expansion_is_deterministic() {
    let first = expand(fixtures::rich_base(), &ExpandOptions::default()).expect("first");
    let second = expand(fixtures::rich_base(), &ExpandOptions::default()).expect("second");
    assert_eq!(first, second);
}

#[test]
fn boolean_conditionals_stay_conditional() {
    let expanded = expand(fixtures::rich_base(), &ExpandOptions::default()).expect("expand");
    let cond = &expanded.db.kernel.cond_list;
    assert_eq!(cond.len(), 1);
    assert_eq!(cond[0].true_list.len(), 1);
    assert!(cond[0].false_list.is_empty());
}

#[test]
fn tunables_are_resolved_and_removed() {
    let mut db = fixtures::base();
    let tunable = db.declare_tunable("enable_extra", false).expect("tunable");
    let rule = |db: &macpol::PolicyDb, perm: &str| {
        AvRule::new(
            AvRuleKind::Allow,
            fixtures::types(db, &["t2"]),
            fixtures::types(db, &["t3"]),
            vec![db.class_perms("file", &[perm]).expect("perms")],
        )
    };
    let cond = CondRule {
        expr: CondExpr::boolean(tunable),
        true_rules: vec![rule(&db, "write")],
        false_rules: vec![rule(&db, "read")],
    };
    db.add_conditional(BlockRef::Global, cond)
        .expect("conditional");
    let read = db.class_perms("file", &["read"]).expect("read").data;

    let expanded = expand(db, &ExpandOptions::default()).expect("expand");
    assert!(expanded.db.bools.is_empty());
    assert!(expanded.db.kernel.cond_list.is_empty());
    let avtab = &expanded.db.kernel.avtab;
    assert_eq!(avtab.len(), 1);
    assert_eq!(avtab[0].data, read);
    assert_eq!(avtab[0].key.kind, AvtabKind::Allowed);
}

#[test]
fn conflicting_type_transitions_rejected() {
    let mut db = fixtures::base();
    db.type_transition("t1", "t3", "file", "t2", None)
        .expect("first");
    db.type_transition("t1", "t3", "file", "t1", None)
        .expect("second");
    assert!(matches!(
        expand(db, &ExpandOptions::default()),
        Err(PolicyError::ConflictingRule { .. })
    ));
}

#[test]
fn bounded_type_cannot_exceed_its_parent() {
    let mut db = fixtures::base();
    db.set_type_bounds("t2", "t1").expect("bounds");
    db.allow("t1", "t3", "file", &["read"]).expect("parent");
    db.allow("t2", "t3", "file", &["read"])
        .expect("child within bounds");
    assert!(expand(db.clone(), &ExpandOptions::default()).is_ok());

    db.allow("t2", "t3", "file", &["write"])
        .expect("child beyond bounds");
    let err = expand(db, &ExpandOptions::default()).expect_err("bounds");
    assert!(matches!(
        err,
        PolicyError::BoundsViolation { kind: SymbolKind::Type, ref child, ref parent, .. }
            if child == "t2" && parent == "t1"
    ));
}

#[test]
fn rule_limit_is_enforced() {
    let options = ExpandOptions {
        max_expanded_rules: 1,
        ..ExpandOptions::default()
    };
    let mut db = fixtures::base();
    db.declare_attribute("all").expect("attribute");
    for t in ["t1", "t2", "t3"] {
        db.add_to_attribute("all", t).expect("member");
    }
    db.allow("all", "t3", "file", &["read"]).expect("allow");
    assert_eq!(
        expand(db, &options).err(),
        Some(PolicyError::ExpansionLimit { limit: 1 })
    );
}

#[test]
fn target_version_outside_kernel_range() {
    for version in [14, 34] {
        let options = ExpandOptions {
            policy_version: version,
            ..ExpandOptions::default()
        };
        assert!(matches!(
            expand(fixtures::scenario_a(), &options),
            Err(PolicyError::UnsupportedVersion { kind: PolicyKind::Kernel, .. })
        ));
    }
}
