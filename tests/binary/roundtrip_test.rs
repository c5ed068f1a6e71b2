//! Write/read cycles across kinds, versions and platforms.

use macpol::policydb::context::PirqCon;
use macpol::policydb::{AvRule, AvRuleKind, MlsRange, PolicyDb, PolicyKind, TargetPlatform};
use macpol::{read_policy, write_policy, Compiler, PolicyError};

use crate::fixtures;

fn round_trip(db: &PolicyDb) -> PolicyDb {
    let bytes = write_policy(db).expect("write");
    read_policy(&bytes).expect("read")
}

fn mls_base() -> PolicyDb {
    let mut db = PolicyDb::base();
    db.mls = true;
    db.declare_class("file", None, &["read", "write"])
        .expect("file");
    db.declare_class("process", None, &["transition"])
        .expect("process");
    db.declare_type("t1").expect("t1");
    db.declare_role("object_r").expect("object_r");
    db.declare_role("system_r").expect("system_r");
    db.add_role_types("system_r", &["t1"]).expect("role types");
    db.declare_user("system_u", &["system_r"]).expect("user");
    for sens in ["s0", "s1"] {
        db.declare_sensitivity(sens).expect("sensitivity");
    }
    for cat in ["c0", "c1"] {
        db.declare_category(cat).expect("category");
    }
    db.define_level("s0", &["c0", "c1"]).expect("s0");
    db.define_level("s1", &["c0", "c1"]).expect("s1");
    let low = db.level("s0", &[]).expect("low");
    let high = db.level("s1", &["c0", "c1"]).expect("high");
    let range = MlsRange {
        low: low.clone(),
        high,
    };
    db.set_user_range("system_u", range.clone(), low)
        .expect("user range");
    db.declare_initial_sid(1, "kernel").expect("sid");
    let ctx = db
        .context("system_u", "system_r", "t1", Some(range))
        .expect("context");
    db.set_initial_sid_context("kernel", ctx)
        .expect("sid context");
    db.allow("t1", "t1", "file", &["read"]).expect("allow");
    db
}

#[test]
fn scenario_a_decodes_to_a_single_read_rule() {
    let compiled = fixtures::compile(fixtures::scenario_a(), Vec::new());
    let bytes = compiled.to_bytes().expect("serialize");
    let db = read_policy(&bytes).expect("decode");
    assert_eq!(db.kind, PolicyKind::Kernel);
    assert_eq!(db.kernel.avtab.len(), 1);
    let file = db.class_value("file").expect("file");
    let read = db.permission_bit(file, "read").expect("read");
    assert_eq!(db.kernel.avtab[0].data, 1 << read);
}

#[test]
fn kernel_versions_without_filename_transitions() {
    for version in [15, 16, 19, 24] {
        let compiled = fixtures::compile_version(fixtures::scenario_a(), version);
        assert_eq!(round_trip(&compiled.db), compiled.db, "version {version}");
    }
}

#[test]
fn kernel_versions_with_every_rule_kind() {
    for version in 25..=33 {
        let compiled = fixtures::compile_version(fixtures::rich_base(), version);
        assert_eq!(round_trip(&compiled.db), compiled.db, "version {version}");
    }
}

#[test]
fn serialization_is_deterministic() {
    let first = fixtures::compile(fixtures::rich_base(), Vec::new())
        .to_bytes()
        .expect("first");
    let second = fixtures::compile(fixtures::rich_base(), Vec::new())
        .to_bytes()
        .expect("second");
    assert_eq!(first, second);
}

#[test]
fn base_and_module_round_trip() {
    let base = fixtures::rich_base();
    assert_eq!(round_trip(&base), base);
    let module = fixtures::module();
    assert_eq!(round_trip(&module), module);
}

#[test]
fn module_optional_blocks_round_trip() {
    let mut module = fixtures::module();
    let block = module.add_optional();
    module.require_type(block, "t2").expect("require t2");
    let rule = AvRule::new(
        AvRuleKind::Allow,
        fixtures::types(&module, &["t4"]),
        fixtures::types(&module, &["t2"]),
        vec![module.class_perms("file", &["read"]).expect("perms")],
    );
    module.add_rule(block, rule).expect("rule");

    let decoded = round_trip(&module);
    assert_eq!(decoded.optionals.len(), 1);
    assert_eq!(decoded, module);
}

#[test]
fn mls_policy_round_trips() {
    for version in [19, 33] {
        let compiled = fixtures::compile_version(mls_base(), version);
        assert!(compiled.db.mls);
        assert_eq!(round_trip(&compiled.db), compiled.db, "version {version}");
    }
}

#[test]
fn xen_policy_round_trips() {
    let mut base = fixtures::base();
    base.target = TargetPlatform::Xen;
    let context = base
        .context("system_u", "object_r", "t2", None)
        .expect("context");
    base.ocontexts.pirqs.push(PirqCon { pirq: 7, context });
    let compiled = Compiler::default()
        .compile(base, Vec::new())
        .expect("compile");
    let bytes = compiled.to_bytes().expect("serialize");
    assert_eq!(bytes.get(8..16), Some(&b"XenFlask"[..]));
    assert_eq!(read_policy(&bytes).expect("decode"), compiled.db);
}

#[test]
fn features_newer_than_the_version_are_refused() {
    let compiled = fixtures::compile_version(fixtures::rich_base(), 24);
    assert_eq!(
        compiled.to_bytes().err(),
        Some(PolicyError::UnsupportedFeature {
            feature: "filename type transitions",
            kind: PolicyKind::Kernel,
            version: 24,
        })
    );

    let compiled = fixtures::compile_version(mls_base(), 18);
    assert!(matches!(
        compiled.to_bytes(),
        Err(PolicyError::UnsupportedFeature { feature: "MLS", .. })
    ));
}
