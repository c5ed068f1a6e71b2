//! End-to-end compilation of bases and modules.

use macpol::policydb::{AvtabKind, HandleUnknown, PolicyKind, SymbolKind};
use macpol::{Compiler, CompilerConfig, PolicyDb, PolicyError};

use crate::fixtures;

#[test]
fn scenario_a_yields_one_read_rule() {
    let compiled = fixtures::compile(fixtures::scenario_a(), Vec::new());
    let db = &compiled.db;
    assert_eq!(db.kind, PolicyKind::Kernel);
    assert_eq!(db.kernel.avtab.len(), 1);

    let entry = db.kernel.avtab[0];
    let file = db.class_value("file").expect("file");
    let t1 = db.type_value("t1").expect("t1");
    assert_eq!(entry.key.kind, AvtabKind::Allowed);
    assert_eq!(
        (entry.key.source, entry.key.target, entry.key.class),
        (t1, t1, file)
    );
    let read = db.permission_bit(file, "read").expect("read");
    assert_eq!(entry.data, 1 << read);
}

#[test]
fn scenario_b_unresolved_requirement_names_the_type() {
    let mut module = PolicyDb::module("needs_tx", "1.0");
    module
        .require_type(macpol::policydb::BlockRef::Global, "tX")
        .expect("require");
    let err = Compiler::default()
        .compile(fixtures::scenario_a(), vec![module])
        .expect_err("unresolved");
    assert!(matches!(
        err,
        PolicyError::UnresolvedSymbol { kind: SymbolKind::Type, ref name, .. } if name == "tX"
    ));
}

#[test]
fn modules_are_linked_before_expansion() {
    let compiled = fixtures::compile(fixtures::scenario_a(), vec![fixtures::module()]);
    assert_eq!(compiled.stats.modules_linked, 1);
    let db = &compiled.db;
    let t1 = db.type_value("t1").expect("t1");
    let t4 = db.type_value("t4").expect("t4");
    assert!(db
        .kernel
        .avtab
        .iter()
        .any(|e| e.key.source == t4 && e.key.target == t1));
}

#[test]
fn initial_sids_are_loaded() {
    let compiled = fixtures::compile(fixtures::scenario_a(), Vec::new());
    assert_eq!(compiled.sidtab.len(), 1);
    let (sid, context) = compiled.sidtab.by_name("kernel").expect("kernel sid");
    assert_eq!(sid, 1);
    assert_eq!(context.type_, compiled.db.type_value("t1").expect("t1"));
}

#[test]
fn missing_required_sid_is_an_internal_error() {
    let mut config = CompilerConfig::default();
    config.sids.required = vec!["kernel".to_owned(), "security".to_owned()];
    let err = Compiler::new(config)
        .compile(fixtures::scenario_a(), Vec::new())
        .expect_err("missing sid");
    assert!(matches!(err, PolicyError::InternalConsistency(_)));
    assert!(err.is_internal());
}

#[test]
fn configured_unknown_handling_overrides_the_base() {
    let mut config = CompilerConfig::default();
    config.policy.handle_unknown = Some(HandleUnknown::Reject);
    let compiled = Compiler::new(config)
        .compile(fixtures::scenario_a(), Vec::new())
        .expect("compile");
    assert_eq!(compiled.db.handle_unknown, HandleUnknown::Reject);
}

#[test]
fn lone_module_stays_a_module() {
    let compiled = fixtures::compile(fixtures::module(), Vec::new());
    assert_eq!(compiled.db.kind, PolicyKind::Module);
    assert!(compiled.sidtab.is_empty());
    assert_eq!(compiled.stats, Default::default());
}

#[test]
fn module_as_base_with_modules_rejected() {
    let err = Compiler::default()
        .compile(fixtures::module(), vec![fixtures::module()])
        .expect_err("module base");
    assert!(matches!(err, PolicyError::InvalidDeclaration(_)));
}

#[test]
fn compiled_policy_is_not_recompiled() {
    let compiled = fixtures::compile(fixtures::scenario_a(), Vec::new());
    let err = Compiler::default()
        .compile(compiled.db, Vec::new())
        .expect_err("kernel input");
    assert!(matches!(err, PolicyError::InvalidDeclaration(_)));
}

#[test]
fn new_database_carries_the_configured_target() {
    let mut config = CompilerConfig::default();
    config.policy.version = 28;
    config.policy.mls = true;
    let compiler = Compiler::new(config);
    let kernel = compiler.new_database(PolicyKind::Kernel);
    assert_eq!(kernel.version, 28);
    assert!(kernel.mls);
    let base = compiler.new_database(PolicyKind::Base);
    assert_eq!(base.version, PolicyKind::Base.version_range().1);
}
