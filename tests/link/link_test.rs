//! Tests for module linking.

use macpol::link::link;
use macpol::policydb::{BlockRef, PolicyDb, SymbolKind};
use macpol::PolicyError;

use crate::fixtures;

#[test]
fn module_declarations_join_the_base() {
    let linked = link(fixtures::base(), vec![fixtures::module()]).expect("link");
    assert!(linked.types.value_of("t4").is_some());
    assert!(linked.optionals.is_empty());
    assert!(!linked.has_required_symbols());
    let rule = linked.global.rules.avrules.last().expect("module rule");
    let t1 = linked.type_value("t1").expect("t1");
    assert!(rule.target.types.contains_value(t1));
}

#[test]
fn unresolved_requirement_names_the_symbol() {
    let mut module = PolicyDb::module("needs_tx", "1");
    module
        .require_type(BlockRef::Global, "tX")
        .expect("require");
    let err = link(fixtures::base(), vec![module]).expect_err("unresolved");
    assert!(matches!(
        err,
        PolicyError::UnresolvedSymbol { ref name, ref module, .. }
            if name == "tX" && module == "needs_tx"
    ));
}

#[test]
fn unresolved_optional_block_is_dropped() {
    let mut module = PolicyDb::module("opt", "1");
    module.declare_type("t5").expect("t5");
    let block = module.add_optional();
    module.require_type(block, "absent_t").expect("require");
    let linked = link(fixtures::base(), vec![module]).expect("link");
    assert!(linked.types.value_of("t5").is_some());
    assert!(linked.types.value_of("absent_t").is_none());
}

#[test]
fn duplicate_type_declaration_conflicts() {
    let mut module = PolicyDb::module("dup", "1");
    module.declare_type("t1").expect("t1");
    let err = link(fixtures::base(), vec![module]).expect_err("conflict");
    assert!(matches!(
        err,
        PolicyError::ConflictingDeclaration { kind: SymbolKind::Type, ref name, .. } if name == "t1"
    ));
}

#[test]
fn mls_disagreement_rejected() {
    let mut module = fixtures::module();
    module.mls = true;
    assert!(matches!(
        link(fixtures::base(), vec![module]),
        Err(PolicyError::InvalidDeclaration(_))
    ));
}

#[test]
fn class_redeclared_with_extra_permission_conflicts() {
    let mut module = PolicyDb::module("m", "1");
    module
        .declare_class("file", None, &["read", "write", "getattr", "ioctl"])
        .expect("class");
    let err = link(fixtures::base(), vec![module]).expect_err("conflict");
    assert!(matches!(
        err,
        PolicyError::ConflictingDeclaration { kind: SymbolKind::Class, ref name, .. }
            if name == "file"
    ));
}
