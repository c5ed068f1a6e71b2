//! Tests for `src/policydb/symtab.rs`.

use macpol::policydb::{Scope, SymbolKind, SymbolTable, TypeDatum};
use macpol::PolicyError;

#[test]
fn values_are_dense_and_one_based() {
    let mut table = SymbolTable::new(SymbolKind::Type);
    let a = table.declare("a_t", TypeDatum::concrete()).expect("a");
    let b = table.declare("b_t", TypeDatum::concrete()).expect("b");
    assert_eq!((a, b), (1, 2));
    assert_eq!(table.nprim(), 2);
    assert_eq!(table.name_of(2), Some("b_t"));
    assert!(!table.contains_value(0));
    assert!(!table.contains_value(3));
}

#[test]
fn requirement_is_upgraded_by_declaration() {
    let mut table = SymbolTable::new(SymbolKind::Type);
    let required = table
        .require("a_t", TypeDatum::concrete())
        .expect("require");
    assert_eq!(table.get("a_t").map(|s| s.scope), Some(Scope::Required));
    let declared = table
        .declare("a_t", TypeDatum::concrete())
        .expect("declare");
    assert_eq!(required, declared);
    assert_eq!(table.get("a_t").map(|s| s.scope), Some(Scope::Declared));
}

#[test]
fn second_declaration_conflicts() {
    let mut table = SymbolTable::new(SymbolKind::Type);
    table.declare("a_t", TypeDatum::concrete()).expect("first");
    let err = table
        .declare("a_t", TypeDatum::concrete())
        .expect_err("second");
    assert!(matches!(
        err,
        PolicyError::ConflictingDeclaration { kind: SymbolKind::Type, ref name, .. }
            if name == "a_t"
    ));
}

#[test]
fn aliases_resolve_to_their_target() {
    let mut table = SymbolTable::new(SymbolKind::Type);
    let value = table.declare("a_t", TypeDatum::concrete()).expect("a");
    table.add_alias("a_alias", value).expect("alias");
    assert_eq!(table.value_of("a_alias"), Some(value));
    assert_eq!(table.len(), 1);
    assert!(table.add_alias("a_t", value).is_err());
    assert!(table.add_alias("dangling", 7).is_err());
}
