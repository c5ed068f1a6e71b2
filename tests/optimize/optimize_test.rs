//! Tests for access-vector folding on compiled policies.

use macpol::optimize::optimize;
use macpol::policydb::AvtabKind;

use crate::fixtures;

#[test]
fn overlapping_allows_fold_into_one_entry() {
    let mut db = fixtures::base();
    db.allow("t1", "t2", "file", &["read"]).expect("read");
    db.allow("t1", "t2", "file", &["write"]).expect("write");
    let compiled = fixtures::compile(db, Vec::new());
    assert!(compiled.stats.rules_merged >= 1);

    let db = &compiled.db;
    let file = db.class_value("file").expect("file");
    let entries: Vec<_> = db
        .kernel
        .avtab
        .iter()
        .filter(|e| e.key.class == file && e.key.kind == AvtabKind::Allowed)
        .collect();
    assert_eq!(entries.len(), 1);
    let read = db.permission_bit(file, "read").expect("read bit");
    let write = db.permission_bit(file, "write").expect("write bit");
    assert_eq!(entries[0].data, (1 << read) | (1 << write));
}

#[test]
fn compiled_table_is_sorted_by_key() {
    let compiled = fixtures::compile(fixtures::rich_base(), Vec::new());
    let keys: Vec<_> = compiled.db.kernel.avtab.iter().map(|e| e.key).collect();
    assert!(!keys.is_empty());
    assert!(keys.windows(2).all(|w| w[0] < w[1]), "{keys:?}");
}

#[test]
fn second_pass_changes_nothing() {
    let compiled = fixtures::compile(fixtures::rich_base(), Vec::new());
    let mut db = compiled.db.clone();
    let stats = optimize(&mut db).expect("optimize");
    assert_eq!(stats.merged, 0);
    assert_eq!(stats.cond_nodes_merged, 0);
    assert_eq!(db, compiled.db);
}

#[test]
fn non_kernel_databases_are_left_alone() {
    let mut db = fixtures::rich_base();
    let before = db.clone();
    let stats = optimize(&mut db).expect("optimize");
    assert_eq!(stats.merged, 0);
    assert_eq!(db, before);
}
