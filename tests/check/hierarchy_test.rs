//! Tests for hierarchy and constraint checks through the compile pipeline.

use macpol::policydb::constraint::{ConstraintAttr, ConstraintNode, ConstraintOp};
use macpol::{Compiler, CompilerConfig, PolicyError};

use crate::fixtures;

fn compile(db: macpol::PolicyDb) -> Result<macpol::CompiledPolicy, PolicyError> {
    Compiler::default().compile(db, Vec::new())
}

#[test]
fn role_dominance_cycle_rejected() {
    let mut db = fixtures::scenario_a();
    db.declare_role("r1").expect("r1");
    db.declare_role("r2").expect("r2");
    db.add_role_dominance("r1", "r2").expect("r1 > r2");
    db.add_role_dominance("r2", "r1").expect("r2 > r1");
    assert!(matches!(
        compile(db),
        Err(PolicyError::HierarchyViolation(_))
    ));
}

#[test]
fn well_formed_constraint_accepted() {
    let mut db = fixtures::scenario_a();
    db.add_constraint(
        "file",
        &["write"],
        vec![
            ConstraintNode::Attr {
                attr: ConstraintAttr::U1U2,
                op: ConstraintOp::Eq,
            },
            ConstraintNode::Attr {
                attr: ConstraintAttr::R1R2,
                op: ConstraintOp::Eq,
            },
            ConstraintNode::Or,
        ],
    )
    .expect("constraint");
    assert!(compile(db).is_ok());
}

#[test]
fn unbalanced_constraint_rejected() {
    let mut db = fixtures::scenario_a();
    db.add_constraint(
        "file",
        &["write"],
        vec![
            ConstraintNode::Attr {
                attr: ConstraintAttr::U1U2,
                op: ConstraintOp::Eq,
            },
            ConstraintNode::And,
        ],
    )
    .expect("constraint");
    assert!(matches!(
        compile(db),
        Err(PolicyError::HierarchyViolation(_))
    ));
}

#[test]
fn mls_constraint_in_non_mls_policy_rejected() {
    let mut db = fixtures::scenario_a();
    db.add_constraint(
        "file",
        &["read"],
        vec![ConstraintNode::Attr {
            attr: ConstraintAttr::L1L2,
            op: ConstraintOp::Dom,
        }],
    )
    .expect("constraint");
    assert!(matches!(
        compile(db.clone()),
        Err(PolicyError::HierarchyViolation(_))
    ));

    let mut config = CompilerConfig::default();
    config.checks.hierarchy = false;
    let lenient = Compiler::new(config).compile(db, Vec::new());
    assert!(!matches!(lenient, Err(PolicyError::HierarchyViolation(_))));
}
