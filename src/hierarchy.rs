//! Structural hierarchy checks: bound chains, dominance and constraints.

use std::collections::BTreeSet;

use crate::error::PolicyError;
use crate::policydb::constraint::{Constraint, ConstraintNode};
use crate::policydb::{PolicyDb, SymbolKind, SymbolTable};

/// Check bound chains, role dominance and constraint expressions.
///
/// # Errors
///
/// [`PolicyError::HierarchyViolation`] describing the first problem.
pub fn check(db: &PolicyDb) -> Result<(), PolicyError> {
    check_bound_chains(&db.types, |d| d.bounds, SymbolKind::Type)?;
    check_bound_chains(&db.roles, |d| d.bounds, SymbolKind::Role)?;
    check_bound_chains(&db.users, |d| d.bounds, SymbolKind::User)?;
    check_type_bound_flavors(db)?;
    check_dominance(db)?;
    for class in db.classes.iter() {
        for (idx, constraint) in class.datum.constraints.iter().enumerate() {
            check_constraint(db, class.value, constraint, false)
                .map_err(|detail| violation(&class.name, "constrain", idx, detail))?;
        }
        for (idx, constraint) in class.datum.validatetrans.iter().enumerate() {
            check_constraint(db, class.value, constraint, true)
                .map_err(|detail| violation(&class.name, "validatetrans", idx, detail))?;
        }
    }
    tracing::debug!(classes = db.classes.len(), "hierarchy holds");
    Ok(())
}

fn violation(class: &str, what: &str, idx: usize, detail: String) -> PolicyError {
    PolicyError::HierarchyViolation(format!(
        "{what} #{} on class {class}: {detail}",
        idx.saturating_add(1)
    ))
}

fn check_bound_chains<D>(
    table: &SymbolTable<D>,
    bound: impl Fn(&D) -> Option<u32>,
    kind: SymbolKind,
) -> Result<(), PolicyError> {
    for sym in table.iter() {
        let mut seen = BTreeSet::from([sym.value]);
        let mut current = bound(&sym.datum);
        while let Some(next) = current {
            if !seen.insert(next) {
                return Err(PolicyError::HierarchyViolation(format!(
                    "{kind} bounds of {} form a cycle",
                    sym.name
                )));
            }
            let Some(parent) = table.by_value(next) else {
                return Err(PolicyError::HierarchyViolation(format!(
                    "{kind} {} is bounded by undeclared value {next}",
                    sym.name
                )));
            };
            current = bound(&parent.datum);
        }
    }
    Ok(())
}

fn check_type_bound_flavors(db: &PolicyDb) -> Result<(), PolicyError> {
    for sym in db.types.iter() {
        let Some(parent) = sym.datum.bounds else {
            continue;
        };
        let parent_is_attr = db
            .types
            .by_value(parent)
            .is_some_and(|p| p.datum.is_attribute());
        if sym.datum.is_attribute() || parent_is_attr {
            return Err(PolicyError::HierarchyViolation(format!(
                "type bounds {} -> {} must join concrete types",
                sym.name,
                db.type_name(parent)
            )));
        }
    }
    Ok(())
}

fn check_dominance(db: &PolicyDb) -> Result<(), PolicyError> {
    // 0 unvisited, 1 on the current path, 2 finished
    let mut state = vec![0u8; db.roles.len()];
    fn visit(db: &PolicyDb, value: u32, state: &mut [u8]) -> Result<(), PolicyError> {
        let Some(slot) = usize::try_from(value)
            .ok()
            .and_then(|v| v.checked_sub(1))
            .and_then(|idx| state.get_mut(idx))
        else {
            return Ok(());
        };
        match *slot {
            1 => {
                return Err(PolicyError::HierarchyViolation(format!(
                    "role dominance cycle through {}",
                    db.role_name(value)
                )))
            }
            2 => return Ok(()),
            _ => *slot = 1,
        }
        if let Some(sym) = db.roles.by_value(value) {
            for below in sym.datum.dominates.values() {
                if below != value {
                    visit(db, below, state)?;
                }
            }
        }
        if let Some(slot) = usize::try_from(value)
            .ok()
            .and_then(|v| v.checked_sub(1))
            .and_then(|idx| state.get_mut(idx))
        {
            *slot = 2;
        }
        Ok(())
    }
    for sym in db.roles.iter() {
        visit(db, sym.value, &mut state)?;
    }
    Ok(())
}

fn check_constraint(
    db: &PolicyDb,
    class: u32,
    constraint: &Constraint,
    validatetrans: bool,
) -> Result<(), String> {
    constraint.check_structure()?;
    if constraint.uses_mls() && !db.mls {
        return Err("MLS operand in a non-MLS policy".to_owned());
    }
    if constraint.uses_object() && !validatetrans {
        return Err("transition object operand outside validatetrans".to_owned());
    }
    if !validatetrans {
        let mask = db.class_perm_mask(class).unwrap_or(0);
        if constraint.perms == 0 || constraint.perms & !mask != 0 {
            return Err(format!(
                "permission mask 0x{:x} outside the class",
                constraint.perms
            ));
        }
    }
    for node in &constraint.expr {
        let ConstraintNode::Names { attr, names, .. } = node else {
            continue;
        };
        let known = |value: u32| match attr.name_kind() {
            Some(SymbolKind::Type) => db.types.contains_value(value),
            Some(SymbolKind::Role) => db.roles.contains_value(value),
            Some(SymbolKind::User) => db.users.contains_value(value),
            _ => false,
        };
        if let Some(value) = names.values().find(|v| !known(*v)) {
            return Err(format!("{attr:?} names undeclared value {value}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policydb::constraint::{ConstraintAttr, ConstraintOp};

    fn base() -> PolicyDb {
        let mut db = PolicyDb::base();
        db.declare_class("file", None, &["read"]).expect("class");
        db.declare_type("t1").expect("t1");
        db.declare_type("t2").expect("t2");
        db.declare_role("r1").expect("r1");
        db.declare_role("r2").expect("r2");
        db
    }

    #[test]
    fn type_bound_cycle() {
        let mut db = base();
        db.set_type_bounds("t1", "t2").expect("t1<t2");
        db.set_type_bounds("t2", "t1").expect("t2<t1");
        assert!(matches!(
            check(&db),
            Err(PolicyError::HierarchyViolation(_))
        ));
    }

    #[test]
    fn dominance_cycle() {
        let mut db = base();
        db.add_role_dominance("r1", "r2").expect("r1>r2");
        db.add_role_dominance("r2", "r1").expect("r2>r1");
        assert!(matches!(
            check(&db),
            Err(PolicyError::HierarchyViolation(_))
        ));
    }

    #[test]
    fn mls_operand_needs_mls_policy() {
        let mut db = base();
        db.classes
            .get_mut("file")
            .expect("file")
            .datum
            .constraints
            .push(Constraint {
                perms: 1,
                expr: vec![ConstraintNode::Attr {
                    attr: ConstraintAttr::L1L2,
                    op: ConstraintOp::Dom,
                }],
            });
        let err = check(&db).expect_err("non-MLS");
        assert!(err.to_string().contains("MLS"));
    }

    #[test]
    fn acyclic_policy_passes() {
        let mut db = base();
        db.set_type_bounds("t2", "t1").expect("bounds");
        db.add_role_dominance("r1", "r2").expect("dominance");
        assert!(check(&db).is_ok());
    }
}
