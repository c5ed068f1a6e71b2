//! Never-allow checking against the expanded access-vector tables.

use std::collections::BTreeMap;

use crate::error::PolicyError;
use crate::policydb::{AvtabEntry, AvtabKind, ClassPerms, Ebitmap, PolicyDb};

/// An expanded `neverallow` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    /// Concrete source types.
    pub source: Ebitmap,
    /// Concrete target types.
    pub target: Ebitmap,
    /// Also matches entries whose target equals their source.
    pub self_target: bool,
    /// Forbidden permissions per class.
    pub perms: Vec<ClassPerms>,
    /// Source line of the rule (0 when unknown).
    pub line: u32,
}

impl Assertion {
    /// Forbidden bits of `entry` under this assertion, or zero.
    fn violated_bits(&self, entry: &AvtabEntry) -> u32 {
        let key = &entry.key;
        if !self.source.contains_value(key.source) {
            return 0;
        }
        let target_matches = self.target.contains_value(key.target)
            || (self.self_target && key.source == key.target);
        if !target_matches {
            return 0;
        }
        self.perms
            .iter()
            .filter(|cp| cp.class == key.class)
            .fold(0, |acc, cp| acc | (cp.data & entry.data))
    }

    /// `neverallow s t:c { p }` form for diagnostics.
    fn describe(&self, db: &PolicyDb) -> String {
        let mut targets: Vec<String> = self.target.values().map(|v| db.type_name(v)).collect();
        if self.self_target {
            targets.push("self".to_owned());
        }
        let target = match targets.as_slice() {
            [single] => single.clone(),
            _ => format!("{{ {} }}", targets.join(" ")),
        };
        let classes: Vec<String> = self
            .perms
            .iter()
            .map(|cp| {
                format!(
                    "{}:{{ {} }}",
                    db.class_name(cp.class),
                    db.perm_names(cp.class, cp.data).join(" ")
                )
            })
            .collect();
        format!(
            "neverallow {} {} {}",
            db.describe_types(&self.source),
            target,
            classes.join(" ")
        )
    }
}

/// Check every assertion against the allow entries of `db`, unconditional
/// and in both branches of every conditional.
///
/// Every violation is logged; the first is returned.
///
/// # Errors
///
/// [`PolicyError::AssertionViolation`] naming the 1-based assertion index.
pub fn check_assertions(db: &PolicyDb, assertions: &[Assertion]) -> Result<(), PolicyError> {
    let mut by_class: BTreeMap<u32, Vec<&AvtabEntry>> = BTreeMap::new();
    for entry in db.kernel.all_entries() {
        if entry.key.kind == AvtabKind::Allowed {
            by_class.entry(entry.key.class).or_default().push(entry);
        }
    }

    let mut first = None;
    let mut violations = 0usize;
    for (idx, assertion) in assertions.iter().enumerate() {
        let number = idx.saturating_add(1);
        for cp in &assertion.perms {
            let Some(entries) = by_class.get(&cp.class) else {
                continue;
            };
            for entry in entries {
                let bits = assertion.violated_bits(entry);
                if bits == 0 {
                    continue;
                }
                let pattern = assertion.describe(db);
                let rule = db.describe_entry(&AvtabEntry {
                    key: entry.key,
                    data: bits,
                });
                tracing::error!(
                    assertion = number,
                    line = assertion.line,
                    %pattern,
                    %rule,
                    "neverallow violated"
                );
                violations = violations.saturating_add(1);
                if first.is_none() {
                    first = Some(PolicyError::AssertionViolation {
                        assertion: number,
                        pattern,
                        rule,
                    });
                }
            }
        }
    }

    match first {
        Some(err) => {
            tracing::warn!(violations, "assertion check failed");
            Err(err)
        }
        None => {
            tracing::debug!(assertions = assertions.len(), "assertions hold");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policydb::{AvtabKey, PolicyKind, TargetPlatform};

    fn kernel() -> PolicyDb {
        let mut db = PolicyDb::new(PolicyKind::Base, TargetPlatform::Selinux);
        db.declare_class("file", None, &["read", "write"])
            .expect("class");
        db.declare_type("t1").expect("t1");
        db.declare_type("t2").expect("t2");
        db.kind = PolicyKind::Kernel;
        db
    }

    fn allow(db: &mut PolicyDb, source: u32, target: u32, data: u32) {
        db.kernel.avtab.push(AvtabEntry {
            key: AvtabKey {
                source,
                target,
                class: 1,
                kind: AvtabKind::Allowed,
            },
            data,
        });
    }

    #[test]
    fn self_assertion_matches_equal_pair_only() {
        let mut db = kernel();
        allow(&mut db, 1, 2, 0b10);
        let assertion = Assertion {
            source: Ebitmap::from_values([1]),
            target: Ebitmap::new(),
            self_target: true,
            perms: vec![ClassPerms {
                class: 1,
                data: 0b10,
            }],
            line: 0,
        };
        assert!(check_assertions(&db, std::slice::from_ref(&assertion)).is_ok());

        allow(&mut db, 1, 1, 0b10);
        let err = check_assertions(&db, &[assertion]).expect_err("violation");
        assert!(matches!(
            err,
            PolicyError::AssertionViolation { assertion: 1, ref rule, .. }
                if rule == "allow t1 t1:file { write }"
        ));
    }

    #[test]
    fn conditional_branches_are_checked() {
        let mut db = kernel();
        db.kernel.cond_list.push(crate::policydb::CondNode {
            false_list: vec![AvtabEntry {
                key: AvtabKey {
                    source: 2,
                    target: 1,
                    class: 1,
                    kind: AvtabKind::Allowed,
                },
                data: 0b01,
            }],
            ..Default::default()
        });
        let assertion = Assertion {
            source: Ebitmap::from_values([2]),
            target: Ebitmap::from_values([1]),
            self_target: false,
            perms: vec![ClassPerms {
                class: 1,
                data: 0b01,
            }],
            line: 7,
        };
        assert!(check_assertions(&db, &[assertion]).is_err());
    }
}
