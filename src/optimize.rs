//! Access-vector table optimization for kernel databases.
//!
//! Entries sharing a key are folded together (permission masks OR-ed, type
//! rule duplicates collapsed), conditional nodes with the same guard are
//! merged, and the remaining rule lists are sorted and deduplicated. Running
//! the optimizer twice changes nothing the second time.

use std::collections::BTreeMap;

use crate::error::PolicyError;
use crate::policydb::{AvtabEntry, AvtabKey, CondNode, PolicyDb, PolicyKind};

/// What an optimizer run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    /// Entries folded into another entry with the same key.
    pub merged: usize,
    /// Conditional nodes folded into an earlier node with the same guard.
    pub cond_nodes_merged: usize,
}

/// Optimize the rule tables of a kernel database in place. Other kinds are
/// left alone.
///
/// # Errors
///
/// [`PolicyError::ConflictingRule`] when two type rules share a key but not
/// a result.
pub fn optimize(db: &mut PolicyDb) -> Result<OptimizeStats, PolicyError> {
    if db.kind != PolicyKind::Kernel {
        tracing::debug!(kind = %db.kind, "optimizer skipped");
        return Ok(OptimizeStats::default());
    }
    let mut stats = OptimizeStats::default();

    let avtab = std::mem::take(&mut db.kernel.avtab);
    db.kernel.avtab = fold_entries(db, avtab, &mut stats.merged)?;

    let nodes = std::mem::take(&mut db.kernel.cond_list);
    let mut merged_nodes: Vec<CondNode> = Vec::with_capacity(nodes.len());
    for node in nodes {
        match merged_nodes.iter_mut().find(|n| n.expr == node.expr) {
            Some(existing) => {
                existing.true_list.extend(node.true_list);
                existing.false_list.extend(node.false_list);
                stats.cond_nodes_merged = stats.cond_nodes_merged.saturating_add(1);
            }
            None => merged_nodes.push(node),
        }
    }
    for node in &mut merged_nodes {
        let true_list = std::mem::take(&mut node.true_list);
        node.true_list = fold_entries(db, true_list, &mut stats.merged)?;
        let false_list = std::mem::take(&mut node.false_list);
        node.false_list = fold_entries(db, false_list, &mut stats.merged)?;
    }
    db.kernel.cond_list = merged_nodes;

    let kernel = &mut db.kernel;
    kernel.role_trans.sort();
    kernel.role_trans.dedup();
    kernel.role_allows.sort();
    kernel.role_allows.dedup();
    kernel.filename_trans.sort();
    kernel.filename_trans.dedup();
    kernel.range_trans.sort();
    kernel.range_trans.dedup();

    tracing::info!(
        avtab = db.kernel.avtab.len(),
        merged = stats.merged,
        cond_nodes_merged = stats.cond_nodes_merged,
        "optimized rule tables"
    );
    Ok(stats)
}

/// Fold entries with equal keys; output is sorted by key.
fn fold_entries(
    db: &PolicyDb,
    entries: Vec<AvtabEntry>,
    merged: &mut usize,
) -> Result<Vec<AvtabEntry>, PolicyError> {
    let mut folded: BTreeMap<AvtabKey, u32> = BTreeMap::new();
    for entry in entries {
        match folded.get_mut(&entry.key) {
            None => {
                folded.insert(entry.key, entry.data);
            }
            Some(data) if entry.key.kind.is_type_rule() => {
                if *data != entry.data {
                    return Err(PolicyError::ConflictingRule {
                        key: format!(
                            "{} {}",
                            entry.key.kind.rule_kind().keyword(),
                            db.describe_key(&entry.key)
                        ),
                        first: db.type_name(*data),
                        second: db.type_name(entry.data),
                    });
                }
                *merged = merged.saturating_add(1);
            }
            Some(data) => {
                *data |= entry.data;
                *merged = merged.saturating_add(1);
            }
        }
    }
    Ok(folded
        .into_iter()
        .map(|(key, data)| AvtabEntry { key, data })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policydb::{AvtabKind, TargetPlatform};

    fn entry(class: u32, kind: AvtabKind, data: u32) -> AvtabEntry {
        AvtabEntry {
            key: AvtabKey {
                source: 1,
                target: 1,
                class,
                kind,
            },
            data,
        }
    }

    fn kernel() -> PolicyDb {
        PolicyDb::new(PolicyKind::Kernel, TargetPlatform::Selinux)
    }

    #[test]
    fn merges_same_key_only() {
        let mut db = kernel();
        db.kernel.avtab = vec![
            entry(1, AvtabKind::Allowed, 0b01),
            entry(2, AvtabKind::Allowed, 0b01),
            entry(1, AvtabKind::Allowed, 0b10),
            entry(1, AvtabKind::AuditAllow, 0b10),
        ];
        let stats = optimize(&mut db).expect("optimize");
        assert_eq!(stats.merged, 1);
        assert_eq!(db.kernel.avtab.len(), 3);
        assert_eq!(db.kernel.avtab.first().map(|e| e.data), Some(0b11));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let mut db = kernel();
        db.kernel.avtab = vec![
            entry(1, AvtabKind::Allowed, 0b01),
            entry(1, AvtabKind::Allowed, 0b10),
        ];
        optimize(&mut db).expect("first");
        let once = db.clone();
        let stats = optimize(&mut db).expect("second");
        assert_eq!(stats, OptimizeStats::default());
        assert_eq!(db, once);
    }

    #[test]
    fn conflicting_type_results() {
        let mut db = kernel();
        db.kernel.avtab = vec![
            entry(1, AvtabKind::Transition, 2),
            entry(1, AvtabKind::Transition, 3),
        ];
        assert!(matches!(
            optimize(&mut db),
            Err(PolicyError::ConflictingRule { .. })
        ));
    }

    #[test]
    fn base_databases_untouched() {
        let mut db = PolicyDb::base();
        let before = db.clone();
        assert_eq!(optimize(&mut db).expect("skip"), OptimizeStats::default());
        assert_eq!(db, before);
    }
}
