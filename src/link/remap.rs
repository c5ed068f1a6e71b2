//! Value translation between numbering schemes.
//!
//! Linking moves module symbols into the base's namespace and renumbering
//! squeezes dropped symbols out of a database; both rewrite every reference
//! through a [`SymbolMaps`]. References held by rules and contexts must
//! translate (an unmapped one is a compiler defect); references held by
//! symbol payloads are translated lossily, dropping members that no longer
//! exist.

use std::collections::BTreeMap;

use crate::error::PolicyError;
use crate::policydb::avtab::{
    AvtabEntry, AvtabKey, CondNode, FilenameTrans, KernelRules, RangeTrans, RoleAllow, RoleTrans,
};
use crate::policydb::constraint::{Constraint, ConstraintNode};
use crate::policydb::context::{Context, Ocontexts};
use crate::policydb::mls::{MlsLevel, MlsRange};
use crate::policydb::rules::{
    AvRule, CondExpr, CondExprNode, CondRule, RangeTransRule, Requires, RoleAllowRule, RoleSet,
    RoleTransRule, RuleBlock, RuleSet, TypeSet,
};
use crate::policydb::{
    ClassPerms, Ebitmap, PolicyDb, Scope, Symbol, SymbolKind, SymbolTable, ValueMap,
};

/// Old → new value maps for every symbol category, plus permission bit maps
/// keyed by old class value. A class without a permission map keeps its
/// bits.
#[derive(Debug, Clone, Default)]
pub(crate) struct SymbolMaps {
    pub(crate) commons: ValueMap,
    pub(crate) classes: ValueMap,
    pub(crate) roles: ValueMap,
    pub(crate) types: ValueMap,
    pub(crate) users: ValueMap,
    pub(crate) bools: ValueMap,
    pub(crate) sensitivities: ValueMap,
    pub(crate) categories: ValueMap,
    pub(crate) perms: BTreeMap<u32, Vec<Option<u32>>>,
}

impl SymbolMaps {
    /// Identity maps over every table of `db`.
    pub(crate) fn identity(db: &PolicyDb) -> Self {
        Self {
            commons: ValueMap::identity(db.commons.len()),
            classes: ValueMap::identity(db.classes.len()),
            roles: ValueMap::identity(db.roles.len()),
            types: ValueMap::identity(db.types.len()),
            users: ValueMap::identity(db.users.len()),
            bools: ValueMap::identity(db.bools.len()),
            sensitivities: ValueMap::identity(db.sensitivities.len()),
            categories: ValueMap::identity(db.categories.len()),
            perms: BTreeMap::new(),
        }
    }

    fn table(&self, kind: SymbolKind) -> &ValueMap {
        match kind {
            SymbolKind::Common => &self.commons,
            SymbolKind::Class | SymbolKind::Permission => &self.classes,
            SymbolKind::Role => &self.roles,
            SymbolKind::Type | SymbolKind::Attribute => &self.types,
            SymbolKind::User => &self.users,
            SymbolKind::Bool => &self.bools,
            SymbolKind::Sensitivity => &self.sensitivities,
            SymbolKind::Category => &self.categories,
            // Initial SIDs are keyed by number and never renumbered.
            SymbolKind::InitialSid => &self.categories,
        }
    }

    pub(crate) fn value(&self, kind: SymbolKind, value: u32) -> Result<u32, PolicyError> {
        self.table(kind)
            .get(value)
            .ok_or_else(|| PolicyError::internal(format!("unmapped {kind} value {value}")))
    }

    fn optional_value(
        &self,
        kind: SymbolKind,
        value: Option<u32>,
    ) -> Result<Option<u32>, PolicyError> {
        value.map(|v| self.value(kind, v)).transpose()
    }

    pub(crate) fn bits(&self, kind: SymbolKind, bits: &Ebitmap) -> Result<Ebitmap, PolicyError> {
        let mut out = Ebitmap::new();
        for value in bits.values() {
            out.insert_value(self.value(kind, value)?);
        }
        Ok(out)
    }

    pub(crate) fn bits_lossy(&self, kind: SymbolKind, bits: &Ebitmap) -> Ebitmap {
        let map = self.table(kind);
        let mut out = Ebitmap::new();
        for value in bits.values().filter_map(|v| map.get(v)) {
            out.insert_value(value);
        }
        out
    }

    /// Translate a permission mask of old class `class`.
    pub(crate) fn perm_mask(&self, class: u32, mask: u32) -> Result<u32, PolicyError> {
        let Some(bits) = self.perms.get(&class) else {
            return Ok(mask);
        };
        let mut out = 0u32;
        for bit in 0..32u32 {
            if mask & 1u32.checked_shl(bit).unwrap_or(0) == 0 {
                continue;
            }
            let new_bit = usize::try_from(bit)
                .ok()
                .and_then(|idx| bits.get(idx).copied().flatten())
                .ok_or_else(|| {
                    PolicyError::internal(format!("unmapped permission bit {bit} of class {class}"))
                })?;
            out |= 1u32.checked_shl(new_bit).unwrap_or(0);
        }
        Ok(out)
    }

    pub(crate) fn type_set(&self, set: &TypeSet) -> Result<TypeSet, PolicyError> {
        Ok(TypeSet {
            types: self.bits(SymbolKind::Type, &set.types)?,
            negset: self.bits(SymbolKind::Type, &set.negset)?,
            flag: set.flag,
        })
    }

    fn type_set_lossy(&self, set: &TypeSet) -> TypeSet {
        TypeSet {
            types: self.bits_lossy(SymbolKind::Type, &set.types),
            negset: self.bits_lossy(SymbolKind::Type, &set.negset),
            flag: set.flag,
        }
    }

    fn role_set(&self, set: &RoleSet) -> Result<RoleSet, PolicyError> {
        Ok(RoleSet {
            roles: self.bits(SymbolKind::Role, &set.roles)?,
            flag: set.flag,
        })
    }

    pub(crate) fn level(&self, level: &MlsLevel) -> Result<MlsLevel, PolicyError> {
        Ok(MlsLevel {
            sens: self.value(SymbolKind::Sensitivity, level.sens)?,
            cats: self.bits(SymbolKind::Category, &level.cats)?,
        })
    }

    pub(crate) fn range(&self, range: &MlsRange) -> Result<MlsRange, PolicyError> {
        Ok(MlsRange {
            low: self.level(&range.low)?,
            high: self.level(&range.high)?,
        })
    }

    pub(crate) fn context(&self, ctx: &Context) -> Result<Context, PolicyError> {
        Ok(Context {
            user: self.value(SymbolKind::User, ctx.user)?,
            role: self.value(SymbolKind::Role, ctx.role)?,
            type_: self.value(SymbolKind::Type, ctx.type_)?,
            range: ctx.range.as_ref().map(|r| self.range(r)).transpose()?,
        })
    }

    pub(crate) fn av_rule(&self, rule: &AvRule) -> Result<AvRule, PolicyError> {
        let mut perms = Vec::with_capacity(rule.perms.len());
        for cp in &rule.perms {
            let data = if rule.kind.is_type_rule() {
                self.value(SymbolKind::Type, cp.data)?
            } else {
                self.perm_mask(cp.class, cp.data)?
            };
            perms.push(ClassPerms {
                class: self.value(SymbolKind::Class, cp.class)?,
                data,
            });
        }
        Ok(AvRule {
            kind: rule.kind,
            source: self.type_set(&rule.source)?,
            target: self.type_set(&rule.target)?,
            self_target: rule.self_target,
            perms,
            object_name: rule.object_name.clone(),
            line: rule.line,
        })
    }

    pub(crate) fn cond_expr(&self, expr: &CondExpr) -> Result<CondExpr, PolicyError> {
        let mut nodes = Vec::with_capacity(expr.0.len());
        for node in &expr.0 {
            nodes.push(match node {
                CondExprNode::Bool(b) => CondExprNode::Bool(self.value(SymbolKind::Bool, *b)?),
                other => *other,
            });
        }
        Ok(CondExpr(nodes))
    }

    fn av_rules(&self, rules: &[AvRule]) -> Result<Vec<AvRule>, PolicyError> {
        rules.iter().map(|r| self.av_rule(r)).collect()
    }

    pub(crate) fn rule_set(&self, rules: &RuleSet) -> Result<RuleSet, PolicyError> {
        let mut role_trans = Vec::with_capacity(rules.role_trans.len());
        for rule in &rules.role_trans {
            role_trans.push(RoleTransRule {
                roles: self.role_set(&rule.roles)?,
                types: self.type_set(&rule.types)?,
                classes: self.bits(SymbolKind::Class, &rule.classes)?,
                new_role: self.value(SymbolKind::Role, rule.new_role)?,
            });
        }
        let mut role_allows = Vec::with_capacity(rules.role_allows.len());
        for rule in &rules.role_allows {
            role_allows.push(RoleAllowRule {
                roles: self.role_set(&rule.roles)?,
                new_roles: self.role_set(&rule.new_roles)?,
            });
        }
        let mut range_trans = Vec::with_capacity(rules.range_trans.len());
        for rule in &rules.range_trans {
            range_trans.push(RangeTransRule {
                source: self.type_set(&rule.source)?,
                target: self.type_set(&rule.target)?,
                classes: self.bits(SymbolKind::Class, &rule.classes)?,
                range: self.range(&rule.range)?,
            });
        }
        let mut conditionals = Vec::with_capacity(rules.conditionals.len());
        for cond in &rules.conditionals {
            conditionals.push(CondRule {
                expr: self.cond_expr(&cond.expr)?,
                true_rules: self.av_rules(&cond.true_rules)?,
                false_rules: self.av_rules(&cond.false_rules)?,
            });
        }
        Ok(RuleSet {
            avrules: self.av_rules(&rules.avrules)?,
            role_trans,
            role_allows,
            range_trans,
            conditionals,
        })
    }

    pub(crate) fn requires(&self, req: &Requires) -> Result<Requires, PolicyError> {
        let mut class_perms = BTreeMap::new();
        for (class, mask) in &req.class_perms {
            class_perms.insert(
                self.value(SymbolKind::Class, *class)?,
                self.perm_mask(*class, *mask)?,
            );
        }
        Ok(Requires {
            classes: self.bits(SymbolKind::Class, &req.classes)?,
            roles: self.bits(SymbolKind::Role, &req.roles)?,
            types: self.bits(SymbolKind::Type, &req.types)?,
            users: self.bits(SymbolKind::User, &req.users)?,
            bools: self.bits(SymbolKind::Bool, &req.bools)?,
            sensitivities: self.bits(SymbolKind::Sensitivity, &req.sensitivities)?,
            categories: self.bits(SymbolKind::Category, &req.categories)?,
            class_perms,
        })
    }

    pub(crate) fn block(&self, block: &RuleBlock) -> Result<RuleBlock, PolicyError> {
        Ok(RuleBlock {
            requires: self.requires(&block.requires)?,
            rules: self.rule_set(&block.rules)?,
        })
    }

    pub(crate) fn ocontexts(&self, mut ocons: Ocontexts) -> Result<Ocontexts, PolicyError> {
        for ctx in ocons.contexts_mut() {
            *ctx = self.context(ctx)?;
        }
        for genfs in &mut ocons.genfs {
            genfs.class = self.optional_value(SymbolKind::Class, genfs.class)?;
        }
        Ok(ocons)
    }

    fn avtab_entry(&self, entry: &AvtabEntry) -> Result<AvtabEntry, PolicyError> {
        let data = if entry.key.kind.is_type_rule() {
            self.value(SymbolKind::Type, entry.data)?
        } else {
            self.perm_mask(entry.key.class, entry.data)?
        };
        Ok(AvtabEntry {
            key: AvtabKey {
                source: self.value(SymbolKind::Type, entry.key.source)?,
                target: self.value(SymbolKind::Type, entry.key.target)?,
                class: self.value(SymbolKind::Class, entry.key.class)?,
                kind: entry.key.kind,
            },
            data,
        })
    }

    fn avtab(&self, entries: &[AvtabEntry]) -> Result<Vec<AvtabEntry>, PolicyError> {
        entries.iter().map(|e| self.avtab_entry(e)).collect()
    }

    pub(crate) fn kernel_rules(&self, rules: &KernelRules) -> Result<KernelRules, PolicyError> {
        let mut cond_list = Vec::with_capacity(rules.cond_list.len());
        for node in &rules.cond_list {
            cond_list.push(CondNode {
                expr: self.cond_expr(&node.expr)?,
                true_list: self.avtab(&node.true_list)?,
                false_list: self.avtab(&node.false_list)?,
            });
        }
        let mut role_trans = Vec::with_capacity(rules.role_trans.len());
        for rt in &rules.role_trans {
            role_trans.push(RoleTrans {
                role: self.value(SymbolKind::Role, rt.role)?,
                type_: self.value(SymbolKind::Type, rt.type_)?,
                class: self.value(SymbolKind::Class, rt.class)?,
                new_role: self.value(SymbolKind::Role, rt.new_role)?,
            });
        }
        let mut role_allows = Vec::with_capacity(rules.role_allows.len());
        for ra in &rules.role_allows {
            role_allows.push(RoleAllow {
                role: self.value(SymbolKind::Role, ra.role)?,
                new_role: self.value(SymbolKind::Role, ra.new_role)?,
            });
        }
        let mut filename_trans = Vec::with_capacity(rules.filename_trans.len());
        for ft in &rules.filename_trans {
            filename_trans.push(FilenameTrans {
                source: self.value(SymbolKind::Type, ft.source)?,
                target: self.value(SymbolKind::Type, ft.target)?,
                class: self.value(SymbolKind::Class, ft.class)?,
                name: ft.name.clone(),
                result: self.value(SymbolKind::Type, ft.result)?,
            });
        }
        let mut range_trans = Vec::with_capacity(rules.range_trans.len());
        for rt in &rules.range_trans {
            range_trans.push(RangeTrans {
                source: self.value(SymbolKind::Type, rt.source)?,
                target: self.value(SymbolKind::Type, rt.target)?,
                class: self.value(SymbolKind::Class, rt.class)?,
                range: self.range(&rt.range)?,
            });
        }
        Ok(KernelRules {
            avtab: self.avtab(&rules.avtab)?,
            cond_list,
            role_trans,
            role_allows,
            filename_trans,
            range_trans,
        })
    }

    /// Constraint with names translated lossily.
    pub(crate) fn constraint(&self, constraint: &Constraint) -> Constraint {
        let expr = constraint
            .expr
            .iter()
            .map(|node| match node {
                ConstraintNode::Names {
                    attr,
                    op,
                    names,
                    type_names,
                } => {
                    let kind = attr.name_kind().unwrap_or(SymbolKind::Type);
                    ConstraintNode::Names {
                        attr: *attr,
                        op: *op,
                        names: self.bits_lossy(kind, names),
                        type_names: type_names.as_ref().map(|set| self.type_set_lossy(set)),
                    }
                }
                other => other.clone(),
            })
            .collect();
        Constraint {
            perms: constraint.perms,
            expr,
        }
    }

    fn level_lossy(&self, level: &MlsLevel) -> Option<MlsLevel> {
        Some(MlsLevel {
            sens: self.sensitivities.get(level.sens)?,
            cats: self.bits_lossy(SymbolKind::Category, &level.cats),
        })
    }
}

/// Translate every symbol payload of `db` lossily.
pub(crate) fn remap_datums(db: &mut PolicyDb, maps: &SymbolMaps) {
    for sym in db.classes.iter_mut() {
        let datum = &mut sym.datum;
        datum.common = datum.common.and_then(|c| maps.commons.get(c));
        datum.constraints = datum
            .constraints
            .iter()
            .map(|c| maps.constraint(c))
            .collect();
        datum.validatetrans = datum
            .validatetrans
            .iter()
            .map(|c| maps.constraint(c))
            .collect();
    }
    for sym in db.types.iter_mut() {
        let datum = &mut sym.datum;
        datum.bounds = datum.bounds.and_then(|b| maps.types.get(b));
        datum.members = maps.bits_lossy(SymbolKind::Type, &datum.members);
    }
    for sym in db.roles.iter_mut() {
        let datum = &mut sym.datum;
        datum.bounds = datum.bounds.and_then(|b| maps.roles.get(b));
        datum.dominates = maps.bits_lossy(SymbolKind::Role, &datum.dominates);
        datum.roles = maps.bits_lossy(SymbolKind::Role, &datum.roles);
        datum.types = maps.type_set_lossy(&datum.types);
    }
    for sym in db.users.iter_mut() {
        let datum = &mut sym.datum;
        datum.bounds = datum.bounds.and_then(|b| maps.users.get(b));
        datum.roles = maps.bits_lossy(SymbolKind::Role, &datum.roles);
        datum.range = datum.range.as_ref().and_then(|r| {
            Some(MlsRange {
                low: maps.level_lossy(&r.low)?,
                high: maps.level_lossy(&r.high)?,
            })
        });
        datum.default_level = datum
            .default_level
            .as_ref()
            .and_then(|l| maps.level_lossy(l));
    }
    for sym in db.sensitivities.iter_mut() {
        sym.datum.cats = sym
            .datum
            .cats
            .as_ref()
            .map(|cats| maps.bits_lossy(SymbolKind::Category, cats));
    }
    db.permissive = maps.bits_lossy(SymbolKind::Type, &db.permissive);
}

/// Translate every rule, requirement and context of `db`.
pub(crate) fn remap_contents(db: &mut PolicyDb, maps: &SymbolMaps) -> Result<(), PolicyError> {
    db.global = maps.block(&db.global)?;
    db.optionals = db
        .optionals
        .iter()
        .map(|block| maps.block(block))
        .collect::<Result<_, _>>()?;
    db.kernel = maps.kernel_rules(&db.kernel)?;
    db.ocontexts = maps.ocontexts(std::mem::take(&mut db.ocontexts))?;
    Ok(())
}

/// Keep the entries of `table` accepted by `keep`, renumbered densely.
pub(crate) fn retain<D>(table: &mut SymbolTable<D>, keep: impl Fn(&Symbol<D>) -> bool) -> ValueMap {
    let kind = table.kind();
    let old = std::mem::replace(table, SymbolTable::new(kind));
    let (kept, map) = old.retain_renumbered(keep);
    *table = kept;
    map
}

/// Remove every required-only symbol and renumber the rest.
pub(crate) fn purge_required(db: &mut PolicyDb) -> Result<(), PolicyError> {
    if !db.has_required_symbols() {
        return Ok(());
    }
    let declared = |scope: Scope| scope == Scope::Declared;
    let maps = SymbolMaps {
        commons: retain(&mut db.commons, |s| declared(s.scope)),
        classes: retain(&mut db.classes, |s| declared(s.scope)),
        roles: retain(&mut db.roles, |s| declared(s.scope)),
        types: retain(&mut db.types, |s| declared(s.scope)),
        users: retain(&mut db.users, |s| declared(s.scope)),
        bools: retain(&mut db.bools, |s| declared(s.scope)),
        sensitivities: retain(&mut db.sensitivities, |s| declared(s.scope)),
        categories: retain(&mut db.categories, |s| declared(s.scope)),
        perms: BTreeMap::new(),
    };
    remap_datums(db, &maps);
    remap_contents(db, &maps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policydb::{AvRuleKind, BlockRef};

    #[test]
    fn permission_bits_follow_map() {
        let mut maps = SymbolMaps::default();
        maps.perms.insert(1, vec![Some(2), Some(0)]);
        assert_eq!(maps.perm_mask(1, 0b11), Ok(0b101));
        assert!(maps.perm_mask(1, 0b100).is_err());
        assert_eq!(maps.perm_mask(7, 0b100), Ok(0b100));
    }

    #[test]
    fn purge_renumbers_rules() {
        let mut db = PolicyDb::base();
        db.declare_class("file", None, &["read"]).expect("class");
        db.require_type(BlockRef::Global, "ghost").expect("ghost");
        db.declare_type("t1").expect("t1");
        db.global.requires = Requires::default();
        db.allow("t1", "t1", "file", &["read"]).expect("allow");
        purge_required(&mut db).expect("purge");
        assert_eq!(db.types.len(), 1);
        assert_eq!(db.types.value_of("t1"), Some(1));
        let rule = &db.global.rules.avrules[0];
        assert_eq!(rule.kind, AvRuleKind::Allow);
        assert!(rule.source.types.contains_value(1));
    }

    #[test]
    fn purge_fails_on_dangling_rule() {
        let mut db = PolicyDb::base();
        db.declare_class("file", None, &["read"]).expect("class");
        db.require_type(BlockRef::Global, "ghost").expect("ghost");
        db.allow("ghost", "ghost", "file", &["read"])
            .expect("allow");
        let err = purge_required(&mut db);
        assert!(matches!(err, Err(PolicyError::InternalConsistency(_))));
    }
}
