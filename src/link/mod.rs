//! Module linker.
//!
//! Merges a base database with loadable modules into one base database.
//! Modules are merged in order; a module's global requirements must be met
//! by declarations in the base or in a module merged before it. Optional
//! blocks are kept aside until every module is in, then enabled if all of
//! their requirements were declared somewhere and dropped otherwise.

mod remap;

use std::collections::BTreeSet;

use crate::error::PolicyError;
use crate::policydb::rules::{Requires, SetFlag};
use crate::policydb::{
    Ebitmap, PolicyDb, PolicyKind, RoleDatum, Scope, Symbol, SymbolKind, SymbolTable, TypeDatum,
    UserDatum, ValueMap,
};

pub(crate) use remap::{purge_required, remap_contents, remap_datums, retain, SymbolMaps};

/// Link `modules` into `base`.
///
/// The result is a base database with a single global block, no optional
/// blocks and no required-only symbols.
///
/// # Errors
///
/// [`PolicyError::UnresolvedSymbol`] for an unmet global requirement,
/// [`PolicyError::ConflictingDeclaration`] for incompatible declarations and
/// [`PolicyError::InvalidDeclaration`] for inputs of the wrong kind or MLS
/// setting.
pub fn link(base: PolicyDb, modules: Vec<PolicyDb>) -> Result<PolicyDb, PolicyError> {
    if base.kind != PolicyKind::Base {
        return Err(PolicyError::InvalidDeclaration(format!(
            "modules can only be linked into a base policy, not a {} policy",
            base.kind
        )));
    }
    let mut out = base;
    let base_name = out.display_name();
    tracing::info!(base = %base_name, modules = modules.len(), "linking policy");

    check_declared(&out, &out.global.requires, &base_name)?;

    for module in modules {
        if module.kind != PolicyKind::Module {
            return Err(PolicyError::InvalidDeclaration(format!(
                "{} is a {} policy, only modules can be linked",
                module.display_name(),
                module.kind
            )));
        }
        if module.mls != out.mls {
            return Err(PolicyError::InvalidDeclaration(format!(
                "module {} disagrees with the base on MLS",
                module.display_name()
            )));
        }
        merge_module(&mut out, module)?;
    }

    let (enabled, dropped) = resolve_optionals(&mut out);
    out.global.requires = Requires::default();
    purge_required(&mut out)?;

    tracing::info!(
        base = %base_name,
        types = out.types.len(),
        roles = out.roles.len(),
        optionals_enabled = enabled,
        optionals_dropped = dropped,
        "link complete"
    );
    Ok(out)
}

// ── Requirement bookkeeping ─────────────────────────────────────

fn required_bits(req: &Requires, kind: SymbolKind) -> Option<&Ebitmap> {
    match kind {
        SymbolKind::Class => Some(&req.classes),
        SymbolKind::Role => Some(&req.roles),
        SymbolKind::Type | SymbolKind::Attribute => Some(&req.types),
        SymbolKind::User => Some(&req.users),
        SymbolKind::Bool => Some(&req.bools),
        SymbolKind::Sensitivity => Some(&req.sensitivities),
        SymbolKind::Category => Some(&req.categories),
        _ => None,
    }
}

/// Requirement sets of one module, by block.
struct ModuleRequires<'a> {
    name: String,
    global: &'a Requires,
    optionals: Vec<&'a Requires>,
}

impl ModuleRequires<'_> {
    fn requires(req: &Requires, kind: SymbolKind, value: u32) -> bool {
        required_bits(req, kind).is_some_and(|bits| bits.contains_value(value))
    }

    /// Whether the module cannot do without the symbol: the global block
    /// requires it, or no optional block claims it.
    fn is_global(&self, kind: SymbolKind, value: u32) -> bool {
        Self::requires(self.global, kind, value)
            || !self
                .optionals
                .iter()
                .any(|req| Self::requires(req, kind, value))
    }

    fn unresolved(&self, kind: SymbolKind, name: &str) -> PolicyError {
        PolicyError::UnresolvedSymbol {
            kind,
            name: name.to_owned(),
            module: self.name.clone(),
        }
    }
}

/// Every symbol listed in `req` must be declared in `db`.
fn check_declared(db: &PolicyDb, req: &Requires, module: &str) -> Result<(), PolicyError> {
    fn check<D>(table: &SymbolTable<D>, bits: &Ebitmap, module: &str) -> Result<(), PolicyError> {
        for value in bits.values() {
            match table.by_value(value) {
                Some(sym) if sym.scope == Scope::Declared => {}
                Some(sym) => {
                    return Err(PolicyError::UnresolvedSymbol {
                        kind: table.kind(),
                        name: sym.name.clone(),
                        module: module.to_owned(),
                    })
                }
                None => {
                    return Err(PolicyError::internal(format!(
                        "requirement names missing {} value {value}",
                        table.kind()
                    )))
                }
            }
        }
        Ok(())
    }
    check(&db.classes, &req.classes, module)?;
    check(&db.roles, &req.roles, module)?;
    check(&db.types, &req.types, module)?;
    check(&db.users, &req.users, module)?;
    check(&db.bools, &req.bools, module)?;
    check(&db.sensitivities, &req.sensitivities, module)?;
    check(&db.categories, &req.categories, module)
}

/// Whether every requirement of an optional block is declared in `db`.
fn block_satisfied(db: &PolicyDb, req: &Requires) -> bool {
    fn declared<D>(table: &SymbolTable<D>, bits: &Ebitmap) -> bool {
        bits.values().all(|value| {
            table
                .by_value(value)
                .is_some_and(|sym| sym.scope == Scope::Declared)
        })
    }
    let perms_ok = req.class_perms.iter().all(|(class, mask)| {
        db.class_perm_mask(*class)
            .is_some_and(|full| mask & !full == 0)
    });
    perms_ok
        && declared(&db.classes, &req.classes)
        && declared(&db.roles, &req.roles)
        && declared(&db.types, &req.types)
        && declared(&db.users, &req.users)
        && declared(&db.bools, &req.bools)
        && declared(&db.sensitivities, &req.sensitivities)
        && declared(&db.categories, &req.categories)
}

/// Fold satisfied optional blocks into the global block and drop the rest.
fn resolve_optionals(db: &mut PolicyDb) -> (usize, usize) {
    let optionals = std::mem::take(&mut db.optionals);
    let mut enabled = 0usize;
    let mut dropped = 0usize;
    for (idx, block) in optionals.into_iter().enumerate() {
        if block_satisfied(db, &block.requires) {
            db.global.rules.append(block.rules);
            enabled = enabled.saturating_add(1);
        } else {
            tracing::warn!(
                block = idx,
                "dropping optional block with unmet requirements"
            );
            dropped = dropped.saturating_add(1);
        }
    }
    (enabled, dropped)
}

// ── Symbol merging ──────────────────────────────────────────────

/// Whether a symbol declared by both sides is merged or a conflict.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Redeclare {
    Conflict,
    Merge,
}

/// Map every module symbol of a mergeable category (types, roles, users,
/// booleans) into `out`, inserting declarations and placeholders for
/// optional-only requirements.
fn map_symbols<D: Clone>(
    out: &mut SymbolTable<D>,
    module: &SymbolTable<D>,
    reqs: &ModuleRequires<'_>,
    redeclare: Redeclare,
    compatible: impl Fn(&Symbol<D>, &Symbol<D>) -> Result<(), String>,
    placeholder: impl Fn(&D) -> D,
) -> Result<ValueMap, PolicyError> {
    let kind = module.kind();
    let mut map = ValueMap::with_len(module.len());
    for sym in module.iter() {
        let value = match out.get_mut(&sym.name) {
            Some(existing) => {
                compatible(&*existing, sym).map_err(|detail| PolicyError::ConflictingDeclaration {
                    kind,
                    name: sym.name.clone(),
                    detail,
                })?;
                match (sym.scope, existing.scope) {
                    (Scope::Declared, Scope::Declared) => {
                        if redeclare == Redeclare::Conflict {
                            return Err(PolicyError::ConflictingDeclaration {
                                kind,
                                name: sym.name.clone(),
                                detail: format!("declared again by {}", reqs.name),
                            });
                        }
                    }
                    (Scope::Declared, Scope::Required) => existing.scope = Scope::Declared,
                    (Scope::Required, Scope::Declared) => {}
                    (Scope::Required, Scope::Required) => {
                        if reqs.is_global(kind, sym.value) {
                            return Err(reqs.unresolved(kind, &sym.name));
                        }
                    }
                }
                existing.value
            }
            None => {
                if sym.scope == Scope::Required && reqs.is_global(kind, sym.value) {
                    return Err(reqs.unresolved(kind, &sym.name));
                }
                out.insert(&sym.name, sym.scope, placeholder(&sym.datum))?
            }
        };
        map.set(sym.value, value);
    }
    merge_aliases(out, module, &map)?;
    Ok(map)
}

/// Map symbols only the base may declare (commons, classes, sensitivities,
/// categories). Unknown optional-only requirements stay unmapped; `same`
/// compares a module declaration with the base's.
fn map_base_only<D>(
    out: &SymbolTable<D>,
    module: &SymbolTable<D>,
    reqs: &ModuleRequires<'_>,
    same: impl Fn(u32, u32) -> bool,
) -> Result<ValueMap, PolicyError> {
    let kind = module.kind();
    let mut map = ValueMap::with_len(module.len());
    for sym in module.iter() {
        let existing = out
            .get(&sym.name)
            .filter(|existing| existing.scope == Scope::Declared);
        match (existing, sym.scope) {
            (Some(existing), Scope::Declared) => {
                if !same(sym.value, existing.value) {
                    return Err(PolicyError::ConflictingDeclaration {
                        kind,
                        name: sym.name.clone(),
                        detail: format!("{} redeclares it differently", reqs.name),
                    });
                }
                map.set(sym.value, existing.value);
            }
            (Some(existing), Scope::Required) => map.set(sym.value, existing.value),
            (None, Scope::Declared) => {
                return Err(PolicyError::InvalidDeclaration(format!(
                    "module {} declares {kind} {}; only the base may",
                    reqs.name, sym.name
                )))
            }
            (None, Scope::Required) => {
                if reqs.is_global(kind, sym.value) {
                    return Err(reqs.unresolved(kind, &sym.name));
                }
            }
        }
    }
    Ok(map)
}

fn merge_aliases<D>(
    out: &mut SymbolTable<D>,
    module: &SymbolTable<D>,
    map: &ValueMap,
) -> Result<(), PolicyError> {
    let aliases: Vec<(String, u32)> = module
        .aliases()
        .map(|(alias, value)| (alias.to_owned(), value))
        .collect();
    for (alias, value) in aliases {
        let Some(target) = map.get(value) else {
            continue;
        };
        match out.value_of(&alias) {
            Some(existing) if existing == target => {}
            Some(_) => {
                return Err(PolicyError::ConflictingDeclaration {
                    kind: out.kind(),
                    name: alias,
                    detail: "alias names a different symbol".to_owned(),
                })
            }
            None => out.add_alias(&alias, target)?,
        }
    }
    Ok(())
}

fn merge_bounds(
    kind: SymbolKind,
    name: &str,
    current: &mut Option<u32>,
    incoming: Option<u32>,
) -> Result<(), PolicyError> {
    match (*current, incoming) {
        (_, None) => Ok(()),
        (None, Some(bound)) => {
            *current = Some(bound);
            Ok(())
        }
        (Some(a), Some(b)) if a == b => Ok(()),
        (Some(_), Some(_)) => Err(PolicyError::ConflictingDeclaration {
            kind,
            name: name.to_owned(),
            detail: "bounds disagree".to_owned(),
        }),
    }
}

/// Merge one module into `out`.
fn merge_module(out: &mut PolicyDb, module: PolicyDb) -> Result<(), PolicyError> {
    let reqs = ModuleRequires {
        name: module.display_name(),
        global: &module.global.requires,
        optionals: module.optionals.iter().map(|b| &b.requires).collect(),
    };
    tracing::debug!(module = %reqs.name, "merging module");

    let mut maps = SymbolMaps {
        commons: map_base_only(&out.commons, &module.commons, &reqs, |m, o| {
            module.commons.by_value(m).map(|s| &s.datum.perms)
                == out.commons.by_value(o).map(|s| &s.datum.perms)
        })?,
        classes: map_base_only(&out.classes, &module.classes, &reqs, |m, o| {
            module.class_permissions(m) == out.class_permissions(o)
        })?,
        sensitivities: map_base_only(
            &out.sensitivities,
            &module.sensitivities,
            &reqs,
            |_, _| true,
        )?,
        categories: map_base_only(&out.categories, &module.categories, &reqs, |_, _| true)?,
        ..SymbolMaps::default()
    };

    // Permission bits are matched by name.
    for class in module.classes.iter() {
        let Some(target) = maps.classes.get(class.value) else {
            continue;
        };
        let perms = module.class_permissions(class.value).unwrap_or_default();
        let bits = perms
            .iter()
            .map(|perm| out.permission_bit(target, perm))
            .collect();
        maps.perms.insert(class.value, bits);
    }
    for (class, mask) in &reqs.global.class_perms {
        if let Some(perm) = unmapped_perms(&module, &maps, *class, *mask).first() {
            return Err(reqs.unresolved(SymbolKind::Permission, perm));
        }
    }

    maps.types = map_symbols(
        &mut out.types,
        &module.types,
        &reqs,
        Redeclare::Conflict,
        |existing, incoming| {
            if existing.datum.flavor == incoming.datum.flavor {
                Ok(())
            } else {
                Err("type and attribute flavors disagree".to_owned())
            }
        },
        |datum| TypeDatum {
            flavor: datum.flavor,
            ..TypeDatum::default()
        },
    )?;
    maps.roles = map_symbols(
        &mut out.roles,
        &module.roles,
        &reqs,
        Redeclare::Merge,
        |existing, incoming| {
            if existing.datum.flavor == incoming.datum.flavor {
                Ok(())
            } else {
                Err("role and role attribute flavors disagree".to_owned())
            }
        },
        |datum| RoleDatum {
            flavor: datum.flavor,
            ..RoleDatum::default()
        },
    )?;
    maps.users = map_symbols(
        &mut out.users,
        &module.users,
        &reqs,
        Redeclare::Merge,
        |_, _| Ok(()),
        |_| UserDatum::default(),
    )?;
    maps.bools = map_symbols(
        &mut out.bools,
        &module.bools,
        &reqs,
        Redeclare::Merge,
        |existing, incoming| {
            let both_declared =
                existing.scope == Scope::Declared && incoming.scope == Scope::Declared;
            if both_declared && existing.datum != incoming.datum {
                Err("default state or tunable flag disagree".to_owned())
            } else {
                Ok(())
            }
        },
        |datum| *datum,
    )?;

    merge_datums(out, &module, &maps)?;

    // Optional blocks needing base-only symbols the base lacks never enable.
    let mut dropped: BTreeSet<usize> = BTreeSet::new();
    for (idx, req) in reqs.optionals.iter().enumerate() {
        let missing_symbol = [
            (&req.classes, &maps.classes),
            (&req.sensitivities, &maps.sensitivities),
            (&req.categories, &maps.categories),
        ]
        .iter()
        .any(|(bits, map)| bits.values().any(|v| map.get(v).is_none()));
        let missing_perm = req
            .class_perms
            .iter()
            .any(|(class, mask)| !unmapped_perms(&module, &maps, *class, *mask).is_empty());
        if missing_symbol || missing_perm {
            tracing::warn!(
                module = %reqs.name,
                block = idx,
                "dropping optional block that needs symbols missing from the base"
            );
            dropped.insert(idx);
        }
    }

    let rules = maps.rule_set(&module.global.rules)?;
    out.global.rules.append(rules);
    for (idx, block) in module.optionals.iter().enumerate() {
        if !dropped.contains(&idx) {
            out.optionals.push(maps.block(block)?);
        }
    }
    out.permissive
        .union_with(&maps.bits(SymbolKind::Type, &module.permissive)?);
    out.policycaps.union_with(&module.policycaps);
    let ocontexts = maps.ocontexts(module.ocontexts.clone())?;
    out.ocontexts.append(ocontexts);

    tracing::debug!(
        module = %reqs.name,
        optionals = module.optionals.len().saturating_sub(dropped.len()),
        "module merged"
    );
    Ok(())
}

/// `class:perm` names of required permission bits with no counterpart in
/// the output.
fn unmapped_perms(module: &PolicyDb, maps: &SymbolMaps, class: u32, mask: u32) -> Vec<String> {
    let class_name = module.class_name(class);
    let perms = module.class_permissions(class).unwrap_or_default();
    let bits = maps.perms.get(&class);
    let mut missing = Vec::new();
    for (idx, perm) in perms.iter().enumerate() {
        let Ok(bit) = u32::try_from(idx) else {
            break;
        };
        if mask & 1u32.checked_shl(bit).unwrap_or(0) == 0 {
            continue;
        }
        let mapped = bits.and_then(|b| b.get(idx).copied().flatten()).is_some();
        if !mapped {
            missing.push(format!("{class_name}:{perm}"));
        }
    }
    missing
}

/// Union module payloads (memberships, authorizations, bounds) into the
/// symbols they map to.
fn merge_datums(
    out: &mut PolicyDb,
    module: &PolicyDb,
    maps: &SymbolMaps,
) -> Result<(), PolicyError> {
    for sym in module.types.iter() {
        let target = maps.value(SymbolKind::Type, sym.value)?;
        let bounds = sym.datum.bounds.and_then(|b| maps.types.get(b));
        let members = maps.bits_lossy(SymbolKind::Type, &sym.datum.members);
        let datum = &mut entry_mut(&mut out.types, target)?.datum;
        datum.members.union_with(&members);
        merge_bounds(SymbolKind::Type, &sym.name, &mut datum.bounds, bounds)?;
    }
    for sym in module.roles.iter() {
        let target = maps.value(SymbolKind::Role, sym.value)?;
        let bounds = sym.datum.bounds.and_then(|b| maps.roles.get(b));
        let dominates = maps.bits_lossy(SymbolKind::Role, &sym.datum.dominates);
        let roles = maps.bits_lossy(SymbolKind::Role, &sym.datum.roles);
        let types = maps.bits_lossy(SymbolKind::Type, &sym.datum.types.types);
        let negset = maps.bits_lossy(SymbolKind::Type, &sym.datum.types.negset);
        let datum = &mut entry_mut(&mut out.roles, target)?.datum;
        datum.dominates.union_with(&dominates);
        datum.roles.union_with(&roles);
        datum.types.types.union_with(&types);
        datum.types.negset.union_with(&negset);
        if sym.datum.types.flag != SetFlag::None {
            datum.types.flag = sym.datum.types.flag;
        }
        merge_bounds(SymbolKind::Role, &sym.name, &mut datum.bounds, bounds)?;
    }
    for sym in module.users.iter() {
        let target = maps.value(SymbolKind::User, sym.value)?;
        let bounds = sym.datum.bounds.and_then(|b| maps.users.get(b));
        let roles = maps.bits_lossy(SymbolKind::Role, &sym.datum.roles);
        let range = sym.datum.range.as_ref().map(|r| maps.range(r)).transpose()?;
        let level = sym
            .datum
            .default_level
            .as_ref()
            .map(|l| maps.level(l))
            .transpose()?;
        let datum = &mut entry_mut(&mut out.users, target)?.datum;
        datum.roles.union_with(&roles);
        if range.is_some() {
            if datum.range.is_some() && datum.range != range {
                return Err(PolicyError::ConflictingDeclaration {
                    kind: SymbolKind::User,
                    name: sym.name.clone(),
                    detail: "MLS ranges disagree".to_owned(),
                });
            }
            datum.range = range;
            datum.default_level = level;
        }
        merge_bounds(SymbolKind::User, &sym.name, &mut datum.bounds, bounds)?;
    }
    for sym in module.bools.iter() {
        if sym.scope != Scope::Declared {
            continue;
        }
        let target = maps.value(SymbolKind::Bool, sym.value)?;
        entry_mut(&mut out.bools, target)?.datum = sym.datum;
    }
    Ok(())
}

fn entry_mut<D>(table: &mut SymbolTable<D>, value: u32) -> Result<&mut Symbol<D>, PolicyError> {
    let kind = table.kind();
    table
        .by_value_mut(value)
        .ok_or_else(|| PolicyError::internal(format!("merged {kind} value {value} missing")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policydb::{AvRule, AvRuleKind, BlockRef, ClassPerms, TypeSet};

    fn base() -> PolicyDb {
        let mut db = PolicyDb::base();
        db.declare_class("file", None, &["read", "write"])
            .expect("class");
        db.declare_type("t1").expect("t1");
        db
    }

    #[test]
    fn base_kind_required() {
        let module = PolicyDb::module("m", "1");
        assert!(matches!(
            link(module, vec![]),
            Err(PolicyError::InvalidDeclaration(_))
        ));
    }

    #[test]
    fn permission_bits_rewritten_to_base_positions() {
        let mut module = PolicyDb::module("m", "1");
        module
            .require_class(BlockRef::Global, "file", &["write"])
            .expect("require");
        module.require_type(BlockRef::Global, "t1").expect("t1");
        module.allow("t1", "t1", "file", &["write"]).expect("allow");
        // Module-local bit 0 is the base's bit 1.
        assert_eq!(module.global.rules.avrules[0].perms[0].data, 0b01);

        let linked = link(base(), vec![module]).expect("link");
        assert_eq!(linked.global.rules.avrules[0].perms[0].data, 0b10);
    }

    #[test]
    fn placeholder_enables_later_optional() {
        let mut first = PolicyDb::module("first", "1");
        let opt = first.add_optional();
        first.require_class(opt, "file", &["read"]).expect("class");
        first.require_type(opt, "late_t").expect("late_t");
        first
            .block_mut(opt)
            .expect("block")
            .rules
            .avrules
            .push(AvRule::new(
                AvRuleKind::Allow,
                TypeSet::of([1]),
                TypeSet::of([1]),
                vec![ClassPerms { class: 1, data: 1 }],
            ));

        let mut second = PolicyDb::module("second", "1");
        second.declare_type("late_t").expect("late_t");

        let linked = link(base(), vec![first, second]).expect("link");
        assert_eq!(linked.global.rules.avrules.len(), 1);
        assert!(!linked.has_required_symbols());
    }
}
