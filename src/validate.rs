//! Read-only consistency sweep run before a database is serialized and
//! after one is decoded.
//!
//! Anything caught here is a compiler (or input) defect rather than a policy
//! mistake, so every failure is [`PolicyError::InternalConsistency`].

use crate::error::PolicyError;
use crate::policydb::constraint::{Constraint, ConstraintNode};
use crate::policydb::datum::MAX_CLASS_PERMS;
use crate::policydb::rules::{AvRule, CondExpr, Requires, RuleBlock, RuleSet, TypeSet};
use crate::policydb::{
    AvtabEntry, Context, Ebitmap, MlsLevel, MlsRange, PolicyDb, PolicyKind, Scope, SymbolKind,
    SymbolTable, TargetPlatform, POLICY_CAPABILITIES,
};

/// Validation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Initial SID names a kernel policy must define.
    pub required_initial_sids: Vec<String>,
}

/// Validate `db` with default options.
///
/// # Errors
///
/// [`PolicyError::InternalConsistency`] describing the first problem.
pub fn validate(db: &PolicyDb) -> Result<(), PolicyError> {
    validate_with(db, &ValidateOptions::default())
}

/// Validate `db`.
///
/// # Errors
///
/// [`PolicyError::InternalConsistency`] describing the first problem.
pub fn validate_with(db: &PolicyDb, options: &ValidateOptions) -> Result<(), PolicyError> {
    let v = Validator { db };
    v.metadata()?;
    v.symbols()?;
    v.storage()?;
    v.datums()?;
    match db.kind {
        PolicyKind::Kernel => v.kernel_rules()?,
        PolicyKind::Base | PolicyKind::Module => {
            v.block(&db.global)?;
            for block in &db.optionals {
                v.block(block)?;
            }
        }
    }
    v.contexts()?;
    v.initial_sids(options)?;
    tracing::debug!(kind = %db.kind, "validation passed");
    Ok(())
}

struct Validator<'a> {
    db: &'a PolicyDb,
}

impl Validator<'_> {
    // ── Helpers ─────────────────────────────────────────────────

    fn value<D>(&self, table: &SymbolTable<D>, value: u32, what: &str) -> Result<(), PolicyError> {
        if table.contains_value(value) {
            Ok(())
        } else {
            Err(PolicyError::internal(format!(
                "{what}: {} value {value} out of range",
                table.kind()
            )))
        }
    }

    fn bits<D>(
        &self,
        table: &SymbolTable<D>,
        bits: &Ebitmap,
        what: &str,
    ) -> Result<(), PolicyError> {
        match bits.highest_bit() {
            Some(bit) if bit >= table.nprim() => Err(PolicyError::internal(format!(
                "{what}: {} bitmap reaches value {}",
                table.kind(),
                bit.saturating_add(1)
            ))),
            _ => Ok(()),
        }
    }

    fn concrete_type(&self, value: u32, what: &str) -> Result<(), PolicyError> {
        match self.db.types.by_value(value) {
            Some(sym) if !sym.datum.is_attribute() => Ok(()),
            Some(sym) => Err(PolicyError::internal(format!(
                "{what}: attribute {} used as a type",
                sym.name
            ))),
            None => Err(PolicyError::internal(format!("{what}: type value {value} out of range"))),
        }
    }

    fn perm_mask(&self, class: u32, mask: u32, what: &str) -> Result<(), PolicyError> {
        self.value(&self.db.classes, class, what)?;
        let full = self.db.class_perm_mask(class).unwrap_or(0);
        if mask & !full != 0 {
            return Err(PolicyError::internal(format!(
                "{what}: permissions 0x{mask:x} outside class {}",
                self.db.class_name(class)
            )));
        }
        Ok(())
    }

    fn type_set(&self, set: &TypeSet, what: &str) -> Result<(), PolicyError> {
        self.bits(&self.db.types, &set.types, what)?;
        self.bits(&self.db.types, &set.negset, what)
    }

    fn level(&self, level: &MlsLevel, what: &str) -> Result<(), PolicyError> {
        self.value(&self.db.sensitivities, level.sens, what)?;
        self.bits(&self.db.categories, &level.cats, what)
    }

    fn range(&self, range: &MlsRange, what: &str) -> Result<(), PolicyError> {
        if !self.db.mls {
            return Err(PolicyError::internal(format!("{what}: MLS range in a non-MLS policy")));
        }
        self.level(&range.low, what)?;
        self.level(&range.high, what)?;
        if self.db.kind == PolicyKind::Kernel && !range.is_well_formed() {
            return Err(PolicyError::internal(format!("{what}: high level does not dominate low")));
        }
        Ok(())
    }

    fn cond_expr(&self, expr: &CondExpr, what: &str) -> Result<(), PolicyError> {
        if !expr.is_well_formed() {
            return Err(PolicyError::internal(format!("{what}: malformed conditional expression")));
        }
        for value in expr.bools() {
            self.value(&self.db.bools, value, what)?;
        }
        Ok(())
    }

    // ── Metadata and tables ─────────────────────────────────────

    fn metadata(&self) -> Result<(), PolicyError> {
        let db = self.db;
        if !db.kind.supports_version(db.version) {
            return Err(PolicyError::internal(format!(
                "{} database at version {}",
                db.kind, db.version
            )));
        }
        let known = u32::try_from(POLICY_CAPABILITIES.len()).unwrap_or(u32::MAX);
        if db.policycaps.highest_bit().is_some_and(|bit| bit >= known) {
            return Err(PolicyError::internal("unknown policy capability enabled"));
        }
        self.bits(&db.types, &db.permissive, "permissive map")?;
        let wrong_platform = match db.target {
            TargetPlatform::Selinux => db.ocontexts.has_xen_entries(),
            TargetPlatform::Xen => db.ocontexts.has_selinux_entries(),
        };
        if wrong_platform {
            return Err(PolicyError::internal(format!(
                "ocontexts for another platform in a {} policy",
                db.target.platform_string()
            )));
        }
        for sym in db.sensitivities.iter() {
            if sym.scope == Scope::Declared && sym.datum.cats.is_none() {
                return Err(PolicyError::internal(format!("sensitivity {} has no level", sym.name)));
            }
        }
        Ok(())
    }

    fn symbols(&self) -> Result<(), PolicyError> {
        fn dense<D>(table: &SymbolTable<D>, kernel: bool) -> Result<(), PolicyError> {
            let mut expected: u32 = 1;
            for sym in table.iter() {
                if sym.value != expected {
                    return Err(PolicyError::internal(format!(
                        "{} {} has value {} at position {expected}",
                        table.kind(),
                        sym.name,
                        sym.value
                    )));
                }
                if table.value_of(&sym.name) != Some(sym.value) {
                    return Err(PolicyError::internal(format!(
                        "{} {} is not indexed",
                        table.kind(),
                        sym.name
                    )));
                }
                if kernel && sym.scope == Scope::Required {
                    return Err(PolicyError::internal(format!(
                        "required {} {} in a kernel policy",
                        table.kind(),
                        sym.name
                    )));
                }
                expected = expected.saturating_add(1);
            }
            for (alias, value) in table.aliases() {
                if !table.contains_value(value) {
                    return Err(PolicyError::internal(format!(
                        "{} alias {alias} dangles",
                        table.kind()
                    )));
                }
            }
            Ok(())
        }
        let db = self.db;
        let kernel = db.kind == PolicyKind::Kernel;
        dense(&db.commons, kernel)?;
        dense(&db.classes, kernel)?;
        dense(&db.roles, kernel)?;
        dense(&db.types, kernel)?;
        dense(&db.users, kernel)?;
        dense(&db.bools, kernel)?;
        dense(&db.sensitivities, kernel)?;
        dense(&db.categories, kernel)
    }

    fn storage(&self) -> Result<(), PolicyError> {
        let db = self.db;
        match db.kind {
            PolicyKind::Kernel => {
                if db.global != RuleBlock::default() || !db.optionals.is_empty() {
                    return Err(PolicyError::internal("kernel policy holds rule blocks"));
                }
            }
            PolicyKind::Base | PolicyKind::Module => {
                if !db.kernel.is_empty() {
                    return Err(PolicyError::internal(format!(
                        "{} policy holds expanded rules",
                        db.kind
                    )));
                }
            }
        }
        Ok(())
    }

    fn datums(&self) -> Result<(), PolicyError> {
        let db = self.db;
        let kernel = db.kind == PolicyKind::Kernel;
        let concrete = db.concrete_types();
        for sym in db.commons.iter() {
            if sym.datum.perms.len() > MAX_CLASS_PERMS {
                return Err(PolicyError::internal(format!(
                    "common {} has too many permissions",
                    sym.name
                )));
            }
        }
        for sym in db.classes.iter() {
            if let Some(common) = sym.datum.common {
                self.value(&db.commons, common, &format!("class {}", sym.name))?;
            }
            let count = db.class_permissions(sym.value).map_or(0, |p| p.len());
            if count > MAX_CLASS_PERMS {
                return Err(PolicyError::internal(format!(
                    "class {} has too many permissions",
                    sym.name
                )));
            }
            for constraint in &sym.datum.constraints {
                self.constraint(sym.value, constraint, false)?;
            }
            for constraint in &sym.datum.validatetrans {
                self.constraint(sym.value, constraint, true)?;
            }
        }
        for sym in db.types.iter() {
            let what = format!("type {}", sym.name);
            if let Some(bound) = sym.datum.bounds {
                self.value(&db.types, bound, &what)?;
            }
            self.bits(&db.types, &sym.datum.members, &what)?;
            if kernel && !sym.datum.members.is_subset(&concrete) {
                return Err(PolicyError::internal(format!(
                    "{what} has attribute members after expansion"
                )));
            }
        }
        for sym in db.roles.iter() {
            let what = format!("role {}", sym.name);
            if kernel && (sym.datum.is_attribute() || !sym.datum.roles.is_empty()) {
                return Err(PolicyError::internal(format!(
                    "{what} is an attribute in a kernel policy"
                )));
            }
            if let Some(bound) = sym.datum.bounds {
                self.value(&db.roles, bound, &what)?;
            }
            self.bits(&db.roles, &sym.datum.dominates, &what)?;
            self.bits(&db.roles, &sym.datum.roles, &what)?;
            self.type_set(&sym.datum.types, &what)?;
        }
        for sym in db.users.iter() {
            let what = format!("user {}", sym.name);
            if let Some(bound) = sym.datum.bounds {
                self.value(&db.users, bound, &what)?;
            }
            self.bits(&db.roles, &sym.datum.roles, &what)?;
            if let Some(range) = &sym.datum.range {
                self.range(range, &what)?;
            }
            if let Some(level) = &sym.datum.default_level {
                self.level(level, &what)?;
            }
        }
        for sym in db.bools.iter() {
            if kernel && sym.datum.tunable {
                return Err(PolicyError::internal(format!(
                    "tunable {} in a kernel policy",
                    sym.name
                )));
            }
        }
        for sym in db.sensitivities.iter() {
            if let Some(cats) = &sym.datum.cats {
                self.bits(&db.categories, cats, &format!("sensitivity {}", sym.name))?;
            }
        }
        Ok(())
    }

    fn constraint(
        &self,
        class: u32,
        constraint: &Constraint,
        validatetrans: bool,
    ) -> Result<(), PolicyError> {
        let what = format!("constraint on class {}", self.db.class_name(class));
        constraint
            .check_structure()
            .map_err(|detail| PolicyError::internal(format!("{what}: {detail}")))?;
        if !validatetrans {
            self.perm_mask(class, constraint.perms, &what)?;
        }
        for node in &constraint.expr {
            if let ConstraintNode::Names {
                attr,
                names,
                type_names,
                ..
            } = node
            {
                match attr.name_kind() {
                    Some(SymbolKind::Type) => self.bits(&self.db.types, names, &what)?,
                    Some(SymbolKind::Role) => self.bits(&self.db.roles, names, &what)?,
                    Some(SymbolKind::User) => self.bits(&self.db.users, names, &what)?,
                    _ => {
                        return Err(PolicyError::internal(format!(
                            "{what}: {attr:?} cannot take names"
                        )))
                    }
                }
                if let Some(set) = type_names {
                    self.type_set(set, &what)?;
                }
            }
        }
        Ok(())
    }

    // ── Rules ───────────────────────────────────────────────────

    fn block(&self, block: &RuleBlock) -> Result<(), PolicyError> {
        self.requires(&block.requires)?;
        self.rule_set(&block.rules)
    }

    fn requires(&self, req: &Requires) -> Result<(), PolicyError> {
        let db = self.db;
        let what = "requirements";
        self.bits(&db.classes, &req.classes, what)?;
        self.bits(&db.roles, &req.roles, what)?;
        self.bits(&db.types, &req.types, what)?;
        self.bits(&db.users, &req.users, what)?;
        self.bits(&db.bools, &req.bools, what)?;
        self.bits(&db.sensitivities, &req.sensitivities, what)?;
        self.bits(&db.categories, &req.categories, what)?;
        for (class, mask) in &req.class_perms {
            self.perm_mask(*class, *mask, what)?;
        }
        Ok(())
    }

    fn rule_set(&self, rules: &RuleSet) -> Result<(), PolicyError> {
        let db = self.db;
        for rule in &rules.avrules {
            self.av_rule(rule)?;
        }
        for rule in &rules.role_trans {
            let what = "role_transition";
            self.bits(&db.roles, &rule.roles.roles, what)?;
            self.type_set(&rule.types, what)?;
            self.bits(&db.classes, &rule.classes, what)?;
            self.value(&db.roles, rule.new_role, what)?;
        }
        for rule in &rules.role_allows {
            self.bits(&db.roles, &rule.roles.roles, "role allow")?;
            self.bits(&db.roles, &rule.new_roles.roles, "role allow")?;
        }
        for rule in &rules.range_trans {
            let what = "range_transition";
            self.type_set(&rule.source, what)?;
            self.type_set(&rule.target, what)?;
            self.bits(&db.classes, &rule.classes, what)?;
            self.range(&rule.range, what)?;
        }
        for cond in &rules.conditionals {
            self.cond_expr(&cond.expr, "conditional")?;
            for rule in cond.true_rules.iter().chain(&cond.false_rules) {
                self.av_rule(rule)?;
            }
        }
        Ok(())
    }

    fn av_rule(&self, rule: &AvRule) -> Result<(), PolicyError> {
        let what = rule.kind.keyword();
        self.type_set(&rule.source, what)?;
        self.type_set(&rule.target, what)?;
        if rule.perms.is_empty() {
            return Err(PolicyError::internal(format!("{what} rule without classes")));
        }
        for cp in &rule.perms {
            if rule.kind.is_type_rule() {
                self.value(&self.db.classes, cp.class, what)?;
                self.value(&self.db.types, cp.data, what)?;
            } else {
                self.perm_mask(cp.class, cp.data, what)?;
            }
        }
        Ok(())
    }

    fn entry(&self, entry: &AvtabEntry) -> Result<(), PolicyError> {
        let what = entry.key.kind.rule_kind().keyword();
        self.concrete_type(entry.key.source, what)?;
        self.concrete_type(entry.key.target, what)?;
        if entry.key.kind.is_type_rule() {
            self.value(&self.db.classes, entry.key.class, what)?;
            self.concrete_type(entry.data, what)
        } else {
            self.perm_mask(entry.key.class, entry.data, what)
        }
    }

    fn kernel_rules(&self) -> Result<(), PolicyError> {
        let db = self.db;
        let rules = &db.kernel;
        for entry in &rules.avtab {
            self.entry(entry)?;
        }
        for node in &rules.cond_list {
            self.cond_expr(&node.expr, "conditional")?;
            for entry in node.true_list.iter().chain(&node.false_list) {
                self.entry(entry)?;
            }
        }
        for rt in &rules.role_trans {
            self.value(&db.roles, rt.role, "role_transition")?;
            self.concrete_type(rt.type_, "role_transition")?;
            self.value(&db.classes, rt.class, "role_transition")?;
            self.value(&db.roles, rt.new_role, "role_transition")?;
        }
        for ra in &rules.role_allows {
            self.value(&db.roles, ra.role, "role allow")?;
            self.value(&db.roles, ra.new_role, "role allow")?;
        }
        for ft in &rules.filename_trans {
            self.concrete_type(ft.source, "filename transition")?;
            self.concrete_type(ft.target, "filename transition")?;
            self.value(&db.classes, ft.class, "filename transition")?;
            self.concrete_type(ft.result, "filename transition")?;
        }
        for rt in &rules.range_trans {
            self.concrete_type(rt.source, "range_transition")?;
            self.concrete_type(rt.target, "range_transition")?;
            self.value(&db.classes, rt.class, "range_transition")?;
            self.range(&rt.range, "range_transition")?;
        }
        Ok(())
    }

    // ── Contexts ────────────────────────────────────────────────

    fn context(&self, ctx: &Context) -> Result<(), PolicyError> {
        let db = self.db;
        let what = "context";
        self.value(&db.users, ctx.user, what)?;
        self.value(&db.roles, ctx.role, what)?;
        self.value(&db.types, ctx.type_, what)?;
        match (&ctx.range, db.mls) {
            (Some(range), true) => self.range(range, what)?,
            (None, false) => {}
            (Some(_), false) => {
                return Err(PolicyError::internal("context range in a non-MLS policy"));
            }
            (None, true) => {
                return Err(PolicyError::internal("context lacks a range in an MLS policy"));
            }
        }
        if db.kind != PolicyKind::Kernel || db.role_name(ctx.role) == OBJECT_ROLE {
            return Ok(());
        }
        let authorized_role = db
            .users
            .by_value(ctx.user)
            .is_some_and(|u| u.datum.roles.contains_value(ctx.role));
        let authorized_type = db
            .roles
            .by_value(ctx.role)
            .is_some_and(|r| r.datum.types.types.contains_value(ctx.type_));
        if !(authorized_role && authorized_type) {
            return Err(PolicyError::internal(format!(
                "context {}:{}:{} is not authorized",
                db.user_name(ctx.user),
                db.role_name(ctx.role),
                db.type_name(ctx.type_)
            )));
        }
        Ok(())
    }

    fn contexts(&self) -> Result<(), PolicyError> {
        for ctx in self.db.ocontexts.contexts() {
            self.context(ctx)?;
        }
        for genfs in &self.db.ocontexts.genfs {
            if let Some(class) = genfs.class {
                self.value(&self.db.classes, class, "genfscon")?;
            }
        }
        Ok(())
    }

    fn initial_sids(&self, options: &ValidateOptions) -> Result<(), PolicyError> {
        let isids = &self.db.ocontexts.isids;
        for (idx, isid) in isids.iter().enumerate() {
            let duplicate = isids
                .iter()
                .skip(idx.saturating_add(1))
                .any(|other| other.sid == isid.sid || other.name == isid.name);
            if duplicate {
                return Err(PolicyError::internal(format!(
                    "initial sid {} declared twice",
                    isid.name
                )));
            }
        }
        if self.db.kind != PolicyKind::Kernel {
            return Ok(());
        }
        if let Some(isid) = isids.iter().find(|isid| isid.context.is_none()) {
            return Err(PolicyError::internal(format!("initial sid {} has no context", isid.name)));
        }
        for name in &options.required_initial_sids {
            if !isids.iter().any(|isid| &isid.name == name) {
                return Err(PolicyError::internal(format!(
                    "required initial sid {name} is missing"
                )));
            }
        }
        Ok(())
    }
}

/// Role every user may use to label objects.
const OBJECT_ROLE: &str = "object_r";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policydb::{AvtabKey, AvtabKind, TargetPlatform};

    fn kernel() -> PolicyDb {
        let mut db = PolicyDb::new(PolicyKind::Base, TargetPlatform::Selinux);
        db.declare_class("file", None, &["read"]).expect("class");
        db.declare_type("t1").expect("t1");
        db.declare_role("r").expect("role");
        db.add_role_types("r", &["t1"]).expect("role types");
        db.declare_user("u", &["r"]).expect("user");
        db.kind = PolicyKind::Kernel;
        db
    }

    #[test]
    fn clean_kernel_passes() {
        let mut db = kernel();
        db.declare_initial_sid(1, "kernel").expect("sid");
        let ctx = db.context("u", "r", "t1", None).expect("ctx");
        db.set_initial_sid_context("kernel", ctx).expect("assign");
        let options = ValidateOptions {
            required_initial_sids: vec!["kernel".to_owned()],
        };
        assert!(validate_with(&db, &options).is_ok());
    }

    #[test]
    fn out_of_range_permission_bits() {
        let mut db = kernel();
        db.kernel.avtab.push(AvtabEntry {
            key: AvtabKey {
                source: 1,
                target: 1,
                class: 1,
                kind: AvtabKind::Allowed,
            },
            data: 0b10,
        });
        assert!(matches!(
            validate(&db),
            Err(PolicyError::InternalConsistency(_))
        ));
    }

    #[test]
    fn unauthorized_context() {
        let mut db = kernel();
        db.declare_type("t2").expect("t2");
        db.declare_initial_sid(1, "kernel").expect("sid");
        let ctx = db.context("u", "r", "t2", None).expect("ctx");
        db.set_initial_sid_context("kernel", ctx).expect("assign");
        let err = validate(&db).expect_err("unauthorized");
        assert!(err.to_string().contains("not authorized"));
    }

    #[test]
    fn missing_required_sid() {
        let db = kernel();
        let options = ValidateOptions {
            required_initial_sids: vec!["kernel".to_owned()],
        };
        assert!(validate_with(&db, &options).is_err());
    }

    #[test]
    fn kernel_must_not_hold_blocks() {
        let mut db = kernel();
        db.optionals.push(RuleBlock::default());
        assert!(validate(&db).is_err());
    }
}
