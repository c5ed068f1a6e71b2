//! Expansion of a linked base database into a kernel database.
//!
//! Attribute operands are replaced by their flattened concrete membership,
//! one rule becoming one table entry per (source, target, class). Tunables
//! are resolved, role attributes and tunables leave the symbol tables, and
//! never-allow rules come back as [`Assertion`]s instead of entries.

use std::collections::{BTreeMap, BTreeSet};

use crate::assertion::Assertion;
use crate::error::PolicyError;
use crate::link::{link, remap_contents, remap_datums, retain, SymbolMaps};
use crate::policydb::avtab::{FilenameTrans, RangeTrans, RoleAllow, RoleTrans};
use crate::policydb::constraint::ConstraintNode;
use crate::policydb::mls::MlsRange;
use crate::policydb::rules::{
    AvRule, AvRuleKind, CondExpr, RoleSet, RoleTransRule, RuleBlock, RuleSet, SetFlag, TypeSet,
};
use crate::policydb::{
    AvtabEntry, AvtabKey, AvtabKind, CondNode, Ebitmap, KernelRules, PolicyDb, PolicyKind,
    SymbolKind, KERNEL_VERSION_MAX,
};

/// Default ceiling on the number of expanded rules.
pub const DEFAULT_MAX_EXPANDED_RULES: usize = 10_000_000;

/// First kernel version that stores constraint type-name sets.
const CONSTRAINT_NAMES_VERSION: u32 = 29;

/// A class value with its rewritten constraint and validatetrans expressions.
type ClassExprs = (u32, Vec<Vec<ConstraintNode>>, Vec<Vec<ConstraintNode>>);

/// Expansion settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Fail with [`PolicyError::ExpansionLimit`] past this many rules.
    pub max_expanded_rules: usize,
    /// Kernel version the result targets.
    pub policy_version: u32,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            max_expanded_rules: DEFAULT_MAX_EXPANDED_RULES,
            policy_version: KERNEL_VERSION_MAX,
        }
    }
}

/// Result of expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedPolicy {
    /// Kernel database (or the untouched module).
    pub db: PolicyDb,
    /// Expanded never-allow rules, in declaration order.
    pub assertions: Vec<Assertion>,
    /// Number of table entries produced.
    pub expanded_rules: usize,
}

/// Expand a linked base database into a kernel database.
///
/// Module databases are returned unchanged. A base that still has optional
/// blocks or required-only symbols is linked on its own first.
///
/// # Errors
///
/// [`PolicyError::HierarchyViolation`] for attribute or dominance cycles,
/// [`PolicyError::ConflictingRule`] for disagreeing type rules,
/// [`PolicyError::InvalidConditional`], [`PolicyError::BoundsViolation`] and
/// [`PolicyError::ExpansionLimit`].
pub fn expand(db: PolicyDb, options: &ExpandOptions) -> Result<ExpandedPolicy, PolicyError> {
    match db.kind {
        PolicyKind::Module => {
            tracing::debug!(module = %db.display_name(), "modules are expanded only once linked");
            return Ok(ExpandedPolicy {
                db,
                assertions: Vec::new(),
                expanded_rules: 0,
            });
        }
        PolicyKind::Kernel => {
            return Err(PolicyError::InvalidDeclaration(
                "policy is already expanded".to_owned(),
            ))
        }
        PolicyKind::Base => {}
    }
    if !PolicyKind::Kernel.supports_version(options.policy_version) {
        let (min, max) = PolicyKind::Kernel.version_range();
        return Err(PolicyError::UnsupportedVersion {
            kind: PolicyKind::Kernel,
            version: options.policy_version,
            min,
            max,
        });
    }

    let mut db = if db.optionals.is_empty() && !db.has_required_symbols() {
        db
    } else {
        link(db, Vec::new())?
    };

    flatten_type_attributes(&mut db)?;
    flatten_roles(&mut db)?;
    flatten_users(&mut db)?;
    expand_constraint_names(&mut db, options.policy_version);

    let rules = std::mem::take(&mut db.global.rules);
    let mut expander = Expander::new(&db, options.max_expanded_rules);
    expander.rule_set(&rules)?;
    let (kernel, assertions, expanded_rules) = expander.finish();

    check_type_bounds(&db, &kernel)?;
    check_role_bounds(&db)?;
    check_user_bounds(&db)?;

    db.kernel = kernel;
    db.global = RuleBlock::default();
    db.optionals.clear();
    drop_tunables(&mut db)?;
    drop_role_attributes(&mut db)?;

    db.kind = PolicyKind::Kernel;
    db.name = None;
    db.module_version = None;
    db.version = options.policy_version;

    tracing::info!(
        avtab = db.kernel.avtab.len(),
        conditionals = db.kernel.cond_list.len(),
        assertions = assertions.len(),
        expanded_rules,
        "expansion complete"
    );
    Ok(ExpandedPolicy {
        db,
        assertions,
        expanded_rules,
    })
}

// ── Flattening ──────────────────────────────────────────────────

/// Transitive closure over `edges` from every root. Each node maps to the
/// reachable values accepted by `keep`; reaching a node already on the
/// current path is a cycle.
fn reachable(
    roots: impl IntoIterator<Item = u32>,
    edges: &dyn Fn(u32) -> Vec<u32>,
    keep: &dyn Fn(u32) -> bool,
    describe: &dyn Fn(u32) -> String,
) -> Result<BTreeMap<u32, Ebitmap>, PolicyError> {
    fn visit(
        node: u32,
        edges: &dyn Fn(u32) -> Vec<u32>,
        keep: &dyn Fn(u32) -> bool,
        describe: &dyn Fn(u32) -> String,
        done: &mut BTreeMap<u32, Ebitmap>,
        path: &mut Vec<u32>,
    ) -> Result<Ebitmap, PolicyError> {
        if let Some(set) = done.get(&node) {
            return Ok(set.clone());
        }
        if path.contains(&node) {
            return Err(PolicyError::HierarchyViolation(format!(
                "cycle through {}",
                describe(node)
            )));
        }
        path.push(node);
        let mut set = Ebitmap::new();
        for child in edges(node) {
            if keep(child) {
                set.insert_value(child);
            }
            let below = visit(child, edges, keep, describe, done, path)?;
            set.union_with(&below);
        }
        path.pop();
        done.insert(node, set.clone());
        Ok(set)
    }

    let mut done = BTreeMap::new();
    for root in roots {
        let mut path = Vec::new();
        visit(root, edges, keep, describe, &mut done, &mut path)?;
    }
    Ok(done)
}

/// Replace every attribute's membership by the concrete types it reaches.
fn flatten_type_attributes(db: &mut PolicyDb) -> Result<(), PolicyError> {
    let attributes: Vec<u32> = db
        .types
        .iter()
        .filter(|sym| sym.datum.is_attribute())
        .map(|sym| sym.value)
        .collect();
    let flattened = {
        let types = &db.types;
        let is_attr = |v: u32| types.by_value(v).is_some_and(|s| s.datum.is_attribute());
        reachable(
            attributes,
            &|v| {
                if is_attr(v) {
                    types
                        .by_value(v)
                        .map(|s| s.datum.members.values().collect())
                        .unwrap_or_default()
                } else {
                    Vec::new()
                }
            },
            &|v| !is_attr(v),
            &|v| format!("attribute {}", db.type_name(v)),
        )?
    };
    for (value, members) in flattened {
        if let Some(sym) = db.types.by_value_mut(value) {
            sym.datum.members = members;
        }
    }
    Ok(())
}

/// Concrete type bits of a type set. Attributes must already be flattened.
fn expand_type_set(db: &PolicyDb, all_types: &Ebitmap, set: &TypeSet) -> Ebitmap {
    let flatten = |bits: &Ebitmap| {
        let mut out = Ebitmap::new();
        for value in bits.values() {
            match db.types.by_value(value) {
                Some(sym) if sym.datum.is_attribute() => out.union_with(&sym.datum.members),
                Some(_) => out.insert_value(value),
                None => {}
            }
        }
        out
    };
    let included = flatten(&set.types);
    let excluded = flatten(&set.negset);
    match set.flag {
        SetFlag::None => included.difference(&excluded),
        SetFlag::Star => all_types.difference(&excluded),
        SetFlag::Complement => all_types.difference(&included.difference(&excluded)),
    }
}

/// Concrete role bits of a role set. Role attributes must already be
/// flattened.
fn expand_role_set(db: &PolicyDb, all_roles: &Ebitmap, set: &RoleSet) -> Ebitmap {
    let mut included = Ebitmap::new();
    for value in set.roles.values() {
        match db.roles.by_value(value) {
            Some(sym) if sym.datum.is_attribute() => included.union_with(&sym.datum.roles),
            Some(_) => included.insert_value(value),
            None => {}
        }
    }
    match set.flag {
        SetFlag::None => included,
        SetFlag::Star => all_roles.clone(),
        SetFlag::Complement => all_roles.difference(&included),
    }
}

/// Flatten role attributes and dominance, then resolve every role's types
/// to concrete types: attribute types flow to member roles, dominated roles'
/// types flow to the dominating role.
fn flatten_roles(db: &mut PolicyDb) -> Result<(), PolicyError> {
    let values: Vec<u32> = db.roles.iter().map(|sym| sym.value).collect();
    let (members, dominated) = {
        let roles = &db.roles;
        let is_attr = |v: u32| roles.by_value(v).is_some_and(|s| s.datum.is_attribute());
        let describe = |v: u32| format!("role {}", db.role_name(v));
        let members = reachable(
            values.iter().copied().filter(|v| is_attr(*v)),
            &|v| {
                if is_attr(v) {
                    roles
                        .by_value(v)
                        .map(|s| s.datum.roles.values().collect())
                        .unwrap_or_default()
                } else {
                    Vec::new()
                }
            },
            &|v| !is_attr(v),
            &describe,
        )?;
        let dominated = reachable(
            values.iter().copied(),
            &|v| {
                roles
                    .by_value(v)
                    .map(|s| s.datum.dominates.values().collect())
                    .unwrap_or_default()
            },
            &|_| true,
            &describe,
        )?;
        (members, dominated)
    };

    let all_types = db.concrete_types();
    let mut types: BTreeMap<u32, Ebitmap> = db
        .roles
        .iter()
        .map(|sym| (sym.value, expand_type_set(db, &all_types, &sym.datum.types)))
        .collect();
    for (attr, member_roles) in &members {
        let attr_types = types.get(attr).cloned().unwrap_or_default();
        for role in member_roles.values() {
            types.entry(role).or_default().union_with(&attr_types);
        }
    }
    let snapshot = types.clone();
    for (role, below) in &dominated {
        let entry = types.entry(*role).or_default();
        for other in below.values() {
            if let Some(extra) = snapshot.get(&other) {
                entry.union_with(extra);
            }
        }
    }

    for sym in db.roles.iter_mut() {
        if let Some(roles) = members.get(&sym.value) {
            sym.datum.roles = roles.clone();
        }
        if let Some(below) = dominated.get(&sym.value) {
            sym.datum.dominates = below.clone();
        }
        sym.datum.types = TypeSet {
            types: types.remove(&sym.value).unwrap_or_default(),
            ..TypeSet::default()
        };
    }
    Ok(())
}

/// Replace role attributes in user authorizations by their concrete roles.
fn flatten_users(db: &mut PolicyDb) -> Result<(), PolicyError> {
    let all_roles = db.concrete_roles();
    let expanded: Vec<(u32, Ebitmap)> = db
        .users
        .iter()
        .map(|sym| {
            let set = RoleSet {
                roles: sym.datum.roles.clone(),
                flag: SetFlag::None,
            };
            (sym.value, expand_role_set(db, &all_roles, &set))
        })
        .collect();
    for (value, roles) in expanded {
        let sym = db
            .users
            .by_value_mut(value)
            .ok_or_else(|| PolicyError::internal(format!("user value {value} vanished")))?;
        sym.datum.roles = roles;
    }
    Ok(())
}

/// Resolve constraint name sets to concrete types and roles.
fn expand_constraint_names(db: &mut PolicyDb, version: u32) {
    let all_types = db.concrete_types();
    let all_roles = db.concrete_roles();
    let mut rewritten: Vec<ClassExprs> = Vec::new();
    for sym in db.classes.iter() {
        let expand_expr = |expr: &[ConstraintNode]| -> Vec<ConstraintNode> {
            expr.iter()
                .map(|node| match node {
                    ConstraintNode::Names {
                        attr,
                        op,
                        names,
                        type_names,
                    } => {
                        let names = match attr.name_kind() {
                            Some(SymbolKind::Type) => {
                                let set = type_names.clone().unwrap_or_else(|| TypeSet {
                                    types: names.clone(),
                                    ..TypeSet::default()
                                });
                                expand_type_set(db, &all_types, &set)
                            }
                            Some(SymbolKind::Role) => {
                                let set = RoleSet {
                                    roles: names.clone(),
                                    flag: SetFlag::None,
                                };
                                expand_role_set(db, &all_roles, &set)
                            }
                            _ => names.clone(),
                        };
                        let type_names = if version >= CONSTRAINT_NAMES_VERSION {
                            type_names.clone()
                        } else {
                            None
                        };
                        ConstraintNode::Names {
                            attr: *attr,
                            op: *op,
                            names,
                            type_names,
                        }
                    }
                    other => other.clone(),
                })
                .collect()
        };
        let constraints = sym
            .datum
            .constraints
            .iter()
            .map(|c| expand_expr(&c.expr))
            .collect();
        let validatetrans = sym
            .datum
            .validatetrans
            .iter()
            .map(|c| expand_expr(&c.expr))
            .collect();
        rewritten.push((sym.value, constraints, validatetrans));
    }
    for (value, constraints, validatetrans) in rewritten {
        if let Some(sym) = db.classes.by_value_mut(value) {
            for (constraint, expr) in sym.datum.constraints.iter_mut().zip(constraints) {
                constraint.expr = expr;
            }
            for (constraint, expr) in sym.datum.validatetrans.iter_mut().zip(validatetrans) {
                constraint.expr = expr;
            }
        }
    }
}

// ── Rule expansion ──────────────────────────────────────────────

/// Entries of one table (unconditional, or one branch of a conditional).
#[derive(Default)]
struct EntrySink {
    entries: Vec<AvtabEntry>,
    type_results: BTreeMap<AvtabKey, u32>,
}

struct Expander<'a> {
    db: &'a PolicyDb,
    all_types: Ebitmap,
    all_roles: Ebitmap,
    limit: usize,
    count: usize,
    avtab: EntrySink,
    cond_index: BTreeMap<CondExpr, usize>,
    conds: Vec<(CondExpr, EntrySink, EntrySink)>,
    filename_trans: BTreeMap<(u32, u32, u32, String), u32>,
    role_trans: BTreeMap<(u32, u32, u32), u32>,
    role_allows: BTreeSet<(u32, u32)>,
    range_trans: BTreeMap<(u32, u32, u32), MlsRange>,
    assertions: Vec<Assertion>,
}

impl<'a> Expander<'a> {
    fn new(db: &'a PolicyDb, limit: usize) -> Self {
        Self {
            db,
            all_types: db.concrete_types(),
            all_roles: db.concrete_roles(),
            limit,
            count: 0,
            avtab: EntrySink::default(),
            cond_index: BTreeMap::new(),
            conds: Vec::new(),
            filename_trans: BTreeMap::new(),
            role_trans: BTreeMap::new(),
            role_allows: BTreeSet::new(),
            range_trans: BTreeMap::new(),
            assertions: Vec::new(),
        }
    }

    fn bump(&mut self) -> Result<(), PolicyError> {
        self.count = self.count.saturating_add(1);
        if self.count > self.limit {
            return Err(PolicyError::ExpansionLimit { limit: self.limit });
        }
        Ok(())
    }

    fn types(&self, set: &TypeSet) -> Ebitmap {
        expand_type_set(self.db, &self.all_types, set)
    }

    fn roles(&self, set: &RoleSet) -> Ebitmap {
        expand_role_set(self.db, &self.all_roles, set)
    }

    fn rule_set(&mut self, rules: &RuleSet) -> Result<(), PolicyError> {
        for rule in &rules.avrules {
            let mut sink = std::mem::take(&mut self.avtab);
            let result = self.av_rule(rule, &mut sink, false);
            self.avtab = sink;
            result?;
        }
        for cond in &rules.conditionals {
            self.conditional(&cond.expr, &cond.true_rules, &cond.false_rules)?;
        }
        for rule in &rules.role_trans {
            self.role_transition(rule)?;
        }
        for rule in &rules.role_allows {
            let roles = self.roles(&rule.roles);
            let new_roles = self.roles(&rule.new_roles);
            for role in roles.values() {
                for new_role in new_roles.values() {
                    if self.role_allows.insert((role, new_role)) {
                        self.bump()?;
                    }
                }
            }
        }
        for rule in &rules.range_trans {
            let sources = self.types(&rule.source);
            let targets = self.types(&rule.target);
            for source in sources.values() {
                for target in targets.values() {
                    for class in rule.classes.values() {
                        self.range_transition((source, target, class), &rule.range)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Operand pairs of a rule: sources × targets, plus (s, s) for `self`.
    fn pairs(&self, rule: &AvRule) -> Vec<(u32, u32)> {
        let sources = self.types(&rule.source);
        let targets = self.types(&rule.target);
        let mut pairs = Vec::new();
        for source in sources.values() {
            for target in targets.values() {
                pairs.push((source, target));
            }
            if rule.self_target {
                pairs.push((source, source));
            }
        }
        pairs
    }

    fn av_rule(
        &mut self,
        rule: &AvRule,
        sink: &mut EntrySink,
        conditional: bool,
    ) -> Result<(), PolicyError> {
        if rule.kind == AvRuleKind::NeverAllow {
            if conditional {
                return Err(PolicyError::InvalidConditional(
                    "neverallow inside a conditional".to_owned(),
                ));
            }
            self.assertions.push(Assertion {
                source: self.types(&rule.source),
                target: self.types(&rule.target),
                self_target: rule.self_target,
                perms: rule.perms.clone(),
                line: rule.line,
            });
            return Ok(());
        }
        let kind = AvtabKind::from_rule_kind(rule.kind)
            .ok_or_else(|| PolicyError::internal("never-allow reached the rule table"))?;
        if rule.object_name.is_some() && conditional {
            return Err(PolicyError::InvalidConditional(
                "filename type_transition inside a conditional".to_owned(),
            ));
        }
        for (source, target) in self.pairs(rule) {
            for cp in &rule.perms {
                if kind.is_type_rule() {
                    self.check_result_type(cp.data)?;
                }
                if let Some(name) = &rule.object_name {
                    self.filename_transition((source, target, cp.class, name.clone()), cp.data)?;
                    continue;
                }
                let key = AvtabKey {
                    source,
                    target,
                    class: cp.class,
                    kind,
                };
                if kind.is_type_rule() {
                    match sink.type_results.get(&key) {
                        Some(existing) if *existing == cp.data => continue,
                        Some(existing) => {
                            return Err(PolicyError::ConflictingRule {
                                key: format!(
                                    "{} {}",
                                    kind.rule_kind().keyword(),
                                    self.db.describe_key(&key)
                                ),
                                first: self.db.type_name(*existing),
                                second: self.db.type_name(cp.data),
                            })
                        }
                        None => {
                            sink.type_results.insert(key, cp.data);
                        }
                    }
                } else if cp.data == 0 {
                    continue;
                }
                self.bump()?;
                sink.entries.push(AvtabEntry { key, data: cp.data });
            }
        }
        Ok(())
    }

    fn check_result_type(&self, value: u32) -> Result<(), PolicyError> {
        match self.db.types.by_value(value) {
            Some(sym) if !sym.datum.is_attribute() => Ok(()),
            _ => Err(PolicyError::InvalidDeclaration(format!(
                "type rule result {} is not a concrete type",
                self.db.type_name(value)
            ))),
        }
    }

    fn filename_transition(
        &mut self,
        key: (u32, u32, u32, String),
        result: u32,
    ) -> Result<(), PolicyError> {
        match self.filename_trans.get(&key) {
            Some(existing) if *existing == result => Ok(()),
            Some(existing) => Err(PolicyError::ConflictingRule {
                key: format!(
                    "type_transition {} {}:{} \"{}\"",
                    self.db.type_name(key.0),
                    self.db.type_name(key.1),
                    self.db.class_name(key.2),
                    key.3
                ),
                first: self.db.type_name(*existing),
                second: self.db.type_name(result),
            }),
            None => {
                self.bump()?;
                self.filename_trans.insert(key, result);
                Ok(())
            }
        }
    }

    fn role_transition(&mut self, rule: &RoleTransRule) -> Result<(), PolicyError> {
        if !self.all_roles.contains_value(rule.new_role) {
            return Err(PolicyError::InvalidDeclaration(format!(
                "role_transition result {} is not a concrete role",
                self.db.role_name(rule.new_role)
            )));
        }
        let roles = self.roles(&rule.roles);
        let types = self.types(&rule.types);
        for role in roles.values() {
            for type_ in types.values() {
                for class in rule.classes.values() {
                    match self.role_trans.get(&(role, type_, class)) {
                        Some(existing) if *existing == rule.new_role => {}
                        Some(existing) => {
                            return Err(PolicyError::ConflictingRule {
                                key: format!(
                                    "role_transition {} {}:{}",
                                    self.db.role_name(role),
                                    self.db.type_name(type_),
                                    self.db.class_name(class)
                                ),
                                first: self.db.role_name(*existing),
                                second: self.db.role_name(rule.new_role),
                            })
                        }
                        None => {
                            self.bump()?;
                            self.role_trans.insert((role, type_, class), rule.new_role);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn range_transition(
        &mut self,
        key: (u32, u32, u32),
        range: &MlsRange,
    ) -> Result<(), PolicyError> {
        match self.range_trans.get(&key) {
            Some(existing) if existing == range => Ok(()),
            Some(_) => Err(PolicyError::ConflictingRule {
                key: format!(
                    "range_transition {} {}:{}",
                    self.db.type_name(key.0),
                    self.db.type_name(key.1),
                    self.db.class_name(key.2)
                ),
                first: "one range".to_owned(),
                second: "a different range".to_owned(),
            }),
            None => {
                self.bump()?;
                self.range_trans.insert(key, range.clone());
                Ok(())
            }
        }
    }

    fn conditional(
        &mut self,
        expr: &CondExpr,
        true_rules: &[AvRule],
        false_rules: &[AvRule],
    ) -> Result<(), PolicyError> {
        if !expr.is_well_formed() {
            return Err(PolicyError::InvalidConditional(
                "malformed expression".to_owned(),
            ));
        }
        let mut tunables = 0usize;
        let mut booleans = 0usize;
        for value in expr.bools() {
            match self.db.bools.by_value(value) {
                Some(sym) if sym.datum.tunable => tunables = tunables.saturating_add(1),
                Some(_) => booleans = booleans.saturating_add(1),
                None => {
                    return Err(PolicyError::InvalidConditional(format!(
                        "unknown boolean value {value}"
                    )))
                }
            }
        }
        if tunables > 0 && booleans > 0 {
            return Err(PolicyError::InvalidConditional(
                "expression mixes tunables and booleans".to_owned(),
            ));
        }

        if tunables > 0 {
            let state = expr
                .evaluate(|b| self.db.bools.by_value(b).map(|s| s.datum.state))
                .ok_or_else(|| {
                    PolicyError::InvalidConditional("cannot evaluate tunables".to_owned())
                })?;
            let chosen = if state { true_rules } else { false_rules };
            for rule in chosen {
                let mut sink = std::mem::take(&mut self.avtab);
                let result = self.av_rule(rule, &mut sink, false);
                self.avtab = sink;
                result?;
            }
            return Ok(());
        }

        let idx = match self.cond_index.get(expr) {
            Some(idx) => *idx,
            None => {
                self.conds
                    .push((expr.clone(), EntrySink::default(), EntrySink::default()));
                let idx = self.conds.len().saturating_sub(1);
                self.cond_index.insert(expr.clone(), idx);
                idx
            }
        };
        let (mut on_true, mut on_false) = match self.conds.get_mut(idx) {
            Some((_, t, f)) => (std::mem::take(t), std::mem::take(f)),
            None => return Err(PolicyError::internal("conditional node vanished")),
        };
        let mut result = Ok(());
        for rule in true_rules {
            result = self.av_rule(rule, &mut on_true, true);
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            for rule in false_rules {
                result = self.av_rule(rule, &mut on_false, true);
                if result.is_err() {
                    break;
                }
            }
        }
        if let Some((_, t, f)) = self.conds.get_mut(idx) {
            *t = on_true;
            *f = on_false;
        }
        result
    }

    fn finish(self) -> (KernelRules, Vec<Assertion>, usize) {
        let cond_list = self
            .conds
            .into_iter()
            .map(|(expr, t, f)| CondNode {
                expr,
                true_list: t.entries,
                false_list: f.entries,
            })
            .collect();
        let kernel = KernelRules {
            avtab: self.avtab.entries,
            cond_list,
            role_trans: self
                .role_trans
                .into_iter()
                .map(|((role, type_, class), new_role)| RoleTrans {
                    role,
                    type_,
                    class,
                    new_role,
                })
                .collect(),
            role_allows: self
                .role_allows
                .into_iter()
                .map(|(role, new_role)| RoleAllow { role, new_role })
                .collect(),
            filename_trans: self
                .filename_trans
                .into_iter()
                .map(|((source, target, class, name), result)| FilenameTrans {
                    source,
                    target,
                    class,
                    name,
                    result,
                })
                .collect(),
            range_trans: self
                .range_trans
                .into_iter()
                .map(|((source, target, class), range)| RangeTrans {
                    source,
                    target,
                    class,
                    range,
                })
                .collect(),
        };
        (kernel, self.assertions, self.count)
    }
}

// ── Bounds ──────────────────────────────────────────────────────

/// A bounded type may only be allowed what its bound is allowed, with
/// bounded targets replaced by their bounds.
fn check_type_bounds(db: &PolicyDb, kernel: &KernelRules) -> Result<(), PolicyError> {
    let bound_of = |value: u32| db.types.by_value(value).and_then(|s| s.datum.bounds);
    let mut allowed: BTreeMap<(u32, u32, u32), u32> = BTreeMap::new();
    for entry in kernel.all_entries() {
        if entry.key.kind == AvtabKind::Allowed {
            let mask = allowed
                .entry((entry.key.source, entry.key.target, entry.key.class))
                .or_insert(0);
            *mask |= entry.data;
        }
    }
    for ((source, target, class), mask) in &allowed {
        let Some(parent) = bound_of(*source) else {
            continue;
        };
        let parent_target = bound_of(*target).unwrap_or(*target);
        let parent_mask = allowed
            .get(&(parent, parent_target, *class))
            .copied()
            .unwrap_or(0);
        let excess = mask & !parent_mask;
        if excess != 0 {
            return Err(PolicyError::BoundsViolation {
                kind: SymbolKind::Type,
                child: db.type_name(*source),
                parent: db.type_name(parent),
                detail: format!(
                    "allow {} {}:{} {{ {} }}",
                    db.type_name(*source),
                    db.type_name(*target),
                    db.class_name(*class),
                    db.perm_names(*class, excess).join(" ")
                ),
            });
        }
    }
    Ok(())
}

fn check_role_bounds(db: &PolicyDb) -> Result<(), PolicyError> {
    for sym in db.roles.iter() {
        let Some(parent) = sym.datum.bounds else {
            continue;
        };
        let parent_types = db
            .roles
            .by_value(parent)
            .map(|p| p.datum.types.types.clone())
            .unwrap_or_default();
        let excess = sym.datum.types.types.difference(&parent_types);
        if !excess.is_empty() {
            return Err(PolicyError::BoundsViolation {
                kind: SymbolKind::Role,
                child: sym.name.clone(),
                parent: db.role_name(parent),
                detail: format!("types {}", db.describe_types(&excess)),
            });
        }
    }
    Ok(())
}

fn check_user_bounds(db: &PolicyDb) -> Result<(), PolicyError> {
    for sym in db.users.iter() {
        let Some(parent) = sym.datum.bounds else {
            continue;
        };
        let parent_roles = db
            .users
            .by_value(parent)
            .map(|p| p.datum.roles.clone())
            .unwrap_or_default();
        let excess = sym.datum.roles.difference(&parent_roles);
        if !excess.is_empty() {
            let names: Vec<String> = excess.values().map(|r| db.role_name(r)).collect();
            return Err(PolicyError::BoundsViolation {
                kind: SymbolKind::User,
                child: sym.name.clone(),
                parent: db.user_name(parent),
                detail: format!("roles {{ {} }}", names.join(" ")),
            });
        }
    }
    Ok(())
}

// ── Renumbering ─────────────────────────────────────────────────

fn drop_tunables(db: &mut PolicyDb) -> Result<(), PolicyError> {
    if !db.bools.iter().any(|sym| sym.datum.tunable) {
        return Ok(());
    }
    let mut maps = SymbolMaps::identity(db);
    maps.bools = retain(&mut db.bools, |sym| !sym.datum.tunable);
    remap_datums(db, &maps);
    remap_contents(db, &maps)
}

fn drop_role_attributes(db: &mut PolicyDb) -> Result<(), PolicyError> {
    if !db.roles.iter().any(|sym| sym.datum.is_attribute()) {
        return Ok(());
    }
    let mut maps = SymbolMaps::identity(db);
    maps.roles = retain(&mut db.roles, |sym| !sym.datum.is_attribute());
    remap_datums(db, &maps);
    remap_contents(db, &maps)
}
