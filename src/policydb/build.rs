//! Construction API driven by the policy language front end.
//!
//! Every operation works on an explicit [`PolicyDb`]; lookups of undeclared
//! names fail with [`PolicyError::UnknownSymbol`] and misplaced declarations
//! with [`PolicyError::InvalidDeclaration`].

use std::collections::BTreeSet;

use crate::error::PolicyError;

use super::constraint::{Constraint, ConstraintNode};
use super::context::{Context, InitialSid};
use super::datum::{
    BoolDatum, CatDatum, ClassDatum, CommonDatum, LevelDatum, ObjectDefaults, RoleDatum,
    RoleFlavor, TypeDatum, UserDatum, MAX_CLASS_PERMS,
};
use super::ebitmap::Ebitmap;
use super::mls::{MlsLevel, MlsRange};
use super::rules::{
    AvRule, AvRuleKind, BlockRef, ClassPerms, CondRule, RangeTransRule, RoleAllowRule, RoleSet,
    RoleTransRule, RuleBlock, TypeSet,
};
use super::symtab::{Scope, SymbolKind};
use super::{PolicyDb, PolicyKind, POLICY_CAPABILITIES};

/// Target name that stands for the rule's source type.
pub const SELF_TARGET: &str = "self";

impl PolicyDb {
    // ── Blocks ──────────────────────────────────────────────────

    /// Open a new optional block.
    pub fn add_optional(&mut self) -> BlockRef {
        self.optionals.push(RuleBlock::default());
        BlockRef::Optional(self.optionals.len().saturating_sub(1))
    }

    /// Mutable access to a block.
    pub fn block_mut(&mut self, block: BlockRef) -> Result<&mut RuleBlock, PolicyError> {
        if self.kind == PolicyKind::Kernel {
            return Err(PolicyError::InvalidDeclaration(
                "kernel databases have no rule blocks".to_owned(),
            ));
        }
        match block {
            BlockRef::Global => Ok(&mut self.global),
            BlockRef::Optional(idx) => self.optionals.get_mut(idx).ok_or_else(|| {
                PolicyError::InvalidDeclaration(format!("no optional block {idx}"))
            }),
        }
    }

    // ── Lookups ─────────────────────────────────────────────────

    /// Value of a class.
    pub fn class_value(&self, name: &str) -> Result<u32, PolicyError> {
        self.classes
            .value_of(name)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Class, name))
    }

    /// Value of a type or attribute.
    pub fn type_value(&self, name: &str) -> Result<u32, PolicyError> {
        self.types
            .value_of(name)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Type, name))
    }

    /// Value of a role or role attribute.
    pub fn role_value(&self, name: &str) -> Result<u32, PolicyError> {
        self.roles
            .value_of(name)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Role, name))
    }

    /// Value of a user.
    pub fn user_value(&self, name: &str) -> Result<u32, PolicyError> {
        self.users
            .value_of(name)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::User, name))
    }

    /// Value of a boolean or tunable.
    pub fn bool_value(&self, name: &str) -> Result<u32, PolicyError> {
        self.bools
            .value_of(name)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Bool, name))
    }

    /// Value of a sensitivity.
    pub fn sensitivity_value(&self, name: &str) -> Result<u32, PolicyError> {
        self.sensitivities
            .value_of(name)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Sensitivity, name))
    }

    /// Value of a category.
    pub fn category_value(&self, name: &str) -> Result<u32, PolicyError> {
        self.categories
            .value_of(name)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Category, name))
    }

    // ── Commons and classes ─────────────────────────────────────

    /// Declare a common permission set.
    pub fn declare_common(&mut self, name: &str, perms: &[&str]) -> Result<u32, PolicyError> {
        check_perm_list(name, &[], perms)?;
        self.commons.declare(
            name,
            CommonDatum {
                perms: perms.iter().map(|p| (*p).to_owned()).collect(),
            },
        )
    }

    /// Declare a class, optionally inheriting a common.
    pub fn declare_class(
        &mut self,
        name: &str,
        common: Option<&str>,
        perms: &[&str],
    ) -> Result<u32, PolicyError> {
        let (common_value, inherited) = match common {
            Some(common) => {
                let sym = self
                    .commons
                    .get(common)
                    .ok_or_else(|| PolicyError::unknown(SymbolKind::Common, common))?;
                (Some(sym.value), sym.datum.perms.clone())
            }
            None => (None, Vec::new()),
        };
        check_perm_list(name, &inherited, perms)?;
        self.classes.declare(
            name,
            ClassDatum {
                common: common_value,
                perms: perms.iter().map(|p| (*p).to_owned()).collect(),
                ..ClassDatum::default()
            },
        )
    }

    /// Require a class and some of its permissions in `block`.
    pub fn require_class(
        &mut self,
        block: BlockRef,
        name: &str,
        perms: &[&str],
    ) -> Result<u32, PolicyError> {
        let value = self.classes.require(name, ClassDatum::default())?;
        let mut mask = 0u32;
        for perm in perms {
            let bit = match self.permission_bit(value, perm) {
                Some(bit) => bit,
                None => {
                    let sym = self.classes.by_value_mut(value).ok_or_else(|| {
                        PolicyError::internal(format!("class {name} vanished"))
                    })?;
                    if sym.scope == Scope::Declared {
                        return Err(PolicyError::unknown(
                            SymbolKind::Permission,
                            format!("{name}:{perm}"),
                        ));
                    }
                    sym.datum.perms.push((*perm).to_owned());
                    if sym.datum.perms.len() > MAX_CLASS_PERMS {
                        return Err(PolicyError::InvalidDeclaration(format!(
                            "class {name} requires more than {MAX_CLASS_PERMS} permissions"
                        )));
                    }
                    self.permission_bit(value, perm).ok_or_else(|| {
                        PolicyError::internal(format!("permission {name}:{perm} vanished"))
                    })?
                }
            };
            mask |= 1u32.checked_shl(bit).unwrap_or(0);
        }
        let requires = &mut self.block_mut(block)?.requires;
        requires.classes.insert_value(value);
        let entry = requires.class_perms.entry(value).or_insert(0);
        *entry |= mask;
        Ok(value)
    }

    /// Attach an access constraint to `class` guarding `perms`.
    pub fn add_constraint(
        &mut self,
        class: &str,
        perms: &[&str],
        expr: Vec<ConstraintNode>,
    ) -> Result<(), PolicyError> {
        let value = self.class_value(class)?;
        let mask = self.class_perms(class, perms)?.data;
        let sym = self
            .classes
            .by_value_mut(value)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Class, class))?;
        sym.datum.constraints.push(Constraint { perms: mask, expr });
        Ok(())
    }

    /// Attach a transition validation constraint to `class`.
    pub fn add_validatetrans(
        &mut self,
        class: &str,
        expr: Vec<ConstraintNode>,
    ) -> Result<(), PolicyError> {
        let sym = self
            .classes
            .get_mut(class)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Class, class))?;
        sym.datum.validatetrans.push(Constraint { perms: 0, expr });
        Ok(())
    }

    /// Set the object defaults of `class`.
    pub fn set_object_defaults(
        &mut self,
        class: &str,
        defaults: ObjectDefaults,
    ) -> Result<(), PolicyError> {
        let sym = self
            .classes
            .get_mut(class)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Class, class))?;
        sym.datum.defaults = defaults;
        Ok(())
    }

    // ── Types ───────────────────────────────────────────────────

    /// Declare a concrete type.
    pub fn declare_type(&mut self, name: &str) -> Result<u32, PolicyError> {
        self.types.declare(name, TypeDatum::concrete())
    }

    /// Declare a type attribute.
    pub fn declare_attribute(&mut self, name: &str) -> Result<u32, PolicyError> {
        self.types.declare(name, TypeDatum::attribute())
    }

    /// Require a concrete type in `block`.
    pub fn require_type(&mut self, block: BlockRef, name: &str) -> Result<u32, PolicyError> {
        self.require_type_flavor(block, name, TypeDatum::concrete())
    }

    /// Require a type attribute in `block`.
    pub fn require_attribute(&mut self, block: BlockRef, name: &str) -> Result<u32, PolicyError> {
        self.require_type_flavor(block, name, TypeDatum::attribute())
    }

    fn require_type_flavor(
        &mut self,
        block: BlockRef,
        name: &str,
        datum: TypeDatum,
    ) -> Result<u32, PolicyError> {
        if let Some(existing) = self.types.get(name) {
            if existing.datum.flavor != datum.flavor {
                return Err(PolicyError::ConflictingDeclaration {
                    kind: SymbolKind::Type,
                    name: name.to_owned(),
                    detail: "type and attribute flavors disagree".to_owned(),
                });
            }
        }
        let value = self.types.require(name, datum)?;
        self.block_mut(block)?.requires.types.insert_value(value);
        Ok(value)
    }

    /// Add `alias` for `type_name`.
    pub fn add_type_alias(&mut self, type_name: &str, alias: &str) -> Result<(), PolicyError> {
        let value = self.type_value(type_name)?;
        self.types.add_alias(alias, value)
    }

    /// Add `member` (a type or attribute) to `attribute`.
    pub fn add_to_attribute(&mut self, attribute: &str, member: &str) -> Result<(), PolicyError> {
        let member_value = self.type_value(member)?;
        let sym = self
            .types
            .get_mut(attribute)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Attribute, attribute))?;
        if !sym.datum.is_attribute() {
            return Err(PolicyError::InvalidDeclaration(format!(
                "{attribute} is a type, not an attribute"
            )));
        }
        sym.datum.members.insert_value(member_value);
        Ok(())
    }

    /// Bound `child` by `parent`.
    pub fn set_type_bounds(&mut self, child: &str, parent: &str) -> Result<(), PolicyError> {
        let parent_value = self.type_value(parent)?;
        let sym = self
            .types
            .get_mut(child)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Type, child))?;
        sym.datum.bounds = Some(parent_value);
        Ok(())
    }

    /// Mark a type permissive.
    pub fn set_permissive(&mut self, type_name: &str) -> Result<(), PolicyError> {
        let value = self.type_value(type_name)?;
        self.permissive.insert_value(value);
        Ok(())
    }

    // ── Roles ───────────────────────────────────────────────────

    /// Declare a role.
    pub fn declare_role(&mut self, name: &str) -> Result<u32, PolicyError> {
        self.roles.declare(name, RoleDatum::default())
    }

    /// Declare a role attribute.
    pub fn declare_role_attribute(&mut self, name: &str) -> Result<u32, PolicyError> {
        self.roles.declare(
            name,
            RoleDatum {
                flavor: RoleFlavor::Attribute,
                ..RoleDatum::default()
            },
        )
    }

    /// Require a role in `block`.
    pub fn require_role(&mut self, block: BlockRef, name: &str) -> Result<u32, PolicyError> {
        let value = self.roles.require(name, RoleDatum::default())?;
        self.block_mut(block)?.requires.roles.insert_value(value);
        Ok(value)
    }

    /// Authorize `role` for `types` (types or attributes).
    pub fn add_role_types(&mut self, role: &str, types: &[&str]) -> Result<(), PolicyError> {
        let values = self.type_values(types)?;
        let sym = self
            .roles
            .get_mut(role)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Role, role))?;
        for value in values {
            sym.datum.types.types.insert_value(value);
        }
        Ok(())
    }

    /// Let `role` dominate `dominated`.
    pub fn add_role_dominance(&mut self, role: &str, dominated: &str) -> Result<(), PolicyError> {
        let dominated_value = self.role_value(dominated)?;
        let sym = self
            .roles
            .get_mut(role)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Role, role))?;
        sym.datum.dominates.insert_value(dominated_value);
        Ok(())
    }

    /// Add `role` to a role attribute.
    pub fn add_to_role_attribute(
        &mut self,
        attribute: &str,
        role: &str,
    ) -> Result<(), PolicyError> {
        let role_value = self.role_value(role)?;
        let sym = self
            .roles
            .get_mut(attribute)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Role, attribute))?;
        if !sym.datum.is_attribute() {
            return Err(PolicyError::InvalidDeclaration(format!(
                "{attribute} is a role, not a role attribute"
            )));
        }
        sym.datum.roles.insert_value(role_value);
        Ok(())
    }

    /// Bound `child` by `parent`.
    pub fn set_role_bounds(&mut self, child: &str, parent: &str) -> Result<(), PolicyError> {
        let parent_value = self.role_value(parent)?;
        let sym = self
            .roles
            .get_mut(child)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Role, child))?;
        sym.datum.bounds = Some(parent_value);
        Ok(())
    }

    // ── Users ───────────────────────────────────────────────────

    /// Declare a user authorized for `roles`.
    pub fn declare_user(&mut self, name: &str, roles: &[&str]) -> Result<u32, PolicyError> {
        let mut datum = UserDatum::default();
        for role in roles {
            datum.roles.insert_value(self.role_value(role)?);
        }
        self.users.declare(name, datum)
    }

    /// Require a user in `block`.
    pub fn require_user(&mut self, block: BlockRef, name: &str) -> Result<u32, PolicyError> {
        let value = self.users.require(name, UserDatum::default())?;
        self.block_mut(block)?.requires.users.insert_value(value);
        Ok(value)
    }

    /// Authorize `user` for more roles.
    pub fn add_user_roles(&mut self, user: &str, roles: &[&str]) -> Result<(), PolicyError> {
        let mut values = Vec::with_capacity(roles.len());
        for role in roles {
            values.push(self.role_value(role)?);
        }
        let sym = self
            .users
            .get_mut(user)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::User, user))?;
        for value in values {
            sym.datum.roles.insert_value(value);
        }
        Ok(())
    }

    /// Set the MLS range and default level of `user`.
    pub fn set_user_range(
        &mut self,
        user: &str,
        range: MlsRange,
        default_level: MlsLevel,
    ) -> Result<(), PolicyError> {
        if !self.mls {
            return Err(PolicyError::InvalidDeclaration(format!(
                "user {user} has a range in a non-MLS policy"
            )));
        }
        let sym = self
            .users
            .get_mut(user)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::User, user))?;
        sym.datum.range = Some(range);
        sym.datum.default_level = Some(default_level);
        Ok(())
    }

    /// Bound `child` by `parent`.
    pub fn set_user_bounds(&mut self, child: &str, parent: &str) -> Result<(), PolicyError> {
        let parent_value = self.user_value(parent)?;
        let sym = self
            .users
            .get_mut(child)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::User, child))?;
        sym.datum.bounds = Some(parent_value);
        Ok(())
    }

    // ── Booleans ────────────────────────────────────────────────

    /// Declare a boolean with its default state.
    pub fn declare_bool(&mut self, name: &str, state: bool) -> Result<u32, PolicyError> {
        self.bools.declare(
            name,
            BoolDatum {
                state,
                tunable: false,
            },
        )
    }

    /// Declare a tunable (resolved at expansion).
    pub fn declare_tunable(&mut self, name: &str, state: bool) -> Result<u32, PolicyError> {
        self.bools.declare(
            name,
            BoolDatum {
                state,
                tunable: true,
            },
        )
    }

    /// Require a boolean in `block`.
    pub fn require_bool(&mut self, block: BlockRef, name: &str) -> Result<u32, PolicyError> {
        let value = self.bools.require(name, BoolDatum::default())?;
        self.block_mut(block)?.requires.bools.insert_value(value);
        Ok(value)
    }

    // ── MLS ─────────────────────────────────────────────────────

    /// Declare a sensitivity. Sensitivities are declared in dominance
    /// order, lowest first.
    pub fn declare_sensitivity(&mut self, name: &str) -> Result<u32, PolicyError> {
        self.require_mls("sensitivity", name)?;
        self.sensitivities.declare(name, LevelDatum::default())
    }

    /// Add `alias` for a sensitivity.
    pub fn add_sensitivity_alias(&mut self, sens: &str, alias: &str) -> Result<(), PolicyError> {
        let value = self.sensitivity_value(sens)?;
        self.sensitivities.add_alias(alias, value)
    }

    /// Declare a category.
    pub fn declare_category(&mut self, name: &str) -> Result<u32, PolicyError> {
        self.require_mls("category", name)?;
        self.categories.declare(name, CatDatum)
    }

    /// Add `alias` for a category.
    pub fn add_category_alias(&mut self, cat: &str, alias: &str) -> Result<(), PolicyError> {
        let value = self.category_value(cat)?;
        self.categories.add_alias(alias, value)
    }

    /// Define the level of `sens`: the categories it may be combined with.
    pub fn define_level(&mut self, sens: &str, cats: &[&str]) -> Result<(), PolicyError> {
        let cats = self.category_bits(cats)?;
        let sym = self
            .sensitivities
            .get_mut(sens)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Sensitivity, sens))?;
        if sym.datum.cats.is_some() {
            return Err(PolicyError::ConflictingDeclaration {
                kind: SymbolKind::Sensitivity,
                name: sens.to_owned(),
                detail: "level defined more than once".to_owned(),
            });
        }
        sym.datum.cats = Some(cats);
        Ok(())
    }

    /// Build a level; the categories must be allowed by the level definition.
    pub fn level(&self, sens: &str, cats: &[&str]) -> Result<MlsLevel, PolicyError> {
        let sym = self
            .sensitivities
            .get(sens)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::Sensitivity, sens))?;
        let cats = self.category_bits(cats)?;
        match &sym.datum.cats {
            Some(allowed) if cats.is_subset(allowed) => Ok(MlsLevel {
                sens: sym.value,
                cats,
            }),
            Some(_) => Err(PolicyError::InvalidDeclaration(format!(
                "categories not allowed with sensitivity {sens}"
            ))),
            None => Err(PolicyError::InvalidDeclaration(format!(
                "sensitivity {sens} has no level definition"
            ))),
        }
    }

    fn category_bits(&self, cats: &[&str]) -> Result<Ebitmap, PolicyError> {
        let mut bits = Ebitmap::new();
        for cat in cats {
            bits.insert_value(self.category_value(cat)?);
        }
        Ok(bits)
    }

    fn require_mls(&self, what: &str, name: &str) -> Result<(), PolicyError> {
        if self.mls {
            Ok(())
        } else {
            Err(PolicyError::InvalidDeclaration(format!(
                "{what} {name} declared in a non-MLS policy"
            )))
        }
    }

    // ── Rule operands ───────────────────────────────────────────

    fn type_values(&self, names: &[&str]) -> Result<Vec<u32>, PolicyError> {
        names.iter().map(|name| self.type_value(name)).collect()
    }

    /// Type set naming types and attributes.
    pub fn type_set(&self, names: &[&str]) -> Result<TypeSet, PolicyError> {
        Ok(TypeSet::of(self.type_values(names)?))
    }

    /// Role set naming roles and role attributes.
    pub fn role_set(&self, names: &[&str]) -> Result<RoleSet, PolicyError> {
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            values.push(self.role_value(name)?);
        }
        Ok(RoleSet::of(values))
    }

    /// Set of class values.
    pub fn class_set(&self, classes: &[&str]) -> Result<Ebitmap, PolicyError> {
        let mut bits = Ebitmap::new();
        for class in classes {
            bits.insert_value(self.class_value(class)?);
        }
        Ok(bits)
    }

    /// Class plus permission mask.
    pub fn class_perms(&self, class: &str, perms: &[&str]) -> Result<ClassPerms, PolicyError> {
        let value = self.class_value(class)?;
        let mut mask = 0u32;
        for perm in perms {
            let bit = self.permission_bit(value, perm).ok_or_else(|| {
                PolicyError::unknown(SymbolKind::Permission, format!("{class}:{perm}"))
            })?;
            mask |= 1u32.checked_shl(bit).unwrap_or(0);
        }
        Ok(ClassPerms {
            class: value,
            data: mask,
        })
    }

    /// Class plus result type of a type rule.
    pub fn class_result(&self, class: &str, result: &str) -> Result<ClassPerms, PolicyError> {
        Ok(ClassPerms {
            class: self.class_value(class)?,
            data: self.type_value(result)?,
        })
    }

    // ── Rules ───────────────────────────────────────────────────

    /// Add an access-vector or type rule to `block`.
    pub fn add_rule(&mut self, block: BlockRef, rule: AvRule) -> Result<(), PolicyError> {
        if rule.perms.is_empty() {
            return Err(PolicyError::InvalidDeclaration(format!(
                "{} rule without classes",
                rule.kind.keyword()
            )));
        }
        if rule.object_name.is_some() && rule.kind != AvRuleKind::Transition {
            return Err(PolicyError::InvalidDeclaration(
                "object names are only valid on type_transition".to_owned(),
            ));
        }
        self.block_mut(block)?.rules.avrules.push(rule);
        Ok(())
    }

    /// Add a single-class access-vector rule to the global block. A target of
    /// `self` targets the source type.
    pub fn add_av(
        &mut self,
        kind: AvRuleKind,
        source: &str,
        target: &str,
        class: &str,
        perms: &[&str],
    ) -> Result<(), PolicyError> {
        if kind.is_type_rule() {
            return Err(PolicyError::InvalidDeclaration(format!(
                "{} takes a result type",
                kind.keyword()
            )));
        }
        let rule = self.simple_rule(kind, source, target, self.class_perms(class, perms)?)?;
        self.add_rule(BlockRef::Global, rule)
    }

    /// `allow source target:class { perms }` in the global block.
    pub fn allow(
        &mut self,
        source: &str,
        target: &str,
        class: &str,
        perms: &[&str],
    ) -> Result<(), PolicyError> {
        self.add_av(AvRuleKind::Allow, source, target, class, perms)
    }

    /// `neverallow source target:class { perms }` in the global block.
    pub fn neverallow(
        &mut self,
        source: &str,
        target: &str,
        class: &str,
        perms: &[&str],
    ) -> Result<(), PolicyError> {
        self.add_av(AvRuleKind::NeverAllow, source, target, class, perms)
    }

    /// `type_transition source target:class result [name]` in the global
    /// block.
    pub fn type_transition(
        &mut self,
        source: &str,
        target: &str,
        class: &str,
        result: &str,
        object_name: Option<&str>,
    ) -> Result<(), PolicyError> {
        let data = self.class_result(class, result)?;
        let mut rule = self.simple_rule(AvRuleKind::Transition, source, target, data)?;
        rule.object_name = object_name.map(str::to_owned);
        self.add_rule(BlockRef::Global, rule)
    }

    fn simple_rule(
        &self,
        kind: AvRuleKind,
        source: &str,
        target: &str,
        data: ClassPerms,
    ) -> Result<AvRule, PolicyError> {
        let source_set = self.type_set(&[source])?;
        if target == SELF_TARGET {
            let mut rule = AvRule::new(kind, source_set, TypeSet::default(), vec![data]);
            rule.self_target = true;
            Ok(rule)
        } else {
            Ok(AvRule::new(
                kind,
                source_set,
                self.type_set(&[target])?,
                vec![data],
            ))
        }
    }

    /// Add a role transition to `block`.
    pub fn add_role_transition(
        &mut self,
        block: BlockRef,
        rule: RoleTransRule,
    ) -> Result<(), PolicyError> {
        self.block_mut(block)?.rules.role_trans.push(rule);
        Ok(())
    }

    /// Add a role allow to `block`.
    pub fn add_role_allow(
        &mut self,
        block: BlockRef,
        rule: RoleAllowRule,
    ) -> Result<(), PolicyError> {
        self.block_mut(block)?.rules.role_allows.push(rule);
        Ok(())
    }

    /// Add a range transition to `block`.
    pub fn add_range_transition(
        &mut self,
        block: BlockRef,
        rule: RangeTransRule,
    ) -> Result<(), PolicyError> {
        if !self.mls {
            return Err(PolicyError::InvalidDeclaration(
                "range_transition in a non-MLS policy".to_owned(),
            ));
        }
        self.block_mut(block)?.rules.range_trans.push(rule);
        Ok(())
    }

    /// Add boolean-guarded rules to `block`.
    pub fn add_conditional(&mut self, block: BlockRef, rule: CondRule) -> Result<(), PolicyError> {
        if !rule.expr.is_well_formed() {
            return Err(PolicyError::InvalidConditional(
                "malformed conditional expression".to_owned(),
            ));
        }
        if let Some(missing) = rule.expr.bools().find(|b| !self.bools.contains_value(*b)) {
            return Err(PolicyError::InvalidConditional(format!(
                "expression references unknown boolean value {missing}"
            )));
        }
        self.block_mut(block)?.rules.conditionals.push(rule);
        Ok(())
    }

    // ── Contexts ────────────────────────────────────────────────

    /// Build a context from names.
    pub fn context(
        &self,
        user: &str,
        role: &str,
        type_: &str,
        range: Option<MlsRange>,
    ) -> Result<Context, PolicyError> {
        if range.is_some() != self.mls {
            return Err(PolicyError::InvalidDeclaration(format!(
                "context {user}:{role}:{type_} must {}carry a range",
                if self.mls { "" } else { "not " }
            )));
        }
        Ok(Context {
            user: self.user_value(user)?,
            role: self.role_value(role)?,
            type_: self.type_value(type_)?,
            range,
        })
    }

    /// Declare an initial SID without a context.
    pub fn declare_initial_sid(&mut self, sid: u32, name: &str) -> Result<(), PolicyError> {
        let isids = &self.ocontexts.isids;
        if isids.iter().any(|isid| isid.name == name || isid.sid == sid) {
            return Err(PolicyError::ConflictingDeclaration {
                kind: SymbolKind::InitialSid,
                name: name.to_owned(),
                detail: format!("sid {sid} or its name already declared"),
            });
        }
        self.ocontexts.isids.push(InitialSid {
            sid,
            name: name.to_owned(),
            context: None,
        });
        Ok(())
    }

    /// Assign the context of a declared initial SID.
    pub fn set_initial_sid_context(
        &mut self,
        name: &str,
        context: Context,
    ) -> Result<(), PolicyError> {
        let isid = self
            .ocontexts
            .isids
            .iter_mut()
            .find(|isid| isid.name == name)
            .ok_or_else(|| PolicyError::unknown(SymbolKind::InitialSid, name))?;
        if isid.context.is_some() {
            return Err(PolicyError::ConflictingDeclaration {
                kind: SymbolKind::InitialSid,
                name: name.to_owned(),
                detail: "context assigned more than once".to_owned(),
            });
        }
        isid.context = Some(context);
        Ok(())
    }

    // ── Metadata ────────────────────────────────────────────────

    /// Enable a policy capability by name.
    pub fn enable_capability(&mut self, name: &str) -> Result<(), PolicyError> {
        let idx = POLICY_CAPABILITIES
            .iter()
            .position(|cap| *cap == name)
            .ok_or_else(|| {
                PolicyError::InvalidDeclaration(format!("unknown policy capability {name}"))
            })?;
        let bit = u32::try_from(idx)
            .map_err(|_| PolicyError::internal("capability index overflow"))?;
        self.policycaps.set(bit);
        Ok(())
    }

    /// Post-parse declaration checks: every declared sensitivity must be
    /// used in a level definition.
    pub fn check_declarations(&self) -> Result<(), PolicyError> {
        for sym in self.sensitivities.iter() {
            if sym.scope == Scope::Declared && sym.datum.cats.is_none() {
                return Err(PolicyError::InvalidDeclaration(format!(
                    "sensitivity {} is not used in a level definition",
                    sym.name
                )));
            }
        }
        Ok(())
    }
}

/// Reject duplicate names and oversized permission lists.
fn check_perm_list(owner: &str, inherited: &[String], perms: &[&str]) -> Result<(), PolicyError> {
    if inherited.len().saturating_add(perms.len()) > MAX_CLASS_PERMS {
        return Err(PolicyError::InvalidDeclaration(format!(
            "{owner} has more than {MAX_CLASS_PERMS} permissions"
        )));
    }
    let mut seen: BTreeSet<&str> = inherited.iter().map(String::as_str).collect();
    for perm in perms {
        if !seen.insert(*perm) {
            return Err(PolicyError::InvalidDeclaration(format!(
                "permission {perm} appears twice in {owner}"
            )));
        }
    }
    Ok(())
}
