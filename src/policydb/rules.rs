//! Unexpanded rules as written in base and module policies.

use std::collections::BTreeMap;

use super::ebitmap::Ebitmap;
use super::mls::MlsRange;

/// Set modifier for type and role sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SetFlag {
    /// Plain set.
    #[default]
    None,
    /// Every concrete member (`*`).
    Star,
    /// Everything except the set (`~`).
    Complement,
}

/// Type operand: types/attributes, minus a negative set, with a modifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeSet {
    /// Included types and attributes.
    pub types: Ebitmap,
    /// Excluded types and attributes.
    pub negset: Ebitmap,
    /// Modifier applied after exclusion.
    pub flag: SetFlag,
}

impl TypeSet {
    /// Set of the given type values.
    pub fn of(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            types: Ebitmap::from_values(values),
            ..Self::default()
        }
    }

    /// `*`.
    pub fn star() -> Self {
        Self {
            flag: SetFlag::Star,
            ..Self::default()
        }
    }

    /// `~self`.
    pub fn complement(mut self) -> Self {
        self.flag = SetFlag::Complement;
        self
    }

    /// Exclude `values`.
    pub fn excluding(mut self, values: impl IntoIterator<Item = u32>) -> Self {
        for value in values {
            self.negset.insert_value(value);
        }
        self
    }
}

/// Role operand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleSet {
    /// Roles and role attributes.
    pub roles: Ebitmap,
    /// Modifier.
    pub flag: SetFlag,
}

impl RoleSet {
    /// Set of the given role values.
    pub fn of(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            roles: Ebitmap::from_values(values),
            flag: SetFlag::None,
        }
    }
}

/// Access-vector or type rule kind. Discriminants are the wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AvRuleKind {
    /// `allow`.
    Allow,
    /// `auditallow`.
    AuditAllow,
    /// `dontaudit`.
    DontAudit,
    /// `type_transition`.
    Transition,
    /// `type_member`.
    Member,
    /// `type_change`.
    Change,
    /// `neverallow`.
    NeverAllow,
}

impl AvRuleKind {
    /// Wire code.
    pub fn code(self) -> u16 {
        match self {
            Self::Allow => 0x0001,
            Self::AuditAllow => 0x0002,
            Self::DontAudit => 0x0004,
            Self::Transition => 0x0010,
            Self::Member => 0x0020,
            Self::Change => 0x0040,
            Self::NeverAllow => 0x0080,
        }
    }

    /// Kind for a wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::Allow),
            0x0002 => Some(Self::AuditAllow),
            0x0004 => Some(Self::DontAudit),
            0x0010 => Some(Self::Transition),
            0x0020 => Some(Self::Member),
            0x0040 => Some(Self::Change),
            0x0080 => Some(Self::NeverAllow),
            _ => None,
        }
    }

    /// Whether the rule's data is a result type rather than a permission mask.
    pub fn is_type_rule(self) -> bool {
        matches!(self, Self::Transition | Self::Member | Self::Change)
    }

    /// Policy-language keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::AuditAllow => "auditallow",
            Self::DontAudit => "dontaudit",
            Self::Transition => "type_transition",
            Self::Member => "type_member",
            Self::Change => "type_change",
            Self::NeverAllow => "neverallow",
        }
    }
}

/// Class and rule data: a permission mask for AV rules, a result type value
/// for type rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassPerms {
    /// Class value.
    pub class: u32,
    /// Permission mask or result type.
    pub data: u32,
}

/// Unexpanded access-vector or type rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvRule {
    /// Rule kind.
    pub kind: AvRuleKind,
    /// Source operand.
    pub source: TypeSet,
    /// Target operand.
    pub target: TypeSet,
    /// `self` appears among the targets.
    pub self_target: bool,
    /// Per-class data.
    pub perms: Vec<ClassPerms>,
    /// Object name of a filename type transition.
    pub object_name: Option<String>,
    /// Source line, for diagnostics (0 when unknown).
    pub line: u32,
}

impl AvRule {
    /// Rule without a `self` target, object name or line.
    pub fn new(kind: AvRuleKind, source: TypeSet, target: TypeSet, perms: Vec<ClassPerms>) -> Self {
        Self {
            kind,
            source,
            target,
            self_target: false,
            perms,
            object_name: None,
            line: 0,
        }
    }
}

/// `role_transition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTransRule {
    /// Current roles.
    pub roles: RoleSet,
    /// Executed/target types.
    pub types: TypeSet,
    /// Object classes (bit `n` is class value `n + 1`).
    pub classes: Ebitmap,
    /// Resulting role.
    pub new_role: u32,
}

/// Role `allow`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAllowRule {
    /// Current roles.
    pub roles: RoleSet,
    /// Roles that may be entered.
    pub new_roles: RoleSet,
}

/// `range_transition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeTransRule {
    /// Source types.
    pub source: TypeSet,
    /// Target types.
    pub target: TypeSet,
    /// Object classes.
    pub classes: Ebitmap,
    /// Resulting range.
    pub range: MlsRange,
}

/// One RPN node of a conditional expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CondExprNode {
    /// Push a boolean's value.
    Bool(u32),
    /// Logical not.
    Not,
    /// Logical or.
    Or,
    /// Logical and.
    And,
    /// Logical exclusive or.
    Xor,
    /// Equality.
    Eq,
    /// Inequality.
    Neq,
}

/// Conditional expression in RPN.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CondExpr(pub Vec<CondExprNode>);

impl CondExpr {
    /// Expression testing a single boolean.
    pub fn boolean(value: u32) -> Self {
        Self(vec![CondExprNode::Bool(value)])
    }

    /// Boolean values referenced, in order of appearance.
    pub fn bools(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().filter_map(|node| match node {
            CondExprNode::Bool(value) => Some(*value),
            _ => None,
        })
    }

    /// Whether every operator has its operands and one value remains.
    pub fn is_well_formed(&self) -> bool {
        let mut depth: usize = 0;
        for node in &self.0 {
            match node {
                CondExprNode::Bool(_) => depth = depth.saturating_add(1),
                CondExprNode::Not => {
                    if depth < 1 {
                        return false;
                    }
                }
                _ => {
                    if depth < 2 {
                        return false;
                    }
                    depth = depth.saturating_sub(1);
                }
            }
        }
        depth == 1
    }

    /// Evaluate with `state` giving each boolean's value. `None` when the
    /// expression is malformed or a boolean is unknown.
    pub fn evaluate(&self, state: impl Fn(u32) -> Option<bool>) -> Option<bool> {
        let mut stack: Vec<bool> = Vec::new();
        for node in &self.0 {
            let value = match node {
                CondExprNode::Bool(b) => state(*b)?,
                CondExprNode::Not => !stack.pop()?,
                binary => {
                    let rhs = stack.pop()?;
                    let lhs = stack.pop()?;
                    match binary {
                        CondExprNode::Or => lhs || rhs,
                        CondExprNode::And => lhs && rhs,
                        CondExprNode::Xor => lhs != rhs,
                        CondExprNode::Eq => lhs == rhs,
                        _ => lhs != rhs,
                    }
                }
            };
            stack.push(value);
        }
        match stack.as_slice() {
            [result] => Some(*result),
            _ => None,
        }
    }
}

/// Boolean-guarded rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CondRule {
    /// Guard.
    pub expr: CondExpr,
    /// Rules active when the guard is true.
    pub true_rules: Vec<AvRule>,
    /// Rules active when the guard is false.
    pub false_rules: Vec<AvRule>,
}

/// Rules of one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    /// Access-vector and type rules.
    pub avrules: Vec<AvRule>,
    /// Role transitions.
    pub role_trans: Vec<RoleTransRule>,
    /// Role allows.
    pub role_allows: Vec<RoleAllowRule>,
    /// Range transitions.
    pub range_trans: Vec<RangeTransRule>,
    /// Conditional rules.
    pub conditionals: Vec<CondRule>,
}

impl RuleSet {
    /// Whether the set holds no rules.
    pub fn is_empty(&self) -> bool {
        self.avrules.is_empty()
            && self.role_trans.is_empty()
            && self.role_allows.is_empty()
            && self.range_trans.is_empty()
            && self.conditionals.is_empty()
    }

    /// Move every rule of `other` into `self`.
    pub fn append(&mut self, other: RuleSet) {
        self.avrules.extend(other.avrules);
        self.role_trans.extend(other.role_trans);
        self.role_allows.extend(other.role_allows);
        self.range_trans.extend(other.range_trans);
        self.conditionals.extend(other.conditionals);
    }
}

/// Symbols a block needs from elsewhere, by value in the owning database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requires {
    /// Classes.
    pub classes: Ebitmap,
    /// Roles and role attributes.
    pub roles: Ebitmap,
    /// Types and attributes.
    pub types: Ebitmap,
    /// Users.
    pub users: Ebitmap,
    /// Booleans.
    pub bools: Ebitmap,
    /// Sensitivities.
    pub sensitivities: Ebitmap,
    /// Categories.
    pub categories: Ebitmap,
    /// Required permission mask per class value.
    pub class_perms: BTreeMap<u32, u32>,
}

impl Requires {
    /// Whether nothing is required.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
            && self.roles.is_empty()
            && self.types.is_empty()
            && self.users.is_empty()
            && self.bools.is_empty()
            && self.sensitivities.is_empty()
            && self.categories.is_empty()
            && self.class_perms.is_empty()
    }
}

/// Requirements plus the rules they guard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleBlock {
    /// What the block needs.
    pub requires: Requires,
    /// What the block contributes.
    pub rules: RuleSet,
}

/// Names a block of a base or module database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    /// The always-enabled global block.
    Global,
    /// An optional block by index.
    Optional(usize),
}
