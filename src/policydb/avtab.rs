//! Expanded (kernel) rule tables.
//!
//! Every operand here is a concrete type, role or class value. Field order
//! of each struct is its canonical sort key.

use super::mls::MlsRange;
use super::rules::{AvRuleKind, CondExpr};

/// Kind of an access-vector table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AvtabKind {
    /// Allowed permissions.
    Allowed,
    /// Permissions audited when granted.
    AuditAllow,
    /// Permissions not audited when denied.
    DontAudit,
    /// Default type on create.
    Transition,
    /// Default type for polyinstantiated members.
    Member,
    /// Default type on relabel.
    Change,
}

impl AvtabKind {
    /// Wire code (same bit as the matching rule kind).
    pub fn code(self) -> u16 {
        self.rule_kind().code()
    }

    /// Kind for a wire code.
    pub fn from_code(code: u16) -> Option<Self> {
        AvRuleKind::from_code(code).and_then(Self::from_rule_kind)
    }

    /// Table kind an expanded rule of `kind` produces. Never-allow rules
    /// produce no entries.
    pub fn from_rule_kind(kind: AvRuleKind) -> Option<Self> {
        match kind {
            AvRuleKind::Allow => Some(Self::Allowed),
            AvRuleKind::AuditAllow => Some(Self::AuditAllow),
            AvRuleKind::DontAudit => Some(Self::DontAudit),
            AvRuleKind::Transition => Some(Self::Transition),
            AvRuleKind::Member => Some(Self::Member),
            AvRuleKind::Change => Some(Self::Change),
            AvRuleKind::NeverAllow => None,
        }
    }

    /// Rule kind this entry came from.
    pub fn rule_kind(self) -> AvRuleKind {
        match self {
            Self::Allowed => AvRuleKind::Allow,
            Self::AuditAllow => AvRuleKind::AuditAllow,
            Self::DontAudit => AvRuleKind::DontAudit,
            Self::Transition => AvRuleKind::Transition,
            Self::Member => AvRuleKind::Member,
            Self::Change => AvRuleKind::Change,
        }
    }

    /// Whether the datum is a result type.
    pub fn is_type_rule(self) -> bool {
        self.rule_kind().is_type_rule()
    }
}

/// Lookup key of an access-vector table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AvtabKey {
    /// Source type.
    pub source: u32,
    /// Target type.
    pub target: u32,
    /// Object class.
    pub class: u32,
    /// Entry kind.
    pub kind: AvtabKind,
}

/// Access-vector table entry: a permission mask or a result type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AvtabEntry {
    /// Key.
    pub key: AvtabKey,
    /// Permission mask or result type value.
    pub data: u32,
}

/// Conditional node: a guard and its two entry lists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CondNode {
    /// Guard over kernel boolean values.
    pub expr: CondExpr,
    /// Entries enabled when the guard is true.
    pub true_list: Vec<AvtabEntry>,
    /// Entries enabled when the guard is false.
    pub false_list: Vec<AvtabEntry>,
}

/// Expanded role transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleTrans {
    /// Current role.
    pub role: u32,
    /// Target type.
    pub type_: u32,
    /// Object class.
    pub class: u32,
    /// New role.
    pub new_role: u32,
}

/// Expanded role allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleAllow {
    /// Current role.
    pub role: u32,
    /// Role that may be entered.
    pub new_role: u32,
}

/// Expanded filename type transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilenameTrans {
    /// Source type.
    pub source: u32,
    /// Target (parent directory) type.
    pub target: u32,
    /// Object class.
    pub class: u32,
    /// Object name.
    pub name: String,
    /// New type.
    pub result: u32,
}

/// Expanded range transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeTrans {
    /// Source type.
    pub source: u32,
    /// Target type.
    pub target: u32,
    /// Object class.
    pub class: u32,
    /// New range.
    pub range: MlsRange,
}

/// All expanded rule tables of a kernel database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelRules {
    /// Unconditional access-vector table.
    pub avtab: Vec<AvtabEntry>,
    /// Conditional nodes.
    pub cond_list: Vec<CondNode>,
    /// Role transitions.
    pub role_trans: Vec<RoleTrans>,
    /// Role allows.
    pub role_allows: Vec<RoleAllow>,
    /// Filename type transitions.
    pub filename_trans: Vec<FilenameTrans>,
    /// Range transitions.
    pub range_trans: Vec<RangeTrans>,
}

impl KernelRules {
    /// Whether every table is empty.
    pub fn is_empty(&self) -> bool {
        self.avtab.is_empty()
            && self.cond_list.is_empty()
            && self.role_trans.is_empty()
            && self.role_allows.is_empty()
            && self.filename_trans.is_empty()
            && self.range_trans.is_empty()
    }

    /// Unconditional entries plus both branches of every conditional node.
    pub fn all_entries(&self) -> impl Iterator<Item = &AvtabEntry> + '_ {
        self.avtab.iter().chain(
            self.cond_list
                .iter()
                .flat_map(|node| node.true_list.iter().chain(node.false_list.iter())),
        )
    }
}
