//! In-memory policy database.
//!
//! A [`PolicyDb`] is the explicit context every stage works on: the front end
//! populates it through the construction API in [`build`], the linker merges
//! several of them, the expander lowers one into a kernel database, and the
//! serializer turns it into bytes.

pub mod avtab;
pub mod build;
pub mod constraint;
pub mod context;
pub mod datum;
pub mod ebitmap;
pub mod mls;
pub mod render;
pub mod rules;
pub mod symtab;

use std::fmt;

use serde::Deserialize;

pub use avtab::{AvtabEntry, AvtabKey, AvtabKind, CondNode, KernelRules};
pub use context::{Context, InitialSid, Ocontexts};
pub use datum::{
    BoolDatum, CatDatum, ClassDatum, CommonDatum, LevelDatum, RoleDatum, TypeDatum, UserDatum,
};
pub use ebitmap::Ebitmap;
pub use mls::{MlsLevel, MlsRange};
pub use rules::{AvRule, AvRuleKind, BlockRef, ClassPerms, RuleBlock, RuleSet, TypeSet};
pub use symtab::{Scope, Symbol, SymbolKind, SymbolTable, ValueMap};

/// Oldest kernel policy version read or written.
pub const KERNEL_VERSION_MIN: u32 = 15;
/// Newest kernel policy version read or written.
pub const KERNEL_VERSION_MAX: u32 = 33;
/// Oldest base/module policy version read or written.
pub const MODULE_VERSION_MIN: u32 = 4;
/// Newest base/module policy version read or written.
pub const MODULE_VERSION_MAX: u32 = 21;

/// Known policy capabilities; bit `n` of [`PolicyDb::policycaps`] is entry `n`.
pub const POLICY_CAPABILITIES: &[&str] = &[
    "network_peer_controls",
    "open_perms",
    "extended_socket_class",
    "always_check_network",
    "cgroup_seclabel",
    "nnp_nosuid_transition",
    "genfs_seclabel_symlinks",
    "ioctl_skip_cloexec",
    "userspace_initial_context",
    "netlink_xperm",
];

/// Kind of policy database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyKind {
    /// Unexpanded base policy; the root of a link.
    Base,
    /// Unexpanded loadable module.
    Module,
    /// Expanded policy consumed by the enforcement engine.
    Kernel,
}

impl PolicyKind {
    /// Inclusive range of supported versions for this kind.
    pub fn version_range(self) -> (u32, u32) {
        match self {
            Self::Kernel => (KERNEL_VERSION_MIN, KERNEL_VERSION_MAX),
            Self::Base | Self::Module => (MODULE_VERSION_MIN, MODULE_VERSION_MAX),
        }
    }

    /// Whether `version` is within [`Self::version_range`].
    pub fn supports_version(self, version: u32) -> bool {
        let (min, max) = self.version_range();
        (min..=max).contains(&version)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Base => "base",
            Self::Module => "module",
            Self::Kernel => "kernel",
        };
        f.write_str(label)
    }
}

/// What the enforcement engine does with classes or permissions the policy
/// does not define.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleUnknown {
    /// Deny unknown permissions.
    #[default]
    Deny,
    /// Refuse to load the policy.
    Reject,
    /// Allow unknown permissions.
    Allow,
}

impl HandleUnknown {
    /// Parse a config or environment value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "deny" => Some(Self::Deny),
            "reject" => Some(Self::Reject),
            "allow" => Some(Self::Allow),
            _ => None,
        }
    }
}

/// Enforcement platform the policy targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetPlatform {
    /// Linux kernel.
    #[default]
    Selinux,
    /// Xen hypervisor.
    Xen,
}

impl TargetPlatform {
    /// Platform identification string stored in the binary header.
    pub fn platform_string(self) -> &'static str {
        match self {
            Self::Selinux => "SE Linux",
            Self::Xen => "XenFlask",
        }
    }

    /// Platform for a header string.
    pub fn from_platform_string(value: &str) -> Option<Self> {
        match value {
            "SE Linux" => Some(Self::Selinux),
            "XenFlask" => Some(Self::Xen),
            _ => None,
        }
    }
}

/// A policy database: symbol tables, rules, object contexts and metadata.
///
/// Base and module databases keep their rules in blocks ([`Self::global`]
/// and [`Self::optionals`]); kernel databases keep expanded rules in
/// [`Self::kernel`]. The other storage is empty for each kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDb {
    /// Database kind.
    pub kind: PolicyKind,
    /// Module name (base and module databases).
    pub name: Option<String>,
    /// Module version string.
    pub module_version: Option<String>,
    /// Binary format version the database targets.
    pub version: u32,
    /// Multi-level security enabled.
    pub mls: bool,
    /// Unknown class/permission behavior.
    pub handle_unknown: HandleUnknown,
    /// Enforcement platform.
    pub target: TargetPlatform,
    /// Enabled policy capabilities (bit per [`POLICY_CAPABILITIES`] entry).
    pub policycaps: Ebitmap,
    /// Permissive types (bit `n` is type value `n + 1`).
    pub permissive: Ebitmap,
    /// Commons.
    pub commons: SymbolTable<CommonDatum>,
    /// Classes.
    pub classes: SymbolTable<ClassDatum>,
    /// Roles and role attributes.
    pub roles: SymbolTable<RoleDatum>,
    /// Types and type attributes.
    pub types: SymbolTable<TypeDatum>,
    /// Users.
    pub users: SymbolTable<UserDatum>,
    /// Booleans and tunables.
    pub bools: SymbolTable<BoolDatum>,
    /// Sensitivities.
    pub sensitivities: SymbolTable<LevelDatum>,
    /// Categories.
    pub categories: SymbolTable<CatDatum>,
    /// Always-enabled rule block.
    pub global: RuleBlock,
    /// Optional rule blocks.
    pub optionals: Vec<RuleBlock>,
    /// Expanded rules (kernel databases).
    pub kernel: KernelRules,
    /// Object contexts.
    pub ocontexts: Ocontexts,
}

impl PolicyDb {
    /// Create an empty database of `kind` for `target`, at the newest version
    /// for that kind, non-MLS, denying unknown permissions.
    pub fn new(kind: PolicyKind, target: TargetPlatform) -> Self {
        Self {
            kind,
            name: None,
            module_version: None,
            version: kind.version_range().1,
            mls: false,
            handle_unknown: HandleUnknown::Deny,
            target,
            policycaps: Ebitmap::new(),
            permissive: Ebitmap::new(),
            commons: SymbolTable::new(SymbolKind::Common),
            classes: SymbolTable::new(SymbolKind::Class),
            roles: SymbolTable::new(SymbolKind::Role),
            types: SymbolTable::new(SymbolKind::Type),
            users: SymbolTable::new(SymbolKind::User),
            bools: SymbolTable::new(SymbolKind::Bool),
            sensitivities: SymbolTable::new(SymbolKind::Sensitivity),
            categories: SymbolTable::new(SymbolKind::Category),
            global: RuleBlock::default(),
            optionals: Vec::new(),
            kernel: KernelRules::default(),
            ocontexts: Ocontexts::default(),
        }
    }

    /// Empty base database.
    pub fn base() -> Self {
        Self::new(PolicyKind::Base, TargetPlatform::Selinux)
    }

    /// Empty module database named `name` at `version`.
    pub fn module(name: &str, version: &str) -> Self {
        let mut db = Self::new(PolicyKind::Module, TargetPlatform::Selinux);
        db.name = Some(name.to_owned());
        db.module_version = Some(version.to_owned());
        db
    }

    /// Name used in diagnostics.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.kind.to_string(),
        }
    }

    /// Full ordered permission list of a class: the common's permissions
    /// followed by the class's own.
    pub fn class_permissions(&self, class: u32) -> Option<Vec<&str>> {
        let datum = &self.classes.by_value(class)?.datum;
        let mut perms: Vec<&str> = Vec::new();
        if let Some(common) = datum.common {
            let common = self.commons.by_value(common)?;
            perms.extend(common.datum.perms.iter().map(String::as_str));
        }
        perms.extend(datum.perms.iter().map(String::as_str));
        Some(perms)
    }

    /// Bit position of `perm` within `class`.
    pub fn permission_bit(&self, class: u32, perm: &str) -> Option<u32> {
        let perms = self.class_permissions(class)?;
        let idx = perms.iter().position(|p| *p == perm)?;
        u32::try_from(idx).ok()
    }

    /// Mask with a bit for every permission of `class`.
    pub fn class_perm_mask(&self, class: u32) -> Option<u32> {
        let count = self.class_permissions(class)?.len();
        Some(full_mask(count))
    }

    /// Whether any symbol table still holds a required-only symbol.
    pub fn has_required_symbols(&self) -> bool {
        fn any_required<D>(table: &SymbolTable<D>) -> bool {
            table.iter().any(|sym| sym.scope == Scope::Required)
        }
        any_required(&self.commons)
            || any_required(&self.classes)
            || any_required(&self.roles)
            || any_required(&self.types)
            || any_required(&self.users)
            || any_required(&self.bools)
            || any_required(&self.sensitivities)
            || any_required(&self.categories)
    }

    /// Values of every concrete type.
    pub fn concrete_types(&self) -> Ebitmap {
        self.types
            .iter()
            .filter(|sym| !sym.datum.is_attribute())
            .map(|sym| sym.value.saturating_sub(1))
            .collect()
    }

    /// Values of every concrete role.
    pub fn concrete_roles(&self) -> Ebitmap {
        self.roles
            .iter()
            .filter(|sym| !sym.datum.is_attribute())
            .map(|sym| sym.value.saturating_sub(1))
            .collect()
    }
}

/// Mask with the low `count` bits set.
pub(crate) fn full_mask(count: usize) -> u32 {
    u32::try_from(count)
        .ok()
        .and_then(|n| 1u32.checked_shl(n))
        .map_or(u32::MAX, |bit| bit.wrapping_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ranges_per_kind() {
        assert!(PolicyKind::Kernel.supports_version(33));
        assert!(!PolicyKind::Kernel.supports_version(34));
        assert!(!PolicyKind::Kernel.supports_version(14));
        assert!(PolicyKind::Module.supports_version(4));
        assert!(!PolicyKind::Base.supports_version(22));
    }

    #[test]
    fn new_database_uses_newest_version() {
        let db = PolicyDb::base();
        assert_eq!(db.version, MODULE_VERSION_MAX);
        assert_eq!(db.handle_unknown, HandleUnknown::Deny);
        let kernel = PolicyDb::new(PolicyKind::Kernel, TargetPlatform::Xen);
        assert_eq!(kernel.version, KERNEL_VERSION_MAX);
        assert_eq!(kernel.target.platform_string(), "XenFlask");
    }

    #[test]
    fn full_mask_edges() {
        assert_eq!(full_mask(0), 0);
        assert_eq!(full_mask(3), 0b111);
        assert_eq!(full_mask(32), u32::MAX);
    }

    #[test]
    fn handle_unknown_parses_case_insensitively() {
        assert_eq!(HandleUnknown::parse("ALLOW"), Some(HandleUnknown::Allow));
        assert_eq!(
            HandleUnknown::parse(" reject "),
            Some(HandleUnknown::Reject)
        );
        assert_eq!(HandleUnknown::parse("maybe"), None);
    }
}
