//! Versioned binary policy format.
//!
//! All integers are little-endian. A stream starts with a magic number
//! (kernel or base/module), the platform string, the format version and a
//! configuration word, followed by symbol tables in canonical order and
//! then either expanded rule tables (kernel) or rule blocks (base/module),
//! object contexts and genfs entries. Fields introduced by later versions
//! are only present from that version on; writing a database that uses a
//! feature its version cannot hold fails instead of dropping data.
//!
//! Decoding checks every length against the bytes that remain, rejects
//! trailing data and finishes with a full [`crate::validate`] sweep.

mod cursor;
mod read;
mod write;

pub use read::read_policy;
pub use write::write_policy;

use crate::policydb::datum::{DefaultRange, DefaultSide};
use crate::policydb::rules::SetFlag;
use crate::policydb::{PolicyKind, TargetPlatform};

/// Magic number of kernel policies.
pub const KERNEL_MAGIC: u32 = 0xf97c_ff8c;

/// Magic number of base and module policies.
pub const MODULE_MAGIC: u32 = 0xf97c_ff8d;

/// Base/module kind word: base.
const KIND_BASE: u32 = 1;
/// Base/module kind word: module.
const KIND_MODULE: u32 = 2;

/// Config word bit: MLS enabled.
const CONFIG_MLS: u32 = 0x1;
/// Config word bits: unknown permission handling.
const CONFIG_UNKNOWN_MASK: u32 = 0x6;
const CONFIG_REJECT_UNKNOWN: u32 = 0x2;
const CONFIG_ALLOW_UNKNOWN: u32 = 0x4;

/// Symbol-table count with and without a boolean table.
const SYM_NUM: u32 = 8;
const SYM_NUM_NO_BOOLS: u32 = 7;

/// Ebitmap node width.
const MAPSIZE: u32 = 64;

/// Version-gated parts of the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Feature {
    Booleans,
    Ipv6,
    Mls,
    ValidateTrans,
    RangeTransClass,
    PolicyCaps,
    Permissive,
    Bounds,
    FilenameTrans,
    RoleTransClass,
    RoleAttributes,
    Tunables,
    ObjectDefaults,
    DefaultType,
    ConstraintTypeNames,
    DeviceTree,
    Infiniband,
    Glblub,
    FilenameTransGrouped,
    SelfTypeRule,
}

impl Feature {
    /// First version of `kind` that carries the feature, or `None` when the
    /// kind never does.
    pub(crate) fn min_version(self, kind: PolicyKind) -> Option<u32> {
        match kind {
            PolicyKind::Kernel => match self {
                Self::Booleans => Some(16),
                Self::Ipv6 => Some(17),
                Self::Mls | Self::ValidateTrans => Some(19),
                Self::RangeTransClass => Some(21),
                Self::PolicyCaps => Some(22),
                Self::Permissive => Some(23),
                Self::Bounds => Some(24),
                Self::FilenameTrans => Some(25),
                Self::RoleTransClass => Some(26),
                Self::ObjectDefaults => Some(27),
                Self::DefaultType => Some(28),
                Self::ConstraintTypeNames => Some(29),
                Self::DeviceTree => Some(30),
                Self::Infiniband => Some(31),
                Self::Glblub => Some(32),
                Self::FilenameTransGrouped => Some(33),
                Self::SelfTypeRule => Some(15),
                Self::RoleAttributes | Self::Tunables => None,
            },
            PolicyKind::Base | PolicyKind::Module => match self {
                Self::Booleans | Self::Ipv6 => Some(4),
                Self::Mls | Self::ValidateTrans => Some(5),
                Self::RangeTransClass => Some(6),
                Self::PolicyCaps => Some(7),
                Self::Permissive => Some(8),
                Self::Bounds => Some(9),
                Self::FilenameTrans => Some(11),
                Self::RoleTransClass => Some(12),
                Self::RoleAttributes => Some(13),
                Self::Tunables => Some(14),
                Self::ObjectDefaults => Some(15),
                Self::DefaultType => Some(16),
                Self::ConstraintTypeNames => Some(17),
                Self::DeviceTree => Some(18),
                Self::Infiniband => Some(19),
                Self::Glblub => Some(20),
                Self::SelfTypeRule => Some(21),
                Self::FilenameTransGrouped => None,
            },
        }
    }

    /// Whether `version` of `kind` carries the feature.
    pub(crate) fn supported(self, kind: PolicyKind, version: u32) -> bool {
        self.min_version(kind).is_some_and(|min| version >= min)
    }

    /// Name used in [`crate::PolicyError::UnsupportedFeature`].
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Booleans => "booleans",
            Self::Ipv6 => "IPv6 node contexts",
            Self::Mls => "MLS",
            Self::ValidateTrans => "validatetrans",
            Self::RangeTransClass => "range_transition classes",
            Self::PolicyCaps => "policy capabilities",
            Self::Permissive => "permissive types",
            Self::Bounds => "bounds",
            Self::FilenameTrans => "filename type transitions",
            Self::RoleTransClass => "role_transition classes",
            Self::RoleAttributes => "role attributes",
            Self::Tunables => "tunables",
            Self::ObjectDefaults => "object defaults",
            Self::DefaultType => "default_type",
            Self::ConstraintTypeNames => "constraint type names",
            Self::DeviceTree => "device-tree contexts",
            Self::Infiniband => "infiniband contexts",
            Self::Glblub => "glblub default range",
            Self::FilenameTransGrouped => "grouped filename transitions",
            Self::SelfTypeRule => "self in type rules",
        }
    }
}

/// Kind and version being encoded or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Layout {
    pub(crate) kind: PolicyKind,
    pub(crate) version: u32,
}

impl Layout {
    pub(crate) fn has(self, feature: Feature) -> bool {
        feature.supported(self.kind, self.version)
    }

    pub(crate) fn is_kernel(self) -> bool {
        self.kind == PolicyKind::Kernel
    }

    pub(crate) fn sym_num(self) -> u32 {
        if self.has(Feature::Booleans) {
            SYM_NUM
        } else {
            SYM_NUM_NO_BOOLS
        }
    }
}

/// Object-context categories in stream order for a platform and layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OconKind {
    Isid,
    Fs,
    Port,
    Netif,
    Node,
    FsUse,
    Node6,
    IbPkey,
    IbEndport,
    Pirq,
    Ioport,
    Iomem,
    PciDevice,
    DeviceTree,
}

static SELINUX_OCONS: [OconKind; 9] = [
    OconKind::Isid,
    OconKind::Fs,
    OconKind::Port,
    OconKind::Netif,
    OconKind::Node,
    OconKind::FsUse,
    OconKind::Node6,
    OconKind::IbPkey,
    OconKind::IbEndport,
];

static XEN_OCONS: [OconKind; 6] = [
    OconKind::Isid,
    OconKind::Pirq,
    OconKind::Ioport,
    OconKind::Iomem,
    OconKind::PciDevice,
    OconKind::DeviceTree,
];

impl OconKind {
    /// Categories present for `target` under `layout`.
    pub(crate) fn present(target: TargetPlatform, layout: Layout) -> &'static [OconKind] {
        match target {
            TargetPlatform::Selinux => {
                let count = if layout.has(Feature::Infiniband) {
                    9
                } else if layout.has(Feature::Ipv6) {
                    7
                } else {
                    6
                };
                SELINUX_OCONS.get(..count).unwrap_or(&SELINUX_OCONS)
            }
            TargetPlatform::Xen => {
                let count = if layout.has(Feature::DeviceTree) {
                    6
                } else {
                    5
                };
                XEN_OCONS.get(..count).unwrap_or(&XEN_OCONS)
            }
        }
    }

    /// Every category of `target`, newest layout.
    pub(crate) fn all(target: TargetPlatform) -> &'static [OconKind] {
        match target {
            TargetPlatform::Selinux => &SELINUX_OCONS,
            TargetPlatform::Xen => &XEN_OCONS,
        }
    }

    /// Feature whose absence removes this category.
    pub(crate) fn feature(self) -> Option<Feature> {
        match self {
            Self::Node6 => Some(Feature::Ipv6),
            Self::IbPkey | Self::IbEndport => Some(Feature::Infiniband),
            Self::DeviceTree => Some(Feature::DeviceTree),
            _ => None,
        }
    }
}

// ── Wire codes ──────────────────────────────────────────────────

pub(crate) fn set_flag_code(flag: SetFlag) -> u32 {
    match flag {
        SetFlag::None => 0,
        SetFlag::Star => 1,
        SetFlag::Complement => 2,
    }
}

pub(crate) fn set_flag_from_code(code: u32) -> Option<SetFlag> {
    match code {
        0 => Some(SetFlag::None),
        1 => Some(SetFlag::Star),
        2 => Some(SetFlag::Complement),
        _ => None,
    }
}

pub(crate) fn side_code(side: Option<DefaultSide>) -> u32 {
    match side {
        None => 0,
        Some(DefaultSide::Source) => 1,
        Some(DefaultSide::Target) => 2,
    }
}

pub(crate) fn side_from_code(code: u32) -> Option<Option<DefaultSide>> {
    match code {
        0 => Some(None),
        1 => Some(Some(DefaultSide::Source)),
        2 => Some(Some(DefaultSide::Target)),
        _ => None,
    }
}

const DEFAULT_RANGES: [DefaultRange; 7] = [
    DefaultRange::SourceLow,
    DefaultRange::SourceHigh,
    DefaultRange::SourceLowHigh,
    DefaultRange::TargetLow,
    DefaultRange::TargetHigh,
    DefaultRange::TargetLowHigh,
    DefaultRange::Glblub,
];

pub(crate) fn range_code(range: Option<DefaultRange>) -> u32 {
    range
        .and_then(|r| DEFAULT_RANGES.iter().position(|x| *x == r))
        .and_then(|idx| u32::try_from(idx.saturating_add(1)).ok())
        .unwrap_or(0)
}

pub(crate) fn range_from_code(code: u32) -> Option<Option<DefaultRange>> {
    if code == 0 {
        return Some(None);
    }
    let idx = usize::try_from(code.checked_sub(1)?).ok()?;
    DEFAULT_RANGES.get(idx).copied().map(Some)
}

/// 1-based position of `item` in `all`.
pub(crate) fn position_code<T: PartialEq>(all: &[T], item: &T) -> u32 {
    all.iter()
        .position(|x| x == item)
        .and_then(|idx| u32::try_from(idx.saturating_add(1)).ok())
        .unwrap_or(0)
}

/// Item at 1-based position `code` of `all`.
pub(crate) fn from_position_code<T: Copy>(all: &[T], code: u32) -> Option<T> {
    let idx = usize::try_from(code.checked_sub(1)?).ok()?;
    all.get(idx).copied()
}

/// Constraint node type codes.
pub(crate) const CEXPR_NOT: u32 = 1;
pub(crate) const CEXPR_AND: u32 = 2;
pub(crate) const CEXPR_OR: u32 = 3;
pub(crate) const CEXPR_ATTR: u32 = 4;
pub(crate) const CEXPR_NAMES: u32 = 5;

/// Conditional expression node codes.
pub(crate) const COND_BOOL: u32 = 1;
pub(crate) const COND_NOT: u32 = 2;
pub(crate) const COND_OR: u32 = 3;
pub(crate) const COND_AND: u32 = 4;
pub(crate) const COND_XOR: u32 = 5;
pub(crate) const COND_EQ: u32 = 6;
pub(crate) const COND_NEQ: u32 = 7;

/// Scope codes of base/module symbols.
pub(crate) const SCOPE_DECLARED: u32 = 1;
pub(crate) const SCOPE_REQUIRED: u32 = 2;

/// Class the format assumes for transitions written without one.
pub(crate) const PROCESS_CLASS: &str = "process";
