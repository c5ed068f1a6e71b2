//! Per-category symbol payloads.

use super::constraint::Constraint;
use super::ebitmap::Ebitmap;
use super::mls::{MlsLevel, MlsRange};
use super::rules::TypeSet;

/// Largest number of permissions a class (including its common) may own.
pub const MAX_CLASS_PERMS: usize = 32;

/// A shared permission set inherited by classes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonDatum {
    /// Permission names; bit `i` is `perms[i]`.
    pub perms: Vec<String>,
}

/// Which side of a computation an object default is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefaultSide {
    /// Source context.
    Source,
    /// Target context.
    Target,
}

/// Range default selection for newly created objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefaultRange {
    /// Source low level.
    SourceLow,
    /// Source high level.
    SourceHigh,
    /// Full source range.
    SourceLowHigh,
    /// Target low level.
    TargetLow,
    /// Target high level.
    TargetHigh,
    /// Full target range.
    TargetLowHigh,
    /// Greatest lower bound / least upper bound of both ranges.
    Glblub,
}

/// Object default settings of a class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectDefaults {
    /// `default_user`.
    pub user: Option<DefaultSide>,
    /// `default_role`.
    pub role: Option<DefaultSide>,
    /// `default_type`.
    pub type_: Option<DefaultSide>,
    /// `default_range`.
    pub range: Option<DefaultRange>,
}

impl ObjectDefaults {
    /// Whether any default is set.
    pub fn is_empty(&self) -> bool {
        self.user.is_none() && self.role.is_none() && self.type_.is_none() && self.range.is_none()
    }
}

/// Object class.
///
/// Permission bits start with the common's permissions (if any) followed by
/// the class's own, so bit `i` of a mask is `common.perms[i]` for
/// `i < common.perms.len()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassDatum {
    /// Value of the inherited common.
    pub common: Option<u32>,
    /// Own permission names, after the common's.
    pub perms: Vec<String>,
    /// Access constraints.
    pub constraints: Vec<Constraint>,
    /// Transition validation constraints.
    pub validatetrans: Vec<Constraint>,
    /// Object default settings.
    pub defaults: ObjectDefaults,
}

/// Type or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum TypeFlavor {
    /// Concrete type.
    #[default]
    Type,
    /// Named set of types.
    Attribute,
}

/// Type table payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDatum {
    /// Type or attribute.
    pub flavor: TypeFlavor,
    /// Bounding type.
    pub bounds: Option<u32>,
    /// Attribute members (types or, before expansion, other attributes).
    pub members: Ebitmap,
}

impl TypeDatum {
    /// A concrete type.
    pub fn concrete() -> Self {
        Self::default()
    }

    /// An empty attribute.
    pub fn attribute() -> Self {
        Self {
            flavor: TypeFlavor::Attribute,
            ..Self::default()
        }
    }

    /// Whether this is an attribute.
    pub fn is_attribute(&self) -> bool {
        self.flavor == TypeFlavor::Attribute
    }
}

/// Role or role attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum RoleFlavor {
    /// Concrete role.
    #[default]
    Role,
    /// Named set of roles.
    Attribute,
}

/// Role table payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleDatum {
    /// Role or attribute.
    pub flavor: RoleFlavor,
    /// Roles this role dominates.
    pub dominates: Ebitmap,
    /// Authorized types.
    pub types: TypeSet,
    /// Attribute members.
    pub roles: Ebitmap,
    /// Bounding role.
    pub bounds: Option<u32>,
}

impl RoleDatum {
    /// Whether this is a role attribute.
    pub fn is_attribute(&self) -> bool {
        self.flavor == RoleFlavor::Attribute
    }
}

/// User table payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserDatum {
    /// Authorized roles (role attributes allowed before expansion).
    pub roles: Ebitmap,
    /// Authorized MLS range.
    pub range: Option<MlsRange>,
    /// Default login level.
    pub default_level: Option<MlsLevel>,
    /// Bounding user.
    pub bounds: Option<u32>,
}

/// Boolean table payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoolDatum {
    /// Default state.
    pub state: bool,
    /// Resolved at expansion rather than at enforcement time.
    pub tunable: bool,
}

/// Sensitivity payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelDatum {
    /// Categories allowed with this sensitivity, once a level is defined.
    pub cats: Option<Ebitmap>,
}

/// Category payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatDatum;
