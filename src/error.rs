//! Error taxonomy shared by every compilation stage.
//!
//! Each stage surfaces exactly one [`PolicyError`]. Variants carry the names
//! a caller needs to render a compiler diagnostic; the core never formats
//! user-facing output beyond the `Display` impl.

use crate::policydb::{PolicyKind, SymbolKind};

/// A fatal compilation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// A `require` could not be satisfied by any declaration.
    #[error("unresolved {kind} '{name}' required by {module}")]
    UnresolvedSymbol {
        /// Symbol category.
        kind: SymbolKind,
        /// Required name (`class:perm` for permissions).
        name: String,
        /// Module that carried the requirement.
        module: String,
    },

    /// Two declarations of one name disagree.
    #[error("conflicting declaration of {kind} '{name}': {detail}")]
    ConflictingDeclaration {
        /// Symbol category.
        kind: SymbolKind,
        /// Declared name.
        name: String,
        /// What disagrees.
        detail: String,
    },

    /// A bounded symbol grants more than its bound.
    #[error("{kind} '{child}' exceeds its bound '{parent}': {detail}")]
    BoundsViolation {
        /// Symbol category (type, role or user).
        kind: SymbolKind,
        /// The bounded symbol.
        child: String,
        /// Its bound.
        parent: String,
        /// Offending rule or membership.
        detail: String,
    },

    /// Bounds/dominance cycle or malformed constraint structure.
    #[error("hierarchy violation: {0}")]
    HierarchyViolation(String),

    /// An allowed access matches a never-allow assertion.
    #[error("neverallow #{assertion} ({pattern}) violated by '{rule}'")]
    AssertionViolation {
        /// 1-based assertion index in declaration order.
        assertion: usize,
        /// Rendered assertion pattern.
        pattern: String,
        /// Rendered offending rule.
        rule: String,
    },

    /// Type rules disagree on the result for one key.
    #[error("conflicting rules for {key}: '{first}' and '{second}'")]
    ConflictingRule {
        /// Rendered rule key.
        key: String,
        /// Result already recorded.
        first: String,
        /// Result that disagrees.
        second: String,
    },

    /// A conditional expression cannot be handled.
    #[error("invalid conditional expression: {0}")]
    InvalidConditional(String),

    /// Expansion produced more rules than allowed.
    #[error("expanded rule count exceeds limit of {limit}")]
    ExpansionLimit {
        /// Configured limit.
        limit: usize,
    },

    /// A construction-API lookup named an undeclared symbol.
    #[error("unknown {kind} '{name}'")]
    UnknownSymbol {
        /// Symbol category.
        kind: SymbolKind,
        /// Looked-up name.
        name: String,
    },

    /// A declaration is not allowed in this position.
    #[error("invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// The compiler produced an invalid database. Never recoverable.
    #[error("internal consistency error: {0}")]
    InternalConsistency(String),

    /// Binary input is truncated or structurally inconsistent.
    #[error("malformed policy input at offset {offset}: {detail}")]
    MalformedInput {
        /// Byte offset where decoding stopped.
        offset: usize,
        /// What was wrong.
        detail: String,
    },

    /// Version field outside the supported interval.
    #[error("unsupported {kind} policy version {version} (supported {min}..={max})")]
    UnsupportedVersion {
        /// Policy kind implied by the magic number or database.
        kind: PolicyKind,
        /// Offending version.
        version: u32,
        /// Lowest supported version.
        min: u32,
        /// Highest supported version.
        max: u32,
    },

    /// The database uses a feature the target version cannot encode.
    #[error("{feature} cannot be encoded in a {kind} policy at version {version}")]
    UnsupportedFeature {
        /// Feature name.
        feature: &'static str,
        /// Policy kind being written.
        kind: PolicyKind,
        /// Target version.
        version: u32,
    },
}

impl PolicyError {
    /// Whether the error signals a compiler defect rather than a policy
    /// authoring error. Callers must not write output after one of these.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::InternalConsistency(_))
    }

    pub(crate) fn malformed(offset: usize, detail: impl Into<String>) -> Self {
        Self::MalformedInput {
            offset,
            detail: detail.into(),
        }
    }

    pub(crate) fn internal(detail: impl Into<String>) -> Self {
        Self::InternalConsistency(detail.into())
    }

    pub(crate) fn unknown(kind: SymbolKind, name: impl Into<String>) -> Self {
        Self::UnknownSymbol {
            kind,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_internal_consistency_is_internal() {
        assert!(PolicyError::internal("bad avtab").is_internal());
        assert!(!PolicyError::HierarchyViolation("cycle".to_owned()).is_internal());
        assert!(!PolicyError::malformed(4, "eof").is_internal());
    }

    #[test]
    fn diagnostics_name_the_symbol() {
        let err = PolicyError::UnresolvedSymbol {
            kind: SymbolKind::Type,
            name: "tX".to_owned(),
            module: "mod_a".to_owned(),
        };
        assert_eq!(err.to_string(), "unresolved type 'tX' required by mod_a");
    }
}
