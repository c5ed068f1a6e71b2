//! Constraint expressions.
//!
//! Expressions are stored in reverse Polish notation, the way the
//! enforcement engine evaluates them.

use super::ebitmap::Ebitmap;
use super::rules::TypeSet;
use super::symtab::SymbolKind;

/// Context field (or field pair) an expression node inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintAttr {
    /// Source user vs target user.
    U1U2,
    /// Source role vs target role.
    R1R2,
    /// Source type vs target type.
    T1T2,
    /// Source user.
    U1,
    /// Target user.
    U2,
    /// Object user (validatetrans only).
    U3,
    /// Source role.
    R1,
    /// Target role.
    R2,
    /// Object role (validatetrans only).
    R3,
    /// Source type.
    T1,
    /// Target type.
    T2,
    /// Object type (validatetrans only).
    T3,
    /// Source low vs target low.
    L1L2,
    /// Source low vs target high.
    L1H2,
    /// Source high vs target low.
    H1L2,
    /// Source high vs target high.
    H1H2,
    /// Source low vs source high.
    L1H1,
    /// Target low vs target high.
    L2H2,
}

impl ConstraintAttr {
    /// All attributes in wire-code order.
    pub const ALL: [ConstraintAttr; 18] = [
        Self::U1U2,
        Self::R1R2,
        Self::T1T2,
        Self::U1,
        Self::U2,
        Self::U3,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::T1,
        Self::T2,
        Self::T3,
        Self::L1L2,
        Self::L1H2,
        Self::H1L2,
        Self::H1H2,
        Self::L1H1,
        Self::L2H2,
    ];

    /// Whether the attribute compares MLS levels.
    pub fn is_mls(self) -> bool {
        matches!(
            self,
            Self::L1L2 | Self::L1H2 | Self::H1L2 | Self::H1H2 | Self::L1H1 | Self::L2H2
        )
    }

    /// Whether the attribute refers to the transition object context.
    pub fn is_object(self) -> bool {
        matches!(self, Self::U3 | Self::R3 | Self::T3)
    }

    /// Symbol table a name-set node for this attribute draws from.
    pub fn name_kind(self) -> Option<SymbolKind> {
        match self {
            Self::U1 | Self::U2 | Self::U3 => Some(SymbolKind::User),
            Self::R1 | Self::R2 | Self::R3 => Some(SymbolKind::Role),
            Self::T1 | Self::T2 | Self::T3 => Some(SymbolKind::Type),
            _ => None,
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintOp {
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
    /// Dominates.
    Dom,
    /// Dominated by.
    DomBy,
    /// Incomparable.
    Incomp,
}

impl ConstraintOp {
    /// All operators in wire-code order.
    pub const ALL: [ConstraintOp; 5] = [Self::Eq, Self::Neq, Self::Dom, Self::DomBy, Self::Incomp];
}

/// One RPN node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintNode {
    /// Logical not of the top operand.
    Not,
    /// Logical and of the top two operands.
    And,
    /// Logical or of the top two operands.
    Or,
    /// Compare two context fields.
    Attr {
        /// Field pair.
        attr: ConstraintAttr,
        /// Operator.
        op: ConstraintOp,
    },
    /// Compare one context field against a name set.
    Names {
        /// Field.
        attr: ConstraintAttr,
        /// `Eq` or `Neq`.
        op: ConstraintOp,
        /// Concrete names (bit `n` is value `n + 1`).
        names: Ebitmap,
        /// Type set as written, kept for type name nodes.
        type_names: Option<TypeSet>,
    },
}

/// A constraint on a subset of a class's permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraint {
    /// Permissions the constraint guards (zero for validatetrans).
    pub perms: u32,
    /// RPN expression.
    pub expr: Vec<ConstraintNode>,
}

impl Constraint {
    /// Check the RPN structure: every operator has its operands and exactly
    /// one value remains. Returns a description of the first problem.
    pub fn check_structure(&self) -> Result<(), String> {
        let mut depth: usize = 0;
        for (idx, node) in self.expr.iter().enumerate() {
            match node {
                ConstraintNode::Not => {
                    if depth < 1 {
                        return Err(format!("'not' without operand at node {idx}"));
                    }
                }
                ConstraintNode::And | ConstraintNode::Or => {
                    if depth < 2 {
                        return Err(format!("binary operator without operands at node {idx}"));
                    }
                    depth = depth.saturating_sub(1);
                }
                ConstraintNode::Attr { attr, op } => {
                    if attr.name_kind().is_some() {
                        return Err(format!("{attr:?} needs a name set at node {idx}"));
                    }
                    let ordering_op = matches!(
                        op,
                        ConstraintOp::Dom | ConstraintOp::DomBy | ConstraintOp::Incomp
                    );
                    if ordering_op && !(attr.is_mls() || *attr == ConstraintAttr::R1R2) {
                        return Err(format!("{op:?} not valid for {attr:?} at node {idx}"));
                    }
                    depth = depth.saturating_add(1);
                }
                ConstraintNode::Names { attr, op, .. } => {
                    if attr.name_kind().is_none() {
                        return Err(format!("{attr:?} cannot take a name set at node {idx}"));
                    }
                    if !matches!(op, ConstraintOp::Eq | ConstraintOp::Neq) {
                        return Err(format!("{op:?} not valid for a name set at node {idx}"));
                    }
                    depth = depth.saturating_add(1);
                }
            }
        }
        if depth == 1 {
            Ok(())
        } else {
            Err(format!("expression leaves {depth} operands"))
        }
    }

    /// Whether any node compares MLS levels.
    pub fn uses_mls(&self) -> bool {
        self.expr.iter().any(|node| match node {
            ConstraintNode::Attr { attr, .. } => attr.is_mls(),
            _ => false,
        })
    }

    /// Whether any node reads the transition object context.
    pub fn uses_object(&self) -> bool {
        self.expr.iter().any(|node| match node {
            ConstraintNode::Attr { attr, .. } | ConstraintNode::Names { attr, .. } => {
                attr.is_object()
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(attr: ConstraintAttr) -> ConstraintNode {
        ConstraintNode::Names {
            attr,
            op: ConstraintOp::Eq,
            names: Ebitmap::from_values([1]),
            type_names: None,
        }
    }

    #[test]
    fn well_formed_expression() {
        let constraint = Constraint {
            perms: 1,
            expr: vec![
                ConstraintNode::Attr {
                    attr: ConstraintAttr::U1U2,
                    op: ConstraintOp::Eq,
                },
                names(ConstraintAttr::T1),
                ConstraintNode::Or,
                ConstraintNode::Not,
            ],
        };
        assert_eq!(constraint.check_structure(), Ok(()));
        assert!(!constraint.uses_mls());
    }

    #[test]
    fn dangling_operator_rejected() {
        let constraint = Constraint {
            perms: 1,
            expr: vec![names(ConstraintAttr::T1), ConstraintNode::And],
        };
        assert!(constraint.check_structure().is_err());
    }

    #[test]
    fn leftover_operands_rejected() {
        let constraint = Constraint {
            perms: 1,
            expr: vec![names(ConstraintAttr::T1), names(ConstraintAttr::R2)],
        };
        assert!(constraint.check_structure().is_err());
    }

    #[test]
    fn dominance_only_on_roles_and_levels() {
        let on_users = Constraint {
            perms: 1,
            expr: vec![ConstraintNode::Attr {
                attr: ConstraintAttr::U1U2,
                op: ConstraintOp::Dom,
            }],
        };
        assert!(on_users.check_structure().is_err());

        let on_levels = Constraint {
            perms: 1,
            expr: vec![ConstraintNode::Attr {
                attr: ConstraintAttr::L1H2,
                op: ConstraintOp::DomBy,
            }],
        };
        assert_eq!(on_levels.check_structure(), Ok(()));
        assert!(on_levels.uses_mls());
    }
}
