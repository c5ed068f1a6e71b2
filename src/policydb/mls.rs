//! MLS levels and ranges.
//!
//! Sensitivities are ordered by value: the front end declares them in
//! dominance order, so a higher value dominates a lower one.

use super::ebitmap::Ebitmap;

/// A sensitivity plus a category set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MlsLevel {
    /// Sensitivity value.
    pub sens: u32,
    /// Category bits (bit `n` is category value `n + 1`).
    pub cats: Ebitmap,
}

impl MlsLevel {
    /// Level with the given sensitivity and category values.
    pub fn new(sens: u32, cats: impl IntoIterator<Item = u32>) -> Self {
        Self {
            sens,
            cats: Ebitmap::from_values(cats),
        }
    }

    /// Whether `self` dominates `other`.
    pub fn dominates(&self, other: &MlsLevel) -> bool {
        self.sens >= other.sens && other.cats.is_subset(&self.cats)
    }
}

/// A low/high level pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MlsRange {
    /// Low (current) level.
    pub low: MlsLevel,
    /// High (clearance) level.
    pub high: MlsLevel,
}

impl MlsRange {
    /// Range spanning a single level.
    pub fn single(level: MlsLevel) -> Self {
        Self {
            low: level.clone(),
            high: level,
        }
    }

    /// Whether high dominates low.
    pub fn is_well_formed(&self) -> bool {
        self.high.dominates(&self.low)
    }

    /// Whether `level` lies within the range.
    pub fn contains(&self, level: &MlsLevel) -> bool {
        level.dominates(&self.low) && self.high.dominates(level)
    }

    /// Whether `other` lies entirely within this range.
    pub fn covers(&self, other: &MlsRange) -> bool {
        self.contains(&other.low) && self.contains(&other.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominance_needs_sensitivity_and_categories() {
        let s1_c0 = MlsLevel::new(2, [1]);
        let s0 = MlsLevel::new(1, []);
        let s0_c1 = MlsLevel::new(1, [2]);
        assert!(s1_c0.dominates(&s0));
        assert!(!s0.dominates(&s1_c0));
        assert!(!s1_c0.dominates(&s0_c1));
    }

    #[test]
    fn ranges() {
        let range = MlsRange {
            low: MlsLevel::new(1, []),
            high: MlsLevel::new(3, [1, 2]),
        };
        assert!(range.is_well_formed());
        assert!(range.contains(&MlsLevel::new(2, [2])));
        assert!(!range.contains(&MlsLevel::new(4, [])));
        assert!(range.covers(&MlsRange::single(MlsLevel::new(2, [1]))));

        let inverted = MlsRange {
            low: range.high.clone(),
            high: range.low.clone(),
        };
        assert!(!inverted.is_well_formed());
    }
}
