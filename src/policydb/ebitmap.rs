//! Extensible bitmaps: sparse sets of zero-based bit positions.
//!
//! Bit `n` stands for the symbol whose value is `n + 1`. The `*_value`
//! helpers do that translation so callers can work in symbol values.

use std::collections::BTreeSet;

/// Width of one serialized bitmap node.
pub const NODE_BITS: u32 = 64;

const NODE_MASK: u32 = 63;

/// Sparse ordered bitmap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ebitmap {
    bits: BTreeSet<u32>,
}

impl Ebitmap {
    /// Create an empty bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a bitmap from 1-based symbol values. Value 0 is ignored.
    pub fn from_values(values: impl IntoIterator<Item = u32>) -> Self {
        let mut map = Self::new();
        for value in values {
            map.insert_value(value);
        }
        map
    }

    /// Set a bit.
    pub fn set(&mut self, bit: u32) {
        self.bits.insert(bit);
    }

    /// Clear a bit, returning whether it was set.
    pub fn remove(&mut self, bit: u32) -> bool {
        self.bits.remove(&bit)
    }

    /// Whether a bit is set.
    pub fn contains(&self, bit: u32) -> bool {
        self.bits.contains(&bit)
    }

    /// Set the bit for a 1-based symbol value.
    pub fn insert_value(&mut self, value: u32) {
        if let Some(bit) = value.checked_sub(1) {
            self.bits.insert(bit);
        }
    }

    /// Whether the bit for a 1-based symbol value is set.
    pub fn contains_value(&self, value: u32) -> bool {
        value
            .checked_sub(1)
            .is_some_and(|bit| self.bits.contains(&bit))
    }

    /// Iterate set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter().copied()
    }

    /// Iterate the 1-based symbol values of set bits in ascending order.
    pub fn values(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter().map(|bit| bit.saturating_add(1))
    }

    /// Number of set bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Whether no bit is set.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Highest set bit, if any.
    pub fn highest_bit(&self) -> Option<u32> {
        self.bits.iter().next_back().copied()
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &Ebitmap) {
        self.bits.extend(other.bits.iter().copied());
    }

    /// Union of two bitmaps.
    pub fn union(&self, other: &Ebitmap) -> Ebitmap {
        Ebitmap {
            bits: self.bits.union(&other.bits).copied().collect(),
        }
    }

    /// Intersection of two bitmaps.
    pub fn intersection(&self, other: &Ebitmap) -> Ebitmap {
        Ebitmap {
            bits: self.bits.intersection(&other.bits).copied().collect(),
        }
    }

    /// Bits set in `self` but not in `other`.
    pub fn difference(&self, other: &Ebitmap) -> Ebitmap {
        Ebitmap {
            bits: self.bits.difference(&other.bits).copied().collect(),
        }
    }

    /// Whether any bit is set in both.
    pub fn intersects(&self, other: &Ebitmap) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.bits.iter().any(|bit| large.bits.contains(bit))
    }

    /// Whether every bit of `self` is also set in `other`.
    pub fn is_subset(&self, other: &Ebitmap) -> bool {
        self.bits.is_subset(&other.bits)
    }

    /// Split into 64-bit nodes `(start_bit, map)` in ascending order.
    pub fn nodes(&self) -> Vec<(u32, u64)> {
        let mut nodes: Vec<(u32, u64)> = Vec::new();
        for bit in self.iter() {
            let start = bit & !NODE_MASK;
            let mask = 1u64.checked_shl(bit & NODE_MASK).unwrap_or(0);
            match nodes.last_mut() {
                Some((last_start, map)) if *last_start == start => *map |= mask,
                _ => nodes.push((start, mask)),
            }
        }
        nodes
    }

    /// One past the last bit covered by the final node (0 when empty).
    pub fn node_high_bit(&self) -> u32 {
        self.highest_bit()
            .map(|bit| (bit & !NODE_MASK).saturating_add(NODE_BITS))
            .unwrap_or(0)
    }

    /// Rebuild a bitmap from a node.
    pub fn set_node(&mut self, start: u32, map: u64) {
        for offset in 0..NODE_BITS {
            if map & 1u64.checked_shl(offset).unwrap_or(0) != 0 {
                self.bits.insert(start.saturating_add(offset));
            }
        }
    }
}

impl FromIterator<u32> for Ebitmap {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Ebitmap {
            bits: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_one_based() {
        let map = Ebitmap::from_values([1, 3, 0]);
        assert!(map.contains(0));
        assert!(map.contains(2));
        assert!(map.contains_value(3));
        assert!(!map.contains_value(0));
        assert_eq!(map.values().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn nodes_group_by_sixty_four() {
        let map: Ebitmap = [0, 5, 63, 64, 130].into_iter().collect();
        let nodes = map.nodes();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], (0u32, 1u64 | (1u64 << 5) | (1u64 << 63)));
        assert_eq!(nodes[1], (64u32, 1u64));
        assert_eq!(nodes[2], (128u32, 1u64 << 2));
        assert_eq!(map.node_high_bit(), 192);

        let mut rebuilt = Ebitmap::new();
        for (start, bits) in nodes {
            rebuilt.set_node(start, bits);
        }
        assert_eq!(rebuilt, map);
    }

    #[test]
    fn set_algebra() {
        let a: Ebitmap = [1, 2, 3].into_iter().collect();
        let b: Ebitmap = [3, 4].into_iter().collect();
        assert!(a.intersects(&b));
        assert_eq!(a.intersection(&b).iter().collect::<Vec<_>>(), vec![3]);
        assert_eq!(a.difference(&b).iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(a.union(&b).len(), 4);
        assert!(!a.is_subset(&b));
        assert!(Ebitmap::new().is_subset(&a));
        assert_eq!(Ebitmap::new().node_high_bit(), 0);
    }
}
