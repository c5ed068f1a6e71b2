//! Typed symbol tables.
//!
//! One [`SymbolTable`] per category maps names to dense 1-based values and
//! values to datums. Values are assigned in insertion order and never reused,
//! so `entries[value - 1]` always holds the symbol with that value.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::PolicyError;

/// Symbol category, used for diagnostics and requirement bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    /// Common permission set.
    Common,
    /// Object class.
    Class,
    /// Permission of a class or common.
    Permission,
    /// Role or role attribute.
    Role,
    /// Concrete type.
    Type,
    /// Type attribute.
    Attribute,
    /// User.
    User,
    /// Boolean or tunable.
    Bool,
    /// MLS sensitivity.
    Sensitivity,
    /// MLS category.
    Category,
    /// Initial SID.
    InitialSid,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Common => "common",
            Self::Class => "class",
            Self::Permission => "permission",
            Self::Role => "role",
            Self::Type => "type",
            Self::Attribute => "attribute",
            Self::User => "user",
            Self::Bool => "boolean",
            Self::Sensitivity => "sensitivity",
            Self::Category => "category",
            Self::InitialSid => "initial sid",
        };
        f.write_str(label)
    }
}

/// Whether a symbol is declared by the owning database or only required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Declared here.
    Declared,
    /// Required from another module.
    Required,
}

/// A named entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol<D> {
    /// Primary name.
    pub name: String,
    /// Dense 1-based value.
    pub value: u32,
    /// Declare/require scope.
    pub scope: Scope,
    /// Category-specific payload.
    pub datum: D,
}

/// Name → value → datum registry for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTable<D> {
    kind: SymbolKind,
    entries: Vec<Symbol<D>>,
    index: BTreeMap<String, u32>,
    aliases: BTreeMap<String, u32>,
}

impl<D> SymbolTable<D> {
    /// Create an empty table for `kind`.
    pub fn new(kind: SymbolKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
            index: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Category of this table.
    pub fn kind(&self) -> SymbolKind {
        self.kind
    }

    /// Number of primary entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of primary entries as a symbol value bound.
    pub fn nprim(&self) -> u32 {
        u32::try_from(self.entries.len()).unwrap_or(u32::MAX)
    }

    /// Whether `value` names an entry.
    pub fn contains_value(&self, value: u32) -> bool {
        value >= 1 && value <= self.nprim()
    }

    /// Append a new entry. Fails if the name (or an alias of it) exists.
    pub fn insert(&mut self, name: &str, scope: Scope, datum: D) -> Result<u32, PolicyError> {
        if self.index.contains_key(name) || self.aliases.contains_key(name) {
            return Err(PolicyError::ConflictingDeclaration {
                kind: self.kind,
                name: name.to_owned(),
                detail: "name already in use".to_owned(),
            });
        }
        let value = self.nprim().checked_add(1).ok_or_else(|| {
            PolicyError::InvalidDeclaration(format!("too many {} symbols", self.kind))
        })?;
        self.index.insert(name.to_owned(), value);
        self.entries.push(Symbol {
            name: name.to_owned(),
            value,
            scope,
            datum,
        });
        Ok(value)
    }

    /// Declare `name`. A prior requirement of the same name is upgraded in
    /// place and its datum replaced; a prior declaration is a conflict.
    pub fn declare(&mut self, name: &str, datum: D) -> Result<u32, PolicyError> {
        let kind = self.kind;
        match self.get_mut(name) {
            Some(sym) if sym.scope == Scope::Required => {
                sym.scope = Scope::Declared;
                sym.datum = datum;
                Ok(sym.value)
            }
            Some(_) => Err(PolicyError::ConflictingDeclaration {
                kind,
                name: name.to_owned(),
                detail: "declared more than once".to_owned(),
            }),
            None => self.insert(name, Scope::Declared, datum),
        }
    }

    /// Require `name`, creating a placeholder if it is unknown.
    pub fn require(&mut self, name: &str, datum: D) -> Result<u32, PolicyError> {
        match self.value_of(name) {
            Some(value) => Ok(value),
            None => self.insert(name, Scope::Required, datum),
        }
    }

    /// Add `alias` as another name for `value`.
    pub fn add_alias(&mut self, alias: &str, value: u32) -> Result<(), PolicyError> {
        if !self.contains_value(value) {
            return Err(PolicyError::internal(format!(
                "alias {alias} targets missing {} value {value}",
                self.kind
            )));
        }
        if self.index.contains_key(alias) || self.aliases.contains_key(alias) {
            return Err(PolicyError::ConflictingDeclaration {
                kind: self.kind,
                name: alias.to_owned(),
                detail: "alias name already in use".to_owned(),
            });
        }
        self.aliases.insert(alias.to_owned(), value);
        Ok(())
    }

    /// Aliases in name order.
    pub fn aliases(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.aliases
            .iter()
            .map(|(name, value)| (name.as_str(), *value))
    }

    /// Value for a primary name or alias.
    pub fn value_of(&self, name: &str) -> Option<u32> {
        self.index
            .get(name)
            .or_else(|| self.aliases.get(name))
            .copied()
    }

    /// Entry for a primary name or alias.
    pub fn get(&self, name: &str) -> Option<&Symbol<D>> {
        self.value_of(name).and_then(|value| self.by_value(value))
    }

    /// Mutable entry for a primary name or alias.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Symbol<D>> {
        let value = self.value_of(name)?;
        self.by_value_mut(value)
    }

    /// Entry with the given value.
    pub fn by_value(&self, value: u32) -> Option<&Symbol<D>> {
        let idx = usize::try_from(value.checked_sub(1)?).ok()?;
        self.entries.get(idx)
    }

    /// Mutable entry with the given value.
    pub fn by_value_mut(&mut self, value: u32) -> Option<&mut Symbol<D>> {
        let idx = usize::try_from(value.checked_sub(1)?).ok()?;
        self.entries.get_mut(idx)
    }

    /// Primary name for a value.
    pub fn name_of(&self, value: u32) -> Option<&str> {
        self.by_value(value).map(|sym| sym.name.as_str())
    }

    /// Entries in value order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol<D>> + '_ {
        self.entries.iter()
    }

    /// Mutable entries in value order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Symbol<D>> + '_ {
        self.entries.iter_mut()
    }

    /// Rebuild the table keeping entries accepted by `keep`, renumbered
    /// densely in their original order. Aliases of dropped entries go too.
    pub fn retain_renumbered(self, keep: impl Fn(&Symbol<D>) -> bool) -> (Self, ValueMap) {
        let mut map = ValueMap::with_len(self.entries.len());
        let mut out = SymbolTable::new(self.kind);
        for sym in self.entries {
            if !keep(&sym) {
                continue;
            }
            let old = sym.value;
            let value = out.nprim().saturating_add(1);
            map.set(old, value);
            out.index.insert(sym.name.clone(), value);
            out.entries.push(Symbol { value, ..sym });
        }
        for (alias, old) in self.aliases {
            if let Some(value) = map.get(old) {
                out.aliases.insert(alias, value);
            }
        }
        (out, map)
    }
}

/// Old value → new value translation produced by renumbering or linking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueMap {
    map: Vec<Option<u32>>,
}

impl ValueMap {
    /// A map with `len` unmapped slots.
    pub fn with_len(len: usize) -> Self {
        Self {
            map: vec![None; len],
        }
    }

    /// The identity map over `1..=len`.
    pub fn identity(len: usize) -> Self {
        let map = (1..=len).map(|value| u32::try_from(value).ok()).collect();
        Self { map }
    }

    /// Record `old → new`, growing the map as needed.
    pub fn set(&mut self, old: u32, new: u32) {
        let Some(idx) = old.checked_sub(1).and_then(|i| usize::try_from(i).ok()) else {
            return;
        };
        if self.map.len() <= idx {
            self.map.resize(idx.saturating_add(1), None);
        }
        self.map[idx] = Some(new);
    }

    /// Translate a value.
    pub fn get(&self, old: u32) -> Option<u32> {
        let idx = usize::try_from(old.checked_sub(1)?).ok()?;
        self.map.get(idx).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_dense_and_one_based() {
        let mut table: SymbolTable<()> = SymbolTable::new(SymbolKind::Type);
        assert_eq!(table.declare("a", ()), Ok(1));
        assert_eq!(table.declare("b", ()), Ok(2));
        assert_eq!(table.name_of(2), Some("b"));
        assert!(table.contains_value(2));
        assert!(!table.contains_value(0));
        assert!(!table.contains_value(3));
    }

    #[test]
    fn declare_upgrades_requirement() {
        let mut table: SymbolTable<u8> = SymbolTable::new(SymbolKind::Role);
        let value = table.require("r", 0).expect("require");
        assert_eq!(table.get("r").map(|s| s.scope), Some(Scope::Required));
        assert_eq!(table.declare("r", 7), Ok(value));
        let sym = table.get("r").expect("declared");
        assert_eq!(sym.scope, Scope::Declared);
        assert_eq!(sym.datum, 7);
        assert!(matches!(
            table.declare("r", 1),
            Err(PolicyError::ConflictingDeclaration { .. })
        ));
    }

    #[test]
    fn aliases_resolve_and_conflict() {
        let mut table: SymbolTable<()> = SymbolTable::new(SymbolKind::Type);
        let t = table.declare("t", ()).expect("declare");
        table.add_alias("t_alias", t).expect("alias");
        assert_eq!(table.value_of("t_alias"), Some(t));
        assert!(table.declare("t_alias", ()).is_err());
        assert!(table.add_alias("t", t).is_err());
    }

    #[test]
    fn retain_renumbers_densely() {
        let mut table: SymbolTable<bool> = SymbolTable::new(SymbolKind::Bool);
        table.declare("a", true).expect("a");
        table.declare("b", false).expect("b");
        table.declare("c", true).expect("c");
        table.add_alias("c_alias", 3).expect("alias");
        let (kept, map) = table.retain_renumbered(|sym| sym.datum);
        assert_eq!(kept.len(), 2);
        assert_eq!(map.get(1), Some(1));
        assert_eq!(map.get(2), None);
        assert_eq!(map.get(3), Some(2));
        assert_eq!(kept.value_of("c_alias"), Some(2));
        assert_eq!(kept.by_value(2).map(|s| s.name.as_str()), Some("c"));
    }
}
