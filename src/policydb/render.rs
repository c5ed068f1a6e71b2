//! Policy-language rendering of values, used in diagnostics.

use super::avtab::{AvtabEntry, AvtabKey};
use super::ebitmap::Ebitmap;
use super::symtab::SymbolTable;
use super::PolicyDb;

fn name_or_value<D>(table: &SymbolTable<D>, value: u32) -> String {
    match table.name_of(value) {
        Some(name) => name.to_owned(),
        None => format!("{}#{value}", table.kind()),
    }
}

impl PolicyDb {
    /// Name of a type value.
    pub fn type_name(&self, value: u32) -> String {
        name_or_value(&self.types, value)
    }

    /// Name of a class value.
    pub fn class_name(&self, value: u32) -> String {
        name_or_value(&self.classes, value)
    }

    /// Name of a role value.
    pub fn role_name(&self, value: u32) -> String {
        name_or_value(&self.roles, value)
    }

    /// Name of a user value.
    pub fn user_name(&self, value: u32) -> String {
        name_or_value(&self.users, value)
    }

    /// Permission names of `mask` within `class`, in bit order.
    pub fn perm_names(&self, class: u32, mask: u32) -> Vec<String> {
        let perms = self.class_permissions(class).unwrap_or_default();
        (0..32u32)
            .filter(|bit| mask & 1u32.checked_shl(*bit).unwrap_or(0) != 0)
            .map(|bit| {
                usize::try_from(bit)
                    .ok()
                    .and_then(|idx| perms.get(idx))
                    .map_or_else(
                        || format!("0x{:x}", 1u32.checked_shl(bit).unwrap_or(0)),
                        |p| (*p).to_owned(),
                    )
            })
            .collect()
    }

    /// `{ a b c }` for a set of type bits.
    pub fn describe_types(&self, types: &Ebitmap) -> String {
        let names: Vec<String> = types.values().map(|v| self.type_name(v)).collect();
        match names.as_slice() {
            [single] => single.clone(),
            _ => format!("{{ {} }}", names.join(" ")),
        }
    }

    /// `source target:class` for an access-vector key.
    pub fn describe_key(&self, key: &AvtabKey) -> String {
        format!(
            "{} {}:{}",
            self.type_name(key.source),
            self.type_name(key.target),
            self.class_name(key.class)
        )
    }

    /// Rule form of an access-vector entry, e.g. `allow t1 t1:file { read }`.
    pub fn describe_entry(&self, entry: &AvtabEntry) -> String {
        let keyword = entry.key.kind.rule_kind().keyword();
        let key = self.describe_key(&entry.key);
        if entry.key.kind.is_type_rule() {
            format!("{keyword} {key} {}", self.type_name(entry.data))
        } else {
            format!(
                "{keyword} {key} {{ {} }}",
                self.perm_names(entry.key.class, entry.data).join(" ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policydb::avtab::AvtabKind;

    #[test]
    fn renders_allow_entry() {
        let mut db = PolicyDb::base();
        db.declare_class("file", None, &["read", "write"])
            .expect("class");
        db.declare_type("t1").expect("t1");
        let entry = AvtabEntry {
            key: AvtabKey {
                source: 1,
                target: 1,
                class: 1,
                kind: AvtabKind::Allowed,
            },
            data: 0b01,
        };
        assert_eq!(db.describe_entry(&entry), "allow t1 t1:file { read }");
    }

    #[test]
    fn unknown_values_are_numbered() {
        let db = PolicyDb::base();
        assert_eq!(db.type_name(9), "type#9");
        assert_eq!(db.perm_names(1, 0b100), vec!["0x4".to_owned()]);
    }
}
