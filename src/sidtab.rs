//! Initial SID table.

use std::collections::BTreeMap;

use crate::error::PolicyError;
use crate::policydb::{Context, PolicyDb};

/// Initial SID entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidEntry {
    /// SID name.
    pub name: String,
    /// Context assigned by the policy.
    pub context: Context,
}

/// Initial SIDs of a kernel policy, keyed by SID number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidTable {
    entries: BTreeMap<u32, SidEntry>,
}

impl SidTable {
    /// Build the table from a database's initial SID ocontexts.
    ///
    /// # Errors
    ///
    /// [`PolicyError::InvalidDeclaration`] for a duplicated SID number or a
    /// SID without a context.
    pub fn load(db: &PolicyDb) -> Result<Self, PolicyError> {
        let mut entries = BTreeMap::new();
        for isid in &db.ocontexts.isids {
            let Some(context) = &isid.context else {
                return Err(PolicyError::InvalidDeclaration(format!(
                    "initial sid {} has no context",
                    isid.name
                )));
            };
            let entry = SidEntry {
                name: isid.name.clone(),
                context: context.clone(),
            };
            if entries.insert(isid.sid, entry).is_some() {
                return Err(PolicyError::InvalidDeclaration(format!(
                    "initial sid {} declared twice",
                    isid.sid
                )));
            }
        }
        tracing::debug!(sids = entries.len(), "initial sid table loaded");
        Ok(Self { entries })
    }

    /// Context of a SID number.
    pub fn context(&self, sid: u32) -> Option<&Context> {
        self.entries.get(&sid).map(|e| &e.context)
    }

    /// SID number and context for a SID name.
    pub fn by_name(&self, name: &str) -> Option<(u32, &Context)> {
        self.entries
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(sid, e)| (*sid, &e.context))
    }

    /// Number of SIDs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in SID order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &SidEntry)> + '_ {
        self.entries.iter().map(|(sid, e)| (*sid, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> PolicyDb {
        let mut db = PolicyDb::base();
        db.declare_role("object_r").expect("role");
        db.declare_type("kernel_t").expect("type");
        db.add_role_types("object_r", &["kernel_t"])
            .expect("role types");
        db.declare_user("system_u", &["object_r"]).expect("user");
        db.declare_initial_sid(1, "kernel").expect("sid");
        db
    }

    #[test]
    fn missing_context_rejected() {
        assert!(matches!(
            SidTable::load(&db()),
            Err(PolicyError::InvalidDeclaration(_))
        ));
    }

    #[test]
    fn lookup_by_number_and_name() {
        let mut db = db();
        let ctx = db
            .context("system_u", "object_r", "kernel_t", None)
            .expect("context");
        db.set_initial_sid_context("kernel", ctx.clone())
            .expect("assign");
        let table = SidTable::load(&db).expect("load");
        assert_eq!(table.len(), 1);
        assert_eq!(table.context(1), Some(&ctx));
        assert_eq!(table.by_name("kernel"), Some((1, &ctx)));
        assert!(table.context(2).is_none());
    }
}
