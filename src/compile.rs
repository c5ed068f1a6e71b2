//! Compile driver.
//!
//! Runs the whole pipeline over a base database and its modules:
//! declaration checks, link, expand, assertion and hierarchy checks, initial
//! SID load, optimization, ocontext ordering and final validation. Every
//! stage owns the database it is handed; the first error ends the run and
//! nothing partial is returned.

use crate::assertion::check_assertions;
use crate::binary::write_policy;
use crate::config::CompilerConfig;
use crate::error::PolicyError;
use crate::expand::{expand, ExpandOptions};
use crate::hierarchy;
use crate::link::link;
use crate::optimize::optimize;
use crate::policydb::{PolicyDb, PolicyKind};
use crate::sidtab::SidTable;
use crate::sort::sort_ocontexts;
use crate::validate::{validate, validate_with, ValidateOptions};

/// Counters gathered during one compilation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    /// Modules linked into the base.
    pub modules_linked: usize,
    /// Table entries produced by expansion.
    pub expanded_rules: usize,
    /// Never-allow assertions checked.
    pub assertions_checked: usize,
    /// Entries folded away by the optimizer.
    pub rules_merged: usize,
}

/// Output of a successful compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPolicy {
    /// Final database: a kernel policy, or the module itself when a lone
    /// module was compiled.
    pub db: PolicyDb,
    /// Initial SID table of a kernel policy (empty for modules).
    pub sidtab: SidTable,
    /// Pipeline counters.
    pub stats: CompileStats,
}

impl CompiledPolicy {
    /// Serialize the compiled database.
    ///
    /// # Errors
    ///
    /// See [`write_policy`].
    pub fn to_bytes(&self) -> Result<Vec<u8>, PolicyError> {
        write_policy(&self.db)
    }
}

/// Policy compiler bound to one configuration.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    /// Create a compiler.
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Empty database of `kind` carrying the configured MLS setting and
    /// target platform.
    pub fn new_database(&self, kind: PolicyKind) -> PolicyDb {
        let mut db = PolicyDb::new(kind, self.config.policy.target);
        db.mls = self.config.policy.mls;
        if kind == PolicyKind::Kernel {
            db.version = self.config.policy.version;
        }
        db
    }

    /// Compile `base` with `modules` into a kernel policy.
    ///
    /// A lone module (no further modules) is checked, ordered and validated
    /// but stays a module.
    ///
    /// # Errors
    ///
    /// The first [`PolicyError`] raised by any stage.
    pub fn compile(
        &self,
        mut base: PolicyDb,
        modules: Vec<PolicyDb>,
    ) -> Result<CompiledPolicy, PolicyError> {
        base.check_declarations()?;
        for module in &modules {
            module.check_declarations()?;
        }
        match base.kind {
            PolicyKind::Module => {
                if !modules.is_empty() {
                    return Err(PolicyError::InvalidDeclaration(format!(
                        "{} is a module; modules link into a base policy",
                        base.display_name()
                    )));
                }
                return self.compile_module(base);
            }
            PolicyKind::Kernel => {
                return Err(PolicyError::InvalidDeclaration(
                    "a kernel policy is already compiled".to_owned(),
                ));
            }
            PolicyKind::Base => {}
        }

        if let Some(handle_unknown) = self.config.policy.handle_unknown {
            base.handle_unknown = handle_unknown;
        }
        let name = base.display_name();
        let mut stats = CompileStats {
            modules_linked: modules.len(),
            ..CompileStats::default()
        };

        let linked = link(base, modules)?;

        let options = ExpandOptions {
            max_expanded_rules: self.config.limits.max_expanded_rules,
            policy_version: self.config.policy.version,
        };
        let expanded = expand(linked, &options)?;
        stats.expanded_rules = expanded.expanded_rules;
        let mut db = expanded.db;

        if self.config.checks.assertions {
            check_assertions(&db, &expanded.assertions)?;
            stats.assertions_checked = expanded.assertions.len();
        } else {
            tracing::debug!(
                skipped = expanded.assertions.len(),
                "assertion checks disabled"
            );
        }
        if self.config.checks.hierarchy {
            hierarchy::check(&db)?;
        } else {
            tracing::debug!("hierarchy checks disabled");
        }

        let sidtab = SidTable::load(&db)?;
        let optimized = optimize(&mut db)?;
        stats.rules_merged = optimized.merged;
        sort_ocontexts(&mut db);

        validate_with(
            &db,
            &ValidateOptions {
                required_initial_sids: self.config.sids.required.clone(),
            },
        )?;

        tracing::info!(
            policy = %name,
            version = db.version,
            modules = stats.modules_linked,
            rules = db.kernel.avtab.len(),
            expanded = stats.expanded_rules,
            merged = stats.rules_merged,
            assertions = stats.assertions_checked,
            sids = sidtab.len(),
            "policy compiled"
        );
        Ok(CompiledPolicy { db, sidtab, stats })
    }

    fn compile_module(&self, mut db: PolicyDb) -> Result<CompiledPolicy, PolicyError> {
        if let Some(handle_unknown) = self.config.policy.handle_unknown {
            db.handle_unknown = handle_unknown;
        }
        sort_ocontexts(&mut db);
        validate(&db)?;
        tracing::info!(module = %db.display_name(), version = db.version, "module compiled");
        Ok(CompiledPolicy {
            db,
            sidtab: SidTable::default(),
            stats: CompileStats::default(),
        })
    }
}
