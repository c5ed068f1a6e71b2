//! Policy encoder.

use std::collections::BTreeMap;

use crate::error::PolicyError;
use crate::policydb::avtab::KernelRules;
use crate::policydb::constraint::{Constraint, ConstraintAttr, ConstraintNode, ConstraintOp};
use crate::policydb::context::Ocontexts;
use crate::policydb::datum::{
    BoolDatum, CatDatum, ClassDatum, CommonDatum, DefaultRange, LevelDatum, RoleDatum, TypeDatum,
    UserDatum,
};
use crate::policydb::rules::{
    AvRule, CondExpr, CondExprNode, Requires, RoleSet, RuleBlock, RuleSet, TypeSet,
};
use crate::policydb::{
    AvtabEntry, Context, Ebitmap, HandleUnknown, MlsLevel, MlsRange, PolicyDb, PolicyKind, Scope,
    SymbolTable,
};
use crate::validate::validate;

use super::{
    position_code, range_code, set_flag_code, side_code, Feature, Layout, OconKind, CEXPR_AND,
    CEXPR_ATTR, CEXPR_NAMES, CEXPR_NOT, CEXPR_OR, COND_AND, COND_BOOL, COND_EQ, COND_NEQ,
    COND_NOT, COND_OR, COND_XOR, CONFIG_ALLOW_UNKNOWN, CONFIG_MLS, CONFIG_REJECT_UNKNOWN,
    KERNEL_MAGIC, KIND_BASE, KIND_MODULE, MAPSIZE, MODULE_MAGIC, PROCESS_CLASS, SCOPE_DECLARED,
    SCOPE_REQUIRED,
};

/// Encode `db` in the binary format of its kind and version.
///
/// The database is validated first, so anything written decodes again.
///
/// # Errors
///
/// [`PolicyError::UnsupportedVersion`] when the version is outside the
/// kind's range, [`PolicyError::UnsupportedFeature`] when the database uses
/// something its version cannot hold, and
/// [`PolicyError::InternalConsistency`] from validation.
pub fn write_policy(db: &PolicyDb) -> Result<Vec<u8>, PolicyError> {
    if !db.kind.supports_version(db.version) {
        let (min, max) = db.kind.version_range();
        return Err(PolicyError::UnsupportedVersion {
            kind: db.kind,
            version: db.version,
            min,
            max,
        });
    }
    validate(db)?;
    let mut encoder = Encoder {
        db,
        layout: Layout {
            kind: db.kind,
            version: db.version,
        },
        buf: Vec::new(),
    };
    encoder.policy()?;
    tracing::debug!(
        kind = %db.kind,
        version = db.version,
        bytes = encoder.buf.len(),
        "policy encoded"
    );
    Ok(encoder.buf)
}

struct Encoder<'a> {
    db: &'a PolicyDb,
    layout: Layout,
    buf: Vec<u8>,
}

impl Encoder<'_> {
    // ── Primitives ──────────────────────────────────────────────

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn flag(&mut self, value: bool) {
        self.u32(u32::from(value));
    }

    fn optional(&mut self, value: Option<u32>) {
        self.u32(value.unwrap_or(0));
    }

    fn len(&mut self, len: usize) -> Result<(), PolicyError> {
        let len = u32::try_from(len)
            .map_err(|_| PolicyError::internal(format!("{len} entries exceed the format")))?;
        self.u32(len);
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<(), PolicyError> {
        self.len(value.len())?;
        self.buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn ebitmap(&mut self, map: &Ebitmap) -> Result<(), PolicyError> {
        let nodes = map.nodes();
        self.u32(MAPSIZE);
        self.u32(map.node_high_bit());
        self.len(nodes.len())?;
        for (start, bits) in nodes {
            self.u32(start);
            self.u64(bits);
        }
        Ok(())
    }

    /// Whether the layout carries `feature`; an error when it does not but
    /// the database uses it.
    fn gate(&self, feature: Feature, used: bool) -> Result<bool, PolicyError> {
        if self.layout.has(feature) {
            Ok(true)
        } else if used {
            Err(PolicyError::UnsupportedFeature {
                feature: feature.name(),
                kind: self.layout.kind,
                version: self.layout.version,
            })
        } else {
            Ok(false)
        }
    }

    fn process_class(&self) -> Option<u32> {
        self.db.classes.value_of(PROCESS_CLASS)
    }

    // ── Header and tables ───────────────────────────────────────

    fn policy(&mut self) -> Result<(), PolicyError> {
        let db = self.db;
        let kernel = self.layout.is_kernel();
        self.u32(if kernel { KERNEL_MAGIC } else { MODULE_MAGIC });
        self.string(db.target.platform_string())?;
        self.u32(db.version);

        self.gate(Feature::Mls, db.mls)?;
        let mut config = if db.mls { CONFIG_MLS } else { 0 };
        config |= match db.handle_unknown {
            HandleUnknown::Deny => 0,
            HandleUnknown::Reject => CONFIG_REJECT_UNKNOWN,
            HandleUnknown::Allow => CONFIG_ALLOW_UNKNOWN,
        };
        self.u32(config);

        if !kernel {
            self.u32(if db.kind == PolicyKind::Base {
                KIND_BASE
            } else {
                KIND_MODULE
            });
            self.string(db.name.as_deref().unwrap_or(""))?;
            self.string(db.module_version.as_deref().unwrap_or(""))?;
        }

        let ocons = OconKind::present(db.target, self.layout);
        self.u32(self.layout.sym_num());
        self.len(ocons.len())?;

        if self.gate(Feature::PolicyCaps, !db.policycaps.is_empty())? {
            self.ebitmap(&db.policycaps)?;
        }
        if self.gate(Feature::Permissive, !db.permissive.is_empty())? {
            self.ebitmap(&db.permissive)?;
        }

        self.table(&db.commons, Self::common)?;
        self.table(&db.classes, Self::class)?;
        self.table(&db.roles, Self::role)?;
        self.table(&db.types, Self::type_datum)?;
        self.table(&db.users, Self::user)?;
        if self.gate(Feature::Booleans, !db.bools.is_empty())? {
            self.table(&db.bools, Self::boolean)?;
        }
        self.table(&db.sensitivities, Self::sensitivity)?;
        self.table(&db.categories, Self::category)?;

        if kernel {
            self.kernel_rules(&db.kernel)?;
        } else {
            self.len(db.optionals.len().saturating_add(1))?;
            self.block(&db.global)?;
            for block in &db.optionals {
                self.block(block)?;
            }
            self.ocontexts(&db.ocontexts)?;
        }
        Ok(())
    }

    fn table<D>(
        &mut self,
        table: &SymbolTable<D>,
        datum: impl Fn(&mut Self, &D) -> Result<(), PolicyError>,
    ) -> Result<(), PolicyError> {
        self.u32(table.nprim());
        self.len(table.len())?;
        for sym in table.iter() {
            self.string(&sym.name)?;
            self.u32(sym.value);
            if !self.layout.is_kernel() {
                self.u32(match sym.scope {
                    Scope::Declared => SCOPE_DECLARED,
                    Scope::Required => SCOPE_REQUIRED,
                });
            }
            datum(self, &sym.datum)?;
        }
        let aliases: Vec<(&str, u32)> = table.aliases().collect();
        self.len(aliases.len())?;
        for (alias, value) in aliases {
            self.string(alias)?;
            self.u32(value);
        }
        Ok(())
    }

    // ── Symbol payloads ─────────────────────────────────────────

    fn common(&mut self, datum: &CommonDatum) -> Result<(), PolicyError> {
        self.len(datum.perms.len())?;
        for perm in &datum.perms {
            self.string(perm)?;
        }
        Ok(())
    }

    fn class(&mut self, datum: &ClassDatum) -> Result<(), PolicyError> {
        self.optional(datum.common);
        self.len(datum.perms.len())?;
        for perm in &datum.perms {
            self.string(perm)?;
        }
        self.constraints(&datum.constraints)?;
        if self.gate(Feature::ValidateTrans, !datum.validatetrans.is_empty())? {
            self.constraints(&datum.validatetrans)?;
        }
        let defaults = &datum.defaults;
        let uses_defaults =
            defaults.user.is_some() || defaults.role.is_some() || defaults.range.is_some();
        if self.gate(Feature::ObjectDefaults, uses_defaults)? {
            self.gate(
                Feature::Glblub,
                defaults.range == Some(DefaultRange::Glblub),
            )?;
            self.u32(side_code(defaults.user));
            self.u32(side_code(defaults.role));
            self.u32(range_code(defaults.range));
        }
        if self.gate(Feature::DefaultType, defaults.type_.is_some())? {
            self.u32(side_code(defaults.type_));
        }
        Ok(())
    }

    fn constraints(&mut self, constraints: &[Constraint]) -> Result<(), PolicyError> {
        self.len(constraints.len())?;
        for constraint in constraints {
            self.u32(constraint.perms);
            self.len(constraint.expr.len())?;
            for node in &constraint.expr {
                match node {
                    ConstraintNode::Not => self.u32(CEXPR_NOT),
                    ConstraintNode::And => self.u32(CEXPR_AND),
                    ConstraintNode::Or => self.u32(CEXPR_OR),
                    ConstraintNode::Attr { attr, op } => {
                        self.u32(CEXPR_ATTR);
                        self.u32(position_code(&ConstraintAttr::ALL, attr));
                        self.u32(position_code(&ConstraintOp::ALL, op));
                    }
                    ConstraintNode::Names {
                        attr,
                        op,
                        names,
                        type_names,
                    } => {
                        self.u32(CEXPR_NAMES);
                        self.u32(position_code(&ConstraintAttr::ALL, attr));
                        self.u32(position_code(&ConstraintOp::ALL, op));
                        self.ebitmap(names)?;
                        if self.gate(Feature::ConstraintTypeNames, type_names.is_some())? {
                            self.flag(type_names.is_some());
                            if let Some(set) = type_names {
                                self.type_set(set)?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn type_set(&mut self, set: &TypeSet) -> Result<(), PolicyError> {
        self.ebitmap(&set.types)?;
        self.ebitmap(&set.negset)?;
        self.u32(set_flag_code(set.flag));
        Ok(())
    }

    fn role_set(&mut self, set: &RoleSet) -> Result<(), PolicyError> {
        self.ebitmap(&set.roles)?;
        self.u32(set_flag_code(set.flag));
        Ok(())
    }

    fn type_datum(&mut self, datum: &TypeDatum) -> Result<(), PolicyError> {
        self.flag(datum.is_attribute());
        if self.gate(Feature::Bounds, datum.bounds.is_some())? {
            self.optional(datum.bounds);
        }
        self.ebitmap(&datum.members)
    }

    fn role(&mut self, datum: &RoleDatum) -> Result<(), PolicyError> {
        let uses_attributes = datum.is_attribute() || !datum.roles.is_empty();
        if self.gate(Feature::RoleAttributes, uses_attributes)? {
            self.flag(datum.is_attribute());
            self.ebitmap(&datum.roles)?;
        }
        self.ebitmap(&datum.dominates)?;
        self.type_set(&datum.types)?;
        if self.gate(Feature::Bounds, datum.bounds.is_some())? {
            self.optional(datum.bounds);
        }
        Ok(())
    }

    fn user(&mut self, datum: &UserDatum) -> Result<(), PolicyError> {
        self.ebitmap(&datum.roles)?;
        let uses_mls = datum.range.is_some() || datum.default_level.is_some();
        if self.gate(Feature::Mls, uses_mls)? {
            self.flag(datum.range.is_some());
            if let Some(range) = &datum.range {
                self.range(range)?;
            }
            self.flag(datum.default_level.is_some());
            if let Some(level) = &datum.default_level {
                self.level(level)?;
            }
        }
        if self.gate(Feature::Bounds, datum.bounds.is_some())? {
            self.optional(datum.bounds);
        }
        Ok(())
    }

    fn boolean(&mut self, datum: &BoolDatum) -> Result<(), PolicyError> {
        self.flag(datum.state);
        if self.gate(Feature::Tunables, datum.tunable)? {
            self.flag(datum.tunable);
        }
        Ok(())
    }

    fn sensitivity(&mut self, datum: &LevelDatum) -> Result<(), PolicyError> {
        self.flag(datum.cats.is_some());
        if let Some(cats) = &datum.cats {
            self.ebitmap(cats)?;
        }
        Ok(())
    }

    fn category(&mut self, _datum: &CatDatum) -> Result<(), PolicyError> {
        Ok(())
    }

    fn level(&mut self, level: &MlsLevel) -> Result<(), PolicyError> {
        self.u32(level.sens);
        self.ebitmap(&level.cats)
    }

    fn range(&mut self, range: &MlsRange) -> Result<(), PolicyError> {
        self.level(&range.low)?;
        self.level(&range.high)
    }

    // ── Kernel rules ────────────────────────────────────────────

    fn entries(&mut self, entries: &[AvtabEntry]) -> Result<(), PolicyError> {
        self.len(entries.len())?;
        for entry in entries {
            self.u32(entry.key.source);
            self.u32(entry.key.target);
            self.u32(entry.key.class);
            self.u32(u32::from(entry.key.kind.code()));
            self.u32(entry.data);
        }
        Ok(())
    }

    fn cond_expr(&mut self, expr: &CondExpr) -> Result<(), PolicyError> {
        self.len(expr.0.len())?;
        for node in &expr.0 {
            match node {
                CondExprNode::Bool(value) => {
                    self.u32(COND_BOOL);
                    self.u32(*value);
                }
                CondExprNode::Not => self.u32(COND_NOT),
                CondExprNode::Or => self.u32(COND_OR),
                CondExprNode::And => self.u32(COND_AND),
                CondExprNode::Xor => self.u32(COND_XOR),
                CondExprNode::Eq => self.u32(COND_EQ),
                CondExprNode::Neq => self.u32(COND_NEQ),
            }
        }
        Ok(())
    }

    /// Class field of a transition, or `None` when the layout predates it
    /// and the class is the implied process class.
    fn transition_class(&self, feature: Feature, class: u32) -> Result<Option<u32>, PolicyError> {
        let implied = self.process_class() == Some(class);
        Ok(self.gate(feature, !implied)?.then_some(class))
    }

    fn kernel_rules(&mut self, rules: &KernelRules) -> Result<(), PolicyError> {
        self.entries(&rules.avtab)?;
        if self.gate(Feature::Booleans, !rules.cond_list.is_empty())? {
            self.len(rules.cond_list.len())?;
            for node in &rules.cond_list {
                self.cond_expr(&node.expr)?;
                self.entries(&node.true_list)?;
                self.entries(&node.false_list)?;
            }
        }

        self.len(rules.role_trans.len())?;
        for rt in &rules.role_trans {
            self.u32(rt.role);
            self.u32(rt.type_);
            if let Some(class) = self.transition_class(Feature::RoleTransClass, rt.class)? {
                self.u32(class);
            }
            self.u32(rt.new_role);
        }
        self.len(rules.role_allows.len())?;
        for ra in &rules.role_allows {
            self.u32(ra.role);
            self.u32(ra.new_role);
        }

        if self.gate(Feature::FilenameTrans, !rules.filename_trans.is_empty())? {
            if self.layout.has(Feature::FilenameTransGrouped) {
                self.grouped_filename_trans(rules)?;
            } else {
                self.len(rules.filename_trans.len())?;
                for ft in &rules.filename_trans {
                    self.string(&ft.name)?;
                    self.u32(ft.source);
                    self.u32(ft.target);
                    self.u32(ft.class);
                    self.u32(ft.result);
                }
            }
        }

        let db = self.db;
        self.ocontexts(&db.ocontexts)?;

        if self.gate(Feature::Mls, !rules.range_trans.is_empty())? {
            self.len(rules.range_trans.len())?;
            for rt in &rules.range_trans {
                self.u32(rt.source);
                self.u32(rt.target);
                if let Some(class) = self.transition_class(Feature::RangeTransClass, rt.class)? {
                    self.u32(class);
                }
                self.range(&rt.range)?;
            }
        }
        Ok(())
    }

    /// Filename transitions grouped by (target, class, name), each result
    /// carrying a bitmap of its source types. Decoding yields the sorted
    /// flat list, so the list must already be in that order.
    fn grouped_filename_trans(&mut self, rules: &KernelRules) -> Result<(), PolicyError> {
        let sorted = rules.filename_trans.windows(2).all(|pair| match pair {
            [a, b] => a < b,
            _ => true,
        });
        if !sorted {
            return Err(PolicyError::internal(
                "filename transitions are not in canonical order",
            ));
        }
        let mut groups: BTreeMap<(u32, u32, &str), BTreeMap<u32, Ebitmap>> = BTreeMap::new();
        for ft in &rules.filename_trans {
            groups
                .entry((ft.target, ft.class, ft.name.as_str()))
                .or_default()
                .entry(ft.result)
                .or_default()
                .insert_value(ft.source);
        }
        self.len(groups.len())?;
        for ((target, class, name), results) in groups {
            self.string(name)?;
            self.u32(target);
            self.u32(class);
            self.len(results.len())?;
            for (result, sources) in results {
                self.u32(result);
                self.ebitmap(&sources)?;
            }
        }
        Ok(())
    }

    // ── Blocks ──────────────────────────────────────────────────

    fn block(&mut self, block: &RuleBlock) -> Result<(), PolicyError> {
        self.requires(&block.requires)?;
        self.rule_set(&block.rules)
    }

    fn requires(&mut self, req: &Requires) -> Result<(), PolicyError> {
        self.ebitmap(&req.classes)?;
        self.ebitmap(&req.roles)?;
        self.ebitmap(&req.types)?;
        self.ebitmap(&req.users)?;
        self.ebitmap(&req.bools)?;
        self.ebitmap(&req.sensitivities)?;
        self.ebitmap(&req.categories)?;
        self.len(req.class_perms.len())?;
        for (class, mask) in &req.class_perms {
            self.u32(*class);
            self.u32(*mask);
        }
        Ok(())
    }

    fn av_rules(&mut self, rules: &[AvRule]) -> Result<(), PolicyError> {
        self.len(rules.len())?;
        for rule in rules {
            self.u32(u32::from(rule.kind.code()));
            self.type_set(&rule.source)?;
            self.type_set(&rule.target)?;
            self.gate(
                Feature::SelfTypeRule,
                rule.self_target && rule.kind.is_type_rule(),
            )?;
            self.flag(rule.self_target);
            self.len(rule.perms.len())?;
            for cp in &rule.perms {
                self.u32(cp.class);
                self.u32(cp.data);
            }
            if self.gate(Feature::FilenameTrans, rule.object_name.is_some())? {
                self.flag(rule.object_name.is_some());
                if let Some(name) = &rule.object_name {
                    self.string(name)?;
                }
            }
        }
        Ok(())
    }

    /// Class bitmap of a block transition rule, or `None` when the layout
    /// predates it and the classes are exactly the process class.
    fn transition_classes(&self, feature: Feature, classes: &Ebitmap) -> Result<bool, PolicyError> {
        let implied = match self.process_class() {
            Some(process) => classes.len() == 1 && classes.contains_value(process),
            None => false,
        };
        self.gate(feature, !implied)
    }

    fn rule_set(&mut self, rules: &RuleSet) -> Result<(), PolicyError> {
        self.av_rules(&rules.avrules)?;

        self.len(rules.role_trans.len())?;
        for rule in &rules.role_trans {
            self.role_set(&rule.roles)?;
            self.type_set(&rule.types)?;
            if self.transition_classes(Feature::RoleTransClass, &rule.classes)? {
                self.ebitmap(&rule.classes)?;
            }
            self.u32(rule.new_role);
        }

        self.len(rules.role_allows.len())?;
        for rule in &rules.role_allows {
            self.role_set(&rule.roles)?;
            self.role_set(&rule.new_roles)?;
        }

        if self.gate(Feature::Mls, !rules.range_trans.is_empty())? {
            self.len(rules.range_trans.len())?;
            for rule in &rules.range_trans {
                self.type_set(&rule.source)?;
                self.type_set(&rule.target)?;
                if self.transition_classes(Feature::RangeTransClass, &rule.classes)? {
                    self.ebitmap(&rule.classes)?;
                }
                self.range(&rule.range)?;
            }
        }

        self.len(rules.conditionals.len())?;
        for cond in &rules.conditionals {
            self.cond_expr(&cond.expr)?;
            self.av_rules(&cond.true_rules)?;
            self.av_rules(&cond.false_rules)?;
        }
        Ok(())
    }

    // ── Object contexts ─────────────────────────────────────────

    fn context(&mut self, ctx: &Context) -> Result<(), PolicyError> {
        self.u32(ctx.user);
        self.u32(ctx.role);
        self.u32(ctx.type_);
        match (&ctx.range, self.db.mls) {
            (Some(range), true) => self.range(range),
            (None, false) => Ok(()),
            _ => Err(PolicyError::internal("context range does not match the MLS setting")),
        }
    }

    fn ocontexts(&mut self, ocons: &Ocontexts) -> Result<(), PolicyError> {
        let present = OconKind::present(self.db.target, self.layout);
        for kind in OconKind::all(self.db.target) {
            if !present.contains(kind) && ocon_len(ocons, *kind) > 0 {
                let feature = kind.feature().unwrap_or(Feature::Ipv6);
                self.gate(feature, true)?;
            }
        }
        for kind in present {
            self.ocon_category(ocons, *kind)?;
        }
        self.len(ocons.genfs.len())?;
        for genfs in &ocons.genfs {
            self.string(&genfs.fstype)?;
            self.string(&genfs.path)?;
            self.optional(genfs.class);
            self.context(&genfs.context)?;
        }
        Ok(())
    }

    fn ocon_category(&mut self, ocons: &Ocontexts, kind: OconKind) -> Result<(), PolicyError> {
        self.len(ocon_len(ocons, kind))?;
        match kind {
            OconKind::Isid => {
                for isid in &ocons.isids {
                    self.u32(isid.sid);
                    self.string(&isid.name)?;
                    self.flag(isid.context.is_some());
                    if let Some(ctx) = &isid.context {
                        self.context(ctx)?;
                    }
                }
            }
            OconKind::Fs => {
                for fs in &ocons.fs {
                    self.string(&fs.name)?;
                    self.context(&fs.fs_context)?;
                    self.context(&fs.file_context)?;
                }
            }
            OconKind::Port => {
                for port in &ocons.ports {
                    self.u32(u32::from(port.protocol));
                    self.u32(u32::from(port.low));
                    self.u32(u32::from(port.high));
                    self.context(&port.context)?;
                }
            }
            OconKind::Netif => {
                for netif in &ocons.netifs {
                    self.string(&netif.name)?;
                    self.context(&netif.if_context)?;
                    self.context(&netif.msg_context)?;
                }
            }
            OconKind::Node => {
                for node in &ocons.nodes {
                    self.u32(u32::from(node.addr));
                    self.u32(u32::from(node.mask));
                    self.context(&node.context)?;
                }
            }
            OconKind::FsUse => {
                for fsuse in &ocons.fsuse {
                    self.u32(fsuse.behavior.code());
                    self.string(&fsuse.name)?;
                    self.context(&fsuse.context)?;
                }
            }
            OconKind::Node6 => {
                for node in &ocons.nodes6 {
                    self.buf.extend_from_slice(&node.addr.octets());
                    self.buf.extend_from_slice(&node.mask.octets());
                    self.context(&node.context)?;
                }
            }
            OconKind::IbPkey => {
                for pkey in &ocons.ibpkeys {
                    self.u64(pkey.subnet_prefix);
                    self.u32(u32::from(pkey.low));
                    self.u32(u32::from(pkey.high));
                    self.context(&pkey.context)?;
                }
            }
            OconKind::IbEndport => {
                for endport in &ocons.ibendports {
                    self.string(&endport.device)?;
                    self.u32(u32::from(endport.port));
                    self.context(&endport.context)?;
                }
            }
            OconKind::Pirq => {
                for pirq in &ocons.pirqs {
                    self.u32(pirq.pirq);
                    self.context(&pirq.context)?;
                }
            }
            OconKind::Ioport => {
                for ioport in &ocons.ioports {
                    self.u32(ioport.low);
                    self.u32(ioport.high);
                    self.context(&ioport.context)?;
                }
            }
            OconKind::Iomem => {
                for iomem in &ocons.iomems {
                    self.u64(iomem.low);
                    self.u64(iomem.high);
                    self.context(&iomem.context)?;
                }
            }
            OconKind::PciDevice => {
                for dev in &ocons.pcidevices {
                    self.u32(dev.device);
                    self.context(&dev.context)?;
                }
            }
            OconKind::DeviceTree => {
                for dt in &ocons.devicetrees {
                    self.string(&dt.path)?;
                    self.context(&dt.context)?;
                }
            }
        }
        Ok(())
    }
}

fn ocon_len(ocons: &Ocontexts, kind: OconKind) -> usize {
    match kind {
        OconKind::Isid => ocons.isids.len(),
        OconKind::Fs => ocons.fs.len(),
        OconKind::Port => ocons.ports.len(),
        OconKind::Netif => ocons.netifs.len(),
        OconKind::Node => ocons.nodes.len(),
        OconKind::FsUse => ocons.fsuse.len(),
        OconKind::Node6 => ocons.nodes6.len(),
        OconKind::IbPkey => ocons.ibpkeys.len(),
        OconKind::IbEndport => ocons.ibendports.len(),
        OconKind::Pirq => ocons.pirqs.len(),
        OconKind::Ioport => ocons.ioports.len(),
        OconKind::Iomem => ocons.iomems.len(),
        OconKind::PciDevice => ocons.pcidevices.len(),
        OconKind::DeviceTree => ocons.devicetrees.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let bytes = write_policy(&PolicyDb::base()).expect("write");
        assert_eq!(bytes.get(..4), Some(&MODULE_MAGIC.to_le_bytes()[..]));
        assert_eq!(bytes.get(4..8), Some(&8u32.to_le_bytes()[..]));
        assert_eq!(bytes.get(8..16), Some(&b"SE Linux"[..]));
    }

    #[test]
    fn feature_below_its_version_rejected() {
        let mut db = PolicyDb::module("m", "1");
        db.version = 13;
        db.declare_tunable("t", true).expect("tunable");
        assert_eq!(
            write_policy(&db).err(),
            Some(PolicyError::UnsupportedFeature {
                feature: "tunables",
                kind: PolicyKind::Module,
                version: 13,
            })
        );
    }

    #[test]
    fn version_outside_range_rejected() {
        let mut db = PolicyDb::base();
        db.version = 3;
        assert!(matches!(
            write_policy(&db),
            Err(PolicyError::UnsupportedVersion { .. })
        ));
    }
}
