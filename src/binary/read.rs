//! Policy decoder.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::PolicyError;
use crate::policydb::avtab::{FilenameTrans, RangeTrans, RoleAllow, RoleTrans};
use crate::policydb::constraint::{Constraint, ConstraintAttr, ConstraintNode, ConstraintOp};
use crate::policydb::context::{
    DeviceTreeCon, FsCon, FsUseBehavior, FsUseCon, GenfsCon, IbEndportCon, IbPkeyCon, InitialSid,
    IomemCon, IoportCon, NetifCon, Node6Con, NodeCon, PciDeviceCon, PirqCon, PortCon,
};
use crate::policydb::datum::{DefaultSide, ObjectDefaults, RoleFlavor, TypeFlavor};
use crate::policydb::rules::{
    CondExpr, CondExprNode, CondRule, RangeTransRule, Requires, RoleAllowRule, RoleSet,
    RoleTransRule,
};
use crate::policydb::{
    AvRule, AvRuleKind, AvtabEntry, AvtabKey, AvtabKind, BoolDatum, CatDatum, ClassDatum,
    ClassPerms, CommonDatum, CondNode, Context, Ebitmap, HandleUnknown, KernelRules, LevelDatum,
    MlsLevel, MlsRange, Ocontexts, PolicyDb, PolicyKind, RoleDatum, RuleBlock, RuleSet, Scope,
    SymbolTable, TargetPlatform, TypeDatum, TypeSet, UserDatum,
};
use crate::validate::validate;

use super::cursor::Cursor;
use super::{
    from_position_code, range_from_code, set_flag_from_code, side_from_code, Feature, Layout,
    OconKind, CEXPR_AND, CEXPR_ATTR, CEXPR_NAMES, CEXPR_NOT, CEXPR_OR, COND_AND, COND_BOOL,
    COND_EQ, COND_NEQ, COND_NOT, COND_OR, COND_XOR, CONFIG_ALLOW_UNKNOWN, CONFIG_MLS,
    CONFIG_REJECT_UNKNOWN, CONFIG_UNKNOWN_MASK, KERNEL_MAGIC, KIND_BASE, KIND_MODULE,
    MODULE_MAGIC, PROCESS_CLASS, SCOPE_DECLARED, SCOPE_REQUIRED,
};

/// Smallest encoding of a `u32`.
const WORD: usize = 4;
/// Smallest encoding of an ebitmap.
const EBITMAP_MIN: usize = 12;

/// Decode a policy produced by [`super::write_policy`] or a compatible
/// producer.
///
/// # Errors
///
/// [`PolicyError::MalformedInput`] for truncated, inconsistent or trailing
/// data, [`PolicyError::UnsupportedVersion`] for a version outside the
/// kind's range and [`PolicyError::UnsupportedFeature`] for a header that
/// enables something the version cannot carry.
pub fn read_policy(bytes: &[u8]) -> Result<PolicyDb, PolicyError> {
    let mut decoder = Decoder {
        cur: Cursor::new(bytes),
        layout: Layout {
            kind: PolicyKind::Kernel,
            version: 0,
        },
        process: None,
    };
    let db = decoder.policy()?;
    if !decoder.cur.is_at_end() {
        return Err(decoder
            .cur
            .malformed(format!("{} trailing bytes", decoder.cur.remaining())));
    }
    let end = decoder.cur.offset();
    validate(&db).map_err(|err| match err {
        PolicyError::InternalConsistency(detail) => PolicyError::malformed(end, detail),
        other => other,
    })?;
    tracing::debug!(
        kind = %db.kind,
        version = db.version,
        bytes = bytes.len(),
        "policy decoded"
    );
    Ok(db)
}

struct Decoder<'a> {
    cur: Cursor<'a>,
    layout: Layout,
    /// Value of the process class, implied by transitions of old layouts.
    process: Option<u32>,
}

impl Decoder<'_> {
    fn has(&self, feature: Feature) -> bool {
        self.layout.has(feature)
    }

    fn implied_process(&self) -> Result<u32, PolicyError> {
        self.process
            .ok_or_else(|| self.cur.malformed("transition without a class needs a process class"))
    }

    // ── Header and tables ───────────────────────────────────────

    fn policy(&mut self) -> Result<PolicyDb, PolicyError> {
        let magic = self.cur.u32()?;
        let family = match magic {
            KERNEL_MAGIC => PolicyKind::Kernel,
            MODULE_MAGIC => PolicyKind::Module,
            other => {
                return Err(PolicyError::malformed(
                    0,
                    format!("bad magic {other:#010x}"),
                ))
            }
        };
        let platform = self.cur.string()?;
        let target = TargetPlatform::from_platform_string(&platform)
            .ok_or_else(|| self.cur.malformed(format!("unknown platform {platform:?}")))?;
        let version = self.cur.u32()?;
        if !family.supports_version(version) {
            let (min, max) = family.version_range();
            return Err(PolicyError::UnsupportedVersion {
                kind: family,
                version,
                min,
                max,
            });
        }
        self.layout = Layout {
            kind: family,
            version,
        };

        let config = self.cur.u32()?;
        if config & !(CONFIG_MLS | CONFIG_UNKNOWN_MASK) != 0 {
            return Err(self.cur.malformed(format!("unknown config bits {config:#x}")));
        }
        let mls = config & CONFIG_MLS != 0;
        if mls && !self.has(Feature::Mls) {
            return Err(PolicyError::UnsupportedFeature {
                feature: Feature::Mls.name(),
                kind: family,
                version,
            });
        }
        let handle_unknown = match config & CONFIG_UNKNOWN_MASK {
            0 => HandleUnknown::Deny,
            CONFIG_REJECT_UNKNOWN => HandleUnknown::Reject,
            CONFIG_ALLOW_UNKNOWN => HandleUnknown::Allow,
            _ => return Err(self.cur.malformed("conflicting unknown-permission bits")),
        };

        let kind = if family == PolicyKind::Kernel {
            PolicyKind::Kernel
        } else {
            match self.cur.u32()? {
                KIND_BASE => PolicyKind::Base,
                KIND_MODULE => PolicyKind::Module,
                other => return Err(self.cur.malformed(format!("module kind {other}"))),
            }
        };
        self.layout.kind = kind;

        let mut db = PolicyDb::new(kind, target);
        db.version = version;
        db.mls = mls;
        db.handle_unknown = handle_unknown;
        if kind != PolicyKind::Kernel {
            db.name = self.cur.optional_string()?;
            db.module_version = self.cur.optional_string()?;
        }

        let sym_num = self.cur.u32()?;
        if sym_num != self.layout.sym_num() {
            return Err(self.cur.malformed(format!("symbol table count {sym_num}")));
        }
        let ocons = OconKind::present(target, self.layout);
        let ocon_num = self.cur.u32()?;
        if usize::try_from(ocon_num).ok() != Some(ocons.len()) {
            return Err(self.cur.malformed(format!("object context count {ocon_num}")));
        }

        if self.has(Feature::PolicyCaps) {
            db.policycaps = self.cur.ebitmap()?;
        }
        if self.has(Feature::Permissive) {
            db.permissive = self.cur.ebitmap()?;
        }

        self.table(&mut db.commons, Self::common)?;
        self.table(&mut db.classes, Self::class)?;
        self.process = db.classes.value_of(PROCESS_CLASS);
        self.table(&mut db.roles, Self::role)?;
        self.table(&mut db.types, Self::type_datum)?;
        self.table(&mut db.users, Self::user)?;
        if self.has(Feature::Booleans) {
            self.table(&mut db.bools, Self::boolean)?;
        }
        self.table(&mut db.sensitivities, Self::sensitivity)?;
        self.table(&mut db.categories, Self::category)?;

        if kind == PolicyKind::Kernel {
            db.kernel = self.kernel_rules(&mut db.ocontexts, target, mls)?;
        } else {
            let blocks = self.cur.count(WORD)?;
            if blocks == 0 {
                return Err(self.cur.malformed("module without a global block"));
            }
            db.global = self.block(mls)?;
            for _ in 1..blocks {
                let block = self.block(mls)?;
                db.optionals.push(block);
            }
            db.ocontexts = self.ocontexts(target, mls)?;
        }
        Ok(db)
    }

    fn table<D>(
        &mut self,
        table: &mut SymbolTable<D>,
        datum: impl Fn(&mut Self) -> Result<D, PolicyError>,
    ) -> Result<(), PolicyError> {
        let nprim = self.cur.u32()?;
        let count = self.cur.count(WORD)?;
        if usize::try_from(nprim).ok() != Some(count) {
            return Err(self
                .cur
                .malformed(format!("{} table holds {count} of {nprim} values", table.kind())));
        }
        for _ in 0..count {
            let name = self.cur.string()?;
            let value = self.cur.u32()?;
            let expected = table.nprim().saturating_add(1);
            if value != expected {
                return Err(self.cur.malformed(format!(
                    "{} {name} has value {value}, expected {expected}",
                    table.kind()
                )));
            }
            let scope = if self.layout.is_kernel() {
                Scope::Declared
            } else {
                match self.cur.u32()? {
                    SCOPE_DECLARED => Scope::Declared,
                    SCOPE_REQUIRED => Scope::Required,
                    other => return Err(self.cur.malformed(format!("scope code {other}"))),
                }
            };
            let payload = datum(self)?;
            table
                .insert(&name, scope, payload)
                .map_err(|err| self.cur.malformed(err.to_string()))?;
        }
        let aliases = self.cur.count(WORD)?;
        for _ in 0..aliases {
            let alias = self.cur.string()?;
            let value = self.cur.u32()?;
            table
                .add_alias(&alias, value)
                .map_err(|err| self.cur.malformed(err.to_string()))?;
        }
        Ok(())
    }

    // ── Symbol payloads ─────────────────────────────────────────

    fn strings(&mut self) -> Result<Vec<String>, PolicyError> {
        let count = self.cur.count(WORD)?;
        (0..count).map(|_| self.cur.string()).collect()
    }

    fn common(&mut self) -> Result<CommonDatum, PolicyError> {
        Ok(CommonDatum {
            perms: self.strings()?,
        })
    }

    fn class(&mut self) -> Result<ClassDatum, PolicyError> {
        let common = self.cur.optional()?;
        let perms = self.strings()?;
        let constraints = self.constraints()?;
        let validatetrans = if self.has(Feature::ValidateTrans) {
            self.constraints()?
        } else {
            Vec::new()
        };
        let mut defaults = ObjectDefaults::default();
        if self.has(Feature::ObjectDefaults) {
            defaults.user = self.side()?;
            defaults.role = self.side()?;
            let code = self.cur.u32()?;
            defaults.range = range_from_code(code)
                .ok_or_else(|| self.cur.malformed(format!("default range code {code}")))?;
        }
        if self.has(Feature::DefaultType) {
            defaults.type_ = self.side()?;
        }
        Ok(ClassDatum {
            common,
            perms,
            constraints,
            validatetrans,
            defaults,
        })
    }

    fn side(&mut self) -> Result<Option<DefaultSide>, PolicyError> {
        let code = self.cur.u32()?;
        side_from_code(code).ok_or_else(|| self.cur.malformed(format!("default side code {code}")))
    }

    fn attr_op(&mut self) -> Result<(ConstraintAttr, ConstraintOp), PolicyError> {
        let attr_code = self.cur.u32()?;
        let attr = from_position_code(&ConstraintAttr::ALL, attr_code)
            .ok_or_else(|| self.cur.malformed(format!("constraint attribute {attr_code}")))?;
        let op_code = self.cur.u32()?;
        let op = from_position_code(&ConstraintOp::ALL, op_code)
            .ok_or_else(|| self.cur.malformed(format!("constraint operator {op_code}")))?;
        Ok((attr, op))
    }

    fn constraints(&mut self) -> Result<Vec<Constraint>, PolicyError> {
        let count = self.cur.count(2 * WORD)?;
        let mut constraints = Vec::with_capacity(count);
        for _ in 0..count {
            let perms = self.cur.u32()?;
            let nodes = self.cur.count(WORD)?;
            let mut expr = Vec::with_capacity(nodes);
            for _ in 0..nodes {
                let node = match self.cur.u32()? {
                    CEXPR_NOT => ConstraintNode::Not,
                    CEXPR_AND => ConstraintNode::And,
                    CEXPR_OR => ConstraintNode::Or,
                    CEXPR_ATTR => {
                        let (attr, op) = self.attr_op()?;
                        ConstraintNode::Attr { attr, op }
                    }
                    CEXPR_NAMES => {
                        let (attr, op) = self.attr_op()?;
                        let names = self.cur.ebitmap()?;
                        let type_names =
                            if self.has(Feature::ConstraintTypeNames) && self.cur.flag()? {
                                Some(self.type_set()?)
                            } else {
                                None
                            };
                        ConstraintNode::Names {
                            attr,
                            op,
                            names,
                            type_names,
                        }
                    }
                    other => return Err(self.cur.malformed(format!("constraint node {other}"))),
                };
                expr.push(node);
            }
            constraints.push(Constraint { perms, expr });
        }
        Ok(constraints)
    }

    fn type_set(&mut self) -> Result<TypeSet, PolicyError> {
        let types = self.cur.ebitmap()?;
        let negset = self.cur.ebitmap()?;
        let code = self.cur.u32()?;
        let flag = set_flag_from_code(code)
            .ok_or_else(|| self.cur.malformed(format!("set flag {code}")))?;
        Ok(TypeSet {
            types,
            negset,
            flag,
        })
    }

    fn role_set(&mut self) -> Result<RoleSet, PolicyError> {
        let roles = self.cur.ebitmap()?;
        let code = self.cur.u32()?;
        let flag = set_flag_from_code(code)
            .ok_or_else(|| self.cur.malformed(format!("set flag {code}")))?;
        Ok(RoleSet { roles, flag })
    }

    fn bounds(&mut self) -> Result<Option<u32>, PolicyError> {
        if self.has(Feature::Bounds) {
            self.cur.optional()
        } else {
            Ok(None)
        }
    }

    fn type_datum(&mut self) -> Result<TypeDatum, PolicyError> {
        let flavor = if self.cur.flag()? {
            TypeFlavor::Attribute
        } else {
            TypeFlavor::Type
        };
        let bounds = self.bounds()?;
        let members = self.cur.ebitmap()?;
        Ok(TypeDatum {
            flavor,
            bounds,
            members,
        })
    }

    fn role(&mut self) -> Result<RoleDatum, PolicyError> {
        let (flavor, roles) = if self.has(Feature::RoleAttributes) {
            let flavor = if self.cur.flag()? {
                RoleFlavor::Attribute
            } else {
                RoleFlavor::Role
            };
            (flavor, self.cur.ebitmap()?)
        } else {
            (RoleFlavor::Role, Ebitmap::new())
        };
        let dominates = self.cur.ebitmap()?;
        let types = self.type_set()?;
        let bounds = self.bounds()?;
        Ok(RoleDatum {
            flavor,
            dominates,
            types,
            roles,
            bounds,
        })
    }

    fn user(&mut self) -> Result<UserDatum, PolicyError> {
        let roles = self.cur.ebitmap()?;
        let (range, default_level) = if self.has(Feature::Mls) {
            let range = if self.cur.flag()? {
                Some(self.range()?)
            } else {
                None
            };
            let level = if self.cur.flag()? {
                Some(self.level()?)
            } else {
                None
            };
            (range, level)
        } else {
            (None, None)
        };
        let bounds = self.bounds()?;
        Ok(UserDatum {
            roles,
            range,
            default_level,
            bounds,
        })
    }

    fn boolean(&mut self) -> Result<BoolDatum, PolicyError> {
        let state = self.cur.flag()?;
        let tunable = self.has(Feature::Tunables) && self.cur.flag()?;
        Ok(BoolDatum { state, tunable })
    }

    fn sensitivity(&mut self) -> Result<LevelDatum, PolicyError> {
        let cats = if self.cur.flag()? {
            Some(self.cur.ebitmap()?)
        } else {
            None
        };
        Ok(LevelDatum { cats })
    }

    fn category(&mut self) -> Result<CatDatum, PolicyError> {
        Ok(CatDatum)
    }

    fn level(&mut self) -> Result<MlsLevel, PolicyError> {
        let sens = self.cur.u32()?;
        let cats = self.cur.ebitmap()?;
        Ok(MlsLevel { sens, cats })
    }

    fn range(&mut self) -> Result<MlsRange, PolicyError> {
        let low = self.level()?;
        let high = self.level()?;
        Ok(MlsRange { low, high })
    }

    // ── Kernel rules ────────────────────────────────────────────

    fn entries(&mut self) -> Result<Vec<AvtabEntry>, PolicyError> {
        let count = self.cur.count(5 * WORD)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let source = self.cur.u32()?;
            let target = self.cur.u32()?;
            let class = self.cur.u32()?;
            let code = self.cur.u16()?;
            let kind = AvtabKind::from_code(code)
                .ok_or_else(|| self.cur.malformed(format!("avtab kind {code:#06x}")))?;
            let data = self.cur.u32()?;
            entries.push(AvtabEntry {
                key: AvtabKey {
                    source,
                    target,
                    class,
                    kind,
                },
                data,
            });
        }
        Ok(entries)
    }

    fn cond_expr(&mut self) -> Result<CondExpr, PolicyError> {
        let count = self.cur.count(WORD)?;
        let mut nodes = Vec::with_capacity(count);
        for _ in 0..count {
            let node = match self.cur.u32()? {
                COND_BOOL => CondExprNode::Bool(self.cur.u32()?),
                COND_NOT => CondExprNode::Not,
                COND_OR => CondExprNode::Or,
                COND_AND => CondExprNode::And,
                COND_XOR => CondExprNode::Xor,
                COND_EQ => CondExprNode::Eq,
                COND_NEQ => CondExprNode::Neq,
                other => return Err(self.cur.malformed(format!("conditional node {other}"))),
            };
            nodes.push(node);
        }
        Ok(CondExpr(nodes))
    }

    fn kernel_rules(
        &mut self,
        ocontexts: &mut Ocontexts,
        target: TargetPlatform,
        mls: bool,
    ) -> Result<KernelRules, PolicyError> {
        let mut rules = KernelRules {
            avtab: self.entries()?,
            ..KernelRules::default()
        };
        if self.has(Feature::Booleans) {
            let count = self.cur.count(3 * WORD)?;
            for _ in 0..count {
                let expr = self.cond_expr()?;
                let true_list = self.entries()?;
                let false_list = self.entries()?;
                rules.cond_list.push(CondNode {
                    expr,
                    true_list,
                    false_list,
                });
            }
        }

        let count = self.cur.count(3 * WORD)?;
        for _ in 0..count {
            let role = self.cur.u32()?;
            let type_ = self.cur.u32()?;
            let class = if self.has(Feature::RoleTransClass) {
                self.cur.u32()?
            } else {
                self.implied_process()?
            };
            let new_role = self.cur.u32()?;
            rules.role_trans.push(RoleTrans {
                role,
                type_,
                class,
                new_role,
            });
        }
        let count = self.cur.count(2 * WORD)?;
        for _ in 0..count {
            let role = self.cur.u32()?;
            let new_role = self.cur.u32()?;
            rules.role_allows.push(RoleAllow { role, new_role });
        }

        if self.has(Feature::FilenameTrans) {
            if self.has(Feature::FilenameTransGrouped) {
                self.grouped_filename_trans(&mut rules.filename_trans)?;
            } else {
                let count = self.cur.count(5 * WORD)?;
                for _ in 0..count {
                    let name = self.cur.string()?;
                    let source = self.cur.u32()?;
                    let target = self.cur.u32()?;
                    let class = self.cur.u32()?;
                    let result = self.cur.u32()?;
                    rules.filename_trans.push(FilenameTrans {
                        source,
                        target,
                        class,
                        name,
                        result,
                    });
                }
            }
        }

        *ocontexts = self.ocontexts(target, mls)?;

        if self.has(Feature::Mls) {
            let count = self.cur.count(2 * WORD)?;
            for _ in 0..count {
                let source = self.cur.u32()?;
                let target = self.cur.u32()?;
                let class = if self.has(Feature::RangeTransClass) {
                    self.cur.u32()?
                } else {
                    self.implied_process()?
                };
                let range = self.range()?;
                rules.range_trans.push(RangeTrans {
                    source,
                    target,
                    class,
                    range,
                });
            }
        }
        Ok(rules)
    }

    fn grouped_filename_trans(&mut self, out: &mut Vec<FilenameTrans>) -> Result<(), PolicyError> {
        let groups = self.cur.count(4 * WORD)?;
        for _ in 0..groups {
            let name = self.cur.string()?;
            let target = self.cur.u32()?;
            let class = self.cur.u32()?;
            let results = self.cur.count(WORD + EBITMAP_MIN)?;
            for _ in 0..results {
                let result = self.cur.u32()?;
                let sources = self.cur.ebitmap()?;
                if sources.is_empty() {
                    return Err(self.cur.malformed("filename transition without sources"));
                }
                out.extend(sources.values().map(|source| FilenameTrans {
                    source,
                    target,
                    class,
                    name: name.clone(),
                    result,
                }));
            }
        }
        out.sort();
        Ok(())
    }

    // ── Blocks ──────────────────────────────────────────────────

    fn block(&mut self, mls: bool) -> Result<RuleBlock, PolicyError> {
        let requires = self.requires()?;
        let rules = self.rule_set(mls)?;
        Ok(RuleBlock { requires, rules })
    }

    fn requires(&mut self) -> Result<Requires, PolicyError> {
        let mut req = Requires {
            classes: self.cur.ebitmap()?,
            roles: self.cur.ebitmap()?,
            types: self.cur.ebitmap()?,
            users: self.cur.ebitmap()?,
            bools: self.cur.ebitmap()?,
            sensitivities: self.cur.ebitmap()?,
            categories: self.cur.ebitmap()?,
            ..Requires::default()
        };
        let count = self.cur.count(2 * WORD)?;
        for _ in 0..count {
            let class = self.cur.u32()?;
            let mask = self.cur.u32()?;
            if req.class_perms.insert(class, mask).is_some() {
                return Err(self.cur.malformed(format!("class {class} required twice")));
            }
        }
        Ok(req)
    }

    fn av_rules(&mut self) -> Result<Vec<AvRule>, PolicyError> {
        let count = self.cur.count(3 * WORD + 2 * EBITMAP_MIN)?;
        let mut rules = Vec::with_capacity(count);
        for _ in 0..count {
            let code = self.cur.u16()?;
            let kind = AvRuleKind::from_code(code)
                .ok_or_else(|| self.cur.malformed(format!("rule kind {code:#06x}")))?;
            let source = self.type_set()?;
            let target = self.type_set()?;
            let self_target = self.cur.flag()?;
            if self_target && kind.is_type_rule() && !self.has(Feature::SelfTypeRule) {
                return Err(self.cur.malformed("self target in a type rule"));
            }
            let perm_count = self.cur.count(2 * WORD)?;
            let mut perms = Vec::with_capacity(perm_count);
            for _ in 0..perm_count {
                let class = self.cur.u32()?;
                let data = self.cur.u32()?;
                perms.push(ClassPerms { class, data });
            }
            let object_name = if self.has(Feature::FilenameTrans) && self.cur.flag()? {
                Some(self.cur.string()?)
            } else {
                None
            };
            rules.push(AvRule {
                kind,
                source,
                target,
                self_target,
                perms,
                object_name,
                line: 0,
            });
        }
        Ok(rules)
    }

    fn transition_classes(&mut self, feature: Feature) -> Result<Ebitmap, PolicyError> {
        if self.has(feature) {
            self.cur.ebitmap()
        } else {
            Ok(Ebitmap::from_values([self.implied_process()?]))
        }
    }

    fn rule_set(&mut self, mls: bool) -> Result<RuleSet, PolicyError> {
        let mut rules = RuleSet {
            avrules: self.av_rules()?,
            ..RuleSet::default()
        };

        let count = self.cur.count(WORD + 3 * EBITMAP_MIN)?;
        for _ in 0..count {
            let roles = self.role_set()?;
            let types = self.type_set()?;
            let classes = self.transition_classes(Feature::RoleTransClass)?;
            let new_role = self.cur.u32()?;
            rules.role_trans.push(RoleTransRule {
                roles,
                types,
                classes,
                new_role,
            });
        }

        let count = self.cur.count(2 * (WORD + EBITMAP_MIN))?;
        for _ in 0..count {
            let roles = self.role_set()?;
            let new_roles = self.role_set()?;
            rules.role_allows.push(RoleAllowRule { roles, new_roles });
        }

        if self.has(Feature::Mls) {
            let count = self.cur.count(4 * EBITMAP_MIN)?;
            if count > 0 && !mls {
                return Err(self.cur.malformed("range transitions in a non-MLS policy"));
            }
            for _ in 0..count {
                let source = self.type_set()?;
                let target = self.type_set()?;
                let classes = self.transition_classes(Feature::RangeTransClass)?;
                let range = self.range()?;
                rules.range_trans.push(RangeTransRule {
                    source,
                    target,
                    classes,
                    range,
                });
            }
        }

        let count = self.cur.count(3 * WORD)?;
        for _ in 0..count {
            let expr = self.cond_expr()?;
            let true_rules = self.av_rules()?;
            let false_rules = self.av_rules()?;
            rules.conditionals.push(CondRule {
                expr,
                true_rules,
                false_rules,
            });
        }
        Ok(rules)
    }

    // ── Object contexts ─────────────────────────────────────────

    fn context(&mut self, mls: bool) -> Result<Context, PolicyError> {
        let user = self.cur.u32()?;
        let role = self.cur.u32()?;
        let type_ = self.cur.u32()?;
        let range = if mls { Some(self.range()?) } else { None };
        Ok(Context {
            user,
            role,
            type_,
            range,
        })
    }

    fn ocontexts(&mut self, target: TargetPlatform, mls: bool) -> Result<Ocontexts, PolicyError> {
        let mut ocons = Ocontexts::default();
        for kind in OconKind::present(target, self.layout) {
            let count = self.cur.count(3 * WORD)?;
            for _ in 0..count {
                self.ocon_entry(&mut ocons, *kind, mls)?;
            }
        }
        let count = self.cur.count(6 * WORD)?;
        for _ in 0..count {
            let fstype = self.cur.string()?;
            let path = self.cur.string()?;
            let class = self.cur.optional()?;
            let context = self.context(mls)?;
            ocons.genfs.push(GenfsCon {
                fstype,
                path,
                class,
                context,
            });
        }
        Ok(ocons)
    }

    fn ocon_entry(
        &mut self,
        ocons: &mut Ocontexts,
        kind: OconKind,
        mls: bool,
    ) -> Result<(), PolicyError> {
        match kind {
            OconKind::Isid => {
                let sid = self.cur.u32()?;
                let name = self.cur.string()?;
                let context = if self.cur.flag()? {
                    Some(self.context(mls)?)
                } else {
                    None
                };
                ocons.isids.push(InitialSid { sid, name, context });
            }
            OconKind::Fs => {
                let name = self.cur.string()?;
                let fs_context = self.context(mls)?;
                let file_context = self.context(mls)?;
                ocons.fs.push(FsCon {
                    name,
                    fs_context,
                    file_context,
                });
            }
            OconKind::Port => {
                let protocol = self.cur.u8()?;
                let low = self.cur.u16()?;
                let high = self.cur.u16()?;
                let context = self.context(mls)?;
                ocons.ports.push(PortCon {
                    protocol,
                    low,
                    high,
                    context,
                });
            }
            OconKind::Netif => {
                let name = self.cur.string()?;
                let if_context = self.context(mls)?;
                let msg_context = self.context(mls)?;
                ocons.netifs.push(NetifCon {
                    name,
                    if_context,
                    msg_context,
                });
            }
            OconKind::Node => {
                let addr = Ipv4Addr::from(self.cur.u32()?);
                let mask = Ipv4Addr::from(self.cur.u32()?);
                let context = self.context(mls)?;
                ocons.nodes.push(NodeCon {
                    addr,
                    mask,
                    context,
                });
            }
            OconKind::FsUse => {
                let code = self.cur.u32()?;
                let behavior = FsUseBehavior::from_code(code)
                    .ok_or_else(|| self.cur.malformed(format!("fs_use behavior {code}")))?;
                let name = self.cur.string()?;
                let context = self.context(mls)?;
                ocons.fsuse.push(FsUseCon {
                    behavior,
                    name,
                    context,
                });
            }
            OconKind::Node6 => {
                let addr = Ipv6Addr::from(self.cur.bytes16()?);
                let mask = Ipv6Addr::from(self.cur.bytes16()?);
                let context = self.context(mls)?;
                ocons.nodes6.push(Node6Con {
                    addr,
                    mask,
                    context,
                });
            }
            OconKind::IbPkey => {
                let subnet_prefix = self.cur.u64()?;
                let low = self.cur.u16()?;
                let high = self.cur.u16()?;
                let context = self.context(mls)?;
                ocons.ibpkeys.push(IbPkeyCon {
                    subnet_prefix,
                    low,
                    high,
                    context,
                });
            }
            OconKind::IbEndport => {
                let device = self.cur.string()?;
                let port = self.cur.u8()?;
                let context = self.context(mls)?;
                ocons.ibendports.push(IbEndportCon {
                    device,
                    port,
                    context,
                });
            }
            OconKind::Pirq => {
                let pirq = self.cur.u32()?;
                let context = self.context(mls)?;
                ocons.pirqs.push(PirqCon { pirq, context });
            }
            OconKind::Ioport => {
                let low = self.cur.u32()?;
                let high = self.cur.u32()?;
                let context = self.context(mls)?;
                ocons.ioports.push(IoportCon { low, high, context });
            }
            OconKind::Iomem => {
                let low = self.cur.u64()?;
                let high = self.cur.u64()?;
                let context = self.context(mls)?;
                ocons.iomems.push(IomemCon { low, high, context });
            }
            OconKind::PciDevice => {
                let device = self.cur.u32()?;
                let context = self.context(mls)?;
                ocons.pcidevices.push(PciDeviceCon { device, context });
            }
            OconKind::DeviceTree => {
                let path = self.cur.string()?;
                let context = self.context(mls)?;
                ocons.devicetrees.push(DeviceTreeCon { path, context });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::write_policy;

    #[test]
    fn empty_base_round_trips() {
        let db = PolicyDb::base();
        let bytes = write_policy(&db).expect("write");
        assert_eq!(read_policy(&bytes).expect("read"), db);
    }

    #[test]
    fn bad_magic_rejected() {
        let err = read_policy(&[0, 0, 0, 0]).expect_err("magic");
        assert!(matches!(err, PolicyError::MalformedInput { offset: 0, .. }));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let mut bytes = write_policy(&PolicyDb::base()).expect("write");
        bytes.push(0);
        assert!(matches!(
            read_policy(&bytes),
            Err(PolicyError::MalformedInput { .. })
        ));
    }

    #[test]
    fn truncation_rejected_at_every_length() {
        let bytes = write_policy(&PolicyDb::base()).expect("write");
        for len in 0..bytes.len() {
            let prefix = bytes.get(..len).expect("prefix");
            assert!(
                read_policy(prefix).is_err(),
                "prefix of {len} bytes decoded"
            );
        }
    }

    #[test]
    fn unsupported_version_in_header() {
        let mut bytes = write_policy(&PolicyDb::base()).expect("write");
        // magic (4) + platform length (4) + "SE Linux" (8)
        bytes
            .get_mut(16..20)
            .expect("version field")
            .copy_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            read_policy(&bytes),
            Err(PolicyError::UnsupportedVersion { version: 99, .. })
        ));
    }
}
