//! Shared policy fixtures for integration tests.

#![allow(dead_code)]

use macpol::policydb::context::PortCon;
use macpol::policydb::rules::{CondExpr, CondRule};
use macpol::policydb::{AvRule, AvRuleKind, BlockRef, PolicyDb, TypeSet};
use macpol::{CompiledPolicy, Compiler, CompilerConfig};

/// Base with `file` and `process` classes, types `t1`..`t3`, role
/// `system_r` authorized for them, user `system_u` and the `kernel` SID.
pub fn base() -> PolicyDb {
    let mut db = PolicyDb::base();
    db.name = Some("base".to_owned());
    db.declare_class("file", None, &["read", "write", "getattr"])
        .expect("file");
    db.declare_class("process", None, &["transition", "signal"])
        .expect("process");
    for t in ["t1", "t2", "t3"] {
        db.declare_type(t).expect("type");
    }
    db.declare_role("object_r").expect("object_r");
    db.declare_role("system_r").expect("system_r");
    db.add_role_types("system_r", &["t1", "t2", "t3"])
        .expect("role types");
    db.declare_user("system_u", &["system_r"]).expect("user");
    db.declare_initial_sid(1, "kernel").expect("sid");
    let ctx = db
        .context("system_u", "system_r", "t1", None)
        .expect("context");
    db.set_initial_sid_context("kernel", ctx)
        .expect("sid context");
    db
}

/// `base()` plus `allow t1 t1:file read`.
pub fn scenario_a() -> PolicyDb {
    let mut db = base();
    db.allow("t1", "t1", "file", &["read"]).expect("allow");
    db
}

/// A richer base touching booleans, aliases, type transitions, filename
/// transitions and port contexts.
pub fn rich_base() -> PolicyDb {
    let mut db = scenario_a();
    db.declare_attribute("domain").expect("attribute");
    db.add_to_attribute("domain", "t1").expect("member");
    db.add_to_attribute("domain", "t2").expect("member");
    db.add_type_alias("t3", "t3_alias").expect("alias");
    db.allow("domain", "t3", "file", &["read", "getattr"])
        .expect("allow");
    db.allow("t2", "self", "process", &["signal"])
        .expect("self");
    db.type_transition("t1", "t3", "file", "t2", None)
        .expect("type_transition");
    db.type_transition("t2", "t3", "file", "t1", Some("config"))
        .expect("filename transition");

    let b = db.declare_bool("allow_write", false).expect("bool");
    let rule = CondRule {
        expr: CondExpr::boolean(b),
        true_rules: vec![AvRule::new(
            AvRuleKind::Allow,
            db.type_set(&["t1"]).expect("set"),
            db.type_set(&["t3"]).expect("set"),
            vec![db.class_perms("file", &["write"]).expect("perms")],
        )],
        false_rules: Vec::new(),
    };
    db.add_conditional(BlockRef::Global, rule)
        .expect("conditional");

    let ctx = db
        .context("system_u", "object_r", "t3", None)
        .expect("context");
    for (low, high) in [(80, 80), (1, 1023), (443, 443)] {
        db.ocontexts.ports.push(PortCon {
            protocol: 6,
            low,
            high,
            context: ctx.clone(),
        });
    }
    db
}

/// Module requiring `file:read` and type `t1`, adding `t4` with access to it.
pub fn module() -> PolicyDb {
    let mut db = PolicyDb::module("extra", "1.0");
    db.require_class(BlockRef::Global, "file", &["read"])
        .expect("class");
    db.require_type(BlockRef::Global, "t1").expect("t1");
    db.declare_type("t4").expect("t4");
    db.allow("t4", "t1", "file", &["read"]).expect("allow");
    db
}

/// Type set of the named types.
pub fn types(db: &PolicyDb, names: &[&str]) -> TypeSet {
    db.type_set(names).expect("type set")
}

/// Compile with the default configuration.
pub fn compile(base: PolicyDb, modules: Vec<PolicyDb>) -> CompiledPolicy {
    Compiler::new(CompilerConfig::default())
        .compile(base, modules)
        .expect("compile")
}

/// Compile targeting kernel `version`.
pub fn compile_version(base: PolicyDb, version: u32) -> CompiledPolicy {
    let mut config = CompilerConfig::default();
    config.policy.version = version;
    Compiler::new(config)
        .compile(base, Vec::new())
        .expect("compile")
}
