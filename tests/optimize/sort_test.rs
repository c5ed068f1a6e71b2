//! Tests for canonical ocontext ordering.

use macpol::policydb::context::{GenfsCon, PortCon};
use macpol::sort::sort_ocontexts;

use crate::fixtures;

#[test]
fn compiled_ports_put_narrow_ranges_first() {
    let compiled = fixtures::compile(fixtures::rich_base(), Vec::new());
    let ranges: Vec<(u16, u16)> = compiled
        .db
        .ocontexts
        .ports
        .iter()
        .map(|p| (p.low, p.high))
        .collect();
    assert_eq!(ranges, vec![(80, 80), (443, 443), (1, 1023)]);
}

#[test]
fn first_matching_port_keeps_the_specific_context() {
    let mut db = fixtures::scenario_a();
    let t3 = db
        .context("system_u", "object_r", "t3", None)
        .expect("context");
    let t1 = db
        .context("system_u", "object_r", "t1", None)
        .expect("context");
    db.ocontexts.ports.push(PortCon {
        protocol: 6,
        low: 1,
        high: 1023,
        context: t1,
    });
    db.ocontexts.ports.push(PortCon {
        protocol: 6,
        low: 80,
        high: 80,
        context: t3.clone(),
    });
    let compiled = fixtures::compile(db, Vec::new());
    let hit = compiled
        .db
        .ocontexts
        .ports
        .iter()
        .find(|p| p.protocol == 6 && p.low <= 80 && 80 <= p.high)
        .expect("port 80");
    assert_eq!(hit.context, t3);
}

#[test]
fn genfs_sorted_by_fstype_then_path() {
    let mut db = fixtures::base();
    let ctx = db
        .context("system_u", "object_r", "t3", None)
        .expect("context");
    let genfs = |fstype: &str, path: &str| GenfsCon {
        fstype: fstype.to_owned(),
        path: path.to_owned(),
        class: None,
        context: ctx.clone(),
    };
    db.ocontexts.genfs = vec![genfs("sysfs", "/"), genfs("proc", "/sys"), genfs("proc", "/")];
    sort_ocontexts(&mut db);
    let order: Vec<(&str, &str)> = db
        .ocontexts
        .genfs
        .iter()
        .map(|g| (g.fstype.as_str(), g.path.as_str()))
        .collect();
    assert_eq!(order, vec![("proc", "/"), ("proc", "/sys"), ("sysfs", "/")]);
}

#[test]
fn sorting_twice_is_stable() {
    let mut db = fixtures::rich_base();
    sort_ocontexts(&mut db);
    let once = db.ocontexts.clone();
    sort_ocontexts(&mut db);
    assert_eq!(db.ocontexts, once);
}
