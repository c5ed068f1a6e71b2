//! Canonical ordering of object contexts.
//!
//! Every category is sorted with a stable sort, so entries with equal keys
//! keep the order in which they were declared. Lookups take the first
//! matching entry, so ranged categories put narrower ranges first.

use std::cmp::Reverse;

use crate::policydb::PolicyDb;

/// Sort every ocontext category of `db` into its canonical order:
///
/// | category | key |
/// |---|---|
/// | initial SIDs | SID number |
/// | fs, netif, fs_use | name |
/// | port | range width, low, protocol |
/// | node, node6 | prefix length (longest first), address |
/// | ibpkey | range width, low, subnet prefix |
/// | ibendport | device, port |
/// | ioport, iomem | range width, low |
/// | pirq, pcidevice | value |
/// | devicetree | path |
/// | genfs | fstype, path, class |
pub fn sort_ocontexts(db: &mut PolicyDb) {
    let ocons = &mut db.ocontexts;
    ocons.isids.sort_by_key(|c| c.sid);
    ocons.fs.sort_by(|a, b| a.name.cmp(&b.name));
    ocons.netifs.sort_by(|a, b| a.name.cmp(&b.name));
    ocons.fsuse.sort_by(|a, b| a.name.cmp(&b.name));
    ocons
        .ports
        .sort_by_key(|c| (c.high.saturating_sub(c.low), c.low, c.protocol));
    ocons
        .nodes
        .sort_by_key(|c| (Reverse(u32::from(c.mask).count_ones()), u32::from(c.addr)));
    ocons
        .nodes6
        .sort_by_key(|c| (Reverse(u128::from(c.mask).count_ones()), u128::from(c.addr)));
    ocons
        .ibpkeys
        .sort_by_key(|c| (c.high.saturating_sub(c.low), c.low, c.subnet_prefix));
    ocons
        .ibendports
        .sort_by(|a, b| (&a.device, a.port).cmp(&(&b.device, b.port)));
    ocons
        .ioports
        .sort_by_key(|c| (c.high.saturating_sub(c.low), c.low));
    ocons
        .iomems
        .sort_by_key(|c| (c.high.saturating_sub(c.low), c.low));
    ocons.pirqs.sort_by_key(|c| c.pirq);
    ocons.pcidevices.sort_by_key(|c| c.device);
    ocons.devicetrees.sort_by(|a, b| a.path.cmp(&b.path));
    ocons
        .genfs
        .sort_by(|a, b| (&a.fstype, &a.path, a.class).cmp(&(&b.fstype, &b.path, b.class)));
    tracing::debug!(
        isids = ocons.isids.len(),
        genfs = ocons.genfs.len(),
        "ocontexts sorted"
    );
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::policydb::context::{IomemCon, NodeCon, PortCon};
    use crate::policydb::Context;

    fn ctx(type_: u32) -> Context {
        Context {
            user: 1,
            role: 1,
            type_,
            range: None,
        }
    }

    #[test]
    fn nodes_longest_prefix_first() {
        let mut db = PolicyDb::base();
        db.ocontexts.nodes = vec![
            NodeCon {
                addr: Ipv4Addr::new(10, 0, 0, 0),
                mask: Ipv4Addr::new(255, 0, 0, 0),
                context: ctx(1),
            },
            NodeCon {
                addr: Ipv4Addr::new(10, 1, 0, 0),
                mask: Ipv4Addr::new(255, 255, 0, 0),
                context: ctx(2),
            },
        ];
        sort_ocontexts(&mut db);
        let order: Vec<u32> = db.ocontexts.nodes.iter().map(|n| n.context.type_).collect();
        assert_eq!(order, vec![2, 1]);
    }

    #[test]
    fn equal_port_keys_keep_declaration_order() {
        let mut db = PolicyDb::base();
        let port = |low, type_| PortCon {
            protocol: 6,
            low,
            high: low,
            context: ctx(type_),
        };
        db.ocontexts.ports = vec![port(80, 1), port(22, 2), port(80, 3)];
        sort_ocontexts(&mut db);
        let order: Vec<u32> = db.ocontexts.ports.iter().map(|p| p.context.type_).collect();
        assert_eq!(order, vec![2, 1, 3]);
    }

    #[test]
    fn single_port_precedes_covering_range() {
        let mut db = PolicyDb::base();
        db.ocontexts.ports = vec![
            PortCon {
                protocol: 6,
                low: 1,
                high: 1023,
                context: ctx(1),
            },
            PortCon {
                protocol: 6,
                low: 80,
                high: 80,
                context: ctx(3),
            },
        ];
        sort_ocontexts(&mut db);
        let first = db
            .ocontexts
            .ports
            .iter()
            .find(|p| p.low <= 80 && 80 <= p.high)
            .map(|p| p.context.type_);
        assert_eq!(first, Some(3));
    }

    #[test]
    fn xen_ranges_narrowest_first() {
        let mut db = PolicyDb::base();
        db.ocontexts.iomems = vec![
            IomemCon {
                low: 0,
                high: 0xfff,
                context: ctx(1),
            },
            IomemCon {
                low: 0x10,
                high: 0x10,
                context: ctx(2),
            },
        ];
        sort_ocontexts(&mut db);
        let order: Vec<u32> = db
            .ocontexts
            .iomems
            .iter()
            .map(|m| m.context.type_)
            .collect();
        assert_eq!(order, vec![2, 1]);
    }
}
