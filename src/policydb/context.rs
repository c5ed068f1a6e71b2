//! Security contexts and object contexts (ocontexts).

use std::net::{Ipv4Addr, Ipv6Addr};

use super::mls::MlsRange;

/// `user:role:type[:range]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Context {
    /// User value.
    pub user: u32,
    /// Role value.
    pub role: u32,
    /// Type value.
    pub type_: u32,
    /// MLS range, present exactly when the policy is MLS.
    pub range: Option<MlsRange>,
}

/// Initial SID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialSid {
    /// SID number.
    pub sid: u32,
    /// SID name.
    pub name: String,
    /// Assigned context; `None` until the policy assigns one.
    pub context: Option<Context>,
}

/// `fs_use_*` labeling behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FsUseBehavior {
    /// Extended attributes.
    Xattr,
    /// Transition from the creating task.
    Trans,
    /// Label from the creating task.
    Task,
}

impl FsUseBehavior {
    /// Wire code.
    pub fn code(self) -> u32 {
        match self {
            Self::Xattr => 1,
            Self::Trans => 2,
            Self::Task => 3,
        }
    }

    /// Behavior for a wire code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Xattr),
            2 => Some(Self::Trans),
            3 => Some(Self::Task),
            _ => None,
        }
    }
}

/// Filesystem labeling (`fscon`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsCon {
    /// Filesystem name.
    pub name: String,
    /// Context of the filesystem.
    pub fs_context: Context,
    /// Default context of its files.
    pub file_context: Context,
}

/// Port range labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCon {
    /// IP protocol number.
    pub protocol: u8,
    /// First port.
    pub low: u16,
    /// Last port.
    pub high: u16,
    /// Port context.
    pub context: Context,
}

/// Network interface labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetifCon {
    /// Interface name.
    pub name: String,
    /// Interface context.
    pub if_context: Context,
    /// Default packet context.
    pub msg_context: Context,
}

/// IPv4 node labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCon {
    /// Network address.
    pub addr: Ipv4Addr,
    /// Netmask.
    pub mask: Ipv4Addr,
    /// Node context.
    pub context: Context,
}

/// IPv6 node labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node6Con {
    /// Network address.
    pub addr: Ipv6Addr,
    /// Netmask.
    pub mask: Ipv6Addr,
    /// Node context.
    pub context: Context,
}

/// `fs_use_*` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsUseCon {
    /// Labeling behavior.
    pub behavior: FsUseBehavior,
    /// Filesystem type name.
    pub name: String,
    /// Context.
    pub context: Context,
}

/// Infiniband partition key labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IbPkeyCon {
    /// Subnet prefix.
    pub subnet_prefix: u64,
    /// First pkey.
    pub low: u16,
    /// Last pkey.
    pub high: u16,
    /// Context.
    pub context: Context,
}

/// Infiniband end port labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IbEndportCon {
    /// Device name.
    pub device: String,
    /// Port number.
    pub port: u8,
    /// Context.
    pub context: Context,
}

/// Xen physical IRQ labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PirqCon {
    /// IRQ number.
    pub pirq: u32,
    /// Context.
    pub context: Context,
}

/// Xen I/O port range labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoportCon {
    /// First port.
    pub low: u32,
    /// Last port.
    pub high: u32,
    /// Context.
    pub context: Context,
}

/// Xen I/O memory range labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IomemCon {
    /// First page.
    pub low: u64,
    /// Last page.
    pub high: u64,
    /// Context.
    pub context: Context,
}

/// Xen PCI device labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PciDeviceCon {
    /// Device id.
    pub device: u32,
    /// Context.
    pub context: Context,
}

/// Xen device-tree node labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTreeCon {
    /// Device-tree path.
    pub path: String,
    /// Context.
    pub context: Context,
}

/// `genfscon` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenfsCon {
    /// Filesystem type.
    pub fstype: String,
    /// Path prefix.
    pub path: String,
    /// Restricting class value.
    pub class: Option<u32>,
    /// Context.
    pub context: Context,
}

/// Every ocontext category of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ocontexts {
    /// Initial SIDs.
    pub isids: Vec<InitialSid>,
    /// Filesystems.
    pub fs: Vec<FsCon>,
    /// Port ranges.
    pub ports: Vec<PortCon>,
    /// Network interfaces.
    pub netifs: Vec<NetifCon>,
    /// IPv4 nodes.
    pub nodes: Vec<NodeCon>,
    /// `fs_use_*` statements.
    pub fsuse: Vec<FsUseCon>,
    /// IPv6 nodes.
    pub nodes6: Vec<Node6Con>,
    /// Infiniband pkeys.
    pub ibpkeys: Vec<IbPkeyCon>,
    /// Infiniband end ports.
    pub ibendports: Vec<IbEndportCon>,
    /// Xen IRQs.
    pub pirqs: Vec<PirqCon>,
    /// Xen I/O ports.
    pub ioports: Vec<IoportCon>,
    /// Xen I/O memory.
    pub iomems: Vec<IomemCon>,
    /// Xen PCI devices.
    pub pcidevices: Vec<PciDeviceCon>,
    /// Xen device-tree nodes.
    pub devicetrees: Vec<DeviceTreeCon>,
    /// `genfscon` entries.
    pub genfs: Vec<GenfsCon>,
}

impl Ocontexts {
    /// Whether any SELinux-only category is populated.
    pub fn has_selinux_entries(&self) -> bool {
        !(self.fs.is_empty()
            && self.ports.is_empty()
            && self.netifs.is_empty()
            && self.nodes.is_empty()
            && self.fsuse.is_empty()
            && self.nodes6.is_empty()
            && self.ibpkeys.is_empty()
            && self.ibendports.is_empty()
            && self.genfs.is_empty())
    }

    /// Whether any Xen-only category is populated.
    pub fn has_xen_entries(&self) -> bool {
        !(self.pirqs.is_empty()
            && self.ioports.is_empty()
            && self.iomems.is_empty()
            && self.pcidevices.is_empty()
            && self.devicetrees.is_empty())
    }

    /// Every context held, in category order. Initial SIDs without a
    /// context are skipped.
    pub fn contexts(&self) -> Vec<&Context> {
        let mut out: Vec<&Context> = Vec::new();
        out.extend(self.isids.iter().filter_map(|c| c.context.as_ref()));
        for fs in &self.fs {
            out.push(&fs.fs_context);
            out.push(&fs.file_context);
        }
        out.extend(self.ports.iter().map(|c| &c.context));
        for netif in &self.netifs {
            out.push(&netif.if_context);
            out.push(&netif.msg_context);
        }
        out.extend(self.nodes.iter().map(|c| &c.context));
        out.extend(self.fsuse.iter().map(|c| &c.context));
        out.extend(self.nodes6.iter().map(|c| &c.context));
        out.extend(self.ibpkeys.iter().map(|c| &c.context));
        out.extend(self.ibendports.iter().map(|c| &c.context));
        out.extend(self.pirqs.iter().map(|c| &c.context));
        out.extend(self.ioports.iter().map(|c| &c.context));
        out.extend(self.iomems.iter().map(|c| &c.context));
        out.extend(self.pcidevices.iter().map(|c| &c.context));
        out.extend(self.devicetrees.iter().map(|c| &c.context));
        out.extend(self.genfs.iter().map(|c| &c.context));
        out
    }

    /// Mutable access to every context, including initial SIDs that have
    /// one.
    pub fn contexts_mut(&mut self) -> Vec<&mut Context> {
        let mut out: Vec<&mut Context> = Vec::new();
        out.extend(self.isids.iter_mut().filter_map(|c| c.context.as_mut()));
        for fs in &mut self.fs {
            out.push(&mut fs.fs_context);
            out.push(&mut fs.file_context);
        }
        out.extend(self.ports.iter_mut().map(|c| &mut c.context));
        for netif in &mut self.netifs {
            out.push(&mut netif.if_context);
            out.push(&mut netif.msg_context);
        }
        out.extend(self.nodes.iter_mut().map(|c| &mut c.context));
        out.extend(self.fsuse.iter_mut().map(|c| &mut c.context));
        out.extend(self.nodes6.iter_mut().map(|c| &mut c.context));
        out.extend(self.ibpkeys.iter_mut().map(|c| &mut c.context));
        out.extend(self.ibendports.iter_mut().map(|c| &mut c.context));
        out.extend(self.pirqs.iter_mut().map(|c| &mut c.context));
        out.extend(self.ioports.iter_mut().map(|c| &mut c.context));
        out.extend(self.iomems.iter_mut().map(|c| &mut c.context));
        out.extend(self.pcidevices.iter_mut().map(|c| &mut c.context));
        out.extend(self.devicetrees.iter_mut().map(|c| &mut c.context));
        out.extend(self.genfs.iter_mut().map(|c| &mut c.context));
        out
    }

    /// Move every entry of `other` after the entries of `self`.
    pub fn append(&mut self, other: Ocontexts) {
        self.isids.extend(other.isids);
        self.fs.extend(other.fs);
        self.ports.extend(other.ports);
        self.netifs.extend(other.netifs);
        self.nodes.extend(other.nodes);
        self.fsuse.extend(other.fsuse);
        self.nodes6.extend(other.nodes6);
        self.ibpkeys.extend(other.ibpkeys);
        self.ibendports.extend(other.ibendports);
        self.pirqs.extend(other.pirqs);
        self.ioports.extend(other.ioports);
        self.iomems.extend(other.iomems);
        self.pcidevices.extend(other.pcidevices);
        self.devicetrees.extend(other.devicetrees);
        self.genfs.extend(other.genfs);
    }
}
