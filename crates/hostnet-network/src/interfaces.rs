//! Physical interface and SR-IOV function discovery from sysfs.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use hostnet_common::HostnetResult;
use serde::Serialize;

use crate::context::HostContext;
use crate::parse;

/// A virtual function of a physical NIC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualFunction {
    /// PCI address of the function.
    pub pci_id: String,
    /// Hardware address.
    pub mac: Option<String>,
}

/// Hardware facts about one network device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfacePhysicalInfo {
    /// Backed by a real device rather than a virtual one.
    pub physical: bool,
    /// Hardware address, lowercase as reported by sysfs.
    pub mac: String,
    /// PCI address of the backing device.
    pub pci_id: Option<String>,
    /// Whether this device is an SR-IOV virtual function; set together with
    /// [`InterfacePhysicalInfo::physfn`].
    pub is_virtual_function: bool,
    /// PCI address of the physical function when this device is a VF.
    pub physfn: Option<String>,
    /// Virtual functions by index, when this device is a physical function.
    pub virtual_functions: Option<BTreeMap<u32, VirtualFunction>>,
}

/// Enumerates host network devices.
#[derive(Debug, Clone)]
pub struct InterfaceEnumerator {
    ctx: HostContext,
}

impl InterfaceEnumerator {
    /// Create an enumerator.
    #[must_use]
    pub const fn new(ctx: HostContext) -> Self {
        Self { ctx }
    }

    /// Describe every device under `/sys/class/net`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device directory cannot be listed, a device
    /// attribute cannot be read, or `ip link show` fails for a physical
    /// function.
    pub fn list_interfaces(&self) -> HostnetResult<BTreeMap<String, InterfacePhysicalInfo>> {
        let _span = self.ctx.span().enter();

        let class_net = self.ctx.paths().class_net();
        let mut interfaces = BTreeMap::new();
        let mut pci_to_iface = HashMap::new();

        for entry in fs::read_dir(&class_net)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let iface = entry.path();

            let Ok(target) = fs::read_link(&iface) else {
                tracing::trace!(name, "Not a device link, skipping");
                continue;
            };
            let physical = !target.starts_with("../../devices/virtual");
            let mac = fs::read_to_string(iface.join("address"))?
                .trim()
                .to_lowercase();

            let mut info = InterfacePhysicalInfo {
                physical,
                mac,
                pci_id: None,
                is_virtual_function: false,
                physfn: None,
                virtual_functions: None,
            };

            if physical {
                let device = iface.join("device");
                let pci_id = link_name(&device)?;
                pci_to_iface.insert(pci_id.clone(), name.clone());
                info.pci_id = Some(pci_id);

                match link_name(&device.join("physfn")) {
                    Ok(physfn) => {
                        info.is_virtual_function = true;
                        info.physfn = Some(physfn);
                    }
                    Err(_) => {
                        info.virtual_functions = Some(self.virtual_functions(&name, &device)?);
                    }
                }
            }

            tracing::debug!(name, physical, "Found network device");
            interfaces.insert(name, info);
        }

        reconcile_vf_macs(&mut interfaces, &pci_to_iface);
        Ok(interfaces)
    }

    fn virtual_functions(
        &self,
        name: &str,
        device: &Path,
    ) -> HostnetResult<BTreeMap<u32, VirtualFunction>> {
        let mut vfs = BTreeMap::new();
        for entry in fs::read_dir(device)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(index) = file_name
                .to_str()
                .and_then(|n| n.strip_prefix("virtfn"))
                .and_then(|n| n.parse::<u32>().ok())
            else {
                continue;
            };
            vfs.insert(
                index,
                VirtualFunction {
                    pci_id: link_name(&entry.path())?,
                    mac: None,
                },
            );
        }

        if vfs.is_empty() {
            return Ok(vfs);
        }

        let argv = self.ctx.ip("").args(["link", "show", name]).into_argv();
        for (index, mac) in parse::vf_macs(&self.ctx.check_output(&argv)?) {
            if let Some(vf) = vfs.get_mut(&index) {
                vf.mac = Some(mac);
            }
        }
        Ok(vfs)
    }
}

/// Last path component of the symlink at `path`.
fn link_name(path: &Path) -> std::io::Result<String> {
    let target = fs::read_link(path)?;
    Ok(target
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned()))
}

/// Replace VF MACs with the MAC of the host interface at the same PCI address.
///
/// VFs with no matching host interface keep the MAC scraped from `ip link`.
fn reconcile_vf_macs(
    interfaces: &mut BTreeMap<String, InterfacePhysicalInfo>,
    pci_to_iface: &HashMap<String, String>,
) {
    let macs: HashMap<&str, String> = pci_to_iface
        .iter()
        .filter_map(|(pci, iface)| Some((pci.as_str(), interfaces.get(iface)?.mac.clone())))
        .collect();

    let mut updates = Vec::new();
    for (name, info) in interfaces.iter().filter(|(_, info)| info.physical) {
        let Some(vfs) = &info.virtual_functions else {
            continue;
        };
        for (index, vf) in vfs {
            if let Some(mac) = macs.get(vf.pci_id.as_str()) {
                updates.push((name.clone(), *index, mac.clone()));
            }
        }
    }

    for (name, index, mac) in updates {
        if let Some(vf) = interfaces
            .get_mut(&name)
            .and_then(|info| info.virtual_functions.as_mut())
            .and_then(|vfs| vfs.get_mut(&index))
        {
            vf.mac = Some(mac);
        }
    }
}
