//! Table rendering for inspection commands.

use std::collections::BTreeMap;
use std::fmt::Display;

use hostnet_network::{InterfacePhysicalInfo, NamespaceTopology, RouteTableEntry};
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct LinkRow {
    #[tabled(rename = "NAMESPACE")]
    namespace: String,
    #[tabled(rename = "INDEX")]
    index: u32,
    #[tabled(rename = "DEVICE")]
    device: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "ADDRESS")]
    address: String,
    #[tabled(rename = "SUBNET")]
    subnet: String,
    #[tabled(rename = "VLAN")]
    vlan: String,
}

#[derive(Tabled)]
struct InterfaceRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "PHYSICAL")]
    physical: bool,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "PCI")]
    pci_id: String,
    #[tabled(rename = "PHYSFN")]
    physfn: String,
    #[tabled(rename = "VFS")]
    vfs: String,
}

#[derive(Tabled)]
struct RouteTableRow {
    #[tabled(rename = "NUMBER")]
    number: u32,
    #[tabled(rename = "NAME")]
    name: String,
}

fn or_dash<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub(super) fn topology_table(topology: &NamespaceTopology) -> String {
    let rows: Vec<LinkRow> = topology
        .links()
        .map(|(namespace, link)| LinkRow {
            namespace: if namespace.is_empty() {
                "(default)".to_string()
            } else {
                namespace.to_string()
            },
            index: link.index,
            device: link.device.clone(),
            state: link.opstate.to_string(),
            mac: or_dash(link.mac.as_deref()),
            address: match (link.address, link.address_prefix_length) {
                (Some(addr), Some(prefix)) => format!("{addr}/{prefix}"),
                (addr, _) => or_dash(addr),
            },
            subnet: or_dash(link.address_subnet),
            vlan: or_dash(link.vlan_id),
        })
        .collect();
    Table::new(rows).to_string()
}

/// `index:mac` per virtual function, the PCI id standing in for a missing MAC.
fn vf_cell(info: &InterfacePhysicalInfo) -> String {
    let Some(vfs) = &info.virtual_functions else {
        return "-".to_string();
    };
    vfs.iter()
        .map(|(index, vf)| format!("{index}:{}", vf.mac.as_deref().unwrap_or(&vf.pci_id)))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(super) fn interface_table(interfaces: &BTreeMap<String, InterfacePhysicalInfo>) -> String {
    let rows: Vec<InterfaceRow> = interfaces
        .iter()
        .map(|(name, info)| InterfaceRow {
            name: name.clone(),
            physical: info.physical,
            mac: info.mac.clone(),
            pci_id: or_dash(info.pci_id.as_deref()),
            physfn: or_dash(info.physfn.as_deref()),
            vfs: vf_cell(info),
        })
        .collect();
    Table::new(rows).to_string()
}

pub(super) fn route_table_table(entries: &[RouteTableEntry]) -> String {
    Table::new(entries.iter().map(|e| RouteTableRow {
        number: e.number,
        name: e.name.clone(),
    }))
    .to_string()
}
