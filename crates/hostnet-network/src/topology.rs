//! Namespace, link and address inspection.
//!
//! The [`Inspector`] walks every network namespace on the host, lists its
//! links and queries each one twice (link level and address level), merging
//! both answers into a [`LinkRecord`].

use std::fmt;
use std::net::IpAddr;

use hostnet_common::HostnetResult;
use serde::Serialize;

use crate::context::HostContext;
use crate::mask::network_address;
use crate::parse::{self, AddressDetails, LinkDetails};

/// Operational state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperState {
    /// Link is up.
    Up,
    /// Link or its lower layer is down.
    Down,
    /// State is reported but not meaningful (loopback, tunnels, ...).
    Unknown,
    /// No state reported.
    Absent,
}

impl OperState {
    /// Map an `ip` `operstate` value.
    #[must_use]
    pub fn from_ip(state: Option<&str>) -> Self {
        let Some(state) = state else {
            return Self::Absent;
        };
        match state.to_ascii_uppercase().as_str() {
            "UP" => Self::Up,
            "DOWN" | "LOWERLAYERDOWN" => Self::Down,
            "NOTPRESENT" => Self::Absent,
            _ => Self::Unknown,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unknown => "unknown",
            Self::Absent => "absent",
        }
    }
}

impl fmt::Display for OperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized state of one link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    /// Device name.
    pub device: String,
    /// Kernel interface index, unique within the namespace.
    pub index: u32,
    /// Hardware address in uppercase colon-hex.
    pub mac: Option<String>,
    /// Operational state.
    pub opstate: OperState,
    /// Link type (`ether`, `loopback`, ...).
    pub link_type: Option<String>,
    /// First configured address.
    pub address: Option<IpAddr>,
    /// Prefix length of [`LinkRecord::address`].
    pub address_prefix_length: Option<u8>,
    /// Network address derived from the address and prefix length.
    pub address_subnet: Option<IpAddr>,
    /// Broadcast address.
    pub broadcast: Option<IpAddr>,
    /// VLAN id for VLAN sub-interfaces.
    pub vlan_id: Option<u16>,
}

impl LinkRecord {
    /// Merge the two per-link query results.
    ///
    /// Returns `None` when neither query reported anything.
    #[must_use]
    pub fn merge(
        index: u32,
        device: &str,
        link: Option<LinkDetails>,
        addr: Option<AddressDetails>,
    ) -> Option<Self> {
        if link.is_none() && addr.is_none() {
            return None;
        }
        let link = link.unwrap_or_default();
        let mut record = Self {
            device: device.to_string(),
            index,
            opstate: OperState::from_ip(link.operstate.as_deref()),
            mac: link.mac,
            link_type: link.link_type,
            address: None,
            address_prefix_length: None,
            address_subnet: None,
            broadcast: None,
            vlan_id: None,
        };

        if let Some(addr) = addr {
            record.address = Some(addr.address);
            record.address_prefix_length = addr.prefix_len;
            record.address_subnet = addr
                .prefix_len
                .and_then(|prefix| network_address(addr.address, prefix).ok());
            record.broadcast = addr.broadcast;
            record.vlan_id = addr.vlan_id;
        }
        Some(record)
    }
}

/// Links discovered in one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceLinks {
    /// Namespace name; empty for the default namespace.
    pub name: String,
    /// Links in discovery order.
    pub links: Vec<LinkRecord>,
}

/// A query that failed while the topology was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectionFailure {
    /// Namespace being inspected.
    pub namespace: String,
    /// Link being queried, `None` when listing the namespace's links failed.
    pub device: Option<String>,
    /// Error description.
    pub message: String,
}

/// Links of every namespace, keyed by namespace name in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceTopology {
    namespaces: Vec<NamespaceLinks>,
    failures: Vec<InspectionFailure>,
}

impl NamespaceTopology {
    /// Links of `namespace` (empty string for the default namespace).
    #[must_use]
    pub fn get(&self, namespace: &str) -> Option<&[LinkRecord]> {
        self.namespaces
            .iter()
            .find(|ns| ns.name == namespace)
            .map(|ns| ns.links.as_slice())
    }

    /// All namespaces in discovery order.
    #[must_use]
    pub fn namespaces(&self) -> &[NamespaceLinks] {
        &self.namespaces
    }

    /// Queries that failed; their fields are missing from the records.
    #[must_use]
    pub fn failures(&self) -> &[InspectionFailure] {
        &self.failures
    }

    /// Iterate over `(namespace, link)` pairs.
    pub fn links(&self) -> impl Iterator<Item = (&str, &LinkRecord)> {
        self.namespaces
            .iter()
            .flat_map(|ns| ns.links.iter().map(move |link| (ns.name.as_str(), link)))
    }
}

/// Builds [`NamespaceTopology`] snapshots of the host.
#[derive(Debug, Clone)]
pub struct Inspector {
    ctx: HostContext,
}

impl Inspector {
    /// Create an inspector.
    #[must_use]
    pub const fn new(ctx: HostContext) -> Self {
        Self { ctx }
    }

    /// Names of the named network namespaces (the default one excluded).
    ///
    /// # Errors
    ///
    /// Returns an error if `ip netns list` cannot be run or fails.
    pub fn list_namespaces(&self) -> HostnetResult<Vec<String>> {
        let argv = self.ctx.ip("").args(["netns", "list"]).into_argv();
        Ok(parse::netns_names(&self.ctx.check_output(&argv)?))
    }

    /// `(index, name)` of every link in `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link listing fails.
    pub fn list_links(&self, namespace: &str) -> HostnetResult<Vec<(u32, String)>> {
        let argv = self
            .ctx
            .ip(namespace)
            .args(["-oneline", "link", "list"])
            .into_argv();
        Ok(parse::link_list(&self.ctx.check_output(&argv)?))
    }

    /// Inspect every namespace, the default one last.
    ///
    /// # Errors
    ///
    /// Returns an error only if the namespaces cannot be listed. Per-link
    /// failures are collected in [`NamespaceTopology::failures`].
    pub fn inspect_all_namespaces(&self) -> HostnetResult<NamespaceTopology> {
        let _span = self.ctx.span().enter();

        let mut names = self.list_namespaces()?;
        names.push(String::new());
        tracing::debug!(count = names.len(), "Inspecting network namespaces");

        let mut topology = NamespaceTopology::default();
        for name in names {
            let (links, failures) = self.collect_namespace(&name);
            topology.failures.extend(failures);
            topology.namespaces.push(NamespaceLinks { name, links });
        }
        Ok(topology)
    }

    /// Inspect a single namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the namespace's links cannot be listed.
    pub fn inspect_namespace(&self, namespace: &str) -> HostnetResult<NamespaceLinks> {
        let _span = self.ctx.span().enter();

        let listed = self.list_links(namespace)?;
        let links = self.inspect_links(namespace, listed, &mut Vec::new());
        Ok(NamespaceLinks {
            name: namespace.to_string(),
            links,
        })
    }

    fn collect_namespace(&self, namespace: &str) -> (Vec<LinkRecord>, Vec<InspectionFailure>) {
        let mut failures = Vec::new();
        let listed = match self.list_links(namespace) {
            Ok(listed) => listed,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "Cannot list links");
                failures.push(InspectionFailure {
                    namespace: namespace.to_string(),
                    device: None,
                    message: e.to_string(),
                });
                return (Vec::new(), failures);
            }
        };

        let links = self.inspect_links(namespace, listed, &mut failures);
        (links, failures)
    }

    fn inspect_links(
        &self,
        namespace: &str,
        listed: Vec<(u32, String)>,
        failures: &mut Vec<InspectionFailure>,
    ) -> Vec<LinkRecord> {
        listed
            .into_iter()
            .filter_map(|(index, device)| self.inspect_link(namespace, index, &device, failures))
            .collect()
    }

    fn inspect_link(
        &self,
        namespace: &str,
        index: u32,
        device: &str,
        failures: &mut Vec<InspectionFailure>,
    ) -> Option<LinkRecord> {
        let mut record_failure = |e: hostnet_common::HostnetError| {
            tracing::warn!(namespace, device, error = %e, "Link query failed");
            failures.push(InspectionFailure {
                namespace: namespace.to_string(),
                device: Some(device.to_string()),
                message: e.to_string(),
            });
        };

        let link = self
            .fetch_link_info(namespace, device)
            .unwrap_or_else(|e| {
                record_failure(e);
                None
            });
        let addr = self.fetch_ip_info(namespace, device).unwrap_or_else(|e| {
            record_failure(e);
            None
        });

        let record = LinkRecord::merge(index, device, link, addr);
        if record.is_none() {
            tracing::debug!(namespace, device, "Nothing reported for link, skipping");
        }
        record
    }

    fn fetch_link_info(&self, namespace: &str, device: &str) -> HostnetResult<Option<LinkDetails>> {
        let argv = self
            .ctx
            .ip(namespace)
            .args(["-oneline", "-json", "link", "show", "dev", device])
            .into_argv();
        parse::link_details(&self.ctx.check_output(&argv)?)
    }

    fn fetch_ip_info(
        &self,
        namespace: &str,
        device: &str,
    ) -> HostnetResult<Option<AddressDetails>> {
        let argv = self
            .ctx
            .ip(namespace)
            .args(["--details", "-json", "address", "show", "dev", device])
            .into_argv();
        parse::address_details(&self.ctx.check_output(&argv)?)
    }
}
