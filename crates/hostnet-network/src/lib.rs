//! # hostnet-network
//!
//! Inspection and configuration of the host's network stack.
//!
//! This crate provides:
//! - Per-namespace link and address inspection
//! - Route table registry editing with backup and rollback
//! - Physical interface and SR-IOV function discovery
//! - Route, policy rule and firewall changes through `ip` and `iptables`
//! - NetworkManager device exclusions and a TCP reachability probe

#![warn(missing_docs)]

pub mod backup;
pub mod context;
pub mod exec;
pub mod interfaces;
pub mod mask;
pub mod mutators;
pub mod nm;
pub mod parse;
pub mod reach;
pub mod rt_tables;
pub mod topology;

#[cfg(test)]
mod testing;

pub use context::HostContext;
pub use exec::{CommandOutput, CommandRunner, SystemRunner};
pub use interfaces::{InterfaceEnumerator, InterfacePhysicalInfo, VirtualFunction};
pub use mask::{network_address, prefix_to_mask};
pub use mutators::{CommandStatus, NetMutator};
pub use nm::NmExclusions;
pub use reach::{DEFAULT_PROBE_PORT, is_ip_reachable};
pub use rt_tables::{RouteTableEntry, RouteTableRegistry};
pub use topology::{Inspector, LinkRecord, NamespaceTopology, OperState};
