//! CLI command definitions and handlers.

mod output;

use std::fs::OpenOptions;
use std::io::Write;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr, eyre};
use hostnet_common::SystemPaths;
use hostnet_network::{
    CommandStatus, DEFAULT_PROBE_PORT, HostContext, Inspector, InterfaceEnumerator, NetMutator,
    NmExclusions, RouteTableRegistry, SystemRunner, is_ip_reachable, prefix_to_mask,
};

/// hostnet - inspect and configure host networking
#[derive(Parser)]
#[command(name = "hostnet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the `ip` binary
    #[arg(long, global = true, env = "HOSTNET_IP")]
    pub ip: Option<PathBuf>,

    /// Path to the `iptables` binary
    #[arg(long, global = true, env = "HOSTNET_IPTABLES")]
    pub iptables: Option<PathBuf>,

    /// Route table registry
    #[arg(long, global = true, env = "HOSTNET_RT_TABLES")]
    pub rt_tables: Option<PathBuf>,

    /// NetworkManager drop-in directory
    #[arg(long, global = true, env = "HOSTNET_NM_CONF_DIR")]
    pub nm_conf_dir: Option<PathBuf>,

    /// Sysfs mount point
    #[arg(long, global = true, env = "HOSTNET_SYSFS")]
    pub sysfs: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for inspection commands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON document
    Json,
}

/// hostnet commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Show links and addresses of every network namespace
    Topology {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Show network devices with their PCI and SR-IOV details
    Interfaces {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },

    /// Edit the route table registry
    #[command(subcommand)]
    Table(TableCommand),

    /// Print the IPv4 netmask for a prefix length
    Mask {
        /// Prefix length (0-32)
        prefix: u8,
    },

    /// Check whether a TCP port answers on an address
    Reachable {
        /// Address to probe
        address: IpAddr,

        /// Port to probe
        #[arg(short, long, default_value_t = DEFAULT_PROBE_PORT)]
        port: u16,
    },

    /// Add or flush static routes
    #[command(subcommand)]
    Route(RouteCommand),

    /// Add or flush policy rules
    #[command(subcommand)]
    Rule(RuleCommand),

    /// Add or remove firewall rules
    #[command(subcommand)]
    Firewall(FirewallCommand),

    /// Exclude devices from NetworkManager
    #[command(subcommand)]
    Nm(NmCommand),

    /// Manage interface addresses
    #[command(subcommand)]
    Address(AddressCommand),
}

/// Route table registry commands.
#[derive(Subcommand)]
pub enum TableCommand {
    /// Register a table under the first free number
    Add {
        /// Table name
        name: String,
    },
    /// Remove every entry with this name
    Delete {
        /// Table name
        name: String,
    },
    /// List registered tables
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

/// Static route commands.
#[derive(Subcommand)]
pub enum RouteCommand {
    /// Run `ip route add` with the given arguments
    Add {
        /// Append the executed command to this file on success
        #[arg(long)]
        script: Option<PathBuf>,

        /// Arguments for `ip route add`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Delete every route bound to a device
    Flush {
        /// Device name
        device: String,
    },
}

/// Policy rule commands.
#[derive(Subcommand)]
pub enum RuleCommand {
    /// Run `ip rule add` with the given arguments
    Add {
        /// Append the executed command to this file on success
        #[arg(long)]
        script: Option<PathBuf>,

        /// Arguments for `ip rule add`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Delete every rule that looks up a table
    Flush {
        /// Table name or number
        table: String,
    },
    /// Delete every rule mentioning an address
    FlushAddr {
        /// Address as printed by `ip rule`
        address: String,
    },
}

/// Firewall commands.
#[derive(Subcommand)]
pub enum FirewallCommand {
    /// Run `iptables` to add a rule
    Add {
        /// Append the executed command to this file on success
        #[arg(long)]
        script: Option<PathBuf>,

        /// Arguments for `iptables`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
    /// Run `iptables` to remove a rule
    Remove {
        /// Arguments for `iptables`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },
}

/// NetworkManager commands.
#[derive(Subcommand)]
pub enum NmCommand {
    /// Stop NetworkManager from managing a device
    Unmanage {
        /// Device MAC address
        mac: String,
    },
    /// Hand a device back to NetworkManager
    Manage {
        /// Device MAC address
        mac: String,
    },
}

/// Address commands.
#[derive(Subcommand)]
pub enum AddressCommand {
    /// Remove an address from a device
    Delete {
        /// Device name
        device: String,

        /// Address with prefix length (e.g. 10.0.0.5/24)
        address: String,

        /// Network namespace of the device
        #[arg(long)]
        netns: Option<String>,
    },
}

impl Cli {
    /// Paths from the defaults, overridden by flags.
    #[must_use]
    pub fn paths(&self) -> SystemPaths {
        let mut paths = SystemPaths::default();
        let overrides = [
            (&self.ip, &mut paths.ip),
            (&self.iptables, &mut paths.iptables),
            (&self.rt_tables, &mut paths.rt_tables),
            (&self.nm_conf_dir, &mut paths.nm_conf_dir),
            (&self.sysfs, &mut paths.sysfs),
        ];
        for (flag, path) in overrides {
            if let Some(flag) = flag {
                path.clone_from(flag);
            }
        }
        paths
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub fn execute(self) -> Result<()> {
        let ctx = HostContext::new(Arc::new(SystemRunner), self.paths());

        match self.command {
            Commands::Topology { format } => {
                let topology = Inspector::new(ctx).inspect_all_namespaces()?;
                for failure in topology.failures() {
                    tracing::warn!(
                        namespace = %failure.namespace,
                        device = failure.device.as_deref().unwrap_or("-"),
                        "{}",
                        failure.message
                    );
                }
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&topology)?);
                    }
                    OutputFormat::Table => println!("{}", output::topology_table(&topology)),
                }
                Ok(())
            }

            Commands::Interfaces { format } => {
                let interfaces = InterfaceEnumerator::new(ctx).list_interfaces()?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&interfaces)?);
                    }
                    OutputFormat::Table => println!("{}", output::interface_table(&interfaces)),
                }
                Ok(())
            }

            Commands::Table(command) => run_table(&RouteTableRegistry::new(&ctx), command),

            Commands::Mask { prefix } => {
                println!("{}", prefix_to_mask(prefix)?);
                Ok(())
            }

            Commands::Reachable { address, port } => {
                if is_ip_reachable(address, port) {
                    println!("{address}:{port} is reachable");
                } else {
                    println!("{address}:{port} is not reachable");
                }
                Ok(())
            }

            Commands::Route(command) => {
                let mutator = NetMutator::new(ctx);
                match command {
                    RouteCommand::Add { script, args } => with_script(script.as_deref(), |sink| {
                        mutator.add_static_route(&args, sink)
                    }),
                    RouteCommand::Flush { device } => {
                        let removed = mutator.remove_static_routes(&device)?;
                        println!("Removed {removed} route(s) from {device}");
                        Ok(())
                    }
                }
            }

            Commands::Rule(command) => {
                let mutator = NetMutator::new(ctx);
                match command {
                    RuleCommand::Add { script, args } => with_script(script.as_deref(), |sink| {
                        mutator.add_static_rule(&args, sink)
                    }),
                    RuleCommand::Flush { table } => {
                        let removed = mutator.remove_static_rules(&table)?;
                        println!("Removed {removed} rule(s) using table {table}");
                        Ok(())
                    }
                    RuleCommand::FlushAddr { address } => {
                        let removed = mutator.remove_ip_rules(&address)?;
                        println!("Removed {removed} rule(s) for {address}");
                        Ok(())
                    }
                }
            }

            Commands::Firewall(command) => {
                let mutator = NetMutator::new(ctx);
                match command {
                    FirewallCommand::Add { script, args } => {
                        with_script(script.as_deref(), |sink| {
                            mutator.add_firewall_rule(&args, sink)
                        })
                    }
                    FirewallCommand::Remove { args } => {
                        report(&mutator.remove_firewall_rule(&args)?)
                    }
                }
            }

            Commands::Nm(command) => {
                let nm = NmExclusions::new(&ctx);
                match command {
                    NmCommand::Unmanage { mac } => {
                        let path = nm.unmanage(&mac)?;
                        println!("Wrote {}", path.display());
                    }
                    NmCommand::Manage { mac } => {
                        if nm.manage(&mac)? {
                            println!("Device {mac} handed back to NetworkManager");
                        } else {
                            println!("Device {mac} was not excluded");
                        }
                    }
                }
                Ok(())
            }

            Commands::Address(AddressCommand::Delete {
                device,
                address,
                netns,
            }) => {
                NetMutator::new(ctx).remove_ip_address(&device, &address, netns.as_deref())?;
                println!("Address {address} removed from {device}");
                Ok(())
            }
        }
    }
}

fn run_table(registry: &RouteTableRegistry, command: TableCommand) -> Result<()> {
    match command {
        TableCommand::Add { name } => {
            let entry = registry.add_table(&name)?;
            println!("Table {} registered as {}", entry.name, entry.number);
        }
        TableCommand::Delete { name } => {
            let removed = registry.delete_table(&name)?;
            println!("Removed {removed} entr(ies) named {name}");
        }
        TableCommand::List { format } => {
            let entries = registry.entries()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
                OutputFormat::Table => println!("{}", output::route_table_table(&entries)),
            }
        }
    }
    Ok(())
}

/// Run a pass-through command, recording it to `script` when given.
fn with_script<F>(script: Option<&Path>, apply: F) -> Result<()>
where
    F: FnOnce(Option<&mut dyn Write>) -> hostnet_common::HostnetResult<CommandStatus>,
{
    let status = match script {
        Some(path) => {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("Failed to open script {}", path.display()))?;
            apply(Some(&mut file))?
        }
        None => apply(None)?,
    };
    report(&status)
}

fn report(status: &CommandStatus) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(eyre!("Command failed: {}", status.message.trim()))
    }
}
