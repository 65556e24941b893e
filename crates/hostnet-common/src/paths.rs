//! Locations of the tools and system files hostnet works with.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

/// Default `ip` binary.
pub static IP_BIN: Lazy<PathBuf> = Lazy::new(|| env_path("HOSTNET_IP", "/usr/sbin/ip"));

/// Default `iptables` binary.
pub static IPTABLES_BIN: Lazy<PathBuf> =
    Lazy::new(|| env_path("HOSTNET_IPTABLES", "/usr/sbin/iptables"));

/// Default route table registry.
pub static RT_TABLES: Lazy<PathBuf> =
    Lazy::new(|| env_path("HOSTNET_RT_TABLES", "/etc/iproute2/rt_tables"));

/// Default NetworkManager drop-in directory.
pub static NM_CONF_DIR: Lazy<PathBuf> =
    Lazy::new(|| env_path("HOSTNET_NM_CONF_DIR", "/etc/NetworkManager/conf.d"));

/// Default sysfs mount point.
pub static SYSFS_ROOT: Lazy<PathBuf> = Lazy::new(|| env_path("HOSTNET_SYSFS", "/sys"));

/// Tool and file locations used by the hostnet components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPaths {
    /// The iproute2 `ip` binary.
    pub ip: PathBuf,
    /// The `iptables` binary.
    pub iptables: PathBuf,
    /// The route table registry (`rt_tables`).
    pub rt_tables: PathBuf,
    /// NetworkManager configuration drop-in directory.
    pub nm_conf_dir: PathBuf,
    /// Root of the sysfs mount.
    pub sysfs: PathBuf,
}

impl SystemPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Relocate every file-backed path under `root`.
    ///
    /// Binaries keep their default locations.
    #[must_use]
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            ip: IP_BIN.clone(),
            iptables: IPTABLES_BIN.clone(),
            rt_tables: root.join("etc/iproute2/rt_tables"),
            nm_conf_dir: root.join("etc/NetworkManager/conf.d"),
            sysfs: root.join("sys"),
        }
    }

    /// Backup location used while the route table registry is edited.
    #[must_use]
    pub fn rt_tables_backup(&self) -> PathBuf {
        let mut name = self.rt_tables.as_os_str().to_owned();
        name.push(".bck");
        PathBuf::from(name)
    }

    /// The `/sys/class/net` directory.
    #[must_use]
    pub fn class_net(&self) -> PathBuf {
        self.sysfs.join("class/net")
    }
}

impl Default for SystemPaths {
    fn default() -> Self {
        Self {
            ip: IP_BIN.clone(),
            iptables: IPTABLES_BIN.clone(),
            rt_tables: RT_TABLES.clone(),
            nm_conf_dir: NM_CONF_DIR.clone(),
            sysfs: SYSFS_ROOT.clone(),
        }
    }
}
