//! NetworkManager keyfile exclusions.
//!
//! Devices listed in a `conf.d` keyfile with `unmanaged-devices+=mac<MAC>`
//! are left alone by NetworkManager.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use hostnet_common::{HostnetError, HostnetResult};
use tracing::Span;

use crate::context::HostContext;

/// Name of the exclusion file for `mac`: uppercase, `:` replaced by `_`.
///
/// ```
/// use hostnet_network::nm::conf_file_name;
///
/// assert_eq!(conf_file_name("02:00:17:0a:bc:01"), "02_00_17_0A_BC_01.conf");
/// ```
#[must_use]
pub fn conf_file_name(mac: &str) -> String {
    format!("{}.conf", mac.to_uppercase().replace(':', "_"))
}

/// Writes and removes per-device exclusion files.
#[derive(Debug, Clone)]
pub struct NmExclusions {
    dir: PathBuf,
    span: Span,
}

impl NmExclusions {
    /// Exclusions in the configuration directory from `ctx`.
    #[must_use]
    pub fn new(ctx: &HostContext) -> Self {
        Self {
            dir: ctx.paths().nm_conf_dir.clone(),
            span: ctx.span().clone(),
        }
    }

    /// Directory holding the exclusion files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Exclusion file for `mac`.
    #[must_use]
    pub fn conf_path(&self, mac: &str) -> PathBuf {
        self.dir.join(conf_file_name(mac))
    }

    /// Tell NetworkManager to ignore the device with `mac`.
    ///
    /// # Errors
    ///
    /// Returns [`HostnetError::InvalidMac`] for an empty MAC, or an I/O error
    /// if the file cannot be written.
    pub fn unmanage(&self, mac: &str) -> HostnetResult<PathBuf> {
        let _span = self.span.enter();
        if mac.trim().is_empty() {
            return Err(HostnetError::InvalidMac {
                mac: mac.to_string(),
            });
        }

        fs::create_dir_all(&self.dir)
            .map_err(|e| HostnetError::from_io(e, "create NetworkManager conf dir"))?;
        let path = self.conf_path(mac);
        fs::write(&path, format!("[keyfile]\nunmanaged-devices+=mac{mac}\n"))
            .map_err(|e| HostnetError::from_io(e, "write NetworkManager exclusion"))?;

        tracing::debug!(mac, path = %path.display(), "Device excluded from NetworkManager");
        Ok(path)
    }

    /// Hand the device with `mac` back to NetworkManager.
    ///
    /// Returns whether an exclusion file was removed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if an existing file cannot be removed.
    pub fn manage(&self, mac: &str) -> HostnetResult<bool> {
        let _span = self.span.enter();
        let path = self.conf_path(mac);

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(mac, path = %path.display(), "Exclusion removed");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(mac, "No exclusion file");
                Ok(false)
            }
            Err(e) => Err(HostnetError::from_io(e, "remove NetworkManager exclusion")),
        }
    }
}
