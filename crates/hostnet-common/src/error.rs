//! Common error types for hostnet.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`HostnetError`].
pub type HostnetResult<T> = Result<T, HostnetError>;

/// Errors raised while inspecting or editing host network configuration.
#[derive(Error, Diagnostic, Debug)]
pub enum HostnetError {
    /// An external command ran but reported failure.
    #[error("Command `{program}` failed: {message}")]
    #[diagnostic(code(hostnet::command))]
    Command {
        /// The program that was executed.
        program: String,
        /// Captured output or exit status description.
        message: String,
    },

    /// An external command could not be started at all.
    #[error("Failed to execute `{program}`: {source}")]
    #[diagnostic(
        code(hostnet::spawn),
        help("Check that iproute2 and iptables are installed, or point HOSTNET_IP / HOSTNET_IPTABLES at them")
    )]
    Spawn {
        /// The program that could not be started.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Command output did not have the expected layout.
    #[error("Cannot parse {what}: {message}")]
    #[diagnostic(code(hostnet::parse))]
    Parse {
        /// What was being parsed.
        what: String,
        /// Details about the mismatch.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(hostnet::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(hostnet::serialization))]
    Serialization(String),

    /// Network prefix length outside the address family width.
    #[error("Invalid prefix length {prefix} (maximum {max})")]
    #[diagnostic(code(hostnet::invalid_prefix))]
    InvalidPrefix {
        /// The rejected prefix length.
        prefix: u8,
        /// The largest accepted value.
        max: u8,
    },

    /// A MAC address argument was missing or empty.
    #[error("Invalid MAC address: {mac:?}")]
    #[diagnostic(code(hostnet::invalid_mac))]
    InvalidMac {
        /// The rejected value.
        mac: String,
    },

    /// Every route table number is already allocated.
    #[error("No free route table number left in {}", path.display())]
    #[diagnostic(
        code(hostnet::rt_tables::exhausted),
        help("Delete unused entries from the route table registry")
    )]
    RouteTablesExhausted {
        /// The registry file.
        path: PathBuf,
    },

    /// The pre-edit snapshot could not be taken; the live file is untouched.
    #[error("Cannot back up {}: {source}", path.display())]
    #[diagnostic(code(hostnet::backup))]
    Backup {
        /// The file that was going to be edited.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing new content failed; the live file was restored from backup.
    #[error("Cannot write {} (previous content restored): {source}", path.display())]
    #[diagnostic(code(hostnet::commit))]
    Commit {
        /// The file that failed to update.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Writing new content failed and the live file could not be restored.
    #[error(
        "Cannot write {} and restoring it from {} failed: {source}",
        path.display(),
        backup.display()
    )]
    #[diagnostic(
        code(hostnet::restore_failed),
        help("Copy the backup file over the live file by hand")
    )]
    RestoreFailed {
        /// The file that failed to update.
        path: PathBuf,
        /// The backup that still holds the original content.
        backup: PathBuf,
        /// The write error that triggered the restore.
        #[source]
        source: std::io::Error,
    },

    /// Permission denied.
    #[error("Permission denied: {operation}")]
    #[diagnostic(
        code(hostnet::permission_denied),
        help("Try running with elevated privileges (sudo)")
    )]
    PermissionDenied {
        /// The operation that was denied.
        operation: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(hostnet::config))]
    Config {
        /// The error message.
        message: String,
    },
}

impl From<serde_json::Error> for HostnetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl HostnetError {
    /// Build a [`HostnetError::Parse`] error.
    pub fn parse(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            message: message.into(),
        }
    }

    /// Map an I/O error to [`HostnetError::PermissionDenied`] when that is what it is.
    #[must_use]
    pub fn from_io(err: std::io::Error, operation: &str) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                operation: operation.to_string(),
            }
        } else {
            Self::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = HostnetError::Command {
            program: "/usr/sbin/ip".to_string(),
            message: "RTNETLINK answers: File exists".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Command `/usr/sbin/ip` failed: RTNETLINK answers: File exists"
        );
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HostnetError = io_err.into();
        assert!(matches!(err, HostnetError::Io(_)));
    }

    #[test]
    fn permission_denied_is_recognized() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err = HostnetError::from_io(io_err, "write rt_tables");
        assert!(matches!(err, HostnetError::PermissionDenied { .. }));
    }

    #[test]
    fn restore_failure_names_backup() {
        let err = HostnetError::RestoreFailed {
            path: PathBuf::from("/etc/iproute2/rt_tables"),
            backup: PathBuf::from("/etc/iproute2/rt_tables.bck"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(
            err.to_string(),
            "Cannot write /etc/iproute2/rt_tables and restoring it from \
             /etc/iproute2/rt_tables.bck failed: disk full"
        );
    }

    #[test]
    fn invalid_prefix_display() {
        let err = HostnetError::InvalidPrefix { prefix: 33, max: 32 };
        assert_eq!(err.to_string(), "Invalid prefix length 33 (maximum 32)");
    }
}
