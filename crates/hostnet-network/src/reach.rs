//! TCP reachability probe.

use std::net::{IpAddr, SocketAddr, TcpStream};
use std::time::Duration;

/// iSCSI target port, probed when no other port is given.
pub const DEFAULT_PROBE_PORT: u16 = 3260;

/// Connect timeout for a probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Whether a TCP connection to `addr:port` can be opened within
/// [`PROBE_TIMEOUT`].
#[must_use]
pub fn is_ip_reachable(addr: IpAddr, port: u16) -> bool {
    let target = SocketAddr::new(addr, port);
    match TcpStream::connect_timeout(&target, PROBE_TIMEOUT) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(%target, error = %e, "Not reachable");
            false
        }
    }
}
