//! Free TCP port discovery.
//!
//! Binding and immediately releasing a listener is used purely as an availability check.
//! The port may be taken again before the real server binds; callers accept
//! that race.

use std::io;
use std::net::{IpAddr, SocketAddr, TcpListener};

/// Find the first free port at or after `base_port` on `interface`.
///
/// An occupied port (`AddrInUse`) moves on to the next one. Any other bind
/// error is returned as-is, as is running past the end of the port range.
pub fn allocate(interface: IpAddr, base_port: u16) -> io::Result<u16> {
    let mut port = base_port;
    loop {
        match TcpListener::bind(SocketAddr::new(interface, port)) {
            Ok(listener) => {
                drop(listener);
                if port != base_port {
                    crate::log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok(port);
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                port = port.checked_add(1).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("no free port at or above {base_port}"),
                    )
                })?;
            }
            Err(e) => return Err(e),
        }
    }
}
