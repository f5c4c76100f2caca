//! UDP socket factory shared by the relay and the client.
//!
//! Sockets are tagged with a low-delay TOS so routers that honor it give the
//! MIDI traffic a better shot.
use socket2::{Domain, SockAddr, Socket, Type};
use std::net::{SocketAddr, UdpSocket};

use super::box_error::BoxError;

/// bind a UDP socket to a specific address.  port 0 lets the OS pick one.
pub fn bind(addr: SocketAddr) -> Result<UdpSocket, BoxError> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let raw_sock = Socket::new(domain, Type::DGRAM, None)?;
    if addr.is_ipv4() {
        // Not fatal.  Some platforms refuse to let you set this
        if let Err(e) = raw_sock.set_tos(0x10) {
            log::debug!("could not set TOS on socket: {}", e);
        }
    }
    raw_sock.bind(&SockAddr::from(addr))?;
    Ok(UdpSocket::from(raw_sock))
}
