//! The one thing the relay engine needs from the network: send a datagram.
//!
//! Pulling this out lets the engine run against a recorder in tests.
#[cfg(test)]
use mockall::automock;
use std::io;
use std::net::{SocketAddr, UdpSocket};

#[cfg_attr(test, automock)]
pub trait Transport {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

impl Transport for UdpSocket {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, addr)
    }
}

#[cfg(test)]
mod test_transport {
    use super::*;

    #[test]
    fn udp_socket_sends() {
        let rx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let tx = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sent = Transport::send_to(&tx, b"COUNT:1", rx.local_addr().unwrap()).unwrap();
        assert_eq!(sent, 7);
        let mut buf = [0u8; 64];
        let (amt, _src) = rx.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..amt], b"COUNT:1");
    }
}
