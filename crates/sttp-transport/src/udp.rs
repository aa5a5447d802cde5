//! UDP data-channel transport. The subscriber binds a local port before
//! sending `SUBSCRIBE`; the publisher sends one response frame per datagram,
//! with no length prefix.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Socket, Type};
use sttp_core::{Result, SttpError};
use tokio::net::UdpSocket;

/// Binds a UDP socket on `local_port` (0 = any available port), optionally
/// restricted to a specific local interface address.
pub async fn bind_local(local_port: u16, interface: &str) -> Result<UdpSocket> {
    let ip: IpAddr = if interface.is_empty() {
        Ipv4Addr::UNSPECIFIED.into()
    } else {
        interface
            .parse()
            .map_err(|_| SttpError::Configuration(format!("invalid data-channel interface address: {interface}")))?
    };
    let addr = SocketAddr::new(ip, local_port);

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, None).map_err(SttpError::Transport)?;
    socket.set_reuse_address(true).map_err(SttpError::Transport)?;
    socket.bind(&addr.into()).map_err(SttpError::Transport)?;
    socket.set_nonblocking(true).map_err(SttpError::Transport)?;

    UdpSocket::from_std(socket.into()).map_err(SttpError::Transport)
}

pub async fn recv_datagram(socket: &UdpSocket, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
    socket.recv_from(buf).await.map_err(SttpError::Transport)
}

pub async fn send_datagram(socket: &UdpSocket, buf: &[u8], target: SocketAddr) -> Result<()> {
    socket.send_to(buf, target).await.map_err(SttpError::Transport)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_local_any_port_then_send_and_receive() {
        let server = bind_local(0, "").await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = bind_local(0, "").await.unwrap();
        let client_addr = client.local_addr().unwrap();

        client.send_to(b"hello", server_addr).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, peer) = recv_datagram(&server, &mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(peer, client_addr);
    }

    #[tokio::test]
    async fn invalid_interface_address_is_a_configuration_error() {
        let err = bind_local(0, "not-an-ip").await.unwrap_err();
        assert!(matches!(err, SttpError::Configuration(_)));
    }
}
