//! TCP command-channel transport: connect-with-timeout on the subscriber
//! side, bind/accept on the publisher side. `TCP_NODELAY` is always applied
//! since STTP frames are latency-sensitive and small.

use std::net::SocketAddr;
use std::time::Duration;

use sttp_core::{Result, SttpError};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, instrument};

use crate::framed::FramedStream;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[instrument(skip_all, fields(%addr))]
pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<FramedStream<TcpStream>> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            SttpError::Transport(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connect to {addr} timed out after {timeout:?}"),
            ))
        })?
        .map_err(SttpError::Transport)?;

    stream.set_nodelay(true).map_err(SttpError::Transport)?;
    debug!("tcp command channel connected");
    Ok(FramedStream::new(stream))
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(SttpError::Transport)
}

pub async fn accept(listener: &TcpListener) -> Result<(FramedStream<TcpStream>, SocketAddr)> {
    let (stream, peer) = listener.accept().await.map_err(SttpError::Transport)?;
    stream.set_nodelay(true).map_err(SttpError::Transport)?;
    Ok((FramedStream::new(stream), peer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_to_unbound_port_returns_transport_error() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let err = connect(addr, Duration::from_millis(200)).await.unwrap_err();
        assert!(matches!(err, SttpError::Transport(_)));
    }

    #[tokio::test]
    async fn listener_accepts_a_nodelay_connection() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let local_addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (_framed, _peer) = accept(&listener).await.unwrap();
        });

        let _client = connect(local_addr, Duration::from_secs(1)).await.unwrap();
        server.await.unwrap();
    }
}
