use std::net::SocketAddr;

use anyhow::bail;
use async_trait::async_trait;
use tokio::net::{ToSocketAddrs, UdpSocket};
use tracing::debug;

use crate::transport::DatagramSocket;

/// A UDP socket that is connected to a single peer
pub struct UdpDatagramSocket {
    socket: UdpSocket,
    max_datagram_size: usize,
}

impl UdpDatagramSocket {
    pub async fn connect(local: impl ToSocketAddrs, remote: impl ToSocketAddrs, max_datagram_size: usize) -> anyhow::Result<UdpDatagramSocket> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;
        debug!("UDP socket {:?} connected to {:?}", socket.local_addr()?, socket.peer_addr()?);

        Ok(UdpDatagramSocket {
            socket,
            max_datagram_size,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl DatagramSocket for UdpDatagramSocket {
    async fn send_datagram(&self, buf: &[u8]) -> anyhow::Result<()> {
        if buf.len() > self.max_datagram_size {
            bail!("datagram of {} bytes exceeds the maximum size of {} bytes", buf.len(), self.max_datagram_size);
        }
        let num_sent = self.socket.send(buf).await?;
        if num_sent != buf.len() {
            bail!("only {} of {} bytes were sent", num_sent, buf.len());
        }
        Ok(())
    }

    async fn recv_datagram(&self) -> anyhow::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.max_datagram_size];
        let num_read = self.socket.recv(&mut buf).await?;
        buf.truncate(num_read);
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_recv() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpDatagramSocket::connect("127.0.0.1:0", a.local_addr().unwrap(), 1024).await.unwrap();
        a.connect(b.local_addr().unwrap()).await.unwrap();

        b.send_datagram(b"hello").await.unwrap();
        let mut buf = [0u8; 100];
        let n = a.recv(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");

        a.send(b"world").await.unwrap();
        assert_eq!(b.recv_datagram().await.unwrap(), b"world".to_vec());
    }

    #[tokio::test]
    async fn test_send_too_large() {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpDatagramSocket::connect("127.0.0.1:0", a.local_addr().unwrap(), 4).await.unwrap();
        assert!(b.send_datagram(b"hello").await.is_err());
    }
}
