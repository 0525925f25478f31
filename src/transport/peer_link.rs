use std::marker::PhantomData;
use std::sync::Arc;

use anyhow::bail;
use bytes::{BufMut, BytesMut};
use tracing::trace;

use crate::messages::{Peer, WireBatch};
use crate::transport::DatagramSocket;
use crate::transport::failures::TransportFailures;
use crate::util::buf::{checksum, BufExt};

/// The hub's end of the connection to one peer: batches of type `Out` go to the peer, batches
///  of type `In` come from it.
///
/// Each batch travels as a single datagram, prefixed with a checksum over the batch body:
///
/// ```ascii
/// 0: CRC-64 of the body (u64 BE)
/// 8: batch body
/// ```
///
/// Every failed send or receive, including datagrams that fail checksum verification or can
///  not be decoded, counts against the shared [TransportFailures].
pub struct PeerLink<Out: WireBatch, In: WireBatch> {
    peer: Peer,
    socket: Arc<dyn DatagramSocket>,
    failures: Arc<TransportFailures>,
    _batch_types: PhantomData<fn(Out) -> In>,
}

impl<Out: WireBatch, In: WireBatch> PeerLink<Out, In> {
    pub fn new(peer: Peer, socket: Arc<dyn DatagramSocket>, failures: Arc<TransportFailures>) -> PeerLink<Out, In> {
        PeerLink {
            peer,
            socket,
            failures,
            _batch_types: Default::default(),
        }
    }

    /// Returns `true` if the batch was handed to the socket successfully
    pub async fn send(&self, batch: &Out) -> bool {
        match self.try_send(batch).await {
            Ok(()) => true,
            Err(e) => {
                self.failures.record_failure(self.peer, &e);
                false
            }
        }
    }

    async fn try_send(&self, batch: &Out) -> anyhow::Result<()> {
        let buf = Self::encode(batch);
        trace!("sending {} bytes to {}", buf.len(), self.peer);
        self.socket.send_datagram(&buf).await
    }

    /// Returns `None` if receiving failed
    pub async fn receive(&self) -> Option<In> {
        match self.try_receive().await {
            Ok(batch) => Some(batch),
            Err(e) => {
                self.failures.record_failure(self.peer, &e);
                None
            }
        }
    }

    async fn try_receive(&self) -> anyhow::Result<In> {
        let buf = self.socket.recv_datagram().await?;
        trace!("received {} bytes from {}", buf.len(), self.peer);
        Self::decode(&buf)
    }

    pub fn encode(batch: &Out) -> BytesMut {
        let mut body = BytesMut::new();
        batch.ser(&mut body);

        let mut buf = BytesMut::with_capacity(size_of::<u64>() + body.len());
        buf.put_u64(checksum(&body));
        buf.put_slice(&body);
        buf
    }

    pub fn decode(buf: &[u8]) -> anyhow::Result<In> {
        let mut parse_buf = buf;
        let expected_checksum = parse_buf.try_u64()?;
        let actual_checksum = checksum(parse_buf);
        if actual_checksum != expected_checksum {
            bail!("checksum mismatch: expected {:016x}, was {:016x}", expected_checksum, actual_checksum);
        }
        In::deser(&mut parse_buf)
    }
}
