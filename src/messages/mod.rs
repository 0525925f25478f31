//! The typed message model of both peers, and its binary wire format.
//!
//! Every receive call yields one *batch* containing any number of messages of different kinds,
//!  and every send transmits one batch. A batch is encoded as a sequence of tagged records:
//!
//! ```ascii
//! 0: tag (u8) - the kind of the record, specific to the batch type
//! 1: record body - integers as varints (signed ones zig-zag encoded), strings as varint
//!     length followed by UTF-8 bytes, lists as varint count followed by the elements
//! *: (repeated) the next tag, until the end of the buffer
//! ```
//!
//! Records may appear in any order. An unknown tag invalidates the whole batch since there is
//!  no way to skip a record of unknown length.

use bytes::{Buf, BufMut, BytesMut};
use bytes_varint::VarIntSupportMut;
use std::fmt::{Display, Formatter};

use crate::protocol::sequence::SequenceNumber;
use crate::util::buf::{BufExt, BufMutExt};

pub mod requester_messages;
pub mod executor_messages;
pub mod outbound;

pub type TruckId = u32;
pub type WarehouseId = u32;
/// Packages are identified by the Requester's shipment id
pub type PackageId = u64;

/// The two peers the hub coordinates
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Peer {
    /// the order / shipment system
    Requester,
    /// the simulation of trucks and warehouses
    Executor,
}
impl Display for Peer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Peer::Requester => write!(f, "requester"),
            Peer::Executor => write!(f, "executor"),
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}
impl Location {
    pub fn new(x: i32, y: i32) -> Location {
        Location { x, y }
    }

    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_varint_i32(self.x);
        buf.put_varint_i32(self.y);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<Location> {
        let x = buf.try_varint_i32()?;
        let y = buf.try_varint_i32()?;
        Ok(Location { x, y })
    }
}

/// A batch of messages that is sent or received as a unit
pub trait WireBatch: Sized + Send + Sync + 'static {
    fn ser(&self, buf: &mut BytesMut);
    fn deser(buf: &mut impl Buf) -> anyhow::Result<Self>;
    fn is_empty(&self) -> bool;
}

/// Both peers report errors in the same shape: the sequence number of the message that caused
///  the error, and a human-readable description.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PeerError {
    pub seq: SequenceNumber,
    pub origin_seq: SequenceNumber,
    pub message: String,
}
impl PeerError {
    pub fn ser(&self, buf: &mut impl BufMut) {
        buf.put_u64_varint(self.seq.to_raw());
        buf.put_u64_varint(self.origin_seq.to_raw());
        buf.put_string(&self.message);
    }

    pub fn deser(buf: &mut impl Buf) -> anyhow::Result<PeerError> {
        Ok(PeerError {
            seq: try_get_seq(buf)?,
            origin_seq: try_get_seq(buf)?,
            message: buf.try_string()?,
        })
    }
}

pub(crate) fn put_seq(buf: &mut impl BufMut, seq: SequenceNumber) {
    buf.put_u64_varint(seq.to_raw());
}

pub(crate) fn try_get_seq(buf: &mut impl Buf) -> anyhow::Result<SequenceNumber> {
    Ok(SequenceNumber::from_raw(buf.try_varint_u64()?))
}

pub(crate) fn put_package_ids(buf: &mut impl BufMut, ids: &[PackageId]) {
    buf.put_usize_varint(ids.len());
    for &id in ids {
        buf.put_u64_varint(id);
    }
}

pub(crate) fn try_get_package_ids(buf: &mut impl Buf) -> anyhow::Result<Vec<PackageId>> {
    let len = buf.try_varint_usize()?;
    let mut result = Vec::new();
    for _ in 0..len {
        result.push(buf.try_varint_u64()?);
    }
    Ok(result)
}
