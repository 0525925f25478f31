use anyhow::anyhow;
use bytes::{Buf, BufMut, BytesMut};
use bytes_varint::VarIntSupportMut;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::messages::{put_seq, try_get_seq, Location, PackageId, PeerError, TruckId, WarehouseId, WireBatch};
use crate::protocol::sequence::SequenceNumber;
use crate::util::buf::{BufExt, BufMutExt};

/// The status an Executor reports for a truck that finished its deliveries and is available
///  for the next pickup. Any other status in a completion means "arrived at the warehouse".
pub const IDLE_STATUS: &str = "IDLE";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TruckInit {
    pub id: TruckId,
    pub location: Location,
}

/// Handshake request: a `world_id` of `None` asks the Executor to create a new world
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ExecutorConnect {
    pub world_id: Option<u64>,
    pub trucks: Vec<TruckInit>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GoPickup {
    pub seq: SequenceNumber,
    pub truck_id: TruckId,
    pub warehouse_id: WarehouseId,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeliveryLocation {
    pub package_id: PackageId,
    pub location: Location,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GoDeliver {
    pub seq: SequenceNumber,
    pub truck_id: TruckId,
    pub packages: Vec<DeliveryLocation>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TruckQuery {
    pub seq: SequenceNumber,
    pub truck_id: TruckId,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Connected {
    pub world_id: u64,
    pub result: String,
}
impl Connected {
    pub const SUCCESS: &'static str = "connected!";

    pub fn is_success(&self) -> bool {
        self.result == Self::SUCCESS
    }
}

/// A truck finished a pickup or delivery run
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TruckArrived {
    pub seq: SequenceNumber,
    pub truck_id: TruckId,
    pub location: Location,
    pub status: String,
}
impl TruckArrived {
    pub fn is_idle(&self) -> bool {
        self.status == IDLE_STATUS
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeliveryMade {
    pub seq: SequenceNumber,
    pub truck_id: TruckId,
    pub package_id: PackageId,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TruckStatus {
    pub seq: SequenceNumber,
    pub truck_id: TruckId,
    pub status: String,
    pub location: Location,
}


#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
enum CommandTag {
    Connect = 1,
    Pickup = 2,
    Deliver = 3,
    Query = 4,
    Ack = 5,
    SimSpeed = 6,
    Disconnect = 7,
}

/// Everything the hub sends to the Executor
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct ExecutorCommands {
    pub connect: Option<ExecutorConnect>,
    pub pickups: Vec<GoPickup>,
    pub deliveries: Vec<GoDeliver>,
    pub queries: Vec<TruckQuery>,
    pub acks: Vec<SequenceNumber>,
    pub sim_speed: Option<u32>,
    pub disconnect: bool,
}

impl ExecutorCommands {
    pub fn ack(seq: SequenceNumber) -> ExecutorCommands {
        ExecutorCommands {
            acks: vec![seq],
            ..Default::default()
        }
    }
}

impl WireBatch for ExecutorCommands {
    fn ser(&self, buf: &mut BytesMut) {
        if let Some(connect) = &self.connect {
            buf.put_u8(CommandTag::Connect.into());
            match connect.world_id {
                Some(world_id) => {
                    buf.put_bool(true);
                    buf.put_u64_varint(world_id);
                }
                None => buf.put_bool(false),
            }
            buf.put_usize_varint(connect.trucks.len());
            for truck in &connect.trucks {
                buf.put_u32_varint(truck.id);
                truck.location.ser(buf);
            }
        }
        for msg in &self.pickups {
            buf.put_u8(CommandTag::Pickup.into());
            put_seq(buf, msg.seq);
            buf.put_u32_varint(msg.truck_id);
            buf.put_u32_varint(msg.warehouse_id);
        }
        for msg in &self.deliveries {
            buf.put_u8(CommandTag::Deliver.into());
            put_seq(buf, msg.seq);
            buf.put_u32_varint(msg.truck_id);
            buf.put_usize_varint(msg.packages.len());
            for package in &msg.packages {
                buf.put_u64_varint(package.package_id);
                package.location.ser(buf);
            }
        }
        for msg in &self.queries {
            buf.put_u8(CommandTag::Query.into());
            put_seq(buf, msg.seq);
            buf.put_u32_varint(msg.truck_id);
        }
        for &ack in &self.acks {
            buf.put_u8(CommandTag::Ack.into());
            put_seq(buf, ack);
        }
        if let Some(sim_speed) = self.sim_speed {
            buf.put_u8(CommandTag::SimSpeed.into());
            buf.put_u32_varint(sim_speed);
        }
        if self.disconnect {
            buf.put_u8(CommandTag::Disconnect.into());
        }
    }

    fn deser(buf: &mut impl Buf) -> anyhow::Result<ExecutorCommands> {
        let mut result = ExecutorCommands::default();
        while buf.has_remaining() {
            let tag = buf.try_u8()?;
            match CommandTag::try_from_primitive(tag).map_err(|_| anyhow!("invalid record tag {} in executor command batch", tag))? {
                CommandTag::Connect => {
                    let world_id = if buf.try_bool()? {
                        Some(buf.try_varint_u64()?)
                    }
                    else {
                        None
                    };
                    let num_trucks = buf.try_varint_usize()?;
                    let mut trucks = Vec::new();
                    for _ in 0..num_trucks {
                        trucks.push(TruckInit {
                            id: buf.try_varint_u32()?,
                            location: Location::deser(buf)?,
                        });
                    }
                    result.connect = Some(ExecutorConnect { world_id, trucks });
                }
                CommandTag::Pickup => result.pickups.push(GoPickup {
                    seq: try_get_seq(buf)?,
                    truck_id: buf.try_varint_u32()?,
                    warehouse_id: buf.try_varint_u32()?,
                }),
                CommandTag::Deliver => {
                    let seq = try_get_seq(buf)?;
                    let truck_id = buf.try_varint_u32()?;
                    let num_packages = buf.try_varint_usize()?;
                    let mut packages = Vec::new();
                    for _ in 0..num_packages {
                        packages.push(DeliveryLocation {
                            package_id: buf.try_varint_u64()?,
                            location: Location::deser(buf)?,
                        });
                    }
                    result.deliveries.push(GoDeliver { seq, truck_id, packages });
                }
                CommandTag::Query => result.queries.push(TruckQuery {
                    seq: try_get_seq(buf)?,
                    truck_id: buf.try_varint_u32()?,
                }),
                CommandTag::Ack => result.acks.push(try_get_seq(buf)?),
                CommandTag::SimSpeed => result.sim_speed = Some(buf.try_varint_u32()?),
                CommandTag::Disconnect => result.disconnect = true,
            }
        }
        Ok(result)
    }

    fn is_empty(&self) -> bool {
        self == &ExecutorCommands::default()
    }
}


#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
enum ResponseTag {
    Connected = 1,
    Completion = 2,
    Delivered = 3,
    Ack = 4,
    Error = 5,
    TruckStatus = 6,
    Finished = 7,
}

/// Everything the Executor sends to the hub
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct ExecutorResponses {
    pub connected: Option<Connected>,
    pub completions: Vec<TruckArrived>,
    pub delivered: Vec<DeliveryMade>,
    pub acks: Vec<SequenceNumber>,
    pub errors: Vec<PeerError>,
    pub truck_status: Vec<TruckStatus>,
    pub finished: bool,
}

impl WireBatch for ExecutorResponses {
    fn ser(&self, buf: &mut BytesMut) {
        if let Some(connected) = &self.connected {
            buf.put_u8(ResponseTag::Connected.into());
            buf.put_u64_varint(connected.world_id);
            buf.put_string(&connected.result);
        }
        for msg in &self.completions {
            buf.put_u8(ResponseTag::Completion.into());
            put_seq(buf, msg.seq);
            buf.put_u32_varint(msg.truck_id);
            msg.location.ser(buf);
            buf.put_string(&msg.status);
        }
        for msg in &self.delivered {
            buf.put_u8(ResponseTag::Delivered.into());
            put_seq(buf, msg.seq);
            buf.put_u32_varint(msg.truck_id);
            buf.put_u64_varint(msg.package_id);
        }
        for &ack in &self.acks {
            buf.put_u8(ResponseTag::Ack.into());
            put_seq(buf, ack);
        }
        for msg in &self.errors {
            buf.put_u8(ResponseTag::Error.into());
            msg.ser(buf);
        }
        for msg in &self.truck_status {
            buf.put_u8(ResponseTag::TruckStatus.into());
            put_seq(buf, msg.seq);
            buf.put_u32_varint(msg.truck_id);
            buf.put_string(&msg.status);
            msg.location.ser(buf);
        }
        if self.finished {
            buf.put_u8(ResponseTag::Finished.into());
        }
    }

    fn deser(buf: &mut impl Buf) -> anyhow::Result<ExecutorResponses> {
        let mut result = ExecutorResponses::default();
        while buf.has_remaining() {
            let tag = buf.try_u8()?;
            match ResponseTag::try_from_primitive(tag).map_err(|_| anyhow!("invalid record tag {} in executor response batch", tag))? {
                ResponseTag::Connected => result.connected = Some(Connected {
                    world_id: buf.try_varint_u64()?,
                    result: buf.try_string()?,
                }),
                ResponseTag::Completion => result.completions.push(TruckArrived {
                    seq: try_get_seq(buf)?,
                    truck_id: buf.try_varint_u32()?,
                    location: Location::deser(buf)?,
                    status: buf.try_string()?,
                }),
                ResponseTag::Delivered => result.delivered.push(DeliveryMade {
                    seq: try_get_seq(buf)?,
                    truck_id: buf.try_varint_u32()?,
                    package_id: buf.try_varint_u64()?,
                }),
                ResponseTag::Ack => result.acks.push(try_get_seq(buf)?),
                ResponseTag::Error => result.errors.push(PeerError::deser(buf)?),
                ResponseTag::TruckStatus => result.truck_status.push(TruckStatus {
                    seq: try_get_seq(buf)?,
                    truck_id: buf.try_varint_u32()?,
                    status: buf.try_string()?,
                    location: Location::deser(buf)?,
                }),
                ResponseTag::Finished => result.finished = true,
            }
        }
        Ok(result)
    }

    fn is_empty(&self) -> bool {
        self == &ExecutorResponses::default()
    }
}
