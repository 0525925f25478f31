use anyhow::anyhow;
use bytes::{Buf, BufMut, BytesMut};
use bytes_varint::VarIntSupportMut;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::messages::{put_package_ids, put_seq, try_get_package_ids, try_get_seq, Location, PackageId, PeerError, TruckId, WarehouseId, WireBatch};
use crate::protocol::sequence::SequenceNumber;
use crate::util::buf::{BufExt, BufMutExt};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserValidationRequest {
    pub seq: SequenceNumber,
    pub account: String,
    pub shipment_id: PackageId,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Product {
    pub description: String,
    pub count: u32,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ShipmentInfo {
    pub shipment_id: PackageId,
    pub destination: Location,
    /// the account of the recipient, if the shipment was ordered by a registered user
    pub account: Option<String>,
    pub products: Vec<Product>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PickupRequest {
    pub seq: SequenceNumber,
    pub warehouse_id: WarehouseId,
    pub shipments: Vec<ShipmentInfo>,
}

/// sent by the Requester once it finished loading a truck
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LoadFinishedRequest {
    pub seq: SequenceNumber,
    pub truck_id: TruckId,
    pub shipment_ids: Vec<PackageId>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RequesterConnect {
    pub seq: SequenceNumber,
    pub world_id: u64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserValidationResponse {
    pub seq: SequenceNumber,
    pub shipment_id: PackageId,
    pub is_valid: bool,
}

/// asks the Requester to load packages onto a truck that is waiting at its warehouse
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LoadRequest {
    pub seq: SequenceNumber,
    pub truck_id: TruckId,
    pub warehouse_id: WarehouseId,
    pub shipment_ids: Vec<PackageId>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeliveryNotice {
    pub seq: SequenceNumber,
    pub shipment_id: PackageId,
}


#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
enum InboundTag {
    UserValidation = 1,
    Pickup = 2,
    LoadFinished = 3,
    Error = 4,
    Ack = 5,
    Disconnect = 6,
}

/// Everything the Requester sends to the hub
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct RequesterInbound {
    pub user_validations: Vec<UserValidationRequest>,
    pub pickups: Vec<PickupRequest>,
    pub load_finished: Vec<LoadFinishedRequest>,
    pub errors: Vec<PeerError>,
    pub acks: Vec<SequenceNumber>,
    pub disconnect: bool,
}

impl WireBatch for RequesterInbound {
    fn ser(&self, buf: &mut BytesMut) {
        for msg in &self.user_validations {
            buf.put_u8(InboundTag::UserValidation.into());
            put_seq(buf, msg.seq);
            buf.put_string(&msg.account);
            buf.put_u64_varint(msg.shipment_id);
        }
        for msg in &self.pickups {
            buf.put_u8(InboundTag::Pickup.into());
            Self::ser_pickup(msg, buf);
        }
        for msg in &self.load_finished {
            buf.put_u8(InboundTag::LoadFinished.into());
            put_seq(buf, msg.seq);
            buf.put_u32_varint(msg.truck_id);
            put_package_ids(buf, &msg.shipment_ids);
        }
        for msg in &self.errors {
            buf.put_u8(InboundTag::Error.into());
            msg.ser(buf);
        }
        for &ack in &self.acks {
            buf.put_u8(InboundTag::Ack.into());
            put_seq(buf, ack);
        }
        if self.disconnect {
            buf.put_u8(InboundTag::Disconnect.into());
        }
    }

    fn deser(buf: &mut impl Buf) -> anyhow::Result<RequesterInbound> {
        let mut result = RequesterInbound::default();
        while buf.has_remaining() {
            let tag = buf.try_u8()?;
            match InboundTag::try_from_primitive(tag).map_err(|_| anyhow!("invalid record tag {} in requester batch", tag))? {
                InboundTag::UserValidation => result.user_validations.push(UserValidationRequest {
                    seq: try_get_seq(buf)?,
                    account: buf.try_string()?,
                    shipment_id: buf.try_varint_u64()?,
                }),
                InboundTag::Pickup => result.pickups.push(Self::deser_pickup(buf)?),
                InboundTag::LoadFinished => result.load_finished.push(LoadFinishedRequest {
                    seq: try_get_seq(buf)?,
                    truck_id: buf.try_varint_u32()?,
                    shipment_ids: try_get_package_ids(buf)?,
                }),
                InboundTag::Error => result.errors.push(PeerError::deser(buf)?),
                InboundTag::Ack => result.acks.push(try_get_seq(buf)?),
                InboundTag::Disconnect => result.disconnect = true,
            }
        }
        Ok(result)
    }

    fn is_empty(&self) -> bool {
        self == &RequesterInbound::default()
    }
}

impl RequesterInbound {
    fn ser_pickup(msg: &PickupRequest, buf: &mut impl BufMut) {
        put_seq(buf, msg.seq);
        buf.put_u32_varint(msg.warehouse_id);
        buf.put_usize_varint(msg.shipments.len());
        for shipment in &msg.shipments {
            buf.put_u64_varint(shipment.shipment_id);
            shipment.destination.ser(buf);
            match &shipment.account {
                Some(account) => {
                    buf.put_bool(true);
                    buf.put_string(account);
                }
                None => buf.put_bool(false),
            }
            buf.put_usize_varint(shipment.products.len());
            for product in &shipment.products {
                buf.put_string(&product.description);
                buf.put_u32_varint(product.count);
            }
        }
    }

    fn deser_pickup(buf: &mut impl Buf) -> anyhow::Result<PickupRequest> {
        let seq = try_get_seq(buf)?;
        let warehouse_id = buf.try_varint_u32()?;

        let num_shipments = buf.try_varint_usize()?;
        let mut shipments = Vec::new();
        for _ in 0..num_shipments {
            let shipment_id = buf.try_varint_u64()?;
            let destination = Location::deser(buf)?;
            let account = if buf.try_bool()? {
                Some(buf.try_string()?)
            }
            else {
                None
            };

            let num_products = buf.try_varint_usize()?;
            let mut products = Vec::new();
            for _ in 0..num_products {
                products.push(Product {
                    description: buf.try_string()?,
                    count: buf.try_varint_u32()?,
                });
            }

            shipments.push(ShipmentInfo {
                shipment_id,
                destination,
                account,
                products,
            });
        }

        Ok(PickupRequest {
            seq,
            warehouse_id,
            shipments,
        })
    }
}


#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
enum OutboundTag {
    Connect = 1,
    UserValidation = 2,
    LoadRequest = 3,
    Delivery = 4,
    Error = 5,
    Ack = 6,
}

/// Everything the hub sends to the Requester
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct RequesterOutbound {
    pub connect: Vec<RequesterConnect>,
    pub user_validations: Vec<UserValidationResponse>,
    pub load_requests: Vec<LoadRequest>,
    pub deliveries: Vec<DeliveryNotice>,
    pub errors: Vec<PeerError>,
    pub acks: Vec<SequenceNumber>,
}

impl RequesterOutbound {
    pub fn ack(seq: SequenceNumber) -> RequesterOutbound {
        RequesterOutbound {
            acks: vec![seq],
            ..Default::default()
        }
    }
}

impl WireBatch for RequesterOutbound {
    fn ser(&self, buf: &mut BytesMut) {
        for msg in &self.connect {
            buf.put_u8(OutboundTag::Connect.into());
            put_seq(buf, msg.seq);
            buf.put_u64_varint(msg.world_id);
        }
        for msg in &self.user_validations {
            buf.put_u8(OutboundTag::UserValidation.into());
            put_seq(buf, msg.seq);
            buf.put_u64_varint(msg.shipment_id);
            buf.put_bool(msg.is_valid);
        }
        for msg in &self.load_requests {
            buf.put_u8(OutboundTag::LoadRequest.into());
            put_seq(buf, msg.seq);
            buf.put_u32_varint(msg.truck_id);
            buf.put_u32_varint(msg.warehouse_id);
            put_package_ids(buf, &msg.shipment_ids);
        }
        for msg in &self.deliveries {
            buf.put_u8(OutboundTag::Delivery.into());
            put_seq(buf, msg.seq);
            buf.put_u64_varint(msg.shipment_id);
        }
        for msg in &self.errors {
            buf.put_u8(OutboundTag::Error.into());
            msg.ser(buf);
        }
        for &ack in &self.acks {
            buf.put_u8(OutboundTag::Ack.into());
            put_seq(buf, ack);
        }
    }

    fn deser(buf: &mut impl Buf) -> anyhow::Result<RequesterOutbound> {
        let mut result = RequesterOutbound::default();
        while buf.has_remaining() {
            let tag = buf.try_u8()?;
            match OutboundTag::try_from_primitive(tag).map_err(|_| anyhow!("invalid record tag {} in batch for the requester", tag))? {
                OutboundTag::Connect => result.connect.push(RequesterConnect {
                    seq: try_get_seq(buf)?,
                    world_id: buf.try_varint_u64()?,
                }),
                OutboundTag::UserValidation => result.user_validations.push(UserValidationResponse {
                    seq: try_get_seq(buf)?,
                    shipment_id: buf.try_varint_u64()?,
                    is_valid: buf.try_bool()?,
                }),
                OutboundTag::LoadRequest => result.load_requests.push(LoadRequest {
                    seq: try_get_seq(buf)?,
                    truck_id: buf.try_varint_u32()?,
                    warehouse_id: buf.try_varint_u32()?,
                    shipment_ids: try_get_package_ids(buf)?,
                }),
                OutboundTag::Delivery => result.deliveries.push(DeliveryNotice {
                    seq: try_get_seq(buf)?,
                    shipment_id: buf.try_varint_u64()?,
                }),
                OutboundTag::Error => result.errors.push(PeerError::deser(buf)?),
                OutboundTag::Ack => result.acks.push(try_get_seq(buf)?),
            }
        }
        Ok(result)
    }

    fn is_empty(&self) -> bool {
        self == &RequesterOutbound::default()
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use super::*;

    fn seq(raw: u64) -> SequenceNumber {
        SequenceNumber::from_raw(raw)
    }

    #[test]
    fn test_inbound_mixed_batch() {
        let batch = RequesterInbound {
            user_validations: vec![UserValidationRequest { seq: seq(1), account: "alice".to_string(), shipment_id: 17 }],
            pickups: vec![PickupRequest {
                seq: seq(2),
                warehouse_id: 3,
                shipments: vec![
                    ShipmentInfo {
                        shipment_id: 100,
                        destination: Location::new(10, 20),
                        account: None,
                        products: vec![Product { description: "book".to_string(), count: 2 }],
                    },
                    ShipmentInfo {
                        shipment_id: 101,
                        destination: Location::new(-5, 7),
                        account: Some("bob".to_string()),
                        products: vec![],
                    },
                ],
            }],
            load_finished: vec![LoadFinishedRequest { seq: seq(3), truck_id: 4, shipment_ids: vec![100, 101] }],
            errors: vec![PeerError { seq: seq(4), origin_seq: seq(99), message: "oops".to_string() }],
            acks: vec![seq(7), seq(8)],
            disconnect: false,
        };

        let mut buf = BytesMut::new();
        batch.ser(&mut buf);

        let mut parse_buf = buf.as_ref();
        assert_eq!(RequesterInbound::deser(&mut parse_buf).unwrap(), batch);
    }

    #[test]
    fn test_inbound_empty() {
        let mut parse_buf: &[u8] = &[];
        let batch = RequesterInbound::deser(&mut parse_buf).unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_inbound_ack_wire_format() {
        let mut buf = BytesMut::new();
        RequesterInbound { acks: vec![seq(300)], ..Default::default() }.ser(&mut buf);
        assert_eq!(buf.as_ref(), &[5, 0xac, 0x02]);
    }

    #[test]
    fn test_inbound_invalid_tag() {
        let mut parse_buf: &[u8] = &[99, 1];
        assert!(RequesterInbound::deser(&mut parse_buf).is_err());
    }

    #[test]
    fn test_inbound_truncated_pickup() {
        let mut buf = BytesMut::new();
        RequesterInbound {
            pickups: vec![PickupRequest { seq: seq(1), warehouse_id: 2, shipments: vec![ShipmentInfo {
                shipment_id: 5,
                destination: Location::new(1, 1),
                account: Some("carol".to_string()),
                products: vec![],
            }]}],
            ..Default::default()
        }.ser(&mut buf);

        let mut parse_buf = &buf.as_ref()[..buf.len() - 3];
        assert!(RequesterInbound::deser(&mut parse_buf).is_err());
    }

    #[test]
    fn test_outbound_ack() {
        let batch = RequesterOutbound::ack(seq(12));
        assert_eq!(batch.acks, vec![seq(12)]);
        assert!(!batch.is_empty());

        let mut buf = BytesMut::new();
        batch.ser(&mut buf);
        let mut parse_buf = buf.as_ref();
        assert_eq!(RequesterOutbound::deser(&mut parse_buf).unwrap(), batch);
    }

    #[test]
    fn test_outbound_mixed_batch() {
        let batch = RequesterOutbound {
            connect: vec![RequesterConnect { seq: seq(0), world_id: 42 }],
            user_validations: vec![UserValidationResponse { seq: seq(1), shipment_id: 9, is_valid: true }],
            load_requests: vec![LoadRequest { seq: seq(2), truck_id: 1, warehouse_id: 3, shipment_ids: vec![100] }],
            deliveries: vec![DeliveryNotice { seq: seq(3), shipment_id: 100 }],
            errors: vec![],
            acks: vec![seq(5)],
        };

        let mut buf = BytesMut::new();
        batch.ser(&mut buf);
        let mut parse_buf = buf.as_ref();
        assert_eq!(RequesterOutbound::deser(&mut parse_buf).unwrap(), batch);
    }
}
