use std::fmt::{Display, Formatter};

use bytes::BytesMut;

use crate::messages::executor_messages::{ExecutorCommands, GoDeliver, GoPickup, TruckQuery};
use crate::messages::requester_messages::{DeliveryNotice, LoadRequest, RequesterOutbound, UserValidationResponse};
use crate::messages::{Peer, WireBatch};
use crate::protocol::sequence::SequenceNumber;

/// The kinds of outbound messages that require acknowledgment. The outbox is partitioned by
///  kind.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MessageKind {
    RequesterUserValidation,
    RequesterLoadRequest,
    RequesterDelivery,
    ExecutorPickup,
    ExecutorDeliver,
    ExecutorQuery,
}
impl MessageKind {
    pub fn peer(&self) -> Peer {
        match self {
            MessageKind::RequesterUserValidation |
            MessageKind::RequesterLoadRequest |
            MessageKind::RequesterDelivery => Peer::Requester,
            MessageKind::ExecutorPickup |
            MessageKind::ExecutorDeliver |
            MessageKind::ExecutorQuery => Peer::Executor,
        }
    }
}
impl Display for MessageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// An outbound message that stays in the outbox until the peer acknowledges it
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OutboundMessage {
    UserValidation(UserValidationResponse),
    LoadRequest(LoadRequest),
    Delivery(DeliveryNotice),
    Pickup(GoPickup),
    Deliver(GoDeliver),
    TruckQuery(TruckQuery),
}
impl OutboundMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            OutboundMessage::UserValidation(_) => MessageKind::RequesterUserValidation,
            OutboundMessage::LoadRequest(_) => MessageKind::RequesterLoadRequest,
            OutboundMessage::Delivery(_) => MessageKind::RequesterDelivery,
            OutboundMessage::Pickup(_) => MessageKind::ExecutorPickup,
            OutboundMessage::Deliver(_) => MessageKind::ExecutorDeliver,
            OutboundMessage::TruckQuery(_) => MessageKind::ExecutorQuery,
        }
    }

    pub fn seq(&self) -> SequenceNumber {
        match self {
            OutboundMessage::UserValidation(m) => m.seq,
            OutboundMessage::LoadRequest(m) => m.seq,
            OutboundMessage::Delivery(m) => m.seq,
            OutboundMessage::Pickup(m) => m.seq,
            OutboundMessage::Deliver(m) => m.seq,
            OutboundMessage::TruckQuery(m) => m.seq,
        }
    }

    pub fn peer(&self) -> Peer {
        self.kind().peer()
    }

    /// Adds a copy of this message to the batch for its peer
    pub fn add_to_batch(&self, requester: &mut RequesterOutbound, executor: &mut ExecutorCommands) {
        match self {
            OutboundMessage::UserValidation(m) => requester.user_validations.push(m.clone()),
            OutboundMessage::LoadRequest(m) => requester.load_requests.push(m.clone()),
            OutboundMessage::Delivery(m) => requester.deliveries.push(m.clone()),
            OutboundMessage::Pickup(m) => executor.pickups.push(m.clone()),
            OutboundMessage::Deliver(m) => executor.deliveries.push(m.clone()),
            OutboundMessage::TruckQuery(m) => executor.queries.push(m.clone()),
        }
    }

    /// The number of bytes this message adds to an encoded batch. Every message is a
    ///  self-contained record, so a batch's body is the sum of its messages' lengths.
    pub fn encoded_len(&self) -> usize {
        let mut requester = RequesterOutbound::default();
        let mut executor = ExecutorCommands::default();
        self.add_to_batch(&mut requester, &mut executor);

        let mut buf = BytesMut::new();
        requester.ser(&mut buf);
        executor.ser(&mut buf);
        buf.len()
    }
}

/// Splits messages into consecutive chunks whose encoded length stays within `max_len`. A
///  message that exceeds `max_len` on its own ends up in a chunk of its own.
pub fn split_by_encoded_len(messages: &[OutboundMessage], max_len: usize) -> Vec<&[OutboundMessage]> {
    let mut result = Vec::new();
    let mut chunk_start = 0;
    let mut chunk_len = 0;

    for (i, msg) in messages.iter().enumerate() {
        let len = msg.encoded_len();
        if i > chunk_start && chunk_len + len > max_len {
            result.push(&messages[chunk_start..i]);
            chunk_start = i;
            chunk_len = 0;
        }
        chunk_len += len;
    }
    if chunk_start < messages.len() {
        result.push(&messages[chunk_start..]);
    }
    result
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use crate::messages::Location;
    use crate::messages::executor_messages::DeliveryLocation;
    use super::*;

    fn seq(raw: u64) -> SequenceNumber {
        SequenceNumber::from_raw(raw)
    }

    #[rstest]
    #[case::user_validation(OutboundMessage::UserValidation(UserValidationResponse { seq: seq(1), shipment_id: 2, is_valid: true }), MessageKind::RequesterUserValidation, Peer::Requester)]
    #[case::load_request(OutboundMessage::LoadRequest(LoadRequest { seq: seq(1), truck_id: 2, warehouse_id: 3, shipment_ids: vec![4] }), MessageKind::RequesterLoadRequest, Peer::Requester)]
    #[case::delivery(OutboundMessage::Delivery(DeliveryNotice { seq: seq(1), shipment_id: 2 }), MessageKind::RequesterDelivery, Peer::Requester)]
    #[case::pickup(OutboundMessage::Pickup(GoPickup { seq: seq(1), truck_id: 2, warehouse_id: 3 }), MessageKind::ExecutorPickup, Peer::Executor)]
    #[case::deliver(OutboundMessage::Deliver(GoDeliver { seq: seq(1), truck_id: 2, packages: vec![DeliveryLocation { package_id: 4, location: Location::new(1, 2) }] }), MessageKind::ExecutorDeliver, Peer::Executor)]
    #[case::query(OutboundMessage::TruckQuery(TruckQuery { seq: seq(1), truck_id: 2 }), MessageKind::ExecutorQuery, Peer::Executor)]
    fn test_kind_and_batch(#[case] msg: OutboundMessage, #[case] kind: MessageKind, #[case] peer: Peer) {
        assert_eq!(msg.kind(), kind);
        assert_eq!(msg.peer(), peer);
        assert_eq!(msg.seq(), seq(1));

        let mut requester = RequesterOutbound::default();
        let mut executor = ExecutorCommands::default();
        msg.add_to_batch(&mut requester, &mut executor);

        match peer {
            Peer::Requester => {
                assert_eq!(requester.user_validations.len() + requester.load_requests.len() + requester.deliveries.len(), 1);
                assert_eq!(executor, ExecutorCommands::default());
            }
            Peer::Executor => {
                assert_eq!(executor.pickups.len() + executor.deliveries.len() + executor.queries.len(), 1);
                assert_eq!(requester, RequesterOutbound::default());
            }
        }
    }

    fn queries(num: u64) -> Vec<OutboundMessage> {
        (1..=num)
            .map(|raw| OutboundMessage::TruckQuery(TruckQuery { seq: seq(raw), truck_id: 1 }))
            .collect()
    }

    #[test]
    fn test_encoded_len() {
        // tag, seq, truck id
        assert_eq!(queries(1)[0].encoded_len(), 3);

        let mut batch = ExecutorCommands::default();
        let messages = queries(20);
        for msg in &messages {
            msg.add_to_batch(&mut RequesterOutbound::default(), &mut batch);
        }
        let mut buf = BytesMut::new();
        batch.ser(&mut buf);
        assert_eq!(buf.len(), messages.iter().map(|m| m.encoded_len()).sum::<usize>());
    }

    #[rstest]
    #[case::empty(0, 10, vec![])]
    #[case::fits(3, 10, vec![3])]
    #[case::exact(4, 12, vec![4])]
    #[case::split(10, 10, vec![3, 3, 3, 1])]
    #[case::oversized(2, 2, vec![1, 1])]
    fn test_split_by_encoded_len(#[case] num_messages: u64, #[case] max_len: usize, #[case] expected_chunk_sizes: Vec<usize>) {
        let messages = queries(num_messages);
        let chunks = split_by_encoded_len(&messages, max_len);

        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), expected_chunk_sizes);
        assert_eq!(chunks.concat(), messages);
    }
}
