//! ABUS message: transport frame + command frame + peer address

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use bytes::{Bytes, BytesMut};

use super::command::{CommandFrame, Direction, MSG_TYPE_BROADCAST, MSG_TYPE_COMMAND};
use super::frame::TransportFrame;
use crate::core::constants::{CRC_LEN, TRANSACTION_ID_LEN, TRANSPORT_HEADER_LEN};
use crate::error::Result;

/// Address of messages carried over the local CAN bus
pub const CAN_LOCAL_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));

/// Identifies one request/response pair: `(from_nad, to_nad, transaction_id)`
pub type ExchangeTag = (u32, u32, u16);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbusMessage {
    pub addr: SocketAddr,
    pub from_nad: u32,
    pub to_nad: u32,
    pub transaction_id: u16,
    pub frame: CommandFrame,
}

impl AbusMessage {
    pub fn new(
        addr: SocketAddr,
        from_nad: u32,
        to_nad: u32,
        transaction_id: u16,
        frame: CommandFrame,
    ) -> Self {
        Self {
            addr,
            from_nad,
            to_nad,
            transaction_id,
            frame,
        }
    }

    /// Size accounted for one exchange in activity statistics
    pub fn size(&self) -> usize {
        TRANSPORT_HEADER_LEN + TRANSACTION_ID_LEN + CRC_LEN + self.frame.size()
    }

    pub fn tag(&self) -> ExchangeTag {
        (self.from_nad, self.to_nad, self.transaction_id)
    }

    /// Tag a response to this message carries
    pub fn reply_tag(&self) -> ExchangeTag {
        (self.to_nad, self.from_nad, self.transaction_id)
    }

    /// Unsolicited announcement from a controller
    pub fn is_push(&self) -> bool {
        self.to_nad == 0
            && self.frame.direction == Direction::Ack
            && self.frame.msg_type == MSG_TYPE_COMMAND
    }

    pub fn is_broadcast(&self) -> bool {
        self.to_nad == 0
            && self.frame.direction == Direction::Ack
            && self.frame.msg_type == MSG_TYPE_BROADCAST
    }

    pub fn is_can_local(&self) -> bool {
        self.addr == CAN_LOCAL_ADDR
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut data = BytesMut::with_capacity(self.frame.size());
        self.frame.encode(&mut data);
        TransportFrame::new(self.from_nad, self.to_nad, data.freeze(), self.transaction_id)
            .encode()
    }

    pub fn from_bytes(raw: &[u8], addr: SocketAddr) -> Result<Self> {
        let transport = TransportFrame::decode(raw)?;
        let frame = CommandFrame::decode(&transport.data)?;
        Ok(Self {
            addr,
            from_nad: transport.from_addr,
            to_nad: transport.to_addr,
            transaction_id: transport.transaction_id,
            frame,
        })
    }
}

impl fmt::Display for AbusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {} -> {} [{}] {}",
            self.addr.ip(),
            self.addr.port(),
            self.from_nad,
            self.to_nad,
            self.transaction_id,
            self.frame
        )
    }
}
