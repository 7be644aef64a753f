//! ABUS command frame
//!
//! Two byte head `(direction, type)` followed by the body. Requests and
//! command acknowledgements carry the opcode as the first body byte.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::constants::{COMMAND_HEAD_LEN, COMMAND_OPCODE_LEN, PUSH_ACK_ADDRESS};
use crate::error::{Result, ScgiSrvError};

/// Message type of ordinary commands
pub const MSG_TYPE_COMMAND: u8 = 0x00;

/// Message type of broadcast announcements
pub const MSG_TYPE_BROADCAST: u8 = 0x64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Req = 0,
    Ack = 1,
    Internal = 2,
    BadCmd = 3,
    BadPara = 4,
    NotReady = 5,
    NoProg = 6,
    NoKern = 7,
    NoSign = 8,
    NoAuth = 9,
    Forced = 10,
    BadFlash = 11,
    Denied = 12,
}

impl Direction {
    pub fn name(self) -> &'static str {
        match self {
            Direction::Req => "REQ",
            Direction::Ack => "ACK",
            Direction::Internal => "INTERNAL",
            Direction::BadCmd => "BAD_CMD",
            Direction::BadPara => "BAD_PARA",
            Direction::NotReady => "NOT_READY",
            Direction::NoProg => "NO_PROG",
            Direction::NoKern => "NO_KERN",
            Direction::NoSign => "NO_SIGN",
            Direction::NoAuth => "NO_AUTH",
            Direction::Forced => "FORCED",
            Direction::BadFlash => "BAD_FLASH",
            Direction::Denied => "DENIED",
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = ScgiSrvError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Direction::Req,
            1 => Direction::Ack,
            2 => Direction::Internal,
            3 => Direction::BadCmd,
            4 => Direction::BadPara,
            5 => Direction::NotReady,
            6 => Direction::NoProg,
            7 => Direction::NoKern,
            8 => Direction::NoSign,
            9 => Direction::NoAuth,
            10 => Direction::Forced,
            11 => Direction::BadFlash,
            12 => Direction::Denied,
            other => {
                return Err(ScgiSrvError::frame(format!("unknown direction {other}")));
            },
        })
    }
}

/// Command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Ping = 0x10,
    ReadStatus = 0x11,
    ReadCode = 0x21,
    WriteData = 0x32,
    ReadRandom = 0x33,
    WriteRandom = 0x34,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub direction: Direction,
    pub msg_type: u8,
    pub body: Bytes,
}

impl CommandFrame {
    pub fn new(direction: Direction, msg_type: u8, body: Bytes) -> Self {
        Self {
            direction,
            msg_type,
            body,
        }
    }

    fn request(command: Command, rest: &[u8]) -> Self {
        let mut body = BytesMut::with_capacity(COMMAND_OPCODE_LEN + rest.len());
        body.put_u8(command as u8);
        body.put_slice(rest);
        Self::new(Direction::Req, MSG_TYPE_COMMAND, body.freeze())
    }

    pub fn ping() -> Self {
        Self::request(Command::Ping, &[])
    }

    pub fn read_status() -> Self {
        Self::request(Command::ReadStatus, &[])
    }

    /// Acknowledgement a gateway sends on behalf of a controller it knows
    pub fn autodetect_response() -> Self {
        Self::new(Direction::Ack, MSG_TYPE_COMMAND, Bytes::new())
    }

    pub fn push_ack() -> Self {
        let mut rest = BytesMut::with_capacity(4);
        rest.put_u16_le(PUSH_ACK_ADDRESS);
        rest.put_u16_le(1);
        Self::request(Command::WriteData, &rest)
    }

    pub fn read_code_block(segment: u16, size: u16) -> Self {
        let mut rest = BytesMut::with_capacity(4);
        rest.put_u16_le(segment);
        rest.put_u16_le(size);
        Self::request(Command::ReadCode, &rest)
    }

    pub fn read_random(one: &[u16], two: &[u16], four: &[u16]) -> Self {
        let rest = Self::random_memory_head(one, two, four, 0);
        Self::request(Command::ReadRandom, &rest)
    }

    /// `values` holds the encoded values in the same 1/2/4 order as the addresses
    pub fn write_random(one: &[u16], two: &[u16], four: &[u16], values: &[u8]) -> Self {
        let mut rest = Self::random_memory_head(one, two, four, values.len());
        rest.put_slice(values);
        Self::request(Command::WriteRandom, &rest)
    }

    fn random_memory_head(one: &[u16], two: &[u16], four: &[u16], extra: usize) -> BytesMut {
        let count = one.len() + two.len() + four.len();
        let mut rest = BytesMut::with_capacity(6 + 2 * count + extra);
        rest.put_u16_le(one.len() as u16);
        rest.put_u16_le(two.len() as u16);
        rest.put_u16_le(four.len() as u16);
        for addr in one.iter().chain(two).chain(four) {
            rest.put_u16_le(*addr);
        }
        rest
    }

    /// Opcode of a command frame, if the body carries one
    pub fn command(&self) -> Option<u8> {
        (self.msg_type == MSG_TYPE_COMMAND)
            .then(|| self.body.first().copied())
            .flatten()
    }

    pub fn size(&self) -> usize {
        COMMAND_HEAD_LEN + COMMAND_OPCODE_LEN + self.body.len()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.direction as u8);
        buf.put_u8(self.msg_type);
        buf.put_slice(&self.body);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(COMMAND_HEAD_LEN + self.body.len());
        self.encode(&mut buf);
        buf.freeze()
    }

    pub fn decode(raw: &Bytes) -> Result<Self> {
        if raw.len() < COMMAND_HEAD_LEN {
            return Err(ScgiSrvError::frame("command frame shorter than head"));
        }
        Ok(Self {
            direction: Direction::try_from(raw[0])?,
            msg_type: raw[1],
            body: raw.slice(COMMAND_HEAD_LEN..),
        })
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.direction.name())?;
        if self.msg_type == MSG_TYPE_COMMAND {
            write!(f, "CMD ")?;
        } else {
            write!(f, "SOCKET({}) ", self.msg_type)?;
        }
        if self.body.is_empty() {
            write!(f, "no data")
        } else {
            write!(f, "{}", common::hex::encode_lower(&self.body))
        }
    }
}
