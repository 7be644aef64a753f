//! IEX framing of ABUS messages over CAN
//!
//! Each CAN frame carries a 29-bit extended id built from an 8-bit command
//! and a 21-bit address, plus up to 8 payload bytes. An ABUS message is
//! split into `stream` chunks closed by a single `strend` chunk.

use std::fmt;

use bytes::Bytes;

/// Max payload bytes per CAN frame
pub const IEX_CHUNK_SIZE: usize = 8;

const INS_STREAM: u8 = 0b1010;
const INS_STREND: u8 = 0b1011;
const ARG_ABUS: u8 = 0b010;
const DIR_OUT: u8 = 0b1;

const ADDRESS_MASK: u32 = 0x1F_FFFF;
const COMMAND_SHIFT: u32 = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IexCommand {
    pub instruction: u8,
    pub direction: u8,
    pub arg: u8,
}

impl IexCommand {
    pub fn from_byte(value: u8) -> Self {
        Self {
            instruction: (value >> 4) & 0x0F,
            direction: (value >> 3) & 0x01,
            arg: value & 0x07,
        }
    }

    pub fn to_byte(self) -> u8 {
        ((self.instruction & 0x0F) << 4) | ((self.direction & 0x01) << 3) | (self.arg & 0x07)
    }

    fn abus_out(instruction: u8) -> Self {
        Self {
            instruction,
            direction: DIR_OUT,
            arg: ARG_ABUS,
        }
    }

    pub fn is_abus(self) -> bool {
        self.arg == ARG_ABUS
    }

    pub fn is_stream(self) -> bool {
        self.instruction == INS_STREAM
    }

    pub fn is_strend(self) -> bool {
        self.instruction == INS_STREND
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IexFrame {
    pub command: IexCommand,
    pub address: u32,
    pub data: Bytes,
}

impl IexFrame {
    /// Build from a received extended CAN id and payload
    pub fn from_can(id: u32, data: &[u8]) -> Self {
        Self {
            command: IexCommand::from_byte(((id >> COMMAND_SHIFT) & 0xFF) as u8),
            address: id & ADDRESS_MASK,
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Extended CAN id for this frame
    pub fn can_id(&self) -> u32 {
        (u32::from(self.command.to_byte()) << COMMAND_SHIFT) | (self.address & ADDRESS_MASK)
    }

    fn starts_abus_frame(&self) -> bool {
        self.data.starts_with(&[0xAA, 0x55])
    }
}

impl fmt::Display for IexFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "INS({}) DIR({}) ARG({}) {} {}",
            self.command.instruction,
            self.command.direction,
            self.command.arg,
            self.address,
            common::hex::encode_lower(&self.data)
        )
    }
}

/// Split an encoded ABUS message into outgoing IEX frames
pub fn split(raw: &Bytes) -> Vec<IexFrame> {
    let mut frames = Vec::with_capacity(raw.len() / IEX_CHUNK_SIZE + 1);
    let mut rest = raw.clone();
    while rest.len() > IEX_CHUNK_SIZE {
        let chunk = rest.split_to(IEX_CHUNK_SIZE);
        frames.push(IexFrame {
            command: IexCommand::abus_out(INS_STREAM),
            address: 0,
            data: chunk,
        });
    }
    frames.push(IexFrame {
        command: IexCommand::abus_out(INS_STREND),
        address: 0,
        data: rest,
    });
    frames
}

/// Collects incoming IEX frames until a `strend` closes the ABUS message
#[derive(Debug, Default)]
pub struct IexReassembler {
    buffer: Vec<IexFrame>,
}

impl IexReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame, returns the concatenated payload once complete
    pub fn push(&mut self, frame: IexFrame) -> Option<Bytes> {
        if !(frame.command.is_stream() || frame.command.is_strend()) {
            return None;
        }
        if !frame.command.is_abus() {
            return None;
        }
        if self.buffer.is_empty() && !frame.starts_abus_frame() {
            return None;
        }

        let done = frame.command.is_strend();
        self.buffer.push(frame);
        if !done {
            return None;
        }

        let frames = std::mem::take(&mut self.buffer);
        let mut out = Vec::with_capacity(frames.len() * IEX_CHUNK_SIZE);
        for frame in &frames {
            tracing::trace!("iex {}", frame);
            out.extend_from_slice(&frame.data);
        }
        Some(Bytes::from(out))
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::abus::command::{CommandFrame, Direction};
    use crate::abus::message::{AbusMessage, CAN_LOCAL_ADDR};

    fn message_with_body(len: usize) -> AbusMessage {
        let body: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
        AbusMessage::new(
            CAN_LOCAL_ADDR,
            2,
            1000,
            17,
            CommandFrame::new(Direction::Ack, 0, Bytes::from(body)),
        )
    }

    #[test]
    fn test_reassembly_restores_bytes() {
        for len in [0usize, 1, 8, 9, 100] {
            let msg = message_with_body(len);
            let raw = msg.to_bytes().unwrap();
            let frames = split(&raw);
            assert!(frames.iter().all(|f| f.data.len() <= IEX_CHUNK_SIZE));

            let mut reassembler = IexReassembler::new();
            let mut result = None;
            for frame in frames {
                let wire = IexFrame::from_can(frame.can_id(), &frame.data);
                assert_eq!(wire, frame);
                result = reassembler.push(wire);
            }
            let bytes = result.unwrap();
            assert_eq!(bytes, raw);
            assert_eq!(AbusMessage::from_bytes(&bytes, CAN_LOCAL_ADDR).unwrap(), msg);
            assert!(reassembler.is_empty());
        }
    }

    #[test]
    fn test_split_boundaries() {
        let frames = split(&Bytes::new());
        assert_eq!(frames.len(), 1);
        assert!(frames[0].command.is_strend());

        let frames = split(&Bytes::from_static(&[0; 16]));
        assert_eq!(frames.len(), 2);
        assert!(frames[0].command.is_stream());
        assert!(frames[1].command.is_strend());
    }

    #[test]
    fn test_can_id_layout() {
        let frame = &split(&Bytes::from_static(&[0xAA, 0x55]))[0];
        // strend, out, abus -> 1011_1_010
        assert_eq!(frame.command.to_byte(), 0xBA);
        assert_eq!(frame.can_id(), 0xBA << 21);
    }

    #[test]
    fn test_ignores_foreign_frames() {
        let mut reassembler = IexReassembler::new();

        // not abus
        let other = IexFrame::from_can(0xBB << 21, &[0xAA, 0x55]);
        assert!(reassembler.push(other).is_none());
        assert!(reassembler.is_empty());

        // no signature at the start of a stream
        let stray = IexFrame::from_can(0xBA << 21, &[0x01, 0x02]);
        assert!(reassembler.push(stray).is_none());
        assert!(reassembler.is_empty());
    }
}
