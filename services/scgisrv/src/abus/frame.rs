//! ABUS transport frame
//!
//! Layout (little endian):
//!
//! ```text
//! +--------+--------+----------+----------+-----------+-----+-----+
//! | 0xAA55 | length | from u32 |  to u32  | data ...  | tid | crc |
//! +--------+--------+----------+----------+-----------+-----+-----+
//! ```
//!
//! `length` counts the data block plus the transaction id. The CRC covers
//! everything before it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::constants::{CRC_LEN, TRANSACTION_ID_LEN, TRANSPORT_HEADER_LEN};
use crate::error::{Result, ScgiSrvError};

/// Frame signature, `AA 55` on the wire
pub const SIGNATURE: u16 = 0x55AA;

const CRC_TABLE: [u16; 16] = [
    0x049D, 0x0C07, 0x1591, 0x1ACF, 0x1D4B, 0x202D, 0x2507, 0x2B4B, 0x34A5, 0x38C5, 0x3D3F,
    0x4445, 0x4D0F, 0x538F, 0x5FB3, 0x6BBF,
];

/// Table driven checksum used by the controllers
pub fn crc(data: &[u8]) -> u16 {
    data.iter().enumerate().fold(0u16, |crc, (i, &b)| {
        crc.wrapping_add(u16::from(b ^ 0x5A).wrapping_mul(CRC_TABLE[i & 0x0F]))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFrame {
    pub from_addr: u32,
    pub to_addr: u32,
    pub data: Bytes,
    pub transaction_id: u16,
}

impl TransportFrame {
    pub fn new(from_addr: u32, to_addr: u32, data: Bytes, transaction_id: u16) -> Self {
        Self {
            from_addr,
            to_addr,
            data,
            transaction_id,
        }
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        TRANSPORT_HEADER_LEN + self.data.len() + TRANSACTION_ID_LEN + CRC_LEN
    }

    pub fn encode(&self) -> Result<Bytes> {
        let length = u16::try_from(self.data.len() + TRANSACTION_ID_LEN).map_err(|_| {
            ScgiSrvError::frame(format!("data block too long: {} bytes", self.data.len()))
        })?;

        let mut buf = BytesMut::with_capacity(self.size());
        buf.put_u16_le(SIGNATURE);
        buf.put_u16_le(length);
        buf.put_u32_le(self.from_addr);
        buf.put_u32_le(self.to_addr);
        buf.put_slice(&self.data);
        buf.put_u16_le(self.transaction_id);
        let crc = crc(&buf);
        buf.put_u16_le(crc);

        Ok(buf.freeze())
    }

    /// Decode a frame, the data block spans everything between header and trailer
    pub fn decode(raw: &[u8]) -> Result<Self> {
        if raw.len() < TRANSPORT_HEADER_LEN {
            return Err(ScgiSrvError::frame("frame shorter than header"));
        }
        if raw.len() < TRANSPORT_HEADER_LEN + TRANSACTION_ID_LEN + CRC_LEN {
            return Err(ScgiSrvError::frame("frame shorter than header and trailer"));
        }

        let mut header = &raw[..TRANSPORT_HEADER_LEN];
        let signature = header.get_u16_le();
        let length = header.get_u16_le() as usize;
        let from_addr = header.get_u32_le();
        let to_addr = header.get_u32_le();

        if signature != SIGNATURE {
            return Err(ScgiSrvError::frame(format!(
                "invalid signature {:#06x}",
                signature
            )));
        }

        let max_data_len = raw.len() - TRANSPORT_HEADER_LEN - TRANSACTION_ID_LEN - CRC_LEN;
        let declared = length.saturating_sub(TRANSACTION_ID_LEN);
        if declared > max_data_len {
            return Err(ScgiSrvError::frame(format!(
                "length is {} while max possible is {}",
                length, max_data_len
            )));
        }

        let data_end = TRANSPORT_HEADER_LEN + max_data_len;
        let mut trailer = &raw[data_end..];
        let transaction_id = trailer.get_u16_le();
        let received_crc = trailer.get_u16_le();

        if received_crc != crc(&raw[..data_end + TRANSACTION_ID_LEN]) {
            return Err(ScgiSrvError::frame("invalid crc"));
        }

        Ok(Self {
            from_addr,
            to_addr,
            data: Bytes::copy_from_slice(&raw[TRANSPORT_HEADER_LEN..data_end]),
            transaction_id,
        })
    }
}
