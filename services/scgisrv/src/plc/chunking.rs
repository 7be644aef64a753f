//! Splitting random-memory requests into frames
//!
//! Items are packed greedily by size, smallest first: as many one-byte
//! addresses as fit, and only when all of them are placed the two-byte
//! ones, then the four-byte ones. The rest goes into the next frame.
//! A read costs 2 request bytes per address and 1/2/4 response bytes per
//! item; a write costs 2 bytes per address plus the value.

use crate::abus::CommandFrame;
use crate::alc::DataType;
use crate::core::constants::FRAME_OVERHEAD;
use crate::error::{Result, ScgiSrvError};

use super::value::PlcValue;

/// Three 16-bit item counts in front of the addresses
const COUNTS_LEN: usize = 6;
const ADDRESS_LEN: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadParams {
    pub one: Vec<u16>,
    pub two: Vec<u16>,
    pub four: Vec<u16>,
    /// Decoding type of each four-byte address
    pub four_types: Vec<DataType>,
}

impl ReadParams {
    pub fn is_empty(&self) -> bool {
        self.one.is_empty() && self.two.is_empty() && self.four.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadResults {
    pub one: Vec<PlcValue>,
    pub two: Vec<PlcValue>,
    pub four: Vec<PlcValue>,
}

impl ReadResults {
    pub fn extend(&mut self, other: ReadResults) {
        self.one.extend(other.one);
        self.two.extend(other.two);
        self.four.extend(other.four);
    }
}

/// Encoded values to write, bucketed by size
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteParams {
    pub one: Vec<(u16, u8)>,
    pub two: Vec<(u16, [u8; 2])>,
    pub four: Vec<(u16, [u8; 4])>,
}

impl WriteParams {
    pub fn is_empty(&self) -> bool {
        self.one.is_empty() && self.two.is_empty() && self.four.is_empty()
    }

    pub fn len(&self) -> usize {
        self.one.len() + self.two.len() + self.four.len()
    }
}

/// Read frame plus what is needed to decode its response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRead {
    pub frame: CommandFrame,
    pub one: usize,
    pub two: usize,
    pub four_types: Vec<DataType>,
}

impl PreparedRead {
    fn new(params: ReadParams) -> Self {
        Self {
            frame: CommandFrame::read_random(&params.one, &params.two, &params.four),
            one: params.one.len(),
            two: params.two.len(),
            four_types: params.four_types,
        }
    }

    /// Response body is the values back to back: 1B unsigned, 2B signed, then 4B
    pub fn decode(&self, body: &[u8]) -> Result<ReadResults> {
        let four_start = self.one + 2 * self.two;
        let expected = four_start + 4 * self.four_types.len();
        if body.len() < expected {
            return Err(ScgiSrvError::frame(format!(
                "read response has {} bytes, expected {}",
                body.len(),
                expected
            )));
        }

        let one = body[..self.one]
            .iter()
            .copied()
            .map(PlcValue::from_one_byte)
            .collect();
        let two = body[self.one..four_start]
            .chunks_exact(2)
            .map(|c| PlcValue::from_two_bytes([c[0], c[1]]))
            .collect();
        let four = body[four_start..expected]
            .chunks_exact(4)
            .zip(&self.four_types)
            .map(|(c, t)| PlcValue::from_four_bytes([c[0], c[1], c[2], c[3]], *t))
            .collect();

        Ok(ReadResults { one, two, four })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RwChunker {
    max_params_len: usize,
}

impl RwChunker {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_params_len: max_frame_bytes.saturating_sub(FRAME_OVERHEAD),
        }
    }

    /// Take what fits into one read frame, return the rest if any
    pub fn split_read(&self, mut params: ReadParams) -> (ReadParams, Option<ReadParams>) {
        let mut request = self.max_params_len.saturating_sub(COUNTS_LEN);
        let mut response = self.max_params_len;
        let mut fit = |len: usize, item: usize| {
            let count = len.min(request / ADDRESS_LEN).min(response / item);
            request -= count * ADDRESS_LEN;
            response -= count * item;
            count
        };

        let mut used = ReadParams::default();

        let n = fit(params.one.len(), 1);
        used.one = params.one.drain(..n).collect();
        if !params.one.is_empty() {
            return (used, Some(params));
        }

        let n = fit(params.two.len(), 2);
        used.two = params.two.drain(..n).collect();
        if !params.two.is_empty() {
            return (used, Some(params));
        }

        let n = fit(params.four.len(), 4);
        used.four = params.four.drain(..n).collect();
        used.four_types = params.four_types.drain(..n.min(params.four_types.len())).collect();
        if !params.four.is_empty() {
            return (used, Some(params));
        }
        (used, None)
    }

    pub fn split_write(&self, mut params: WriteParams) -> (WriteParams, Option<WriteParams>) {
        let mut budget = self.max_params_len.saturating_sub(COUNTS_LEN);
        let mut fit = |len: usize, item: usize| {
            let count = len.min(budget / (ADDRESS_LEN + item));
            budget -= count * (ADDRESS_LEN + item);
            count
        };

        let mut used = WriteParams::default();

        let n = fit(params.one.len(), 1);
        used.one = params.one.drain(..n).collect();
        if !params.one.is_empty() {
            return (used, Some(params));
        }

        let n = fit(params.two.len(), 2);
        used.two = params.two.drain(..n).collect();
        if !params.two.is_empty() {
            return (used, Some(params));
        }

        let n = fit(params.four.len(), 4);
        used.four = params.four.drain(..n).collect();
        if !params.four.is_empty() {
            return (used, Some(params));
        }
        (used, None)
    }

    /// Every read frame needed for `params`, in submission order
    pub fn prepare_read(&self, params: ReadParams) -> Result<Vec<PreparedRead>> {
        let mut prepared = Vec::new();
        let mut left = Some(params);
        while let Some(params) = left.take() {
            if params.is_empty() {
                break;
            }
            let (used, rest) = self.split_read(params);
            if used.is_empty() {
                return Err(ScgiSrvError::config(format!(
                    "frame of {} parameter bytes can't carry a single read",
                    self.max_params_len
                )));
            }
            prepared.push(PreparedRead::new(used));
            left = rest;
        }
        Ok(prepared)
    }

    pub fn prepare_write(&self, params: WriteParams) -> Result<Vec<CommandFrame>> {
        let mut frames = Vec::new();
        let mut left = Some(params);
        while let Some(params) = left.take() {
            if params.is_empty() {
                break;
            }
            let (used, rest) = self.split_write(params);
            if used.is_empty() {
                return Err(ScgiSrvError::config(format!(
                    "frame of {} parameter bytes can't carry a single write",
                    self.max_params_len
                )));
            }
            frames.push(write_frame(&used));
            left = rest;
        }
        Ok(frames)
    }
}

fn write_frame(params: &WriteParams) -> CommandFrame {
    let one: Vec<u16> = params.one.iter().map(|(a, _)| *a).collect();
    let two: Vec<u16> = params.two.iter().map(|(a, _)| *a).collect();
    let four: Vec<u16> = params.four.iter().map(|(a, _)| *a).collect();

    let mut values = Vec::with_capacity(one.len() + 2 * two.len() + 4 * four.len());
    values.extend(params.one.iter().map(|(_, v)| *v));
    values.extend(params.two.iter().flat_map(|(_, v)| *v));
    values.extend(params.four.iter().flat_map(|(_, v)| *v));

    CommandFrame::write_random(&one, &two, &four, &values)
}
