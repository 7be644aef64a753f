//! Tag requests resolved against a controller's allocation list

use tracing::warn;

use super::request::RwRequest;
use crate::alc::{Alc, DataType};
use crate::plc::{PlcValue, ReadParams, WriteParams};

/// Request with its memory location
#[derive(Debug, Clone)]
pub struct PlcRwRequest {
    /// Position in the originating request slice
    pub idx: usize,
    pub request: RwRequest,
    pub address: u16,
    pub size: usize,
    pub data_type: DataType,
    pub description: String,
}

/// Requests grouped by access width
#[derive(Debug, Clone, Default)]
pub struct PlcRwRequests {
    pub one: Vec<PlcRwRequest>,
    pub two: Vec<PlcRwRequest>,
    pub four: Vec<PlcRwRequest>,
    /// Unknown tags, unsupported sizes and addresses outside data memory
    pub invalid: Vec<(usize, RwRequest)>,
}

impl PlcRwRequests {
    pub fn translate(requests: &[RwRequest], alc: &Alc) -> Self {
        let mut out = Self::default();
        for (idx, request) in requests.iter().enumerate() {
            let Some(var) = alc.get(&request.tag_name) else {
                out.invalid.push((idx, request.clone()));
                continue;
            };
            let Ok(address) = u16::try_from(var.address) else {
                warn!("{}: address {:#x} out of range", request.name, var.address);
                out.invalid.push((idx, request.clone()));
                continue;
            };
            let translated = PlcRwRequest {
                idx,
                request: request.clone(),
                address,
                size: var.size,
                data_type: var.data_type,
                description: var.description.clone(),
            };
            match var.size {
                1 => out.one.push(translated),
                2 => out.two.push(translated),
                4 => out.four.push(translated),
                _ => out.invalid.push((idx, request.clone())),
            }
        }
        out
    }

    /// Valid requests in wire order: ones, twos, fours
    pub fn valid(&self) -> impl Iterator<Item = &PlcRwRequest> {
        self.one.iter().chain(&self.two).chain(&self.four)
    }

    pub fn valid_count(&self) -> usize {
        self.one.len() + self.two.len() + self.four.len()
    }

    pub fn read_params(&self) -> ReadParams {
        ReadParams {
            one: self.one.iter().map(|r| r.address).collect(),
            two: self.two.iter().map(|r| r.address).collect(),
            four: self.four.iter().map(|r| r.address).collect(),
            four_types: self.four.iter().map(|r| r.data_type).collect(),
        }
    }

    /// Encode written values; requests whose value doesn't parse or fit are skipped
    pub fn write_params(&self) -> WriteParams {
        let mut params = WriteParams::default();
        for request in self.valid() {
            let Some(raw) = request.request.value.as_deref() else {
                continue;
            };
            let encoded = PlcValue::parse(raw, request.data_type).and_then(|value| match request.size {
                1 => value.to_one_byte().map(|b| params.one.push((request.address, b))),
                2 => value.to_two_bytes().map(|b| params.two.push((request.address, b))),
                _ => value
                    .to_four_bytes(request.data_type)
                    .map(|b| params.four.push((request.address, b))),
            });
            if let Err(e) = encoded {
                warn!("Skipping write {}: {}", request.request, e);
            }
        }
        params
    }
}
