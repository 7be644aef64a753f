//! Fixed-layout blocks read from controller memory

use std::fmt;

use bytes::Buf;
use chrono::{NaiveDate, NaiveDateTime};

use crate::core::constants::{FILE_DESCRIPTOR_SIZE, PLC_HEAD_MAGIC};
use crate::error::{Result, ScgiSrvError};

const HEAD_SIZE: usize = 0x10;
const SCAN_OVERRUN_OFFSET: usize = 0x38;
const FILE_SYSTEM_INFO_OFFSET: usize = 0x40;
const FILE_SYSTEM_INFO_SIZE: usize = 6;
const FILE_NAME_LEN: usize = 32;

/// Program head at the start of the head segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlcHead {
    pub empty: u16,
    pub magic: u16,
    pub crc: u16,
    pub code_crc: u16,
    pub alloc_crc: u16,
    pub retentive_crc: u16,
    pub program_timestamp: NaiveDateTime,
    pub file_system_addr: u32,
    pub file_count: u16,
    pub scan_overrun: u16,
}

impl PlcHead {
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FILE_SYSTEM_INFO_OFFSET + FILE_SYSTEM_INFO_SIZE {
            return Err(ScgiSrvError::frame(format!(
                "plc head needs {} bytes, got {}",
                FILE_SYSTEM_INFO_OFFSET + FILE_SYSTEM_INFO_SIZE,
                data.len()
            )));
        }

        let mut head = &data[..HEAD_SIZE];
        let empty = head.get_u16_le();
        let magic = head.get_u16_le();
        let crc = head.get_u16_le();
        let code_crc = head.get_u16_le();
        let alloc_crc = head.get_u16_le();
        let retentive_crc = head.get_u16_le();
        let timestamp = head.get_u32_le();

        let mut fs = &data[FILE_SYSTEM_INFO_OFFSET..FILE_SYSTEM_INFO_OFFSET + FILE_SYSTEM_INFO_SIZE];
        let file_system_addr = fs.get_u32_le();
        let file_count = fs.get_u16_le();

        let mut overrun = &data[SCAN_OVERRUN_OFFSET..SCAN_OVERRUN_OFFSET + 2];

        Ok(Self {
            empty,
            magic,
            crc,
            code_crc,
            alloc_crc,
            retentive_crc,
            program_timestamp: cybro_timestamp(timestamp),
            file_system_addr,
            file_count,
            scan_overrun: overrun.get_u16_le(),
        })
    }

    /// A program is loaded and its file system is readable
    pub fn is_ok(&self) -> bool {
        self.empty == 0
            && PLC_HEAD_MAGIC.contains(&self.magic)
            && self.file_system_addr > 0
            && self.file_count > 0
    }
}

impl fmt::Display for PlcHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "empty={}, magic={}, crc={}, code_crc={}, alloc_crc={}, retentive_crc={}, \
             program_timestamp={}, file_system_addr={}, file_count={}, scan_overrun={}",
            self.empty,
            self.magic,
            self.crc,
            self.code_crc,
            self.alloc_crc,
            self.retentive_crc,
            self.program_timestamp,
            self.file_system_addr,
            self.file_count,
            self.scan_overrun
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    LoaderActive,
    KernelActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlcStatus {
    Stop,
    Pause,
    Run,
    NoValidProgram,
    ScanOverrunError,
}

/// Reply to READ_STATUS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub system_status: SystemStatus,
    pub plc_status: PlcStatus,
}

impl Status {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let [system, plc] = data else {
            return Err(ScgiSrvError::frame(format!(
                "status needs 2 bytes, got {}",
                data.len()
            )));
        };
        let system_status = match system {
            0 => SystemStatus::LoaderActive,
            1 => SystemStatus::KernelActive,
            other => return Err(ScgiSrvError::frame(format!("unknown system status {other}"))),
        };
        let plc_status = match plc {
            0 => PlcStatus::Stop,
            1 => PlcStatus::Pause,
            2 => PlcStatus::Run,
            3 => PlcStatus::NoValidProgram,
            4 => PlcStatus::ScanOverrunError,
            other => return Err(ScgiSrvError::frame(format!("unknown plc status {other}"))),
        };
        Ok(Self {
            system_status,
            plc_status,
        })
    }

    /// Kernel is executing a program, running or paused
    pub fn is_running(&self) -> bool {
        self.system_status == SystemStatus::KernelActive
            && matches!(self.plc_status, PlcStatus::Run | PlcStatus::Pause)
    }
}

/// Entry of the controller file system table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub address: u32,
    pub size: u32,
    pub timestamp: NaiveDateTime,
}

impl FileDescriptor {
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FILE_DESCRIPTOR_SIZE {
            return Err(ScgiSrvError::frame(format!(
                "file descriptor needs {} bytes, got {}",
                FILE_DESCRIPTOR_SIZE,
                data.len()
            )));
        }
        let raw_name = &data[..FILE_NAME_LEN];
        let mut rest = &data[FILE_NAME_LEN..FILE_DESCRIPTOR_SIZE];
        let name_len = (rest.get_u16_le() as usize).min(FILE_NAME_LEN);
        let address = rest.get_u32_le();
        let size = rest.get_u32_le();
        let date = rest.get_u32_le();

        Ok(Self {
            name: String::from_utf8_lossy(&raw_name[..name_len]).into_owned(),
            address,
            size,
            timestamp: cybro_timestamp(date),
        })
    }

    /// Split a table read from code memory
    pub fn decode_table(data: &[u8]) -> Result<Vec<Self>> {
        data.chunks(FILE_DESCRIPTOR_SIZE).map(Self::decode).collect()
    }
}

/// Packed DOS-style date: 2 s resolution, years from 1980
pub fn cybro_timestamp(raw: u32) -> NaiveDateTime {
    let seconds = (raw & 0x1F) * 2;
    let minutes = (raw >> 5) & 0x3F;
    let hours = (raw >> 11) & 0x1F;
    let day = (raw >> 16) & 0x1F;
    let month = (raw >> 21) & 0x0F;
    let year = (raw >> 25) as i32 + 1980;

    dos_datetime(year, month, day, hours, minutes, seconds)
        .or_else(|| dos_datetime(1980, 1, 1, 0, 0, 0))
        .unwrap_or_default()
}

fn dos_datetime(year: i32, month: u32, day: u32, h: u32, m: u32, s: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(h, m, s)
}
