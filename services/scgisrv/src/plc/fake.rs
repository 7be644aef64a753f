//! In-memory controller answering exchanges directly

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use chrono::NaiveDate;
use parking_lot::Mutex;

use super::activity::PlcActivityService;
use super::client::{ClientContext, PlcClient};
use super::head::tests::{descriptor_bytes, head_bytes, to_cybro_timestamp};
use super::info::{PlcInfo, PlcOrigin};
use super::info_service::PlcInfoService;
use crate::abus::{AbusMessage, Command, CommandFrame, Direction};
use crate::comm::Exchange;
use crate::error::{Result, ScgiSrvError};
use crate::utils::task_runner::InlineTaskRunner;
use crate::utils::text::latin1_encode;
use crate::utils::unzip::tests::zip_bytes;
use crate::utils::TransactionIdGenerator;

pub(crate) const FAKE_ALC: &str = "\
; test program
0050  00000 1     0      1    global bit   lc00_general_error   Combined system error
0100  00001 1     0      1    global bit   lc00_qx00   Digital output 0
0200  00002 1     0      2    global int   counter   Event counter
0300  00003 1     0      4    global real  temperature   Temperatur \u{b0}C
0400  00004 3     0      4    global long  totals   Totals
";

const HEAD_ADDR: usize = 0x20000;
const TABLE_ADDR: u32 = 0x20100;
const ALC_ADDR: u32 = 0x21000;

pub(crate) struct FakePlc {
    nad: u32,
    code: Mutex<Vec<u8>>,
    data: Mutex<Vec<u8>>,
    status: Mutex<[u8; 2]>,
    online: AtomicBool,
    requests: AtomicUsize,
    alc_zip: Vec<u8>,
    code_crc: Mutex<u16>,
    activity: Arc<PlcActivityService>,
}

impl FakePlc {
    pub(crate) fn new(nad: u32) -> Arc<Self> {
        let alc_zip = zip_bytes("plc.alc", &latin1_encode(FAKE_ALC));
        let mut code = vec![0u8; 0x30000];

        let mut table = descriptor_bytes("main.bin", 0x100, 0x20);
        table.extend(descriptor_bytes("alc.zip", ALC_ADDR, alc_zip.len() as u32));
        code[TABLE_ADDR as usize..TABLE_ADDR as usize + table.len()].copy_from_slice(&table);
        code[ALC_ADDR as usize..ALC_ADDR as usize + alc_zip.len()].copy_from_slice(&alc_zip);

        let plc = Arc::new(Self {
            nad,
            code: Mutex::new(code),
            data: Mutex::new(vec![0u8; 0x10000]),
            status: Mutex::new([1, 2]),
            online: AtomicBool::new(true),
            requests: AtomicUsize::new(0),
            alc_zip,
            code_crc: Mutex::new(0),
            activity: Arc::new(PlcActivityService::new()),
        });
        plc.load_program(0x1234, 2024, 1);
        plc
    }

    /// Write a program head with the given crc and timestamp
    pub(crate) fn load_program(&self, code_crc: u16, year: i32, minute: u32) {
        let stamp = NaiveDate::from_ymd_opt(year, 1, 1)
            .and_then(|d| d.and_hms_opt(0, minute, 0))
            .map(to_cybro_timestamp)
            .unwrap_or(0);
        let mut head = head_bytes(0, 31415, code_crc, stamp);
        head[0x40..0x44].copy_from_slice(&TABLE_ADDR.to_le_bytes());
        head[0x44..0x46].copy_from_slice(&2u16.to_le_bytes());
        self.code.lock()[HEAD_ADDR..HEAD_ADDR + head.len()].copy_from_slice(&head);
        *self.code_crc.lock() = code_crc;
    }

    pub(crate) fn clear_program(&self) {
        self.code.lock()[HEAD_ADDR] = 1;
    }

    pub(crate) fn set_status(&self, system: u8, plc: u8) {
        *self.status.lock() = [system, plc];
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub(crate) fn set_data(&self, addr: usize, bytes: &[u8]) {
        self.data.lock()[addr..addr + bytes.len()].copy_from_slice(bytes);
    }

    pub(crate) fn data(&self, addr: usize, len: usize) -> Vec<u8> {
        self.data.lock()[addr..addr + len].to_vec()
    }

    pub(crate) fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn code_crc(&self) -> u16 {
        *self.code_crc.lock()
    }

    pub(crate) fn alc_zip(&self) -> Vec<u8> {
        self.alc_zip.clone()
    }

    pub(crate) fn activity(&self) -> Arc<PlcActivityService> {
        self.activity.clone()
    }

    pub(crate) fn ip(&self) -> IpAddr {
        IpAddr::from([10, 0, 0, (self.nad % 250) as u8 + 1])
    }

    pub(crate) fn info(&self) -> PlcInfo {
        PlcInfoService::new(None).create(PlcOrigin::Auto, self.nad, Some(self.ip()), None, None, None)
    }

    pub(crate) fn context(self: &Arc<Self>, max_frame_bytes: usize) -> ClientContext {
        ClientContext {
            exchanger: self.clone(),
            activity: self.activity.clone(),
            ids: Arc::new(TransactionIdGenerator::default()),
            max_frame_bytes,
            task_runner: Arc::new(InlineTaskRunner),
        }
    }

    pub(crate) fn client(self: &Arc<Self>) -> PlcClient {
        self.client_with_frame(1000)
    }

    pub(crate) fn client_with_frame(self: &Arc<Self>, max_frame_bytes: usize) -> PlcClient {
        match PlcClient::new(self.info(), self.context(max_frame_bytes)) {
            Ok(client) => client,
            Err(e) => panic!("fake client: {e}"),
        }
    }

    fn respond(&self, body: &[u8]) -> Option<Vec<u8>> {
        let (&opcode, mut rest) = body.split_first()?;
        match opcode {
            op if op == Command::Ping as u8 || op == Command::WriteData as u8 => Some(Vec::new()),
            op if op == Command::ReadStatus as u8 => Some(self.status.lock().to_vec()),
            op if op == Command::ReadCode as u8 => {
                let segment = rest.get_u16_le() as usize;
                let size = rest.get_u16_le() as usize;
                let start = segment * 256;
                self.code.lock().get(start..start + size).map(<[u8]>::to_vec)
            },
            op if op == Command::ReadRandom as u8 => {
                let counts = [rest.get_u16_le(), rest.get_u16_le(), rest.get_u16_le()];
                let data = self.data.lock();
                let mut out = Vec::new();
                for (count, width) in counts.iter().zip([1usize, 2, 4]) {
                    for _ in 0..*count {
                        let addr = rest.get_u16_le() as usize;
                        out.extend_from_slice(&data[addr..addr + width]);
                    }
                }
                Some(out)
            },
            op if op == Command::WriteRandom as u8 => {
                let counts = [rest.get_u16_le(), rest.get_u16_le(), rest.get_u16_le()];
                let mut addrs = Vec::new();
                for (count, width) in counts.iter().zip([1usize, 2, 4]) {
                    for _ in 0..*count {
                        addrs.push((rest.get_u16_le() as usize, width));
                    }
                }
                let mut data = self.data.lock();
                for (addr, width) in addrs {
                    data[addr..addr + width].copy_from_slice(&rest[..width]);
                    rest.advance(width);
                }
                Some(Vec::new())
            },
            _ => None,
        }
    }
}

#[async_trait]
impl Exchange for FakePlc {
    async fn exchange(&self, request: AbusMessage) -> Result<AbusMessage> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let timeout = || ScgiSrvError::timeout(format!("c{} [{}]", request.to_nad, request.transaction_id));
        if !self.online.load(Ordering::SeqCst) || request.to_nad != self.nad {
            return Err(timeout());
        }
        let body = self.respond(&request.frame.body).ok_or_else(timeout)?;
        Ok(AbusMessage::new(
            request.addr,
            request.to_nad,
            request.from_nad,
            request.transaction_id,
            CommandFrame::new(Direction::Ack, 0, Bytes::from(body)),
        ))
    }
}

/// Several fake controllers behind one exchanger, picked by `to_nad`
pub(crate) struct FakeBus {
    plcs: Vec<Arc<FakePlc>>,
    activity: Arc<PlcActivityService>,
}

impl FakeBus {
    pub(crate) fn new(plcs: Vec<Arc<FakePlc>>) -> Arc<Self> {
        Arc::new(Self {
            plcs,
            activity: Arc::new(PlcActivityService::new()),
        })
    }

    pub(crate) fn activity(&self) -> Arc<PlcActivityService> {
        self.activity.clone()
    }

    pub(crate) fn context(self: &Arc<Self>, max_frame_bytes: usize) -> ClientContext {
        ClientContext {
            exchanger: self.clone(),
            activity: self.activity.clone(),
            ids: Arc::new(TransactionIdGenerator::default()),
            max_frame_bytes,
            task_runner: Arc::new(InlineTaskRunner),
        }
    }
}

#[async_trait]
impl Exchange for FakeBus {
    async fn exchange(&self, request: AbusMessage) -> Result<AbusMessage> {
        match self.plcs.iter().find(|plc| plc.nad == request.to_nad) {
            Some(plc) => plc.exchange(request).await,
            None => Err(ScgiSrvError::timeout(format!(
                "c{} [{}]",
                request.to_nad, request.transaction_id
            ))),
        }
    }
}
