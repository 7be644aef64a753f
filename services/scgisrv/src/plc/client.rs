//! Commands against one controller

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Buf;
use tokio::time::Instant;
use tracing::debug;

use super::activity::PlcActivityService;
use super::chunking::{PreparedRead, ReadParams, ReadResults, RwChunker, WriteParams};
use super::head::{FileDescriptor, PlcHead, Status};
use super::info::PlcInfo;
use crate::abus::{AbusMessage, CommandFrame};
use crate::comm::Exchange;
use crate::core::constants::{
    ALC_FILE_NAME, CODE_SEGMENT_SIZE, FILE_DESCRIPTOR_SIZE, FILE_SYSTEM_ADDR, PLC_HEAD_SEGMENT,
    PLC_HEAD_SIZE, RW_NAD,
};
use crate::error::{Result, ScgiSrvError};
use crate::utils::task_runner::{self, TaskRunner};
use crate::utils::TransactionIdGenerator;

/// File system table location: address(4) + file count(2)
const FILE_SYSTEM_INFO_SIZE: u32 = 6;

/// Shared by every client the manager creates
#[derive(Clone)]
pub struct ClientContext {
    pub exchanger: Arc<dyn Exchange>,
    pub activity: Arc<PlcActivityService>,
    pub ids: Arc<TransactionIdGenerator>,
    pub max_frame_bytes: usize,
    pub task_runner: Arc<dyn TaskRunner>,
}

pub struct PlcClient {
    info: PlcInfo,
    addr: SocketAddr,
    ctx: ClientContext,
    chunker: RwChunker,
}

impl PlcClient {
    pub fn new(info: PlcInfo, ctx: ClientContext) -> Result<Self> {
        let addr = info
            .addr()
            .ok_or_else(|| ScgiSrvError::internal(format!("c{} has no ip", info.nad)))?;
        Ok(Self {
            chunker: RwChunker::new(ctx.max_frame_bytes),
            info,
            addr,
            ctx,
        })
    }

    pub fn info(&self) -> &PlcInfo {
        &self.info
    }

    pub fn nad(&self) -> u32 {
        self.info.nad
    }

    /// Exchange one frame and account for it; returns the response frame
    async fn send(&self, frame: CommandFrame) -> Result<CommandFrame> {
        let nad = self.info.nad;
        let tid = self.ctx.ids.next_or(self.info.password);
        let request = AbusMessage::new(self.addr, RW_NAD, nad, tid, frame);
        let request_size = request.size();

        self.ctx.activity.report_exchange_initiated(nad);
        let start = Instant::now();
        match self.ctx.exchanger.exchange(request).await {
            Ok(response) => {
                self.ctx.activity.report_exchange_succeeded(
                    nad,
                    request_size + response.size(),
                    start.elapsed(),
                );
                Ok(response.frame)
            },
            Err(e) => {
                self.ctx.activity.report_exchange_failed(nad);
                Err(e)
            },
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.send(CommandFrame::ping()).await.map(|_| ())
    }

    pub async fn acknowledge_push(&self) -> Result<()> {
        self.send(CommandFrame::push_ack()).await.map(|_| ())
    }

    pub async fn read_plc_head(&self) -> Result<PlcHead> {
        let head = self
            .send(CommandFrame::read_code_block(PLC_HEAD_SEGMENT, PLC_HEAD_SIZE))
            .await
            .and_then(|frame| PlcHead::decode(&frame.body));
        self.ctx
            .activity
            .report_plc_head_used(self.info.nad, head.as_ref().ok().cloned());
        head
    }

    pub async fn read_status(&self) -> Result<Status> {
        let status = self
            .send(CommandFrame::read_status())
            .await
            .and_then(|frame| Status::decode(&frame.body));
        self.ctx.activity.report_plc_status_used(
            self.info.nad,
            status.as_ref().ok().map(|s| s.plc_status),
        );
        status
    }

    /// Raw `alc.zip` from the controller file system
    pub async fn fetch_alc_file(&self) -> Result<Vec<u8>> {
        let info = self.read_code_memory(FILE_SYSTEM_ADDR, FILE_SYSTEM_INFO_SIZE).await?;
        let mut info = &info[..];
        if info.remaining() < FILE_SYSTEM_INFO_SIZE as usize {
            return Err(ScgiSrvError::frame("short file system info"));
        }
        let table_addr = info.get_u32_le();
        let file_count = info.get_u16_le();

        let table_size = u32::from(file_count) * FILE_DESCRIPTOR_SIZE as u32;
        let table = self.read_code_memory(table_addr, table_size).await?;
        let files = FileDescriptor::decode_table(&table)?;
        let alc = files
            .iter()
            .find(|f| f.name == ALC_FILE_NAME)
            .ok_or_else(|| ScgiSrvError::io(format!("c{}: no {} on controller", self.info.nad, ALC_FILE_NAME)))?;

        debug!("c{}: {} at {:#x}, {} bytes", self.info.nad, ALC_FILE_NAME, alc.address, alc.size);
        self.read_code_memory(alc.address, alc.size).await
    }

    /// Read `size` bytes of code memory, one segment at a time
    pub async fn read_code_memory(&self, addr: u32, size: u32) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(size as usize);
        for block in segment_reads(addr, size) {
            let segment = u16::try_from(block.segment)
                .map_err(|_| ScgiSrvError::frame(format!("code address {addr:#x} out of range")))?;
            let frame = self
                .send(CommandFrame::read_code_block(segment, block.len as u16))
                .await?;
            let chunk = frame.body.get(block.offset..block.len).ok_or_else(|| {
                ScgiSrvError::frame(format!(
                    "segment {:#x}: {} bytes, expected {}",
                    block.segment,
                    frame.body.len(),
                    block.len
                ))
            })?;
            data.extend_from_slice(chunk);
        }
        Ok(data)
    }

    /// Build the read frames on the task runner
    pub async fn prepare_read(&self, params: ReadParams) -> Result<Vec<PreparedRead>> {
        let chunker = self.chunker;
        task_runner::run(self.ctx.task_runner.as_ref(), move || chunker.prepare_read(params)).await?
    }

    pub async fn read_prepared(&self, prepared: &[PreparedRead]) -> Result<ReadResults> {
        let mut results = ReadResults::default();
        for read in prepared {
            debug!(
                "c{}: read {}, {}, {} (1B, 2B, 4B)",
                self.info.nad,
                read.one,
                read.two,
                read.four_types.len()
            );
            let frame = self.send(read.frame.clone()).await?;
            results.extend(read.decode(&frame.body)?);
        }
        Ok(results)
    }

    pub async fn read_random_memory(&self, params: ReadParams) -> Result<ReadResults> {
        let prepared = self.prepare_read(params).await?;
        self.read_prepared(&prepared).await
    }

    pub async fn write_random_memory(&self, params: WriteParams) -> Result<()> {
        debug!("c{}: write {} values", self.info.nad, params.len());
        let chunker = self.chunker;
        let frames =
            task_runner::run(self.ctx.task_runner.as_ref(), move || chunker.prepare_write(params)).await??;
        for frame in frames {
            self.send(frame).await?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SegmentRead {
    segment: u32,
    /// First byte of the block that belongs to the requested range
    offset: usize,
    /// Bytes read from the segment start
    len: usize,
}

fn segment_reads(addr: u32, size: u32) -> Vec<SegmentRead> {
    let first = addr / CODE_SEGMENT_SIZE;
    let first_offset = addr % CODE_SEGMENT_SIZE;
    let last = (addr + size) / CODE_SEGMENT_SIZE;
    let last_len = (first_offset + size) % CODE_SEGMENT_SIZE;

    (first..=last)
        .map(|segment| SegmentRead {
            segment,
            offset: if segment == first { first_offset as usize } else { 0 },
            len: if segment == last {
                last_len as usize
            } else {
                CODE_SEGMENT_SIZE as usize
            },
        })
        .filter(|read| read.len > read.offset)
        .collect()
}
