//! One read/write batch against one controller
//!
//! Every attempt checks the program head first, resolves the allocation
//! list by code crc, writes, then reads. Clients found by push, proxy or
//! autodetection get a second attempt after their address is looked up
//! again; static ones fail fast.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::comm_service::PlcCommService;
use super::processor;
use super::request::RwRequest;
use super::response::{responses_with_code, Code, RResponse};
use crate::alc::Alc;
use crate::cache::CacheFacade;
use crate::datalogger::TaskId;
use crate::error::{Result, ScgiSrvError};
use crate::plc::{PlcClient, PlcOrigin};
use crate::utils::text::latin1_decode;
use crate::utils::unzip::unzip;

#[derive(Clone, Copy)]
enum Mode<'a> {
    ReadWrite(&'a [RwRequest]),
    DataLogger(TaskId),
}

#[derive(Clone)]
pub struct PlcCommunicator {
    service: Arc<PlcCommService>,
    client: Arc<PlcClient>,
    cache: Option<CacheFacade>,
}

impl PlcCommunicator {
    pub fn new(service: Arc<PlcCommService>, client: Arc<PlcClient>, cache: Option<CacheFacade>) -> Self {
        Self {
            service,
            client,
            cache,
        }
    }

    pub async fn process_rw_requests(&mut self, reads: &[RwRequest], writes: &[RwRequest]) -> Vec<RResponse> {
        let pending = self.cache.as_ref().map(|cache| cache.start_futures(reads));
        let responses = self.with_retries(reads, Mode::ReadWrite(writes)).await;
        if let Some(pending) = pending {
            pending.complete(&responses);
        }
        responses
    }

    pub async fn process_for_data_logger(&mut self, reads: &[RwRequest], task_id: TaskId) -> Vec<RResponse> {
        self.with_retries(reads, Mode::DataLogger(task_id)).await
    }

    async fn with_retries(&mut self, reads: &[RwRequest], mode: Mode<'_>) -> Vec<RResponse> {
        let nad = self.client.nad();
        let max_tries = if self.client.info().origin == PlcOrigin::Static { 1 } else { 2 };

        for attempt in 1..=max_tries {
            if attempt > 1 {
                match self.service.refresh_client(nad).await {
                    Some(client) => self.client = client,
                    None => {
                        warn!("c{}: no client after refresh", nad);
                        break;
                    },
                }
            }

            let result = match mode {
                Mode::ReadWrite(writes) => self.read_write(reads, writes).await,
                Mode::DataLogger(task_id) => self.read_for_data_logger(reads, task_id).await,
            };
            match result {
                Ok(responses) => return responses,
                Err(e) if e.is_timeout() => {
                    warn!("c{}: attempt {}/{} failed: {}", nad, attempt, max_tries, e)
                },
                Err(e) => {
                    warn!("c{}: exchange failed: {}", nad, e);
                    break;
                },
            }
        }
        responses_with_code(reads, Code::Timeout)
    }

    async fn read_write(&mut self, reads: &[RwRequest], writes: &[RwRequest]) -> Result<Vec<RResponse>> {
        let crc = match self.checked_crc().await? {
            Ok(crc) => crc,
            Err(code) => return Ok(responses_with_code(reads, code)),
        };
        let Some(alc) = self.get_alc(crc).await else {
            return Ok(responses_with_code(reads, Code::DeviceNotFound));
        };

        if !writes.is_empty() {
            processor::write(&self.client, writes, &alc).await;
        }
        let (responses, _) = processor::read(&self.client, reads, &alc).await;
        Ok(responses)
    }

    async fn read_for_data_logger(&mut self, reads: &[RwRequest], task_id: TaskId) -> Result<Vec<RResponse>> {
        let crc = match self.checked_crc().await? {
            Ok(crc) => crc,
            Err(code) => return Ok(responses_with_code(reads, code)),
        };

        let nad = self.client.nad();
        let service = self.service.clone();
        let cache = service.data_logger_cache();
        match cache.get(task_id, nad, crc).await {
            Some(plan) if plan.covers(reads) => {
                debug!("Read plan found (task: {} c{} crc: {})", task_id, nad, crc);
                self.service.activity().report_alc_crc_used(nad, Some(crc));
                return Ok(plan.execute(&self.client).await);
            },
            Some(_) => debug!("Read plan of task {} for c{} is outdated", task_id, nad),
            None => debug!("Read plan not found (task: {} c{} crc: {})", task_id, nad, crc),
        }

        let reservation = cache.reserve(task_id, nad, crc);
        let Some(alc) = self.get_alc(crc).await else {
            return Ok(responses_with_code(reads, Code::DeviceNotFound));
        };
        let (responses, plan) = processor::read(&self.client, reads, &alc).await;
        if let Some(plan) = plan {
            reservation.fulfil(Arc::new(plan));
        }
        Ok(responses)
    }

    /// Program crc, or the code every read gets when the program isn't usable
    async fn checked_crc(&mut self) -> Result<std::result::Result<u16, Code>> {
        match self.head_check().await {
            Ok(crc) => Ok(Ok(crc)),
            Err(ScgiSrvError::PlcHeadError(msg)) => {
                warn!("{}", msg);
                Ok(Err(Code::PlcHeadError))
            },
            Err(e) => Err(e),
        }
    }

    async fn head_check(&mut self) -> Result<u16> {
        let nad = self.client.nad();
        let head = self.client.read_plc_head().await?;
        if !head.is_ok() {
            return Err(ScgiSrvError::PlcHeadError(format!("c{nad}: plc head not ok")));
        }

        let program = head.program_timestamp;
        match self.client.info().program_datetime {
            None => {
                self.update_program_datetime(program).await;
                Ok(head.code_crc)
            },
            Some(known) if known != program => {
                info!("c{}: program changed ({} -> {})", nad, known, program);
                self.update_program_datetime(program).await;

                let head = self.client.read_plc_head().await?;
                if !head.is_ok() {
                    return Err(ScgiSrvError::PlcHeadError(format!("c{nad}: plc head not ok after reload")));
                }
                let status = self.client.read_status().await?;
                if !status.is_running() {
                    return Err(ScgiSrvError::PlcHeadError(format!("c{nad}: plc not running")));
                }
                Ok(head.code_crc)
            },
            Some(_) => Ok(head.code_crc),
        }
    }

    /// Record the new program time; the registry hands out a fresh client
    async fn update_program_datetime(&mut self, program: chrono::NaiveDateTime) {
        let nad = self.client.nad();
        if let Err(e) = self.service.infos().update_program_datetime(nad, program) {
            warn!("c{}: can't store program time: {}", nad, e);
            return;
        }
        if let Some(client) = self.service.manager().get(nad).await {
            self.client = client;
        }
    }

    async fn get_alc(&self, crc: u16) -> Option<Arc<Alc>> {
        let nad = self.client.nad();
        let alcs = self.service.alc();
        let alc = match alcs.get(u32::from(crc)) {
            Some(alc) => Some(alc),
            None => {
                info!("New crc for c{}: {:#06x}, reloading alc", nad, crc);
                match self.fetch_alc(crc).await {
                    Ok(alc) => Some(alc),
                    Err(e) => {
                        warn!("c{}: can't load alc: {}", nad, e);
                        None
                    },
                }
            },
        };
        self.service
            .activity()
            .report_alc_crc_used(nad, alc.as_ref().map(|_| crc));
        alc
    }

    async fn fetch_alc(&self, crc: u16) -> Result<Arc<Alc>> {
        let zipped = self.client.fetch_alc_file().await?;
        let text = latin1_decode(&unzip(zipped).await?);
        self.service.alc().set_alc_text(text, u32::from(crc))
    }
}
