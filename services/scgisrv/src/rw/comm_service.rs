//! Tag reads and writes for one controller at a time

use std::sync::Arc;

use tracing::{debug, error};

use super::communicator::PlcCommunicator;
use super::request::RwRequest;
use super::response::{responses_with_code, Code, RResponse};
use crate::alc::AlcService;
use crate::cache::PlcCache;
use crate::datalogger::{DataLoggerCache, TaskId};
use crate::plc::{PlcActivityService, PlcClient, PlcClientManager, PlcInfoService};

pub struct PlcCommService {
    infos: Arc<PlcInfoService>,
    alc: Arc<AlcService>,
    activity: Arc<PlcActivityService>,
    manager: Arc<PlcClientManager>,
    cache: Option<Arc<PlcCache>>,
    data_logger_cache: Arc<DataLoggerCache>,
}

impl PlcCommService {
    pub fn new(
        manager: Arc<PlcClientManager>,
        alc: Arc<AlcService>,
        activity: Arc<PlcActivityService>,
        cache: Option<Arc<PlcCache>>,
        data_logger_cache: Arc<DataLoggerCache>,
    ) -> Arc<Self> {
        Arc::new(Self {
            infos: manager.plc_info_service().clone(),
            alc,
            activity,
            manager,
            cache,
            data_logger_cache,
        })
    }

    /// Responses for `reads`, in request order
    ///
    /// Writes go out before the reads. Data logger reads (`task_id` set)
    /// never carry writes and bypass the response cache.
    pub async fn process_rw_requests(
        self: &Arc<Self>,
        nad: u32,
        reads: &[RwRequest],
        writes: &[RwRequest],
        task_id: Option<TaskId>,
    ) -> Vec<RResponse> {
        let responses = self.process(nad, reads, writes, task_id).await;
        debug!("RW Results c{} - {} responses", nad, responses.len());
        responses
    }

    async fn process(
        self: &Arc<Self>,
        nad: u32,
        reads: &[RwRequest],
        writes: &[RwRequest],
        task_id: Option<TaskId>,
    ) -> Vec<RResponse> {
        let Some(client) = self.manager.get(nad).await.filter(|c| c.info().ip.is_some()) else {
            return responses_with_code(reads, Code::DeviceNotFound);
        };

        let cache = self.cache.as_ref().map(|cache| cache.facade(nad));
        let mut communicator = PlcCommunicator::new(self.clone(), client, cache.clone());

        if let Some(task_id) = task_id {
            if !writes.is_empty() {
                error!(
                    "{} write requests came from the data logger. They will be ignored.",
                    writes.len()
                );
            }
            return communicator.process_for_data_logger(reads, task_id).await;
        }

        let Some(cache) = cache.filter(|_| writes.is_empty()) else {
            return communicator.process_rw_requests(reads, writes).await;
        };

        let lookup = cache.read(reads).await;
        let mut slots: Vec<Option<RResponse>> = vec![None; reads.len()];
        for (idx, response) in lookup.fresh {
            slots[idx] = Some(response);
        }

        let postponable: Vec<RwRequest> = lookup.stinky.iter().map(|(idx, _)| reads[*idx].clone()).collect();
        for (idx, response) in lookup.stinky {
            slots[idx] = Some(response);
        }
        if !postponable.is_empty() {
            debug!("Fetch postponable");
            let mut background = communicator.clone();
            tokio::spawn(async move {
                background.process_rw_requests(&postponable, &[]).await;
            });
        }

        if !lookup.not_available.is_empty() {
            let urgent: Vec<RwRequest> = lookup.not_available.iter().map(|idx| reads[*idx].clone()).collect();
            let responses = communicator.process_rw_requests(&urgent, &[]).await;
            for (idx, response) in lookup.not_available.into_iter().zip(responses) {
                slots[idx] = Some(response);
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// Forget the controller's address so the next lookup detects it again
    pub(crate) async fn refresh_client(&self, nad: u32) -> Option<Arc<PlcClient>> {
        self.infos.remove_plc_info(nad);
        self.manager.get(nad).await
    }

    pub fn infos(&self) -> &Arc<PlcInfoService> {
        &self.infos
    }

    pub fn alc(&self) -> &Arc<AlcService> {
        &self.alc
    }

    pub fn activity(&self) -> &Arc<PlcActivityService> {
        &self.activity
    }

    pub fn manager(&self) -> &Arc<PlcClientManager> {
        &self.manager
    }

    pub fn data_logger_cache(&self) -> &Arc<DataLoggerCache> {
        &self.data_logger_cache
    }
}
