//! Entry point for tag requests
//!
//! Splits a request list by target and answers the groups concurrently:
//! system status, per-controller status, then controller memory.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use super::comm_service::PlcCommService;
use super::request::{RwRequest, Target};
use super::response::{Code, RResponse};
use crate::datalogger::{TagReader, TaskId};
use crate::scgi::RwHandler;
use crate::status::{PlcStatusService, SystemStatusService};

pub struct RwService {
    system_status: Arc<SystemStatusService>,
    plc_status: Arc<PlcStatusService>,
    plc_comm: Arc<PlcCommService>,
}

impl RwService {
    pub fn new(
        system_status: Arc<SystemStatusService>,
        plc_status: Arc<PlcStatusService>,
        plc_comm: Arc<PlcCommService>,
    ) -> Self {
        Self {
            system_status,
            plc_status,
            plc_comm,
        }
    }

    /// Responses grouped as system, controller status, controller tags;
    /// request order is kept inside each group
    ///
    /// Writes only reach controllers that also have reads in the batch.
    pub async fn on_rw_requests(
        &self,
        reads: &[RwRequest],
        writes: &[RwRequest],
        task_id: Option<TaskId>,
    ) -> Vec<RResponse> {
        let mut system = Vec::new();
        let mut plc_system = Vec::new();
        let mut plc = Vec::new();
        for request in reads {
            match request.target {
                Target::System => system.push(request.clone()),
                Target::PlcSystem => plc_system.push(request.clone()),
                Target::Plc => plc.push(request.clone()),
            }
        }

        let status_by_nad = group_by_nad(plc_system);
        let reads_by_nad = group_by_nad(plc);
        let writes_by_nad = group_by_nad(writes.to_vec());

        let plc_status = join_all(
            status_by_nad
                .iter()
                .map(|(nad, requests)| self.plc_status.process(*nad, requests)),
        );
        let plc_comm = join_all(reads_by_nad.iter().map(|(nad, requests)| {
            let writes = writes_by_nad
                .iter()
                .find(|(w_nad, _)| w_nad == nad)
                .map_or(&[][..], |(_, w)| w.as_slice());
            self.plc_comm.process_rw_requests(*nad, requests, writes, task_id)
        }));

        let (system, plc_status, plc_comm) =
            futures::join!(self.system_status.process(&system), plc_status, plc_comm);

        system
            .into_iter()
            .chain(plc_status.into_iter().flatten())
            .chain(plc_comm.into_iter().flatten())
            .collect()
    }
}

#[async_trait]
impl TagReader for RwService {
    async fn read_tags(&self, reads: &[RwRequest], task_id: TaskId) -> Vec<RResponse> {
        let responses = self.on_rw_requests(reads, &[], Some(task_id)).await;
        in_request_order(reads, responses)
    }
}

#[async_trait]
impl RwHandler for RwService {
    async fn on_rw_requests(&self, reads: &[RwRequest], writes: &[RwRequest]) -> Vec<RResponse> {
        RwService::on_rw_requests(self, reads, writes, None).await
    }
}

/// One response per request, matched by full name; unanswered ones time out
fn in_request_order(reads: &[RwRequest], responses: Vec<RResponse>) -> Vec<RResponse> {
    let mut by_name: HashMap<String, VecDeque<RResponse>> = HashMap::new();
    for response in responses {
        by_name.entry(response.name.clone()).or_default().push_back(response);
    }
    reads
        .iter()
        .map(|read| {
            by_name
                .get_mut(&read.name)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| RResponse::error(read, Code::Timeout))
        })
        .collect()
}

/// Requests per nad, nads in order of first appearance
fn group_by_nad(requests: Vec<RwRequest>) -> Vec<(u32, Vec<RwRequest>)> {
    let mut groups: Vec<(u32, Vec<RwRequest>)> = Vec::new();
    for request in requests {
        let Some(nad) = request.nad else {
            continue;
        };
        match groups.iter_mut().find(|(n, _)| *n == nad) {
            Some((_, group)) => group.push(request),
            None => groups.push((nad, vec![request])),
        }
    }
    groups
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::alc::AlcService;
    use crate::core::config::Config;
    use crate::datalogger::{DataLoggerActivityService, DataLoggerCache};
    use crate::db::InMemoryRepository;
    use crate::plc::fake::{FakeBus, FakePlc};
    use crate::plc::{PlcClientManager, PlcInfoService, PlcOrigin, PushActivity};
    use crate::proxy::ProxyActivityService;
    use crate::scgi::ScgiActivity;
    use crate::transport::UdpActivity;

    struct Fixture {
        plcs: Vec<Arc<FakePlc>>,
        service: RwService,
        _alc_dir: tempfile::TempDir,
    }

    /// Static controllers 1000 and 1001 running the same program
    fn fixture() -> Fixture {
        let plcs = vec![FakePlc::new(1000), FakePlc::new(1001)];
        let bus = FakeBus::new(plcs.clone());
        let infos = Arc::new(PlcInfoService::new(None));
        let manager = PlcClientManager::new(infos.clone(), None, bus.context(1000));
        for plc in &plcs {
            let nad = plc.info().nad;
            infos.set_plc_info(infos.create(PlcOrigin::Static, nad, Some(plc.ip()), None, None, None));
        }

        let alc_dir = tempfile::tempdir().unwrap();
        let alc = Arc::new(AlcService::new(alc_dir.path()));
        let plc_comm = PlcCommService::new(
            manager,
            alc.clone(),
            bus.activity(),
            None,
            Arc::new(DataLoggerCache::new()),
        );
        let system_status = Arc::new(SystemStatusService::new(
            Arc::new(Config::default()),
            infos.clone(),
            Arc::new(PushActivity::default()),
            Arc::new(ScgiActivity::new()),
            bus.activity(),
            Arc::new(UdpActivity::default()),
            Arc::new(DataLoggerActivityService::new()),
            Arc::new(ProxyActivityService::new(
                infos.clone(),
                Arc::new(InMemoryRepository::new()),
            )),
        ));
        let plc_status = Arc::new(PlcStatusService::new(infos, bus.activity(), alc));
        Fixture {
            plcs,
            service: RwService::new(system_status, plc_status, plc_comm),
            _alc_dir: alc_dir,
        }
    }

    fn reads(names: &[&str]) -> Vec<RwRequest> {
        names.iter().map(|n| RwRequest::read(n).unwrap()).collect()
    }

    #[tokio::test]
    async fn test_read_tags_answers_in_request_order() {
        let f = fixture();
        f.plcs[0].set_data(0x200, &7i16.to_le_bytes());
        f.plcs[0].set_data(0x100, &[1]);
        f.plcs[1].set_data(0x200, &99i16.to_le_bytes());

        let requests = reads(&["c1000.counter", "c1001.counter", "sys.nad_list", "c1000.lc00_qx00"]);
        for _ in 0..2 {
            let responses = f.service.read_tags(&requests, 5).await;
            let names: Vec<&str> = responses.iter().map(|r| r.name.as_str()).collect();
            assert_eq!(
                names,
                vec!["c1000.counter", "c1001.counter", "sys.nad_list", "c1000.lc00_qx00"]
            );
            assert_eq!(responses[0].value.to_string(), "7");
            assert_eq!(responses[1].value.to_string(), "99");
            assert_eq!(responses[3].value.to_string(), "1");
        }
    }

    #[test]
    fn test_missing_responses_time_out() {
        let requests = reads(&["c1.a", "c2.b", "c1.a"]);
        let responses = vec![
            RResponse::ok(&requests[1], "2", ""),
            RResponse::ok(&requests[0], "1", ""),
        ];
        let ordered = in_request_order(&requests, responses);
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered[0].value.to_string(), "1");
        assert_eq!(ordered[1].value.to_string(), "2");
        assert_eq!(ordered[2].code, Code::Timeout);
    }

    #[test]
    fn test_group_by_nad_keeps_first_seen_order() {
        let requests = ["c5.a", "c3.b", "c5.c"]
            .iter()
            .map(|n| RwRequest::read(n).unwrap())
            .collect();
        let groups = group_by_nad(requests);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, 5);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1[0].tag_name, "b");
    }
}
