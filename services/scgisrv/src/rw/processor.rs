//! Memory reads and writes for translated tag requests

use tracing::{error, warn};

use super::plc_request::PlcRwRequests;
use super::request::RwRequest;
use super::response::{Code, RResponse};
use crate::alc::Alc;
use crate::plc::{PlcClient, PreparedRead, ReadResults};

/// Read frames of one request set, kept by the data logger to skip translation
#[derive(Debug, Clone)]
pub struct ReadPlan {
    pub requests: PlcRwRequests,
    pub prepared: Vec<PreparedRead>,
    /// Size of the request slice the plan was made for
    pub len: usize,
}

impl ReadPlan {
    /// Translate `requests` and build the frames on the client's task runner
    pub async fn prepare(client: &PlcClient, requests: &[RwRequest], alc: &Alc) -> crate::error::Result<Self> {
        let translated = PlcRwRequests::translate(requests, alc);
        let prepared = client.prepare_read(translated.read_params()).await?;
        Ok(Self {
            requests: translated,
            prepared,
            len: requests.len(),
        })
    }

    /// Plan was made for exactly these names, in this order
    pub fn covers(&self, requests: &[RwRequest]) -> bool {
        if requests.len() != self.len {
            return false;
        }
        let planned = self
            .requests
            .valid()
            .map(|r| (r.idx, &r.request))
            .chain(self.requests.invalid.iter().map(|(idx, r)| (*idx, r)));
        let mut seen = 0;
        for (idx, request) in planned {
            if requests.get(idx).map(|r| &r.name) != Some(&request.name) {
                return false;
            }
            seen += 1;
        }
        seen == self.len
    }

    pub async fn execute(&self, client: &PlcClient) -> Vec<RResponse> {
        match client.read_prepared(&self.prepared).await {
            Ok(results) => self.responses(Some(results)),
            Err(e) => {
                warn!("c{}: read failed: {}", client.nad(), e);
                self.responses(None)
            },
        }
    }

    /// Responses in request order; `None` means the read failed
    fn responses(&self, results: Option<ReadResults>) -> Vec<RResponse> {
        let mut slots: Vec<Option<RResponse>> = vec![None; self.len];
        for (idx, request) in &self.requests.invalid {
            slots[*idx] = Some(RResponse::error(request, Code::Unknown));
        }

        match results {
            Some(results) => {
                let values = results.one.into_iter().chain(results.two).chain(results.four);
                for (request, value) in self.requests.valid().zip(values) {
                    slots[request.idx] =
                        Some(RResponse::ok(&request.request, value.to_string(), request.description.clone()));
                }
            },
            None => {
                for request in self.requests.valid() {
                    slots[request.idx] = Some(RResponse::error(&request.request, Code::Timeout));
                }
            },
        }

        slots.into_iter().flatten().collect()
    }
}

/// Read `requests`, answering TIMEOUT for the whole batch when the exchange fails
pub async fn read(client: &PlcClient, requests: &[RwRequest], alc: &Alc) -> (Vec<RResponse>, Option<ReadPlan>) {
    match ReadPlan::prepare(client, requests, alc).await {
        Ok(plan) => (plan.execute(client).await, Some(plan)),
        Err(e) => {
            warn!("c{}: can't prepare read: {}", client.nad(), e);
            let translated = PlcRwRequests::translate(requests, alc);
            let plan = ReadPlan {
                requests: translated,
                prepared: Vec::new(),
                len: requests.len(),
            };
            (plan.responses(None), None)
        },
    }
}

/// Write the values of `requests`; failures are only logged
pub async fn write(client: &PlcClient, requests: &[RwRequest], alc: &Alc) {
    let translated = PlcRwRequests::translate(requests, alc);
    for (_, request) in &translated.invalid {
        warn!("c{}: can't write unknown tag {}", client.nad(), request.tag_name);
    }
    let params = translated.write_params();
    if params.is_empty() {
        return;
    }
    if let Err(e) = client.write_random_memory(params).await {
        error!("c{}: write failed: {}", client.nad(), e);
    }
}
