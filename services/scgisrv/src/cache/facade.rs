//! Request/response view over `SinglePlcCache`

use std::sync::Arc;

use super::single::{CacheValue, Condition, SinglePlcCache};
use crate::rw::{RResponse, RwRequest};

/// Cache lookup, positions refer to the request slice
#[derive(Debug, Default)]
pub struct CacheReadResult {
    pub fresh: Vec<(usize, RResponse)>,
    pub stinky: Vec<(usize, RResponse)>,
    pub not_available: Vec<usize>,
}

#[derive(Clone)]
pub struct CacheFacade {
    cache: Arc<SinglePlcCache>,
}

impl CacheFacade {
    pub fn new(cache: Arc<SinglePlcCache>) -> Self {
        Self { cache }
    }

    /// Announce fetches of `requests`; waiters are released when the
    /// returned guard is completed or dropped
    pub fn start_futures(&self, requests: &[RwRequest]) -> PendingReads {
        for request in requests {
            self.cache.start_future(&request.tag_name);
        }
        PendingReads {
            cache: self.cache.clone(),
            names: requests.iter().map(|r| r.tag_name.clone()).collect(),
        }
    }

    /// Store valid responses, release waiters of failed ones
    pub fn write(&self, responses: &[RResponse]) {
        for response in responses {
            if response.valid {
                self.cache.set_value(
                    &response.tag_name,
                    response.value.clone(),
                    response.description.clone(),
                );
            } else {
                self.cache.cancel_future(&response.tag_name);
            }
        }
    }

    pub async fn read(&self, requests: &[RwRequest]) -> CacheReadResult {
        let mut result = CacheReadResult::default();
        let mut missing = Vec::new();

        for (idx, request) in requests.iter().enumerate() {
            match self.cache.get_value(&request.tag_name) {
                Some(value) if value.condition == Condition::Fresh => {
                    result.fresh.push((idx, cached_response(request, value)));
                },
                Some(value) if value.condition == Condition::Stinky => {
                    result.stinky.push((idx, cached_response(request, value)));
                },
                _ => missing.push(idx),
            }
        }

        // someone may already be fetching these
        for idx in missing {
            match self.cache.get_future_value(&requests[idx].tag_name).await {
                Some(value) => result.fresh.push((idx, cached_response(&requests[idx], value))),
                None => result.not_available.push(idx),
            }
        }
        result
    }
}

/// Fetches started by `CacheFacade::start_futures`
pub struct PendingReads {
    cache: Arc<SinglePlcCache>,
    names: Vec<String>,
}

impl PendingReads {
    /// Store the responses; names without one are cancelled
    pub fn complete(mut self, responses: &[RResponse]) {
        CacheFacade::new(self.cache.clone()).write(responses);
        self.names
            .retain(|name| !responses.iter().any(|r| &r.tag_name == name));
    }
}

impl Drop for PendingReads {
    fn drop(&mut self) {
        for name in self.names.drain(..) {
            self.cache.cancel_future(&name);
        }
    }
}

fn cached_response(request: &RwRequest, value: CacheValue) -> RResponse {
    RResponse {
        cached: true,
        ..RResponse::ok(request, value.value, value.description)
    }
}
