//! Read plans shared between runs of the same task
//!
//! Keyed by task, controller and program crc. Concurrent runs of one task
//! wait for the first one to build the plan instead of translating the tags
//! again. Controllers running the same program still get their own plans.

use std::sync::Arc;

use super::tasks::TaskId;
use crate::rw::processor::ReadPlan;
use crate::utils::AsyncCache;

type Key = (TaskId, u32, u16);

#[derive(Default)]
pub struct DataLoggerCache {
    plans: AsyncCache<Key, Arc<ReadPlan>>,
}

impl DataLoggerCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, task_id: TaskId, nad: u32, crc: u16) -> Option<Arc<ReadPlan>> {
        self.plans.get(&(task_id, nad, crc)).await
    }

    /// Announce a plan being built; waiters are released when the
    /// reservation is fulfilled or dropped
    pub fn reserve(&self, task_id: TaskId, nad: u32, crc: u16) -> Reservation<'_> {
        self.plans.set_future((task_id, nad, crc));
        Reservation {
            cache: self,
            key: Some((task_id, nad, crc)),
        }
    }

    pub fn clear(&self) {
        self.plans.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

pub struct Reservation<'a> {
    cache: &'a DataLoggerCache,
    key: Option<Key>,
}

impl Reservation<'_> {
    pub fn fulfil(mut self, plan: Arc<ReadPlan>) {
        if let Some(key) = self.key.take() {
            self.cache.plans.set_result(&key, plan);
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.cache.plans.cancel(&key);
        }
    }
}
