//! Response cache of one controller

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::rw::ResponseValue;
use crate::utils::AsyncCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Condition {
    /// Serve without asking the controller
    Fresh,
    /// Serve, but refresh in the background
    Stinky,
    /// Fetch before answering
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheValue {
    pub value: ResponseValue,
    pub description: String,
    pub condition: Condition,
}

#[derive(Debug, Clone)]
struct Item {
    value: ResponseValue,
    description: String,
    expiry: Instant,
}

pub struct SinglePlcCache {
    request_period: Duration,
    valid_period: Duration,
    items: Mutex<HashMap<String, Item>>,
    pending: AsyncCache<String, Item>,
}

impl SinglePlcCache {
    pub fn new(request_period: Duration, valid_period: Duration) -> Self {
        Self {
            request_period,
            valid_period,
            items: Mutex::new(HashMap::new()),
            pending: AsyncCache::new(),
        }
    }

    pub fn get_value(&self, name: &str) -> Option<CacheValue> {
        let item = self.items.lock().get(name).cloned()?;
        Some(self.to_value(item))
    }

    /// Wait for a fetch started with `start_future`; `None` when none is running
    pub async fn get_future_value(&self, name: &str) -> Option<CacheValue> {
        let item = self.pending.get(&name.to_string()).await?;
        Some(self.to_value(item))
    }

    pub fn set_value(&self, name: &str, value: ResponseValue, description: String) {
        let item = Item {
            value,
            description,
            expiry: Instant::now() + self.valid_period,
        };
        self.items.lock().insert(name.to_string(), item.clone());

        let key = name.to_string();
        self.pending.set_result(&key, item);
        self.pending.cancel(&key);
    }

    pub fn start_future(&self, name: &str) {
        self.pending.set_future(name.to_string());
    }

    pub fn cancel_future(&self, name: &str) {
        self.pending.cancel(&name.to_string());
    }

    /// Drop stale items, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|_, item| self.condition_at(item.expiry, now) != Condition::Stale);
        before - items.len()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    fn to_value(&self, item: Item) -> CacheValue {
        CacheValue {
            condition: self.condition_at(item.expiry, Instant::now()),
            value: item.value,
            description: item.description,
        }
    }

    fn condition_at(&self, expiry: Instant, now: Instant) -> Condition {
        let stinky_from = expiry.checked_sub(self.request_period).unwrap_or(expiry);
        if now < stinky_from {
            Condition::Fresh
        } else if now < expiry {
            Condition::Stinky
        } else {
            Condition::Stale
        }
    }
}
