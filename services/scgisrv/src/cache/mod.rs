//! Per-controller response caches
//!
//! Values are served FRESH, served and refreshed in the background while
//! STINKY, and refetched once STALE. Caching is off when
//! `cache.valid_period_s` is 0.

pub mod facade;
pub mod single;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::config::CacheConfig;

pub use facade::{CacheFacade, CacheReadResult, PendingReads};
pub use single::{CacheValue, Condition, SinglePlcCache};

pub struct PlcCache {
    request_period: Duration,
    valid_period: Duration,
    caches: Mutex<HashMap<u32, Arc<SinglePlcCache>>>,
}

impl PlcCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            request_period: config.request_period(),
            valid_period: config.valid_period(),
            caches: Mutex::new(HashMap::new()),
        }
    }

    /// Cache of `nad`, created on first use
    pub fn get(&self, nad: u32) -> Arc<SinglePlcCache> {
        self.caches
            .lock()
            .entry(nad)
            .or_insert_with(|| Arc::new(SinglePlcCache::new(self.request_period, self.valid_period)))
            .clone()
    }

    pub fn facade(&self, nad: u32) -> CacheFacade {
        CacheFacade::new(self.get(nad))
    }

    pub fn cleanup(&self) -> usize {
        let caches: Vec<_> = self.caches.lock().values().cloned().collect();
        caches.iter().map(|cache| cache.cleanup()).sum()
    }

    /// Periodic cleanup; nothing is spawned for a zero period
    pub fn spawn_cleanup(
        self: Arc<Self>,
        period: Duration,
        cancel: CancellationToken,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if period.is_zero() {
            return None;
        }
        Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = self.cleanup();
                        if removed > 0 {
                            debug!("Cache cleanup removed {} values", removed);
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("Cache cleanup stopping");
                        break;
                    }
                }
            }
        }))
    }
}
