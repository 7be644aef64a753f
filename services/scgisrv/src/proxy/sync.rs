//! Periodic relay table synchronization

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::activity::ProxyActivityService;

pub struct ProxyDbSynchronizer {
    activity: Arc<ProxyActivityService>,
    period: Duration,
}

impl ProxyDbSynchronizer {
    pub fn new(activity: Arc<ProxyActivityService>, period: Duration) -> Self {
        Self { activity, period }
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + self.period, self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        debug!("Synchronizing with database");
                        if let Err(e) = self.activity.update_from_db().await {
                            error!("Relay synchronization failed: {}", e);
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("Relay synchronizer stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::db::InMemoryRepository;
    use crate::plc::{PlcInfoService, PlcOrigin};

    #[tokio::test(start_paused = true)]
    async fn test_prunes_on_each_period() {
        let infos = Arc::new(PlcInfoService::new(None));
        let repo = Arc::new(InMemoryRepository::new());
        let activity = Arc::new(ProxyActivityService::new(infos.clone(), repo.clone()));
        infos.update(9, Some("10.0.0.1".parse().unwrap()), Some(1), PlcOrigin::Proxy);

        let cancel = CancellationToken::new();
        let handle = ProxyDbSynchronizer::new(activity, Duration::from_secs(60)).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(infos.contains(9));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!infos.contains(9));

        cancel.cancel();
        handle.await.unwrap();
    }
}
