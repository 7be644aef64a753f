//! Periodic removal of registry entries nobody refreshed

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::info::{PlcInfo, PlcOrigin};
use super::info_service::PlcInfoService;
use crate::core::constants::{PLC_INFO_CLEAR_PERIOD, PLC_INFO_LIFETIME};

pub struct PlcInfoCleaner {
    infos: Arc<PlcInfoService>,
    auto_lifetime: Duration,
    push_lifetime: Duration,
    period: Duration,
}

impl PlcInfoCleaner {
    pub fn new(infos: Arc<PlcInfoService>, push_lifetime: Duration) -> Self {
        Self {
            infos,
            auto_lifetime: PLC_INFO_LIFETIME,
            push_lifetime,
            period: PLC_INFO_CLEAR_PERIOD,
        }
    }

    fn is_expired(&self, info: &PlcInfo, now: DateTime<Local>) -> bool {
        let lifetime = match info.origin {
            PlcOrigin::Static | PlcOrigin::Proxy => return false,
            PlcOrigin::Push => self.push_lifetime,
            PlcOrigin::Auto => self.auto_lifetime,
        };
        (now - info.last_update_time)
            .to_std()
            .is_ok_and(|age| age > lifetime)
    }

    /// Remove expired entries, returning their nads
    pub fn sweep(&self, now: DateTime<Local>) -> Vec<u32> {
        let expired: Vec<u32> = self
            .infos
            .plc_infos()
            .iter()
            .filter(|info| self.is_expired(info, now))
            .map(|info| info.nad)
            .collect();
        for nad in &expired {
            self.infos.remove_plc_info(*nad);
        }
        if !expired.is_empty() {
            debug!("Swept {} plc infos", expired.len());
        }
        expired
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + self.period, self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.sweep(Local::now());
                    }
                    _ = cancel.cancelled() => {
                        info!("Plc info cleaner stopping");
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

    fn registry() -> Arc<PlcInfoService> {
        let infos = Arc::new(PlcInfoService::new(None));
        for (nad, origin) in [
            (1, PlcOrigin::Static),
            (2, PlcOrigin::Push),
            (3, PlcOrigin::Auto),
            (4, PlcOrigin::Proxy),
        ] {
            infos.update(nad, Some(format!("10.0.0.{nad}").parse().unwrap()), None, origin);
        }
        infos
    }

    #[test]
    fn test_sweep_by_origin() {
        let infos = registry();
        let cleaner = PlcInfoCleaner::new(infos.clone(), Duration::from_secs(24 * 3600));

        assert!(cleaner.sweep(Local::now()).is_empty());

        let later = Local::now() + chrono::Duration::minutes(11);
        assert_eq!(cleaner.sweep(later), vec![3]);

        let much_later = Local::now() + chrono::Duration::hours(25);
        assert_eq!(cleaner.sweep(much_later), vec![2]);
        let left: Vec<u32> = infos.plc_infos().iter().map(|i| i.nad).collect();
        assert_eq!(left, vec![1, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_cleaner_stops() {
        let cleaner = PlcInfoCleaner::new(registry(), Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let task = cleaner.spawn(cancel.clone());
        tokio::time::sleep(PLC_INFO_CLEAR_PERIOD * 2).await;
        cancel.cancel();
        task.await.unwrap();
    }
}
