//! Relay session statistics

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::db::{RelayUpdate, Repository};
use crate::error::Result;
use crate::plc::{PlcInfoService, PlcOrigin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyActivity {
    pub last_msg: DateTime<Local>,
    pub last_plc_nad: u32,
    /// Messages from the session towards controllers
    pub msg_count_rx: u64,
    /// Messages from controllers back to the session
    pub msg_count_tx: u64,
}

impl ProxyActivity {
    fn new(last_plc_nad: u32) -> Self {
        Self {
            last_msg: Local::now(),
            last_plc_nad,
            msg_count_rx: 0,
            msg_count_tx: 0,
        }
    }
}

pub struct ProxyActivityService {
    infos: Arc<PlcInfoService>,
    repository: Arc<dyn Repository>,
    activities: Mutex<BTreeMap<u32, ProxyActivity>>,
}

impl ProxyActivityService {
    pub fn new(infos: Arc<PlcInfoService>, repository: Arc<dyn Repository>) -> Self {
        Self {
            infos,
            repository,
            activities: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn report_to_plc(&self, session_id: u32, nad: u32) {
        self.report(session_id, nad, |a| a.msg_count_rx += 1);
    }

    pub fn report_from_plc(&self, session_id: u32, nad: u32) {
        self.report(session_id, nad, |a| a.msg_count_tx += 1);
    }

    fn report(&self, session_id: u32, nad: u32, count: impl FnOnce(&mut ProxyActivity)) {
        let mut activities = self.activities.lock();
        let activity = activities
            .entry(session_id)
            .or_insert_with(|| ProxyActivity::new(nad));
        count(activity);
        activity.last_msg = Local::now();
        activity.last_plc_nad = nad;
    }

    /// Snapshot ordered by session id
    pub fn entries(&self) -> Vec<(u32, ProxyActivity)> {
        self.activities
            .lock()
            .iter()
            .map(|(id, a)| (*id, a.clone()))
            .collect()
    }

    pub fn get(&self, session_id: u32) -> Option<ProxyActivity> {
        self.activities.lock().get(&session_id).cloned()
    }

    /// Write session counters to the relays table and drop sessions that
    /// were disabled there
    pub async fn update_from_db(&self) -> Result<()> {
        let sessions: Vec<u32> = self
            .infos
            .plc_infos_by_origin(PlcOrigin::Proxy)
            .iter()
            .map(|info| info.nad)
            .collect();

        for session_id in &sessions {
            let Some(activity) = self.get(*session_id) else {
                continue;
            };
            let update = RelayUpdate {
                message_count_rx: activity.msg_count_rx,
                message_count_tx: activity.msg_count_tx,
                last_message: activity.last_msg.naive_local(),
                last_controller_nad: activity.last_plc_nad,
            };
            if let Err(e) = self.repository.update_relay(*session_id, &update).await {
                error!("Relay session {} not updated: {}", session_id, e);
            }
        }

        let enabled = self.repository.enabled_sessions_in(&sessions).await?;
        for session_id in sessions.iter().filter(|id| !enabled.contains(id)) {
            debug!("Relay session {} no longer enabled", session_id);
            self.infos.remove_plc_info(*session_id);
            self.activities.lock().remove(session_id);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::db::InMemoryRepository;

    fn service() -> (ProxyActivityService, Arc<PlcInfoService>, Arc<InMemoryRepository>) {
        let infos = Arc::new(PlcInfoService::new(None));
        let repo = Arc::new(InMemoryRepository::new());
        let service = ProxyActivityService::new(infos.clone(), repo.clone());
        (service, infos, repo)
    }

    #[test]
    fn test_counters() {
        let (service, _, _) = service();
        service.report_to_plc(7, 1000);
        service.report_to_plc(7, 1001);
        service.report_from_plc(7, 1001);

        let activity = service.get(7).unwrap();
        assert_eq!(activity.msg_count_rx, 2);
        assert_eq!(activity.msg_count_tx, 1);
        assert_eq!(activity.last_plc_nad, 1001);
        assert_eq!(service.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_update_flushes_and_prunes() {
        let (service, infos, repo) = service();
        repo.add_relay(7, true);
        repo.add_relay(8, true);
        for session in [7, 8] {
            infos.update(session, Some("10.0.0.9".parse().unwrap()), Some(9000), PlcOrigin::Proxy);
            service.report_to_plc(session, 1000);
        }

        service.update_from_db().await.unwrap();
        let row = repo.relay(7).unwrap().update.unwrap();
        assert_eq!(row.message_count_rx, 1);
        assert_eq!(row.last_controller_nad, 1000);
        assert!(infos.contains(8));

        repo.set_relay_enabled(8, false);
        service.update_from_db().await.unwrap();
        assert!(!infos.contains(8));
        assert!(service.get(8).is_none());
        assert!(infos.contains(7));
    }
}
