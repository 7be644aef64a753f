//! One client per reachable controller
//!
//! Follows the registry: a record with an ip gets a client right away, a
//! static record without one resolves to `None`, anything else is looked
//! up by autodetection while callers wait on the pending slot.

use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tracing::{info, warn};

use super::client::{ClientContext, PlcClient};
use super::detection::Detect;
use super::info::{PlcInfo, PlcOrigin};
use super::info_service::{PlcInfoListener, PlcInfoService};
use crate::utils::AsyncCache;

pub struct PlcClientManager {
    infos: Arc<PlcInfoService>,
    detection: Option<Arc<dyn Detect>>,
    ctx: ClientContext,
    clients: AsyncCache<u32, Option<Arc<PlcClient>>>,
    this: Weak<Self>,
}

impl PlcClientManager {
    /// Create the manager and register it as the registry listener
    pub fn new(
        infos: Arc<PlcInfoService>,
        detection: Option<Arc<dyn Detect>>,
        ctx: ClientContext,
    ) -> Arc<Self> {
        let manager = Arc::new_cyclic(|this| Self {
            infos: infos.clone(),
            detection,
            ctx,
            clients: AsyncCache::new(),
            this: this.clone(),
        });
        let listener: Arc<dyn PlcInfoListener> = manager.clone();
        infos.set_listener(Arc::downgrade(&listener));
        manager
    }

    pub fn plc_info_service(&self) -> &Arc<PlcInfoService> {
        &self.infos
    }

    /// Client for `nad`, starting autodetection for unknown controllers
    pub async fn get(&self, nad: u32) -> Option<Arc<PlcClient>> {
        if !self.clients.contains(&nad) {
            let info = self.infos.create(PlcOrigin::Auto, nad, None, None, None, None);
            self.infos.set_plc_info(info);
        }
        self.clients.get(&nad).await.flatten()
    }

    fn set(&self, nad: u32, client: Option<Arc<PlcClient>>) {
        match &client {
            Some(client) => info!("Added plc client c{}: {}", nad, client.info()),
            None => info!("Added plc client c{}", nad),
        }
        if !self.clients.is_pending(&nad) {
            self.clients.set_future(nad);
        }
        self.clients.set_result(&nad, client);
    }

    fn remove(&self, nad: u32) {
        self.clients.cancel(&nad);
        info!("Removed plc client c{}", nad);
    }

    fn create_client(&self, info: &PlcInfo) -> Option<Arc<PlcClient>> {
        match PlcClient::new(info.clone(), self.ctx.clone()) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Failed to create plc client c{}: {}", info.nad, e);
                None
            },
        }
    }

    fn start_autodetect(&self, info: &PlcInfo) {
        let nad = info.nad;
        self.clients.cancel(&nad);
        self.clients.set_future(nad);

        let (Some(detection), Some(manager), Ok(handle)) =
            (self.detection.clone(), self.this.upgrade(), Handle::try_current())
        else {
            self.clients.cancel(&nad);
            return;
        };

        info!("Set pending plc client c{}", nad);
        let info = info.clone();
        handle.spawn(async move {
            match detection.detect(&info).await {
                Ok(ip) => {
                    manager.infos.update(nad, Some(ip), None, PlcOrigin::Auto);
                },
                Err(e) => {
                    warn!("Autodetect of c{} failed: {}", nad, e);
                    manager.remove(nad);
                },
            }
        });
    }
}

impl PlcInfoListener for PlcClientManager {
    fn on_plc_info_set(&self, info: &PlcInfo) {
        if info.origin == PlcOrigin::Proxy {
            return;
        }
        if info.ip.is_some() {
            let client = self.create_client(info);
            self.set(info.nad, client);
        } else if info.origin == PlcOrigin::Static {
            self.set(info.nad, None);
        } else {
            self.start_autodetect(info);
        }
    }

    fn on_plc_info_removed(&self, nad: u32) {
        self.remove(nad);
    }
}
