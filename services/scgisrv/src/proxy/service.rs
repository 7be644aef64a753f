//! Relay forwarding
//!
//! Messages from peers the router does not know end up here. A peer with an
//! enabled relay session talks to controllers through the gateway; anything
//! else is treated as a controller answering a session.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::activity::ProxyActivityService;
use crate::abus::{AbusMessage, CommandFrame};
use crate::db::Repository;
use crate::plc::{PlcClientManager, PlcInfo, PlcInfoService, PlcOrigin};

pub struct ProxyService {
    infos: Arc<PlcInfoService>,
    manager: Arc<PlcClientManager>,
    activity: Arc<ProxyActivityService>,
    repository: Arc<dyn Repository>,
    raw_tx: mpsc::UnboundedSender<AbusMessage>,
}

impl ProxyService {
    pub fn new(
        manager: Arc<PlcClientManager>,
        activity: Arc<ProxyActivityService>,
        repository: Arc<dyn Repository>,
        raw_tx: mpsc::UnboundedSender<AbusMessage>,
    ) -> Self {
        Self {
            infos: manager.plc_info_service().clone(),
            manager,
            activity,
            repository,
            raw_tx,
        }
    }

    fn session(&self, nad: u32) -> Option<PlcInfo> {
        self.infos
            .get_plc_info(nad)
            .ok()
            .filter(|info| info.origin == PlcOrigin::Proxy)
    }

    async fn is_enabled_session(&self, session_id: u32) -> bool {
        match self.repository.exists_in_relays(session_id).await {
            Ok(exists) => exists,
            Err(e) => {
                error!("Relay lookup for {} failed: {}", session_id, e);
                false
            },
        }
    }

    /// Messages to send in reply to `msg`, possibly none
    pub async fn handle_message(&self, mut msg: AbusMessage) -> Vec<AbusMessage> {
        let from_nad = msg.from_nad;

        if self.session(from_nad).is_some() {
            self.activity.report_to_plc(from_nad, msg.to_nad);
            return self.to_plc(msg).await;
        }

        if self.is_enabled_session(from_nad).await {
            self.activity.report_to_plc(from_nad, msg.to_nad);
            self.infos.update(
                from_nad,
                Some(msg.addr.ip()),
                Some(msg.addr.port()),
                PlcOrigin::Proxy,
            );
            return self.to_plc(msg).await;
        }

        // a controller answering a session
        match self.session(msg.to_nad).and_then(|session| session.addr()) {
            Some(addr) => {
                self.activity.report_from_plc(msg.to_nad, from_nad);
                msg.addr = addr;
                vec![msg]
            },
            None => Vec::new(),
        }
    }

    async fn to_plc(&self, mut msg: AbusMessage) -> Vec<AbusMessage> {
        if msg.to_nad == 0 {
            return self
                .infos
                .non_proxy_plc_infos()
                .iter()
                .map(|info| Self::autodetect_ack(info, &msg))
                .collect();
        }

        let Some(client) = self.manager.get(msg.to_nad).await else {
            return Vec::new();
        };
        match client.info().addr() {
            Some(addr) => {
                msg.addr = addr;
                vec![msg]
            },
            None => Vec::new(),
        }
    }

    /// Answer to a session's nad 0 detection, as if `info`'s controller had
    /// replied itself
    fn autodetect_ack(info: &PlcInfo, request: &AbusMessage) -> AbusMessage {
        AbusMessage::new(
            request.addr,
            info.nad,
            request.from_nad,
            request.transaction_id,
            CommandFrame::autodetect_response(),
        )
    }

    /// Forward messages routed from the comm thread until cancelled
    pub fn spawn(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<AbusMessage>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Proxy service started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(msg) => {
                            let service = self.clone();
                            tokio::spawn(async move { service.forward(msg).await });
                        },
                        None => break,
                    },
                }
            }
            info!("Proxy service stopped");
        })
    }

    async fn forward(&self, msg: AbusMessage) {
        debug!("Proxy received {}", msg);
        for reply in self.handle_message(msg).await {
            debug!("Proxy sending {}", reply);
            if self.raw_tx.send(reply).is_err() {
                error!("Communication thread gone, proxy message dropped");
                return;
            }
        }
    }
}
