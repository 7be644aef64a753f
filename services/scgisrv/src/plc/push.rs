//! Push announcements
//!
//! A controller with push enabled periodically sends a message to nad 0.
//! Acknowledging it tells the controller we are listening; the source
//! address becomes its registry entry.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::info::PlcOrigin;
use super::info_service::PlcInfoService;
use crate::abus::{AbusMessage, CommandFrame};
use crate::comm::Exchange;
use crate::core::constants::{ABUS_PORT, PUSH_NAD};
use crate::utils::TransactionIdGenerator;

#[derive(Debug, Default)]
pub struct PushActivity {
    received: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl PushActivity {
    pub fn push_requests_received_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn successful_push_acknowledgments_count(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed_push_acknowledgments_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

pub struct PushService {
    exchanger: Arc<dyn Exchange>,
    infos: Arc<PlcInfoService>,
    activity: Arc<PushActivity>,
    ids: TransactionIdGenerator,
}

impl PushService {
    pub fn new(
        exchanger: Arc<dyn Exchange>,
        infos: Arc<PlcInfoService>,
        activity: Arc<PushActivity>,
    ) -> Self {
        Self {
            exchanger,
            infos,
            activity,
            ids: TransactionIdGenerator::default(),
        }
    }

    pub fn activity(&self) -> &Arc<PushActivity> {
        &self.activity
    }

    pub async fn handle_push(&self, msg: AbusMessage) {
        self.activity.received.fetch_add(1, Ordering::Relaxed);
        let nad = msg.from_nad;
        debug!("Push from c{} received", nad);

        let ack = AbusMessage::new(msg.addr, PUSH_NAD, nad, self.ids.next_id(), CommandFrame::push_ack());
        match self.exchanger.exchange(ack).await {
            Ok(_) => {
                self.activity.succeeded.fetch_add(1, Ordering::Relaxed);
                self.infos
                    .update(nad, Some(msg.addr.ip()), Some(ABUS_PORT), PlcOrigin::Push);
                debug!("Push from c{} acknowledged", nad);
            },
            Err(e) => {
                self.activity.failed.fetch_add(1, Ordering::Relaxed);
                error!("Push from c{} acknowledgment failed: {}", nad, e);
            },
        }
    }

    /// Handle pushes routed from the comm thread until cancelled
    pub fn spawn(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<AbusMessage>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Push service started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(msg) if msg.is_push() => {
                            let service = self.clone();
                            tokio::spawn(async move { service.handle_push(msg).await });
                        },
                        Some(msg) => debug!("Ignored non-push message {}", msg),
                        None => break,
                    },
                }
            }
            info!("Push service stopped");
        })
    }
}
