//! Inbound ABUS dispatch by destination nad

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use super::exchanger::Exchanger;
use crate::abus::AbusMessage;

/// Where messages for one nad end up
pub enum Receiver {
    Exchanger(Arc<Exchanger>),
    /// Forwarded to the main context
    Channel(mpsc::UnboundedSender<AbusMessage>),
}

#[derive(Default)]
pub struct Router {
    receivers: HashMap<u32, Receiver>,
    proxy: Option<mpsc::UnboundedSender<AbusMessage>>,
}

impl Router {
    pub fn new(proxy: Option<mpsc::UnboundedSender<AbusMessage>>) -> Self {
        Self {
            receivers: HashMap::new(),
            proxy,
        }
    }

    pub fn register(&mut self, nad: u32, receiver: Receiver) {
        self.receivers.insert(nad, receiver);
    }

    pub fn receive(&self, msg: AbusMessage) {
        if msg.to_nad == 0 && !msg.is_push() {
            self.forward_to_proxy(msg);
            return;
        }
        match self.receivers.get(&msg.to_nad) {
            Some(Receiver::Exchanger(exchanger)) => exchanger.receive(msg),
            Some(Receiver::Channel(tx)) => {
                if tx.send(msg).is_err() {
                    trace!("Receiver channel closed");
                }
            },
            None => self.forward_to_proxy(msg),
        }
    }

    fn forward_to_proxy(&self, msg: AbusMessage) {
        match &self.proxy {
            Some(tx) => {
                let _ = tx.send(msg);
            },
            None => trace!("No receiver for {}", msg),
        }
    }
}
