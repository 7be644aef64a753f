//! Request/response correlation
//!
//! One `Exchanger` per logical peer class (push, detection, read/write).
//! A single worker task on the comm runtime pops queued requests, sends
//! them and waits for the response carrying the reversed exchange tag.
//! Only one request is in flight at a time; the wire has no multiplexing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::abus::{AbusMessage, ExchangeTag};
use crate::error::{Result, ScgiSrvError};

/// Outgoing side of the ABUS stack
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, msg: &AbusMessage) -> Result<()>;
}

/// Send a request and wait for its response
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(&self, request: AbusMessage) -> Result<AbusMessage>;
}

/// Queued request plus the slot its outcome goes to
pub struct ExchangeJob {
    pub request: AbusMessage,
    pub reply: oneshot::Sender<Result<AbusMessage>>,
}

struct Pending {
    tag: ExchangeTag,
    tx: Option<oneshot::Sender<AbusMessage>>,
}

pub struct Exchanger {
    name: &'static str,
    sink: Arc<dyn MessageSink>,
    timeout: Duration,
    attempts: u32,
    pending: Mutex<Option<Pending>>,
}

impl Exchanger {
    /// `number_of_retries` counts total attempts, at least one is made
    pub fn new(
        name: &'static str,
        sink: Arc<dyn MessageSink>,
        timeout: Duration,
        number_of_retries: u32,
    ) -> Self {
        Self {
            name,
            sink,
            timeout,
            attempts: number_of_retries.max(1),
            pending: Mutex::new(None),
        }
    }

    /// Start the worker draining `jobs`
    pub fn spawn(self: Arc<Self>, mut jobs: mpsc::UnboundedReceiver<ExchangeJob>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                let result = self.exchange_with_retry(&job.request).await;
                if job.reply.send(result).is_err() {
                    trace!("{}: caller went away", self.name);
                }
            }
            debug!("{} exchanger stopped", self.name);
        })
    }

    async fn exchange_with_retry(&self, request: &AbusMessage) -> Result<AbusMessage> {
        for attempt in 1..=self.attempts {
            if let Some(response) = self.exchange_once(request).await {
                return Ok(response);
            }
            debug!(
                "{}: no response to {} (attempt {}/{})",
                self.name, request, attempt, self.attempts
            );
        }
        Err(ScgiSrvError::timeout(format!(
            "c{} [{}]",
            request.to_nad, request.transaction_id
        )))
    }

    async fn exchange_once(&self, request: &AbusMessage) -> Option<AbusMessage> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(Pending {
            tag: request.tag(),
            tx: Some(tx),
        });

        // a failed send surfaces as a timeout like any lost datagram
        if let Err(e) = self.sink.send(request).await {
            error!("{}: {}", self.name, e);
        }

        let response = tokio::time::timeout(self.timeout, rx).await;
        *self.pending.lock() = None;
        response.ok().and_then(|r| r.ok())
    }

    /// Deliver a message; dropped unless it answers the request in flight
    pub fn receive(&self, msg: AbusMessage) {
        let mut pending = self.pending.lock();
        match pending.as_mut() {
            Some(p) if p.tag == msg.reply_tag() => {
                if let Some(tx) = p.tx.take() {
                    let _ = tx.send(msg);
                }
            },
            _ => trace!("{}: dropped {}", self.name, msg),
        }
    }
}

/// Main-side handle queuing requests onto an exchanger's worker
#[derive(Clone)]
pub struct ExchangerHandle {
    tx: mpsc::UnboundedSender<ExchangeJob>,
}

impl ExchangerHandle {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ExchangeJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Exchange for ExchangerHandle {
    async fn exchange(&self, request: AbusMessage) -> Result<AbusMessage> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ExchangeJob { request, reply })
            .map_err(|_| ScgiSrvError::internal("exchanger is not running"))?;
        rx.await
            .map_err(|_| ScgiSrvError::internal("exchanger dropped the request"))?
    }
}
