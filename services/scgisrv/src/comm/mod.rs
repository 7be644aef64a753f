//! Communication context
//!
//! All ABUS wire I/O lives on one dedicated OS thread running a
//! current-thread runtime: the UDP socket, the CAN bus, the IEX reassembly
//! buffer, the router and the exchanger workers. The main runtime talks
//! to it only through channels:
//!
//! - exchanger queues (`ExchangerHandle`) for request/response pairs
//! - `push_rx` / `proxy_rx` for messages routed to the main context
//! - `raw_tx` for fire-and-forget sends (proxy forwarding)

pub mod exchanger;
pub mod router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::abus::iex::IexFrame;
use crate::abus::AbusMessage;
use crate::core::config::Config;
use crate::core::constants::{AUTODETECT_NAD, COMM_THREAD_NAME, PUSH_NAD, RW_NAD};
use crate::error::{Result, ScgiSrvError};
use crate::transport::can::CanBus;
use crate::transport::{udp, AbusTransceiver, UdpActivity};

pub use exchanger::{Exchange, ExchangeJob, Exchanger, ExchangerHandle, MessageSink};
pub use router::{Receiver, Router};

/// What the main context keeps after the comm thread is up
pub struct CommHandles {
    /// Present when push is enabled
    pub push: Option<ExchangerHandle>,
    pub detection: ExchangerHandle,
    pub rw: ExchangerHandle,
    pub raw_tx: mpsc::UnboundedSender<AbusMessage>,
    pub push_rx: Option<mpsc::UnboundedReceiver<AbusMessage>>,
    pub proxy_rx: Option<mpsc::UnboundedReceiver<AbusMessage>>,
    pub udp_activity: Arc<UdpActivity>,
    pub udp_local_addr: Option<SocketAddr>,
    thread: Option<JoinHandle<()>>,
}

impl CommHandles {
    /// Wait for the comm thread after its cancellation token fired
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Communication thread panicked");
            }
        }
    }
}

struct CommSetup {
    config: Config,
    push_jobs: Option<mpsc::UnboundedReceiver<ExchangeJob>>,
    detection_jobs: mpsc::UnboundedReceiver<ExchangeJob>,
    rw_jobs: mpsc::UnboundedReceiver<ExchangeJob>,
    raw_rx: mpsc::UnboundedReceiver<AbusMessage>,
    push_tx: Option<mpsc::UnboundedSender<AbusMessage>>,
    proxy_tx: Option<mpsc::UnboundedSender<AbusMessage>>,
    udp_activity: Arc<UdpActivity>,
}

/// Spawn the comm thread and wait until its transports are bound
pub async fn start(config: &Config, cancel: CancellationToken) -> Result<CommHandles> {
    let (push, push_jobs) = if config.push.enabled {
        let (handle, jobs) = ExchangerHandle::channel();
        (Some(handle), Some(jobs))
    } else {
        (None, None)
    };
    let (detection, detection_jobs) = ExchangerHandle::channel();
    let (rw, rw_jobs) = ExchangerHandle::channel();
    let (raw_tx, raw_rx) = mpsc::unbounded_channel();

    let (push_tx, push_rx) = if config.push.enabled {
        let (tx, rx) = mpsc::unbounded_channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };
    let (proxy_tx, proxy_rx) = if config.relay.enabled {
        let (tx, rx) = mpsc::unbounded_channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let udp_activity = Arc::new(UdpActivity::default());
    let setup = CommSetup {
        config: config.clone(),
        push_jobs,
        detection_jobs,
        rw_jobs,
        raw_rx,
        push_tx,
        proxy_tx,
        udp_activity: udp_activity.clone(),
    };

    let (ready_tx, ready_rx) = oneshot::channel();
    let thread = std::thread::Builder::new()
        .name(COMM_THREAD_NAME.to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = ready_tx.send(Err(ScgiSrvError::internal(format!(
                        "Failed to build communication runtime: {e}"
                    ))));
                    return;
                },
            };
            runtime.block_on(run(setup, ready_tx, cancel));
        })
        .map_err(|e| ScgiSrvError::internal(format!("Failed to spawn communication thread: {e}")))?;

    let udp_local_addr = ready_rx
        .await
        .map_err(|_| ScgiSrvError::internal("communication thread exited during startup"))??;

    Ok(CommHandles {
        push,
        detection,
        rw,
        raw_tx,
        push_rx,
        proxy_rx,
        udp_activity,
        udp_local_addr,
        thread: Some(thread),
    })
}

async fn open_transports(config: &Config) -> Result<(Option<Arc<UdpSocket>>, Option<CanBus>)> {
    let udp = if config.eth.enabled {
        info!("Initializing UDP communication");
        Some(Arc::new(udp::bind(&config.eth).await?))
    } else {
        info!("Skipped UDP initialization");
        None
    };

    let can = if config.can.enabled {
        info!("Initializing CAN communication");
        Some(CanBus::open(&config.can.channel)?)
    } else {
        info!("Skipped CAN initialization");
        None
    };

    Ok((udp, can))
}

async fn run(
    setup: CommSetup,
    ready: oneshot::Sender<Result<Option<SocketAddr>>>,
    cancel: CancellationToken,
) {
    let CommSetup {
        config,
        push_jobs,
        detection_jobs,
        rw_jobs,
        mut raw_rx,
        push_tx,
        proxy_tx,
        udp_activity,
    } = setup;

    let (udp, can) = match open_transports(&config).await {
        Ok(transports) => transports,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        },
    };
    let local_addr = match udp.as_ref().map(|s| s.local_addr()).transpose() {
        Ok(addr) => addr,
        Err(e) => {
            let _ = ready.send(Err(e.into()));
            return;
        },
    };

    let (iex_tx, mut iex_rx) = mpsc::unbounded_channel::<IexFrame>();
    if let Some(can) = &can {
        can.spawn_reader(iex_tx, cancel.clone());
    }

    let transceiver = Arc::new(AbusTransceiver::new(udp.clone(), can, udp_activity));
    let timeout = config.abus.timeout();
    let retries = config.abus.number_of_retries;
    let spawn_exchanger = |name: &'static str, jobs: mpsc::UnboundedReceiver<ExchangeJob>| {
        let exchanger = Arc::new(Exchanger::new(name, transceiver.clone(), timeout, retries));
        exchanger.clone().spawn(jobs);
        exchanger
    };

    let mut router = Router::new(proxy_tx);
    if let (Some(jobs), Some(push_tx)) = (push_jobs, push_tx) {
        router.register(PUSH_NAD, Receiver::Exchanger(spawn_exchanger("push", jobs)));
        router.register(0, Receiver::Channel(push_tx));
    }
    router.register(AUTODETECT_NAD, Receiver::Exchanger(spawn_exchanger("detection", detection_jobs)));
    router.register(RW_NAD, Receiver::Exchanger(spawn_exchanger("rw", rw_jobs)));

    if ready.send(Ok(local_addr)).is_err() {
        return;
    }
    debug!("Communication loop running");

    let mut buf = vec![0u8; 4096];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = recv_udp(udp.as_deref(), &mut buf) => match received {
                Ok((n, source)) => {
                    if local_addr.is_some_and(|local| udp::is_own_datagram(local, source)) {
                        continue;
                    }
                    if let Some(msg) = transceiver.receive_udp(&buf[..n], source) {
                        router.receive(msg);
                    }
                },
                Err(e) => error!("UDP receive failed: {}", e),
            },
            Some(frame) = iex_rx.recv() => {
                if let Some(msg) = transceiver.receive_iex(frame) {
                    router.receive(msg);
                }
            },
            Some(msg) = raw_rx.recv() => {
                if let Err(e) = transceiver.send(&msg).await {
                    error!("Send failed: {}", e);
                }
            },
        }
    }
    info!("Communication loop stopped");
}

async fn recv_udp(socket: Option<&UdpSocket>, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
    match socket {
        Some(socket) => socket.recv_from(buf).await,
        None => std::future::pending().await,
    }
}
