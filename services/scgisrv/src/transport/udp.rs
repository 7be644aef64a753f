//! UDP side of the ABUS transceiver

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::UdpSocket;
use tracing::info;

use crate::core::config::EthConfig;
use crate::error::{Result, ScgiSrvError};

/// Datagram counters behind `sys.udp_rx_count` / `sys.udp_tx_count`
#[derive(Debug, Default)]
pub struct UdpActivity {
    rx: AtomicU64,
    tx: AtomicU64,
}

impl UdpActivity {
    pub fn report_rx(&self) {
        self.rx.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report_tx(&self) {
        self.tx.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rx_count(&self) -> u64 {
        self.rx.load(Ordering::Relaxed)
    }

    pub fn tx_count(&self) -> u64 {
        self.tx.load(Ordering::Relaxed)
    }
}

/// Bind the ABUS socket with broadcast enabled
pub async fn bind(eth: &EthConfig) -> Result<UdpSocket> {
    let addr = format!("{}:{}", eth.bind_address, eth.port);
    let socket = UdpSocket::bind(&addr)
        .await
        .map_err(|e| ScgiSrvError::io(format!("Failed to bind UDP {}: {}", addr, e)))?;
    socket
        .set_broadcast(true)
        .map_err(|e| ScgiSrvError::io(format!("Failed to enable broadcast: {}", e)))?;

    let local = socket.local_addr()?;
    info!("Listening on {}:{}", local.ip(), local.port());
    Ok(socket)
}

/// Datagrams sent from our own socket come back on broadcast
pub fn is_own_datagram(local: SocketAddr, source: SocketAddr) -> bool {
    local == source
}
