//! Picks UDP or CAN for outgoing messages and decodes incoming ones

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tracing::{debug, error};

use super::can::CanBus;
use super::udp::UdpActivity;
use crate::abus::iex::{self, IexFrame, IexReassembler};
use crate::abus::{AbusMessage, CAN_LOCAL_ADDR};
use crate::comm::exchanger::MessageSink;
use crate::error::{Result, ScgiSrvError};

pub struct AbusTransceiver {
    udp: Option<Arc<UdpSocket>>,
    can: Option<CanBus>,
    udp_activity: Arc<UdpActivity>,
    reassembler: Mutex<IexReassembler>,
}

impl AbusTransceiver {
    pub fn new(
        udp: Option<Arc<UdpSocket>>,
        can: Option<CanBus>,
        udp_activity: Arc<UdpActivity>,
    ) -> Self {
        Self {
            udp,
            can,
            udp_activity,
            reassembler: Mutex::new(IexReassembler::new()),
        }
    }

    async fn send_udp(&self, socket: &UdpSocket, msg: &AbusMessage) -> Result<()> {
        debug!("Send UDP: {}", msg);
        let raw = msg.to_bytes()?;
        self.udp_activity.report_tx();
        debug!("OUT {} {}", msg.addr, common::hex::encode_lower(&raw));
        socket
            .send_to(&raw, msg.addr)
            .await
            .map_err(|e| ScgiSrvError::io(format!("UDP send to {} failed: {}", msg.addr, e)))?;
        Ok(())
    }

    fn send_can(&self, can: &CanBus, msg: &AbusMessage) -> Result<()> {
        debug!("Send CAN: {}", msg);
        let raw = msg.to_bytes()?;
        can.send(&iex::split(&raw));
        Ok(())
    }

    /// Decode a datagram; invalid data is logged and dropped
    pub fn receive_udp(&self, data: &[u8], source: SocketAddr) -> Option<AbusMessage> {
        self.udp_activity.report_rx();
        debug!("IN {} {}", source, common::hex::encode_lower(data));
        match AbusMessage::from_bytes(data, source) {
            Ok(msg) => {
                debug!("Receive UDP: {}", msg);
                Some(msg)
            },
            Err(e) => {
                error!(
                    "Received invalid data from {}: {} ({})",
                    source,
                    common::hex::encode_spaced(data),
                    e
                );
                None
            },
        }
    }

    /// Feed one IEX frame; yields a message once a stream is complete
    pub fn receive_iex(&self, frame: IexFrame) -> Option<AbusMessage> {
        let raw = self.reassembler.lock().push(frame)?;
        debug!("Flushing input buffer containing iex frames");
        match AbusMessage::from_bytes(&raw, CAN_LOCAL_ADDR) {
            Ok(msg) => {
                debug!("Receive CAN: {}", msg);
                Some(msg)
            },
            Err(e) => {
                error!(
                    "Received invalid data over CAN: {} ({})",
                    common::hex::encode_spaced(&raw),
                    e
                );
                None
            },
        }
    }
}

#[async_trait]
impl MessageSink for AbusTransceiver {
    async fn send(&self, msg: &AbusMessage) -> Result<()> {
        if msg.is_can_local() {
            if let Some(can) = &self.can {
                return self.send_can(can, msg);
            }
        }
        match &self.udp {
            Some(socket) => self.send_udp(socket, msg).await,
            None => {
                debug!("No transport for {}, dropped", msg);
                Ok(())
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::abus::CommandFrame;

    #[tokio::test]
    async fn test_udp_send_and_decode() {
        let ours = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let activity = Arc::new(UdpActivity::default());
        let transceiver = AbusTransceiver::new(Some(ours.clone()), None, activity.clone());

        let msg = AbusMessage::new(peer.local_addr().unwrap(), 2, 10, 1, CommandFrame::ping());
        transceiver.send(&msg).await.unwrap();
        assert_eq!(activity.tx_count(), 1);

        let mut buf = [0u8; 64];
        let (n, from) = peer.recv_from(&mut buf).await.unwrap();
        let decoded = transceiver.receive_udp(&buf[..n], from).unwrap();
        assert_eq!(decoded.frame, msg.frame);
        assert_eq!(decoded.addr, ours.local_addr().unwrap());
        assert_eq!(activity.rx_count(), 1);
    }

    #[test]
    fn test_invalid_datagram_is_dropped() {
        let transceiver = AbusTransceiver::new(None, None, Arc::new(UdpActivity::default()));
        let source: SocketAddr = "10.0.0.1:8442".parse().unwrap();
        assert!(transceiver.receive_udp(&[0xAA, 0x55, 0x00], source).is_none());
    }

    #[test]
    fn test_iex_reassembly_path() {
        let transceiver = AbusTransceiver::new(None, None, Arc::new(UdpActivity::default()));
        let msg = AbusMessage::new(CAN_LOCAL_ADDR, 10, 2, 4, CommandFrame::read_status());
        let frames = iex::split(&msg.to_bytes().unwrap());
        let mut out = None;
        for frame in frames {
            out = transceiver.receive_iex(frame);
        }
        assert_eq!(out.unwrap(), msg);
    }
}
