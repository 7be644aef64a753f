//! SocketCAN side of the ABUS transceiver
//!
//! Only available on Linux with the `can-linux` feature; elsewhere
//! `CanBus::open` fails and CAN must stay disabled in the configuration.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::abus::iex::IexFrame;
use crate::error::Result;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
mod imp {
    use std::sync::Arc;
    use std::time::Duration;

    use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket};
    use tracing::{debug, error, info};

    use super::*;
    use crate::error::ScgiSrvError;

    const RX_POLL_INTERVAL: Duration = Duration::from_millis(2);

    pub struct CanBus {
        channel: String,
        socket: Arc<CanSocket>,
    }

    impl CanBus {
        pub fn open(channel: &str) -> Result<Self> {
            let socket = CanSocket::open(channel).map_err(|e| {
                ScgiSrvError::io(format!("Failed to open CAN interface {}: {}", channel, e))
            })?;
            socket.set_nonblocking(true).map_err(|e| {
                ScgiSrvError::io(format!("Failed to set CAN socket non-blocking: {}", e))
            })?;
            info!("CAN interface {} opened", channel);
            Ok(Self {
                channel: channel.to_string(),
                socket: Arc::new(socket),
            })
        }

        /// Poll the socket and forward received frames
        pub fn spawn_reader(&self, tx: mpsc::UnboundedSender<IexFrame>, cancel: CancellationToken) {
            let socket = self.socket.clone();
            let channel = self.channel.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(RX_POLL_INTERVAL);
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {},
                    }
                    loop {
                        match socket.read_frame() {
                            Ok(frame) => {
                                debug!("Received: {} {}", frame.raw_id(), common::hex::encode_lower(frame.data()));
                                if !frame.is_extended() {
                                    continue;
                                }
                                if tx.send(IexFrame::from_can(frame.raw_id(), frame.data())).is_err() {
                                    return;
                                }
                            },
                            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                            Err(e) => {
                                error!("Can error on {}: {}", channel, e);
                                break;
                            },
                        }
                    }
                }
            });
        }

        pub fn send(&self, frames: &[IexFrame]) {
            for iex in frames {
                let id = iex.can_id();
                let frame = ExtendedId::new(id).and_then(|id| CanFrame::new(id, &iex.data));
                let Some(frame) = frame else {
                    error!("Sending failed: invalid frame {} {}", id, iex);
                    continue;
                };
                debug!("Sending: {} {}", id, common::hex::encode_lower(&iex.data));
                if let Err(e) = self.socket.write_frame(&frame) {
                    error!("Sending failed: {} {}: {}", id, common::hex::encode_lower(&iex.data), e);
                }
            }
        }
    }
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
mod imp {
    use super::*;
    use crate::error::ScgiSrvError;

    pub struct CanBus;

    impl CanBus {
        pub fn open(channel: &str) -> Result<Self> {
            Err(ScgiSrvError::config(format!(
                "CAN interface {} requested but CAN support is not built in",
                channel
            )))
        }

        pub fn spawn_reader(&self, _tx: mpsc::UnboundedSender<IexFrame>, _cancel: CancellationToken) {}

        pub fn send(&self, _frames: &[IexFrame]) {}
    }
}

pub use imp::CanBus;

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
    #[test]
    fn test_open_without_support_fails() {
        assert!(CanBus::open("can0").is_err());
    }

    #[cfg(all(target_os = "linux", feature = "socketcan"))]
    #[test]
    fn test_open_missing_interface_fails() {
        assert!(CanBus::open("nosuchcan9").is_err());
    }
}
