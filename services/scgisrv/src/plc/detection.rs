//! Finding a controller's ip by pinging it where it might be

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::info::PlcInfo;
use crate::abus::{AbusMessage, CommandFrame, CAN_LOCAL_ADDR};
use crate::comm::Exchange;
use crate::core::config::Config;
use crate::core::constants::{ABUS_PORT, AUTODETECT_NAD};
use crate::error::{Result, ScgiSrvError};
use crate::utils::TransactionIdGenerator;

#[async_trait]
pub trait Detect: Send + Sync {
    async fn detect(&self, info: &PlcInfo) -> Result<IpAddr>;
}

pub struct PlcDetectionService {
    exchanger: Arc<dyn Exchange>,
    ids: TransactionIdGenerator,
    /// Set when ethernet autodetection is enabled
    broadcast: Option<SocketAddr>,
    can_enabled: bool,
}

impl PlcDetectionService {
    pub fn new(exchanger: Arc<dyn Exchange>, config: &Config) -> Result<Self> {
        let broadcast = if config.eth.enabled && config.eth.autodetect_enabled {
            let ip: IpAddr = config.eth.autodetect_address.parse().map_err(|_| {
                ScgiSrvError::config(format!(
                    "invalid eth.autodetect_address \"{}\"",
                    config.eth.autodetect_address
                ))
            })?;
            Some(SocketAddr::new(ip, ABUS_PORT))
        } else {
            None
        };

        Ok(Self {
            exchanger,
            ids: TransactionIdGenerator::default(),
            broadcast,
            can_enabled: config.can.enabled,
        })
    }

    async fn ping(&self, info: &PlcInfo, addr: SocketAddr) -> Result<IpAddr> {
        let tid = self.ids.next_or(info.password);
        let request = AbusMessage::new(addr, AUTODETECT_NAD, info.nad, tid, CommandFrame::ping());
        let response = self.exchanger.exchange(request).await?;
        Ok(response.addr.ip())
    }

    async fn ping_everywhere(&self, info: &PlcInfo) -> Result<IpAddr> {
        let mut error = None;

        if let Some(broadcast) = self.broadcast {
            match self.ping(info, broadcast).await {
                Ok(ip) => return Ok(ip),
                Err(e) => error = Some(e),
            }
        }
        if self.can_enabled {
            match self.ping(info, CAN_LOCAL_ADDR).await {
                Ok(ip) => return Ok(ip),
                Err(e) => error = Some(e),
            }
        }

        Err(error.unwrap_or_else(|| {
            ScgiSrvError::config(
                "Autodetect needs CAN enabled or ETH enabled with autodetect_enabled",
            )
        }))
    }
}

#[async_trait]
impl Detect for PlcDetectionService {
    async fn detect(&self, info: &PlcInfo) -> Result<IpAddr> {
        info!("Detecting ip for c{}", info.nad);
        match self.ping_everywhere(info).await {
            Ok(ip) => {
                info!("Detected ip {} for c{}", ip, info.nad);
                Ok(ip)
            },
            Err(e) => {
                warn!("Couldn't detect ip for c{}: {}", info.nad, e);
                Err(e)
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::abus::Direction;
    use crate::plc::info::PlcOrigin;
    use crate::plc::info_service::PlcInfoService;
    use bytes::Bytes;
    use parking_lot::Mutex;

    /// Answers from a fixed address, optionally only over CAN
    struct Responder {
        answer_from: IpAddr,
        can_only: bool,
        seen: Mutex<Vec<(SocketAddr, u16)>>,
    }

    #[async_trait]
    impl Exchange for Responder {
        async fn exchange(&self, request: AbusMessage) -> Result<AbusMessage> {
            self.seen.lock().push((request.addr, request.transaction_id));
            if self.can_only && !request.is_can_local() {
                return Err(ScgiSrvError::timeout("c1000"));
            }
            Ok(AbusMessage::new(
                SocketAddr::new(self.answer_from, ABUS_PORT),
                request.to_nad,
                request.from_nad,
                request.transaction_id,
                CommandFrame::new(Direction::Ack, 0, Bytes::new()),
            ))
        }
    }

    fn responder(answer_from: &str, can_only: bool) -> Arc<Responder> {
        Arc::new(Responder {
            answer_from: answer_from.parse().unwrap(),
            can_only,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn info(password: Option<u16>) -> PlcInfo {
        PlcInfoService::new(None).create(PlcOrigin::Auto, 1000, None, None, password, None)
    }

    #[tokio::test]
    async fn test_broadcast_ping() {
        let plc = responder("192.168.1.77", false);
        let service = PlcDetectionService::new(plc.clone(), &Config::default()).unwrap();
        let ip = service.detect(&info(Some(4321))).await.unwrap();
        assert_eq!(ip, "192.168.1.77".parse::<IpAddr>().unwrap());
        assert_eq!(
            *plc.seen.lock(),
            vec![("192.168.1.255:8442".parse().unwrap(), 4321)]
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_can() {
        let plc = responder("0.0.0.0", true);
        let mut config = Config::default();
        config.can.enabled = true;
        let service = PlcDetectionService::new(plc.clone(), &config).unwrap();
        let ip = service.detect(&info(None)).await.unwrap();
        assert!(ip.is_unspecified());
        assert_eq!(plc.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_nothing_enabled() {
        let plc = responder("10.0.0.1", false);
        let mut config = Config::default();
        config.eth.autodetect_enabled = false;
        let service = PlcDetectionService::new(plc.clone(), &config).unwrap();
        assert!(matches!(
            service.detect(&info(None)).await,
            Err(ScgiSrvError::ConfigError(_))
        ));
        assert!(plc.seen.lock().is_empty());
    }

    #[test]
    fn test_invalid_broadcast_address() {
        let mut config = Config::default();
        config.eth.autodetect_address = "nowhere".into();
        assert!(PlcDetectionService::new(responder("10.0.0.1", false), &config).is_err());
    }
}
