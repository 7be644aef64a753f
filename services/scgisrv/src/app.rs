//! Service assembly
//!
//! Builds every component from a validated `Config`, starts the background
//! tasks and the SCGI listener, and tears them down again on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::alc::AlcService;
use crate::cache::PlcCache;
use crate::comm::{self, CommHandles, Exchange};
use crate::core::config::Config;
use crate::datalogger::{
    ConfigWatcher, DataLogger, DataLoggerActivityService, DataLoggerCache, TagReader,
};
use crate::db::{InMemoryRepository, MySqlRepository, Repository};
use crate::error::Result;
use crate::plc::{
    ClientContext, Detect, PlcActivityService, PlcClientManager, PlcDetectionService,
    PlcInfoCleaner, PlcInfoService, PushActivity, PushService,
};
use crate::proxy::{ProxyActivityService, ProxyDbSynchronizer, ProxyService};
use crate::rw::{PlcCommService, RwService};
use crate::scgi::{load_acceptor, RwHandler, ScgiActivity, ScgiServer, TcpServer};
use crate::status::{PlcStatusService, SystemStatusService};
use crate::utils::task_runner::InlineTaskRunner;
use crate::utils::TransactionIdGenerator;

/// A running gateway
pub struct Gateway {
    cancel: CancellationToken,
    comm: CommHandles,
    tasks: Vec<JoinHandle<()>>,
    scgi_addr: SocketAddr,
    udp_addr: Option<SocketAddr>,
}

impl Gateway {
    /// Start everything; fails when a transport, the database or the SCGI
    /// listener cannot be brought up
    pub async fn start(config: Config, cancel: CancellationToken) -> Result<Self> {
        let config = Arc::new(config);
        let static_plcs = config.static_plcs()?;
        let mut tasks = Vec::new();

        let alc = Arc::new(AlcService::new(config.locations.alc_dir()));
        alc.initialize_with_alc_files().await?;

        let repository: Arc<dyn Repository> = if config.needs_database() {
            info!(
                "Connecting to database {}@{}:{}",
                config.dbase.name, config.dbase.host, config.dbase.port
            );
            Arc::new(MySqlRepository::connect(&config.dbase).await?)
        } else {
            info!("Database disabled, relay and logger data stay in memory");
            Arc::new(InMemoryRepository::new())
        };

        let mut comm = comm::start(&config, cancel.clone()).await?;

        let infos = Arc::new(PlcInfoService::new(config.abus.password()));

        let plc_activity = Arc::new(PlcActivityService::new());
        let rw_exchanger: Arc<dyn Exchange> = Arc::new(comm.rw.clone());
        let ctx = ClientContext {
            exchanger: rw_exchanger,
            activity: plc_activity.clone(),
            ids: Arc::new(TransactionIdGenerator::default()),
            max_frame_bytes: config.abus.max_frame_bytes,
            task_runner: Arc::new(InlineTaskRunner),
        };
        let detection: Arc<dyn Detect> = Arc::new(PlcDetectionService::new(
            Arc::new(comm.detection.clone()),
            &config,
        )?);
        let manager = PlcClientManager::new(infos.clone(), Some(detection), ctx);
        // after the manager so static entries reach it as registry notifications
        infos.load_static_plc_infos(&static_plcs);

        let cache = if config.cache.is_enabled() {
            let cache = Arc::new(PlcCache::new(&config.cache));
            tasks.extend(
                cache
                    .clone()
                    .spawn_cleanup(config.cache.cleanup_period(), cancel.clone()),
            );
            Some(cache)
        } else {
            None
        };
        let data_logger_cache = Arc::new(DataLoggerCache::new());
        let plc_comm = PlcCommService::new(
            manager.clone(),
            alc.clone(),
            plc_activity.clone(),
            cache,
            data_logger_cache.clone(),
        );

        let push_activity = Arc::new(PushActivity::default());
        if let (Some(exchanger), Some(rx)) = (comm.push.clone(), comm.push_rx.take()) {
            let push = Arc::new(PushService::new(
                Arc::new(exchanger),
                infos.clone(),
                push_activity.clone(),
            ));
            tasks.push(push.spawn(rx, cancel.clone()));
        }

        let proxy_activity = Arc::new(ProxyActivityService::new(infos.clone(), repository.clone()));
        if let Some(rx) = comm.proxy_rx.take() {
            let proxy = Arc::new(ProxyService::new(
                manager.clone(),
                proxy_activity.clone(),
                repository.clone(),
                comm.raw_tx.clone(),
            ));
            tasks.push(proxy.spawn(rx, cancel.clone()));
            tasks.push(
                ProxyDbSynchronizer::new(proxy_activity.clone(), config.relay.db_sync_period())
                    .spawn(cancel.clone()),
            );
        }

        tasks.push(PlcInfoCleaner::new(infos.clone(), config.push.timeout()).spawn(cancel.clone()));

        let scgi_activity = Arc::new(ScgiActivity::new());
        let datalogger_activity = Arc::new(DataLoggerActivityService::new());
        let system_status = Arc::new(SystemStatusService::new(
            config.clone(),
            infos.clone(),
            push_activity,
            scgi_activity.clone(),
            plc_activity.clone(),
            comm.udp_activity.clone(),
            datalogger_activity.clone(),
            proxy_activity,
        ));
        let plc_status = Arc::new(PlcStatusService::new(infos, plc_activity, alc));
        let rw = Arc::new(RwService::new(system_status, plc_status, plc_comm));

        if config.datalogger.enabled {
            let reader: Arc<dyn TagReader> = rw.clone();
            let logger = DataLogger::new(
                reader,
                repository,
                data_logger_cache,
                datalogger_activity,
                Arc::new(InlineTaskRunner),
                cancel.clone(),
            );
            let watcher = ConfigWatcher::new(
                config.locations.data_logger_config_file(),
                config.scgi.config_check_period(),
                logger,
            );
            tasks.push(watcher.spawn(cancel.clone()));
        } else {
            info!("Data logger disabled");
        }

        let tls = if config.scgi.tls_enabled {
            Some(load_acceptor(
                &config.locations.tls_cert(),
                &config.locations.tls_key(),
            )?)
        } else {
            None
        };
        let handler: Arc<dyn RwHandler> = rw;
        let server = Arc::new(ScgiServer::new(
            handler,
            scgi_activity,
            config.scgi.reply_with_descriptions,
        ));
        let listener = TcpServer::bind(&config.scgi, server, tls).await?;
        let scgi_addr = listener.local_addr()?;
        tasks.push(listener.spawn(cancel.clone()));

        let udp_addr = comm.udp_local_addr;
        info!("Gateway started");
        Ok(Self {
            cancel,
            comm,
            tasks,
            scgi_addr,
            udp_addr,
        })
    }

    pub fn scgi_addr(&self) -> SocketAddr {
        self.scgi_addr
    }

    /// Local address of the ABUS socket when ethernet is enabled
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    /// Cancel every task and wait for the comm thread
    pub async fn shutdown(self) {
        let Self {
            cancel,
            mut comm,
            tasks,
            ..
        } = self;
        cancel.cancel();

        for task in tasks {
            if let Err(e) = task.await {
                warn!("Task ended abnormally: {}", e);
            }
        }
        if let Err(e) = tokio::task::spawn_blocking(move || comm.join()).await {
            error!("Communication thread join failed: {}", e);
        }
        info!("Gateway stopped");
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::abus::AbusMessage;
    use crate::core::config::StaticPlcConfig;
    use crate::plc::fake::FakePlc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpStream, UdpSocket};

    /// Fake controller behind a loopback UDP socket
    async fn serve_fake(plc: Arc<FakePlc>, cancel: CancellationToken) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 2048];
            loop {
                let (n, from) = tokio::select! {
                    received = socket.recv_from(&mut buf) => received.unwrap(),
                    _ = cancel.cancelled() => break,
                };
                let Ok(request) = AbusMessage::from_bytes(&buf[..n], from) else {
                    continue;
                };
                if let Ok(reply) = plc.exchange(request).await {
                    socket.send_to(&reply.to_bytes().unwrap(), from).await.unwrap();
                }
            }
        });
        addr
    }

    fn loopback_config(app_dir: &std::path::Path, plc: SocketAddr) -> Config {
        let mut config = Config::default();
        config.eth.bind_address = "127.0.0.1".into();
        config.eth.port = 0;
        config.eth.autodetect_enabled = false;
        config.abus.timeout_ms = 200;
        config.scgi.bind_address = "127.0.0.1".into();
        config.scgi.port = 0;
        config.dbase.enabled = false;
        config.relay.enabled = false;
        config.datalogger.enabled = false;
        config.locations.app_dir = app_dir.to_path_buf();
        config.static_plcs.insert(
            "c1000".into(),
            StaticPlcConfig {
                ip: Some(plc.ip().to_string()),
                port: Some(plc.port()),
                ..StaticPlcConfig::default()
            },
        );
        config
    }

    async fn query(addr: SocketAddr, query: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET /?{query} HTTP/1.1\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        String::from_utf8_lossy(&reply).into_owned()
    }

    #[tokio::test]
    async fn test_unreachable_controller_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let plc = FakePlc::new(1000);
        plc.set_online(false);
        let plc_addr = serve_fake(plc, cancel.clone()).await;

        let mut config = loopback_config(dir.path(), plc_addr);
        config.abus.timeout_ms = 50;
        config.abus.number_of_retries = 1;
        let gateway = Gateway::start(config, cancel).await.unwrap();

        let reply = query(gateway.scgi_addr(), "c1000.counter").await;
        assert!(reply.contains("<error_code>"), "{reply}");
        assert!(!reply.contains("<value>42</value>"));

        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_scgi_bind_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = loopback_config(dir.path(), "127.0.0.1:9".parse().unwrap());
        config.scgi.port = blocker.local_addr().unwrap().port();
        let cancel = CancellationToken::new();
        assert!(Gateway::start(config, cancel.clone()).await.is_err());
        cancel.cancel();
    }
}
