//! SCGI to UDP Round Trip Tests
//!
//! A gateway bound to loopback talks to a fake controller over real UDP:
//! - head check, allocation list download and random memory reads
//! - writes land in controller memory
//! - per controller status tags reflect the exchanges
//! - cached tags recover from requests abandoned on timeout

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod common;

use std::net::SocketAddr;
use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use common::UdpPlc;
use scgisrv::core::config::{Config, StaticPlcConfig};
use scgisrv::Gateway;

fn config_for(app_dir: &Path, plc: SocketAddr) -> Config {
    let mut config = Config::default();
    config.eth.bind_address = "127.0.0.1".into();
    config.eth.port = 0;
    config.eth.autodetect_enabled = false;
    config.abus.timeout_ms = 300;
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
async fn test_read_and_write_over_udp() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let plc = UdpPlc::start(1000, cancel.clone()).await;
    plc.set_data(0x200, &42i16.to_le_bytes());

    let gateway = Gateway::start(config_for(dir.path(), plc.addr), cancel.clone())
        .await
        .unwrap();
    let addr = gateway.scgi_addr();

    let reply = query(addr, "c1000.counter").await;
    assert!(reply.starts_with("HTTP/1.1 200 OK"), "{reply}");
    assert!(
        reply.contains("<name>c1000.counter</name><value>42</value><description>Event counter</description>"),
        "{reply}"
    );
    assert!(!reply.contains("<error_code>"));

    let reply = query(addr, "c1000.lc00_qx00=1").await;
    assert!(reply.contains("<name>c1000.lc00_qx00</name><value>1</value>"), "{reply}");
    assert_eq!(plc.data(0x100, 1), vec![1]);

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_controller_status_after_exchange() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let plc = UdpPlc::start(1000, cancel.clone()).await;

    let gateway = Gateway::start(config_for(dir.path(), plc.addr), cancel.clone())
        .await
        .unwrap();
    let addr = gateway.scgi_addr();

    query(addr, "c1000.counter").await;
    assert!(plc.requests() > 0);

    let reply = query(
        addr,
        "c1000.sys.ip_port&c1000.sys.plc_program_status&c1000.sys.alc_file_status&sys.udp_rx_count",
    )
    .await;
    assert!(
        reply.contains(&format!("<name>c1000.sys.ip_port</name><value>{}</value>", plc.addr)),
        "{reply}"
    );
    assert!(reply.contains("<name>c1000.sys.plc_program_status</name><value>ok</value>"));
    assert!(reply.contains("<name>c1000.sys.alc_file_status</name><value>ok</value>"));
    assert!(!reply.contains("<name>sys.udp_rx_count</name><value>0</value>"));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_unknown_variable() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let plc = UdpPlc::start(1000, cancel.clone()).await;

    let gateway = Gateway::start(config_for(dir.path(), plc.addr), cancel.clone())
        .await
        .unwrap();

    let reply = query(gateway.scgi_addr(), "c1000.counter&c1000.no_such_var").await;
    assert!(reply.contains("<name>c1000.counter</name><value>0</value>"), "{reply}");
    assert!(
        reply.contains("<name>c1000.no_such_var</name><value>?</value><description></description><error_code>2</error_code>"),
        "{reply}"
    );

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_cached_tag_after_timed_out_request() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancellationToken::new();
    let plc = UdpPlc::start(1000, cancel.clone()).await;
    plc.set_data(0x200, &42i16.to_le_bytes());
    plc.set_silent(true);

    let mut config = config_for(dir.path(), plc.addr);
    config.abus.timeout_ms = 2500;
    config.abus.number_of_retries = 1;
    config.scgi.server_timeout_s = 2;
    config.cache.valid_period_s = 60;
    config.cache.request_period_s = 30;
    config.cache.cleanup_period_s = 0;
    let gateway = Gateway::start(config, cancel.clone()).await.unwrap();
    let addr = gateway.scgi_addr();

    // the connection is closed without a reply when the server timeout fires
    let reply = query(addr, "c1000.counter").await;
    assert!(reply.is_empty(), "{reply}");

    plc.set_silent(false);
    let reply = query(addr, "c1000.counter").await;
    assert!(
        reply.contains("<name>c1000.counter</name><value>42</value>"),
        "{reply}"
    );

    let reply = query(addr, "sys.scgi_request_pending").await;
    assert!(
        reply.contains("<name>sys.scgi_request_pending</name><value>1</value>"),
        "{reply}"
    );

    gateway.shutdown().await;
}
