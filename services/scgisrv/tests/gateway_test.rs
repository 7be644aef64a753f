//! Gateway Integration Tests
//!
//! Starts a full gateway on loopback and talks to it over SCGI:
//! - system status tags
//! - controllers that cannot be reached
//! - malformed requests
//! - command line and config file loading

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::net::SocketAddr;
use std::path::Path;

use clap::Parser;
use figment::Jail;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use scgisrv::core::bootstrap::Args;
use scgisrv::core::config::{Config, StaticPlcConfig};
use scgisrv::Gateway;

fn loopback_config(app_dir: &Path) -> Config {
    let mut config = Config::default();
    config.eth.bind_address = "127.0.0.1".into();
    config.eth.port = 0;
    config.eth.autodetect_enabled = false;
    config.scgi.bind_address = "127.0.0.1".into();
    config.scgi.port = 0;
    config.dbase.enabled = false;
    config.relay.enabled = false;
    config.datalogger.enabled = false;
    config.locations.app_dir = app_dir.to_path_buf();
    config
}

async fn send(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    String::from_utf8_lossy(&reply).into_owned()
}

async fn query(addr: SocketAddr, query: &str) -> String {
    send(addr, &format!("GET /?{query} HTTP/1.1\r\n\r\n")).await
}

#[tokio::test]
async fn test_system_tags() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = loopback_config(dir.path());
    config.static_plcs.insert("c1000".into(), StaticPlcConfig::default());
    config.static_plcs.insert("c1001".into(), StaticPlcConfig::default());
    let gateway = Gateway::start(config, CancellationToken::new()).await.unwrap();

    let reply = query(
        gateway.scgi_addr(),
        "sys.server_version&sys.nad_list&sys.scgi_port_status&sys.datalogger_status",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n\r\n"), "{reply}");
    assert!(reply.contains(&format!("<value>{}</value>", env!("CARGO_PKG_VERSION"))));
    assert!(reply.contains("<item>1000</item><item>1001</item>"), "{reply}");
    assert!(reply.contains("<name>sys.scgi_port_status</name><value>active</value>"));
    assert!(reply.contains("<name>sys.datalogger_status</name><value>stopped</value>"));
    assert!(reply.contains("<description>"));

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_static_controller_without_address() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = loopback_config(dir.path());
    config.static_plcs.insert("c1000".into(), StaticPlcConfig::default());
    let gateway = Gateway::start(config, CancellationToken::new()).await.unwrap();

    let reply = query(gateway.scgi_addr(), "c1000.counter").await;
    assert!(
        reply.contains("<name>c1000.counter</name><value>?</value>"),
        "{reply}"
    );
    assert!(reply.contains("<error_code>3</error_code>"), "{reply}");

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_bad_requests() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Gateway::start(loopback_config(dir.path()), CancellationToken::new())
        .await
        .unwrap();
    let addr = gateway.scgi_addr();

    assert_eq!(send(addr, "GET /index.html HTTP/1.1\r\n\r\n").await, "HTTP/1.1 400 Bad Request");
    assert_eq!(query(addr, "not_a_tag").await, "HTTP/1.1 400 Bad Request");

    let reply = query(addr, "sys.scgi_request_count").await;
    assert!(reply.contains("<value>3</value>"), "{reply}");

    gateway.shutdown().await;
}

#[tokio::test]
async fn test_data_logger_without_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = loopback_config(dir.path());
    config.datalogger.enabled = true;
    let gateway = Gateway::start(config, CancellationToken::new()).await.unwrap();

    let reply = query(gateway.scgi_addr(), "sys.datalogger_status&sys.datalogger_list").await;
    assert!(reply.contains("<name>sys.datalogger_status</name><value>active</value>"), "{reply}");
    assert!(reply.contains("<name>sys.datalogger_list</name>"));

    gateway.shutdown().await;
}

#[test]
fn test_args_and_config_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "gateway.yaml",
            r#"
scgi:
  port: 4100
  reply_with_descriptions: false
abus:
  password: "4321"
static_plcs:
  c1200:
    ip: 192.168.1.20
"#,
        )?;
        jail.set_env("SCGISRV_SCGI__PORT", "4200");

        let args = Args::try_parse_from(["scgisrv", "-c", "gateway.yaml", "--app-dir", "/opt/scgi"])
            .unwrap();
        let config = args.load_config().unwrap();
        assert_eq!(config.scgi.port, 4200);
        assert!(!config.scgi.reply_with_descriptions);
        assert_eq!(config.abus.password(), Some(4321));
        assert_eq!(config.locations.alc_dir(), Path::new("/opt/scgi/alc"));

        let plcs = config.static_plcs().unwrap();
        assert_eq!(plcs.len(), 1);
        assert_eq!(plcs[0].nad, 1200);
        Ok(())
    });
}

#[test]
fn test_invalid_config_file() {
    Jail::expect_with(|jail| {
        jail.create_file("gateway.yaml", "static_plcs:\n  plc7:\n    ip: 10.0.0.1\n")?;
        let args = Args::try_parse_from(["scgisrv", "-c", "gateway.yaml"]).unwrap();
        assert!(args.load_config().is_err());
        Ok(())
    });
}
