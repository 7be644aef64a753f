//! SCGI request handling and TCP listener
//!
//! One request per connection: read once, answer, close.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::activity::ScgiActivity;
use super::operation::{parse_request, Operation};
use super::xml::{responses_to_xml, to_latin1};
use crate::core::config::ScgiConfig;
use crate::error::{Result, ScgiSrvError};
use crate::rw::{RResponse, RwRequest};

/// Largest request read from a connection
pub const PAYLOAD_BYTES: usize = 16 * 1024;

pub const BAD_REQUEST: &str = "HTTP/1.1 400 Bad Request";
pub const INTERNAL_SERVER_ERROR: &str = "HTTP/1.1 500 Internal Server Error";

/// Answers parsed tag requests
#[async_trait]
pub trait RwHandler: Send + Sync {
    async fn on_rw_requests(&self, reads: &[RwRequest], writes: &[RwRequest]) -> Vec<RResponse>;
}

pub struct ScgiServer {
    handler: Arc<dyn RwHandler>,
    activity: Arc<ScgiActivity>,
    reply_with_descriptions: bool,
}

impl ScgiServer {
    pub fn new(
        handler: Arc<dyn RwHandler>,
        activity: Arc<ScgiActivity>,
        reply_with_descriptions: bool,
    ) -> Self {
        Self {
            handler,
            activity,
            reply_with_descriptions,
        }
    }

    /// Full reply for one request, status line included
    pub async fn on_data(&self, data: &[u8]) -> Vec<u8> {
        let request = self.activity.start_request();
        let reply = match self.respond(data).await {
            Ok(xml) => format!("HTTP/1.1 200 OK\r\n\r\n{xml}"),
            Err(e @ (ScgiSrvError::ScgiError(_) | ScgiSrvError::InvalidTagName(_))) => {
                error!("Bad request: {}", e);
                BAD_REQUEST.to_string()
            },
            Err(e) => {
                error!("Internal Server Error: {}", e);
                INTERNAL_SERVER_ERROR.to_string()
            },
        };
        request.answered();
        to_latin1(&reply)
    }

    async fn respond(&self, data: &[u8]) -> Result<String> {
        let operations = parse_request(data)?;
        let reads = to_requests(&operations.reads)?;
        let writes = to_requests(&operations.writes)?;
        debug!("SCGI {} reads, {} writes", reads.len(), writes.len());

        let responses = self.handler.on_rw_requests(&reads, &writes).await;
        responses_to_xml(&responses, self.reply_with_descriptions)
    }
}

fn to_requests(operations: &[Operation]) -> Result<Vec<RwRequest>> {
    operations
        .iter()
        .map(|op| RwRequest::parse(&op.key, op.value.clone()))
        .collect()
}

pub struct TcpServer {
    listener: TcpListener,
    server: Arc<ScgiServer>,
    tls: Option<TlsAcceptor>,
    timeout: Duration,
}

impl TcpServer {
    pub async fn bind(
        config: &ScgiConfig,
        server: Arc<ScgiServer>,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self> {
        let addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ScgiSrvError::io(format!("SCGI bind {addr}: {e}")))?;
        Ok(Self {
            listener,
            server,
            tls,
            timeout: config.server_timeout(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Ok(addr) = self.listener.local_addr() {
                info!("Listening on {}", addr);
            }
            loop {
                tokio::select! {
                    accepted = self.listener.accept() => match accepted {
                        Ok((stream, peer)) => self.serve(stream, peer),
                        Err(e) => warn!("SCGI accept failed: {}", e),
                    },
                    _ = cancel.cancelled() => {
                        info!("SCGI server stopping");
                        break;
                    }
                }
            }
        })
    }

    fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        let server = self.server.clone();
        let tls = self.tls.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let handled = tokio::time::timeout(timeout, async {
                match tls {
                    Some(acceptor) => {
                        let stream = acceptor.accept(stream).await?;
                        handle_connection(stream, &server).await
                    },
                    None => handle_connection(stream, &server).await,
                }
            })
            .await;
            match handled {
                Ok(Ok(())) => {},
                Ok(Err(e)) => warn!("SCGI connection {} failed: {}", peer, e),
                Err(_) => warn!("SCGI connection {} timed out", peer),
            }
        });
    }
}

async fn handle_connection<S>(mut stream: S, server: &ScgiServer) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; PAYLOAD_BYTES];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }
    let reply = server.on_data(&buf[..n]).await;
    stream.write_all(&reply).await?;
    stream.shutdown().await
}
