//! HTTP listener for the fake server.

use super::router::route_request;
use crate::rule::RuleStore;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Fake server bound to a socket and serving one rule store
pub struct FakeServer {
    listener: TcpListener,
    store: Arc<RuleStore>,
}

impl FakeServer {
    /// Bind the listener. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr, store: Arc<RuleStore>) -> Result<Self, anyhow::Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, store })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, anyhow::Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until the task is dropped
    pub async fn run(self) -> Result<(), anyhow::Error> {
        info!("Fake server listening on http://{}", self.local_addr()?);

        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Accept error: {}", e);
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let store = Arc::clone(&self.store);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let store = Arc::clone(&store);
                    async move { route_request(req, store).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}
