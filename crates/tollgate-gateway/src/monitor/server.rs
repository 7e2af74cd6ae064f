//! Monitor API server.

use super::router::route_request;
use super::MonitorState;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

pub struct MonitorServer {
    listener: TcpListener,
    state: Arc<MonitorState>,
}

impl MonitorServer {
    pub async fn bind(addr: SocketAddr, state: Arc<MonitorState>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        info!("Tollgate monitor API listening on http://{}", self.local_addr()?);

        loop {
            let (stream, _) = self.listener.accept().await?;
            let io = TokioIo::new(stream);
            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let service = service_fn(move |req| route_request(req, Arc::clone(&state)));

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Monitor API connection error: {}", e);
                }
            });
        }
    }
}
