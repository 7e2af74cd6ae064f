//! GatewayServer: the listener and its accept loop.

use super::context::{GatewayState, StartupError};
use super::dispatch::handle_request;
use super::tls::create_tls_acceptor;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

pub struct GatewayServer {
    state: Arc<GatewayState>,
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
}

impl GatewayServer {
    /// Bind the gateway listener. TLS is enabled when the listener has a certificate.
    pub async fn bind(state: Arc<GatewayState>, addr: SocketAddr) -> Result<Self, StartupError> {
        let tls_acceptor = match state.config.listen.tls_paths() {
            Some((cert, key)) => Some(create_tls_acceptor(cert, key)?),
            None => None,
        };
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| StartupError::Bind { addr, source })?;
        Ok(Self {
            state,
            listener,
            tls_acceptor,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the listener fails.
    pub async fn run(self) -> Result<(), anyhow::Error> {
        let scheme = if self.tls_acceptor.is_some() { "https" } else { "http" };
        info!("Gateway listening on {}://{}", scheme, self.local_addr()?);
        info!("Proxying to {}", self.state.redirect_target);
        if self.state.config.mock_mode {
            info!("Mock mode enabled, no upstream calls will be made");
        }

        loop {
            let (stream, remote_addr) = self.listener.accept().await?;
            let state = Arc::clone(&self.state);
            let tls_acceptor = self.tls_acceptor.clone();

            tokio::spawn(async move {
                match tls_acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => serve_connection(tls_stream, state, remote_addr).await,
                        Err(err) => error!("TLS handshake failed from {}: {}", remote_addr, err),
                    },
                    None => serve_connection(stream, state, remote_addr).await,
                }
            });
        }
    }
}

async fn serve_connection<S>(stream: S, state: Arc<GatewayState>, remote_addr: SocketAddr)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    debug!("Connection from {}", remote_addr);
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| handle_request(Arc::clone(&state), req));
    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
        error!("Error serving connection from {}: {}", remote_addr, err);
    }
}
