//! Upstream HTTP client with redirect handling and cookie capture.

use super::response_ext::{full_body, GatewayBody};
use super::tls::{insecure_client_config, TlsError};
use crate::config::ConnectionPoolConfig;
use crate::transform::{OutboundRequest, ResponseSnapshot};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::header::{
    HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE,
};
use hyper::{Method, Request, StatusCode, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub type HttpClient = Client<hyper_rustls::HttpsConnector<HttpConnector>, GatewayBody>;

pub const MAX_REDIRECTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to build upstream request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("upstream request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),
    #[error("failed to read upstream response body: {0}")]
    Body(#[from] hyper::Error),
    #[error("invalid redirect location '{0}'")]
    InvalidRedirect(String),
    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
}

/// Pooled HTTP/1.1 client. Upstream certificates are not verified.
pub fn create_http_client(pool: &ConnectionPoolConfig) -> Result<HttpClient, TlsError> {
    let mut http_connector = HttpConnector::new();
    http_connector.set_keepalive(Some(Duration::from_secs(pool.keepalive_timeout_secs)));
    http_connector.set_connect_timeout(Some(Duration::from_secs(pool.connect_timeout_secs)));
    http_connector.enforce_http(false);

    let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(insecure_client_config()?)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    let client = Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
        .pool_max_idle_per_host(pool.max_idle_per_host)
        .build(https_connector);

    info!(
        max_idle = pool.max_idle_per_host,
        idle_timeout_secs = pool.idle_timeout_secs,
        keepalive_secs = pool.keepalive_timeout_secs,
        "Upstream connection pool configured"
    );
    Ok(client)
}

/// A single request/response exchange with the network.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn round_trip(&self, request: OutboundRequest) -> Result<ResponseSnapshot, ClientError>;
}

#[async_trait]
impl Transport for HttpClient {
    async fn round_trip(&self, request: OutboundRequest) -> Result<ResponseSnapshot, ClientError> {
        let mut builder = Request::builder()
            .method(request.method)
            .uri(request.uri);
        if let Some(headers) = builder.headers_mut() {
            *headers = request.headers;
        }
        let response = self.request(builder.body(full_body(request.body))?).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();
        Ok(ResponseSnapshot::capture(parts.status, parts.headers, body))
    }
}

/// Follows redirects itself so that every `Set-Cookie` along the way is seen.
///
/// When the final response carries no `Set-Cookie`, the first one captured
/// on an earlier hop is attached to it.
#[derive(Clone)]
pub struct CookieJarClient {
    transport: Arc<dyn Transport>,
    max_redirects: usize,
}

impl CookieJarClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            max_redirects: MAX_REDIRECTS,
        }
    }

    pub async fn execute(
        &self,
        request: OutboundRequest,
        follow_redirects: bool,
    ) -> Result<ResponseSnapshot, ClientError> {
        let mut captured: Vec<HeaderValue> = Vec::new();
        let mut current = request;
        let mut hops = 0;

        let mut response = loop {
            let response = self.transport.round_trip(current.clone()).await?;
            if let Some(cookie) = response.headers.get(SET_COOKIE) {
                captured.push(cookie.clone());
            }

            if !follow_redirects {
                break response;
            }
            let Some(next) = redirect_request(&current, &response)? else {
                break response;
            };
            hops += 1;
            if hops > self.max_redirects {
                return Err(ClientError::TooManyRedirects(self.max_redirects));
            }
            debug!(from = %current.uri, to = %next.uri, status = %response.status, "Following redirect");
            current = next;
        };

        if !response.headers.contains_key(SET_COOKIE) {
            if let Some(first) = captured.into_iter().next() {
                response.headers.insert(SET_COOKIE, first);
            }
        }
        Ok(response)
    }
}

fn redirect_request(
    previous: &OutboundRequest,
    response: &ResponseSnapshot,
) -> Result<Option<OutboundRequest>, ClientError> {
    let status = response.status;
    if !matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    ) {
        return Ok(None);
    }
    let Some(location) = response.headers.get(LOCATION).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    let uri = resolve_location(&previous.uri, location)?;

    let mut next = previous.clone();
    if uri.authority() != previous.uri.authority() {
        next.headers.remove(AUTHORIZATION);
        next.headers.remove(COOKIE);
    }
    let keeps_body = matches!(
        status,
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT
    );
    if !keeps_body && previous.method != Method::GET && previous.method != Method::HEAD {
        next.method = Method::GET;
        next.body = Bytes::new();
        next.headers.remove(CONTENT_TYPE);
        next.headers.remove(CONTENT_LENGTH);
    }
    next.uri = uri;
    Ok(Some(next))
}

/// Resolve a `Location` value against the URI that produced it.
fn resolve_location(base: &Uri, location: &str) -> Result<Uri, ClientError> {
    let invalid = || ClientError::InvalidRedirect(location.to_string());
    if location.contains("://") {
        return location.parse().map_err(|_| invalid());
    }

    let scheme = base.scheme_str().unwrap_or("http");
    let authority = base.authority().ok_or_else(invalid)?;
    let target = if let Some(rest) = location.strip_prefix("//") {
        format!("{scheme}://{rest}")
    } else if location.starts_with('/') {
        format!("{scheme}://{authority}{location}")
    } else {
        let dir = base
            .path()
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .unwrap_or_default();
        format!("{scheme}://{authority}{dir}/{location}")
    };
    target.parse().map_err(|_| invalid())
}
