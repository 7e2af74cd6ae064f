//! Outbound request construction: header policy, auth and referer handling.

use super::cookies::request_cookies;
use super::multipart::{is_multipart, parse_form};
use super::first_values;
use crate::config::HeaderConfig;
use crate::routing::PathRouter;
use crate::transaction::HttpRequestRecord;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE, HOST, REFERER};
use hyper::{HeaderMap, Method, Uri};
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub static X_ORIGINAL_REFERER: HeaderName = HeaderName::from_static("x-original-referer");

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("invalid upstream url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Buffered snapshot of a client request, taken at admission.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of `name`, across repeated headers.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Host from the `Host` header, falling back to the URI authority.
    pub fn host(&self) -> &str {
        self.header(HOST.as_str())
            .or_else(|| self.uri.host())
            .unwrap_or_default()
    }

    /// The request as it arrived, addressed to the gateway itself.
    ///
    /// Used for transactions that never reach an upstream.
    pub fn as_received(&self, scheme: &str) -> OutboundRequest {
        let path_and_query = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let uri = match self.host() {
            "" => self.uri.clone(),
            host => format!("{scheme}://{host}{path_and_query}")
                .parse()
                .unwrap_or_else(|_| self.uri.clone()),
        };
        OutboundRequest {
            method: self.method.clone(),
            uri,
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// Headers to drop and inject, plus the basic-auth credential, for one path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderPolicy {
    pub drop: Vec<String>,
    /// Variable-resolved values.
    pub inject: Vec<(String, String)>,
    /// Variable-resolved `user:password`.
    pub auth: Option<String>,
}

impl HeaderPolicy {
    /// Global policy merged with every rule matching `path`.
    ///
    /// Drops are the union. Injects start from the global ones; a matching rule
    /// overrides a key, with earlier-declared rules winning over later ones.
    /// Auth comes from the first matching rule.
    pub fn for_path(global: &HeaderConfig, router: &PathRouter, path: &str) -> Self {
        let variables = router.variables();
        let matched = router.find_paths(path);

        let mut policy = HeaderPolicy::default();
        for name in &global.drop {
            policy.add_drop(name);
        }
        for (name, value) in global.inject.iter() {
            policy.set_inject(name, variables.resolve(value));
        }

        for rule in matched.iter() {
            if let Some(headers) = &rule.config.headers {
                for name in &headers.drop {
                    policy.add_drop(name);
                }
            }
        }
        for rule in matched.iter().rev() {
            if let Some(headers) = &rule.config.headers {
                for (name, value) in headers.inject.iter() {
                    policy.set_inject(name, variables.resolve(value));
                }
            }
        }

        policy.auth = matched
            .first()
            .and_then(|rule| rule.config.auth.as_deref())
            .map(|auth| variables.resolve(auth));
        policy
    }

    pub fn drops(&self, name: &str) -> bool {
        self.drop.iter().any(|d| d.eq_ignore_ascii_case(name))
    }

    fn add_drop(&mut self, name: &str) {
        if !self.drops(name) {
            self.drop.push(name.to_string());
        }
    }

    fn set_inject(&mut self, name: &str, value: String) {
        match self
            .inject
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.inject.push((name.to_string(), value)),
        }
    }
}

/// The request sent upstream.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Derive the upstream request from `inbound`.
///
/// `redirect_target` is the configured redirect base, used to rewrite `Referer`.
pub fn build_outbound(
    inbound: &InboundRequest,
    policy: &HeaderPolicy,
    upstream_url: &str,
    redirect_target: &str,
) -> Result<OutboundRequest, TransformError> {
    let uri: Uri = upstream_url
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| TransformError::InvalidUrl {
            url: upstream_url.to_string(),
            reason: e.to_string(),
        })?;
    if uri.scheme().is_none() || uri.host().is_none() {
        return Err(TransformError::InvalidUrl {
            url: upstream_url.to_string(),
            reason: "url must be absolute".to_string(),
        });
    }

    let mut headers = HeaderMap::with_capacity(inbound.headers.len());
    for (name, value) in &inbound.headers {
        if name == HOST || policy.drops(name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    for (name, value) in &policy.inject {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping injected header that is not a valid HTTP header"),
        }
    }

    if let Some(auth) = &policy.auth {
        let encoded = STANDARD.encode(auth.as_bytes());
        if let Ok(value) = HeaderValue::from_str(&format!("Basic {encoded}")) {
            headers.insert(AUTHORIZATION, value);
        }
    }

    if let Some(referer) = headers.get(REFERER).cloned() {
        let path_and_query = inbound
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let rewritten = format!("{}{}", redirect_target.trim_end_matches('/'), path_and_query);
        if let Ok(value) = HeaderValue::from_str(&rewritten) {
            headers.insert(X_ORIGINAL_REFERER.clone(), referer);
            headers.insert(REFERER, value);
        }
    }

    debug!(id = %inbound.id, url = %uri, "Outbound request built");

    Ok(OutboundRequest {
        method: inbound.method.clone(),
        uri,
        headers,
        body: inbound.body.clone(),
    })
}

/// The request half of a transaction, as observers see it.
pub async fn record_request(
    inbound: &InboundRequest,
    outbound: &OutboundRequest,
    policy: &HeaderPolicy,
) -> HttpRequestRecord {
    let body = match outbound
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| is_multipart(ct))
    {
        Some(ct) => match parse_form(ct, outbound.body.clone()).await {
            Ok(parts) => serde_json::to_string(&parts).unwrap_or_default(),
            Err(e) => {
                warn!(id = %inbound.id, error = %e, "Unable to parse multipart body, recording it raw");
                String::from_utf8_lossy(&outbound.body).into_owned()
            }
        },
        None => String::from_utf8_lossy(&outbound.body).into_owned(),
    };

    HttpRequestRecord {
        timestamp: chrono::Utc::now().timestamp_millis(),
        url: outbound.uri.to_string(),
        method: outbound.method.to_string(),
        host: outbound
            .uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_default(),
        path: outbound.uri.path().to_string(),
        original_path: inbound.path().to_string(),
        dropped_headers: policy.drop.clone(),
        injected_headers: policy.inject.iter().cloned().collect::<BTreeMap<_, _>>(),
        query: outbound.uri.query().unwrap_or_default().to_string(),
        headers: first_values(&outbound.headers),
        body,
        cookies: request_cookies(&outbound.headers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GatewayConfig, VariableTable};
    use std::sync::Arc;

    fn setup(yaml: &str) -> (GatewayConfig, PathRouter) {
        let config: GatewayConfig = serde_yaml::from_str(yaml).unwrap();
        let vars = Arc::new(VariableTable::compile(&config.variables).unwrap());
        let router = PathRouter::compile(&config, vars).unwrap();
        (config, router)
    }

    fn inbound(path: &str, headers: &[(&str, &str)]) -> InboundRequest {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        InboundRequest {
            id: "txn-1".to_string(),
            method: Method::POST,
            uri: path.parse().unwrap(),
            headers: map,
            body: Bytes::from_static(b"{\"a\":1}"),
        }
    }

    const YAML: &str = r#"
variables:
  tenant: acme
  user: alice
  pass: s3cret
headers:
  drop: [X-Global-Drop]
  inject:
    X-Gateway: tollgate
    X-Tenant: global
paths:
  /api/**:
    target: backend:1
    auth: ${user}:${pass}
    headers:
      drop: [Cookie]
      inject:
        X-Tenant: ${tenant}
  /api/orders/**:
    target: backend:2
    headers:
      drop: [X-Debug]
      inject:
        X-Tenant: later
        X-Orders: "yes"
"#;

    #[test]
    fn test_policy_merges_matching_rules() {
        let (config, router) = setup(YAML);
        let policy = HeaderPolicy::for_path(&config.headers, &router, "/api/orders/1");
        assert_eq!(policy.drop, vec!["X-Global-Drop", "Cookie", "X-Debug"]);
        let inject: BTreeMap<_, _> = policy.inject.iter().cloned().collect();
        assert_eq!(inject["X-Gateway"], "tollgate");
        assert_eq!(inject["X-Tenant"], "acme");
        assert_eq!(inject["X-Orders"], "yes");
        assert_eq!(policy.auth.as_deref(), Some("alice:s3cret"));
    }

    #[test]
    fn test_policy_without_matching_rule_is_global() {
        let (config, router) = setup(YAML);
        let policy = HeaderPolicy::for_path(&config.headers, &router, "/other");
        assert_eq!(policy.drop, vec!["X-Global-Drop"]);
        assert_eq!(policy.inject.len(), 2);
        assert!(policy.auth.is_none());
    }

    #[test]
    fn test_build_outbound_applies_policy() {
        let (config, router) = setup(YAML);
        let policy = HeaderPolicy::for_path(&config.headers, &router, "/api/items");
        let req = inbound(
            "/api/items?x=1",
            &[
                ("host", "gateway.local"),
                ("cookie", "a=1"),
                ("x-global-drop", "bye"),
                ("x-keep", "kept"),
                ("authorization", "Bearer old"),
            ],
        );
        let out = build_outbound(&req, &policy, "http://backend:1/api/items?x=1", "http://backend:1")
            .unwrap();
        assert_eq!(out.uri.to_string(), "http://backend:1/api/items?x=1");
        assert!(out.headers.get("host").is_none());
        assert!(out.headers.get("cookie").is_none());
        assert!(out.headers.get("x-global-drop").is_none());
        assert_eq!(out.headers["x-keep"], "kept");
        assert_eq!(out.headers["x-tenant"], "acme");
        assert_eq!(
            out.headers["authorization"],
            format!("Basic {}", STANDARD.encode("alice:s3cret"))
        );
        assert_eq!(out.body, req.body);
    }

    #[test]
    fn test_injected_header_wins_over_dropped() {
        let (config, router) = setup(
            r#"
headers:
  drop: [X-Env]
  inject:
    X-Env: gateway
"#,
        );
        let policy = HeaderPolicy::for_path(&config.headers, &router, "/x");
        let req = inbound("/x", &[("x-env", "client")]);
        let out = build_outbound(&req, &policy, "http://up/x", "http://up").unwrap();
        assert_eq!(out.headers["x-env"], "gateway");
    }

    #[test]
    fn test_referer_is_rewritten_and_preserved() {
        let policy = HeaderPolicy::default();
        let req = inbound("/page?q=2", &[("referer", "http://localhost:9090/start")]);
        let out = build_outbound(&req, &policy, "https://api.example.com/page?q=2", "https://api.example.com/")
            .unwrap();
        assert_eq!(out.headers["x-original-referer"], "http://localhost:9090/start");
        assert_eq!(out.headers["referer"], "https://api.example.com/page?q=2");
    }

    #[test]
    fn test_as_received_uses_host_header() {
        let req = inbound("/pets?limit=2", &[("host", "gateway.local:9090")]);
        let received = req.as_received("http");
        assert_eq!(received.uri.to_string(), "http://gateway.local:9090/pets?limit=2");
        assert_eq!(received.method, Method::POST);

        let bare = inbound("/pets", &[]);
        assert_eq!(bare.as_received("https").uri.to_string(), "/pets");
    }

    #[test]
    fn test_relative_url_is_rejected() {
        let req = inbound("/x", &[]);
        let err = build_outbound(&req, &HeaderPolicy::default(), "/x", "").unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[tokio::test]
    async fn test_record_request() {
        let (config, router) = setup(YAML);
        let policy = HeaderPolicy::for_path(&config.headers, &router, "/api/items");
        let req = inbound("/api/items?x=1", &[("content-type", "application/json")]);
        let out =
            build_outbound(&req, &policy, "http://backend:1/v2/items?x=1", "http://backend:1").unwrap();
        let record = record_request(&req, &out, &policy).await;
        assert_eq!(record.url, "http://backend:1/v2/items?x=1");
        assert_eq!(record.host, "backend:1");
        assert_eq!(record.path, "/v2/items");
        assert_eq!(record.original_path, "/api/items");
        assert_eq!(record.query, "x=1");
        assert_eq!(record.method, "POST");
        assert_eq!(record.body, "{\"a\":1}");
        assert_eq!(record.headers["content-type"], "application/json");
        assert!(record.dropped_headers.contains(&"Cookie".to_string()));
        assert_eq!(record.injected_headers["X-Tenant"], "acme");
    }
}
