//! Route dispatch for the monitor API.

use super::handlers;
use super::types::{collect_body, error_response, not_found};
use super::MonitorState;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::debug;

pub async fn route_request<B>(
    req: Request<B>,
    state: Arc<MonitorState>,
) -> Result<Response<Full<Bytes>>, hyper::Error>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("Monitor API: {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => handlers::handle_health(),
        (&Method::GET, "/metrics") => handlers::handle_metrics(),
        (&Method::GET, "/transactions") => handlers::handle_transaction_count(&state),
        (&Method::GET, "/transactions/report") => handlers::handle_transaction_report(&state),
        (&Method::GET, "/controls") => handlers::handle_get_controls(&state),
        (&Method::POST, "/controls/delay") => match collect_body(req).await {
            Ok(body) => handlers::handle_change_delay(&state, &body),
            Err(e) => error_response(StatusCode::BAD_REQUEST, &e),
        },
        (&Method::GET, _) => match path.strip_prefix("/transactions/") {
            Some(id) if !id.is_empty() && !id.contains('/') => {
                handlers::handle_transaction(&state, id)
            }
            _ => not_found(),
        },
        _ => not_found(),
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DelayHandle, GatewayConfig};
    use crate::controls::ControlService;
    use crate::transaction::{HttpRequestRecord, TransactionStore};
    use http_body_util::BodyExt;
    use serde_json::Value;

    fn state() -> (Arc<MonitorState>, DelayHandle) {
        let config = GatewayConfig::from_yaml("redirectHost: localhost\n").unwrap();
        let delay = DelayHandle::new(0);
        let store = Arc::new(TransactionStore::new(100));
        store.record_request(
            "abc",
            HttpRequestRecord {
                method: "GET".to_string(),
                path: "/pets".to_string(),
                ..Default::default()
            },
            Vec::new(),
        );
        let state = MonitorState {
            store,
            controls: ControlService::new(Arc::new(config), delay.clone()),
        };
        (Arc::new(state), delay)
    }

    async fn call(state: &Arc<MonitorState>, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();
        let response = route_request(req, Arc::clone(state)).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state();
        let (status, body) = call(&state, Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_transactions() {
        let (state, _) = state();
        let (status, body) = call(&state, Method::GET, "/transactions", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (status, body) = call(&state, Method::GET, "/transactions/abc", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "abc");
        assert_eq!(body["httpRequest"]["path"], "/pets");

        let (status, _) = call(&state, Method::GET, "/transactions/missing", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_transaction_report() {
        let (state, _) = state();
        state.store.record_request(
            "def",
            HttpRequestRecord {
                method: "POST".to_string(),
                path: "/orders".to_string(),
                ..Default::default()
            },
            Vec::new(),
        );

        let (status, body) = call(&state, Method::GET, "/transactions/report", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["limit"], 100);
        assert_eq!(body["transactions"][0]["id"], "abc");
        assert_eq!(body["transactions"][1]["httpRequest"]["path"], "/orders");
    }

    #[tokio::test]
    async fn test_change_delay() {
        let (state, delay) = state();
        let (status, body) = call(&state, Method::POST, "/controls/delay", r#"{"delay": 120}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["globalAPIDelay"], 120);
        assert_eq!(delay.get(), 120);

        let (status, _) = call(&state, Method::POST, "/controls/delay", r#"{"delay": -1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(delay.get(), 120);

        let (status, _) = call(&state, Method::POST, "/controls/delay", "nope").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&state, Method::GET, "/controls", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["config"]["globalAPIDelay"], 120);
    }

    #[tokio::test]
    async fn test_metrics_and_unknown_routes() {
        let (state, _) = state();
        let req = Request::builder()
            .uri("/metrics")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = route_request(req, Arc::clone(&state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["Content-Type"],
            "text/plain; version=0.0.4"
        );

        let (status, _) = call(&state, Method::DELETE, "/transactions", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
