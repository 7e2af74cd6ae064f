//! Response bodies and helpers for the monitor API.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use crate::transaction::HttpTransaction;
use serde::{Deserialize, Serialize};

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TransactionCount {
    pub count: usize,
    pub limit: usize,
}

/// Body of `GET /transactions/report`.
#[derive(Debug, Serialize)]
pub struct TransactionReport {
    pub count: usize,
    pub limit: usize,
    pub transactions: Vec<HttpTransaction>,
}

/// Body of `POST /controls/delay`.
#[derive(Debug, Deserialize)]
pub struct ChangeDelayRequest {
    pub delay: i64,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Falls back to a bare 500 if the builder rejects the headers.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

pub fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: status.as_str().to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not Found")
}

pub async fn collect_body<B>(req: Request<B>) -> Result<Bytes, String>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    req.into_body()
        .collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_format() {
        let resp = error_response(StatusCode::BAD_REQUEST, "Test error");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers()["Content-Type"], "application/json");
    }

    #[test]
    fn test_invalid_header_falls_back_to_500() {
        let resp = build_response_with_headers(StatusCode::OK, [("bad header", "x")], "body");
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_collect_body() {
        let req = Request::new(Full::new(Bytes::from_static(b"{\"delay\": 5}")));
        let body = collect_body(req).await.unwrap();
        let parsed: ChangeDelayRequest = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.delay, 5);
    }
}
