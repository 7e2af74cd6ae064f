//! Captured upstream responses.

use super::cookies::response_cookies;
use super::first_values;
use crate::transaction::HttpResponseRecord;
use bytes::Bytes;
use hyper::{HeaderMap, StatusCode};

/// A fully buffered response. The body stays usable for the client after recording.
#[derive(Debug, Clone)]
pub struct ResponseSnapshot {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseSnapshot {
    pub fn capture(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Stand-in for a response that never arrived.
    pub fn missing() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status.as_u16() >= 400
    }

    pub fn to_record(&self) -> HttpResponseRecord {
        HttpResponseRecord {
            timestamp: chrono::Utc::now().timestamp_millis(),
            headers: first_values(&self.headers),
            status_code: self.status.as_u16(),
            body: String::from_utf8_lossy(&self.body).into_owned(),
            cookies: response_cookies(&self.headers),
        }
    }
}
