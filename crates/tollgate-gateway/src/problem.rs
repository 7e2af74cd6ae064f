//! RFC 7807 problem-details bodies.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const ERROR_TYPE_BASE: &str = "https://tollgate.dev/errors";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub status: u16,
    pub detail: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

fn is_zero(v: &u16) -> bool {
    *v == 0
}

impl ProblemDetails {
    pub fn new(title: impl Into<String>, status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: ERROR_TYPE_BASE.to_string(),
            title: title.into(),
            status,
            detail: detail.into(),
            instance: String::new(),
            payload: None,
        }
    }

    /// Title rendered as `"{title} ({status})"`, type anchored at `hash`.
    pub fn titled(title: &str, status: u16, detail: impl Into<String>, hash: &str) -> Self {
        Self {
            kind: format!("{ERROR_TYPE_BASE}#{hash}"),
            ..Self::new(format!("{title} ({status})"), status, detail)
        }
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn to_bytes(&self, pretty: bool) -> Bytes {
        let rendered = if pretty {
            serde_json::to_vec_pretty(self)
        } else {
            serde_json::to_vec(self)
        };
        Bytes::from(rendered.unwrap_or_default())
    }
}
