//! Transaction records as stored and broadcast.

use crate::contract::ValidationFinding;
use crate::transform::CookieMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestRecord {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dropped_headers: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub injected_headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub query: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "requestBody", default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies: CookieMap,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponseRecord {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub status_code: u16,
    #[serde(rename = "responseBody", default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cookies: CookieMap,
}

/// One request/response exchange, joined by `id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpTransaction {
    #[serde(rename = "httpRequest", default, skip_serializing_if = "Option::is_none")]
    pub request: Option<HttpRequestRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub request_validation: Vec<ValidationFinding>,
    #[serde(rename = "httpResponse", default, skip_serializing_if = "Option::is_none")]
    pub response: Option<HttpResponseRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_validation: Vec<ValidationFinding>,
    pub id: String,
}

impl HttpTransaction {
    pub fn with_request(
        id: impl Into<String>,
        request: HttpRequestRecord,
        findings: Vec<ValidationFinding>,
    ) -> Self {
        Self {
            id: id.into(),
            request: Some(request),
            request_validation: findings,
            ..Default::default()
        }
    }

    pub fn with_response(
        id: impl Into<String>,
        response: HttpResponseRecord,
        findings: Vec<ValidationFinding>,
    ) -> Self {
        Self {
            id: id.into(),
            response: Some(response),
            response_validation: findings,
            ..Default::default()
        }
    }
}
