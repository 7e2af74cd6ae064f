//! Structural contract validation of requests and responses.

use super::document::{ContractDocument, Operation, Parameter};
use crate::transform::{cookies::request_cookies, InboundRequest, ResponseSnapshot};
use hyper::header::CONTENT_TYPE;
use hyper::Method;
use serde::{Deserialize, Serialize};

pub const TYPE_PATH: &str = "path";
pub const TYPE_PARAMETER: &str = "parameter";
pub const TYPE_REQUEST_BODY: &str = "requestBody";
pub const TYPE_RESPONSE: &str = "response";
pub const SUBTYPE_MISSING: &str = "missing";

/// A single contract violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFinding {
    pub message: String,
    pub reason: String,
    pub validation_type: String,
    pub validation_sub_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub how_to_fix: String,
}

impl ValidationFinding {
    pub fn new(
        validation_type: &str,
        validation_sub_type: &str,
        message: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            reason: reason.into(),
            validation_type: validation_type.to_string(),
            validation_sub_type: validation_sub_type.to_string(),
            how_to_fix: String::new(),
        }
    }

    pub fn with_fix(mut self, how_to_fix: impl Into<String>) -> Self {
        self.how_to_fix = how_to_fix.into();
        self
    }

    pub fn is_path_missing(&self) -> bool {
        self.validation_type == TYPE_PATH && self.validation_sub_type == SUBTYPE_MISSING
    }
}

impl std::fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.message, self.reason)
    }
}

/// Validates traffic against one API contract.
pub trait ContractValidator: Send + Sync {
    /// Empty when the path and operation exist.
    fn find_path(&self, method: &Method, path: &str) -> Vec<ValidationFinding>;
    fn validate_parameters(&self, request: &InboundRequest) -> Vec<ValidationFinding>;
    fn validate_request_body(&self, request: &InboundRequest) -> Vec<ValidationFinding>;
    fn validate_response_body(
        &self,
        request: &InboundRequest,
        response: &ResponseSnapshot,
    ) -> Vec<ValidationFinding>;
}

/// Full request validation. At most one path-missing finding is kept.
pub fn validate_request(
    validator: &dyn ContractValidator,
    request: &InboundRequest,
) -> Vec<ValidationFinding> {
    let mut findings = validator.find_path(&request.method, request.path());
    findings.extend(validator.validate_parameters(request));
    findings.extend(validator.validate_request_body(request));

    let mut seen_missing = false;
    findings.retain(|f| {
        if !f.is_path_missing() {
            return true;
        }
        !std::mem::replace(&mut seen_missing, true)
    });
    findings
}

/// Response validation. Path-missing findings belong to the request and are dropped.
pub fn validate_response(
    validator: &dyn ContractValidator,
    request: &InboundRequest,
    response: &ResponseSnapshot,
) -> Vec<ValidationFinding> {
    let mut findings = validator.validate_response_body(request, response);
    findings.retain(|f| !f.is_path_missing());
    findings
}

fn path_missing(method: &Method, path: &str) -> ValidationFinding {
    ValidationFinding::new(
        TYPE_PATH,
        SUBTYPE_MISSING,
        format!("{method} Path '{path}' not found"),
        format!("The {method} request contains a path of '{path}' however that path, or the {method} method for that path does not exist in the specification"),
    )
    .with_fix("Check the request is for a valid path in the contract")
}

fn media_type(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

fn is_json(media: &str) -> bool {
    media == "application/json" || media.ends_with("+json")
}

impl ContractDocument {
    fn operation_for(&self, method: &Method, path: &str) -> Option<(Vec<&Parameter>, &Operation)> {
        let resolved = self.resolve_path(path)?;
        let operation = resolved.item.operation(method)?;
        let mut params: Vec<&Parameter> = operation.parameters.iter().collect();
        for shared in &resolved.item.parameters {
            if !params
                .iter()
                .any(|p| p.name == shared.name && p.location == shared.location)
            {
                params.push(shared);
            }
        }
        Some((params, operation))
    }
}

impl ContractValidator for ContractDocument {
    fn find_path(&self, method: &Method, path: &str) -> Vec<ValidationFinding> {
        match self.operation_for(method, path) {
            Some(_) => Vec::new(),
            None => vec![path_missing(method, path)],
        }
    }

    fn validate_parameters(&self, request: &InboundRequest) -> Vec<ValidationFinding> {
        let Some((params, _)) = self.operation_for(&request.method, request.path()) else {
            return Vec::new();
        };

        let query: Vec<String> = request
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let name = pair.split_once('=').map(|(k, _)| k).unwrap_or(pair);
                urlencoding::decode(name)
                    .map(|n| n.into_owned())
                    .unwrap_or_else(|_| name.to_string())
            })
            .collect();
        let cookies = request_cookies(&request.headers);

        let mut findings = Vec::new();
        for param in params.into_iter().filter(|p| p.required) {
            let present = match param.location.as_str() {
                "query" => query.iter().any(|q| q == &param.name),
                "header" => request.headers.contains_key(param.name.as_str()),
                "cookie" => cookies.contains_key(&param.name),
                _ => true,
            };
            if !present {
                let location = param.location.as_str();
                findings.push(
                    ValidationFinding::new(
                        TYPE_PARAMETER,
                        location,
                        format!("{location} parameter '{}' is missing", param.name),
                        format!(
                            "The {location} parameter '{}' is defined as being required, however it's missing from the request",
                            param.name
                        ),
                    )
                    .with_fix(format!("Add the '{}' {location} parameter to the request", param.name)),
                );
            }
        }
        findings
    }

    fn validate_request_body(&self, request: &InboundRequest) -> Vec<ValidationFinding> {
        let Some((_, operation)) = self.operation_for(&request.method, request.path()) else {
            return Vec::new();
        };
        let Some(body_spec) = &operation.request_body else {
            return Vec::new();
        };

        if request.body.is_empty() {
            if body_spec.required {
                return vec![ValidationFinding::new(
                    TYPE_REQUEST_BODY,
                    SUBTYPE_MISSING,
                    format!("{} request body is missing", request.method),
                    "The request body is defined as required, however the request has no body",
                )];
            }
            return Vec::new();
        }

        let media = media_type(request.content_type().unwrap_or_default()).to_ascii_lowercase();
        if !body_spec.content.is_empty() && !body_spec.content.contains_key(&media) {
            return vec![ValidationFinding::new(
                TYPE_REQUEST_BODY,
                "contentType",
                format!("{} operation request content type '{media}' does not exist", request.method),
                format!(
                    "The content type '{media}' of the request body is not documented, expected one of {:?}",
                    body_spec.content.keys().collect::<Vec<_>>()
                ),
            )];
        }

        if is_json(&media) {
            if let Err(e) = serde_json::from_slice::<serde_json::Value>(&request.body) {
                return vec![ValidationFinding::new(
                    TYPE_REQUEST_BODY,
                    "schema",
                    format!("{} request body is not valid JSON", request.method),
                    e.to_string(),
                )];
            }
        }
        Vec::new()
    }

    fn validate_response_body(
        &self,
        request: &InboundRequest,
        response: &ResponseSnapshot,
    ) -> Vec<ValidationFinding> {
        let Some((_, operation)) = self.operation_for(&request.method, request.path()) else {
            return vec![path_missing(&request.method, request.path())];
        };

        let status = response.status.as_u16();
        let Some(documented) = operation.response_for(status) else {
            return vec![ValidationFinding::new(
                TYPE_RESPONSE,
                SUBTYPE_MISSING,
                format!("{} / {status} operation response code not defined", request.method),
                format!(
                    "The response code '{status}' for the {} operation on '{}' is not documented",
                    request.method,
                    request.path()
                ),
            )];
        };

        let content_type = response
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let media = media_type(content_type).to_ascii_lowercase();
        let declared = documented.content.as_ref();
        let documents_media = declared.is_some_and(|c| c.contains_key(&media));

        if !response.body.is_empty() && is_json(&media) && documents_media {
            if let Err(e) = serde_json::from_slice::<serde_json::Value>(&response.body) {
                return vec![ValidationFinding::new(
                    TYPE_RESPONSE,
                    "schema",
                    format!("{status} response body is not valid JSON"),
                    e.to_string(),
                )];
            }
        }

        if let Some(content) = declared {
            if !content.is_empty() && !media.is_empty() && !documents_media {
                return vec![ValidationFinding::new(
                    TYPE_RESPONSE,
                    "contentType",
                    format!("{status} response content type '{media}' does not exist"),
                    format!(
                        "The content type '{media}' of the {status} response is not documented, expected one of {:?}",
                        content.keys().collect::<Vec<_>>()
                    ),
                )];
            }
        }
        Vec::new()
    }
}
