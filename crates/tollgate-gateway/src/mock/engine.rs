use super::security;
use crate::contract::{
    validate_request, ContractDocument, ContractSet, ExampleError, ExampleGenerator,
    MediaTypeObject, Operation, ValidationFinding,
};
use crate::problem::{ProblemDetails, ERROR_TYPE_BASE};
use crate::proxy::headers::{PREFERRED, TOLLGATE_STATUS_CODE};
use crate::transform::InboundRequest;
use bytes::Bytes;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const JSON: &str = "application/json";

#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("no contract is loaded")]
    NoContract,
    #[error("path '{path}' with method '{method}' is not documented")]
    PathNotFound { path: String, method: String },
    #[error("{}", .0.join("; "))]
    Security(Vec<String>),
    #[error("{}", join_findings(.0))]
    InvalidRequest(Vec<ValidationFinding>),
    #[error(transparent)]
    Example(#[from] ExampleError),
}

fn join_findings(findings: &[ValidationFinding]) -> String {
    findings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// What the engine produced for one request.
///
/// `error` may accompany a body: a failed security check still carries the
/// documented 401 example.
#[derive(Debug)]
pub struct MockOutcome {
    pub status: u16,
    pub body: Bytes,
    pub error: Option<MockError>,
}

impl MockOutcome {
    fn ok(status: u16, body: Bytes) -> Self {
        Self {
            status,
            body,
            error: None,
        }
    }

    fn failed(status: u16, body: Bytes, error: MockError) -> Self {
        Self {
            status,
            body,
            error: Some(error),
        }
    }
}

enum MediaChoice<'a> {
    Found(&'a MediaTypeObject),
    /// The code is documented without a body.
    NoContent,
    Unsupported,
}

/// Builds responses from the loaded contracts.
pub struct MockEngine {
    contracts: ContractSet,
    generator: Arc<dyn ExampleGenerator>,
    pretty: bool,
    hard_validation: bool,
}

impl MockEngine {
    /// Requests that fail contract validation are rejected unless
    /// [`with_hard_validation`](Self::with_hard_validation) turns that off.
    pub fn new(contracts: ContractSet, generator: Arc<dyn ExampleGenerator>, pretty: bool) -> Self {
        Self {
            contracts,
            generator,
            pretty,
            hard_validation: true,
        }
    }

    pub fn with_hard_validation(mut self, enabled: bool) -> Self {
        self.hard_validation = enabled;
        self
    }

    pub fn contracts(&self) -> &ContractSet {
        &self.contracts
    }

    pub fn generate(&self, request: &InboundRequest) -> MockOutcome {
        let path = request.path();
        let method = request.method.as_str();

        let Some(document) = self.contracts.select(path) else {
            return self.not_found(request, MockError::NoContract);
        };
        let Some(operation) = document
            .resolve_path(path)
            .and_then(|resolved| resolved.item.operation(&request.method))
        else {
            return self.not_found(
                request,
                MockError::PathNotFound {
                    path: path.to_string(),
                    method: method.to_string(),
                },
            );
        };

        let media_type = requested_media_type(request);
        let preferred = request.header(PREFERRED.as_str()).filter(|p| !p.is_empty());

        if let Err(failures) = security::check(document, operation, request) {
            return self.unauthorized(document, operation, request, &media_type, preferred, failures);
        }

        if self.hard_validation {
            let findings = validate_request(document.as_ref(), request);
            if !findings.is_empty() {
                return self.invalid_request(operation, &media_type, findings);
            }
        }

        let (code, media) = match preferred
            .and_then(|name| media_with_named_example(operation, &media_type, name))
        {
            Some((code, media)) => (code, MediaChoice::Found(media)),
            None => {
                let code = lowest_success_code(operation);
                (code, select_media(operation, &code.to_string(), &media_type))
            }
        };

        if code == 204 {
            return MockOutcome::ok(204, Bytes::new());
        }

        let media = match media {
            MediaChoice::Found(media) => media,
            MediaChoice::NoContent => {
                return MockOutcome::ok(
                    200,
                    self.problem(
                        "Response is empty",
                        200,
                        format!(
                            "Nothing was generated for the request '{path}' with the method '{method}'. Response is empty"
                        ),
                        "empty",
                    ),
                );
            }
            MediaChoice::Unsupported => {
                return MockOutcome::ok(
                    415,
                    self.problem(
                        "Media type not supported",
                        415,
                        format!(
                            "The media type requested '{media_type}' is not supported by this operation"
                        ),
                        "build_mock_error",
                    ),
                );
            }
        };

        let value = match self.generator.generate(document, media, preferred) {
            Ok(value) => value,
            Err(e) => {
                return MockOutcome::failed(
                    422,
                    self.problem(
                        "Unable to build mock",
                        422,
                        format!("Errors occurred while generating an error 422 mock response: {e}"),
                        "build_mock_error",
                    ),
                    e.into(),
                );
            }
        };

        let status = status_override(request).unwrap_or(code);
        debug!(id = %request.id, path = %path, status, "Mock generated");
        MockOutcome::ok(status, self.render(&value))
    }

    fn not_found(&self, request: &InboundRequest, error: MockError) -> MockOutcome {
        let body = self.problem(
            "Path / operation not found",
            404,
            format!(
                "Unable to locate the path '{}' with the method '{}'. {error}",
                request.path(),
                request.method
            ),
            "not_found",
        );
        MockOutcome::failed(404, body, error)
    }

    fn unauthorized(
        &self,
        document: &ContractDocument,
        operation: &Operation,
        request: &InboundRequest,
        media_type: &str,
        preferred: Option<&str>,
        failures: Vec<String>,
    ) -> MockOutcome {
        let failure = MockError::Security(failures);
        if let MediaChoice::Found(media) = select_media(operation, "401", media_type) {
            return match self.generator.generate(document, media, preferred) {
                Ok(value) => MockOutcome::failed(401, self.render(&value), failure),
                Err(e) => {
                    let problem = ProblemDetails {
                        kind: format!("{ERROR_TYPE_BASE}#build_mock_error"),
                        ..ProblemDetails::new(
                            "Unable to build mock (401)",
                            500,
                            format!(
                                "Errors occurred while generating an error 401 mock response: {failure}; {e}"
                            ),
                        )
                    };
                    MockOutcome::failed(500, problem.to_bytes(self.pretty), e.into())
                }
            };
        }
        let body = self.problem(
            "Unauthorized",
            401,
            format!(
                "Unable to call '{}' on '{}', you are not authorized to access this resource",
                request.method,
                request.path()
            ),
            "build_mock_error",
        );
        MockOutcome::failed(401, body, failure)
    }

    /// 422 when the operation documents a 422 or 400 response, else 500. The
    /// findings travel as the problem payload.
    fn invalid_request(
        &self,
        operation: &Operation,
        media_type: &str,
        findings: Vec<ValidationFinding>,
    ) -> MockOutcome {
        let documented = ["422", "400"].into_iter().any(|code| {
            operation.responses.contains_key(code)
                && matches!(select_media(operation, code, media_type), MediaChoice::Found(_))
        });
        let problem = if documented {
            ProblemDetails::titled(
                "Invalid request",
                422,
                "The request failed validation, Check payload for validation errors.",
                "validation_failed_error",
            )
        } else {
            ProblemDetails::titled(
                "Invalid request, specification is insufficient",
                500,
                "The request failed validation, and the specification does not contain a '422' or '400' response for this operation. Check payload for validation errors.",
                "validation_failed_and_spec_insufficient_error",
            )
        };
        let status = problem.status;
        let body = problem
            .with_payload(serde_json::to_value(&findings).unwrap_or(Value::Null))
            .to_bytes(self.pretty);
        MockOutcome::failed(status, body, MockError::InvalidRequest(findings))
    }

    fn problem(&self, title: &str, status: u16, detail: String, hash: &str) -> Bytes {
        ProblemDetails::titled(title, status, detail, hash).to_bytes(self.pretty)
    }

    fn render(&self, value: &Value) -> Bytes {
        let rendered = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        Bytes::from(rendered.unwrap_or_default())
    }
}

/// `Content-Type` media, else the first `Accept` media, else JSON.
fn requested_media_type(request: &InboundRequest) -> String {
    let media = |value: Option<&str>| {
        value
            .and_then(|v| v.split([';', ',']).next())
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
    };
    media(request.header(CONTENT_TYPE.as_str()))
        .or_else(|| media(request.header(ACCEPT.as_str())))
        .unwrap_or_else(|| JSON.to_string())
}

fn media_with_named_example<'a>(
    operation: &'a Operation,
    media_type: &str,
    name: &str,
) -> Option<(u16, &'a MediaTypeObject)> {
    operation.codes().find_map(|(code, response)| {
        let content = response.content.as_ref()?;
        let media = content.get(media_type).or_else(|| content.get(JSON))?;
        if !media.examples.contains_key(name) {
            return None;
        }
        Some((code.parse().ok()?, media))
    })
}

fn lowest_success_code(operation: &Operation) -> u16 {
    operation
        .codes()
        .filter_map(|(code, _)| code.parse::<u16>().ok())
        .filter(|code| (200..299).contains(code))
        .min()
        .unwrap_or(200)
}

fn select_media<'a>(operation: &'a Operation, code: &str, media_type: &str) -> MediaChoice<'a> {
    if let Some(response) = operation.responses.get(code) {
        return match response
            .content
            .as_ref()
            .and_then(|c| c.get(media_type).or_else(|| c.get(JSON)))
        {
            Some(media) => MediaChoice::Found(media),
            None => MediaChoice::NoContent,
        };
    }
    match operation
        .default_response()
        .and_then(|d| d.content.as_ref())
        .and_then(|c| c.get(media_type))
    {
        Some(media) => MediaChoice::Found(media),
        None => MediaChoice::Unsupported,
    }
}

fn status_override(request: &InboundRequest) -> Option<u16> {
    request
        .header(TOLLGATE_STATUS_CODE.as_str())
        .and_then(|v| v.trim().parse::<u16>().ok())
        .filter(|code| (100..=599).contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::document::tests::petstore;
    use crate::contract::SchemaExampleGenerator;
    use hyper::header::{HeaderName, HeaderValue};
    use hyper::{HeaderMap, Method};

    fn engine() -> MockEngine {
        MockEngine::new(
            ContractSet::from_documents(vec![petstore()]),
            Arc::new(SchemaExampleGenerator),
            false,
        )
    }

    fn request(method: Method, uri: &str, headers: &[(&str, &str)]) -> InboundRequest {
        request_with_body(method, uri, headers, "")
    }

    fn request_with_body(
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> InboundRequest {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        InboundRequest {
            id: "m-1".to_string(),
            method,
            uri: uri.parse().unwrap(),
            headers: map,
            body: Bytes::from(body.to_string()),
        }
    }

    fn new_pet(headers: &[(&str, &str)]) -> InboundRequest {
        let mut headers = headers.to_vec();
        headers.push(("content-type", "application/json"));
        request_with_body(Method::POST, "/pets", &headers, r#"{"id": 3, "name": "rex"}"#)
    }

    fn json(body: &Bytes) -> Value {
        serde_json::from_slice(body).unwrap()
    }

    #[test]
    fn test_lowest_success_code_with_schema_example() {
        let out = engine().generate(&request(
            Method::GET,
            "/pets/7",
            &[("authorization", "Bearer x")],
        ));
        assert_eq!(out.status, 200);
        assert!(out.error.is_none());
        assert_eq!(json(&out.body)["name"], "fluffy");
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let out = engine().generate(&request(Method::GET, "/nowhere", &[]));
        assert_eq!(out.status, 404);
        assert!(matches!(out.error, Some(MockError::PathNotFound { .. })));
        let body = json(&out.body);
        assert_eq!(body["title"], "Path / operation not found (404)");
        assert_eq!(body["type"], "https://tollgate.dev/errors#not_found");
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Unable to locate the path '/nowhere' with the method 'GET'."));
    }

    #[test]
    fn test_undocumented_method_is_not_found() {
        let out = engine().generate(&request(Method::PUT, "/pets", &[]));
        assert_eq!(out.status, 404);
    }

    #[test]
    fn test_security_failure_uses_documented_401() {
        let out = engine().generate(&request(Method::GET, "/pets/7", &[]));
        assert_eq!(out.status, 401);
        assert_eq!(json(&out.body), serde_json::json!({"error": "who are you"}));
        assert!(matches!(out.error, Some(MockError::Security(_))));
    }

    #[test]
    fn test_security_failure_without_401_example() {
        let out = engine().generate(&request(Method::GET, "/pets?limit=1", &[]));
        assert_eq!(out.status, 401);
        let body = json(&out.body);
        assert_eq!(body["title"], "Unauthorized (401)");
        assert_eq!(
            body["detail"],
            "Unable to call 'GET' on '/pets', you are not authorized to access this resource"
        );
        let error = out.error.unwrap().to_string();
        assert!(error.contains("X-API-Key"));
    }

    #[test]
    fn test_preferred_example_selects_code() {
        let e = engine();
        let out = e.generate(&request(
            Method::GET,
            "/pets?limit=1",
            &[("x-api-key", "k"), ("preferred", "missing")],
        ));
        assert_eq!(out.status, 404);
        assert!(out.error.is_none());
        assert_eq!(json(&out.body)["error"], "no pets");

        let out = e.generate(&request(
            Method::GET,
            "/pets?limit=1",
            &[("x-api-key", "k"), ("preferred", "two")],
        ));
        assert_eq!(out.status, 200);
        assert_eq!(json(&out.body).as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_lowest_code_is_picked() {
        let out = engine().generate(&new_pet(&[]));
        assert_eq!(out.status, 201);
        assert_eq!(json(&out.body)["id"], 9);
    }

    #[test]
    fn test_no_content_code() {
        let out = engine().generate(&request(
            Method::DELETE,
            "/pets/1",
            &[("x-api-key", "k")],
        ));
        assert_eq!(out.status, 204);
        assert!(out.body.is_empty());
        assert!(out.error.is_none());
    }

    #[test]
    fn test_code_without_content_is_empty_problem() {
        let out = engine().generate(&request(Method::GET, "/empty", &[]));
        assert_eq!(out.status, 200);
        let body = json(&out.body);
        assert_eq!(body["title"], "Response is empty (200)");
        assert_eq!(body["type"], "https://tollgate.dev/errors#empty");
    }

    #[test]
    fn test_undocumented_media_type_is_unsupported() {
        let out = engine().generate(&request(Method::GET, "/fallback", &[("accept", "image/png")]));
        assert_eq!(out.status, 415);
        let body = json(&out.body);
        assert_eq!(
            body["detail"],
            "The media type requested 'image/png' is not supported by this operation"
        );
    }

    #[test]
    fn test_default_response_media() {
        let out = engine().generate(&request(
            Method::GET,
            "/fallback",
            &[("accept", "text/plain")],
        ));
        assert_eq!(out.status, 200);
        assert_eq!(json(&out.body), "fallback");
    }

    #[test]
    fn test_media_type_from_content_type() {
        let out = engine().generate(&request(
            Method::GET,
            "/xml",
            &[("content-type", "application/xml; charset=utf-8")],
        ));
        assert_eq!(out.status, 200);
        assert_eq!(json(&out.body), "<pet/>");
    }

    #[test]
    fn test_status_code_override() {
        let e = engine();
        let out = e.generate(&new_pet(&[("tollgate-status-code", "418")]));
        assert_eq!(out.status, 418);
        let out = e.generate(&new_pet(&[("tollgate-status-code", "9000")]));
        assert_eq!(out.status, 201);
    }

    #[test]
    fn test_no_contract_loaded() {
        let e = MockEngine::new(ContractSet::default(), Arc::new(SchemaExampleGenerator), false);
        let out = e.generate(&request(Method::GET, "/pets", &[]));
        assert_eq!(out.status, 404);
        assert!(matches!(out.error, Some(MockError::NoContract)));
    }

    struct Failing;

    impl ExampleGenerator for Failing {
        fn generate(
            &self,
            _: &ContractDocument,
            _: &MediaTypeObject,
            _: Option<&str>,
        ) -> Result<Value, ExampleError> {
            Err(ExampleError::NothingToRender)
        }
    }

    #[test]
    fn test_generation_failure_is_422() {
        let e = MockEngine::new(
            ContractSet::from_documents(vec![petstore()]),
            Arc::new(Failing),
            true,
        );
        let out = e.generate(&new_pet(&[]));
        assert_eq!(out.status, 422);
        assert!(matches!(out.error, Some(MockError::Example(_))));
        let text = std::str::from_utf8(&out.body).unwrap();
        assert!(text.contains("\n  \"title\": \"Unable to build mock (422)\""));
    }

    #[test]
    fn test_failed_401_generation_is_500() {
        let e = MockEngine::new(
            ContractSet::from_documents(vec![petstore()]),
            Arc::new(Failing),
            false,
        );
        let out = e.generate(&request(Method::GET, "/pets/7", &[]));
        assert_eq!(out.status, 500);
        let body = json(&out.body);
        assert_eq!(body["title"], "Unable to build mock (401)");
        assert_eq!(body["status"], 500);
    }

    #[test]
    fn test_invalid_request_without_documented_rejection_is_500() {
        let out = engine().generate(&request(Method::GET, "/pets", &[("x-api-key", "k")]));
        assert_eq!(out.status, 500);
        assert!(matches!(out.error, Some(MockError::InvalidRequest(_))));
        assert!(out.error.unwrap().to_string().contains("query parameter 'limit' is missing"));
        let body = json(&out.body);
        assert_eq!(body["title"], "Invalid request, specification is insufficient (500)");
        assert_eq!(
            body["type"],
            "https://tollgate.dev/errors#validation_failed_and_spec_insufficient_error"
        );
        assert_eq!(body["payload"][0]["validationType"], "parameter");
        assert_eq!(body["payload"][0]["validationSubType"], "query");
    }

    #[test]
    fn test_invalid_request_with_documented_422() {
        let doc = ContractDocument::parse(
            std::path::Path::new("orders.yaml"),
            r#"
paths:
  /orders:
    post:
      requestBody:
        required: true
        content:
          application/json: {}
      responses:
        "201":
          description: created
          content:
            application/json:
              example: {"id": 1}
        "422":
          description: rejected
          content:
            application/json:
              example: {"error": "bad order"}
"#,
        )
        .unwrap();
        let e = MockEngine::new(
            ContractSet::from_documents(vec![doc]),
            Arc::new(SchemaExampleGenerator),
            false,
        );

        let out = e.generate(&request(Method::POST, "/orders", &[]));
        assert_eq!(out.status, 422);
        let body = json(&out.body);
        assert_eq!(body["title"], "Invalid request (422)");
        assert_eq!(body["payload"][0]["message"], "POST request body is missing");

        let out = e.generate(&request_with_body(
            Method::POST,
            "/orders",
            &[("content-type", "application/json")],
            r#"{"item": "tea"}"#,
        ));
        assert_eq!(out.status, 201);
        assert!(out.error.is_none());
    }

    #[test]
    fn test_hard_validation_disabled_serves_example() {
        let e = engine().with_hard_validation(false);
        let out = e.generate(&request(
            Method::GET,
            "/pets",
            &[("x-api-key", "k"), ("preferred", "two")],
        ));
        assert_eq!(out.status, 200);
        assert!(out.error.is_none());
    }
}
