//! Credential presence checks for mocked operations.
//!
//! Only presence is verified. Token contents are never inspected.

use crate::contract::{ContractDocument, Operation, SecurityScheme};
use crate::transform::InboundRequest;
use std::collections::BTreeSet;

/// `Ok` when at least one declared scheme is satisfied, or when the
/// operation needs no credentials. Otherwise one message per missing one.
pub fn check(
    document: &ContractDocument,
    operation: &Operation,
    request: &InboundRequest,
) -> Result<(), Vec<String>> {
    if document.components.security_schemes.is_empty() {
        return Ok(());
    }
    let requirements = operation.security.as_ref().unwrap_or(&document.security);
    if requirements.is_empty() || requirements.iter().any(|r| r.is_empty()) {
        return Ok(());
    }

    let names: BTreeSet<&str> = requirements
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect();

    let mut failures = Vec::new();
    let mut compared = 0;
    for name in names {
        let Some(scheme) = document.components.security_schemes.get(name) else {
            continue;
        };
        compared += 1;
        if let Some(failure) = missing_credential(scheme, request) {
            failures.push(failure);
        }
    }

    if compared > 0 && failures.len() == compared {
        Err(failures)
    } else {
        Ok(())
    }
}

fn missing_credential(scheme: &SecurityScheme, request: &InboundRequest) -> Option<String> {
    match scheme.kind.to_ascii_lowercase().as_str() {
        "http" => {
            let kind = scheme.scheme.to_ascii_lowercase();
            if (kind == "bearer" || kind == "basic") && request.header("authorization").is_none() {
                return Some(format!(
                    "{} authentication failed: bearer token not found, no `Authorization` header found in request",
                    scheme.scheme
                ));
            }
            None
        }
        "apikey" => match scheme.location.to_ascii_lowercase().as_str() {
            "header" if request.header(&scheme.name).is_none() => Some(format!(
                "apiKey not found, no `{}` header found in request",
                scheme.name
            )),
            "query" if !has_query_param(request, &scheme.name) => Some(format!(
                "apiKey not found, no `{}` query parameter found in request",
                scheme.name
            )),
            "cookie" if !has_cookie(request, &scheme.name) => Some(format!(
                "apiKey not found, no `{}` cookie found in request",
                scheme.name
            )),
            _ => None,
        },
        _ => None,
    }
}

fn has_query_param(request: &InboundRequest, name: &str) -> bool {
    request
        .query()
        .unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split('=').next())
        .any(|key| urlencoding::decode(key).map(|k| k == name).unwrap_or(false))
}

fn has_cookie(request: &InboundRequest, name: &str) -> bool {
    request
        .header_values("cookie")
        .iter()
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('=').map(|(k, _)| k))
        .any(|k| k == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::document::tests::petstore;
    use bytes::Bytes;
    use hyper::header::{HeaderName, HeaderValue};
    use hyper::{HeaderMap, Method};
    use std::path::Path;

    fn request(uri: &str, headers: &[(&str, &str)]) -> InboundRequest {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        InboundRequest {
            id: "t".to_string(),
            method: Method::GET,
            uri: uri.parse().unwrap(),
            headers: map,
            body: Bytes::new(),
        }
    }

    #[test]
    fn test_global_api_key_missing() {
        let doc = petstore();
        let op = doc.paths["/pets"].get.as_ref().unwrap();
        let err = check(&doc, op, &request("/pets", &[])).unwrap_err();
        assert_eq!(
            err,
            vec!["apiKey not found, no `X-API-Key` header found in request".to_string()]
        );
        assert!(check(&doc, op, &request("/pets", &[("x-api-key", "k")])).is_ok());
    }

    #[test]
    fn test_operation_bearer_overrides_global() {
        let doc = petstore();
        let op = doc.paths["/pets/{petId}"].get.as_ref().unwrap();
        let err = check(&doc, op, &request("/pets/1", &[("x-api-key", "k")])).unwrap_err();
        assert!(err[0].starts_with("bearer authentication failed"));
        assert!(check(&doc, op, &request("/pets/1", &[("authorization", "Bearer t")])).is_ok());
    }

    #[test]
    fn test_empty_operation_security_disables_checks() {
        let doc = petstore();
        let op = doc.paths["/pets"].post.as_ref().unwrap();
        assert!(check(&doc, op, &request("/pets", &[])).is_ok());
    }

    const MULTI: &str = r#"
paths:
  /multi:
    get:
      security:
        - q: []
        - c: []
      responses:
        "200": {description: ok}
  /optional:
    get:
      security:
        - q: []
        - {}
      responses:
        "200": {description: ok}
components:
  securitySchemes:
    q: {type: apiKey, in: query, name: token}
    c: {type: apiKey, in: cookie, name: session}
"#;

    #[test]
    fn test_any_scheme_satisfies() {
        let doc = ContractDocument::parse(Path::new("multi.yaml"), MULTI).unwrap();
        let op = doc.paths["/multi"].get.as_ref().unwrap();

        let err = check(&doc, op, &request("/multi", &[])).unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.iter().any(|e| e.contains("`token` query parameter")));
        assert!(err.iter().any(|e| e.contains("`session` cookie")));

        assert!(check(&doc, op, &request("/multi?token=abc", &[])).is_ok());
        assert!(check(&doc, op, &request("/multi", &[("cookie", "a=1; session=x")])).is_ok());
    }

    #[test]
    fn test_empty_requirement_is_optional() {
        let doc = ContractDocument::parse(Path::new("multi.yaml"), MULTI).unwrap();
        let op = doc.paths["/optional"].get.as_ref().unwrap();
        assert!(check(&doc, op, &request("/optional", &[])).is_ok());
    }
}
