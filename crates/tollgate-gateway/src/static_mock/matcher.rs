//! Request matching for static mock definitions.

use super::definition::MockRequestPattern;
use crate::transform::InboundRequest;
use hyper::header::CONTENT_TYPE;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

const REGEX_CHARS: &[char] = &[
    '.', '*', '+', '?', '^', '$', '[', ']', '(', ')', '|', '{', '}',
];

/// Regexes compiled for one definition table. Reloading builds a fresh cache,
/// so patterns removed from disk are dropped with the old table.
#[derive(Debug, Default)]
pub struct PatternCache {
    /// `None` marks text that does not compile as a regex.
    patterns: RwLock<HashMap<String, Option<Regex>>>,
}

impl PatternCache {
    pub fn len(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compiled(&self, pattern: &str) -> Option<Regex> {
        if let Some(cached) = self.patterns.read().get(pattern) {
            return cached.clone();
        }
        let regex = Regex::new(pattern).ok();
        self.patterns
            .write()
            .insert(pattern.to_string(), regex.clone());
        regex
    }

    /// Regex match when `pattern` looks like a regex and compiles, otherwise equality.
    pub fn string_compare(&self, pattern: &str, s: &str) -> bool {
        if pattern.contains(REGEX_CHARS) {
            if let Some(regex) = self.compiled(pattern) {
                return regex.is_match(s);
            }
        }
        pattern == s
    }

    /// Whether `subset` is contained in `superset`.
    ///
    /// Objects need every key present with a subset value; every element of an
    /// array must be a subset of some element of the other; strings use
    /// [`string_compare`](Self::string_compare); other scalars compare equal.
    pub fn is_subset(&self, subset: &Value, superset: &Value) -> bool {
        match (subset, superset) {
            (Value::Object(a), Value::Object(b)) => a
                .iter()
                .all(|(key, value)| b.get(key).is_some_and(|other| self.is_subset(value, other))),
            (Value::Array(a), Value::Array(b)) => a
                .iter()
                .all(|value| b.iter().any(|other| self.is_subset(value, other))),
            (Value::String(a), Value::String(b)) => self.string_compare(a, b),
            (Value::String(_), _) => false,
            (a, b) => a == b,
        }
    }

    fn values_contain(&self, expected: &Value, actual: &[&str]) -> bool {
        let actual = Value::Array(actual.iter().map(|v| Value::from(*v)).collect());
        match expected {
            Value::Array(_) => self.is_subset(expected, &actual),
            Value::String(_) => self.is_subset(&Value::Array(vec![expected.clone()]), &actual),
            Value::Null => true,
            other => self.is_subset(&Value::Array(vec![Value::from(other.to_string())]), &actual),
        }
    }

    fn body_matches(&self, expected: &Value, request: &InboundRequest) -> bool {
        match expected {
            Value::Null => true,
            Value::String(s) => request.body.as_ref() == s.as_bytes(),
            Value::Object(_) | Value::Array(_) => {
                let is_json = request
                    .header(CONTENT_TYPE.as_str())
                    .and_then(|ct| ct.split(';').next())
                    .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"));
                if !is_json {
                    return false;
                }
                serde_json::from_slice::<Value>(&request.body)
                    .map(|incoming| self.is_subset(expected, &incoming))
                    .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Whether `request` satisfies every declared part of `pattern`.
    pub fn matches(&self, pattern: &MockRequestPattern, request: &InboundRequest) -> bool {
        if let Some(host) = &pattern.host {
            if !host.is_empty() && !self.string_compare(host, request.host()) {
                return false;
            }
        }
        if request.method.as_str() != pattern.method {
            return false;
        }
        if let Some(url_path) = &pattern.url_path {
            if !url_path.is_empty() && !self.string_compare(url_path, request.path()) {
                return false;
            }
        }
        if let Some(headers) = &pattern.header {
            let all = headers
                .iter()
                .all(|(name, expected)| self.values_contain(expected, &request.header_values(name)));
            if !all {
                return false;
            }
        }
        if let Some(expected_query) = &pattern.query_params {
            let actual = query_params(request.query());
            let all = expected_query.iter().all(|(name, expected)| {
                let values: Vec<&str> = actual
                    .get(name)
                    .map(|v| v.iter().map(String::as_str).collect())
                    .unwrap_or_default();
                self.values_contain(expected, &values)
            });
            if !all {
                return false;
            }
        }
        match &pattern.body {
            Some(body) => self.body_matches(body, request),
            None => true,
        }
    }
}

/// [`PatternCache::string_compare`] without keeping the compiled pattern.
pub fn string_compare(pattern: &str, s: &str) -> bool {
    PatternCache::default().string_compare(pattern, s)
}

/// [`PatternCache::is_subset`] without keeping compiled patterns.
pub fn is_subset(subset: &Value, superset: &Value) -> bool {
    PatternCache::default().is_subset(subset, superset)
}

/// [`PatternCache::matches`] without keeping compiled patterns.
pub fn matches(pattern: &MockRequestPattern, request: &InboundRequest) -> bool {
    PatternCache::default().matches(pattern, request)
}

/// Query parameters decoded the way form values are.
pub fn query_params(query: Option<&str>) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in query.unwrap_or_default().split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.entry(decode(key)).or_default().push(decode(value));
    }
    params
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hyper::header::{HeaderName, HeaderValue};
    use hyper::{HeaderMap, Method};
    use serde_json::json;

    fn request(method: Method, uri: &str, headers: &[(&str, &str)], body: &str) -> InboundRequest {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        InboundRequest {
            id: "s".to_string(),
            method,
            uri: uri.parse().unwrap(),
            headers: map,
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_string_compare() {
        assert!(string_compare("/users/\\d+", "/users/42"));
        assert!(string_compare("abc", "abc"));
        assert!(!string_compare("abc", "abcd"));
        // unbalanced bracket does not compile, so it is literal
        assert!(string_compare("a[b", "a[b"));
        assert!(!string_compare("a[b", "ab"));
    }

    #[test]
    fn test_is_subset_reflexive() {
        for value in [
            json!({"a": [1, {"b": "c"}], "d": null}),
            json!([1, 2, 3]),
            json!("text"),
            json!(4.5),
            json!(true),
        ] {
            assert!(is_subset(&value, &value), "{value}");
        }
    }

    #[test]
    fn test_is_subset_checks_every_key() {
        let incoming = json!({"a": 1, "b": 2});
        assert!(is_subset(&json!({"a": 1}), &incoming));
        assert!(!is_subset(&json!({"a": 2}), &incoming));
        assert!(!is_subset(&json!({"a": 1, "c": 3}), &incoming));
        assert!(!is_subset(&json!({"a": 1, "b": 3}), &incoming));
    }

    #[test]
    fn test_is_subset_arrays_and_types() {
        assert!(is_subset(&json!([{"id": 2}]), &json!([{"id": 1}, {"id": 2, "x": 0}])));
        assert!(!is_subset(&json!([3]), &json!([1, 2])));
        assert!(!is_subset(&json!("1"), &json!(1)));
        assert!(is_subset(&json!({"name": "^al"}), &json!({"name": "alice"})));
    }

    fn pattern(value: serde_json::Value) -> MockRequestPattern {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_method_and_path() {
        let p = pattern(json!({"method": "GET", "urlPath": "/users/\\d+"}));
        assert!(matches(&p, &request(Method::GET, "/users/7", &[], "")));
        assert!(!matches(&p, &request(Method::POST, "/users/7", &[], "")));
        assert!(!matches(&p, &request(Method::GET, "/teams/7", &[], "")));
    }

    #[test]
    fn test_host() {
        let p = pattern(json!({"method": "GET", "host": "api.local"}));
        assert!(matches(&p, &request(Method::GET, "/", &[("host", "api.local")], "")));
        assert!(!matches(&p, &request(Method::GET, "/", &[("host", "other")], "")));
    }

    #[test]
    fn test_header_subset() {
        let p = pattern(json!({"method": "GET", "header": {"X-Role": ["admin", "ops"], "X-Tenant": "acme"}}));
        let ok = request(
            Method::GET,
            "/",
            &[("x-role", "ops"), ("x-role", "admin"), ("x-role", "dev"), ("x-tenant", "acme")],
            "",
        );
        assert!(matches(&p, &ok));
        let missing = request(Method::GET, "/", &[("x-role", "ops"), ("x-tenant", "acme")], "");
        assert!(!matches(&p, &missing));
    }

    #[test]
    fn test_query_subset() {
        let p = pattern(json!({"method": "GET", "queryParams": {"tag": ["a", "b"], "q": "hello world"}}));
        assert!(matches(&p, &request(Method::GET, "/s?tag=b&tag=a&q=hello+world", &[], "")));
        assert!(!matches(&p, &request(Method::GET, "/s?tag=a&q=hello+world", &[], "")));
    }

    #[test]
    fn test_json_body_subset() {
        let p = pattern(json!({"method": "POST", "body": {"a": 1}}));
        let json_ct = [("content-type", "application/json")];
        assert!(matches(&p, &request(Method::POST, "/", &json_ct, r#"{"a":1,"b":2}"#)));
        assert!(!matches(&p, &request(Method::POST, "/", &json_ct, r#"{"a":2}"#)));
        assert!(!matches(&p, &request(Method::POST, "/", &json_ct, "{not json")));
        assert!(!matches(&p, &request(Method::POST, "/", &[], r#"{"a":1}"#)));
    }

    #[test]
    fn test_string_body_exact() {
        let p = pattern(json!({"method": "POST", "body": "ping"}));
        assert!(matches(&p, &request(Method::POST, "/", &[], "ping")));
        assert!(!matches(&p, &request(Method::POST, "/", &[], "ping ")));
    }

    #[test]
    fn test_query_params_decoding() {
        let params = query_params(Some("a=1&a=2&b=x%20y&c"));
        assert_eq!(params["a"], vec!["1", "2"]);
        assert_eq!(params["b"], vec!["x y"]);
        assert_eq!(params["c"], vec![""]);
    }

    #[test]
    fn test_cache_compiles_each_pattern_once() {
        let cache = PatternCache::default();
        let p = pattern(json!({"method": "GET", "urlPath": "/users/\\d+", "queryParams": {"sort": "^na"}}));
        assert!(cache.matches(&p, &request(Method::GET, "/users/1?sort=name", &[], "")));
        assert!(cache.matches(&p, &request(Method::GET, "/users/2?sort=nav", &[], "")));
        assert_eq!(cache.len(), 2);
        assert!(cache.string_compare("plain", "plain"));
        assert_eq!(cache.len(), 2);
    }
}
