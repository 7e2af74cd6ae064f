//! Header names the gateway reads or writes, and helpers to set them.

use hyper::header::{
    HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::http::response::Parts;
use hyper::{HeaderMap, Response};

/// Overrides the status of a mocked response.
pub static TOLLGATE_STATUS_CODE: HeaderName = HeaderName::from_static("tollgate-status-code");
/// Names the contract example a mock should return.
pub static PREFERRED: HeaderName = HeaderName::from_static("preferred");
pub static REWRITE_ID: HeaderName = HeaderName::from_static(crate::routing::REWRITE_ID_HEADER);

pub static VALUE_ANY: HeaderValue = HeaderValue::from_static("*");
pub static VALUE_ALLOWED_METHODS: HeaderValue =
    HeaderValue::from_static("OPTIONS,POST,GET,DELETE,PATCH,PUT");
pub static VALUE_JSON: HeaderValue = HeaderValue::from_static("application/json");

/// Allow every origin, header and common method.
pub fn set_cors_headers(headers: &mut HeaderMap) {
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, VALUE_ANY.clone());
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, VALUE_ANY.clone());
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, VALUE_ALLOWED_METHODS.clone());
}

pub trait GatewayHeadersExt {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue);

    /// Returns false if `value` is not a valid header value.
    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool;

    /// CORS headers plus `Content-Type: application/json`.
    fn set_json_cors(&mut self);
}

impl GatewayHeadersExt for HeaderMap {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.insert(name.clone(), value.clone());
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                self.insert(name.clone(), header_value);
                true
            }
            Err(_) => false,
        }
    }

    fn set_json_cors(&mut self) {
        set_cors_headers(self);
        self.insert(CONTENT_TYPE, VALUE_JSON.clone());
    }
}

impl<B> GatewayHeadersExt for Response<B> {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers_mut().set_header(name, value);
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        self.headers_mut().set_header_value(name, value)
    }

    fn set_json_cors(&mut self) {
        self.headers_mut().set_json_cors();
    }
}

impl GatewayHeadersExt for Parts {
    fn set_header(&mut self, name: &HeaderName, value: &HeaderValue) {
        self.headers.set_header(name, value);
    }

    fn set_header_value(&mut self, name: &HeaderName, value: &str) -> bool {
        self.headers.set_header_value(name, value)
    }

    fn set_json_cors(&mut self) {
        self.headers.set_json_cors();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use hyper::body::Bytes;

    #[test]
    fn test_static_header_names() {
        assert_eq!(TOLLGATE_STATUS_CODE.as_str(), "tollgate-status-code");
        assert_eq!(REWRITE_ID.as_str(), "rewriteid");
    }

    #[test]
    fn test_cors_headers() {
        let mut headers = HeaderMap::new();
        set_cors_headers(&mut headers);
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert_eq!(headers["access-control-allow-headers"], "*");
        assert_eq!(
            headers["access-control-allow-methods"],
            "OPTIONS,POST,GET,DELETE,PATCH,PUT"
        );
    }

    #[test]
    fn test_json_cors_on_response() {
        let mut response = Response::new(Full::new(Bytes::new()));
        response.set_json_cors();
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }

    #[test]
    fn test_set_header_value_invalid() {
        let mut response = Response::new(Full::new(Bytes::new()));
        assert!(!response.set_header_value(&PREFERRED, "bad\nvalue"));
        assert!(response.set_header_value(&PREFERRED, "named"));
        assert_eq!(response.headers()[&PREFERRED], "named");
    }
}
