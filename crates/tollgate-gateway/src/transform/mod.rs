//! Request and response transformation between the client and the upstream.

pub mod cookies;
pub mod multipart;
pub mod request;
pub mod response;

use hyper::HeaderMap;
use std::collections::BTreeMap;

pub use cookies::{format_set_cookie, CookieMap, HttpCookie};
pub use multipart::{FormFile, FormPart};
pub use request::{
    build_outbound, record_request, HeaderPolicy, InboundRequest, OutboundRequest, TransformError,
};
pub use response::ResponseSnapshot;

/// First value of every header, by lowercase name.
pub fn first_values(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for name in headers.keys() {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            out.insert(name.as_str().to_string(), value.to_string());
        }
    }
    out
}
