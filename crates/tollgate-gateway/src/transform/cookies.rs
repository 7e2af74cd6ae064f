//! Cookie parsing for transaction records.

use hyper::header::{COOKIE, SET_COOKIE};
use hyper::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCookie {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    /// Raw `Expires` attribute, unparsed.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expires: String,
    /// 0 means no `Max-Age`; negative means delete now (`Max-Age=0` or below).
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max_age: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub secure: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub http_only: bool,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

pub type CookieMap = BTreeMap<String, HttpCookie>;

/// Cookies sent by a client in `Cookie` headers.
pub fn request_cookies(headers: &HeaderMap) -> CookieMap {
    let mut cookies = CookieMap::new();
    for value in headers.get_all(COOKIE).iter().filter_map(|v| v.to_str().ok()) {
        for pair in value.split(';') {
            let Some((name, val)) = pair.trim().split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            cookies.insert(
                name.to_string(),
                HttpCookie {
                    value: unquote(val.trim()).to_string(),
                    ..Default::default()
                },
            );
        }
    }
    cookies
}

/// Cookies set by a server, one per `Set-Cookie` header.
pub fn response_cookies(headers: &HeaderMap) -> CookieMap {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(parse_set_cookie)
        .collect()
}

/// Parse a single `Set-Cookie` value. Returns `None` when there is no `name=value` pair.
pub fn parse_set_cookie(raw: &str) -> Option<(String, HttpCookie)> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = HttpCookie {
        value: unquote(value.trim()).to_string(),
        ..Default::default()
    };

    for attr in parts {
        let attr = attr.trim();
        let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
        let val = val.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "path" => cookie.path = val.to_string(),
            "domain" => cookie.domain = val.trim_start_matches('.').to_string(),
            "expires" => cookie.expires = val.to_string(),
            "max-age" => {
                if let Ok(secs) = val.parse::<i64>() {
                    cookie.max_age = if secs <= 0 { -1 } else { secs };
                }
            }
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            _ => {}
        }
    }

    Some((name.to_string(), cookie))
}

/// Render a cookie as a `Set-Cookie` header value.
pub fn format_set_cookie(name: &str, cookie: &HttpCookie) -> String {
    let mut out = format!("{name}={}", cookie.value);
    if !cookie.path.is_empty() {
        out.push_str("; Path=");
        out.push_str(&cookie.path);
    }
    if !cookie.domain.is_empty() {
        out.push_str("; Domain=");
        out.push_str(&cookie.domain);
    }
    if !cookie.expires.is_empty() {
        out.push_str("; Expires=");
        out.push_str(&cookie.expires);
    }
    match cookie.max_age {
        0 => {}
        age if age < 0 => out.push_str("; Max-Age=0"),
        age => out.push_str(&format!("; Max-Age={age}")),
    }
    if cookie.secure {
        out.push_str("; Secure");
    }
    if cookie.http_only {
        out.push_str("; HttpOnly");
    }
    out
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
