//! `${path}` substitution in static mock bodies.

use super::matcher::query_params;
use crate::transform::InboundRequest;
use serde_json::{json, Map, Value};

/// The request fields a template can refer to.
pub fn request_view(request: &InboundRequest) -> Value {
    let mut query = Map::new();
    for (name, mut values) in query_params(request.query()) {
        let value = if values.len() == 1 {
            Value::from(values.remove(0))
        } else {
            Value::from(values)
        };
        query.insert(name, value);
    }

    let mut view = json!({
        "method": request.method.as_str(),
        "urlPath": request.path(),
        "host": request.host(),
        "queryParams": query,
    });
    if !request.body.is_empty() {
        let body = serde_json::from_slice(&request.body)
            .unwrap_or_else(|_| Value::from(String::from_utf8_lossy(&request.body).into_owned()));
        view["body"] = body;
    }
    view
}

/// Replace every `${a.b[2]}` token with the value at that path in `view`.
/// Unresolvable tokens are left as written.
pub fn render(template: &str, view: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let token = after
            .find('}')
            .map(|end| &after[..end])
            .filter(|path| !path.is_empty() && path.chars().all(is_path_char));
        match token {
            Some(path) => {
                match lookup(view, path) {
                    Some(Value::String(s)) => out.push_str(s),
                    Some(other) => out.push_str(&other.to_string()),
                    None => out.push_str(&rest[start..start + path.len() + 3]),
                }
                rest = &after[path.len() + 1..];
            }
            None => {
                out.push_str("${");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '[' | ']')
}

fn lookup<'a>(view: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = view;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        let (key, mut indexes) = match segment.find('[') {
            Some(i) => (&segment[..i], &segment[i..]),
            None => (segment, ""),
        };
        if !key.is_empty() {
            current = current.get(key)?;
        }
        while let Some(rest) = indexes.strip_prefix('[') {
            let (index, tail) = rest.split_once(']')?;
            current = current.get(index.parse::<usize>().ok()?)?;
            indexes = tail;
        }
        if !indexes.is_empty() {
            return None;
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hyper::{HeaderMap, Method};

    fn request(uri: &str, body: &str) -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert("host", "mock.local".parse().unwrap());
        InboundRequest {
            id: "v".to_string(),
            method: Method::POST,
            uri: uri.parse().unwrap(),
            headers,
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_view_fields() {
        let view = request_view(&request("/orders?id=7&tag=a&tag=b", r#"{"items":[{"sku":"x1"}]}"#));
        assert_eq!(view["method"], "POST");
        assert_eq!(view["urlPath"], "/orders");
        assert_eq!(view["host"], "mock.local");
        assert_eq!(view["queryParams"]["id"], "7");
        assert_eq!(view["queryParams"]["tag"], json!(["a", "b"]));
        assert_eq!(view["body"]["items"][0]["sku"], "x1");
    }

    #[test]
    fn test_render_paths() {
        let view = request_view(&request(
            "/orders?id=7&tag=a&tag=b",
            r#"{"items":[{"sku":"x1","qty":3}],"rush":true}"#,
        ));
        let out = render(
            r#"{"id":"${queryParams.id}","sku":"${body.items[0].sku}","qty":${body.items.[0].qty},"rush":${body.rush},"second":"${queryParams.tag[1]}"}"#,
            &view,
        );
        assert_eq!(
            out,
            r#"{"id":"7","sku":"x1","qty":3,"rush":true,"second":"b"}"#
        );
    }

    #[test]
    fn test_unresolved_tokens_kept() {
        let view = request_view(&request("/x", ""));
        assert_eq!(render("${body.missing} ${method}", &view), "${body.missing} POST");
        assert_eq!(render("${queryParams.a[9]}", &view), "${queryParams.a[9]}");
    }

    #[test]
    fn test_no_tokens_is_identity() {
        let view = request_view(&request("/x", ""));
        assert_eq!(render("plain {text}", &view), "plain {text}");
        assert_eq!(render("${not a token} ${", &view), "${not a token} ${");
        assert_eq!(render("$${method}", &view), "$POST");
    }
}
