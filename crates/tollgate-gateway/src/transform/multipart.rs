//! `multipart/form-data` normalization for transaction records.
//!
//! Only the recorded form changes; the encoded bytes are what goes upstream.

use bytes::Bytes;
use hyper::HeaderMap;
use serde::Serialize;
use std::collections::BTreeMap;

/// All values and files submitted under one field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormPart {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FormFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormFile {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, Vec<String>>,
}

pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .to_ascii_lowercase()
        .contains("multipart/form-data")
}

/// Parse a buffered multipart body. Plain values come first, then files,
/// each grouped by field name in order of first appearance.
pub async fn parse_form(content_type: &str, body: Bytes) -> Result<Vec<FormPart>, multer::Error> {
    let boundary = multer::parse_boundary(content_type)?;
    let stream = futures::stream::once(async move { Ok::<Bytes, std::io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut values: Vec<FormPart> = Vec::new();
    let mut files: Vec<FormPart> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let headers = header_lists(field.headers());
                field.bytes().await?;
                part_named(&mut files, name).files.push(FormFile {
                    name: file_name,
                    headers,
                });
            }
            None => {
                let text = field.text().await?;
                part_named(&mut values, name).value.push(text);
            }
        }
    }

    values.extend(files);
    Ok(values)
}

fn part_named(parts: &mut Vec<FormPart>, name: String) -> &mut FormPart {
    let index = match parts.iter().position(|p| p.name == name) {
        Some(index) => index,
        None => {
            parts.push(FormPart {
                name,
                ..Default::default()
            });
            parts.len() - 1
        }
    };
    &mut parts[index]
}

fn header_lists(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        if let Ok(v) = value.to_str() {
            out.entry(name.as_str().to_string())
                .or_default()
                .push(v.to_string());
        }
    }
    out
}
