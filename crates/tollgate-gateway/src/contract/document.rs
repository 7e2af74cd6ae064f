//! OpenAPI-shaped contract documents.
//!
//! Only the parts the gateway reads are modelled; unknown keys are ignored.

use crate::config::ConfigError;
use hyper::Method;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Server {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    #[serde(default)]
    pub schemas: BTreeMap<String, Value>,
    #[serde(default)]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityScheme {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub scheme: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "in", default)]
    pub location: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExampleObject {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaTypeObject {
    #[serde(default)]
    pub schema: Option<Value>,
    #[serde(default)]
    pub example: Option<Value>,
    #[serde(default)]
    pub examples: BTreeMap<String, ExampleObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestBody {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub content: BTreeMap<String, MediaTypeObject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseObject {
    #[serde(default)]
    pub description: String,
    /// `None` when the response declares no content at all.
    #[serde(default)]
    pub content: Option<BTreeMap<String, MediaTypeObject>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(default)]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default)]
    pub request_body: Option<RequestBody>,
    /// Keyed by status code (`"200"`, `"4XX"`) or `"default"`.
    #[serde(default)]
    pub responses: BTreeMap<String, ResponseObject>,
    #[serde(default)]
    pub security: Option<Vec<SecurityRequirement>>,
}

impl Operation {
    /// Documented codes excluding `default`, in ascending order.
    pub fn codes(&self) -> impl Iterator<Item = (&str, &ResponseObject)> {
        self.responses
            .iter()
            .filter(|(code, _)| code.as_str() != "default")
            .map(|(code, resp)| (code.as_str(), resp))
    }

    pub fn default_response(&self) -> Option<&ResponseObject> {
        self.responses.get("default")
    }

    /// Exact code, then its range (`4XX`), then `default`.
    pub fn response_for(&self, status: u16) -> Option<&ResponseObject> {
        let code = status.to_string();
        let range = format!("{}XX", status / 100);
        self.responses
            .get(&code)
            .or_else(|| {
                self.responses
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(&range))
                    .map(|(_, v)| v)
            })
            .or_else(|| self.default_response())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathItem {
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    pub get: Option<Operation>,
    pub put: Option<Operation>,
    pub post: Option<Operation>,
    pub delete: Option<Operation>,
    pub options: Option<Operation>,
    pub head: Option<Operation>,
    pub patch: Option<Operation>,
    pub trace: Option<Operation>,
}

impl PathItem {
    pub fn operation(&self, method: &Method) -> Option<&Operation> {
        match *method {
            Method::GET => self.get.as_ref(),
            Method::PUT => self.put.as_ref(),
            Method::POST => self.post.as_ref(),
            Method::DELETE => self.delete.as_ref(),
            Method::OPTIONS => self.options.as_ref(),
            Method::HEAD => self.head.as_ref(),
            Method::PATCH => self.patch.as_ref(),
            Method::TRACE => self.trace.as_ref(),
            _ => None,
        }
    }
}

/// The raw document as deserialized.
#[derive(Debug, Clone, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    servers: Vec<Server>,
    #[serde(default)]
    paths: BTreeMap<String, PathItem>,
    #[serde(default)]
    components: Components,
    #[serde(default)]
    security: Vec<SecurityRequirement>,
}

/// A loaded contract with its path templates compiled into a router.
pub struct ContractDocument {
    pub source: PathBuf,
    pub servers: Vec<Server>,
    pub paths: BTreeMap<String, PathItem>,
    pub components: Components,
    pub security: Vec<SecurityRequirement>,
    base_paths: Vec<String>,
    router: matchit::Router<String>,
}

impl std::fmt::Debug for ContractDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractDocument")
            .field("source", &self.source)
            .field("paths", &self.paths.len())
            .finish()
    }
}

/// A path template resolved for a concrete request path.
#[derive(Debug)]
pub struct ResolvedPath<'a> {
    pub template: &'a str,
    pub item: &'a PathItem,
    pub params: Vec<(String, String)>,
}

impl ContractDocument {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Contract {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(path, &contents)
    }

    /// Parse YAML or JSON contract text.
    pub fn parse(source: &Path, contents: &str) -> Result<Self, ConfigError> {
        let raw: RawDocument =
            serde_yaml::from_str(contents).map_err(|e| ConfigError::Contract {
                path: source.to_path_buf(),
                reason: e.to_string(),
            })?;

        let mut router = matchit::Router::new();
        for template in raw.paths.keys() {
            if let Err(e) = router.insert(template.clone(), template.clone()) {
                warn!(contract = %source.display(), path = %template, error = %e, "Skipping conflicting contract path");
            }
        }

        let base_paths = raw
            .servers
            .iter()
            .filter_map(|s| server_base_path(&s.url))
            .collect();

        debug!(contract = %source.display(), paths = raw.paths.len(), "Contract loaded");

        Ok(Self {
            source: source.to_path_buf(),
            servers: raw.servers,
            paths: raw.paths,
            components: raw.components,
            security: raw.security,
            base_paths,
            router,
        })
    }

    /// Match `path` against the path templates, also trying it with each
    /// server base path stripped.
    pub fn resolve_path(&self, path: &str) -> Option<ResolvedPath<'_>> {
        let candidates = std::iter::once(path).chain(
            self.base_paths
                .iter()
                .filter_map(|base| path.strip_prefix(base.as_str()))
                .filter(|rest| rest.starts_with('/')),
        );
        for candidate in candidates {
            if let Ok(matched) = self.router.at(candidate) {
                let template = matched.value.as_str();
                if let Some((key, item)) = self.paths.get_key_value(template) {
                    return Some(ResolvedPath {
                        template: key.as_str(),
                        item,
                        params: matched
                            .params
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                    });
                }
            }
        }
        None
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.resolve_path(path).is_some()
    }

    /// Follow a local `#/components/schemas/Name` reference.
    pub fn resolve_ref<'a>(&'a self, schema: &'a Value) -> Option<&'a Value> {
        match schema.get("$ref").and_then(Value::as_str) {
            Some(reference) => {
                let name = reference.strip_prefix("#/components/schemas/")?;
                self.components.schemas.get(name)
            }
            None => Some(schema),
        }
    }
}

fn server_base_path(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let path = if url.starts_with('/') {
        url
    } else {
        without_scheme.find('/').map(|i| &without_scheme[i..])?
    };
    let trimmed = path.trim_end_matches('/');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const PETSTORE: &str = r#"
openapi: 3.0.3
info:
  title: pets
  version: "1"
servers:
  - url: https://api.example.com/v1
security:
  - apiKey: []
paths:
  /pets:
    get:
      parameters:
        - name: limit
          in: query
          required: true
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                type: array
                items:
                  $ref: '#/components/schemas/Pet'
              examples:
                two:
                  value: [{"id": 1, "name": "rex"}, {"id": 2, "name": "tom"}]
        "404":
          description: none
          content:
            application/json:
              examples:
                missing:
                  value: {"error": "no pets"}
    post:
      security: []
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: '#/components/schemas/Pet'
      responses:
        "201":
          description: created
          content:
            application/json:
              example: {"id": 9, "name": "new"}
        "204":
          description: nothing
  /pets/{petId}:
    parameters:
      - name: petId
        in: path
        required: true
    get:
      security:
        - bearer: []
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                $ref: '#/components/schemas/Pet'
        "401":
          description: denied
          content:
            application/json:
              example: {"error": "who are you"}
    delete:
      responses:
        "204":
          description: deleted
  /empty:
    get:
      security: []
      responses:
        "200":
          description: no content
  /xml:
    get:
      security: []
      responses:
        "200":
          description: xml only
          content:
            application/xml:
              example: "<pet/>"
  /fallback:
    get:
      security: []
      responses:
        default:
          description: anything
          content:
            text/plain:
              example: "fallback"
components:
  securitySchemes:
    apiKey:
      type: apiKey
      in: header
      name: X-API-Key
    bearer:
      type: http
      scheme: bearer
  schemas:
    Pet:
      type: object
      required: [id, name]
      properties:
        id:
          type: integer
        name:
          type: string
          example: fluffy
        tags:
          type: array
          items:
            type: string
"#;

    pub(crate) fn petstore() -> ContractDocument {
        ContractDocument::parse(Path::new("petstore.yaml"), PETSTORE).unwrap()
    }

    #[test]
    fn test_resolve_templated_path() {
        let doc = petstore();
        let resolved = doc.resolve_path("/pets/42").unwrap();
        assert_eq!(resolved.template, "/pets/{petId}");
        assert_eq!(resolved.params, vec![("petId".to_string(), "42".to_string())]);
        assert!(resolved.item.operation(&Method::GET).is_some());
        assert!(resolved.item.operation(&Method::PUT).is_none());
    }

    #[test]
    fn test_resolve_with_server_base_path() {
        let doc = petstore();
        assert_eq!(doc.resolve_path("/v1/pets").unwrap().template, "/pets");
        assert!(doc.resolve_path("/v2/pets").is_none());
        assert!(!doc.has_path("/unknown"));
    }

    #[test]
    fn test_response_lookup_order() {
        let doc = petstore();
        let op = doc.paths["/pets"].get.as_ref().unwrap();
        assert!(op.response_for(200).is_some());
        assert!(op.response_for(500).is_none());
        let fallback = doc.paths["/fallback"].get.as_ref().unwrap();
        assert!(fallback.response_for(418).is_some());
        assert_eq!(op.codes().map(|(c, _)| c).collect::<Vec<_>>(), vec!["200", "404"]);
    }

    #[test]
    fn test_resolve_ref() {
        let doc = petstore();
        let reference = serde_json::json!({"$ref": "#/components/schemas/Pet"});
        let pet = doc.resolve_ref(&reference).unwrap();
        assert_eq!(pet["type"], "object");
        let missing = serde_json::json!({"$ref": "#/components/schemas/Nope"});
        assert!(doc.resolve_ref(&missing).is_none());
    }

    #[test]
    fn test_json_contract_parses() {
        let doc = ContractDocument::parse(
            Path::new("c.json"),
            r#"{"paths": {"/a": {"get": {"responses": {"200": {"description": "ok"}}}}}, "x-extra": 1}"#,
        )
        .unwrap();
        assert!(doc.has_path("/a"));
    }

    #[test]
    fn test_invalid_contract_names_file() {
        let err = ContractDocument::parse(Path::new("broken.yaml"), "paths: [1, 2]").unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn test_server_base_path() {
        assert_eq!(server_base_path("https://a.com/v1/"), Some("/v1".to_string()));
        assert_eq!(server_base_path("/api"), Some("/api".to_string()));
        assert_eq!(server_base_path("https://a.com"), None);
    }
}
